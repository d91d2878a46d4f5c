use std::{num::NonZeroUsize, sync::Arc, time::Duration};

use anyhow::{Result, anyhow};
use axum_test::{
    TestServer,
    multipart::{MultipartForm, Part},
};
use mailtally_core::{
    IngestionReport,
    extract::HeaderSenderExtractor,
    metrics::{InMemoryMetrics, MetricsRepository},
};
use mailtally_server::{
    AppState, create_app,
    infra::config::Config,
    routes::paths,
};
use tempfile::TempDir;

// Code is used by test modules, but not in this scope
#[allow(unused)]
pub struct TestApp {
    pub server: TestServer,
    pub state: AppState,
    pub metrics: Arc<InMemoryMetrics>,
    pub spool: TempDir,
}

#[allow(unused)]
pub fn build_test_app() -> Result<TestApp> {
    build_test_app_with(|_| {})
}

#[allow(unused)]
pub fn build_test_app_with(
    configure: impl FnOnce(&mut Config),
) -> Result<TestApp> {
    let spool = TempDir::new()?;

    let mut config = Config::default();
    config.ingestion.spool_dir = Some(spool.path().to_path_buf());
    configure(&mut config);

    let metrics = Arc::new(InMemoryMetrics::new());
    let state = AppState::with_parts(
        Arc::new(config),
        Arc::clone(&metrics) as Arc<dyn MetricsRepository>,
        Arc::new(HeaderSenderExtractor::default()),
    );
    let server = TestServer::new(create_app(state.clone()))?;

    Ok(TestApp {
        server,
        state,
        metrics,
        spool,
    })
}

#[allow(unused)]
pub fn archive_form(bytes: Vec<u8>) -> MultipartForm {
    MultipartForm::new().add_part(
        "file",
        Part::bytes(bytes)
            .file_name("mailbox.tar.gz")
            .mime_type("application/gzip"),
    )
}

/// Polls `/status` until the run is no longer active.
#[allow(unused)]
pub async fn wait_for_idle(server: &TestServer) -> Result<IngestionReport> {
    for _ in 0..500 {
        let report: IngestionReport = server.get(paths::STATUS).await.json();
        if !report.running {
            return Ok(report);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    Err(anyhow!("ingestion did not finish in time"))
}

#[allow(unused)]
pub fn limit(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).expect("non-zero limit")
}
