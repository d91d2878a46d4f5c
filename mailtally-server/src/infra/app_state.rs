use std::{fmt, sync::Arc};

use mailtally_core::{
    extract::{HeaderSenderExtractor, SenderExtractor},
    ingest::IngestionCoordinator,
    metrics::{InMemoryMetrics, MetricsRepository},
    report::ReportingFacade,
};

use crate::infra::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub ingestion: IngestionCoordinator,
    pub reporting: ReportingFacade,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}

impl AppState {
    /// Wires an in-memory metrics store and the header extractor.
    pub fn new(config: Arc<Config>) -> Self {
        Self::with_parts(
            config,
            Arc::new(InMemoryMetrics::new()),
            Arc::new(HeaderSenderExtractor::default()),
        )
    }

    /// One metrics store is shared by the coordinator and the reporting
    /// facade; nothing else holds it.
    pub fn with_parts(
        config: Arc<Config>,
        metrics: Arc<dyn MetricsRepository>,
        extractor: Arc<dyn SenderExtractor>,
    ) -> Self {
        let ingestion =
            IngestionCoordinator::new(Arc::clone(&metrics), extractor);
        let reporting = ReportingFacade::new(metrics)
            .with_default_limit(config.ingestion.top_senders_limit);
        Self {
            config,
            ingestion,
            reporting,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
