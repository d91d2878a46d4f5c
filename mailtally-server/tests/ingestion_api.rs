use anyhow::Result;
use axum::http::StatusCode;
use axum_test::multipart::{MultipartForm, Part};
use mailtally_core::{
    IngestionReport, SenderMetrics,
    metrics::MetricsRepository,
    testing::{SAMPLE_MESSAGES, TarBuilder, message, sample_mailbox_archive},
};
use mailtally_server::routes::paths;
use serde_json::{Value, json};

mod common;

use common::{archive_form, build_test_app, build_test_app_with, limit, wait_for_idle};

#[tokio::test]
async fn status_is_idle_before_any_ingestion() -> Result<()> {
    let app = build_test_app()?;

    let response = app.server.get(paths::STATUS).await;
    response.assert_status_ok();
    assert_eq!(
        response.json::<Value>(),
        json!({
            "ingestionRunning": false,
            "messagesProcessed": 0,
            "validSenderMessages": 0,
        })
    );

    let top = app.server.get(paths::TOP_SENDERS).await;
    top.assert_status_ok();
    assert_eq!(top.json::<Value>(), json!([]));
    Ok(())
}

#[tokio::test]
async fn full_ingestion_flow_reports_metrics() -> Result<()> {
    let app = build_test_app()?;

    let response = app
        .server
        .post(paths::START)
        .multipart(archive_form(sample_mailbox_archive()))
        .await;
    response.assert_status(StatusCode::ACCEPTED);

    let report = wait_for_idle(&app.server).await?;
    assert_eq!(
        report,
        IngestionReport {
            running: false,
            messages_processed: SAMPLE_MESSAGES,
            valid_sender_messages: SAMPLE_MESSAGES,
        }
    );

    let top = app.server.get(paths::TOP_SENDERS).await;
    top.assert_status_ok();
    let body: Value = top.json();
    let entries = body.as_array().expect("array body");
    assert_eq!(entries.len(), 10);
    assert_eq!(entries[0], json!({ "email": "sender1@example.com", "count": 13 }));
    assert_eq!(entries[1], json!({ "email": "sender2@example.com", "count": 12 }));
    assert_eq!(entries[2], json!({ "email": "sender3@example.com", "count": 11 }));
    Ok(())
}

#[tokio::test]
async fn top_senders_honours_limit_query() -> Result<()> {
    let app = build_test_app()?;
    app.server
        .post(paths::START)
        .multipart(archive_form(sample_mailbox_archive()))
        .await
        .assert_status(StatusCode::ACCEPTED);
    wait_for_idle(&app.server).await?;

    let top: Vec<SenderMetrics> = app
        .server
        .get(paths::TOP_SENDERS)
        .add_query_param("limit", 2)
        .await
        .json();
    assert_eq!(
        top,
        vec![
            SenderMetrics::new("sender1@example.com", 13),
            SenderMetrics::new("sender2@example.com", 12),
        ]
    );

    let zero = app
        .server
        .get(paths::TOP_SENDERS)
        .add_query_param("limit", 0)
        .await;
    zero.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(zero.json::<Value>()["error"]["status"], json!(400));

    let garbage = app
        .server
        .get(paths::TOP_SENDERS)
        .add_query_param("limit", "ten")
        .await;
    garbage.assert_status(StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn configured_default_limit_applies() -> Result<()> {
    let app = build_test_app_with(|config| {
        config.ingestion.top_senders_limit = limit(3);
    })?;
    app.server
        .post(paths::START)
        .multipart(archive_form(sample_mailbox_archive()))
        .await
        .assert_status(StatusCode::ACCEPTED);
    wait_for_idle(&app.server).await?;

    let top: Vec<SenderMetrics> =
        app.server.get(paths::TOP_SENDERS).await.json();
    assert_eq!(top.len(), 3);
    Ok(())
}

#[tokio::test]
async fn start_while_running_is_a_conflict() -> Result<()> {
    let app = build_test_app()?;
    // Hold the run slot as if another ingestion were active.
    assert!(app.metrics.try_start_run());

    let response = app
        .server
        .post(paths::START)
        .multipart(archive_form(sample_mailbox_archive()))
        .await;
    response.assert_status(StatusCode::CONFLICT);
    assert_eq!(response.json::<Value>()["error"]["status"], json!(409));

    let health: Value = app.server.get(paths::HEALTH).await.json();
    assert_eq!(health, json!({ "status": "healthy", "ingestionRunning": true }));

    app.metrics.finish_run();
    app.server
        .post(paths::START)
        .multipart(archive_form(sample_mailbox_archive()))
        .await
        .assert_status(StatusCode::ACCEPTED);
    wait_for_idle(&app.server).await?;
    Ok(())
}

#[tokio::test]
async fn missing_or_empty_file_is_a_bad_request() -> Result<()> {
    let app = build_test_app()?;

    let empty = app
        .server
        .post(paths::START)
        .multipart(archive_form(Vec::new()))
        .await;
    empty.assert_status(StatusCode::BAD_REQUEST);

    let wrong_field = MultipartForm::new()
        .add_text("note", "no archive here")
        .add_part("upload", Part::bytes(sample_mailbox_archive()));
    let missing = app.server.post(paths::START).multipart(wrong_field).await;
    missing.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(
        missing.json::<Value>()["error"]["message"],
        json!("multipart field `file` is required")
    );

    // Neither rejection claimed the slot.
    assert!(!app.state.ingestion.is_running());
    Ok(())
}

#[tokio::test]
async fn unwritable_spool_is_a_server_error() -> Result<()> {
    let app = build_test_app()?;
    let spool = app.spool.path().to_path_buf();
    std::fs::remove_dir_all(&spool)?;

    let response = app
        .server
        .post(paths::START)
        .multipart(archive_form(sample_mailbox_archive()))
        .await;
    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!app.state.ingestion.is_running());
    Ok(())
}

#[tokio::test]
async fn corrupt_upload_finishes_run_with_prior_counts() -> Result<()> {
    let app = build_test_app()?;

    app.server
        .post(paths::START)
        .multipart(archive_form(b"plain text, not an archive".to_vec()))
        .await
        .assert_status(StatusCode::ACCEPTED);
    assert_eq!(wait_for_idle(&app.server).await?, IngestionReport::default());

    let partly_bad = TarBuilder::new()
        .file("1.eml", &message("ok@example.com"))
        .file("2.eml", b"no headers at all")
        .into_tar_gz();
    app.server
        .post(paths::START)
        .multipart(archive_form(partly_bad))
        .await
        .assert_status(StatusCode::ACCEPTED);
    let report = wait_for_idle(&app.server).await?;
    assert_eq!(report.messages_processed, 2);
    assert_eq!(report.valid_sender_messages, 1);
    Ok(())
}

#[tokio::test]
async fn health_reports_idle_service() -> Result<()> {
    let app = build_test_app()?;
    let response = app.server.get(paths::HEALTH).await;
    response.assert_status_ok();
    assert_eq!(
        response.json::<Value>(),
        json!({ "status": "healthy", "ingestionRunning": false })
    );
    Ok(())
}
