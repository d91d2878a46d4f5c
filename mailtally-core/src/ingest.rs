//! Single-flight ingestion of one mail archive at a time.
//!
//! # Invariants
//! - A run is claimed with one compare-and-set; a losing caller gets
//!   [`IngestionError::AlreadyRunning`] and nothing changes.
//! - Metrics are reset after the claim and before the worker counts anything.
//! - Every claimed run releases the slot exactly once, including when the
//!   worker panics or the archive turns out to be corrupt.
//! - One entry failing never stops the run; only a corrupt stream does.

use std::{
    fs::File,
    io::Read,
    panic::{self, AssertUnwindSafe},
    path::Path,
    sync::Arc,
};

use tokio::{runtime::Handle, task::JoinHandle};
use tracing::{error, info, warn};

use crate::{
    archive::{ArchiveEntry, ArchiveStreamReader},
    error::{ExtractError, IngestionError, Result},
    extract::SenderExtractor,
    metrics::MetricsRepository,
    types::IngestionReport,
};

/// Runs archive ingestion against a shared metrics store.
///
/// Cheap to clone; clones share the same store and extractor, and therefore
/// the same run slot.
#[derive(Clone, Debug)]
pub struct IngestionCoordinator {
    metrics: Arc<dyn MetricsRepository>,
    extractor: Arc<dyn SenderExtractor>,
}

/// Handle to a run accepted by [`IngestionCoordinator::start`].
///
/// Dropping it detaches the run.
#[derive(Debug)]
pub struct IngestionTicket {
    task: JoinHandle<IngestionReport>,
}

impl IngestionTicket {
    /// Waits for the run to finish and returns its final report.
    pub async fn wait(self) -> Result<IngestionReport> {
        self.task
            .await
            .map_err(|err| IngestionError::Worker(err.to_string()))
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

enum EntryOutcome {
    Sender(String),
    NoSender,
    Malformed(ExtractError),
    Failed(String),
}

impl IngestionCoordinator {
    pub fn new(
        metrics: Arc<dyn MetricsRepository>,
        extractor: Arc<dyn SenderExtractor>,
    ) -> Self {
        Self { metrics, extractor }
    }

    pub fn metrics(&self) -> &Arc<dyn MetricsRepository> {
        &self.metrics
    }

    pub fn is_running(&self) -> bool {
        self.metrics.is_running()
    }

    /// Claims the run slot and processes `source` on a blocking worker.
    ///
    /// Returns as soon as the worker is spawned. `source` must be a
    /// gzip-compressed tar stream.
    pub fn start<R>(&self, source: R) -> Result<IngestionTicket>
    where
        R: Read + Send + 'static,
    {
        // Checked before claiming so a missing runtime never strands the slot.
        let handle =
            Handle::try_current().map_err(|_| IngestionError::NoRuntime)?;
        let run = self.claim()?;

        let coordinator = self.clone();
        let task =
            handle.spawn_blocking(move || coordinator.process(run, source));
        Ok(IngestionTicket { task })
    }

    /// Opens the archive at `path` and hands it to [`Self::start`].
    ///
    /// The file is opened before the slot is claimed, so an unreadable path
    /// fails with [`IngestionError::Acquisition`] and leaves the slot free.
    pub fn start_file(&self, path: &Path) -> Result<IngestionTicket> {
        let source = File::open(path)?;
        self.start(source)
    }

    /// Claims the run slot and processes `source` on the calling thread.
    pub fn run_blocking<R: Read>(&self, source: R) -> Result<IngestionReport> {
        let run = self.claim()?;
        Ok(self.process(run, source))
    }

    fn claim(&self) -> Result<ClaimedRun> {
        if !self.metrics.try_start_run() {
            return Err(IngestionError::AlreadyRunning);
        }
        let run = ClaimedRun {
            metrics: Arc::clone(&self.metrics),
        };
        self.metrics.reset();
        Ok(run)
    }

    fn process<R: Read>(&self, run: ClaimedRun, source: R) -> IngestionReport {
        info!(target: "ingest", "starting archive ingestion");

        let mut archive = ArchiveStreamReader::gzip(source);
        loop {
            let mut entry = match archive.next_entry() {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(err) => {
                    error!(
                        target: "ingest",
                        error = %err,
                        "archive stream is corrupt; ingestion stopped"
                    );
                    break;
                }
            };

            self.metrics.increment_processed();
            match self.extract_entry(&mut entry) {
                EntryOutcome::Sender(sender) => {
                    self.metrics.record_sender(&sender);
                }
                EntryOutcome::NoSender => {}
                EntryOutcome::Malformed(err) => {
                    warn!(
                        target: "ingest",
                        entry = %entry.name(),
                        error = %err,
                        "could not parse entry due to malformed data"
                    );
                }
                EntryOutcome::Failed(reason) => {
                    error!(
                        target: "ingest",
                        entry = %entry.name(),
                        error = %reason,
                        "unexpected error while processing entry; skipping"
                    );
                }
            }
        }

        let report = IngestionReport {
            running: false,
            ..self.metrics.snapshot_status()
        };
        drop(run);
        report
    }

    fn extract_entry<R: Read>(
        &self,
        entry: &mut ArchiveEntry<'_, R>,
    ) -> EntryOutcome {
        let extracted = panic::catch_unwind(AssertUnwindSafe(|| {
            self.extractor.extract(entry as &mut dyn Read)
        }));

        match extracted {
            Ok(Ok(Some(sender))) if !sender.trim().is_empty() => {
                EntryOutcome::Sender(sender)
            }
            Ok(Ok(_)) => EntryOutcome::NoSender,
            Ok(Err(err)) if err.is_malformed() => EntryOutcome::Malformed(err),
            Ok(Err(err)) => EntryOutcome::Failed(err.to_string()),
            Err(payload) => EntryOutcome::Failed(panic_message(&*payload)),
        }
    }
}

/// Owns the run slot; releasing it is tied to drop so every exit path
/// (end of archive, corruption, panic) goes through here once.
struct ClaimedRun {
    metrics: Arc<dyn MetricsRepository>,
}

impl Drop for ClaimedRun {
    fn drop(&mut self) {
        self.metrics.finish_run();
        let report = self.metrics.snapshot_status();
        info!(
            target: "ingest::summary",
            messages_processed = report.messages_processed,
            valid_sender_messages = report.valid_sender_messages,
            "finished archive processing"
        );
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("extractor panicked: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("extractor panicked: {msg}")
    } else {
        "extractor panicked".to_string()
    }
}
