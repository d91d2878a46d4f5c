//! # Mailtally Core
//!
//! Core library for mailtally: ingest a gzip-compressed tar archive of email
//! files, pull a sender identifier out of every message, and keep running
//! aggregate statistics that can be queried while the ingestion is in flight.
//!
//! ## Overview
//!
//! - **Metrics**: [`metrics::InMemoryMetrics`] holds the run flag, the
//!   processed/valid counters and the per-sender tally behind the
//!   [`metrics::MetricsRepository`] port
//! - **Archive streaming**: [`archive::ArchiveStreamReader`] decompresses and
//!   unpacks the archive incrementally, yielding regular-file entries only
//! - **Sender extraction**: [`extract::SenderExtractor`] is the narrow port the
//!   pipeline consumes; [`extract::HeaderSenderExtractor`] is the default
//! - **Ingestion**: [`ingest::IngestionCoordinator`] claims the single run slot
//!   and drives one archive through the pipeline on a blocking worker
//! - **Reporting**: [`report::ReportingFacade`] projects metrics snapshots into
//!   the status and top-senders report shapes
//!
//! ## Feature Flags
//!
//! - `test-support`: archive and message builders for tests
//!
//! ## Examples
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use mailtally_core::{
//!     extract::HeaderSenderExtractor,
//!     ingest::IngestionCoordinator,
//!     metrics::{InMemoryMetrics, MetricsRepository},
//!     report::ReportingFacade,
//! };
//!
//! fn run(path: &std::path::Path) -> Result<(), Box<dyn std::error::Error>> {
//!     let metrics: Arc<dyn MetricsRepository> = Arc::new(InMemoryMetrics::new());
//!     let coordinator = IngestionCoordinator::new(
//!         Arc::clone(&metrics),
//!         Arc::new(HeaderSenderExtractor::default()),
//!     );
//!     let reporting = ReportingFacade::new(metrics);
//!
//!     let report = coordinator.run_blocking(std::fs::File::open(path)?)?;
//!     assert!(!report.running);
//!     for sender in reporting.top_senders(10)? {
//!         println!("{} {}", sender.sender, sender.count);
//!     }
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod metrics;
pub mod report;
pub mod types;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use error::{
    ExtractError, IngestionError, ReportError, Result, StreamCorruptError,
};
pub use types::{IngestionReport, SenderMetrics};
