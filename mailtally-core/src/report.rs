use std::{num::NonZeroUsize, sync::Arc};

use crate::{
    error::ReportError,
    metrics::MetricsRepository,
    types::{IngestionReport, SenderMetrics},
};

pub const DEFAULT_TOP_SENDERS: usize = 10;

/// Read-only view over the metrics store for status queries.
///
/// Never waits on the ingestion worker; every call is a snapshot.
#[derive(Clone, Debug)]
pub struct ReportingFacade {
    metrics: Arc<dyn MetricsRepository>,
    default_limit: NonZeroUsize,
}

impl ReportingFacade {
    pub fn new(metrics: Arc<dyn MetricsRepository>) -> Self {
        Self {
            metrics,
            default_limit: NonZeroUsize::new(DEFAULT_TOP_SENDERS)
                .unwrap_or(NonZeroUsize::MIN),
        }
    }

    pub fn with_default_limit(mut self, limit: NonZeroUsize) -> Self {
        self.default_limit = limit;
        self
    }

    pub fn default_limit(&self) -> usize {
        self.default_limit.get()
    }

    pub fn status(&self) -> IngestionReport {
        self.metrics.snapshot_status()
    }

    pub fn top_senders(
        &self,
        limit: usize,
    ) -> Result<Vec<SenderMetrics>, ReportError> {
        if limit == 0 {
            return Err(ReportError::InvalidLimit);
        }
        Ok(self.metrics.snapshot_top_senders(limit))
    }

    pub fn default_top_senders(&self) -> Vec<SenderMetrics> {
        self.metrics.snapshot_top_senders(self.default_limit.get())
    }
}
