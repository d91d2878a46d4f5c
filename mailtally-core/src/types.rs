use serde::{Deserialize, Serialize};

/// Point-in-time view of the current (or last) ingestion run.
///
/// Each field is read independently; the only cross-field guarantee is
/// `valid_sender_messages <= messages_processed`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct IngestionReport {
    #[serde(rename = "ingestionRunning")]
    pub running: bool,
    /// Regular-file archive entries attempted so far.
    pub messages_processed: u64,
    /// Entries that yielded a non-empty sender.
    pub valid_sender_messages: u64,
}

impl IngestionReport {
    /// Entries counted as processed that did not produce a sender.
    pub fn skipped_messages(&self) -> u64 {
        self.messages_processed
            .saturating_sub(self.valid_sender_messages)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderMetrics {
    #[serde(rename = "email")]
    pub sender: String,
    pub count: u64,
}

impl SenderMetrics {
    pub fn new(sender: impl Into<String>, count: u64) -> Self {
        Self {
            sender: sender.into(),
            count,
        }
    }
}
