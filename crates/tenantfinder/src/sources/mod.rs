pub mod aad;

use crate::session::Session;
use crate::stats::{Statistics, StatsCounter};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Buffer between a source task and the agent's forwarder.
pub const SOURCE_CHANNEL_CAPACITY: usize = 64;

// region:        --- Results

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultKind {
    Domain(String),
    Error(String),
}

/// One item of a source's stream, tagged with the source that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceResult {
    pub source: String,
    pub kind: ResultKind,
}

impl SourceResult {
    pub fn domain(source: &str, value: impl Into<String>) -> Self {
        Self {
            source: source.to_string(),
            kind: ResultKind::Domain(value.into()),
        }
    }

    pub fn error(source: &str, message: impl Into<String>) -> Self {
        Self {
            source: source.to_string(),
            kind: ResultKind::Error(message.into()),
        }
    }
}

// endregion:     --- Results

// region:        --- Source contract

pub trait Source: Send + Sync {
    /// Stable lowercase identifier, used as registry key and in outputs.
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn needs_key(&self) -> bool;

    /// Whether the source takes part when no explicit selection is made.
    fn is_default(&self) -> bool;

    /// Starts querying `domain` right away and returns the receiving end of
    /// the results.
    ///
    /// Implementations stop issuing requests once `cancel` fires, and end when
    /// the receiver is dropped. The statistics must be final before the
    /// sending half is dropped.
    fn run(
        self: Arc<Self>,
        cancel: CancellationToken,
        domain: String,
        session: Arc<Session>,
    ) -> mpsc::Receiver<SourceResult>;

    fn statistics(&self) -> Statistics;
}

/// Sends `result` and counts it on success. Returns `false` once the consumer
/// is gone.
pub(crate) async fn emit(
    tx: &mpsc::Sender<SourceResult>,
    stats: &StatsCounter,
    result: SourceResult,
) -> bool {
    let is_error = matches!(result.kind, ResultKind::Error(_));
    if tx.send(result).await.is_err() {
        return false;
    }
    if is_error {
        stats.add_error();
    } else {
        stats.add_result();
    }
    true
}

// endregion:     --- Source contract
