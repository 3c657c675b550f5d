use gridstore_core::ValidationError;
use thiserror::Error;

/// Errors surfaced by the storage client (§7). Named to match the spec's
/// taxonomy directly rather than collapsing related-but-distinct failure
/// modes (e.g. `KeyExists` vs. a caller-supplied condition failing) into
/// one variant, since callers are expected to match on these.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("item not found: {0}")]
    NotFound(String),

    /// §4.4.1: the default `attribute_not_exists(PK)` precondition failed
    /// on `put` — a row already exists at this key.
    #[error("item already exists: {0}")]
    KeyExists(String),

    /// §7: a caller-supplied condition expression failed, distinct from
    /// [`EngineError::KeyExists`] and the default-precondition case that
    /// surfaces as [`EngineError::NotFound`] on `update_raw`.
    #[error("conditional check failed for {0}")]
    ConditionalCheckFailed(String),

    /// §4.4.4: `update` observed a `_docVersion` different from the one it
    /// read, meaning a concurrent writer won the race.
    #[error("race condition updating {0}: stored _docVersion has moved")]
    RaceCondition(String),

    #[error("validation: {0}")]
    Validation(#[from] ValidationError),

    /// §4.4.7: invalid pagination arguments, or a cursor that failed to
    /// decode.
    #[error("pagination error: {0}")]
    Pagination(String),

    /// §4.6: a bulk transaction was cancelled. Rollback either wasn't
    /// needed (first chunk failed) or ran to completion.
    #[error("bulk write transaction failed: {0}")]
    BulkWriteTransactionError(String),

    /// §4.6: a bulk transaction was cancelled and at least one rollback
    /// action itself failed. Carries the operations still requiring
    /// compensation so the caller can reconcile manually.
    #[error("bulk write rollback failed, {} operation(s) still need compensation: {}", .0.len(), .0.join(", "))]
    BulkWriteRollbackError(Vec<String>),

    /// §4.4.9 / §9: a recursive batch-get re-request returned zero new
    /// items while keys were still unprocessed. Preserved from the source
    /// as a fatal condition even though sustained throttling could in
    /// principle trigger it legitimately.
    #[error("batchGet made no progress with {0} key(s) still unprocessed")]
    BatchGetStalled(usize),

    /// Transport-level failure surfaced after retry exhaustion, or any
    /// other condition the engine itself doesn't distinguish.
    #[error("{0}")]
    Other(String),
}

impl EngineError {
    pub fn invalid_cursor() -> Self {
        Self::Pagination("Couldn't decode cursor".into())
    }
}

impl From<anyhow::Error> for EngineError {
    fn from(value: anyhow::Error) -> Self {
        Self::Other(value.to_string())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
