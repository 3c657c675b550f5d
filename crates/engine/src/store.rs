//! The store protocol (§6): every primitive a concrete backend must
//! provide. Mirrors the shape of the teacher's `L1DataStore`/`L1DataProvider`
//! split, collapsed into one trait since here the same backend always
//! serves both reads and writes.

use async_trait::async_trait;
use gridstore_core::op::Expr;
use gridstore_core::{Key, RawObject};

use crate::update_expr::UpdateExpr;

/// Transport-level failure. Distinguishes the two cases the bulk engine
/// and single-operation paths care about: a deterministic condition
/// failure (never worth retrying) versus everything else (retried by the
/// caller per §4.4.8/§5).
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("conditional check failed")]
    ConditionalCheckFailed,

    #[error("transaction cancelled")]
    TransactionCancelled,

    #[error("transport error: {0}")]
    Transport(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Transport(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Clone, Debug, Default)]
pub struct BatchGetResult {
    pub items: Vec<RawObject>,
    pub unprocessed: Vec<Key>,
}

#[derive(Clone, Debug, Default)]
pub struct BatchWriteResult {
    pub unprocessed: Vec<RawObject>,
}

#[derive(Clone, Debug, Default)]
pub struct QueryParams {
    pub index: Option<u8>,
    pub pk: String,
    pub sk_prefix: Option<String>,
    pub start_key: Option<Key>,
    pub limit: Option<usize>,
    pub forward: bool,
}

#[derive(Clone, Debug, Default)]
pub struct QueryResult {
    pub items: Vec<RawObject>,
    pub last_evaluated_key: Option<Key>,
}

/// One item of a native `transactWrite` call (§6). `ConditionCheck` asserts
/// without writing.
#[derive(Clone, Debug)]
pub enum TransactItem {
    Put { key: Key, item: RawObject, condition: Option<Expr> },
    Update { key: Key, update: UpdateExpr, condition: Option<Expr> },
    Delete { key: Key, condition: Option<Expr> },
    ConditionCheck { key: Key, condition: Expr },
}

/// Everything a concrete backend must implement (§6). The engine never
/// talks to a transport directly outside of this trait, so swapping
/// backends (a real wide-column store vs. [`crate::sandbox::SandboxStore`])
/// never touches client/bulk/pagination code.
#[async_trait]
pub trait Store: Send + Sync {
    async fn put(
        &self,
        table: &str,
        key: &Key,
        item: RawObject,
        condition: Option<Expr>,
    ) -> StoreResult<()>;

    async fn get(&self, table: &str, key: &Key, consistent: bool) -> StoreResult<Option<RawObject>>;

    async fn delete(&self, table: &str, key: &Key, condition: Option<Expr>) -> StoreResult<()>;

    async fn update(
        &self,
        table: &str,
        key: &Key,
        update: UpdateExpr,
        condition: Option<Expr>,
    ) -> StoreResult<RawObject>;

    async fn batch_get(
        &self,
        table: &str,
        keys: Vec<Key>,
        consistent: bool,
    ) -> StoreResult<BatchGetResult>;

    /// Used only by [`crate::sandbox::SandboxStore`] (§6).
    async fn batch_write(&self, table: &str, puts: Vec<RawObject>) -> StoreResult<BatchWriteResult>;

    async fn query(&self, table: &str, params: QueryParams) -> StoreResult<QueryResult>;

    /// Used only by the sandbox and snapshot tooling (§6).
    async fn scan(&self, table: &str, start_key: Option<Key>) -> StoreResult<QueryResult>;

    async fn transact_write(&self, table: &str, items: Vec<TransactItem>) -> StoreResult<()>;
}
