//! Bulk / pseudo-transaction engine (§4.4.8, §4.6): chunk to ≤25, execute
//! as native transactions, roll back previously-successful chunks on a
//! deterministic cancellation, aggregate final state.

use std::time::Duration;

use gridstore_config::RetryPolicy;
use gridstore_core::op::{Operation, TransactionOperation};
use gridstore_core::Key;

use crate::error::{EngineError, EngineResult};
use crate::store::{Store, StoreError, TransactItem};
use crate::update_expr::{build_update_expression, AttributePatch};

/// §4.4.8 step 1: native `transactWrite` calls accept at most 25 items.
const MAX_TRANSACT_ITEMS: usize = 25;

/// §4.6: the bulk engine's state machine. `bulk` never exposes a live
/// instance of this while running; it's the vocabulary for the terminal
/// state implied by the returned [`EngineResult`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BulkState {
    Initial,
    Writing,
    Done,
    Rollback,
    RollbackDone,
    RollbackFailed,
}

impl BulkState {
    pub fn of(result: &EngineResult<()>) -> Self {
        match result {
            Ok(()) => BulkState::Done,
            Err(EngineError::BulkWriteTransactionError(_)) => BulkState::RollbackDone,
            Err(EngineError::BulkWriteRollbackError(_)) => BulkState::RollbackFailed,
            Err(_) => BulkState::Writing,
        }
    }
}

fn key_of(op: &Operation) -> Key {
    match op {
        Operation::Get(g) => g.key.clone(),
        Operation::Put(p) => p.key.clone(),
        Operation::UpdateRaw(u) => u.key.clone(),
        Operation::Delete(d) => d.key.clone(),
        Operation::Condition(c) => c.key.clone(),
    }
}

fn to_transact_item(op: &Operation) -> Option<TransactItem> {
    match op {
        Operation::Get(_) => None,
        Operation::Put(p) => Some(TransactItem::Put {
            key: p.key.clone(),
            item: p.item.clone(),
            condition: p.condition.clone(),
        }),
        Operation::UpdateRaw(u) => {
            let patch: AttributePatch = u
                .patch
                .iter()
                .map(|(k, v)| (k.clone(), Some(v.clone())))
                .collect();
            Some(TransactItem::Update {
                key: u.key.clone(),
                update: build_update_expression(patch),
                condition: u.condition.clone(),
            })
        }
        Operation::Delete(d) => Some(TransactItem::Delete {
            key: d.key.clone(),
            condition: d.condition.clone(),
        }),
        Operation::Condition(c) => Some(TransactItem::ConditionCheck {
            key: c.key.clone(),
            condition: c.condition.clone(),
        }),
    }
}

async fn transact_write_with_retry(
    store: &dyn Store,
    table: &str,
    items: Vec<TransactItem>,
    policy: &RetryPolicy,
) -> Result<(), StoreError> {
    gridstore_common::retry::retry_fixed_delay(
        policy.max_attempts,
        Duration::from_millis(policy.delay_ms),
        StoreError::is_retryable,
        || {
            let store = store;
            let table = table;
            let items = items.clone();
            async move { store.transact_write(table, items).await }
        },
    )
    .await
}

/// Runs `operations` as one logical bulk transaction against `table`
/// (§4.4.8), using the spec's fixed 50ms x 3 retry policy. See
/// [`bulk_with_policy`] for a caller-supplied policy (tests shrink the
/// delay to keep the suite fast).
pub async fn bulk(
    store: &dyn Store,
    table: &str,
    operations: Vec<TransactionOperation>,
) -> EngineResult<()> {
    bulk_with_policy(store, table, operations, &RetryPolicy::default()).await
}

/// Runs `operations` as one logical bulk transaction against `table`
/// (§4.4.8). The happy path issues one `transactWrite` per chunk of ≤25;
/// on a deterministic cancellation after at least one chunk has already
/// committed, previously-successful chunks are rolled back in reverse
/// using each operation's paired `rollback` (§4.6).
pub async fn bulk_with_policy(
    store: &dyn Store,
    table: &str,
    operations: Vec<TransactionOperation>,
    policy: &RetryPolicy,
) -> EngineResult<()> {
    // INITIAL -> WRITING happens on the first chunk dispatched below.
    let chunks: Vec<&[TransactionOperation]> = operations.chunks(MAX_TRANSACT_ITEMS).collect();
    let mut committed: Vec<&[TransactionOperation]> = Vec::new();

    for chunk in &chunks {
        let items: Vec<TransactItem> = chunk.iter().filter_map(|op| to_transact_item(&op.action)).collect();

        match transact_write_with_retry(store, table, items, policy).await {
            Ok(()) => {
                committed.push(chunk);
            }
            Err(StoreError::TransactionCancelled) => {
                if committed.is_empty() {
                    // §4.6 step 6: first chunk failed, nothing to roll back.
                    return Err(EngineError::BulkWriteTransactionError(
                        "transaction cancelled on the first chunk".into(),
                    ));
                }
                // WRITING -> ROLLBACK
                return run_rollback(store, table, &committed, policy).await;
            }
            Err(err) => {
                return Err(EngineError::Other(format!(
                    "transactWrite failed after retries: {err}"
                )));
            }
        }
    }

    // WRITING -> DONE
    Ok(())
}

async fn run_rollback(
    store: &dyn Store,
    table: &str,
    committed: &[&[TransactionOperation]],
    policy: &RetryPolicy,
) -> EngineResult<()> {
    let mut still_pending: Vec<&TransactionOperation> = Vec::new();

    for chunk in committed.iter().rev() {
        let rollback_items: Vec<TransactItem> = chunk
            .iter()
            .filter_map(|op| op.rollback.as_ref().and_then(to_transact_item))
            .collect();
        if rollback_items.is_empty() {
            continue;
        }

        match transact_write_with_retry(store, table, rollback_items, policy).await {
            Ok(()) => {}
            Err(_) => {
                still_pending.extend(chunk.iter().filter(|op| op.rollback.is_some()));
            }
        }
    }

    if still_pending.is_empty() {
        Err(EngineError::BulkWriteTransactionError(
            "transaction cancelled, all prior chunks rolled back".into(),
        ))
    } else {
        let keys: Vec<String> = still_pending.iter().map(|op| key_of(&op.action).to_string()).collect();
        Err(EngineError::BulkWriteRollbackError(keys))
    }
}
