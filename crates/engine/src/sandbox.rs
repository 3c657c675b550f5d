//! In-memory [`Store`] for tests, grounded directly on the teacher's
//! `StubL2Db`: a `parking_lot::Mutex`-guarded map standing in for the real
//! backend. Not spec-compliant beyond what the engine's own tests need —
//! consistent reads, condition checks, and the primary index only; GSI
//! queries are linear scans, which is fine at test scale.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use gridstore_core::op::Expr;
use gridstore_core::{Key, RawObject};

use crate::store::{
    BatchGetResult, BatchWriteResult, QueryParams, QueryResult, Store, StoreError, StoreResult,
    TransactItem,
};
use crate::update_expr::UpdateExpr;

fn item_key(raw: &RawObject) -> Option<(String, String)> {
    let pk = raw.get("PK")?.as_str()?.to_string();
    let sk = raw.get("SK")?.as_str()?.to_string();
    Some((pk, sk))
}

fn check_condition(item: Option<&RawObject>, condition: &Expr) -> bool {
    match condition {
        Expr::AttributeExists { attribute } => item.is_some_and(|i| i.contains_key(attribute)),
        Expr::AttributeNotExists { attribute } => item.map_or(true, |i| !i.contains_key(attribute)),
        Expr::AttributeEquals { attribute, value } => {
            item.and_then(|i| i.get(attribute)).map(|v| v == value).unwrap_or(false)
        }
        Expr::Or(a, b) => check_condition(item, a) || check_condition(item, b),
    }
}

/// Default in-process backend. One instance serves one logical table; the
/// `table` argument every [`Store`] method takes is validated but
/// otherwise ignored, matching a sandbox meant for single-table tests.
pub struct SandboxStore {
    items: Mutex<HashMap<(String, String), RawObject>>,
}

impl Default for SandboxStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SandboxStore {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(HashMap::new()),
        }
    }

    fn apply_write(
        &self,
        key: &Key,
        item: RawObject,
        condition: Option<&Expr>,
    ) -> StoreResult<()> {
        let mut tbl = self.items.lock();
        let existing = tbl.get(&(key.pk.clone(), key.sk.clone()));
        if let Some(cond) = condition {
            if !check_condition(existing, cond) {
                return Err(StoreError::ConditionalCheckFailed);
            }
        }
        tbl.insert((key.pk.clone(), key.sk.clone()), item);
        Ok(())
    }

    fn apply_delete(&self, key: &Key, condition: Option<&Expr>) -> StoreResult<()> {
        let mut tbl = self.items.lock();
        let existing = tbl.get(&(key.pk.clone(), key.sk.clone()));
        if let Some(cond) = condition {
            if !check_condition(existing, cond) {
                return Err(StoreError::ConditionalCheckFailed);
            }
        }
        tbl.remove(&(key.pk.clone(), key.sk.clone()));
        Ok(())
    }

    fn apply_update(
        &self,
        key: &Key,
        update: &UpdateExpr,
        condition: Option<&Expr>,
    ) -> StoreResult<RawObject> {
        let mut tbl = self.items.lock();
        let existing = tbl.get(&(key.pk.clone(), key.sk.clone())).cloned();
        if let Some(cond) = condition {
            if !check_condition(existing.as_ref(), cond) {
                return Err(StoreError::ConditionalCheckFailed);
            }
        }
        let mut item = existing.ok_or_else(|| {
            StoreError::Transport("updateRaw on absent item".to_string())
        })?;
        for (attr, value) in &update.set {
            item.insert(attr.clone(), value.clone());
        }
        for attr in &update.remove {
            item.remove(attr);
        }
        tbl.insert((key.pk.clone(), key.sk.clone()), item.clone());
        Ok(item)
    }
}

#[async_trait]
impl Store for SandboxStore {
    async fn put(
        &self,
        _table: &str,
        key: &Key,
        item: RawObject,
        condition: Option<Expr>,
    ) -> StoreResult<()> {
        self.apply_write(key, item, condition.as_ref())
    }

    async fn get(&self, _table: &str, key: &Key, _consistent: bool) -> StoreResult<Option<RawObject>> {
        Ok(self.items.lock().get(&(key.pk.clone(), key.sk.clone())).cloned())
    }

    async fn delete(&self, _table: &str, key: &Key, condition: Option<Expr>) -> StoreResult<()> {
        self.apply_delete(key, condition.as_ref())
    }

    async fn update(
        &self,
        _table: &str,
        key: &Key,
        update: UpdateExpr,
        condition: Option<Expr>,
    ) -> StoreResult<RawObject> {
        self.apply_update(key, &update, condition.as_ref())
    }

    async fn batch_get(
        &self,
        _table: &str,
        keys: Vec<Key>,
        _consistent: bool,
    ) -> StoreResult<BatchGetResult> {
        let tbl = self.items.lock();
        let items = keys
            .iter()
            .filter_map(|k| tbl.get(&(k.pk.clone(), k.sk.clone())).cloned())
            .collect();
        Ok(BatchGetResult {
            items,
            unprocessed: Vec::new(),
        })
    }

    async fn batch_write(&self, _table: &str, puts: Vec<RawObject>) -> StoreResult<BatchWriteResult> {
        let mut tbl = self.items.lock();
        for item in puts {
            if let Some(key) = item_key(&item) {
                tbl.insert(key, item);
            }
        }
        Ok(BatchWriteResult::default())
    }

    async fn query(&self, _table: &str, params: QueryParams) -> StoreResult<QueryResult> {
        let tbl = self.items.lock();
        let pk_attr = match params.index {
            Some(n) => format!("GSI{n}PK"),
            None => "PK".to_string(),
        };
        let sk_attr = match params.index {
            Some(n) => format!("GSI{n}SK"),
            None => "SK".to_string(),
        };

        let mut matched: Vec<RawObject> = tbl
            .values()
            .filter(|item| {
                item.get(&pk_attr).and_then(|v| v.as_str()) == Some(params.pk.as_str())
                    && !item.contains_key("dynamotorLegacy")
            })
            .cloned()
            .collect();

        matched.sort_by(|a, b| {
            let sa = a.get(&sk_attr).and_then(|v| v.as_str()).unwrap_or_default();
            let sb = b.get(&sk_attr).and_then(|v| v.as_str()).unwrap_or_default();
            sa.cmp(sb)
        });
        if !params.forward {
            matched.reverse();
        }

        if let Some(prefix) = &params.sk_prefix {
            matched.retain(|item| {
                item.get(&sk_attr)
                    .and_then(|v| v.as_str())
                    .is_some_and(|sk| sk.starts_with(prefix))
            });
        }

        if let Some(start) = &params.start_key {
            let pos = matched.iter().position(|item| {
                item.get("PK").and_then(|v| v.as_str()) == Some(start.pk.as_str())
                    && item.get("SK").and_then(|v| v.as_str()) == Some(start.sk.as_str())
            });
            if let Some(pos) = pos {
                matched = matched.split_off(pos + 1);
            }
        }

        let limit = params.limit.unwrap_or(matched.len());
        let last_evaluated_key = if matched.len() > limit {
            matched.get(limit - 1).and_then(item_key).map(|(pk, sk)| Key::new(pk, sk))
        } else {
            None
        };
        matched.truncate(limit);

        Ok(QueryResult {
            items: matched,
            last_evaluated_key,
        })
    }

    async fn scan(&self, _table: &str, start_key: Option<Key>) -> StoreResult<QueryResult> {
        let tbl = self.items.lock();
        let mut items: Vec<_> = tbl.values().cloned().collect();
        items.sort_by(|a, b| {
            let ka = item_key(a).unwrap_or_default();
            let kb = item_key(b).unwrap_or_default();
            ka.cmp(&kb)
        });
        if let Some(start) = start_key {
            let pos = items
                .iter()
                .position(|i| item_key(i) == Some((start.pk.clone(), start.sk.clone())));
            if let Some(pos) = pos {
                items = items.split_off(pos + 1);
            }
        }
        Ok(QueryResult {
            items,
            last_evaluated_key: None,
        })
    }

    async fn transact_write(&self, _table: &str, items: Vec<TransactItem>) -> StoreResult<()> {
        let mut tbl = self.items.lock();
        for item in &items {
            let (key, condition) = match item {
                TransactItem::Put { key, condition, .. } => (key, condition.as_ref()),
                TransactItem::Update { key, condition, .. } => (key, condition.as_ref()),
                TransactItem::Delete { key, condition } => (key, condition.as_ref()),
                TransactItem::ConditionCheck { key, condition } => (key, Some(condition)),
            };
            let existing = tbl.get(&(key.pk.clone(), key.sk.clone()));
            if let Some(cond) = condition {
                if !check_condition(existing, cond) {
                    return Err(StoreError::TransactionCancelled);
                }
            }
        }

        for item in items {
            match item {
                TransactItem::Put { key, item, .. } => {
                    tbl.insert((key.pk, key.sk), item);
                }
                TransactItem::Update { key, update, .. } => {
                    let mut current = tbl.remove(&(key.pk.clone(), key.sk.clone())).unwrap_or_default();
                    for (attr, value) in update.set {
                        current.insert(attr, value);
                    }
                    for attr in update.remove {
                        current.remove(&attr);
                    }
                    tbl.insert((key.pk, key.sk), current);
                }
                TransactItem::Delete { key, .. } => {
                    tbl.remove(&(key.pk, key.sk));
                }
                TransactItem::ConditionCheck { .. } => {}
            }
        }
        Ok(())
    }
}
