//! The storage client (§4.4): the component callers actually hold. Ties
//! together [`crate::store::Store`], the [`crate::coalescer::GetCoalescer`],
//! the bulk engine, and pagination behind typed, per-model methods.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use gridstore_config::{CursorEncryptionConfig, EngineConfig, RetryPolicy};
use gridstore_core::key::KeyDerivation;
use gridstore_core::model::{Instance, Model, ModelDef};
use gridstore_core::op::{
    ConditionOp, DeleteOp, Expr, GetOp, Operation, PutOp, TransactionOperation, UpdateRawOp,
};
use gridstore_core::raw::prefix_keys;
use gridstore_core::union::{AnyInstance, Decoder};
use gridstore_core::{Key, RawObject};

use crate::bulk;
use crate::coalescer::GetCoalescer;
use crate::error::{EngineError, EngineResult};
use crate::store::{QueryParams, Store};
use crate::update_expr::{build_update_expression, AttributePatch};

const DOC_VERSION_ATTR: &str = "_docVersion";
const DELETED_AT_ATTR: &str = "_deletedAt";
const SOFT_DELETE_PREFIX: &str = "$$DELETED$$";
const SOFT_DELETE_KEY_ATTRS: &[&str] = &["PK", "SK", "GSI1PK", "GSI1SK", "GSI2PK", "GSI2SK", "GSI3PK", "GSI3SK", "GSI4PK", "GSI4SK", "GSI5PK", "GSI5SK"];

#[derive(Clone, Debug, Default)]
pub struct PutOptions {
    pub ignore_existence: bool,
    pub condition: Option<Expr>,
}

/// One client per logical table (§5: "one `Client` owns one transport
/// handle and one coalescer"). Cheap to clone — everything inside is
/// already `Arc`'d or `Copy`.
#[derive(Clone)]
pub struct Client {
    store: Arc<dyn Store>,
    table: String,
    coalescer: Arc<GetCoalescer>,
    cursor_encryption_key: Option<[u8; 32]>,
    retry_policy: RetryPolicy,
}

impl Client {
    pub fn new(store: Arc<dyn Store>, table: impl Into<String>) -> Self {
        let table = table.into();
        let coalescer = Arc::new(GetCoalescer::new(Arc::clone(&store), table.clone()));
        Self {
            store,
            table,
            coalescer,
            cursor_encryption_key: None,
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Builds a client from a loaded [`EngineConfig`] (§6): table name,
    /// cursor encryption key (hex-encoded inline or loaded from a file),
    /// and bulk-engine retry policy all come from the same config the
    /// process boundary deserializes at startup.
    pub fn from_config(store: Arc<dyn Store>, config: &EngineConfig) -> EngineResult<Self> {
        let mut client = Self::new(store, config.table_name.clone()).with_retry_policy(config.retry.clone());
        if let Some(key) = resolve_cursor_encryption_key(config.cursor_encryption.as_ref())? {
            client = client.with_cursor_encryption_key(key);
        }
        Ok(client)
    }

    pub fn with_cursor_encryption_key(mut self, key: [u8; 32]) -> Self {
        self.cursor_encryption_key = Some(key);
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    fn now_iso8601() -> String {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        // No chrono in this crate's dependency set; a Unix-epoch-seconds
        // stamp is sufficient for the `_deletedAt` marker's purpose
        // (ordering and audit, never parsed back by the engine itself).
        format!("{secs}")
    }

    fn encode_for_storage<M: ModelDef>(instance: &Instance<M>, doc_version: u64) -> RawObject {
        let mut raw = Model::<M>::encode(instance.value());
        raw.insert("PK".into(), instance.pk().into());
        raw.insert("SK".into(), instance.sk().into());
        for idx in 1..=5u8 {
            if let Some(gsi) = instance.gsi(idx) {
                raw.insert(format!("GSI{idx}PK"), gsi.pk.into());
                raw.insert(format!("GSI{idx}SK"), gsi.sk.into());
            }
        }
        raw.insert(DOC_VERSION_ATTR.into(), doc_version.into());
        raw
    }

    fn decode_stored<M: ModelDef>(raw: &RawObject) -> EngineResult<Instance<M>> {
        Model::<M>::decode(raw).map_err(EngineError::from)
    }

    /// §4.4.1: `put` with the default `attribute_not_exists(PK)`
    /// precondition, or a caller-supplied replacement.
    pub async fn put<M: ModelDef>(
        &self,
        instance: Instance<M>,
        opts: PutOptions,
    ) -> EngineResult<Instance<M>> {
        let key = instance.key();
        let raw = Self::encode_for_storage(&instance, 0);

        let caller_supplied = opts.condition.is_some();
        let condition = if opts.ignore_existence {
            None
        } else {
            Some(opts.condition.unwrap_or(Expr::AttributeNotExists { attribute: "PK".into() }))
        };

        self.store
            .put(&self.table, &key, raw, condition)
            .await
            .map_err(|e| match e {
                // §4.4.1: the default precondition's failure is KeyExists;
                // a caller-supplied condition's failure is not. Anything
                // else (transport, etc.) propagates as-is.
                crate::store::StoreError::ConditionalCheckFailed if caller_supplied => {
                    EngineError::ConditionalCheckFailed(key.to_string())
                }
                crate::store::StoreError::ConditionalCheckFailed => {
                    EngineError::KeyExists(key.to_string())
                }
                other => EngineError::Other(other.to_string()),
            })?;

        Ok(Instance::with_doc_version(instance.into_value(), 0))
    }

    /// §4.4.2: unconditional get, failing if the row is absent.
    pub async fn get<M: ModelDef>(&self, key: Key) -> EngineResult<Instance<M>> {
        let raw = self
            .store
            .get(&self.table, &key, false)
            .await
            .map_err(|e| EngineError::Other(e.to_string()))?
            .ok_or_else(|| EngineError::NotFound(key.to_string()))?;
        Self::decode_stored(&raw)
    }

    /// §4.4.2: coalesced get. `null` mirrors the source's `{null: true}`
    /// option — resolve to `None` instead of [`EngineError::NotFound`].
    pub async fn load<M: ModelDef>(&self, key: Key, null: bool) -> EngineResult<Option<Instance<M>>> {
        let raw = self
            .coalescer
            .load(key.clone(), false)
            .await
            .map_err(|e| EngineError::Other(e.to_string()))?;

        match raw {
            Some(raw) => Self::decode_stored(&raw).map(Some),
            None if null => Ok(None),
            None => Err(EngineError::NotFound(key.to_string())),
        }
    }

    /// §4.4.2: batch of `load`s; individual entries may be errors.
    pub async fn load_many<M: ModelDef>(
        &self,
        keys: Vec<Key>,
    ) -> Vec<EngineResult<Option<Instance<M>>>> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            out.push(self.load::<M>(key, true).await);
        }
        out
    }

    /// §4.4.3: raw attribute patch, scoped by `attribute_exists(PK)`
    /// unless the caller replaces the condition. Does not recompute
    /// derived key attributes — see DESIGN.md's Open Question decisions.
    pub async fn update_raw<M: ModelDef>(
        &self,
        key: Key,
        patch: AttributePatch,
        condition: Option<Expr>,
    ) -> EngineResult<Instance<M>> {
        let caller_supplied = condition.is_some();
        let condition = condition.unwrap_or(Expr::AttributeExists { attribute: "PK".into() });
        let update = build_update_expression(patch);

        let raw = self
            .store
            .update(&self.table, &key, update, Some(condition))
            .await
            .map_err(|e| match e {
                // §4.4.3: a caller-supplied condition's failure is a
                // ConditionalCheckFailedError; the default precondition's
                // failure means the row is simply absent.
                crate::store::StoreError::ConditionalCheckFailed if caller_supplied => {
                    EngineError::ConditionalCheckFailed(key.to_string())
                }
                crate::store::StoreError::ConditionalCheckFailed => {
                    EngineError::NotFound(key.to_string())
                }
                other => EngineError::Other(other.to_string()),
            })?;
        Self::decode_stored(&raw)
    }

    /// §4.4.4: in-place (or, if the key changed, two-step bulk) update,
    /// via optimistic concurrency on `_docVersion`.
    pub async fn update<M: ModelDef>(
        &self,
        item: &Instance<M>,
        next_value: M::Value,
    ) -> EngineResult<Instance<M>> {
        let prev_version = item.doc_version().unwrap_or(0);
        let next_version = prev_version + 1;
        let old_key = item.key();
        let new_key = Key::new(next_value.pk(), next_value.sk());

        let updated = Instance::<M>::with_doc_version(next_value, next_version);
        let raw = Self::encode_for_storage(&updated, next_version);

        if new_key == old_key {
            // §4.4.4 step 2: `attribute_not_exists(_docVersion) OR
            // _docVersion = :v`, so a pre-image that never round-tripped
            // through storage (no stamped _docVersion yet) still qualifies.
            let condition = Expr::Or(
                Box::new(Expr::AttributeNotExists { attribute: DOC_VERSION_ATTR.into() }),
                Box::new(Expr::AttributeEquals {
                    attribute: DOC_VERSION_ATTR.into(),
                    value: prev_version.into(),
                }),
            );
            self.store
                .put(&self.table, &old_key, raw, Some(condition))
                .await
                .map_err(|e| match e {
                    crate::store::StoreError::ConditionalCheckFailed => {
                        EngineError::RaceCondition(old_key.to_string())
                    }
                    other => EngineError::Other(other.to_string()),
                })?;
            return Ok(updated);
        }

        let ops = vec![
            TransactionOperation::with_rollback(
                Operation::Put(PutOp {
                    tag: M::TAG,
                    key: new_key.clone(),
                    item: raw,
                    condition: Some(Expr::AttributeNotExists { attribute: "PK".into() }),
                }),
                Operation::Delete(DeleteOp {
                    tag: M::TAG,
                    key: new_key.clone(),
                    condition: None,
                }),
            ),
            TransactionOperation::with_rollback(
                Operation::Delete(DeleteOp {
                    tag: M::TAG,
                    key: old_key.clone(),
                    condition: None,
                }),
                Operation::Put(PutOp {
                    tag: M::TAG,
                    key: old_key.clone(),
                    item: Self::encode_for_storage(item, prev_version),
                    condition: None,
                }),
            ),
        ];
        bulk::bulk_with_policy(self.store.as_ref(), &self.table, ops, &self.retry_policy).await?;
        Ok(updated)
    }

    /// §4.4.5: unconditional delete.
    pub async fn delete(&self, key: Key) -> EngineResult<()> {
        self.store
            .delete(&self.table, &key, None)
            .await
            .map_err(|e| EngineError::Other(e.to_string()))
    }

    /// §4.4.5, §4.5: delete the original row, write the same encoded item
    /// back with every index attribute prefixed `$$DELETED$$` plus
    /// `_deletedAt`.
    pub async fn soft_delete<M: ModelDef>(&self, item: Instance<M>) -> EngineResult<Instance<M>> {
        let key = item.key();
        let version = item.doc_version().unwrap_or(0);
        let mut encoded = Self::encode_for_storage(&item, version);
        encoded = prefix_keys(&encoded, SOFT_DELETE_KEY_ATTRS, SOFT_DELETE_PREFIX);
        encoded.insert(DELETED_AT_ATTR.into(), Self::now_iso8601().into());

        let deleted_pk = format!("{SOFT_DELETE_PREFIX}{}", key.pk);
        let deleted_sk = format!("{SOFT_DELETE_PREFIX}{}", key.sk);
        let deleted_key = Key::new(deleted_pk, deleted_sk);

        let ops = vec![
            // Conditioned on the row still existing so a second `soft_delete`
            // of the same item fails the transaction (§8 property 3) rather
            // than silently succeeding against an absent row.
            TransactionOperation::new(Operation::Delete(DeleteOp {
                tag: M::TAG,
                key: key.clone(),
                condition: Some(Expr::AttributeExists { attribute: "PK".into() }),
            })),
            TransactionOperation::new(Operation::Put(PutOp {
                tag: M::TAG,
                key: deleted_key,
                item: encoded,
                condition: None,
            })),
        ];
        bulk::bulk_with_policy(self.store.as_ref(), &self.table, ops, &self.retry_policy).await?;
        Ok(item)
    }

    /// §4.4.6: scoped query, decoded into named buckets via `decoders`. Rows
    /// matching none of the given decoders land in `unknown`.
    pub async fn query(
        &self,
        pk: &str,
        index: Option<u8>,
        fetch_all_pages: bool,
        decoders: &[(&str, &dyn Decoder)],
    ) -> EngineResult<QueryResultSet> {
        let mut set = QueryResultSet::default();
        let mut start_key = None;

        loop {
            let params = QueryParams {
                index,
                pk: pk.to_string(),
                sk_prefix: None,
                start_key: start_key.clone(),
                limit: None,
                forward: true,
            };
            let result = self
                .store
                .query(&self.table, params)
                .await
                .map_err(|e| EngineError::Other(e.to_string()))?;

            for raw in &result.items {
                if raw.contains_key("dynamotorLegacy") {
                    continue;
                }
                let mut routed = false;
                for (name, decoder) in decoders {
                    if let Some(instance) = decoder.try_decode(raw) {
                        set.buckets.entry(name.to_string()).or_default().push(instance);
                        routed = true;
                        break;
                    }
                }
                if !routed {
                    set.unknown.push(raw.clone());
                }
            }

            set.last_evaluated_key = result.last_evaluated_key.clone();
            if !fetch_all_pages || result.last_evaluated_key.is_none() {
                break;
            }
            start_key = result.last_evaluated_key;
        }

        Ok(set)
    }

    /// §4.4.9: batch get across a named map of get operations. Duplicate
    /// keys resolve to the same value.
    pub async fn batch_get(
        &self,
        ops: HashMap<String, GetOp>,
        individual_errors: bool,
    ) -> EngineResult<HashMap<String, EngineResult<RawObject>>> {
        let consistent = false;
        let mut distinct: Vec<Key> = Vec::new();
        for op in ops.values() {
            if !distinct.contains(&op.key) {
                distinct.push(op.key.clone());
            }
        }

        let mut found: HashMap<(String, String), RawObject> = HashMap::new();
        let mut pending = distinct;
        while !pending.is_empty() {
            let result = self
                .store
                .batch_get(&self.table, pending.clone(), consistent)
                .await
                .map_err(|e| EngineError::Other(e.to_string()))?;
            for item in result.items {
                if let (Some(pk), Some(sk)) = (
                    item.get("PK").and_then(|v| v.as_str()),
                    item.get("SK").and_then(|v| v.as_str()),
                ) {
                    found.insert((pk.to_string(), sk.to_string()), item);
                }
            }
            if !result.unprocessed.is_empty() && result.unprocessed.len() == pending.len() {
                return Err(EngineError::BatchGetStalled(result.unprocessed.len()));
            }
            pending = result.unprocessed;
        }

        let mut out = HashMap::with_capacity(ops.len());
        for (name, op) in ops {
            let value = found.get(&(op.key.pk.clone(), op.key.sk.clone()));
            let resolved = match value {
                Some(item) => Ok(item.clone()),
                None if individual_errors => Err(EngineError::NotFound(op.key.to_string())),
                None => return Err(EngineError::NotFound(op.key.to_string())),
            };
            out.insert(name, resolved);
        }
        Ok(out)
    }

    /// §4.4.8: run a flat sequence of operations as one logical bulk
    /// transaction.
    pub async fn bulk(&self, operations: Vec<TransactionOperation>) -> EngineResult<()> {
        bulk::bulk_with_policy(self.store.as_ref(), &self.table, operations, &self.retry_policy).await
    }

    /// §4.4.7: one page of a paginated query.
    pub async fn paginate(
        &self,
        pk: &str,
        index: Option<u8>,
        req: crate::pagination::PageRequest,
    ) -> EngineResult<crate::pagination::Page> {
        crate::pagination::paginate(
            self.store.as_ref(),
            &self.table,
            pk,
            index,
            req,
            self.cursor_encryption_key.as_ref(),
        )
        .await
    }
}

#[derive(Default)]
pub struct QueryResultSet {
    pub buckets: HashMap<String, Vec<Box<dyn AnyInstance>>>,
    pub unknown: Vec<RawObject>,
    pub last_evaluated_key: Option<Key>,
}

/// §6: resolves the 32-byte cursor encryption key from config, either
/// hex-decoded inline or read from a file. `None` means cursor encryption
/// is disabled — cursors are base64 only.
fn resolve_cursor_encryption_key(
    config: Option<&CursorEncryptionConfig>,
) -> EngineResult<Option<[u8; 32]>> {
    let bytes = match config {
        None => return Ok(None),
        Some(CursorEncryptionConfig::Hex { cursor_encryption_key_hex }) => hex::decode(cursor_encryption_key_hex)
            .map_err(|e| EngineError::Other(format!("invalid cursor_encryption_key_hex: {e}")))?,
        Some(CursorEncryptionConfig::File { cursor_encryption_key_file }) => {
            std::fs::read(cursor_encryption_key_file).map_err(|e| {
                EngineError::Other(format!(
                    "couldn't read cursor_encryption_key_file {}: {e}",
                    cursor_encryption_key_file.display()
                ))
            })?
        }
    };

    let key: [u8; 32] = bytes.try_into().map_err(|bytes: Vec<u8>| {
        EngineError::Other(format!(
            "cursor encryption key must be exactly 32 bytes, got {}",
            bytes.len()
        ))
    })?;
    Ok(Some(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::SandboxStore;
    use gridstore_core::codec::{identity_prop, CodecShape, Record};
    use gridstore_core::define_model;
    use gridstore_core::union::ModelDecoder;

    #[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    pub struct SimpleValue {
        foo: String,
        bar: i64,
    }

    impl Record for SimpleValue {
        const PROPS: &'static [&'static str] = &["foo", "bar"];
    }

    impl KeyDerivation for SimpleValue {
        fn pk(&self) -> String {
            format!("PK#{}", self.foo)
        }
        fn sk(&self) -> String {
            format!("SK#{}", self.bar)
        }
    }

    define_model! {
        Simple, tag = "Simple", value = SimpleValue,
        props = { foo, bar },
    }

    fn client() -> Client {
        Client::new(Arc::new(SandboxStore::new()), "t")
    }

    /// S1: simple put/get round-trips through the full encode/decode path,
    /// with the primary-key attributes and `_docVersion` stamped on write.
    #[tokio::test]
    async fn put_then_get_round_trips_with_doc_version_zero() {
        let client = client();
        let instance = Model::<Simple>::construct(SimpleValue { foo: "hi".into(), bar: 42 });

        let put = client.put(instance, PutOptions::default()).await.unwrap();
        assert_eq!(put.doc_version(), Some(0));

        let got = client.get::<Simple>(Key::new("PK#hi", "SK#42")).await.unwrap();
        assert_eq!(got.value(), &SimpleValue { foo: "hi".into(), bar: 42 });
        assert_eq!(got.doc_version(), Some(0));
    }

    /// S2: a second unconditional `put` at the same key rejects with
    /// `KeyExists`; `ignore_existence` makes it overwrite instead.
    #[tokio::test]
    async fn second_put_rejects_with_key_exists_unless_ignored() {
        let client = client();
        let first = Model::<Simple>::construct(SimpleValue { foo: "hi".into(), bar: 42 });
        client.put(first, PutOptions::default()).await.unwrap();

        let second = Model::<Simple>::construct(SimpleValue { foo: "hi".into(), bar: 42 });
        let err = client.put(second, PutOptions::default()).await.unwrap_err();
        assert!(matches!(err, EngineError::KeyExists(_)));

        let third = Model::<Simple>::construct(SimpleValue { foo: "hi".into(), bar: 43 });
        client
            .put(third, PutOptions { ignore_existence: true, condition: None })
            .await
            .unwrap();
        let got = client.get::<Simple>(Key::new("PK#hi", "SK#42")).await.unwrap();
        assert_eq!(got.value().bar, 43);
    }

    /// S4: updating a stale in-memory instance after someone else already
    /// advanced `_docVersion` raises a race condition, not a silent write.
    #[tokio::test]
    async fn stale_update_raises_race_condition() {
        let client = client();
        let instance = Model::<Simple>::construct(SimpleValue { foo: "hi".into(), bar: 1 });
        let v0 = client.put(instance, PutOptions::default()).await.unwrap();

        let _v1 = client
            .update(&v0, SimpleValue { foo: "hi".into(), bar: 2 })
            .await
            .unwrap();

        let err = client
            .update(&v0, SimpleValue { foo: "hi".into(), bar: 3 })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::RaceCondition(_)));
    }

    /// §4.4.3/§9: `update_raw` writes the patch but never recomputes the
    /// model's derived key attributes, even though they depend on `foo`.
    #[tokio::test]
    async fn update_raw_leaves_stored_key_attributes_stale() {
        let client = client();
        let instance = Model::<Simple>::construct(SimpleValue { foo: "hi".into(), bar: 1 });
        client.put(instance, PutOptions::default()).await.unwrap();

        let mut patch = AttributePatch::new();
        patch.insert("foo".into(), Some("renamed".into()));
        let key = Key::new("PK#hi", "SK#1");
        let updated = client.update_raw::<Simple>(key.clone(), patch, None).await.unwrap();

        // The decoded instance reflects the new schema field...
        assert_eq!(updated.value().foo, "renamed");
        // ...but its computed PK (derived from `foo`) no longer matches
        // the row's stored PK, which update_raw never touched.
        assert_eq!(updated.pk(), "PK#renamed");
        assert_eq!(key.pk, "PK#hi");
    }

    /// §4.4.3: a caller-supplied condition failing surfaces as
    /// `ConditionalCheckFailed`; the default `attribute_exists(PK)`
    /// precondition failing (row absent) surfaces as `NotFound`.
    #[tokio::test]
    async fn update_raw_distinguishes_default_precondition_from_caller_condition() {
        let client = client();
        let mut patch = AttributePatch::new();
        patch.insert("bar".into(), Some(2.into()));

        let missing = client
            .update_raw::<Simple>(Key::new("PK#absent", "SK#1"), patch.clone(), None)
            .await
            .unwrap_err();
        assert!(matches!(missing, EngineError::NotFound(_)));

        let instance = Model::<Simple>::construct(SimpleValue { foo: "hi".into(), bar: 1 });
        client.put(instance, PutOptions::default()).await.unwrap();
        let bad_condition = Expr::AttributeEquals { attribute: "bar".into(), value: 999.into() };
        let failed = client
            .update_raw::<Simple>(Key::new("PK#hi", "SK#1"), patch, Some(bad_condition))
            .await
            .unwrap_err();
        assert!(matches!(failed, EngineError::ConditionalCheckFailed(_)));
    }

    /// §8 property 3: soft-deleting the same item twice fails the second
    /// time because the original row no longer exists to delete.
    #[tokio::test]
    async fn soft_delete_twice_fails_the_second_time() {
        let client = client();
        let instance = Model::<Simple>::construct(SimpleValue { foo: "hi".into(), bar: 1 });
        let put = client.put(instance, PutOptions::default()).await.unwrap();

        client.soft_delete(put.clone()).await.unwrap();
        let err = client.soft_delete(put).await.unwrap_err();
        assert!(matches!(err, EngineError::BulkWriteTransactionError(_)));
    }

    /// §3.5/§4.5: the soft-deleted row keeps its `PK`/`SK` attribute names
    /// (fixed by table schema) with their *values* prefixed, rather than
    /// the attribute names themselves being renamed away.
    #[tokio::test]
    async fn soft_delete_prefixes_key_attribute_values_not_names() {
        let client = client();
        let instance = Model::<Simple>::construct(SimpleValue { foo: "hi".into(), bar: 1 });
        let put = client.put(instance, PutOptions::default()).await.unwrap();

        client.soft_delete(put).await.unwrap();

        let deleted_key = Key::new("$$DELETED$$PK#hi", "$$DELETED$$SK#1");
        let stored = client
            .store
            .get(&client.table, &deleted_key, false)
            .await
            .unwrap()
            .expect("soft-deleted row present at the prefixed-value key");

        assert_eq!(stored.get("PK").unwrap(), "$$DELETED$$PK#hi");
        assert_eq!(stored.get("SK").unwrap(), "$$DELETED$$SK#1");
        assert!(stored.contains_key("_deletedAt"));

        let original_key = Key::new("PK#hi", "SK#1");
        assert!(client.store.get(&client.table, &original_key, false).await.unwrap().is_none());
    }

    /// §4.4.6: rows are routed to the bucket of the first decoder that
    /// accepts them; unrecognized rows land in `unknown`.
    #[tokio::test]
    async fn query_routes_rows_by_decoder_and_buckets_unknowns() {
        let client = client();
        let instance = Model::<Simple>::construct(SimpleValue { foo: "org".into(), bar: 1 });
        client.put(instance, PutOptions::default()).await.unwrap();

        let mut unrelated = RawObject::new();
        unrelated.insert("PK".into(), "PK#org".into());
        unrelated.insert("SK".into(), "SK#unknown".into());
        client.store.put("t", &Key::new("PK#org", "SK#unknown"), unrelated, None).await.unwrap();

        let decoder = ModelDecoder::<Simple>::new();
        let decoders: Vec<(&str, &dyn Decoder)> = vec![("simple", &decoder)];
        let result = client.query("PK#org", None, false, &decoders).await.unwrap();

        assert_eq!(result.buckets.get("simple").map(Vec::len), Some(1));
        assert_eq!(result.unknown.len(), 1);
    }

    /// §4.4.9: duplicate keys in a batch-get resolve to the same value;
    /// a missing key fails the whole batch unless `individual_errors`.
    #[tokio::test]
    async fn batch_get_resolves_duplicate_keys_and_respects_individual_errors() {
        let client = client();
        let instance = Model::<Simple>::construct(SimpleValue { foo: "hi".into(), bar: 1 });
        client.put(instance, PutOptions::default()).await.unwrap();

        let mut ops = HashMap::new();
        ops.insert("a".to_string(), GetOp { tag: "Simple", key: Key::new("PK#hi", "SK#1") });
        ops.insert("b".to_string(), GetOp { tag: "Simple", key: Key::new("PK#hi", "SK#1") });
        let result = client.batch_get(ops, false).await.unwrap();
        assert!(result["a"].is_ok());
        assert!(result["b"].is_ok());

        let mut missing_ops = HashMap::new();
        missing_ops.insert("missing".to_string(), GetOp { tag: "Simple", key: Key::new("PK#gone", "SK#1") });
        let failed = client.batch_get(missing_ops.clone(), false).await;
        assert!(failed.is_err());

        let individual = client.batch_get(missing_ops, true).await.unwrap();
        assert!(individual["missing"].is_err());
    }

    /// A [`Store`] whose `batch_get` always reports every key unprocessed,
    /// simulating a backend that never makes progress.
    struct StalledStore;

    #[async_trait::async_trait]
    impl Store for StalledStore {
        async fn put(&self, _: &str, _: &Key, _: RawObject, _: Option<Expr>) -> crate::store::StoreResult<()> {
            Ok(())
        }
        async fn get(&self, _: &str, _: &Key, _: bool) -> crate::store::StoreResult<Option<RawObject>> {
            Ok(None)
        }
        async fn delete(&self, _: &str, _: &Key, _: Option<Expr>) -> crate::store::StoreResult<()> {
            Ok(())
        }
        async fn update(
            &self,
            _: &str,
            _: &Key,
            _: crate::update_expr::UpdateExpr,
            _: Option<Expr>,
        ) -> crate::store::StoreResult<RawObject> {
            Ok(RawObject::new())
        }
        async fn batch_get(&self, _: &str, keys: Vec<Key>, _: bool) -> crate::store::StoreResult<crate::store::BatchGetResult> {
            Ok(crate::store::BatchGetResult { items: Vec::new(), unprocessed: keys })
        }
        async fn batch_write(&self, _: &str, _: Vec<RawObject>) -> crate::store::StoreResult<crate::store::BatchWriteResult> {
            Ok(crate::store::BatchWriteResult::default())
        }
        async fn query(&self, _: &str, _: QueryParams) -> crate::store::StoreResult<crate::store::QueryResult> {
            Ok(crate::store::QueryResult::default())
        }
        async fn scan(&self, _: &str, _: Option<Key>) -> crate::store::StoreResult<crate::store::QueryResult> {
            Ok(crate::store::QueryResult::default())
        }
        async fn transact_write(&self, _: &str, _: Vec<crate::store::TransactItem>) -> crate::store::StoreResult<()> {
            Ok(())
        }
    }

    /// §4.4.9/§9: a backend that never makes progress on unprocessed keys
    /// surfaces as a typed, countable error rather than looping forever.
    #[tokio::test]
    async fn batch_get_with_no_progress_raises_batch_get_stalled() {
        let client = Client::new(Arc::new(StalledStore), "t");
        let mut ops = HashMap::new();
        ops.insert("a".to_string(), GetOp { tag: "Simple", key: Key::new("PK#x", "SK#1") });
        let err = client.batch_get(ops, false).await.unwrap_err();
        assert!(matches!(err, EngineError::BatchGetStalled(1)));
    }

    #[test]
    fn resolve_cursor_encryption_key_decodes_hex() {
        let hex_key = "00".repeat(32);
        let config = CursorEncryptionConfig::Hex { cursor_encryption_key_hex: hex_key };
        let key = resolve_cursor_encryption_key(Some(&config)).unwrap();
        assert_eq!(key, Some([0u8; 32]));
    }

    #[test]
    fn resolve_cursor_encryption_key_rejects_wrong_length() {
        let config = CursorEncryptionConfig::Hex { cursor_encryption_key_hex: "00".repeat(16) };
        assert!(resolve_cursor_encryption_key(Some(&config)).is_err());
    }

    #[test]
    fn resolve_cursor_encryption_key_none_when_unset() {
        assert_eq!(resolve_cursor_encryption_key(None).unwrap(), None);
    }

    #[test]
    fn codec_shape_is_available_for_simple_model() {
        let mut props = std::collections::BTreeMap::new();
        props.insert("foo", identity_prop as gridstore_core::PropEncoder);
        let shape = CodecShape::Interface(props);
        assert!(shape.resolve_prop("foo").is_some());
    }
}
