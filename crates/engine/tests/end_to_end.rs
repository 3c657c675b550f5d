//! Crate-level integration suite exercising [`Client`] against
//! [`SandboxStore`] for the literal end-to-end scenarios (§8: S1-S6).
//! Module-local `#[cfg(test)]` blocks cover unit-level behavior; this file
//! is the "wire it all together" layer.

use std::sync::Arc;

use gridstore_core::{
    define_model, AnyInstance, Key, KeyDerivation, Model, Operation, PutOp, Record,
    TransactionOperation, Union,
};
use gridstore_engine::{Client, PageRequest, PutOptions, SandboxStore};

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

/// S1 — put/get round-trips with the stamped envelope attributes.
#[tokio::test]
async fn s1_simple_put_get() {
    let client = client();
    let instance = Model::<Simple>::construct(SimpleValue { foo: "hi".into(), bar: 42 });
    let put = client.put(instance, PutOptions::default()).await.unwrap();
    assert_eq!(put.doc_version(), Some(0));

    let got = client.get::<Simple>(Key::new("PK#hi", "SK#42")).await.unwrap();
    assert_eq!(got.value(), &SimpleValue { foo: "hi".into(), bar: 42 });
}

/// S2 — a duplicate put rejects with KeyExists; ignore_existence overwrites.
#[tokio::test]
async fn s2_key_exists_and_ignore_existence() {
    let client = client();
    let first = Model::<Simple>::construct(SimpleValue { foo: "hi".into(), bar: 42 });
    client.put(first, PutOptions::default()).await.unwrap();

    let second = Model::<Simple>::construct(SimpleValue { foo: "hi".into(), bar: 42 });
    let err = client.put(second, PutOptions::default()).await.unwrap_err();
    assert!(matches!(err, gridstore_engine::EngineError::KeyExists(_)));

    let third = Model::<Simple>::construct(SimpleValue { foo: "hi".into(), bar: 42 });
    client
        .put(third, PutOptions { ignore_existence: true, condition: None })
        .await
        .unwrap();
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AValue {
    a: String,
}
impl Record for AValue {
    const PROPS: &'static [&'static str] = &["a"];
}
impl KeyDerivation for AValue {
    fn pk(&self) -> String {
        format!("A#{}", self.a)
    }
    fn sk(&self) -> String {
        "META".into()
    }
}
define_model! { A, tag = "A", value = AValue, props = { a } }

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BValue {
    b: i64,
}
impl Record for BValue {
    const PROPS: &'static [&'static str] = &["b"];
}
impl KeyDerivation for BValue {
    fn pk(&self) -> String {
        "B".into()
    }
    fn sk(&self) -> String {
        format!("{}", self.b)
    }
}
define_model! { B, tag = "B", value = BValue, props = { b } }

/// S3 — union decode prefers an exact `_tag` match; falls back to the
/// first declared member that structurally decodes otherwise.
#[test]
fn s3_union_decode_by_tag_then_declaration_order() {
    let union = Union::new().with_model::<A>().with_model::<B>();

    let mut tagged_b = gridstore_core::RawObject::new();
    tagged_b.insert("_tag".into(), "B".into());
    tagged_b.insert("a".into(), "x".into());
    tagged_b.insert("b".into(), 42.into());
    let decoded = union.decode(&tagged_b).unwrap();
    assert_eq!(decoded.tag(), "B");

    let mut untagged = gridstore_core::RawObject::new();
    untagged.insert("_tag".into(), "x".into());
    untagged.insert("a".into(), "s".into());
    untagged.insert("b".into(), 42.into());
    let decoded = union.decode(&untagged).unwrap();
    assert_eq!(decoded.tag(), "A");
}

/// S4 — a stale pre-image's `update` raises a race condition once a
/// concurrent writer has already advanced `_docVersion`.
#[tokio::test]
async fn s4_update_version_race() {
    let client = client();
    let instance = Model::<Simple>::construct(SimpleValue { foo: "hi".into(), bar: 1 });
    let v0 = client.put(instance, PutOptions::default()).await.unwrap();
    client.update(&v0, SimpleValue { foo: "hi".into(), bar: 2 }).await.unwrap();

    let err = client.update(&v0, SimpleValue { foo: "hi".into(), bar: 3 }).await.unwrap_err();
    assert!(matches!(err, gridstore_engine::EngineError::RaceCondition(_)));
}

fn put_with_rollback(key: Key) -> TransactionOperation {
    let mut item = gridstore_core::RawObject::new();
    item.insert("PK".into(), key.pk.clone().into());
    item.insert("SK".into(), key.sk.clone().into());
    TransactionOperation::with_rollback(
        Operation::Put(PutOp {
            tag: "Widget",
            key: key.clone(),
            item,
            condition: Some(gridstore_core::Expr::AttributeNotExists { attribute: "PK".into() }),
        }),
        Operation::Delete(gridstore_core::DeleteOp { tag: "Widget", key, condition: None }),
    )
}

/// S5 — a bulk call with a failing condition rolls back every prior action
/// in the same call, leaving pre-existing rows untouched.
#[tokio::test]
async fn s5_bulk_with_rollback() {
    let client = client();
    let x = Model::<Simple>::construct(SimpleValue { foo: "x".into(), bar: 1 });
    let y = Model::<Simple>::construct(SimpleValue { foo: "y".into(), bar: 2 });
    client.put(x, PutOptions::default()).await.unwrap();
    client.put(y, PutOptions::default()).await.unwrap();

    let ops = vec![
        put_with_rollback(Key::new("PK#z", "SK#z")),
        put_with_rollback(Key::new("PK#w", "SK#w")),
        TransactionOperation::new(Operation::Condition(gridstore_core::ConditionOp {
            tag: "Widget",
            key: Key::new("PK#never", "SK#never"),
            condition: gridstore_core::Expr::AttributeEquals {
                attribute: "PK".into(),
                value: "nope".into(),
            },
        })),
    ];
    let err = client.bulk(ops).await.unwrap_err();
    assert!(matches!(err, gridstore_engine::EngineError::BulkWriteTransactionError(_)));

    assert!(client.get::<Simple>(Key::new("PK#x", "SK#1")).await.is_ok());
    assert!(client.get::<Simple>(Key::new("PK#y", "SK#2")).await.is_ok());
    assert!(client.get::<Simple>(Key::new("PK#z", "SK#z")).await.is_err());
    assert!(client.get::<Simple>(Key::new("PK#w", "SK#w")).await.is_err());
}

/// S6 — three forward pages of 20 cover 60 rows in order; paginating
/// backward from the last page's start cursor reproduces the middle page.
#[tokio::test]
async fn s6_pagination_forward_and_backward() {
    let client = client();
    for n in 0..60u32 {
        let row = Model::<Simple>::construct(SimpleValue { foo: "org".into(), bar: n as i64 });
        client.put(row, PutOptions::default()).await.unwrap();
    }

    let page1 = client
        .paginate("PK#org", None, PageRequest { first: Some(20), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(page1.items.len(), 20);
    assert!(page1.has_next_page);

    let page2 = client
        .paginate(
            "PK#org",
            None,
            PageRequest { first: Some(20), after: Some(page1.cursors.last().unwrap().clone()), ..Default::default() },
        )
        .await
        .unwrap();
    assert_eq!(page2.items.len(), 20);

    let page3 = client
        .paginate(
            "PK#org",
            None,
            PageRequest { first: Some(20), after: Some(page2.cursors.last().unwrap().clone()), ..Default::default() },
        )
        .await
        .unwrap();
    assert_eq!(page3.items.len(), 20);
    assert!(!page3.has_next_page);

    let backward = client
        .paginate(
            "PK#org",
            None,
            PageRequest { last: Some(20), before: Some(page3.cursors.first().unwrap().clone()), ..Default::default() },
        )
        .await
        .unwrap();
    assert_eq!(backward.items.len(), 20);
    assert!(backward.has_previous_page);
    assert_eq!(
        backward.items.iter().map(|i| i.get("SK").unwrap().as_str().unwrap()).collect::<Vec<_>>(),
        page2.items.iter().map(|i| i.get("SK").unwrap().as_str().unwrap()).collect::<Vec<_>>(),
    );
}
