//! Operation descriptors (§4.6, §6): the vocabulary `bulk()` and
//! `transactWrite` share. These deliberately carry pre-encoded
//! [`RawObject`]s and a bare `tag` rather than being generic over
//! [`crate::ModelDef`] — a single bulk call holds operations across many
//! different models, so genericity has to stop at this boundary; only the
//! single-item `Client` API is generic over a concrete model.

use crate::key::Key;
use crate::raw::RawObject;

/// A condition-expression fragment attached to a conditional write. Kept
/// deliberately small: the engine only ever needs attribute-exists and
/// attribute-equals checks for optimistic concurrency (§5.2).
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    AttributeExists { attribute: String },
    AttributeNotExists { attribute: String },
    AttributeEquals { attribute: String, value: serde_json::Value },
    /// §4.4.4: `attribute_not_exists(_docVersion) OR _docVersion = :v`.
    Or(Box<Expr>, Box<Expr>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct GetOp {
    pub tag: &'static str,
    pub key: Key,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PutOp {
    pub tag: &'static str,
    pub key: Key,
    pub item: RawObject,
    pub condition: Option<Expr>,
}

/// §4.4: an update that writes a raw attribute patch rather than a typed
/// value. Staleness of the patch relative to the stored item's current
/// state is tolerated by design (see DESIGN.md's Open Question decisions).
#[derive(Clone, Debug, PartialEq)]
pub struct UpdateRawOp {
    pub tag: &'static str,
    pub key: Key,
    pub patch: RawObject,
    pub condition: Option<Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DeleteOp {
    pub tag: &'static str,
    pub key: Key,
    pub condition: Option<Expr>,
}

/// A condition-only operation with no associated write: used to assert a
/// sibling item's state inside a transaction without touching it.
#[derive(Clone, Debug, PartialEq)]
pub struct ConditionOp {
    pub tag: &'static str,
    pub key: Key,
    pub condition: Expr,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Operation {
    Get(GetOp),
    Put(PutOp),
    UpdateRaw(UpdateRawOp),
    Delete(DeleteOp),
    Condition(ConditionOp),
}

/// §4.6: one item of a bulk transaction's action list. `rollback`, when
/// present, is applied (in reverse item order) if any action in the same
/// batch fails at `transactWrite` time.
#[derive(Clone, Debug, PartialEq)]
pub struct TransactionOperation {
    pub action: Operation,
    pub rollback: Option<Operation>,
}

impl TransactionOperation {
    pub fn new(action: Operation) -> Self {
        Self {
            action,
            rollback: None,
        }
    }

    pub fn with_rollback(action: Operation, rollback: Operation) -> Self {
        Self {
            action,
            rollback: Some(rollback),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_operation_without_rollback_has_no_compensating_action() {
        let op = TransactionOperation::new(Operation::Delete(DeleteOp {
            tag: "Widget",
            key: Key::new("WIDGET#w1", "META"),
            condition: None,
        }));
        assert!(op.rollback.is_none());
    }

    #[test]
    fn transaction_operation_with_rollback_pairs_action_and_compensation() {
        let put = Operation::Put(PutOp {
            tag: "Widget",
            key: Key::new("WIDGET#w1", "META"),
            item: RawObject::new(),
            condition: Some(Expr::AttributeNotExists {
                attribute: "PK".into(),
            }),
        });
        let delete = Operation::Delete(DeleteOp {
            tag: "Widget",
            key: Key::new("WIDGET#w1", "META"),
            condition: None,
        });
        let op = TransactionOperation::with_rollback(put, delete.clone());
        assert_eq!(op.rollback, Some(delete));
    }
}
