//! Codec, Model, and Union layer for the typed object-to-table access
//! layer: schema validation, tagged construction, and polymorphic decoding,
//! independent of any particular store transport.

pub mod codec;
pub mod error;
pub mod key;
pub mod model;
pub mod op;
pub mod raw;
pub mod union;

pub use codec::{CodecShape, PropEncoder, Record};
pub use error::ValidationError;
pub use key::{Key, KeyDerivation};
pub use model::{Instance, Model, ModelDef};
pub use op::{ConditionOp, DeleteOp, Expr, GetOp, Operation, PutOp, TransactionOperation, UpdateRawOp};
pub use raw::RawObject;
pub use union::{AnyInstance, Decoder, Union};
