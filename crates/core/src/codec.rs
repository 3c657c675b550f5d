//! The codec side of §4.1: a record's declared attributes, plus the closed
//! wrapper hierarchy (design note §9) used to walk down to a single
//! property's sub-codec for `encodeProp`.

use std::collections::BTreeMap;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::raw::RawObject;

/// A type bound to a fixed, named set of schema properties. Implemented
/// (usually via [`crate::define_model`]) for the plain data struct a caller
/// declares; `PROPS` drives the "exact" behavior in [`RecordCodec::encode`]
/// (§3 invariant 2).
pub trait Record:
    Serialize + DeserializeOwned + Clone + std::fmt::Debug + PartialEq + Send + Sync + 'static
{
    const PROPS: &'static [&'static str];
}

/// Per-property encode function. Most properties round-trip through JSON
/// unchanged; this exists as a seam for the rare property whose on-the-wire
/// encoding differs from its JSON `Serialize` output.
pub type PropEncoder = fn(&Value) -> Value;

pub fn identity_prop(value: &Value) -> Value {
    value.clone()
}

/// The closed set of codec combinators from design note §9: interface,
/// partial, exact, intersection, refinement, readonly. The engine only
/// needs two things out of this tree: the full set of declared property
/// names (`props_of`) and, for a single property, its encoder
/// (`resolve_prop`) — both resolved by pattern matching, not virtual
/// dispatch, since the set of wrapper kinds is closed.
#[derive(Clone, Debug)]
pub enum CodecShape {
    Interface(BTreeMap<&'static str, PropEncoder>),
    Exact(Box<CodecShape>),
    Partial(Box<CodecShape>),
    Readonly(Box<CodecShape>),
    Refinement(Box<CodecShape>),
    Intersection(Vec<CodecShape>),
}

impl CodecShape {
    pub fn props_of(&self) -> Vec<&'static str> {
        match self {
            CodecShape::Interface(props) => props.keys().copied().collect(),
            CodecShape::Exact(inner)
            | CodecShape::Partial(inner)
            | CodecShape::Readonly(inner)
            | CodecShape::Refinement(inner) => inner.props_of(),
            CodecShape::Intersection(parts) => {
                let mut names: Vec<_> = parts.iter().flat_map(CodecShape::props_of).collect();
                names.sort_unstable();
                names.dedup();
                names
            }
        }
    }

    /// Descend through intersection/exact/partial/refinement/readonly
    /// wrappers looking for `name`'s encoder, returning the first match.
    /// `None` means "no matching codec" (§4.1c) — callers fall back to the
    /// identity transform, never an error.
    pub fn resolve_prop(&self, name: &str) -> Option<PropEncoder> {
        match self {
            CodecShape::Interface(props) => props.get(name).copied(),
            CodecShape::Exact(inner)
            | CodecShape::Partial(inner)
            | CodecShape::Readonly(inner)
            | CodecShape::Refinement(inner) => inner.resolve_prop(name),
            CodecShape::Intersection(parts) => {
                parts.iter().find_map(|part| part.resolve_prop(name))
            }
        }
    }
}

/// Binds a [`Record`] type to the encode/decode/is operations §4.1
/// requires. The "exact" behavior comes from filtering the serialized
/// object down to `T::PROPS` on encode; decode tolerates and discards
/// extraneous keys, which is `serde_json`'s default behavior.
pub struct RecordCodec<T> {
    _marker: std::marker::PhantomData<T>,
}

impl<T> Default for RecordCodec<T> {
    fn default() -> Self {
        Self {
            _marker: std::marker::PhantomData,
        }
    }
}

impl<T: Record> RecordCodec<T> {
    pub fn decode(&self, raw: &RawObject) -> Result<T, crate::error::ValidationError> {
        serde_json::from_value(Value::Object(raw.clone())).map_err(Into::into)
    }

    pub fn encode(&self, value: &T) -> RawObject {
        let full = serde_json::to_value(value).expect("Record types must serialize to an object");
        match full {
            Value::Object(map) => map
                .into_iter()
                .filter(|(key, _)| T::PROPS.contains(&key.as_str()))
                .collect(),
            _ => RawObject::new(),
        }
    }

    pub fn is(&self, raw: &RawObject) -> bool {
        self.decode(raw).is_ok()
    }

    pub fn props(&self) -> &'static [&'static str] {
        T::PROPS
    }
}
