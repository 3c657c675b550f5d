//! Tagged construction and decoding for a single model (§4.2), built on top
//! of the plain [`crate::codec`] machinery. Mirrors the shape of the
//! teacher's `define_table_with_default_codec!` macro: a zero-sized marker
//! type names a model, and its behavior lives in trait impls rather than
//! an instance.

use std::ops::Deref;

use crate::codec::{CodecShape, Record, RecordCodec};
use crate::error::ValidationError;
use crate::key::KeyDerivation;
use crate::raw::RawObject;

/// Declares a model: its tag, its value type, and the codec shape used for
/// `encodeProp`. One impl per model, usually produced by
/// [`crate::define_model`].
pub trait ModelDef: Send + Sync + 'static {
    type Value: Record + KeyDerivation;

    /// The `_tag` value stamped onto every encoded instance (§4.2).
    const TAG: &'static str;

    fn codec_shape() -> CodecShape;
}

/// A decoded or freshly-constructed value of model `M`, carrying the
/// optimistic-concurrency version read alongside it (§5.2). `doc_version`
/// is `None` for an instance that has never round-tripped through storage.
#[derive(Debug)]
pub struct Instance<M: ModelDef> {
    value: M::Value,
    doc_version: Option<u64>,
}

impl<M: ModelDef> Clone for Instance<M>
where
    M::Value: Clone,
{
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
            doc_version: self.doc_version,
        }
    }
}

impl<M: ModelDef> Instance<M> {
    pub fn new(value: M::Value) -> Self {
        Self {
            value,
            doc_version: None,
        }
    }

    pub fn with_doc_version(value: M::Value, doc_version: u64) -> Self {
        Self {
            value,
            doc_version: Some(doc_version),
        }
    }

    pub fn doc_version(&self) -> Option<u64> {
        self.doc_version
    }

    pub fn value(&self) -> &M::Value {
        &self.value
    }

    pub fn into_value(self) -> M::Value {
        self.value
    }
}

impl<M: ModelDef> Deref for Instance<M> {
    type Target = M::Value;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

impl<M: ModelDef> PartialEq for Instance<M>
where
    M::Value: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value && self.doc_version == other.doc_version
    }
}

/// Static-method namespace for model `M`, matching the spec's separation
/// between typed construction (`construct`, never fails) and validating
/// decode (`decode`, can fail). `M` itself is never instantiated; every
/// method here takes `&RawObject`/`&M::Value` and returns owned data.
pub struct Model<M>(std::marker::PhantomData<M>);

impl<M: ModelDef> Model<M> {
    const DOC_VERSION_ATTR: &'static str = "_docVersion";
    const TAG_ATTR: &'static str = "_tag";

    /// §4.2a: build an instance from an already-validated value. Used when
    /// the caller constructs a new record to `put`, not when decoding
    /// external input.
    pub fn construct(value: M::Value) -> Instance<M> {
        Instance::new(value)
    }

    /// §4.2b: validate `raw` against the model's schema and tag, returning
    /// a typed instance. Rejects a raw object whose `_tag` doesn't match
    /// `M::TAG`, distinct from a structural validation failure. For direct,
    /// non-union callers only — [`Union`](crate::Union)'s declaration-order
    /// fallback uses [`Self::decode_structural`] instead, since gating each
    /// member's own decode on tag equality would make the fallback loop
    /// reject every member whenever `_tag` is present but belongs to none
    /// of them.
    pub fn decode(raw: &RawObject) -> Result<Instance<M>, ValidationError> {
        if let Some(tag) = raw.get(Self::TAG_ATTR).and_then(|v| v.as_str()) {
            if tag != M::TAG {
                return Err(ValidationError::new(format!(
                    "expected tag '{}', found '{tag}'",
                    M::TAG
                )));
            }
        }

        Self::decode_structural(raw)
    }

    /// Validate `raw` against the model's schema only, ignoring `_tag`
    /// entirely. Used by `Union`'s fallback lookup (§4.3), which has
    /// already exhausted the tag-preferred member and needs every
    /// remaining member to get a fair structural-decode attempt regardless
    /// of what `_tag` says.
    pub fn decode_structural(raw: &RawObject) -> Result<Instance<M>, ValidationError> {
        let codec = RecordCodec::<M::Value>::default();
        let value = codec.decode(raw)?;
        let doc_version = raw
            .get(Self::DOC_VERSION_ATTR)
            .and_then(|v| v.as_u64());

        Ok(match doc_version {
            Some(v) => Instance::with_doc_version(value, v),
            None => Instance::new(value),
        })
    }

    pub fn is(raw: &RawObject) -> bool {
        Self::decode(raw).is_ok()
    }

    /// §4.2c: encode a value to its full raw representation, including the
    /// `_tag` stamp. Does not include `_docVersion` — the engine attaches
    /// that at write time, since it's a property of the stored item, not
    /// the model.
    pub fn encode(value: &M::Value) -> RawObject {
        let codec = RecordCodec::<M::Value>::default();
        let mut raw = codec.encode(value);
        raw.insert(Self::TAG_ATTR.into(), M::TAG.into());
        raw
    }

    /// §4.2d/§9: best-effort single-property encode via the model's codec
    /// shape, falling back to the identity transform when the shape has no
    /// entry for `name`.
    pub fn encode_prop(value: &M::Value, name: &str) -> serde_json::Value {
        let raw = Self::encode(value);
        let encoded = raw.get(name).cloned().unwrap_or(serde_json::Value::Null);
        match M::codec_shape().resolve_prop(name) {
            Some(encoder) => encoder(&encoded),
            None => encoded,
        }
    }

    pub fn tag() -> &'static str {
        M::TAG
    }
}

/// Declares a [`ModelDef`] marker type and its `codec_shape` in one shot,
/// in the style of the teacher's `define_table_with_default_codec!`.
///
/// ```ignore
/// define_model! {
///     Widget, tag = "Widget", value = WidgetValue,
///     props = { foo, bar },
/// }
/// ```
#[macro_export]
macro_rules! define_model {
    ($name:ident, tag = $tag:literal, value = $value:ty, props = { $($prop:ident),* $(,)? } $(,)?) => {
        #[derive(Debug)]
        pub struct $name;

        impl $crate::ModelDef for $name {
            type Value = $value;

            const TAG: &'static str = $tag;

            fn codec_shape() -> $crate::CodecShape {
                let mut props = ::std::collections::BTreeMap::new();
                $(
                    props.insert(stringify!($prop), $crate::codec::identity_prop as $crate::PropEncoder);
                )*
                $crate::CodecShape::Interface(props)
            }
        }
    };
}
