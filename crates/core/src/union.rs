//! Polymorphic decode across a declared set of models (§4.3), and the
//! `Decoder` seam that lets `query`/`batchGet` accept either a single
//! model or a union wherever the spec's `{name: modelOrUnion}` registries
//! are used.

use std::any::Any;

use crate::key::Key;
use crate::model::{Instance, Model, ModelDef};
use crate::raw::RawObject;
use crate::ValidationError;

/// Object-safe facade over `Instance<M>` for some model `M`, used wherever
/// a union (or a heterogeneous registry) needs to hand back a decoded
/// instance without naming its concrete model type.
pub trait AnyInstance: Send + Sync {
    fn tag(&self) -> &'static str;
    fn encode(&self) -> RawObject;
    fn doc_version(&self) -> Option<u64>;
    fn pk(&self) -> String;
    fn sk(&self) -> String;
    fn as_any(&self) -> &dyn Any;
}

impl<M: ModelDef> AnyInstance for Instance<M> {
    fn tag(&self) -> &'static str {
        M::TAG
    }

    fn encode(&self) -> RawObject {
        Model::<M>::encode(self.value())
    }

    fn doc_version(&self) -> Option<u64> {
        Instance::doc_version(self)
    }

    fn pk(&self) -> String {
        crate::key::KeyDerivation::pk(self.value())
    }

    fn sk(&self) -> String {
        crate::key::KeyDerivation::sk(self.value())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Anything that can attempt to decode a raw item into a boxed, erased
/// instance: a single model, or a [`Union`] of several. Implemented so
/// that `query`/`batchGet` call sites can accept either interchangeably
/// (§4.3, §6).
pub trait Decoder: Send + Sync {
    fn try_decode(&self, raw: &RawObject) -> Option<Box<dyn AnyInstance>>;
}

/// A zero-sized adapter exposing a single model as a [`Decoder`].
pub struct ModelDecoder<M>(std::marker::PhantomData<M>);

impl<M> ModelDecoder<M> {
    pub fn new() -> Self {
        Self(std::marker::PhantomData)
    }
}

impl<M> Default for ModelDecoder<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: ModelDef> Decoder for ModelDecoder<M> {
    fn try_decode(&self, raw: &RawObject) -> Option<Box<dyn AnyInstance>> {
        // Structural only: `Union::decode` already handled the tag-preferred
        // lookup, so a member reached via the declaration-order fallback
        // must get a fair shot even when `_tag` names some other member.
        Model::<M>::decode_structural(raw)
            .ok()
            .map(|instance| Box::new(instance) as Box<dyn AnyInstance>)
    }
}

/// A declared, ordered list of member decoders (§4.3). Decode is
/// tag-first: if the raw item's `_tag` matches a member's tag, only that
/// member is tried. Otherwise members are tried in declaration order and
/// the first successful decode wins (§4.3 steps 1-3).
pub struct Union {
    members: Vec<(&'static str, Box<dyn Decoder>)>,
}

impl Union {
    pub fn new() -> Self {
        Self {
            members: Vec::new(),
        }
    }

    pub fn with_model<M: ModelDef>(mut self) -> Self {
        self.members
            .push((M::TAG, Box::new(ModelDecoder::<M>::new())));
        self
    }

    pub fn decode(&self, raw: &RawObject) -> Result<Box<dyn AnyInstance>, ValidationError> {
        // §4.3: try the tag match first; on failure (or no tag match) fall
        // through to every member in declaration order, first success wins.
        if let Some(tag) = raw.get("_tag").and_then(|v| v.as_str()) {
            if let Some((_, decoder)) = self.members.iter().find(|(t, _)| *t == tag) {
                if let Some(instance) = decoder.try_decode(raw) {
                    return Ok(instance);
                }
            }
        }

        self.members
            .iter()
            .find_map(|(_, decoder)| decoder.try_decode(raw))
            .ok_or_else(ValidationError::no_union_member_decoded)
    }

    pub fn member_tags(&self) -> Vec<&'static str> {
        self.members.iter().map(|(tag, _)| *tag).collect()
    }
}

impl Default for Union {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for Union {
    fn try_decode(&self, raw: &RawObject) -> Option<Box<dyn AnyInstance>> {
        self.decode(raw).ok()
    }
}

#[allow(dead_code)]
fn key_of(instance: &dyn AnyInstance) -> Key {
    Key::new(instance.pk(), instance.sk())
}
