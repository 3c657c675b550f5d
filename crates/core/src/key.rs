//! Primary-key / GSI derivation (§2, §4.1d). A model's `Value` type derives
//! its own key material from its fields; the engine never constructs keys
//! itself, it only asks the model to.

use std::fmt;

/// A resolved `(PK, SK)` pair, or a GSI's `(PK, SK)` pair when returned from
/// [`KeyDerivation::gsi`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Key {
    pub pk: String,
    pub sk: String,
}

impl Key {
    pub fn new(pk: impl Into<String>, sk: impl Into<String>) -> Self {
        Self {
            pk: pk.into(),
            sk: sk.into(),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.pk, self.sk)
    }
}

/// Implemented by a model's value type to compute its table key and any of
/// up to five GSI keys (§2). `gsi` returns `None` for indexes the value
/// doesn't participate in — the engine skips writing those attributes
/// entirely rather than writing empty strings.
pub trait KeyDerivation {
    fn pk(&self) -> String;
    fn sk(&self) -> String;

    fn key(&self) -> Key {
        Key::new(self.pk(), self.sk())
    }

    /// `index` is 1-based (GSI1..GSI5), matching the table's attribute
    /// naming convention (`GSI1PK`/`GSI1SK`, ...).
    fn gsi(&self, _index: u8) -> Option<Key> {
        None
    }
}
