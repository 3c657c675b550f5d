use serde_json::{Map, Value};

/// The wire shape of a stored item: a structural attribute map. Stands in
/// for the host language's native object type, which Rust has no direct
/// analogue of.
pub type RawObject = Map<String, Value>;

/// Shallow clone with the *value* of every listed key-attribute prefixed,
/// used for the soft-delete transform (§3.5, §4.5): `PK` keeps holding a
/// string, just `$$DELETED$$`-prefixed, rather than the attribute being
/// renamed — the table's key-attribute names (`PK`, `SK`, `GSInPK/SK`) are
/// fixed by schema.
pub fn prefix_keys(raw: &RawObject, keys: &[&str], prefix: &str) -> RawObject {
    let mut out = raw.clone();
    for &k in keys {
        if let Some(Value::String(v)) = out.get(k) {
            out.insert(k.to_string(), Value::String(format!("{prefix}{v}")));
        }
    }
    out
}
