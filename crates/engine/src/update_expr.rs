//! Builds the `SET`/`REMOVE` attribute patch for `updateRaw` (§4.4.3).
//! [`crate::store::Store::update`] takes the patch as structured
//! `(name, value)` pairs rather than an expression string, so there's no
//! `#name` placeholder indirection to sanitize here — the attribute name
//! stored is always the caller's own.

use std::collections::HashMap;

use serde_json::Value;

/// A single attribute patch. `None` means "drop this key" (the JS
/// source's `undefined` skip); present values are further split into
/// `SET`/`REMOVE` by [`build_update_expression`].
pub type AttributePatch = HashMap<String, Option<Value>>;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct UpdateExpr {
    pub set: Vec<(String, Value)>,
    pub remove: Vec<String>,
}

/// §4.4.3: undefined values are dropped (never present in `patch` to begin
/// with, per [`AttributePatch`]'s shape); a `GSI*` key holding JSON `null`
/// moves to `REMOVE`; everything else goes to `SET` unchanged, including a
/// non-GSI `null` — that's the documented, slightly surprising behavior
/// the original preserves.
pub fn build_update_expression(patch: AttributePatch) -> UpdateExpr {
    let mut expr = UpdateExpr::default();
    let mut keys: Vec<_> = patch.into_iter().collect();
    keys.sort_by(|a, b| a.0.cmp(&b.0));

    for (key, value) in keys {
        let Some(value) = value else { continue };
        if key.starts_with("GSI") && value.is_null() {
            expr.remove.push(key);
        } else {
            expr.set.push((key, value));
        }
    }
    expr
}
