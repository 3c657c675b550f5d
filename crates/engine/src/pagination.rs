//! Cursor-based pagination (§4.4.7, §6). Cursors are base64(JSON(keys)),
//! optionally AES-256-CTR encrypted with a fixed synthetic IV so the same
//! item always yields the same cursor (§9 open question: this is
//! deliberate — cursors are opaque, not secret).

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{KeyIvInit, StreamCipher};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use gridstore_core::Key;

use crate::error::{EngineError, EngineResult};
use crate::store::{QueryParams, QueryResult, Store};

type Aes256Ctr = ctr::Ctr64BE<aes::Aes256>;

/// Hard-coded per §6: "a hard-coded 16-byte synthetic IV (so cursors are
/// deterministic across calls but unreadable without the key)". Not a
/// secret — its only job is determinism.
const SYNTHETIC_IV: [u8; 16] = *b"gridstore-cursor";

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub(crate) struct CursorKeys {
    #[serde(rename = "PK")]
    pub pk: String,
    #[serde(rename = "SK")]
    pub sk: String,
    #[serde(rename = "GSInPK", skip_serializing_if = "Option::is_none")]
    pub gsi_pk: Option<String>,
    #[serde(rename = "GSInSK", skip_serializing_if = "Option::is_none")]
    pub gsi_sk: Option<String>,
}

fn xor_cipher(key: &[u8; 32], data: &mut [u8]) {
    let key = GenericArray::from_slice(key);
    let iv = GenericArray::from_slice(&SYNTHETIC_IV);
    let mut cipher = Aes256Ctr::new(key, iv);
    cipher.apply_keystream(data);
}

pub fn encode_cursor(keys: &CursorKeys, encryption_key: Option<&[u8; 32]>) -> String {
    let json = serde_json::to_vec(keys).expect("cursor keys always serialize");
    let bytes = match encryption_key {
        Some(key) => {
            let mut buf = json;
            xor_cipher(key, &mut buf);
            buf
        }
        None => json,
    };
    BASE64.encode(bytes)
}

pub fn decode_cursor(cursor: &str, encryption_key: Option<&[u8; 32]>) -> EngineResult<CursorKeys> {
    let mut bytes = BASE64.decode(cursor).map_err(|_| EngineError::invalid_cursor())?;
    if let Some(key) = encryption_key {
        xor_cipher(key, &mut bytes);
    }
    serde_json::from_slice(&bytes).map_err(|_| EngineError::invalid_cursor())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// §4.4.7 input validation: at most one of `first`/`last`, at most one of
/// `before`/`after`, and `before+first`/`last+after` are rejected outright.
#[derive(Clone, Debug, Default)]
pub struct PageRequest {
    pub first: Option<usize>,
    pub last: Option<usize>,
    pub before: Option<String>,
    pub after: Option<String>,
}

pub struct Page {
    pub items: Vec<gridstore_core::RawObject>,
    pub cursors: Vec<String>,
    pub has_next_page: bool,
    pub has_previous_page: bool,
}

const DEFAULT_PAGE_SIZE: usize = 20;
const MAX_PAGE_SIZE: usize = 50;

fn validate(req: &PageRequest) -> EngineResult<(usize, Direction)> {
    if req.first.is_some() && req.last.is_some() {
        return Err(EngineError::Pagination("only one of first/last may be given".into()));
    }
    if req.before.is_some() && req.after.is_some() {
        return Err(EngineError::Pagination("only one of before/after may be given".into()));
    }
    if req.before.is_some() && req.first.is_some() {
        return Err(EngineError::Pagination("before cannot be combined with first".into()));
    }
    if req.after.is_some() && req.last.is_some() {
        return Err(EngineError::Pagination("after cannot be combined with last".into()));
    }

    let limit = req.first.or(req.last).unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE);
    let direction = if req.before.is_some() || req.last.is_some() {
        Direction::Backward
    } else {
        Direction::Forward
    };
    Ok((limit, direction))
}

/// Runs one page of a key-condition query (§4.4.7). `index` selects a GSI
/// (1-5) or `None` for the primary index; `encryption_key`, when set,
/// enables cursor encryption.
pub async fn paginate(
    store: &dyn Store,
    table: &str,
    pk: &str,
    index: Option<u8>,
    req: PageRequest,
    encryption_key: Option<&[u8; 32]>,
) -> EngineResult<Page> {
    let (limit, direction) = validate(&req)?;

    let start_key = match (&req.after, &req.before) {
        (Some(cursor), _) => Some(to_key(&decode_cursor(cursor, encryption_key)?)),
        (_, Some(cursor)) => Some(to_key(&decode_cursor(cursor, encryption_key)?)),
        _ => None,
    };

    let params = QueryParams {
        index,
        pk: pk.to_string(),
        sk_prefix: None,
        start_key,
        // §4.4.7: fetch limit+1 to learn whether another page exists.
        limit: Some(limit + 1),
        forward: matches!(direction, Direction::Forward),
    };

    let QueryResult { mut items, .. } = store
        .query(table, params)
        .await
        .map_err(|e| EngineError::Other(e.to_string()))?;

    let got_extra = items.len() > limit;
    if got_extra {
        items.truncate(limit);
    }

    let (has_next_page, has_previous_page) = match direction {
        Direction::Forward => (got_extra, req.after.is_some()),
        Direction::Backward => (req.before.is_some(), got_extra),
    };

    if direction == Direction::Backward {
        items.reverse();
    }

    let cursors = items
        .iter()
        .map(|item| {
            let keys = CursorKeys {
                pk: item.get("PK").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                sk: item.get("SK").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                gsi_pk: index
                    .filter(|i| *i != 1)
                    .and_then(|i| item.get(&format!("GSI{i}PK")).and_then(|v| v.as_str()))
                    .map(str::to_string),
                gsi_sk: index
                    .filter(|i| *i != 1)
                    .and_then(|i| item.get(&format!("GSI{i}SK")).and_then(|v| v.as_str()))
                    .map(str::to_string),
            };
            encode_cursor(&keys, encryption_key)
        })
        .collect();

    Ok(Page {
        items,
        cursors,
        has_next_page,
        has_previous_page,
    })
}

fn to_key(keys: &CursorKeys) -> Key {
    Key::new(keys.pk.clone(), keys.sk.clone())
}
