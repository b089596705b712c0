//! The request/response/push line protocol.
//!
//! # Record Syntax
//!
//! ```text
//! VERB REQ_ID [k1=v1 [k2=v2 ...]]
//! ```
//!
//! `VERB` and `REQ_ID` are non-empty, whitespace-free ASCII tokens. Values
//! are whitespace-free; a value may itself contain `=` — the key is only
//! the prefix up to the token's *first* `=`. There is no quoting: callers
//! must pre-encode any value containing whitespace (PM/GM content uses
//! base64 for exactly this reason, transparently to this codec).
//!
//! # Responses
//!
//! - `OK REQ_ID [payload]`
//! - `ERR REQ_ID CODE MESSAGE`
//!
//! # Pushes
//!
//! Server-initiated records beginning with `PUSH ` carry no REQ_ID — they
//! are not responses to anything the recipient sent.

use crate::error::WireError;
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// A parsed request record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub verb: String,
    pub req_id: String,
    pub fields: BTreeMap<String, String>,
}

impl Request {
    /// Looks up a required field, in the style of the original C reference's
    /// `kv_get` helper.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }
}

/// Parses one record's bytes into a [`Request`].
///
/// A parse failure (empty verb or missing req-id) has no well-formed
/// `req_id` to answer with; callers must reply with `ERR 0 400 bad_request`
/// per §4.2.
pub fn parse_request(record: &[u8]) -> Option<Request> {
    let text = std::str::from_utf8(record).ok()?;
    let mut tokens = text.split_ascii_whitespace();

    let verb = tokens.next()?.to_string();
    let req_id = tokens.next()?.to_string();

    let mut fields = BTreeMap::new();
    for token in tokens {
        match token.split_once('=') {
            Some((k, v)) => {
                fields.insert(k.to_string(), v.to_string());
            }
            None => {
                // A bare token with no '=' carries no value. No verb in the
                // wire table ever sends one; treat it as a key with an
                // empty value rather than discarding it so the codec stays
                // total over its input.
                fields.insert(token.to_string(), String::new());
            }
        }
    }

    Some(Request {
        verb,
        req_id,
        fields,
    })
}

/// Serializes a successful response: `OK REQ_ID [k=v ...]`.
///
/// Matches the original reference's `proto_send_ok`: the trailing space
/// before the payload is omitted entirely when there is no payload, rather
/// than leaving a dangling space before the CRLF.
pub fn encode_ok(req_id: &str, fields: &[(&str, &str)]) -> Vec<u8> {
    let mut out = format!("OK {req_id}");
    for (k, v) in fields {
        let _ = write!(out, " {k}={v}");
    }
    out.into_bytes()
}

/// Serializes an error response: `ERR REQ_ID CODE MESSAGE`.
pub fn encode_err(req_id: &str, code: u16, tag: &str) -> Vec<u8> {
    format!("ERR {req_id} {code} {tag}").into_bytes()
}

/// Serializes an error response directly from a [`WireError`] implementer.
pub fn encode_err_from<E: WireError>(req_id: &str, err: &E) -> Vec<u8> {
    let (code, tag) = err.wire();
    encode_err(req_id, code, tag)
}

/// Serializes a server-initiated push record: `PUSH NAME [k=v ...]`.
pub fn encode_push(name: &str, fields: &[(&str, &str)]) -> Vec<u8> {
    let mut out = format!("PUSH {name}");
    for (k, v) in fields {
        let _ = write!(out, " {k}={v}");
    }
    out.into_bytes()
}
