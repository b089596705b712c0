//! Domain types for the chat server.
//!
//! Identities are modelled as newtypes — thin wrappers around primitives
//! that give them distinct types. A `UserId` can never be passed where a
//! `GroupId` is expected, even though both are `i64` underneath.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ---------------------------------------------------------------------------
// UserId / GroupId / MsgId — integer identities assigned by the server
// ---------------------------------------------------------------------------

/// A unique, monotonically assigned account identifier. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A unique, monotonically assigned group identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupId(pub i64);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl GroupId {
    /// Parses a group id from a decimal string, as sent on the wire.
    pub fn parse(s: &str) -> Option<Self> {
        s.parse::<i64>().ok().filter(|v| *v > 0).map(GroupId)
    }
}

/// A unique, strictly increasing message identifier shared by PM and GM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MsgId(pub i64);

impl fmt::Display for MsgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Token — opaque session credential
// ---------------------------------------------------------------------------

/// An opaque, 32-printable-character session token handed out at LOGIN.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Token(String);

impl Token {
    pub const LENGTH: usize = 32;

    /// Generates a fresh random token from hex-encoded UUID entropy.
    pub fn generate() -> Self {
        // Two v4 UUIDs hex-encoded (32 hex chars each) give more than enough
        // entropy; we take the first 32 hex chars of the concatenation.
        let raw = format!(
            "{}{}",
            uuid::Uuid::new_v4().simple(),
            uuid::Uuid::new_v4().simple()
        );
        Self(raw[..Self::LENGTH].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Wraps a token string as received on the wire, for lookups — does
    /// not validate shape, since an unrecognized token is simply a
    /// `NotFound` at the registry rather than a malformed-request error.
    pub fn from_wire(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Username / Password / Email — validated account fields
// ---------------------------------------------------------------------------

/// Errors rejecting a candidate username, password, or email at the wire
/// boundary (these map to 422 `invalid_fields` at the handler).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FieldError {
    #[error("username must be 3-32 alphanumeric/underscore characters")]
    InvalidUsername,
    #[error("password must be at least 6 characters with no whitespace")]
    InvalidPassword,
    #[error("email must contain '@' and a following '.'")]
    InvalidEmail,
}

/// A validated username: 3-32 chars, alphanumeric plus underscore,
/// case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Username(String);

impl Username {
    pub fn parse(raw: &str) -> Result<Self, FieldError> {
        let len = raw.chars().count();
        if !(3..=32).contains(&len) {
            return Err(FieldError::InvalidUsername);
        }
        if !raw.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(FieldError::InvalidUsername);
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validates a candidate password: at least 6 characters, no whitespace.
/// The password itself is never stored — only its salted digest.
pub fn validate_password(raw: &str) -> Result<(), FieldError> {
    if raw.chars().count() < 6 || raw.chars().any(|c| c.is_whitespace()) {
        return Err(FieldError::InvalidPassword);
    }
    Ok(())
}

/// Validates a candidate email: contains `@` (not as the first character)
/// followed later by a `.` that is not the final character, with no
/// embedded whitespace.
pub fn validate_email(raw: &str) -> Result<(), FieldError> {
    if raw.chars().any(|c| c.is_whitespace()) {
        return Err(FieldError::InvalidEmail);
    }
    let Some(at) = raw.find('@') else {
        return Err(FieldError::InvalidEmail);
    };
    if at == 0 {
        return Err(FieldError::InvalidEmail);
    }
    let after_at = &raw[at + 1..];
    let Some(dot) = after_at.find('.') else {
        return Err(FieldError::InvalidEmail);
    };
    if dot == 0 || dot == after_at.len() - 1 {
        return Err(FieldError::InvalidEmail);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Subscription — the session's current conversation target
// ---------------------------------------------------------------------------

/// The conversation a session is currently subscribed to. Pushes for a
/// conversation are only delivered to sessions whose subscription matches.
///
/// Modeled as a single tagged variant rather than two independent fields
/// (a partner id plus a "group mode" flag) to eliminate the state where
/// both would otherwise be set at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subscription {
    None,
    PrivateWith(UserId),
    InGroup(GroupId),
}

impl Subscription {
    pub fn is_none(&self) -> bool {
        matches!(self, Subscription::None)
    }
}

// ---------------------------------------------------------------------------
// Friend state
// ---------------------------------------------------------------------------

/// The state of a friendship edge between two users.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FriendState {
    /// `inviter` has invited `invitee`; not yet accepted.
    Pending { inviter: UserId },
    Accepted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_valid() {
        assert!(Username::parse("alice_1").is_ok());
        assert!(Username::parse("abc").is_ok());
    }

    #[test]
    fn username_too_short() {
        assert_eq!(Username::parse("ab"), Err(FieldError::InvalidUsername));
    }

    #[test]
    fn username_too_long() {
        let long = "a".repeat(33);
        assert_eq!(Username::parse(&long), Err(FieldError::InvalidUsername));
    }

    #[test]
    fn username_rejects_symbols() {
        assert_eq!(Username::parse("al-ice"), Err(FieldError::InvalidUsername));
        assert_eq!(Username::parse("al ice"), Err(FieldError::InvalidUsername));
    }

    #[test]
    fn username_is_case_sensitive() {
        assert_ne!(
            Username::parse("Alice").unwrap().as_str(),
            Username::parse("alice").unwrap().as_str()
        );
    }

    #[test]
    fn password_valid() {
        assert!(validate_password("secret1").is_ok());
    }

    #[test]
    fn password_too_short() {
        assert_eq!(validate_password("abc12"), Err(FieldError::InvalidPassword));
    }

    #[test]
    fn password_rejects_whitespace() {
        assert_eq!(
            validate_password("has space"),
            Err(FieldError::InvalidPassword)
        );
    }

    #[test]
    fn email_valid() {
        assert!(validate_email("a@b.c").is_ok());
        assert!(validate_email("alice@example.com").is_ok());
    }

    #[test]
    fn email_missing_at() {
        assert_eq!(validate_email("alice.example.com"), Err(FieldError::InvalidEmail));
    }

    #[test]
    fn email_missing_dot_after_at() {
        assert_eq!(validate_email("alice@examplecom"), Err(FieldError::InvalidEmail));
    }

    #[test]
    fn email_at_is_first_char() {
        assert_eq!(validate_email("@b.c"), Err(FieldError::InvalidEmail));
    }

    #[test]
    fn email_dot_is_last_char() {
        assert_eq!(validate_email("a@b."), Err(FieldError::InvalidEmail));
    }

    #[test]
    fn token_generate_is_unique_and_sized() {
        let a = Token::generate();
        let b = Token::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), Token::LENGTH);
    }

    #[test]
    fn group_id_parse() {
        assert_eq!(GroupId::parse("42"), Some(GroupId(42)));
        assert_eq!(GroupId::parse("0"), None);
        assert_eq!(GroupId::parse("-1"), None);
        assert_eq!(GroupId::parse("abc"), None);
    }
}
