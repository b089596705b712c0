//! The wire-level error vocabulary (§7) and the trait every domain error
//! implements to map itself onto `(code, tag)`.

/// Anything that can be turned into a wire `ERR <req_id> <code> <tag>` line.
pub trait WireError {
    /// Returns the numeric status code and short machine-readable tag.
    fn wire(&self) -> (u16, &'static str);
}

/// A handler-level error not tied to a specific store — missing fields,
/// bad tokens, unknown commands, and the catch-all internal failure.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("bad request")]
    BadRequest,
    #[error("missing required fields")]
    MissingFields,
    #[error("invalid token")]
    InvalidToken,
    #[error("unknown command")]
    UnknownCommand,
    #[error("invalid fields: {0}")]
    InvalidFields(String),
    #[error("invalid group id")]
    InvalidGroupId,
    #[error("user already has an active session")]
    AlreadyLoggedIn,
    #[error("internal error: {0}")]
    Internal(String),
}

impl WireError for HandlerError {
    fn wire(&self) -> (u16, &'static str) {
        match self {
            HandlerError::BadRequest => (400, "bad_request"),
            HandlerError::MissingFields => (400, "missing_fields"),
            HandlerError::InvalidGroupId => (400, "invalid_group_id"),
            HandlerError::InvalidToken => (401, "invalid_token"),
            HandlerError::UnknownCommand => (404, "unknown_command"),
            HandlerError::AlreadyLoggedIn => (409, "already_logged_in"),
            HandlerError::InvalidFields(_) => (422, "invalid_fields"),
            HandlerError::Internal(_) => (500, "server_error"),
        }
    }
}
