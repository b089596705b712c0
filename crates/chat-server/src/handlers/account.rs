//! PING, REGISTER, LOGIN, LOGOUT, WHOAMI, DISCONNECT. §6's verb table.

use super::{require_field, HandlerCtx};
use crate::error::AppError;
use chat_core::error::HandlerError;
use chat_core::protocol::Request;
use chat_core::session::SessionError;
use chat_core::store::accounts::AccountStore;
use chat_core::types::{Token, UserId};

pub fn ping() -> Vec<(String, String)> {
    vec![("pong".into(), "1".into())]
}

pub fn register(ctx: &HandlerCtx, req: &Request) -> Result<Vec<(String, String)>, AppError> {
    let username = require_field(req, "username")?;
    let password = require_field(req, "password")?;
    let email = require_field(req, "email")?;

    let db = ctx.state.db.lock().unwrap();
    let user_id = AccountStore::new(&db).register(username, password, email)?;
    Ok(vec![("user_id".into(), user_id.to_string())])
}

/// Registers a session bound to this connection's own outbound channel
/// (`ctx.outbound`, handed in by the worker before the first record is
/// even read) — that channel is the only place pushes for this
/// connection can ever be sent from now on.
pub fn login(ctx: &HandlerCtx, req: &Request) -> Result<Vec<(String, String)>, AppError> {
    let username = require_field(req, "username")?;
    let password = require_field(req, "password")?;

    let user_id = {
        let db = ctx.state.db.lock().unwrap();
        AccountStore::new(&db).authenticate(username, password)?
    };

    let token = ctx
        .state
        .sessions
        .create(user_id, ctx.conn_id, ctx.outbound.clone())
        .map_err(session_error_to_app)?;

    Ok(vec![
        ("token".into(), token.to_string()),
        ("user_id".into(), user_id.to_string()),
    ])
}

fn session_error_to_app(e: SessionError) -> AppError {
    AppError::Handler(match e {
        SessionError::AlreadyLoggedIn => HandlerError::AlreadyLoggedIn,
        SessionError::Full => HandlerError::Internal("session table full".into()),
        SessionError::NotFound | SessionError::Expired => HandlerError::InvalidToken,
    })
}

pub fn logout(ctx: &HandlerCtx, req: &Request) -> Result<Vec<(String, String)>, AppError> {
    let token_str = require_field(req, "token")?;
    ctx.state.sessions.destroy(&Token::from_wire(token_str));
    Ok(vec![("ok".into(), "1".into())])
}

pub fn whoami(user_id: UserId) -> Vec<(String, String)> {
    vec![("user_id".into(), user_id.to_string())]
}

/// DISCONNECT's own response is just `ok=1`; the router flags the
/// dispatch as closing the connection (§4.11), since that's a
/// worker-level concern this handler has no access to.
pub fn disconnect() -> Vec<(String, String)> {
    vec![("ok".into(), "1".into())]
}
