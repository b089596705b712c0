//! Dispatches one parsed record to its handler and serializes the
//! response. Implements §4.10's five-step pipeline:
//!
//! 1. Parse the record — a parse failure has no req-id, so it answers
//!    `ERR 0 400 bad_request`.
//! 2. PING/REGISTER/LOGIN dispatch without a session.
//! 3. Every other verb requires a valid `token` field — absence or an
//!    invalid/expired token answers `401 invalid_token`.
//! 4. The verb is looked up against the authenticated handler table —
//!    an unknown verb answers `404 unknown_command`.
//! 5. The handler itself answers `400 missing_fields` or a domain-specific
//!    error for anything it rejects.
//!
//! Exactly one response record is produced per request, always carrying
//! the request's own req-id (or `"0"` for an unparsable record).

use crate::error::AppError;
use crate::handlers::{account, friends, gm, groups, pm, HandlerCtx};
use crate::state::AppState;
use chat_core::error::{HandlerError, WireError};
use chat_core::protocol::{encode_err, encode_err_from, encode_ok, parse_request, Request};
use chat_core::session::{ConnId, OutboundTx};
use chat_core::types::{Token, UserId};
use tracing::{debug, warn};

/// The outcome of dispatching one record: the response bytes to send
/// back, and whether the worker must close the connection after sending
/// it (set only by a successful DISCONNECT, §4.11).
pub struct Dispatch {
    pub response: Vec<u8>,
    pub close: bool,
}

fn ok(req_id: &str, fields: Vec<(String, String)>) -> Dispatch {
    let refs: Vec<(&str, &str)> = fields.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
    Dispatch {
        response: encode_ok(req_id, &refs),
        close: false,
    }
}

fn err<E: WireError>(req_id: &str, e: &E) -> Dispatch {
    Dispatch {
        response: encode_err_from(req_id, e),
        close: false,
    }
}

/// Logs the outcome of one handler call and builds its response. §4.13's
/// logging points, centralized here rather than duplicated in every
/// handler — the same shape as the teacher's own IPC dispatch loop,
/// which logs once per request at the point where it already knows the
/// verb and the outcome rather than inside each command's handler.
fn result(verb: &str, req_id: &str, user_id: Option<UserId>, r: Result<Vec<(String, String)>, AppError>) -> Dispatch {
    // -1 stands in for "not yet authenticated" (REGISTER/LOGIN) — real
    // ids are always positive, assigned by SQLite's AUTOINCREMENT.
    let user_id = user_id.map_or(-1, |u| u.0);
    match r {
        Ok(fields) => {
            debug!(verb, req_id, user_id, "request handled");
            ok(req_id, fields)
        }
        Err(e) => {
            let (code, tag) = e.wire();
            if code >= 500 {
                warn!(verb, req_id, user_id, code, tag, "request failed");
            } else {
                debug!(verb, req_id, user_id, code, tag, "request rejected");
            }
            err(req_id, &e)
        }
    }
}

/// Dispatches one record. `outbound` is this connection's own channel
/// sender, threaded through in case the verb is LOGIN (the only verb
/// that needs it — see [`HandlerCtx`]).
pub fn dispatch(state: &AppState, conn_id: ConnId, outbound: &OutboundTx, record: &[u8]) -> Dispatch {
    let Some(req) = parse_request(record) else {
        return Dispatch {
            response: encode_err("0", 400, "bad_request"),
            close: false,
        };
    };

    let ctx = HandlerCtx {
        state,
        conn_id,
        outbound: outbound.clone(),
    };

    match req.verb.as_str() {
        "PING" => return ok(&req.req_id, account::ping()),
        "REGISTER" => return result(&req.verb, &req.req_id, None, account::register(&ctx, &req)),
        "LOGIN" => return result(&req.verb, &req.req_id, None, account::login(&ctx, &req)),
        _ => {}
    }

    let token_str = req.field("token").unwrap_or("");
    let user_id = match state.sessions.validate(&Token::from_wire(token_str)) {
        Ok(user_id) => user_id,
        Err(_) => return err(&req.req_id, &HandlerError::InvalidToken),
    };

    dispatch_authenticated(&ctx, user_id, &req)
}

fn dispatch_authenticated(ctx: &HandlerCtx, user_id: UserId, req: &Request) -> Dispatch {
    let outcome: Result<Vec<(String, String)>, AppError> = match req.verb.as_str() {
        "LOGOUT" => account::logout(ctx, req),
        "WHOAMI" => Ok(account::whoami(user_id)),
        "DISCONNECT" => Ok(account::disconnect()),

        "FRIEND_INVITE" => friends::invite(ctx, user_id, req),
        "FRIEND_ACCEPT" => friends::accept(ctx, user_id, req),
        "FRIEND_REJECT" => friends::reject(ctx, user_id, req),
        "FRIEND_PENDING" => friends::pending(ctx, user_id),
        "FRIEND_LIST" => friends::list(ctx, user_id),
        "FRIEND_DELETE" => friends::delete(ctx, user_id, req),

        "GROUP_CREATE" => groups::create(ctx, user_id, req),
        "GROUP_LIST" => groups::list(ctx, user_id),
        "GROUP_MEMBERS" => groups::members(ctx, user_id, req),
        "GROUP_ADD" => groups::add(ctx, user_id, req),
        "GROUP_REMOVE" => groups::remove(ctx, user_id, req),
        "GROUP_LEAVE" => groups::leave(ctx, user_id, req),

        "PM_CONVERSATIONS" => pm::conversations(ctx, user_id),
        "PM_CHAT_START" => pm::chat_start(ctx, user_id, req),
        "PM_CHAT_END" => pm::chat_end(ctx, user_id),
        "PM_SEND" => pm::send(ctx, user_id, req),
        "PM_HISTORY" => pm::history(ctx, user_id, req),

        "GM_CHAT_START" => gm::chat_start(ctx, user_id, req),
        "GM_CHAT_END" => gm::chat_end(ctx, user_id),
        "GM_SEND" => gm::send(ctx, user_id, req),

        _ => return err(&req.req_id, &HandlerError::UnknownCommand),
    };

    let is_disconnect = req.verb == "DISCONNECT";
    let dispatch = result(&req.verb, &req.req_id, Some(user_id), outcome);
    let close = is_disconnect && dispatch.response.starts_with(b"OK");
    Dispatch {
        response: dispatch.response,
        close,
    }
}
