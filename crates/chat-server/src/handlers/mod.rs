//! Verb handlers, one module per domain (§4.4-§4.8). Every handler is
//! called already-authenticated (except `account`'s REGISTER/LOGIN/PING,
//! dispatched directly by the router) and returns the OK payload's
//! key/value pairs; the router wraps it in `OK REQ_ID ...`.

pub mod account;
pub mod friends;
pub mod gm;
pub mod groups;
pub mod pm;

use crate::delivery;
use crate::error::AppError;
use crate::state::AppState;
use chat_core::error::HandlerError;
use chat_core::protocol::Request;
use chat_core::session::{ConnId, OutboundTx};
use chat_core::store::groups::GroupStore;
use chat_core::types::{Subscription, UserId};

/// Context threaded through every handler call. `outbound` is this
/// connection's own channel sender — the only handler that uses it
/// directly is LOGIN, which hands it to the session registry so that
/// from then on, a push addressed to this user and a response to this
/// connection both flow through the same queue (§9, §4.12).
pub struct HandlerCtx<'a> {
    pub state: &'a AppState,
    pub conn_id: ConnId,
    pub outbound: OutboundTx,
}

/// Fetches a required field, mapping absence to the router's
/// `missing_fields` response per §4.2/§4.10 step 4.
pub fn require_field<'a>(req: &'a Request, key: &str) -> Result<&'a str, AppError> {
    req.field(key).ok_or(AppError::Handler(HandlerError::MissingFields))
}

/// Looks up `user_id`'s username, collapsing a missing account (which
/// should never happen for an authenticated session) to an internal
/// error rather than propagating an `Option`.
pub fn username_of(state: &AppState, user_id: UserId) -> Result<String, AppError> {
    let db = state.db.lock().unwrap();
    chat_core::store::accounts::AccountStore::new(&db)
        .lookup_username(user_id)
        .map_err(AppError::Account)?
        .ok_or_else(|| AppError::Handler(HandlerError::Internal("session user has no account row".into())))
}

/// Ends whatever conversation `user_id` was subscribed to, emitting the
/// matching LEAVE-family push, then clears the subscription. Shared by
/// `PM_CHAT_END`/`GM_CHAT_END` and by connection teardown.
pub fn end_current_subscription(state: &AppState, user_id: UserId) -> Result<(), AppError> {
    let Some(subscription) = state.sessions.subscription_of(user_id) else {
        return Ok(());
    };
    match subscription {
        Subscription::None => {}
        Subscription::PrivateWith(partner) => {
            let username = username_of(state, user_id)?;
            if state.sessions.is_subscribed_to_pm_with(partner, user_id) {
                delivery::push_leave(&state.sessions, partner, &username);
            }
        }
        Subscription::InGroup(group) => {
            let username = username_of(state, user_id)?;
            let members = {
                let db = state.db.lock().unwrap();
                GroupStore::new(&db).member_ids(group)
            }
            .map_err(AppError::Group)?;
            delivery::fanout_gm_leave(&state.sessions, &members, group, user_id, &username);
        }
    }
    state.sessions.set_subscription(user_id, Subscription::None);
    Ok(())
}

/// Full connection teardown: socket loss, oversize record, or explicit
/// DISCONNECT (§4.11's terminal state). Emits the departing user's LEAVE
/// push (if any) and releases their session slot.
pub fn teardown_connection(state: &AppState, conn_id: ConnId) {
    let Some((user_id, subscription)) = state.sessions.remove_by_connection(conn_id) else {
        return;
    };
    let Ok(username) = username_of(state, user_id) else {
        return;
    };
    match subscription {
        Subscription::None => {}
        Subscription::PrivateWith(partner) => {
            if state.sessions.is_subscribed_to_pm_with(partner, user_id) {
                delivery::push_leave(&state.sessions, partner, &username);
            }
        }
        Subscription::InGroup(group) => {
            let members = {
                let db = state.db.lock().unwrap();
                GroupStore::new(&db).member_ids(group)
            };
            if let Ok(members) = members {
                delivery::fanout_gm_leave(&state.sessions, &members, group, user_id, &username);
            }
        }
    }
}
