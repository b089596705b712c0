//! PM_CONVERSATIONS, PM_CHAT_START, PM_CHAT_END, PM_SEND, PM_HISTORY. §4.7, §4.9, §6.

use super::{end_current_subscription, require_field, username_of, HandlerCtx};
use crate::delivery;
use crate::error::AppError;
use chat_core::protocol::Request;
use chat_core::store::accounts::AccountStore;
use chat_core::store::pm::{PmError, PmMessage, PmStore, DEFAULT_HISTORY_LIMIT};
use chat_core::types::{Subscription, UserId};

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn lookup_user(ctx: &HandlerCtx, username: &str) -> Result<UserId, AppError> {
    let db = ctx.state.db.lock().unwrap();
    AccountStore::new(&db)
        .lookup_id(username)
        .map_err(AppError::Account)?
        .ok_or_else(|| AppError::Pm(PmError::UserNotFound))
}

/// Formats as `msg_id:from_username:content_b64:timestamp`, comma-joined,
/// or the literal `"empty"` when there is nothing to show (§4.7).
fn format_history(ctx: &HandlerCtx, messages: &[PmMessage]) -> Result<String, AppError> {
    if messages.is_empty() {
        return Ok("empty".to_string());
    }
    let mut parts = Vec::with_capacity(messages.len());
    for m in messages {
        let from_username = username_of(ctx.state, m.from)?;
        parts.push(format!("{}:{}:{}:{}", m.msg_id, from_username, m.content, m.ts));
    }
    Ok(parts.join(","))
}

pub fn conversations(ctx: &HandlerCtx, user_id: UserId) -> Result<Vec<(String, String)>, AppError> {
    let db = ctx.state.db.lock().unwrap();
    let convos = PmStore::new(&db).conversations(user_id)?;
    drop(db);
    let joined = if convos.is_empty() {
        "empty".to_string()
    } else {
        convos
            .into_iter()
            .map(|(name, unread)| format!("{name}:{unread}"))
            .collect::<Vec<_>>()
            .join(",")
    };
    Ok(vec![("conversations".into(), joined)])
}

/// Starting a new PM chat implicitly ends whatever conversation the
/// session was previously subscribed to (§4.9 / §4.11's state machine).
pub fn chat_start(ctx: &HandlerCtx, user_id: UserId, req: &Request) -> Result<Vec<(String, String)>, AppError> {
    let username = require_field(req, "with")?.to_string();
    let other = lookup_user(ctx, &username)?;

    end_current_subscription(ctx.state, user_id)?;

    let history = {
        let db = ctx.state.db.lock().unwrap();
        let pm = PmStore::new(&db);
        pm.mark_read_from(user_id, other)?;
        pm.history(user_id, other, DEFAULT_HISTORY_LIMIT)?
    };

    ctx.state.sessions.set_subscription(user_id, Subscription::PrivateWith(other));

    if ctx.state.sessions.is_subscribed_to_pm_with(other, user_id) {
        let my_username = username_of(ctx.state, user_id)?;
        delivery::push_join(&ctx.state.sessions, other, &my_username);
    }

    let me = username_of(ctx.state, user_id)?;
    let history_str = format_history(ctx, &history)?;
    Ok(vec![
        ("with".into(), username),
        ("me".into(), me),
        ("history".into(), history_str),
    ])
}

pub fn chat_end(ctx: &HandlerCtx, user_id: UserId) -> Result<Vec<(String, String)>, AppError> {
    if let Some(Subscription::PrivateWith(other)) = ctx.state.sessions.subscription_of(user_id) {
        let db = ctx.state.db.lock().unwrap();
        PmStore::new(&db).mark_read_from(user_id, other)?;
    }
    end_current_subscription(ctx.state, user_id)?;
    Ok(vec![("status".into(), "chat_ended".into())])
}

pub fn send(ctx: &HandlerCtx, user_id: UserId, req: &Request) -> Result<Vec<(String, String)>, AppError> {
    let to = require_field(req, "to")?.to_string();
    let content = require_field(req, "content")?.to_string();

    let (msg_id, recipient) = {
        let db = ctx.state.db.lock().unwrap();
        PmStore::new(&db).send(user_id, &to, &content)?
    };

    if ctx.state.sessions.is_subscribed_to_pm_with(recipient, user_id) {
        let from_username = username_of(ctx.state, user_id)?;
        delivery::push_pm(&ctx.state.sessions, recipient, &from_username, &content, msg_id.0, now_unix());
    }

    Ok(vec![
        ("msg_id".into(), msg_id.to_string()),
        ("to".into(), to),
        ("status".into(), "sent".into()),
    ])
}

pub fn history(ctx: &HandlerCtx, user_id: UserId, req: &Request) -> Result<Vec<(String, String)>, AppError> {
    let with = require_field(req, "with")?.to_string();
    let other = lookup_user(ctx, &with)?;
    let limit = req
        .field("limit")
        .and_then(|s| s.parse::<i64>().ok())
        .unwrap_or(DEFAULT_HISTORY_LIMIT);

    let messages = {
        let db = ctx.state.db.lock().unwrap();
        PmStore::new(&db).history(user_id, other, limit)?
    };
    let history_str = format_history(ctx, &messages)?;
    Ok(vec![("with".into(), with), ("messages".into(), history_str)])
}
