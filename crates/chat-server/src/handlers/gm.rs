//! GM_CHAT_START, GM_CHAT_END, GM_SEND. §4.8, §4.9, §6.

use super::{end_current_subscription, require_field, username_of, HandlerCtx};
use crate::delivery;
use crate::error::AppError;
use chat_core::error::HandlerError;
use chat_core::protocol::Request;
use chat_core::store::gm::{GmError, GmMessage, GmStore, DEFAULT_HISTORY_LIMIT};
use chat_core::store::groups::GroupStore;
use chat_core::types::{GroupId, Subscription, UserId};

fn parse_group_id(req: &Request) -> Result<GroupId, AppError> {
    let raw = require_field(req, "group_id")?;
    GroupId::parse(raw).ok_or(AppError::Handler(HandlerError::InvalidGroupId))
}

fn format_history(ctx: &HandlerCtx, messages: &[GmMessage]) -> Result<String, AppError> {
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

/// Joining a group chat implicitly ends whatever conversation the
/// session was previously subscribed to, same as PM_CHAT_START (§4.9).
pub fn chat_start(ctx: &HandlerCtx, user_id: UserId, req: &Request) -> Result<Vec<(String, String)>, AppError> {
    let group_id = parse_group_id(req)?;

    let (is_member, group_name, members) = {
        let db = ctx.state.db.lock().unwrap();
        let store = GroupStore::new(&db);
        let is_member = store.is_member_of(group_id, user_id)?;
        let group_name = store.name_of(group_id)?;
        let members = store.member_ids(group_id)?;
        (is_member, group_name, members)
    };
    if !is_member {
        return Err(AppError::Gm(GmError::NotMember));
    }

    end_current_subscription(ctx.state, user_id)?;
    ctx.state.sessions.set_subscription(user_id, Subscription::InGroup(group_id));

    let me = username_of(ctx.state, user_id)?;
    delivery::fanout_gm_join(&ctx.state.sessions, &members, group_id, user_id, &me);

    let history = {
        let db = ctx.state.db.lock().unwrap();
        GmStore::new(&db).history(group_id, DEFAULT_HISTORY_LIMIT)?
    };
    let history_str = format_history(ctx, &history)?;

    Ok(vec![
        ("group_name".into(), group_name),
        ("me".into(), me),
        ("history".into(), history_str),
    ])
}

pub fn chat_end(ctx: &HandlerCtx, user_id: UserId) -> Result<Vec<(String, String)>, AppError> {
    end_current_subscription(ctx.state, user_id)?;
    Ok(vec![("status".into(), "chat_ended".into())])
}

pub fn send(ctx: &HandlerCtx, user_id: UserId, req: &Request) -> Result<Vec<(String, String)>, AppError> {
    let group_id = parse_group_id(req)?;
    let content = require_field(req, "content")?.to_string();

    let (msg_id, members) = {
        let db = ctx.state.db.lock().unwrap();
        let store = GroupStore::new(&db);
        if !store.is_member_of(group_id, user_id)? {
            return Err(AppError::Gm(GmError::NotMember));
        }
        let msg_id = GmStore::new(&db).send(user_id, group_id, &content)?;
        let members = store.member_ids(group_id)?;
        (msg_id, members)
    };

    let from_username = username_of(ctx.state, user_id)?;
    let ts = now_unix();
    delivery::fanout_gm(
        &ctx.state.sessions,
        &members,
        group_id,
        user_id,
        &from_username,
        &content,
        msg_id.0,
        ts,
    );

    Ok(vec![
        ("msg_id".into(), msg_id.to_string()),
        ("group_id".into(), group_id.to_string()),
        ("status".into(), "sent".into()),
    ])
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
