//! GROUP_CREATE, GROUP_LIST, GROUP_MEMBERS, GROUP_ADD, GROUP_REMOVE,
//! GROUP_LEAVE. §4.6, §6.

use super::{require_field, username_of, HandlerCtx};
use crate::delivery;
use crate::error::AppError;
use chat_core::protocol::Request;
use chat_core::store::groups::GroupStore;
use chat_core::types::{GroupId, UserId};

fn parse_group_id(req: &Request) -> Result<GroupId, AppError> {
    let raw = require_field(req, "group_id")?;
    GroupId::parse(raw).ok_or_else(|| AppError::Handler(chat_core::error::HandlerError::InvalidGroupId))
}

pub fn create(ctx: &HandlerCtx, user_id: UserId, req: &Request) -> Result<Vec<(String, String)>, AppError> {
    let name = require_field(req, "name")?.to_string();
    let db = ctx.state.db.lock().unwrap();
    let group_id = GroupStore::new(&db).create(user_id, &name)?;
    Ok(vec![
        ("group_id".into(), group_id.to_string()),
        ("name".into(), name),
    ])
}

pub fn list(ctx: &HandlerCtx, user_id: UserId) -> Result<Vec<(String, String)>, AppError> {
    let db = ctx.state.db.lock().unwrap();
    let ids = GroupStore::new(&db).list(user_id)?;
    let joined = ids.iter().map(|g| g.to_string()).collect::<Vec<_>>().join(",");
    Ok(vec![("groups".into(), joined)])
}

pub fn members(ctx: &HandlerCtx, user_id: UserId, req: &Request) -> Result<Vec<(String, String)>, AppError> {
    let group_id = parse_group_id(req)?;
    let db = ctx.state.db.lock().unwrap();
    let names = GroupStore::new(&db).members(user_id, group_id)?;
    Ok(vec![("members".into(), names.join(","))])
}

pub fn add(ctx: &HandlerCtx, user_id: UserId, req: &Request) -> Result<Vec<(String, String)>, AppError> {
    let group_id = parse_group_id(req)?;
    let username = require_field(req, "username")?.to_string();
    let db = ctx.state.db.lock().unwrap();
    GroupStore::new(&db).add(user_id, group_id, &username)?;
    Ok(vec![
        ("group_id".into(), group_id.to_string()),
        ("username".into(), username),
        ("status".into(), "added".into()),
    ])
}

/// Removing a member currently subscribed to the group's GM also emits
/// `PUSH GM_KICKED` to them and `PUSH GM_LEAVE` to the rest (§4.6, §4.8).
pub fn remove(ctx: &HandlerCtx, user_id: UserId, req: &Request) -> Result<Vec<(String, String)>, AppError> {
    let group_id = parse_group_id(req)?;
    let username = require_field(req, "username")?.to_string();

    let (removed, outcome, members_after) = {
        let db = ctx.state.db.lock().unwrap();
        let store = GroupStore::new(&db);
        let (removed, outcome) = store.remove(user_id, group_id, &username, &ctx.state.sessions)?;
        let members_after = store.member_ids(group_id)?;
        (removed, outcome, members_after)
    };

    if outcome.was_subscribed {
        delivery::push_gm_kicked(&ctx.state.sessions, removed);
        let removed_username = username_of(ctx.state, removed)?;
        delivery::fanout_gm_leave(&ctx.state.sessions, &members_after, group_id, removed, &removed_username);
    }

    Ok(vec![
        ("group_id".into(), group_id.to_string()),
        ("username".into(), username),
        ("status".into(), "removed".into()),
    ])
}

pub fn leave(ctx: &HandlerCtx, user_id: UserId, req: &Request) -> Result<Vec<(String, String)>, AppError> {
    let group_id = parse_group_id(req)?;
    let db = ctx.state.db.lock().unwrap();
    GroupStore::new(&db).leave(user_id, group_id)?;
    Ok(vec![
        ("group_id".into(), group_id.to_string()),
        ("status".into(), "left".into()),
    ])
}
