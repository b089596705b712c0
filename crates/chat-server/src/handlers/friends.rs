//! FRIEND_INVITE, FRIEND_ACCEPT, FRIEND_REJECT, FRIEND_PENDING,
//! FRIEND_LIST, FRIEND_DELETE. §4.5, §6.

use super::{require_field, HandlerCtx};
use crate::error::AppError;
use chat_core::protocol::Request;
use chat_core::store::friends::FriendStore;
use chat_core::types::UserId;

pub fn invite(ctx: &HandlerCtx, user_id: UserId, req: &Request) -> Result<Vec<(String, String)>, AppError> {
    let username = require_field(req, "username")?.to_string();
    let db = ctx.state.db.lock().unwrap();
    FriendStore::new(&db).invite(user_id, &username)?;
    Ok(vec![
        ("username".into(), username),
        ("status".into(), "pending".into()),
    ])
}

pub fn accept(ctx: &HandlerCtx, user_id: UserId, req: &Request) -> Result<Vec<(String, String)>, AppError> {
    let username = require_field(req, "username")?.to_string();
    let db = ctx.state.db.lock().unwrap();
    FriendStore::new(&db).accept(user_id, &username)?;
    Ok(vec![
        ("username".into(), username),
        ("status".into(), "accepted".into()),
    ])
}

pub fn reject(ctx: &HandlerCtx, user_id: UserId, req: &Request) -> Result<Vec<(String, String)>, AppError> {
    let username = require_field(req, "username")?.to_string();
    let db = ctx.state.db.lock().unwrap();
    FriendStore::new(&db).reject(user_id, &username)?;
    Ok(vec![
        ("username".into(), username),
        ("status".into(), "rejected".into()),
    ])
}

pub fn pending(ctx: &HandlerCtx, user_id: UserId) -> Result<Vec<(String, String)>, AppError> {
    let db = ctx.state.db.lock().unwrap();
    let names = FriendStore::new(&db).pending(user_id)?;
    Ok(vec![("username".into(), names.join(","))])
}

pub fn list(ctx: &HandlerCtx, user_id: UserId) -> Result<Vec<(String, String)>, AppError> {
    let db = ctx.state.db.lock().unwrap();
    let entries = FriendStore::new(&db).list(user_id, &ctx.state.sessions)?;
    Ok(vec![("username".into(), entries.join(","))])
}

pub fn delete(ctx: &HandlerCtx, user_id: UserId, req: &Request) -> Result<Vec<(String, String)>, AppError> {
    let username = require_field(req, "username")?.to_string();
    let db = ctx.state.db.lock().unwrap();
    FriendStore::new(&db).delete(user_id, &username)?;
    Ok(vec![
        ("username".into(), username),
        ("status".into(), "deleted".into()),
    ])
}
