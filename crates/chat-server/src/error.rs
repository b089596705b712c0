//! The handler-visible error type: every store error plus the router's
//! own [`chat_core::error::HandlerError`], unified so a handler can use
//! `?` regardless of which store it called into.

use chat_core::error::{HandlerError, WireError};
use chat_core::store::accounts::AccountError;
use chat_core::store::friends::FriendError;
use chat_core::store::gm::GmError;
use chat_core::store::groups::GroupError;
use chat_core::store::pm::PmError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Handler(#[from] HandlerError),
    #[error(transparent)]
    Account(#[from] AccountError),
    #[error(transparent)]
    Friend(#[from] FriendError),
    #[error(transparent)]
    Group(#[from] GroupError),
    #[error(transparent)]
    Pm(#[from] PmError),
    #[error(transparent)]
    Gm(#[from] GmError),
}

impl WireError for AppError {
    fn wire(&self) -> (u16, &'static str) {
        match self {
            AppError::Handler(e) => e.wire(),
            AppError::Account(e) => e.wire(),
            AppError::Friend(e) => e.wire(),
            AppError::Group(e) => e.wire(),
            AppError::Pm(e) => e.wire(),
            AppError::Gm(e) => e.wire(),
        }
    }
}
