//! Private-message delivery: per-pair ordered log with a read flag. §4.7.

use super::accounts::AccountStore;
use super::db::Database;
use crate::error::WireError;
use crate::types::{MsgId, UserId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PmError {
    #[error("cannot send a message to yourself")]
    CannotSendToSelf,
    #[error("no such user")]
    UserNotFound,
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl WireError for PmError {
    fn wire(&self) -> (u16, &'static str) {
        match self {
            PmError::CannotSendToSelf => (422, "cannot_send_to_self"),
            PmError::UserNotFound => (404, "user_not_found"),
            PmError::Storage(_) => (500, "server_error"),
        }
    }
}

/// One persisted PM, as returned from history/conversation queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PmMessage {
    pub msg_id: MsgId,
    pub from: UserId,
    pub content: String,
    pub ts: i64,
}

pub const DEFAULT_HISTORY_LIMIT: i64 = 50;
pub const MAX_HISTORY_LIMIT: i64 = 100;

pub struct PmStore<'a> {
    db: &'a Database,
}

fn pair_key(a: UserId, b: UserId) -> (i64, i64) {
    if a.0 < b.0 {
        (a.0, b.0)
    } else {
        (b.0, a.0)
    }
}

impl<'a> PmStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    fn accounts(&self) -> AccountStore<'_> {
        AccountStore::new(self.db)
    }

    /// Persists a message from `from` to the account named `to_username`.
    /// Returns the assigned id and the recipient's id (so the caller can
    /// decide whether to push).
    pub fn send(
        &self,
        from: UserId,
        to_username: &str,
        content_b64: &str,
    ) -> Result<(MsgId, UserId), PmError> {
        let to = self
            .accounts()
            .lookup_id(to_username)
            .map_err(|_| PmError::UserNotFound)?
            .ok_or(PmError::UserNotFound)?;
        if to == from {
            return Err(PmError::CannotSendToSelf);
        }

        let msg_id = self.db.assign_msg_id();
        let (lo, hi) = pair_key(from, to);
        self.db.conn().execute(
            "INSERT INTO pm_messages (msg_id, pair_lo, pair_hi, from_id, content, ts, read_flag)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
            rusqlite::params![msg_id, lo, hi, from.0, content_b64, now_unix()],
        )?;
        Ok((MsgId(msg_id), to))
    }

    /// The `limit` most recent messages between `a` and `b`, newest first.
    pub fn history(&self, a: UserId, b: UserId, limit: i64) -> Result<Vec<PmMessage>, PmError> {
        let (lo, hi) = pair_key(a, b);
        let limit = limit.clamp(1, MAX_HISTORY_LIMIT);
        let mut stmt = self.db.conn().prepare(
            "SELECT msg_id, from_id, content, ts FROM pm_messages
             WHERE pair_lo = ?1 AND pair_hi = ?2
             ORDER BY msg_id DESC LIMIT ?3",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![lo, hi, limit], |row| {
                Ok(PmMessage {
                    msg_id: MsgId(row.get(0)?),
                    from: UserId(row.get(1)?),
                    content: row.get(2)?,
                    ts: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// `(other_username, unread_count)` for every pair log containing
    /// `user`, where `unread_count` counts messages from `other` not yet
    /// marked read.
    pub fn conversations(&self, user: UserId) -> Result<Vec<(String, i64)>, PmError> {
        let mut stmt = self.db.conn().prepare(
            "SELECT CASE WHEN pair_lo = ?1 THEN pair_hi ELSE pair_lo END AS other,
                    SUM(CASE WHEN from_id != ?1 AND read_flag = 0 THEN 1 ELSE 0 END) AS unread
             FROM pm_messages
             WHERE pair_lo = ?1 OR pair_hi = ?1
             GROUP BY other",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![user.0], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut out = Vec::new();
        for (other_id, unread) in rows {
            if let Some(name) = self.accounts().lookup_username(UserId(other_id))? {
                out.push((name, unread));
            }
        }
        Ok(out)
    }

    /// Marks every message from `other` to `user` as read. Called on
    /// PM_CHAT_START and PM_CHAT_END per §4.7.
    pub fn mark_read_from(&self, user: UserId, other: UserId) -> Result<(), PmError> {
        let (lo, hi) = pair_key(user, other);
        self.db.conn().execute(
            "UPDATE pm_messages SET read_flag = 1
             WHERE pair_lo = ?1 AND pair_hi = ?2 AND from_id = ?3 AND read_flag = 0",
            rusqlite::params![lo, hi, other.0],
        )?;
        Ok(())
    }
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
