//! Group-message delivery: per-group ordered log. §4.8.

use super::db::Database;
use crate::error::WireError;
use crate::types::{GroupId, MsgId, UserId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GmError {
    #[error("sender is not a member of the group")]
    NotMember,
    #[error("no such group")]
    GroupNotFound,
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl WireError for GmError {
    fn wire(&self) -> (u16, &'static str) {
        match self {
            GmError::NotMember => (403, "not_group_member"),
            GmError::GroupNotFound => (400, "invalid_group_id"),
            GmError::Storage(_) => (500, "server_error"),
        }
    }
}

/// One persisted group message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GmMessage {
    pub msg_id: MsgId,
    pub from: UserId,
    pub content: String,
    pub ts: i64,
}

pub const DEFAULT_HISTORY_LIMIT: i64 = 50;

pub struct GmStore<'a> {
    db: &'a Database,
}

impl<'a> GmStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Persists a message from `from` to `group_id`. The caller is
    /// responsible for the membership check (§4.8 step 1) since that
    /// check lives in the group store; this simply records the send.
    pub fn send(
        &self,
        from: UserId,
        group_id: GroupId,
        content_b64: &str,
    ) -> Result<MsgId, GmError> {
        let msg_id = self.db.assign_msg_id();
        self.db.conn().execute(
            "INSERT INTO gm_messages (msg_id, group_id, from_id, content, ts)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![msg_id, group_id.0, from.0, content_b64, now_unix()],
        )?;
        Ok(MsgId(msg_id))
    }

    /// The `limit` most recent messages in `group_id`, newest first.
    pub fn history(&self, group_id: GroupId, limit: i64) -> Result<Vec<GmMessage>, GmError> {
        let limit = limit.max(1);
        let mut stmt = self.db.conn().prepare(
            "SELECT msg_id, from_id, content, ts FROM gm_messages
             WHERE group_id = ?1
             ORDER BY msg_id DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![group_id.0, limit], |row| {
                Ok(GmMessage {
                    msg_id: MsgId(row.get(0)?),
                    from: UserId(row.get(1)?),
                    content: row.get(2)?,
                    ts: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::accounts::AccountStore;
    use crate::store::groups::GroupStore;

    fn setup() -> (Database, UserId, GroupId) {
        let db = Database::open_in_memory().unwrap();
        let accounts = AccountStore::new(&db);
        let owner = accounts.register("owner", "hunter2", "o@b.c").unwrap();
        let groups = GroupStore::new(&db);
        let g = groups.create(owner, "Team").unwrap();
        (db, owner, g)
    }

    #[test]
    fn send_then_history() {
        let (db, owner, g) = setup();
        let gm = GmStore::new(&db);
        gm.send(owner, g, "SGVsbG8=").unwrap();
        let hist = gm.history(g, 50).unwrap();
        assert_eq!(hist.len(), 1);
        assert_eq!(hist[0].content, "SGVsbG8=");
        assert_eq!(hist[0].from, owner);
    }

    #[test]
    fn history_newest_first() {
        let (db, owner, g) = setup();
        let gm = GmStore::new(&db);
        gm.send(owner, g, "one").unwrap();
        gm.send(owner, g, "two").unwrap();
        let hist = gm.history(g, 50).unwrap();
        assert_eq!(hist[0].content, "two");
        assert_eq!(hist[1].content, "one");
    }

    #[test]
    fn msg_ids_shared_with_pm_store_are_monotonic() {
        let (db, owner, g) = setup();
        let gm = GmStore::new(&db);
        let pm = crate::store::pm::PmStore::new(&db);
        let other = crate::store::accounts::AccountStore::new(&db)
            .register("other", "hunter2", "x@b.c")
            .unwrap();

        let (pm_id, _) = pm.send(owner, "other", "x").unwrap();
        let gm_id = gm.send(owner, g, "y").unwrap();
        assert!(gm_id.0 > pm_id.0);
        let _ = other;
    }
}
