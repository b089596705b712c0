//! The group store: groups, owners, and membership edges. §4.6.

use super::accounts::AccountStore;
use super::db::Database;
use crate::error::WireError;
use crate::session::SessionRegistry;
use crate::types::{GroupId, Subscription, UserId};
use rusqlite::OptionalExtension;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GroupError {
    #[error("no such group")]
    GroupNotFound,
    #[error("actor is not the group owner")]
    NotOwner,
    #[error("actor is not a member of the group")]
    NotMember,
    #[error("no such user")]
    UserNotFound,
    #[error("user is already a member")]
    AlreadyMember,
    #[error("user is not a member")]
    MemberNotFound,
    #[error("actor is not a member of the group they're trying to leave")]
    NotAMember,
    #[error("the owner cannot leave their own group")]
    OwnerCannotLeave,
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl WireError for GroupError {
    fn wire(&self) -> (u16, &'static str) {
        match self {
            // No dedicated wire tag exists for "group id doesn't name a real
            // group"; the nearest fit in the error table is the same
            // 400 the router already uses for a malformed group_id field.
            GroupError::GroupNotFound => (400, "invalid_group_id"),
            GroupError::NotOwner => (403, "not_group_owner"),
            GroupError::NotMember => (403, "not_group_member"),
            GroupError::UserNotFound => (404, "user_not_found"),
            GroupError::AlreadyMember => (409, "already_member"),
            GroupError::MemberNotFound => (404, "member_not_found"),
            // GROUP_LEAVE's own not-a-member case answers a distinct tag from
            // GROUP_REMOVE's — see the original's handlers.c leave/remove split.
            GroupError::NotAMember => (404, "not_group_member"),
            GroupError::OwnerCannotLeave => (422, "owner_cannot_leave"),
            GroupError::Storage(_) => (500, "server_error"),
        }
    }
}

/// What happened to the removed member's live session, so the caller
/// (chat-server's handler) knows whether to push `GM_KICKED` to them and
/// `GM_LEAVE` to the remaining subscribers.
pub struct RemoveOutcome {
    pub was_subscribed: bool,
}

pub struct GroupStore<'a> {
    db: &'a Database,
}

impl<'a> GroupStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    fn accounts(&self) -> AccountStore<'_> {
        AccountStore::new(self.db)
    }

    fn owner_of(&self, group_id: GroupId) -> Result<UserId, GroupError> {
        let owner: Option<i64> = self
            .db
            .conn()
            .query_row(
                "SELECT owner_id FROM groups WHERE group_id = ?1",
                rusqlite::params![group_id.0],
                |row| row.get(0),
            )
            .optional()?;
        owner.map(UserId).ok_or(GroupError::GroupNotFound)
    }

    fn is_member(&self, group_id: GroupId, user_id: UserId) -> Result<bool, GroupError> {
        let exists: Option<i64> = self
            .db
            .conn()
            .query_row(
                "SELECT 1 FROM group_members WHERE group_id = ?1 AND user_id = ?2",
                rusqlite::params![group_id.0, user_id.0],
                |row| row.get(0),
            )
            .optional()?;
        Ok(exists.is_some())
    }

    /// Creates a group owned by `owner`, adding them as the first member.
    pub fn create(&self, owner: UserId, name: &str) -> Result<GroupId, GroupError> {
        self.db.conn().execute(
            "INSERT INTO groups (name, owner_id, created_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![name, owner.0, now_unix()],
        )?;
        let group_id = GroupId(self.db.conn().last_insert_rowid());
        self.db.conn().execute(
            "INSERT INTO group_members (group_id, user_id) VALUES (?1, ?2)",
            rusqlite::params![group_id.0, owner.0],
        )?;
        Ok(group_id)
    }

    /// All group ids containing `user`.
    pub fn list(&self, user: UserId) -> Result<Vec<GroupId>, GroupError> {
        let mut stmt = self
            .db
            .conn()
            .prepare("SELECT group_id FROM group_members WHERE user_id = ?1")?;
        let ids = stmt
            .query_map(rusqlite::params![user.0], |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids.into_iter().map(GroupId).collect())
    }

    /// Usernames of the group's name, for GM_CHAT_START.
    pub fn name_of(&self, group_id: GroupId) -> Result<String, GroupError> {
        self.db
            .conn()
            .query_row(
                "SELECT name FROM groups WHERE group_id = ?1",
                rusqlite::params![group_id.0],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(GroupError::GroupNotFound)
    }

    /// Usernames of every member, forbidden unless `user` is themself a
    /// member.
    pub fn members(&self, user: UserId, group_id: GroupId) -> Result<Vec<String>, GroupError> {
        self.owner_of(group_id)?; // existence check
        if !self.is_member(group_id, user)? {
            return Err(GroupError::NotMember);
        }

        let mut stmt = self
            .db
            .conn()
            .prepare("SELECT user_id FROM group_members WHERE group_id = ?1")?;
        let ids = stmt
            .query_map(rusqlite::params![group_id.0], |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut names = Vec::new();
        for id in ids {
            if let Some(name) = self.accounts().lookup_username(UserId(id))? {
                names.push(name);
            }
        }
        Ok(names)
    }

    /// Returns `true` iff `user` is a member of `group_id`. Used by GM_SEND
    /// permission checks and by the delivery engine's fan-out enumeration.
    pub fn member_ids(&self, group_id: GroupId) -> Result<Vec<UserId>, GroupError> {
        self.owner_of(group_id)?;
        let mut stmt = self
            .db
            .conn()
            .prepare("SELECT user_id FROM group_members WHERE group_id = ?1")?;
        let ids = stmt
            .query_map(rusqlite::params![group_id.0], |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids.into_iter().map(UserId).collect())
    }

    pub fn is_member_of(&self, group_id: GroupId, user: UserId) -> Result<bool, GroupError> {
        self.owner_of(group_id)?;
        self.is_member(group_id, user)
    }

    /// `actor` (must be owner) adds `username` to the group.
    pub fn add(&self, actor: UserId, group_id: GroupId, username: &str) -> Result<UserId, GroupError> {
        let owner = self.owner_of(group_id)?;
        if actor != owner {
            return Err(GroupError::NotOwner);
        }
        let target = self
            .accounts()
            .lookup_id(username)
            .map_err(|_| GroupError::UserNotFound)?
            .ok_or(GroupError::UserNotFound)?;
        if self.is_member(group_id, target)? {
            return Err(GroupError::AlreadyMember);
        }
        self.db.conn().execute(
            "INSERT INTO group_members (group_id, user_id) VALUES (?1, ?2)",
            rusqlite::params![group_id.0, target.0],
        )?;
        Ok(target)
    }

    /// `actor` (must be owner) removes `username` from the group. If the
    /// removed member's session is currently subscribed to this group's
    /// GM, their subscription is cleared here — see §9's "kicked
    /// subscribers" note: the store routes through the session registry
    /// rather than reaching into session fields directly.
    pub fn remove(
        &self,
        actor: UserId,
        group_id: GroupId,
        username: &str,
        sessions: &SessionRegistry,
    ) -> Result<(UserId, RemoveOutcome), GroupError> {
        let owner = self.owner_of(group_id)?;
        if actor != owner {
            return Err(GroupError::NotOwner);
        }
        let target = self
            .accounts()
            .lookup_id(username)
            .map_err(|_| GroupError::UserNotFound)?
            .ok_or(GroupError::UserNotFound)?;
        if !self.is_member(group_id, target)? {
            return Err(GroupError::MemberNotFound);
        }

        self.db.conn().execute(
            "DELETE FROM group_members WHERE group_id = ?1 AND user_id = ?2",
            rusqlite::params![group_id.0, target.0],
        )?;

        let was_subscribed = matches!(
            sessions.subscription_of(target),
            Some(Subscription::InGroup(g)) if g == group_id
        );
        if was_subscribed {
            sessions.set_subscription(target, Subscription::None);
        }

        Ok((target, RemoveOutcome { was_subscribed }))
    }

    /// `user` leaves `group_id`. The owner can never leave.
    pub fn leave(&self, user: UserId, group_id: GroupId) -> Result<(), GroupError> {
        let owner = self.owner_of(group_id)?;
        if user == owner {
            return Err(GroupError::OwnerCannotLeave);
        }
        if !self.is_member(group_id, user)? {
            return Err(GroupError::NotAMember);
        }
        self.db.conn().execute(
            "DELETE FROM group_members WHERE group_id = ?1 AND user_id = ?2",
            rusqlite::params![group_id.0, user.0],
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn setup() -> (Database, UserId, UserId, UserId) {
        let db = Database::open_in_memory().unwrap();
        let accounts = AccountStore::new(&db);
        let owner = accounts.register("owner", "hunter2", "o@b.c").unwrap();
        let m1 = accounts.register("m1", "hunter2", "m1@b.c").unwrap();
        let m2 = accounts.register("m2", "hunter2", "m2@b.c").unwrap();
        (db, owner, m1, m2)
    }

    #[test]
    fn create_adds_owner_as_member() {
        let (db, owner, _, _) = setup();
        let groups = GroupStore::new(&db);
        let g = groups.create(owner, "Team").unwrap();
        assert_eq!(groups.members(owner, g).unwrap(), vec!["owner".to_string()]);
    }

    #[test]
    fn add_and_list_members() {
        let (db, owner, m1, _) = setup();
        let groups = GroupStore::new(&db);
        let g = groups.create(owner, "Team").unwrap();
        groups.add(owner, g, "m1").unwrap();
        let mut members = groups.members(owner, g).unwrap();
        members.sort();
        assert_eq!(members, vec!["m1".to_string(), "owner".to_string()]);
        let _ = m1;
    }

    #[test]
    fn non_owner_cannot_add() {
        let (db, owner, m1, m2) = setup();
        let groups = GroupStore::new(&db);
        let g = groups.create(owner, "Team").unwrap();
        groups.add(owner, g, "m1").unwrap();
        assert!(matches!(groups.add(m1, g, "m2"), Err(GroupError::NotOwner)));
        let _ = m2;
    }

    #[test]
    fn non_member_forbidden_from_listing() {
        let (db, owner, m1, _) = setup();
        let groups = GroupStore::new(&db);
        let g = groups.create(owner, "Team").unwrap();
        assert!(matches!(groups.members(m1, g), Err(GroupError::NotMember)));
    }

    #[test]
    fn owner_cannot_leave() {
        let (db, owner, _, _) = setup();
        let groups = GroupStore::new(&db);
        let g = groups.create(owner, "Team").unwrap();
        assert!(matches!(
            groups.leave(owner, g),
            Err(GroupError::OwnerCannotLeave)
        ));
    }

    #[test]
    fn non_owner_can_leave() {
        let (db, owner, m1, _) = setup();
        let groups = GroupStore::new(&db);
        let g = groups.create(owner, "Team").unwrap();
        groups.add(owner, g, "m1").unwrap();
        groups.leave(m1, g).unwrap();
        assert!(matches!(groups.leave(m1, g), Err(GroupError::NotAMember)));
    }

    #[test]
    fn remove_clears_subscription_and_reports_it() {
        let (db, owner, m1, _) = setup();
        let groups = GroupStore::new(&db);
        let g = groups.create(owner, "Team").unwrap();
        groups.add(owner, g, "m1").unwrap();

        let sessions = SessionRegistry::new(10, Duration::from_secs(3600));
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        sessions
            .create(m1, crate::session::ConnId(1), tx)
            .unwrap();
        sessions.set_subscription(m1, Subscription::InGroup(g));

        let (removed, outcome) = groups.remove(owner, g, "m1", &sessions).unwrap();
        assert_eq!(removed, m1);
        assert!(outcome.was_subscribed);
        assert_eq!(sessions.subscription_of(m1), Some(Subscription::None));
    }

    #[test]
    fn remove_of_non_member_fails() {
        let (db, owner, m1, _) = setup();
        let groups = GroupStore::new(&db);
        let g = groups.create(owner, "Team").unwrap();
        let sessions = SessionRegistry::new(10, Duration::from_secs(3600));
        assert!(matches!(
            groups.remove(owner, g, "m1", &sessions),
            Err(GroupError::MemberNotFound)
        ));
    }
}
