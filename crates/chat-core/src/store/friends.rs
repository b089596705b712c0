//! The friendship store: a directed invite promoted to a symmetric
//! ACCEPTED edge. §4.5.

use super::accounts::AccountStore;
use super::db::Database;
use crate::error::WireError;
use crate::session::SessionRegistry;
use crate::types::UserId;
use rusqlite::OptionalExtension;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FriendError {
    #[error("cannot invite yourself")]
    CannotInviteSelf,
    #[error("cannot accept your own invite")]
    CannotAcceptSelf,
    #[error("cannot reject your own invite")]
    CannotRejectSelf,
    #[error("cannot delete yourself as a friend")]
    CannotDeleteSelf,
    #[error("no such user")]
    UserNotFound,
    #[error("already friends or a pending invite exists")]
    AlreadyFriendOrPending,
    #[error("already friends")]
    AlreadyFriends,
    #[error("no such pending invite")]
    InviteNotFound,
    #[error("not friends")]
    FriendNotFound,
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl WireError for FriendError {
    fn wire(&self) -> (u16, &'static str) {
        match self {
            FriendError::CannotInviteSelf => (422, "cannot_invite_self"),
            FriendError::CannotAcceptSelf => (422, "cannot_accept_self"),
            FriendError::CannotRejectSelf => (422, "cannot_reject_self"),
            FriendError::CannotDeleteSelf => (422, "cannot_delete_self"),
            FriendError::UserNotFound => (404, "user_not_found"),
            FriendError::InviteNotFound => (404, "invite_not_found"),
            FriendError::FriendNotFound => (404, "friend_not_found"),
            FriendError::AlreadyFriendOrPending => (409, "already_friend_or_pending"),
            FriendError::AlreadyFriends => (409, "already_friends"),
            FriendError::Storage(_) => (500, "server_error"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EdgeState {
    Pending { inviter: UserId },
    Accepted,
}

pub struct FriendStore<'a> {
    db: &'a Database,
}

fn pair_key(a: UserId, b: UserId) -> (i64, i64) {
    if a.0 < b.0 {
        (a.0, b.0)
    } else {
        (b.0, a.0)
    }
}

impl<'a> FriendStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    fn edge(&self, a: UserId, b: UserId) -> Result<Option<EdgeState>, FriendError> {
        let (lo, hi) = pair_key(a, b);
        let row: Option<(String, Option<i64>)> = self
            .db
            .conn()
            .query_row(
                "SELECT state, inviter FROM friendships WHERE user_a = ?1 AND user_b = ?2",
                rusqlite::params![lo, hi],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(row.map(|(state, inviter)| match state.as_str() {
            "accepted" => EdgeState::Accepted,
            _ => EdgeState::Pending {
                inviter: UserId(inviter.expect("pending edge always has an inviter")),
            },
        }))
    }

    fn accounts(&self) -> AccountStore<'_> {
        AccountStore::new(self.db)
    }

    /// `from` invites the account named `to_username`.
    pub fn invite(&self, from: UserId, to_username: &str) -> Result<UserId, FriendError> {
        let to = self
            .accounts()
            .lookup_id(to_username)
            .map_err(|_| FriendError::UserNotFound)?
            .ok_or(FriendError::UserNotFound)?;

        if to == from {
            return Err(FriendError::CannotInviteSelf);
        }
        if self.edge(from, to)?.is_some() {
            return Err(FriendError::AlreadyFriendOrPending);
        }

        let (lo, hi) = pair_key(from, to);
        self.db.conn().execute(
            "INSERT INTO friendships (user_a, user_b, state, inviter, created_at)
             VALUES (?1, ?2, 'pending', ?3, ?4)",
            rusqlite::params![lo, hi, from.0, now_unix()],
        )?;
        Ok(to)
    }

    /// `to` accepts the pending invite from `from_username`.
    pub fn accept(&self, to: UserId, from_username: &str) -> Result<UserId, FriendError> {
        let from = self
            .accounts()
            .lookup_id(from_username)
            .map_err(|_| FriendError::UserNotFound)?
            .ok_or(FriendError::UserNotFound)?;

        if from == to {
            return Err(FriendError::CannotAcceptSelf);
        }

        match self.edge(from, to)? {
            Some(EdgeState::Pending { inviter }) if inviter == from => {
                let (lo, hi) = pair_key(from, to);
                self.db.conn().execute(
                    "UPDATE friendships SET state = 'accepted' WHERE user_a = ?1 AND user_b = ?2",
                    rusqlite::params![lo, hi],
                )?;
                Ok(from)
            }
            Some(EdgeState::Accepted) => Err(FriendError::AlreadyFriends),
            _ => Err(FriendError::InviteNotFound),
        }
    }

    /// `to` rejects the pending invite from `from_username`.
    pub fn reject(&self, to: UserId, from_username: &str) -> Result<UserId, FriendError> {
        let from = self
            .accounts()
            .lookup_id(from_username)
            .map_err(|_| FriendError::UserNotFound)?
            .ok_or(FriendError::UserNotFound)?;

        if from == to {
            return Err(FriendError::CannotRejectSelf);
        }

        match self.edge(from, to)? {
            Some(EdgeState::Pending { inviter }) if inviter == from => {
                let (lo, hi) = pair_key(from, to);
                self.db.conn().execute(
                    "DELETE FROM friendships WHERE user_a = ?1 AND user_b = ?2",
                    rusqlite::params![lo, hi],
                )?;
                Ok(from)
            }
            _ => Err(FriendError::InviteNotFound),
        }
    }

    /// Usernames of users who have invited `user` and are awaiting a
    /// response.
    pub fn pending(&self, user: UserId) -> Result<Vec<String>, FriendError> {
        let mut stmt = self.db.conn().prepare(
            "SELECT user_a, user_b, inviter FROM friendships
             WHERE (user_a = ?1 OR user_b = ?1) AND state = 'pending'",
        )?;
        let rows: Vec<(i64, i64, i64)> = stmt
            .query_map(rusqlite::params![user.0], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?
            .collect::<Result<_, _>>()?;

        let mut names = Vec::new();
        for (a, b, inviter) in rows {
            let other = if a == user.0 { b } else { a };
            if inviter == other && inviter != user.0 {
                if let Some(name) = self.accounts().lookup_username(UserId(other))? {
                    names.push(name);
                }
            }
        }
        Ok(names)
    }

    /// Usernames of users with an ACCEPTED edge with `user`, each
    /// annotated `name:online` or `name:offline` per the session
    /// registry's state at query time.
    pub fn list(&self, user: UserId, sessions: &SessionRegistry) -> Result<Vec<String>, FriendError> {
        let mut stmt = self.db.conn().prepare(
            "SELECT user_a, user_b FROM friendships
             WHERE (user_a = ?1 OR user_b = ?1) AND state = 'accepted'",
        )?;
        let rows: Vec<(i64, i64)> = stmt
            .query_map(rusqlite::params![user.0], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<_, _>>()?;

        let mut out = Vec::new();
        for (a, b) in rows {
            let other = UserId(if a == user.0 { b } else { a });
            if let Some(name) = self.accounts().lookup_username(other)? {
                let status = if sessions.is_online(other) { "online" } else { "offline" };
                out.push(format!("{name}:{status}"));
            }
        }
        Ok(out)
    }

    /// Removes an ACCEPTED edge between `user` and `other`.
    pub fn delete(&self, user: UserId, other_username: &str) -> Result<UserId, FriendError> {
        let other = self
            .accounts()
            .lookup_id(other_username)
            .map_err(|_| FriendError::UserNotFound)?
            .ok_or(FriendError::UserNotFound)?;

        if other == user {
            return Err(FriendError::CannotDeleteSelf);
        }

        match self.edge(user, other)? {
            Some(EdgeState::Accepted) => {
                let (lo, hi) = pair_key(user, other);
                self.db.conn().execute(
                    "DELETE FROM friendships WHERE user_a = ?1 AND user_b = ?2",
                    rusqlite::params![lo, hi],
                )?;
                Ok(other)
            }
            _ => Err(FriendError::FriendNotFound),
        }
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

    fn setup() -> (Database, UserId, UserId) {
        let db = Database::open_in_memory().unwrap();
        let accounts = AccountStore::new(&db);
        let alice = accounts.register("alice", "hunter2", "a@b.c").unwrap();
        let bob = accounts.register("bob", "hunter2", "b@b.c").unwrap();
        (db, alice, bob)
    }

    #[test]
    fn invite_accept_round_trip() {
        let (db, alice, bob) = setup();
        let friends = FriendStore::new(&db);
        friends.invite(alice, "bob").unwrap();
        friends.accept(bob, "alice").unwrap();

        let sessions = SessionRegistry::new(10, Duration::from_secs(3600));
        let alice_list = friends.list(alice, &sessions).unwrap();
        assert_eq!(alice_list, vec!["bob:offline".to_string()]);
    }

    #[test]
    fn invite_self_rejected() {
        let (db, alice, _bob) = setup();
        let friends = FriendStore::new(&db);
        assert!(matches!(
            friends.invite(alice, "alice"),
            Err(FriendError::CannotInviteSelf)
        ));
    }

    #[test]
    fn duplicate_invite_rejected() {
        let (db, alice, _bob) = setup();
        let friends = FriendStore::new(&db);
        friends.invite(alice, "bob").unwrap();
        assert!(matches!(
            friends.invite(alice, "bob"),
            Err(FriendError::AlreadyFriendOrPending)
        ));
    }

    #[test]
    fn accept_without_invite_fails() {
        let (db, alice, bob) = setup();
        let friends = FriendStore::new(&db);
        assert!(matches!(
            friends.accept(bob, "alice"),
            Err(FriendError::InviteNotFound)
        ));
        let _ = alice;
    }

    #[test]
    fn accept_already_accepted_fails() {
        let (db, alice, bob) = setup();
        let friends = FriendStore::new(&db);
        friends.invite(alice, "bob").unwrap();
        friends.accept(bob, "alice").unwrap();
        assert!(matches!(
            friends.accept(bob, "alice"),
            Err(FriendError::AlreadyFriends)
        ));
    }

    #[test]
    fn reject_removes_pending_invite() {
        let (db, alice, bob) = setup();
        let friends = FriendStore::new(&db);
        friends.invite(alice, "bob").unwrap();
        friends.reject(bob, "alice").unwrap();
        assert!(matches!(
            friends.reject(bob, "alice"),
            Err(FriendError::InviteNotFound)
        ));
    }

    #[test]
    fn pending_lists_inviters() {
        let (db, alice, bob) = setup();
        let friends = FriendStore::new(&db);
        friends.invite(alice, "bob").unwrap();
        assert_eq!(friends.pending(bob).unwrap(), vec!["alice".to_string()]);
        assert!(friends.pending(alice).unwrap().is_empty());
    }

    #[test]
    fn delete_then_delete_again_not_found() {
        let (db, alice, bob) = setup();
        let friends = FriendStore::new(&db);
        friends.invite(alice, "bob").unwrap();
        friends.accept(bob, "alice").unwrap();
        friends.delete(alice, "bob").unwrap();
        assert!(matches!(
            friends.delete(alice, "bob"),
            Err(FriendError::FriendNotFound)
        ));
    }

    #[test]
    fn list_reflects_online_state() {
        let (db, alice, bob) = setup();
        let friends = FriendStore::new(&db);
        friends.invite(alice, "bob").unwrap();
        friends.accept(bob, "alice").unwrap();

        let sessions = SessionRegistry::new(10, Duration::from_secs(3600));
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        sessions
            .create(bob, crate::session::ConnId(1), tx)
            .unwrap();

        let alice_list = friends.list(alice, &sessions).unwrap();
        assert_eq!(alice_list, vec!["bob:online".to_string()]);
    }
}
