//! The account store: durable username → (user-id, salt, digest, email,
//! active) map. §4.4.

use super::db::Database;
use crate::password;
use crate::types::{FieldError, UserId, Username};
use rusqlite::OptionalExtension;
use thiserror::Error;

use crate::error::WireError;

#[derive(Debug, Error)]
pub enum AccountError {
    #[error(transparent)]
    InvalidField(#[from] FieldError),
    #[error("username already registered")]
    UsernameExists,
    #[error("no such account")]
    NotFound,
    #[error("account is not active")]
    Inactive,
    #[error("incorrect password")]
    BadPassword,
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl WireError for AccountError {
    fn wire(&self) -> (u16, &'static str) {
        match self {
            AccountError::InvalidField(_) => (422, "invalid_fields"),
            AccountError::UsernameExists => (409, "username_exists"),
            AccountError::NotFound | AccountError::BadPassword => (401, "invalid_credentials"),
            AccountError::Inactive => (401, "invalid_credentials"),
            AccountError::Storage(_) => (500, "server_error"),
        }
    }
}

pub struct AccountStore<'a> {
    db: &'a Database,
}

impl<'a> AccountStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Registers a new account. Validates syntax, rejects a duplicate
    /// username, assigns the next id, and stores `(salt, digest)` — never
    /// the plaintext password.
    pub fn register(
        &self,
        username: &str,
        password_plain: &str,
        email: &str,
    ) -> Result<UserId, AccountError> {
        let username = Username::parse(username)?;
        crate::types::validate_password(password_plain)?;
        crate::types::validate_email(email)?;

        if self.lookup_id(username.as_str())?.is_some() {
            return Err(AccountError::UsernameExists);
        }

        let salt = password::generate_salt();
        let digest = password::digest(&salt, password_plain);

        self.db.conn().execute(
            "INSERT INTO accounts (username, salt, digest, email, active)
             VALUES (?1, ?2, ?3, ?4, 1)",
            rusqlite::params![username.as_str(), salt, digest, email],
        )?;
        let user_id = self.db.conn().last_insert_rowid();
        Ok(UserId(user_id))
    }

    /// Authenticates a username/password pair.
    pub fn authenticate(&self, username: &str, password_plain: &str) -> Result<UserId, AccountError> {
        let row: Option<(i64, String, String, i64)> = self
            .db
            .conn()
            .query_row(
                "SELECT user_id, salt, digest, active FROM accounts WHERE username = ?1",
                rusqlite::params![username],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        let (user_id, salt, digest, active) = row.ok_or(AccountError::NotFound)?;
        if active == 0 {
            return Err(AccountError::Inactive);
        }
        if !password::verify(&salt, &digest, password_plain) {
            return Err(AccountError::BadPassword);
        }
        Ok(UserId(user_id))
    }

    /// Looks up a user id by (case-sensitive) username.
    pub fn lookup_id(&self, username: &str) -> Result<Option<UserId>, AccountError> {
        let id: Option<i64> = self
            .db
            .conn()
            .query_row(
                "SELECT user_id FROM accounts WHERE username = ?1",
                rusqlite::params![username],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id.map(UserId))
    }

    /// Looks up a username by user id.
    pub fn lookup_username(&self, user_id: UserId) -> Result<Option<String>, AccountError> {
        let username: Option<String> = self
            .db
            .conn()
            .query_row(
                "SELECT username FROM accounts WHERE user_id = ?1",
                rusqlite::params![user_id.0],
                |row| row.get(0),
            )
            .optional()?;
        Ok(username)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(db: &Database) -> AccountStore<'_> {
        AccountStore::new(db)
    }

    #[test]
    fn register_then_authenticate() {
        let db = Database::open_in_memory().unwrap();
        let s = store(&db);
        let id = s.register("alice", "hunter2", "a@b.c").unwrap();
        assert_eq!(s.authenticate("alice", "hunter2").unwrap(), id);
    }

    #[test]
    fn authenticate_wrong_password_fails() {
        let db = Database::open_in_memory().unwrap();
        let s = store(&db);
        s.register("alice", "hunter2", "a@b.c").unwrap();
        assert!(matches!(
            s.authenticate("alice", "wrong"),
            Err(AccountError::BadPassword)
        ));
    }

    #[test]
    fn authenticate_unknown_user_fails() {
        let db = Database::open_in_memory().unwrap();
        let s = store(&db);
        assert!(matches!(
            s.authenticate("nobody", "x"),
            Err(AccountError::NotFound)
        ));
    }

    #[test]
    fn register_duplicate_username_fails() {
        let db = Database::open_in_memory().unwrap();
        let s = store(&db);
        s.register("alice", "hunter2", "a@b.c").unwrap();
        assert!(matches!(
            s.register("alice", "other1", "c@d.e"),
            Err(AccountError::UsernameExists)
        ));
    }

    #[test]
    fn register_rejects_invalid_username() {
        let db = Database::open_in_memory().unwrap();
        let s = store(&db);
        assert!(matches!(
            s.register("ab", "hunter2", "a@b.c"),
            Err(AccountError::InvalidField(_))
        ));
    }

    #[test]
    fn ids_are_assigned_monotonically() {
        let db = Database::open_in_memory().unwrap();
        let s = store(&db);
        let a = s.register("alice", "hunter2", "a@b.c").unwrap();
        let b = s.register("bob", "hunter2", "b@b.c").unwrap();
        assert!(b.0 > a.0);
    }

    #[test]
    fn lookup_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let s = store(&db);
        let id = s.register("alice", "hunter2", "a@b.c").unwrap();
        assert_eq!(s.lookup_id("alice").unwrap(), Some(id));
        assert_eq!(s.lookup_username(id).unwrap(), Some("alice".to_string()));
    }
}
