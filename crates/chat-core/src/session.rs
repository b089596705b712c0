//! The session registry: a process-wide, mutex-guarded table binding
//! token ↔ user-id ↔ connection ↔ last-activity ↔ subscription.
//!
//! Enforces single-active-session-per-user and is the single place that
//! tracks presence and subscription state. Per §9's design notes, a
//! connection is represented here only by an outbound channel rather than
//! a raw socket — pushing to a session is an unbounded channel `send`,
//! never a blocking write, so the registry's mutex is never held across
//! I/O. The dedicated per-connection write task (see `chat-server`'s
//! worker) drains that channel and is the one place that actually touches
//! the socket, which is what gives us "a push never splits a response"
//! for free: both responses and pushes funnel through the same queue.

use crate::types::{Subscription, Token, UserId};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Opaque identifier for a TCP connection, assigned by the listener/worker.
/// Only used as a map key here — the registry never dials out on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(pub u64);

/// A channel endpoint the registry uses to push raw records (responses or
/// PUSH records) to a connection's dedicated writer task.
pub type OutboundTx = tokio::sync::mpsc::UnboundedSender<Vec<u8>>;

/// Errors from session registry operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("user already has an active session")]
    AlreadyLoggedIn,
    #[error("session table is full")]
    Full,
    #[error("no such session")]
    NotFound,
    #[error("session expired")]
    Expired,
}

#[derive(Debug, Clone)]
struct SessionEntry {
    token: Token,
    user_id: UserId,
    conn: ConnId,
    outbound: OutboundTx,
    created_at: Instant,
    last_activity: Instant,
    subscription: Subscription,
}

struct Inner {
    by_token: HashMap<Token, SessionEntry>,
    by_user: HashMap<UserId, Token>,
    by_conn: HashMap<ConnId, Token>,
    capacity: usize,
    timeout: Duration,
}

/// The shared session table. Cheaply clonable (wraps an `Arc`); every
/// clone observes the same underlying state.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: std::sync::Arc<Mutex<Inner>>,
}

/// A snapshot of one subscriber, used by the delivery engine to fan out a
/// push without holding the registry lock across the write.
#[derive(Debug, Clone)]
pub struct Subscriber {
    pub user_id: UserId,
    pub outbound: OutboundTx,
}

impl SessionRegistry {
    /// Creates a new registry with the given slot capacity (default 1000
    /// per §3) and idle timeout (default 3600s per §3).
    pub fn new(capacity: usize, timeout: Duration) -> Self {
        Self {
            inner: std::sync::Arc::new(Mutex::new(Inner {
                by_token: HashMap::new(),
                by_user: HashMap::new(),
                by_conn: HashMap::new(),
                capacity,
                timeout,
            })),
        }
    }

    /// Creates a session for `user_id` bound to `conn`.
    ///
    /// If `user_id` already has an active session on a *different*
    /// connection, fails with [`SessionError::AlreadyLoggedIn`]. If `conn`
    /// already holds a session (e.g. a stale one from before a reconnect
    /// on the same logical connection id), that session is dropped first.
    pub fn create(
        &self,
        user_id: UserId,
        conn: ConnId,
        outbound: OutboundTx,
    ) -> Result<Token, SessionError> {
        let mut inner = self.inner.lock().unwrap();

        if let Some(existing_token) = inner.by_user.get(&user_id).cloned() {
            let same_conn = inner
                .by_token
                .get(&existing_token)
                .map(|e| e.conn == conn)
                .unwrap_or(false);
            if !same_conn {
                return Err(SessionError::AlreadyLoggedIn);
            }
            remove_token_unlocked(&mut inner, &existing_token);
        }

        if inner.by_token.len() >= inner.capacity {
            return Err(SessionError::Full);
        }

        let mut token = Token::generate();
        // Vanishingly unlikely, but collisions are cheap to retry.
        for _ in 0..8 {
            if !inner.by_token.contains_key(&token) {
                break;
            }
            token = Token::generate();
        }

        let now = Instant::now();
        inner.by_token.insert(
            token.clone(),
            SessionEntry {
                token: token.clone(),
                user_id,
                conn,
                outbound,
                created_at: now,
                last_activity: now,
                subscription: Subscription::None,
            },
        );
        inner.by_user.insert(user_id, token.clone());
        inner.by_conn.insert(conn, token.clone());

        Ok(token)
    }

    /// Validates a token, refreshing its last-activity stamp.
    ///
    /// Expires (and removes) the session if idle for longer than the
    /// configured timeout.
    pub fn validate(&self, token: &Token) -> Result<UserId, SessionError> {
        let mut inner = self.inner.lock().unwrap();
        let timeout = inner.timeout;
        let entry = inner.by_token.get(token).ok_or(SessionError::NotFound)?;

        if entry.last_activity.elapsed() >= timeout {
            let user_id = entry.user_id;
            remove_token_unlocked(&mut inner, token);
            let _ = user_id;
            return Err(SessionError::Expired);
        }

        let user_id = entry.user_id;
        if let Some(entry) = inner.by_token.get_mut(token) {
            entry.last_activity = Instant::now();
        }
        Ok(user_id)
    }

    /// Destroys a session by token (LOGOUT / explicit chat-end paths never
    /// call this directly, but LOGOUT and DISCONNECT do).
    pub fn destroy(&self, token: &Token) -> Option<UserId> {
        let mut inner = self.inner.lock().unwrap();
        let user_id = inner.by_token.get(token).map(|e| e.user_id);
        if user_id.is_some() {
            remove_token_unlocked(&mut inner, token);
        }
        user_id
    }

    /// Destroys whatever session (if any) is bound to `conn`, returning
    /// its user id and subscription *as they were just before removal* so
    /// the caller can emit the right LEAVE-family push. Used on socket
    /// loss, oversize record, and explicit DISCONNECT (§4.11's terminal
    /// state).
    pub fn remove_by_connection(&self, conn: ConnId) -> Option<(UserId, Subscription)> {
        let mut inner = self.inner.lock().unwrap();
        let token = inner.by_conn.get(&conn).cloned()?;
        let entry = inner.by_token.get(&token)?;
        let result = (entry.user_id, entry.subscription);
        remove_token_unlocked(&mut inner, &token);
        Some(result)
    }

    pub fn is_online(&self, user_id: UserId) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.by_user.contains_key(&user_id)
    }

    /// The current subscription of `user_id`'s session, if online.
    pub fn subscription_of(&self, user_id: UserId) -> Option<Subscription> {
        let inner = self.inner.lock().unwrap();
        let token = inner.by_user.get(&user_id)?;
        inner.by_token.get(token).map(|e| e.subscription)
    }

    /// Sets the subscription for `user_id`'s active session, if any.
    /// Returns the previous subscription so the caller can emit the
    /// appropriate LEAVE-family push for whatever was left.
    pub fn set_subscription(
        &self,
        user_id: UserId,
        subscription: Subscription,
    ) -> Option<Subscription> {
        let mut inner = self.inner.lock().unwrap();
        let token = inner.by_user.get(&user_id).cloned()?;
        let entry = inner.by_token.get_mut(&token)?;
        let previous = entry.subscription;
        entry.subscription = subscription;
        Some(previous)
    }

    /// True iff `user_id` is online and subscribed to a PM conversation
    /// with `partner`.
    pub fn is_subscribed_to_pm_with(&self, user_id: UserId, partner: UserId) -> bool {
        matches!(
            self.subscription_of(user_id),
            Some(Subscription::PrivateWith(p)) if p == partner
        )
    }

    /// Snapshot of the outbound channel for `user_id`, for one targeted
    /// push (e.g. GM_KICKED, or a PM sent to an offline-unaware caller).
    pub fn outbound_of(&self, user_id: UserId) -> Option<OutboundTx> {
        let inner = self.inner.lock().unwrap();
        let token = inner.by_user.get(&user_id)?;
        inner.by_token.get(token).map(|e| e.outbound.clone())
    }

    /// Snapshot of every online member of `members` whose subscription is
    /// `InGroup(group)`, for GM fan-out. Excludes `exclude` (the sender).
    pub fn group_subscribers(
        &self,
        members: &[UserId],
        group: crate::types::GroupId,
        exclude: UserId,
    ) -> Vec<Subscriber> {
        let inner = self.inner.lock().unwrap();
        members
            .iter()
            .filter(|&&m| m != exclude)
            .filter_map(|&m| {
                let token = inner.by_user.get(&m)?;
                let entry = inner.by_token.get(token)?;
                matches!(entry.subscription, Subscription::InGroup(g) if g == group)
                    .then(|| Subscriber {
                        user_id: m,
                        outbound: entry.outbound.clone(),
                    })
            })
            .collect()
    }

    /// All currently online user ids, for friend-list annotation.
    pub fn online_user_ids(&self) -> std::collections::HashSet<UserId> {
        let inner = self.inner.lock().unwrap();
        inner.by_user.keys().copied().collect()
    }
}

fn remove_token_unlocked(inner: &mut Inner, token: &Token) {
    if let Some(entry) = inner.by_token.remove(token) {
        inner.by_user.remove(&entry.user_id);
        inner.by_conn.remove(&entry.conn);
    }
}
