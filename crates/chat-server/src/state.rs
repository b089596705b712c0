//! Shared process state handed to every connection worker and handler.
//!
//! A single owning value passed around rather than true globals, per
//! chat-core's session registry design note: the locking discipline is
//! identical either way but this is easier to test.

use chat_core::session::SessionRegistry;
use chat_core::store::Database;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Everything a connection worker or handler needs. Cheap to clone — the
/// database and session registry are each behind their own `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Database>>,
    pub sessions: SessionRegistry,
    next_conn_id: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(db: Database, sessions: SessionRegistry) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            sessions,
            next_conn_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Allocates a fresh connection id for a just-accepted socket.
    pub fn next_conn_id(&self) -> chat_core::session::ConnId {
        chat_core::session::ConnId(self.next_conn_id.fetch_add(1, Ordering::Relaxed))
    }
}
