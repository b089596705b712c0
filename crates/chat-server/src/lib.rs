//! Library half of the `chatd` binary, split out so integration tests
//! can drive a real server over a real socket instead of re-implementing
//! the protocol against the store directly.

pub mod delivery;
pub mod error;
pub mod handlers;
pub mod listener;
pub mod router;
pub mod state;
pub mod worker;

pub use listener::{Listener, ListenerError};
pub use state::AppState;
