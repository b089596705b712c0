//! TCP listener: accepts connections and spawns one worker task per
//! connection, in the manner of the daemon's old peer-to-peer message
//! server — bind once, then loop `accept()` forever, handing each
//! socket to its own task so a slow client never blocks another.

use crate::state::AppState;
use crate::worker;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to bind TCP listener: {0}")]
    Bind(std::io::Error),
}

pub struct Listener {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Listener {
    pub async fn bind(addr: &str) -> Result<Self, ListenerError> {
        let listener = TcpListener::bind(addr).await.map_err(ListenerError::Bind)?;
        let local_addr = listener.local_addr().map_err(ListenerError::Bind)?;
        info!(addr = %local_addr, "chat server listening");
        Ok(Self { listener, local_addr })
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Runs forever, spawning `worker::handle_connection` for each
    /// accepted socket.
    pub async fn accept_loop(self, state: AppState) {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer_addr)) => {
                    debug!(peer = %peer_addr, "accepted connection");
                    let state = state.clone();
                    let conn_id = state.next_conn_id();
                    tokio::spawn(async move {
                        worker::handle_connection(stream, peer_addr, state, conn_id).await;
                    });
                }
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
                }
            }
        }
    }
}
