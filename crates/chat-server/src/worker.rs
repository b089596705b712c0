//! Per-connection worker: a read loop paired with a dedicated writer
//! task fed by this connection's own channel (§9's design note). Both
//! handler responses and, once logged in, pushes addressed to this
//! user funnel through that same channel into the one task that
//! actually touches the socket — which is what gives "a push never
//! splits a response" for free (§4.12).

use crate::handlers;
use crate::router;
use crate::state::AppState;
use chat_core::framer::{write_record, FramerError, LineFramer};
use chat_core::session::ConnId;
use std::net::SocketAddr;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, warn};

pub async fn handle_connection(stream: TcpStream, peer_addr: SocketAddr, state: AppState, conn_id: ConnId) {
    let (mut reader, mut writer) = stream.into_split();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    let writer_task = tokio::spawn(async move {
        while let Some(record) = rx.recv().await {
            if write_record(&mut writer, &record).await.is_err() {
                break;
            }
        }
        let _ = writer.shutdown().await;
    });

    let mut framer = LineFramer::new();
    loop {
        let record = match framer.read_record(&mut reader).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!(peer = %peer_addr, "peer closed connection");
                break;
            }
            Err(FramerError::OversizeRecord) => {
                warn!(peer = %peer_addr, "oversize record, closing connection");
                break;
            }
            Err(FramerError::Io(e)) => {
                debug!(peer = %peer_addr, error = %e, "read error, closing connection");
                break;
            }
        };

        let dispatch = router::dispatch(&state, conn_id, &tx, &record);
        if tx.send(dispatch.response).is_err() {
            break;
        }
        if dispatch.close {
            break;
        }
    }

    // Drop this loop's own sender so the writer task can drain whatever
    // is still queued and exit once the registry's clone (if any) is
    // gone too — `teardown_connection` removes that one.
    drop(tx);
    handlers::teardown_connection(&state, conn_id);
    let _ = writer_task.await;
}
