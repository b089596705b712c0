//! The delivery engine: fan-out of PUSH records to subscribed recipients.
//!
//! Per §9's design note, every function here takes a snapshot of
//! outbound channels from the session registry (a quick, synchronous
//! lock) and only *then* sends — sending into an unbounded channel
//! never blocks, but the pattern still holds: we never keep the
//! registry's lock past the point where we start handing bytes to
//! connections.

use chat_core::protocol::encode_push;
use chat_core::session::{OutboundTx, SessionRegistry};
use chat_core::types::{GroupId, UserId};
use tracing::debug;

/// Sends one already-encoded record to a specific outbound channel. A
/// closed channel means the connection is already tearing down; per §5,
/// a push the delivery engine can't deliver is silently dropped.
pub fn push(tx: &OutboundTx, record: Vec<u8>) {
    if tx.send(record).is_err() {
        debug!("dropped push: connection's writer task is gone");
    }
}

/// Pushes to `user_id` if they currently have a live session.
pub fn push_to_user(sessions: &SessionRegistry, user_id: UserId, record: Vec<u8>) {
    if let Some(tx) = sessions.outbound_of(user_id) {
        push(&tx, record);
    }
}

/// `PUSH PM from=.. content=.. msg_id=.. ts=..` to `to`. Callers are
/// expected to have already checked that `to` is online and subscribed
/// to a PM conversation with `from` (§4.7 step 4) — this function only
/// does the send.
pub fn push_pm(
    sessions: &SessionRegistry,
    to: UserId,
    from_username: &str,
    content_b64: &str,
    msg_id: i64,
    ts: i64,
) {
    let record = encode_push(
        "PM",
        &[
            ("from", from_username),
            ("content", content_b64),
            ("msg_id", &msg_id.to_string()),
            ("ts", &ts.to_string()),
        ],
    );
    push_to_user(sessions, to, record);
}

/// `PUSH JOIN user=..` / `PUSH LEAVE user=..` — the PM presence
/// indicator from §4.9.
pub fn push_join(sessions: &SessionRegistry, to: UserId, this_username: &str) {
    push_to_user(sessions, to, encode_push("JOIN", &[("user", this_username)]));
}

pub fn push_leave(sessions: &SessionRegistry, to: UserId, this_username: &str) {
    push_to_user(sessions, to, encode_push("LEAVE", &[("user", this_username)]));
}

/// `PUSH GM from=.. content=.. msg_id=.. ts=..` to every member of
/// `group` whose subscription is `InGroup(group)`, excluding `sender`.
/// §4.8 step 4.
pub fn fanout_gm(
    sessions: &SessionRegistry,
    members: &[UserId],
    group: GroupId,
    sender: UserId,
    from_username: &str,
    content_b64: &str,
    msg_id: i64,
    ts: i64,
) {
    let record = encode_push(
        "GM",
        &[
            ("from", from_username),
            ("content", content_b64),
            ("msg_id", &msg_id.to_string()),
            ("ts", &ts.to_string()),
        ],
    );
    for subscriber in sessions.group_subscribers(members, group, sender) {
        push(&subscriber.outbound, record.clone());
    }
}

/// `PUSH GM_JOIN user=..` to every other subscribed member.
pub fn fanout_gm_join(sessions: &SessionRegistry, members: &[UserId], group: GroupId, who: UserId, username: &str) {
    let record = encode_push("GM_JOIN", &[("user", username)]);
    for subscriber in sessions.group_subscribers(members, group, who) {
        push(&subscriber.outbound, record.clone());
    }
}

/// `PUSH GM_LEAVE user=..` to every other subscribed member.
pub fn fanout_gm_leave(sessions: &SessionRegistry, members: &[UserId], group: GroupId, who: UserId, username: &str) {
    let record = encode_push("GM_LEAVE", &[("user", username)]);
    for subscriber in sessions.group_subscribers(members, group, who) {
        push(&subscriber.outbound, record.clone());
    }
}

/// `PUSH GM_KICKED` (no keys) targeted at the removed member.
pub fn push_gm_kicked(sessions: &SessionRegistry, user_id: UserId) {
    push_to_user(sessions, user_id, encode_push("GM_KICKED", &[]));
}
