//! Scenario 2 (§8): a PM sent while the recipient has never logged in
//! is stored, not pushed, and surfaces as unread history once they do.

mod common;

use common::{field, spawn_server, TestClient};

#[tokio::test]
async fn offline_delivery_via_history() {
    let addr = spawn_server().await;

    let mut alice = TestClient::connect(addr).await;
    alice.register_and_login("alice", "pw").await;

    // bob exists but has never logged in — register only, no session.
    let mut bob_register = TestClient::connect(addr).await;
    bob_register.send("REGISTER", "1", &[("username", "bob"), ("password", "pw"), ("email", "bob@example.com")]).await;
    let resp = bob_register.recv().await;
    assert!(resp.starts_with("OK"));

    alice.send("PM_CHAT_START", "2", &[("with", "bob")]).await;
    let resp = alice.recv().await;
    assert!(resp.starts_with("OK"));

    alice.send("PM_SEND", "3", &[("to", "bob"), ("content", "aGk=")]).await;
    let resp = alice.recv().await;
    assert!(resp.starts_with("OK"));
    assert_eq!(field(&resp, "msg_id"), Some("1"));

    let mut bob = TestClient::connect(addr).await;
    bob.send("LOGIN", "1", &[("username", "bob"), ("password", "pw")]).await;
    let resp = bob.recv().await;
    assert!(resp.starts_with("OK"));

    bob.send("PM_CONVERSATIONS", "2", &[]).await;
    let resp = bob.recv().await;
    assert!(resp.starts_with("OK"));
    assert_eq!(field(&resp, "conversations"), Some("alice:1"));

    bob.send("PM_HISTORY", "3", &[("with", "alice")]).await;
    let resp = bob.recv().await;
    assert!(resp.starts_with("OK"));
    let messages = field(&resp, "messages").expect("messages field");
    assert!(messages.starts_with("1:alice:aGk=:"));
}
