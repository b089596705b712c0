//! Scenario 5 (§8): only one active session per account; a second LOGIN
//! is rejected until the first LOGOUTs.

mod common;

use common::{field, spawn_server, TestClient};

#[tokio::test]
async fn only_one_active_session_per_account() {
    let addr = spawn_server().await;

    let mut c1 = TestClient::connect(addr).await;
    c1.register_and_login("alice", "pw").await;

    let mut c2 = TestClient::connect(addr).await;
    c2.send("LOGIN", "1", &[("username", "alice"), ("password", "pw")]).await;
    let resp = c2.recv().await;
    assert!(resp.starts_with("ERR"));
    assert!(resp.contains("409"));
    assert!(resp.contains("already_logged_in"));

    c1.send("LOGOUT", "9", &[]).await;
    let resp = c1.recv().await;
    assert!(resp.starts_with("OK"));

    c2.send("LOGIN", "2", &[("username", "alice"), ("password", "pw")]).await;
    let resp = c2.recv().await;
    assert!(resp.starts_with("OK"));
    assert!(field(&resp, "token").is_some());
}
