//! Scenario 3 (§8): GM_SEND fans out to every other subscribed member,
//! never back to the sender; GM_CHAT_END fans out PUSH GM_LEAVE.

mod common;

use common::{field, spawn_server, TestClient};

#[tokio::test]
async fn group_fan_out_excludes_sender() {
    let addr = spawn_server().await;

    let mut u1 = TestClient::connect(addr).await;
    let mut u2 = TestClient::connect(addr).await;
    let mut u3 = TestClient::connect(addr).await;

    u1.register_and_login("u1", "pw").await;
    u2.register_and_login("u2", "pw").await;
    u3.register_and_login("u3", "pw").await;

    u1.send("GROUP_CREATE", "3", &[("name", "crew")]).await;
    let resp = u1.recv().await;
    assert!(resp.starts_with("OK"));
    let group_id = field(&resp, "group_id").expect("group_id").to_string();

    u1.send("GROUP_ADD", "4", &[("group_id", &group_id), ("username", "u2")]).await;
    assert!(u1.recv().await.starts_with("OK"));
    u1.send("GROUP_ADD", "5", &[("group_id", &group_id), ("username", "u3")]).await;
    assert!(u1.recv().await.starts_with("OK"));

    // u1 joins first — no one else is subscribed yet, so no fan-out.
    u1.send("GM_CHAT_START", "6", &[("group_id", &group_id)]).await;
    assert!(u1.recv().await.starts_with("OK"));

    // u2 joins — u1 (already subscribed) observes the join push.
    u2.send("GM_CHAT_START", "6", &[("group_id", &group_id)]).await;
    assert!(u2.recv().await.starts_with("OK"));
    assert_eq!(u1.recv().await, "PUSH GM_JOIN user=u2");

    // u3 joins — both u1 and u2 observe it.
    u3.send("GM_CHAT_START", "6", &[("group_id", &group_id)]).await;
    assert!(u3.recv().await.starts_with("OK"));
    assert_eq!(u1.recv().await, "PUSH GM_JOIN user=u3");
    assert_eq!(u2.recv().await, "PUSH GM_JOIN user=u3");

    u1.send("GM_SEND", "7", &[("group_id", &group_id), ("content", "aGV5")]).await;
    let resp = u1.recv().await;
    assert!(resp.starts_with("OK"));
    assert_eq!(field(&resp, "msg_id"), Some("1"));

    let push_u2 = u2.recv().await;
    assert!(push_u2.starts_with("PUSH GM"));
    assert_eq!(field(&push_u2, "from"), Some("u1"));

    let push_u3 = u3.recv().await;
    assert!(push_u3.starts_with("PUSH GM"));
    assert_eq!(field(&push_u3, "from"), Some("u1"));

    u2.send("GM_CHAT_END", "8", &[]).await;
    assert!(u2.recv().await.starts_with("OK"));

    assert_eq!(u1.recv().await, "PUSH GM_LEAVE user=u2");
    assert_eq!(u3.recv().await, "PUSH GM_LEAVE user=u2");
}
