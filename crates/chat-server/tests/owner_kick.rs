//! Scenario 4 (§8): GROUP_REMOVE on a subscribed member pushes
//! GM_KICKED to them and clears their subscription, so a subsequent
//! GM_SEND from them is rejected as not-a-member.

mod common;

use common::{field, spawn_server, TestClient};

#[tokio::test]
async fn owner_kick_clears_subscription() {
    let addr = spawn_server().await;

    let mut u1 = TestClient::connect(addr).await;
    let mut u2 = TestClient::connect(addr).await;

    u1.register_and_login("u1", "pw").await;
    u2.register_and_login("u2", "pw").await;

    u1.send("GROUP_CREATE", "3", &[("name", "crew")]).await;
    let resp = u1.recv().await;
    let group_id = field(&resp, "group_id").expect("group_id").to_string();

    u1.send("GROUP_ADD", "4", &[("group_id", &group_id), ("username", "u2")]).await;
    assert!(u1.recv().await.starts_with("OK"));

    u1.send("GM_CHAT_START", "5", &[("group_id", &group_id)]).await;
    assert!(u1.recv().await.starts_with("OK"));
    u2.send("GM_CHAT_START", "5", &[("group_id", &group_id)]).await;
    assert!(u2.recv().await.starts_with("OK"));
    assert_eq!(u1.recv().await, "PUSH GM_JOIN user=u2");

    u1.send("GROUP_REMOVE", "6", &[("group_id", &group_id), ("username", "u2")]).await;
    let resp = u1.recv().await;
    assert!(resp.starts_with("OK"));
    assert_eq!(field(&resp, "status"), Some("removed"));

    assert_eq!(u2.recv().await, "PUSH GM_KICKED");

    u2.send("GM_SEND", "7", &[("group_id", &group_id), ("content", "aGk=")]).await;
    let resp = u2.recv().await;
    assert!(resp.starts_with("ERR"));
    assert!(resp.contains("403"));
    assert!(resp.contains("not_group_member"));
}
