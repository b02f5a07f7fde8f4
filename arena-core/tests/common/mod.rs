//! Shared helpers for room integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use arena_core::{
    ArenaConfig, BearerToken, ConnectionHandle, ConnectionManager, MemoryBroker, MockRoomApi,
    RoomConfig, RoomSnapshot, RoomView,
};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::json;

pub const ROOM: &str = "AB12";
pub const STATUS_TOPIC: &str = "/topic/room/AB12/status";
pub const ROOM_TOPIC: &str = "/topic/room/AB12";

/// Token for `sub` valid for an hour
pub fn token(sub: &str) -> BearerToken {
    let exp = chrono::Utc::now().timestamp() + 3600;
    let raw = encode(
        &Header::default(),
        &json!({ "sub": sub, "exp": exp }),
        &EncodingKey::from_secret(b"arena-test-secret"),
    )
    .unwrap();
    BearerToken::parse(raw).unwrap()
}

pub async fn connect(broker: &MemoryBroker, user: &str) -> ConnectionHandle {
    ConnectionManager::with_transport(&ArenaConfig::default(), Arc::new(broker.clone()))
        .connect(token(user))
        .await
        .unwrap()
}

pub async fn enter(broker: &MemoryBroker, api: &MockRoomApi, user: &str, config: &RoomConfig) -> RoomView {
    let handle = connect(broker, user).await;
    RoomView::enter(handle, Arc::new(api.clone()), ROOM, config)
}

pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never became true");
}

pub async fn wait_for(view: &RoomView, check: impl FnMut(&RoomSnapshot) -> bool) -> RoomSnapshot {
    let mut snapshots = view.snapshots();
    let snapshot = snapshots.wait_for(check).await.unwrap();
    snapshot.clone()
}

pub fn match_completed(winner: &str) -> String {
    json!({
        "event": "MATCH_COMPLETED",
        "winner": winner,
        "player1": "alice",
        "player2": "bob",
        "player1Score": 3,
        "player2Score": 2
    })
    .to_string()
}

pub fn chat(sender: &str, content: &str) -> String {
    json!({
        "type": "CHAT",
        "content": content,
        "roomCode": ROOM,
        "senderUsername": sender
    })
    .to_string()
}
