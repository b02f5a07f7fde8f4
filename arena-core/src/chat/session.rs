//! Per-room chat log and typing view

use std::time::Duration;

use tracing::debug;

use super::typing::TypingTracker;
use super::unread::UnreadCounter;
use super::ChatMessage;
use crate::auth::Identity;

/// Message log, typing indicators and unread count for one room
#[derive(Debug)]
pub struct ChatSession {
    room_code: String,
    local: Identity,
    messages: Vec<ChatMessage>,
    typing: TypingTracker,
    unread: UnreadCounter,
    history_seeded: bool,
}

impl ChatSession {
    pub fn new(room_code: impl Into<String>, local: Identity, typing_ttl: Duration) -> Self {
        Self {
            room_code: room_code.into(),
            local,
            messages: Vec::new(),
            typing: TypingTracker::new(typing_ttl),
            unread: UnreadCounter::new(),
            history_seeded: false,
        }
    }

    pub fn room_code(&self) -> &str {
        &self.room_code
    }

    /// Append a live message in delivery order
    ///
    /// Returns the current unread count.
    pub fn on_chat(&mut self, sender: Identity, content: impl Into<String>) -> usize {
        let from_peer = sender != self.local;
        self.messages.push(ChatMessage {
            sender,
            content: content.into(),
        });
        if from_peer {
            self.unread.on_message();
        }
        self.unread.count()
    }

    /// Refresh a peer's typing indicator; own typing is ignored
    pub fn on_typing(&mut self, sender: Identity) -> bool {
        if sender == self.local {
            return false;
        }
        self.typing.touch(sender);
        true
    }

    /// Wait until a typing indicator lapses; pending while nobody types
    pub async fn next_typing_expiry(&mut self) -> Identity {
        self.typing.next_expired().await
    }

    /// Prepend stored history once; later calls are ignored
    pub fn seed_history(&mut self, history: Vec<ChatMessage>) -> bool {
        if self.history_seeded {
            debug!(room = %self.room_code, "Chat history already seeded");
            return false;
        }
        self.history_seeded = true;
        let live = std::mem::replace(&mut self.messages, history);
        self.messages.extend(live);
        true
    }

    pub fn open(&mut self) {
        self.unread.open();
    }

    pub fn close(&mut self) {
        self.unread.close();
    }

    pub fn is_open(&self) -> bool {
        self.unread.is_open()
    }

    pub fn unread(&self) -> usize {
        self.unread.count()
    }

    pub fn unread_badge(&self) -> Option<String> {
        self.unread.badge()
    }

    pub fn typing_users(&self) -> Vec<Identity> {
        self.typing.typing_users()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Switch to another room, dropping everything from the previous one
    pub fn reset(&mut self, room_code: impl Into<String>) {
        self.room_code = room_code.into();
        self.messages.clear();
        self.typing.clear();
        self.unread.reset();
        self.history_seeded = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{Instant, advance};

    fn session() -> ChatSession {
        ChatSession::new("AB12", Identity::new("alice"), Duration::from_secs(2))
    }

    fn msg(sender: &str, content: &str) -> ChatMessage {
        ChatMessage {
            sender: Identity::new(sender),
            content: content.to_string(),
        }
    }

    #[test]
    fn messages_keep_delivery_order() {
        let mut chat = session();
        chat.on_chat(Identity::new("bob"), "one");
        chat.on_chat(Identity::new("alice"), "two");
        chat.on_chat(Identity::new("bob"), "three");

        let contents: Vec<&str> = chat.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["one", "two", "three"]);
    }

    #[test]
    fn peer_messages_count_as_unread_until_opened() {
        let mut chat = session();
        assert_eq!(chat.on_chat(Identity::new("bob"), "hi"), 1);
        assert_eq!(chat.on_chat(Identity::new("alice"), "mine"), 1);

        chat.open();
        assert_eq!(chat.unread(), 0);
        chat.on_chat(Identity::new("bob"), "seen");
        assert_eq!(chat.unread(), 0);
    }

    #[test]
    fn history_is_prepended_once() {
        let mut chat = session();
        chat.on_chat(Identity::new("bob"), "live");

        assert!(chat.seed_history(vec![msg("bob", "old-1"), msg("alice", "old-2")]));
        assert!(!chat.seed_history(vec![msg("bob", "again")]));

        let contents: Vec<&str> = chat.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["old-1", "old-2", "live"]);
    }

    #[tokio::test(start_paused = true)]
    async fn own_typing_is_ignored() {
        let mut chat = session();
        assert!(!chat.on_typing(Identity::new("alice")));
        assert!(chat.typing_users().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn peer_typing_expires_two_seconds_after_last_event() {
        let mut chat = session();
        let start = Instant::now();
        chat.on_typing(Identity::new("bob"));
        advance(Duration::from_secs(1)).await;
        chat.on_typing(Identity::new("bob"));

        let expired = chat.next_typing_expiry().await;

        assert_eq!(expired, Identity::new("bob"));
        assert!(start.elapsed() >= Duration::from_secs(3));
        assert!(chat.typing_users().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn reset_clears_previous_room() {
        let mut chat = session();
        chat.on_chat(Identity::new("bob"), "hi");
        chat.on_typing(Identity::new("bob"));
        chat.seed_history(vec![]);

        chat.reset("ZZ99");

        assert_eq!(chat.room_code(), "ZZ99");
        assert!(chat.messages().is_empty());
        assert!(chat.typing_users().is_empty());
        assert_eq!(chat.unread(), 0);
        assert!(chat.seed_history(vec![msg("carol", "fresh")]));
    }
}
