//! Room chat: message log, typing indicators, unread badge

mod session;
mod typing;
mod unread;

use serde::{Deserialize, Serialize};

use crate::auth::Identity;

pub use session::ChatSession;
pub use typing::TypingTracker;
pub use unread::UnreadCounter;

/// One chat line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(rename = "senderUsername")]
    pub sender: Identity,
    pub content: String,
}
