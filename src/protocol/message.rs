//! Protocol message definitions
//!
//! Defines the tagged union exchanged between LanChat peers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Presence announcement broadcast over UDP
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    /// Display name of the announcing peer
    pub user: String,
    /// TCP port the peer accepts message frames on
    pub port: u16,
}

impl Announcement {
    pub fn new(user: impl Into<String>, port: u16) -> Self {
        Self {
            user: user.into(),
            port,
        }
    }
}

/// Body shared by direct and group chat frames
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Unique message token
    pub msg_id: String,
    /// Display name of the sender
    pub sender: String,
    /// Message text
    pub content: String,
    /// Wall-clock seconds since the Unix epoch
    pub timestamp: f64,
    /// Lamport clock value assigned by the sender.
    /// Peers that predate the clock omit it.
    #[serde(default)]
    pub lamport_clock: u64,
}

impl ChatMessage {
    /// Build a fresh message stamped with a new id and the current time
    pub fn new(sender: impl Into<String>, content: impl Into<String>, lamport_clock: u64) -> Self {
        Self {
            msg_id: uuid::Uuid::new_v4().to_string(),
            sender: sender.into(),
            content: content.into(),
            timestamp: unix_timestamp(),
            lamport_clock,
        }
    }
}

/// Kind of a chat frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    /// Point-to-point message
    Chat,
    /// One recipient's copy of a group fan-out
    Group,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Chat => "CHAT",
            MessageKind::Group => "GROUP",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// All possible protocol messages
///
/// The `type` field selects the variant; unknown tags fail to parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    /// Presence announcement (UDP only, never carries content)
    #[serde(rename = "HELLO")]
    Hello(Announcement),

    /// Direct message (TCP)
    #[serde(rename = "CHAT")]
    Chat(ChatMessage),

    /// Group message (TCP)
    #[serde(rename = "GROUP")]
    Group(ChatMessage),
}

impl Message {
    /// Wrap a chat body in the frame variant for `kind`
    pub fn from_chat(kind: MessageKind, body: ChatMessage) -> Self {
        match kind {
            MessageKind::Chat => Message::Chat(body),
            MessageKind::Group => Message::Group(body),
        }
    }

    /// Wire tag of this message
    pub fn type_name(&self) -> &'static str {
        match self {
            Message::Hello(_) => "HELLO",
            Message::Chat(_) => "CHAT",
            Message::Group(_) => "GROUP",
        }
    }

    /// Split a chat frame into its kind and body; `None` for announcements
    pub fn into_chat(self) -> Option<(MessageKind, ChatMessage)> {
        match self {
            Message::Hello(_) => None,
            Message::Chat(body) => Some((MessageKind::Chat, body)),
            Message::Group(body) => Some((MessageKind::Group, body)),
        }
    }
}

/// Current wall-clock time as float seconds since the Unix epoch
pub fn unix_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}
