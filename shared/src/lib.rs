//! Protocol types and connection core shared by the chat server and client.
//!
//! The crate holds everything both sides agree on: the frames exchanged over
//! the wire, the rendering of broadcast messages, the in-band command
//! language and the per-connection session state machine.

pub mod command;
pub mod display;
pub mod error;
pub mod session;
pub mod transport;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use command::{interpret, validate_identity, Action, CommandContext, Flow, Role, SENTINEL};
pub use display::{ConsoleNotifier, Notifier, RecordingNotifier};
pub use error::{ChatError, TransportError};
pub use session::{Session, SessionEvent, SessionId, SessionRole, SessionState};
pub use transport::{ConnectionEvent, TransportEventSink, TransportHandle};

pub const DEFAULT_PORT: u16 = 5555;
pub const DEFAULT_HOST: &str = "localhost";
/// Upper bound on a single encoded frame.
pub const MAX_FRAME_LEN: usize = 64 * 1024;
/// Longest login ID, in bytes.
pub const MAX_IDENTITY_LEN: usize = 256;
/// Longest chat line, in bytes. A broadcast built from a line this long and
/// the longest login ID still fits in one frame.
pub const MAX_LINE_LEN: usize = MAX_FRAME_LEN - 1024;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Chat,
    System,
    LoginAnnounce,
}

/// One message fanned out by the server to every logged-in session.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub kind: MessageKind,
    pub sender: Option<String>,
    pub body: String,
}

impl Envelope {
    pub fn chat(sender: &str, body: &str) -> Self {
        Self {
            kind: MessageKind::Chat,
            sender: Some(sender.to_string()),
            body: body.to_string(),
        }
    }

    pub fn system(body: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::System,
            sender: None,
            body: body.into(),
        }
    }

    pub fn logged_on(identity: &str) -> Self {
        Self {
            kind: MessageKind::LoginAnnounce,
            sender: Some(identity.to_string()),
            body: format!("{} has logged on.", identity),
        }
    }

    pub fn departed(identity: &str) -> Self {
        Self {
            kind: MessageKind::LoginAnnounce,
            sender: Some(identity.to_string()),
            body: format!("{} has disconnected", identity),
        }
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.kind, &self.sender) {
            (MessageKind::Chat, Some(sender)) => write!(f, "{}> {}", sender, self.body),
            _ => f.write_str(&self.body),
        }
    }
}

/// Frames exchanged over a connection.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum Packet {
    /// Client to server: one console line, either chat text or a login announcement.
    Line(String),
    /// Server to client: a broadcast message.
    Message(Envelope),
}

impl Packet {
    /// Whether the encoded packet fits in a single frame.
    pub fn fits_in_frame(&self) -> bool {
        bincode::serialized_size(self).map_or(false, |len| len as usize <= MAX_FRAME_LEN)
    }
}
