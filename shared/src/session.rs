//! Per-connection session state machine.
//!
//! ```text
//! Disconnected -> Connecting -> AwaitingIdentity -> Active -> Closing -> Closed
//! ```
//!
//! Client sessions walk the whole chain: the transport is opened, the login
//! announcement is written and the session becomes `Active` without waiting
//! for an acknowledgement. Server-accepted peers start `Active` with no
//! identity; their first inbound line must be the login announcement.
//!
//! Connecting is split into [`Session::begin_connect`],
//! [`Session::transport_opened`] and [`Session::connect_failed`] so the state
//! machine stays synchronous while the owner performs the actual open.

use crate::command::{login_announcement, parse_login_announcement, validate_identity};
use crate::error::{ChatError, TransportError};
use crate::transport::{TransportEventSink, TransportHandle};
use crate::{Envelope, Packet, MAX_LINE_LEN};
use log::{debug, info, warn};
use std::fmt;
use std::io;
use std::net::SocketAddr;

pub type SessionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    AwaitingIdentity,
    Active,
    Closing,
    Closed,
}

impl SessionState {
    /// Outbound payloads are accepted only in these states.
    pub fn can_send(self) -> bool {
        matches!(self, SessionState::AwaitingIdentity | SessionState::Active)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRole {
    ClientSide,
    ServerAcceptedPeer,
}

/// What an inbound payload turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// First login announcement from a server-accepted peer.
    LoggedIn { identity: String },
    /// Login announcement from a peer that already had an identity.
    IdentityChanged { previous: String, identity: String },
    /// Chat text from an identified peer.
    Chat(String),
    /// Message for the local user of a client session.
    Display(Envelope),
    /// Payload from a peer that has not announced itself yet.
    Unidentified(String),
    Ignored,
}

pub struct Session {
    id: SessionId,
    identity: Option<String>,
    state: SessionState,
    role: SessionRole,
    host: String,
    port: u16,
    transport: Option<Box<dyn TransportHandle>>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("identity", &self.identity)
            .field("state", &self.state)
            .field("role", &self.role)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("bound", &self.transport.is_some())
            .finish()
    }
}

impl Session {
    /// Creates a disconnected client session.
    pub fn client(
        id: SessionId,
        host: impl Into<String>,
        port: u16,
        identity: Option<String>,
    ) -> Self {
        Self {
            id,
            identity,
            state: SessionState::Disconnected,
            role: SessionRole::ClientSide,
            host: host.into(),
            port,
            transport: None,
        }
    }

    /// Wraps a connection the server has finished accepting.
    ///
    /// The session is `Active` straight away and stays anonymous until the
    /// peer's login announcement arrives.
    pub fn accepted(id: SessionId, transport: Box<dyn TransportHandle>, peer: SocketAddr) -> Self {
        Self {
            id,
            identity: None,
            state: SessionState::Active,
            role: SessionRole::ServerAcceptedPeer,
            host: peer.ip().to_string(),
            port: peer.port(),
            transport: Some(transport),
        }
    }

    /// Fresh disconnected client session carrying over host, port and identity.
    pub fn successor(&self, id: SessionId) -> Self {
        Self::client(id, self.host.clone(), self.port, self.identity.clone())
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn role(&self) -> SessionRole {
        self.role
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Label for notices: the identity, or the peer address before login.
    pub fn label(&self) -> String {
        match &self.identity {
            Some(identity) => identity.clone(),
            None => format!("{}:{}", self.host, self.port),
        }
    }

    pub fn set_host(&mut self, host: impl Into<String>) -> Result<(), ChatError> {
        if self.state != SessionState::Disconnected {
            return Err(ChatError::MustDisconnectFirst("host"));
        }
        self.host = host.into();
        Ok(())
    }

    pub fn set_port(&mut self, port: u16) -> Result<(), ChatError> {
        if self.state != SessionState::Disconnected {
            return Err(ChatError::MustDisconnectFirst("port"));
        }
        self.port = port;
        Ok(())
    }

    /// Stores the trimmed login ID and returns the previous one.
    pub fn set_identity(&mut self, identity: &str) -> Result<Option<String>, ChatError> {
        if self.state != SessionState::Disconnected {
            return Err(ChatError::MustDisconnectFirst("login ID"));
        }
        let identity = validate_identity(identity)?;
        Ok(self.identity.replace(identity))
    }

    /// Puts back a login ID returned by [`Session::set_identity`].
    pub fn restore_identity(&mut self, previous: Option<String>) {
        if self.state == SessionState::Disconnected {
            self.identity = previous;
        }
    }

    /// Records a new identity and returns the previous one.
    pub fn bind_identity(&mut self, identity: impl Into<String>) -> Option<String> {
        self.identity.replace(identity.into())
    }

    /// `Disconnected -> Connecting`.
    pub fn begin_connect(&mut self) -> Result<(), ChatError> {
        if self.state != SessionState::Disconnected {
            return Err(ChatError::AlreadyConnected);
        }
        debug!("Session {} connecting to {}:{}", self.id, self.host, self.port);
        self.state = SessionState::Connecting;
        Ok(())
    }

    /// The open attempt failed; the session goes back to `Disconnected`.
    pub fn connect_failed(&mut self, source: io::Error) -> ChatError {
        if self.state == SessionState::Connecting {
            self.state = SessionState::Disconnected;
        }
        ChatError::ConnectError {
            host: self.host.clone(),
            port: self.port,
            source,
        }
    }

    /// Binds the opened transport and announces the identity.
    ///
    /// Without a usable identity the session closes without writing anything
    /// and fails with [`ChatError::IdentityRequired`] or
    /// [`ChatError::InvalidIdentity`].
    pub fn transport_opened(
        &mut self,
        mut transport: Box<dyn TransportHandle>,
    ) -> Result<(), ChatError> {
        if self.state != SessionState::Connecting {
            transport.close();
            return Err(ChatError::AlreadyConnected);
        }
        self.transport = Some(transport);

        let identity = match validate_identity(self.identity.as_deref().unwrap_or_default()) {
            Ok(identity) => identity,
            Err(e) => {
                warn!("Session {} cannot log in: {}", self.id, e);
                self.close();
                return Err(e);
            }
        };
        self.identity = Some(identity.clone());

        self.state = SessionState::AwaitingIdentity;
        self.send(Packet::Line(login_announcement(&identity)))?;
        self.state = SessionState::Active;
        info!("Session {} logged in as {}", self.id, identity);
        Ok(())
    }

    /// Writes `packet` to the peer. A failed write closes the session.
    pub fn send(&mut self, packet: Packet) -> Result<(), ChatError> {
        if !self.state.can_send() {
            return Err(ChatError::NotConnected);
        }
        let transport = self.transport.as_mut().ok_or(ChatError::NotConnected)?;

        match transport.write(&packet) {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("Send on session {} failed: {}", self.id, e);
                self.close();
                Err(ChatError::SendFailed(e))
            }
        }
    }

    /// Sends one chat line. Lines over [`MAX_LINE_LEN`] are refused and the
    /// session stays open.
    pub fn send_line(&mut self, text: &str) -> Result<(), ChatError> {
        if text.len() > MAX_LINE_LEN {
            return Err(ChatError::LineTooLong(text.len()));
        }
        self.send(Packet::Line(text.to_string()))
    }

    /// Closes the session from any state. No-op once `Closed`.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        if let Some(mut transport) = self.transport.take() {
            self.state = SessionState::Closing;
            transport.close();
        }
        debug!("Session {} closed", self.id);
        self.state = SessionState::Closed;
    }

    fn route_peer_line(&mut self, text: String) -> SessionEvent {
        match (parse_login_announcement(&text), self.identity.is_some()) {
            (Some(identity), false) => {
                self.bind_identity(identity.clone());
                SessionEvent::LoggedIn { identity }
            }
            (Some(identity), true) => {
                let previous = self.bind_identity(identity.clone()).unwrap_or_default();
                SessionEvent::IdentityChanged { previous, identity }
            }
            (None, true) => SessionEvent::Chat(text),
            (None, false) => SessionEvent::Unidentified(text),
        }
    }
}

impl TransportEventSink for Session {
    fn on_data(&mut self, packet: Packet) -> SessionEvent {
        if !self.state.can_send() {
            debug!("Session {} dropped data in state {:?}", self.id, self.state);
            return SessionEvent::Ignored;
        }

        match (self.role, packet) {
            (SessionRole::ClientSide, Packet::Message(envelope)) => SessionEvent::Display(envelope),
            (SessionRole::ClientSide, Packet::Line(text)) => {
                SessionEvent::Display(Envelope::system(text))
            }
            (SessionRole::ServerAcceptedPeer, Packet::Line(text)) => self.route_peer_line(text),
            (SessionRole::ServerAcceptedPeer, Packet::Message(_)) => {
                warn!("Session {} sent a server-only frame", self.id);
                SessionEvent::Ignored
            }
        }
    }

    fn on_closed(&mut self) {
        info!("Connection of session {} closed", self.id);
        self.close();
    }

    fn on_error(&mut self, error: &TransportError) {
        warn!("Connection of session {} failed: {}", self.id, error);
        self.close();
    }
}
