//! Connection registry and broadcast hub
//!
//! The hub owns every server-accepted session. A session stays in the
//! pending set until its login announcement arrives, then moves into the
//! [`ConnectionRegistry`], the only set that receives broadcasts. This is
//! what guarantees a peer is identified before anything it says, or anything
//! said to the room, reaches it.
//!
//! Broadcasts are best effort: a failed delivery closes and unregisters that
//! one recipient after the fan-out has reached everybody else. A message too
//! large for one frame is dropped before any recipient sees it.
//!
//! At most [`MAX_PENDING_LOGINS`] sessions may wait for their login
//! announcement; further connections are closed on arrival.

use crate::MAX_PENDING_LOGINS;
use log::{debug, info, warn};
use shared::{
    ConnectionEvent, Envelope, Notifier, Packet, Session, SessionEvent, SessionId,
    SessionState, TransportError, TransportEventSink, MAX_LINE_LEN,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Logged-in sessions indexed by id. Every entry is `Active`.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    entries: HashMap<SessionId, Session>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn identity_of(&self, id: SessionId) -> Option<&str> {
        self.entries.get(&id).and_then(Session::identity)
    }

    /// Identities of all registered sessions, sorted.
    pub fn identities(&self) -> Vec<String> {
        let mut identities: Vec<String> = self.entries.values().map(Session::label).collect();
        identities.sort();
        identities
    }

    fn get_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.entries.get_mut(&id)
    }

    fn insert(&mut self, session: Session) {
        self.entries.insert(session.id(), session);
    }

    fn remove(&mut self, id: SessionId) -> Option<Session> {
        self.entries.remove(&id)
    }

    fn drain(&mut self) -> impl Iterator<Item = Session> + '_ {
        self.entries.drain().map(|(_, session)| session)
    }

    /// Writes `packet` to every entry except `exclude`.
    fn deliver(&mut self, packet: &Packet, exclude: Option<SessionId>) -> BroadcastReport {
        let mut report = BroadcastReport::default();

        for (id, session) in self.entries.iter_mut() {
            if Some(*id) == exclude {
                continue;
            }

            match session.send(packet.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!("Failed to deliver to {}: {}", session.label(), e);
                    report.failed.push(*id);
                }
            }
        }

        report
    }
}

/// Outcome of one broadcast.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: Vec<SessionId>,
}

pub struct Hub {
    pending: HashMap<SessionId, Session>,
    pending_limit: usize,
    registry: ConnectionRegistry,
    notifier: Arc<dyn Notifier>,
}

impl Hub {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            pending: HashMap::new(),
            pending_limit: MAX_PENDING_LOGINS,
            registry: ConnectionRegistry::new(),
            notifier,
        }
    }

    pub fn with_pending_limit(mut self, limit: usize) -> Self {
        self.pending_limit = limit;
        self
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Accepted sessions that have not logged in yet.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn connection_count(&self) -> usize {
        self.pending.len() + self.registry.len()
    }

    /// Takes ownership of a freshly accepted session.
    ///
    /// Returns false, after closing the session, when too many sessions are
    /// already waiting to log in.
    pub fn accept(&mut self, mut session: Session) -> bool {
        if self.pending.len() >= self.pending_limit {
            warn!(
                "Refusing {}: {} connections have not logged in yet",
                session.label(),
                self.pending.len()
            );
            session.close();
            return false;
        }

        info!("Client {} connected (session {})", session.label(), session.id());
        self.notifier
            .notify("A new client is attempting to connect to the server");
        self.pending.insert(session.id(), session);
        true
    }

    pub fn handle_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Data { id, packet } => self.handle_packet(id, packet),
            ConnectionEvent::Closed { id } => self.connection_lost(id, None),
            ConnectionEvent::Error { id, error } => self.connection_lost(id, Some(&error)),
        }
    }

    /// Routes one inbound payload from session `id`.
    pub fn handle_packet(&mut self, id: SessionId, packet: Packet) {
        if let Packet::Line(text) = &packet {
            if text.len() > MAX_LINE_LEN {
                warn!("Dropping {} byte line from session {}", text.len(), id);
                return;
            }
        }

        let session = match self.pending.get_mut(&id) {
            Some(session) => session,
            None => match self.registry.get_mut(id) {
                Some(session) => session,
                None => {
                    debug!("Dropping data for unknown session {}", id);
                    return;
                }
            },
        };

        match session.on_data(packet) {
            SessionEvent::LoggedIn { identity } => {
                self.register(id, &identity);
                self.broadcast(&Envelope::logged_on(&identity), None);
            }
            SessionEvent::IdentityChanged { previous, identity } => {
                info!("{} is now known as {}", previous, identity);
                self.register(id, &identity);
                self.broadcast(&Envelope::logged_on(&identity), None);
            }
            SessionEvent::Chat(body) => {
                let sender = session.label();
                info!("Message received: {} from {}", body, sender);
                self.broadcast(&Envelope::chat(&sender, &body), None);
            }
            SessionEvent::Unidentified(text) => {
                warn!(
                    "Dropping {:?} from {}: no login announcement yet",
                    text,
                    session.label()
                );
            }
            SessionEvent::Display(_) | SessionEvent::Ignored => {}
        }
    }

    /// Binds `identity` to session `id` and makes it a broadcast recipient.
    ///
    /// Returns true when the session was newly registered. A session that is
    /// already registered only has its identity updated in place.
    pub fn register(&mut self, id: SessionId, identity: &str) -> bool {
        if let Some(session) = self.registry.get_mut(id) {
            session.bind_identity(identity);
            return false;
        }

        let Some(mut session) = self.pending.remove(&id) else {
            warn!("Cannot register unknown session {}", id);
            return false;
        };
        if session.state() != SessionState::Active {
            warn!("Not registering session {} in state {:?}", id, session.state());
            return false;
        }

        session.bind_identity(identity);
        info!("{} has logged on (session {})", identity, id);
        self.registry.insert(session);
        true
    }

    /// Removes session `id` from the registry and tells the room it left.
    pub fn unregister(&mut self, id: SessionId) -> Option<Session> {
        let mut session = self.registry.remove(id)?;
        session.close();

        let identity = session.label();
        info!("{} has disconnected", identity);
        self.broadcast(&Envelope::departed(&identity), None);
        Some(session)
    }

    /// Sends `envelope` to every registered session except `exclude`.
    ///
    /// Recipients whose delivery fails are unregistered once the fan-out is
    /// complete; their departure is then broadcast to the rest.
    pub fn broadcast(&mut self, envelope: &Envelope, exclude: Option<SessionId>) -> BroadcastReport {
        let packet = Packet::Message(envelope.clone());
        if !packet.fits_in_frame() {
            warn!(
                "Not broadcasting {} byte message: it does not fit in a frame",
                envelope.body.len()
            );
            return BroadcastReport::default();
        }

        self.notifier.notify(&envelope.to_string());
        let report = self.registry.deliver(&packet, exclude);
        for id in &report.failed {
            self.unregister(*id);
        }
        report
    }

    /// Closes every session, registered or not.
    pub fn close_all(&mut self) {
        let count = self.connection_count();

        for (_, mut session) in self.pending.drain() {
            session.close();
        }
        for mut session in self.registry.drain() {
            session.close();
        }

        if count > 0 {
            info!("Closed {} client connections", count);
        }
    }

    fn connection_lost(&mut self, id: SessionId, error: Option<&TransportError>) {
        if let Some(mut session) = self.pending.remove(&id) {
            match error {
                Some(e) => session.on_error(e),
                None => session.on_closed(),
            }
            info!("{} disconnected before logging in", session.label());
            return;
        }

        if let Some(session) = self.registry.get_mut(id) {
            match error {
                Some(e) => session.on_error(e),
                None => session.on_closed(),
            }
            self.unregister(id);
        }
    }
}
