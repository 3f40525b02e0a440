//! Client network layer and event loop

use crate::{ClientConfig, ABNORMAL_TERMINATION, CONNECTION_CLOSED};
use log::{debug, error, info};
use shared::transport::spawn_connection;
use shared::{
    ChatError, ConnectionEvent, Flow, Notifier, Session, SessionEvent, SessionId, SessionState,
    TransportEventSink,
};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

pub struct ChatClient {
    pub(crate) session: Session,
    pub(crate) notifier: Arc<dyn Notifier>,
    events_tx: mpsc::UnboundedSender<ConnectionEvent>,
    events_rx: mpsc::UnboundedReceiver<ConnectionEvent>,
    next_session_id: SessionId,
}

impl ChatClient {
    pub fn new(config: ClientConfig, notifier: Arc<dyn Notifier>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        ChatClient {
            session: Session::client(1, config.host, config.port, config.identity),
            notifier,
            events_tx,
            events_rx,
            next_session_id: 2,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Connects at start-up.
    ///
    /// Only fatal errors are returned; anything else is reported and the
    /// client stays disconnected.
    pub async fn start(&mut self) -> Result<(), ChatError> {
        match self.connect().await {
            Err(e) if !e.is_fatal() => {
                self.notifier.notify(&e.to_string());
                Ok(())
            }
            result => result,
        }
    }

    /// Opens a connection to the configured server and logs in.
    pub async fn connect(&mut self) -> Result<(), ChatError> {
        self.session.begin_connect()?;

        let addr = (self.session.host(), self.session.port());
        let stream = match TcpStream::connect(addr).await {
            Ok(stream) => stream,
            Err(e) => return Err(self.session.connect_failed(e)),
        };

        let handle = spawn_connection(stream, self.session.id(), self.events_tx.clone());
        if let Err(e) = self.session.transport_opened(Box::new(handle)) {
            self.renew_session();
            return Err(e);
        }

        info!(
            "Connected to {}:{} as {}",
            self.session.host(),
            self.session.port(),
            self.session.label()
        );
        Ok(())
    }

    /// Applies one connection event. Events from replaced sessions are dropped.
    pub fn handle_event(&mut self, event: ConnectionEvent) {
        if event.id() != self.session.id() {
            debug!("Ignoring event from stale session {}", event.id());
            return;
        }

        match event {
            ConnectionEvent::Data { packet, .. } => match self.session.on_data(packet) {
                SessionEvent::Display(envelope) => self.notifier.notify(&envelope.to_string()),
                other => debug!("Nothing to display for {:?}", other),
            },
            ConnectionEvent::Closed { .. } => {
                self.session.on_closed();
                self.notifier.notify(CONNECTION_CLOSED);
                self.renew_session();
            }
            ConnectionEvent::Error { error, .. } => {
                self.session.on_error(&error);
                self.notifier.notify(ABNORMAL_TERMINATION);
                self.renew_session();
            }
        }
    }

    /// Runs until `#quit` or end of `input`.
    ///
    /// Returns early only with a fatal error.
    pub async fn run<R>(&mut self, input: R) -> Result<(), ChatError>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) => {
                            if self.handle_line(&line).await? == Flow::Quit {
                                break;
                            }
                        }
                        Ok(None) => {
                            info!("Console input closed");
                            break;
                        }
                        Err(e) => {
                            error!("Failed to read console input: {}", e);
                            break;
                        }
                    }
                },

                Some(event) = self.events_rx.recv() => {
                    self.handle_event(event);
                },
            }
        }

        self.quit();
        Ok(())
    }

    pub fn quit(&mut self) {
        if self.session.state() != SessionState::Disconnected {
            self.session.close();
        }
        info!("Client exiting");
    }

    /// Replaces a closed session by a disconnected one with the same settings.
    pub(crate) fn renew_session(&mut self) {
        if self.session.state() != SessionState::Closed {
            return;
        }
        let id = self.next_session_id;
        self.next_session_id += 1;
        self.session = self.session.successor(id);
        debug!("Session replaced by {}", id);
    }
}
