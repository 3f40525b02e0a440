//! Listening controller
//!
//! Tracks whether the server accepts new connections. The actual socket work
//! is behind [`Acceptor`] so the controller can be driven without a network.

use crate::registry::Hub;
use crate::STOP_WARNING;
use log::info;
use shared::{ChatError, Envelope, Notifier};
use std::net::SocketAddr;
use std::sync::Arc;

/// Server-side half of the transport: opens and closes the listening socket.
pub trait Acceptor {
    /// Starts accepting on `host:port` and returns the bound address.
    fn listen(&mut self, host: &str, port: u16) -> Result<SocketAddr, ChatError>;
    fn stop_listening(&mut self);
}

pub struct ListeningController<A: Acceptor> {
    acceptor: A,
    host: String,
    port: u16,
    local_addr: Option<SocketAddr>,
    notifier: Arc<dyn Notifier>,
}

impl<A: Acceptor> ListeningController<A> {
    pub fn new(acceptor: A, host: impl Into<String>, port: u16, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            acceptor,
            host: host.into(),
            port,
            local_addr: None,
            notifier,
        }
    }

    pub fn is_listening(&self) -> bool {
        self.local_addr.is_some()
    }

    /// Address actually bound, while listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn start(&mut self) -> Result<SocketAddr, ChatError> {
        if self.is_listening() {
            return Err(ChatError::AlreadyListening);
        }

        let addr = self.acceptor.listen(&self.host, self.port)?;
        info!("Listening on {}", addr);
        self.local_addr = Some(addr);
        self.notifier.notify(&format!(
            "Server listening for connections on port {}",
            addr.port()
        ));
        Ok(addr)
    }

    /// Stops accepting. Registered sessions are warned first and stay open.
    pub fn stop(&mut self, hub: &mut Hub) -> Result<(), ChatError> {
        if !self.is_listening() {
            return Err(ChatError::NotListening);
        }

        hub.broadcast(&Envelope::system(STOP_WARNING), None);
        self.acceptor.stop_listening();
        self.local_addr = None;
        info!("Stopped listening");
        self.notifier
            .notify("Server has stopped listening for connections.");
        Ok(())
    }

    pub fn set_port(&mut self, port: u16) -> Result<(), ChatError> {
        if self.is_listening() {
            return Err(ChatError::MustStopFirst("port"));
        }
        self.port = port;
        Ok(())
    }

    pub fn set_host(&mut self, host: impl Into<String>) -> Result<(), ChatError> {
        if self.is_listening() {
            return Err(ChatError::MustStopFirst("host"));
        }
        self.host = host.into();
        Ok(())
    }
}
