//! # Chat Server Library
//!
//! Multi-client chat server. Clients connect over TCP, announce a login ID
//! and from then on every line they send is relayed to every logged-in
//! client, prefixed with the sender's ID.
//!
//! ## Module Organization
//!
//! ### Registry Module (`registry`)
//! The [`registry::Hub`] owns every accepted session. It keeps anonymous
//! sessions apart until they log in, registers them under their identity,
//! and fans broadcasts out to the registry, tolerating individual delivery
//! failures.
//!
//! ### Listener Module (`listener`)
//! The [`listener::ListeningController`] decides whether new connections are
//! accepted. Stopping warns connected clients but leaves them connected.
//!
//! ### Network Module (`network`)
//! TCP acceptor and the [`network::Server`] event loop. Accepted sockets,
//! connection events and operator lines all arrive on channels and are
//! handled one at a time, so the registry is never touched concurrently.
//!
//! ### Console Module (`console`)
//! Operator commands (`#start`, `#stop`, `#close`, `#setport`, ...). Plain
//! operator lines are broadcast as server messages.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//! use server::ServerConfig;
//! use shared::ConsoleNotifier;
//! use std::sync::Arc;
//! use tokio::io::BufReader;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new(ServerConfig::default(), Arc::new(ConsoleNotifier));
//!     server.start_listening()?;
//!
//!     // Reads operator commands until "#quit"
//!     server.run(BufReader::new(tokio::io::stdin())).await;
//!     Ok(())
//! }
//! ```

pub mod console;
pub mod listener;
pub mod network;
pub mod registry;

/// Broadcast to clients when the server stops accepting connections.
pub const STOP_WARNING: &str = "WARNING - The server has stopped listening for connections";
/// Broadcast to clients right before `#close` disconnects them.
pub const SHUTDOWN_WARNING: &str = "SERVER SHUTTING DOWN! DISCONNECTING!";
pub const SERVER_MSG_PREFIX: &str = "SERVER MSG> ";
/// Connections allowed to wait for their login announcement at once.
pub const MAX_PENDING_LOGINS: usize = 64;

/// Where the server listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: shared::DEFAULT_PORT,
        }
    }
}
