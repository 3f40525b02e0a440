//! # Chat Client Library
//!
//! Console chat client. A [`network::ChatClient`] owns one client-side
//! session at a time: it connects, announces the login ID, sends every
//! console line that is not a command, and shows whatever the server
//! broadcasts.
//!
//! A closed session is never reused. After a logoff, a lost connection or a
//! failed send the client switches to a fresh disconnected session with the
//! same host, port and login ID, ready for `#login`.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::ChatClient;
//! use client::ClientConfig;
//! use shared::ConsoleNotifier;
//! use std::sync::Arc;
//! use tokio::io::BufReader;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig {
//!         identity: Some("alice".to_string()),
//!         ..ClientConfig::default()
//!     };
//!     let mut client = ChatClient::new(config, Arc::new(ConsoleNotifier));
//!     client.start().await?;
//!     client.run(BufReader::new(tokio::io::stdin())).await?;
//!     Ok(())
//! }
//! ```

pub mod console;
pub mod network;

use shared::{validate_identity, ChatError};

pub const CONNECTION_CLOSED: &str = "Connection Closed";
pub const ABNORMAL_TERMINATION: &str = "Abnormal termination of connection.";
pub const SEND_FAILED: &str = "Could not send message to server. Connection terminated.";

/// Who to connect to and as whom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub identity: Option<String>,
    pub host: String,
    pub port: u16,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            identity: None,
            host: shared::DEFAULT_HOST.to_string(),
            port: shared::DEFAULT_PORT,
        }
    }
}

impl ClientConfig {
    /// Trims the login ID and rejects one the server would not accept.
    pub fn validate(mut self) -> Result<Self, ChatError> {
        if let Some(identity) = self.identity.take() {
            self.identity = Some(validate_identity(&identity)?);
        }
        Ok(self)
    }
}
