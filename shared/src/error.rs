//! Error taxonomy shared by sessions, the command interpreter and the server.
//!
//! Precondition and input-validation errors are reported locally through the
//! UI notifier and never reach the network. Only [`ChatError::IdentityRequired`]
//! is fatal for a client process.

use std::io;
use thiserror::Error;

/// Failures raised by a transport connection.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("connection is closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed frame: {0}")]
    Codec(#[from] bincode::Error),

    #[error("frame of {0} bytes exceeds the {max} byte limit", max = crate::MAX_FRAME_LEN)]
    FrameTooLarge(usize),
}

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Couldn't connect to the server at {host}:{port}: {source}")]
    ConnectError {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("Could not send message to server: {0}")]
    SendFailed(#[from] TransportError),

    #[error("No login ID specified. Connection aborted.")]
    IdentityRequired,

    #[error("Invalid login ID {0:?}: it must be a single word of at most {max} bytes", max = crate::MAX_IDENTITY_LEN)]
    InvalidIdentity(String),

    #[error("Message of {0} bytes is too long, the limit is {max} bytes", max = crate::MAX_LINE_LEN)]
    LineTooLong(usize),

    #[error("Already connected to the server")]
    AlreadyConnected,

    #[error("Not connected to the server")]
    NotConnected,

    #[error("You need to be logged off before you can attempt to login again")]
    AlreadyActive,

    #[error("You must log off before changing the {0}")]
    MustDisconnectFirst(&'static str),

    #[error("Server is already listening for connections")]
    AlreadyListening,

    #[error("Server has already stopped listening for connections")]
    NotListening,

    #[error("Unable to change the {0} while the server is listening")]
    MustStopFirst(&'static str),

    #[error("Missing argument, #{0} requires a value")]
    MissingArgument(&'static str),

    #[error("Too many arguments for #{0}")]
    TooManyArguments(&'static str),

    #[error("The port entered was not valid: {0:?} is not a port number")]
    InvalidPort(String),

    #[error("Unknown command {0:?}, please enter a valid command")]
    UnknownCommand(String),

    #[error("Could not listen for clients on {addr}: {source}")]
    ListenFailed {
        addr: String,
        #[source]
        source: io::Error,
    },
}

impl ChatError {
    /// True for the errors that must end the client process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ChatError::IdentityRequired)
    }
}
