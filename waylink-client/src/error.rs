//! The client's error taxonomy.
//!
//! Each enum here covers one failure surface: loading a protocol
//! description, connecting to a compositor, a single request/dispatch
//! call, or the object registry. None of these errors are recoverable by
//! retrying the same operation: a malformed protocol file stays
//! malformed, a closed socket stays closed, but distinguishing them lets
//! a caller decide whether to log, exit, or fall back.

use std::io;

use waylink_core::transport::{PeekHeaderError, RecvMessageError, SendMessageError};
use waylink_core::wire::WireError;

/// Something went wrong while loading a protocol's XML description.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("protocol description not found: {0}")]
    NotFound(String),
    #[error("failed to read protocol description: {0}")]
    Io(#[from] io::Error),
    #[error("malformed XML at byte {offset}: {message}")]
    MalformedXml { offset: usize, message: String },
    #[error("schema error in `{interface}`: {message}")]
    Schema { interface: String, message: String },
}

/// Failed to establish a connection to a compositor.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("failed to connect to compositor socket: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Client(#[from] ClientError),
}

/// An error surfaced in the course of normal client operation: sending a
/// request, dispatching events, or waiting on `sync`.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("connection closed by the compositor")]
    ConnectionClosed,
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
    #[error("wire protocol desync: {0}")]
    Desync(String),
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error("compositor reported a protocol error on object {object_id} (code {code}): {message}")]
    ServerError {
        object_id: u32,
        code: u32,
        message: String,
    },
    #[error("unknown object id {0}")]
    UnknownObject(u32),
    #[error("interface `{interface}` has no {kind} named `{name}`")]
    UnknownMessage {
        interface: String,
        kind: &'static str,
        name: String,
    },
    #[error("`{interface}`.`{message}` expects {expected} arguments, got {got}")]
    ArgumentArity {
        interface: String,
        message: String,
        expected: usize,
        got: usize,
    },
    #[error("sync() timed out waiting for the compositor to reply")]
    SyncTimeout,
}

impl From<SendMessageError> for ClientError {
    fn from(e: SendMessageError) -> Self {
        Self::Io(e.err)
    }
}

impl From<RecvMessageError> for ClientError {
    fn from(e: RecvMessageError) -> Self {
        match e {
            RecvMessageError::Io(e) => Self::Io(e),
            other => Self::Desync(other.to_string()),
        }
    }
}

impl From<PeekHeaderError> for ClientError {
    fn from(e: PeekHeaderError) -> Self {
        match e {
            PeekHeaderError::Io(e) => Self::Io(e),
            PeekHeaderError::NullObject => Self::Desync(e.to_string()),
        }
    }
}

/// Failures specific to object registry bookkeeping.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("object ids are exhausted")]
    IdsExhausted,
    #[error("global {name} (version {version}) was not advertised by the compositor")]
    NoSuchGlobal { name: String, version: u32 },
}
