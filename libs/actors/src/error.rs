//! Runtime error types
//!
//! [`RuntimeError`] covers registration and startup, where the caller gets
//! a synchronous failure. [`DeliveryError`] covers one message that could
//! not be delivered; it is logged and the message dropped.

use codec::CodecError;
use network::TransportError;
use std::net::SocketAddr;
use thiserror::Error;
use types::{ActorId, MessageId, SessionKey};

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Actor id 0 is reserved for the proxy actor")]
    ReservedId,

    #[error("Actor {0} is already registered")]
    DuplicateActor(ActorId),

    /// The same id was registered as local and as remote
    #[error("Actor {0} cannot be both local and remote")]
    ConflictingRemote(ActorId),

    #[error("Dispatcher has already been started")]
    AlreadyRunning,

    #[error("Worker count must be positive, got {0}")]
    InvalidWorkerCount(usize),

    #[error("Invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Message id {0} already has a handler")]
    DuplicateHandler(MessageId),

    /// A custom listener names a handler actor that is not registered
    #[error("Listener handler {0} is not a registered local actor")]
    UnknownHandler(ActorId),

    #[error("Init failed for {actor}: {source}")]
    InitFailed {
        actor: ActorId,
        #[source]
        source: anyhow::Error,
    },

    #[error("Listener on {address} failed: {source}")]
    ListenerFailed {
        address: SocketAddr,
        #[source]
        source: TransportError,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to spawn runtime thread: {0}")]
    Thread(#[from] std::io::Error),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl RuntimeError {
    pub fn invalid_address(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidAddress {
            address: address.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("No handler for message id {message_id}")]
    NoHandler { message_id: MessageId },

    #[error("Payload is not a {expected}")]
    PayloadType { expected: &'static str },

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("No target for session key {key}")]
    KeyNotFound { key: SessionKey },

    #[error("Actor {0} is not registered")]
    ActorNotFound(ActorId),

    #[error("Actor {0} is not local")]
    NotLocal(ActorId),

    #[error("Actor id 0 is the proxy and cannot be addressed")]
    ProxyDestination,

    #[error("Runtime is not running")]
    NotRunning,

    #[error("Reply outside of a message handler")]
    NoSender,

    #[error("Cannot handle {kind} message")]
    Unroutable { kind: &'static str },

    #[error("Pending cache for {0} is full")]
    CacheFull(ActorId),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
