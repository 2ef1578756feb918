// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for the ezmqx layer.
//!
//! Every public operation returns [`Result`]. Callers branch on
//! [`Error::kind`]; the message is for humans only.

use std::fmt;
use thiserror::Error;

/// Machine-matchable error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // Context state
    /// Context accessed before `initialize_*`.
    NotInitialized,
    /// `initialize_*` called on an initialized Context.
    AlreadyInitialized,

    // Input validation
    /// Topic name violates the naming grammar.
    InvalidTopic,
    /// Malformed argument.
    InvalidParam,

    // Port pool
    /// Every dynamic port is allocated.
    PortPoolExhausted,
    /// Released port was never allocated (or already free).
    InvalidRelease,
    /// Private port has no public mapping.
    UnresolvedPort,

    // Codec
    /// No codec registered for a data model id.
    UnknownModel,
    /// Object could not be encoded by its codec.
    InvalidPayload,

    // Naming service
    /// Topic registration was refused.
    RegistrationFailed,
    /// Naming service disabled or unreachable.
    NameServiceUnavailable,
    /// Discovery query returned no topic.
    NoTopicMatched,

    // Transport
    /// Transport failed to bind or start.
    TransportError,
    /// Transport failed to connect or subscribe.
    SessionUnavailable,

    // Inbound delivery
    /// Message arrived for a topic this subscriber does not know.
    UnknownTopic,
    /// Message payload could not be decoded.
    BrokenPayload,

    // Security
    /// Secured session built against an unsecured topic, or vice versa.
    SecurityMismatch,
    /// Key material has the wrong length.
    InvalidKey,

    // Lifecycle
    /// Operation on a torn-down object.
    Terminated,
    /// Orchestrated bootstrap step failed.
    BootstrapError,
}

impl ErrorKind {
    /// Stable short name, used in `Display`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotInitialized => "not initialized",
            Self::AlreadyInitialized => "already initialized",
            Self::InvalidTopic => "invalid topic",
            Self::InvalidParam => "invalid parameter",
            Self::PortPoolExhausted => "port pool exhausted",
            Self::InvalidRelease => "invalid port release",
            Self::UnresolvedPort => "unresolved port",
            Self::UnknownModel => "unknown data model",
            Self::InvalidPayload => "invalid payload",
            Self::RegistrationFailed => "registration failed",
            Self::NameServiceUnavailable => "name service unavailable",
            Self::NoTopicMatched => "no topic matched",
            Self::TransportError => "transport error",
            Self::SessionUnavailable => "session unavailable",
            Self::UnknownTopic => "unknown topic",
            Self::BrokenPayload => "broken payload",
            Self::SecurityMismatch => "security mismatch",
            Self::InvalidKey => "invalid key",
            Self::Terminated => "terminated",
            Self::BootstrapError => "bootstrap error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by every fallible ezmqx operation.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct Error {
    kind: ErrorKind,
    message: String,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub(crate) fn not_initialized() -> Self {
        Self::new(ErrorKind::NotInitialized, "context is not initialized")
    }

    pub(crate) fn terminated(what: &str) -> Self {
        Self::new(ErrorKind::Terminated, format!("{what} is terminated"))
    }
}

/// Result alias used across the crate.
pub type Result<T> = core::result::Result<T, Error>;
