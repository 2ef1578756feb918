// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Raw pub/sub transport interface.
//!
//! Publishers bind a port and send `(topic, bytes)` frames; subscribers
//! connect to an endpoint, filter by topic and receive frames on a
//! transport-owned delivery thread. Secured sessions are configured with
//! fixed-length keys before `start()`.
//!
//! [`inproc::InProcTransport`] is the bundled implementation.

pub mod inproc;

use crate::endpoint::EndPoint;
use std::sync::Arc;
use thiserror::Error;

pub use inproc::InProcTransport;

/// Transport-level failures.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("port {0} is already bound")]
    AddressInUse(u16),

    #[error("cannot connect to {0}")]
    Connect(String),

    #[error("socket is not started")]
    NotStarted,

    #[error("socket is closed")]
    Closed,

    #[error("invalid key: {0}")]
    Key(String),
}

/// Callback invoked with `(topic, payload)` for every inbound frame.
pub type MessageHandler = Arc<dyn Fn(&str, &[u8]) + Send + Sync>;

/// Publishing side of a session, bound to one local port.
pub trait PublisherSocket: Send {
    /// Enable server-side authenticated encryption.
    fn set_server_key(&mut self, secret_key: &str) -> Result<(), TransportError>;

    fn start(&mut self) -> Result<(), TransportError>;

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), TransportError>;

    fn stop(&mut self);
}

/// Receiving side of a session, connected to one remote endpoint.
pub trait SubscriberSocket: Send {
    fn set_server_key(&mut self, public_key: &str) -> Result<(), TransportError>;

    fn set_client_keys(&mut self, public_key: &str, secret_key: &str)
        -> Result<(), TransportError>;

    fn start(&mut self) -> Result<(), TransportError>;

    /// Add `topic` to the delivery filter.
    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError>;

    fn stop(&mut self);
}

/// Socket factory.
pub trait Transport: Send + Sync {
    fn create_publisher(&self, port: u16) -> Result<Box<dyn PublisherSocket>, TransportError>;

    fn create_subscriber(
        &self,
        endpoint: &EndPoint,
        handler: MessageHandler,
    ) -> Result<Box<dyn SubscriberSocket>, TransportError>;
}
