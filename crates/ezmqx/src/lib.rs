// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # ezmqx - Topic-oriented pub/sub with naming-service discovery
//!
//! Publishers and subscribers exchange model-encoded [`DataObject`]s over
//! named topics. When a naming service (TNS) is configured, publishers
//! register their topics there and keep them alive, and subscribers resolve
//! topics by name instead of by endpoint.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ezmqx::{Context, DataObject, Publisher, Result};
//!
//! fn main() -> Result<()> {
//!     let ctx = Context::new()?;
//!     ctx.initialize_standalone("10.0.0.1", None)?;
//!
//!     let publisher = Publisher::builder(&ctx, "/robot/arm")
//!         .model_file("models/robot.json")
//!         .port(5562)
//!         .build()?;
//!
//!     publisher.publish(
//!         &DataObject::new("GTC001", "1700000000")
//!             .with_data("Sample", serde_json::json!({"Weight": 3.5})),
//!     )?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +-------------------------------------------------------------------+
//! |                    Publisher  /  Subscriber                      |
//! |      codec lookup | security checks | session lifecycle          |
//! +-------------------------------------------------------------------+
//! |                           Context                                 |
//! |  mode | host address | codec registry | port pool | port map      |
//! +----------------------+--------------------------------------------+
//! |   Topic handler      |    TNS client  (register/query/keepalive) |
//! |   (keepalive thread) |    REST client (reqwest)                  |
//! +----------------------+--------------------------------------------+
//! |                  Transport (in-process bus by default)           |
//! +-------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Context`] | Process-wide state, stand-alone or orchestrated |
//! | [`Publisher`] | Sends objects on one topic, registers it with the TNS |
//! | [`Subscriber`] | Receives objects on explicit or discovered topics |
//! | [`TopicDiscovery`] | Resolves topic names through the TNS |
//! | [`Topic`] | Name, data model, endpoint and security flag |
//!
//! ## Modules Overview
//!
//! - [`context`] - Context lifecycle and shared resources (start here)
//! - [`publisher`] / [`subscriber`] - Sessions
//! - [`tns`] / [`discovery`] - Naming-service client and lookups
//! - [`handler`] - Keepalive worker
//! - [`codec`] - Data models and payload encoding
//! - [`transport`] - Socket abstraction and in-process bus

/// Bootstrap of orchestrated mode from the node agent.
mod bootstrap;
/// Data models, payload codecs and the codec registry.
pub mod codec;
/// Context configuration and well-known constants.
pub mod config;
/// Process-wide context.
pub mod context;
/// Topic lookups through the naming service.
pub mod discovery;
/// Host/port endpoints.
pub mod endpoint;
/// Error kinds and the crate result type.
pub mod error;
/// Topic handler thread (registration list and keepalive).
pub mod handler;
/// Dynamic port pool for orchestrated publishers.
pub mod ports;
/// Publisher sessions.
pub mod publisher;
/// Blocking REST client seam.
pub mod rest;
/// Key material for secured sessions.
pub mod security;
/// Subscriber sessions and listeners.
pub mod subscriber;
/// Naming-service REST client.
pub mod tns;
/// Topic names and descriptors.
pub mod topic;
/// Pub/sub socket abstraction.
pub mod transport;

pub use codec::{Codec, CodecLoader, DataObject, JsonModelCodec, JsonModelLoader};
pub use config::{ContextConfig, OrchestratorConfig};
pub use context::{Context, ContextBuilder, Mode};
pub use discovery::TopicDiscovery;
pub use endpoint::EndPoint;
pub use error::{Error, ErrorKind, Result};
pub use publisher::{Publisher, PublisherBuilder};
pub use rest::{HttpRestClient, RestClient};
pub use subscriber::{
    ClosureListener, DecodeMode, Sample, Subscriber, SubscriberBuilder, SubscriberListener,
};
pub use topic::{is_valid_topic, Topic};
pub use transport::{InProcTransport, Transport};
