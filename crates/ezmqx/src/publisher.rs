// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Publisher session.
//!
//! A publisher binds a transport port, optionally secures it, registers its
//! topic with the naming service and encodes objects with the codec of its
//! data model.
//!
//! # Example
//!
//! ```rust,no_run
//! use ezmqx::{Context, DataObject, Publisher};
//!
//! # fn main() -> ezmqx::Result<()> {
//! let ctx = Context::new()?;
//! ctx.initialize_standalone("10.0.0.1", None)?;
//! ctx.register_codecs(&["models/robot.json"])?;
//!
//! let publisher = Publisher::builder(&ctx, "/robot/arm")
//!     .model_id("GTC_Robot_0.0.1")
//!     .port(5562)
//!     .build()?;
//! publisher.publish(&DataObject::new("GTC001", "123456789"))?;
//! publisher.terminate()?;
//! # Ok(())
//! # }
//! ```

use crate::codec::{Codec, DataObject};
use crate::context::{Context, Mode, SessionGuard};
use crate::error::{Error, ErrorKind, Result};
use crate::security::{KeyRole, SecretKey};
use crate::tns::TnsClient;
use crate::topic::{validate_topic, Topic};
use crate::transport::{PublisherSocket, TransportError};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::{Arc, Weak};

/// A bound port, returned to the Context pool when dropped if it came from
/// there and the pool was not reset in the meantime.
struct PortLease {
    context: Arc<Context>,
    port: u16,
    dynamic: bool,
    generation: u64,
}

impl Drop for PortLease {
    fn drop(&mut self) {
        if self.dynamic {
            if let Err(e) = self.context.release_leased_port(self.port, self.generation) {
                log::debug!("[PUBLISHER] Port {} not returned: {}", self.port, e);
            }
        }
    }
}

struct Session {
    socket: Box<dyn PublisherSocket>,
    lease: PortLease,
}

/// Open session, shared with the context so a reset can close it.
struct SessionSlot(Mutex<Option<Session>>);

impl SessionGuard for SessionSlot {
    fn close(&self) {
        if let Some(Session { mut socket, lease }) = self.0.lock().take() {
            let port = lease.port;
            drop(lease);
            socket.stop();
            log::debug!("[PUBLISHER] Closed port {} on context reset", port);
        }
    }
}

enum ModelSource {
    Id(String),
    File(PathBuf),
}

/// Builder for [`Publisher`].
pub struct PublisherBuilder<'a> {
    context: &'a Arc<Context>,
    topic: String,
    model: Option<ModelSource>,
    port: Option<u16>,
    secret_key: Option<String>,
}

impl<'a> PublisherBuilder<'a> {
    /// Data model of published objects, by registered id.
    pub fn model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model = Some(ModelSource::Id(model_id.into()));
        self
    }

    /// Data model of published objects, loaded (and registered) from a model file.
    pub fn model_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.model = Some(ModelSource::File(path.into()));
        self
    }

    /// Local port in standalone mode. Orchestrated mode always allocates one.
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Secure the session with this server secret key.
    pub fn secret_key(mut self, key: impl Into<String>) -> Self {
        self.secret_key = Some(key.into());
        self
    }

    pub fn build(self) -> Result<Publisher> {
        let context = Arc::clone(self.context);

        // Input checks first: nothing is acquired on these failures.
        validate_topic(&self.topic)?;
        let secret_key = self
            .secret_key
            .as_deref()
            .map(|key| SecretKey::new(KeyRole::ServerSecret, key))
            .transpose()?;
        let generation = context.generation();
        let mode = context.mode();
        if !matches!(mode, Mode::StandAlone | Mode::Orchestrated) {
            return Err(Error::not_initialized());
        }

        let codec = resolve_codec(&context, self.model)?;

        let lease = match (mode, self.port) {
            (Mode::Orchestrated, _) => PortLease {
                port: context.allocate_dynamic_port()?,
                context: Arc::clone(&context),
                dynamic: true,
                generation,
            },
            (_, Some(port)) => PortLease {
                context: Arc::clone(&context),
                port,
                dynamic: false,
                generation,
            },
            (_, None) => {
                return Err(Error::new(
                    ErrorKind::InvalidParam,
                    "standalone publisher needs an explicit port",
                ))
            }
        };
        let endpoint = context.resolve_public_endpoint(lease.port)?;

        let mut socket = context
            .transport()
            .create_publisher(lease.port)
            .map_err(|e| transport_error(&e))?;
        if let Some(key) = &secret_key {
            socket.set_server_key(key.expose()).map_err(|e| match e {
                TransportError::Key(reason) => Error::new(ErrorKind::InvalidKey, reason),
                other => transport_error(&other),
            })?;
        }
        socket.start().map_err(|e| transport_error(&e))?;

        let topic = Topic::new(
            self.topic,
            codec.model_id(),
            secret_key.is_some(),
            endpoint,
        )?;

        let tns = match context.name_service() {
            Ok(tns) => tns,
            Err(e) => {
                socket.stop();
                return Err(e);
            }
        };
        if let Some(tns) = &tns {
            if let Err(e) = register(&context, tns, &topic) {
                socket.stop();
                return Err(e);
            }
        }

        let session = Arc::new(SessionSlot(Mutex::new(Some(Session { socket, lease }))));
        let guard: Weak<dyn SessionGuard> = Arc::<SessionSlot>::downgrade(&session);
        context.track_session(guard);
        if context.generation() != generation {
            // Reset raced with this build.
            session.close();
            return Err(Error::terminated("context"));
        }

        log::info!("[PUBLISHER] Started {}", topic);
        Ok(Publisher {
            context,
            topic,
            codec,
            tns,
            generation,
            session,
        })
    }
}

fn transport_error(err: &TransportError) -> Error {
    Error::new(ErrorKind::TransportError, err.to_string())
}

fn resolve_codec(context: &Context, model: Option<ModelSource>) -> Result<Arc<dyn Codec>> {
    let model_id = match model {
        Some(ModelSource::Id(id)) => id,
        Some(ModelSource::File(path)) => context
            .register_codecs(&[path])?
            .into_iter()
            .next()
            .ok_or_else(|| Error::new(ErrorKind::UnknownModel, "model file has no id"))?,
        None => {
            return Err(Error::new(
                ErrorKind::InvalidParam,
                "publisher needs a data model",
            ))
        }
    };
    context.lookup_codec(&model_id)
}

/// Register with the naming service and hand the topic to the keepalive loop.
fn register(context: &Context, tns: &TnsClient, topic: &Topic) -> Result<()> {
    let handler = context.topic_handler();
    handler.init_handler(tns.clone())?;

    let registration = tns.register(topic)?;

    let announce = || -> Result<()> {
        if let Some(interval) = registration.keepalive_interval {
            handler.update_keep_alive_interval(interval.as_secs())?;
            handler.start_keep_alive()?;
        }
        handler.register_topic(topic.name())
    };
    if let Err(e) = announce() {
        log::warn!("[PUBLISHER] Keepalive not scheduled for {}: {}", topic.name(), e);
    }
    Ok(())
}

/// Publishing session for one topic.
pub struct Publisher {
    context: Arc<Context>,
    topic: Topic,
    codec: Arc<dyn Codec>,
    tns: Option<TnsClient>,
    generation: u64,
    session: Arc<SessionSlot>,
}

impl Publisher {
    pub fn builder<'a>(context: &'a Arc<Context>, topic: impl Into<String>) -> PublisherBuilder<'a> {
        PublisherBuilder {
            context,
            topic: topic.into(),
            model: None,
            port: None,
            secret_key: None,
        }
    }

    fn is_stale(&self) -> bool {
        self.context.generation() != self.generation
    }

    /// Encode `object` and send it on the topic.
    ///
    /// Transport send failures are logged, not returned.
    pub fn publish(&self, object: &DataObject) -> Result<()> {
        let mut session = self.session.0.lock();
        let Some(session) = session.as_mut() else {
            return Err(Error::terminated("publisher"));
        };
        if self.is_stale() {
            return Err(Error::terminated("context"));
        }

        let payload = self
            .codec
            .encode(object)
            .map_err(|e| Error::new(ErrorKind::InvalidPayload, e.to_string()))?;
        if let Err(e) = session.socket.publish(self.topic.name(), &payload) {
            log::warn!("[PUBLISHER] Send on {} failed: {}", self.topic.name(), e);
        }
        Ok(())
    }

    /// Registered topic descriptor.
    pub fn topic(&self) -> Result<&Topic> {
        if self.is_stale() {
            return Err(Error::terminated("context"));
        }
        Ok(&self.topic)
    }

    pub fn is_secured(&self) -> bool {
        self.topic.is_secured()
    }

    pub fn is_terminated(&self) -> bool {
        self.session.0.lock().is_none()
    }

    /// Release the port, unregister the topic and stop the transport.
    ///
    /// Unregistration failures are logged; teardown always completes. A
    /// publisher whose context was reset is already terminated.
    pub fn terminate(&self) -> Result<()> {
        if self.is_stale() {
            self.session.close();
            return Err(Error::terminated("context"));
        }
        let Some(session) = self.session.0.lock().take() else {
            return Err(Error::terminated("publisher"));
        };

        let Session { mut socket, lease } = session;
        drop(lease);

        if let Some(tns) = &self.tns {
            let name = self.topic.name();
            if let Err(e) = tns.unregister(name) {
                log::warn!("[PUBLISHER] Unregister {} failed: {}", name, e);
            }
            if let Err(e) = self.context.topic_handler().unregister_topic(name) {
                log::debug!("[PUBLISHER] Topic handler gone for {}: {}", name, e);
            }
        }

        socket.stop();
        log::info!("[PUBLISHER] Terminated {}", self.topic.name());
        Ok(())
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        if !self.is_terminated() {
            let _ = self.terminate();
        }
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("topic", &self.topic)
            .field("terminated", &self.is_terminated())
            .finish()
    }
}
