// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Subscriber session.
//!
//! Topics are either supplied explicitly or discovered through the naming
//! service. Each topic is bound to the codec of its data model; inbound
//! frames are decoded and handed to a [`SubscriberListener`] on the
//! transport delivery thread.
//!
//! # Example
//!
//! ```rust,no_run
//! use ezmqx::{ClosureListener, Context, Sample, Subscriber};
//! use std::sync::Arc;
//!
//! # fn main() -> ezmqx::Result<()> {
//! let ctx = Context::new()?;
//! ctx.initialize_standalone("10.0.0.1", Some("http://10.0.0.2:48323"))?;
//! ctx.register_codecs(&["models/robot.json"])?;
//!
//! let listener = ClosureListener::new(|topic: &str, sample: &Sample| {
//!     println!("{topic}: {sample:?}");
//! });
//! let subscriber = Subscriber::builder(&ctx)
//!     .discover("/robot", true)
//!     .build(Arc::new(listener))?;
//! # subscriber.terminate()?;
//! # Ok(())
//! # }
//! ```

use crate::codec::{Codec, DataObject};
use crate::context::{Context, SessionGuard};
use crate::endpoint::EndPoint;
use crate::error::{Error, ErrorKind, Result};
use crate::security::{ClientKeys, KeyRole, PublicKey};
use crate::topic::{validate_topic, Topic};
use crate::transport::{MessageHandler, SubscriberSocket, TransportError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

// ============================================================================
// Listener
// ============================================================================

/// How inbound payloads are surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodeMode {
    /// Decoded [`DataObject`].
    #[default]
    Object,
    /// Codec-rendered text document.
    Document,
}

/// One decoded message.
#[derive(Debug, Clone, PartialEq)]
pub enum Sample {
    Object(DataObject),
    Document(String),
}

/// Receives decoded messages and per-message errors.
///
/// Called on the transport delivery thread.
pub trait SubscriberListener: Send + Sync {
    fn on_message(&self, topic: &str, sample: &Sample);

    /// `UnknownTopic` or `BrokenPayload` for a single frame.
    fn on_error(&self, topic: &str, error: &Error) {
        log::warn!("[SUBSCRIBER] {}: {}", topic, error);
    }
}

/// Closure-based listener; errors are logged.
pub struct ClosureListener<F: Fn(&str, &Sample) + Send + Sync> {
    callback: F,
}

impl<F: Fn(&str, &Sample) + Send + Sync> ClosureListener<F> {
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F: Fn(&str, &Sample) + Send + Sync> SubscriberListener for ClosureListener<F> {
    fn on_message(&self, topic: &str, sample: &Sample) {
        (self.callback)(topic, sample);
    }
}

// ============================================================================
// Dispatch
// ============================================================================

struct Dispatcher {
    codecs: HashMap<String, Arc<dyn Codec>>,
    mode: DecodeMode,
    listener: Arc<dyn SubscriberListener>,
    active: AtomicBool,
}

impl Dispatcher {
    fn dispatch(&self, topic: &str, payload: &[u8]) {
        if !self.active.load(Ordering::Acquire) {
            return;
        }
        let Some(codec) = self.codecs.get(topic) else {
            self.listener.on_error(
                topic,
                &Error::new(ErrorKind::UnknownTopic, format!("no codec bound to '{topic}'")),
            );
            return;
        };

        let decoded = codec.decode(payload).and_then(|object| match self.mode {
            DecodeMode::Object => Ok(Sample::Object(object)),
            DecodeMode::Document => codec.render(&object).map(Sample::Document),
        });
        match decoded {
            Ok(sample) => self.listener.on_message(topic, &sample),
            Err(e) => self
                .listener
                .on_error(topic, &Error::new(ErrorKind::BrokenPayload, e.to_string())),
        }
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`Subscriber`].
pub struct SubscriberBuilder<'a> {
    context: &'a Arc<Context>,
    topics: Vec<(Topic, Option<String>)>,
    query: Option<(String, bool)>,
    client_keys: Option<(String, String)>,
    server_key: Option<String>,
    mode: DecodeMode,
}

impl<'a> SubscriberBuilder<'a> {
    /// Subscribe to an explicit topic.
    pub fn topic(mut self, topic: Topic) -> Self {
        self.topics.push((topic, None));
        self
    }

    /// Subscribe to an explicit secured topic with its server public key.
    pub fn secured_topic(mut self, topic: Topic, server_public_key: impl Into<String>) -> Self {
        self.topics.push((topic, Some(server_public_key.into())));
        self
    }

    /// Resolve topics through the naming service.
    pub fn discover(mut self, name: impl Into<String>, hierarchical: bool) -> Self {
        self.query = Some((name.into(), hierarchical));
        self
    }

    /// Secure the session with this client key pair.
    pub fn client_keys(mut self, public: impl Into<String>, secret: impl Into<String>) -> Self {
        self.client_keys = Some((public.into(), secret.into()));
        self
    }

    /// Server public key for secured topics that carry none of their own.
    pub fn server_public_key(mut self, key: impl Into<String>) -> Self {
        self.server_key = Some(key.into());
        self
    }

    pub fn decode_mode(mut self, mode: DecodeMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn build(self, listener: Arc<dyn SubscriberListener>) -> Result<Subscriber> {
        let context = Arc::clone(self.context);
        let generation = context.generation();
        if !context.is_initialized() {
            return Err(Error::not_initialized());
        }

        // Key material is checked before anything else is touched.
        let client_keys = self
            .client_keys
            .as_ref()
            .map(|(public, secret)| ClientKeys::new(public, secret))
            .transpose()?;
        let default_server_key = self
            .server_key
            .as_deref()
            .map(|key| PublicKey::new(KeyRole::ServerPublic, key))
            .transpose()?;
        let secured = client_keys.is_some();

        let resolved = resolve_topics(&context, self.topics, self.query)?;

        let mut bindings = Vec::with_capacity(resolved.len());
        let mut codecs = HashMap::new();
        for (topic, own_key) in resolved {
            if topic.is_secured() != secured {
                return Err(Error::new(
                    ErrorKind::SecurityMismatch,
                    format!(
                        "topic {} is {} but the session is {}",
                        topic.name(),
                        if topic.is_secured() { "secured" } else { "unsecured" },
                        if secured { "secured" } else { "unsecured" }
                    ),
                ));
            }
            let server_key = if secured {
                let key = match own_key {
                    Some(key) => PublicKey::new(KeyRole::ServerPublic, &key)?,
                    None => default_server_key.clone().ok_or_else(|| {
                        Error::new(
                            ErrorKind::InvalidKey,
                            format!("no server public key for {}", topic.name()),
                        )
                    })?,
                };
                Some(key)
            } else {
                None
            };
            // Frames carry the topic name only, so it must pick one codec.
            if codecs.contains_key(topic.name()) {
                return Err(Error::new(
                    ErrorKind::InvalidParam,
                    format!("topic {} is listed more than once", topic.name()),
                ));
            }
            codecs.insert(
                topic.name().to_string(),
                context.lookup_codec(topic.data_model())?,
            );
            bindings.push((topic, server_key));
        }

        let dispatcher = Arc::new(Dispatcher {
            codecs,
            mode: self.mode,
            listener,
            active: AtomicBool::new(true),
        });
        let sockets = open_sockets(&context, &bindings, client_keys.as_ref(), &dispatcher)?;

        let topics: Vec<Topic> = bindings.into_iter().map(|(topic, _)| topic).collect();
        log::info!(
            "[SUBSCRIBER] Subscribed to {} topic(s) on {} session(s)",
            topics.len(),
            sockets.len()
        );
        let session = Arc::new(SubscriberSession {
            dispatcher,
            sockets: Mutex::new(Some(sockets)),
        });
        let guard: Weak<dyn SessionGuard> = Arc::<SubscriberSession>::downgrade(&session);
        context.track_session(guard);
        if context.generation() != generation {
            // Reset raced with this build.
            session.shutdown();
            return Err(Error::terminated("context"));
        }
        Ok(Subscriber {
            topics,
            secured,
            session,
        })
    }
}

type Resolved = Vec<(Topic, Option<String>)>;

fn resolve_topics(
    context: &Context,
    explicit: Resolved,
    query: Option<(String, bool)>,
) -> Result<Resolved> {
    match (explicit.is_empty(), query) {
        (false, None) => Ok(explicit),
        (true, Some((name, hierarchical))) => {
            validate_topic(&name)?;
            let tns = context.name_service()?.ok_or_else(|| {
                Error::new(
                    ErrorKind::NameServiceUnavailable,
                    "topic discovery needs the naming service",
                )
            })?;
            let found = tns.query(&name, hierarchical)?;
            if found.is_empty() {
                return Err(Error::new(
                    ErrorKind::NoTopicMatched,
                    format!("no topic matches '{name}'"),
                ));
            }
            Ok(found.into_iter().map(|topic| (topic, None)).collect())
        }
        (true, None) => Err(Error::new(ErrorKind::InvalidParam, "no topic to subscribe")),
        (false, Some(_)) => Err(Error::new(
            ErrorKind::InvalidParam,
            "explicit topics and discovery are exclusive",
        )),
    }
}

fn session_error(err: TransportError) -> Error {
    match err {
        TransportError::Key(reason) => Error::new(ErrorKind::InvalidKey, reason),
        other => Error::new(ErrorKind::SessionUnavailable, other.to_string()),
    }
}

/// One socket per (endpoint, server key); topics sharing both share a socket.
fn open_sockets(
    context: &Context,
    bindings: &[(Topic, Option<PublicKey>)],
    client_keys: Option<&ClientKeys>,
    dispatcher: &Arc<Dispatcher>,
) -> Result<Vec<Box<dyn SubscriberSocket>>> {
    let mut groups: Vec<(&EndPoint, Option<&PublicKey>, Vec<&str>)> = Vec::new();
    for (topic, key) in bindings {
        let existing = groups
            .iter()
            .position(|(ep, k, _)| *ep == topic.endpoint() && *k == key.as_ref());
        match existing {
            Some(index) => groups[index].2.push(topic.name()),
            None => groups.push((topic.endpoint(), key.as_ref(), vec![topic.name()])),
        }
    }

    let transport = context.transport();
    let mut sockets: Vec<Box<dyn SubscriberSocket>> = Vec::with_capacity(groups.len());
    let mut open = || -> Result<()> {
        for (endpoint, server_key, names) in &groups {
            let target = Arc::clone(dispatcher);
            let handler: MessageHandler =
                Arc::new(move |topic: &str, payload: &[u8]| target.dispatch(topic, payload));

            let mut socket = transport
                .create_subscriber(endpoint, handler)
                .map_err(session_error)?;
            if let (Some(server_key), Some(client)) = (server_key, client_keys) {
                socket
                    .set_server_key(server_key.as_str())
                    .map_err(session_error)?;
                socket
                    .set_client_keys(client.public.as_str(), client.secret.expose())
                    .map_err(session_error)?;
            }
            socket.start().map_err(session_error)?;
            sockets.push(socket);
            let socket = sockets.last_mut().ok_or_else(|| {
                Error::new(ErrorKind::SessionUnavailable, "socket vanished")
            })?;
            for name in names {
                socket.subscribe(name).map_err(session_error)?;
            }
            log::debug!("[SUBSCRIBER] Connected to {} for {:?}", endpoint, names);
        }
        Ok(())
    };

    if let Err(e) = open() {
        for socket in &mut sockets {
            socket.stop();
        }
        return Err(e);
    }
    Ok(sockets)
}

// ============================================================================
// Subscriber
// ============================================================================

struct SubscriberSession {
    dispatcher: Arc<Dispatcher>,
    sockets: Mutex<Option<Vec<Box<dyn SubscriberSocket>>>>,
}

impl SubscriberSession {
    /// Stop delivery and every socket. False if already stopped.
    fn shutdown(&self) -> bool {
        let Some(mut sockets) = self.sockets.lock().take() else {
            return false;
        };
        self.dispatcher.active.store(false, Ordering::Release);
        for socket in &mut sockets {
            socket.stop();
        }
        true
    }
}

impl SessionGuard for SubscriberSession {
    fn close(&self) {
        if self.shutdown() {
            log::debug!("[SUBSCRIBER] Closed on context reset");
        }
    }
}

/// Receiving session for one or more topics.
pub struct Subscriber {
    topics: Vec<Topic>,
    secured: bool,
    session: Arc<SubscriberSession>,
}

impl Subscriber {
    pub fn builder(context: &Arc<Context>) -> SubscriberBuilder<'_> {
        SubscriberBuilder {
            context,
            topics: Vec::new(),
            query: None,
            client_keys: None,
            server_key: None,
            mode: DecodeMode::default(),
        }
    }

    /// Resolved topics, in subscription order.
    pub fn topics(&self) -> &[Topic] {
        &self.topics
    }

    pub fn is_secured(&self) -> bool {
        self.secured
    }

    pub fn is_terminated(&self) -> bool {
        self.session.sockets.lock().is_none()
    }

    /// Stop every transport session. No callback starts after this returns.
    ///
    /// A context reset terminates every subscriber built on it.
    pub fn terminate(&self) -> Result<()> {
        if !self.session.shutdown() {
            return Err(Error::terminated("subscriber"));
        }
        log::info!("[SUBSCRIBER] Terminated ({} topic(s))", self.topics.len());
        Ok(())
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        if !self.is_terminated() {
            let _ = self.terminate();
        }
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("topics", &self.topics)
            .field("secured", &self.secured)
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonModelCodec;
    use crate::rest::{RestClient, RestError, RestResponse};

    const KEY: &str = "tXJx&1^QE2g7WCXbF.$$TVP.wCtxwNhR8?iLi&S<";

    struct Offline;

    impl RestClient for Offline {
        fn get(&self, url: &str) -> std::result::Result<RestResponse, RestError> {
            Err(RestError::Request {
                url: url.to_string(),
                reason: "offline".into(),
            })
        }
        fn post(&self, url: &str, _body: &str) -> std::result::Result<RestResponse, RestError> {
            self.get(url)
        }
        fn delete(&self, url: &str) -> std::result::Result<RestResponse, RestError> {
            self.get(url)
        }
    }

    #[derive(Default)]
    struct Recorder {
        messages: Mutex<Vec<(String, Sample)>>,
        errors: Mutex<Vec<(String, ErrorKind)>>,
    }

    impl SubscriberListener for Recorder {
        fn on_message(&self, topic: &str, sample: &Sample) {
            self.messages.lock().push((topic.to_string(), sample.clone()));
        }
        fn on_error(&self, topic: &str, error: &Error) {
            self.errors.lock().push((topic.to_string(), error.kind()));
        }
    }

    fn standalone(tns: Option<&str>) -> Arc<Context> {
        let ctx = Context::builder().rest_client(Arc::new(Offline)).build().unwrap();
        ctx.initialize_standalone("localhost", tns).unwrap();
        ctx.register_codec(Arc::new(JsonModelCodec::new("m", vec!["Sample".into()])))
            .unwrap();
        ctx
    }

    fn topic(name: &str, secured: bool) -> Topic {
        Topic::new(name, "m", secured, EndPoint::new("localhost", 6000)).unwrap()
    }

    fn dispatcher(mode: DecodeMode, listener: Arc<Recorder>) -> Dispatcher {
        let mut codecs: HashMap<String, Arc<dyn Codec>> = HashMap::new();
        codecs.insert("/a".into(), Arc::new(JsonModelCodec::new("m", vec!["Sample".into()])));
        Dispatcher {
            codecs,
            mode,
            listener,
            active: AtomicBool::new(true),
        }
    }

    #[test]
    fn dispatch_routes_and_reports_errors() {
        let recorder = Arc::new(Recorder::default());
        let d = dispatcher(DecodeMode::Object, recorder.clone());
        let object = DataObject::new("d", "1").with_data("Sample", serde_json::json!(7));

        d.dispatch("/a", &serde_json::to_vec(&object).unwrap());
        d.dispatch("/unknown", b"{}");
        d.dispatch("/a", b"garbage");

        assert_eq!(recorder.messages.lock()[0], ("/a".to_string(), Sample::Object(object)));
        let errors = recorder.errors.lock();
        assert_eq!(errors[0], ("/unknown".to_string(), ErrorKind::UnknownTopic));
        assert_eq!(errors[1], ("/a".to_string(), ErrorKind::BrokenPayload));
    }

    #[test]
    fn document_mode_renders_text() {
        let recorder = Arc::new(Recorder::default());
        let d = dispatcher(DecodeMode::Document, recorder.clone());
        let object = DataObject::new("GTC001", "1").with_data("Sample", serde_json::json!("Red"));
        d.dispatch("/a", &serde_json::to_vec(&object).unwrap());

        match &recorder.messages.lock()[0].1 {
            Sample::Document(text) => assert!(text.contains("GTC001")),
            other => panic!("expected document, got {other:?}"),
        };
    }

    #[test]
    fn inactive_dispatcher_drops_frames() {
        let recorder = Arc::new(Recorder::default());
        let d = dispatcher(DecodeMode::Object, recorder.clone());
        d.active.store(false, Ordering::Release);
        d.dispatch("/unknown", b"");
        assert!(recorder.errors.lock().is_empty());
    }

    #[test]
    fn security_mismatch_both_ways() {
        let ctx = standalone(None);
        let err = Subscriber::builder(&ctx)
            .topic(topic("/plain", false))
            .client_keys(KEY, KEY)
            .server_public_key(KEY)
            .build(Arc::new(Recorder::default()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SecurityMismatch);

        let err = Subscriber::builder(&ctx)
            .topic(topic("/secure", true))
            .build(Arc::new(Recorder::default()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SecurityMismatch);
    }

    #[test]
    fn key_checks() {
        let ctx = standalone(None);
        let err = Subscriber::builder(&ctx)
            .secured_topic(topic("/secure", true), KEY)
            .client_keys(KEY, "short")
            .build(Arc::new(Recorder::default()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidKey);

        let err = Subscriber::builder(&ctx)
            .topic(topic("/secure", true))
            .client_keys(KEY, KEY)
            .build(Arc::new(Recorder::default()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidKey);

        let sub = Subscriber::builder(&ctx)
            .secured_topic(topic("/secure", true), KEY)
            .client_keys(KEY, KEY)
            .build(Arc::new(Recorder::default()))
            .unwrap();
        assert!(sub.is_secured());
    }

    #[test]
    fn discovery_needs_naming_service() {
        let ctx = standalone(None);
        let err = Subscriber::builder(&ctx)
            .discover("/robot", false)
            .build(Arc::new(Recorder::default()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NameServiceUnavailable);

        let err = Subscriber::builder(&ctx)
            .discover("robot", false)
            .build(Arc::new(Recorder::default()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTopic);
    }

    #[test]
    fn unknown_model_and_empty_builder() {
        let ctx = standalone(None);
        let t = Topic::new("/x", "other", false, EndPoint::new("localhost", 6001)).unwrap();
        let err = Subscriber::builder(&ctx)
            .topic(t)
            .build(Arc::new(Recorder::default()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownModel);

        let err = Subscriber::builder(&ctx)
            .build(Arc::new(Recorder::default()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParam);
    }

    #[test]
    fn same_topic_twice_is_rejected() {
        let ctx = standalone(None);
        let elsewhere = Topic::new("/a", "m", false, EndPoint::new("localhost", 6002)).unwrap();
        let err = Subscriber::builder(&ctx)
            .topic(topic("/a", false))
            .topic(elsewhere)
            .build(Arc::new(Recorder::default()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParam);
        assert!(err.message().contains("/a"));
    }

    #[test]
    fn context_reset_terminates_subscriber() {
        let ctx = standalone(None);
        let sub = Subscriber::builder(&ctx)
            .topic(topic("/a", false))
            .build(Arc::new(Recorder::default()))
            .unwrap();
        ctx.reset().unwrap();
        assert!(sub.is_terminated());
        assert_eq!(sub.terminate().unwrap_err().kind(), ErrorKind::Terminated);
    }

    #[test]
    fn terminate_twice_is_an_error() {
        let ctx = standalone(None);
        let sub = Subscriber::builder(&ctx)
            .topic(topic("/a", false))
            .topic(topic("/b", false))
            .build(Arc::new(Recorder::default()))
            .unwrap();
        assert_eq!(sub.topics().len(), 2);
        sub.terminate().unwrap();
        assert_eq!(sub.terminate().unwrap_err().kind(), ErrorKind::Terminated);
    }
}
