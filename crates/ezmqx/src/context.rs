// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Process context: operating mode, naming service, port pool and codecs.
//!
//! The application creates one [`Context`] and shares it as
//! `Arc<Context>` with every publisher, subscriber and discovery client.
//!
//! ```text
//!                initialize_standalone()
//! Uninitialized ─────────────────────────► StandAlone ──┐
//!      ▲   │     initialize_orchestrated()              │ reset()
//!      │   └─────────────────────────────► Orchestrated ┤
//!      │                                                ▼
//!      └──────────── initialize_*() ◄─────────────── Terminated
//! ```
//!
//! All mutable state lives behind one lock. The topic handler is separate:
//! it is started on first use and stopped by [`Context::reset`].

use crate::bootstrap;
use crate::codec::{Codec, CodecLoader, CodecRegistry, JsonModelLoader};
use crate::config::ContextConfig;
use crate::endpoint::EndPoint;
use crate::error::{Error, ErrorKind, Result};
use crate::handler::TopicHandler;
use crate::ports::DynamicPortPool;
use crate::rest::{HttpRestClient, RestClient};
use crate::tns::TnsClient;
use crate::transport::{InProcTransport, Transport};
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Weak};

/// Operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Uninitialized,
    /// Static host address, naming service optional.
    StandAlone,
    /// Addresses and ports discovered from the container orchestrator.
    Orchestrated,
    /// Torn down by `reset()`; may be initialized again.
    Terminated,
}

struct State {
    mode: Mode,
    host_address: String,
    tns: Option<TnsClient>,
    reverse_proxy: bool,
    ports: DynamicPortPool,
    port_map: HashMap<u16, u16>,
    codecs: CodecRegistry,
    /// Bumped by every reset; sessions opened before it are stale.
    generation: u64,
}

impl State {
    fn new(config: &ContextConfig) -> Self {
        Self {
            mode: Mode::Uninitialized,
            host_address: String::new(),
            tns: None,
            reverse_proxy: false,
            ports: DynamicPortPool::new(config.port_start, config.port_count),
            port_map: HashMap::new(),
            codecs: CodecRegistry::default(),
            generation: 0,
        }
    }

    fn is_active(&self) -> bool {
        matches!(self.mode, Mode::StandAlone | Mode::Orchestrated)
    }

    fn clear(&mut self) {
        self.host_address.clear();
        self.tns = None;
        self.reverse_proxy = false;
        self.ports.clear();
        self.port_map.clear();
        self.codecs.clear();
    }
}

/// A live transport session, closed when the context is reset.
pub(crate) trait SessionGuard: Send + Sync {
    fn close(&self);
}

/// Builder for [`Context`].
#[derive(Default)]
pub struct ContextBuilder {
    config: ContextConfig,
    rest: Option<Arc<dyn RestClient>>,
    transport: Option<Arc<dyn Transport>>,
    loader: Option<Arc<dyn CodecLoader>>,
}

impl ContextBuilder {
    pub fn config(mut self, config: ContextConfig) -> Self {
        self.config = config;
        self
    }

    /// HTTP client for naming-service and bootstrap calls.
    pub fn rest_client(mut self, rest: Arc<dyn RestClient>) -> Self {
        self.rest = Some(rest);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Parser for model files passed to [`Context::register_codecs`].
    pub fn codec_loader(mut self, loader: Arc<dyn CodecLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn build(self) -> Result<Arc<Context>> {
        self.config
            .validate()
            .map_err(|e| Error::new(ErrorKind::InvalidParam, e.to_string()))?;

        let rest = match self.rest {
            Some(rest) => rest,
            None => Arc::new(
                HttpRestClient::new(self.config.http_timeout())
                    .map_err(|e| Error::new(ErrorKind::InvalidParam, e.to_string()))?,
            ),
        };
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(InProcTransport::new()));
        let loader = self.loader.unwrap_or_else(|| Arc::new(JsonModelLoader));

        Ok(Arc::new(Context {
            state: Mutex::new(State::new(&self.config)),
            config: self.config,
            rest,
            transport,
            loader,
            handler: TopicHandler::new(),
            sessions: Mutex::new(Vec::new()),
        }))
    }
}

/// Shared process context.
pub struct Context {
    config: ContextConfig,
    rest: Arc<dyn RestClient>,
    transport: Arc<dyn Transport>,
    loader: Arc<dyn CodecLoader>,
    state: Mutex<State>,
    handler: TopicHandler,
    sessions: Mutex<Vec<Weak<dyn SessionGuard>>>,
}

impl Context {
    pub fn builder() -> ContextBuilder {
        ContextBuilder::default()
    }

    /// Context with default configuration and collaborators.
    pub fn new() -> Result<Arc<Self>> {
        Self::builder().build()
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    fn active(&self) -> Result<MutexGuard<'_, State>> {
        let state = self.state.lock();
        if state.is_active() {
            Ok(state)
        } else {
            Err(Error::not_initialized())
        }
    }

    fn uninitialized(&self) -> Result<MutexGuard<'_, State>> {
        let state = self.state.lock();
        if state.is_active() {
            Err(Error::new(
                ErrorKind::AlreadyInitialized,
                format!("context is already running in {:?} mode", state.mode),
            ))
        } else {
            Ok(state)
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Start with a fixed host address; `name_service` enables naming-service use.
    pub fn initialize_standalone(&self, host_address: &str, name_service: Option<&str>) -> Result<()> {
        if host_address.trim().is_empty() {
            return Err(Error::new(ErrorKind::InvalidParam, "host address is empty"));
        }
        if name_service.is_some_and(|addr| addr.trim().is_empty()) {
            return Err(Error::new(
                ErrorKind::InvalidParam,
                "naming service address is empty",
            ));
        }

        let mut state = self.uninitialized()?;
        state.clear();
        state.host_address = host_address.to_string();
        state.tns = name_service.map(|addr| TnsClient::new(addr, Arc::clone(&self.rest)));
        state.mode = Mode::StandAlone;

        log::info!(
            "[CONTEXT] Standalone mode, host={} tns={}",
            host_address,
            state.tns.as_ref().map_or("disabled", |t| t.address())
        );
        Ok(())
    }

    /// Discover host address, naming service and port table, then start.
    pub fn initialize_orchestrated(&self) -> Result<()> {
        let mut state = self.uninitialized()?;
        let env = bootstrap::run(self.rest.as_ref(), &self.config.orchestrator)?;

        state.clear();
        state.host_address = env.host_address;
        state.tns = Some(TnsClient::new(&env.tns_address, Arc::clone(&self.rest)));
        state.reverse_proxy = env.reverse_proxy;
        state.port_map = env.port_map;
        state.mode = Mode::Orchestrated;
        log::info!("[CONTEXT] Orchestrated mode, host={}", state.host_address);
        Ok(())
    }

    /// Stop the topic handler, close every open publisher and subscriber
    /// session and drop all pooled state.
    ///
    /// Fails with `NotInitialized` on a context that was never started; a
    /// repeated reset is a no-op. Publishers and subscribers built before
    /// the reset stay `Terminated` even after the context is initialized
    /// again.
    pub fn reset(&self) -> Result<()> {
        let sessions = {
            let mut state = self.state.lock();
            match state.mode {
                Mode::Uninitialized => return Err(Error::not_initialized()),
                Mode::Terminated => {
                    log::debug!("[CONTEXT] Already reset");
                    return Ok(());
                }
                Mode::StandAlone | Mode::Orchestrated => {
                    state.clear();
                    state.generation += 1;
                    state.mode = Mode::Terminated;
                }
            }
            std::mem::take(&mut *self.sessions.lock())
        };
        // Closed without the state lock: closing a publisher returns its
        // lease, which checks the generation.
        let mut closed = 0usize;
        for session in sessions.iter().filter_map(Weak::upgrade) {
            session.close();
            closed += 1;
        }
        if closed > 0 {
            log::debug!("[CONTEXT] Closed {} open session(s)", closed);
        }
        // Joined outside the state lock: the worker never takes it, but
        // callers blocked on the lock should not wait for a keepalive POST.
        self.handler.terminate_handler();
        log::info!("[CONTEXT] Reset");
        Ok(())
    }

    pub fn mode(&self) -> Mode {
        self.state.lock().mode
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().is_active()
    }

    pub fn is_terminated(&self) -> bool {
        self.state.lock().mode == Mode::Terminated
    }

    pub fn is_standalone(&self) -> bool {
        self.state.lock().mode == Mode::StandAlone
    }

    pub fn is_name_service_enabled(&self) -> bool {
        self.state.lock().tns.is_some()
    }

    /// Whether the naming service was found behind the node reverse proxy.
    pub fn is_reverse_proxy_enabled(&self) -> bool {
        self.state.lock().reverse_proxy
    }

    pub fn host_address(&self) -> Result<String> {
        Ok(self.active()?.host_address.clone())
    }

    /// Naming-service client, `None` when the naming service is disabled.
    pub fn name_service(&self) -> Result<Option<TnsClient>> {
        Ok(self.active()?.tns.clone())
    }

    pub(crate) fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    pub fn topic_handler(&self) -> &TopicHandler {
        &self.handler
    }

    /// Reset counter, recorded by sessions when they are opened.
    pub(crate) fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// Close `session` on the next reset.
    pub(crate) fn track_session(&self, session: Weak<dyn SessionGuard>) {
        let mut sessions = self.sessions.lock();
        sessions.retain(|s| s.strong_count() > 0);
        sessions.push(session);
    }

    // ------------------------------------------------------------------
    // Ports
    // ------------------------------------------------------------------

    pub fn allocate_dynamic_port(&self) -> Result<u16> {
        let port = self.active()?.ports.allocate()?;
        log::debug!("[CONTEXT] Allocated port {}", port);
        Ok(port)
    }

    pub fn release_dynamic_port(&self, port: u16) -> Result<()> {
        self.active()?.ports.release(port)?;
        log::debug!("[CONTEXT] Released port {}", port);
        Ok(())
    }

    /// Return a port leased in `generation`. A port leased before the last
    /// reset is not returned: the pool it came from no longer exists.
    pub(crate) fn release_leased_port(&self, port: u16, generation: u64) -> Result<()> {
        let mut state = self.active()?;
        if state.generation != generation {
            log::debug!("[CONTEXT] Port {} belongs to a previous session, not released", port);
            return Ok(());
        }
        state.ports.release(port)?;
        log::debug!("[CONTEXT] Released port {}", port);
        Ok(())
    }

    /// Endpoint peers should use to reach a locally bound port.
    pub fn resolve_public_endpoint(&self, private_port: u16) -> Result<EndPoint> {
        let state = self.active()?;
        match state.mode {
            Mode::Orchestrated => match state.port_map.get(&private_port) {
                Some(public) => Ok(EndPoint::new(state.host_address.clone(), *public)),
                None => Err(Error::new(
                    ErrorKind::UnresolvedPort,
                    format!("no public port mapped to {private_port}"),
                )),
            },
            _ => Ok(EndPoint::new(state.host_address.clone(), private_port)),
        }
    }

    // ------------------------------------------------------------------
    // Codecs
    // ------------------------------------------------------------------

    /// Load every model file and register its codec. Returns model ids in
    /// input order. Nothing is registered if any file fails to load.
    pub fn register_codecs<P: AsRef<Path>>(&self, paths: &[P]) -> Result<Vec<String>> {
        self.active()?;
        let codecs = paths
            .iter()
            .map(|path| {
                self.loader.load(path.as_ref()).map_err(|e| {
                    Error::new(
                        ErrorKind::InvalidParam,
                        format!("{}: {}", path.as_ref().display(), e),
                    )
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut state = self.active()?;
        Ok(codecs
            .into_iter()
            .map(|codec| state.codecs.insert(codec))
            .collect())
    }

    /// Register an already-built codec. First registration of an id wins.
    pub fn register_codec(&self, codec: Arc<dyn Codec>) -> Result<String> {
        Ok(self.active()?.codecs.insert(codec))
    }

    pub fn lookup_codec(&self, model_id: &str) -> Result<Arc<dyn Codec>> {
        self.active()?.codecs.get(model_id).ok_or_else(|| {
            Error::new(
                ErrorKind::UnknownModel,
                format!("no codec registered for '{model_id}'"),
            )
        })
    }
}
