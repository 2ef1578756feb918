// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-process loopback transport.
//!
//! All sockets created from clones of one [`InProcTransport`] share a bus.
//! A publisher binds its port on `start()`; a subscriber is routed by the
//! port of the endpoint it connects to (the address is not interpreted).
//! Topic filters match exactly. Frames are queued on an unbounded channel
//! and handed to the subscriber's handler on its own delivery thread.
//!
//! Secured and plain sockets never exchange frames, mirroring a failed
//! CURVE handshake.

use super::{MessageHandler, PublisherSocket, SubscriberSocket, Transport, TransportError};
use crate::config::KEY_LENGTH;
use crate::endpoint::EndPoint;
use crossbeam::channel::{self, Sender};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

type Frame = (String, Vec<u8>);
type TopicFilter = Arc<RwLock<HashSet<String>>>;

struct Route {
    id: u64,
    secured: bool,
    topics: TopicFilter,
    tx: Sender<Frame>,
}

#[derive(Default)]
struct BusState {
    bound: HashSet<u16>,
    routes: HashMap<u16, Vec<Route>>,
    next_route_id: u64,
}

#[derive(Default)]
struct Bus {
    state: Mutex<BusState>,
}

impl Bus {
    fn bind(&self, port: u16) -> Result<(), TransportError> {
        if self.state.lock().bound.insert(port) {
            Ok(())
        } else {
            Err(TransportError::AddressInUse(port))
        }
    }

    fn unbind(&self, port: u16) {
        self.state.lock().bound.remove(&port);
    }

    fn attach(&self, port: u16, secured: bool, topics: TopicFilter, tx: Sender<Frame>) -> u64 {
        let mut state = self.state.lock();
        state.next_route_id += 1;
        let id = state.next_route_id;
        state.routes.entry(port).or_default().push(Route {
            id,
            secured,
            topics,
            tx,
        });
        id
    }

    fn detach(&self, port: u16, id: u64) {
        let mut state = self.state.lock();
        if let Some(routes) = state.routes.get_mut(&port) {
            routes.retain(|r| r.id != id);
            if routes.is_empty() {
                state.routes.remove(&port);
            }
        }
    }

    /// Queue a frame for every matching route. Returns the number of receivers.
    fn dispatch(&self, port: u16, secured: bool, topic: &str, payload: &[u8]) -> usize {
        let state = self.state.lock();
        let Some(routes) = state.routes.get(&port) else {
            return 0;
        };
        routes
            .iter()
            .filter(|r| r.secured == secured && r.topics.read().contains(topic))
            .filter(|r| r.tx.send((topic.to_string(), payload.to_vec())).is_ok())
            .count()
    }
}

fn check_key(what: &str, key: &str) -> Result<(), TransportError> {
    if key.len() == KEY_LENGTH {
        Ok(())
    } else {
        Err(TransportError::Key(format!("{what} must be {KEY_LENGTH} bytes")))
    }
}

/// Loopback [`Transport`]; clones share the same bus.
#[derive(Clone, Default)]
pub struct InProcTransport {
    bus: Arc<Bus>,
}

impl InProcTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a publisher currently holds `port`.
    pub fn is_bound(&self, port: u16) -> bool {
        self.bus.state.lock().bound.contains(&port)
    }
}

impl Transport for InProcTransport {
    fn create_publisher(&self, port: u16) -> Result<Box<dyn PublisherSocket>, TransportError> {
        Ok(Box::new(InProcPublisher {
            bus: Arc::clone(&self.bus),
            port,
            secured: false,
            started: false,
        }))
    }

    fn create_subscriber(
        &self,
        endpoint: &EndPoint,
        handler: MessageHandler,
    ) -> Result<Box<dyn SubscriberSocket>, TransportError> {
        let port = endpoint
            .port()
            .ok_or_else(|| TransportError::Connect(format!("{endpoint} has no port")))?;
        Ok(Box::new(InProcSubscriber {
            bus: Arc::clone(&self.bus),
            port,
            handler,
            server_key: false,
            client_keys: false,
            topics: TopicFilter::default(),
            route: None,
            worker: None,
        }))
    }
}

struct InProcPublisher {
    bus: Arc<Bus>,
    port: u16,
    secured: bool,
    started: bool,
}

impl PublisherSocket for InProcPublisher {
    fn set_server_key(&mut self, secret_key: &str) -> Result<(), TransportError> {
        check_key("server secret key", secret_key)?;
        self.secured = true;
        Ok(())
    }

    fn start(&mut self) -> Result<(), TransportError> {
        if !self.started {
            self.bus.bind(self.port)?;
            self.started = true;
            log::debug!("[INPROC] Publisher bound to port {}", self.port);
        }
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        if !self.started {
            return Err(TransportError::NotStarted);
        }
        let receivers = self.bus.dispatch(self.port, self.secured, topic, payload);
        log::trace!("[INPROC] {} -> {} receiver(s)", topic, receivers);
        Ok(())
    }

    fn stop(&mut self) {
        if self.started {
            self.bus.unbind(self.port);
            self.started = false;
            log::debug!("[INPROC] Publisher released port {}", self.port);
        }
    }
}

impl Drop for InProcPublisher {
    fn drop(&mut self) {
        self.stop();
    }
}

struct InProcSubscriber {
    bus: Arc<Bus>,
    port: u16,
    handler: MessageHandler,
    server_key: bool,
    client_keys: bool,
    topics: TopicFilter,
    route: Option<u64>,
    worker: Option<JoinHandle<()>>,
}

impl SubscriberSocket for InProcSubscriber {
    fn set_server_key(&mut self, public_key: &str) -> Result<(), TransportError> {
        check_key("server public key", public_key)?;
        self.server_key = true;
        Ok(())
    }

    fn set_client_keys(
        &mut self,
        public_key: &str,
        secret_key: &str,
    ) -> Result<(), TransportError> {
        check_key("client public key", public_key)?;
        check_key("client secret key", secret_key)?;
        self.client_keys = true;
        Ok(())
    }

    fn start(&mut self) -> Result<(), TransportError> {
        if self.route.is_some() {
            return Ok(());
        }
        if self.server_key != self.client_keys {
            return Err(TransportError::Key(
                "secured session needs both server and client keys".into(),
            ));
        }

        let (tx, rx) = channel::unbounded::<Frame>();
        let handler = Arc::clone(&self.handler);
        let worker = thread::Builder::new()
            .name(format!("ezmqx-inproc-{}", self.port))
            .spawn(move || {
                for (topic, payload) in rx.iter() {
                    handler(&topic, &payload);
                }
            })
            .map_err(|e| TransportError::Connect(format!("delivery thread: {e}")))?;

        let secured = self.server_key && self.client_keys;
        self.route = Some(self.bus.attach(self.port, secured, Arc::clone(&self.topics), tx));
        self.worker = Some(worker);
        log::debug!("[INPROC] Subscriber connected to port {}", self.port);
        Ok(())
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        self.topics.write().insert(topic.to_string());
        Ok(())
    }

    fn stop(&mut self) {
        // Detaching drops the only sender, which ends the delivery loop.
        if let Some(id) = self.route.take() {
            self.bus.detach(self.port, id);
        }
        if let Some(worker) = self.worker.take() {
            // stop() may be reached from inside the handler itself.
            if worker.thread().id() != thread::current().id() {
                let _ = worker.join();
            }
        }
    }
}

impl Drop for InProcSubscriber {
    fn drop(&mut self) {
        self.stop();
    }
}
