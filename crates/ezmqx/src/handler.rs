// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Topic handler: registration bookkeeping and periodic keepalive.
//!
//! One background worker per Context owns the list of registered topics and
//! the keepalive settings. Callers never touch that state; they queue
//! [`HandlerMessage`]s and the worker applies them in order.
//!
//! # Architecture
//!
//! ```text
//! Publisher / Subscriber threads            Topic handler thread
//! ------------------------------            --------------------
//!  TopicHandler::send(msg) ──── channel ───► recv_timeout(next keepalive)
//!                                              ├─ Register / Unregister
//!                                              ├─ KeepAliveInterval (first wins)
//!                                              ├─ KeepAliveStart
//!                                              ├─ Snapshot ──► reply channel
//!                                              └─ Shutdown ──► exit
//!                                            keepalive due? ─► POST /tns/keepalive
//! ```

use crate::error::{Error, ErrorKind, Result};
use crate::tns::TnsClient;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

// ============================================================================
// Messages
// ============================================================================

/// Requests processed by the handler thread, in send order.
#[derive(Debug)]
pub enum HandlerMessage {
    /// Add a topic to the keepalive list.
    Register(String),
    /// Remove a topic from the keepalive list.
    Unregister(String),
    /// Set the keepalive interval unless one is already set.
    KeepAliveInterval(Duration),
    /// Begin sending keepalives.
    KeepAliveStart,
    /// Report the current state on the enclosed channel.
    Snapshot(Sender<HandlerSnapshot>),
    /// Stop the worker.
    Shutdown,
}

/// Point-in-time view of the handler state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerSnapshot {
    pub topics: Vec<String>,
    pub keepalive_interval: Option<Duration>,
    pub keepalive_started: bool,
}

// ============================================================================
// Worker
// ============================================================================

struct Worker {
    tns: TnsClient,
    topics: Vec<String>,
    interval: Option<Duration>,
    started: bool,
    last_keepalive: Instant,
}

impl Worker {
    fn new(tns: TnsClient) -> Self {
        Self {
            tns,
            topics: Vec::new(),
            interval: None,
            started: false,
            last_keepalive: Instant::now(),
        }
    }

    fn run(mut self, rx: Receiver<HandlerMessage>) {
        log::debug!("[TOPIC-HANDLER] Worker started");
        loop {
            let received = match self.next_wait() {
                Some(wait) => rx.recv_timeout(wait),
                None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };

            match received {
                Ok(HandlerMessage::Shutdown) => break,
                Ok(message) => self.apply(message),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    log::warn!("[TOPIC-HANDLER] Channel closed without shutdown");
                    break;
                }
            }

            self.keepalive_if_due();
        }
        log::debug!("[TOPIC-HANDLER] Worker stopped");
    }

    /// Time until the next keepalive is due, or `None` to wait indefinitely.
    fn next_wait(&self) -> Option<Duration> {
        let interval = self.interval?;
        if self.started {
            Some(interval.saturating_sub(self.last_keepalive.elapsed()))
        } else {
            Some(interval)
        }
    }

    fn apply(&mut self, message: HandlerMessage) {
        match message {
            HandlerMessage::Register(topic) => {
                if !self.topics.contains(&topic) {
                    log::debug!("[TOPIC-HANDLER] Register {}", topic);
                    self.topics.push(topic);
                }
            }
            HandlerMessage::Unregister(topic) => {
                log::debug!("[TOPIC-HANDLER] Unregister {}", topic);
                self.topics.retain(|t| *t != topic);
            }
            HandlerMessage::KeepAliveInterval(interval) => {
                if self.interval.is_none() && !interval.is_zero() {
                    log::info!("[TOPIC-HANDLER] Keepalive interval {:?}", interval);
                    self.interval = Some(interval);
                }
            }
            HandlerMessage::KeepAliveStart => {
                if !self.started {
                    self.started = true;
                    self.last_keepalive = Instant::now();
                }
            }
            HandlerMessage::Snapshot(reply) => {
                let _ = reply.send(HandlerSnapshot {
                    topics: self.topics.clone(),
                    keepalive_interval: self.interval,
                    keepalive_started: self.started,
                });
            }
            HandlerMessage::Shutdown => {}
        }
    }

    fn keepalive_if_due(&mut self) {
        let Some(interval) = self.interval else {
            return;
        };
        if !self.started || self.last_keepalive.elapsed() < interval {
            return;
        }
        self.last_keepalive = Instant::now();
        if let Err(e) = self.tns.keep_alive(&self.topics) {
            log::warn!("[TOPIC-HANDLER] Keepalive failed: {}", e);
        }
    }
}

// ============================================================================
// Handle
// ============================================================================

struct Runtime {
    tx: Sender<HandlerMessage>,
    thread: JoinHandle<()>,
}

/// Owner of the topic-handler thread. The thread is started on demand.
#[derive(Default)]
pub struct TopicHandler {
    runtime: Mutex<Option<Runtime>>,
}

impl TopicHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the worker. A no-op while it is already running.
    pub fn init_handler(&self, tns: TnsClient) -> Result<()> {
        let mut runtime = self.runtime.lock();
        if runtime.is_some() {
            return Ok(());
        }

        let (tx, rx) = channel::unbounded();
        let worker = Worker::new(tns);
        let thread = thread::Builder::new()
            .name("ezmqx-topic-handler".to_string())
            .spawn(move || worker.run(rx))
            .map_err(|e| {
                Error::new(
                    ErrorKind::SessionUnavailable,
                    format!("failed to spawn topic handler: {e}"),
                )
            })?;

        *runtime = Some(Runtime { tx, thread });
        log::info!("[TOPIC-HANDLER] Initialized");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.runtime.lock().is_some()
    }

    /// Queue a message for the worker.
    pub fn send(&self, message: HandlerMessage) -> Result<()> {
        let tx = self
            .runtime
            .lock()
            .as_ref()
            .map(|rt| rt.tx.clone())
            .ok_or_else(|| Error::terminated("topic handler"))?;
        tx.send(message)
            .map_err(|_| Error::terminated("topic handler"))
    }

    pub fn register_topic(&self, topic: &str) -> Result<()> {
        self.send(HandlerMessage::Register(topic.to_string()))
    }

    pub fn unregister_topic(&self, topic: &str) -> Result<()> {
        self.send(HandlerMessage::Unregister(topic.to_string()))
    }

    /// First value wins; later updates are ignored by the worker.
    pub fn update_keep_alive_interval(&self, seconds: u64) -> Result<()> {
        self.send(HandlerMessage::KeepAliveInterval(Duration::from_secs(
            seconds,
        )))
    }

    pub fn start_keep_alive(&self) -> Result<()> {
        self.send(HandlerMessage::KeepAliveStart)
    }

    /// Ask the worker for its current state. `None` if it is not running.
    pub fn snapshot(&self) -> Option<HandlerSnapshot> {
        let (reply_tx, reply_rx) = channel::bounded(1);
        self.send(HandlerMessage::Snapshot(reply_tx)).ok()?;
        reply_rx.recv().ok()
    }

    /// Stop the worker and wait for it to exit.
    ///
    /// Messages queued before this call are processed first.
    pub fn terminate_handler(&self) {
        let Some(runtime) = self.runtime.lock().take() else {
            return;
        };
        let _ = runtime.tx.send(HandlerMessage::Shutdown);
        if runtime.thread.join().is_err() {
            log::error!("[TOPIC-HANDLER] Worker panicked");
        }
        log::info!("[TOPIC-HANDLER] Terminated");
    }
}

impl Drop for TopicHandler {
    fn drop(&mut self) {
        self.terminate_handler();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rest::{RestClient, RestError, RestResponse};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct KeepAliveLog {
        bodies: Mutex<Vec<String>>,
    }

    impl RestClient for KeepAliveLog {
        fn get(&self, _url: &str) -> std::result::Result<RestResponse, RestError> {
            Ok(RestResponse::new(200, "{}"))
        }
        fn post(&self, _url: &str, body: &str) -> std::result::Result<RestResponse, RestError> {
            self.bodies.lock().push(body.to_string());
            Ok(RestResponse::new(200, ""))
        }
        fn delete(&self, _url: &str) -> std::result::Result<RestResponse, RestError> {
            Ok(RestResponse::new(200, ""))
        }
    }

    fn handler_with_log() -> (TopicHandler, Arc<KeepAliveLog>) {
        let log = Arc::new(KeepAliveLog::default());
        let handler = TopicHandler::new();
        handler
            .init_handler(TnsClient::new("tns", log.clone()))
            .unwrap();
        (handler, log)
    }

    #[test]
    fn send_before_init_fails() {
        let handler = TopicHandler::new();
        assert!(!handler.is_running());
        assert_eq!(
            handler.register_topic("/a").unwrap_err().kind(),
            ErrorKind::Terminated
        );
        assert!(handler.snapshot().is_none());
    }

    #[test]
    fn init_is_idempotent() {
        let (handler, log) = handler_with_log();
        handler
            .init_handler(TnsClient::new("other", log))
            .unwrap();
        assert!(handler.is_running());
        handler.terminate_handler();
        assert!(!handler.is_running());
        // A second terminate is harmless.
        handler.terminate_handler();
    }

    #[test]
    fn register_and_unregister_keep_order() {
        let (handler, _log) = handler_with_log();
        handler.register_topic("/a").unwrap();
        handler.register_topic("/b").unwrap();
        handler.register_topic("/a").unwrap();
        handler.register_topic("/c").unwrap();
        handler.unregister_topic("/b").unwrap();

        let snapshot = handler.snapshot().unwrap();
        assert_eq!(snapshot.topics, vec!["/a".to_string(), "/c".to_string()]);
        assert!(!snapshot.keepalive_started);
        assert_eq!(snapshot.keepalive_interval, None);
    }

    #[test]
    fn keepalive_interval_first_value_wins() {
        let (handler, _log) = handler_with_log();
        handler.update_keep_alive_interval(5).unwrap();
        handler.update_keep_alive_interval(9).unwrap();
        let snapshot = handler.snapshot().unwrap();
        assert_eq!(snapshot.keepalive_interval, Some(Duration::from_secs(5)));
    }

    #[test]
    fn keepalive_posts_registered_topics() {
        let (handler, log) = handler_with_log();
        handler.update_keep_alive_interval(1).unwrap();
        handler.start_keep_alive().unwrap();
        handler.register_topic("/x").unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while log.bodies.lock().is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(50));
        }
        handler.terminate_handler();

        let bodies = log.bodies.lock();
        assert!(!bodies.is_empty(), "no keepalive was sent");
        assert_eq!(bodies[0], r#"{"topic_names":["/x"]}"#);
    }

    /// Refuses the first `failures` keepalive POSTs.
    struct FlakyTns {
        failures: AtomicUsize,
        attempts: AtomicUsize,
        delivered: Mutex<Vec<String>>,
    }

    impl RestClient for FlakyTns {
        fn get(&self, _url: &str) -> std::result::Result<RestResponse, RestError> {
            Ok(RestResponse::new(200, "{}"))
        }
        fn post(&self, url: &str, body: &str) -> std::result::Result<RestResponse, RestError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let refused = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if refused {
                return Err(RestError::Request {
                    url: url.to_string(),
                    reason: "connection refused".into(),
                });
            }
            self.delivered.lock().push(body.to_string());
            Ok(RestResponse::new(200, ""))
        }
        fn delete(&self, _url: &str) -> std::result::Result<RestResponse, RestError> {
            Ok(RestResponse::new(200, ""))
        }
    }

    #[test]
    fn keepalive_survives_failed_posts() {
        let rest = Arc::new(FlakyTns {
            failures: AtomicUsize::new(2),
            attempts: AtomicUsize::new(0),
            delivered: Mutex::new(Vec::new()),
        });
        let handler = TopicHandler::new();
        handler
            .init_handler(TnsClient::new("tns", rest.clone()))
            .unwrap();
        handler.update_keep_alive_interval(1).unwrap();
        handler.start_keep_alive().unwrap();
        handler.register_topic("/x").unwrap();

        let deadline = Instant::now() + Duration::from_secs(8);
        while rest.delivered.lock().is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(50));
        }

        assert!(rest.attempts.load(Ordering::SeqCst) >= 3);
        assert_eq!(rest.delivered.lock()[0], r#"{"topic_names":["/x"]}"#);
        let snapshot = handler.snapshot().expect("worker still answers");
        assert_eq!(snapshot.topics, vec!["/x".to_string()]);
        assert!(snapshot.keepalive_started);
        handler.terminate_handler();
    }

    #[test]
    fn no_keepalive_before_start() {
        let (handler, log) = handler_with_log();
        handler.update_keep_alive_interval(1).unwrap();
        handler.register_topic("/x").unwrap();
        thread::sleep(Duration::from_millis(1300));
        handler.terminate_handler();
        assert!(log.bodies.lock().is_empty());
    }
}
