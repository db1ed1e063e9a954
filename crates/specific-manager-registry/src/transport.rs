// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Topic-based message transport.
//!
//! The registry talks to the platform over named topics. Request topics have
//! exactly one endpoint and a reply per request; notification topics fan out
//! to every subscriber. [`LocalBus`] implements both in-process.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::config::DEFAULT_BUS_REPLY_TIMEOUT;

/// Queue depth of every endpoint and subscription channel.
const CHANNEL_CAPACITY: usize = 64;

/// Transport errors.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Another endpoint already serves this topic.
    #[error("Endpoint already registered for topic {0}")]
    EndpointExists(String),

    /// Nobody serves this topic.
    #[error("No endpoint for topic {0}")]
    NoEndpoint(String),

    /// The endpoint did not reply in time.
    #[error("No reply on topic {topic} within {timeout:?}")]
    ReplyTimeout {
        /// Topic the request was sent to.
        topic: String,
        /// How long we waited.
        timeout: Duration,
    },

    /// The other side went away.
    #[error("Channel closed on topic {0}")]
    Closed(String),
}

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// A request delivered to an endpoint, carrying its reply channel.
#[derive(Debug)]
pub struct InboundRequest {
    /// Topic the request arrived on
    pub topic: String,
    /// Raw payload
    pub payload: String,
    reply: oneshot::Sender<String>,
}

impl InboundRequest {
    /// Send the reply. Fails if the requester stopped waiting.
    pub fn reply(self, payload: String) -> Result<()> {
        self.reply
            .send(payload)
            .map_err(|_| TransportError::Closed(self.topic))
    }
}

/// Message transport capability.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Human-readable transport name for logging.
    fn name(&self) -> &'static str;

    /// Serve request/reply traffic on `topic`.
    async fn register_endpoint(&self, topic: &str) -> Result<mpsc::Receiver<InboundRequest>>;

    /// Receive every notification published on `topic`.
    async fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<String>>;

    /// Publish a notification. Succeeds even with no subscribers.
    async fn publish(&self, topic: &str, payload: String) -> Result<()>;

    /// Send a request and wait for the reply.
    async fn request(&self, topic: &str, payload: String) -> Result<String>;
}

#[derive(Default)]
struct BusState {
    endpoints: HashMap<String, mpsc::Sender<InboundRequest>>,
    subscribers: HashMap<String, Vec<mpsc::Sender<String>>>,
}

/// In-process topic bus.
#[derive(Clone)]
pub struct LocalBus {
    state: Arc<Mutex<BusState>>,
    reply_timeout: Duration,
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_REPLY_TIMEOUT)
    }
}

impl LocalBus {
    /// Create a bus whose requests give up after `reply_timeout`.
    pub fn new(reply_timeout: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(BusState::default())),
            reply_timeout,
        }
    }

    /// Reply timeout applied to [`Transport::request`].
    pub fn reply_timeout(&self) -> Duration {
        self.reply_timeout
    }

    /// Whether a live endpoint serves `topic`.
    pub fn has_endpoint(&self, topic: &str) -> bool {
        self.state
            .lock()
            .endpoints
            .get(topic)
            .is_some_and(|tx| !tx.is_closed())
    }
}

#[async_trait]
impl Transport for LocalBus {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn register_endpoint(&self, topic: &str) -> Result<mpsc::Receiver<InboundRequest>> {
        let mut state = self.state.lock();
        if state.endpoints.get(topic).is_some_and(|tx| !tx.is_closed()) {
            return Err(TransportError::EndpointExists(topic.to_string()));
        }

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        state.endpoints.insert(topic.to_string(), tx);
        debug!(topic = %topic, "Endpoint registered");
        Ok(rx)
    }

    async fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<String>> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        self.state
            .lock()
            .subscribers
            .entry(topic.to_string())
            .or_default()
            .push(tx);
        debug!(topic = %topic, "Subscribed");
        Ok(rx)
    }

    async fn publish(&self, topic: &str, payload: String) -> Result<()> {
        let subscribers = {
            let mut state = self.state.lock();
            match state.subscribers.get_mut(topic) {
                Some(list) => {
                    list.retain(|tx| !tx.is_closed());
                    list.clone()
                }
                None => Vec::new(),
            }
        };

        debug!(topic = %topic, subscribers = subscribers.len(), "Publishing");

        for tx in subscribers {
            if tx.send(payload.clone()).await.is_err() {
                warn!(topic = %topic, "Subscriber dropped during publish");
            }
        }
        Ok(())
    }

    async fn request(&self, topic: &str, payload: String) -> Result<String> {
        let endpoint = self
            .state
            .lock()
            .endpoints
            .get(topic)
            .cloned()
            .ok_or_else(|| TransportError::NoEndpoint(topic.to_string()))?;

        let (reply_tx, reply_rx) = oneshot::channel();
        endpoint
            .send(InboundRequest {
                topic: topic.to_string(),
                payload,
                reply: reply_tx,
            })
            .await
            .map_err(|_| TransportError::NoEndpoint(topic.to_string()))?;

        match tokio::time::timeout(self.reply_timeout, reply_rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(TransportError::Closed(topic.to_string())),
            Err(_) => Err(TransportError::ReplyTimeout {
                topic: topic.to_string(),
                timeout: self.reply_timeout,
            }),
        }
    }
}
