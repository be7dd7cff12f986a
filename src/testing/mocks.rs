//! Mock implementations for testing
//!
//! Provides a scriptable [`MockTransport`] and a [`RecordingSleeper`] so the
//! connection manager and telemetry loop can be exercised without a broker or
//! real delays.

use crate::connection::{ConnectionState, Sleeper};
use crate::transport::{
    ConnectCode, Transport, TransportError, TransportEvent, EVENT_CHANNEL_CAPACITY,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};

pub type PublishedMessage = (String, Bytes);

/// Outcome of one scripted `connect()` call
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectBehavior {
    /// Broker accepts; a ConnAck is delivered
    Accept,
    /// Broker answers with a failure code
    Refuse(String),
    /// The network attempt fails
    NetworkError(String),
    /// `connect()` itself returns an error
    Fail(String),
    /// Nothing is ever delivered, so the attempt times out
    Silent,
}

/// How publishes are answered
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PublishBehavior {
    #[default]
    Ack,
    /// `publish()` returns an error
    Fail(String),
    /// Publish is accepted but never acknowledged
    Withhold,
    /// Broker acknowledges with a failure reason
    Reject(String),
    /// Session drops before the acknowledgment
    Drop(String),
}

/// Mock transport for testing
///
/// Clones share state, so a test can keep a handle after moving one into the
/// connection manager. Connect outcomes are taken from a script; once the
/// script is exhausted every attempt is accepted.
#[derive(Debug, Clone)]
pub struct MockTransport {
    events_tx: mpsc::Sender<TransportEvent>,
    connect_script: Arc<Mutex<VecDeque<ConnectBehavior>>>,
    publish_behavior: Arc<Mutex<PublishBehavior>>,
    published_messages: Arc<Mutex<Vec<PublishedMessage>>>,
    subscriptions: Arc<Mutex<Vec<String>>>,
    connect_calls: Arc<Mutex<usize>>,
    disconnect_calls: Arc<Mutex<usize>>,
    next_message_id: Arc<Mutex<u16>>,
    last_publish_id: Arc<Mutex<Option<u16>>>,
}

impl MockTransport {
    pub fn new() -> (Self, mpsc::Receiver<TransportEvent>) {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let transport = Self {
            events_tx,
            connect_script: Arc::new(Mutex::new(VecDeque::new())),
            publish_behavior: Arc::new(Mutex::new(PublishBehavior::default())),
            published_messages: Arc::new(Mutex::new(Vec::new())),
            subscriptions: Arc::new(Mutex::new(Vec::new())),
            connect_calls: Arc::new(Mutex::new(0)),
            disconnect_calls: Arc::new(Mutex::new(0)),
            next_message_id: Arc::new(Mutex::new(1)),
            last_publish_id: Arc::new(Mutex::new(None)),
        };
        (transport, events_rx)
    }

    /// Queue outcomes for the next `connect()` calls
    pub async fn script_connects(&self, behaviors: Vec<ConnectBehavior>) {
        self.connect_script.lock().await.extend(behaviors);
    }

    pub async fn set_publish_behavior(&self, behavior: PublishBehavior) {
        *self.publish_behavior.lock().await = behavior;
    }

    pub async fn fail_publishes(&self, reason: &str) {
        self.set_publish_behavior(PublishBehavior::Fail(reason.to_string()))
            .await;
    }

    pub async fn withhold_acks(&self) {
        self.set_publish_behavior(PublishBehavior::Withhold).await;
    }

    pub async fn reject_publishes(&self, reason: &str) {
        self.set_publish_behavior(PublishBehavior::Reject(reason.to_string()))
            .await;
    }

    pub async fn drop_on_publish(&self, reason: &str) {
        self.set_publish_behavior(PublishBehavior::Drop(reason.to_string()))
            .await;
    }

    pub async fn ack_publishes(&self) {
        self.set_publish_behavior(PublishBehavior::Ack).await;
    }

    /// Deliver an event as if it came from the broker
    pub async fn inject_event(&self, event: TransportEvent) {
        let _ = self.events_tx.send(event).await;
    }

    pub async fn get_published_messages(&self) -> Vec<PublishedMessage> {
        self.published_messages.lock().await.clone()
    }

    pub async fn get_subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().await.clone()
    }

    pub async fn connect_calls(&self) -> usize {
        *self.connect_calls.lock().await
    }

    pub async fn disconnect_calls(&self) -> usize {
        *self.disconnect_calls.lock().await
    }

    /// Packet id assigned to the most recent publish
    pub async fn last_publish_id(&self) -> Option<u16> {
        *self.last_publish_id.lock().await
    }

    pub async fn clear_history(&self) {
        self.published_messages.lock().await.clear();
        self.subscriptions.lock().await.clear();
    }

    async fn allocate_message_id(&self) -> u16 {
        let mut next = self.next_message_id.lock().await;
        let id = *next;
        *next = next.checked_add(1).unwrap_or(1);
        id
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        *self.connect_calls.lock().await += 1;

        let behavior = self
            .connect_script
            .lock()
            .await
            .pop_front()
            .unwrap_or(ConnectBehavior::Accept);

        match behavior {
            ConnectBehavior::Accept => {
                self.inject_event(TransportEvent::ConnAck(ConnectCode::Accepted))
                    .await;
            }
            ConnectBehavior::Refuse(code) => {
                self.inject_event(TransportEvent::ConnAck(ConnectCode::Refused(code)))
                    .await;
            }
            ConnectBehavior::NetworkError(reason) => {
                self.inject_event(TransportEvent::NetworkError(reason)).await;
            }
            ConnectBehavior::Fail(reason) => {
                return Err(TransportError::ConnectionFailed(reason.into()));
            }
            ConnectBehavior::Silent => {}
        }
        Ok(())
    }

    async fn subscribe(&self, topic_filter: &str) -> Result<(), TransportError> {
        self.subscriptions
            .lock()
            .await
            .push(topic_filter.to_string());
        let message_id = self.allocate_message_id().await;
        self.inject_event(TransportEvent::SubAck { message_id }).await;
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), TransportError> {
        let behavior = self.publish_behavior.lock().await.clone();

        if let PublishBehavior::Fail(reason) = &behavior {
            return Err(TransportError::PublishFailed(reason.clone().into()));
        }

        self.published_messages
            .lock()
            .await
            .push((topic.to_string(), payload));
        let message_id = self.allocate_message_id().await;
        *self.last_publish_id.lock().await = Some(message_id);
        self.inject_event(TransportEvent::PublishSent { message_id })
            .await;

        match behavior {
            PublishBehavior::Ack => {
                self.inject_event(TransportEvent::PubAck { message_id })
                    .await;
            }
            PublishBehavior::Reject(reason) => {
                self.inject_event(TransportEvent::PublishRejected { message_id, reason })
                    .await;
            }
            PublishBehavior::Drop(reason) => {
                self.inject_event(TransportEvent::Disconnected { reason })
                    .await;
            }
            PublishBehavior::Withhold | PublishBehavior::Fail(_) => {}
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        *self.disconnect_calls.lock().await += 1;
        Ok(())
    }
}

/// One recorded sleep
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedSleep {
    pub duration: Duration,
    /// Connection state observed when the sleep started, if observing
    pub state: Option<ConnectionState>,
}

/// Sleeper that records requested durations instead of waiting
///
/// It yields to the scheduler on every call so `select!`-based shutdown
/// paths still make progress.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    sleeps: std::sync::Mutex<Vec<RecordedSleep>>,
    state_rx: std::sync::Mutex<Option<watch::Receiver<ConnectionState>>>,
    shutdown: std::sync::Mutex<Option<(usize, watch::Sender<bool>)>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the connection state alongside every sleep
    pub fn observe_state(&self, state_rx: watch::Receiver<ConnectionState>) {
        if let Ok(mut slot) = self.state_rx.lock() {
            *slot = Some(state_rx);
        }
    }

    /// Signal `shutdown_tx` once `count` sleeps have been recorded
    pub fn shutdown_after(&self, count: usize, shutdown_tx: watch::Sender<bool>) {
        if let Ok(mut slot) = self.shutdown.lock() {
            *slot = Some((count, shutdown_tx));
        }
    }

    pub fn sleeps(&self) -> Vec<RecordedSleep> {
        self.sleeps
            .lock()
            .map(|sleeps| sleeps.clone())
            .unwrap_or_default()
    }

    pub fn durations(&self) -> Vec<Duration> {
        self.sleeps().into_iter().map(|s| s.duration).collect()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        let state = self
            .state_rx
            .lock()
            .ok()
            .and_then(|rx| rx.as_ref().map(|rx| *rx.borrow()));

        let recorded = match self.sleeps.lock() {
            Ok(mut sleeps) => {
                sleeps.push(RecordedSleep { duration, state });
                sleeps.len()
            }
            Err(_) => 0,
        };

        if let Ok(shutdown) = self.shutdown.lock() {
            if let Some((count, tx)) = shutdown.as_ref() {
                if recorded >= *count {
                    tx.send_replace(true);
                }
            }
        }

        tokio::task::yield_now().await;
    }
}
