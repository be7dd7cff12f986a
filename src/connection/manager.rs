//! Connection manager
//!
//! The manager is the single consumer of the transport's event channel and the
//! only writer of [`ConnectionState`] and [`BackoffState`]. Every transport
//! notification goes through [`ConnectionManager::handle_event`], which
//! dispatches to `on_connect`, `on_disconnect` and `on_publish_ack`.
//!
//! Reconnection is never triggered from inside an event handler. A lost
//! session only moves the state to `Disconnected`; the owner decides when to
//! call [`ConnectionManager::ensure_connected`].

use super::backoff::BackoffState;
use super::sleeper::Sleeper;
use super::state::{log_state_transition, ConnectionState};
use crate::config::ConnectionSettings;
use crate::error::{sanitize_error_message, ConnectError, PublishError};
use crate::protocol::TelemetryMessage;
use crate::transport::{ConnectCode, Transport, TransportEvent};
use serde::Serialize;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Acknowledgment of a delivered publish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub message_id: u16,
}

/// Counters kept by the manager
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionStats {
    pub connect_attempts: u64,
    pub failed_attempts: u64,
    pub successful_connects: u64,
    pub disconnects: u64,
    pub acknowledged_publishes: u64,
}

/// Owns the broker link: connect with backoff, event handling, publish
pub struct ConnectionManager<T: Transport, S: Sleeper> {
    settings: ConnectionSettings,
    transport: T,
    events: mpsc::Receiver<TransportEvent>,
    sleeper: S,
    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
    backoff: BackoffState,
    stats: ConnectionStats,
    events_closed: bool,
    /// Publishes handed to the transport whose packet id is not known yet
    unsent_publishes: usize,
}

impl<T: Transport, S: Sleeper> ConnectionManager<T, S> {
    /// Create a manager in the `Disconnected` state
    ///
    /// `events` must be the receiving end handed out by the transport.
    pub fn new(
        settings: ConnectionSettings,
        transport: T,
        events: mpsc::Receiver<TransportEvent>,
        sleeper: S,
    ) -> Self {
        let backoff = BackoffState::new(settings.backoff_floor, settings.backoff_cap);
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);

        Self {
            settings,
            transport,
            events,
            sleeper,
            state: ConnectionState::Disconnected,
            state_tx,
            backoff,
            stats: ConnectionStats::default(),
            events_closed: false,
            unsent_publishes: 0,
        }
    }

    /// Connect, retrying with exponential backoff until the broker accepts
    ///
    /// Each failed attempt leaves the state at `Failed` for the duration of
    /// the backoff sleep, then returns to `Disconnected` before the next try.
    pub async fn connect_with_retry(&mut self) {
        loop {
            match self.attempt_connect().await {
                Ok(()) => return,
                Err(e) => {
                    self.stats.failed_attempts += 1;
                    let reason = sanitize_error_message(&e.to_string());
                    self.set_state(ConnectionState::Failed, &reason);

                    let delay = self.backoff.next_delay();
                    info!(
                        attempt = self.stats.connect_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying broker connection after backoff"
                    );
                    self.sleeper.sleep(delay).await;

                    self.set_state(ConnectionState::Disconnected, "backoff elapsed");
                }
            }
        }
    }

    /// Apply pending events and reconnect if the link is down
    pub async fn ensure_connected(&mut self) {
        self.drain_events().await;
        if !self.state.is_connected() {
            info!(state = %self.state, "Broker link is down, reconnecting");
            self.connect_with_retry().await;
        }
    }

    /// One connect attempt: request a session and wait for its ConnAck
    async fn attempt_connect(&mut self) -> Result<(), ConnectError> {
        // Anything still queued belongs to an earlier session
        self.drain_events().await;

        self.stats.connect_attempts += 1;
        self.set_state(ConnectionState::Connecting, "");
        self.transport.connect().await?;

        let connect_timeout = self.settings.connect_timeout;
        let deadline = Instant::now() + connect_timeout;

        loop {
            let event = match tokio::time::timeout_at(deadline, self.events.recv()).await {
                Err(_) => return Err(ConnectError::Timeout(connect_timeout)),
                Ok(None) => {
                    self.on_events_closed();
                    return Err(ConnectError::EventChannelClosed);
                }
                Ok(Some(event)) => event,
            };

            match event {
                TransportEvent::ConnAck(code) => return self.on_connect(code).await,
                TransportEvent::NetworkError(reason) | TransportEvent::Disconnected { reason } => {
                    return Err(ConnectError::Network(reason));
                }
                other => self.handle_event(other).await,
            }
        }
    }

    /// Apply a connection acknowledgment
    ///
    /// On acceptance the state becomes `Connected`, the backoff returns to its
    /// floor and the configured filter is subscribed again.
    pub async fn on_connect(&mut self, code: ConnectCode) -> Result<(), ConnectError> {
        match code {
            ConnectCode::Accepted => {
                self.stats.successful_connects += 1;
                self.backoff.reset();
                self.unsent_publishes = 0;
                self.set_state(ConnectionState::Connected, "");

                let filter = self.settings.subscribe_topic.clone();
                match self.transport.subscribe(&filter).await {
                    Ok(()) => debug!(filter = %filter, "Subscription requested"),
                    Err(e) => warn!(
                        filter = %filter,
                        error = %sanitize_error_message(&e.to_string()),
                        "Failed to subscribe"
                    ),
                }
                Ok(())
            }
            ConnectCode::Refused(code) => Err(ConnectError::Refused { code }),
        }
    }

    /// Apply a lost session; never reconnects by itself
    pub fn on_disconnect(&mut self, reason: &str) {
        if self.state.is_connected() {
            self.stats.disconnects += 1;
            self.set_state(
                ConnectionState::Disconnected,
                &sanitize_error_message(reason),
            );
        } else {
            debug!(state = %self.state, reason = %reason, "Ignoring disconnect outside a session");
        }
    }

    /// Account for a publish the transport has sent
    ///
    /// Returns true when no earlier publish is still waiting for its packet
    /// id, i.e. this id belongs to the most recent `publish` call.
    fn on_publish_sent(&mut self, message_id: u16) -> bool {
        self.unsent_publishes = self.unsent_publishes.saturating_sub(1);
        debug!(message_id, pending = self.unsent_publishes, "Publish sent");
        self.unsent_publishes == 0
    }

    /// Record an acknowledged publish
    pub fn on_publish_ack(&mut self, message_id: u16) {
        self.stats.acknowledged_publishes += 1;
        debug!(message_id, "Publish acknowledged");
    }

    /// Dispatch one transport event to its handler
    pub async fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::ConnAck(code) => {
                if let Err(e) = self.on_connect(code).await {
                    warn!(error = %e, "Connection acknowledgment outside an attempt");
                }
            }
            TransportEvent::Disconnected { reason } | TransportEvent::NetworkError(reason) => {
                self.on_disconnect(&reason);
            }
            TransportEvent::PublishSent { message_id } => {
                self.on_publish_sent(message_id);
            }
            TransportEvent::PubAck { message_id } => self.on_publish_ack(message_id),
            TransportEvent::PublishRejected { message_id, reason } => {
                warn!(message_id, reason = %reason, "Broker rejected an earlier publish");
            }
            TransportEvent::SubAck { message_id } => {
                debug!(message_id, "Subscription acknowledged");
            }
            TransportEvent::MessageReceived { topic, payload } => {
                debug!(topic = %topic, bytes = payload.len(), "Message received");
            }
        }
    }

    /// Handle every event already queued without waiting for more
    ///
    /// Returns the number of events handled.
    pub async fn drain_events(&mut self) -> usize {
        let mut handled = 0;
        loop {
            match self.events.try_recv() {
                Ok(event) => {
                    self.handle_event(event).await;
                    handled += 1;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.on_events_closed();
                    break;
                }
            }
        }
        handled
    }

    /// Publish one telemetry message and wait for its acknowledgment
    ///
    /// Fails fast with [`PublishError::NotConnected`] unless the link is up.
    /// Only a PubAck carrying this message's packet id completes the call;
    /// late acks for earlier messages are handled as ordinary events. The
    /// wait is bounded by the configured ack timeout.
    pub async fn publish(
        &mut self,
        topic: &str,
        message: &TelemetryMessage,
    ) -> Result<Ack, PublishError> {
        self.drain_events().await;

        if !self.state.is_connected() {
            return Err(PublishError::NotConnected { state: self.state });
        }

        let payload = message.to_payload()?;
        self.transport.publish(topic, payload).await?;
        self.unsent_publishes += 1;

        let mut sent_id: Option<u16> = None;
        let ack_timeout = self.settings.ack_timeout;
        let deadline = Instant::now() + ack_timeout;

        loop {
            let event = match tokio::time::timeout_at(deadline, self.events.recv()).await {
                Err(_) => return Err(PublishError::AckTimeout(ack_timeout)),
                Ok(None) => {
                    self.on_events_closed();
                    return Err(PublishError::EventChannelClosed);
                }
                Ok(Some(event)) => event,
            };

            match event {
                TransportEvent::PublishSent { message_id } => {
                    if self.on_publish_sent(message_id) && sent_id.is_none() {
                        sent_id = Some(message_id);
                    }
                }
                TransportEvent::PubAck { message_id } if sent_id == Some(message_id) => {
                    self.on_publish_ack(message_id);
                    return Ok(Ack { message_id });
                }
                TransportEvent::PublishRejected { message_id, reason }
                    if sent_id == Some(message_id) =>
                {
                    return Err(PublishError::Rejected { message_id, reason });
                }
                TransportEvent::Disconnected { reason } | TransportEvent::NetworkError(reason) => {
                    self.on_disconnect(&reason);
                    return Err(PublishError::ConnectionLost(reason));
                }
                other => self.handle_event(other).await,
            }
        }
    }

    /// End the broker session
    pub async fn disconnect(&mut self) -> Result<(), crate::transport::TransportError> {
        if self.state.is_connected() {
            self.transport.disconnect().await?;
        }
        self.set_state(ConnectionState::Disconnected, "client disconnect");
        info!("Disconnected from broker");
        Ok(())
    }

    fn on_events_closed(&mut self) {
        if !self.events_closed {
            self.events_closed = true;
            warn!("Transport event channel closed");
        }
        self.on_disconnect("transport event channel closed");
    }

    fn set_state(&mut self, new_state: ConnectionState, detail: &str) {
        if new_state != self.state {
            log_state_transition(self.state, new_state, detail);
        }
        self.state = new_state;
        self.state_tx.send_replace(new_state);
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Read-only view of the state for other tasks
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    pub fn backoff(&self) -> &BackoffState {
        &self.backoff
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    pub fn sleeper(&self) -> &S {
        &self.sleeper
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}
