//! Impure I/O operations for the MQTT transport
//!
//! This module owns the `rumqttc` client handle and the background task that
//! polls its event loop. Events are forwarded to the connection manager over
//! an `mpsc` channel; decisions about when to reconnect stay with the manager.

use super::connection::configure_mqtt_options;
use super::message_handler::MessageHandler;
use crate::config::BrokerSection;
use crate::transport::{Transport, TransportError, TransportEvent, EVENT_CHANNEL_CAPACITY};
use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::v5::{mqttbytes::QoS, AsyncClient, EventLoop};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Capacity of the `rumqttc` request channel
const REQUEST_CHANNEL_CAPACITY: usize = 10;

/// MQTT transport backed by a `rumqttc` v5 client
///
/// The poll task waits on `connect_signal` before every session and returns
/// to waiting as soon as the session ends, so `rumqttc` never reconnects on
/// its own.
pub struct MqttTransport {
    client: AsyncClient,
    connect_signal: Arc<Notify>,
    poll_handle: Option<JoinHandle<()>>,
}

impl MqttTransport {
    /// Create the transport and spawn its poll task
    ///
    /// Must be called from within a tokio runtime. Returns the receiving end
    /// of the event channel, which belongs to the connection manager.
    pub fn new(
        device_id: &str,
        broker: &BrokerSection,
    ) -> Result<(Self, mpsc::Receiver<TransportEvent>), TransportError> {
        let mqtt_options = configure_mqtt_options(device_id, broker)?;
        let (client, event_loop) = AsyncClient::new(mqtt_options, REQUEST_CHANNEL_CAPACITY);
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let connect_signal = Arc::new(Notify::new());
        let handle = tokio::spawn(Self::run_event_loop(
            event_loop,
            events_tx,
            connect_signal.clone(),
        ));

        Ok((
            MqttTransport {
                client,
                connect_signal,
                poll_handle: Some(handle),
            },
            events_rx,
        ))
    }

    /// Poll sessions one at a time until the event receiver goes away
    async fn run_event_loop(
        mut event_loop: EventLoop,
        events_tx: mpsc::Sender<TransportEvent>,
        connect_signal: Arc<Notify>,
    ) {
        loop {
            connect_signal.notified().await;
            debug!(target: "mqtt_transport", "Starting MQTT session");

            if !Self::poll_session(&mut event_loop, &events_tx).await {
                break;
            }
        }
        info!("MQTT event loop stopped");
    }

    /// Drive one session until it ends
    ///
    /// Returns false once the event receiver has been dropped.
    async fn poll_session(
        event_loop: &mut EventLoop,
        events_tx: &mpsc::Sender<TransportEvent>,
    ) -> bool {
        loop {
            match event_loop.poll().await {
                Ok(event) => {
                    let route = MessageHandler::route_mqtt_event(&event);
                    let session_over = route.ends_session();

                    if let Some(transport_event) = route.into_transport_event() {
                        if events_tx.send(transport_event).await.is_err() {
                            return false;
                        }
                    }

                    if session_over {
                        return true;
                    }
                }
                Err(e) => {
                    debug!(target: "mqtt_transport", "MQTT session ended: {}", e);
                    let transport_event = MessageHandler::classify_connection_error(&e);
                    return events_tx.send(transport_event).await.is_ok();
                }
            }
        }
    }

    fn ensure_running(&self) -> Result<(), TransportError> {
        match &self.poll_handle {
            Some(handle) if !handle.is_finished() => Ok(()),
            _ => Err(TransportError::Closed),
        }
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        self.ensure_running()?;
        self.connect_signal.notify_one();
        Ok(())
    }

    async fn subscribe(&self, topic_filter: &str) -> Result<(), TransportError> {
        self.client
            .subscribe(topic_filter, QoS::AtLeastOnce)
            .await
            .map_err(|e| TransportError::SubscriptionFailed(Box::new(e)))
    }

    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), TransportError> {
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| TransportError::PublishFailed(Box::new(e)))
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.client
            .disconnect()
            .await
            .map_err(|e| TransportError::ConnectionFailed(Box::new(e)))
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        if let Some(handle) = self.poll_handle.take() {
            if !handle.is_finished() {
                warn!("Dropping MQTT transport with active poll task");
            }
            handle.abort();
        }
    }
}
