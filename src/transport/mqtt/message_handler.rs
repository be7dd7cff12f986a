//! Pure translation of MQTT events
//!
//! This module maps `rumqttc` events and event loop errors onto routing
//! decisions, and routing decisions onto [`TransportEvent`]s for the
//! connection manager.

use crate::transport::{ConnectCode, TransportEvent};
use bytes::Bytes;
use rumqttc::v5::mqttbytes::v5::{ConnectReturnCode, Packet, PubAckReason};
use rumqttc::v5::{ConnectionError, Event};
use rumqttc::Outgoing;

/// Pure routing decisions based on MQTT events
pub struct MessageHandler;

impl MessageHandler {
    /// Route MQTT event to appropriate handler (pure routing decision)
    pub fn route_mqtt_event(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(incoming) => match incoming {
                Packet::ConnAck(connack) => {
                    if connack.code == ConnectReturnCode::Success {
                        EventRoute::ConnectionAcknowledged
                    } else {
                        EventRoute::ConnectionRefused(format!("{:?}", connack.code))
                    }
                }
                Packet::PubAck(puback) => {
                    if matches!(
                        puback.reason,
                        PubAckReason::Success | PubAckReason::NoMatchingSubscribers
                    ) {
                        EventRoute::PublishAcknowledged { pkid: puback.pkid }
                    } else {
                        EventRoute::PublishRejected {
                            pkid: puback.pkid,
                            reason: format!("{:?}", puback.reason),
                        }
                    }
                }
                Packet::SubAck(suback) => EventRoute::SubscriptionConfirmed {
                    pkid: suback.pkid,
                    return_codes: suback
                        .return_codes
                        .iter()
                        .map(|code| format!("{code:?}"))
                        .collect(),
                },
                Packet::Publish(publish) => EventRoute::MessageReceived {
                    topic: String::from_utf8_lossy(&publish.topic).to_string(),
                    payload: publish.payload.clone(),
                },
                Packet::Disconnect(disconnect) => EventRoute::Disconnected {
                    reason: format!("{:?}", disconnect.reason_code),
                },
                other => EventRoute::InfrastructureEvent(format!("{other:?}")),
            },
            Event::Outgoing(Outgoing::Publish(pkid)) => EventRoute::PublishSent { pkid: *pkid },
            Event::Outgoing(_) => EventRoute::OutgoingEvent,
        }
    }

    /// Translate an event loop error into the event reported to the manager
    pub fn classify_connection_error(error: &ConnectionError) -> TransportEvent {
        match error {
            ConnectionError::ConnectionRefused(code) => {
                TransportEvent::ConnAck(ConnectCode::Refused(format!("{code:?}")))
            }
            other => TransportEvent::NetworkError(other.to_string()),
        }
    }
}

/// Routing decisions for MQTT events
#[derive(Debug, Clone, PartialEq)]
pub enum EventRoute {
    /// Connection acknowledged - ready to publish/subscribe
    ConnectionAcknowledged,
    /// Broker answered ConnAck with a failure code
    ConnectionRefused(String),
    /// QoS 1 publish written to the network
    PublishSent { pkid: u16 },
    /// QoS 1 publish acknowledged
    PublishAcknowledged { pkid: u16 },
    /// QoS 1 publish acknowledged with a failure reason
    PublishRejected { pkid: u16, reason: String },
    /// Subscription confirmed with return codes
    SubscriptionConfirmed { pkid: u16, return_codes: Vec<String> },
    /// Message received on subscribed topic
    MessageReceived { topic: String, payload: Bytes },
    /// MQTT broker disconnected
    Disconnected { reason: String },
    /// Keep-alive and other protocol traffic
    InfrastructureEvent(String),
    /// Outgoing packet notifications
    OutgoingEvent,
}

impl EventRoute {
    /// Event forwarded to the connection manager, if any
    pub fn into_transport_event(self) -> Option<TransportEvent> {
        match self {
            EventRoute::ConnectionAcknowledged => {
                Some(TransportEvent::ConnAck(ConnectCode::Accepted))
            }
            EventRoute::ConnectionRefused(code) => {
                Some(TransportEvent::ConnAck(ConnectCode::Refused(code)))
            }
            EventRoute::PublishSent { pkid } => {
                Some(TransportEvent::PublishSent { message_id: pkid })
            }
            EventRoute::PublishAcknowledged { pkid } => {
                Some(TransportEvent::PubAck { message_id: pkid })
            }
            EventRoute::PublishRejected { pkid, reason } => Some(TransportEvent::PublishRejected {
                message_id: pkid,
                reason,
            }),
            EventRoute::SubscriptionConfirmed { pkid, return_codes } => {
                tracing::debug!(target: "mqtt_transport", "Subscription confirmed: {:?}", return_codes);
                Some(TransportEvent::SubAck { message_id: pkid })
            }
            EventRoute::MessageReceived { topic, payload } => {
                Some(TransportEvent::MessageReceived { topic, payload })
            }
            EventRoute::Disconnected { reason } => Some(TransportEvent::Disconnected { reason }),
            EventRoute::InfrastructureEvent(event_str) => {
                tracing::trace!(target: "mqtt_transport", "MQTT event: {}", event_str);
                None
            }
            EventRoute::OutgoingEvent => None,
        }
    }

    /// Whether this route ends the current broker session
    pub fn ends_session(&self) -> bool {
        matches!(
            self,
            EventRoute::Disconnected { .. } | EventRoute::ConnectionRefused(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_mqtt_event() {
        use rumqttc::v5::mqttbytes::v5::{ConnAck, Disconnect, DisconnectReasonCode, Publish};
        use rumqttc::v5::mqttbytes::QoS;

        let connack = Event::Incoming(Packet::ConnAck(ConnAck {
            session_present: false,
            code: ConnectReturnCode::Success,
            properties: None,
        }));
        assert_eq!(
            MessageHandler::route_mqtt_event(&connack),
            EventRoute::ConnectionAcknowledged
        );

        let refused = Event::Incoming(Packet::ConnAck(ConnAck {
            session_present: false,
            code: ConnectReturnCode::NotAuthorized,
            properties: None,
        }));
        assert_eq!(
            MessageHandler::route_mqtt_event(&refused),
            EventRoute::ConnectionRefused("NotAuthorized".to_string())
        );

        let disconnect = Event::Incoming(Packet::Disconnect(Disconnect {
            reason_code: DisconnectReasonCode::ServerShuttingDown,
            properties: None,
        }));
        assert_eq!(
            MessageHandler::route_mqtt_event(&disconnect),
            EventRoute::Disconnected {
                reason: "ServerShuttingDown".to_string()
            }
        );

        let publish = Event::Incoming(Packet::Publish(Publish {
            dup: false,
            qos: QoS::AtLeastOnce,
            retain: false,
            topic: Bytes::from("device/commands"),
            pkid: 1,
            payload: Bytes::from("reboot"),
            properties: None,
        }));
        assert_eq!(
            MessageHandler::route_mqtt_event(&publish),
            EventRoute::MessageReceived {
                topic: "device/commands".to_string(),
                payload: Bytes::from("reboot"),
            }
        );
    }

    #[test]
    fn test_outgoing_publish_reports_packet_id() {
        let sent = Event::Outgoing(Outgoing::Publish(5));
        let route = MessageHandler::route_mqtt_event(&sent);
        assert_eq!(route, EventRoute::PublishSent { pkid: 5 });
        assert_eq!(
            route.into_transport_event(),
            Some(TransportEvent::PublishSent { message_id: 5 })
        );

        let ping = Event::Outgoing(Outgoing::PingReq);
        assert_eq!(
            MessageHandler::route_mqtt_event(&ping),
            EventRoute::OutgoingEvent
        );
    }

    #[test]
    fn test_refused_connection_error_becomes_connack() {
        let error = ConnectionError::ConnectionRefused(ConnectReturnCode::BadUserNamePassword);
        assert_eq!(
            MessageHandler::classify_connection_error(&error),
            TransportEvent::ConnAck(ConnectCode::Refused("BadUserNamePassword".to_string()))
        );
    }

    #[test]
    fn test_connection_routes_become_connack_events() {
        assert_eq!(
            EventRoute::ConnectionAcknowledged.into_transport_event(),
            Some(TransportEvent::ConnAck(ConnectCode::Accepted))
        );
        assert_eq!(
            EventRoute::ConnectionRefused("NotAuthorized".to_string()).into_transport_event(),
            Some(TransportEvent::ConnAck(ConnectCode::Refused(
                "NotAuthorized".to_string()
            )))
        );
    }

    #[test]
    fn test_publish_routes_carry_packet_id() {
        assert_eq!(
            EventRoute::PublishAcknowledged { pkid: 42 }.into_transport_event(),
            Some(TransportEvent::PubAck { message_id: 42 })
        );
        assert_eq!(
            EventRoute::PublishRejected {
                pkid: 7,
                reason: "QuotaExceeded".to_string()
            }
            .into_transport_event(),
            Some(TransportEvent::PublishRejected {
                message_id: 7,
                reason: "QuotaExceeded".to_string()
            })
        );
    }

    #[test]
    fn test_infrastructure_routes_are_not_forwarded() {
        assert_eq!(EventRoute::OutgoingEvent.into_transport_event(), None);
        assert_eq!(
            EventRoute::InfrastructureEvent("PingResp".to_string()).into_transport_event(),
            None
        );
    }

    #[test]
    fn test_session_ending_routes() {
        assert!(EventRoute::Disconnected {
            reason: "ServerShuttingDown".to_string()
        }
        .ends_session());
        assert!(EventRoute::ConnectionRefused("Banned".to_string()).ends_session());
        assert!(!EventRoute::ConnectionAcknowledged.ends_session());
        assert!(!EventRoute::PublishAcknowledged { pkid: 1 }.ends_session());
    }

    #[test]
    fn test_message_received_keeps_payload() {
        let event = EventRoute::MessageReceived {
            topic: "device/data".to_string(),
            payload: Bytes::from_static(b"{}"),
        }
        .into_transport_event();

        assert_eq!(
            event,
            Some(TransportEvent::MessageReceived {
                topic: "device/data".to_string(),
                payload: Bytes::from_static(b"{}"),
            })
        );
    }
}
