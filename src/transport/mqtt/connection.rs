//! Pure MQTT option building
//!
//! This module contains pure functions for broker address parsing and
//! `rumqttc` option configuration.

use crate::config::BrokerSection;
use crate::transport::TransportError;
use rumqttc::v5::MqttOptions;
use rumqttc::Transport as RumqttcTransport;
use std::time::Duration;
use url::Url;

const DEFAULT_TLS_PORT: u16 = 8883;

/// Resolved broker endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerEndpoint {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

/// Resolve the configured broker into host, port and TLS flag
///
/// A bare host name uses the configured port over plain TCP. A URL selects
/// TLS from its scheme (`mqtts`/`ssl`) and its own port when present.
pub fn parse_broker_address(host: &str, port: u16) -> Result<BrokerEndpoint, TransportError> {
    if !host.contains("://") {
        return Ok(BrokerEndpoint {
            host: host.to_string(),
            port,
            tls: false,
        });
    }

    let url =
        Url::parse(host).map_err(|_| TransportError::InvalidBrokerAddress(host.to_string()))?;

    let tls = match url.scheme() {
        "mqtt" | "tcp" => false,
        "mqtts" | "ssl" => true,
        _ => return Err(TransportError::InvalidBrokerAddress(host.to_string())),
    };

    let url_host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| TransportError::InvalidBrokerAddress(host.to_string()))?;

    let port = url
        .port()
        .unwrap_or(if tls { DEFAULT_TLS_PORT } else { port });

    Ok(BrokerEndpoint {
        host: url_host.to_string(),
        port,
        tls,
    })
}

/// Build a client identifier unique to this process start
pub fn build_client_id(device_id: &str) -> String {
    format!("{device_id}-{}", chrono::Utc::now().timestamp_millis())
}

/// Pure function to configure MQTT options from config
pub fn configure_mqtt_options(
    device_id: &str,
    broker: &BrokerSection,
) -> Result<MqttOptions, TransportError> {
    let endpoint = parse_broker_address(&broker.host, broker.port)?;

    let mut mqtt_options =
        MqttOptions::new(build_client_id(device_id), endpoint.host, endpoint.port);

    if endpoint.tls {
        mqtt_options.set_transport(RumqttcTransport::tls_with_default_config());
    }

    mqtt_options.set_credentials(broker.username.clone(), broker.password.clone());
    mqtt_options.set_keep_alive(Duration::from_secs(broker.keep_alive_secs));

    Ok(mqtt_options)
}
