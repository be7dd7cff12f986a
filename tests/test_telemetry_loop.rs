//! Telemetry loop behavior: payload contents, failure tolerance, reconnects


use chrono::DateTime;
use device_sim::protocol::{SensorSpec, TelemetryMessage};
use device_sim::testing::mocks::ConnectBehavior;
use device_sim::transport::TransportEvent;
use std::time::Duration;
use test_helpers::{secs, test_loop};
use tokio::sync::watch;

#[tokio::test]
async fn test_single_sensor_message() {
    let (mut telemetry, transport, _) = test_loop(
        "dev1",
        vec![SensorSpec::new("temp", 20.0, 25.0)],
        Duration::from_secs(1),
    );

    telemetry.tick().await.unwrap();

    let published = transport.get_published_messages().await;
    assert_eq!(published.len(), 1);
    let (topic, payload) = &published[0];
    assert_eq!(topic, "device/data");

    let json: serde_json::Value = serde_json::from_slice(payload).unwrap();
    assert_eq!(json["device_id"], "dev1");

    let sensor_data = json["sensor_data"].as_object().unwrap();
    assert_eq!(sensor_data.len(), 1);
    let temp = sensor_data["temp"].as_f64().unwrap();
    assert!((20.0..=25.0).contains(&temp));

    let timestamp = json["timestamp"].as_str().unwrap();
    assert!(timestamp.ends_with("+00:00"));
    assert!(DateTime::parse_from_rfc3339(timestamp).is_ok());
}

#[tokio::test]
async fn test_every_sensor_reported_within_bounds() {
    let sensors = vec![
        SensorSpec::new("temp", 20.0, 25.0),
        SensorSpec::new("humidity", 30.0, 60.0),
        SensorSpec::new("pressure", 990.0, 1030.0),
        SensorSpec::new("flat", 7.0, 7.0),
    ];
    let (mut telemetry, transport, _) = test_loop("dev1", sensors.clone(), Duration::from_secs(1));

    for _ in 0..25 {
        telemetry.tick().await.unwrap();
    }

    for (_, payload) in transport.get_published_messages().await {
        let message = TelemetryMessage::from_payload(&payload).unwrap();
        assert_eq!(message.sensor_data.len(), sensors.len());
        for spec in &sensors {
            assert!(spec.contains(message.sensor_data[&spec.name]));
        }
        assert_eq!(message.sensor_data["flat"], 7.0);
    }
}

#[tokio::test]
async fn test_loop_survives_consecutive_publish_failures() {
    let (mut telemetry, transport, sleeper) = test_loop(
        "dev1",
        vec![SensorSpec::new("temp", 20.0, 25.0)],
        Duration::from_millis(500),
    );
    transport.fail_publishes("request channel full").await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    sleeper.shutdown_after(100, shutdown_tx);
    let stats = telemetry.run_until(shutdown_rx).await;

    assert_eq!(stats.ticks, 100);
    assert_eq!(stats.failed, 100);
    assert_eq!(stats.published, 0);

    // Still healthy once the transport recovers
    transport.ack_publishes().await;
    assert!(telemetry.tick().await.is_ok());
}

#[tokio::test]
async fn test_tick_reconnects_after_drop() {
    let (mut telemetry, transport, sleeper) = test_loop(
        "dev1",
        vec![SensorSpec::new("temp", 20.0, 25.0)],
        Duration::from_secs(1),
    );
    telemetry.tick().await.unwrap();

    transport
        .inject_event(TransportEvent::Disconnected {
            reason: "KeepAliveTimeout".to_string(),
        })
        .await;
    transport
        .script_connects(vec![ConnectBehavior::NetworkError(
            "Connection refused".to_string(),
        )])
        .await;

    telemetry.tick().await.unwrap();

    assert_eq!(transport.connect_calls().await, 3);
    assert_eq!(sleeper.durations(), secs(&[1]));
    assert_eq!(transport.get_published_messages().await.len(), 2);
    assert_eq!(telemetry.manager().stats().disconnects, 1);
}

#[tokio::test]
async fn test_drop_during_ack_wait_fails_only_that_tick() {
    let (mut telemetry, transport, _) = test_loop(
        "dev1",
        vec![SensorSpec::new("temp", 20.0, 25.0)],
        Duration::from_secs(1),
    );
    transport.drop_on_publish("connection reset").await;

    let error = telemetry.tick().await.unwrap_err();
    assert!(error.is_connection_loss());

    transport.ack_publishes().await;
    telemetry.tick().await.unwrap();

    let stats = telemetry.stats();
    assert_eq!(stats.ticks, 2);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.published, 1);
}

#[tokio::test]
async fn test_run_forever_keeps_publishing_through_failures() {
    let (mut telemetry, transport, sleeper) = test_loop(
        "dev1",
        vec![SensorSpec::new("temp", 20.0, 25.0)],
        Duration::from_millis(250),
    );
    transport.fail_publishes("request channel full").await;

    let recovery = transport.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        recovery.ack_publishes().await;
    });

    let result = tokio::time::timeout(Duration::from_millis(100), telemetry.run_forever()).await;
    assert!(result.is_err(), "run_forever only ends when cancelled");

    let stats = telemetry.stats();
    assert!(stats.failed > 0);
    assert!(stats.published > 0);
    assert!(stats.published + stats.failed >= stats.ticks.saturating_sub(1));
    assert_eq!(transport.connect_calls().await, 1);

    let durations = sleeper.durations();
    assert!(durations.len() as u64 >= stats.ticks.saturating_sub(1));
    assert!(durations.iter().all(|d| *d == Duration::from_millis(250)));
}
