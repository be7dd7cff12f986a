//! Simulated MQTT telemetry device - Main Entry Point

use clap::{Parser, Subcommand};
use device_sim::config::{
    load_sensor_config, require_value, BrokerSection, ConfigError, DeviceConfig, DeviceSection,
    RetrySection, TopicSection, DEFAULT_BROKER, DEFAULT_DEVICE_ID, DEFAULT_PORT,
    DEFAULT_PUBLISH_TOPIC, DEFAULT_SENSOR_CONFIG, DEFAULT_SUBSCRIBE_TOPIC,
};
use device_sim::connection::{ConnectionManager, TokioSleeper};
use device_sim::error::{DeviceError, DeviceResult};
use device_sim::observability::init_default_logging;
use device_sim::telemetry::{SensorSampler, TelemetryLoop};
use device_sim::transport::mqtt::MqttTransport;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use std::process;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn, Instrument};

/// Simulated IoT device publishing random sensor readings over MQTT
#[derive(Parser, Debug)]
#[command(name = "device-sim")]
#[command(about = "Simulated MQTT telemetry device with reconnect-with-backoff")]
#[command(version)]
struct Cli {
    /// Broker host name or mqtt:// / mqtts:// URL
    #[arg(long, env = "MQTT_BROKER", default_value = DEFAULT_BROKER)]
    broker: String,

    /// Broker port (ignored when the broker URL carries one)
    #[arg(long, env = "MQTT_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Topic telemetry is published to
    #[arg(long, env = "MQTT_PUBLISH_TOPIC", default_value = DEFAULT_PUBLISH_TOPIC)]
    publish_topic: String,

    /// Topic filter subscribed after every connect
    #[arg(long, env = "MQTT_SUBSCRIBE_TOPIC", default_value = DEFAULT_SUBSCRIBE_TOPIC)]
    subscribe_topic: String,

    #[arg(long, env = "MQTT_USERNAME")]
    username: Option<String>,

    #[arg(long, env = "MQTT_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[arg(long, env = "DEVICE_ID", default_value = DEFAULT_DEVICE_ID)]
    device_id: String,

    /// Sensor description file (JSON array, or TOML with [[sensors]])
    #[arg(long, env = "SENSOR_CONFIG", default_value = DEFAULT_SENSOR_CONFIG)]
    sensor_config: PathBuf,

    /// Interval between telemetry messages
    #[arg(long, env = "PUBLISH_INTERVAL_MS", default_value_t = 1_000)]
    interval_ms: u64,

    #[arg(long, default_value_t = 1_000)]
    backoff_floor_ms: u64,

    #[arg(long, default_value_t = 60_000)]
    backoff_cap_ms: u64,

    #[arg(long, default_value_t = 10_000)]
    connect_timeout_ms: u64,

    #[arg(long, default_value_t = 5_000)]
    ack_timeout_ms: u64,

    #[arg(long, default_value_t = 60)]
    keep_alive_secs: u64,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Publish telemetry until interrupted (default)
    Run,
    /// Validate configuration
    Config {
        /// Print the resolved configuration with the password redacted
        #[arg(long)]
        show: bool,
    },
}

impl Cli {
    /// Assemble and validate the device configuration
    fn into_config(self) -> Result<DeviceConfig, ConfigError> {
        let username = require_value(self.username, "MQTT_USERNAME")?;
        let password = require_value(self.password, "MQTT_PASSWORD")?;

        info!("Loading sensor configuration from: {}", self.sensor_config.display());
        let sensors = load_sensor_config(&self.sensor_config)?;

        let config = DeviceConfig {
            device: DeviceSection {
                id: self.device_id,
                publish_interval_ms: self.interval_ms,
            },
            broker: BrokerSection {
                host: self.broker,
                port: self.port,
                username,
                password,
                keep_alive_secs: self.keep_alive_secs,
            },
            topics: TopicSection {
                publish: self.publish_topic,
                subscribe: self.subscribe_topic,
            },
            retry: RetrySection {
                backoff_floor_ms: self.backoff_floor_ms,
                backoff_cap_ms: self.backoff_cap_ms,
                connect_timeout_ms: self.connect_timeout_ms,
                ack_timeout_ms: self.ack_timeout_ms,
            },
            sensors,
        };

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() {
    let mut cli = Cli::parse();

    init_default_logging();

    info!("Starting device simulator v{}", env!("CARGO_PKG_VERSION"));

    let command = cli.command.take().unwrap_or(Commands::Run);

    let config = match cli.into_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match command {
        Commands::Run => run_device(config).await,
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Application shutdown complete");
}

async fn run_device(config: DeviceConfig) -> DeviceResult<()> {
    info!(
        device_id = %config.device.id,
        broker = %config.broker.host,
        port = config.broker.port,
        topic = %config.topics.publish,
        "Device starting"
    );

    if config.sensors.is_empty() {
        warn!("No sensors configured; telemetry messages will carry no readings");
    }

    let sampler = SensorSampler::new(config.sensors.clone(), StdRng::from_entropy())?;
    let (transport, events) = MqttTransport::new(&config.device.id, &config.broker)?;
    let manager = ConnectionManager::new(
        config.connection_settings(),
        transport,
        events,
        TokioSleeper,
    );
    let mut telemetry = TelemetryLoop::new(
        config.device.id.clone(),
        config.publish_interval(),
        sampler,
        manager,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())
        .map_err(|e| DeviceError::internal(format!("failed to install SIGINT handler: {e}")))?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
        .map_err(|e| DeviceError::internal(format!("failed to install SIGTERM handler: {e}")))?;

    tokio::spawn(async move {
        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down gracefully...");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down gracefully...");
            }
        }
        shutdown_tx.send_replace(true);
    });

    // Initial connection happens before the first tick
    let mut startup_shutdown = shutdown_rx.clone();
    let span =
        device_sim::connection_span!(phase = "initial_connect", broker = %config.broker.host);
    tokio::select! {
        _ = telemetry.manager_mut().connect_with_retry().instrument(span) => {}
        _ = startup_shutdown.changed() => {
            info!("Shutdown requested before the first connection");
            return Ok(());
        }
    }

    telemetry.run_until(shutdown_rx).await;

    let stats = telemetry.manager().stats().clone();
    info!(
        connect_attempts = stats.connect_attempts,
        failed_attempts = stats.failed_attempts,
        disconnects = stats.disconnects,
        acknowledged = stats.acknowledged_publishes,
        "Connection statistics"
    );

    telemetry.manager_mut().disconnect().await?;
    Ok(())
}

fn handle_config_command(config: &DeviceConfig, show: bool) -> DeviceResult<()> {
    if show {
        let rendered = toml::to_string_pretty(&config.redacted())
            .map_err(|e| DeviceError::internal(format!("failed to render configuration: {e}")))?;
        println!("Current configuration:");
        println!("{rendered}");
    }

    info!("Configuration validation complete");
    Ok(())
}
