//! The telemetry loop
//!
//! Each tick makes sure the broker link is up, samples every sensor, builds a
//! timestamped message and publishes it through the connection manager. A
//! failing tick is logged and skipped; nothing inside a tick ends the loop.

use super::sampler::SensorSampler;
use crate::connection::{Ack, ConnectionManager, Sleeper};
use crate::error::{sanitize_error_message, DeviceResult};
use crate::protocol::TelemetryMessage;
use crate::transport::Transport;
use chrono::Utc;
use rand::Rng;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn, Instrument};

/// Per-loop counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub ticks: u64,
    pub published: u64,
    pub failed: u64,
}

/// Publishes one telemetry message per interval
pub struct TelemetryLoop<T: Transport, S: Sleeper, R: Rng> {
    device_id: String,
    publish_topic: String,
    interval: Duration,
    sampler: SensorSampler<R>,
    manager: ConnectionManager<T, S>,
    stats: LoopStats,
}

impl<T: Transport, S: Sleeper, R: Rng> TelemetryLoop<T, S, R> {
    /// Create a loop publishing to the manager's configured topic
    pub fn new(
        device_id: impl Into<String>,
        interval: Duration,
        sampler: SensorSampler<R>,
        manager: ConnectionManager<T, S>,
    ) -> Self {
        let publish_topic = manager.settings().publish_topic.clone();
        Self {
            device_id: device_id.into(),
            publish_topic,
            interval,
            sampler,
            manager,
            stats: LoopStats::default(),
        }
    }

    /// Run one iteration: reconnect if needed, sample, publish
    pub async fn tick(&mut self) -> DeviceResult<Ack> {
        self.stats.ticks += 1;
        let span = crate::telemetry_span!(tick = self.stats.ticks);

        let result: DeviceResult<Ack> = async {
            self.manager.ensure_connected().await;

            let readings = self.sampler.sample();
            let message = TelemetryMessage::from_readings(&self.device_id, Utc::now(), readings);

            self.manager
                .publish(&self.publish_topic, &message)
                .await
                .map_err(Into::into)
        }
        .instrument(span)
        .await;

        match &result {
            Ok(ack) => {
                self.stats.published += 1;
                debug!(message_id = ack.message_id, topic = %self.publish_topic, "Telemetry published");
            }
            Err(_) => self.stats.failed += 1,
        }
        result
    }

    /// Tick, log failures, wait the interval, forever
    pub async fn run_forever(&mut self) {
        info!(
            device_id = %self.device_id,
            interval_ms = self.interval.as_millis() as u64,
            sensors = self.sampler.specs().len(),
            "Starting telemetry loop"
        );
        loop {
            self.log_tick_result().await;
            self.manager.sleeper().sleep(self.interval).await;
        }
    }

    /// Like [`run_forever`](Self::run_forever) but stops once `shutdown` is
    /// set to true or its sender is dropped
    ///
    /// A tick in progress (including a reconnect backoff) is abandoned when
    /// the signal arrives.
    pub async fn run_until(&mut self, mut shutdown: watch::Receiver<bool>) -> LoopStats {
        info!(
            device_id = %self.device_id,
            interval_ms = self.interval.as_millis() as u64,
            sensors = self.sampler.specs().len(),
            "Starting telemetry loop"
        );

        while !*shutdown.borrow() {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                _ = self.log_tick_result() => {}
            }

            let interval = self.interval;
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = self.manager.sleeper().sleep(interval) => {}
            }
        }

        info!(
            ticks = self.stats.ticks,
            published = self.stats.published,
            failed = self.stats.failed,
            "Telemetry loop stopped"
        );
        self.stats
    }

    async fn log_tick_result(&mut self) {
        if let Err(e) = self.tick().await {
            warn!(
                error = %sanitize_error_message(&e.to_string()),
                connection_loss = e.is_connection_loss(),
                "Telemetry tick failed"
            );
        }
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    pub fn manager(&self) -> &ConnectionManager<T, S> {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut ConnectionManager<T, S> {
        &mut self.manager
    }

    /// Stop the loop and hand back the connection manager
    pub fn into_manager(self) -> ConnectionManager<T, S> {
        self.manager
    }
}
