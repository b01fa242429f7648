use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{EnvironmentSensors, RegisterBus};
use crate::mqtt::mqtt_handler::MqttHandle;
use crate::telemetry::SensorReading;

/// Publishes one [`SensorReading`] per interval while the broker is connected.
pub struct SensorPublisher<B: RegisterBus> {
    sensors: EnvironmentSensors<B>,
    mqtt: MqttHandle,
    client_id: String,
    topic: String,
    interval: Duration,
}

impl<B: RegisterBus + 'static> SensorPublisher<B> {
    pub fn new(
        sensors: EnvironmentSensors<B>,
        mqtt: MqttHandle,
        client_id: String,
        topic: String,
        interval: Duration,
    ) -> Self {
        Self {
            sensors,
            mqtt,
            client_id,
            topic,
            interval,
        }
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        info!(
            "Publishing sensor data to {} every {:?}",
            self.topic, self.interval
        );
        tokio::spawn(self.run(cancel))
    }

    async fn run(mut self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick fires immediately, readings start one interval in
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.publish_once().await,
            }
        }
        debug!("Sensor publisher stopped");
    }

    async fn publish_once(&mut self) {
        if !self.mqtt.is_connected() {
            debug!("Not connected, skipping sensor reading");
            return;
        }

        let environment = match self.sensors.read() {
            Ok(environment) => environment,
            Err(e) => {
                warn!("Failed to read sensors: {}", e);
                return;
            }
        };

        let reading = SensorReading::new(&self.client_id, &environment, Utc::now());
        debug!("Sensor reading: {:?}", reading);
        if let Err(e) = self.mqtt.publish_json(&self.topic, &reading).await {
            error!("Failed to publish sensor reading: {}", e);
        }
    }
}
