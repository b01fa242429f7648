use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::JoystickEvent;
use crate::mqtt::mqtt_handler::MqttHandle;
use crate::telemetry::ControlEvent;

/// Turns joystick events into control messages.
pub struct ControlPublisher {
    events: mpsc::Receiver<JoystickEvent>,
    mqtt: MqttHandle,
    client_id: String,
    topic: String,
}

impl ControlPublisher {
    pub fn new(
        events: mpsc::Receiver<JoystickEvent>,
        mqtt: MqttHandle,
        client_id: String,
        topic: String,
    ) -> Self {
        Self {
            events,
            mqtt,
            client_id,
            topic,
        }
    }

    /// Runs until cancelled or the collector hangs up; yields the number of
    /// events published.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<usize> {
        info!("Publishing joystick events to {}", self.topic);
        tokio::spawn(self.run(cancel))
    }

    async fn run(mut self, cancel: CancellationToken) -> usize {
        let mut published = 0;
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = self.events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            if self.publish(&event).await {
                published += 1;
            }
        }
        debug!("Control publisher stopped");
        published
    }

    async fn publish(&self, event: &JoystickEvent) -> bool {
        let message = ControlEvent::new(&self.client_id, event);
        match self.mqtt.publish_json(&self.topic, &message).await {
            Ok(true) => {
                info!("Joystick {:?} {:?}", event.direction, event.action);
                true
            }
            Ok(false) => {
                debug!("Not connected, dropping joystick event {:?}", event);
                false
            }
            Err(e) => {
                error!("Failed to publish joystick event: {}", e);
                false
            }
        }
    }
}
