//! Sense HAT joystick input
//!
//! Two tasks cooperate, the same split as any input pipeline here:
//!
//! ```text
//! /dev/input/eventN ─[input_event]→ JoystickCollector
//!                                        │
//!                          [JoystickEvent] (mpsc, bounded)
//!                                        ↓
//!                                  ControlPublisher ─→ MQTT
//! ```
//!
//! The collector is a small state machine (`Initializing` → `Collecting`).
//! Without a joystick device it stays idle until shutdown.

pub mod event_collector;
pub mod input_event;
pub mod publisher;

use std::path::PathBuf;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::mqtt::mqtt_handler::MqttHandle;
use event_collector::CollectorHandle;
use publisher::ControlPublisher;

/// Joystick events buffered between collector and publisher
const EVENT_QUEUE: usize = 100;

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
    Middle,
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum KeyAction {
    Pressed,
    Released,
    Held,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct JoystickEvent {
    /// Kernel event time, Unix seconds
    pub timestamp: f64,
    pub direction: Direction,
    pub action: KeyAction,
}

#[derive(Debug, thiserror::Error)]
pub enum JoystickError {
    #[error("Failed to open joystick device {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read joystick event: {0}")]
    Read(#[from] std::io::Error),

    #[error("Event channel closed")]
    ChannelClosed,
}

pub struct JoystickHandle {
    collector: JoinHandle<()>,
    publisher: JoinHandle<usize>,
}

impl JoystickHandle {
    /// Spawns collector and publisher.
    ///
    /// `device` is `None` when no joystick was found; the collector then idles.
    pub fn spawn(
        device: Option<PathBuf>,
        mqtt: MqttHandle,
        client_id: String,
        topic: String,
        cancel: CancellationToken,
    ) -> Self {
        let (event_sender, event_receiver) = mpsc::channel(EVENT_QUEUE);
        debug!("Created joystick event channel with capacity {}", EVENT_QUEUE);

        let collector = CollectorHandle::spawn(device, event_sender, cancel.clone());
        let publisher =
            ControlPublisher::new(event_receiver, mqtt, client_id, topic).spawn(cancel);

        info!("Joystick input started");
        Self {
            collector,
            publisher,
        }
    }

    /// Waits for both tasks to finish after cancellation.
    pub async fn join(self) -> usize {
        if let Err(e) = self.collector.await {
            error!("Joystick collector task failed: {}", e);
        }
        match self.publisher.await {
            Ok(published) => {
                info!("Published {} control events", published);
                published
            }
            Err(e) => {
                error!("Control publisher task failed: {}", e);
                0
            }
        }
    }
}
