//! # MQTT link
//!
//! One client connection per bridge, owned by a single event loop task:
//!
//! ```text
//! mqtt/
//! ├── config.rs           - Broker address, client id, credentials
//! ├── message_manager.rs  - Outgoing message representation
//! └── mqtt_handler.rs     - Event loop, connection state, display routing
//! ```
//!
//! ## Data Flow
//!
//! ```text
//! SensorPublisher ──┐                          ┌─→ <sensor.topic>/<id>
//!                   ├─→ MqttHandle ─→ broker ──┼─→ <control.topic>/<id>
//! ControlPublisher ─┘                          │
//! DisplayWorker ←─[DisplayCommand]── handler ←─┴── <display.topic>/<id>
//! ```
//!
//! Connection state is published through a `watch` channel; publishers skip
//! their messages while it reads `Disconnected`. Reconnection is driven by
//! polling the event loop again after `reconnect_delay`.

pub mod config;
pub mod message_manager;
pub mod mqtt_handler;
