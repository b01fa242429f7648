use std::time::Duration;

use chrono::{DateTime, Local};
use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Outgoing,
    Packet, Publish, QoS,
};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::message_manager::MqttMessage;
use crate::config::BridgeConfig;
use crate::display::command::{DisplayActions, DisplayCommand, DisplayCommandError};

/// Capacity of the request channel between client handles and the event loop
const REQUEST_CAPACITY: usize = 64;

/// Upper bound for flushing the DISCONNECT packet on shutdown
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected,
}

#[derive(Debug, thiserror::Error)]
pub enum MqttError {
    #[error("Failed to serialize payload: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to queue MQTT request: {0}")]
    Client(#[from] rumqttc::ClientError),
}

#[derive(Clone, Debug, Default)]
pub struct MqttStatus {
    pub connection_state: ConnectionState,
    pub messages_received: usize,
    pub messages_dropped: usize,
    pub last_activity: Option<DateTime<Local>>,
}

/// Cloneable publishing side of the MQTT link.
///
/// Messages published while the broker connection is down are dropped, the
/// same way readings taken before the first CONNACK are never sent.
#[derive(Clone)]
pub struct MqttHandle {
    client: AsyncClient,
    state: watch::Receiver<ConnectionState>,
}

impl MqttHandle {
    /// Creates the client and spawns the event loop task.
    ///
    /// Valid display commands received on the display topic are forwarded to
    /// `display_sender`. The task disconnects cleanly once `cancel` fires.
    pub fn spawn(
        config: &BridgeConfig,
        display_sender: mpsc::Sender<DisplayCommand>,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<MqttStatus>) {
        let (host, port) = config.mqtt.broker_address();
        info!("Connecting to MQTT broker {}:{} as {}", host, port, config.mqtt.id);

        let mut mqtt_options = MqttOptions::new(config.mqtt.id.clone(), host, port);
        mqtt_options.set_keep_alive(config.mqtt.keep_alive());
        if let (Some(user), Some(pw)) = (&config.mqtt.username, &config.mqtt.password) {
            mqtt_options.set_credentials(user.clone(), pw.clone());
        }

        let (client, eventloop) = AsyncClient::new(mqtt_options, REQUEST_CAPACITY);
        let (state_sender, state) = watch::channel(ConnectionState::Disconnected);

        let handler = MqttHandler {
            status: MqttStatus::default(),
            client: client.clone(),
            eventloop,
            state_sender,
            display_topic: config.display_topic(),
            actions: config.display.actions(),
            display_sender,
            reconnect_delay: config.mqtt.reconnect_delay(),
        };
        let task = tokio::spawn(handler.run(cancel));

        (MqttHandle { client, state }, task)
    }

    pub fn is_connected(&self) -> bool {
        *self.state.borrow() == ConnectionState::Connected
    }

    /// Serializes `content` and publishes it with QoS 0.
    ///
    /// Returns `Ok(false)` when the link is down and nothing was sent.
    pub async fn publish_json<T: Serialize>(
        &self,
        topic: &str,
        content: &T,
    ) -> Result<bool, MqttError> {
        if !self.is_connected() {
            debug!("Not connected, dropping message for {}", topic);
            return Ok(false);
        }
        let msg = MqttMessage::json(topic, content)?;
        debug!("Publishing {}", msg);
        self.client
            .publish(msg.topic, QoS::AtMostOnce, false, msg.payload)
            .await?;
        Ok(true)
    }
}

struct MqttHandler {
    status: MqttStatus,
    client: AsyncClient,
    eventloop: EventLoop,
    state_sender: watch::Sender<ConnectionState>,
    display_topic: String,
    actions: DisplayActions,
    display_sender: mpsc::Sender<DisplayCommand>,
    reconnect_delay: Duration,
}

impl MqttHandler {
    async fn run(mut self, cancel: CancellationToken) -> MqttStatus {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Disconnecting from MQTT broker");
                    self.shutdown().await;
                    break;
                }
                polled = self.eventloop.poll() => match polled {
                    Ok(event) => self.handle_event(event),
                    Err(e) => {
                        self.handle_connection_error(e);
                        tokio::select! {
                            _ = cancel.cancelled() => {}
                            _ = tokio::time::sleep(self.reconnect_delay) => {}
                        }
                    }
                }
            }
        }

        self.set_state(ConnectionState::Disconnected);
        info!(
            "MQTT event loop stopped ({} messages received, {} dropped)",
            self.status.messages_received, self.status.messages_dropped
        );
        self.status
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Incoming(Packet::ConnAck(ack)) => {
                if ack.code == ConnectReturnCode::Success {
                    info!("Connected to MQTT broker");
                    self.set_state(ConnectionState::Connected);
                    match self
                        .client
                        .try_subscribe(self.display_topic.clone(), QoS::AtMostOnce)
                    {
                        Ok(()) => info!("Subscribed to {}", self.display_topic),
                        Err(e) => error!("Failed to subscribe to {}: {}", self.display_topic, e),
                    }
                } else {
                    error!("MQTT broker connection error: {:?}", ack.code);
                    self.set_state(ConnectionState::Disconnected);
                }
            }
            Event::Incoming(Packet::Publish(publish)) => {
                self.status.messages_received += 1;
                self.status.last_activity = Some(Local::now());
                self.handle_publish(publish);
            }
            Event::Incoming(Packet::Disconnect) => {
                warn!("Broker closed the MQTT session");
                self.set_state(ConnectionState::Disconnected);
            }
            Event::Incoming(packet) => debug!("Incoming packet: {:?}", packet),
            Event::Outgoing(Outgoing::PingReq) => {}
            Event::Outgoing(outgoing) => debug!("Outgoing: {:?}", outgoing),
        }
    }

    fn handle_publish(&mut self, publish: Publish) {
        debug!(
            "Received MQTT message on topic {}: {}",
            publish.topic,
            String::from_utf8_lossy(&publish.payload)
        );
        let Some(command) = self.interpret(&publish.topic, &publish.payload) else {
            return;
        };

        match self.display_sender.try_send(command) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(command)) => {
                self.status.messages_dropped += 1;
                warn!("Display is busy, dropping command {:?}", command);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.status.messages_dropped += 1;
                debug!("Display worker stopped, ignoring command");
            }
        }
    }

    /// Maps a received message to a display command, logging why it was
    /// rejected otherwise.
    fn interpret(&self, topic: &str, payload: &[u8]) -> Option<DisplayCommand> {
        if topic != self.display_topic {
            debug!("Ignoring message on unexpected topic {}", topic);
            return None;
        }

        match DisplayCommand::parse(payload, &self.actions) {
            Ok(command) => Some(command),
            Err(DisplayCommandError::UnknownAction(action)) => {
                info!("Unknown display action specified: {}", action);
                None
            }
            Err(e) => {
                warn!("{} on topic {}: {}", e, topic, String::from_utf8_lossy(payload));
                None
            }
        }
    }

    fn handle_connection_error(&mut self, e: ConnectionError) {
        let was_connected = self.status.connection_state == ConnectionState::Connected;
        self.set_state(ConnectionState::Disconnected);
        match e {
            ConnectionError::ConnectionRefused(code) => {
                error!("MQTT broker connection error: {:?}", code)
            }
            other if was_connected => warn!("Disconnected from MQTT broker: {}", other),
            other => debug!("MQTT broker not reachable: {}", other),
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        self.status.connection_state = state;
        self.state_sender.send_replace(state);
    }

    async fn shutdown(&mut self) {
        if self.status.connection_state != ConnectionState::Connected {
            return;
        }
        if let Err(e) = self.client.try_disconnect() {
            warn!("Failed to queue MQTT disconnect: {}", e);
            return;
        }

        let flush = async {
            loop {
                match self.eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        };
        if tokio::time::timeout(DISCONNECT_TIMEOUT, flush).await.is_err() {
            warn!("Timed out waiting for MQTT disconnect");
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::display::led_matrix::Rgb;
    use rumqttc::ConnAck;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    pub(crate) const CONNECT: u8 = 0x10;
    pub(crate) const PUBLISH: u8 = 0x30;
    pub(crate) const SUBSCRIBE: u8 = 0x82;

    /// Loopback broker speaking just enough MQTT to accept one client.
    pub(crate) struct FakeBroker {
        listener: TcpListener,
    }

    impl FakeBroker {
        pub async fn bind() -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            Self { listener }
        }

        pub fn address(&self) -> String {
            self.listener.local_addr().unwrap().to_string()
        }

        /// Accepts the client and answers its CONNECT with a successful CONNACK.
        pub async fn accept(&self) -> TcpStream {
            let accept = self.listener.accept();
            let (mut stream, _) = tokio::time::timeout(Duration::from_secs(5), accept)
                .await
                .unwrap()
                .unwrap();
            let (header, _) = read_packet(&mut stream).await;
            assert_eq!(header, CONNECT);
            stream.write_all(&[0x20, 0x02, 0x00, 0x00]).await.unwrap();
            stream
        }
    }

    /// Reads one control packet as `(fixed header, body)`.
    pub(crate) async fn read_packet(stream: &mut TcpStream) -> (u8, Vec<u8>) {
        let read = async {
            let header = stream.read_u8().await.unwrap();
            let mut length = 0usize;
            let mut shift = 0;
            loop {
                let byte = stream.read_u8().await.unwrap();
                length |= ((byte & 0x7F) as usize) << shift;
                if byte & 0x80 == 0 {
                    break;
                }
                shift += 7;
            }
            let mut body = vec![0u8; length];
            stream.read_exact(&mut body).await.unwrap();
            (header, body)
        };
        tokio::time::timeout(Duration::from_secs(5), read).await.unwrap()
    }

    /// Splits a QoS 0 PUBLISH body into topic and payload.
    pub(crate) fn split_publish(body: &[u8]) -> (String, Vec<u8>) {
        let topic_len = u16::from_be_bytes([body[0], body[1]]) as usize;
        let topic = String::from_utf8(body[2..2 + topic_len].to_vec()).unwrap();
        (topic, body[2 + topic_len..].to_vec())
    }

    fn handler(display_sender: mpsc::Sender<DisplayCommand>) -> (MqttHandler, MqttHandle) {
        let mut config = BridgeConfig::default();
        config.mqtt.id = "pi-01".to_string();

        let (client, eventloop) =
            AsyncClient::new(MqttOptions::new("pi-01", "localhost", 1883), 10);
        let (state_sender, state) = watch::channel(ConnectionState::Disconnected);
        let handler = MqttHandler {
            status: MqttStatus::default(),
            client: client.clone(),
            eventloop,
            state_sender,
            display_topic: config.display_topic(),
            actions: config.display.actions(),
            display_sender,
            reconnect_delay: Duration::from_millis(10),
        };
        (handler, MqttHandle { client, state })
    }

    fn publish(topic: &str, payload: &str) -> Event {
        Event::Incoming(Packet::Publish(Publish::new(
            topic,
            QoS::AtMostOnce,
            payload.as_bytes().to_vec(),
        )))
    }

    #[tokio::test]
    async fn connack_marks_link_connected() {
        let (tx, _rx) = mpsc::channel(4);
        let (mut handler, handle) = handler(tx);
        assert!(!handle.is_connected());

        handler.handle_event(Event::Incoming(Packet::ConnAck(ConnAck::new(
            ConnectReturnCode::Success,
            false,
        ))));
        assert!(handle.is_connected());

        handler.handle_connection_error(ConnectionError::RequestsDone);
        assert!(!handle.is_connected());
    }

    #[tokio::test]
    async fn connack_subscribes_to_display_topic() {
        let broker = FakeBroker::bind().await;
        let mut config = BridgeConfig::default();
        config.mqtt.id = "pi-01".to_string();
        config.mqtt.broker = broker.address();
        let cancel = CancellationToken::new();
        let (tx, _rx) = mpsc::channel(4);

        let (handle, task) = MqttHandle::spawn(&config, tx, cancel.clone());
        let mut stream = broker.accept().await;

        let (header, body) = read_packet(&mut stream).await;
        assert_eq!(header, SUBSCRIBE);
        let topic = b"display/pi-01";
        assert!(body.windows(topic.len()).any(|w| w == topic));
        assert!(handle.is_connected());

        cancel.cancel();
        let status = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(status.connection_state, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn refused_connack_keeps_link_down() {
        let (tx, _rx) = mpsc::channel(4);
        let (mut handler, handle) = handler(tx);
        handler.handle_event(Event::Incoming(Packet::ConnAck(ConnAck::new(
            ConnectReturnCode::NotAuthorized,
            false,
        ))));
        assert!(!handle.is_connected());
    }

    #[tokio::test]
    async fn publishing_while_disconnected_is_dropped() {
        let (tx, _rx) = mpsc::channel(4);
        let (_handler, handle) = handler(tx);
        let sent = handle
            .publish_json("sensor/pi-01", &serde_json::json!({"id": "pi-01"}))
            .await
            .unwrap();
        assert!(!sent);
    }

    #[tokio::test]
    async fn display_messages_are_forwarded() {
        let (tx, mut rx) = mpsc::channel(4);
        let (mut handler, _handle) = handler(tx);

        handler.handle_event(publish(
            "display/pi-01",
            r#"{"action": "draw", "x": 1, "y": 2, "color": [255, 0, 0]}"#,
        ));

        assert_eq!(
            rx.try_recv().unwrap(),
            DisplayCommand::Draw {
                x: 1,
                y: 2,
                color: Rgb::new(255, 0, 0)
            }
        );
        assert_eq!(handler.status.messages_received, 1);
    }

    #[tokio::test]
    async fn invalid_or_foreign_messages_are_not_forwarded() {
        let (tx, mut rx) = mpsc::channel(4);
        let (mut handler, _handle) = handler(tx);

        handler.handle_event(publish("display/other", r#"{"action": "clear"}"#));
        handler.handle_event(publish("display/pi-01", "not json"));
        handler.handle_event(publish("display/pi-01", r#"{"action": "dance"}"#));
        handler.handle_event(publish("display/pi-01", r#"{"text": "hi"}"#));

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_display_queue_drops_commands() {
        let (tx, mut rx) = mpsc::channel(1);
        let (mut handler, _handle) = handler(tx);

        handler.handle_event(publish("display/pi-01", r#"{"action": "clear"}"#));
        handler.handle_event(publish("display/pi-01", r#"{"action": "clear"}"#));

        assert_eq!(handler.status.messages_dropped, 1);
        assert_eq!(rx.try_recv().unwrap(), DisplayCommand::Clear);
        assert!(rx.try_recv().is_err());
    }
}
