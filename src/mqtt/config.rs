use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 1883;

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct MqttConfig {
    /// Client id, also used as topic suffix and in every published payload
    pub id: String,
    /// `host` or `host:port`
    pub broker: String,
    pub keep_alive_secs: u64,
    pub reconnect_delay_ms: u64,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            id: "sensebridge".to_string(),
            broker: "localhost".to_string(),
            keep_alive_secs: 60,
            reconnect_delay_ms: 1000,
            username: None,
            password: None,
        }
    }
}

impl MqttConfig {
    /// Splits `broker` into host and port, using 1883 when no port is given
    /// or the port does not parse.
    pub fn broker_address(&self) -> (String, u16) {
        let mut server_comps = self.broker.rsplitn(2, ':');
        let last = server_comps.next().unwrap_or_default();
        match (server_comps.next(), last.parse::<u16>()) {
            (Some(host), Ok(port)) => (host.to_string(), port),
            (Some(host), Err(_)) => (host.to_string(), DEFAULT_PORT),
            (None, _) => (last.to_string(), DEFAULT_PORT),
        }
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs.max(5))
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_broker(broker: &str) -> MqttConfig {
        MqttConfig {
            broker: broker.to_string(),
            ..MqttConfig::default()
        }
    }

    #[test]
    fn broker_without_port_uses_default() {
        assert_eq!(
            with_broker("mqtt.local").broker_address(),
            ("mqtt.local".to_string(), 1883)
        );
    }

    #[test]
    fn broker_with_port() {
        assert_eq!(
            with_broker("10.0.0.5:8883").broker_address(),
            ("10.0.0.5".to_string(), 8883)
        );
    }

    #[test]
    fn broker_with_garbage_port_falls_back() {
        assert_eq!(
            with_broker("host:abc").broker_address(),
            ("host".to_string(), 1883)
        );
    }

    #[test]
    fn keep_alive_has_a_floor() {
        let config = MqttConfig {
            keep_alive_secs: 1,
            ..MqttConfig::default()
        };
        assert_eq!(config.keep_alive(), Duration::from_secs(5));
    }
}
