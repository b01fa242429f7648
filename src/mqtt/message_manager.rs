use serde::Serialize;
use std::fmt;

/// A payload ready to be handed to the MQTT client
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MqttMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl fmt::Display for MqttMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.topic, String::from_utf8_lossy(&self.payload))
    }
}

impl MqttMessage {
    pub fn json<T: Serialize>(topic: &str, content: &T) -> Result<Self, serde_json::Error> {
        Ok(Self {
            topic: topic.to_string(),
            payload: serde_json::to_vec(content)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Probe {
        id: &'static str,
        value: u8,
    }

    #[test]
    fn json_message_keeps_topic_and_serializes_payload() {
        let msg = MqttMessage::json("sensor/pi", &Probe { id: "pi", value: 3 }).unwrap();
        assert_eq!(msg.topic, "sensor/pi");
        assert_eq!(msg.payload, br#"{"id":"pi","value":3}"#.to_vec());
        assert_eq!(msg.to_string(), r#"sensor/pi: {"id":"pi","value":3}"#);
    }
}
