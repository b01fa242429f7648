//! Outgoing JSON payloads
//!
//! Both shapes are flat objects carrying the client id and a Unix timestamp
//! in fractional seconds.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::joystick::{Direction, JoystickEvent, KeyAction};
use crate::sensors::Environment;

/// Published on `<sensor.topic>/<id>` every publish interval.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct SensorReading {
    pub id: String,
    pub timestamp: f64,
    pub humidity: f64,
    pub temp_c: f64,
    /// Barometric pressure in hPa (mbar), e.g. 1013.25 at sea level
    pub press_hpa: f64,
}

impl SensorReading {
    pub fn new(id: &str, environment: &Environment, at: DateTime<Utc>) -> Self {
        Self {
            id: id.to_string(),
            timestamp: unix_seconds(at),
            humidity: environment.humidity,
            temp_c: environment.temp_c,
            press_hpa: environment.press_hpa,
        }
    }
}

/// Published on `<control.topic>/<id>` for every joystick event.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ControlEvent {
    pub id: String,
    pub timestamp: f64,
    pub direction: Direction,
    pub action: KeyAction,
}

impl ControlEvent {
    pub fn new(id: &str, event: &JoystickEvent) -> Self {
        Self {
            id: id.to_string(),
            timestamp: event.timestamp,
            direction: event.direction,
            action: event.action,
        }
    }
}

pub fn unix_seconds(at: DateTime<Utc>) -> f64 {
    at.timestamp_micros() as f64 / 1_000_000.0
}
