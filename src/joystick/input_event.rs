//! Decoding of Linux `struct input_event` records.
//!
//! ```text
//! struct input_event {
//!     struct timeval time;   // tv_sec, tv_usec: C long each
//!     __u16 type;
//!     __u16 code;
//!     __s32 value;
//! };
//! ```
//!
//! Records are read in native byte order and layout, so the size depends on
//! the width of `long` on the target.

use std::os::raw::c_long;

use super::{Direction, JoystickEvent, KeyAction};

const LONG: usize = std::mem::size_of::<c_long>();
pub const INPUT_EVENT_SIZE: usize = 2 * LONG + 8;

pub const EV_KEY: u16 = 0x01;

pub const KEY_ENTER: u16 = 28;
pub const KEY_UP: u16 = 103;
pub const KEY_LEFT: u16 = 105;
pub const KEY_RIGHT: u16 = 106;
pub const KEY_DOWN: u16 = 108;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawInputEvent {
    pub tv_sec: i64,
    pub tv_usec: i64,
    pub kind: u16,
    pub code: u16,
    pub value: i32,
}

impl RawInputEvent {
    pub fn decode(buf: &[u8; INPUT_EVENT_SIZE]) -> Self {
        let long_at = |offset: usize| {
            let mut bytes = [0u8; LONG];
            bytes.copy_from_slice(&buf[offset..offset + LONG]);
            c_long::from_ne_bytes(bytes) as i64
        };
        let rest = 2 * LONG;

        Self {
            tv_sec: long_at(0),
            tv_usec: long_at(LONG),
            kind: u16::from_ne_bytes([buf[rest], buf[rest + 1]]),
            code: u16::from_ne_bytes([buf[rest + 2], buf[rest + 3]]),
            value: i32::from_ne_bytes([
                buf[rest + 4],
                buf[rest + 5],
                buf[rest + 6],
                buf[rest + 7],
            ]),
        }
    }

    pub fn timestamp(&self) -> f64 {
        self.tv_sec as f64 + self.tv_usec as f64 / 1_000_000.0
    }

    /// Maps key events of the five joystick keys; everything else
    /// (sync reports, other keys, unknown values) yields `None`.
    pub fn to_joystick_event(&self) -> Option<JoystickEvent> {
        if self.kind != EV_KEY {
            return None;
        }
        let direction = match self.code {
            KEY_UP => Direction::Up,
            KEY_DOWN => Direction::Down,
            KEY_LEFT => Direction::Left,
            KEY_RIGHT => Direction::Right,
            KEY_ENTER => Direction::Middle,
            _ => return None,
        };
        let action = match self.value {
            0 => KeyAction::Released,
            1 => KeyAction::Pressed,
            2 => KeyAction::Held,
            _ => return None,
        };
        Some(JoystickEvent {
            timestamp: self.timestamp(),
            direction,
            action,
        })
    }
}
