//! LPS25H barometric pressure sensor.

use tracing::info;

use super::{RegisterBus, SensorError, AUTO_INCREMENT};

pub const ADDRESS: u8 = 0x5C;
const DEVICE_ID: u8 = 0xBD;

const WHO_AM_I: u8 = 0x0F;
const CTRL_REG1: u8 = 0x20;
const STATUS_REG: u8 = 0x27;
const PRESS_OUT_XL: u8 = 0x28;

/// PD (power on) | ODR 1 Hz
const CTRL_REG1_ACTIVE: u8 = 0x90;
/// LSB per hPa
const PRESSURE_SCALE: f64 = 4096.0;

#[derive(Debug)]
pub struct Lps25h;

impl Lps25h {
    pub fn init<B: RegisterBus>(bus: &mut B) -> Result<Self, SensorError> {
        super::check_identity(bus, ADDRESS, WHO_AM_I, DEVICE_ID, "LPS25H")?;
        bus.write_register(ADDRESS, CTRL_REG1, CTRL_REG1_ACTIVE)?;
        info!("LPS25H pressure sensor initialised");
        Ok(Self)
    }

    /// Returns the pressure in hPa.
    pub fn read<B: RegisterBus>(&self, bus: &mut B) -> Result<f64, SensorError> {
        let mut status = [0u8; 1];
        bus.read_registers(ADDRESS, STATUS_REG, &mut status)?;
        if status[0] & 0x02 == 0 {
            return Err(SensorError::NotReady("LPS25H"));
        }

        let mut out = [0u8; 3];
        bus.read_registers(ADDRESS, PRESS_OUT_XL | AUTO_INCREMENT, &mut out)?;
        Ok(pressure_hpa(out))
    }
}

/// Converts the 24-bit two's complement output to hPa.
pub fn pressure_hpa(out: [u8; 3]) -> f64 {
    // sign-extend through the top byte of an i32
    let raw = i32::from_le_bytes([0, out[0], out[1], out[2]]) >> 8;
    raw as f64 / PRESSURE_SCALE
}

#[cfg(test)]
mod tests {
    use super::super::tests::MockBus;
    use super::*;

    fn ready_bus() -> MockBus {
        let mut bus = MockBus::default();
        bus.set(ADDRESS, WHO_AM_I, &[DEVICE_ID]);
        bus.set(ADDRESS, STATUS_REG, &[0x03]);
        bus
    }

    #[test]
    fn converts_raw_counts_to_hpa() {
        // 1013.25 hPa * 4096 = 4_150_272 = 0x3F5400
        assert_eq!(pressure_hpa([0x00, 0x54, 0x3F]), 1013.25);
        assert_eq!(pressure_hpa([0x00, 0x00, 0x00]), 0.0);
        assert_eq!(pressure_hpa([0x00, 0xF0, 0xFF]), -1.0);
    }

    #[test]
    fn init_and_read() {
        let mut bus = ready_bus();
        let sensor = Lps25h::init(&mut bus).unwrap();
        assert_eq!(bus.get(ADDRESS, CTRL_REG1), CTRL_REG1_ACTIVE);

        bus.set(ADDRESS, PRESS_OUT_XL, &[0x00, 0x54, 0x3F]);
        assert_eq!(sensor.read(&mut bus).unwrap(), 1013.25);
    }

    #[test]
    fn pressure_not_available() {
        let mut bus = ready_bus();
        let sensor = Lps25h::init(&mut bus).unwrap();
        bus.set(ADDRESS, STATUS_REG, &[0x01]);
        assert!(matches!(sensor.read(&mut bus), Err(SensorError::NotReady("LPS25H"))));
    }

    #[test]
    fn wrong_device_id_is_rejected() {
        let mut bus = ready_bus();
        bus.set(ADDRESS, WHO_AM_I, &[0xBC]);
        assert!(matches!(
            Lps25h::init(&mut bus),
            Err(SensorError::UnexpectedDevice { expected: 0xBD, found: 0xBC, .. })
        ));
    }
}
