//! HTS221 relative humidity and temperature sensor.
//!
//! Raw ADC outputs are converted with the two-point factory calibration
//! stored in the device: each quantity is linearly interpolated between the
//! (raw, value) pairs read once at initialisation.

use tracing::{debug, info};

use super::{RegisterBus, SensorError, AUTO_INCREMENT};

pub const ADDRESS: u8 = 0x5F;
const DEVICE_ID: u8 = 0xBC;

const WHO_AM_I: u8 = 0x0F;
const AV_CONF: u8 = 0x10;
const CTRL_REG1: u8 = 0x20;
const STATUS_REG: u8 = 0x27;
const HUMIDITY_OUT_L: u8 = 0x28;
const CALIB_START: u8 = 0x30;

/// PD (power on) | BDU (block data update) | ODR 1 Hz
const CTRL_REG1_ACTIVE: u8 = 0x85;
/// 32 humidity / 16 temperature internal samples
const AV_CONF_DEFAULT: u8 = 0x1B;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Calibration {
    pub h0_rh: f64,
    pub h1_rh: f64,
    pub h0_out: i16,
    pub h1_out: i16,
    pub t0_deg_c: f64,
    pub t1_deg_c: f64,
    pub t0_out: i16,
    pub t1_out: i16,
}

impl Calibration {
    /// Decodes the 16 calibration registers 0x30..=0x3F.
    pub fn from_registers(regs: &[u8; 16]) -> Result<Self, SensorError> {
        let t_msb = regs[0x05];
        let t0_x8 = (((t_msb & 0x03) as u16) << 8) | regs[0x02] as u16;
        let t1_x8 = (((t_msb & 0x0C) as u16) << 6) | regs[0x03] as u16;

        let calibration = Self {
            h0_rh: regs[0x00] as f64 / 2.0,
            h1_rh: regs[0x01] as f64 / 2.0,
            t0_deg_c: t0_x8 as f64 / 8.0,
            t1_deg_c: t1_x8 as f64 / 8.0,
            h0_out: i16::from_le_bytes([regs[0x06], regs[0x07]]),
            h1_out: i16::from_le_bytes([regs[0x0A], regs[0x0B]]),
            t0_out: i16::from_le_bytes([regs[0x0C], regs[0x0D]]),
            t1_out: i16::from_le_bytes([regs[0x0E], regs[0x0F]]),
        };

        if calibration.h0_out == calibration.h1_out || calibration.t0_out == calibration.t1_out {
            return Err(SensorError::Calibration("HTS221"));
        }
        Ok(calibration)
    }

    pub fn humidity(&self, raw: i16) -> f64 {
        let rh = interpolate(raw, self.h0_out, self.h1_out, self.h0_rh, self.h1_rh);
        rh.clamp(0.0, 100.0)
    }

    pub fn temperature(&self, raw: i16) -> f64 {
        interpolate(raw, self.t0_out, self.t1_out, self.t0_deg_c, self.t1_deg_c)
    }
}

fn interpolate(raw: i16, out0: i16, out1: i16, value0: f64, value1: f64) -> f64 {
    let span = out1 as f64 - out0 as f64;
    value0 + (raw as f64 - out0 as f64) * (value1 - value0) / span
}

#[derive(Debug)]
pub struct Hts221 {
    calibration: Calibration,
}

impl Hts221 {
    pub fn init<B: RegisterBus>(bus: &mut B) -> Result<Self, SensorError> {
        super::check_identity(bus, ADDRESS, WHO_AM_I, DEVICE_ID, "HTS221")?;

        bus.write_register(ADDRESS, AV_CONF, AV_CONF_DEFAULT)?;
        bus.write_register(ADDRESS, CTRL_REG1, CTRL_REG1_ACTIVE)?;

        let mut regs = [0u8; 16];
        bus.read_registers(ADDRESS, CALIB_START | AUTO_INCREMENT, &mut regs)?;
        let calibration = Calibration::from_registers(&regs)?;
        debug!("HTS221 calibration: {:?}", calibration);
        info!("HTS221 humidity sensor initialised");

        Ok(Self { calibration })
    }

    /// Returns `(relative humidity %, temperature °C)`.
    pub fn read<B: RegisterBus>(&self, bus: &mut B) -> Result<(f64, f64), SensorError> {
        let mut status = [0u8; 1];
        bus.read_registers(ADDRESS, STATUS_REG, &mut status)?;
        if status[0] & 0x03 == 0 {
            return Err(SensorError::NotReady("HTS221"));
        }

        let mut out = [0u8; 4];
        bus.read_registers(ADDRESS, HUMIDITY_OUT_L | AUTO_INCREMENT, &mut out)?;
        let raw_humidity = i16::from_le_bytes([out[0], out[1]]);
        let raw_temperature = i16::from_le_bytes([out[2], out[3]]);

        Ok((
            self.calibration.humidity(raw_humidity),
            self.calibration.temperature(raw_temperature),
        ))
    }
}
