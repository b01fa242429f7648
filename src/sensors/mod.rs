//! Environmental sensors of the Sense HAT
//!
//! Both sensors sit on the Pi's I2C bus:
//!
//! - [`hts221`] relative humidity and temperature (0x5F)
//! - [`lps25h`] barometric pressure (0x5C)
//!
//! Register access goes through [`RegisterBus`] so the drivers can be tested
//! against an in-memory register map.

pub mod hts221;
pub mod lps25h;
pub mod publisher;

use rppal::i2c::I2c;
use tracing::{debug, info};

use hts221::Hts221;
use lps25h::Lps25h;

/// Sub-address flag enabling register auto-increment on multi-byte reads
pub const AUTO_INCREMENT: u8 = 0x80;

#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    #[error("I2C error: {0}")]
    I2c(#[from] rppal::i2c::Error),

    #[error("{name} not found: expected device id {expected:#04x}, found {found:#04x}")]
    UnexpectedDevice {
        name: &'static str,
        expected: u8,
        found: u8,
    },

    #[error("{0} has no new data available")]
    NotReady(&'static str),

    #[error("{0} reports unusable calibration data")]
    Calibration(&'static str),
}

pub trait RegisterBus: Send {
    fn read_registers(&mut self, device: u8, register: u8, buf: &mut [u8])
        -> Result<(), SensorError>;

    fn write_register(&mut self, device: u8, register: u8, value: u8) -> Result<(), SensorError>;
}

/// Linux I2C bus via `/dev/i2c-N`
pub struct I2cBus {
    i2c: I2c,
    selected: Option<u8>,
}

impl I2cBus {
    pub fn open(bus: u8) -> Result<Self, SensorError> {
        let i2c = I2c::with_bus(bus)?;
        info!("Opened I2C bus {}", bus);
        Ok(Self {
            i2c,
            selected: None,
        })
    }

    fn select(&mut self, device: u8) -> Result<(), SensorError> {
        if self.selected != Some(device) {
            self.i2c.set_slave_address(device as u16)?;
            self.selected = Some(device);
        }
        Ok(())
    }
}

impl RegisterBus for I2cBus {
    fn read_registers(
        &mut self,
        device: u8,
        register: u8,
        buf: &mut [u8],
    ) -> Result<(), SensorError> {
        self.select(device)?;
        self.i2c.write_read(&[register], buf)?;
        Ok(())
    }

    fn write_register(&mut self, device: u8, register: u8, value: u8) -> Result<(), SensorError> {
        self.select(device)?;
        self.i2c.write(&[register, value])?;
        Ok(())
    }
}

fn check_identity<B: RegisterBus>(
    bus: &mut B,
    device: u8,
    register: u8,
    expected: u8,
    name: &'static str,
) -> Result<(), SensorError> {
    let mut id = [0u8; 1];
    bus.read_registers(device, register, &mut id)?;
    debug!("{} WHO_AM_I = {:#04x}", name, id[0]);
    if id[0] != expected {
        return Err(SensorError::UnexpectedDevice {
            name,
            expected,
            found: id[0],
        });
    }
    Ok(())
}

/// One set of environmental readings
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Environment {
    /// Relative humidity in percent
    pub humidity: f64,
    /// Temperature from the humidity sensor
    pub temp_c: f64,
    pub press_hpa: f64,
}

pub struct EnvironmentSensors<B: RegisterBus> {
    bus: B,
    humidity: Hts221,
    pressure: Lps25h,
}

impl<B: RegisterBus> EnvironmentSensors<B> {
    pub fn init(mut bus: B) -> Result<Self, SensorError> {
        let humidity = Hts221::init(&mut bus)?;
        let pressure = Lps25h::init(&mut bus)?;
        Ok(Self {
            bus,
            humidity,
            pressure,
        })
    }

    pub fn read(&mut self) -> Result<Environment, SensorError> {
        let (humidity, temp_c) = self.humidity.read(&mut self.bus)?;
        let press_hpa = self.pressure.read(&mut self.bus)?;
        Ok(Environment {
            humidity,
            temp_c,
            press_hpa,
        })
    }
}
