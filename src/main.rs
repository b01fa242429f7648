pub mod config;
pub mod display;
pub mod hardware;
pub mod joystick;
pub mod mqtt;
pub mod sensors;
pub mod telemetry;

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use color_eyre::{eyre::eyre, Result};
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::config::{BridgeConfig, DEFAULT_CONFIG_FILE};
use crate::display::led_matrix::{Framebuffer, LedMatrix};
use crate::display::{DisplayError, DisplayHandle};
use crate::joystick::JoystickHandle;
use crate::mqtt::mqtt_handler::MqttHandle;
use crate::sensors::publisher::SensorPublisher;
use crate::sensors::{EnvironmentSensors, I2cBus};

const DEFAULT_LOG_FILE: &str = "sensebridge.log";

struct Args {
    conf_file: PathBuf,
    log_file: PathBuf,
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args();
    setup(&args)?;
    info!("Starting up");

    let config = BridgeConfig::load_or_default(&args.conf_file)?;
    info!("Client id {}, broker {}", config.mqtt.id, config.mqtt.broker);

    // Hardware
    let framebuffer_path = match &config.hardware.framebuffer {
        Some(path) => path.clone(),
        None => hardware::find_framebuffer(
            Path::new(hardware::SYSFS_ROOT),
            Path::new(hardware::DEV_ROOT),
        )
        .ok_or(DisplayError::NotFound)?,
    };
    let framebuffer = Framebuffer::open(&framebuffer_path)?;
    info!("Using LED matrix at {}", framebuffer.path().display());
    let mut matrix = LedMatrix::new(framebuffer);
    matrix.clear()?;

    let bus = I2cBus::open(config.hardware.i2c_bus)?;
    let sensors = EnvironmentSensors::init(bus)?;

    let joystick_path = config.hardware.joystick.clone().or_else(|| {
        hardware::find_joystick(
            Path::new(hardware::SYSFS_ROOT),
            Path::new(hardware::DEV_ROOT),
        )
    });

    // Tasks
    let cancel = CancellationToken::new();

    let (display, display_task) =
        DisplayHandle::spawn(matrix, config.display.scroll_speed(), cancel.clone());

    let (mqtt, mqtt_task) = MqttHandle::spawn(&config, display.sender(), cancel.clone());

    let joystick = JoystickHandle::spawn(
        joystick_path,
        mqtt.clone(),
        config.mqtt.id.clone(),
        config.control_topic(),
        cancel.clone(),
    );

    let sensor_task = SensorPublisher::new(
        sensors,
        mqtt,
        config.mqtt.id.clone(),
        config.sensor_topic(),
        config.publish_interval(),
    )
    .spawn(cancel.clone());

    wait_for_quit_signal().await?;
    info!("Received quit signal");
    cancel.cancel();

    if let Err(e) = sensor_task.await {
        error!("Sensor publisher task failed: {}", e);
    }
    joystick.join().await;
    match mqtt_task.await {
        Ok(status) => info!(
            "MQTT link closed after {} received messages, last at {:?}",
            status.messages_received, status.last_activity
        ),
        Err(e) => error!("MQTT task failed: {}", e),
    }
    match display_task.await {
        Ok(mut matrix) => {
            if let Err(e) = matrix.clear() {
                warn!("Failed to clear LED matrix: {}", e);
            }
        }
        Err(e) => error!("Display task failed: {}", e),
    }

    info!("Shutting down");
    Ok(())
}

async fn wait_for_quit_signal() -> Result<()> {
    let mut terminate = signal(SignalKind::terminate())
        .map_err(|e| eyre!("Failed to install SIGTERM handler: {}", e))?;
    let mut interrupt = signal(SignalKind::interrupt())
        .map_err(|e| eyre!("Failed to install SIGINT handler: {}", e))?;

    tokio::select! {
        _ = terminate.recv() => {}
        _ = interrupt.recv() => {}
    }
    Ok(())
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut result = Args {
        conf_file: PathBuf::from(DEFAULT_CONFIG_FILE),
        log_file: PathBuf::from(DEFAULT_LOG_FILE),
        debug: false,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--conf_file" | "-c" if i + 1 < args.len() => {
                result.conf_file = PathBuf::from(&args[i + 1]);
                i += 1;
            }
            "--log_file" | "-l" if i + 1 < args.len() => {
                result.log_file = PathBuf::from(&args[i + 1]);
                i += 1;
            }
            "--debug" | "-d" => result.debug = true,
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    result
}

fn print_help() {
    println!("sensebridge - Sense HAT to MQTT bridge");
    println!();
    println!("USAGE:");
    println!("    sensebridge [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -c, --conf_file <FILE>  Configuration file (default: {})", DEFAULT_CONFIG_FILE);
    println!("    -l, --log_file <FILE>   Log file (default: {})", DEFAULT_LOG_FILE);
    println!("    -d, --debug             Log at debug level to the console");
    println!("    -h, --help              Print help information");
}

fn setup(args: &Args) -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    setup_logging(args.debug, &args.log_file)
}

fn setup_logging(debug: bool, log_file: &Path) -> Result<()> {
    if debug {
        FmtSubscriber::builder()
            .with_max_level(Level::DEBUG)
            .with_target(false)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .pretty()
            .init();
        return Ok(());
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .map_err(|e| eyre!("Failed to open log file {}: {}", log_file.display(), e))?;
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
    Ok(())
}
