use std::path::PathBuf;

use statum::{machine, state};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::input_event::{RawInputEvent, INPUT_EVENT_SIZE};
use super::{JoystickError, JoystickEvent};

#[state]
#[derive(Debug, Clone)]
pub enum CollectionState {
    Initializing,
    Collecting,
}

#[machine]
#[derive(Debug)]
pub struct JoystickCollector<S: CollectionState> {
    // Event device, None when no joystick is attached
    device: Option<PathBuf>,

    // Opened during initialisation
    file: Option<File>,

    event_sender: mpsc::Sender<JoystickEvent>,
}

impl<S: CollectionState> JoystickCollector<S> {
    pub fn device(&self) -> Option<&PathBuf> {
        self.device.as_ref()
    }
}

impl JoystickCollector<Initializing> {
    pub fn create(device: Option<PathBuf>, event_sender: mpsc::Sender<JoystickEvent>) -> Self {
        debug!("Creating joystick collector for {:?}", device);
        Self::new(device, None, event_sender)
    }

    pub async fn initialize(mut self) -> Result<JoystickCollector<Collecting>, JoystickError> {
        match &self.device {
            Some(path) => {
                let file = File::open(path).await.map_err(|source| JoystickError::Open {
                    path: path.clone(),
                    source,
                })?;
                info!("Opened joystick device {}", path.display());
                self.file = Some(file);
            }
            None => warn!("No joystick connected, continuing in idle mode"),
        }

        info!("Joystick collector initialized, transitioning to Collecting state");
        Ok(self.transition())
    }
}

impl JoystickCollector<Collecting> {
    /// Reads the next record and forwards it if it is a joystick key event.
    async fn collect_next_event(&mut self, file: &mut File) -> Result<(), JoystickError> {
        let mut buf = [0u8; INPUT_EVENT_SIZE];
        file.read_exact(&mut buf).await?;

        let raw = RawInputEvent::decode(&buf);
        let Some(event) = raw.to_joystick_event() else {
            return Ok(());
        };

        debug!("Joystick {:?} {:?}", event.direction, event.action);
        match self.event_sender.try_send(event) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Joystick event queue full, dropping event");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(JoystickError::ChannelClosed),
        }
    }

    /// Runs until cancelled or the device goes away.
    pub async fn run_collection_loop(
        &mut self,
        cancel: CancellationToken,
    ) -> Result<(), JoystickError> {
        let Some(mut file) = self.file.take() else {
            cancel.cancelled().await;
            return Ok(());
        };

        info!("Starting joystick collection loop on {:?}", self.device());
        let mut event_count = 0usize;
        let result = loop {
            tokio::select! {
                _ = cancel.cancelled() => break Ok(()),
                result = self.collect_next_event(&mut file) => {
                    if let Err(e) = result {
                        break Err(e);
                    }
                    event_count += 1;
                }
            }
        };
        debug!("Joystick collector read {} records", event_count);
        result
    }
}

pub struct CollectorHandle;

impl CollectorHandle {
    pub fn spawn(
        device: Option<PathBuf>,
        event_sender: mpsc::Sender<JoystickEvent>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let collector = JoystickCollector::create(device, event_sender);
        tokio::spawn(async move {
            match collector.initialize().await {
                Ok(mut collecting) => {
                    if let Err(e) = collecting.run_collection_loop(cancel).await {
                        error!("Joystick collector terminated with error: {}", e);
                    } else {
                        debug!("Joystick collector stopped");
                    }
                }
                Err(e) => error!("Failed to initialize joystick collector: {}", e),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::input_event::tests::{encode, EV_SYN};
    use super::super::input_event::{EV_KEY, KEY_ENTER, KEY_UP};
    use super::super::{Direction, KeyAction};
    use super::*;
    use std::time::Duration;

    fn event_file(name: &str, records: &[[u8; INPUT_EVENT_SIZE]]) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "sensebridge-joystick-{}-{}",
            name,
            std::process::id()
        ));
        std::fs::write(&path, records.concat()).unwrap();
        path
    }

    #[tokio::test]
    async fn forwards_key_events_until_end_of_device() {
        let path = event_file(
            "forward",
            &[
                encode(10, 0, EV_KEY, KEY_UP, 1),
                encode(10, 0, EV_SYN, 0, 0),
                encode(10, 250_000, EV_KEY, KEY_UP, 0),
                encode(11, 0, EV_KEY, KEY_ENTER, 2),
            ],
        );
        let (sender, mut receiver) = mpsc::channel(10);

        let collector = JoystickCollector::create(Some(path.clone()), sender);
        let mut collecting = collector.initialize().await.unwrap();
        let result = collecting.run_collection_loop(CancellationToken::new()).await;
        assert!(matches!(result, Err(JoystickError::Read(_))));

        let first = receiver.recv().await.unwrap();
        assert_eq!(first.direction, Direction::Up);
        assert_eq!(first.action, KeyAction::Pressed);
        assert_eq!(first.timestamp, 10.0);

        let second = receiver.recv().await.unwrap();
        assert_eq!(second.action, KeyAction::Released);
        assert_eq!(second.timestamp, 10.25);

        let third = receiver.recv().await.unwrap();
        assert_eq!(third.direction, Direction::Middle);
        assert_eq!(third.action, KeyAction::Held);

        assert!(receiver.try_recv().is_err());
        std::fs::remove_file(path).unwrap();
    }

    #[tokio::test]
    async fn missing_device_fails_initialization() {
        let (sender, _receiver) = mpsc::channel(1);
        let path = std::env::temp_dir().join("sensebridge-joystick-does-not-exist");
        let collector = JoystickCollector::create(Some(path), sender);
        assert!(matches!(
            collector.initialize().await,
            Err(JoystickError::Open { .. })
        ));
    }

    #[tokio::test]
    async fn idles_without_device_until_cancelled() {
        let (sender, _receiver) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let task = CollectorHandle::spawn(None, sender, cancel.clone());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!task.is_finished());

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
