//! LED matrix output
//!
//! Display commands arrive from the MQTT event loop and are executed one at a
//! time by a dedicated worker task:
//!
//! ```text
//! MQTT event loop ─[DisplayCommand]→ DisplayWorker ─[RGB565 frame]→ /dev/fbN
//!                  (mpsc, bounded)
//! ```
//!
//! Scrolling text takes several seconds; commands received meanwhile wait in
//! the channel and are executed afterwards.

pub mod command;
pub mod font;
pub mod led_matrix;
pub mod scroll;

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use command::DisplayCommand;
use led_matrix::{FrameSink, LedMatrix, Rgb};
use scroll::TextScroller;

/// Commands queued while text is scrolling
const COMMAND_QUEUE: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum DisplayError {
    #[error("Failed to open framebuffer {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write frame: {0}")]
    Io(#[from] std::io::Error),

    #[error("Pixel ({x}, {y}) is outside the 8x8 matrix")]
    OutOfBounds { x: usize, y: usize },

    #[error("No Sense HAT framebuffer found")]
    NotFound,
}

pub struct DisplayHandle {
    sender: mpsc::Sender<DisplayCommand>,
}

impl DisplayHandle {
    /// Spawns the display worker.
    ///
    /// The returned task hands the matrix back once the worker stops, so the
    /// caller can blank it on shutdown.
    pub fn spawn<S: FrameSink + 'static>(
        matrix: LedMatrix<S>,
        scroll_speed: Duration,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<LedMatrix<S>>) {
        let (sender, receiver) = mpsc::channel(COMMAND_QUEUE);
        let worker = DisplayWorker {
            matrix,
            receiver,
            scroll_speed,
        };
        info!("Spawning display worker (scroll step {:?})", scroll_speed);
        let task = tokio::spawn(worker.run(cancel));
        (Self { sender }, task)
    }

    pub fn sender(&self) -> mpsc::Sender<DisplayCommand> {
        self.sender.clone()
    }
}

struct DisplayWorker<S: FrameSink> {
    matrix: LedMatrix<S>,
    receiver: mpsc::Receiver<DisplayCommand>,
    scroll_speed: Duration,
}

impl<S: FrameSink> DisplayWorker<S> {
    async fn run(mut self, cancel: CancellationToken) -> LedMatrix<S> {
        loop {
            let command = tokio::select! {
                _ = cancel.cancelled() => break,
                command = self.receiver.recv() => match command {
                    Some(command) => command,
                    None => break,
                },
            };

            if let Err(e) = self.execute(command, &cancel).await {
                error!("Display command failed: {}", e);
            }
        }

        debug!("Display worker stopped");
        self.matrix
    }

    async fn execute(
        &mut self,
        command: DisplayCommand,
        cancel: &CancellationToken,
    ) -> Result<(), DisplayError> {
        match command {
            DisplayCommand::Clear => self.matrix.clear(),
            DisplayCommand::Draw { x, y, color } => {
                debug!(
                    "Drawing pixel ({}, {}) as {:?}, was {:?}",
                    x,
                    y,
                    color,
                    self.matrix.pixel(x, y)
                );
                self.matrix.set_pixel(x, y, color)?;
                let lit = self.matrix.pixels().iter().filter(|p| **p != Rgb::BLACK).count();
                debug!("{} pixels lit", lit);
                Ok(())
            }
            DisplayCommand::Text { text, color } => {
                debug!("Scrolling text {:?} in {:?}", text, color);
                self.scroll(&text, color, cancel).await
            }
        }
    }

    async fn scroll(
        &mut self,
        text: &str,
        color: Rgb,
        cancel: &CancellationToken,
    ) -> Result<(), DisplayError> {
        for frame in TextScroller::new(text, color, Rgb::BLACK) {
            self.matrix.show(&frame)?;
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Text scroll interrupted");
                    break;
                }
                _ = tokio::time::sleep(self.scroll_speed) => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::led_matrix::tests::RecordingSink;
    use super::led_matrix::{FRAME_BYTES, PIXELS};
    use super::*;

    async fn run_commands(
        commands: Vec<DisplayCommand>,
    ) -> (LedMatrix<RecordingSink>, RecordingSink) {
        let sink = RecordingSink::default();
        let matrix = LedMatrix::new(sink.clone());
        let (handle, task) =
            DisplayHandle::spawn(matrix, Duration::ZERO, CancellationToken::new());

        let sender = handle.sender();
        for command in commands {
            sender.send(command).await.unwrap();
        }
        drop(sender);
        drop(handle);

        (task.await.unwrap(), sink)
    }

    #[tokio::test]
    async fn commands_execute_in_order() {
        let (matrix, sink) = run_commands(vec![
            DisplayCommand::Draw {
                x: 0,
                y: 0,
                color: Rgb::new(255, 0, 0),
            },
            DisplayCommand::Draw {
                x: 1,
                y: 0,
                color: Rgb::new(0, 255, 0),
            },
            DisplayCommand::Clear,
            DisplayCommand::Draw {
                x: 2,
                y: 3,
                color: Rgb::new(0, 0, 255),
            },
        ])
        .await;

        assert_eq!(sink.count(), 4);
        assert_eq!(matrix.pixel(0, 0), Some(Rgb::BLACK));
        assert_eq!(matrix.pixel(1, 0), Some(Rgb::BLACK));
        assert_eq!(matrix.pixel(2, 3), Some(Rgb::new(0, 0, 255)));
    }

    #[tokio::test]
    async fn text_scrolls_every_frame_and_ends_blank() {
        let (matrix, sink) = run_commands(vec![
            DisplayCommand::Draw {
                x: 4,
                y: 4,
                color: Rgb::new(9, 9, 9),
            },
            DisplayCommand::Text {
                text: "Hi".to_string(),
                color: Rgb::new(255, 255, 0),
            },
        ])
        .await;

        assert_eq!(sink.count(), 1 + TextScroller::frame_count(2));
        assert_eq!(sink.last().unwrap(), [0u8; FRAME_BYTES]);
        assert_eq!(matrix.pixels(), &[Rgb::BLACK; PIXELS]);
    }

    #[tokio::test]
    async fn cancellation_stops_the_worker() {
        let sink = RecordingSink::default();
        let cancel = CancellationToken::new();
        let (handle, task) = DisplayHandle::spawn(
            LedMatrix::new(sink.clone()),
            Duration::from_secs(60),
            cancel.clone(),
        );

        handle
            .sender()
            .send(DisplayCommand::Text {
                text: "long".to_string(),
                color: Rgb::new(1, 1, 1),
            })
            .await
            .unwrap();
        tokio::task::yield_now().await;
        cancel.cancel();

        let matrix = task.await.unwrap();
        assert!(sink.count() <= 1);
        drop(matrix);
    }
}
