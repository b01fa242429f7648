use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::DisplayError;

pub const WIDTH: usize = 8;
pub const HEIGHT: usize = 8;
pub const PIXELS: usize = WIDTH * HEIGHT;
/// One RGB565 word per pixel
pub const FRAME_BYTES: usize = PIXELS * 2;

pub type Frame = [Rgb; PIXELS];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn to_rgb565(self) -> u16 {
        let r = (self.r as u16 >> 3) & 0x1F;
        let g = (self.g as u16 >> 2) & 0x3F;
        let b = (self.b as u16 >> 3) & 0x1F;
        (r << 11) | (g << 5) | b
    }
}

/// Destination for encoded frames
pub trait FrameSink: Send {
    fn write_frame(&mut self, frame: &[u8; FRAME_BYTES]) -> Result<(), DisplayError>;
}

/// The Sense HAT LED matrix as exposed by the `rpisense-fb` driver
#[derive(Debug)]
pub struct Framebuffer {
    file: File,
    path: PathBuf,
}

impl Framebuffer {
    pub fn open(path: &Path) -> Result<Self, DisplayError> {
        let file = OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(|source| DisplayError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        info!("Opened LED matrix framebuffer {}", path.display());
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FrameSink for Framebuffer {
    fn write_frame(&mut self, frame: &[u8; FRAME_BYTES]) -> Result<(), DisplayError> {
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(frame)?;
        self.file.flush()?;
        Ok(())
    }
}

/// In-memory copy of the 8x8 matrix, pushed to the sink after every change.
///
/// Pixels are stored row-major, `index = y * 8 + x`, with (0, 0) at the top
/// left corner.
pub struct LedMatrix<S: FrameSink> {
    sink: S,
    pixels: Frame,
}

impl<S: FrameSink> LedMatrix<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            pixels: [Rgb::BLACK; PIXELS],
        }
    }

    pub fn clear(&mut self) -> Result<(), DisplayError> {
        debug!("Clearing LED matrix");
        self.show(&[Rgb::BLACK; PIXELS])
    }

    pub fn set_pixel(&mut self, x: u8, y: u8, color: Rgb) -> Result<(), DisplayError> {
        let (x, y) = (x as usize, y as usize);
        if x >= WIDTH || y >= HEIGHT {
            return Err(DisplayError::OutOfBounds { x, y });
        }
        self.pixels[y * WIDTH + x] = color;
        self.flush()
    }

    /// Replaces the whole matrix with `frame`.
    pub fn show(&mut self, frame: &Frame) -> Result<(), DisplayError> {
        self.pixels = *frame;
        self.flush()
    }

    pub fn pixel(&self, x: u8, y: u8) -> Option<Rgb> {
        let (x, y) = (x as usize, y as usize);
        (x < WIDTH && y < HEIGHT).then(|| self.pixels[y * WIDTH + x])
    }

    pub fn pixels(&self) -> &Frame {
        &self.pixels
    }

    fn flush(&mut self) -> Result<(), DisplayError> {
        let encoded = encode(&self.pixels);
        self.sink.write_frame(&encoded)
    }
}

/// Encodes a frame as little-endian RGB565 words.
pub fn encode(frame: &Frame) -> [u8; FRAME_BYTES] {
    let mut bytes = [0u8; FRAME_BYTES];
    for (chunk, pixel) in bytes.chunks_exact_mut(2).zip(frame.iter()) {
        chunk.copy_from_slice(&pixel.to_rgb565().to_le_bytes());
    }
    bytes
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Records every frame written, shared with the test through an `Arc`
    #[derive(Clone, Default)]
    pub(crate) struct RecordingSink {
        pub frames: Arc<Mutex<Vec<[u8; FRAME_BYTES]>>>,
    }

    impl RecordingSink {
        pub fn last(&self) -> Option<[u8; FRAME_BYTES]> {
            self.frames.lock().unwrap().last().copied()
        }

        pub fn count(&self) -> usize {
            self.frames.lock().unwrap().len()
        }
    }

    impl FrameSink for RecordingSink {
        fn write_frame(&mut self, frame: &[u8; FRAME_BYTES]) -> Result<(), DisplayError> {
            self.frames.lock().unwrap().push(*frame);
            Ok(())
        }
    }

    #[test]
    fn rgb565_conversion() {
        assert_eq!(Rgb::new(0, 0, 0).to_rgb565(), 0x0000);
        assert_eq!(Rgb::new(255, 255, 255).to_rgb565(), 0xFFFF);
        assert_eq!(Rgb::new(255, 0, 0).to_rgb565(), 0xF800);
        assert_eq!(Rgb::new(0, 255, 0).to_rgb565(), 0x07E0);
        assert_eq!(Rgb::new(0, 0, 255).to_rgb565(), 0x001F);
        assert_eq!(Rgb::new(8, 4, 8).to_rgb565(), 0b00001_000001_00001);
    }

    #[test]
    fn frame_is_little_endian_row_major() {
        let mut frame = [Rgb::BLACK; PIXELS];
        frame[1] = Rgb::new(255, 0, 0);
        frame[8] = Rgb::new(0, 0, 255);

        let bytes = encode(&frame);
        assert_eq!(&bytes[0..2], &[0x00, 0x00]);
        assert_eq!(&bytes[2..4], &[0x00, 0xF8]);
        assert_eq!(&bytes[16..18], &[0x1F, 0x00]);
    }

    #[test]
    fn set_pixel_leaves_other_pixels_untouched() {
        let sink = RecordingSink::default();
        let mut matrix = LedMatrix::new(sink.clone());

        matrix.set_pixel(0, 0, Rgb::new(1, 2, 3)).unwrap();
        matrix.set_pixel(7, 7, Rgb::new(255, 255, 255)).unwrap();

        assert_eq!(matrix.pixel(0, 0), Some(Rgb::new(1, 2, 3)));
        assert_eq!(matrix.pixel(7, 7), Some(Rgb::new(255, 255, 255)));
        assert_eq!(matrix.pixel(3, 3), Some(Rgb::BLACK));
        assert_eq!(sink.count(), 2);

        let last = sink.last().unwrap();
        assert_eq!(&last[126..128], &[0xFF, 0xFF]);
        assert_eq!(&last[0..2], &Rgb::new(1, 2, 3).to_rgb565().to_le_bytes());
    }

    #[test]
    fn clear_blanks_every_pixel() {
        let sink = RecordingSink::default();
        let mut matrix = LedMatrix::new(sink.clone());
        matrix.set_pixel(4, 5, Rgb::new(9, 9, 9)).unwrap();

        matrix.clear().unwrap();

        assert!(matrix.pixels().iter().all(|p| *p == Rgb::BLACK));
        assert_eq!(sink.last().unwrap(), [0u8; FRAME_BYTES]);
    }

    #[test]
    fn set_pixel_out_of_bounds() {
        let mut matrix = LedMatrix::new(RecordingSink::default());
        assert!(matches!(
            matrix.set_pixel(8, 0, Rgb::BLACK),
            Err(DisplayError::OutOfBounds { x: 8, y: 0 })
        ));
        assert_eq!(matrix.pixel(0, 8), None);
    }
}
