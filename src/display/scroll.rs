use super::font::{glyph, GLYPH_WIDTH};
use super::led_matrix::{Frame, Rgb, HEIGHT, PIXELS, WIDTH};

/// Blank columns between two characters
const SPACING: usize = 1;

/// Renders text into a column strip and yields one 8x8 window per scroll
/// step.
///
/// The strip starts and ends with a full blank screen, so the text enters
/// from the right edge and the last frame is empty.
#[derive(Debug, Clone)]
pub struct TextScroller {
    columns: Vec<u8>,
    color: Rgb,
    background: Rgb,
    position: usize,
}

impl TextScroller {
    pub fn new(text: &str, color: Rgb, background: Rgb) -> Self {
        let mut columns = vec![0u8; WIDTH];
        for c in text.chars() {
            columns.extend_from_slice(glyph(c));
            columns.extend(std::iter::repeat(0u8).take(SPACING));
        }
        columns.extend(std::iter::repeat(0u8).take(WIDTH));

        Self {
            columns,
            color,
            background,
            position: 0,
        }
    }

    /// Number of frames a text of `chars` characters scrolls through
    pub fn frame_count(chars: usize) -> usize {
        chars * (GLYPH_WIDTH + SPACING) + WIDTH + 1
    }

    fn render(&self, position: usize) -> Frame {
        let mut frame = [self.background; PIXELS];
        for (x, column) in self.columns[position..position + WIDTH].iter().enumerate() {
            for y in 0..HEIGHT {
                if (*column >> y) & 1 == 1 {
                    frame[y * WIDTH + x] = self.color;
                }
            }
        }
        frame
    }
}

impl Iterator for TextScroller {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        if self.position + WIDTH > self.columns.len() {
            return None;
        }
        let frame = self.render(self.position);
        self.position += 1;
        Some(frame)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.columns.len() + 1).saturating_sub(self.position + WIDTH);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for TextScroller {}
