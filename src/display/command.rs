//! Display command parsing
//!
//! A display message is a flat JSON object whose `action` field selects one
//! of three operations. The action names come from configuration, so the
//! payload is inspected as a generic JSON value rather than a tagged enum.

use serde_json::{Map, Value};

use super::led_matrix::{Rgb, HEIGHT, WIDTH};

/// Configured names of the three display actions
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisplayActions {
    pub clear: String,
    pub text: String,
    pub draw: String,
}

impl Default for DisplayActions {
    fn default() -> Self {
        Self {
            clear: "clear".to_string(),
            text: "text".to_string(),
            draw: "draw".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DisplayCommand {
    /// Turn off every LED
    Clear,
    /// Scroll `text` across the matrix
    Text { text: String, color: Rgb },
    /// Set a single pixel, leaving the others as they are
    Draw { x: u8, y: u8, color: Rgb },
}

#[derive(Debug, thiserror::Error)]
pub enum DisplayCommandError {
    #[error("Unable to decode display message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Display message is not a JSON object")]
    NotAnObject,

    #[error("Display message missing action specifier")]
    MissingAction,

    #[error("Unknown display action specified: {0}")]
    UnknownAction(String),

    #[error("Display text missing required parameters")]
    MissingTextParameters,

    #[error("Display draw missing required parameters")]
    MissingDrawParameters,

    #[error("Invalid color {0}, expected [r, g, b] with components 0-255")]
    InvalidColor(String),

    #[error("Invalid pixel position ({x}, {y}), expected integers 0-7")]
    InvalidPixel { x: String, y: String },
}

impl DisplayCommand {
    pub fn parse(payload: &[u8], actions: &DisplayActions) -> Result<Self, DisplayCommandError> {
        let value: Value = serde_json::from_slice(payload)?;
        let data = value.as_object().ok_or(DisplayCommandError::NotAnObject)?;
        let action = data.get("action").ok_or(DisplayCommandError::MissingAction)?;

        match action.as_str() {
            Some(a) if a == actions.clear => Ok(DisplayCommand::Clear),
            Some(a) if a == actions.text => parse_text(data),
            Some(a) if a == actions.draw => parse_draw(data),
            Some(a) => Err(DisplayCommandError::UnknownAction(a.to_string())),
            None => Err(DisplayCommandError::UnknownAction(action.to_string())),
        }
    }
}

fn parse_text(data: &Map<String, Value>) -> Result<DisplayCommand, DisplayCommandError> {
    let (Some(text), Some(color)) = (data.get("text"), data.get("color")) else {
        return Err(DisplayCommandError::MissingTextParameters);
    };
    let text = text
        .as_str()
        .ok_or(DisplayCommandError::MissingTextParameters)?;

    Ok(DisplayCommand::Text {
        text: text.to_string(),
        color: parse_color(color)?,
    })
}

fn parse_draw(data: &Map<String, Value>) -> Result<DisplayCommand, DisplayCommandError> {
    let (Some(x), Some(y), Some(color)) = (data.get("x"), data.get("y"), data.get("color")) else {
        return Err(DisplayCommandError::MissingDrawParameters);
    };
    let color = parse_color(color)?;

    match (coordinate(x, WIDTH), coordinate(y, HEIGHT)) {
        (Some(x), Some(y)) => Ok(DisplayCommand::Draw { x, y, color }),
        _ => Err(DisplayCommandError::InvalidPixel {
            x: x.to_string(),
            y: y.to_string(),
        }),
    }
}

fn coordinate(value: &Value, limit: usize) -> Option<u8> {
    value
        .as_u64()
        .filter(|v| (*v as usize) < limit)
        .map(|v| v as u8)
}

fn parse_color(value: &Value) -> Result<Rgb, DisplayCommandError> {
    let invalid = || DisplayCommandError::InvalidColor(value.to_string());

    let components = value.as_array().ok_or_else(invalid)?;
    if components.len() != 3 {
        return Err(invalid());
    }

    let mut rgb = [0u8; 3];
    for (slot, component) in rgb.iter_mut().zip(components) {
        *slot = component
            .as_u64()
            .and_then(|c| u8::try_from(c).ok())
            .ok_or_else(invalid)?;
    }
    Ok(Rgb::new(rgb[0], rgb[1], rgb[2]))
}
