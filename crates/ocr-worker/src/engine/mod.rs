//! Engine boundary.
//!
//! The OCR engine itself is an external collaborator. This module defines the
//! narrow set of operations a session needs from it, plus the result shapes
//! those operations return.

pub mod mock;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Set on the first item of a text line. Only reported for words.
pub const START_OF_LINE: u32 = 1;

/// Set on the last item of a text line. Only reported for words.
pub const END_OF_LINE: u32 = 2;

/// Integer rectangle in image pixel coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl IntRect {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    /// Smallest rectangle containing both.
    pub fn union(&self, other: &IntRect) -> IntRect {
        IntRect {
            left: self.left.min(other.left),
            top: self.top.min(other.top),
            right: self.right.max(other.right),
            bottom: self.bottom.max(other.bottom),
        }
    }
}

/// Text item found by layout analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxItem {
    pub rect: IntRect,
    /// Combination of [`START_OF_LINE`] and [`END_OF_LINE`].
    pub flags: u32,
}

/// Text item found by layout analysis and recognition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextItem {
    pub rect: IntRect,
    pub flags: u32,
    /// Score in [0, 1].
    pub confidence: f32,
    pub text: String,
}

impl TextItem {
    /// Layout-only view of this item.
    pub fn to_box(&self) -> BoxItem {
        BoxItem {
            rect: self.rect,
            flags: self.flags,
        }
    }
}

/// Detected page rotation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Orientation {
    /// Degrees: 0, 90, 180 or 270.
    pub rotation: u32,
    /// Score in [0, 1]. Zero means undetermined.
    pub confidence: f32,
}

impl Orientation {
    pub fn undetermined() -> Self {
        Self {
            rotation: 0,
            confidence: 0.0,
        }
    }
}

/// Granularity of returned boxes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextUnit {
    Word,
    Line,
}

impl TextUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            TextUnit::Word => "word",
            TextUnit::Line => "line",
        }
    }
}

impl fmt::Display for TextUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TextUnit {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "word" => Ok(TextUnit::Word),
            "line" => Ok(TextUnit::Line),
            other => Err(SessionError::InvalidTextUnit(other.to_string())),
        }
    }
}

/// Decoded RGBA pixels.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageData {
    pub data: Vec<u8>,
    pub width: i32,
    pub height: i32,
}

impl ImageData {
    pub fn new(data: Vec<u8>, width: i32, height: i32) -> Self {
        Self {
            data,
            width,
            height,
        }
    }

    /// Bytes needed for `width * height` RGBA pixels, `None` for non-positive
    /// dimensions.
    pub fn required_len(&self) -> Option<usize> {
        if self.width <= 0 || self.height <= 0 {
            return None;
        }
        (self.width as usize)
            .checked_mul(self.height as usize)?
            .checked_mul(4)
    }
}

impl fmt::Debug for ImageData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageData")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Failures reported by an engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("engine rejected model: {0}")]
    ModelRejected(String),

    #[error("engine rejected image: {0}")]
    ImageRejected(String),

    #[error("no image loaded in engine")]
    NoImage,

    #[error("unknown variable: {0}")]
    UnknownVariable(String),

    #[error("invalid value for variable {name}: {value}")]
    InvalidVariable { name: String, value: String },

    #[error("engine initialization failed: {0}")]
    Init(String),
}

/// One engine instance. Dropping it releases the instance.
///
/// Calls are synchronous and may block for a long time (recognition).
pub trait OcrEngine: Send {
    fn load_model(&mut self, model: &[u8]) -> Result<(), EngineError>;

    /// Copy `image` into the engine. Dimensions have already been validated.
    fn load_image(&mut self, image: &ImageData) -> Result<(), EngineError>;

    /// Release the current image. The model stays loaded.
    fn clear_image(&mut self);

    /// Run layout analysis on the current image.
    fn analyse_layout(&mut self) -> Result<(), EngineError>;

    /// Boxes from the most recent layout analysis or recognition pass.
    fn bounding_boxes(&mut self, unit: TextUnit) -> Result<Vec<BoxItem>, EngineError>;

    /// Run recognition, reporting raw progress percentages as it goes.
    fn recognize(&mut self, on_progress: &mut dyn FnMut(i32)) -> Result<(), EngineError>;

    /// Boxes with text from the most recent recognition pass.
    fn text_boxes(&mut self, unit: TextUnit) -> Result<Vec<TextItem>, EngineError>;

    fn text(&mut self) -> Result<String, EngineError>;

    fn hocr(&mut self) -> Result<String, EngineError>;

    fn orientation(&mut self) -> Result<Orientation, EngineError>;

    /// Value of a configuration variable, `None` if the engine has no such variable.
    fn variable(&self, name: &str) -> Option<String>;

    fn set_variable(&mut self, name: &str, value: &str) -> Result<(), EngineError>;
}

/// Creates engine instances. Initialized once per worker.
pub trait EngineFactory: Send + Sync {
    /// Create an engine, optionally from an explicit engine binary.
    fn create(&self, binary: Option<Vec<u8>>) -> Result<Box<dyn OcrEngine>, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_unit_parsing() {
        assert_eq!("word".parse::<TextUnit>().unwrap(), TextUnit::Word);
        assert_eq!("line".parse::<TextUnit>().unwrap(), TextUnit::Line);
        assert!(matches!(
            "paragraph".parse::<TextUnit>(),
            Err(SessionError::InvalidTextUnit(unit)) if unit == "paragraph"
        ));
    }

    #[test]
    fn test_text_unit_serde_is_lowercase() {
        assert_eq!(serde_json::to_value(TextUnit::Line).unwrap(), "line");
    }

    #[test]
    fn test_required_len() {
        assert_eq!(ImageData::new(vec![], 3, 2).required_len(), Some(24));
        assert_eq!(ImageData::new(vec![], 0, 2).required_len(), None);
        assert_eq!(ImageData::new(vec![], 4, -1).required_len(), None);
    }

    #[test]
    fn test_rect_union() {
        let a = IntRect::new(10, 5, 20, 15);
        let b = IntRect::new(25, 4, 40, 12);
        assert_eq!(a.union(&b), IntRect::new(10, 4, 40, 15));
        assert_eq!(a.width(), 10);
        assert_eq!(b.height(), 8);
    }
}
