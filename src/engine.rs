use crate::error::OcrError;
use crate::language::LanguageSet;
use image::DynamicImage;
use serde::Serialize;

/// Pixel region of a detection
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

/// Detection confidence on the 0-100 scale
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct Confidence(f32);

impl Confidence {
    /// From an engine score already on the 0-100 scale
    pub fn from_percent(value: f32) -> Self {
        Self(value.clamp(0.0, 100.0))
    }

    /// From an engine score on the 0.0-1.0 scale
    pub fn from_unit(value: f32) -> Self {
        Self::from_percent(value * 100.0)
    }

    pub fn percent(self) -> f32 {
        self.0
    }
}

/// A recognized text token
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
    pub text: String,
    pub confidence: Confidence,
}

/// One entry of engine output
#[derive(Debug, Clone, PartialEq)]
pub enum DetectionRecord {
    Detection(Detection),
    /// Output that does not have the shape of a detection
    Malformed {
        index: usize,
        raw: String,
        reason: String,
    },
}

/// Trait that all OCR engines must implement
///
/// An engine instance is bound to the language set it was built for.
pub trait OcrEngine: Send + Sync {
    /// Returns the engine identifier (e.g., "ocrs", "leptess")
    fn name(&self) -> &'static str;

    /// Returns a human-readable description of the engine
    fn description(&self) -> &'static str;

    /// Language set this instance recognizes
    fn languages(&self) -> &LanguageSet;

    /// Recognize text in an image, one record per detected token, in reading order
    fn recognize(&self, image: &DynamicImage) -> Result<Vec<DetectionRecord>, OcrError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_scores_normalize_to_percent() {
        assert!((Confidence::from_unit(0.9).percent() - 90.0).abs() < 1e-4);
        assert_eq!(Confidence::from_percent(42.5).percent(), 42.5);
    }

    #[test]
    fn test_confidence_clamped() {
        assert_eq!(Confidence::from_percent(130.0).percent(), 100.0);
        assert_eq!(Confidence::from_unit(-0.5).percent(), 0.0);
    }
}
