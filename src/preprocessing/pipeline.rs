use crate::error::OcrError;
use image::DynamicImage;
use serde::Serialize;
use std::time::Instant;

use super::steps;

/// Preprocessing preset names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Preset {
    /// Hand the decoded image to the engine as-is
    None,
    /// Convert to grayscale before recognition
    #[default]
    Grayscale,
}

impl Preset {
    /// Parse from a form field value
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "none" => Some(Self::None),
            "grayscale" | "greyscale" | "gray" => Some(Self::Grayscale),
            _ => None,
        }
    }

    /// Get the preset name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Grayscale => "grayscale",
        }
    }
}

/// Timing information for a single preprocessing step
#[derive(Debug, Clone, Serialize)]
pub struct StepTiming {
    pub name: String,
    pub time_ms: u64,
}

/// Result of preprocessing including timing stats
#[derive(Debug, Clone)]
pub struct PreprocessingResult {
    pub image: DynamicImage,
    pub preset: Preset,
    pub steps: Vec<StepTiming>,
}

/// Preprocessing pipeline that applies steps based on preset
pub struct Pipeline {
    preset: Preset,
}

impl Pipeline {
    pub fn new(preset: Preset) -> Self {
        Self { preset }
    }

    /// Process an image according to the configured preset
    pub fn process(&self, image: DynamicImage) -> Result<PreprocessingResult, OcrError> {
        let mut steps_timing = Vec::new();

        let image = match self.preset {
            Preset::None => image,
            Preset::Grayscale => {
                let img =
                    self.run_step("grayscale", image, &mut steps_timing, steps::grayscale::apply)?;
                tracing::info!("Converted image to grayscale");
                img
            }
        };

        Ok(PreprocessingResult {
            image,
            preset: self.preset,
            steps: steps_timing,
        })
    }

    fn run_step<F>(
        &self,
        name: &str,
        img: DynamicImage,
        timings: &mut Vec<StepTiming>,
        step_fn: F,
    ) -> Result<DynamicImage, OcrError>
    where
        F: FnOnce(DynamicImage) -> Result<DynamicImage, OcrError>,
    {
        let step_start = Instant::now();
        let result = step_fn(img)?;
        timings.push(StepTiming {
            name: name.to_string(),
            time_ms: step_start.elapsed().as_millis() as u64,
        });
        Ok(result)
    }
}
