//! OCRS engine implementation
//!
//! Pure Rust OCR engine using the ocrs library. No system dependencies required.
//! Downloads neural network models automatically on first use. ocrs only
//! recognizes Latin script, so instances can be built for English alone.

use super::download;
use crate::config::Config;
use crate::engine::{Confidence, Detection, DetectionRecord, OcrEngine};
use crate::error::OcrError;
use crate::language::LanguageSet;
use image::DynamicImage;
use ocrs::{DecodeMethod, ImageSource, OcrEngine as OcrsOcrEngine, OcrEngineParams};
use rten::Model;

/// Default model URLs from the ocrs project
const DETECTION_MODEL_URL: &str =
    "https://ocrs-models.s3-accelerate.amazonaws.com/text-detection.rten";
const RECOGNITION_MODEL_URL: &str =
    "https://ocrs-models.s3-accelerate.amazonaws.com/text-recognition.rten";

const SUPPORTED_LANGUAGES: [&str; 1] = ["en"];

/// OCR Engine wrapping the ocrs library
pub struct OcrsEngine {
    engine: OcrsOcrEngine,
    languages: LanguageSet,
}

impl OcrsEngine {
    /// Create a new engine, downloading models if needed
    pub fn new(_config: &Config, languages: &LanguageSet) -> Result<Self, OcrError> {
        if let Some(code) = languages
            .codes()
            .find(|code| !SUPPORTED_LANGUAGES.contains(code))
        {
            return Err(OcrError::init(
                languages,
                format!(
                    "ocrs does not support language '{}' (supported: {}); build with --features engine-leptess for Hindi",
                    code,
                    SUPPORTED_LANGUAGES.join(", ")
                ),
            ));
        }

        let langs = languages.to_string();
        let model_dir = download::cache_dir();

        // Load models (will download if not cached)
        let detection_model_path = download::ensure_downloaded(
            DETECTION_MODEL_URL,
            &model_dir,
            "text-detection.rten",
            &langs,
        )?;
        let recognition_model_path = download::ensure_downloaded(
            RECOGNITION_MODEL_URL,
            &model_dir,
            "text-recognition.rten",
            &langs,
        )?;

        let detection_model = Model::load_file(&detection_model_path).map_err(|e| {
            OcrError::init(&langs, format!("Failed to load detection model: {}", e))
        })?;
        let recognition_model = Model::load_file(&recognition_model_path).map_err(|e| {
            OcrError::init(&langs, format!("Failed to load recognition model: {}", e))
        })?;

        let engine = OcrsOcrEngine::new(OcrEngineParams {
            detection_model: Some(detection_model),
            recognition_model: Some(recognition_model),
            decode_method: DecodeMethod::Greedy,
            ..Default::default()
        })
        .map_err(|e| OcrError::init(&langs, format!("Failed to create OCR engine: {}", e)))?;

        Ok(Self {
            engine,
            languages: languages.clone(),
        })
    }
}

impl OcrEngine for OcrsEngine {
    fn name(&self) -> &'static str {
        "ocrs"
    }

    fn description(&self) -> &'static str {
        "Pure Rust OCR engine - fast, no system dependencies required, English only"
    }

    fn languages(&self) -> &LanguageSet {
        &self.languages
    }

    /// One detection per recognized text line
    fn recognize(&self, image: &DynamicImage) -> Result<Vec<DetectionRecord>, OcrError> {
        // ImageSource::from_bytes expects RGB8 in HWC order
        let rgb_img = image.to_rgb8();
        let dimensions = rgb_img.dimensions();

        let img_source = ImageSource::from_bytes(rgb_img.as_raw(), dimensions).map_err(|e| {
            OcrError::ProcessingError(format!("Failed to create image source: {}", e))
        })?;

        let ocr_input = self
            .engine
            .prepare_input(img_source)
            .map_err(|e| OcrError::ProcessingError(format!("Failed to prepare input: {}", e)))?;

        let word_rects = self
            .engine
            .detect_words(&ocr_input)
            .map_err(|e| OcrError::ProcessingError(format!("Failed to detect words: {}", e)))?;

        let line_rects = self.engine.find_text_lines(&ocr_input, &word_rects);

        let line_texts = self
            .engine
            .recognize_text(&ocr_input, &line_rects)
            .map_err(|e| OcrError::ProcessingError(format!("Failed to recognize text: {}", e)))?;

        let records = line_texts
            .iter()
            .enumerate()
            .filter_map(|(index, line)| match line {
                Some(line) => {
                    let text = line
                        .words()
                        .map(|word| word.to_string())
                        .collect::<Vec<_>>()
                        .join(" ");
                    if text.trim().is_empty() {
                        return None;
                    }
                    let confidence = Confidence::from_unit(calculate_confidence(&text));
                    Some(DetectionRecord::Detection(Detection {
                        bbox: None,
                        text,
                        confidence,
                    }))
                }
                None => Some(DetectionRecord::Malformed {
                    index,
                    raw: "<unrecognized line>".to_string(),
                    reason: "ocrs returned no text for a detected line".to_string(),
                }),
            })
            .collect();

        Ok(records)
    }
}

// ============================================================================
// Confidence scoring heuristics
// ============================================================================

/// Calculate confidence score (0.0-1.0) for a recognized line.
///
/// ocrs doesn't provide per-character confidence scores, so the text is
/// analyzed for patterns that indicate OCR quality.
fn calculate_confidence(text: &str) -> f32 {
    if text.is_empty() {
        return 0.0;
    }
    if text.chars().count() < 5 {
        return 0.5; // Too short to judge accurately
    }

    let char_score = analyze_char_frequency(text);
    let word_score = analyze_word_lengths(text);
    let whitespace_score = analyze_whitespace(text);
    let repetition_score = detect_repetition(text);

    let confidence =
        0.40 * char_score + 0.30 * word_score + 0.15 * whitespace_score + 0.15 * repetition_score;

    confidence.clamp(0.0, 1.0)
}

/// Penalizes text with too many special characters or too few letters.
fn analyze_char_frequency(text: &str) -> f32 {
    let total = text.chars().count();
    if total == 0 {
        return 0.0;
    }

    let letters = text.chars().filter(|c| c.is_alphabetic()).count();
    let special = text
        .chars()
        .filter(|c| !c.is_alphanumeric() && !c.is_whitespace() && !c.is_ascii_punctuation())
        .count();

    let special_ratio = special as f32 / total as f32;
    let special_penalty = 1.0 - (special_ratio * 10.0).min(1.0);

    let letter_ratio = letters as f32 / total as f32;
    let letter_score = (letter_ratio * 1.5).min(1.0);

    special_penalty * 0.6 + letter_score * 0.4
}

/// Garbled OCR often produces single-character "words" or very long runs.
fn analyze_word_lengths(text: &str) -> f32 {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return 0.5;
    }

    let total_len: usize = words.iter().map(|w| w.chars().count()).sum();
    let avg_len = total_len as f32 / words.len() as f32;

    let avg_score = match avg_len as usize {
        0..=1 => 0.3,
        2..=3 => 0.7,
        4..=8 => 1.0,
        9..=12 => 0.8,
        _ => 0.4,
    };

    let single_count = words.iter().filter(|w| w.chars().count() == 1).count();
    let single_ratio = single_count as f32 / words.len() as f32;
    let single_penalty = 1.0 - (single_ratio * 1.5).min(0.5);

    avg_score * single_penalty
}

/// Lines are short, so only a missing-space line is penalized.
fn analyze_whitespace(text: &str) -> f32 {
    let words = text.split_whitespace().count();
    let chars = text.chars().filter(|c| !c.is_whitespace()).count();
    match (words, chars) {
        (_, 0) => 0.0,
        (1, n) if n > 15 => 0.5,
        _ => 1.0,
    }
}

/// Patterns like "aaaa" or "####" often indicate OCR confusion.
fn detect_repetition(text: &str) -> f32 {
    let mut max_repeat = 1;
    let mut current = 1;
    let mut prev: Option<char> = None;

    for c in text.chars() {
        if Some(c) == prev && !c.is_whitespace() {
            current += 1;
            max_repeat = max_repeat.max(current);
        } else {
            current = 1;
        }
        prev = Some(c);
    }

    match max_repeat {
        1..=3 => 1.0,
        4..=5 => 0.8,
        6..=10 => 0.5,
        _ => 0.2,
    }
}
