//! Leptess/Tesseract engine implementation
//!
//! Tesseract-based OCR engine, the backend that reads Devanagari (Hindi).
//! Uses tesseract-static crate for static linking (no system dependencies).
//! Downloads tessdata (training data) for each requested language on first use.

use super::{download, tsv};
use crate::config::Config;
use crate::engine::{DetectionRecord, OcrEngine};
use crate::error::OcrError;
use crate::language::LanguageSet;
use image::DynamicImage;
use std::path::PathBuf;
use tesseract_static::tesseract::Tesseract;

/// Language codes this engine accepts, with their tessdata names
const TESSDATA_LANGUAGES: [(&str, &str); 2] = [("en", "eng"), ("hi", "hin")];

/// Tesseract OCR Engine
pub struct LeptessEngine {
    /// Path to tessdata directory
    tessdata_path: String,
    /// Tesseract language string, e.g. "eng+hin"
    tess_languages: String,
    languages: LanguageSet,
}

impl LeptessEngine {
    /// Create a Tesseract engine for a language set
    pub fn new(config: &Config, languages: &LanguageSet) -> Result<Self, OcrError> {
        let tess_languages = tesseract_languages(languages)?;

        let tessdata_dir = config
            .tessdata_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| download::cache_dir().join("tessdata"));

        for lang in tess_languages.split('+') {
            download::ensure_downloaded(
                &tessdata_url(lang),
                &tessdata_dir,
                &format!("{}.traineddata", lang),
                &languages.to_string(),
            )?;
        }

        // Tesseract expects the directory, not the file
        let tessdata_path = tessdata_dir
            .to_str()
            .map(|s| s.to_string())
            .ok_or_else(|| OcrError::init(languages, "Invalid tessdata path"))?;

        // Validate that tessdata is loadable by doing a test initialization
        let test_tess = Tesseract::new(Some(&tessdata_path), Some(&tess_languages))
            .map_err(|e| OcrError::init(languages, format!("Failed to initialize Tesseract: {}", e)))?;
        drop(test_tess);

        tracing::info!(
            "Leptess engine ready (tessdata: {}, languages: {})",
            tessdata_path,
            tess_languages
        );

        Ok(Self {
            tessdata_path,
            tess_languages,
            languages: languages.clone(),
        })
    }
}

impl OcrEngine for LeptessEngine {
    fn name(&self) -> &'static str {
        "leptess"
    }

    fn description(&self) -> &'static str {
        "Tesseract OCR engine - English and Hindi, word-level confidence"
    }

    fn languages(&self) -> &LanguageSet {
        &self.languages
    }

    /// One detection per recognized word
    fn recognize(&self, image: &DynamicImage) -> Result<Vec<DetectionRecord>, OcrError> {
        // Convert to RGB8 for consistent handling
        let rgb_img = image.to_rgb8();
        let (width, height) = rgb_img.dimensions();

        // Convert to BMP in memory (BMP is always supported by leptonica)
        let mut bmp_data = Vec::new();
        rgb_img
            .write_to(&mut std::io::Cursor::new(&mut bmp_data), image::ImageFormat::Bmp)
            .map_err(|e| OcrError::ProcessingError(format!("Failed to convert to BMP: {}", e)))?;

        tracing::debug!(
            "Processing image: {}x{}, BMP size: {} bytes",
            width,
            height,
            bmp_data.len()
        );

        // Tesseract handles are not shareable across threads; one per call
        let mut tess = Tesseract::new(Some(&self.tessdata_path), Some(&self.tess_languages))
            .map_err(|e| OcrError::ProcessingError(format!("Failed to create Tesseract: {}", e)))?;

        tess = tess.set_image_from_mem(&bmp_data).map_err(|e| {
            OcrError::ProcessingError(format!(
                "Failed to set image ({}x{}, {} bytes): {}",
                width,
                height,
                bmp_data.len(),
                e
            ))
        })?;

        tess = tess
            .recognize()
            .map_err(|e| OcrError::ProcessingError(format!("Failed to recognize text: {}", e)))?;

        let tsv_text = tess
            .get_tsv_text(0)
            .map_err(|e| OcrError::ProcessingError(format!("Failed to get TSV output: {}", e)))?;

        Ok(tsv::parse(&tsv_text))
    }
}

/// Map language codes to a Tesseract language string
fn tesseract_languages(languages: &LanguageSet) -> Result<String, OcrError> {
    languages
        .codes()
        .map(|code| {
            TESSDATA_LANGUAGES
                .iter()
                .find(|(known, _)| *known == code)
                .map(|(_, tess)| *tess)
                .ok_or_else(|| {
                    OcrError::init(
                        languages,
                        format!(
                            "Tesseract engine does not support language '{}' (supported: en, hi)",
                            code
                        ),
                    )
                })
        })
        .collect::<Result<Vec<_>, _>>()
        .map(|tess| tess.join("+"))
}

/// Get tessdata download URL for a language
fn tessdata_url(language: &str) -> String {
    // Use tessdata_fast for smaller, faster downloads
    format!(
        "https://github.com/tesseract-ocr/tessdata_fast/raw/main/{}.traineddata",
        language
    )
}
