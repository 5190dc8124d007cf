//! Recognition pipeline
//!
//! Decodes an uploaded image, looks up the engine for the requested
//! languages, converts to grayscale, runs recognition, and folds the engine's
//! detection records into extracted text and an aggregate confidence.

use crate::confidence;
use crate::config::Config;
use crate::engine::{Detection, DetectionRecord};
use crate::engines::EngineCache;
use crate::error::OcrError;
use crate::language::LanguageSet;
use crate::preprocessing::pipeline::StepTiming;
use crate::preprocessing::{Pipeline, Preset};

/// File name offered for downloaded text
pub const DOWNLOAD_FILE_NAME: &str = "extracted_text.txt";
pub const DOWNLOAD_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Outcome of one recognition pass
#[derive(Debug, Clone)]
pub struct Extraction {
    /// Detection texts joined by single spaces, trimmed
    pub text: String,
    pub engine: &'static str,
    pub languages: String,
    pub detections: Vec<Detection>,
    /// Mean detection confidence (0-100), absent when nothing was detected
    pub confidence: Option<f32>,
    pub warnings: Vec<String>,
    pub preprocessing: Vec<StepTiming>,
}

impl Extraction {
    /// Plain-text download of the extracted text, if there is any
    pub fn download(&self) -> Option<TextDownload> {
        if self.text.is_empty() {
            return None;
        }
        Some(TextDownload {
            file_name: DOWNLOAD_FILE_NAME,
            content_type: DOWNLOAD_CONTENT_TYPE,
            body: self.text.clone(),
        })
    }
}

/// Downloadable text artifact
#[derive(Debug, Clone, PartialEq)]
pub struct TextDownload {
    pub file_name: &'static str,
    pub content_type: &'static str,
    pub body: String,
}

/// Valid detections separated from malformed records
#[derive(Debug, Default)]
struct Collected {
    detections: Vec<Detection>,
    warnings: Vec<String>,
}

/// Split engine output into detections and warnings for malformed records
fn collect(records: Vec<DetectionRecord>) -> Collected {
    let mut collected = Collected::default();

    for record in records {
        match record {
            DetectionRecord::Detection(detection) => {
                tracing::info!(
                    "Text {}: {} | Confidence: {:.2}%",
                    collected.detections.len() + 1,
                    detection.text,
                    detection.confidence.percent()
                );
                collected.detections.push(detection);
            }
            DetectionRecord::Malformed { index, raw, reason } => {
                let warning = format!(
                    "Unexpected OCR result format at index {}: {} ({})",
                    index, raw, reason
                );
                tracing::warn!("{}", warning);
                collected.warnings.push(warning);
            }
        }
    }

    collected
}

/// Runs recognition requests against cached engines
pub struct OcrProcessor {
    engines: EngineCache,
}

impl OcrProcessor {
    /// Processor using the backend selected in the configuration
    pub fn new(config: &Config) -> Result<Self, OcrError> {
        Ok(Self::with_cache(EngineCache::from_config(config)?))
    }

    pub fn with_cache(engines: EngineCache) -> Self {
        Self { engines }
    }

    /// Initialize engines ahead of the first request
    pub fn preload(&self, selections: &[String]) -> Result<(), OcrError> {
        for selection in selections {
            let languages = LanguageSet::resolve(selection)?;
            self.engines.get_engine(&languages)?;
        }
        Ok(())
    }

    /// Language sets with an initialized engine
    pub fn loaded_languages(&self) -> Vec<String> {
        self.engines.cached()
    }

    /// Recognize text in an encoded image
    ///
    /// Blocking: callers on an async runtime should run it on a blocking thread.
    pub fn process(
        &self,
        data: &[u8],
        languages: &LanguageSet,
        preset: Preset,
    ) -> Result<Extraction, OcrError> {
        let image = image::load_from_memory(data)
            .map_err(|e| OcrError::UnsupportedFormat(format!("Failed to decode image: {}", e)))?;
        tracing::info!(
            "Image uploaded: {}x{}, {} bytes",
            image.width(),
            image.height(),
            data.len()
        );
        tracing::info!("OCR languages selected: [{}]", languages);

        // Engine failures halt the request before any recognition work
        let engine = self.engines.get_engine(languages)?;

        let prepared = Pipeline::new(preset).process(image)?;
        tracing::debug!(
            "Preprocessing '{}' ran {} step(s)",
            prepared.preset.as_str(),
            prepared.steps.len()
        );

        let records = engine.recognize(&prepared.image)?;
        tracing::info!("OCR extraction complete with {} results", records.len());

        let Collected {
            detections,
            warnings,
        } = collect(records);

        let text = detections
            .iter()
            .map(|d| d.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
            .trim()
            .to_string();

        let confidences: Vec<f32> = detections.iter().map(|d| d.confidence.percent()).collect();
        let confidence = confidence::aggregate(&confidences);
        match confidence {
            Some(avg) => tracing::info!("Average OCR Confidence: {:.2}%", avg),
            None => tracing::info!("No valid confidence scores available"),
        }

        Ok(Extraction {
            text,
            engine: engine.name(),
            languages: languages.to_string(),
            detections,
            confidence,
            warnings,
            preprocessing: prepared.steps,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::engine::Confidence;
    use crate::engines::testing::fake_factory;
    use image::{DynamicImage, ImageFormat, RgbImage};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    pub fn word(text: &str, confidence: f32) -> DetectionRecord {
        DetectionRecord::Detection(Detection {
            bbox: None,
            text: text.to_string(),
            confidence: Confidence::from_percent(confidence),
        })
    }

    pub fn malformed(index: usize) -> DetectionRecord {
        DetectionRecord::Malformed {
            index,
            raw: "5\t1\t1".to_string(),
            reason: "expected 12 columns, found 3".to_string(),
        }
    }

    pub fn png_bytes() -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::new(16, 16));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn processor(records: Vec<DetectionRecord>) -> (OcrProcessor, Arc<AtomicUsize>) {
        let builds = Arc::new(AtomicUsize::new(0));
        let cache = EngineCache::new(fake_factory(records, builds.clone()));
        (OcrProcessor::with_cache(cache), builds)
    }

    fn english() -> LanguageSet {
        LanguageSet::parse("en").unwrap()
    }

    #[test]
    fn test_malformed_record_skipped_with_warning() {
        let (processor, _) = processor(vec![word("a", 70.0), malformed(1), word("b", 90.0)]);

        let extraction = processor
            .process(&png_bytes(), &english(), Preset::Grayscale)
            .unwrap();

        assert_eq!(extraction.text, "a b");
        assert_eq!(extraction.confidence, Some(80.0));
        assert_eq!(extraction.detections.len(), 2);
        assert_eq!(extraction.warnings.len(), 1);
        assert!(extraction.warnings[0].contains("index 1"));
    }

    #[test]
    fn test_no_detections_has_no_confidence_or_download() {
        let (processor, _) = processor(vec![]);

        let extraction = processor
            .process(&png_bytes(), &english(), Preset::Grayscale)
            .unwrap();

        assert_eq!(extraction.text, "");
        assert_eq!(extraction.confidence, None);
        assert_eq!(extraction.download(), None);
    }

    #[test]
    fn test_download_contains_trimmed_text() {
        let (processor, _) = processor(vec![word(" Hello", 90.0), word("World ", 80.0)]);

        let extraction = processor
            .process(&png_bytes(), &english(), Preset::None)
            .unwrap();
        let download = extraction.download().unwrap();

        assert_eq!(download.file_name, "extracted_text.txt");
        assert!(download.content_type.starts_with("text/plain"));
        assert_eq!(download.body, "Hello World");
    }

    #[test]
    fn test_grayscale_step_recorded() {
        let (processor, _) = processor(vec![word("a", 50.0)]);
        let extraction = processor
            .process(&png_bytes(), &english(), Preset::Grayscale)
            .unwrap();
        assert_eq!(extraction.preprocessing.len(), 1);
        assert_eq!(extraction.engine, "fake");
        assert_eq!(extraction.languages, "en");
    }

    #[test]
    fn test_engine_failure_halts_request() {
        let (processor, _) = processor(vec![word("a", 50.0)]);
        let languages = LanguageSet::parse("fr").unwrap();

        let err = processor
            .process(&png_bytes(), &languages, Preset::Grayscale)
            .err()
            .unwrap();

        assert!(matches!(err, OcrError::InitializationError { .. }));
    }

    #[test]
    fn test_undecodable_image_rejected() {
        let (processor, builds) = processor(vec![]);
        let err = processor
            .process(b"not an image", &english(), Preset::Grayscale)
            .err()
            .unwrap();
        assert!(matches!(err, OcrError::UnsupportedFormat(_)));
        assert_eq!(builds.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_preload_initializes_once() {
        let (processor, builds) = processor(vec![]);
        processor
            .preload(&["English + Hindi".to_string(), "en+hi".to_string()])
            .unwrap();
        processor
            .process(&png_bytes(), &LanguageSet::parse("hi+en").unwrap(), Preset::None)
            .unwrap();

        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert_eq!(processor.loaded_languages(), vec!["en+hi".to_string()]);
    }
}
