//! OCR engine implementations
//!
//! This module contains implementations of the OcrEngine trait for different
//! OCR backends, and the cache that builds one engine instance per language
//! set on first use. Engines are conditionally compiled based on feature flags.

#[cfg(feature = "engine-ocrs")]
pub mod ocrs;

#[cfg(feature = "engine-leptess")]
pub mod leptess;

#[cfg(feature = "engine-leptess")]
mod tsv;

#[cfg(any(feature = "engine-ocrs", feature = "engine-leptess"))]
mod download;

use crate::config::Config;
use crate::engine::OcrEngine;
use crate::error::OcrError;
use crate::language::LanguageSet;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

/// Builds an engine for a language set
pub type EngineFactory =
    Box<dyn Fn(&LanguageSet) -> Result<Arc<dyn OcrEngine>, OcrError> + Send + Sync>;

/// Compiled-in OCR backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    #[cfg(feature = "engine-ocrs")]
    Ocrs,
    #[cfg(feature = "engine-leptess")]
    Leptess,
}

impl Backend {
    /// Names of the backends compiled into this binary, preferred first
    pub fn available() -> Vec<&'static str> {
        let mut names = Vec::new();
        #[cfg(feature = "engine-leptess")]
        names.push("leptess");
        #[cfg(feature = "engine-ocrs")]
        names.push("ocrs");
        names
    }

    /// Parse a backend name. An absent name selects the first compiled backend
    /// (Tesseract when available, since it is the one that reads Hindi).
    pub fn from_name(name: Option<&str>) -> Result<Self, OcrError> {
        let name = match name {
            Some(name) => name.to_lowercase(),
            None => Self::available()
                .first()
                .map(|n| n.to_string())
                .unwrap_or_default(),
        };

        match name.as_str() {
            #[cfg(feature = "engine-ocrs")]
            "ocrs" => Ok(Self::Ocrs),
            #[cfg(feature = "engine-leptess")]
            "leptess" | "tesseract" => Ok(Self::Leptess),
            "" => Err(OcrError::init(
                "-",
                "No OCR engines available. Build with --features engine-ocrs or --features engine-leptess",
            )),
            other => Err(OcrError::init(
                "-",
                format!(
                    "Engine '{}' is not available (compiled engines: {})",
                    other,
                    Self::available().join(", ")
                ),
            )),
        }
    }

    /// Factory constructing this backend's engine for a language set
    pub fn factory(self, config: &Config) -> EngineFactory {
        let config = config.clone();
        match self {
            #[cfg(feature = "engine-ocrs")]
            Self::Ocrs => Box::new(move |languages: &LanguageSet| {
                let engine: Arc<dyn OcrEngine> = Arc::new(ocrs::OcrsEngine::new(&config, languages)?);
                Ok(engine)
            }),
            #[cfg(feature = "engine-leptess")]
            Self::Leptess => Box::new(move |languages: &LanguageSet| {
                let engine: Arc<dyn OcrEngine> =
                    Arc::new(leptess::LeptessEngine::new(&config, languages)?);
                Ok(engine)
            }),
        }
    }
}

/// One cache entry. `init` serializes construction for this language set
/// only; `engine` is readable without taking any lock.
#[derive(Default)]
struct Slot {
    engine: OnceLock<Arc<dyn OcrEngine>>,
    init: Mutex<()>,
}

/// Engines keyed by language set, built on first request and kept for the
/// life of the process
pub struct EngineCache {
    factory: EngineFactory,
    slots: Mutex<HashMap<LanguageSet, Arc<Slot>>>,
}

impl EngineCache {
    pub fn new(factory: EngineFactory) -> Self {
        Self {
            factory,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Cache for the backend named in the configuration
    pub fn from_config(config: &Config) -> Result<Self, OcrError> {
        let backend = Backend::from_name(config.engine.as_deref())?;
        tracing::info!("Using OCR backend {:?}", backend);
        Ok(Self::new(backend.factory(config)))
    }

    /// Get the engine for `languages`, constructing it on a miss.
    ///
    /// The map lock is only held to find the slot, so hits on one language
    /// set never wait for another set being built. Failed constructions are
    /// not cached; the next call tries again.
    pub fn get_engine(&self, languages: &LanguageSet) -> Result<Arc<dyn OcrEngine>, OcrError> {
        let slot = {
            let mut slots = self
                .slots
                .lock()
                .map_err(|_| OcrError::Internal("Engine cache lock poisoned".to_string()))?;
            Arc::clone(slots.entry(languages.clone()).or_default())
        };

        if let Some(engine) = slot.engine.get() {
            tracing::debug!(
                "Reusing OCR engine '{}' for languages [{}]",
                engine.name(),
                engine.languages()
            );
            return Ok(Arc::clone(engine));
        }

        let _building = slot
            .init
            .lock()
            .map_err(|_| OcrError::Internal("Engine init lock poisoned".to_string()))?;

        // Another caller may have finished while we waited
        if let Some(engine) = slot.engine.get() {
            return Ok(Arc::clone(engine));
        }

        tracing::info!("Initializing OCR engine for languages [{}]...", languages);
        let engine = (self.factory)(languages).map_err(|e| {
            tracing::error!("Error initializing OCR engine for [{}]: {}", languages, e);
            e
        })?;
        tracing::info!(
            "OCR engine '{}' ({}) initialized with languages [{}]",
            engine.name(),
            engine.description(),
            engine.languages()
        );

        Ok(Arc::clone(slot.engine.get_or_init(|| engine)))
    }

    /// Language sets with an initialized engine, sorted
    pub fn cached(&self) -> Vec<String> {
        let slots = match self.slots.lock() {
            Ok(slots) => slots,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut sets: Vec<&LanguageSet> = slots
            .iter()
            .filter(|(_, slot)| slot.engine.get().is_some())
            .map(|(set, _)| set)
            .collect();
        sets.sort();
        sets.into_iter().map(|set| set.to_string()).collect()
    }
}
