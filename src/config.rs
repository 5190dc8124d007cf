use crate::Args;

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Language option or code used when a request names none
    pub default_language: String,
    pub max_file_size: usize,
    /// OCR backend name; `None` picks the first compiled backend
    pub engine: Option<String>,
    pub tessdata_path: Option<String>,
    /// Language options to initialize at startup
    pub preload: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9292,
            default_language: "en".to_string(),
            max_file_size: 50 * 1024 * 1024,
            engine: None,
            tessdata_path: None,
            preload: Vec::new(),
        }
    }
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Self {
            host: args.host,
            port: args.port,
            default_language: args.default_language,
            max_file_size: args.max_file_size,
            engine: args.engine,
            tessdata_path: args.tessdata_path,
            preload: args
                .preload
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }
}
