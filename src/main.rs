use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod confidence;
mod config;
mod engine;
mod engines;
mod error;
mod highlight;
mod language;
mod ocr;
mod preprocessing;
mod server;

#[derive(Parser, Debug)]
#[command(name = "multilingual-ocr-server")]
#[command(about = "OCR server for English and Hindi images with keyword search")]
#[command(version)]
pub struct Args {
    /// Host address to bind to
    #[arg(long, env = "OCR_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "OCR_PORT", default_value = "9292")]
    pub port: u16,

    /// Default language when a request names none ("English", "Hindi",
    /// "English + Hindi", or a code such as "en+hi")
    #[arg(long, env = "OCR_DEFAULT_LANGUAGE", default_value = "en")]
    pub default_language: String,

    /// Maximum file size in bytes (default: 50MB)
    #[arg(long, env = "OCR_MAX_FILE_SIZE", default_value = "52428800")]
    pub max_file_size: usize,

    /// OCR backend ("ocrs" or "leptess"); defaults to the first compiled in
    #[arg(long, env = "OCR_ENGINE")]
    pub engine: Option<String>,

    /// Path to tessdata directory (downloaded to the user cache if not set)
    #[arg(long, env = "TESSDATA_PREFIX")]
    pub tessdata_path: Option<String>,

    /// Comma-separated language options to initialize at startup
    #[arg(long, env = "OCR_PRELOAD", value_delimiter = ',')]
    pub preload: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    /// Append diagnostics to this file in addition to stdout
    #[arg(long, env = "OCR_LOG_FILE")]
    pub log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Keep the guard alive so buffered file logs are flushed on exit
    let _log_guard = init_tracing(&args)?;

    let config = config::Config::from(args);

    tracing::info!(
        "Starting multilingual-ocr-server v{}",
        env!("CARGO_PKG_VERSION")
    );
    tracing::info!("Binding to {}:{}", config.host, config.port);

    server::run(config).await
}

fn init_tracing(args: &Args) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| args.log_level.clone().into());

    let (file_layer, guard) = match &args.log_file {
        Some(path) => {
            let dir = match path.parent() {
                Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
                _ => PathBuf::from("."),
            };
            let file_name = path
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("Invalid log file path: {:?}", path))?;
            std::fs::create_dir_all(&dir)?;

            // `never` rotates nothing and appends to the existing file
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    Ok(guard)
}
