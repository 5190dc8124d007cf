use crate::confidence::format_confidence;
use crate::config::Config;
use crate::engine::Detection;
use crate::engines::Backend;
use crate::error::OcrError;
use crate::highlight::KeywordSet;
use crate::language::{LanguageOption, LanguageSelection, LanguageSet};
use crate::ocr::{Extraction, OcrProcessor};
use crate::preprocessing::pipeline::StepTiming;
use crate::preprocessing::Preset;
use axum::{
    body::Bytes,
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::JsonRejection,
        DefaultBodyLimit, Multipart, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;

/// Room for the non-file form fields on top of the image size limit
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

const SUPPORTED_FORMATS: [&str; 6] = [
    "image/png",
    "image/jpeg",
    "image/gif",
    "image/bmp",
    "image/webp",
    "image/tiff",
];

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<OcrProcessor>,
    pub config: Arc<Config>,
}

/// OCR response
#[derive(Serialize)]
pub struct OcrResponse {
    pub text: String,
    pub engine: String,
    pub languages: String,
    pub detections: Vec<Detection>,
    pub confidence: Option<f32>,
    pub confidence_display: String,
    pub keywords: KeywordSet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlighted: Option<String>,
    pub warnings: Vec<String>,
    pub preprocessing: Vec<StepTiming>,
    pub processing_time_ms: u64,
}

/// Keywords as a comma-separated string or a list
#[derive(Deserialize)]
#[serde(untagged)]
pub enum KeywordInput {
    Text(String),
    List(Vec<String>),
}

impl From<KeywordInput> for KeywordSet {
    fn from(input: KeywordInput) -> Self {
        match input {
            KeywordInput::Text(text) => KeywordSet::parse(&text),
            KeywordInput::List(list) => KeywordSet::parse(&list.join(",")),
        }
    }
}

/// Highlight request for text the client already has
#[derive(Deserialize)]
pub struct HighlightRequest {
    pub text: String,
    pub keywords: KeywordInput,
}

#[derive(Serialize)]
pub struct HighlightResponse {
    pub highlighted: String,
    pub keywords: KeywordSet,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Server info response
#[derive(Serialize)]
pub struct InfoResponse {
    pub version: String,
    pub available_engines: Vec<String>,
    pub supported_formats: Vec<String>,
    pub language_options: Vec<LanguageOption>,
    pub default_language: String,
    pub loaded_languages: Vec<String>,
    pub max_file_size_bytes: usize,
}

/// Fields of an OCR upload form
struct OcrForm {
    data: Bytes,
    languages: LanguageSet,
    keywords: KeywordSet,
    keywords_given: bool,
    preset: Preset,
}

/// Run the HTTP server
pub async fn run(config: Config) -> anyhow::Result<()> {
    // Fail at startup rather than on every request
    LanguageSet::resolve(&config.default_language)?;

    let processor = Arc::new(OcrProcessor::new(&config)?);

    if !config.preload.is_empty() {
        tracing::info!("Preloading OCR engines: {}", config.preload.join(", "));
        let preloader = Arc::clone(&processor);
        let selections = config.preload.clone();
        tokio::task::spawn_blocking(move || preloader.preload(&selections)).await??;
    }

    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState {
        processor,
        config: Arc::new(config),
    };

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app(state)).await?;

    Ok(())
}

/// Build the router
pub fn app(state: AppState) -> Router {
    let body_limit = state.config.max_file_size + FORM_OVERHEAD_BYTES;

    Router::new()
        .route("/ocr", post(handle_ocr))
        .route("/ocr/download", post(handle_download))
        .route("/highlight", post(handle_highlight))
        .route("/health", get(handle_health))
        .route("/info", get(handle_info))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Read the upload form
async fn parse_form(state: &AppState, mut multipart: Multipart) -> Result<OcrForm, OcrError> {
    let max = state.config.max_file_size;
    let mut file_data: Option<Bytes> = None;
    let mut content_type: Option<String> = None;
    let mut language: Option<String> = None;
    let mut keywords: Option<String> = None;
    let mut preprocess: Option<String> = None;
    let mut received = 0usize;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, "Failed to parse multipart", received, max))?
    {
        let name = field.name().unwrap_or_default().to_string();

        match name.as_str() {
            "file" => {
                content_type = field.content_type().map(|s| s.to_string());
                let data = read_file(field, &mut received, max).await?;
                file_data = Some(data);
            }
            "language" | "languages" => language = Some(read_text(field, &name).await?),
            "keywords" => keywords = Some(read_text(field, &name).await?),
            "preprocess" => preprocess = Some(read_text(field, &name).await?),
            _ => {
                // Ignore unknown fields
            }
        }
    }

    let data = file_data.ok_or(OcrError::MissingFile)?;
    if data.is_empty() {
        return Err(OcrError::MissingFile);
    }

    let mime = content_type.unwrap_or_else(|| "application/octet-stream".to_string());
    if !SUPPORTED_FORMATS.contains(&mime.as_str()) {
        tracing::warn!("Received file with content type: {}", mime);
    }

    let languages = match language.as_deref().map(str::trim) {
        Some(value) if !value.is_empty() => LanguageSet::resolve(value)?,
        _ => LanguageSet::resolve(&state.config.default_language)?,
    };

    let preset = match preprocess.as_deref().map(str::trim) {
        Some(value) if !value.is_empty() => Preset::from_str(value).ok_or_else(|| {
            OcrError::InvalidRequest(format!("Unknown preprocess preset '{}'", value))
        })?,
        _ => Preset::default(),
    };

    let keywords_given = keywords.as_deref().is_some_and(|k| !k.trim().is_empty());
    let keywords = keywords
        .as_deref()
        .map(KeywordSet::parse)
        .unwrap_or_default();

    Ok(OcrForm {
        data,
        languages,
        keywords,
        keywords_given,
        preset,
    })
}

/// Read the file part chunk by chunk, stopping once it passes `max` bytes
async fn read_file(
    mut field: axum::extract::multipart::Field<'_>,
    received: &mut usize,
    max: usize,
) -> Result<Bytes, OcrError> {
    let mut data = Vec::new();

    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| multipart_error(e, "Failed to read file data", *received, max))?
    {
        *received += chunk.len();
        if *received > max {
            return Err(OcrError::ImageTooLarge {
                size: *received,
                max,
            });
        }
        data.extend_from_slice(&chunk);
    }

    Ok(Bytes::from(data))
}

/// Body-limit failures become 413; anything else is a malformed form
fn multipart_error(error: MultipartError, context: &str, received: usize, max: usize) -> OcrError {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        OcrError::ImageTooLarge {
            size: received.max(max + 1),
            max,
        }
    } else {
        OcrError::InvalidRequest(format!("{}: {}", context, error))
    }
}

async fn read_text(field: axum::extract::multipart::Field<'_>, name: &str) -> Result<String, OcrError> {
    field
        .text()
        .await
        .map_err(|e| OcrError::InvalidRequest(format!("Invalid {}: {}", name, e)))
}

/// Run recognition off the async runtime
async fn extract(state: &AppState, form: &OcrForm) -> Result<Extraction, OcrError> {
    let processor = Arc::clone(&state.processor);
    let data = form.data.clone();
    let languages = form.languages.clone();
    let preset = form.preset;

    tokio::task::spawn_blocking(move || processor.process(&data, &languages, preset))
        .await
        .map_err(|e| OcrError::Internal(format!("OCR task failed: {}", e)))?
}

/// Handle OCR requests
async fn handle_ocr(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<OcrResponse>, OcrError> {
    let start = Instant::now();

    let form = parse_form(&state, multipart?).await?;
    let extraction = extract(&state, &form).await?;

    let mut warnings = extraction.warnings;
    let highlighted = if form.keywords.is_empty() {
        if form.keywords_given {
            warnings.push("Please enter valid keyword(s)".to_string());
        }
        None
    } else {
        Some(form.keywords.highlight(&extraction.text))
    };

    let processing_time_ms = start.elapsed().as_millis() as u64;

    tracing::info!(
        "OCR completed in {}ms, confidence: {}, text length: {}",
        processing_time_ms,
        format_confidence(extraction.confidence),
        extraction.text.len()
    );

    Ok(Json(OcrResponse {
        text: extraction.text,
        engine: extraction.engine.to_string(),
        languages: extraction.languages,
        detections: extraction.detections,
        confidence: extraction.confidence,
        confidence_display: format_confidence(extraction.confidence),
        keywords: form.keywords,
        highlighted,
        warnings,
        preprocessing: extraction.preprocessing,
        processing_time_ms,
    }))
}

/// Handle download requests: the extracted text as a plain-text attachment
async fn handle_download(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, OcrError> {
    let form = parse_form(&state, multipart?).await?;
    let extraction = extract(&state, &form).await?;

    let download = extraction.download().ok_or(OcrError::NoText)?;
    tracing::info!(
        "Serving {} ({} bytes)",
        download.file_name,
        download.body.len()
    );

    let headers = [
        (header::CONTENT_TYPE, download.content_type.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", download.file_name),
        ),
    ];

    Ok((headers, download.body).into_response())
}

/// Handle keyword highlighting of caller-supplied text
async fn handle_highlight(
    request: Result<Json<HighlightRequest>, JsonRejection>,
) -> Result<Json<HighlightResponse>, OcrError> {
    let Json(request) = request?;
    let keywords = KeywordSet::from(request.keywords);
    Ok(Json(HighlightResponse {
        highlighted: keywords.highlight(&request.text),
        keywords,
    }))
}

/// Handle health check requests
async fn handle_health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Handle info requests
async fn handle_info(State(state): State<AppState>) -> impl IntoResponse {
    Json(InfoResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        available_engines: Backend::available()
            .into_iter()
            .map(String::from)
            .collect(),
        supported_formats: SUPPORTED_FORMATS.iter().map(|s| s.to_string()).collect(),
        language_options: LanguageSelection::ALL
            .into_iter()
            .map(LanguageOption::from)
            .collect(),
        default_language: state.config.default_language.clone(),
        loaded_languages: state.processor.loaded_languages(),
        max_file_size_bytes: state.config.max_file_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::DetectionRecord;
    use crate::engines::testing::fake_factory;
    use crate::engines::EngineCache;
    use crate::ocr::tests::{malformed, png_bytes, word};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use std::sync::atomic::AtomicUsize;
    use tower::ServiceExt;

    const BOUNDARY: &str = "ocr-test-boundary";

    fn test_app(records: Vec<DetectionRecord>) -> Router {
        test_app_with_config(records, Config::default())
    }

    fn test_app_with_config(records: Vec<DetectionRecord>, config: Config) -> Router {
        let cache = EngineCache::new(fake_factory(records, Arc::new(AtomicUsize::new(0))));
        app(AppState {
            processor: Arc::new(OcrProcessor::with_cache(cache)),
            config: Arc::new(config),
        })
    }

    fn sample_records() -> Vec<DetectionRecord> {
        vec![word("Hello", 70.0), malformed(1), word("World", 90.0)]
    }

    /// Multipart body with an optional PNG file part and text fields
    fn form_request(uri: &str, with_file: bool, fields: &[(&str, &str)]) -> Request<Body> {
        let file = with_file.then(png_bytes);
        upload_request(uri, file.as_deref(), fields)
    }

    fn upload_request(uri: &str, file: Option<&[u8]>, fields: &[(&str, &str)]) -> Request<Body> {
        let mut body = Vec::new();
        if let Some(file) = file {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"scan.png\"\r\nContent-Type: image/png\r\n\r\n",
                    BOUNDARY
                )
                .as_bytes(),
            );
            body.extend_from_slice(file);
            body.extend_from_slice(b"\r\n");
        }
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                    BOUNDARY, name, value
                )
                .as_bytes(),
            );
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_ocr_with_keywords() {
        let response = test_app(sample_records())
            .oneshot(form_request(
                "/ocr",
                true,
                &[("language", "English + Hindi"), ("keywords", "world, ")],
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["text"], "Hello World");
        assert_eq!(body["languages"], "en+hi");
        assert_eq!(body["confidence"], 80.0);
        assert_eq!(body["confidence_display"], "80.00%");
        assert_eq!(body["highlighted"], "Hello **World**");
        assert_eq!(body["keywords"], serde_json::json!(["world"]));
        assert_eq!(body["warnings"].as_array().unwrap().len(), 1);
        assert_eq!(body["detections"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_ocr_without_detections() {
        let response = test_app(vec![])
            .oneshot(form_request("/ocr", true, &[]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["text"], "");
        assert!(body["confidence"].is_null());
        assert_eq!(body["confidence_display"], "Not Available");
        assert!(body.get("highlighted").is_none());
    }

    #[tokio::test]
    async fn test_blank_keywords_warn() {
        let response = test_app(sample_records())
            .oneshot(form_request("/ocr", true, &[("keywords", " , ")]))
            .await
            .unwrap();

        let body = json_body(response).await;
        assert!(body.get("highlighted").is_none());
        let warnings = body["warnings"].as_array().unwrap();
        assert!(warnings
            .iter()
            .any(|w| w == "Please enter valid keyword(s)"));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let response = test_app(sample_records())
            .oneshot(form_request("/ocr", false, &[("language", "en")]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["code"], "MISSING_FILE");
    }

    #[tokio::test]
    async fn test_engine_init_failure_reported() {
        let response = test_app(sample_records())
            .oneshot(form_request("/ocr", true, &[("language", "en+fr")]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(response).await["code"], "INIT_ERROR");
    }

    #[tokio::test]
    async fn test_unknown_preset_rejected() {
        let response = test_app(sample_records())
            .oneshot(form_request("/ocr", true, &[("preprocess", "sepia")]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_oversized_upload_rejected() {
        let config = Config {
            max_file_size: 1000,
            ..Default::default()
        };
        let response = test_app_with_config(sample_records(), config)
            .oneshot(upload_request("/ocr", Some(vec![0u8; 200_000].as_slice()), &[]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let body = json_body(response).await;
        assert_eq!(body["code"], "IMAGE_TOO_LARGE");
        assert!(body["error"].as_str().unwrap().contains("max: 1000 bytes"));
    }

    #[tokio::test]
    async fn test_upload_just_over_limit_rejected() {
        let config = Config {
            max_file_size: 1000,
            ..Default::default()
        };
        let response = test_app_with_config(sample_records(), config)
            .oneshot(upload_request("/ocr", Some(vec![0u8; 1001].as_slice()), &[]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(json_body(response).await["code"], "IMAGE_TOO_LARGE");
    }

    #[tokio::test]
    async fn test_non_multipart_ocr_request_rejected() {
        let request = Request::builder()
            .method("POST")
            .uri("/ocr")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"file": "scan.png"}"#))
            .unwrap();

        let response = test_app(sample_records()).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["code"], "INVALID_REQUEST");
    }

    #[tokio::test]
    async fn test_download_attachment() {
        let response = test_app(sample_records())
            .oneshot(form_request("/ocr/download", true, &[("language", "hi")]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"extracted_text.txt\""
        );
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"Hello World");
    }

    #[tokio::test]
    async fn test_download_without_text() {
        let response = test_app(vec![])
            .oneshot(form_request("/ocr/download", true, &[]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json_body(response).await["code"], "NO_TEXT");
    }

    #[tokio::test]
    async fn test_highlight_endpoint() {
        let request = Request::builder()
            .method("POST")
            .uri("/highlight")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                r#"{"text": "abc ABC", "keywords": ["abc", "  "]}"#,
            ))
            .unwrap();

        let response = test_app(vec![]).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["highlighted"], "**abc** **ABC**");
        assert_eq!(body["keywords"], serde_json::json!(["abc"]));
    }

    #[tokio::test]
    async fn test_highlight_rejects_malformed_body() {
        let request = Request::builder()
            .method("POST")
            .uri("/highlight")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"text": 1}"#))
            .unwrap();

        let response = test_app(vec![]).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["code"], "INVALID_REQUEST");
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_info_lists_language_options() {
        let app = test_app(sample_records());
        let _ = app
            .clone()
            .oneshot(form_request("/ocr", true, &[("language", "Hindi")]))
            .await
            .unwrap();

        let response = app
            .oneshot(Request::get("/info").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = json_body(response).await;

        let options = body["language_options"].as_array().unwrap();
        assert_eq!(options.len(), 3);
        assert_eq!(options[2]["label"], "English + Hindi");
        assert_eq!(options[2]["code"], "en+hi");
        assert_eq!(body["loaded_languages"], serde_json::json!(["hi"]));
    }

    #[tokio::test]
    async fn test_health() {
        let response = test_app(vec![])
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(json_body(response).await["status"], "ok");
    }
}
