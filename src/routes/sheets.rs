use axum::{
    extract::State,
    routing::post,
    Router,
    Json,
    http::Method,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use crate::{
    AppState,
    config::Config,
    error::AppError,
    models::{BatchAnalysis, FileError, FileReport},
    services::file_processor::{
        self, admit_batch, analyze_file, process_batch, write_outputs, SourceFile, WrittenFile,
    },
};
use tower_http::cors::{CorsLayer, Any};

pub fn routes() -> Router<Arc<AppState>> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/sheets/analyze", post(analyze_sheets))
        .route("/sheets/process", post(process_sheets))
        .layer(cors)
}

#[derive(Debug, Deserialize)]
pub struct FileInfo {
    name: String,
    signed_url: String,
}

#[derive(Debug, Deserialize)]
pub struct SheetsRequest {
    files: Vec<FileInfo>,
}

#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    outputs: Vec<WrittenFile>,
    errors: Vec<FileError>,
}

type Download = Result<SourceFile, FileReport>;

async fn download_all(config: &Config, files: &[FileInfo]) -> Vec<Download> {
    let mut downloads = Vec::with_capacity(files.len());
    for file in files {
        let start = std::time::Instant::now();
        let download = match file_processor::load_file_from_url(&file.signed_url, config.max_file_size).await {
            Ok(data) => {
                tracing::info!("Downloaded {} ({}KB) in {:?}", file.name, data.len() / 1024, start.elapsed());
                Ok(SourceFile::new(file.name.clone(), data))
            }
            Err(e) => {
                tracing::error!("Failed to download {}: {}", file.name, e);
                Err(FileReport::Failed {
                    file_name: file.name.clone(),
                    error: e.to_string(),
                })
            }
        };
        downloads.push(download);
    }
    downloads
}

fn analyze_downloads(downloads: &[Download]) -> BatchAnalysis {
    BatchAnalysis::new(
        downloads
            .iter()
            .map(|d| match d {
                Ok(source) => analyze_file(source),
                Err(report) => report.clone(),
            })
            .collect(),
    )
}

fn require_files(request: &SheetsRequest) -> Result<(), AppError> {
    if request.files.is_empty() {
        return Err(AppError::InvalidInput("No file provided".to_string()));
    }
    Ok(())
}

async fn analyze_sheets(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SheetsRequest>,
) -> Result<Json<BatchAnalysis>, AppError> {
    require_files(&request)?;
    let start = std::time::Instant::now();
    tracing::info!("Analyzing {} files", request.files.len());

    let downloads = download_all(&state.config, &request.files).await;
    let analysis = tokio::task::spawn_blocking(move || analyze_downloads(&downloads)).await?;

    tracing::info!(
        "Analysis finished in {:?}: {} valid, {} invalid",
        start.elapsed(),
        analysis.valid_files,
        analysis.invalid_files
    );
    Ok(Json(analysis))
}

async fn process_sheets(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SheetsRequest>,
) -> Result<Json<ProcessResponse>, AppError> {
    require_files(&request)?;
    let start = std::time::Instant::now();
    tracing::info!("Processing {} files", request.files.len());

    let downloads = download_all(&state.config, &request.files).await;
    let outcome = tokio::task::spawn_blocking(move || {
        admit_batch(&analyze_downloads(&downloads))?;
        let sources: Vec<SourceFile> = downloads.into_iter().filter_map(Result::ok).collect();
        Ok::<_, AppError>(process_batch(&sources))
    })
    .await??;

    let saved = write_outputs(&state.config.output_dir, &outcome.successful_outputs).await?;
    tracing::info!("Total processing completed in {:?}", start.elapsed());

    let mut errors = outcome.errors;
    errors.extend(saved.errors);
    Ok(Json(ProcessResponse {
        outputs: saved.written,
        errors,
    }))
}
