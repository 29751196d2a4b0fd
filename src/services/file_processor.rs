use std::collections::HashSet;
use std::path::{Path, PathBuf};

use bytes::{Bytes, BytesMut};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::Serialize;

use crate::error::{AppError, SheetError};
use crate::models::{BatchAnalysis, BatchOutcome, FileError, FileReport, ProcessedFile};
use crate::services::excel::types::CanonicalDate;
use crate::services::excel::{ExcelAnalyzer, ExcelProcessor};

static EXCEL_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\.(xls|xlsx)$").expect("valid regex"));

const OUTPUT_PREFIX: &str = "processed_";

/// Raw bytes of one input spreadsheet and the name it arrived under.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub data: Bytes,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

pub fn is_supported_file(name: &str) -> bool {
    EXCEL_SUFFIX.is_match(name)
}

/// `stock.xls` becomes `processed_stock.xlsx`. Any directory part of the
/// input name is dropped.
pub fn output_name(input_name: &str) -> String {
    let base = input_name
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or(input_name);
    format!("{}{}", OUTPUT_PREFIX, EXCEL_SUFFIX.replace(base, ".xlsx"))
}

fn check_format(name: &str) -> Result<(), SheetError> {
    if is_supported_file(name) {
        Ok(())
    } else {
        Err(SheetError::UnsupportedFormat(name.to_string()))
    }
}

pub fn analyze_file(file: &SourceFile) -> FileReport {
    let result = check_format(&file.name).and_then(|_| ExcelAnalyzer.analyze_from_bytes(&file.name, &file.data));
    match result {
        Ok(analysis) => FileReport::Analyzed(analysis),
        Err(e) => {
            tracing::error!("Failed to analyze {}: {}", file.name, e);
            FileReport::Failed {
                file_name: file.name.clone(),
                error: e.to_string(),
            }
        }
    }
}

pub fn analyze_batch(files: &[SourceFile]) -> BatchAnalysis {
    let batch = BatchAnalysis::new(files.iter().map(analyze_file).collect());
    tracing::info!(
        "Analyzed {} files: {} ready, {} with errors",
        batch.files.len(),
        batch.valid_files,
        batch.invalid_files
    );
    batch
}

/// Refuses the whole batch when any file failed analysis or is missing
/// required columns.
pub fn admit_batch(analysis: &BatchAnalysis) -> Result<(), AppError> {
    if analysis.ready {
        return Ok(());
    }
    let rejected = analysis.invalid_file_names();
    tracing::warn!("Batch refused, files with errors: {:?}", rejected);
    Err(AppError::BatchRejected(rejected))
}

/// Processes files one after another; a failing file is recorded and the
/// rest of the batch carries on.
pub fn process_batch(files: &[SourceFile]) -> BatchOutcome {
    process_batch_with(files, || chrono::Local::now().date_naive())
}

/// As [`process_batch`], with `today` sampled once per file from `clock`.
pub fn process_batch_with(files: &[SourceFile], clock: impl Fn() -> CanonicalDate) -> BatchOutcome {
    let mut outcome = BatchOutcome::default();

    for file in files {
        let processor = ExcelProcessor::new(clock());
        let result = check_format(&file.name).and_then(|_| processor.process_file(&file.name, &file.data));
        match result {
            Ok(data) => outcome.successful_outputs.push(ProcessedFile {
                name: output_name(&file.name),
                original_name: file.name.clone(),
                data,
            }),
            Err(e) => {
                tracing::error!("Error processing file {}: {}", file.name, e);
                outcome.errors.push(FileError {
                    file_name: file.name.clone(),
                    message: format!("Error in file {}: {}", file.name, e),
                });
            }
        }
    }

    tracing::info!(
        "Batch finished: {} processed, {} failed",
        outcome.successful_outputs.len(),
        outcome.errors.len()
    );
    outcome
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WrittenFile {
    pub name: String,
    pub original_name: String,
    pub path: PathBuf,
    pub size: usize,
}

/// Files that made it to disk, and the ones that did not.
#[derive(Debug, Default)]
pub struct WriteOutcome {
    pub written: Vec<WrittenFile>,
    pub errors: Vec<FileError>,
}

/// Saves every output under `dir`. A file that cannot be written is
/// recorded and the rest are still saved; names repeated within one batch
/// get a `_<n>` suffix instead of overwriting each other.
pub async fn write_outputs(dir: &Path, outputs: &[ProcessedFile]) -> Result<WriteOutcome, AppError> {
    tokio::fs::create_dir_all(dir).await?;
    let mut outcome = WriteOutcome::default();
    let mut taken = HashSet::new();

    for file in outputs {
        let name = unique_file_name(&file.name, &mut taken);
        let path = dir.join(&name);
        match tokio::fs::write(&path, &file.data).await {
            Ok(()) => {
                tracing::info!("Wrote {} ({} bytes)", path.display(), file.data.len());
                outcome.written.push(WrittenFile {
                    name,
                    original_name: file.original_name.clone(),
                    path,
                    size: file.data.len(),
                });
            }
            Err(e) => {
                tracing::error!("Failed to write {}: {}", path.display(), e);
                outcome.errors.push(FileError {
                    file_name: file.original_name.clone(),
                    message: format!("Error in file {}: unable to save {}: {}", file.original_name, name, e),
                });
            }
        }
    }
    Ok(outcome)
}

fn unique_file_name(name: &str, taken: &mut HashSet<String>) -> String {
    if taken.insert(name.to_string()) {
        return name.to_string();
    }
    let (stem, ext) = match name.rfind('.') {
        Some(dot) if dot > 0 => name.split_at(dot),
        _ => (name, ""),
    };
    let mut counter = 1;
    loop {
        let candidate = format!("{}_{}{}", stem, counter, ext);
        if taken.insert(candidate.clone()) {
            tracing::warn!("Output {:?} already used in this batch, saving as {:?}", name, candidate);
            return candidate;
        }
        counter += 1;
    }
}

pub async fn load_file_from_url(url: &str, max_file_size: usize) -> Result<Bytes, AppError> {
    fetch_with_limit(&Client::new(), url, max_file_size).await
}

/// Downloads `url`, refusing bodies over `max_file_size` bytes: up front when
/// the server announces a length, otherwise as soon as the running total
/// passes the limit.
async fn fetch_with_limit(client: &Client, url: &str, max_file_size: usize) -> Result<Bytes, AppError> {
    let mut response = client
        .get(url)
        .send()
        .await
        .map_err(|e| AppError::HttpError(format!("Failed to fetch file: {}", e)))?;

    if !response.status().is_success() {
        return Err(AppError::HttpError(
            format!("Failed to fetch file. Status: {}", response.status())
        ));
    }

    if let Some(announced) = response.content_length() {
        check_size(usize::try_from(announced).unwrap_or(usize::MAX), max_file_size)?;
    }

    let mut data = BytesMut::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| AppError::HttpError(format!("Failed to read response bytes: {}", e)))?
    {
        check_size(data.len() + chunk.len(), max_file_size)?;
        data.extend_from_slice(&chunk);
    }
    Ok(data.freeze())
}

fn check_size(size: usize, max_file_size: usize) -> Result<(), AppError> {
    if size > max_file_size {
        return Err(AppError::Sheet(SheetError::UnreadableSource(format!(
            "file is over {} bytes, limit is {}",
            size, max_file_size
        ))));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_names_are_normalised_to_xlsx() {
        assert_eq!(output_name("stock.xlsx"), "processed_stock.xlsx");
        assert_eq!(output_name("stock.XLS"), "processed_stock.xlsx");
        assert_eq!(output_name("my.stock.xls"), "processed_my.stock.xlsx");
        assert_eq!(output_name("notes.txt"), "processed_notes.txt");
        assert_eq!(output_name("sub/stock.xlsx"), "processed_stock.xlsx");
        assert_eq!(output_name("../../etc/stock.xls"), "processed_stock.xlsx");
        assert_eq!(output_name(r"C:\uploads\stock.XLSX"), "processed_stock.xlsx");
    }

    #[test]
    fn only_excel_names_are_supported() {
        assert!(is_supported_file("a.xlsx"));
        assert!(is_supported_file("A.XLS"));
        assert!(!is_supported_file("a.csv"));
        assert!(!is_supported_file("xlsx"));
    }

    #[test]
    fn unsupported_files_fail_analysis_by_name() {
        let report = analyze_file(&SourceFile::new("data.csv", b"a,b".to_vec()));
        assert!(!report.is_valid());
        assert_eq!(report.file_name(), "data.csv");
        assert!(matches!(report, FileReport::Failed { ref error, .. } if error.contains("unsupported")));
    }

    #[test]
    fn admission_lists_every_invalid_file() {
        let batch = analyze_batch(&[
            SourceFile::new("one.csv", b"x".to_vec()),
            SourceFile::new("two.xlsx", b"not a zip".to_vec()),
        ]);
        assert!(!batch.ready);
        assert_eq!(batch.invalid_files, 2);
        match admit_batch(&batch) {
            Err(AppError::BatchRejected(names)) => assert_eq!(names, vec!["one.csv", "two.xlsx"]),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn empty_batch_is_admitted() {
        let batch = analyze_batch(&[]);
        assert!(batch.ready);
        assert!(admit_batch(&batch).is_ok());
    }

    fn processed(name: &str, original: &str, data: &[u8]) -> ProcessedFile {
        ProcessedFile {
            name: name.to_string(),
            original_name: original.to_string(),
            data: data.to_vec(),
        }
    }

    #[tokio::test]
    async fn repeated_output_names_get_suffixes() {
        let dir = tempfile::tempdir().unwrap();
        let outputs = [
            processed("processed_stock.xlsx", "a/stock.xlsx", b"one"),
            processed("processed_stock.xlsx", "b/stock.xlsx", b"two"),
            processed("processed_stock.xlsx", "c/stock.xls", b"three"),
        ];
        let outcome = write_outputs(dir.path(), &outputs).await.unwrap();

        assert!(outcome.errors.is_empty());
        let names: Vec<&str> = outcome.written.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, vec!["processed_stock.xlsx", "processed_stock_1.xlsx", "processed_stock_2.xlsx"]);
        assert_eq!(std::fs::read(dir.path().join("processed_stock.xlsx")).unwrap(), b"one");
        assert_eq!(std::fs::read(dir.path().join("processed_stock_1.xlsx")).unwrap(), b"two");
        assert_eq!(outcome.written[2].original_name, "c/stock.xls");
    }

    #[tokio::test]
    async fn failed_write_is_recorded_and_the_rest_are_saved() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("processed_blocked.xlsx")).unwrap();
        let outputs = [
            processed("processed_blocked.xlsx", "blocked.xlsx", b"x"),
            processed("processed_fine.xlsx", "fine.xlsx", b"y"),
        ];
        let outcome = write_outputs(dir.path(), &outputs).await.unwrap();

        assert_eq!(outcome.written.len(), 1);
        assert_eq!(outcome.written[0].name, "processed_fine.xlsx");
        assert_eq!(std::fs::read(&outcome.written[0].path).unwrap(), b"y");
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].file_name, "blocked.xlsx");
        assert!(outcome.errors[0].message.starts_with("Error in file blocked.xlsx"));
    }

    async fn serve_once(response: Vec<u8>) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 2048];
            let _ = socket.read(&mut request).await;
            let _ = socket.write_all(&response).await;
            let _ = socket.shutdown().await;
        });
        format!("http://{}/stock.xlsx", addr)
    }

    fn local_client() -> Client {
        Client::builder().no_proxy().build().unwrap()
    }

    fn is_too_large(result: &Result<Bytes, AppError>) -> bool {
        matches!(result, Err(AppError::Sheet(SheetError::UnreadableSource(msg))) if msg.contains("limit is 16"))
    }

    #[tokio::test]
    async fn announced_length_over_the_limit_is_refused() {
        let mut response = b"HTTP/1.1 200 OK\r\nContent-Length: 64\r\nConnection: close\r\n\r\n".to_vec();
        response.extend_from_slice(&[b'x'; 64]);
        let url = serve_once(response).await;

        let result = fetch_with_limit(&local_client(), &url, 16).await;
        assert!(is_too_large(&result), "got {result:?}");
    }

    #[tokio::test]
    async fn unannounced_body_is_cut_off_at_the_limit() {
        let mut response = b"HTTP/1.1 200 OK\r\nConnection: close\r\n\r\n".to_vec();
        response.extend_from_slice(&[b'x'; 64]);
        let url = serve_once(response).await;

        let result = fetch_with_limit(&local_client(), &url, 16).await;
        assert!(is_too_large(&result), "got {result:?}");
    }

    #[tokio::test]
    async fn body_within_the_limit_is_returned() {
        let mut response = b"HTTP/1.1 200 OK\r\nContent-Length: 8\r\nConnection: close\r\n\r\n".to_vec();
        response.extend_from_slice(b"workbook");
        let url = serve_once(response).await;

        let data = fetch_with_limit(&local_client(), &url, 16).await.unwrap();
        assert_eq!(&data[..], b"workbook");
    }
}
