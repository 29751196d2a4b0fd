use serde::Serialize;

use crate::services::excel::layout::PlannedColumn;

/// Per-file analysis handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAnalysis {
    pub file_name: String,
    pub total_columns: usize,
    pub total_data_rows: usize,
    pub existing_headers: Vec<String>,
    pub last_filled_column_label: Option<String>,
    pub last_filled_column_letter: Option<String>,
    pub planned_new_columns: Vec<PlannedColumn>,
    pub missing_required_columns: Vec<String>,
    pub is_valid: bool,
}

/// Outcome of analysing one file: either its record or why it could not be read.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FileReport {
    Analyzed(FileAnalysis),
    #[serde(rename_all = "camelCase")]
    Failed { file_name: String, error: String },
}

impl FileReport {
    pub fn file_name(&self) -> &str {
        match self {
            FileReport::Analyzed(a) => &a.file_name,
            FileReport::Failed { file_name, .. } => file_name,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, FileReport::Analyzed(a) if a.is_valid)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchAnalysis {
    pub files: Vec<FileReport>,
    pub valid_files: usize,
    pub invalid_files: usize,
    pub ready: bool,
}

impl BatchAnalysis {
    pub fn new(files: Vec<FileReport>) -> Self {
        let valid_files = files.iter().filter(|f| f.is_valid()).count();
        let invalid_files = files.len() - valid_files;
        Self {
            files,
            valid_files,
            invalid_files,
            ready: invalid_files == 0,
        }
    }

    pub fn invalid_file_names(&self) -> Vec<String> {
        self.files
            .iter()
            .filter(|f| !f.is_valid())
            .map(|f| f.file_name().to_string())
            .collect()
    }
}

/// A transformed workbook ready to be handed back.
#[derive(Debug, Clone)]
pub struct ProcessedFile {
    pub name: String,
    pub original_name: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileError {
    pub file_name: String,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub successful_outputs: Vec<ProcessedFile>,
    pub errors: Vec<FileError>,
}
