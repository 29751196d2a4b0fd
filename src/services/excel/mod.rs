pub mod analyzer;
pub mod dates;
pub mod layout;
pub mod processor;
pub mod types;
pub mod writer;

pub use analyzer::ExcelAnalyzer;
pub use processor::{ExcelProcessor, RowTransformer};
