// ingest/errors.rs

use research_common::data::DataError;
use thiserror::Error;

/// Error types for sheet ingestion
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Required column '{0}' not found")]
    MissingColumn(String),

    #[error("No valid rows in sheet '{0}'")]
    NoValidRows(String),

    #[error("No size tier matches {0}")]
    NoMatchingTier(String),

    #[error("No FBA fee band matches {0}")]
    NoMatchingFeeBand(String),

    #[error("Workbook error: {0}")]
    Workbook(String),

    #[error("Data error: {0}")]
    Data(#[from] DataError),
}

// Convert from common error types
impl From<calamine::Error> for IngestError {
    fn from(err: calamine::Error) -> Self {
        IngestError::Workbook(err.to_string())
    }
}

pub type IngestResult<T> = Result<T, IngestError>;
