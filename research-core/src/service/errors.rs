// service/errors.rs

use crate::ingest::IngestError;
use research_common::data::DataError;
use thiserror::Error;

/// Service layer error types
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Ingest error: {0}")]
    Ingest(#[from] IngestError),

    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Task error: {0}")]
    Task(String),
}
