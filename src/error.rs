//! Error types for rendering engines, the benchmark harness and document persistence.

use std::path::PathBuf;
use thiserror::Error;

use crate::store::StoredDocument;

/// Result type alias for crate operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building engines, rendering letters or running benchmarks
#[derive(Error, Debug)]
pub enum Error {
    /// A bundled asset (font, template, report definition) is missing
    #[error("Asset not found: {0}")]
    AssetMissing(PathBuf),

    /// The letter model or markup handed to an engine is unusable
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Template substitution failed
    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),

    /// Markup could not be parsed
    #[error("Markup error: {0}")]
    Markup(String),

    /// Report definition could not be compiled or filled
    #[error("Report error: {0}")]
    Report(String),

    /// Font program could not be read
    #[error("Font error: {0}")]
    Font(String),

    /// Image payload could not be decoded or encoded
    #[error("Image error: {0}")]
    Image(String),

    /// PDF assembly or parsing failed
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    /// A whole engine run was aborted by a failing document
    #[error("Engine run failed for '{engine}' at document {document}: {source}")]
    EngineRunFailed {
        engine: String,
        document: usize,
        #[source]
        source: Box<Error>,
    },

    /// The document store rejected a batch; `pending` holds the rendered documents for a retry
    #[error("Persistence failed after {resume_at} documents: {reason}")]
    Persistence {
        reason: String,
        resume_at: usize,
        pending: Vec<StoredDocument>,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::Image(err.to_string())
    }
}

impl From<base64::DecodeError> for Error {
    fn from(err: base64::DecodeError) -> Self {
        Error::Image(format!("invalid base64 payload: {err}"))
    }
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::Markup(err.to_string())
    }
}

impl From<quick_xml::DeError> for Error {
    fn from(err: quick_xml::DeError) -> Self {
        Error::Report(err.to_string())
    }
}

impl Error {
    /// Whether this error was raised while constructing an engine because an asset is absent
    pub fn is_asset_missing(&self) -> bool {
        matches!(self, Error::AssetMissing(_))
    }

    /// Whether this error rejects the caller's input rather than reporting a renderer fault
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Error::InvalidInput(_))
    }
}
