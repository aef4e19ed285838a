use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum CatalogError {
    #[error("SDMX request failed: {0}")]
    Http(String),

    #[error("SDMX service returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("expected CSV but the service answered with content type `{content_type}`: {body}")]
    UnexpectedContentType { content_type: String, body: String },

    #[error("failed to parse {document} document: {message}")]
    Xml { document: String, message: String },

    #[error("invalid item key: {0}")]
    InvalidItemKey(String),

    #[error("unknown agency: {0}")]
    UnknownAgency(String),

    #[error("operation not supported: {0}")]
    Unsupported(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),
}
