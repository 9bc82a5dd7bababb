// hallticket-pdf: error types shared by the library and the CLI

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Unexpected response from backend: {0}")]
    Decode(String),
    #[error("Failed to load image: {0}")]
    Image(String),
    #[error("Failed to render hall ticket: {0}")]
    Render(String),
    #[error("Failed to assemble document: {0}")]
    Assembly(String),
    #[error("Failed to create PDF: {0}")]
    Pdf(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Batch was cancelled")]
    Cancelled,
    #[error("Another hall ticket download is already in progress")]
    BatchInFlight,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
