use thiserror::Error;

#[derive(Error, Debug)]
pub enum PdfToolkitError {
    #[error("Failed to parse PDF: {0}")]
    ParseError(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Unsupported image format: {0}")]
    UnsupportedImageFormat(String),

    #[error("No text content could be extracted from this PDF")]
    NoExtractableText,

    #[error("Text extraction failed: {0}")]
    ExtractionError(String),

    #[error("Rendering capability unavailable: {0}")]
    EnvironmentError(String),

    #[error("Failed to render page {page}: {reason}")]
    RenderError { page: u32, reason: String },

    #[error("PDF operation failed: {0}")]
    OperationError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// User-correctable selection problems
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("No valid pages in selection")]
    NoValidPages,

    #[error("Invalid page order")]
    InvalidPageOrder,

    #[error("Cannot remove every page of the document")]
    RemovesAllPages,

    #[error("No documents to merge")]
    NoDocuments,

    #[error("No images provided")]
    NoImages,
}

/// Coarse error classes callers switch on when choosing what to show
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    UnsupportedFormat,
    Extraction,
    Environment,
    Internal,
}

impl PdfToolkitError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PdfToolkitError::Validation(_) => ErrorKind::Validation,
            PdfToolkitError::UnsupportedImageFormat(_) => ErrorKind::UnsupportedFormat,
            PdfToolkitError::NoExtractableText | PdfToolkitError::ExtractionError(_) => {
                ErrorKind::Extraction
            }
            PdfToolkitError::EnvironmentError(_) => ErrorKind::Environment,
            PdfToolkitError::ParseError(_)
            | PdfToolkitError::RenderError { .. }
            | PdfToolkitError::OperationError(_)
            | PdfToolkitError::SerializationError(_) => ErrorKind::Internal,
        }
    }
}

impl From<lopdf::Error> for PdfToolkitError {
    fn from(e: lopdf::Error) -> Self {
        PdfToolkitError::OperationError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PdfToolkitError>;
