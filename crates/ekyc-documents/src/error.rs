use ekyc_vision::VisionError;
use thiserror::Error;

pub type DocumentResult<T> = Result<T, DocumentError>;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("{reason}")]
    Extraction { reason: String },

    #[error(
        "The document's perspective is incorrect. Please take a photo of the document directly above it so that the edges are squared."
    )]
    Perspective,

    #[error("document type {code} is not supported")]
    UnsupportedDocumentType { code: String },

    #[error("unable to determine the type of the document")]
    UnrecognisedDocument,

    #[error(
        "the document covers {width:.2} x {height:.2} of the image; at least {min_width:.2} x {min_height:.2} is required"
    )]
    DocumentTooSmall {
        width: f32,
        height: f32,
        min_width: f32,
        min_height: f32,
    },

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error(transparent)]
    Vision(#[from] VisionError),
}

impl DocumentError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn extraction(reason: impl Into<String>) -> Self {
        Self::Extraction {
            reason: reason.into(),
        }
    }

    pub fn unsupported(code: impl Into<String>) -> Self {
        Self::UnsupportedDocumentType { code: code.into() }
    }

    /// Whether a document-specific extractor failing with this error may be
    /// retried with the baseline strategy. Errors asking the user to retake
    /// the photo are surfaced as they are.
    pub fn allows_fallback(&self) -> bool {
        !matches!(
            self,
            DocumentError::Perspective
                | DocumentError::Configuration { .. }
                | DocumentError::Pattern(_)
        )
    }
}
