//! Failure signals of the OCR service

use thiserror::Error;

pub type OcrResult<T> = std::result::Result<T, OcrError>;

/// Why a recognition call did not produce a result
///
/// "No text found" is not an error: it is a `RecognitionResult` with
/// `success == false`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OcrError {
    /// Recognition requested before `initialize` completed
    #[error("OCR service is not initialized; call initialize() first")]
    NotInitialized,

    /// Image bytes could not be decoded
    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// The backend cannot recognize the requested language
    #[error("language '{language}' is not supported by the {engine} recognizer")]
    UnsupportedLanguage {
        language: String,
        engine: &'static str,
    },

    /// The platform recognizer reported a failure
    #[error("{engine} recognizer failed: {message}")]
    Engine {
        engine: &'static str,
        message: String,
    },

    /// The caller cancelled the request
    #[error("text recognition was cancelled")]
    Cancelled,
}

impl OcrError {
    pub(crate) fn engine(engine: &'static str, message: impl Into<String>) -> Self {
        Self::Engine {
            engine,
            message: message.into(),
        }
    }

    /// Wrap a backend error chain, keeping every context layer in the message
    pub(crate) fn from_anyhow(engine: &'static str, err: anyhow::Error) -> Self {
        Self::engine(engine, format!("{err:#}"))
    }

    /// True for caller-initiated cancellation, which is not a fault
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
