//! Value types exchanged with callers of the OCR service.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Speed/quality tradeoff requested from the platform recognizer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Accuracy {
    /// Favor latency over quality
    Fast,
    /// Full recognition pass, with language correction where the platform has it
    #[default]
    Accurate,
}

/// Per-call recognition options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognitionOptions {
    /// BCP-47 language hint (e.g. "en-US"); `None` uses the platform default
    pub language: Option<String>,
    /// Accuracy mode
    pub accuracy: Accuracy,
}

impl RecognitionOptions {
    /// Options with the platform default language and accurate recognition
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the language hint. An empty or blank tag means "use default".
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        let language = language.into();
        let trimmed = language.trim();
        self.language = if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        };
        self
    }

    /// Set the accuracy mode
    pub fn with_accuracy(mut self, accuracy: Accuracy) -> Self {
        self.accuracy = accuracy;
        self
    }

    /// Shorthand for `with_accuracy(Accuracy::Fast)` when `fast` is set
    pub fn fast(self, fast: bool) -> Self {
        self.with_accuracy(if fast { Accuracy::Fast } else { Accuracy::Accurate })
    }
}

/// Whether a backend's `supported` tag satisfies a `requested` BCP-47 hint.
///
/// Tags compare case-insensitively, with `_` treated as `-`. A bare primary
/// language ("en") matches any regional variant ("en-US").
pub fn language_tag_matches(supported: &str, requested: &str) -> bool {
    let canonical = |tag: &str| tag.trim().replace('_', "-").to_ascii_lowercase();
    let (supported, requested) = (canonical(supported), canonical(requested));

    if requested.is_empty() {
        return false;
    }
    supported == requested
        || (!requested.contains('-') && supported.split('-').next() == Some(requested.as_str()))
}

/// Axis-aligned rectangle in source image pixels, origin top-left
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }
}

/// A recognized token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    /// Token text
    pub text: String,
    /// Confidence of the line the token came from, in [0, 1]
    pub confidence: f32,
    /// Pixel bounds, when the platform reports geometry
    pub bounds: Option<BoundingBox>,
}

/// Normalized output of one recognition call
///
/// `success == false` means the recognizer ran and found nothing; every
/// collection is empty in that case. Failures are reported as errors, never
/// through this type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecognitionResult {
    pub success: bool,
    /// Every line joined with a single space
    pub all_text: String,
    /// Lines in reading order
    pub lines: Vec<String>,
    /// Whitespace-separated tokens of every line, in order
    pub elements: Vec<Element>,
}

impl RecognitionResult {
    /// Result for an image in which the recognizer found no text
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Identifies one fire-and-forget recognition request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Published to subscribers when a fire-and-forget request finishes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionNotification {
    /// Id returned by `start_recognize_text`
    pub request_id: RequestId,
    pub result: Option<RecognitionResult>,
    /// Set when recognition failed; never empty when present
    pub error: Option<String>,
}

impl CompletionNotification {
    pub(crate) fn succeeded(request_id: RequestId, result: RecognitionResult) -> Self {
        Self {
            request_id,
            result: Some(result),
            error: None,
        }
    }

    pub(crate) fn failed(request_id: RequestId, error: impl Into<String>) -> Self {
        let mut error = error.into();
        if error.is_empty() {
            error = "text recognition failed".to_string();
        }
        Self {
            request_id,
            result: None,
            error: Some(error),
        }
    }

    /// True when a result is present and that result found text
    pub fn is_success(&self) -> bool {
        self.result.as_ref().is_some_and(|r| r.success)
    }
}
