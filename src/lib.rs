//! native-ocr - On-device text recognition
//!
//! Hands images to the operating system's own OCR engine and normalizes what
//! comes back into one result shape, with a cancellable async call and a
//! subscribe/notify variant.

pub mod config;
pub mod ocr;

pub use ocr::{
    Accuracy, BoundingBox, CompletionNotification, Element, OcrError, OcrResult, OcrService,
    PlatformEngine, RecognitionOptions, RecognitionResult, RequestId,
};
pub use tokio_util::sync::CancellationToken;
