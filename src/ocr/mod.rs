//! On-device OCR
//!
//! Delegates recognition to the operating system's own engine:
//! - Windows: Windows.Media.Ocr
//! - macOS: Apple Vision framework
//! - Other targets: no backend, initialization fails

pub mod engine;
pub mod error;
pub mod events;
pub mod model;
pub mod normalize;
pub mod service;
pub mod source;

#[cfg(target_os = "windows")]
pub mod windows_ocr;

#[cfg(target_os = "macos")]
pub mod apple_vision;

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
pub mod unsupported;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

pub use engine::{Completion, EngineOutcome, PlatformEngine};
pub use error::{OcrError, OcrResult};
pub use events::CompletionEvents;
pub use model::{
    language_tag_matches, Accuracy, BoundingBox, CompletionNotification, Element,
    RecognitionOptions, RecognitionResult, RequestId,
};
pub use normalize::{normalize, Candidate, Geometry, Observation};
pub use service::OcrService;
pub use source::SourceImage;

/// The recognizer built into the current operating system
pub fn platform_engine() -> Arc<dyn PlatformEngine> {
    #[cfg(target_os = "windows")]
    {
        Arc::new(windows_ocr::WindowsOcr::new())
    }

    #[cfg(target_os = "macos")]
    {
        Arc::new(apple_vision::AppleVision::new())
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        Arc::new(unsupported::UnsupportedPlatform::new())
    }
}
