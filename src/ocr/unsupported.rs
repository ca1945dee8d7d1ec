//! Fallback for targets without a built-in recognizer (Linux, Android, ...)

use super::engine::{Completion, PlatformEngine};
use super::error::{OcrError, OcrResult};
use super::model::RecognitionOptions;
use super::source::SourceImage;

const ENGINE: &str = "unsupported";

/// Engine that fails every operation with a platform error
#[derive(Debug, Default)]
pub struct UnsupportedPlatform;

impl UnsupportedPlatform {
    pub fn new() -> Self {
        Self
    }

    fn error() -> OcrError {
        OcrError::engine(
            ENGINE,
            format!(
                "no on-device text recognizer is available on {}",
                std::env::consts::OS
            ),
        )
    }
}

impl PlatformEngine for UnsupportedPlatform {
    fn name(&self) -> &'static str {
        ENGINE
    }

    fn initialize(&self) -> OcrResult<()> {
        Err(Self::error())
    }

    fn supported_languages(&self) -> OcrResult<Vec<String>> {
        Ok(Vec::new())
    }

    fn submit(&self, _image: SourceImage, _options: RecognitionOptions, completion: Completion) {
        completion.complete(Err(Self::error()));
    }
}
