//! Windows OCR API backend
//!
//! Uses the built-in Windows OCR (Windows.Media.Ocr). The engine has no
//! speed/quality switch and reports no confidence, so every line is scored
//! 1.0.

use anyhow::{Context, Result};
use tracing::{debug, info, warn};
use windows::{
    core::HSTRING,
    Foundation::{AsyncOperationCompletedHandler, AsyncStatus, IAsyncOperation},
    Globalization::Language,
    Graphics::Imaging::{BitmapPixelFormat, SoftwareBitmap},
    Media::Ocr::{OcrEngine as WinOcrEngine, OcrResult as WinOcrResult},
    Storage::Streams::{DataReader, DataWriter, InMemoryRandomAccessStream},
};

use super::engine::{Completion, PlatformEngine};
use super::error::{OcrError, OcrResult};
use super::model::{Accuracy, RecognitionOptions};
use super::normalize::{Geometry, Observation};
use super::source::SourceImage;

const ENGINE: &str = "Windows.Media.Ocr";

/// Windows OCR engine wrapper
#[derive(Debug, Default)]
pub struct WindowsOcr;

impl WindowsOcr {
    pub fn new() -> Self {
        Self
    }

    /// Start recognition; `completion` is resolved by the WinRT callback
    fn start(&self, image: &SourceImage, options: &RecognitionOptions, completion: Completion) -> OcrResult<()> {
        let (width, height) = image.dimensions();

        let max = WinOcrEngine::MaxImageDimension()
            .context("Failed to get max image dimension")
            .map_err(|e| OcrError::from_anyhow(ENGINE, e))?;
        if width > max || height > max {
            return Err(OcrError::InvalidImage(format!(
                "{width}x{height} exceeds the Windows OCR limit of {max} pixels per side"
            )));
        }

        if options.accuracy == Accuracy::Fast {
            debug!("Windows OCR has no fast mode, running the default recognizer");
        }

        let engine = create_engine(options.language.as_deref())?;

        let bgra = rgba_to_bgra(image.pixels().to_rgba8().as_raw());
        let bitmap = create_software_bitmap(&bgra, width, height).map_err(|e| OcrError::from_anyhow(ENGINE, e))?;

        let operation: IAsyncOperation<WinOcrResult> = engine
            .RecognizeAsync(&bitmap)
            .context("Failed to start OCR recognition")
            .map_err(|e| OcrError::from_anyhow(ENGINE, e))?;

        let handler = AsyncOperationCompletedHandler::new(
            move |operation: Option<&IAsyncOperation<WinOcrResult>>, status: AsyncStatus| {
                completion.complete(finish(operation, status));
                Ok(())
            },
        );

        operation
            .SetCompleted(&handler)
            .context("Failed to register OCR completion handler")
            .map_err(|e| OcrError::from_anyhow(ENGINE, e))?;

        Ok(())
    }
}

impl PlatformEngine for WindowsOcr {
    fn name(&self) -> &'static str {
        ENGINE
    }

    fn initialize(&self) -> OcrResult<()> {
        let languages = self.supported_languages()?;
        if languages.is_empty() {
            return Err(OcrError::engine(ENGINE, "no OCR language packs are installed"));
        }
        info!("Windows OCR available for {} languages", languages.len());
        Ok(())
    }

    fn supported_languages(&self) -> OcrResult<Vec<String>> {
        available_languages().map_err(|e| OcrError::from_anyhow(ENGINE, e))
    }

    fn submit(&self, image: SourceImage, options: RecognitionOptions, completion: Completion) {
        if let Err(e) = self.start(&image, &options, completion.clone()) {
            completion.complete(Err(e));
        }
    }
}

/// Get available OCR languages on this system
fn available_languages() -> Result<Vec<String>> {
    let languages = WinOcrEngine::AvailableRecognizerLanguages()
        .context("Failed to get available languages")?;

    let mut result = Vec::new();
    for i in 0..languages.Size().context("Failed to get languages size")? {
        if let Ok(lang) = languages.GetAt(i) {
            if let Ok(tag) = lang.LanguageTag() {
                result.push(tag.to_string());
            }
        }
    }

    Ok(result)
}

/// Create an engine for `language_tag`, or for the user profile languages
/// when no tag is given. An unsupported tag is an error, not a fallback.
fn create_engine(language_tag: Option<&str>) -> OcrResult<WinOcrEngine> {
    let Some(tag) = language_tag else {
        return WinOcrEngine::TryCreateFromUserProfileLanguages()
            .context("Failed to create OCR engine from user profile")
            .map_err(|e| OcrError::from_anyhow(ENGINE, e));
    };

    let unsupported = || OcrError::UnsupportedLanguage {
        language: tag.to_string(),
        engine: ENGINE,
    };

    let language = Language::CreateLanguage(&HSTRING::from(tag)).map_err(|e| {
        warn!("Invalid language tag '{}': {}", tag, e);
        unsupported()
    })?;

    let supported = WinOcrEngine::IsLanguageSupported(&language)
        .context("Failed to check language support")
        .map_err(|e| OcrError::from_anyhow(ENGINE, e))?;
    if !supported {
        warn!("Language '{}' is not supported by Windows OCR", tag);
        return Err(unsupported());
    }

    WinOcrEngine::TryCreateFromLanguage(&language)
        .context("Failed to create OCR engine for language")
        .map_err(|e| OcrError::from_anyhow(ENGINE, e))
}

/// Turn the WinRT completion into the engine outcome
fn finish(operation: Option<&IAsyncOperation<WinOcrResult>>, status: AsyncStatus) -> OcrResult<Vec<Observation>> {
    let Some(operation) = operation else {
        return Err(OcrError::engine(ENGINE, "completion fired without an operation"));
    };

    if status != AsyncStatus::Completed {
        let code = operation.ErrorCode().map(|c| c.0).unwrap_or_default();
        return Err(OcrError::engine(
            ENGINE,
            format!("recognition ended with status {} (HRESULT {:#010x})", status.0, code),
        ));
    }

    operation
        .GetResults()
        .context("Failed to get OCR results")
        .and_then(|result| extract_observations(&result))
        .map_err(|e| OcrError::from_anyhow(ENGINE, e))
}

/// Convert RGBA to BGRA (Windows expects BGRA)
fn rgba_to_bgra(rgba: &[u8]) -> Vec<u8> {
    let mut bgra = rgba.to_vec();
    for chunk in bgra.chunks_exact_mut(4) {
        chunk.swap(0, 2); // Swap R and B
    }
    bgra
}

/// Create a SoftwareBitmap from BGRA data using CopyFromBuffer
fn create_software_bitmap(bgra_data: &[u8], width: u32, height: u32) -> Result<SoftwareBitmap> {
    let stream = InMemoryRandomAccessStream::new()
        .context("Failed to create in-memory stream")?;

    let writer = DataWriter::CreateDataWriter(&stream)
        .context("Failed to create data writer")?;

    writer.WriteBytes(bgra_data)
        .context("Failed to write pixel data")?;

    writer.StoreAsync()
        .context("Failed to start store operation")?
        .get()
        .context("Failed to store data")?;

    writer.FlushAsync()
        .context("Failed to start flush operation")?
        .get()
        .context("Failed to flush data")?;

    stream.Seek(0)
        .context("Failed to seek stream")?;

    let bitmap = SoftwareBitmap::Create(
        BitmapPixelFormat::Bgra8,
        width as i32,
        height as i32,
    ).context("Failed to create SoftwareBitmap")?;

    let input_stream = stream.GetInputStreamAt(0)
        .context("Failed to get input stream")?;

    let reader = DataReader::CreateDataReader(&input_stream)
        .context("Failed to create data reader")?;

    reader.LoadAsync(bgra_data.len() as u32)
        .context("Failed to start load operation")?
        .get()
        .context("Failed to load data")?;

    let buffer = reader.ReadBuffer(bgra_data.len() as u32)
        .context("Failed to read buffer")?;

    bitmap.CopyFromBuffer(&buffer)
        .context("Failed to copy buffer to bitmap")?;

    Ok(bitmap)
}

/// One observation per OCR line, with pixel word boxes
fn extract_observations(ocr_result: &WinOcrResult) -> Result<Vec<Observation>> {
    let mut observations = Vec::new();

    let lines = ocr_result.Lines()
        .context("Failed to get OCR lines")?;

    for i in 0..lines.Size().context("Failed to get lines size")? {
        let line = lines.GetAt(i)
            .context("Failed to get line")?;

        let text = line.Text()
            .context("Failed to get line text")?
            .to_string();

        let words = line.Words()
            .context("Failed to get words")?;

        let mut word_bounds = Vec::new();
        for j in 0..words.Size().context("Failed to get words size")? {
            let rect = words.GetAt(j)
                .context("Failed to get word")?
                .BoundingRect()
                .context("Failed to get bounding rect")?;

            word_bounds.push(Geometry::Pixels {
                x: f64::from(rect.X),
                y: f64::from(rect.Y),
                width: f64::from(rect.Width),
                height: f64::from(rect.Height),
            });
        }

        let mut observation = Observation::new(text, 1.0);
        observation.bounds = Geometry::union_pixels(&word_bounds);
        observations.push(observation.with_word_bounds(word_bounds));
    }

    debug!("Windows OCR: Found {} lines", observations.len());

    Ok(observations)
}
