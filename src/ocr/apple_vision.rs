//! macOS OCR via the Apple Vision framework (objc2-vision).
//!
//! Vision performs requests synchronously on the calling thread, so each
//! request runs on the Tokio blocking pool and resolves its completion from
//! there. Bounding boxes come back normalized with a bottom-left origin.

use objc2::rc::{autoreleasepool, Retained};
use objc2::runtime::AnyObject;
use objc2::AllocAnyThread;
use objc2_foundation::{NSArray, NSData, NSDictionary, NSError, NSString};
use objc2_vision::{
    VNImageRequestHandler, VNRecognizeTextRequest, VNRequest, VNRequestTextRecognitionLevel,
};
use tracing::{debug, info};

use super::engine::{Completion, PlatformEngine};
use super::error::{OcrError, OcrResult};
use super::model::{language_tag_matches, Accuracy, RecognitionOptions};
use super::normalize::{Candidate, Geometry, Observation};
use super::source::SourceImage;

const ENGINE: &str = "Apple Vision";

/// Apple Vision text recognizer
#[derive(Debug, Default)]
pub struct AppleVision;

impl AppleVision {
    pub fn new() -> Self {
        Self
    }
}

impl PlatformEngine for AppleVision {
    fn name(&self) -> &'static str {
        ENGINE
    }

    fn initialize(&self) -> OcrResult<()> {
        // querying the language list loads the framework and its models
        let languages = self.supported_languages()?;
        info!("Apple Vision available for {} languages", languages.len());
        Ok(())
    }

    fn supported_languages(&self) -> OcrResult<Vec<String>> {
        autoreleasepool(|_| {
            let request = text_request(Accuracy::Accurate);
            supported_languages(&request)
        })
    }

    fn submit(&self, image: SourceImage, options: RecognitionOptions, completion: Completion) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                completion.complete(Err(OcrError::engine(ENGINE, e.to_string())));
                return;
            }
        };

        let (width, height) = image.dimensions();
        handle.spawn_blocking(move || {
            let outcome = autoreleasepool(|_| perform(image.encoded(), &options));
            if let Ok(observations) = &outcome {
                debug!("Apple Vision: {} observations in {}x{} image", observations.len(), width, height);
            }
            completion.complete(outcome);
        });
    }
}

fn vision_error(err: Retained<NSError>) -> OcrError {
    OcrError::engine(ENGINE, err.localizedDescription().to_string())
}

fn text_request(accuracy: Accuracy) -> Retained<VNRecognizeTextRequest> {
    let request = unsafe { VNRecognizeTextRequest::new() };
    let level = match accuracy {
        Accuracy::Fast => VNRequestTextRecognitionLevel::Fast,
        Accuracy::Accurate => VNRequestTextRecognitionLevel::Accurate,
    };
    unsafe {
        request.setRecognitionLevel(level);
        request.setUsesLanguageCorrection(accuracy == Accuracy::Accurate);
    }
    request
}

fn supported_languages(request: &VNRecognizeTextRequest) -> OcrResult<Vec<String>> {
    let languages = unsafe { request.supportedRecognitionLanguagesAndReturnError() }.map_err(vision_error)?;
    Ok(languages.iter().map(|tag| tag.to_string()).collect())
}

/// Run one text request over encoded image bytes
fn perform(encoded: &[u8], options: &RecognitionOptions) -> OcrResult<Vec<Observation>> {
    let request = text_request(options.accuracy);

    if let Some(tag) = &options.language {
        // the level changes which languages are available
        let supported = supported_languages(&request)?;
        let Some(matched) = supported.iter().find(|s| language_tag_matches(s, tag)) else {
            return Err(OcrError::UnsupportedLanguage {
                language: tag.clone(),
                engine: ENGINE,
            });
        };
        let languages = NSArray::from_retained_slice(&[NSString::from_str(matched)]);
        unsafe { request.setRecognitionLanguages(&languages) };
    }

    let data = NSData::with_bytes(encoded);
    let handler_options: Retained<NSDictionary<NSString, AnyObject>> = NSDictionary::new();
    let handler = unsafe {
        VNImageRequestHandler::initWithData_options(VNImageRequestHandler::alloc(), &data, &handler_options)
    };

    let base: &VNRequest = &request;
    let requests = NSArray::from_slice(&[base]);
    unsafe { handler.performRequests_error(&requests) }.map_err(vision_error)?;

    let Some(results) = (unsafe { request.results() }) else {
        return Ok(Vec::new());
    };

    let mut observations = Vec::new();
    for observation in results.iter() {
        let candidates = unsafe { observation.topCandidates(1) }
            .iter()
            .map(|candidate| Candidate::new(unsafe { candidate.string() }.to_string(), unsafe { candidate.confidence() }))
            .collect();

        let rect = unsafe { observation.boundingBox() };
        observations.push(Observation::with_candidates(candidates).with_bounds(Geometry::Normalized {
            x: rect.origin.x,
            y: rect.origin.y,
            width: rect.size.width,
            height: rect.size.height,
        }));
    }

    Ok(observations)
}
