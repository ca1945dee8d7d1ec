//! Contract between the OCR service and a platform recognizer
//!
//! Platform recognizers are callback driven: the service submits a request
//! together with a [`Completion`], and the backend resolves it from whatever
//! thread its engine finishes on.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::debug;

use super::error::OcrResult;
use super::model::RecognitionOptions;
use super::normalize::Observation;
use super::source::SourceImage;

/// Outcome a backend reports for one submission
pub type EngineOutcome = OcrResult<Vec<Observation>>;

/// A platform text recognition engine
pub trait PlatformEngine: Send + Sync + 'static {
    /// Short backend name used in logs and error messages
    fn name(&self) -> &'static str;

    /// One-time platform setup. Called at most once per service.
    fn initialize(&self) -> OcrResult<()>;

    /// BCP-47 tags this backend can recognize
    fn supported_languages(&self) -> OcrResult<Vec<String>>;

    /// Start recognizing `image` and resolve `completion` when done.
    ///
    /// Observations must be handed over in reading order. Errors detected
    /// before the engine starts may resolve `completion` synchronously.
    fn submit(&self, image: SourceImage, options: RecognitionOptions, completion: Completion);
}

/// Exactly-once resolution handle for a submitted request
///
/// Clones share the same slot; only the first `complete` call is delivered.
#[derive(Clone)]
pub struct Completion {
    slot: Arc<Mutex<Option<oneshot::Sender<EngineOutcome>>>>,
}

impl Completion {
    /// Create a completion handle and the receiver the service awaits on
    pub fn channel() -> (Self, oneshot::Receiver<EngineOutcome>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                slot: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    /// Deliver the outcome. Returns false if this request was already
    /// resolved, in which case `outcome` is dropped.
    pub fn complete(&self, outcome: EngineOutcome) -> bool {
        let Some(tx) = self.slot.lock().take() else {
            debug!("Ignoring duplicate completion from recognizer");
            return false;
        };
        // the receiver is gone if the caller stopped waiting
        if tx.send(outcome).is_err() {
            debug!("Recognition finished after the caller stopped waiting");
        }
        true
    }

    /// Whether an outcome has already been delivered
    pub fn is_resolved(&self) -> bool {
        self.slot.lock().is_none()
    }
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("resolved", &self.is_resolved())
            .finish()
    }
}
