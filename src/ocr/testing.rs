//! Scriptable recognizer for service tests

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::engine::{Completion, PlatformEngine};
use super::error::{OcrError, OcrResult};
use super::model::RecognitionOptions;
use super::normalize::Observation;
use super::source::SourceImage;

/// How the stub answers a submission
#[derive(Debug, Clone)]
pub(crate) enum StubBehavior {
    /// Resolve synchronously inside `submit`
    Immediate(Vec<Observation>),
    /// Resolve from a spawned task after a delay
    Delayed(Duration, Vec<Observation>),
    /// Keep the completion for the test to fire via `complete_held`
    Hold,
    /// Resolve twice, the second time with an error
    Twice(Vec<Observation>),
    /// Report an engine failure
    Fail(String),
    /// Reply with the image size as text; smaller images take longer
    EchoSize,
    /// Drop the completion without resolving it
    Abandon,
}

pub(crate) struct StubEngine {
    behavior: StubBehavior,
    init_delay: Duration,
    init_error: Option<String>,
    init_calls: AtomicUsize,
    submissions: AtomicUsize,
    held: Mutex<Vec<Completion>>,
    last_options: Mutex<Option<RecognitionOptions>>,
}

impl StubEngine {
    pub fn new(behavior: StubBehavior) -> Self {
        Self {
            behavior,
            init_delay: Duration::ZERO,
            init_error: None,
            init_calls: AtomicUsize::new(0),
            submissions: AtomicUsize::new(0),
            held: Mutex::new(Vec::new()),
            last_options: Mutex::new(None),
        }
    }

    pub fn with_init_delay(mut self, delay: Duration) -> Self {
        self.init_delay = delay;
        self
    }

    pub fn with_init_error(mut self, message: &str) -> Self {
        self.init_error = Some(message.to_string());
        self
    }

    pub fn init_count(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }

    pub fn last_options(&self) -> Option<RecognitionOptions> {
        self.last_options.lock().clone()
    }

    /// Resolve every held completion with `observations`
    pub fn complete_held(&self, observations: Vec<Observation>) {
        for completion in self.held.lock().drain(..) {
            completion.complete(Ok(observations.clone()));
        }
    }
}

impl PlatformEngine for StubEngine {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn initialize(&self) -> OcrResult<()> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        if !self.init_delay.is_zero() {
            std::thread::sleep(self.init_delay);
        }
        match &self.init_error {
            Some(message) => Err(OcrError::engine("stub", message.clone())),
            None => Ok(()),
        }
    }

    fn supported_languages(&self) -> OcrResult<Vec<String>> {
        Ok(vec!["en-US".to_string(), "fr-FR".to_string()])
    }

    fn submit(&self, image: SourceImage, options: RecognitionOptions, completion: Completion) {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        *self.last_options.lock() = Some(options);

        match &self.behavior {
            StubBehavior::Immediate(observations) => {
                completion.complete(Ok(observations.clone()));
            }
            StubBehavior::Delayed(delay, observations) => {
                let (delay, observations) = (*delay, observations.clone());
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    completion.complete(Ok(observations));
                });
            }
            StubBehavior::Hold => self.held.lock().push(completion),
            StubBehavior::Twice(observations) => {
                completion.complete(Ok(observations.clone()));
                completion.complete(Err(OcrError::engine("stub", "fired twice")));
            }
            StubBehavior::Fail(message) => {
                completion.complete(Err(OcrError::engine("stub", message.clone())));
            }
            StubBehavior::EchoSize => {
                let (width, height) = image.dimensions();
                let delay = Duration::from_millis(u64::from(40u32.saturating_sub(width)) * 2);
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let text = format!("image {width}x{height}");
                    completion.complete(Ok(vec![Observation::new(text, 0.5)]));
                });
            }
            StubBehavior::Abandon => drop(completion),
        }
    }
}
