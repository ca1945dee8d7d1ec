//! OCR service: one entry point per delivery style over a shared routine

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::engine::{Completion, PlatformEngine};
use super::error::{OcrError, OcrResult};
use super::events::CompletionEvents;
use super::model::{CompletionNotification, RecognitionOptions, RecognitionResult, RequestId};
use super::normalize::normalize;
use super::source::SourceImage;

/// Text recognition backed by a platform engine
///
/// Clones share the engine, the initialization flag and the subscriber list.
#[derive(Clone)]
pub struct OcrService {
    inner: Arc<ServiceInner>,
}

struct ServiceInner {
    engine: Arc<dyn PlatformEngine>,
    /// Set once, never reset
    initialized: AtomicBool,
    init_lock: Mutex<()>,
    events: CompletionEvents,
}

impl OcrService {
    /// Service over the recognizer built into the current operating system
    pub fn new() -> Self {
        Self::with_engine(super::platform_engine())
    }

    /// Service over a specific engine
    pub fn with_engine(engine: Arc<dyn PlatformEngine>) -> Self {
        Self {
            inner: Arc::new(ServiceInner {
                engine,
                initialized: AtomicBool::new(false),
                init_lock: Mutex::new(()),
                events: CompletionEvents::new(),
            }),
        }
    }

    /// Name of the backing engine
    pub fn engine_name(&self) -> &'static str {
        self.inner.engine.name()
    }

    /// Run platform setup once. Later and concurrent calls return after the
    /// first one has finished. A failed setup leaves the service
    /// uninitialized so a later call retries it.
    pub fn initialize(&self) -> OcrResult<()> {
        if self.is_initialized() {
            return Ok(());
        }

        let _guard = self.inner.init_lock.lock();
        if self.is_initialized() {
            return Ok(());
        }

        info!("Initializing {} OCR engine", self.engine_name());
        self.inner.engine.initialize()?;
        self.inner.initialized.store(true, Ordering::Release);
        info!("{} OCR engine initialized", self.engine_name());

        Ok(())
    }

    /// Whether `initialize` has completed
    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::Acquire)
    }

    /// BCP-47 tags the backing engine can recognize
    pub fn supported_languages(&self) -> OcrResult<Vec<String>> {
        self.inner.ensure_initialized()?;
        self.inner.engine.supported_languages()
    }

    /// Recognize text in an encoded image.
    ///
    /// Fails with `Cancelled` if `cancel` fires before a result is handed
    /// back, even when the engine has already finished.
    pub async fn recognize_text(
        &self,
        image: &[u8],
        options: &RecognitionOptions,
        cancel: &CancellationToken,
    ) -> OcrResult<RecognitionResult> {
        self.inner
            .recognize(image, options.clone(), cancel, RequestId::new())
            .await
    }

    /// Recognize text in the background and publish the outcome to
    /// subscribers.
    ///
    /// Failures are published with an error message. A cancelled request
    /// publishes nothing. Must be called from within a Tokio runtime;
    /// otherwise a failure notification is published immediately.
    pub fn start_recognize_text(
        &self,
        image: Vec<u8>,
        options: RecognitionOptions,
        cancel: CancellationToken,
    ) -> RequestId {
        let request_id = RequestId::new();

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Cannot start recognition {} outside a Tokio runtime", request_id);
                self.inner
                    .events
                    .publish(CompletionNotification::failed(request_id, e.to_string()));
                return request_id;
            }
        };

        let inner = Arc::clone(&self.inner);
        handle.spawn(async move {
            let notification = match inner.recognize(&image, options, &cancel, request_id).await {
                Ok(result) => CompletionNotification::succeeded(request_id, result),
                Err(OcrError::Cancelled) => {
                    debug!("Request {} cancelled, no notification published", request_id);
                    return;
                }
                Err(e) => CompletionNotification::failed(request_id, e.to_string()),
            };
            inner.events.publish(notification);
        });

        request_id
    }

    /// Receive notifications for requests started with `start_recognize_text`
    pub fn subscribe(&self) -> Receiver<CompletionNotification> {
        self.inner.events.subscribe()
    }
}

impl Default for OcrService {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceInner {
    fn ensure_initialized(&self) -> OcrResult<()> {
        if self.initialized.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(OcrError::NotInitialized)
        }
    }

    async fn recognize(
        &self,
        bytes: &[u8],
        options: RecognitionOptions,
        cancel: &CancellationToken,
        request_id: RequestId,
    ) -> OcrResult<RecognitionResult> {
        self.ensure_initialized()?;
        if cancel.is_cancelled() {
            return Err(OcrError::Cancelled);
        }

        let image = SourceImage::decode(bytes)?;
        let (width, height) = image.dimensions();

        if cancel.is_cancelled() {
            return Err(OcrError::Cancelled);
        }

        debug!(
            "Request {}: submitting {}x{} image to {} ({:?}, language {:?})",
            request_id,
            width,
            height,
            self.engine.name(),
            options.accuracy,
            options.language
        );

        let start = Instant::now();
        let (completion, rx) = Completion::channel();
        self.engine.submit(image, options, completion);

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Request {} cancelled while in flight", request_id);
                return Err(OcrError::Cancelled);
            }
            outcome = rx => outcome,
        };

        // cancellation observed after the engine answered still wins
        if cancel.is_cancelled() {
            debug!("Request {} cancelled, discarding late result", request_id);
            return Err(OcrError::Cancelled);
        }

        let observations = match outcome {
            Ok(Ok(observations)) => observations,
            Ok(Err(e)) => {
                warn!("Request {} failed: {}", request_id, e);
                return Err(e);
            }
            Err(_) => {
                let e = OcrError::engine(
                    self.engine.name(),
                    "recognizer dropped the request without completing it",
                );
                warn!("Request {} failed: {}", request_id, e);
                return Err(e);
            }
        };

        let observation_count = observations.len();
        let result = normalize(observations, width, height);

        debug!(
            "Request {}: {} observations, {} lines, {} elements in {:?}",
            request_id,
            observation_count,
            result.lines.len(),
            result.elements.len(),
            start.elapsed()
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::model::Accuracy;
    use crate::ocr::normalize::Observation;
    use crate::ocr::source::png_bytes;
    use crate::ocr::testing::{StubBehavior, StubEngine};
    use std::sync::Barrier;
    use std::time::Duration;

    fn service_with(behavior: StubBehavior) -> (OcrService, Arc<StubEngine>) {
        let engine = Arc::new(StubEngine::new(behavior));
        (OcrService::with_engine(engine.clone()), engine)
    }

    fn ready_service(behavior: StubBehavior) -> (OcrService, Arc<StubEngine>) {
        let (service, engine) = service_with(behavior);
        service.initialize().unwrap();
        (service, engine)
    }

    async fn wait_for_submissions(engine: &StubEngine, count: usize) {
        for _ in 0..200 {
            if engine.submission_count() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("engine never received {count} submissions");
    }

    #[test]
    fn test_concurrent_initialize_runs_setup_once() {
        let engine = Arc::new(
            StubEngine::new(StubBehavior::Immediate(vec![])).with_init_delay(Duration::from_millis(20)),
        );
        let service = OcrService::with_engine(engine.clone());
        let barrier = Barrier::new(8);

        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        let result = service.initialize();
                        // every caller observes the initialized state on return
                        (result, service.is_initialized())
                    })
                })
                .collect();

            for handle in handles {
                let (result, initialized) = handle.join().unwrap();
                assert!(result.is_ok());
                assert!(initialized);
            }
        });

        assert_eq!(engine.init_count(), 1);
        service.initialize().unwrap();
        assert_eq!(engine.init_count(), 1);
    }

    #[test]
    fn test_failed_initialize_is_propagated_and_retried() {
        let engine = Arc::new(StubEngine::new(StubBehavior::Immediate(vec![])).with_init_error("no engine"));
        let service = OcrService::with_engine(engine.clone());

        let err = service.initialize().unwrap_err();
        assert_eq!(err, OcrError::engine("stub", "no engine"));
        assert!(!service.is_initialized());

        assert!(service.initialize().is_err());
        assert_eq!(engine.init_count(), 2);
    }

    #[tokio::test]
    async fn test_recognize_before_initialize_fails() {
        let (service, engine) = service_with(StubBehavior::Immediate(vec![Observation::new("x", 1.0)]));
        let cancel = CancellationToken::new();

        for input in [png_bytes(4, 4), Vec::new(), b"junk".to_vec()] {
            let err = service
                .recognize_text(&input, &RecognitionOptions::new(), &cancel)
                .await
                .unwrap_err();
            assert_eq!(err, OcrError::NotInitialized);
        }
        assert_eq!(engine.submission_count(), 0);
        assert_eq!(service.supported_languages().unwrap_err(), OcrError::NotInitialized);
    }

    #[tokio::test]
    async fn test_no_observations_yields_unsuccessful_result() {
        let (service, _) = ready_service(StubBehavior::Immediate(vec![]));

        let result = service
            .recognize_text(&png_bytes(8, 8), &RecognitionOptions::new(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result, RecognitionResult::empty());
        assert!(!result.success);
    }

    #[tokio::test]
    async fn test_hello_world_is_split_into_elements() {
        let (service, _) = ready_service(StubBehavior::Delayed(
            Duration::from_millis(5),
            vec![Observation::new("Hello World", 0.9)],
        ));

        let result = service
            .recognize_text(&png_bytes(8, 8), &RecognitionOptions::new(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.lines, vec!["Hello World"]);
        assert!(result.all_text.contains("Hello World"));
        let elements: Vec<(&str, f32)> = result
            .elements
            .iter()
            .map(|e| (e.text.as_str(), e.confidence))
            .collect();
        assert_eq!(elements, vec![("Hello", 0.9), ("World", 0.9)]);
    }

    #[tokio::test]
    async fn test_options_reach_the_engine() {
        let (service, engine) = ready_service(StubBehavior::Immediate(vec![]));
        let options = RecognitionOptions::new().with_language("fr-FR").fast(true);

        service
            .recognize_text(&png_bytes(2, 2), &options, &CancellationToken::new())
            .await
            .unwrap();

        let seen = engine.last_options().unwrap();
        assert_eq!(seen.language.as_deref(), Some("fr-FR"));
        assert_eq!(seen.accuracy, Accuracy::Fast);
    }

    #[tokio::test]
    async fn test_invalid_image_is_rejected_before_submission() {
        let (service, engine) = ready_service(StubBehavior::Immediate(vec![]));

        let err = service
            .recognize_text(b"not an image", &RecognitionOptions::new(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, OcrError::InvalidImage(_)));
        assert_eq!(engine.submission_count(), 0);
    }

    #[tokio::test]
    async fn test_already_cancelled_does_no_work() {
        let (service, engine) = ready_service(StubBehavior::Immediate(vec![Observation::new("x", 1.0)]));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = service
            .recognize_text(&png_bytes(4, 4), &RecognitionOptions::new(), &cancel)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(engine.submission_count(), 0);
    }

    #[tokio::test]
    async fn test_cancellation_beats_late_result() {
        let (service, engine) = ready_service(StubBehavior::Hold);
        let cancel = CancellationToken::new();

        let task = {
            let service = service.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                service
                    .recognize_text(&png_bytes(4, 4), &RecognitionOptions::new(), &cancel)
                    .await
            })
        };

        wait_for_submissions(&engine, 1).await;
        cancel.cancel();
        engine.complete_held(vec![Observation::new("too late", 1.0)]);

        let err = task.await.unwrap().unwrap_err();
        assert_eq!(err, OcrError::Cancelled);
    }

    #[tokio::test]
    async fn test_engine_error_is_distinct() {
        let (service, _) = ready_service(StubBehavior::Fail("corrupt state".to_string()));

        let err = service
            .recognize_text(&png_bytes(4, 4), &RecognitionOptions::new(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(!err.is_cancelled());
        assert_eq!(
            err,
            OcrError::Engine {
                engine: "stub",
                message: "corrupt state".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_abandoned_request_is_an_engine_error() {
        let (service, _) = ready_service(StubBehavior::Abandon);

        let err = service
            .recognize_text(&png_bytes(4, 4), &RecognitionOptions::new(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, OcrError::Engine { engine: "stub", .. }));
    }

    #[tokio::test]
    async fn test_double_callback_delivers_first_outcome() {
        let (service, _) = ready_service(StubBehavior::Twice(vec![Observation::new("once", 0.4)]));

        let result = service
            .recognize_text(&png_bytes(4, 4), &RecognitionOptions::new(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.lines, vec!["once"]);
    }

    #[tokio::test]
    async fn test_concurrent_calls_do_not_mix_results() {
        let (service, _) = ready_service(StubBehavior::EchoSize);
        let options = RecognitionOptions::new();
        let cancel = CancellationToken::new();

        let small = png_bytes(5, 3);
        let large = png_bytes(30, 9);
        let (a, b) = tokio::join!(
            service.recognize_text(&small, &options, &cancel),
            service.recognize_text(&large, &options, &cancel),
        );

        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a.lines, vec!["image 5x3"]);
        assert_eq!(b.lines, vec!["image 30x9"]);
        assert!(!a.all_text.contains("30x9"));
        assert!(!b.all_text.contains("5x3"));
    }

    #[tokio::test]
    async fn test_start_recognize_publishes_result() {
        let (service, _) = ready_service(StubBehavior::Immediate(vec![Observation::new("Hello World", 0.9)]));
        let rx = service.subscribe();

        let id = service.start_recognize_text(png_bytes(4, 4), RecognitionOptions::new(), CancellationToken::new());

        let notification = tokio::task::spawn_blocking(move || rx.recv_timeout(Duration::from_secs(5)))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(notification.request_id, id);
        assert!(notification.is_success());
        assert!(notification.error.is_none());
        assert_eq!(notification.result.unwrap().lines, vec!["Hello World"]);
    }

    #[tokio::test]
    async fn test_start_recognize_publishes_failure() {
        let (service, _) = service_with(StubBehavior::Immediate(vec![]));
        let rx = service.subscribe();

        let id = service.start_recognize_text(png_bytes(4, 4), RecognitionOptions::new(), CancellationToken::new());

        let notification = tokio::task::spawn_blocking(move || rx.recv_timeout(Duration::from_secs(5)))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(notification.request_id, id);
        assert!(!notification.is_success());
        assert!(notification.result.is_none());
        assert!(!notification.error.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_start_publishes_nothing() {
        let (service, engine) = ready_service(StubBehavior::Hold);
        let rx = service.subscribe();
        let cancel = CancellationToken::new();

        service.start_recognize_text(png_bytes(4, 4), RecognitionOptions::new(), cancel.clone());
        wait_for_submissions(&engine, 1).await;
        cancel.cancel();
        engine.complete_held(vec![Observation::new("discarded", 1.0)]);

        let outcome = tokio::task::spawn_blocking(move || rx.recv_timeout(Duration::from_millis(200)))
            .await
            .unwrap();
        assert!(outcome.is_err());
    }

    #[test]
    fn test_start_outside_runtime_reports_failure() {
        let (service, _) = ready_service(StubBehavior::Immediate(vec![]));
        let rx = service.subscribe();

        let id = service.start_recognize_text(png_bytes(4, 4), RecognitionOptions::new(), CancellationToken::new());

        let notification = rx.try_recv().unwrap();
        assert_eq!(notification.request_id, id);
        assert!(notification.error.is_some());
    }

    #[tokio::test]
    async fn test_supported_languages_after_initialize() {
        let (service, _) = ready_service(StubBehavior::Immediate(vec![]));
        assert_eq!(service.supported_languages().unwrap(), vec!["en-US", "fr-FR"]);
    }
}
