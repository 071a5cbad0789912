use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::camera::{CameraConstraints, CameraProvider};
use crate::classifier::{DetectionResult, GestureClassifier};
use crate::clipboard::ClipboardSystem;
use crate::config::SignsenseConfig;
use crate::detection::{DetectionConfig, DetectionLoop};
use crate::error::InterpreterError;
use crate::phrases;
use crate::prefs::UserPreferences;
use crate::speech::SpeechSystem;

/// Interpreter view lifecycle. `Starting` covers camera acquisition;
/// `Speaking` is bounded by the speech engine's completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewState {
    Idle,
    Starting,
    Active,
    Speaking,
}

/// The interpreter view: owns the detection loop, the speech and clipboard
/// capabilities, and the user's preferences, and exposes the handful of
/// actions the view surface maps onto.
pub struct InterpreterApp {
    detection: DetectionLoop,
    speech: SpeechSystem,
    clipboard: ClipboardSystem,
    prefs: Arc<RwLock<UserPreferences>>,
    provider: Box<dyn CameraProvider>,
    constraints: CameraConstraints,
    results: watch::Receiver<Option<DetectionResult>>,
    state: ViewState,
}

impl InterpreterApp {
    pub fn new(
        classifier: Arc<dyn GestureClassifier>,
        provider: Box<dyn CameraProvider>,
        config: &SignsenseConfig,
        prefs: Arc<RwLock<UserPreferences>>,
    ) -> Self {
        let detection = DetectionLoop::new(classifier, DetectionConfig::from(&config.detection));
        let results = detection.subscribe();
        let mut speech = SpeechSystem::new(&config.speech);
        {
            let prefs = prefs.read();
            speech.set_volume(prefs.volume);
            speech.set_rate(prefs.speech_rate);
        }

        Self {
            detection,
            speech,
            clipboard: ClipboardSystem::new(),
            prefs,
            provider,
            constraints: CameraConstraints {
                device_index: config.camera.device_index,
                width: config.camera.width,
                height: config.camera.height,
                fps: config.camera.fps,
                prefer_front: config.camera.prefer_front,
            },
            results,
            state: ViewState::Idle,
        }
    }

    pub fn state(&self) -> ViewState {
        self.state
    }

    /// Currently published detection, if any.
    pub fn detected(&self) -> Option<DetectionResult> {
        self.results.borrow().clone()
    }

    /// Idle -> Starting -> Active; a failed start returns to Idle with the
    /// user-visible error.
    pub async fn start_detection(&mut self) -> Result<(), InterpreterError> {
        if self.state != ViewState::Idle {
            return Err(InterpreterError::SessionActive);
        }

        self.state = ViewState::Starting;
        match self
            .detection
            .start(self.provider.as_ref(), &self.constraints)
            .await
        {
            Ok(()) => {
                self.state = ViewState::Active;
                info!("interpreter active");
                Ok(())
            }
            Err(err) => {
                self.state = ViewState::Idle;
                warn!(%err, "could not start detection");
                Err(err)
            }
        }
    }

    /// Stop the session and wait for the camera to be released.
    pub async fn stop_detection(&mut self) {
        self.detection.stop();
        self.detection.join().await;
        self.state = ViewState::Idle;
        info!("interpreter idle");
    }

    /// Speak the detected phrase in the preferred language. Without a
    /// detected label this is a no-op and the speech engine is never
    /// invoked.
    pub async fn speak_detected(&mut self) -> Result<(), InterpreterError> {
        let current = match self.detected() {
            Some(current) => current,
            None => return Ok(()),
        };

        let (language, voice, volume, rate) = {
            let prefs = self.prefs.read();
            (
                prefs.language.clone(),
                prefs.voice,
                prefs.volume,
                prefs.speech_rate,
            )
        };
        self.speech.set_volume(volume);
        self.speech.set_rate(rate);
        let phrase = phrases::phrase_for(&current.label, &language);

        let resume = self.state;
        self.state = ViewState::Speaking;
        let outcome = self.speech.speak(&phrase, &language, voice).await;
        self.state = resume;
        outcome
    }

    /// Copy the detected phrase to the clipboard. No detection, no effect.
    pub fn copy_detected(&mut self) -> Result<(), InterpreterError> {
        match self.detected() {
            Some(current) => {
                let language = self.prefs.read().language.clone();
                let phrase = phrases::phrase_for(&current.label, &language);
                self.clipboard.copy_text(&phrase)
            }
            None => Ok(()),
        }
    }

    /// Interrupt an in-progress utterance.
    pub fn cancel_speech(&mut self) -> Result<(), InterpreterError> {
        self.speech.cancel()
    }

    /// Run the interpreter until Ctrl-C or the optional duration elapses,
    /// rendering each published detection and auto-speaking when the
    /// preference is on.
    pub async fn run(&mut self, duration: Option<Duration>) -> anyhow::Result<()> {
        self.start_detection().await?;

        let deadline = duration.map(|d| tokio::time::Instant::now() + d);
        let mut results = self.results.clone();

        loop {
            let timeout = async {
                match deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupt received, stopping");
                    break;
                }
                _ = timeout => {
                    info!("session duration elapsed, stopping");
                    break;
                }
                changed = results.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let published = results.borrow_and_update().clone();
                    let result = match published {
                        Some(result) => result,
                        None => continue,
                    };
                    self.render_detection(&result);

                    let auto_speak = self.prefs.read().auto_speak;
                    if auto_speak {
                        if let Err(err) = self.speak_detected().await {
                            warn!(%err, "auto-speak failed");
                        }
                    }
                }
            }
        }

        self.stop_detection().await;
        Ok(())
    }

    fn render_detection(&self, result: &DetectionResult) {
        let prefs = self.prefs.read();
        let phrase = phrases::phrase_for(&result.label, &prefs.language);
        if prefs.show_confidence {
            println!(
                "{phrase}  [{} {:.0}%]",
                result.label,
                result.confidence * 100.0
            );
        } else {
            println!("{phrase}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{FrameSource, VideoFrame};
    use crate::config::SignsenseConfig;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct IdleClassifier {
        ready: bool,
    }

    #[async_trait]
    impl GestureClassifier for IdleClassifier {
        fn is_ready(&self) -> bool {
            self.ready
        }

        fn labels(&self) -> &[String] {
            &[]
        }

        async fn classify(
            &self,
            _frame: &VideoFrame,
        ) -> Result<Vec<DetectionResult>, InterpreterError> {
            Ok(Vec::new())
        }
    }

    struct CountingProvider {
        acquisitions: Arc<AtomicUsize>,
        fail: bool,
    }

    struct NullSource;

    #[async_trait]
    impl FrameSource for NullSource {
        async fn capture_frame(&mut self) -> Result<Option<VideoFrame>, InterpreterError> {
            Ok(None)
        }

        async fn release(&mut self) {}
    }

    #[async_trait]
    impl CameraProvider for CountingProvider {
        async fn acquire(
            &self,
            _constraints: &CameraConstraints,
        ) -> Result<Box<dyn FrameSource>, InterpreterError> {
            self.acquisitions.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(InterpreterError::CameraUnavailable(
                    "permission denied".to_string(),
                ))
            } else {
                Ok(Box::new(NullSource))
            }
        }
    }

    fn app_with(ready: bool, fail: bool, acquisitions: Arc<AtomicUsize>) -> InterpreterApp {
        let config = SignsenseConfig::default();
        InterpreterApp::new(
            Arc::new(IdleClassifier { ready }),
            Box::new(CountingProvider { acquisitions, fail }),
            &config,
            Arc::new(RwLock::new(UserPreferences::default())),
        )
    }

    #[tokio::test]
    async fn model_not_ready_keeps_camera_untouched() {
        let acquisitions = Arc::new(AtomicUsize::new(0));
        let mut app = app_with(false, false, Arc::clone(&acquisitions));

        let err = app.start_detection().await.unwrap_err();
        assert!(matches!(err, InterpreterError::ModelNotReady));
        assert_eq!(app.state(), ViewState::Idle);
        assert_eq!(acquisitions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_camera_returns_to_idle() {
        let acquisitions = Arc::new(AtomicUsize::new(0));
        let mut app = app_with(true, true, Arc::clone(&acquisitions));

        let err = app.start_detection().await.unwrap_err();
        assert!(matches!(err, InterpreterError::CameraUnavailable(_)));
        assert_eq!(app.state(), ViewState::Idle);
        assert_eq!(acquisitions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn start_stop_walks_the_state_machine() {
        let acquisitions = Arc::new(AtomicUsize::new(0));
        let mut app = app_with(true, false, Arc::clone(&acquisitions));

        app.start_detection().await.unwrap();
        assert_eq!(app.state(), ViewState::Active);

        let second = app.start_detection().await.unwrap_err();
        assert!(matches!(second, InterpreterError::SessionActive));

        app.stop_detection().await;
        assert_eq!(app.state(), ViewState::Idle);
    }

    #[tokio::test]
    async fn speak_without_detection_is_a_noop() {
        let acquisitions = Arc::new(AtomicUsize::new(0));
        let mut app = app_with(true, false, acquisitions);

        // No detection published and no speech engine in this environment;
        // the call must still succeed without touching the engine.
        assert!(app.detected().is_none());
        assert!(app.speak_detected().await.is_ok());
        assert_eq!(app.state(), ViewState::Idle);
        assert!(app.copy_detected().is_ok());
    }
}
