use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::camera::{CameraConstraints, CameraProvider, FrameSource};
use crate::classifier::{DetectionResult, GestureClassifier};
use crate::config::DetectionSection;
use crate::error::InterpreterError;

#[derive(Debug, Clone)]
pub struct DetectionConfig {
    /// Minimum interval between classifier submissions.
    pub throttle: Duration,
    /// Polling tick interval.
    pub tick: Duration,
    /// Minimum confidence required to publish a detection.
    pub acceptance_threshold: f32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            throttle: Duration::from_millis(200),
            tick: Duration::from_millis(33),
            acceptance_threshold: 0.60,
        }
    }
}

impl From<&DetectionSection> for DetectionConfig {
    fn from(section: &DetectionSection) -> Self {
        Self {
            throttle: Duration::from_millis(section.throttle_ms),
            tick: Duration::from_millis(section.tick_ms.max(1)),
            acceptance_threshold: section.acceptance_threshold,
        }
    }
}

struct SessionHandle {
    active: Arc<AtomicBool>,
    generation: u64,
    task: JoinHandle<()>,
}

/// Drives camera frames through the classifier and publishes the winning
/// label. At most one session runs at a time; each session owns its camera
/// and is identified by a generation so results from a stopped session can
/// never surface.
pub struct DetectionLoop {
    classifier: Arc<dyn GestureClassifier>,
    config: DetectionConfig,
    publisher: Arc<watch::Sender<Option<DetectionResult>>>,
    session: Option<SessionHandle>,
    generation: u64,
}

impl DetectionLoop {
    pub fn new(classifier: Arc<dyn GestureClassifier>, config: DetectionConfig) -> Self {
        let (publisher, _) = watch::channel(None);
        Self {
            classifier,
            config,
            publisher: Arc::new(publisher),
            session: None,
            generation: 0,
        }
    }

    /// Receiver for published detections. Only a changed label produces a
    /// notification.
    pub fn subscribe(&self) -> watch::Receiver<Option<DetectionResult>> {
        self.publisher.subscribe()
    }

    /// Currently published detection, if any.
    pub fn current(&self) -> Option<DetectionResult> {
        self.publisher.borrow().clone()
    }

    pub fn is_active(&self) -> bool {
        self.session
            .as_ref()
            .map_or(false, |session| session.active.load(Ordering::SeqCst))
    }

    /// Acquire a camera and begin the polling cycle.
    ///
    /// Refused with `ModelNotReady` before touching the camera when the
    /// classifier is not loaded, and with `SessionActive` while a session
    /// is live. A provider failure surfaces as `CameraUnavailable` and no
    /// session is created.
    pub async fn start(
        &mut self,
        provider: &dyn CameraProvider,
        constraints: &CameraConstraints,
    ) -> Result<(), InterpreterError> {
        if !self.classifier.is_ready() {
            return Err(InterpreterError::ModelNotReady);
        }
        if self.is_active() {
            return Err(InterpreterError::SessionActive);
        }

        let source = provider.acquire(constraints).await?;

        self.generation += 1;
        let active = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(run_session(
            source,
            Arc::clone(&self.classifier),
            self.config.clone(),
            Arc::clone(&self.publisher),
            Arc::clone(&active),
            self.generation,
        ));

        info!(generation = self.generation, "detection session started");
        self.session = Some(SessionHandle {
            active,
            generation: self.generation,
            task,
        });
        Ok(())
    }

    /// Flag the session inactive and clear the published result. The
    /// session task observes the flag on its next tick, releases the
    /// camera, and terminates; a classification already in flight is
    /// discarded when it arrives.
    pub fn stop(&mut self) {
        if let Some(session) = &self.session {
            if session.active.swap(false, Ordering::SeqCst) {
                info!(generation = session.generation, "detection session stopping");
            }
        }
        clear_published(&self.publisher);
    }

    /// Wait for the session task to wind down after a stop.
    pub async fn join(&mut self) {
        if let Some(session) = self.session.take() {
            let _ = session.task.await;
        }
    }
}

impl Drop for DetectionLoop {
    fn drop(&mut self) {
        if let Some(session) = &self.session {
            session.active.store(false, Ordering::SeqCst);
        }
    }
}

fn clear_published(publisher: &watch::Sender<Option<DetectionResult>>) {
    publisher.send_if_modified(|current| {
        if current.is_some() {
            *current = None;
            true
        } else {
            false
        }
    });
}

async fn run_session(
    mut source: Box<dyn FrameSource>,
    classifier: Arc<dyn GestureClassifier>,
    config: DetectionConfig,
    publisher: Arc<watch::Sender<Option<DetectionResult>>>,
    active: Arc<AtomicBool>,
    generation: u64,
) {
    let mut ticker = tokio::time::interval(config.tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // First submission happens one full throttle interval after start.
    let mut last_submission = Instant::now();
    let mut error_ticks = 0u64;

    loop {
        ticker.tick().await;

        // Stop is terminal; the loop never reschedules past it.
        if !active.load(Ordering::SeqCst) {
            break;
        }

        if last_submission.elapsed() < config.throttle {
            continue;
        }

        let frame = match source.capture_frame().await {
            Ok(Some(frame)) => frame,
            // Nothing usable yet; try again next tick.
            Ok(None) => continue,
            Err(err) => {
                warn!(%err, generation, "capture source failed, ending session");
                active.store(false, Ordering::SeqCst);
                clear_published(&publisher);
                break;
            }
        };
        if !frame.is_decodable() {
            continue;
        }

        last_submission = Instant::now();
        let ranked = match classifier.classify(&frame).await {
            Ok(ranked) => ranked,
            Err(err) => {
                // A bad tick is absorbed; the next tick polls again.
                error_ticks += 1;
                debug!(%err, error_ticks, "classification failed this tick");
                continue;
            }
        };

        // The session may have been stopped while the inference was in
        // flight; its result must never surface.
        if !active.load(Ordering::SeqCst) {
            break;
        }

        let best = match ranked
            .into_iter()
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
        {
            Some(best) => best,
            None => continue,
        };

        if best.confidence < config.acceptance_threshold {
            continue;
        }
        let unchanged = publisher
            .borrow()
            .as_ref()
            .map_or(false, |current| current.label == best.label);
        if unchanged {
            continue;
        }

        debug!(
            label = %best.label,
            confidence = best.confidence,
            generation,
            "publishing detection"
        );
        publisher.send_replace(Some(best));
    }

    source.release().await;
    debug!(generation, "detection session ended");
}
