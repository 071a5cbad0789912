use thiserror::Error;

/// Errors surfaced by interpreter operations.
///
/// Anything that prevents a session from becoming usable is returned to the
/// caller and shown to the user. A single bad inference tick is absorbed by
/// the detection loop and never escalates. Nothing here is fatal to the
/// process.
#[derive(Debug, Error)]
pub enum InterpreterError {
    /// The gesture classifier has not finished loading. Start is refused
    /// before any camera acquisition happens.
    #[error("gesture model is not loaded yet")]
    ModelNotReady,

    /// Camera acquisition failed: permission denied, device busy, or no
    /// device present. Carries the provider's diagnostic.
    #[error("camera unavailable: {0}")]
    CameraUnavailable(String),

    /// The capture source opened but could not begin delivering frames.
    #[error("video playback failed: {0}")]
    PlaybackFailure(String),

    /// A detection session is already running; stop it before starting
    /// another.
    #[error("a detection session is already active")]
    SessionActive,

    /// A single classification call failed.
    #[error("classification failed: {0}")]
    ClassificationError(String),

    /// No text-to-speech engine is available on this platform.
    #[error("speech synthesis is not available")]
    SpeechUnsupported,

    #[error("speech synthesis failed: {0}")]
    SpeechFailure(String),

    #[error("clipboard write failed: {0}")]
    ClipboardFailure(String),
}
