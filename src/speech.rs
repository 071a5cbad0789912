use std::time::Duration;

use tracing::{debug, info, warn};
use tts::Tts;

use crate::config::SpeechSection;
use crate::error::InterpreterError;
use crate::prefs::VoicePreference;

/// Platform text-to-speech. A missing engine degrades to
/// `SpeechUnsupported` on use rather than failing construction; detection
/// keeps working without a voice.
pub struct SpeechSystem {
    engine: Option<Tts>,
    volume: f32,
    rate: f32,
}

impl SpeechSystem {
    pub fn new(config: &SpeechSection) -> Self {
        let engine = if config.enabled {
            match Tts::default() {
                Ok(tts) => {
                    info!("text-to-speech engine initialized");
                    Some(tts)
                }
                Err(err) => {
                    warn!(%err, "no text-to-speech engine available");
                    None
                }
            }
        } else {
            None
        };

        Self {
            engine,
            volume: config.volume.clamp(0.0, 1.0),
            rate: config.rate.clamp(0.5, 2.0),
        }
    }

    pub fn is_available(&self) -> bool {
        self.engine.is_some()
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    pub fn set_rate(&mut self, rate: f32) {
        self.rate = rate.clamp(0.5, 2.0);
    }

    /// Speak `text` with a voice matching `language` and the preferred
    /// voice kind when one exists, then wait for the utterance to finish.
    /// Empty text is a no-op and the engine is never invoked.
    pub async fn speak(
        &mut self,
        text: &str,
        language: &str,
        voice: VoicePreference,
    ) -> Result<(), InterpreterError> {
        if text.trim().is_empty() {
            return Ok(());
        }
        let (volume, rate) = (self.volume, self.rate);
        let engine = self
            .engine
            .as_mut()
            .ok_or(InterpreterError::SpeechUnsupported)?;

        let features = engine.supported_features();
        if features.voice {
            select_voice(engine, language, voice);
        }
        if features.volume {
            let min = engine.min_volume();
            let max = engine.max_volume();
            if let Err(err) = engine.set_volume(min + (max - min) * volume) {
                warn!(%err, "could not set speech volume");
            }
        }
        if features.rate {
            let scaled = (engine.normal_rate() * rate)
                .clamp(engine.min_rate(), engine.max_rate());
            if let Err(err) = engine.set_rate(scaled) {
                warn!(%err, "could not set speech rate");
            }
        }

        info!(%language, "speaking: {text}");
        engine
            .speak(text, true)
            .map_err(|e| InterpreterError::SpeechFailure(e.to_string()))?;

        if features.is_speaking {
            // Poll the engine until the utterance completes.
            while engine
                .is_speaking()
                .map_err(|e| InterpreterError::SpeechFailure(e.to_string()))?
            {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
        debug!("speech completed");
        Ok(())
    }

    /// Interrupt any in-progress utterance.
    pub fn cancel(&mut self) -> Result<(), InterpreterError> {
        let engine = self
            .engine
            .as_mut()
            .ok_or(InterpreterError::SpeechUnsupported)?;
        engine
            .stop()
            .map(|_| ())
            .map_err(|e| InterpreterError::SpeechFailure(e.to_string()))
    }
}

fn select_voice(engine: &mut Tts, language: &str, preference: VoicePreference) {
    let voices = match engine.voices() {
        Ok(voices) => voices,
        Err(err) => {
            warn!(%err, "could not enumerate voices");
            return;
        }
    };

    let mut matching = voices
        .iter()
        .filter(|v| v.language().as_str().starts_with(language));
    let preferred_gender = match preference {
        VoicePreference::Female => Some(tts::Gender::Female),
        VoicePreference::Male => Some(tts::Gender::Male),
        VoicePreference::Neutral => None,
    };

    let chosen = match preferred_gender {
        Some(gender) => matching
            .clone()
            .find(|v| v.gender() == Some(gender))
            .or_else(|| matching.next()),
        None => matching.next(),
    };

    match chosen {
        Some(voice) => {
            if let Err(err) = engine.set_voice(voice) {
                warn!(%err, %language, "could not select voice");
            }
        }
        None => debug!(%language, "no matching voice, keeping default"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpeechSection;

    fn disabled() -> SpeechSystem {
        SpeechSystem::new(&SpeechSection {
            enabled: false,
            volume: 0.75,
            rate: 1.0,
        })
    }

    #[tokio::test]
    async fn empty_text_is_a_noop_even_without_an_engine() {
        let mut speech = disabled();
        assert!(!speech.is_available());
        // No engine to invoke, yet empty input must still succeed.
        assert!(speech.speak("", "en", VoicePreference::Female).await.is_ok());
        assert!(speech
            .speak("   ", "en", VoicePreference::Female)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn missing_engine_reports_unsupported() {
        let mut speech = disabled();
        let err = speech
            .speak("Hello", "en", VoicePreference::Female)
            .await
            .unwrap_err();
        assert!(matches!(err, InterpreterError::SpeechUnsupported));
        assert!(matches!(
            speech.cancel().unwrap_err(),
            InterpreterError::SpeechUnsupported
        ));
    }

    #[test]
    fn volume_and_rate_are_clamped() {
        let mut speech = disabled();
        speech.set_volume(3.0);
        assert!((speech.volume - 1.0).abs() < f32::EPSILON);
        speech.set_rate(0.1);
        assert!((speech.rate - 0.5).abs() < f32::EPSILON);
    }
}
