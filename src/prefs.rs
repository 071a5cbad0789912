use std::str::FromStr;

use anyhow::{anyhow, Error};

use crate::phrases;

/// Preferred synthesized voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoicePreference {
    Female,
    Male,
    Neutral,
}

impl FromStr for VoicePreference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "female" => Ok(Self::Female),
            "male" => Ok(Self::Male),
            "neutral" => Ok(Self::Neutral),
            other => Err(anyhow!("unknown voice preference: {other}")),
        }
    }
}

/// Sign language the user signs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignLanguage {
    Asl,
    Bsl,
    Isl,
    Jsl,
}

impl FromStr for SignLanguage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asl" => Ok(Self::Asl),
            "bsl" => Ok(Self::Bsl),
            "isl" => Ok(Self::Isl),
            "jsl" => Ok(Self::Jsl),
            other => Err(anyhow!("unknown sign language: {other}")),
        }
    }
}

/// Per-session user preferences.
///
/// Created with defaults, mutated in memory while the app runs, never
/// written to disk.
#[derive(Debug, Clone)]
pub struct UserPreferences {
    /// Spoken-translation language, primary subtag only (e.g. "en").
    pub language: String,
    pub sign_language: SignLanguage,
    pub voice: VoicePreference,
    /// Speech volume, 0.0 to 1.0.
    pub volume: f32,
    /// Speech rate multiplier around the engine's normal rate.
    pub speech_rate: f32,
    /// Speak each newly published phrase without a button press.
    pub auto_speak: bool,
    /// Render the confidence percentage next to the phrase.
    pub show_confidence: bool,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            sign_language: SignLanguage::Asl,
            voice: VoicePreference::Female,
            volume: 0.75,
            speech_rate: 1.0,
            auto_speak: false,
            show_confidence: true,
        }
    }
}

impl UserPreferences {
    /// Switch the translation language, refusing tags without a phrase
    /// table.
    pub fn set_language(&mut self, language: &str) -> Result<(), Error> {
        if !phrases::is_supported(language) {
            return Err(anyhow!(
                "unsupported language '{language}' (expected one of: {})",
                phrases::SUPPORTED_LANGUAGES.join(", ")
            ));
        }
        self.language = language.to_string();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_settings_view() {
        let prefs = UserPreferences::default();
        assert_eq!(prefs.language, "en");
        assert_eq!(prefs.sign_language, SignLanguage::Asl);
        assert_eq!(prefs.voice, VoicePreference::Female);
        assert!((prefs.volume - 0.75).abs() < f32::EPSILON);
        assert!((prefs.speech_rate - 1.0).abs() < f32::EPSILON);
        assert!(!prefs.auto_speak);
        assert!(prefs.show_confidence);
    }

    #[test]
    fn rejects_unknown_language() {
        let mut prefs = UserPreferences::default();
        assert!(prefs.set_language("tlh").is_err());
        assert_eq!(prefs.language, "en");
        assert!(prefs.set_language("ja").is_ok());
        assert_eq!(prefs.language, "ja");
    }

    #[test]
    fn parses_voice_and_sign_language() {
        assert_eq!(
            "neutral".parse::<VoicePreference>().unwrap(),
            VoicePreference::Neutral
        );
        assert!("robotic".parse::<VoicePreference>().is_err());
        assert_eq!("BSL".parse::<SignLanguage>().unwrap(), SignLanguage::Bsl);
        assert!("ksl".parse::<SignLanguage>().is_err());
    }
}
