//! Gesture label to spoken-phrase tables.
//!
//! The classifier publishes raw model labels ("Open_Palm"); the interpreter
//! renders and speaks the phrase for the user's language. Labels without a
//! table entry fall back to the label itself with underscores stripped, so
//! new model vocabularies degrade readably instead of failing.

/// Languages with a full phrase table.
pub const SUPPORTED_LANGUAGES: &[&str] = &["en", "es", "fr", "de", "ja", "zh", "ar", "hi"];

const GESTURES: &[&str] = &[
    "Open_Palm",
    "Closed_Fist",
    "Thumb_Up",
    "Thumb_Down",
    "Victory",
    "Pointing_Up",
    "ILoveYou",
];

fn table(language: &str) -> Option<&'static [&'static str; 7]> {
    match language {
        "en" => Some(&["Hello", "Stop", "Yes", "No", "Peace", "Wait", "I love you"]),
        "es" => Some(&["Hola", "Alto", "Sí", "No", "Paz", "Espera", "Te quiero"]),
        "fr" => Some(&["Bonjour", "Stop", "Oui", "Non", "Paix", "Attends", "Je t'aime"]),
        "de" => Some(&["Hallo", "Stopp", "Ja", "Nein", "Frieden", "Warte", "Ich liebe dich"]),
        "ja" => Some(&[
            "こんにちは",
            "止まって",
            "はい",
            "いいえ",
            "ピース",
            "待って",
            "愛しています",
        ]),
        "zh" => Some(&["你好", "停", "是", "不是", "和平", "等一下", "我爱你"]),
        "ar" => Some(&["مرحبا", "قف", "نعم", "لا", "سلام", "انتظر", "أحبك"]),
        "hi" => Some(&[
            "नमस्ते",
            "रुको",
            "हाँ",
            "नहीं",
            "शांति",
            "रुकिए",
            "मैं तुमसे प्यार करता हूँ",
        ]),
        _ => None,
    }
}

pub fn is_supported(language: &str) -> bool {
    SUPPORTED_LANGUAGES.contains(&language)
}

/// Phrase for a gesture label in the given language. Unknown languages fall
/// back to English; unknown labels fall back to the label text itself.
pub fn phrase_for(label: &str, language: &str) -> String {
    let index = GESTURES.iter().position(|gesture| *gesture == label);
    match (index, table(language).or_else(|| table("en"))) {
        (Some(i), Some(entries)) => entries[i].to_string(),
        _ => label.replace('_', " "),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_gesture_translates() {
        assert_eq!(phrase_for("Open_Palm", "en"), "Hello");
        assert_eq!(phrase_for("Open_Palm", "es"), "Hola");
        assert_eq!(phrase_for("Closed_Fist", "de"), "Stopp");
    }

    #[test]
    fn unknown_language_falls_back_to_english() {
        assert_eq!(phrase_for("Thumb_Up", "pt"), "Yes");
    }

    #[test]
    fn unknown_label_falls_back_to_label_text() {
        assert_eq!(phrase_for("Call_Me", "en"), "Call Me");
    }

    #[test]
    fn every_supported_language_covers_every_gesture() {
        for language in SUPPORTED_LANGUAGES {
            let entries = table(language).expect("missing table");
            assert_eq!(entries.len(), GESTURES.len());
            for entry in entries.iter() {
                assert!(!entry.is_empty());
            }
        }
    }
}
