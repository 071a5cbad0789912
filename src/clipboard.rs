use arboard::Clipboard;
use tracing::{debug, warn};

use crate::error::InterpreterError;

/// System clipboard access. Headless environments without a clipboard
/// backend degrade to `ClipboardFailure` on use.
pub struct ClipboardSystem {
    clipboard: Option<Clipboard>,
}

impl ClipboardSystem {
    pub fn new() -> Self {
        let clipboard = match Clipboard::new() {
            Ok(clipboard) => Some(clipboard),
            Err(err) => {
                warn!(%err, "clipboard unavailable");
                None
            }
        };
        Self { clipboard }
    }

    /// Copy `text` to the clipboard. Empty text is a no-op.
    pub fn copy_text(&mut self, text: &str) -> Result<(), InterpreterError> {
        if text.is_empty() {
            return Ok(());
        }
        let clipboard = self
            .clipboard
            .as_mut()
            .ok_or_else(|| InterpreterError::ClipboardFailure("no clipboard backend".to_string()))?;
        clipboard
            .set_text(text)
            .map_err(|e| InterpreterError::ClipboardFailure(e.to_string()))?;
        debug!("copied {} characters", text.len());
        Ok(())
    }
}

impl Default for ClipboardSystem {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_is_a_noop() {
        // Works with or without a clipboard backend present.
        let mut clipboard = ClipboardSystem {
            clipboard: None,
        };
        assert!(clipboard.copy_text("").is_ok());
        assert!(matches!(
            clipboard.copy_text("Hello").unwrap_err(),
            InterpreterError::ClipboardFailure(_)
        ));
    }
}
