// Vime Clipboard Access
// Thin seam over the system clipboard for the paste injection path

use super::InjectError;

/// Read/write access to clipboard text.
///
/// The paste strategy snapshots the current contents, replaces them, and
/// restores the snapshot afterwards; it only needs these two calls.
pub trait ClipboardAccess {
    /// Current clipboard text. `Ok(None)` means empty, not failure.
    fn get_text(&mut self) -> Result<Option<String>, InjectError>;
    fn set_text(&mut self, text: &str) -> Result<(), InjectError>;
}

/// The real system clipboard.
pub struct SystemClipboard {
    inner: arboard::Clipboard,
}

impl SystemClipboard {
    pub fn new() -> Result<Self, InjectError> {
        let inner =
            arboard::Clipboard::new().map_err(|e| InjectError::Clipboard(e.to_string()))?;
        Ok(Self { inner })
    }
}

impl ClipboardAccess for SystemClipboard {
    fn get_text(&mut self) -> Result<Option<String>, InjectError> {
        match self.inner.get_text() {
            Ok(text) => Ok(Some(text)),
            Err(arboard::Error::ContentNotAvailable) => Ok(None),
            Err(e) => Err(InjectError::Clipboard(e.to_string())),
        }
    }

    fn set_text(&mut self, text: &str) -> Result<(), InjectError> {
        self.inner
            .set_text(text)
            .map_err(|e| InjectError::Clipboard(e.to_string()))
    }
}
