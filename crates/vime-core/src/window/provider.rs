// Vime Window Context Provider
// Trait seam between the processor's per-app policy and whatever window
// system reports the focused application

use thiserror::Error;

/// Errors from window context queries
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WindowError {
    #[error("Not connected to the compositor")]
    NotConnected,

    #[error("Compositor connection failed: {0}")]
    ConnectionFailed(String),
}

/// Identity of the currently focused window.
///
/// `None` fields mean the compositor has not reported that detail (yet).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FocusedWindow {
    /// Application id (Wayland app_id, e.g. "org.mozilla.firefox")
    pub app_id: Option<String>,
    /// Window title
    pub title: Option<String>,
}

impl FocusedWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_details(app_id: Option<String>, title: Option<String>) -> Self {
        Self { app_id, title }
    }

    /// Lowercased application key for the per-app registry.
    ///
    /// Per-app state is keyed case-insensitively so "Firefox" and "firefox"
    /// share one entry.
    pub fn app_key(&self) -> Option<String> {
        self.app_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .map(|id| id.to_lowercase())
    }
}

/// Source of focused-window identity.
///
/// Implementations watch a window system (Wayland today) and keep a cheap
/// snapshot the processor can read on every keystroke.
pub trait WindowContextProvider: Send + Sync {
    /// Connect to the window system.
    ///
    /// May spawn a background thread for event handling.
    fn connect(&mut self) -> Result<(), WindowError>;

    /// Stop reporting window context.
    fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    /// Current focused window, from the cached snapshot.
    fn focused_window(&self) -> Result<FocusedWindow, WindowError>;
}
