// Vime Text Injection
// Delivers replacement text to the focused application as synthetic input

mod clipboard;

pub use clipboard::{ClipboardAccess, SystemClipboard};

use std::thread;
use std::time::Duration;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::action::Action;
use crate::output::UInputError;

#[derive(Error, Debug)]
pub enum InjectError {
    #[error("Output device failure: {0}")]
    Sink(#[from] UInputError),

    #[error("Clipboard failure: {0}")]
    Clipboard(String),
}

/// Destination for synthetic key events.
///
/// The daemon drives one real implementation, the uinput virtual keyboard.
/// Tests substitute a recording double so injection order can be asserted
/// without a display server.
pub trait KeySink {
    /// Re-emit a grabbed hardware event unchanged.
    fn forward_key(&mut self, code: u16, action: Action) -> Result<(), InjectError>;
    /// Tap backspace once.
    fn backspace(&mut self) -> Result<(), InjectError>;
    /// Type one character.
    fn send_char(&mut self, ch: char) -> Result<(), InjectError>;
    /// Press the paste combination (Ctrl+V).
    fn paste_chord(&mut self) -> Result<(), InjectError>;
    /// Release held modifiers, returning the codes to press back later.
    fn suspend_modifiers(&mut self) -> Result<Vec<u16>, InjectError>;
    /// Press back modifiers released by `suspend_modifiers`.
    fn resume_modifiers(&mut self, codes: &[u16]) -> Result<(), InjectError>;
    /// Release everything still pressed.
    fn release_all(&mut self) -> Result<(), InjectError>;
}

/// Inter-event pacing for key-event injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delays {
    /// After each backspace tap.
    pub backspace_ms: u64,
    /// After each typed character.
    pub char_ms: u64,
    /// Between the last backspace and the first character.
    pub gap_ms: u64,
}

impl Delays {
    pub const FAST: Delays = Delays {
        backspace_ms: 8,
        char_ms: 5,
        gap_ms: 20,
    };

    /// For applications that drop rapidly sent synthetic input.
    pub const SLOW: Delays = Delays {
        backspace_ms: 15,
        char_ms: 15,
        gap_ms: 30,
    };

    pub const NONE: Delays = Delays {
        backspace_ms: 0,
        char_ms: 0,
        gap_ms: 0,
    };
}

/// Pacing for the clipboard paste path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipboardTiming {
    pub backspace_ms: u64,
    pub gap_ms: u64,
    pub pre_paste_ms: u64,
    /// Wait before restoring the saved clipboard, so the target has read
    /// the replacement first.
    pub settle_ms: u64,
}

impl Default for ClipboardTiming {
    fn default() -> Self {
        Self {
            backspace_ms: 10,
            gap_ms: 20,
            pre_paste_ms: 10,
            settle_ms: 50,
        }
    }
}

/// How replacement text reaches the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Per-character key events with fast pacing.
    Direct,
    /// Per-character key events with conservative pacing.
    Paced,
    /// Clipboard swap plus a paste chord.
    Clipboard,
}

#[derive(Debug, Clone)]
pub struct InjectionConfig {
    pub strategy: Strategy,
    /// Escalate to the clipboard path when a single injection exceeds the
    /// thresholds below.
    pub auto_clipboard: bool,
    pub clipboard_backspace_threshold: u8,
    pub clipboard_text_threshold: usize,
    pub direct_delays: Delays,
    pub paced_delays: Delays,
    pub clipboard_timing: ClipboardTiming,
}

impl Default for InjectionConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::Direct,
            auto_clipboard: true,
            clipboard_backspace_threshold: 4,
            clipboard_text_threshold: 15,
            direct_delays: Delays::FAST,
            paced_delays: Delays::SLOW,
            clipboard_timing: ClipboardTiming::default(),
        }
    }
}

/// Applies a `(text, backspaces)` edit to the focused application.
///
/// Whatever the strategy, the observable effect is "delete N characters,
/// then insert the text". Delivery is fire-and-forget: there is no readback
/// from the application, so a drop on the far side cannot be detected.
pub struct Injector {
    sink: Box<dyn KeySink>,
    clipboard: Box<dyn ClipboardAccess>,
    config: InjectionConfig,
}

impl Injector {
    pub fn new(
        sink: Box<dyn KeySink>,
        clipboard: Box<dyn ClipboardAccess>,
        config: InjectionConfig,
    ) -> Self {
        Self {
            sink,
            clipboard,
            config,
        }
    }

    pub fn config(&self) -> &InjectionConfig {
        &self.config
    }

    /// Delete `backspaces` characters, then type `text`.
    pub fn inject(&mut self, text: &str, backspaces: u8) -> Result<(), InjectError> {
        if text.is_empty() && backspaces == 0 {
            return Ok(());
        }
        let strategy = self.resolve(text, backspaces);
        debug!(
            "inject: {} backspaces, {} chars, {:?}",
            backspaces,
            text.chars().count(),
            strategy
        );
        match strategy {
            Strategy::Direct => self.inject_events(text, backspaces, self.config.direct_delays),
            Strategy::Paced => self.inject_events(text, backspaces, self.config.paced_delays),
            Strategy::Clipboard => self.inject_clipboard(text, backspaces),
        }
    }

    /// Re-emit a grabbed hardware event on the virtual device.
    pub fn forward_key(&mut self, code: u16, action: Action) -> Result<(), InjectError> {
        self.sink.forward_key(code, action)
    }

    pub fn release_all(&mut self) -> Result<(), InjectError> {
        self.sink.release_all()
    }

    fn resolve(&self, text: &str, backspaces: u8) -> Strategy {
        if self.config.strategy == Strategy::Clipboard {
            return Strategy::Clipboard;
        }
        if self.config.auto_clipboard
            && (backspaces > self.config.clipboard_backspace_threshold
                || text.chars().count() > self.config.clipboard_text_threshold)
        {
            return Strategy::Clipboard;
        }
        self.config.strategy
    }

    fn inject_events(
        &mut self,
        text: &str,
        backspaces: u8,
        delays: Delays,
    ) -> Result<(), InjectError> {
        let held = self.sink.suspend_modifiers()?;
        let sent = self.send_events(text, backspaces, delays);
        let restored = self.sink.resume_modifiers(&held);
        sent.and(restored)
    }

    fn send_events(
        &mut self,
        text: &str,
        backspaces: u8,
        delays: Delays,
    ) -> Result<(), InjectError> {
        for _ in 0..backspaces {
            self.sink.backspace()?;
            sleep_ms(delays.backspace_ms);
        }
        if text.is_empty() {
            return Ok(());
        }
        if backspaces > 0 {
            sleep_ms(delays.gap_ms);
        }
        for ch in text.chars() {
            self.sink.send_char(ch)?;
            sleep_ms(delays.char_ms);
        }
        Ok(())
    }

    fn inject_clipboard(&mut self, text: &str, backspaces: u8) -> Result<(), InjectError> {
        let held = self.sink.suspend_modifiers()?;
        let pasted = self.paste_through_clipboard(text, backspaces);
        let restored = self.sink.resume_modifiers(&held);
        pasted.and(restored)
    }

    fn paste_through_clipboard(&mut self, text: &str, backspaces: u8) -> Result<(), InjectError> {
        let timing = self.config.clipboard_timing;
        for _ in 0..backspaces {
            self.sink.backspace()?;
            sleep_ms(timing.backspace_ms);
        }
        if text.is_empty() {
            return Ok(());
        }
        if backspaces > 0 {
            sleep_ms(timing.gap_ms);
        }

        // Snapshot before overwriting; a failure here aborts the paste so
        // the user's clipboard is never clobbered without a way back.
        let saved = self.clipboard.get_text()?;
        self.clipboard.set_text(text)?;
        sleep_ms(timing.pre_paste_ms);
        let pasted = self.sink.paste_chord();
        if let Some(previous) = saved {
            sleep_ms(timing.settle_ms);
            if let Err(e) = self.clipboard.set_text(&previous) {
                warn!("Failed to restore clipboard contents: {}", e);
            }
        }
        pasted
    }
}

fn sleep_ms(ms: u64) {
    if ms > 0 {
        thread::sleep(Duration::from_millis(ms));
    }
}
