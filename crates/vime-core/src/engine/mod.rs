// Vime Engine Interface
// Transform engine seam: the dynamic library that turns keystrokes into
// Vietnamese text edits, plus a passthrough stand-in for degraded mode

mod ffi;

pub use ffi::{FfiEngine, RawResult, FLAG_KEY_CONSUMED};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Failed to load engine library '{path}': {reason}")]
    LibraryLoad { path: String, reason: String },

    #[error("Engine library has no symbol '{0}'")]
    MissingSymbol(&'static str),
}

/// Typing method the engine interprets keystrokes with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputMethod {
    #[default]
    Telex,
    Vni,
}

impl InputMethod {
    pub fn as_u8(self) -> u8 {
        match self {
            InputMethod::Telex => 0,
            InputMethod::Vni => 1,
        }
    }
}

/// Independent behavior toggles the engine exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineOption {
    /// Modern tone placement ("hoà" rather than "hòa").
    ModernTone,
    /// Restore words that turn out to be English.
    EnglishAutoRestore,
    /// Capitalize after sentence-ending punctuation.
    AutoCapitalize,
    /// Leave a leading "w" alone instead of expanding it.
    SkipWShortcut,
    /// "[" and "]" as shortcuts for "ơ" and "ư".
    BracketShortcut,
    /// ESC restores the raw ASCII of the current word.
    EscRestore,
    /// Place tones wherever typed, skipping validation.
    FreeTone,
    /// Allow consonant clusters foreign to Vietnamese.
    ForeignConsonants,
}

/// What the engine wants done after one keystroke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineAction {
    #[default]
    None,
    Replace,
}

/// Owned decode of one engine result, safe to hold after the FFI buffer
/// is released.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EngineReply {
    pub action: EngineAction,
    pub backspaces: u8,
    pub text: String,
    pub key_consumed: bool,
}

impl EngineReply {
    pub fn none() -> Self {
        Self::default()
    }

    /// True when the reply carries a text replacement to inject.
    pub fn is_replace(&self) -> bool {
        self.action == EngineAction::Replace && !self.text.is_empty()
    }
}

/// The transform engine as the processor sees it.
///
/// The production implementation is [`FfiEngine`]; tests script their own,
/// and [`PassthroughEngine`] stands in when the library cannot be loaded.
pub trait Engine {
    /// Feed one keystroke. `caps` is shift XOR caps-lock, the case the
    /// engine should produce.
    fn process_key(&mut self, keycode: u16, caps: bool, ctrl: bool, shift: bool) -> EngineReply;

    /// Drop the current word composition (word boundary passed).
    fn clear_buffer(&mut self);

    /// Drop composition and word history (focus or cursor moved).
    fn clear_all(&mut self);

    fn set_enabled(&mut self, enabled: bool);
    fn set_method(&mut self, method: InputMethod);
    fn set_option(&mut self, option: EngineOption, enabled: bool);

    fn add_shortcut(&mut self, trigger: &str, replacement: &str);
    fn remove_shortcut(&mut self, trigger: &str);
    fn clear_shortcuts(&mut self);
}

/// Engine that never transforms anything.
///
/// Installed when the engine library fails to load, so the daemon keeps
/// forwarding keystrokes instead of dying with the keyboard grabbed.
#[derive(Debug, Default)]
pub struct PassthroughEngine;

impl PassthroughEngine {
    pub fn new() -> Self {
        Self
    }
}

impl Engine for PassthroughEngine {
    fn process_key(&mut self, _keycode: u16, _caps: bool, _ctrl: bool, _shift: bool) -> EngineReply {
        EngineReply::none()
    }

    fn clear_buffer(&mut self) {}
    fn clear_all(&mut self) {}
    fn set_enabled(&mut self, _enabled: bool) {}
    fn set_method(&mut self, _method: InputMethod) {}
    fn set_option(&mut self, _option: EngineOption, _enabled: bool) {}
    fn add_shortcut(&mut self, _trigger: &str, _replacement: &str) {}
    fn remove_shortcut(&mut self, _trigger: &str) {}
    fn clear_shortcuts(&mut self) {}
}
