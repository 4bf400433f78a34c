// Vime Settings
// TOML configuration persisted at ~/.config/vime/config.toml, including the
// per-application state store written back by smart switch

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::InputMethod;
use crate::inject::{ClipboardTiming, Delays, InjectionConfig, Strategy};

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("No config directory available")]
    NoConfigDir,
}

/// Core behavior switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Transform keystrokes at startup.
    pub enabled: bool,
    /// Remember the enabled state per application.
    pub smart_switch: bool,
    /// Ctrl+Space toggles processing.
    pub toggle_hotkey: bool,
    /// Applications (lowercased) where processing is forced off.
    pub excluded_apps: Vec<String>,
    /// Input devices to grab, by path or name; empty = autodetect keyboards.
    pub devices: Vec<String>,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            smart_switch: true,
            toggle_hotkey: true,
            excluded_apps: Vec::new(),
            devices: Vec::new(),
        }
    }
}

/// Engine library location and behavior toggles, pushed over FFI at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Path, or a soname resolved by the dynamic loader.
    pub library: String,
    pub method: InputMethod,
    pub modern_tone: bool,
    pub english_auto_restore: bool,
    pub auto_capitalize: bool,
    pub esc_restore: bool,
    pub free_tone: bool,
    pub skip_w_shortcut: bool,
    pub bracket_shortcut: bool,
    pub foreign_consonants: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            library: "libvime_engine.so".to_string(),
            method: InputMethod::Telex,
            modern_tone: true,
            english_auto_restore: true,
            auto_capitalize: false,
            esc_restore: true,
            free_tone: false,
            skip_w_shortcut: false,
            bracket_shortcut: false,
            foreign_consonants: false,
        }
    }
}

/// How replacement text is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyChoice {
    /// Key events, switching to the clipboard for large replacements.
    #[default]
    Auto,
    /// Key events only, fast pacing.
    Direct,
    /// Key events only, conservative pacing.
    Paced,
    /// Always through the clipboard.
    Clipboard,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InjectionSettings {
    pub strategy: StrategyChoice,
    /// Backspace count beyond which auto mode pastes instead.
    pub clipboard_backspace_threshold: u8,
    /// Replacement character count beyond which auto mode pastes instead.
    pub clipboard_text_threshold: usize,
    pub direct: Delays,
    pub paced: Delays,
    pub clipboard: ClipboardTiming,
}

impl Default for InjectionSettings {
    fn default() -> Self {
        Self {
            strategy: StrategyChoice::Auto,
            clipboard_backspace_threshold: 4,
            clipboard_text_threshold: 15,
            direct: Delays::FAST,
            paced: Delays::SLOW,
            clipboard: ClipboardTiming::default(),
        }
    }
}

impl InjectionSettings {
    pub fn to_config(&self) -> InjectionConfig {
        let (strategy, auto_clipboard) = match self.strategy {
            StrategyChoice::Auto => (Strategy::Direct, true),
            StrategyChoice::Direct => (Strategy::Direct, false),
            StrategyChoice::Paced => (Strategy::Paced, false),
            StrategyChoice::Clipboard => (Strategy::Clipboard, false),
        };
        InjectionConfig {
            strategy,
            auto_clipboard,
            clipboard_backspace_threshold: self.clipboard_backspace_threshold,
            clipboard_text_threshold: self.clipboard_text_threshold,
            direct_delays: self.direct,
            paced_delays: self.paced,
            clipboard_timing: self.clipboard,
        }
    }
}

/// Text encoding a legacy application expects.
///
/// Injection on this platform always delivers Unicode; a legacy choice is
/// remembered per app but degrades to Unicode with a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputEncoding {
    #[default]
    Unicode,
    Tcvn3,
    Vni,
}

/// Remembered state for one application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppState {
    pub enabled: bool,
    pub encoding: OutputEncoding,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            enabled: true,
            encoding: OutputEncoding::Unicode,
        }
    }
}

/// Per-application state store, keyed by lowercased application name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppRegistry {
    apps: IndexMap<String, AppState>,
}

impl AppRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remembered enabled state, or `default` for an unknown app.
    pub fn enabled_for(&self, app: &str, default: bool) -> bool {
        self.apps
            .get(&app.to_lowercase())
            .map_or(default, |state| state.enabled)
    }

    pub fn remember_enabled(&mut self, app: &str, enabled: bool) {
        self.apps
            .entry(app.to_lowercase())
            .or_insert_with(AppState::default)
            .enabled = enabled;
    }

    /// Remembered output encoding; unknown apps use Unicode.
    pub fn encoding_for(&self, app: &str) -> OutputEncoding {
        self.apps
            .get(&app.to_lowercase())
            .map_or(OutputEncoding::Unicode, |state| state.encoding)
    }

    pub fn set_encoding(&mut self, app: &str, encoding: OutputEncoding) {
        self.apps
            .entry(app.to_lowercase())
            .or_insert_with(AppState::default)
            .encoding = encoding;
    }

    /// Overlay another registry; its entries win on conflict.
    pub fn merge(&mut self, other: &AppRegistry) {
        for (app, state) in &other.apps {
            self.apps.insert(app.clone(), *state);
        }
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }
}

/// Daemon-owned per-app state, written beside the config file at shutdown
/// so smart switch survives restarts without rewriting the user's config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppStateFile {
    pub apps: AppRegistry,
}

impl AppStateFile {
    /// Read the state file; a missing file is an empty registry.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

/// Complete on-disk configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub engine: EngineSettings,
    pub injection: InjectionSettings,
    pub shortcuts: IndexMap<String, String>,
    pub apps: AppRegistry,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            general: GeneralSettings::default(),
            engine: EngineSettings::default(),
            injection: InjectionSettings::default(),
            shortcuts: default_shortcuts(),
            apps: AppRegistry::default(),
        }
    }
}

/// Shortcut table shipped with a fresh install.
pub fn default_shortcuts() -> IndexMap<String, String> {
    IndexMap::from([
        ("vn".to_string(), "Việt Nam".to_string()),
        ("hn".to_string(), "Hà Nội".to_string()),
        ("hcm".to_string(), "Hồ Chí Minh".to_string()),
        ("->".to_string(), "→".to_string()),
        ("=>".to_string(), "⇒".to_string()),
        (":)".to_string(), "😊".to_string()),
    ])
}

impl Settings {
    /// Default config file path (~/.config/vime/config.toml).
    pub fn default_path() -> Result<PathBuf, SettingsError> {
        dirs::config_dir()
            .map(|dir| dir.join("vime").join("config.toml"))
            .ok_or(SettingsError::NoConfigDir)
    }

    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load from `path`, seeding it with the commented template on first run.
    pub fn load_or_create(path: &Path) -> Result<Self, SettingsError> {
        if path.exists() {
            return Self::from_file(path);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, default_config_content())?;
        info!("Wrote default configuration to {}", path.display());
        Ok(Self::default())
    }

    /// Write the current state back, comments dropped. Used at shutdown to
    /// persist the per-app registry.
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

/// Configuration template written on first run. Kept in sync with the
/// `Default` impls (asserted by test).
pub fn default_config_content() -> &'static str {
    r##"# Vime configuration

[general]
# Transform keystrokes at startup
enabled = true
# Remember the enabled state per application
smart_switch = true
# Ctrl+Space toggles processing
toggle_hotkey = true
# Applications (lowercased app id) where processing is forced off
excluded_apps = []
# Input devices to grab, by path or name; empty = autodetect keyboards
devices = []

[engine]
# Transform engine shared library: a path, or a soname on the loader path
library = "libvime_engine.so"
# Typing method: "telex" or "vni"
method = "telex"
modern_tone = true
english_auto_restore = true
auto_capitalize = false
esc_restore = true
free_tone = false
skip_w_shortcut = false
bracket_shortcut = false
foreign_consonants = false

[injection]
# "auto" sends key events and switches to the clipboard for large
# replacements; "direct" and "paced" never switch; "clipboard" always pastes
strategy = "auto"
clipboard_backspace_threshold = 4
clipboard_text_threshold = 15

[injection.direct]
backspace_ms = 8
char_ms = 5
gap_ms = 20

[injection.paced]
backspace_ms = 15
char_ms = 15
gap_ms = 30

[injection.clipboard]
backspace_ms = 10
gap_ms = 20
pre_paste_ms = 10
settle_ms = 50

# Abbreviations expanded on Space. Alphanumeric triggers expand here;
# punctuation triggers are expanded by the engine.
[shortcuts]
vn = "Việt Nam"
hn = "Hà Nội"
hcm = "Hồ Chí Minh"
"->" = "→"
"=>" = "⇒"
":)" = "😊"

# Per-application state, written back by smart switch. Example:
# [apps.firefox]
# enabled = false
# encoding = "unicode"
"##
}
