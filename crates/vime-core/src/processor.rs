// Vime Processor
// Orchestrates one keystroke end to end: per-app policy, shortcut matching,
// engine invocation and replacement injection

use log::{debug, warn};

use crate::action::Action;
use crate::engine::{Engine, EngineOption};
use crate::hook::{EventHandler, KeyEvent};
use crate::inject::Injector;
use crate::key;
use crate::settings::{AppRegistry, OutputEncoding, Settings};
use crate::shortcut::{ShortcutBuffer, ShortcutTable};
use crate::translate::{self, INVALID_KEYCODE};
use crate::window::WindowContextProvider;

/// The per-keystroke state machine between the hook and the engine.
///
/// Owns one of everything downstream of the hook: the engine, the injector,
/// the shortcut state and the focus provider. The hook calls in through
/// [`EventHandler`]; nothing here runs concurrently.
pub struct Processor {
    engine: Box<dyn Engine>,
    injector: Injector,
    window: Box<dyn WindowContextProvider>,
    shortcuts: ShortcutTable,
    buffer: ShortcutBuffer,
    apps: AppRegistry,
    smart_switch: bool,
    excluded_apps: Vec<String>,
    enabled: bool,
    /// Startup state, used for apps the registry has never seen.
    default_enabled: bool,
    current_app: Option<String>,
    /// Enabled state saved when an excluded app took focus, restored on the
    /// way out so exclusion never permanently disables processing.
    restore_enabled: Option<bool>,
    encoding: OutputEncoding,
}

impl Processor {
    pub fn new(
        engine: Box<dyn Engine>,
        injector: Injector,
        window: Box<dyn WindowContextProvider>,
        settings: &Settings,
    ) -> Self {
        let mut processor = Self {
            engine,
            injector,
            window,
            shortcuts: ShortcutTable::new(),
            buffer: ShortcutBuffer::new(),
            apps: AppRegistry::new(),
            smart_switch: true,
            excluded_apps: Vec::new(),
            enabled: true,
            default_enabled: true,
            current_app: None,
            restore_enabled: None,
            encoding: OutputEncoding::Unicode,
        };
        processor.apply_settings(settings);
        processor
    }

    /// Push configuration into the engine and the local policy state.
    pub fn apply_settings(&mut self, settings: &Settings) {
        self.enabled = settings.general.enabled;
        self.default_enabled = settings.general.enabled;
        self.smart_switch = settings.general.smart_switch;
        self.excluded_apps = settings
            .general
            .excluded_apps
            .iter()
            .map(|app| app.to_lowercase())
            .collect();
        self.apps = settings.apps.clone();

        self.engine.set_enabled(self.enabled);
        self.engine.set_method(settings.engine.method);
        let options = [
            (EngineOption::ModernTone, settings.engine.modern_tone),
            (
                EngineOption::EnglishAutoRestore,
                settings.engine.english_auto_restore,
            ),
            (EngineOption::AutoCapitalize, settings.engine.auto_capitalize),
            (EngineOption::EscRestore, settings.engine.esc_restore),
            (EngineOption::FreeTone, settings.engine.free_tone),
            (EngineOption::SkipWShortcut, settings.engine.skip_w_shortcut),
            (EngineOption::BracketShortcut, settings.engine.bracket_shortcut),
            (
                EngineOption::ForeignConsonants,
                settings.engine.foreign_consonants,
            ),
        ];
        for (option, enabled) in options {
            self.engine.set_option(option, enabled);
        }

        self.shortcuts.clear();
        self.engine.clear_shortcuts();
        for (trigger, expansion) in &settings.shortcuts {
            if trigger.is_empty() || expansion.is_empty() {
                warn!("Skipping shortcut with an empty trigger or expansion");
                continue;
            }
            self.shortcuts.add(trigger, expansion);
            self.engine.add_shortcut(trigger, expansion);
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Per-app store, for persisting at shutdown.
    pub fn registry(&self) -> &AppRegistry {
        &self.apps
    }

    pub fn current_app(&self) -> Option<&str> {
        self.current_app.as_deref()
    }

    /// Encoding the focused app asked for. Injection delivers Unicode
    /// regardless; a legacy value only marks the app in the registry.
    pub fn output_encoding(&self) -> OutputEncoding {
        self.encoding
    }

    /// Fold the live enabled state into the registry, for persisting.
    pub fn remember_current_app(&mut self) {
        if self.smart_switch {
            if let Some(app) = self.current_app.clone() {
                self.apps.remember_enabled(&app, self.enabled);
            }
        }
    }

    /// Release anything the virtual device still holds down.
    pub fn release_all(&mut self) {
        if let Err(err) = self.injector.release_all() {
            warn!("Release failed: {err}");
        }
    }

    /// Re-read the focused application and apply its remembered policy.
    ///
    /// Runs before every keystroke. When the focus provider is down the
    /// last known policy stays in force.
    fn refresh_app_context(&mut self) {
        let Ok(focused) = self.window.focused_window() else {
            return;
        };
        let Some(app) = focused.app_key() else {
            return;
        };
        if self.current_app.as_deref() == Some(app.as_str()) {
            return;
        }

        if let Some(previous) = self.current_app.take() {
            if self.smart_switch {
                self.apps.remember_enabled(&previous, self.enabled);
            }
        }
        debug!("Focus moved to {app}");

        if self.is_excluded(&app) {
            if self.restore_enabled.is_none() {
                self.restore_enabled = Some(self.enabled);
            }
            self.set_enabled(false);
        } else {
            let saved = self.restore_enabled.take();
            if self.smart_switch {
                let target = self.apps.enabled_for(&app, self.default_enabled);
                self.set_enabled(target);
            } else if let Some(previous) = saved {
                self.set_enabled(previous);
            }
        }
        self.apply_encoding(&app);

        // The composition belongs to the field that lost focus
        self.buffer.clear();
        self.engine.clear_all();
        self.current_app = Some(app);
    }

    fn is_excluded(&self, app: &str) -> bool {
        self.excluded_apps.iter().any(|excluded| excluded == app)
    }

    fn set_enabled(&mut self, enabled: bool) {
        if self.enabled == enabled {
            return;
        }
        self.enabled = enabled;
        self.engine.set_enabled(enabled);
        debug!("Processing {}", if enabled { "on" } else { "off" });
    }

    fn apply_encoding(&mut self, app: &str) {
        let encoding = self.apps.encoding_for(app);
        if encoding == self.encoding {
            return;
        }
        if encoding != OutputEncoding::Unicode {
            warn!("{app} asks for {encoding:?} output; only Unicode injection is supported");
        }
        self.encoding = encoding;
    }
}

impl EventHandler for Processor {
    fn on_key(&mut self, event: &KeyEvent) -> bool {
        self.refresh_app_context();

        if !self.enabled {
            return false;
        }

        let code = event.key.code();
        if code == key::BACKSPACE {
            self.buffer.on_backspace();
        }

        let engine_code = translate::to_engine_keycode(code);
        if engine_code == INVALID_KEYCODE {
            return false;
        }

        // Expansion runs before character tracking: Space would clear the
        // buffered word it is supposed to match
        if code == key::SPACE {
            if let Some((expansion, matched)) = self.buffer.check_expansion(&self.shortcuts) {
                self.engine.clear_buffer();
                let text = format!("{expansion} ");
                if let Err(err) = self.injector.inject(&text, matched as u8) {
                    warn!("Shortcut injection failed: {err}");
                }
                return true;
            }
        }

        if let Some(c) = translate::to_char(code, event.shift, event.caps_lock) {
            self.buffer.on_char(c);
        }

        let caps = event.shift ^ event.caps_lock;
        let reply = self
            .engine
            .process_key(engine_code, caps, event.ctrl, event.shift);

        if reply.is_replace() {
            if let Err(err) = self.injector.inject(&reply.text, reply.backspaces) {
                warn!("Replacement injection failed: {err}");
            }
            return true;
        }
        reply.key_consumed
    }

    fn on_toggle(&mut self) -> bool {
        let enabled = !self.enabled;
        self.set_enabled(enabled);
        // A manual toggle overrides any pending exclusion restore
        self.restore_enabled = None;
        if self.smart_switch {
            if let Some(app) = self.current_app.clone() {
                self.apps.remember_enabled(&app, enabled);
            }
        }
        self.clear_buffers();
        enabled
    }

    fn clear_buffers(&mut self) {
        self.buffer.clear();
        self.engine.clear_buffer();
    }

    fn clear_engine_buffer(&mut self) {
        self.engine.clear_buffer();
    }

    fn forward_key(&mut self, code: u16, action: Action) {
        if let Err(err) = self.injector.forward_key(code, action) {
            warn!("Key forwarding failed: {err}");
        }
    }
}
