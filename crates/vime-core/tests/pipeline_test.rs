// Vime Pipeline Tests
//
// Drives the complete interception pipeline without hardware:
// scripted engine + recording sink + memory clipboard + fake focus,
// wired through KeyboardHook and Processor exactly as the daemon does.
//
// Run with: cargo test --test pipeline_test

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;

use evdev::{EventType, InputEvent};
use parking_lot::Mutex;

use vime_core::key;
use vime_core::{
    Action, ClipboardAccess, ClipboardTiming, Delays, Engine, EngineAction, EngineOption,
    EngineReply, FocusedWindow, InjectError, InjectionConfig, Injector, InputMethod, KeySink,
    KeyboardHook, PolledEvent, Processor, Settings, Strategy, Verdict, WindowContextProvider,
    WindowError,
};

const KEY_A: u16 = 30;
const KEY_C: u16 = 46;
const KEY_E: u16 = 18;
const KEY_N: u16 = 49;
const KEY_V: u16 = 47;
const KEY_X: u16 = 45;

#[derive(Default)]
struct EngineLog {
    keys: Vec<(u16, bool, bool, bool)>,
    clear_buffer: usize,
    clear_all: usize,
    enabled: Vec<bool>,
}

struct ScriptedEngine {
    log: Rc<RefCell<EngineLog>>,
    replies: VecDeque<EngineReply>,
}

impl Engine for ScriptedEngine {
    fn process_key(&mut self, keycode: u16, caps: bool, ctrl: bool, shift: bool) -> EngineReply {
        self.log.borrow_mut().keys.push((keycode, caps, ctrl, shift));
        self.replies.pop_front().unwrap_or_default()
    }

    fn clear_buffer(&mut self) {
        self.log.borrow_mut().clear_buffer += 1;
    }

    fn clear_all(&mut self) {
        self.log.borrow_mut().clear_all += 1;
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.log.borrow_mut().enabled.push(enabled);
    }

    fn set_method(&mut self, _method: InputMethod) {}
    fn set_option(&mut self, _option: EngineOption, _enabled: bool) {}
    fn add_shortcut(&mut self, _trigger: &str, _replacement: &str) {}
    fn remove_shortcut(&mut self, _trigger: &str) {}
    fn clear_shortcuts(&mut self) {}
}

#[derive(Debug, Clone, PartialEq)]
enum SinkOp {
    Forward(u16, Action),
    Backspace,
    Char(char),
    Paste,
}

struct RecordingSink {
    ops: Rc<RefCell<Vec<SinkOp>>>,
}

impl KeySink for RecordingSink {
    fn forward_key(&mut self, code: u16, action: Action) -> Result<(), InjectError> {
        self.ops.borrow_mut().push(SinkOp::Forward(code, action));
        Ok(())
    }

    fn backspace(&mut self) -> Result<(), InjectError> {
        self.ops.borrow_mut().push(SinkOp::Backspace);
        Ok(())
    }

    fn send_char(&mut self, ch: char) -> Result<(), InjectError> {
        self.ops.borrow_mut().push(SinkOp::Char(ch));
        Ok(())
    }

    fn paste_chord(&mut self) -> Result<(), InjectError> {
        self.ops.borrow_mut().push(SinkOp::Paste);
        Ok(())
    }

    fn suspend_modifiers(&mut self) -> Result<Vec<u16>, InjectError> {
        Ok(Vec::new())
    }

    fn resume_modifiers(&mut self, _codes: &[u16]) -> Result<(), InjectError> {
        Ok(())
    }

    fn release_all(&mut self) -> Result<(), InjectError> {
        Ok(())
    }
}

#[derive(Default)]
struct ClipboardState {
    content: Option<String>,
    writes: Vec<String>,
}

struct MemoryClipboard {
    state: Rc<RefCell<ClipboardState>>,
}

impl ClipboardAccess for MemoryClipboard {
    fn get_text(&mut self) -> Result<Option<String>, InjectError> {
        Ok(self.state.borrow().content.clone())
    }

    fn set_text(&mut self, text: &str) -> Result<(), InjectError> {
        let mut state = self.state.borrow_mut();
        state.content = Some(text.to_string());
        state.writes.push(text.to_string());
        Ok(())
    }
}

struct FakeFocus {
    focus: Arc<Mutex<FocusedWindow>>,
}

impl WindowContextProvider for FakeFocus {
    fn connect(&mut self) -> Result<(), WindowError> {
        Ok(())
    }

    fn disconnect(&mut self) {}

    fn is_connected(&self) -> bool {
        true
    }

    fn focused_window(&self) -> Result<FocusedWindow, WindowError> {
        Ok(self.focus.lock().clone())
    }
}

struct Pipeline {
    hook: KeyboardHook<Processor>,
    engine: Rc<RefCell<EngineLog>>,
    sink: Rc<RefCell<Vec<SinkOp>>>,
    clipboard: Rc<RefCell<ClipboardState>>,
    focus: Arc<Mutex<FocusedWindow>>,
}

impl Pipeline {
    fn press(&mut self, code: u16) -> Verdict {
        self.hook.process(&key_event(code, 1))
    }

    fn release(&mut self, code: u16) -> Verdict {
        self.hook.process(&key_event(code, 0))
    }

    fn tap(&mut self, code: u16) -> Verdict {
        let verdict = self.press(code);
        self.release(code);
        verdict
    }

    fn focus_app(&self, app: &str) {
        *self.focus.lock() =
            FocusedWindow::with_details(Some(app.to_string()), Some("window".to_string()));
    }

    fn typed(&self) -> String {
        self.sink
            .borrow()
            .iter()
            .filter_map(|op| match op {
                SinkOp::Char(ch) => Some(*ch),
                _ => None,
            })
            .collect()
    }

    fn count(&self, op: &SinkOp) -> usize {
        self.sink.borrow().iter().filter(|o| *o == op).count()
    }
}

fn test_config(strategy: Strategy, auto_clipboard: bool) -> InjectionConfig {
    InjectionConfig {
        strategy,
        auto_clipboard,
        direct_delays: Delays::NONE,
        paced_delays: Delays::NONE,
        clipboard_timing: ClipboardTiming {
            backspace_ms: 0,
            gap_ms: 0,
            pre_paste_ms: 0,
            settle_ms: 0,
        },
        ..InjectionConfig::default()
    }
}

fn pipeline_with_config(
    settings: &Settings,
    replies: Vec<EngineReply>,
    config: InjectionConfig,
) -> Pipeline {
    let engine_log = Rc::new(RefCell::new(EngineLog::default()));
    let engine = ScriptedEngine {
        log: Rc::clone(&engine_log),
        replies: replies.into(),
    };

    let ops = Rc::new(RefCell::new(Vec::new()));
    let sink = RecordingSink {
        ops: Rc::clone(&ops),
    };

    let clip_state = Rc::new(RefCell::new(ClipboardState::default()));
    let clipboard = MemoryClipboard {
        state: Rc::clone(&clip_state),
    };

    let injector = Injector::new(Box::new(sink), Box::new(clipboard), config);

    let focus = Arc::new(Mutex::new(FocusedWindow::default()));
    let window = FakeFocus {
        focus: Arc::clone(&focus),
    };

    let processor = Processor::new(Box::new(engine), injector, Box::new(window), settings);
    Pipeline {
        hook: KeyboardHook::new(processor, settings.general.toggle_hotkey),
        engine: engine_log,
        sink: ops,
        clipboard: clip_state,
        focus,
    }
}

fn pipeline(settings: &Settings, replies: Vec<EngineReply>) -> Pipeline {
    pipeline_with_config(settings, replies, test_config(Strategy::Direct, false))
}

fn key_event(code: u16, value: i32) -> PolledEvent {
    PolledEvent {
        event: InputEvent::new(EventType::KEY, code, value),
        device_name: "AT Translated Set 2 keyboard".to_string(),
    }
}

fn replace(backspaces: u8, text: &str) -> EngineReply {
    EngineReply {
        action: EngineAction::Replace,
        backspaces,
        text: text.to_string(),
        key_consumed: true,
    }
}

#[test]
fn test_replacement_suppresses_the_original_key() {
    let replies = vec![EngineReply::none(), replace(1, "ê")];
    let mut p = pipeline(&Settings::default(), replies);

    assert_eq!(p.tap(KEY_E), Verdict::PassThrough);
    assert_eq!(p.press(KEY_E), Verdict::Consumed);
    assert_eq!(p.release(KEY_E), Verdict::PassThrough);

    let ops = p.sink.borrow();
    assert_eq!(
        *ops,
        vec![
            SinkOp::Forward(KEY_E, Action::Press),
            SinkOp::Forward(KEY_E, Action::Release),
            SinkOp::Backspace,
            SinkOp::Char('ê'),
            SinkOp::Forward(KEY_E, Action::Release),
        ]
    );
}

#[test]
fn test_abbreviation_expands_end_to_end() {
    let mut p = pipeline(&Settings::default(), Vec::new());

    assert_eq!(p.tap(KEY_V), Verdict::PassThrough);
    assert_eq!(p.tap(KEY_N), Verdict::PassThrough);
    assert_eq!(p.press(key::SPACE), Verdict::Consumed);
    assert_eq!(p.release(key::SPACE), Verdict::PassThrough);

    assert_eq!(p.count(&SinkOp::Backspace), 2);
    assert_eq!(p.typed(), "Việt Nam ");
    // Space itself never reached the engine
    assert_eq!(p.engine.borrow().keys.len(), 2);
}

#[test]
fn test_unmatched_word_lets_space_through() {
    let mut p = pipeline(&Settings::default(), Vec::new());

    p.tap(KEY_X);
    p.tap(KEY_E);
    assert_eq!(p.press(key::SPACE), Verdict::PassThrough);

    assert_eq!(p.engine.borrow().keys.len(), 3);
    assert_eq!(p.count(&SinkOp::Backspace), 0);
    assert_eq!(p.typed(), "");
}

#[test]
fn test_application_chords_pass_untouched() {
    let mut p = pipeline(&Settings::default(), vec![replace(1, "never")]);

    assert_eq!(p.press(key::LEFT_CTRL), Verdict::PassThrough);
    let clears = p.engine.borrow().clear_buffer;
    assert_eq!(p.press(KEY_C), Verdict::PassThrough);
    p.release(KEY_C);
    p.release(key::LEFT_CTRL);

    // The chord invalidated the composition but was never transformed
    assert!(p.engine.borrow().keys.is_empty());
    assert_eq!(p.engine.borrow().clear_buffer, clears + 1);
    assert_eq!(p.typed(), "");
}

#[test]
fn test_toggle_hotkey_cycles_processing() {
    let mut p = pipeline(&Settings::default(), Vec::new());

    p.press(key::LEFT_CTRL);
    assert_eq!(p.press(key::SPACE), Verdict::Consumed);
    // A held Space repeat does not re-toggle
    assert_eq!(p.hook.process(&key_event(key::SPACE, 2)), Verdict::Consumed);
    p.release(key::SPACE);
    p.release(key::LEFT_CTRL);

    assert!(!p.hook.handler().is_enabled());
    assert_eq!(p.engine.borrow().enabled, vec![true, false]);

    p.tap(KEY_A);
    assert!(p.engine.borrow().keys.is_empty());

    p.press(key::LEFT_CTRL);
    p.press(key::SPACE);
    p.release(key::SPACE);
    p.release(key::LEFT_CTRL);
    assert!(p.hook.handler().is_enabled());

    p.tap(KEY_A);
    assert_eq!(p.engine.borrow().keys.len(), 1);
}

#[test]
fn test_word_boundary_resets_composition() {
    let mut p = pipeline(&Settings::default(), Vec::new());

    p.tap(KEY_V);
    assert_eq!(p.press(key::ENTER), Verdict::PassThrough);
    p.release(key::ENTER);
    // Enter is handled by the hook, not the engine
    assert_eq!(p.engine.borrow().keys.len(), 1);

    p.tap(KEY_N);
    p.press(key::SPACE);
    // "v" was dropped at Enter, so "n" alone matches nothing
    assert_eq!(p.count(&SinkOp::Backspace), 0);
}

#[test]
fn test_excluded_app_passes_everything_through() {
    let mut settings = Settings::default();
    settings.general.excluded_apps = vec!["terminal".to_string()];
    let mut p = pipeline(&settings, vec![replace(1, "never")]);

    p.focus_app("Terminal");
    assert_eq!(p.tap(KEY_V), Verdict::PassThrough);
    assert!(p.engine.borrow().keys.is_empty());
    assert_eq!(p.typed(), "");
}

#[test]
fn test_focus_change_resets_composition() {
    let mut p = pipeline(&Settings::default(), Vec::new());

    p.focus_app("editor");
    p.tap(KEY_V);
    let cleared = p.engine.borrow().clear_all;

    p.focus_app("browser");
    p.tap(KEY_N);
    assert_eq!(p.engine.borrow().clear_all, cleared + 1);

    p.press(key::SPACE);
    assert_eq!(p.count(&SinkOp::Backspace), 0);
}

#[test]
fn test_clipboard_strategy_round_trips_the_clipboard() {
    let config = test_config(Strategy::Clipboard, false);
    let mut p = pipeline_with_config(&Settings::default(), vec![replace(2, "trời")], config);
    p.clipboard.borrow_mut().content = Some("X".to_string());

    assert_eq!(p.press(KEY_E), Verdict::Consumed);

    assert_eq!(p.count(&SinkOp::Backspace), 2);
    assert_eq!(p.count(&SinkOp::Paste), 1);
    let clip = p.clipboard.borrow();
    assert_eq!(clip.writes, vec!["trời".to_string(), "X".to_string()]);
    assert_eq!(clip.content.as_deref(), Some("X"));
}

#[test]
fn test_auto_mode_escalates_large_replacements() {
    let replies = vec![replace(5, "nước"), replace(1, "ă")];
    let config = test_config(Strategy::Direct, true);
    let mut p = pipeline_with_config(&Settings::default(), replies, config);

    // Five deletions exceed the threshold: pasted, not typed
    p.press(KEY_N);
    assert_eq!(p.count(&SinkOp::Paste), 1);
    assert_eq!(p.typed(), "");

    // A small edit stays on the key-event path
    p.press(KEY_A);
    assert_eq!(p.count(&SinkOp::Paste), 1);
    assert_eq!(p.typed(), "ă");
}

#[test]
fn test_own_virtual_device_events_are_ignored() {
    let mut p = pipeline(&Settings::default(), vec![replace(1, "never")]);

    let event = PolledEvent {
        event: InputEvent::new(EventType::KEY, KEY_A, 1),
        device_name: "Vime (virtual) keyboard".to_string(),
    };
    assert_eq!(p.hook.process(&event), Verdict::PassThrough);
    assert!(p.engine.borrow().keys.is_empty());
}

#[test]
fn test_caps_lock_reaches_the_engine_as_case_flag() {
    let mut p = pipeline(&Settings::default(), Vec::new());

    p.tap(key::CAPSLOCK);
    p.tap(KEY_A);
    p.press(key::LEFT_SHIFT);
    p.tap(KEY_A);

    let log = p.engine.borrow();
    // caps is shift XOR caps-lock
    assert_eq!(log.keys[0], (0, true, false, false));
    assert_eq!(log.keys[1], (0, false, false, true));
}

#[test]
fn test_releases_never_reach_the_engine() {
    let mut p = pipeline(&Settings::default(), Vec::new());

    assert_eq!(p.release(KEY_A), Verdict::PassThrough);
    assert!(p.engine.borrow().keys.is_empty());
    assert_eq!(
        *p.sink.borrow(),
        vec![SinkOp::Forward(KEY_A, Action::Release)]
    );
}
