// Vime Core Library
// Keyboard interception and Vietnamese text transformation pipeline

pub mod action;
pub mod engine;
pub mod event;
pub mod hook;
pub mod inject;
pub mod key;
pub mod output;
pub mod processor;
pub mod settings;
pub mod shortcut;
pub mod state;
pub mod translate;
pub mod window;

pub use action::Action;
pub use engine::{
    Engine, EngineAction, EngineError, EngineOption, EngineReply, FfiEngine, InputMethod,
    PassthroughEngine,
};
pub use event::{
    is_virtual_device, matches_device_filter, DeviceGrab, DeviceInfo, EventError, EventResult,
    PolledEvent,
};
pub use hook::{EventHandler, KeyEvent, KeyboardHook, Verdict};
pub use inject::{
    ClipboardAccess, ClipboardTiming, Delays, InjectError, InjectionConfig, Injector, KeySink,
    Strategy, SystemClipboard,
};
pub use key::Key;
pub use output::{UInputError, VirtualKeyboard};
pub use processor::Processor;
pub use settings::{
    AppRegistry, AppState, AppStateFile, OutputEncoding, Settings, SettingsError, StrategyChoice,
};
pub use shortcut::{ShortcutBuffer, ShortcutTable};
pub use state::{ModifierTracker, Modifiers};
pub use window::{FocusedWindow, WaylandFocus, WindowContextProvider, WindowError};
