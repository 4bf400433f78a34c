//! Keyboard state tracked from the grabbed event stream

mod modifiers;

pub use modifiers::{is_modifier_code, ModifierTracker, Modifiers};
