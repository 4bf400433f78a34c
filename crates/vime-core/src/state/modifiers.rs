// Vime Modifier Tracking
// Modifier and caps-lock state derived from the grabbed event stream

use smallvec::SmallVec;
use std::collections::HashSet;

use crate::action::Action;
use crate::key;

/// Modifier key codes, both sides of each.
const MODIFIER_KEY_CODES: &[u16] = &[
    key::LEFT_CTRL,
    key::RIGHT_CTRL,
    key::LEFT_ALT,
    key::RIGHT_ALT,
    key::LEFT_SHIFT,
    key::RIGHT_SHIFT,
    key::LEFT_META,
    key::RIGHT_META,
];

/// Check if a key code is a modifier (O(1) over a tiny static array)
#[inline]
pub const fn is_modifier_code(code: u16) -> bool {
    let mut i = 0;
    while i < MODIFIER_KEY_CODES.len() {
        if MODIFIER_KEY_CODES[i] == code {
            return true;
        }
        i += 1;
    }
    false
}

/// Snapshot of the modifier flags at one keystroke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub caps_lock: bool,
}

/// Tracks which modifier keys are physically held and whether caps lock is
/// engaged, fed from every event the grab delivers.
///
/// A grabbed device gives no portable way to read the initial lock state,
/// so caps lock is assumed off until its first observed press; a wrong
/// guess corrects itself on the next toggle.
#[derive(Debug, Default)]
pub struct ModifierTracker {
    pressed: HashSet<u16>,
    caps_lock: bool,
}

impl ModifierTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one key event. Returns true if the event was a modifier or
    /// caps-lock key (state-only, never text).
    pub fn handle(&mut self, code: u16, action: Action) -> bool {
        if code == key::CAPSLOCK {
            if action.just_pressed() {
                self.caps_lock = !self.caps_lock;
            }
            return true;
        }
        if !is_modifier_code(code) {
            return false;
        }
        if action.is_pressed() {
            self.pressed.insert(code);
        } else {
            self.pressed.remove(&code);
        }
        true
    }

    pub fn shift(&self) -> bool {
        self.pressed.contains(&key::LEFT_SHIFT) || self.pressed.contains(&key::RIGHT_SHIFT)
    }

    pub fn ctrl(&self) -> bool {
        self.pressed.contains(&key::LEFT_CTRL) || self.pressed.contains(&key::RIGHT_CTRL)
    }

    pub fn alt(&self) -> bool {
        self.pressed.contains(&key::LEFT_ALT) || self.pressed.contains(&key::RIGHT_ALT)
    }

    pub fn meta(&self) -> bool {
        self.pressed.contains(&key::LEFT_META) || self.pressed.contains(&key::RIGHT_META)
    }

    pub fn caps_lock(&self) -> bool {
        self.caps_lock
    }

    /// The flag snapshot attached to each processed keystroke.
    pub fn snapshot(&self) -> Modifiers {
        Modifiers {
            shift: self.shift(),
            ctrl: self.ctrl(),
            alt: self.alt(),
            caps_lock: self.caps_lock,
        }
    }

    /// Codes of the modifier keys currently held, sorted. The injector
    /// releases these around compose sequences and presses them back after.
    pub fn held_codes(&self) -> SmallVec<[u16; 4]> {
        let mut codes: SmallVec<[u16; 4]> = self.pressed.iter().copied().collect();
        codes.sort();
        codes
    }

    /// Forget held modifiers (devices regrabbed, stream restarted).
    /// Caps-lock state is a toggle, not a held key, and survives.
    pub fn reset_held(&mut self) {
        self.pressed.clear();
    }
}
