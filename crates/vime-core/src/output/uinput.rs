// Vime Virtual Keyboard
// uinput device used for pass-through re-emission and text injection

use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{AttributeSet, EventType, InputEvent, Key as EvdevKey};
use log::{debug, trace};
use smallvec::SmallVec;
use thiserror::Error;

use crate::action::Action;
use crate::inject::{InjectError, KeySink};
use crate::key;
use crate::state::is_modifier_code;

/// Name prefix that marks a device as one of ours. Devices carrying it are
/// never grabbed, and the hook passes their events through untouched, which
/// is what keeps injected keystrokes from re-entering the pipeline.
pub const VIRT_DEVICE_PREFIX: &str = "Vime (virtual)";

const VIRT_DEVICE_NAME: &str = "Vime (virtual) keyboard";

#[derive(Error, Debug)]
pub enum UInputError {
    #[error("Failed to create uinput device: {0}")]
    DeviceCreation(String),

    #[error("Failed to emit key event: {0}")]
    Emit(String),
}

/// Virtual keyboard backed by /dev/uinput.
///
/// Every event the daemon delivers to the focused application goes through
/// here: grabbed hardware events re-emitted verbatim, and synthetic
/// backspaces, characters and compose sequences produced by injection.
/// The device keeps its own view of which keys the application currently
/// believes are held, so compose sequences can neutralize modifiers and
/// shutdown can release anything left pressed.
pub struct VirtualKeyboard {
    device: VirtualDevice,
    pressed_keys: SmallVec<[u16; 8]>,
    pressed_modifiers: SmallVec<[u16; 8]>,
}

impl VirtualKeyboard {
    pub fn new() -> Result<Self, UInputError> {
        let mut keys = AttributeSet::<EvdevKey>::new();
        for code in 0..0x100u16 {
            keys.insert(EvdevKey::new(code));
        }

        let device = VirtualDeviceBuilder::new()
            .map_err(|e| UInputError::DeviceCreation(e.to_string()))?
            .name(VIRT_DEVICE_NAME)
            .with_keys(&keys)
            .map_err(|e| UInputError::DeviceCreation(e.to_string()))?
            .build()
            .map_err(|e| UInputError::DeviceCreation(e.to_string()))?;

        debug!("Created virtual keyboard '{}'", VIRT_DEVICE_NAME);

        Ok(Self {
            device,
            pressed_keys: SmallVec::new(),
            pressed_modifiers: SmallVec::new(),
        })
    }

    /// Emit one key event followed by a synchronization report.
    pub fn emit_key(&mut self, code: u16, action: Action) -> Result<(), UInputError> {
        trace!("uinput emit: code={} action={}", code, action);
        let events = [
            InputEvent::new(EventType::KEY, code, action.value()),
            InputEvent::new(EventType::SYNCHRONIZATION, 0, 0),
        ];
        self.device
            .emit(&events)
            .map_err(|e| UInputError::Emit(e.to_string()))?;
        self.note(code, action);
        Ok(())
    }

    fn note(&mut self, code: u16, action: Action) {
        let held = if is_modifier_code(code) {
            &mut self.pressed_modifiers
        } else {
            &mut self.pressed_keys
        };
        match action {
            Action::Press => {
                if !held.contains(&code) {
                    held.push(code);
                }
            }
            Action::Release => {
                if let Some(pos) = held.iter().position(|&c| c == code) {
                    held.remove(pos);
                }
            }
            Action::Repeat => {}
        }
    }

    /// Press and release a key.
    pub fn tap(&mut self, code: u16) -> Result<(), UInputError> {
        self.emit_key(code, Action::Press)?;
        self.emit_key(code, Action::Release)
    }

    fn tap_shifted(&mut self, code: u16) -> Result<(), UInputError> {
        self.emit_key(key::LEFT_SHIFT, Action::Press)?;
        self.tap(code)?;
        self.emit_key(key::LEFT_SHIFT, Action::Release)
    }

    /// Type one character, via a direct key tap for US-layout ASCII and the
    /// compose sequence for everything else.
    pub fn send_char(&mut self, ch: char) -> Result<(), UInputError> {
        match ascii_key_and_shift(ch) {
            Some((code, true)) => self.tap_shifted(code),
            Some((code, false)) => self.tap(code),
            None => self.send_unicode(ch as u32),
        }
    }

    /// Type an arbitrary codepoint through the Ctrl+Shift+U hex compose
    /// sequence understood by GTK and the common Wayland input stacks.
    ///
    /// Modifiers the application currently sees as held would corrupt the
    /// hex digits, so they are released first and pressed again after.
    pub fn send_unicode(&mut self, codepoint: u32) -> Result<(), UInputError> {
        let held: SmallVec<[u16; 8]> = self.pressed_modifiers.clone();
        for &code in held.iter().rev() {
            self.emit_key(code, Action::Release)?;
        }

        self.emit_key(key::LEFT_CTRL, Action::Press)?;
        self.emit_key(key::LEFT_SHIFT, Action::Press)?;
        self.tap(key::KEY_U)?;
        self.emit_key(key::LEFT_SHIFT, Action::Release)?;
        self.emit_key(key::LEFT_CTRL, Action::Release)?;

        for digit in format!("{codepoint:x}").chars() {
            if let Some(value) = digit.to_digit(16) {
                self.tap(hex_digit_key(value))?;
            }
        }
        self.tap(key::ENTER)?;

        for &code in held.iter() {
            self.emit_key(code, Action::Press)?;
        }
        Ok(())
    }

    /// Press Ctrl+V against the focused application.
    pub fn paste_chord(&mut self) -> Result<(), UInputError> {
        self.emit_key(key::LEFT_CTRL, Action::Press)?;
        self.tap(key::KEY_V)?;
        self.emit_key(key::LEFT_CTRL, Action::Release)
    }

    /// Release the modifiers the application currently sees as held and
    /// return their codes so they can be pressed back afterwards.
    pub fn suspend_modifiers(&mut self) -> Result<SmallVec<[u16; 8]>, UInputError> {
        let held = self.pressed_modifiers.clone();
        for &code in held.iter().rev() {
            self.emit_key(code, Action::Release)?;
        }
        Ok(held)
    }

    /// Press back modifiers released by [`suspend_modifiers`].
    ///
    /// [`suspend_modifiers`]: VirtualKeyboard::suspend_modifiers
    pub fn resume_modifiers(&mut self, codes: &[u16]) -> Result<(), UInputError> {
        for &code in codes {
            self.emit_key(code, Action::Press)?;
        }
        Ok(())
    }

    /// Release every key and modifier still marked pressed, newest first.
    /// Called on shutdown so the session is not left with stuck keys.
    pub fn release_all(&mut self) -> Result<(), UInputError> {
        let keys: SmallVec<[u16; 8]> = self.pressed_keys.clone();
        for &code in keys.iter().rev() {
            self.emit_key(code, Action::Release)?;
        }
        let mods: SmallVec<[u16; 8]> = self.pressed_modifiers.clone();
        for &code in mods.iter().rev() {
            self.emit_key(code, Action::Release)?;
        }
        Ok(())
    }
}

impl KeySink for VirtualKeyboard {
    fn forward_key(&mut self, code: u16, action: Action) -> Result<(), InjectError> {
        Ok(self.emit_key(code, action)?)
    }

    fn backspace(&mut self) -> Result<(), InjectError> {
        Ok(self.tap(key::BACKSPACE)?)
    }

    fn send_char(&mut self, ch: char) -> Result<(), InjectError> {
        Ok(VirtualKeyboard::send_char(self, ch)?)
    }

    fn paste_chord(&mut self) -> Result<(), InjectError> {
        Ok(VirtualKeyboard::paste_chord(self)?)
    }

    fn suspend_modifiers(&mut self) -> Result<Vec<u16>, InjectError> {
        Ok(VirtualKeyboard::suspend_modifiers(self)?.to_vec())
    }

    fn resume_modifiers(&mut self, codes: &[u16]) -> Result<(), InjectError> {
        Ok(VirtualKeyboard::resume_modifiers(self, codes)?)
    }

    fn release_all(&mut self) -> Result<(), InjectError> {
        Ok(VirtualKeyboard::release_all(self)?)
    }
}

/// Key code and shift flag that produce the given character on a US layout,
/// or None for characters that need the compose sequence.
pub fn ascii_key_and_shift(ch: char) -> Option<(u16, bool)> {
    let pair = match ch {
        'a' => (30, false),
        'b' => (48, false),
        'c' => (46, false),
        'd' => (32, false),
        'e' => (18, false),
        'f' => (33, false),
        'g' => (34, false),
        'h' => (35, false),
        'i' => (23, false),
        'j' => (36, false),
        'k' => (37, false),
        'l' => (38, false),
        'm' => (50, false),
        'n' => (49, false),
        'o' => (24, false),
        'p' => (25, false),
        'q' => (16, false),
        'r' => (19, false),
        's' => (31, false),
        't' => (20, false),
        'u' => (22, false),
        'v' => (47, false),
        'w' => (17, false),
        'x' => (45, false),
        'y' => (21, false),
        'z' => (44, false),
        'A' => (30, true),
        'B' => (48, true),
        'C' => (46, true),
        'D' => (32, true),
        'E' => (18, true),
        'F' => (33, true),
        'G' => (34, true),
        'H' => (35, true),
        'I' => (23, true),
        'J' => (36, true),
        'K' => (37, true),
        'L' => (38, true),
        'M' => (50, true),
        'N' => (49, true),
        'O' => (24, true),
        'P' => (25, true),
        'Q' => (16, true),
        'R' => (19, true),
        'S' => (31, true),
        'T' => (20, true),
        'U' => (22, true),
        'V' => (47, true),
        'W' => (17, true),
        'X' => (45, true),
        'Y' => (21, true),
        'Z' => (44, true),
        '1' => (2, false),
        '2' => (3, false),
        '3' => (4, false),
        '4' => (5, false),
        '5' => (6, false),
        '6' => (7, false),
        '7' => (8, false),
        '8' => (9, false),
        '9' => (10, false),
        '0' => (11, false),
        '!' => (2, true),
        '@' => (3, true),
        '#' => (4, true),
        '$' => (5, true),
        '%' => (6, true),
        '^' => (7, true),
        '&' => (8, true),
        '*' => (9, true),
        '(' => (10, true),
        ')' => (11, true),
        '-' => (12, false),
        '_' => (12, true),
        '=' => (13, false),
        '+' => (13, true),
        '[' => (26, false),
        '{' => (26, true),
        ']' => (27, false),
        '}' => (27, true),
        ';' => (39, false),
        ':' => (39, true),
        '\'' => (40, false),
        '"' => (40, true),
        '`' => (41, false),
        '~' => (41, true),
        '\\' => (43, false),
        '|' => (43, true),
        ',' => (51, false),
        '<' => (51, true),
        '.' => (52, false),
        '>' => (52, true),
        '/' => (53, false),
        '?' => (53, true),
        ' ' => (key::SPACE, false),
        '\n' => (key::ENTER, false),
        '\t' => (key::TAB, false),
        _ => return None,
    };
    Some(pair)
}

/// Key for one hex digit of a compose sequence (0-15).
fn hex_digit_key(value: u32) -> u16 {
    const KEYS: [u16; 16] = [11, 2, 3, 4, 5, 6, 7, 8, 9, 10, 30, 48, 46, 32, 18, 33];
    KEYS[(value & 0xf) as usize]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_letters() {
        assert_eq!(ascii_key_and_shift('a'), Some((30, false)));
        assert_eq!(ascii_key_and_shift('A'), Some((30, true)));
        assert_eq!(ascii_key_and_shift('z'), Some((44, false)));
        assert_eq!(ascii_key_and_shift('Q'), Some((16, true)));
    }

    #[test]
    fn test_ascii_digits_and_symbols() {
        assert_eq!(ascii_key_and_shift('1'), Some((2, false)));
        assert_eq!(ascii_key_and_shift('!'), Some((2, true)));
        assert_eq!(ascii_key_and_shift('0'), Some((11, false)));
        assert_eq!(ascii_key_and_shift(' '), Some((key::SPACE, false)));
        assert_eq!(ascii_key_and_shift('\n'), Some((key::ENTER, false)));
        assert_eq!(ascii_key_and_shift('?'), Some((53, true)));
    }

    #[test]
    fn test_non_ascii_needs_compose() {
        assert_eq!(ascii_key_and_shift('ư'), None);
        assert_eq!(ascii_key_and_shift('ệ'), None);
        assert_eq!(ascii_key_and_shift('é'), None);
    }

    #[test]
    fn test_hex_digit_keys() {
        assert_eq!(hex_digit_key(0), 11);
        assert_eq!(hex_digit_key(1), 2);
        assert_eq!(hex_digit_key(9), 10);
        assert_eq!(hex_digit_key(0xa), 30);
        assert_eq!(hex_digit_key(0xf), 33);
    }

    #[test]
    fn test_device_name_carries_marker_prefix() {
        assert!(VIRT_DEVICE_NAME.starts_with(VIRT_DEVICE_PREFIX));
    }

    #[test]
    fn test_virtual_device_creation() {
        // Needs /dev/uinput access; skip quietly where unavailable.
        match VirtualKeyboard::new() {
            Ok(mut vk) => {
                vk.emit_key(30, Action::Press).unwrap();
                vk.emit_key(30, Action::Release).unwrap();
                assert!(vk.pressed_keys.is_empty());
            }
            Err(e) => {
                eprintln!("Skipping uinput test (no device access): {}", e);
            }
        }
    }
}
