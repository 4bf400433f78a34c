// Vime Key Type
// Key codes from Linux input-event-codes.h

use std::fmt;
use std::sync::OnceLock;

/// Represents a single keyboard key code.
///
/// Newtype wrapper around u16 for type safety. The numeric values match
/// Linux input-event-codes.h definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Key(pub u16);

impl Key {
    /// Get the raw numeric code value
    pub fn code(self) -> u16 {
        self.0
    }

    /// Get the display name of this key
    pub fn name(self) -> &'static str {
        key_name(self.0)
    }
}

impl From<u16> for Key {
    fn from(code: u16) -> Self {
        Key(code)
    }
}

impl From<Key> for u16 {
    fn from(key: Key) -> Self {
        key.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// Codes the pipeline refers to by name. Everything else goes through the
// translation tables by raw value.
pub const ESC: u16 = 1;
pub const BACKSPACE: u16 = 14;
pub const TAB: u16 = 15;
pub const KEY_U: u16 = 22;
pub const ENTER: u16 = 28;
pub const LEFT_CTRL: u16 = 29;
pub const LEFT_SHIFT: u16 = 42;
pub const KEY_V: u16 = 47;
pub const RIGHT_SHIFT: u16 = 54;
pub const LEFT_ALT: u16 = 56;
pub const SPACE: u16 = 57;
pub const CAPSLOCK: u16 = 58;
pub const KPENTER: u16 = 96;
pub const RIGHT_CTRL: u16 = 97;
pub const RIGHT_ALT: u16 = 100;
pub const UP: u16 = 103;
pub const LEFT: u16 = 105;
pub const RIGHT: u16 = 106;
pub const DOWN: u16 = 108;
pub const LEFT_META: u16 = 125;
pub const RIGHT_META: u16 = 126;

/// Display name for a key code
pub fn key_name(code: u16) -> &'static str {
    static KEY_NAMES: OnceLock<Vec<&'static str>> = OnceLock::new();
    KEY_NAMES
        .get_or_init(|| {
            let mut names = vec!["UNKNOWN"; 0x130];
            names[0] = "RESERVED";
            names[1] = "ESC";
            names[2] = "KEY_1";
            names[3] = "KEY_2";
            names[4] = "KEY_3";
            names[5] = "KEY_4";
            names[6] = "KEY_5";
            names[7] = "KEY_6";
            names[8] = "KEY_7";
            names[9] = "KEY_8";
            names[10] = "KEY_9";
            names[11] = "KEY_0";
            names[12] = "MINUS";
            names[13] = "EQUAL";
            names[14] = "BACKSPACE";
            names[15] = "TAB";
            names[16] = "Q";
            names[17] = "W";
            names[18] = "E";
            names[19] = "R";
            names[20] = "T";
            names[21] = "Y";
            names[22] = "U";
            names[23] = "I";
            names[24] = "O";
            names[25] = "P";
            names[26] = "LEFT_BRACE";
            names[27] = "RIGHT_BRACE";
            names[28] = "ENTER";
            names[29] = "LEFT_CTRL";
            names[30] = "A";
            names[31] = "S";
            names[32] = "D";
            names[33] = "F";
            names[34] = "G";
            names[35] = "H";
            names[36] = "J";
            names[37] = "K";
            names[38] = "L";
            names[39] = "SEMICOLON";
            names[40] = "APOSTROPHE";
            names[41] = "GRAVE";
            names[42] = "LEFT_SHIFT";
            names[43] = "BACKSLASH";
            names[44] = "Z";
            names[45] = "X";
            names[46] = "C";
            names[47] = "V";
            names[48] = "B";
            names[49] = "N";
            names[50] = "M";
            names[51] = "COMMA";
            names[52] = "DOT";
            names[53] = "SLASH";
            names[54] = "RIGHT_SHIFT";
            names[55] = "KPASTERISK";
            names[56] = "LEFT_ALT";
            names[57] = "SPACE";
            names[58] = "CAPSLOCK";
            names[59] = "F1";
            names[60] = "F2";
            names[61] = "F3";
            names[62] = "F4";
            names[63] = "F5";
            names[64] = "F6";
            names[65] = "F7";
            names[66] = "F8";
            names[67] = "F9";
            names[68] = "F10";
            names[69] = "NUMLOCK";
            names[70] = "SCROLLLOCK";
            names[87] = "F11";
            names[88] = "F12";
            names[96] = "KPENTER";
            names[97] = "RIGHT_CTRL";
            names[98] = "KPSLASH";
            names[99] = "SYSRQ";
            names[100] = "RIGHT_ALT";
            names[102] = "HOME";
            names[103] = "UP";
            names[104] = "PAGE_UP";
            names[105] = "LEFT";
            names[106] = "RIGHT";
            names[107] = "END";
            names[108] = "DOWN";
            names[109] = "PAGE_DOWN";
            names[110] = "INSERT";
            names[111] = "DELETE";
            names[119] = "PAUSE";
            names[125] = "LEFT_META";
            names[126] = "RIGHT_META";
            names[127] = "COMPOSE";
            names
        })
        .get(code as usize)
        .copied()
        .unwrap_or("UNKNOWN")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_uses_the_name_table() {
        assert_eq!(Key::from(30).to_string(), "A");
        assert_eq!(Key::from(ENTER).to_string(), "ENTER");
        assert_eq!(Key::from(SPACE).to_string(), "SPACE");
    }

    #[test]
    fn test_unknown_codes_have_a_name() {
        assert_eq!(key_name(0x2ff), "UNKNOWN");
        assert_eq!(key_name(84), "UNKNOWN");
    }

    #[test]
    fn test_named_constants_line_up() {
        assert_eq!(key_name(BACKSPACE), "BACKSPACE");
        assert_eq!(key_name(SPACE), "SPACE");
        assert_eq!(key_name(CAPSLOCK), "CAPSLOCK");
        assert_eq!(key_name(KEY_V), "V");
        assert_eq!(key_name(KEY_U), "U");
    }

    #[test]
    fn test_code_round_trips() {
        let key = Key::from(47u16);
        assert_eq!(key.code(), 47);
        assert_eq!(u16::from(key), 47);
    }
}
