// Vime Key Translation
// Maps evdev key codes into the engine-neutral keycode space and classifies
// keys for the processing pipeline. All functions are pure and table-driven.

use crate::key;

/// Sentinel for keys with no engine-side representation.
pub const INVALID_KEYCODE: u16 = 0xFFFF;

/// Translate an evdev key code to the engine keycode space.
///
/// Unmapped codes return [`INVALID_KEYCODE`]. The engine space is compact:
/// letter and digit codes are interleaved rather than contiguous, so this
/// stays an explicit table.
pub fn to_engine_keycode(code: u16) -> u16 {
    match code {
        30 => 0,   // A
        31 => 1,   // S
        32 => 2,   // D
        33 => 3,   // F
        35 => 4,   // H
        34 => 5,   // G
        44 => 6,   // Z
        45 => 7,   // X
        46 => 8,   // C
        47 => 9,   // V
        48 => 11,  // B
        16 => 12,  // Q
        17 => 13,  // W
        18 => 14,  // E
        19 => 15,  // R
        21 => 16,  // Y
        20 => 17,  // T
        2 => 18,   // 1
        3 => 19,   // 2
        4 => 20,   // 3
        5 => 21,   // 4
        7 => 22,   // 6
        6 => 23,   // 5
        13 => 24,  // EQUAL
        10 => 25,  // 9
        8 => 26,   // 7
        12 => 27,  // MINUS
        9 => 28,   // 8
        11 => 29,  // 0
        27 => 30,  // RIGHT_BRACE
        24 => 31,  // O
        22 => 32,  // U
        26 => 33,  // LEFT_BRACE
        23 => 34,  // I
        25 => 35,  // P
        28 => 36,  // ENTER
        38 => 37,  // L
        36 => 38,  // J
        40 => 39,  // APOSTROPHE
        37 => 40,  // K
        39 => 41,  // SEMICOLON
        43 => 42,  // BACKSLASH
        51 => 43,  // COMMA
        53 => 44,  // SLASH
        49 => 45,  // N
        50 => 46,  // M
        52 => 47,  // DOT
        15 => 48,  // TAB
        57 => 49,  // SPACE
        41 => 50,  // GRAVE
        14 => 51,  // BACKSPACE
        1 => 53,   // ESC
        96 => 76,  // KPENTER
        105 => 123, // LEFT
        106 => 124, // RIGHT
        108 => 125, // DOWN
        103 => 126, // UP
        _ => INVALID_KEYCODE,
    }
}

/// True for keys the pipeline inspects at all: letters, digits, the
/// punctuation the engine consumes, and the editing/boundary keys.
pub fn is_relevant(code: u16) -> bool {
    to_engine_keycode(code) != INVALID_KEYCODE
}

/// True for keys that end a word: space, tab, enter, arrows.
pub fn is_word_boundary(code: u16) -> bool {
    matches!(
        code,
        key::SPACE
            | key::TAB
            | key::ENTER
            | key::KPENTER
            | key::LEFT
            | key::RIGHT
            | key::UP
            | key::DOWN
    )
}

/// The character a key press produces, assuming a US layout.
///
/// Letters respond to shift XOR caps lock; digits and punctuation respond
/// to shift alone. Keys without a printable character return None.
pub fn to_char(code: u16, shift: bool, caps_lock: bool) -> Option<char> {
    if let Some(letter) = base_letter(code) {
        let upper = shift ^ caps_lock;
        return Some(if upper {
            letter.to_ascii_uppercase()
        } else {
            letter
        });
    }
    let (base, shifted) = match code {
        2 => ('1', '!'),
        3 => ('2', '@'),
        4 => ('3', '#'),
        5 => ('4', '$'),
        6 => ('5', '%'),
        7 => ('6', '^'),
        8 => ('7', '&'),
        9 => ('8', '*'),
        10 => ('9', '('),
        11 => ('0', ')'),
        12 => ('-', '_'),
        13 => ('=', '+'),
        26 => ('[', '{'),
        27 => (']', '}'),
        39 => (';', ':'),
        40 => ('\'', '"'),
        41 => ('`', '~'),
        43 => ('\\', '|'),
        51 => (',', '<'),
        52 => ('.', '>'),
        53 => ('/', '?'),
        57 => (' ', ' '),
        _ => return None,
    };
    Some(if shift { shifted } else { base })
}

fn base_letter(code: u16) -> Option<char> {
    let letter = match code {
        16 => 'q',
        17 => 'w',
        18 => 'e',
        19 => 'r',
        20 => 't',
        21 => 'y',
        22 => 'u',
        23 => 'i',
        24 => 'o',
        25 => 'p',
        30 => 'a',
        31 => 's',
        32 => 'd',
        33 => 'f',
        34 => 'g',
        35 => 'h',
        36 => 'j',
        37 => 'k',
        38 => 'l',
        44 => 'z',
        45 => 'x',
        46 => 'c',
        47 => 'v',
        48 => 'b',
        49 => 'n',
        50 => 'm',
        _ => return None,
    };
    Some(letter)
}
