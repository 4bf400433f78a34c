// Vime Shortcut Expansion
// Whole-word abbreviation tracking, independent of the per-character engine

use indexmap::IndexMap;

/// Maximum number of tracked characters; input beyond this is dropped.
const BUFFER_CAPACITY: usize = 50;

/// Abbreviation table mapping lowercase triggers to expansion text.
///
/// Triggers are unique and matched case-insensitively. Insertion order is
/// preserved so the table round-trips through the config file unchanged.
#[derive(Debug, Clone, Default)]
pub struct ShortcutTable {
    entries: IndexMap<String, String>,
}

impl ShortcutTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an entry. The trigger is stored lowercased.
    pub fn add(&mut self, trigger: &str, expansion: &str) {
        self.entries
            .insert(trigger.to_lowercase(), expansion.to_string());
    }

    /// Remove an entry; returns true if it existed.
    pub fn remove(&mut self, trigger: &str) -> bool {
        self.entries.shift_remove(&trigger.to_lowercase()).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Look up the expansion for already-lowercased typed text.
    pub fn lookup(&self, typed: &str) -> Option<&str> {
        self.entries.get(typed).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Tracks the alphanumeric characters of the word currently being typed.
///
/// The buffer mirrors what the focused text field most plausibly contains
/// for the current word: characters append, backspace pops, anything that
/// is not a letter or digit resets it.
#[derive(Debug, Default)]
pub struct ShortcutBuffer {
    typed: String,
}

impl ShortcutBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a typed character. Alphanumerics append (lowercased, dropped
    /// once the buffer is full); anything else clears the buffer.
    pub fn on_char(&mut self, c: char) {
        if c.is_ascii_alphanumeric() {
            if self.typed.len() < BUFFER_CAPACITY {
                self.typed.push(c.to_ascii_lowercase());
            }
        } else {
            self.typed.clear();
        }
    }

    /// Mirror the user deleting one character.
    pub fn on_backspace(&mut self) {
        self.typed.pop();
    }

    /// Reset tracking (word boundaries, control presses, app switches).
    pub fn clear(&mut self) {
        self.typed.clear();
    }

    pub fn len(&self) -> usize {
        self.typed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.typed.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.typed
    }

    /// Match the buffered word against the table.
    ///
    /// Called on Space. Returns the expansion and the number of characters
    /// it replaces; the buffer is cleared whether or not a match was found,
    /// since Space ends the word either way.
    pub fn check_expansion(&mut self, table: &ShortcutTable) -> Option<(String, usize)> {
        if self.typed.is_empty() || table.is_empty() {
            self.typed.clear();
            return None;
        }
        let matched = table.lookup(&self.typed).map(|expansion| {
            let len = self.typed.chars().count();
            (expansion.to_string(), len)
        });
        self.typed.clear();
        matched
    }
}
