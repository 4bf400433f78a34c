use std::fmt;

/// Phase of a key event, decoded from the evdev value field.
///
/// The kernel reports 0 for release, 1 for press and 2 for auto-repeat.
/// The decision ladder branches on these constantly, so the raw value is
/// decoded once at the edge and carried as this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Release,
    Press,
    Repeat,
}

impl Action {
    /// Decode the evdev value field. Anything outside 0..=2 is not a key
    /// phase and decodes to None.
    pub fn from_value(value: i32) -> Option<Self> {
        match value {
            0 => Some(Action::Release),
            1 => Some(Action::Press),
            2 => Some(Action::Repeat),
            _ => None,
        }
    }

    /// The evdev value field, for re-emission on the virtual device.
    pub fn value(self) -> i32 {
        match self {
            Action::Release => 0,
            Action::Press => 1,
            Action::Repeat => 2,
        }
    }

    /// The key is going down, whether freshly pressed or auto-repeating.
    pub fn is_pressed(self) -> bool {
        matches!(self, Action::Press | Action::Repeat)
    }

    /// A fresh press only; auto-repeat does not count. Lock keys and the
    /// toggle chord trigger on this so a held key fires once.
    pub fn just_pressed(self) -> bool {
        matches!(self, Action::Press)
    }

    pub fn is_released(self) -> bool {
        matches!(self, Action::Release)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Release => "release",
            Action::Press => "press",
            Action::Repeat => "repeat",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decodes_evdev_values() {
        assert_eq!(Action::from_value(0), Some(Action::Release));
        assert_eq!(Action::from_value(1), Some(Action::Press));
        assert_eq!(Action::from_value(2), Some(Action::Repeat));
        assert_eq!(Action::from_value(3), None);
        assert_eq!(Action::from_value(-1), None);
    }

    #[test]
    fn test_value_round_trip() {
        for action in [Action::Release, Action::Press, Action::Repeat] {
            assert_eq!(Action::from_value(action.value()), Some(action));
        }
    }

    #[test]
    fn test_press_predicates() {
        assert!(Action::Press.is_pressed());
        assert!(Action::Press.just_pressed());
        assert!(!Action::Press.is_released());

        assert!(Action::Repeat.is_pressed());
        assert!(!Action::Repeat.just_pressed());

        assert!(!Action::Release.is_pressed());
        assert!(!Action::Release.just_pressed());
        assert!(Action::Release.is_released());
    }

    #[test]
    fn test_display_names() {
        assert_eq!(Action::Press.to_string(), "press");
        assert_eq!(Action::Release.to_string(), "release");
        assert_eq!(Action::Repeat.to_string(), "repeat");
    }
}
