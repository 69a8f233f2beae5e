use serde::{Deserialize, Serialize};

/// GBA button bit positions in the KEYINPUT register (active low: pressed
/// buttons read as 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    A = 1 << 0,
    B = 1 << 1,
    Select = 1 << 2,
    Start = 1 << 3,
    Right = 1 << 4,
    Left = 1 << 5,
    Up = 1 << 6,
    Down = 1 << 7,
    R = 1 << 8,
    L = 1 << 9,
}

impl Button {
    /// Maps the host-facing key ids 0..=9 onto buttons. Out-of-range ids
    /// are dropped by the caller.
    #[must_use]
    pub const fn from_id(id: usize) -> Option<Self> {
        Some(match id {
            0 => Self::A,
            1 => Self::B,
            2 => Self::Select,
            3 => Self::Start,
            4 => Self::Right,
            5 => Self::Left,
            6 => Self::Up,
            7 => Self::Down,
            8 => Self::R,
            9 => Self::L,
            _ => return None,
        })
    }
}

/// Shadow of the host button state, served to reads of KEYINPUT.
#[derive(Serialize, Deserialize)]
pub struct Keypad {
    pub key_input: u16,
}

impl Default for Keypad {
    fn default() -> Self {
        Self::new()
    }
}

impl Keypad {
    /// All ten buttons released (bits 0-9 set).
    #[must_use]
    pub const fn new() -> Self {
        Self { key_input: 0x03FF }
    }

    /// Presses or releases one button. Active-low: pressing clears the bit.
    pub const fn set_button(&mut self, button: Button, pressed: bool) {
        if pressed {
            self.key_input &= !(button as u16);
        } else {
            self.key_input |= button as u16;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buttons_are_active_low() {
        let mut keypad = Keypad::new();
        assert_eq!(keypad.key_input, 0x03FF);

        keypad.set_button(Button::A, true);
        assert_eq!(keypad.key_input & 1, 0);

        keypad.set_button(Button::A, false);
        assert_eq!(keypad.key_input, 0x03FF);
    }

    #[test]
    fn id_mapping() {
        assert_eq!(Button::from_id(0), Some(Button::A));
        assert_eq!(Button::from_id(9), Some(Button::L));
        assert_eq!(Button::from_id(10), None);
    }
}
