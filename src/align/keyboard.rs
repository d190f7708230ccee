//! Keyboard command surface for manual alignment.
//!
//! Keys resolve to a fixed set of named actions. The modifier key selects
//! the coarse step; events raised while a text input has focus are ignored.

use crate::config::KeyboardConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,
    Char(char),
}

impl std::str::FromStr for Key {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" | "ArrowUp" => Ok(Key::ArrowUp),
            "down" | "ArrowDown" => Ok(Key::ArrowDown),
            "left" | "ArrowLeft" => Ok(Key::ArrowLeft),
            "right" | "ArrowRight" => Ok(Key::ArrowRight),
            _ => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(Key::Char(c)),
                    _ => Err(format!("unknown key: {s}")),
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: Key,
    /// Shift held: coarse step.
    pub modifier: bool,
    /// Focus is inside a text input.
    pub in_text_input: bool,
}

impl KeyEvent {
    pub fn new(key: Key) -> Self {
        Self {
            key,
            modifier: false,
            in_text_input: false,
        }
    }

    pub fn with_modifier(mut self) -> Self {
        self.modifier = true;
        self
    }

    pub fn in_text_input(mut self) -> Self {
        self.in_text_input = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KeyAction {
    MoveOffset { dx: f32, dy: f32 },
    AdjustScale(f32),
    Reset,
    AutoAlign,
    ToggleLandmarks,
    ToggleGrid,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyBindings {
    steps: KeyboardConfig,
}

impl KeyBindings {
    pub fn new(steps: KeyboardConfig) -> Self {
        Self { steps }
    }

    pub fn resolve(&self, event: &KeyEvent) -> Option<KeyAction> {
        if event.in_text_input {
            return None;
        }

        let (offset, scale) = if event.modifier {
            (self.steps.offset_step_coarse, self.steps.scale_step_coarse)
        } else {
            (self.steps.offset_step, self.steps.scale_step)
        };

        let action = match event.key {
            Key::ArrowUp => KeyAction::MoveOffset { dx: 0.0, dy: -offset },
            Key::ArrowDown => KeyAction::MoveOffset { dx: 0.0, dy: offset },
            Key::ArrowLeft => KeyAction::MoveOffset { dx: -offset, dy: 0.0 },
            Key::ArrowRight => KeyAction::MoveOffset { dx: offset, dy: 0.0 },
            // '=' is '+' without shift on most layouts
            Key::Char('+' | '=') => KeyAction::AdjustScale(scale),
            Key::Char('-' | '_') => KeyAction::AdjustScale(-scale),
            Key::Char('r' | 'R') => KeyAction::Reset,
            Key::Char('a' | 'A') => KeyAction::AutoAlign,
            Key::Char('l' | 'L') => KeyAction::ToggleLandmarks,
            Key::Char('g' | 'G') => KeyAction::ToggleGrid,
            Key::Char(_) => return None,
        };
        Some(action)
    }
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self::new(KeyboardConfig::default())
    }
}
