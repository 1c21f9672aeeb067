//! Input handling module
//!
//! Maps keyboard keys to host actions.

use winit::keyboard::{Key, NamedKey};

use crate::frame::SeparationStep;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostAction {
    IncreaseSeparation,
    DecreaseSeparation,
    Recenter,
    Quit,
}

impl HostAction {
    pub fn from_key(key: &Key) -> Option<Self> {
        match key {
            Key::Named(NamedKey::Escape) => Some(HostAction::Quit),
            Key::Character(c) => match c.as_str() {
                "e" | "E" => Some(HostAction::IncreaseSeparation),
                "w" | "W" => Some(HostAction::DecreaseSeparation),
                "r" | "R" => Some(HostAction::Recenter),
                "q" | "Q" => Some(HostAction::Quit),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn separation_step(self) -> Option<SeparationStep> {
        match self {
            HostAction::IncreaseSeparation => Some(SeparationStep::Increase),
            HostAction::DecreaseSeparation => Some(SeparationStep::Decrease),
            _ => None,
        }
    }
}
