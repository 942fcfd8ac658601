use std::fmt;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

// Linux evdev keycodes (see linux/input-event-codes.h)
pub const KEY_UP: u32 = 103;
pub const KEY_LEFT: u32 = 105;
pub const KEY_RIGHT: u32 = 106;
pub const KEY_DOWN: u32 = 108;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Left,
        Direction::Right,
        Direction::Up,
        Direction::Down,
    ];

    pub fn evdev_code(self) -> u32 {
        match self {
            Direction::Left => KEY_LEFT,
            Direction::Right => KEY_RIGHT,
            Direction::Up => KEY_UP,
            Direction::Down => KEY_DOWN,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Direction::Left => "LEFT",
            Direction::Right => "RIGHT",
            Direction::Up => "UP",
            Direction::Down => "DOWN",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyState {
    Pressed,
    Released,
}

/// One band of the inter-action delay distribution.
///
/// Samples are drawn from `[min_seconds, max_seconds)`; `weight` is the band's share of
/// the table's total weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingPattern {
    pub min_seconds: i64,
    pub max_seconds: i64,
    pub weight: u32,
}

impl TimingPattern {
    pub const fn new(min_seconds: i64, max_seconds: i64, weight: u32) -> Self {
        Self {
            min_seconds,
            max_seconds,
            weight,
        }
    }
}

/// A single down-hold-up cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Press {
    pub direction: Direction,
    pub hold_micros: u64,
}

impl Press {
    pub fn hold_ms(&self) -> u64 {
        self.hold_micros / 1000
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionVariant {
    Normal,
    DoubleTap,
    Misclick,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    Normal { press: Press },
    DoubleTap { first: Press, second: Press },
    /// `wrong` went out first, then `corrected` in the intended direction.
    Misclick { wrong: Press, corrected: Press },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub turn: u64,
    pub at: DateTime<Local>,
    pub kind: ActionKind,
}

impl ActionRecord {
    pub fn variant(&self) -> ActionVariant {
        match self.kind {
            ActionKind::Normal { .. } => ActionVariant::Normal,
            ActionKind::DoubleTap { .. } => ActionVariant::DoubleTap,
            ActionKind::Misclick { .. } => ActionVariant::Misclick,
        }
    }

    /// Presses in the order they were emitted.
    pub fn presses(&self) -> Vec<Press> {
        match self.kind {
            ActionKind::Normal { press } => vec![press],
            ActionKind::DoubleTap { first, second } => vec![first, second],
            ActionKind::Misclick { wrong, corrected } => vec![wrong, corrected],
        }
    }

    pub fn key_count(&self) -> u64 {
        match self.kind {
            ActionKind::Normal { .. } => 1,
            ActionKind::DoubleTap { .. } | ActionKind::Misclick { .. } => 2,
        }
    }

    /// The direction the turn meant to press.
    pub fn intended(&self) -> Direction {
        match self.kind {
            ActionKind::Normal { press } => press.direction,
            ActionKind::DoubleTap { first, .. } => first.direction,
            ActionKind::Misclick { corrected, .. } => corrected.direction,
        }
    }
}
