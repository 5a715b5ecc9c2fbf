//! Slot addressing for the 20×20 mosaic grid.
//!
//! A slot is addressed either by its row-major index (`0..400`) or by its
//! `(x, y)` cell coordinates. Both forms round-trip through [`Slot`].

use serde::{Deserialize, Serialize};

pub const GRID_SIZE: u16 = 20;
pub const TOTAL_SLOTS: u16 = GRID_SIZE * GRID_SIZE;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SlotError {
    #[error("slot index {0} is outside 0..{TOTAL_SLOTS}")]
    IndexOutOfRange(i64),
    #[error("cell ({x}, {y}) is outside the {GRID_SIZE}x{GRID_SIZE} grid")]
    CellOutOfRange { x: i64, y: i64 },
}

/// One addressable cell. Always in range once constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Slot(u16);

impl Slot {
    /// # Errors
    ///
    /// Returns [`SlotError::IndexOutOfRange`] for negative or too-large indices.
    pub fn new(index: i64) -> Result<Self, SlotError> {
        u16::try_from(index)
            .ok()
            .filter(|i| *i < TOTAL_SLOTS)
            .map(Self)
            .ok_or(SlotError::IndexOutOfRange(index))
    }

    /// # Errors
    ///
    /// Returns [`SlotError::CellOutOfRange`] if either coordinate is off-grid.
    pub fn from_xy(x: i64, y: i64) -> Result<Self, SlotError> {
        let size = i64::from(GRID_SIZE);
        if !(0..size).contains(&x) || !(0..size).contains(&y) {
            return Err(SlotError::CellOutOfRange { x, y });
        }
        Self::new(y * size + x).map_err(|_| SlotError::CellOutOfRange { x, y })
    }

    #[must_use]
    pub fn index(self) -> u16 {
        self.0
    }

    #[must_use]
    pub fn x(self) -> u16 {
        self.0 % GRID_SIZE
    }

    #[must_use]
    pub fn y(self) -> u16 {
        self.0 / GRID_SIZE
    }

    /// Every slot in row-major order.
    pub fn all() -> impl Iterator<Item = Slot> {
        (0..TOTAL_SLOTS).map(Slot)
    }
}

impl TryFrom<i64> for Slot {
    type Error = SlotError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Slot> for i64 {
    fn from(slot: Slot) -> Self {
        i64::from(slot.0)
    }
}

impl From<Slot> for i32 {
    fn from(slot: Slot) -> Self {
        i32::from(slot.0)
    }
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
#[path = "grid_test.rs"]
mod tests;
