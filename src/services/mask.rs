//! Slot eligibility mask.
//!
//! DESIGN
//! ======
//! A logo bitmap is decoded once at startup and sampled at the centre of
//! each grid cell (nearest-neighbour, so a crisp logo stays crisp). A slot is
//! eligible when its sampled alpha is strictly above the threshold. After
//! load the mask is a plain lookup table shared read-only through `AppState`.

use std::path::Path;

use crate::grid::{GRID_SIZE, Slot, TOTAL_SLOTS};

pub const DEFAULT_ALPHA_THRESHOLD: u8 = 20;

#[derive(Debug, thiserror::Error)]
pub enum MaskError {
    #[error("failed to read mask file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to decode mask image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("mask image is empty")]
    Empty,
}

#[derive(Clone)]
pub struct SlotMask {
    eligible: [bool; TOTAL_SLOTS as usize],
}

impl SlotMask {
    /// Mask used when no bitmap is configured.
    #[must_use]
    pub fn all_eligible() -> Self {
        Self { eligible: [true; TOTAL_SLOTS as usize] }
    }

    /// Decode PNG bytes into a mask.
    ///
    /// # Errors
    ///
    /// Returns [`MaskError::Decode`] for unreadable images and
    /// [`MaskError::Empty`] for zero-sized ones.
    pub fn from_png_bytes(bytes: &[u8], threshold: u8) -> Result<Self, MaskError> {
        let decoded = image::load_from_memory(bytes)?;
        if decoded.width() == 0 || decoded.height() == 0 {
            return Err(MaskError::Empty);
        }

        let rgba = decoded.to_rgba8();
        let (width, height) = rgba.dimensions();

        Ok(Self::from_fn(|slot| {
            let px = cell_center(slot.x(), width);
            let py = cell_center(slot.y(), height);
            rgba.get_pixel(px, py).0[3] > threshold
        }))
    }

    /// Build a mask by asking `f` about every slot.
    #[must_use]
    pub fn from_fn(f: impl Fn(Slot) -> bool) -> Self {
        let mut eligible = [false; TOTAL_SLOTS as usize];
        for slot in Slot::all() {
            eligible[usize::from(slot.index())] = f(slot);
        }
        Self { eligible }
    }

    /// Read and decode a mask file.
    ///
    /// # Errors
    ///
    /// Returns [`MaskError`] if the file cannot be read or decoded.
    pub fn load(path: &Path, threshold: u8) -> Result<Self, MaskError> {
        let bytes = std::fs::read(path)?;
        Self::from_png_bytes(&bytes, threshold)
    }

    #[must_use]
    pub fn is_eligible(&self, slot: Slot) -> bool {
        self.eligible[usize::from(slot.index())]
    }

    #[must_use]
    pub fn eligible_count(&self) -> usize {
        self.eligible.iter().filter(|e| **e).count()
    }
}

/// Source pixel under the centre of grid cell `cell` for an axis of `len` pixels.
fn cell_center(cell: u16, len: u32) -> u32 {
    let grid = u64::from(GRID_SIZE);
    let pos = (2 * u64::from(cell) + 1) * u64::from(len) / (2 * grid);
    u32::try_from(pos).unwrap_or(u32::MAX).min(len - 1)
}

impl Default for SlotMask {
    fn default() -> Self {
        Self::all_eligible()
    }
}

#[cfg(test)]
#[path = "mask_test.rs"]
mod tests;
