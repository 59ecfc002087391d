use bitvec::prelude::*;

use crate::error::{FsError, Result};

/// A bounded allocation bitmap: one bit per inode or data-block slot,
/// 1 = allocated.
///
/// Allocation is a first-fit scan in ascending bit order, so the lowest free
/// index always wins. The backing bit storage spans whole on-disk bitmap
/// blocks and usually carries more bits than there are slots; indices at or
/// beyond `max` are never handed out.
#[derive(Debug, Default, Clone)]
pub struct Bitmap {
    bits: BitVec<u8, Lsb0>,
    max: usize,
}

impl Bitmap {
    /// Wrap the raw bitmap bytes loaded from disk.
    pub fn from_slice(raw: &[u8], max: usize) -> Self {
        Self {
            bits: BitVec::from_slice(raw),
            max,
        }
    }

    /// A zeroed bitmap spanning `bytes` bytes of storage.
    pub fn empty(bytes: usize, max: usize) -> Self {
        Self {
            bits: bitvec![u8, Lsb0; 0; bytes * 8],
            max,
        }
    }

    /// Allocate the lowest free index, marking it used.
    pub fn allocate(&mut self) -> Result<u32> {
        match self.bits.first_zero() {
            Some(index) if index < self.max => {
                self.bits.set(index, true);
                Ok(index as u32)
            }
            _ => Err(FsError::NoSpace),
        }
    }

    /// Clear the bit for `index`, returning it to the free pool.
    pub fn release(&mut self, index: u32) {
        self.bits.set(index as usize, false);
    }

    pub fn is_set(&self, index: u32) -> bool {
        self.bits
            .get(index as usize)
            .as_deref()
            .copied()
            .unwrap_or(false)
    }

    /// Free slots below the configured maximum.
    pub fn free_count(&self) -> usize {
        self.bits[..self.max].count_zeros()
    }

    /// The raw bytes, for flushing the bitmap region wholesale.
    pub fn as_raw_slice(&self) -> &[u8] {
        self.bits.as_raw_slice()
    }
}
