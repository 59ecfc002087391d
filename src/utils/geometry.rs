//! This module contains functions to calculate the sizes and offsets of the
//! on-disk filesystem regions.

use crate::fs::{DATA_PER_FILE, SUPER_BLKS};

/// Round `value` down to a multiple of `round`.
/// # Example
/// ```
/// use blockfs::utils::geometry::round_down;
/// assert_eq!(round_down(1000, 512), 512);
/// assert_eq!(round_down(1024, 512), 1024);
/// ```
pub const fn round_down(value: u64, round: u64) -> u64 {
    value / round * round
}

/// Round `value` up to a multiple of `round`.
/// # Example
/// ```
/// use blockfs::utils::geometry::round_up;
/// assert_eq!(round_up(1000, 512), 1024);
/// assert_eq!(round_up(1024, 512), 1024);
/// ```
pub const fn round_up(value: u64, round: u64) -> u64 {
    value.div_ceil(round) * round
}

/// Number of logical blocks needed to hold a bitmap of `element_count` bits.
/// # Example
/// ```
/// use blockfs::utils::geometry::bitmap_blocks;
/// // 585 bits fit in 74 bytes, which fit in one 1024-byte block
/// assert_eq!(bitmap_blocks(585, 1024), 1);
/// ```
pub const fn bitmap_blocks(element_count: u32, block_size: u32) -> u32 {
    element_count.div_ceil(8).div_ceil(block_size)
}

/// The computed on-disk layout: region sizes in logical blocks and region
/// offsets in bytes. All offsets are block-aligned.
///
/// Region order: superblock | inode bitmap | data bitmap | inode table
/// (one block per inode slot) | data region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskLayout {
    pub max_ino: u32,
    pub max_data: u32,
    pub map_inode_blks: u32,
    pub map_inode_offset: u32,
    pub map_data_blks: u32,
    pub map_data_offset: u32,
    pub inode_offset: u32,
    pub data_offset: u32,
}

impl DiskLayout {
    /// Compute the layout for a device of `disk_size` bytes with logical
    /// blocks of `block_size` bytes.
    ///
    /// Every file is budgeted one inode-table block plus [`DATA_PER_FILE`]
    /// data blocks; the bitmap block counts are refined against the
    /// resulting slot counts until they are self-consistent.
    pub fn compute(disk_size: u32, block_size: u32) -> Self {
        let total_blocks = disk_size / block_size;
        let slots = |map_inode_blks: u32, map_data_blks: u32| {
            let reserved = SUPER_BLKS as u32 + map_inode_blks + map_data_blks;
            let usable = total_blocks.saturating_sub(reserved);
            let max_ino = usable / (1 + DATA_PER_FILE as u32);
            (max_ino, usable - max_ino)
        };

        // First pass assumes one block per bitmap; the second pass settles
        // the bitmap sizes against the slot counts. Slot counts can only
        // shrink when the bitmaps grow, so one refinement is enough.
        let (est_ino, est_data) = slots(1, 1);
        let map_inode_blks = bitmap_blocks(est_ino, block_size).max(1);
        let map_data_blks = bitmap_blocks(est_data, block_size).max(1);
        let (max_ino, max_data) = slots(map_inode_blks, map_data_blks);

        let map_inode_offset = SUPER_BLKS as u32 * block_size;
        let map_data_offset = map_inode_offset + map_inode_blks * block_size;
        let inode_offset = map_data_offset + map_data_blks * block_size;
        let data_offset = inode_offset + max_ino * block_size;

        Self {
            max_ino,
            max_data,
            map_inode_blks,
            map_inode_offset,
            map_data_blks,
            map_data_offset,
            inode_offset,
            data_offset,
        }
    }
}
