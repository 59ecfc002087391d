use bincode::{Decode, Encode};

use crate::error::{FsError, Result};
use crate::utils::geometry::DiskLayout;

use super::FS_MAGIC;

/// The on-disk superblock record, stored at device offset 0.
///
/// Region sizes are in logical blocks, region offsets in bytes. A record
/// whose magic does not match [`FS_MAGIC`] marks an uninitialized image and
/// triggers layout computation at mount.
#[derive(Encode, Decode, Debug, Default, Clone, PartialEq, Eq)]
pub struct SuperblockRecord {
    /// magic number
    pub magic: u32,
    /// usage counter, persisted round-trip
    pub usage: u32,
    pub map_inode_blks: u32,
    pub map_inode_offset: u32,
    pub map_data_blks: u32,
    pub map_data_offset: u32,
    pub inode_offset: u32,
    pub data_offset: u32,
}

impl SuperblockRecord {
    /// Encoded size in bytes under the fixed-width record config.
    pub const SIZE: usize = 32;

    pub fn new(layout: &DiskLayout, usage: u32) -> Self {
        Self {
            magic: FS_MAGIC,
            usage,
            map_inode_blks: layout.map_inode_blks,
            map_inode_offset: layout.map_inode_offset,
            map_data_blks: layout.map_data_blks,
            map_data_offset: layout.map_data_offset,
            inode_offset: layout.inode_offset,
            data_offset: layout.data_offset,
        }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.magic == FS_MAGIC
    }

    /// Reconstruct the full layout of an initialized image. The slot counts
    /// are not persisted; they follow from the region extents.
    ///
    /// A valid magic does not imply consistent extents (a corrupted or
    /// foreign image can carry both), so the region ordering is checked
    /// before any extent arithmetic.
    pub fn layout(&self, disk_size: u32, block_size: u32) -> Result<DiskLayout> {
        let ordered = self.map_inode_offset < self.map_data_offset
            && self.map_data_offset < self.inode_offset
            && self.inode_offset < self.data_offset
            && self.data_offset <= disk_size;
        if !ordered {
            return Err(FsError::InvalidArgument("inconsistent superblock extents"));
        }
        Ok(DiskLayout {
            max_ino: (self.data_offset - self.inode_offset) / block_size,
            max_data: (disk_size - self.data_offset) / block_size,
            map_inode_blks: self.map_inode_blks,
            map_inode_offset: self.map_inode_offset,
            map_data_blks: self.map_data_blks,
            map_data_offset: self.map_data_offset,
            inode_offset: self.inode_offset,
            data_offset: self.data_offset,
        })
    }
}
