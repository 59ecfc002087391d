//! The filesystem core: on-disk records, bitmaps, the dentry tree and the
//! mount-scoped engine context.
pub mod bitmap;
pub mod dentry;
pub mod filekind;
pub mod fs_layout;
pub mod inode;
pub mod superblock;

pub use bitmap::Bitmap;
pub use dentry::{Dentry, DentryArena, DentryId, DentryRecord};
pub use filekind::FileKind;
pub use fs_layout::{BlockFs, Lookup};
pub use inode::{Inode, InodeRecord};
pub use superblock::SuperblockRecord;

/// Identifies an initialized filesystem image ("BLFS").
pub const FS_MAGIC: u32 = 0x424c_4653;
/// Inode id of the root directory.
pub const ROOT_INO: u32 = 0;
/// Logical blocks reserved for the superblock.
pub const SUPER_BLKS: usize = 1;
/// Data-block pointers per inode.
pub const DATA_PER_FILE: usize = 6;
/// On-disk name storage in bytes; names carry at most
/// [`MAX_NAME_LEN`]` - 1` bytes plus a NUL terminator.
pub const MAX_NAME_LEN: usize = 128;

/// NUL-pad `name` into fixed on-disk name storage.
/// Callers validate the length beforehand.
pub(crate) fn pack_name(name: &str) -> [u8; MAX_NAME_LEN] {
    let mut buf = [0u8; MAX_NAME_LEN];
    buf[..name.len()].copy_from_slice(name.as_bytes());
    buf
}

/// Recover a name from NUL-padded on-disk storage.
pub(crate) fn unpack_name(buf: &[u8; MAX_NAME_LEN]) -> String {
    let len = buf.iter().position(|&b| b == 0).unwrap_or(MAX_NAME_LEN);
    String::from_utf8_lossy(&buf[..len]).into_owned()
}
