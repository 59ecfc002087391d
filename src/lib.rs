//! A user-space filesystem engine over a block-oriented storage device.
//!
//! The engine presents a hierarchical file/directory tree and translates
//! path-based operations into on-disk layout management: inode and data-block
//! allocation through bitmaps, fixed-size record encoding, and a lazily
//! hydrated in-memory directory tree.
//!
//! On-disk layout, in logical blocks (one logical block = 2 IO units):
//! - superblock
//! - inode bitmap
//! - data bitmap
//! - inode table (one block per inode slot)
//! - data region
//!
//! # Durability
//!
//! There is no transactional commit protocol. [`BlockFs::unmount`] flushes
//! the tree, the superblock and both bitmaps as independent writes; a crash
//! in the middle of that sequence can leave the bitmaps inconsistent with
//! the inode table.
pub mod device;
pub mod disk_cursor;
mod error;
mod fs;
pub mod utils;

pub use device::{BlockDevice, ImageDisk, MemDisk};
pub use disk_cursor::DiskCursor;
pub use error::{FsError, Result};
pub use fs::*;
