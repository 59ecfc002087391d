use bincode::{Decode, Encode};

use crate::error::{FsError, Result};

use super::{pack_name, unpack_name, FileKind, Inode, MAX_NAME_LEN};

/// Index of a dentry inside the [`DentryArena`].
///
/// Parent and sibling links are stored as ids rather than references: the
/// arena is the single owner of every dentry, links are purely navigational.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DentryId(usize);

/// A named edge in the directory tree, binding a file name to an inode id
/// within a parent directory.
///
/// A dentry starts *unhydrated*: it knows its inode id but holds no inode.
/// The first access loads the inode from disk and hands ownership of it to
/// the dentry.
#[derive(Debug, Clone)]
pub struct Dentry {
    name: String,
    pub kind: FileKind,
    /// inode bitmap index; `None` until an inode is bound
    pub ino: Option<u32>,
    /// the owned inode, once hydrated
    pub(crate) inode: Option<Inode>,
    pub(crate) parent: Option<DentryId>,
    pub(crate) sibling: Option<DentryId>,
}

impl Dentry {
    /// A new detached dentry. The name must be non-empty, free of `/` and
    /// at most [`MAX_NAME_LEN`]` - 1` bytes.
    pub fn new(name: &str, kind: FileKind) -> Result<Self> {
        if name.is_empty() || name.len() >= MAX_NAME_LEN || name.contains('/') {
            return Err(FsError::InvalidArgument("invalid file name"));
        }
        Ok(Self {
            name: name.to_owned(),
            kind,
            ino: None,
            inode: None,
            parent: None,
            sibling: None,
        })
    }

    /// The root dentry, rebuilt on every mount.
    pub(crate) fn root() -> Self {
        Self {
            name: "/".to_owned(),
            kind: FileKind::Directory,
            ino: None,
            inode: None,
            parent: None,
            sibling: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_hydrated(&self) -> bool {
        self.inode.is_some()
    }

    /// The owned inode; present once hydrated.
    pub fn inode(&self) -> Option<&Inode> {
        self.inode.as_ref()
    }

    pub(crate) fn to_record(&self) -> DentryRecord {
        DentryRecord {
            name: pack_name(&self.name),
            ftype: self.kind,
            // an unbound id never reaches disk in a consistent tree; 0 is
            // the root and therefore harmlessly rejected on load
            ino: self.ino.unwrap_or(0),
        }
    }

    pub(crate) fn from_record(record: &DentryRecord) -> Self {
        Self {
            name: unpack_name(&record.name),
            kind: record.ftype,
            ino: Some(record.ino),
            inode: None,
            parent: None,
            sibling: None,
        }
    }
}

/// The fixed-width on-disk dentry record. Records pack back-to-back inside
/// a directory's data blocks, `block_size / SIZE` whole records per block;
/// no record spans a block boundary.
#[derive(Encode, Decode, Debug, Clone, PartialEq, Eq)]
pub struct DentryRecord {
    pub name: [u8; MAX_NAME_LEN],
    pub ftype: FileKind,
    pub ino: u32,
}

impl DentryRecord {
    /// Encoded size in bytes under the fixed-width record config.
    pub const SIZE: usize = 136;

    /// Whole records per data block.
    pub const fn per_block(block_size: u32) -> u32 {
        block_size / Self::SIZE as u32
    }
}

/// Slot-vector arena owning every live dentry.
///
/// Ids are slot indices; removing a dentry recycles its slot through a free
/// list, so ids stay small and stable across unrelated removals.
#[derive(Debug, Default)]
pub struct DentryArena {
    slots: Vec<Option<Dentry>>,
    free: Vec<usize>,
}

impl DentryArena {
    pub fn insert(&mut self, dentry: Dentry) -> DentryId {
        match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(dentry);
                DentryId(slot)
            }
            None => {
                self.slots.push(Some(dentry));
                DentryId(self.slots.len() - 1)
            }
        }
    }

    pub fn get(&self, id: DentryId) -> &Dentry {
        self.slots[id.0].as_ref().expect("stale dentry id")
    }

    pub fn get_mut(&mut self, id: DentryId) -> &mut Dentry {
        self.slots[id.0].as_mut().expect("stale dentry id")
    }

    pub fn remove(&mut self, id: DentryId) -> Dentry {
        let dentry = self.slots[id.0].take().expect("stale dentry id");
        self.free.push(id.0);
        dentry
    }

    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
