use bincode::{Decode, Encode};

use super::{pack_name, unpack_name, DentryId, FileKind, DATA_PER_FILE, MAX_NAME_LEN};

/// In-memory inode: metadata and data location for one filesystem object.
///
/// The id is the object's index in the inode bitmap and addresses its slot
/// in the inode table (one logical block per slot). Directories carry the
/// head of their child dentry list; regular files carry loaded data buffers,
/// one per block pointer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inode {
    pub ino: u32,
    /// occupied bytes (regular files)
    pub size: u32,
    pub kind: FileKind,
    /// target path, when this is a symlink
    pub(crate) target: String,
    /// live directory entry count
    pub dir_cnt: u32,
    /// data-block bitmap indices; `None` = unset
    pub block_ptrs: [Option<u32>; DATA_PER_FILE],
    /// head of the child dentry list (directories)
    pub(crate) children: Option<DentryId>,
    /// loaded block buffers (regular files), one per pointer slot
    pub(crate) data: Vec<Vec<u8>>,
}

impl Inode {
    /// A freshly allocated inode holding no data blocks. Regular files get
    /// their [`DATA_PER_FILE`] empty block buffers up front.
    pub(crate) fn new(ino: u32, kind: FileKind, block_size: u32) -> Self {
        let data = if kind.is_regular() {
            vec![vec![0; block_size as usize]; DATA_PER_FILE]
        } else {
            Vec::new()
        };
        Self {
            ino,
            size: 0,
            kind,
            target: String::new(),
            dir_cnt: 0,
            block_ptrs: [None; DATA_PER_FILE],
            children: None,
            data,
        }
    }

    pub fn symlink_target(&self) -> Option<&str> {
        (self.kind == FileKind::Symlink).then_some(self.target.as_str())
    }

    /// Data blocks currently held, in pointer-slot order.
    pub fn held_blocks(&self) -> impl Iterator<Item = u32> + '_ {
        self.block_ptrs.iter().copied().flatten()
    }
}

/// The fixed-width on-disk inode record, one logical block per slot.
#[derive(Encode, Decode, Debug, Clone, PartialEq, Eq)]
pub struct InodeRecord {
    pub ino: u32,
    pub size: u32,
    pub target: [u8; MAX_NAME_LEN],
    pub dir_cnt: u32,
    pub ftype: FileKind,
    /// -1 marks an unset pointer
    pub block_ptrs: [i32; DATA_PER_FILE],
}

impl InodeRecord {
    /// Encoded size in bytes under the fixed-width record config.
    pub const SIZE: usize = 168;
}

impl From<&Inode> for InodeRecord {
    fn from(inode: &Inode) -> Self {
        let mut block_ptrs = [-1i32; DATA_PER_FILE];
        for (slot, ptr) in block_ptrs.iter_mut().zip(inode.block_ptrs) {
            if let Some(block) = ptr {
                *slot = block as i32;
            }
        }
        Self {
            ino: inode.ino,
            size: inode.size,
            target: pack_name(&inode.target),
            dir_cnt: inode.dir_cnt,
            ftype: inode.kind,
            block_ptrs,
        }
    }
}

impl From<&InodeRecord> for Inode {
    fn from(record: &InodeRecord) -> Self {
        let mut block_ptrs = [None; DATA_PER_FILE];
        for (ptr, raw) in block_ptrs.iter_mut().zip(record.block_ptrs) {
            if raw >= 0 {
                *ptr = Some(raw as u32);
            }
        }
        Self {
            ino: record.ino,
            size: record.size,
            kind: record.ftype,
            target: unpack_name(&record.target),
            dir_cnt: record.dir_cnt,
            block_ptrs,
            children: None,
            // buffers are loaded by the engine, not the codec
            data: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_is_fixed_width() {
        let inode = Inode::new(3, FileKind::Directory, 1024);
        let record = InodeRecord::from(&inode);
        let encoded = bincode::encode_to_vec(&record, bincode::config::legacy()).unwrap();
        assert_eq!(encoded.len(), InodeRecord::SIZE);
    }

    #[test]
    fn test_round_trip_with_unset_pointers() -> anyhow::Result<()> {
        // all pointers -1, the shape of a freshly created inode
        let inode = Inode::new(0, FileKind::Directory, 1024);
        let record = InodeRecord::from(&inode);
        assert_eq!(record.block_ptrs, [-1; DATA_PER_FILE]);

        let encoded = bincode::encode_to_vec(&record, bincode::config::legacy())?;
        let (decoded, _): (InodeRecord, usize) =
            bincode::decode_from_slice(&encoded, bincode::config::legacy())?;
        assert_eq!(decoded, record);
        assert_eq!(Inode::from(&decoded).block_ptrs, [None; DATA_PER_FILE]);
        Ok(())
    }

    #[test]
    fn test_round_trip_symlink_target() -> anyhow::Result<()> {
        let mut inode = Inode::new(9, FileKind::Symlink, 1024);
        inode.target = "/some/other/place".into();

        let record = InodeRecord::from(&inode);
        let encoded = bincode::encode_to_vec(&record, bincode::config::legacy())?;
        let (decoded, _): (InodeRecord, usize) =
            bincode::decode_from_slice(&encoded, bincode::config::legacy())?;
        let restored = Inode::from(&decoded);
        assert_eq!(restored.symlink_target(), Some("/some/other/place"));
        assert_eq!(restored.kind, FileKind::Symlink);
        Ok(())
    }

    #[test]
    fn test_round_trip_populated_pointers() {
        let mut inode = Inode::new(1, FileKind::Regular, 1024);
        inode.size = 2048;
        inode.block_ptrs[0] = Some(5);
        inode.block_ptrs[1] = Some(11);

        let record = InodeRecord::from(&inode);
        assert_eq!(record.block_ptrs, [5, 11, -1, -1, -1, -1]);
        let encoded = bincode::encode_to_vec(&record, bincode::config::legacy()).unwrap();
        let (decoded, _): (InodeRecord, usize) =
            bincode::decode_from_slice(&encoded, bincode::config::legacy()).unwrap();
        let restored = Inode::from(&decoded);
        assert_eq!(restored.size, 2048);
        assert_eq!(restored.block_ptrs[1], Some(11));
        assert_eq!(restored.held_blocks().collect::<Vec<_>>(), vec![5, 11]);
    }
}
