//! What the filesystem looks like in memory: the mount-scoped context that
//! owns the device cursor, both bitmaps and the dentry tree, and implements
//! every engine operation against them.

use std::io::{Read, Seek, SeekFrom, Write};

use log::{debug, info};

use crate::device::BlockDevice;
use crate::disk_cursor::DiskCursor;
use crate::error::{FsError, Result};
use crate::utils::geometry::DiskLayout;

use super::{
    Bitmap, Dentry, DentryArena, DentryId, DentryRecord, FileKind, Inode, InodeRecord,
    SuperblockRecord, DATA_PER_FILE, MAX_NAME_LEN, ROOT_INO,
};

/// Result of a path resolution.
///
/// `found` is false when resolution stopped early; `dentry` then names the
/// deepest node reached (the last matched directory, or the non-directory
/// that blocked descent). The returned dentry is always hydrated.
#[derive(Debug, Clone, Copy)]
pub struct Lookup {
    pub dentry: DentryId,
    pub found: bool,
    pub is_root: bool,
}

/// The mounted filesystem.
///
/// It has the following on-disk layout:
/// - superblock
/// - inode bitmap
/// - data bitmap
/// - inode table (one block per slot)
/// - data region
///
/// One value of this type is the whole mount: it exclusively owns the
/// device cursor, the bitmaps and, through the arena, the entire live
/// dentry/inode tree. All operations are `&mut self` and run to completion;
/// there is no internal locking.
#[derive(Debug)]
pub struct BlockFs<D> {
    disk: DiskCursor<D>,
    io_size: u32,
    disk_size: u32,
    /// logical block size, fixed at mount to 2 IO units
    block_size: u32,
    usage: u32,
    max_ino: u32,
    max_data: u32,
    map_inode: Bitmap,
    map_data: Bitmap,
    layout: DiskLayout,
    arena: DentryArena,
    root: DentryId,
}

/// Mount and unmount.
impl<D: BlockDevice> BlockFs<D> {
    /// Mount the filesystem living on `device`.
    ///
    /// The superblock is read from offset 0; a magic mismatch means the
    /// image is uninitialized, so a fresh layout is computed and the root
    /// directory (inode 0) is created and flushed. Both bitmaps are loaded
    /// wholesale and the root inode is always hydrated before returning.
    pub fn mount(device: D) -> Result<Self> {
        let io_size = device.io_size() as u32;
        let disk_size = device.disk_size() as u32;
        let block_size = 2 * io_size;
        let mut disk = DiskCursor::new(device);

        disk.rewind()?;
        let record: SuperblockRecord =
            bincode::decode_from_std_read(&mut disk, bincode::config::legacy())?;
        let fresh = !record.is_valid();
        let (layout, usage) = if fresh {
            (DiskLayout::compute(disk_size, block_size), 0)
        } else {
            (record.layout(disk_size, block_size)?, record.usage)
        };
        // a logical block must hold a whole inode record; that also
        // guarantees at least one dentry record per directory block
        if (block_size as usize) < InodeRecord::SIZE {
            return Err(FsError::InvalidArgument(
                "IO unit too small for the on-disk records",
            ));
        }
        if layout.max_ino == 0 {
            return Err(FsError::InvalidArgument("device too small"));
        }
        info!(
            "mount() on a {disk_size}-byte device, {} inode slots, {} data blocks{}",
            layout.max_ino,
            layout.max_data,
            if fresh { " (fresh image)" } else { "" },
        );

        // Load both bitmaps wholesale. A fresh image has nothing meaningful
        // in its bitmap regions yet, so those start zeroed instead.
        let inode_map_bytes = (layout.map_inode_blks * block_size) as usize;
        let data_map_bytes = (layout.map_data_blks * block_size) as usize;
        let (map_inode, map_data) = if fresh {
            (
                Bitmap::empty(inode_map_bytes, layout.max_ino as usize),
                Bitmap::empty(data_map_bytes, layout.max_data as usize),
            )
        } else {
            let mut raw = vec![0u8; inode_map_bytes];
            disk.seek(SeekFrom::Start(layout.map_inode_offset as u64))?;
            disk.read_exact(&mut raw)?;
            let map_inode = Bitmap::from_slice(&raw, layout.max_ino as usize);

            let mut raw = vec![0u8; data_map_bytes];
            disk.seek(SeekFrom::Start(layout.map_data_offset as u64))?;
            disk.read_exact(&mut raw)?;
            (map_inode, Bitmap::from_slice(&raw, layout.max_data as usize))
        };

        let mut arena = DentryArena::default();
        let root = arena.insert(Dentry::root());
        let mut fs = Self {
            disk,
            io_size,
            disk_size,
            block_size,
            usage,
            max_ino: layout.max_ino,
            max_data: layout.max_data,
            map_inode,
            map_data,
            layout,
            arena,
            root,
        };

        if fresh {
            let ino = fs.alloc_inode(root)?;
            debug_assert_eq!(ino, ROOT_INO);
            fs.sync_inode(root)?;
        }
        fs.read_inode(root, ROOT_INO)?;
        Ok(fs)
    }

    /// Unmount: recursively sync the live tree from the root, flush the
    /// superblock record and both bitmap regions, and hand the device back.
    ///
    /// Consuming `self` releases the arena and bitmap buffers on every exit
    /// path and makes a second unmount unrepresentable. The writes are
    /// independent; there is no atomic commit across them.
    pub fn unmount(mut self) -> Result<D> {
        info!("unmount()");
        self.sync_inode(self.root)?;

        let record = SuperblockRecord::new(&self.layout, self.usage);
        self.disk.rewind()?;
        bincode::encode_into_std_write(&record, &mut self.disk, bincode::config::legacy())?;

        self.disk
            .seek(SeekFrom::Start(self.layout.map_inode_offset as u64))?;
        self.disk.write_all(self.map_inode.as_raw_slice())?;
        self.disk
            .seek(SeekFrom::Start(self.layout.map_data_offset as u64))?;
        self.disk.write_all(self.map_data.as_raw_slice())?;

        Ok(self.disk.into_inner())
    }
}

/// On-disk addressing.
impl<D: BlockDevice> BlockFs<D> {
    #[inline]
    fn inode_seek_position(&self, ino: u32) -> u64 {
        (self.layout.inode_offset + ino * self.block_size) as u64
    }

    #[inline]
    fn data_seek_position(&self, block: u32) -> u64 {
        (self.layout.data_offset + block * self.block_size) as u64
    }

    /// Whole dentry records per data block.
    #[inline]
    fn dentry_capacity(&self) -> u32 {
        DentryRecord::per_block(self.block_size)
    }
}

/// Inode lifecycle.
impl<D: BlockDevice> BlockFs<D> {
    /// Allocate a fresh inode for `dentry`: claim the lowest free inode
    /// bit, build the in-memory inode (regular files get their empty block
    /// buffers up front) and cross-link it with the dentry.
    pub fn alloc_inode(&mut self, dentry: DentryId) -> Result<u32> {
        let kind = self.arena.get(dentry).kind;
        let ino = self.map_inode.allocate()?;
        debug!("alloc_inode() -> ino {ino} ({kind:?})");

        let entry = self.arena.get_mut(dentry);
        entry.ino = Some(ino);
        entry.inode = Some(Inode::new(ino, kind, self.block_size));
        Ok(ino)
    }

    /// Hydrate `dentry` from the inode table slot for `ino`.
    ///
    /// Directories walk their data blocks in pointer order, decoding
    /// consecutive dentry records until the entry count is exhausted and
    /// head-inserting each as a child; child iteration order is therefore
    /// the reverse of on-disk order. Regular files load every block whose
    /// pointer is set. Hydration never touches the bitmaps.
    pub fn read_inode(&mut self, dentry: DentryId, ino: u32) -> Result<()> {
        debug!("read_inode() for ino {ino}");
        self.disk
            .seek(SeekFrom::Start(self.inode_seek_position(ino)))?;
        let record: InodeRecord =
            bincode::decode_from_std_read(&mut self.disk, bincode::config::legacy())?;
        let mut inode = Inode::from(&record);

        match inode.kind {
            FileKind::Directory => {
                let capacity = self.dentry_capacity();
                let mut children = Vec::with_capacity(record.dir_cnt as usize);
                let mut remaining = record.dir_cnt;
                for ptr in inode.held_blocks() {
                    if remaining == 0 {
                        break;
                    }
                    self.disk
                        .seek(SeekFrom::Start(self.data_seek_position(ptr)))?;
                    for _ in 0..remaining.min(capacity) {
                        let child: DentryRecord =
                            bincode::decode_from_std_read(&mut self.disk, bincode::config::legacy())?;
                        children.push(Dentry::from_record(&child));
                    }
                    remaining -= remaining.min(capacity);
                }
                self.arena.get_mut(dentry).inode = Some(inode);
                for child in children {
                    self.attach_child(dentry, child);
                }
            }
            FileKind::Regular => {
                let block_size = self.block_size as usize;
                inode.data = vec![vec![0; block_size]; DATA_PER_FILE];
                for (slot, ptr) in inode.block_ptrs.into_iter().enumerate() {
                    if let Some(ptr) = ptr {
                        self.disk
                            .seek(SeekFrom::Start(self.data_seek_position(ptr)))?;
                        self.disk.read_exact(&mut inode.data[slot])?;
                    }
                }
                self.arena.get_mut(dentry).inode = Some(inode);
            }
            FileKind::Symlink => {
                self.arena.get_mut(dentry).inode = Some(inode);
            }
        }
        self.arena.get_mut(dentry).ino = Some(ino);
        Ok(())
    }

    /// Flush `dentry`'s inode and everything below it, top-down.
    ///
    /// Directories rewrite each child's dentry record at its on-disk
    /// position (walking the in-memory list) and recurse into every child
    /// whose inode is loaded; regular files write every held block buffer.
    pub fn sync_inode(&mut self, dentry: DentryId) -> Result<()> {
        let entry = self.arena.get(dentry);
        let inode = entry
            .inode
            .as_ref()
            .ok_or(FsError::InvalidArgument("sync of an unhydrated inode"))?;
        let ino = inode.ino;
        debug!("sync_inode() for ino {ino}");
        let record = InodeRecord::from(inode);

        self.disk
            .seek(SeekFrom::Start(self.inode_seek_position(ino)))?;
        bincode::encode_into_std_write(&record, &mut self.disk, bincode::config::legacy())?;

        match self.arena.get(dentry).kind {
            FileKind::Directory => {
                let capacity = self.dentry_capacity() as usize;
                for (index, child_id) in self.children_ids(dentry).into_iter().enumerate() {
                    let ptr = self.arena.get(dentry).inode.as_ref().unwrap().block_ptrs
                        [index / capacity]
                        .ok_or(FsError::InvalidArgument("directory block pointer unset"))?;
                    let offset = self.data_seek_position(ptr)
                        + (index % capacity) as u64 * DentryRecord::SIZE as u64;

                    let child_record = self.arena.get(child_id).to_record();
                    self.disk.seek(SeekFrom::Start(offset))?;
                    bincode::encode_into_std_write(
                        &child_record,
                        &mut self.disk,
                        bincode::config::legacy(),
                    )?;

                    if self.arena.get(child_id).is_hydrated() {
                        self.sync_inode(child_id)?;
                    }
                }
            }
            FileKind::Regular => {
                let data_offset = self.layout.data_offset as u64;
                let block_size = self.block_size as u64;
                let Self { disk, arena, .. } = self;
                let inode = arena.get(dentry).inode.as_ref().unwrap();
                for (slot, ptr) in inode.block_ptrs.into_iter().enumerate() {
                    if let Some(ptr) = ptr {
                        disk.seek(SeekFrom::Start(data_offset + ptr as u64 * block_size))?;
                        disk.write_all(&inode.data[slot])?;
                    }
                }
            }
            FileKind::Symlink => {}
        }
        Ok(())
    }

    /// Drop `dentry`'s inode: directories recursively drop and detach every
    /// child first; then the inode's data blocks and its bitmap bit are
    /// released. The dentry itself stays attached (see [`Self::drop_dentry`]).
    ///
    /// Dropping the root inode is invalid.
    pub fn drop_inode(&mut self, dentry: DentryId) -> Result<()> {
        if dentry == self.root {
            return Err(FsError::InvalidArgument("the root inode cannot be dropped"));
        }
        // the on-disk tree below this inode can only be found through its
        // block pointers, so hydrate before tearing down
        self.hydrate(dentry)?;
        debug!(
            "drop_inode() for ino {:?}",
            self.arena.get(dentry).ino
        );

        if self.arena.get(dentry).kind.is_dir() {
            for child in self.children_ids(dentry) {
                self.drop_inode(child)?;
                self.drop_dentry(dentry, child)?;
            }
        }

        let entry = self.arena.get_mut(dentry);
        let inode = entry.inode.take().expect("hydrated above");
        entry.ino = None;
        // release every held data block, symmetric with the inode bit
        for block in inode.held_blocks() {
            self.map_data.release(block);
        }
        self.map_inode.release(inode.ino);
        Ok(())
    }
}

/// Dentry operations.
impl<D: BlockDevice> BlockFs<D> {
    /// Head-insert `child` into the hydrated directory `parent`. Allocates
    /// a fresh data block whenever the entry count crosses into a new
    /// per-block-capacity multiple, recording it in the next free pointer
    /// slot; fails with `NoSpace` once all pointer slots are used.
    pub fn alloc_dentry(&mut self, parent: DentryId, child: Dentry) -> Result<DentryId> {
        let entry = self.arena.get(parent);
        if !entry.kind.is_dir() {
            return Err(FsError::InvalidArgument("parent is not a directory"));
        }
        let dir_cnt = entry
            .inode
            .as_ref()
            .ok_or(FsError::InvalidArgument("parent is not hydrated"))?
            .dir_cnt;

        let capacity = self.dentry_capacity();
        if dir_cnt % capacity == 0 {
            // this entry starts a fresh on-disk block
            let slot = (dir_cnt / capacity) as usize;
            if slot >= DATA_PER_FILE {
                return Err(FsError::NoSpace);
            }
            let block = self.map_data.allocate()?;
            self.arena.get_mut(parent).inode.as_mut().unwrap().block_ptrs[slot] = Some(block);
        }

        let id = self.attach_child(parent, child);
        self.arena.get_mut(parent).inode.as_mut().unwrap().dir_cnt += 1;
        Ok(id)
    }

    /// Unlink `child` from `parent`'s child list (head or mid-list) and
    /// destroy the dentry. Fails with `NotFound` if `child` is not a member.
    /// When the removal empties the directory's trailing data block, that
    /// block is released and its pointer reset.
    ///
    /// Returns the remaining entry count.
    pub fn drop_dentry(&mut self, parent: DentryId, child: DentryId) -> Result<u32> {
        let child_sibling = self.arena.get(child).sibling;
        let head = self
            .arena
            .get(parent)
            .inode
            .as_ref()
            .ok_or(FsError::InvalidArgument("parent is not hydrated"))?
            .children;

        if head == Some(child) {
            self.arena.get_mut(parent).inode.as_mut().unwrap().children = child_sibling;
        } else {
            let mut cursor = head;
            let mut found = false;
            while let Some(id) = cursor {
                if self.arena.get(id).sibling == Some(child) {
                    self.arena.get_mut(id).sibling = child_sibling;
                    found = true;
                    break;
                }
                cursor = self.arena.get(id).sibling;
            }
            if !found {
                return Err(FsError::NotFound);
            }
        }
        self.arena.remove(child);

        let capacity = self.dentry_capacity();
        let inode = self.arena.get_mut(parent).inode.as_mut().unwrap();
        inode.dir_cnt -= 1;
        let dir_cnt = inode.dir_cnt;
        // the trailing block just became empty; release it
        if dir_cnt % capacity == 0 {
            if let Some(block) = inode.block_ptrs[(dir_cnt / capacity) as usize].take() {
                self.map_data.release(block);
            }
        }
        Ok(dir_cnt)
    }

    /// Splice `child` in as the new list head of `parent`. In-memory only:
    /// counts and bitmaps are untouched, which is what the hydration path
    /// needs.
    fn attach_child(&mut self, parent: DentryId, mut child: Dentry) -> DentryId {
        child.parent = Some(parent);
        child.sibling = self.arena.get(parent).inode.as_ref().unwrap().children;
        let id = self.arena.insert(child);
        self.arena.get_mut(parent).inode.as_mut().unwrap().children = Some(id);
        id
    }

    /// Ids of `parent`'s live children, in list (reverse insertion) order.
    fn children_ids(&self, parent: DentryId) -> Vec<DentryId> {
        let mut ids = Vec::new();
        let mut cursor = self
            .arena
            .get(parent)
            .inode
            .as_ref()
            .and_then(|inode| inode.children);
        while let Some(id) = cursor {
            ids.push(id);
            cursor = self.arena.get(id).sibling;
        }
        ids
    }
}

/// Path resolution.
impl<D: BlockDevice> BlockFs<D> {
    /// Resolve a slash-delimited path to a dentry, hydrating nodes on
    /// demand.
    ///
    /// Resolution walks one level per component. A missing component stops
    /// at the last matched directory with `found = false`; a non-directory
    /// met while components remain stops there the same way. `"/"` resolves
    /// to the root with `is_root = true`.
    pub fn lookup(&mut self, path: &str) -> Result<Lookup> {
        debug!("lookup() for path {path:?}");
        let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
        if components.is_empty() {
            self.hydrate(self.root)?;
            return Ok(Lookup {
                dentry: self.root,
                found: true,
                is_root: true,
            });
        }

        let mut cursor = self.root;
        let mut result = Lookup {
            dentry: self.root,
            found: false,
            is_root: false,
        };
        for (level, component) in components.iter().copied().enumerate() {
            self.hydrate(cursor)?;
            if !self.arena.get(cursor).kind.is_dir() {
                // a file in the middle of the path blocks descent
                result.dentry = cursor;
                break;
            }
            match self.find_child(cursor, component) {
                None => {
                    result.dentry = cursor;
                    break;
                }
                Some(child) if level == components.len() - 1 => {
                    result = Lookup {
                        dentry: child,
                        found: true,
                        is_root: false,
                    };
                    break;
                }
                Some(child) => cursor = child,
            }
        }

        self.hydrate(result.dentry)?;
        Ok(result)
    }

    /// Load `dentry`'s inode if it is not resident yet.
    fn hydrate(&mut self, dentry: DentryId) -> Result<()> {
        if self.arena.get(dentry).is_hydrated() {
            return Ok(());
        }
        let ino = self.arena.get(dentry).ino.ok_or(FsError::NotFound)?;
        self.read_inode(dentry, ino)
    }

    /// Linear scan of a hydrated directory for an exact name match.
    fn find_child(&self, parent: DentryId, name: &str) -> Option<DentryId> {
        self.children_ids(parent)
            .into_iter()
            .find(|&id| self.arena.get(id).name() == name)
    }
}

/// Convenience surface for the request bridge.
impl<D: BlockDevice> BlockFs<D> {
    /// Create a named child of `kind` under the hydrated directory
    /// `parent`: dentry first, then its inode. If the inode bitmap is
    /// exhausted the fresh dentry is rolled back, so a failed create leaves
    /// no trace.
    pub fn create(&mut self, parent: DentryId, name: &str, kind: FileKind) -> Result<DentryId> {
        if self.find_child(parent, name).is_some() {
            return Err(FsError::InvalidArgument("an entry with that name exists"));
        }
        let child = Dentry::new(name, kind)?;
        let id = self.alloc_dentry(parent, child)?;
        match self.alloc_inode(id) {
            Ok(_) => Ok(id),
            Err(e) => {
                self.drop_dentry(parent, id)?;
                Err(e)
            }
        }
    }

    /// Copy `data` into the file at byte `offset`, allocating data blocks
    /// on demand and growing the size. The file is bounded by its
    /// [`DATA_PER_FILE`] pointer slots.
    pub fn write_file(&mut self, dentry: DentryId, offset: usize, data: &[u8]) -> Result<usize> {
        self.hydrate(dentry)?;
        if !self.arena.get(dentry).kind.is_regular() {
            return Err(FsError::InvalidArgument("not a regular file"));
        }
        if data.is_empty() {
            return Ok(0);
        }
        let block_size = self.block_size as usize;
        let end = offset + data.len();
        if end > DATA_PER_FILE * block_size {
            return Err(FsError::NoSpace);
        }

        for slot in offset / block_size..=(end - 1) / block_size {
            if self.arena.get(dentry).inode.as_ref().unwrap().block_ptrs[slot].is_none() {
                let block = self.map_data.allocate()?;
                self.arena.get_mut(dentry).inode.as_mut().unwrap().block_ptrs[slot] = Some(block);
            }
        }

        let inode = self.arena.get_mut(dentry).inode.as_mut().unwrap();
        let mut written = 0;
        while written < data.len() {
            let position = offset + written;
            let (slot, in_block) = (position / block_size, position % block_size);
            let n = (block_size - in_block).min(data.len() - written);
            inode.data[slot][in_block..in_block + n].copy_from_slice(&data[written..written + n]);
            written += n;
        }
        inode.size = inode.size.max(end as u32);
        Ok(written)
    }

    /// Read up to `len` bytes from the file at byte `offset`, clamped at
    /// end of file.
    pub fn read_file(&mut self, dentry: DentryId, offset: usize, len: usize) -> Result<Vec<u8>> {
        self.hydrate(dentry)?;
        let entry = self.arena.get(dentry);
        if !entry.kind.is_regular() {
            return Err(FsError::InvalidArgument("not a regular file"));
        }
        let inode = entry.inode.as_ref().expect("hydrated above");
        let size = inode.size as usize;
        if offset >= size {
            return Ok(Vec::new());
        }

        let block_size = self.block_size as usize;
        let end = size.min(offset + len);
        let mut out = Vec::with_capacity(end - offset);
        let mut position = offset;
        while position < end {
            let (slot, in_block) = (position / block_size, position % block_size);
            let n = (block_size - in_block).min(end - position);
            out.extend_from_slice(&inode.data[slot][in_block..in_block + n]);
            position += n;
        }
        Ok(out)
    }

    /// Point a symlink inode at `target` (at most [`MAX_NAME_LEN`]` - 1`
    /// bytes).
    pub fn set_symlink_target(&mut self, dentry: DentryId, target: &str) -> Result<()> {
        if target.len() >= MAX_NAME_LEN {
            return Err(FsError::InvalidArgument("symlink target too long"));
        }
        self.hydrate(dentry)?;
        let inode = self
            .arena
            .get_mut(dentry)
            .inode
            .as_mut()
            .expect("hydrated above");
        if inode.kind != FileKind::Symlink {
            return Err(FsError::InvalidArgument("not a symlink"));
        }
        inode.target = target.to_owned();
        inode.size = target.len() as u32;
        Ok(())
    }

    pub fn root(&self) -> DentryId {
        self.root
    }

    /// Borrow a dentry by id.
    pub fn dentry(&self, id: DentryId) -> &Dentry {
        self.arena.get(id)
    }

    /// `(name, kind)` of every live child of a directory, in list order.
    /// Hydrates the directory first when needed.
    pub fn children(&mut self, parent: DentryId) -> Result<Vec<(String, FileKind)>> {
        self.hydrate(parent)?;
        Ok(self
            .children_ids(parent)
            .into_iter()
            .map(|id| {
                let entry = self.arena.get(id);
                (entry.name().to_owned(), entry.kind)
            })
            .collect())
    }

    /// The `index`-th live child of a directory, in list order. Hydrates
    /// the directory first when needed.
    pub fn child_at(&mut self, parent: DentryId, index: usize) -> Result<Option<DentryId>> {
        self.hydrate(parent)?;
        Ok(self.children_ids(parent).get(index).copied())
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn io_size(&self) -> u32 {
        self.io_size
    }

    pub fn disk_size(&self) -> u32 {
        self.disk_size
    }

    pub fn max_ino(&self) -> u32 {
        self.max_ino
    }

    pub fn max_data(&self) -> u32 {
        self.max_data
    }

    pub fn free_inode_slots(&self) -> usize {
        self.map_inode.free_count()
    }

    pub fn free_data_blocks(&self) -> usize {
        self.map_data.free_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemDisk;

    const DISK_SIZE: usize = 1024 * 1024;
    const IO_SIZE: usize = 512;

    fn mount_fresh() -> BlockFs<MemDisk> {
        let _ = env_logger::builder().is_test(true).try_init();
        BlockFs::mount(MemDisk::new(DISK_SIZE, IO_SIZE)).unwrap()
    }

    fn sorted_names(fs: &mut BlockFs<MemDisk>, dir: DentryId) -> Vec<String> {
        let mut names: Vec<String> = fs
            .children(dir)
            .unwrap()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        names.sort();
        names
    }

    #[test]
    fn mount_fresh_image_builds_the_root() -> anyhow::Result<()> {
        let mut fs = mount_fresh();
        assert_eq!(fs.block_size(), 1024);

        let hit = fs.lookup("/")?;
        assert!(hit.found);
        assert!(hit.is_root);
        assert_eq!(fs.dentry(hit.dentry).name(), "/");
        assert!(fs.children(hit.dentry)?.is_empty());

        // the root claimed inode 0 and nothing else
        assert_eq!(fs.dentry(hit.dentry).ino, Some(ROOT_INO));
        assert_eq!(fs.free_inode_slots(), fs.max_ino() as usize - 1);
        assert_eq!(fs.free_data_blocks(), fs.max_data() as usize);
        Ok(())
    }

    #[test]
    fn lookup_reports_the_deepest_match() -> anyhow::Result<()> {
        let mut fs = mount_fresh();
        let root = fs.root();
        fs.create(root, "a", FileKind::Regular)?;

        // missing component stops at the last matched directory
        let miss = fs.lookup("/nope")?;
        assert!(!miss.found);
        assert_eq!(miss.dentry, root);

        // a file mid-path blocks descent and is reported as the stop point
        let blocked = fs.lookup("/a/b")?;
        assert!(!blocked.found);
        assert_eq!(fs.dentry(blocked.dentry).name(), "a");

        // names only match whole, not by prefix
        let partial = fs.lookup("/ab")?;
        assert!(!partial.found);
        assert_eq!(partial.dentry, root);
        Ok(())
    }

    #[test]
    fn duplicate_names_are_rejected() -> anyhow::Result<()> {
        let mut fs = mount_fresh();
        let root = fs.root();
        fs.create(root, "twin", FileKind::Directory)?;
        assert!(matches!(
            fs.create(root, "twin", FileKind::Regular),
            Err(FsError::InvalidArgument(_))
        ));
        Ok(())
    }

    #[test]
    fn directories_pack_entries_per_block() -> anyhow::Result<()> {
        let mut fs = mount_fresh();
        let root = fs.root();
        let capacity = DentryRecord::per_block(fs.block_size());
        assert_eq!(capacity, 7);

        // 15 entries at 7 per block need 3 directory blocks
        for i in 0..15 {
            fs.create(root, &format!("d{i}"), FileKind::Directory)?;
        }
        let held = fs.dentry(root).inode().unwrap().held_blocks().count();
        assert_eq!(held, 3);

        // dropping back onto a capacity boundary releases the trailing block
        let victim = fs.lookup("/d14")?.dentry;
        fs.drop_inode(victim)?;
        fs.drop_dentry(root, victim)?;
        let held = fs.dentry(root).inode().unwrap().held_blocks().count();
        assert_eq!(held, 2);
        assert_eq!(fs.children(root)?.len(), 14);
        Ok(())
    }

    #[test]
    fn inode_exhaustion_leaves_the_tree_clean() -> anyhow::Result<()> {
        // 38 blocks of 1024: 3 reserved, 35 usable, 5 inode slots
        let mut fs = BlockFs::mount(MemDisk::new(38 * 1024, IO_SIZE))?;
        assert_eq!(fs.max_ino(), 5);
        let root = fs.root();

        for i in 0..4 {
            fs.create(root, &format!("f{i}"), FileKind::Regular)?;
        }
        assert!(matches!(
            fs.create(root, "f4", FileKind::Regular),
            Err(FsError::NoSpace)
        ));
        // the failed create rolled its dentry back
        assert_eq!(fs.children(root)?.len(), 4);
        assert_eq!(fs.free_inode_slots(), 0);

        // freeing one slot makes the create succeed
        let victim = fs.lookup("/f0")?.dentry;
        fs.drop_inode(victim)?;
        fs.drop_dentry(root, victim)?;
        fs.create(root, "f4", FileKind::Regular)?;
        assert_eq!(fs.children(root)?.len(), 4);
        Ok(())
    }

    #[test]
    fn remount_sees_the_same_tree() -> anyhow::Result<()> {
        let mut fs = mount_fresh();
        let root = fs.root();
        fs.create(root, "docs", FileKind::Directory)?;
        fs.create(root, "notes", FileKind::Regular)?;
        let docs = fs.lookup("/docs")?.dentry;
        fs.create(docs, "inner", FileKind::Regular)?;

        let disk = fs.unmount()?;
        let mut fs = BlockFs::mount(disk)?;
        let root = fs.root();
        assert_eq!(sorted_names(&mut fs, root), ["docs", "notes"]);

        let docs = fs.lookup("/docs")?.dentry;
        assert_eq!(sorted_names(&mut fs, docs), ["inner"]);
        assert!(fs.lookup("/docs/inner")?.found);

        // a second cycle changes nothing
        let disk = fs.unmount()?;
        let mut fs = BlockFs::mount(disk)?;
        let root = fs.root();
        assert_eq!(sorted_names(&mut fs, root), ["docs", "notes"]);
        Ok(())
    }

    #[test]
    fn file_contents_survive_a_remount() -> anyhow::Result<()> {
        let mut fs = mount_fresh();
        let root = fs.root();
        let file = fs.create(root, "hello", FileKind::Regular)?;
        assert_eq!(fs.write_file(file, 0, b"hi")?, 2);

        let disk = fs.unmount()?;
        let mut fs = BlockFs::mount(disk)?;
        let file = fs.lookup("/hello")?.dentry;
        assert_eq!(fs.read_file(file, 0, 16)?, b"hi");
        assert_eq!(fs.dentry(file).inode().unwrap().size, 2);
        Ok(())
    }

    #[test]
    fn writes_span_block_boundaries() -> anyhow::Result<()> {
        let mut fs = mount_fresh();
        let root = fs.root();
        let file = fs.create(root, "wide", FileKind::Regular)?;
        let block = fs.block_size() as usize;

        fs.write_file(file, block - 1, b"abcd")?;
        assert_eq!(fs.read_file(file, block - 1, 4)?, b"abcd");
        // the straddling write claimed exactly two blocks
        let held = fs.dentry(file).inode().unwrap().held_blocks().count();
        assert_eq!(held, 2);

        // reads clamp at end of file
        assert_eq!(fs.read_file(file, block + 2, 64)?, b"d");
        assert!(fs.read_file(file, block + 3, 64)?.is_empty());

        // the file cannot outgrow its pointer slots
        assert!(matches!(
            fs.write_file(file, DATA_PER_FILE * block, b"x"),
            Err(FsError::NoSpace)
        ));
        Ok(())
    }

    #[test]
    fn drop_inode_releases_every_block() -> anyhow::Result<()> {
        let mut fs = mount_fresh();
        let root = fs.root();
        let free_data = fs.free_data_blocks();
        let free_ino = fs.free_inode_slots();

        let file = fs.create(root, "bulky", FileKind::Regular)?;
        fs.write_file(file, 0, &vec![7u8; 3 * fs.block_size() as usize])?;
        assert_eq!(fs.free_data_blocks(), free_data - 1 - 3);

        fs.drop_inode(file)?;
        fs.drop_dentry(root, file)?;
        assert_eq!(fs.free_data_blocks(), free_data);
        assert_eq!(fs.free_inode_slots(), free_ino);
        assert!(!fs.lookup("/bulky")?.found);
        Ok(())
    }

    #[test]
    fn the_root_cannot_be_dropped() {
        let mut fs = mount_fresh();
        let root = fs.root();
        assert!(matches!(
            fs.drop_inode(root),
            Err(FsError::InvalidArgument(_))
        ));
    }

    #[test]
    fn dropping_a_directory_recurses() -> anyhow::Result<()> {
        let mut fs = mount_fresh();
        let root = fs.root();
        let free_ino = fs.free_inode_slots();

        let dir = fs.create(root, "tree", FileKind::Directory)?;
        fs.create(dir, "leaf1", FileKind::Regular)?;
        fs.create(dir, "leaf2", FileKind::Regular)?;

        fs.drop_inode(dir)?;
        fs.drop_dentry(root, dir)?;
        assert_eq!(fs.free_inode_slots(), free_ino);
        assert!(!fs.lookup("/tree/leaf1")?.found);
        Ok(())
    }

    #[test]
    fn symlink_targets_survive_a_remount() -> anyhow::Result<()> {
        let mut fs = mount_fresh();
        let root = fs.root();
        fs.create(root, "hello", FileKind::Regular)?;
        let link = fs.create(root, "shortcut", FileKind::Symlink)?;
        fs.set_symlink_target(link, "hello")?;

        let disk = fs.unmount()?;
        let mut fs = BlockFs::mount(disk)?;
        let link = fs.lookup("/shortcut")?.dentry;
        assert_eq!(fs.dentry(link).kind, FileKind::Symlink);
        assert_eq!(
            fs.dentry(link).inode().unwrap().symlink_target(),
            Some("hello")
        );
        Ok(())
    }

    #[test]
    fn deep_paths_resolve_after_a_remount() -> anyhow::Result<()> {
        let mut fs = mount_fresh();
        let a = fs.create(fs.root(), "a", FileKind::Directory)?;
        let b = fs.create(a, "b", FileKind::Directory)?;
        fs.create(b, "c", FileKind::Regular)?;

        let disk = fs.unmount()?;
        let mut fs = BlockFs::mount(disk)?;
        let hit = fs.lookup("/a/b/c")?;
        assert!(hit.found);
        assert_eq!(fs.dentry(hit.dentry).kind, FileKind::Regular);

        // trailing and doubled slashes collapse
        assert!(fs.lookup("/a//b/")?.found);
        Ok(())
    }

    #[test]
    fn child_at_walks_the_listing_order() -> anyhow::Result<()> {
        let mut fs = mount_fresh();
        let root = fs.root();
        fs.create(root, "first", FileKind::Regular)?;
        fs.create(root, "second", FileKind::Regular)?;

        // children head-insert, so the listing is newest first
        let names = fs.children(root)?;
        assert_eq!(names[0].0, "second");
        let second = fs.child_at(root, 0)?.unwrap();
        assert_eq!(fs.dentry(second).name(), "second");
        assert!(fs.child_at(root, 2)?.is_none());
        Ok(())
    }

    #[test]
    fn tiny_io_units_are_rejected_at_mount() {
        // a 64-byte IO unit makes the 128-byte logical block too small for
        // a 168-byte inode record (and holds no whole dentry record either)
        assert!(matches!(
            BlockFs::mount(MemDisk::new(64 * 1024, 64)),
            Err(FsError::InvalidArgument(_))
        ));
    }

    #[test]
    fn corrupt_superblock_is_rejected_at_mount() -> anyhow::Result<()> {
        // valid magic, scrambled extents: the inode table claims to start
        // after the data region
        let mut record = SuperblockRecord::new(
            &DiskLayout::compute(DISK_SIZE as u32, 1024),
            0,
        );
        std::mem::swap(&mut record.inode_offset, &mut record.data_offset);

        let mut cursor = DiskCursor::new(MemDisk::new(DISK_SIZE, IO_SIZE));
        bincode::encode_into_std_write(&record, &mut cursor, bincode::config::legacy())?;
        assert!(matches!(
            BlockFs::mount(cursor.into_inner()),
            Err(FsError::InvalidArgument(_))
        ));
        Ok(())
    }

    #[test]
    fn listings_hydrate_on_demand() -> anyhow::Result<()> {
        let mut fs = mount_fresh();
        let root = fs.root();
        let docs = fs.create(root, "docs", FileKind::Directory)?;
        fs.create(docs, "inner", FileKind::Regular)?;

        let disk = fs.unmount()?;
        let mut fs = BlockFs::mount(disk)?;
        let root = fs.root();

        // reach the freshly loaded, unhydrated directory without a lookup
        let docs = fs.child_at(root, 0)?.unwrap();
        assert!(!fs.dentry(docs).is_hydrated());
        assert_eq!(fs.children(docs)?, [("inner".to_owned(), FileKind::Regular)]);
        assert!(fs.dentry(docs).is_hydrated());
        Ok(())
    }
}
