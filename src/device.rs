//! Block device collaborators.
//!
//! A [`BlockDevice`] is the raw storage the engine runs on: it transfers
//! data in fixed IO-unit chunks at a seekable position and answers the two
//! control queries (IO-unit size, device size). [`ImageDisk`] maps a regular
//! image file, [`MemDisk`] keeps the whole device on the heap for tests.

use std::fs::OpenOptions;
use std::io::{self, ErrorKind};
use std::path::Path;

use memmap2::MmapMut;

/// Default IO-unit size of the shipped devices, in bytes.
pub const DEFAULT_IO_SIZE: usize = 512;

/// The minimal open/seek/read/write/query contract of a raw block device.
///
/// Every transfer moves exactly one IO unit; callers needing arbitrary byte
/// ranges go through [`DiskCursor`](crate::DiskCursor), which loops over
/// chunks and handles alignment.
pub trait BlockDevice {
    /// The smallest transfer size the device supports per operation.
    fn io_size(&self) -> usize;

    /// Total device capacity in bytes, a multiple of [`io_size`](Self::io_size).
    fn disk_size(&self) -> usize;

    /// Position the device at an absolute byte offset.
    fn seek_to(&mut self, offset: u64) -> io::Result<()>;

    /// Read one IO unit at the current position; `buf.len()` must equal
    /// [`io_size`](Self::io_size). Advances the position by one unit.
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<()>;

    /// Write one IO unit at the current position; `buf.len()` must equal
    /// [`io_size`](Self::io_size). Advances the position by one unit.
    fn write_chunk(&mut self, buf: &[u8]) -> io::Result<()>;
}

fn check_chunk(len: usize, io_size: usize) -> io::Result<()> {
    if len != io_size {
        return Err(io::Error::new(
            ErrorKind::InvalidInput,
            format!("transfer of {len} bytes, device IO unit is {io_size}"),
        ));
    }
    Ok(())
}

/// A device backed by a memory-mapped image file.
#[derive(Debug)]
pub struct ImageDisk {
    map: MmapMut,
    io_size: usize,
    pos: usize,
}

impl ImageDisk {
    /// Open an existing image file as a device.
    /// # Params
    /// - `image_path`: the path of the image file, something like a block
    ///   device node, e.g. **/dev/sda1**
    pub fn open<P>(image_path: P, io_size: usize) -> io::Result<Self>
    where
        P: AsRef<Path>,
    {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(image_path.as_ref())?;

        // Safety: the file stays open for the lifetime of the mapping and is
        // not truncated while mapped.
        let map = unsafe { MmapMut::map_mut(&file)? };
        if map.len() == 0 || map.len() % io_size != 0 {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                "image size is not a multiple of the IO unit",
            ));
        }
        Ok(Self { map, io_size, pos: 0 })
    }

    /// Create a zero-filled image file of `size` bytes and open it.
    pub fn create<P>(image_path: P, size: usize, io_size: usize) -> io::Result<Self>
    where
        P: AsRef<Path>,
    {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(image_path.as_ref())?;
        file.set_len(size as u64)?;

        // Safety: as above.
        let map = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self { map, io_size, pos: 0 })
    }

    /// Flush the mapping back to the image file.
    pub fn flush(&self) -> io::Result<()> {
        self.map.flush()
    }
}

impl BlockDevice for ImageDisk {
    fn io_size(&self) -> usize {
        self.io_size
    }

    fn disk_size(&self) -> usize {
        self.map.len()
    }

    fn seek_to(&mut self, offset: u64) -> io::Result<()> {
        self.pos = offset as usize;
        Ok(())
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<()> {
        check_chunk(buf.len(), self.io_size)?;
        let end = self.pos + self.io_size;
        if end > self.map.len() {
            return Err(ErrorKind::UnexpectedEof.into());
        }
        buf.copy_from_slice(&self.map[self.pos..end]);
        self.pos = end;
        Ok(())
    }

    fn write_chunk(&mut self, buf: &[u8]) -> io::Result<()> {
        check_chunk(buf.len(), self.io_size)?;
        let end = self.pos + self.io_size;
        if end > self.map.len() {
            return Err(ErrorKind::WriteZero.into());
        }
        self.map[self.pos..end].copy_from_slice(buf);
        self.pos = end;
        Ok(())
    }
}

/// A heap-backed device for tests.
#[derive(Debug, Clone)]
pub struct MemDisk {
    buf: Vec<u8>,
    io_size: usize,
    pos: usize,
}

impl MemDisk {
    pub fn new(size: usize, io_size: usize) -> Self {
        assert!(size > 0 && size % io_size == 0);
        Self {
            buf: vec![0; size],
            io_size,
            pos: 0,
        }
    }

    /// The raw device contents.
    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }
}

impl BlockDevice for MemDisk {
    fn io_size(&self) -> usize {
        self.io_size
    }

    fn disk_size(&self) -> usize {
        self.buf.len()
    }

    fn seek_to(&mut self, offset: u64) -> io::Result<()> {
        self.pos = offset as usize;
        Ok(())
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<()> {
        check_chunk(buf.len(), self.io_size)?;
        let end = self.pos + self.io_size;
        if end > self.buf.len() {
            return Err(ErrorKind::UnexpectedEof.into());
        }
        buf.copy_from_slice(&self.buf[self.pos..end]);
        self.pos = end;
        Ok(())
    }

    fn write_chunk(&mut self, buf: &[u8]) -> io::Result<()> {
        check_chunk(buf.len(), self.io_size)?;
        let end = self.pos + self.io_size;
        if end > self.buf.len() {
            return Err(ErrorKind::WriteZero.into());
        }
        self.buf[self.pos..end].copy_from_slice(buf);
        self.pos = end;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mem_disk_chunked_io() {
        let mut disk = MemDisk::new(2048, 512);
        let chunk = [7u8; 512];
        disk.seek_to(512).unwrap();
        disk.write_chunk(&chunk).unwrap();

        let mut out = [0u8; 512];
        disk.seek_to(512).unwrap();
        disk.read_chunk(&mut out).unwrap();
        assert_eq!(out, chunk);
        // surrounding units untouched
        assert!(disk.bytes()[..512].iter().all(|&b| b == 0));
        assert!(disk.bytes()[1024..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_mem_disk_rejects_partial_chunk() {
        let mut disk = MemDisk::new(1024, 512);
        let mut small = [0u8; 100];
        assert!(disk.read_chunk(&mut small).is_err());
    }

    #[test]
    fn test_image_disk_persists_across_reopen() {
        let path = std::env::temp_dir().join("blockfs_device_test.img");
        if path.exists() {
            std::fs::remove_file(&path).unwrap();
        }

        let mut disk = ImageDisk::create(&path, 4096, 512).unwrap();
        let chunk = [3u8; 512];
        disk.seek_to(1024).unwrap();
        disk.write_chunk(&chunk).unwrap();
        disk.flush().unwrap();
        drop(disk);

        let mut disk = ImageDisk::open(&path, 512).unwrap();
        assert_eq!(disk.disk_size(), 4096);
        let mut out = [0u8; 512];
        disk.seek_to(1024).unwrap();
        disk.read_chunk(&mut out).unwrap();
        assert_eq!(out, chunk);

        std::fs::remove_file(&path).unwrap();
    }
}
