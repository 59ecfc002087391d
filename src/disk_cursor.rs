//! A cursor that can be used to read and write arbitrary byte ranges of a
//! [`BlockDevice`], transparently aligning every transfer to the device's
//! IO unit.
//!
//! Reads fetch the surrounding aligned span in IO-unit chunks and copy the
//! requested sub-range out. Writes are read-modify-write: the aligned span is
//! read first, the `bias..bias + len` region is overwritten with the payload,
//! and the whole span is written back chunk by chunk. Exactly the requested
//! logical range changes; surrounding bytes are preserved.

use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};

use crate::device::BlockDevice;
use crate::utils::geometry::{round_down, round_up};

/// Cursor struct over a raw device.
#[derive(Debug)]
pub struct DiskCursor<D> {
    inner: D,
    pos: u64,
}

impl<D> DiskCursor<D> {
    /// Creates a new cursor positioned at offset 0.
    pub fn new(inner: D) -> Self {
        Self { inner, pos: 0 }
    }

    /// Get the underlying device back.
    pub fn into_inner(self) -> D {
        self.inner
    }

    /// Get a read-only reference to the underlying device.
    pub const fn get_ref(&self) -> &D {
        &self.inner
    }

    /// Get a mutable reference to the underlying device.
    pub fn get_mut(&mut self) -> &mut D {
        &mut self.inner
    }

    /// Get the current position of the cursor.
    pub const fn position(&self) -> u64 {
        self.pos
    }

    /// Set the current position of the cursor.
    pub fn set_position(&mut self, pos: u64) {
        self.pos = pos;
    }
}

impl<D: BlockDevice> DiskCursor<D> {
    /// Read the aligned span starting at `aligned_offset` into `span`,
    /// one IO unit per device transfer. `span.len()` is IO-unit aligned.
    fn read_span(&mut self, aligned_offset: u64, span: &mut [u8]) -> io::Result<()> {
        let io_size = self.inner.io_size();
        self.inner.seek_to(aligned_offset)?;
        for chunk in span.chunks_mut(io_size) {
            self.inner.read_chunk(chunk)?;
        }
        Ok(())
    }

    /// Write `span` back at `aligned_offset`, one IO unit per transfer.
    fn write_span(&mut self, aligned_offset: u64, span: &[u8]) -> io::Result<()> {
        let io_size = self.inner.io_size();
        self.inner.seek_to(aligned_offset)?;
        for chunk in span.chunks(io_size) {
            self.inner.write_chunk(chunk)?;
        }
        Ok(())
    }
}

impl<D: BlockDevice> Seek for DiskCursor<D> {
    fn seek(&mut self, style: SeekFrom) -> io::Result<u64> {
        let (base_pos, offset) = match style {
            SeekFrom::Start(n) => {
                self.pos = n;
                return Ok(n);
            }
            SeekFrom::End(n) => (self.inner.disk_size() as u64, n),
            SeekFrom::Current(n) => (self.pos, n),
        };
        match base_pos.checked_add_signed(offset) {
            Some(n) => {
                self.pos = n;
                Ok(self.pos)
            }
            None => Err(ErrorKind::InvalidInput.into()),
        }
    }

    fn stream_position(&mut self) -> io::Result<u64> {
        Ok(self.pos)
    }
}

impl<D: BlockDevice> Read for DiskCursor<D> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let disk_size = self.inner.disk_size() as u64;
        if buf.is_empty() || self.pos >= disk_size {
            return Ok(0);
        }
        let io_size = self.inner.io_size() as u64;
        let n = buf.len().min((disk_size - self.pos) as usize);

        let aligned_offset = round_down(self.pos, io_size);
        let bias = (self.pos - aligned_offset) as usize;
        let aligned_size = round_up(bias as u64 + n as u64, io_size) as usize;

        let mut span = vec![0u8; aligned_size];
        self.read_span(aligned_offset, &mut span)?;
        buf[..n].copy_from_slice(&span[bias..bias + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl<D: BlockDevice> Write for DiskCursor<D> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let disk_size = self.inner.disk_size() as u64;
        if self.pos + buf.len() as u64 > disk_size {
            return Err(ErrorKind::WriteZero.into());
        }
        let io_size = self.inner.io_size() as u64;

        let aligned_offset = round_down(self.pos, io_size);
        let bias = (self.pos - aligned_offset) as usize;
        let aligned_size = round_up(bias as u64 + buf.len() as u64, io_size) as usize;

        // Read-modify-write: preserve the bytes around the payload.
        let mut span = vec![0u8; aligned_size];
        self.read_span(aligned_offset, &mut span)?;
        span[bias..bias + buf.len()].copy_from_slice(buf);
        self.write_span(aligned_offset, &span)?;

        self.pos += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemDisk;

    #[test]
    fn test_aligned_io() {
        // write [IO_SIZE] contents at an [IO_SIZE] offset
        let mut cursor = DiskCursor::new(MemDisk::new(2048, 512));
        cursor.seek(SeekFrom::Start(512)).unwrap();
        let bytes_written = cursor.write(&[1u8; 512]).unwrap();
        assert_eq!(bytes_written, 512);

        cursor.seek(SeekFrom::Start(512)).unwrap();
        let mut buf = vec![0u8; 512];
        cursor.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [1; 512]);
    }

    #[test]
    fn test_unaligned_io() {
        // write [IO_SIZE] contents at a [NON IO_SIZE] offset
        let mut cursor = DiskCursor::new(MemDisk::new(2048, 512));
        cursor.seek(SeekFrom::Start(102)).unwrap();
        let size = cursor.write(&[2u8; 512]).unwrap();
        assert_eq!(size, 512);

        cursor.seek(SeekFrom::Start(102)).unwrap();
        let mut buf = vec![0u8; 512];
        cursor.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [2; 512]);

        // write [NON IO_SIZE] contents at a [NON IO_SIZE] offset
        cursor.seek(SeekFrom::Start(0)).unwrap();
        let size = cursor.write(&[1, 3, 8, 7, 6, 29]).unwrap();
        assert_eq!(size, 6);
        assert_eq!(cursor.position(), 6);
        let size = cursor.write(&[1, 2, 3, 4]).unwrap();
        assert_eq!(size, 4);
        cursor.seek(SeekFrom::Start(0)).unwrap();
        let mut buf = vec![0; 10];
        cursor.read_exact(&mut buf).unwrap();
        assert_eq!(cursor.position(), 10);
        assert_eq!(buf, [1, 3, 8, 7, 6, 29, 1, 2, 3, 4]);
    }

    #[test]
    fn test_write_preserves_surroundings() {
        let mut cursor = DiskCursor::new(MemDisk::new(1024, 512));
        cursor.write_all(&[9u8; 1024]).unwrap();

        cursor.seek(SeekFrom::Start(300)).unwrap();
        cursor.write_all(&[5u8; 50]).unwrap();

        let disk = cursor.into_inner();
        assert!(disk.bytes()[..300].iter().all(|&b| b == 9));
        assert!(disk.bytes()[300..350].iter().all(|&b| b == 5));
        assert!(disk.bytes()[350..].iter().all(|&b| b == 9));
    }

    #[test]
    fn test_out_of_bounds_write_fails() {
        let mut cursor = DiskCursor::new(MemDisk::new(1024, 512));
        cursor.seek(SeekFrom::End(-4)).unwrap();
        assert!(cursor.write(&[0u8; 8]).is_err());
    }
}
