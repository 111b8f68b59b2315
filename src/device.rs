//! Backing storage for an image: a random-access byte resource.
//!
//! On the target this is a raw block device (an SD card node such as
//! `/dev/sdb`); on the host it is usually a disk image file.  Tests use an
//! in-memory cursor.

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

/// Commit batches writes into chunks of this size.
pub const WRITE_CHUNK: usize = 64 * 1024;

pub trait Device: Read + Write + Seek {
    /// Push written bytes down to the medium.
    fn sync(&mut self) -> io::Result<()>;

    /// Current size of the medium in bytes.  For a block device this is its
    /// capacity; for an image file, its length.
    fn capacity(&mut self) -> io::Result<u64> {
        let pos = self.stream_position()?;
        let end = self.seek(SeekFrom::End(0))?;
        self.seek(SeekFrom::Start(pos))?;
        Ok(end)
    }
}

impl Device for File {
    fn sync(&mut self) -> io::Result<()> {
        self.flush()?;
        self.sync_all()
    }
}

impl Device for Cursor<Vec<u8>> {
    fn sync(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ── Write buffer ─────────────────────────────────────────────────────────────

/// Buffered writer with a fixed flush threshold.
///
/// Records are small and numerous; block devices want large sequential
/// writes.  Unlike `std::io::BufWriter`, this exposes `bytes_written()` so
/// commit can report where the new image ends.
pub struct WriteBuffer<W: Write> {
    inner:         W,
    buf:           Vec<u8>,
    capacity:      usize,
    bytes_written: u64,
}

impl<W: Write> WriteBuffer<W> {
    pub fn new(inner: W, capacity: usize) -> Self {
        Self {
            inner,
            buf: Vec::with_capacity(capacity),
            capacity: capacity.max(1),
            bytes_written: 0,
        }
    }

    /// Bytes accepted so far, flushed or not.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    fn drain(&mut self) -> io::Result<()> {
        if !self.buf.is_empty() {
            self.inner.write_all(&self.buf)?;
            self.buf.clear();
        }
        Ok(())
    }
}

impl<W: Write> Write for WriteBuffer<W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if data.len() >= self.capacity {
            self.drain()?;
            self.inner.write_all(data)?;
        } else {
            self.buf.extend_from_slice(data);
            if self.buf.len() >= self.capacity {
                self.drain()?;
            }
        }
        self.bytes_written += data.len() as u64;
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.drain()?;
        self.inner.flush()
    }
}
