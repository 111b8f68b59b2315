//! Image handle: scan the device into memory, rewrite it from offset 0.
//!
//! # Commit
//! Every mutating command ends in a full rewrite of the in-memory list.
//! Records are written back to back from offset 0, followed by one
//! [`SENTINEL`] byte when the device has room for it, so whatever stale
//! bytes follow can never be read as a record.  With
//! [`CommitOptions::zero_fill`] the stale region up to the previous image
//! end is also zeroed.
//!
//! The rewrite is not transactional.  An interrupted commit leaves a mix
//! of old and new bytes on the device.

pub mod scanner;

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::device::{Device, WriteBuffer, WRITE_CHUNK};
use crate::error::Result;
use crate::record::{Record, SENTINEL};

pub use scanner::{scan, ScanEnd, ScanReport};

// ── CommitOptions ─────────────────────────────────────────────────────────────

/// Configuration for [`Image::commit`].
#[derive(Debug, Clone, Default)]
pub struct CommitOptions {
    /// Zero the bytes between the new image end and the end found by the
    /// last scan.
    pub zero_fill: bool,
}

/// What a commit wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitSummary {
    pub records:          usize,
    /// Offset immediately after the last record.
    pub image_size:       u64,
    pub sentinel_written: bool,
    /// Stale bytes overwritten with zeros.
    pub zero_filled:      u64,
}

// ── Image ─────────────────────────────────────────────────────────────────────

pub struct Image<D: Device> {
    device:   D,
    /// Image end found by the last scan or written by the last commit.
    last_end: Option<u64>,
}

impl Image<File> {
    /// Open a block device or image file for reading and writing.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self::new(file))
    }
}

impl<D: Device> Image<D> {
    pub fn new(device: D) -> Self {
        Self { device, last_end: None }
    }

    pub fn into_inner(self) -> D {
        self.device
    }

    pub fn scan(&mut self) -> io::Result<ScanReport> {
        let report = scan(&mut self.device)?;
        self.last_end = Some(report.end_offset);
        Ok(report)
    }

    /// Rewrite the whole image from offset 0 with `records`.
    ///
    /// Every record is validated before the first byte is written, so an
    /// unencodable record fails the commit with the device untouched.
    pub fn commit(&mut self, records: &[Record], opts: &CommitOptions) -> Result<CommitSummary> {
        for r in records {
            r.validate()?;
        }

        let capacity = self.device.capacity()?;
        let stale_end = self.last_end.unwrap_or(0).min(capacity);
        self.device.seek(SeekFrom::Start(0))?;

        let mut out = WriteBuffer::new(&mut self.device, WRITE_CHUNK);
        for r in records {
            r.write(&mut out)?;
        }
        let image_size = out.bytes_written();

        let sentinel_written = image_size < capacity;
        if sentinel_written {
            out.write_all(&[SENTINEL])?;
        }

        let mut zero_filled = 0u64;
        if opts.zero_fill {
            let from = out.bytes_written();
            if stale_end > from {
                zero_filled = io::copy(&mut io::repeat(0).take(stale_end - from), &mut out)?;
            }
        }

        out.flush()?;
        drop(out);
        self.device.sync()?;
        self.last_end = Some(image_size);

        tracing::info!(
            records = records.len(),
            image_size,
            sentinel_written,
            zero_filled,
            "image committed"
        );

        Ok(CommitSummary {
            records: records.len(),
            image_size,
            sentinel_written,
            zero_filled,
        })
    }
}
