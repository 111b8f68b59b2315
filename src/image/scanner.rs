//! Sequential scan of an image from offset 0.
//!
//! Records are decoded back to back until the first header that does not
//! decode.  There is no resynchronisation: anything after a corrupt header
//! is invisible, exactly as if the corrupt header were the sentinel.  The
//! reason the scan stopped is kept in [`ScanEnd`] so callers can still warn
//! about it.

use std::io::{self, BufReader, Read, Seek, SeekFrom};

use crate::device::WRITE_CHUNK;
use crate::record::{DecodeError, Record};

/// Why the scan stopped.
#[derive(Debug)]
pub enum ScanEnd {
    /// A state byte outside the valid set.
    Sentinel(u8),
    /// The device ran out exactly on a record boundary.
    EndOfDevice,
    /// Malformed header or payload.  Treated as end of data.
    Corrupt(DecodeError),
}

impl ScanEnd {
    pub fn is_clean(&self) -> bool {
        !matches!(self, ScanEnd::Corrupt(_))
    }
}

impl std::fmt::Display for ScanEnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanEnd::Sentinel(b) => write!(f, "sentinel {b:#04x}"),
            ScanEnd::EndOfDevice => write!(f, "end of device"),
            ScanEnd::Corrupt(e)  => write!(f, "corrupt header ({e})"),
        }
    }
}

/// Result of [`scan`].
#[derive(Debug)]
pub struct ScanReport {
    /// Records in on-device order.
    pub records:    Vec<Record>,
    /// Offset immediately after the last decoded record.
    pub end_offset: u64,
    pub end:        ScanEnd,
}

/// Decode every record from offset 0 up to the first invalid header.
///
/// Only genuine I/O failures are returned as `Err`; malformed bytes end the
/// scan and show up in [`ScanReport::end`].
pub fn scan<R: Read + Seek>(reader: &mut R) -> io::Result<ScanReport> {
    reader.seek(SeekFrom::Start(0))?;
    let mut input = BufReader::with_capacity(WRITE_CHUNK, reader);

    let mut records    = Vec::new();
    let mut end_offset = 0u64;

    let end = loop {
        match Record::decode(&mut input) {
            Ok(record) => {
                tracing::debug!(offset = end_offset, %record, "decoded record");
                end_offset += record.encoded_len();
                records.push(record);
            }
            Err(DecodeError::Io(e)) => return Err(e),
            Err(DecodeError::Sentinel(b)) => break ScanEnd::Sentinel(b),
            Err(DecodeError::EndOfDevice) => break ScanEnd::EndOfDevice,
            Err(e) => {
                tracing::warn!(
                    offset = end_offset,
                    error = %e,
                    "corrupt header; treating as end of data, later records are not visible"
                );
                break ScanEnd::Corrupt(e);
            }
        }
    };

    tracing::debug!(records = records.len(), end_offset, %end, "scan finished");
    Ok(ScanReport { records, end_offset, end })
}
