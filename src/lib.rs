pub mod error;
pub mod hash;
pub mod record;
pub mod device;
pub mod image;
pub mod ops;

pub use error::{FsError, NameError};
pub use hash::name_hash;
pub use record::{DecodeError, Record, RecordState};
pub use device::Device;
pub use image::{CommitOptions, CommitSummary, Image, ScanEnd, ScanReport};
pub use ops::{
    compact, delete, download, find_active_by_name, find_duplicates, rebuild, stat, upload,
    verify, Duplicate, Stat, Upload, VerifyReport,
};
