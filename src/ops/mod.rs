//! Operations over the in-memory record list.
//!
//! Nothing here touches the device.  The caller scans, hands the list to
//! one of these functions, and commits afterwards if the command mutates.
//!
//! | Operation  | Mutates | Errors                         |
//! |------------|---------|--------------------------------|
//! | `verify`   | fix     |                                |
//! | `stat`     | no      |                                |
//! | `upload`   | yes     | AlreadyExists, InvalidName     |
//! | `download` | no      | NotFound, Ambiguous            |
//! | `delete`   | yes     | NotFound, Ambiguous            |
//! | `rebuild`  | yes     | InvalidName                    |
//! | `compact`  | yes     |                                |

pub mod duplicates;

use serde::Serialize;
use std::path::Path;

use crate::error::{FsError, NameError, Result};
use crate::image::ScanEnd;
use crate::record::{Record, RecordState};

pub use duplicates::{find_duplicates, Duplicate};

// ── Lookup ────────────────────────────────────────────────────────────────────

/// Positions of the active records named `name`, in list order.
pub fn find_active_by_name(records: &[Record], name: &str) -> Vec<usize> {
    records
        .iter()
        .enumerate()
        .filter(|(_, r)| r.is_active() && r.name == name)
        .map(|(i, _)| i)
        .collect()
}

/// The one active record named `name`.
fn single_active(records: &[Record], name: &str) -> Result<usize> {
    match find_active_by_name(records, name).as_slice() {
        []  => Err(FsError::NotFound(name.to_owned())),
        [i] => Ok(*i),
        many => Err(FsError::Ambiguous { name: name.to_owned(), count: many.len() }),
    }
}

/// Final path component, as stored in the name field.
pub fn basename(path: &Path) -> Result<String> {
    let invalid = |reason| FsError::InvalidName { name: path.display().to_string(), reason };
    let name = path.file_name().ok_or_else(|| invalid(NameError::Empty))?;
    let name = name.to_str().ok_or_else(|| invalid(NameError::NotAscii))?;
    Ok(name.to_owned())
}

// ── Verify ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HashMismatch {
    pub index:    usize,
    pub name:     String,
    pub stored:   u32,
    pub computed: u32,
    /// The stored hash has been overwritten with `computed`.
    pub fixed:    bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct VerifyReport {
    pub mismatches: Vec<HashMismatch>,
    pub duplicates: Vec<Duplicate>,
}

impl VerifyReport {
    /// Mismatches left unfixed plus duplicate occurrences.
    pub fn problems(&self) -> usize {
        self.mismatches.iter().filter(|m| !m.fixed).count() + self.duplicates.len()
    }

    pub fn fixed(&self) -> usize {
        self.mismatches.iter().filter(|m| m.fixed).count()
    }
}

/// Check every stored name hash, optionally repairing it, then look for
/// duplicate records.  Duplicates are reported, never removed.
pub fn verify(records: &mut [Record], fix: bool) -> VerifyReport {
    let mut mismatches = Vec::new();
    for (index, r) in records.iter_mut().enumerate() {
        let computed = r.computed_hash();
        if r.name_hash == computed {
            continue;
        }
        let stored = r.name_hash;
        if fix {
            r.name_hash = computed;
        }
        mismatches.push(HashMismatch { index, name: r.name.clone(), stored, computed, fixed: fix });
    }

    let duplicates = find_duplicates(records);
    let report = VerifyReport { mismatches, duplicates };
    tracing::info!(
        problems = report.problems(),
        fixed = report.fixed(),
        duplicates = report.duplicates.len(),
        "verify finished"
    );
    report
}

// ── Stat ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stat {
    pub record_count:  usize,
    pub active_count:  usize,
    pub deleted_count: usize,
    /// Offset right after the last scanned record, not device capacity.
    pub image_size:    u64,
    pub end:           String,
}

pub fn stat(records: &[Record], image_end: u64, end: &ScanEnd) -> Stat {
    let deleted_count = records.iter().filter(|r| r.state == RecordState::Deleted).count();
    Stat {
        record_count:  records.len(),
        active_count:  records.len() - deleted_count,
        deleted_count,
        image_size:    image_end,
        end:           end.to_string(),
    }
}

// ── Upload / download ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upload {
    Appended { index: usize },
    /// An active record of the same name was overwritten in place.
    Replaced { index: usize },
}

/// Store `data` under the basename of `host_path`.
///
/// Without `force` an existing active record of that name is an error and
/// the list is left untouched.  With `force` the first such record is
/// overwritten where it stands.
pub fn upload(records: &mut Vec<Record>, host_path: &Path, data: Vec<u8>, force: bool) -> Result<Upload> {
    let name = basename(host_path)?;
    let matches = find_active_by_name(records, &name);
    if !matches.is_empty() && !force {
        return Err(FsError::AlreadyExists(name));
    }

    let record = Record::new(&name, data)?;
    let outcome = match matches.first() {
        Some(&index) => {
            if matches.len() > 1 {
                tracing::warn!(%name, count = matches.len(), index, "several active matches, replacing the first");
            }
            records[index] = record;
            Upload::Replaced { index }
        }
        None => {
            records.push(record);
            Upload::Appended { index: records.len() - 1 }
        }
    };
    tracing::info!(%name, ?outcome, "uploaded");
    Ok(outcome)
}

/// Content of the one active record named `name`.
pub fn download<'a>(records: &'a [Record], name: &str) -> Result<&'a [u8]> {
    let index = single_active(records, name)?;
    Ok(&records[index].content)
}

// ── Delete / compact ──────────────────────────────────────────────────────────

/// Soft-delete the one active record named `name`.  Returns its position.
pub fn delete(records: &mut [Record], name: &str) -> Result<usize> {
    let index = single_active(records, name)?;
    records[index].state = RecordState::Deleted;
    tracing::info!(%name, index, "marked deleted");
    Ok(index)
}

/// Drop deleted records, keeping the order of the rest.  Returns how many
/// were dropped.
pub fn compact(records: &mut Vec<Record>) -> usize {
    let before = records.len();
    records.retain(Record::is_active);
    let removed = before - records.len();
    tracing::info!(removed, kept = records.len(), "compacted");
    removed
}

// ── Rebuild ───────────────────────────────────────────────────────────────────

/// A fresh list holding one active record per host file, in the given
/// order.  The previous list is not consulted.
pub fn rebuild<P: AsRef<Path>>(files: Vec<(P, Vec<u8>)>) -> Result<Vec<Record>> {
    files
        .into_iter()
        .map(|(path, data)| Record::new(&basename(path.as_ref())?, data))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn rec(name: &str, content: &[u8]) -> Record {
        Record::new(name, content.to_vec()).unwrap()
    }

    fn deleted(name: &str, content: &[u8]) -> Record {
        let mut r = rec(name, content);
        r.state = RecordState::Deleted;
        r
    }

    #[test]
    fn lookup_ignores_deleted() {
        let list = vec![deleted("a", b"old"), rec("b", b""), rec("a", b"new")];
        assert_eq!(find_active_by_name(&list, "a"), vec![2]);
        assert!(find_active_by_name(&list, "c").is_empty());
    }

    #[test]
    fn verify_reports_and_fixes_bad_hash() {
        let mut list = vec![rec("a.txt", b"xyz")];
        list[0].name_hash = 0xDEAD_BEEF;

        let report = verify(&mut list, false);
        assert_eq!(report.problems(), 1);
        assert_eq!(report.mismatches[0].stored, 0xDEAD_BEEF);
        assert_eq!(report.mismatches[0].computed, crate::hash::name_hash("a.txt"));
        assert_eq!(list[0].name_hash, 0xDEAD_BEEF);

        let report = verify(&mut list, true);
        assert_eq!(report.problems(), 0);
        assert_eq!(report.fixed(), 1);
        assert!(list[0].hash_matches());

        assert_eq!(verify(&mut list, false).problems(), 0);
    }

    #[test]
    fn fix_leaves_duplicates() {
        let mut list = vec![rec("a", b"1"), rec("a", b"1")];
        list[1].name_hash = 7;
        // Before fixing the stored hashes differ, so these are not duplicates yet.
        assert_eq!(verify(&mut list.clone(), false).problems(), 1);

        let report = verify(&mut list, true);
        assert_eq!(report.fixed(), 1);
        assert_eq!(report.duplicates, vec![Duplicate { index: 1, first: 0 }]);
        assert_eq!(report.problems(), 1);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn stat_counts() {
        let list = vec![rec("a", b"1"), deleted("b", b"2")];
        let s = stat(&list, 530, &ScanEnd::Sentinel(0));
        assert_eq!(s.record_count, 2);
        assert_eq!(s.active_count, 1);
        assert_eq!(s.deleted_count, 1);
        assert_eq!(s.image_size, 530);
    }

    #[test]
    fn upload_appends_under_basename() {
        let mut list = vec![rec("a", b"1")];
        let out = upload(&mut list, Path::new("/tmp/dir/b.bin"), b"22".to_vec(), false).unwrap();
        assert_eq!(out, Upload::Appended { index: 1 });
        assert_eq!(list[1].name, "b.bin");
        assert!(list[1].hash_matches());
        assert_eq!(list[1].content_size(), 2);
    }

    #[test]
    fn upload_existing_without_force_is_rejected() {
        let mut list = vec![rec("a", b"1")];
        let before = list.clone();
        let err = upload(&mut list, Path::new("a"), b"2".to_vec(), false).unwrap_err();
        assert!(matches!(err, FsError::AlreadyExists(ref n) if n == "a"));
        assert_eq!(list, before);
    }

    #[test]
    fn upload_force_replaces_in_place() {
        let mut list = vec![rec("x", b"0"), rec("a", b"1"), rec("y", b"2")];
        let out = upload(&mut list, Path::new("a"), b"new content".to_vec(), true).unwrap();
        assert_eq!(out, Upload::Replaced { index: 1 });
        assert_eq!(list.len(), 3);
        assert_eq!(list[1].name, "a");
        assert_eq!(list[1].content, b"new content");
        assert_eq!(list[1].content_size(), 11);
    }

    #[test]
    fn upload_over_deleted_name_appends() {
        let mut list = vec![deleted("a", b"1")];
        let out = upload(&mut list, Path::new("a"), b"2".to_vec(), false).unwrap();
        assert_eq!(out, Upload::Appended { index: 1 });
    }

    #[test]
    fn upload_rejects_unencodable_name() {
        let mut list = Vec::new();
        let long = PathBuf::from("n".repeat(300));
        assert!(matches!(
            upload(&mut list, &long, Vec::new(), false),
            Err(FsError::InvalidName { reason: NameError::TooLong, .. })
        ));
        assert!(list.is_empty());
    }

    #[test]
    fn download_cases() {
        let list = vec![rec("a", b"xyz"), rec("b", b"1"), rec("b", b"2"), deleted("c", b"")];
        assert_eq!(download(&list, "a").unwrap(), b"xyz");
        assert!(matches!(download(&list, "b"), Err(FsError::Ambiguous { count: 2, .. })));
        assert!(matches!(download(&list, "c"), Err(FsError::NotFound(_))));
        assert!(matches!(download(&list, "zzz"), Err(FsError::NotFound(_))));
    }

    #[test]
    fn delete_flips_state_only() {
        let mut list = vec![rec("a", b"1"), rec("b", b"2")];
        assert_eq!(delete(&mut list, "b").unwrap(), 1);
        assert_eq!(list[1].state, RecordState::Deleted);
        assert_eq!(list[1].content, b"2");
        assert!(matches!(delete(&mut list, "b"), Err(FsError::NotFound(_))));
    }

    #[test]
    fn compact_keeps_active_in_order() {
        let mut list = vec![rec("a", b"1"), deleted("b", b"2"), rec("c", b"3"), deleted("d", b"")];
        assert_eq!(compact(&mut list), 2);
        let names: Vec<_> = list.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["a", "c"]);
    }

    #[test]
    fn rebuild_uses_basenames() {
        let list = rebuild(vec![
            (PathBuf::from("host/one.txt"), b"1".to_vec()),
            (PathBuf::from("two.bin"), b"22".to_vec()),
        ])
        .unwrap();
        assert_eq!(list, vec![rec("one.txt", b"1"), rec("two.bin", b"22")]);
    }
}
