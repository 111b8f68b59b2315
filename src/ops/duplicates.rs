use serde::Serialize;

use crate::record::Record;

/// A record whose full value equals an earlier record in the list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Duplicate {
    /// Position of the repeated occurrence.
    pub index: usize,
    /// Position of the first occurrence it repeats.
    pub first: usize,
}

/// Every occurrence after the first of a value already seen earlier.
///
/// Identity is the full tuple (state, name, hash, size, content), not the
/// name alone; see [`Record::identity`].  Quadratic, which is fine for the
/// handful of records a device holds.
pub fn find_duplicates(records: &[Record]) -> Vec<Duplicate> {
    records
        .iter()
        .enumerate()
        .filter_map(|(index, r)| {
            records[..index]
                .iter()
                .position(|earlier| earlier.identity() == r.identity())
                .map(|first| Duplicate { index, first })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordState;

    fn rec(name: &str, content: &[u8]) -> Record {
        Record::new(name, content.to_vec()).unwrap()
    }

    #[test]
    fn same_name_different_content_is_not_duplicate() {
        let list = vec![rec("a", b"1"), rec("a", b"2")];
        assert!(find_duplicates(&list).is_empty());
    }

    #[test]
    fn state_is_part_of_identity() {
        let mut deleted = rec("a", b"1");
        deleted.state = RecordState::Deleted;
        let list = vec![rec("a", b"1"), deleted];
        assert!(find_duplicates(&list).is_empty());
    }

    #[test]
    fn stored_hash_is_part_of_identity() {
        let mut stale = rec("a", b"1");
        stale.name_hash ^= 1;
        let list = vec![rec("a", b"1"), stale];
        assert!(find_duplicates(&list).is_empty());
    }

    #[test]
    fn each_repeat_counts_once() {
        let list = vec![rec("a", b"1"), rec("b", b"2"), rec("a", b"1"), rec("a", b"1")];
        assert_eq!(
            find_duplicates(&list),
            vec![Duplicate { index: 2, first: 0 }, Duplicate { index: 3, first: 0 }]
        );
    }
}
