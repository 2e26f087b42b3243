use std::collections::BTreeMap;

use pogo_types::{BlobHash, FileEntry, RepoPath};

use crate::Result;

/// One side's state for a path: present with this content, or absent.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Side {
    pub blob_hash: BlobHash,
    pub executable: bool,
    pub symlink_target: Option<String>,
}

/// Per-path three-way state, the merge engine's primary input (§4.3, §4.8).
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct MergeFileCase {
    pub path: RepoPath,
    pub o: Option<Side>,
    pub a: Option<Side>,
    pub b: Option<Side>,
}

pub fn build(
    o_entries: Vec<FileEntry>,
    a_entries: Vec<FileEntry>,
    b_entries: Vec<FileEntry>,
) -> Result<Vec<MergeFileCase>> {
    let mut cases: BTreeMap<String, MergeFileCase> = BTreeMap::new();

    for (entries, slot) in [
        (o_entries, Slot::O),
        (a_entries, Slot::A),
        (b_entries, Slot::B),
    ] {
        for entry in entries {
            let key = entry.path.as_str().to_string();
            let case = cases.entry(key).or_insert_with(|| MergeFileCase {
                path: entry.path.clone(),
                o: None,
                a: None,
                b: None,
            });
            let side = Side {
                blob_hash: entry.blob_hash,
                executable: entry.executable,
                symlink_target: entry.symlink_target,
            };
            match slot {
                Slot::O => case.o = Some(side),
                Slot::A => case.a = Some(side),
                Slot::B => case.b = Some(side),
            }
        }
    }

    Ok(cases.into_values().collect())
}

enum Slot {
    O,
    A,
    B,
}

#[cfg(test)]
mod test {
    use super::*;
    use pogo_types::RepoPath;

    fn entry(path: &str, content: &[u8]) -> FileEntry {
        FileEntry {
            path: RepoPath::new(path).unwrap(),
            blob_hash: BlobHash::of(content),
            executable: false,
            symlink_target: None,
            has_conflicts: false,
        }
    }

    #[test]
    fn union_of_all_three_sides() {
        let o = vec![entry("shared.txt", b"o")];
        let a = vec![entry("shared.txt", b"a"), entry("a_only.txt", b"a")];
        let b = vec![entry("shared.txt", b"b"), entry("b_only.txt", b"b")];
        let cases = build(o, a, b).unwrap();
        assert_eq!(cases.len(), 3);

        let shared = cases
            .iter()
            .find(|c| c.path.as_str() == "shared.txt")
            .unwrap();
        assert!(shared.o.is_some());
        assert!(shared.a.is_some());
        assert!(shared.b.is_some());

        let a_only = cases
            .iter()
            .find(|c| c.path.as_str() == "a_only.txt")
            .unwrap();
        assert!(a_only.o.is_none());
        assert!(a_only.b.is_none());
    }
}
