//! Line-based three-way text merge. Built on `similar`'s pairwise diff (the
//! same crate the teacher tree pulls in for `inferred_copy_from`): diff O
//! against A and O against B independently, then union the two sets of
//! changed base regions into merge groups. A group touched by only one side
//! is taken verbatim from that side; a group where both sides produced the
//! same replacement is taken once; a group where the two replacements
//! differ is a conflict.

use similar::TextDiff;

pub struct Diff3Result {
    pub merged: String,
    pub has_conflicts: bool,
}

#[derive(Clone, Debug)]
struct Change {
    start: usize,
    end: usize,
    lines: Vec<String>,
}

pub fn merge(base: &str, a: &str, b: &str, label_a: &str, label_b: &str) -> Diff3Result {
    let base_lines: Vec<&str> = split_lines(base);
    let a_lines: Vec<&str> = split_lines(a);
    let b_lines: Vec<&str> = split_lines(b);

    let changes_a = changed_regions(&base_lines, &a_lines);
    let changes_b = changed_regions(&base_lines, &b_lines);

    let groups = group_regions(&changes_a, &changes_b, base_lines.len());

    let mut out_lines: Vec<String> = Vec::new();
    let mut has_conflicts = false;
    let mut cursor = 0usize;

    for group in groups {
        if group.start > cursor {
            out_lines.extend(base_lines[cursor..group.start].iter().map(|s| s.to_string()));
        }
        let base_seg: Vec<String> = base_lines[group.start..group.end]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let side_a = expand(group.start, group.end, &base_lines, &changes_a);
        let side_b = expand(group.start, group.end, &base_lines, &changes_b);

        if side_a == base_seg {
            out_lines.extend(side_b);
        } else if side_b == base_seg {
            out_lines.extend(side_a);
        } else if side_a == side_b {
            out_lines.extend(side_a);
        } else {
            has_conflicts = true;
            out_lines.push(format!("<<<<<<< {}", label_a));
            out_lines.extend(side_a);
            out_lines.push("=======".to_string());
            out_lines.extend(side_b);
            out_lines.push(format!(">>>>>>> {}", label_b));
        }
        cursor = group.end;
    }
    if cursor < base_lines.len() {
        out_lines.extend(base_lines[cursor..].iter().map(|s| s.to_string()));
    }

    let mut merged = out_lines.join("\n");
    if !merged.is_empty() {
        merged.push('\n');
    }
    Diff3Result {
        merged,
        has_conflicts,
    }
}

fn split_lines(s: &str) -> Vec<&str> {
    if s.is_empty() {
        return Vec::new();
    }
    s.strip_suffix('\n').unwrap_or(s).split('\n').collect()
}

/// Non-equal opcodes of a diff against `base`, each carrying the base range
/// it covers and the replacement text from the other side.
fn changed_regions(base_lines: &[&str], other_lines: &[&str]) -> Vec<Change> {
    let diff = TextDiff::from_slices(base_lines, other_lines);
    let mut out = Vec::new();
    for op in diff.ops() {
        use similar::DiffOp;
        match op {
            DiffOp::Equal { .. } => {}
            DiffOp::Delete {
                old_index, old_len, ..
            } => out.push(Change {
                start: old_index,
                end: old_index + old_len,
                lines: Vec::new(),
            }),
            DiffOp::Insert {
                old_index,
                new_index,
                new_len,
            } => out.push(Change {
                start: old_index,
                end: old_index,
                lines: other_lines[new_index..new_index + new_len]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            }),
            DiffOp::Replace {
                old_index,
                old_len,
                new_index,
                new_len,
            } => out.push(Change {
                start: old_index,
                end: old_index + old_len,
                lines: other_lines[new_index..new_index + new_len]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            }),
        }
    }
    out
}

struct Group {
    start: usize,
    end: usize,
}

/// Unions the two change-region lists into maximal touching/overlapping
/// groups. A zero-width insertion at position p is folded into any group
/// touching p.
fn group_regions(changes_a: &[Change], changes_b: &[Change], base_len: usize) -> Vec<Group> {
    let mut points: Vec<(usize, usize)> = changes_a
        .iter()
        .chain(changes_b.iter())
        .map(|c| (c.start, c.end.max(c.start)))
        .collect();
    points.sort_by_key(|&(start, _)| start);

    let mut groups: Vec<Group> = Vec::new();
    for (start, end) in points {
        let end = end.min(base_len).max(start);
        if let Some(last) = groups.last_mut() {
            if start <= last.end {
                last.end = last.end.max(end);
                continue;
            }
        }
        groups.push(Group { start, end });
    }
    groups
}

/// Reconstructs one side's version of `[start, end)` in base coordinates:
/// unchanged sub-ranges copy from base, and any change overlapping the
/// window contributes its replacement lines in order.
fn expand(start: usize, end: usize, base_lines: &[&str], changes: &[Change]) -> Vec<String> {
    let mut out = Vec::new();
    let mut cursor = start;
    for change in changes {
        if change.end <= start || change.start >= end {
            continue;
        }
        if change.start > cursor {
            out.extend(base_lines[cursor..change.start].iter().map(|s| s.to_string()));
        }
        out.extend(change.lines.iter().cloned());
        cursor = change.end.max(cursor);
    }
    if cursor < end {
        out.extend(base_lines[cursor..end].iter().map(|s| s.to_string()));
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn non_overlapping_edits_merge_cleanly() {
        let base = "a\nb\nc\n";
        let a = "A\nb\nc\n";
        let b = "a\nb\nC\n";
        let result = merge(base, a, b, "a-name", "b-name");
        assert!(!result.has_conflicts);
        assert_eq!(result.merged, "A\nb\nC\n");
    }

    #[test]
    fn identical_edits_do_not_conflict() {
        let base = "a\nb\nc\n";
        let a = "A\nb\nc\n";
        let b = "A\nb\nc\n";
        let result = merge(base, a, b, "a-name", "b-name");
        assert!(!result.has_conflicts);
        assert_eq!(result.merged, "A\nb\nc\n");
    }

    #[test]
    fn overlapping_edits_conflict() {
        let base = "a\nb\nc\n";
        let a = "A\nb\nc\n";
        let b = "AA\nb\nc\n";
        let result = merge(base, a, b, "left", "right");
        assert!(result.has_conflicts);
        assert!(result.merged.contains("<<<<<<< left"));
        assert!(result.merged.contains(">>>>>>> right"));
    }

    #[test]
    fn unchanged_file_merges_to_base() {
        let base = "only\nline\n";
        let result = merge(base, base, base, "a", "b");
        assert!(!result.has_conflicts);
        assert_eq!(result.merged, base);
    }

    #[test]
    fn both_added_against_empty_base() {
        let a = "a\nb\n";
        let b = "a\nc\n";
        let result = merge("", a, b, "a", "b");
        assert!(result.has_conflicts);
    }
}
