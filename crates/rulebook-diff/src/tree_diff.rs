//! Tree-level diff: classify every path present in either of two trees.
//!
//! Files are compared by content hash. Output is ordered by relative path,
//! so two scans of the same directories always produce the same diff.

use std::collections::BTreeSet;

use rulebook_store::AssetTree;
use rulebook_types::{FileChangeStatus, FileDiffSummary};

/// Compare two trees and classify every path found in either.
pub fn diff_trees(old: &AssetTree, new: &AssetTree) -> Vec<FileDiffSummary> {
    let paths: BTreeSet<&str> = old.paths().chain(new.paths()).collect();

    paths
        .into_iter()
        .map(|path| {
            let before = old.get(path);
            let after = new.get(path);
            let status = match (before, after) {
                (None, Some(_)) => FileChangeStatus::Added,
                (Some(_), None) => FileChangeStatus::Removed,
                (Some(b), Some(a)) if b.hash == a.hash => FileChangeStatus::Unchanged,
                _ => FileChangeStatus::Modified,
            };
            FileDiffSummary {
                path: path.to_string(),
                status,
                old_size: before.map(|e| e.size),
                new_size: after.map(|e| e.size),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rulebook_store::TreeEntry;
    use rulebook_types::ContentHash;

    use super::*;

    fn tree(files: &[(&str, &str)]) -> AssetTree {
        AssetTree::from_entries(files.iter().map(|(path, content)| {
            (
                path.to_string(),
                TreeEntry {
                    hash: ContentHash::of(content.as_bytes()),
                    size: content.len() as u64,
                },
            )
        }))
    }

    #[test]
    fn identical_trees_are_all_unchanged() {
        let t = tree(&[("a.xsd", "a"), ("b.sch", "b")]);
        let diff = diff_trees(&t, &t);
        assert_eq!(diff.len(), 2);
        assert!(diff.iter().all(|d| d.status == FileChangeStatus::Unchanged));
    }

    #[test]
    fn classifies_each_kind_of_change() {
        let old = tree(&[("keep.xsl", "k"), ("edit.sch", "v1"), ("gone.xsd", "g")]);
        let new = tree(&[("keep.xsl", "k"), ("edit.sch", "v22"), ("fresh.xsd", "f")]);

        let diff = diff_trees(&old, &new);
        let got: Vec<(&str, FileChangeStatus)> =
            diff.iter().map(|d| (d.path.as_str(), d.status)).collect();
        assert_eq!(
            got,
            vec![
                ("edit.sch", FileChangeStatus::Modified),
                ("fresh.xsd", FileChangeStatus::Added),
                ("gone.xsd", FileChangeStatus::Removed),
                ("keep.xsl", FileChangeStatus::Unchanged),
            ]
        );

        let edit = &diff[0];
        assert_eq!((edit.old_size, edit.new_size), (Some(2), Some(3)));
        let fresh = &diff[1];
        assert_eq!((fresh.old_size, fresh.new_size), (None, Some(1)));
        let gone = &diff[2];
        assert_eq!((gone.old_size, gone.new_size), (Some(1), None));
    }

    #[test]
    fn empty_old_tree_means_everything_added() {
        let new = tree(&[("x/y.xsd", "y")]);
        let diff = diff_trees(&AssetTree::new(), &new);
        assert_eq!(diff.len(), 1);
        assert_eq!(diff[0].status, FileChangeStatus::Added);
    }

    proptest! {
        #[test]
        fn diff_covers_union_in_sorted_order(
            old in proptest::collection::btree_map("[a-c]{1,3}", "[xy]{0,2}", 0..8),
            new in proptest::collection::btree_map("[a-c]{1,3}", "[xy]{0,2}", 0..8),
        ) {
            let to_tree = |m: &std::collections::BTreeMap<String, String>| {
                AssetTree::from_entries(m.iter().map(|(p, c)| {
                    (p.clone(), TreeEntry { hash: ContentHash::of(c.as_bytes()), size: c.len() as u64 })
                }))
            };
            let diff = diff_trees(&to_tree(&old), &to_tree(&new));

            let union: BTreeSet<&String> = old.keys().chain(new.keys()).collect();
            prop_assert_eq!(diff.len(), union.len());
            prop_assert!(diff.windows(2).all(|w| w[0].path < w[1].path));

            for d in &diff {
                let expected = match (old.get(&d.path), new.get(&d.path)) {
                    (None, Some(_)) => FileChangeStatus::Added,
                    (Some(_), None) => FileChangeStatus::Removed,
                    (Some(a), Some(b)) if a == b => FileChangeStatus::Unchanged,
                    _ => FileChangeStatus::Modified,
                };
                prop_assert_eq!(d.status, expected);
            }
        }
    }
}
