//! Keyed list diffing.
use rustc_hash::{FxHashMap, FxHashSet};
use snafu::ensure;

use crate::{
    config::CollectionOrdering,
    error::{DuplicateKeySnafu, Result},
    tree::Key,
};

/// The page work needed to go from one key list to the next.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct KeyDiff {
    /// Keys no longer named.
    pub removed: Vec<Key>,
    /// Keys named for the first time, in emission order.
    pub added: Vec<Key>,
    /// The order of the items on the page after the update.
    pub order: Vec<Key>,
    /// Retained keys whose page nodes must move, in page order.
    pub moved: Vec<Key>,
}

impl KeyDiff {
    /// Whether the update leaves the page untouched.
    pub fn is_noop(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty() && self.moved.is_empty()
    }
}

pub(crate) fn diff_keys(old: &[Key], new: &[Key], ordering: CollectionOrdering) -> Result<KeyDiff> {
    let mut named = FxHashSet::default();
    for key in new {
        ensure!(named.insert(key), DuplicateKeySnafu { key: key.clone() });
    }
    let old_index: FxHashMap<&Key, usize> = old.iter().enumerate().map(|(i, k)| (k, i)).collect();

    let removed = old
        .iter()
        .filter(|key| !named.contains(key))
        .cloned()
        .collect::<Vec<_>>();
    let added = new
        .iter()
        .filter(|key| !old_index.contains_key(key))
        .cloned()
        .collect::<Vec<_>>();

    let (order, moved) = match ordering {
        CollectionOrdering::AddRemove => {
            let order = old
                .iter()
                .filter(|key| named.contains(key))
                .chain(added.iter())
                .cloned()
                .collect();
            (order, vec![])
        }
        CollectionOrdering::Reorder => {
            let retained = new
                .iter()
                .filter_map(|key| old_index.get(key).map(|i| (key, *i)))
                .collect::<Vec<_>>();
            let positions = retained.iter().map(|(_, i)| *i).collect::<Vec<_>>();
            let stays = longest_increasing_subsequence(&positions)
                .into_iter()
                .collect::<FxHashSet<_>>();
            let moved = retained
                .iter()
                .enumerate()
                .filter(|(n, _)| !stays.contains(n))
                .map(|(_, (key, _))| Key::clone(key))
                .collect();
            (new.to_vec(), moved)
        }
    };

    Ok(KeyDiff {
        removed,
        added,
        order,
        moved,
    })
}

/// Indices into `seq` of one of its longest strictly increasing
/// subsequences.
pub(crate) fn longest_increasing_subsequence(seq: &[usize]) -> Vec<usize> {
    // tails[n] is the index of the smallest value ending an increasing run of
    // length n + 1
    let mut tails: Vec<usize> = vec![];
    let mut prev: Vec<Option<usize>> = vec![None; seq.len()];
    for (i, x) in seq.iter().enumerate() {
        let at = tails.partition_point(|t| seq[*t] < *x);
        if at > 0 {
            prev[i] = Some(tails[at - 1]);
        }
        if at == tails.len() {
            tails.push(i);
        } else {
            tails[at] = i;
        }
    }
    let mut out = vec![];
    let mut cursor = tails.last().copied();
    while let Some(i) = cursor {
        out.push(i);
        cursor = prev[i];
    }
    out.reverse();
    out
}
