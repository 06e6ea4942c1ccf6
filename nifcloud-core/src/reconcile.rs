//! Reconcile - Compute and apply differences between child collections
//!
//! Child entries (routes, NAT rules, DHCP mappings, registered
//! instances, ...) are compared by a natural key. Items only in the old
//! collection are removed, items only in the new one are added. Removals
//! always run before additions.

use std::collections::HashSet;
use std::future::Future;
use std::hash::Hash;

use crate::provider::ProviderResult;

/// Items to add and remove to move from one collection to another
#[derive(Debug, Clone, PartialEq)]
pub struct ListDiff<T> {
    pub to_add: Vec<T>,
    pub to_remove: Vec<T>,
}

impl<T> Default for ListDiff<T> {
    fn default() -> Self {
        Self {
            to_add: Vec::new(),
            to_remove: Vec::new(),
        }
    }
}

impl<T> ListDiff<T> {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Compute `new - old` and `old - new` by key
///
/// Order of first appearance is preserved and items sharing a key within one
/// collection are collapsed to the first one.
pub fn diff_by_key<T, K, F>(old: &[T], new: &[T], key: F) -> ListDiff<T>
where
    T: Clone,
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let old_keys: HashSet<K> = old.iter().map(&key).collect();
    let new_keys: HashSet<K> = new.iter().map(&key).collect();

    ListDiff {
        to_add: only_in(new, &old_keys, &key),
        to_remove: only_in(old, &new_keys, &key),
    }
}

fn only_in<T, K, F>(items: &[T], other: &HashSet<K>, key: &F) -> Vec<T>
where
    T: Clone,
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut seen = HashSet::new();
    items
        .iter()
        .filter(|item| {
            let k = key(item);
            !other.contains(&k) && seen.insert(k)
        })
        .cloned()
        .collect()
}

/// Difference between two string sets
pub fn diff_strings(old: &[String], new: &[String]) -> ListDiff<String> {
    diff_by_key(old, new, |s| s.clone())
}

/// Issue one call per removed item, then one per added item
///
/// Items are handed over as owned clones so the returned futures may hold
/// them. Stops at the first error. Nothing already applied is rolled back.
pub async fn apply<T, R, RFut, A, AFut>(
    diff: &ListDiff<T>,
    mut remove: R,
    mut add: A,
) -> ProviderResult<()>
where
    T: Clone,
    R: FnMut(T) -> RFut,
    RFut: Future<Output = ProviderResult<()>>,
    A: FnMut(T) -> AFut,
    AFut: Future<Output = ProviderResult<()>>,
{
    if !diff.is_empty() {
        log::debug!(
            "reconciling: {} to remove, {} to add",
            diff.to_remove.len(),
            diff.to_add.len()
        );
    }
    for item in &diff.to_remove {
        remove(item.clone()).await?;
    }
    for item in &diff.to_add {
        add(item.clone()).await?;
    }
    Ok(())
}
