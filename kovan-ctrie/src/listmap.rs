//! Collision bucket for keys whose hashes agree on every bit the trie can
//! consume.
//!
//! Persistent and insertion ordered: every edit returns a new bucket and
//! leaves the receiver untouched, so a bucket can be shared freely between a
//! live trie and its snapshots. Buckets stay tiny in practice (a full 32-bit
//! collision is needed to land here), so entries live in a flat vector.

use crate::node::SNode;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::borrow::Borrow;

pub(crate) struct ListMap<K, V> {
    entries: Vec<Arc<SNode<K, V>>>,
}

impl<K, V> Clone for ListMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<K: Eq, V> ListMap<K, V> {
    pub(crate) fn pair(first: Arc<SNode<K, V>>, second: Arc<SNode<K, V>>) -> Self {
        Self {
            entries: alloc::vec![first, second],
        }
    }

    fn position<Q>(&self, key: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        self.entries.iter().position(|sn| sn.key.borrow() == key)
    }

    pub(crate) fn get<Q>(&self, key: &Q) -> Option<&Arc<SNode<K, V>>>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        self.position(key).map(|pos| &self.entries[pos])
    }

    /// Insert-or-overwrite. An overwritten key keeps its original position.
    pub(crate) fn inserted(&self, sn: Arc<SNode<K, V>>) -> Self {
        let mut entries = self.entries.clone();
        match self.position(&sn.key) {
            Some(pos) => entries[pos] = sn,
            None => entries.push(sn),
        }
        Self { entries }
    }

    /// Returns the bucket without `key`, or `None` when `key` is absent.
    pub(crate) fn removed<Q>(&self, key: &Q) -> Option<Self>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        let pos = self.position(key)?;
        let mut entries = self.entries.clone();
        entries.remove(pos);
        Some(Self { entries })
    }
}

impl<K, V> ListMap<K, V> {
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// The sole entry of a one-element bucket.
    pub(crate) fn single(&self) -> Option<&Arc<SNode<K, V>>> {
        match self.entries.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }

    pub(crate) fn entries(&self) -> &[Arc<SNode<K, V>>] {
        &self.entries
    }
}
