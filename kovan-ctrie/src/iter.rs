//! Iteration over a read-only snapshot.
//!
//! The iterator owns its frozen trie, so it never observes concurrent writes
//! and never needs a guard held across `next` calls. Traversal is an explicit
//! stack of frames, one per main node being walked.

use crate::node::{Branch, Kind, MainNode};
use crate::trie::RawTrie;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

/// Cursor over the children of one main node.
struct Frame<K, V> {
    node: Arc<MainNode<K, V>>,
    next: usize,
    end: usize,
}

impl<K, V> Frame<K, V> {
    fn over(node: Arc<MainNode<K, V>>) -> Self {
        let end = match &node.kind {
            Kind::Compressed(cn) => cn.array.len(),
            Kind::Tomb(_) => 1,
            Kind::List(bucket) => bucket.len(),
        };
        Self { node, next: 0, end }
    }

    #[inline]
    fn remaining(&self) -> usize {
        self.end - self.next
    }
}

/// Iterator over the entries of a snapshot. Yields (K, V) clones.
pub struct Iter<K, V> {
    raw: RawTrie<K, V>,
    stack: Vec<Frame<K, V>>,
}

impl<K: 'static, V: 'static> Iter<K, V> {
    pub(crate) fn new(raw: RawTrie<K, V>) -> Self {
        debug_assert!(raw.read_only);
        let root = raw.read_root(false).gcas_read(&raw);
        Self {
            raw,
            stack: vec![Frame::over(root)],
        }
    }

    fn pop_exhausted(&mut self) {
        while self.stack.last().is_some_and(|frame| frame.remaining() == 0) {
            self.stack.pop();
        }
    }

    /// Splits off the later part of the remaining entries into a new
    /// iterator. The two iterators together yield exactly what `self` would
    /// have yielded.
    ///
    /// Returns `None` when the remaining entries cannot be divided, which is
    /// the case when at most one leaf is left unvisited.
    pub fn split(&mut self) -> Option<Self> {
        self.pop_exhausted();

        if let Some(frame) = self.stack.iter_mut().find(|frame| frame.remaining() >= 2) {
            let mid = frame.next + frame.remaining() / 2;
            let later = Frame {
                node: Arc::clone(&frame.node),
                next: mid,
                end: frame.end,
            };
            frame.end = mid;
            return Some(self.detached(later));
        }

        // every frame has at most one branch left: hand a lone subtree over
        let (frame, sub) = self.stack.iter_mut().find_map(|frame| {
            if frame.remaining() != 1 {
                return None;
            }
            let Kind::Compressed(cn) = &frame.node.kind else {
                return None;
            };
            let Branch::Indirection(sub) = &cn.array[frame.next] else {
                return None;
            };
            let sub = Arc::clone(sub);
            Some((frame, sub))
        })?;
        frame.next += 1;
        let main = sub.gcas_read(&self.raw);
        Some(self.detached(Frame::over(main)))
    }

    fn detached(&self, frame: Frame<K, V>) -> Self {
        Self {
            raw: RawTrie::with_root(self.raw.read_root(false), true),
            stack: vec![frame],
        }
    }
}

impl<K, V> Iterator for Iter<K, V>
where
    K: Clone + 'static,
    V: Clone + 'static,
{
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let frame = self.stack.last_mut()?;
            if frame.remaining() == 0 {
                self.stack.pop();
                continue;
            }
            let at = frame.next;
            frame.next += 1;
            let node = Arc::clone(&frame.node);

            let sn = match &node.kind {
                Kind::Compressed(cn) => match &cn.array[at] {
                    Branch::Singleton(sn) => sn,
                    Branch::Indirection(sub) => {
                        let main = sub.gcas_read(&self.raw);
                        self.stack.push(Frame::over(main));
                        continue;
                    }
                },
                Kind::Tomb(sn) => sn,
                Kind::List(bucket) => &bucket.entries()[at],
            };
            return Some((sn.key.clone(), sn.value.clone()));
        }
    }
}

/// Iterator over the keys of a snapshot. Yields K clones.
pub struct Keys<K, V> {
    iter: Iter<K, V>,
}

impl<K, V> Keys<K, V> {
    pub(crate) fn new(iter: Iter<K, V>) -> Self {
        Self { iter }
    }
}

impl<K, V> Iterator for Keys<K, V>
where
    K: Clone + 'static,
    V: Clone + 'static,
{
    type Item = K;

    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next().map(|(k, _)| k)
    }
}

/// Iterator over the values of a snapshot. Yields V clones.
pub struct Values<K, V> {
    iter: Iter<K, V>,
}

impl<K, V> Values<K, V> {
    pub(crate) fn new(iter: Iter<K, V>) -> Self {
        Self { iter }
    }
}

impl<K, V> Iterator for Values<K, V>
where
    K: Clone + 'static,
    V: Clone + 'static,
{
    type Item = V;

    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next().map(|(_, v)| v)
    }
}

#[cfg(test)]
mod tests {
    use crate::TrieMap;
    use alloc::vec::Vec;

    fn drain_sorted(iter: impl Iterator<Item = (u32, u32)>) -> Vec<u32> {
        let mut keys: Vec<u32> = iter.map(|(k, _)| k).collect();
        keys.sort_unstable();
        keys
    }

    #[test]
    fn test_empty_map_yields_nothing() {
        let map: TrieMap<u32, u32> = TrieMap::new();
        assert_eq!(map.iter().next(), None);
        assert!(map.iter().split().is_none());
    }

    #[test]
    fn test_split_halves_are_disjoint_and_complete() {
        let map = TrieMap::new();
        for i in 0..500u32 {
            map.insert(i, i);
        }

        let mut first = map.iter();
        let second = first.split().expect("500 entries must split");

        let a = drain_sorted(first);
        let b = drain_sorted(second);
        assert!(!a.is_empty());
        assert!(!b.is_empty());
        assert!(a.iter().all(|k| b.binary_search(k).is_err()));

        let mut all: Vec<u32> = a.into_iter().chain(b).collect();
        all.sort_unstable();
        assert_eq!(all, (0..500).collect::<Vec<_>>());
    }

    #[test]
    fn test_split_after_partial_consumption() {
        let map = TrieMap::new();
        for i in 0..100u32 {
            map.insert(i, i);
        }

        let mut iter = map.iter();
        let head: Vec<(u32, u32)> = iter.by_ref().take(10).collect();
        let tail = iter.split();

        let mut rest = drain_sorted(iter);
        if let Some(tail) = tail {
            rest.extend(drain_sorted(tail));
        }
        rest.extend(head.into_iter().map(|(k, _)| k));
        rest.sort_unstable();
        assert_eq!(rest, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_single_entry_does_not_split() {
        let map = TrieMap::new();
        map.insert(7u32, 7u32);
        let mut iter = map.iter();
        assert!(iter.split().is_none());
        assert_eq!(iter.next(), Some((7, 7)));
    }

    /// Hashes a `u32` key to itself.
    #[derive(Clone, Default)]
    struct Identity;

    struct IdentityHasher(u64);

    impl core::hash::Hasher for IdentityHasher {
        fn finish(&self) -> u64 {
            self.0
        }

        fn write(&mut self, bytes: &[u8]) {
            for b in bytes {
                self.0 = (self.0 << 8) | u64::from(*b);
            }
        }

        fn write_u32(&mut self, n: u32) {
            self.0 = u64::from(n);
        }
    }

    impl core::hash::BuildHasher for Identity {
        type Hasher = IdentityHasher;

        fn build_hasher(&self) -> IdentityHasher {
            IdentityHasher(0)
        }
    }

    #[test]
    fn test_split_hands_over_lone_subtree_below_top() {
        // root slot 0 holds {0, 32}, root slot 1 holds ten keys
        let map = TrieMap::with_hasher(Identity);
        let mut expected: Vec<u32> = alloc::vec![0, 1 << 5];
        expected.extend((0..10u32).map(|i| 1 | (i << 5)));
        for &k in &expected {
            map.insert(k, k);
        }

        let mut iter = map.iter();
        let (first, _) = iter.next().expect("non-empty");
        // top frame has one leaf left, the root frame one indirection
        let tail = iter.split().expect("eleven entries left");

        let a = drain_sorted(iter);
        let b = drain_sorted(tail);
        assert!(a.iter().all(|k| b.binary_search(k).is_err()));
        assert_eq!(b.len(), 10);

        let mut all: Vec<u32> = a.into_iter().chain(b).collect();
        all.push(first);
        all.sort_unstable();
        expected.sort_unstable();
        assert_eq!(all, expected);
    }
}
