//! Public map types.
//!
//! [`TrieMap`] is the mutable, lock-free map. [`ReadOnlyTrieMap`] is a frozen
//! view produced by [`TrieMap::read_only_snapshot`]; it rejects writes at the
//! type level and serves lookups without any renewal work.

use crate::error::TrieError;
use crate::iter::{Iter, Keys, Values};
use crate::node::{SNode, new_generation};
use crate::trie::{Cond, RawTrie};
use core::borrow::Borrow;
use core::fmt;
use core::hash::{BuildHasher, Hash};
use foldhash::fast::FixedState;
use kovan::pin;

/// Folds a 64-bit hash into the 32 bits the trie consumes.
#[inline(always)]
fn trie_hash<S: BuildHasher, Q: Hash + ?Sized>(hasher: &S, key: &Q) -> u32 {
    let h = hasher.hash_one(key);
    (h ^ (h >> 32)) as u32
}

/// Lock-free concurrent hash trie with constant-time snapshots.
pub struct TrieMap<K, V, S = FixedState> {
    raw: RawTrie<K, V>,
    hasher: S,
}

#[cfg(feature = "std")]
impl<K, V> TrieMap<K, V, FixedState>
where
    K: Hash + Eq + Clone + 'static,
    V: Clone + 'static,
{
    /// Creates a new empty map with FoldHash (FixedState).
    pub fn new() -> Self {
        Self::with_hasher(FixedState::default())
    }
}

impl<K, V, S> TrieMap<K, V, S>
where
    K: Hash + Eq + Clone + 'static,
    V: Clone + 'static,
    S: BuildHasher,
{
    /// Creates a new empty map with a custom hasher.
    pub fn with_hasher(hasher: S) -> Self {
        Self {
            raw: RawTrie::new(),
            hasher,
        }
    }

    /// Inserts a key-value pair, returning the value it replaced.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        self.write(key, value, Cond::Always)
    }

    /// Inserts only if `key` is absent.
    ///
    /// Returns `None` when the pair was inserted, or the value already
    /// present (which is left untouched).
    pub fn insert_if_absent(&self, key: K, value: V) -> Option<V> {
        self.write(key, value, Cond::IfAbsent)
    }

    /// Overwrites the value of `key` only if it is present. Returns the
    /// replaced value; `None` means nothing was written.
    pub fn replace(&self, key: K, value: V) -> Option<V> {
        self.write(key, value, Cond::IfPresent)
    }

    /// Overwrites the value of `key` with `new` only if it currently equals
    /// `old`.
    pub fn compare_and_replace(&self, key: K, old: &V, new: V) -> bool
    where
        V: PartialEq,
    {
        let admits = |current: &V| current == old;
        self.write(key, new, Cond::IfValue(&admits)).is_some()
    }

    fn write(&self, key: K, value: V, cond: Cond<'_, V>) -> Option<V> {
        let hash = trie_hash(&self.hasher, &key);
        let _guard = pin();
        self.raw
            .insert_if(SNode::new(key, value, hash), cond)
            .map(|prev| prev.value.clone())
    }

    /// Returns the value of `key`, or [`TrieError::NotFound`].
    pub fn get<Q>(&self, key: &Q) -> Result<V, TrieError>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.lookup(key).ok_or(TrieError::NotFound)
    }

    /// Returns the value of `key`, if present.
    pub fn lookup<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = trie_hash(&self.hasher, key);
        let _guard = pin();
        self.raw.lookup(key, hash).map(|sn| sn.value.clone())
    }

    /// Checks if the key exists.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.lookup(key).is_some()
    }

    /// Value-based search is not offered; it would need a full scan.
    pub fn contains_value(&self, _value: &V) -> Result<bool, TrieError> {
        Err(TrieError::Unsupported("contains_value"))
    }

    /// Removes `key`, returning its value.
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = trie_hash(&self.hasher, key);
        let _guard = pin();
        self.raw.remove(key, hash, None).map(|sn| sn.value.clone())
    }

    /// Removes `key` only if it is currently mapped to `value`.
    pub fn remove_if<Q>(&self, key: &Q, value: &V) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: PartialEq,
    {
        let hash = trie_hash(&self.hasher, key);
        let admits = |current: &V| current == value;
        let _guard = pin();
        self.raw.remove(key, hash, Some(&admits)).is_some()
    }

    /// Removes every entry. Snapshots taken earlier keep their contents.
    pub fn clear(&self) {
        let _guard = pin();
        self.raw.clear();
    }

    /// Returns an independent, writable copy of the current contents.
    ///
    /// Constant time: both maps share structure and copy it lazily on write.
    pub fn snapshot(&self) -> TrieMap<K, V, S>
    where
        S: Clone,
    {
        let _guard = pin();
        TrieMap {
            raw: RawTrie::with_root(self.raw.snapshot_root(), false),
            hasher: self.hasher.clone(),
        }
    }

    /// Returns a frozen view of the current contents.
    pub fn read_only_snapshot(&self) -> ReadOnlyTrieMap<K, V, S>
    where
        S: Clone,
    {
        ReadOnlyTrieMap {
            raw: self.frozen(),
            hasher: self.hasher.clone(),
        }
    }

    fn frozen(&self) -> RawTrie<K, V> {
        let _guard = pin();
        RawTrie::with_root(self.raw.freeze_root(), true)
    }

    /// Iterates over a consistent read-only snapshot, yielding (K, V) clones.
    pub fn iter(&self) -> Iter<K, V> {
        Iter::new(self.frozen())
    }

    /// Returns an iterator over the keys of a read-only snapshot.
    pub fn keys(&self) -> Keys<K, V> {
        Keys::new(self.iter())
    }

    /// Returns an iterator over the values of a read-only snapshot.
    pub fn values(&self) -> Values<K, V> {
        Values::new(self.iter())
    }

    /// Returns the number of entries.
    /// Note: This is an O(N) scan of a read-only snapshot.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Returns true if the map is empty.
    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Get the underlying hasher itself.
    pub fn hasher(&self) -> &S {
        &self.hasher
    }

    pub(crate) fn raw(&self) -> &RawTrie<K, V> {
        &self.raw
    }
}

/// Frozen view of a [`TrieMap`] at one instant.
///
/// Later writes to the source map are never visible here.
pub struct ReadOnlyTrieMap<K, V, S = FixedState> {
    raw: RawTrie<K, V>,
    hasher: S,
}

impl<K, V, S> ReadOnlyTrieMap<K, V, S>
where
    K: Hash + Eq + Clone + 'static,
    V: Clone + 'static,
    S: BuildHasher,
{
    /// Returns the value of `key`, or [`TrieError::NotFound`].
    pub fn get<Q>(&self, key: &Q) -> Result<V, TrieError>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.lookup(key).ok_or(TrieError::NotFound)
    }

    /// Returns the value of `key`, if present.
    pub fn lookup<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = trie_hash(&self.hasher, key);
        let _guard = pin();
        self.raw.lookup(key, hash).map(|sn| sn.value.clone())
    }

    /// Checks if the key exists.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.lookup(key).is_some()
    }

    /// Another view of the same frozen contents.
    pub fn read_only_snapshot(&self) -> ReadOnlyTrieMap<K, V, S>
    where
        S: Clone,
    {
        ReadOnlyTrieMap {
            raw: self.shared(),
            hasher: self.hasher.clone(),
        }
    }

    /// A writable map starting from these contents.
    pub fn snapshot(&self) -> TrieMap<K, V, S>
    where
        S: Clone,
    {
        let _guard = pin();
        let root = self.raw.read_root(false).copy_to_gen(&new_generation(), &self.raw);
        TrieMap {
            raw: RawTrie::with_root(root, false),
            hasher: self.hasher.clone(),
        }
    }

    fn shared(&self) -> RawTrie<K, V> {
        RawTrie::with_root(self.raw.read_root(false), true)
    }

    /// Iterates over the frozen contents, yielding (K, V) clones.
    pub fn iter(&self) -> Iter<K, V> {
        Iter::new(self.shared())
    }

    /// Returns an iterator over the keys.
    pub fn keys(&self) -> Keys<K, V> {
        Keys::new(self.iter())
    }

    /// Returns an iterator over the values.
    pub fn values(&self) -> Values<K, V> {
        Values::new(self.iter())
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Returns true if the view is empty.
    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Get the underlying hasher itself.
    pub fn hasher(&self) -> &S {
        &self.hasher
    }

    pub(crate) fn raw(&self) -> &RawTrie<K, V> {
        &self.raw
    }
}

impl<'a, K, V, S> IntoIterator for &'a TrieMap<K, V, S>
where
    K: Hash + Eq + Clone + 'static,
    V: Clone + 'static,
    S: BuildHasher,
{
    type Item = (K, V);
    type IntoIter = Iter<K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, K, V, S> IntoIterator for &'a ReadOnlyTrieMap<K, V, S>
where
    K: Hash + Eq + Clone + 'static,
    V: Clone + 'static,
    S: BuildHasher,
{
    type Item = (K, V);
    type IntoIter = Iter<K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K, V, S> Extend<(K, V)> for TrieMap<K, V, S>
where
    K: Hash + Eq + Clone + 'static,
    V: Clone + 'static,
    S: BuildHasher,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

impl<K, V, S> FromIterator<(K, V)> for TrieMap<K, V, S>
where
    K: Hash + Eq + Clone + 'static,
    V: Clone + 'static,
    S: BuildHasher + Default,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::with_hasher(S::default());
        map.extend(iter);
        map
    }
}

#[cfg(feature = "std")]
impl<K, V> Default for TrieMap<K, V, FixedState>
where
    K: Hash + Eq + Clone + 'static,
    V: Clone + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> fmt::Debug for TrieMap<K, V, S>
where
    K: Hash + Eq + Clone + fmt::Debug + 'static,
    V: Clone + fmt::Debug + 'static,
    S: BuildHasher,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V, S> fmt::Debug for ReadOnlyTrieMap<K, V, S>
where
    K: Hash + Eq + Clone + fmt::Debug + 'static,
    V: Clone + fmt::Debug + 'static,
    S: BuildHasher,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}
