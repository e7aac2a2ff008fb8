//! Trie engine: lookup, conditional insert, remove and compaction.
//!
//! Every operation reads the root through RDCSS, then walks down one
//! indirection per level consuming [`LEVEL_BITS`] of the hash, reading each
//! indirection through GCAS and writing back through GCAS. The descent is an
//! explicit loop over `(inode, level)`. A lost CAS retries at the current
//! indirection while the root generation is unchanged; anything else restarts
//! from the root.
//!
//! Indirections from an older generation than the traversal's start are
//! renewed on first touch, so writes never land in a subtree a snapshot still
//! shares.

use crate::cell::AtomCell;
use crate::error::{TrieError, fatal};
use crate::node::{
    Branch, Generation, INode, Kind, LEVEL_BITS, MainNode, SNode, dual, flag_pos, new_generation,
    same_gen,
};
use crate::rdcss::Root;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::borrow::Borrow;

/// Condition under which an insert is allowed to write.
pub(crate) enum Cond<'a, V> {
    /// Insert or overwrite.
    Always,
    /// Write only if the key is absent.
    IfAbsent,
    /// Overwrite only if the key is present.
    IfPresent,
    /// Overwrite only if the current value satisfies the predicate.
    IfValue(&'a dyn Fn(&V) -> bool),
}

impl<V> Cond<'_, V> {
    #[inline]
    fn writes_absent(&self) -> bool {
        matches!(self, Cond::Always | Cond::IfAbsent)
    }

    #[inline]
    fn writes_present(&self, current: &V) -> bool {
        match self {
            Cond::Always | Cond::IfPresent => true,
            Cond::IfAbsent => false,
            Cond::IfValue(admits) => admits(current),
        }
    }
}

/// The lock-free trie proper: a root cell and whether it may be written.
pub(crate) struct RawTrie<K, V> {
    pub(crate) root: AtomCell<Root<K, V>>,
    pub(crate) read_only: bool,
}

impl<K: 'static, V: 'static> RawTrie<K, V> {
    pub(crate) fn new() -> Self {
        Self::with_root(INode::new_root(), false)
    }

    pub(crate) fn with_root(root: Arc<INode<K, V>>, read_only: bool) -> Self {
        Self {
            root: AtomCell::new(Root::Node(root)),
            read_only,
        }
    }

    /// Whether the live root still belongs to `start_gen`.
    #[inline]
    fn still_current(&self, start_gen: &Generation) -> bool {
        same_gen(&self.read_root(false).generation, start_gen)
    }

    /// Replaces `inode`'s compressed node by one with every tombstoned child
    /// folded back in as a leaf.
    fn clean(&self, inode: &Arc<INode<K, V>>, level: u32) {
        let m = inode.gcas_read(self);
        if let Kind::Compressed(cn) = &m.kind {
            let compacted = cn.to_compressed(self, level, &inode.generation);
            inode.gcas(&m, MainNode::new(compacted), self);
        }
    }

    /// Takes a fresh, mutable-epoch snapshot of the root: the root is swapped
    /// to a renewed copy and the caller gets another renewed copy.
    pub(crate) fn snapshot_root(&self) -> Arc<INode<K, V>> {
        loop {
            let root = self.read_root(false);
            let expected = root.gcas_read(self);
            let renewed = root.copy_to_gen(&new_generation(), self);
            if self.rdcss_root(&root, &expected, renewed) {
                return root.copy_to_gen(&new_generation(), self);
            }
        }
    }

    /// Freezes the current root for read-only use; the live trie moves on to
    /// a new generation.
    pub(crate) fn freeze_root(&self) -> Arc<INode<K, V>> {
        if self.read_only {
            return self.read_root(false);
        }
        loop {
            let root = self.read_root(false);
            let expected = root.gcas_read(self);
            let renewed = root.copy_to_gen(&new_generation(), self);
            if self.rdcss_root(&root, &expected, renewed) {
                return root;
            }
        }
    }

    /// Swings the root to a fresh empty trie.
    pub(crate) fn clear(&self) {
        loop {
            let root = self.read_root(false);
            let expected = root.gcas_read(self);
            if self.rdcss_root(&root, &expected, INode::new_root()) {
                return;
            }
        }
    }
}

impl<K: Eq + 'static, V: 'static> RawTrie<K, V> {
    pub(crate) fn lookup<Q>(&self, key: &Q, hash: u32) -> Option<Arc<SNode<K, V>>>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        'restart: loop {
            let mut inode = self.read_root(false);
            let start_gen = inode.generation.clone();
            let mut parent: Option<Arc<INode<K, V>>> = None;
            let mut level = 0;

            loop {
                let m = inode.gcas_read(self);
                match &m.kind {
                    Kind::Compressed(cn) => {
                        let (flag, pos) = flag_pos(hash, level, cn.bitmap);
                        if cn.bitmap & flag == 0 {
                            return None;
                        }
                        match &cn.array[pos] {
                            Branch::Indirection(sub) => {
                                if self.read_only || same_gen(&sub.generation, &start_gen) {
                                    let next = Arc::clone(sub);
                                    parent = Some(inode);
                                    inode = next;
                                    level += LEVEL_BITS;
                                    continue;
                                }
                                log::trace!("lookup: renewing level {} into current generation", level);
                                let renewed = cn.renewed(&start_gen, self);
                                if inode.gcas(&m, MainNode::new(Kind::Compressed(renewed)), self) {
                                    continue;
                                }
                                continue 'restart;
                            }
                            Branch::Singleton(sn) => {
                                return sn.matches(hash, key).then(|| Arc::clone(sn));
                            }
                        }
                    }
                    Kind::Tomb(sn) => {
                        if self.read_only {
                            return sn.matches(hash, key).then(|| Arc::clone(sn));
                        }
                        self.clean_above(parent.as_ref(), level);
                        continue 'restart;
                    }
                    Kind::List(bucket) => {
                        return bucket.get(key).cloned();
                    }
                }
            }
        }
    }

    /// Conditional insert of `sn`.
    ///
    /// Returns the leaf that was overwritten. For [`Cond::IfAbsent`] a
    /// present key is returned untouched instead.
    pub(crate) fn insert_if(
        &self,
        sn: Arc<SNode<K, V>>,
        cond: Cond<'_, V>,
    ) -> Option<Arc<SNode<K, V>>> {
        let hash = sn.hash;

        'restart: loop {
            let mut inode = self.read_root(false);
            let start_gen = inode.generation.clone();
            let mut parent: Option<Arc<INode<K, V>>> = None;
            let mut level = 0;

            loop {
                let m = inode.gcas_read(self);
                match &m.kind {
                    Kind::Compressed(cn) => {
                        let (flag, pos) = flag_pos(hash, level, cn.bitmap);

                        if cn.bitmap & flag == 0 {
                            if !cond.writes_absent() {
                                return None;
                            }
                            let renewed;
                            let own = if same_gen(&cn.generation, &inode.generation) {
                                cn
                            } else {
                                renewed = cn.renewed(&inode.generation, self);
                                &renewed
                            };
                            let grown = own.inserted_at(pos, flag, Branch::Singleton(Arc::clone(&sn)), &inode.generation);
                            if inode.gcas(&m, MainNode::new(Kind::Compressed(grown)), self) {
                                return None;
                            }
                            if self.still_current(&start_gen) {
                                continue;
                            }
                            continue 'restart;
                        }

                        match &cn.array[pos] {
                            Branch::Indirection(sub) => {
                                if same_gen(&sub.generation, &start_gen) {
                                    let next = Arc::clone(sub);
                                    parent = Some(inode);
                                    inode = next;
                                    level += LEVEL_BITS;
                                    continue;
                                }
                                log::trace!("insert: renewing level {} into current generation", level);
                                let renewed = cn.renewed(&start_gen, self);
                                if inode.gcas(&m, MainNode::new(Kind::Compressed(renewed)), self) {
                                    continue;
                                }
                                continue 'restart;
                            }
                            Branch::Singleton(existing) if existing.matches(hash, &sn.key) => {
                                if !cond.writes_present(&existing.value) {
                                    return match cond {
                                        Cond::IfAbsent => Some(Arc::clone(existing)),
                                        _ => None,
                                    };
                                }
                                let updated = cn.updated_at(pos, Branch::Singleton(Arc::clone(&sn)), &inode.generation);
                                if inode.gcas(&m, MainNode::new(Kind::Compressed(updated)), self) {
                                    return Some(Arc::clone(existing));
                                }
                                if self.still_current(&start_gen) {
                                    continue;
                                }
                                continue 'restart;
                            }
                            Branch::Singleton(existing) => {
                                if !cond.writes_absent() {
                                    return None;
                                }
                                let renewed;
                                let own = if same_gen(&cn.generation, &inode.generation) {
                                    cn
                                } else {
                                    renewed = cn.renewed(&inode.generation, self);
                                    &renewed
                                };
                                let pair = dual(Arc::clone(existing), Arc::clone(&sn), level + LEVEL_BITS, &inode.generation);
                                let sub = INode::new(MainNode::new(pair), inode.generation.clone());
                                let deeper = own.updated_at(pos, Branch::Indirection(sub), &inode.generation);
                                if inode.gcas(&m, MainNode::new(Kind::Compressed(deeper)), self) {
                                    return None;
                                }
                                if self.still_current(&start_gen) {
                                    continue;
                                }
                                continue 'restart;
                            }
                        }
                    }
                    Kind::Tomb(_) => {
                        self.clean_above(parent.as_ref(), level);
                        continue 'restart;
                    }
                    Kind::List(bucket) => {
                        let existing = bucket.get(&sn.key);
                        let writes = match existing {
                            Some(current) => cond.writes_present(&current.value),
                            None => cond.writes_absent(),
                        };
                        if !writes {
                            return match cond {
                                Cond::IfAbsent => existing.cloned(),
                                _ => None,
                            };
                        }
                        let grown = bucket.inserted(Arc::clone(&sn));
                        if inode.gcas(&m, MainNode::new(Kind::List(grown)), self) {
                            return existing.cloned();
                        }
                        if self.still_current(&start_gen) {
                            continue;
                        }
                        continue 'restart;
                    }
                }
            }
        }
    }

    /// Removes `key` if present and, when `admits` is given, only if its
    /// current value satisfies it. Returns the removed leaf.
    pub(crate) fn remove<Q>(
        &self,
        key: &Q,
        hash: u32,
        admits: Option<&dyn Fn(&V) -> bool>,
    ) -> Option<Arc<SNode<K, V>>>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        'restart: loop {
            let mut inode = self.read_root(false);
            let start_gen = inode.generation.clone();
            let mut path: Vec<Arc<INode<K, V>>> = Vec::new();
            let mut level = 0;

            loop {
                let m = inode.gcas_read(self);
                match &m.kind {
                    Kind::Compressed(cn) => {
                        let (flag, pos) = flag_pos(hash, level, cn.bitmap);
                        if cn.bitmap & flag == 0 {
                            return None;
                        }
                        match &cn.array[pos] {
                            Branch::Indirection(sub) => {
                                if same_gen(&sub.generation, &start_gen) {
                                    let next = Arc::clone(sub);
                                    path.push(inode);
                                    inode = next;
                                    level += LEVEL_BITS;
                                    continue;
                                }
                                log::trace!("remove: renewing level {} into current generation", level);
                                let renewed = cn.renewed(&start_gen, self);
                                if inode.gcas(&m, MainNode::new(Kind::Compressed(renewed)), self) {
                                    continue;
                                }
                                continue 'restart;
                            }
                            Branch::Singleton(sn) => {
                                if !sn.matches(hash, key) || !admits.is_none_or(|f| f(&sn.value)) {
                                    return None;
                                }
                                let shrunk = cn.removed_at(pos, flag, &inode.generation).to_contracted(level);
                                if inode.gcas(&m, MainNode::new(shrunk), self) {
                                    let removed = Arc::clone(sn);
                                    self.clean_parents(path, inode, hash, level, &start_gen);
                                    return Some(removed);
                                }
                                if self.still_current(&start_gen) {
                                    continue;
                                }
                                continue 'restart;
                            }
                        }
                    }
                    Kind::Tomb(_) => {
                        self.clean_above(path.last(), level);
                        continue 'restart;
                    }
                    Kind::List(bucket) => {
                        let Some(existing) = bucket.get(key) else {
                            return None;
                        };
                        if !admits.is_none_or(|f| f(&existing.value)) {
                            return None;
                        }
                        let Some(rest) = bucket.removed(key) else {
                            fatal(TrieError::IllegalState("bucket lost a key it just reported"));
                        };
                        let shrunk = match rest.single() {
                            Some(last) => Kind::Tomb(Arc::clone(last)),
                            None if rest.len() >= 2 => Kind::List(rest),
                            None => fatal(TrieError::IllegalState("collision bucket emptied")),
                        };
                        if inode.gcas(&m, MainNode::new(shrunk), self) {
                            let removed = Arc::clone(existing);
                            self.clean_parents(path, inode, hash, level, &start_gen);
                            return Some(removed);
                        }
                        if self.still_current(&start_gen) {
                            continue;
                        }
                        continue 'restart;
                    }
                }
            }
        }
    }

    /// Compacts the parent of an indirection found holding a tombstone.
    fn clean_above(&self, parent: Option<&Arc<INode<K, V>>>, level: u32) {
        match parent {
            Some(parent) => self.clean(parent, level - LEVEL_BITS),
            None => fatal(TrieError::IllegalState("tombstone at the root")),
        }
    }

    /// Eager compaction after a removal: while the indirection just written
    /// holds a tombstone, fold it into its parent and move one level up.
    fn clean_parents(
        &self,
        mut path: Vec<Arc<INode<K, V>>>,
        mut inode: Arc<INode<K, V>>,
        hash: u32,
        mut level: u32,
        start_gen: &Generation,
    ) {
        while let Some(parent) = path.pop() {
            let m = inode.gcas_read(self);
            let Kind::Tomb(tomb) = &m.kind else {
                return;
            };
            level -= LEVEL_BITS;
            self.clean_parent(&parent, &inode, tomb, hash, level, start_gen);
            inode = parent;
        }
    }

    /// Replaces `parent`'s slot for `inode` with the resurrected `tomb`.
    ///
    /// Best effort: retried only while the root generation is still the one
    /// the removal started in. An abandoned attempt leaves the tombstone for
    /// the next traversal to fold.
    fn clean_parent(
        &self,
        parent: &Arc<INode<K, V>>,
        inode: &Arc<INode<K, V>>,
        tomb: &Arc<SNode<K, V>>,
        hash: u32,
        level: u32,
        start_gen: &Generation,
    ) {
        loop {
            let pm = parent.gcas_read(self);
            let Kind::Compressed(cn) = &pm.kind else {
                return;
            };
            let (flag, pos) = flag_pos(hash, level, cn.bitmap);
            if cn.bitmap & flag == 0 {
                return;
            }
            match &cn.array[pos] {
                Branch::Indirection(sub) if Arc::ptr_eq(sub, inode) => {}
                _ => return,
            }

            let folded = cn
                .updated_at(pos, Branch::Singleton(Arc::clone(tomb)), &inode.generation)
                .to_contracted(level);
            if parent.gcas(&pm, MainNode::new(folded), self) {
                return;
            }
            if !self.still_current(start_gen) {
                log::trace!("remove: generation changed, leaving tombstone at level {}", level + LEVEL_BITS);
                return;
            }
        }
    }
}

