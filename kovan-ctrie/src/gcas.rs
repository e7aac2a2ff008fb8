//! Generalized compare-and-swap (GCAS) on indirection nodes.
//!
//! A plain CAS on [`INode::main`] cannot tell whether a snapshot was taken
//! between reading the old value and installing the new one. GCAS splits the
//! update in two:
//!
//! 1. write: the new main node is published with `prev = Pending(old)`;
//! 2. finalize: if the indirection still belongs to the root's generation the
//!    `prev` slot is cleared (commit), otherwise it is replaced by
//!    `Failed(old)` and the indirection is rolled back to `old` (abort).
//!
//! Any thread that reads a main node with a non-empty `prev` drives step 2
//! before using it, so a stalled writer never blocks anyone.

use crate::node::{Generation, INode, MainNode, Prev, same_gen};
use crate::trie::RawTrie;
use alloc::sync::Arc;

impl<K: 'static, V: 'static> INode<K, V> {
    /// Returns the committed main node, finishing any transition in flight.
    #[inline]
    pub(crate) fn gcas_read(&self, ct: &RawTrie<K, V>) -> Arc<MainNode<K, V>> {
        let m = self.main.load();
        if m.prev.load().is_none() {
            m
        } else {
            self.gcas_complete(m, ct)
        }
    }

    /// Installs `new` in place of `old`.
    ///
    /// Returns `true` only if the transition committed. On `false` the
    /// indirection holds whatever committed value won, possibly `old` again.
    pub(crate) fn gcas(
        &self,
        old: &Arc<MainNode<K, V>>,
        new: Arc<MainNode<K, V>>,
        ct: &RawTrie<K, V>,
    ) -> bool {
        new.prev.store(Some(Arc::new(Prev::Pending(Arc::clone(old)))));
        if self.main.compare_and_set(old, Arc::clone(&new)) {
            self.gcas_complete(Arc::clone(&new), ct);
            new.prev.load().is_none()
        } else {
            false
        }
    }

    fn gcas_complete(&self, mut m: Arc<MainNode<K, V>>, ct: &RawTrie<K, V>) -> Arc<MainNode<K, V>> {
        loop {
            let prev = m.prev.load();
            let root = ct.read_root(true);

            let Some(state) = prev else {
                return m;
            };

            match &*state {
                Prev::Failed(rollback) => {
                    if self.main.compare_and_set(&m, Arc::clone(rollback)) {
                        return Arc::clone(rollback);
                    }
                    m = self.main.load();
                }
                Prev::Pending(replaced) => {
                    if same_gen(&root.generation, &self.generation) && !ct.read_only {
                        if m.prev.compare_and_set(&Some(Arc::clone(&state)), None) {
                            return m;
                        }
                        // lost the race on prev; re-examine the same node
                    } else {
                        log::trace!("gcas: generation changed underneath transition, aborting");
                        let failed = Arc::new(Prev::Failed(Arc::clone(replaced)));
                        m.prev.compare_and_set(&Some(Arc::clone(&state)), Some(failed));
                        m = self.main.load();
                    }
                }
            }
        }
    }

    /// Same committed content behind a new indirection in `generation`.
    pub(crate) fn copy_to_gen(&self, generation: &Generation, ct: &RawTrie<K, V>) -> Arc<Self> {
        INode::new(self.gcas_read(ct), generation.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{CNode, Kind, new_generation};

    fn empty_main(generation: &Generation) -> Arc<MainNode<u32, u32>> {
        MainNode::new(Kind::Compressed(CNode::empty(generation.clone())))
    }

    #[test]
    fn test_commit_in_current_generation() {
        let ct = RawTrie::<u32, u32>::new();
        let root = ct.read_root(false);

        let old = root.gcas_read(&ct);
        let new = empty_main(&root.generation);
        assert!(root.gcas(&old, Arc::clone(&new), &ct));
        assert!(new.prev.load().is_none());
        assert!(Arc::ptr_eq(&root.gcas_read(&ct), &new));
    }

    #[test]
    fn test_stale_expected_value_fails() {
        let ct = RawTrie::<u32, u32>::new();
        let root = ct.read_root(false);

        let stale = empty_main(&root.generation);
        assert!(!root.gcas(&stale, empty_main(&root.generation), &ct));
    }

    #[test]
    fn test_foreign_generation_is_rolled_back() {
        let ct = RawTrie::<u32, u32>::new();
        let root = ct.read_root(false);

        // an indirection from an older epoch than the live root
        let orphan_gen = new_generation();
        let orphan = INode::new(empty_main(&orphan_gen), orphan_gen.clone());
        let old = orphan.gcas_read(&ct);
        let new = empty_main(&orphan_gen);

        assert!(!same_gen(&orphan.generation, &root.generation));
        assert!(!orphan.gcas(&old, Arc::clone(&new), &ct));
        assert!(Arc::ptr_eq(&orphan.gcas_read(&ct), &old));
        assert!(matches!(new.prev.load().as_deref(), Some(Prev::Failed(_))));
    }

    #[test]
    fn test_reader_finishes_pending_commit() {
        let ct = RawTrie::<u32, u32>::new();
        let root = ct.read_root(false);

        // simulate a writer that stalled right after its CAS
        let old = root.gcas_read(&ct);
        let new = empty_main(&root.generation);
        new.prev.store(Some(Arc::new(Prev::Pending(Arc::clone(&old)))));
        assert!(root.main.compare_and_set(&old, Arc::clone(&new)));

        assert!(Arc::ptr_eq(&root.gcas_read(&ct), &new));
        assert!(new.prev.load().is_none());
    }
}
