//! Restricted double-compare single-swap (RDCSS) on the trie root.
//!
//! Snapshots must replace the root only if both the root indirection *and*
//! its committed main node are still the ones they observed. The root cell
//! therefore temporarily holds a [`Descriptor`] naming the expected pair and
//! the replacement; whoever reads the descriptor next resolves it by
//! re-checking the main node and swinging the root forward or back.
//!
//! The outcome is fixed on the descriptor before the root moves, so the
//! initiator learns whether its swap committed even when a helper finished
//! it.

use crate::cell::SameRef;
use crate::node::{INode, MainNode};
use crate::trie::RawTrie;
use alloc::sync::Arc;
use core::sync::atomic::{AtomicU8, Ordering};

/// An RDCSS in flight.
pub(crate) struct Descriptor<K, V> {
    old: Arc<INode<K, V>>,
    expected: Arc<MainNode<K, V>>,
    new: Arc<INode<K, V>>,
    state: AtomicU8,
}

const UNDECIDED: u8 = 0;
const COMMITTED: u8 = 1;
const ABORTED: u8 = 2;

impl<K, V> Descriptor<K, V> {
    fn new(old: Arc<INode<K, V>>, expected: Arc<MainNode<K, V>>, new: Arc<INode<K, V>>) -> Arc<Self> {
        Arc::new(Self {
            old,
            expected,
            new,
            state: AtomicU8::new(UNDECIDED),
        })
    }

    /// Records `outcome` unless another thread got there first; returns the
    /// outcome that stuck.
    fn decide(&self, outcome: u8) -> u8 {
        match self
            .state
            .compare_exchange(UNDECIDED, outcome, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => outcome,
            Err(decided) => decided,
        }
    }

    fn committed(&self) -> bool {
        self.state.load(Ordering::Acquire) == COMMITTED
    }
}

/// Content of the root cell.
pub(crate) enum Root<K, V> {
    Node(Arc<INode<K, V>>),
    Pending(Arc<Descriptor<K, V>>),
}

impl<K, V> Clone for Root<K, V> {
    fn clone(&self) -> Self {
        match self {
            Root::Node(inode) => Root::Node(Arc::clone(inode)),
            Root::Pending(desc) => Root::Pending(Arc::clone(desc)),
        }
    }
}

impl<K, V> SameRef for Root<K, V> {
    fn same_ref(&self, other: &Self) -> bool {
        match (self, other) {
            (Root::Node(a), Root::Node(b)) => Arc::ptr_eq(a, b),
            (Root::Pending(a), Root::Pending(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl<K: 'static, V: 'static> RawTrie<K, V> {
    /// Reads the root indirection, resolving a pending descriptor first.
    ///
    /// With `abort` set, an undecided descriptor is rolled back to its old
    /// root without inspecting its main node. GCAS finalization reads the root this way so it never has to
    /// re-enter GCAS through the descriptor's main-node check.
    #[inline]
    pub(crate) fn read_root(&self, abort: bool) -> Arc<INode<K, V>> {
        match self.root.load() {
            Root::Node(inode) => inode,
            Root::Pending(_) => self.rdcss_complete(abort),
        }
    }

    fn rdcss_complete(&self, abort: bool) -> Arc<INode<K, V>> {
        loop {
            let current = self.root.load();
            let desc = match &current {
                Root::Node(inode) => return Arc::clone(inode),
                Root::Pending(desc) => Arc::clone(desc),
            };

            let outcome = match desc.state.load(Ordering::Acquire) {
                UNDECIDED if abort => desc.decide(ABORTED),
                UNDECIDED => {
                    let old_main = desc.old.gcas_read(self);
                    if Arc::ptr_eq(&old_main, &desc.expected) {
                        desc.decide(COMMITTED)
                    } else {
                        desc.decide(ABORTED)
                    }
                }
                decided => decided,
            };

            let target = if outcome == COMMITTED { &desc.new } else { &desc.old };
            if self.root.compare_and_set(&current, Root::Node(Arc::clone(target))) {
                if outcome != COMMITTED {
                    log::trace!("rdcss: descriptor aborted (finalizing reader: {})", abort);
                }
                return Arc::clone(target);
            }
        }
    }

    /// Swaps the root from `old` to `new` provided `old` still commits to
    /// `expected`. Returns whether the swap committed, whoever completed it.
    pub(crate) fn rdcss_root(
        &self,
        old: &Arc<INode<K, V>>,
        expected: &Arc<MainNode<K, V>>,
        new: Arc<INode<K, V>>,
    ) -> bool {
        let desc = Descriptor::new(Arc::clone(old), Arc::clone(expected), new);

        if self
            .root
            .compare_and_set(&Root::Node(Arc::clone(old)), Root::Pending(Arc::clone(&desc)))
        {
            self.rdcss_complete(false);
            desc.committed()
        } else {
            false
        }
    }
}
