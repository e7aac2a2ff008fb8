//! Node model of the hash trie.
//!
//! Everything here is immutable once published. The only mutable words are
//! [`INode::main`] and the GCAS `prev` slot carried by every [`MainNode`]; both
//! are [`AtomCell`]s and are driven by the GCAS engine in `gcas.rs`.
//!
//! Transforms never edit in place: each one allocates the replacement node
//! and the caller installs it with GCAS.
//!
//! ```text
//!  INode ──main──▶ MainNode { Compressed | Tomb | List }
//!                      │
//!                      └─ Compressed: bitmap + [Branch]   Branch = INode | SNode
//! ```

use crate::cell::AtomCell;
use crate::listmap::ListMap;
use crate::trie::RawTrie;
use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::borrow::Borrow;

/// Hash bits consumed per trie level.
pub(crate) const LEVEL_BITS: u32 = 5;
/// Mask extracting one level's slice of the hash.
pub(crate) const LEVEL_MASK: u32 = 0x1f;
/// First level at which a 32-bit hash has no bits left; collisions below
/// this point are kept in a [`ListMap`].
pub(crate) const MAX_LEVEL: u32 = 35;

/// Copy-on-write epoch marker. Only its identity matters.
pub(crate) struct Gen {
    _private: (),
}

pub(crate) type Generation = Arc<Gen>;

pub(crate) fn new_generation() -> Generation {
    Arc::new(Gen { _private: () })
}

#[inline]
pub(crate) fn same_gen(a: &Generation, b: &Generation) -> bool {
    Arc::ptr_eq(a, b)
}

/// Bitmap flag and dense array position of `hash` at `level`.
#[inline]
pub(crate) fn flag_pos(hash: u32, level: u32, bitmap: u32) -> (u32, usize) {
    debug_assert!(level < 32, "compressed node below the hash budget");
    let idx = (hash >> level) & LEVEL_MASK;
    let flag = 1u32 << idx;
    let pos = (bitmap & (flag - 1)).count_ones() as usize;
    (flag, pos)
}

/// Leaf: one key, one value and the key's trie hash.
pub(crate) struct SNode<K, V> {
    pub(crate) hash: u32,
    pub(crate) key: K,
    pub(crate) value: V,
}

impl<K, V> SNode<K, V> {
    pub(crate) fn new(key: K, value: V, hash: u32) -> Arc<Self> {
        Arc::new(Self { hash, key, value })
    }

    #[inline]
    pub(crate) fn matches<Q>(&self, hash: u32, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        self.hash == hash && self.key.borrow() == key
    }
}

/// Element of a compressed node's array.
pub(crate) enum Branch<K, V> {
    Indirection(Arc<INode<K, V>>),
    Singleton(Arc<SNode<K, V>>),
}

impl<K, V> Clone for Branch<K, V> {
    fn clone(&self) -> Self {
        match self {
            Branch::Indirection(inode) => Branch::Indirection(Arc::clone(inode)),
            Branch::Singleton(sn) => Branch::Singleton(Arc::clone(sn)),
        }
    }
}

/// Mutable vertex of the trie; the unit of compare-and-swap.
pub(crate) struct INode<K, V> {
    pub(crate) main: AtomCell<Arc<MainNode<K, V>>>,
    pub(crate) generation: Generation,
}

impl<K: 'static, V: 'static> INode<K, V> {
    pub(crate) fn new(main: Arc<MainNode<K, V>>, generation: Generation) -> Arc<Self> {
        Arc::new(Self {
            main: AtomCell::new(main),
            generation,
        })
    }

    /// Fresh root: an indirection over an empty compressed node, both tagged
    /// with a brand-new generation.
    pub(crate) fn new_root() -> Arc<Self> {
        let generation = new_generation();
        let empty = MainNode::new(Kind::Compressed(CNode::empty(generation.clone())));
        Self::new(empty, generation)
    }
}

/// What an indirection node can point to.
pub(crate) enum Kind<K, V> {
    Compressed(CNode<K, V>),
    /// Sole surviving leaf of a contracted node, waiting to be folded into
    /// the parent.
    Tomb(Arc<SNode<K, V>>),
    List(ListMap<K, V>),
}

/// State of an in-flight GCAS, stored in [`MainNode::prev`].
pub(crate) enum Prev<K, V> {
    /// Transition written but not yet committed; holds the value it replaced.
    Pending(Arc<MainNode<K, V>>),
    /// Transition abandoned; readers roll the indirection back to this value.
    Failed(Arc<MainNode<K, V>>),
}

pub(crate) struct MainNode<K, V> {
    pub(crate) kind: Kind<K, V>,
    pub(crate) prev: AtomCell<Option<Arc<Prev<K, V>>>>,
}

impl<K: 'static, V: 'static> MainNode<K, V> {
    pub(crate) fn new(kind: Kind<K, V>) -> Arc<Self> {
        Arc::new(Self {
            kind,
            prev: AtomCell::new(None),
        })
    }
}

/// 32-way sparse fan-out node.
pub(crate) struct CNode<K, V> {
    pub(crate) bitmap: u32,
    pub(crate) array: Box<[Branch<K, V>]>,
    pub(crate) generation: Generation,
}

impl<K: 'static, V: 'static> CNode<K, V> {
    pub(crate) fn new(bitmap: u32, array: Vec<Branch<K, V>>, generation: Generation) -> Self {
        debug_assert_eq!(bitmap.count_ones() as usize, array.len());
        Self {
            bitmap,
            array: array.into_boxed_slice(),
            generation,
        }
    }

    pub(crate) fn empty(generation: Generation) -> Self {
        Self::new(0, Vec::new(), generation)
    }

    pub(crate) fn inserted_at(
        &self,
        pos: usize,
        flag: u32,
        branch: Branch<K, V>,
        generation: &Generation,
    ) -> Self {
        let mut array = Vec::with_capacity(self.array.len() + 1);
        array.extend_from_slice(&self.array[..pos]);
        array.push(branch);
        array.extend_from_slice(&self.array[pos..]);
        Self::new(self.bitmap | flag, array, generation.clone())
    }

    pub(crate) fn updated_at(&self, pos: usize, branch: Branch<K, V>, generation: &Generation) -> Self {
        let mut array = self.array.to_vec();
        array[pos] = branch;
        Self::new(self.bitmap, array, generation.clone())
    }

    pub(crate) fn removed_at(&self, pos: usize, flag: u32, generation: &Generation) -> Self {
        let mut array = self.array.to_vec();
        array.remove(pos);
        Self::new(self.bitmap ^ flag, array, generation.clone())
    }

    /// Shallow copy into `generation`: direct indirection children are re-wrapped in
    /// the new generation, anything deeper is renewed when first touched.
    pub(crate) fn renewed(&self, generation: &Generation, ct: &RawTrie<K, V>) -> Self {
        let array = self
            .array
            .iter()
            .map(|branch| match branch {
                Branch::Indirection(inode) => Branch::Indirection(inode.copy_to_gen(generation, ct)),
                Branch::Singleton(_) => branch.clone(),
            })
            .collect();
        Self::new(self.bitmap, array, generation.clone())
    }

    /// Folds a single-leaf node below the root into a tombstone.
    pub(crate) fn to_contracted(self, level: u32) -> Kind<K, V> {
        if level > 0 && self.array.len() == 1 {
            if let Branch::Singleton(sn) = &self.array[0] {
                return Kind::Tomb(Arc::clone(sn));
            }
        }
        Kind::Compressed(self)
    }

    /// Re-embeds tombstoned children as leaves, then contracts.
    pub(crate) fn to_compressed(&self, ct: &RawTrie<K, V>, level: u32, generation: &Generation) -> Kind<K, V> {
        let array = self
            .array
            .iter()
            .map(|branch| match branch {
                Branch::Indirection(inode) => resurrect(inode, ct),
                Branch::Singleton(_) => branch.clone(),
            })
            .collect();
        Self::new(self.bitmap, array, generation.clone()).to_contracted(level)
    }
}

fn resurrect<K: 'static, V: 'static>(inode: &Arc<INode<K, V>>, ct: &RawTrie<K, V>) -> Branch<K, V> {
    match &inode.gcas_read(ct).kind {
        Kind::Tomb(sn) => Branch::Singleton(Arc::clone(sn)),
        _ => Branch::Indirection(Arc::clone(inode)),
    }
}

/// Smallest subtree holding two leaves that share a slot at `level - 5`.
pub(crate) fn dual<K: Eq + 'static, V: 'static>(
    x: Arc<SNode<K, V>>,
    y: Arc<SNode<K, V>>,
    level: u32,
    generation: &Generation,
) -> Kind<K, V> {
    if level >= MAX_LEVEL {
        return Kind::List(ListMap::pair(x, y));
    }

    let x_idx = (x.hash >> level) & LEVEL_MASK;
    let y_idx = (y.hash >> level) & LEVEL_MASK;
    let bitmap = (1u32 << x_idx) | (1u32 << y_idx);

    if x_idx == y_idx {
        let deeper = MainNode::new(dual(x, y, level + LEVEL_BITS, generation));
        let sub = INode::new(deeper, generation.clone());
        Kind::Compressed(CNode::new(bitmap, alloc::vec![Branch::Indirection(sub)], generation.clone()))
    } else {
        let array = if x_idx < y_idx {
            alloc::vec![Branch::Singleton(x), Branch::Singleton(y)]
        } else {
            alloc::vec![Branch::Singleton(y), Branch::Singleton(x)]
        };
        Kind::Compressed(CNode::new(bitmap, array, generation.clone()))
    }
}
