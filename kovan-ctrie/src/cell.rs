//! `AtomCell<P>`: the single mutable word behind every indirection node,
//! every pending GCAS transition and the trie root.
//!
//! The payload `P` is a reference-counted handle (`Arc<T>`, `Option<Arc<T>>`
//! or an enum of those). The cell itself only ever stores a pointer to a heap
//! slot holding one payload; swapping the cell swaps slots, and the replaced
//! slot is handed to kovan for deferred destruction. Readers clone the payload
//! while pinned, so they walk away with their own strong reference before the
//! slot can be reclaimed.
//!
//! Compare-and-set compares payload *identity* ([`SameRef`]), which is the
//! only equality the trie protocols need.

use alloc::boxed::Box;
use alloc::sync::Arc;
use core::sync::atomic::Ordering;
use kovan::{Atomic, RetiredNode, Shared, pin, retire};

/// Reference equality for cell payloads.
pub(crate) trait SameRef {
    fn same_ref(&self, other: &Self) -> bool;
}

impl<T> SameRef for Arc<T> {
    #[inline]
    fn same_ref(&self, other: &Self) -> bool {
        Arc::ptr_eq(self, other)
    }
}

impl<T: SameRef> SameRef for Option<T> {
    #[inline]
    fn same_ref(&self, other: &Self) -> bool {
        match (self, other) {
            (None, None) => true,
            (Some(a), Some(b)) => a.same_ref(b),
            _ => false,
        }
    }
}

// `retire()` writes its bookkeeping into the first bytes of the allocation,
// so the RetiredNode has to sit at offset 0.
#[repr(C)]
struct Slot<P> {
    _retired: RetiredNode,
    payload: P,
}

impl<P> Slot<P> {
    fn boxed(payload: P) -> *mut Self {
        Box::into_raw(Box::new(Self {
            _retired: RetiredNode::new(),
            payload,
        }))
    }
}

/// Atomically swappable reference with kovan-backed reclamation.
pub(crate) struct AtomCell<P> {
    inner: Atomic<Slot<P>>,
}

impl<P: SameRef + Clone + 'static> AtomCell<P> {
    pub(crate) fn new(payload: P) -> Self {
        Self {
            inner: Atomic::new(Slot::boxed(payload)),
        }
    }

    /// Returns a strong copy of the current payload.
    #[inline]
    pub(crate) fn load(&self) -> P {
        let guard = pin();
        let current = self.inner.load(Ordering::Acquire, &guard);
        // SAFETY: the cell never holds null and the slot stays allocated
        // while `guard` is alive.
        unsafe { current.deref().payload.clone() }
    }

    /// Unconditionally installs `payload`.
    pub(crate) fn store(&self, payload: P) {
        let fresh = Slot::boxed(payload);
        let guard = pin();
        // SAFETY: `fresh` was just allocated by `Slot::boxed`.
        let fresh = unsafe { Shared::from_raw(fresh) };
        let old = self.inner.swap(fresh, Ordering::AcqRel, &guard);
        // SAFETY: the swapped-out slot came from `Slot::boxed`, carries its
        // RetiredNode at offset 0 and is now unreachable from the cell.
        unsafe { retire(old.as_raw() as *mut Slot<P>) };
    }

    /// Installs `payload` if the cell still refers to `expected`.
    ///
    /// Succeeds iff at the linearization point the cell's payload is the same
    /// reference as `expected`. A concurrent swap to an identical payload in a
    /// different slot is not a failure; the loop re-checks and tries again.
    pub(crate) fn compare_and_set(&self, expected: &P, payload: P) -> bool {
        let fresh = Slot::boxed(payload);
        let guard = pin();

        loop {
            let current = self.inner.load(Ordering::Acquire, &guard);
            // SAFETY: non-null, protected by `guard`.
            let held = unsafe { &current.deref().payload };
            if !held.same_ref(expected) {
                // SAFETY: `fresh` was never published.
                unsafe { drop(Box::from_raw(fresh)) };
                return false;
            }

            match self.inner.compare_exchange(
                current,
                // SAFETY: `fresh` was allocated by `Slot::boxed`.
                unsafe { Shared::from_raw(fresh) },
                Ordering::AcqRel,
                Ordering::Acquire,
                &guard,
            ) {
                Ok(old) => {
                    // SAFETY: `old` is unreachable from the cell now and was
                    // allocated by `Slot::boxed`.
                    unsafe { retire(old.as_raw() as *mut Slot<P>) };
                    return true;
                }
                Err(_) => continue,
            }
        }
    }
}

impl<P> Drop for AtomCell<P> {
    fn drop(&mut self) {
        // &mut self: no reader can still be inside this cell.
        let guard = pin();
        let current = self.inner.load(Ordering::Relaxed, &guard);
        let raw = current.as_raw() as *mut Slot<P>;
        if !raw.is_null() {
            // SAFETY: allocated by `Slot::boxed`, owned exclusively here.
            unsafe { drop(Box::from_raw(raw)) };
        }
    }
}

// SAFETY: the cell hands out clones of `P` only; sharing it is as safe as
// sharing `P` itself.
unsafe impl<P: Send + Sync> Send for AtomCell<P> {}
unsafe impl<P: Send + Sync> Sync for AtomCell<P> {}
