//! A narrow `unsafe impl Sync` pointer wrapper enabling concurrent mutable access to
//! color-disjoint body/constraint arrays, mirroring the `AtomicPtr` + `transmute`
//! pattern in `parallel_island_solver.rs`'s `ThreadContext` (which hands every spawned task a
//! raw pointer to the shared body-set storage rather than splitting it into per-task slices).
//!
//! Safety here rests entirely on the graph-coloring invariant (§3 invariant 2: within one
//! non-overflow color, no two blocks ever reference the same body) and on the block scheduler's
//! exactly-once CAS claim (§3 invariant 3): two workers holding a [`RacyMut`] concurrently never
//! touch the same element, so the aliasing this type allows past the borrow checker never
//! actually happens at runtime.

/// An unsynchronized raw pointer, usable from multiple worker threads at once.
///
/// Cloning is cheap (it's a pointer copy); every clone still points at the same underlying data.
pub(crate) struct RacyMut<T: ?Sized>(*mut T);

unsafe impl<T: ?Sized> Send for RacyMut<T> {}
unsafe impl<T: ?Sized> Sync for RacyMut<T> {}

impl<T: ?Sized> RacyMut<T> {
    pub(crate) fn new(value: &mut T) -> Self {
        Self(value as *mut T)
    }

    /// # Safety
    /// The caller must ensure this call never aliases a live `&mut` reference obtained from
    /// another [`RacyMut`] pointing at the same element. Callers in this crate uphold that by
    /// only ever dereferencing within one graph color's body-disjoint constraint set.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn get(&self) -> &mut T {
        &mut *self.0
    }
}

impl<T: ?Sized> Clone for RacyMut<T> {
    fn clone(&self) -> Self {
        Self(self.0)
    }
}

impl<T: ?Sized> Copy for RacyMut<T> {}
