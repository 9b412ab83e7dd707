//! A scoped, LIFO-disciplined allocation arena (§5, "Memory").
//!
//! All per-step allocations — stage arrays, block arrays, joint/contact pointer arrays, the
//! SIMD constraint scratch slab, the bullet-body array — are carved out of one [`Arena`] per
//! [`Solve`](crate::solver::solve) call and released in exactly the reverse order they were
//! requested. The arena itself is backed by the ordinary global allocator (this crate does not
//! vendor a pointer-bumping allocator): what matters for determinism is the *discipline*, not
//! the allocation strategy, per §9 ("implementations using general allocators must still match
//! the lifetime pattern"). [`Arena::begin_frame`]/[`Arena::end_frame`] assert that discipline
//! in debug builds; releasing out of order is a programmer error (§7), not a runtime failure.

/// An open allocation scope. Must be closed with [`Arena::end_frame`] before any
/// previously-opened frame closes (strict LIFO).
#[derive(Debug)]
pub struct ArenaFrame {
    id: u64,
}

/// A scoped bump allocator enforcing LIFO release order.
#[derive(Debug, Default)]
pub struct Arena {
    next_id: u64,
    open: Vec<u64>,
    high_water_mark: usize,
}

impl Arena {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            open: Vec::new(),
            high_water_mark: 0,
        }
    }

    /// Opens a new allocation scope.
    pub fn begin_frame(&mut self) -> ArenaFrame {
        let id = self.next_id;
        self.next_id += 1;
        self.open.push(id);
        self.high_water_mark = self.high_water_mark.max(self.open.len());
        ArenaFrame { id }
    }

    /// Closes `frame`. Panics (debug-only) if `frame` is not the innermost open frame — this
    /// is the LIFO-order assertion, not a recoverable error (§7).
    pub fn end_frame(&mut self, frame: ArenaFrame) {
        let top = self.open.pop();
        debug_assert_eq!(
            top,
            Some(frame.id),
            "Arena frames must be released in strict LIFO order"
        );
    }

    /// Allocates a vector of `len` elements, each produced by `init`. Conceptually carved out
    /// of the arena's current frame; there is no explicit frame parameter because the caller is
    /// expected to only ever allocate within the scope most recently opened with
    /// [`Arena::begin_frame`] (checked by `end_frame`, not by this call, to keep the hot path
    /// allocation-count free of bookkeeping).
    pub fn alloc_vec_with<T>(&self, len: usize, mut init: impl FnMut(usize) -> T) -> Vec<T> {
        let mut v = Vec::with_capacity(len);
        for i in 0..len {
            v.push(init(i));
        }
        v
    }

    pub fn alloc_vec_default<T: Default>(&self, len: usize) -> Vec<T> {
        self.alloc_vec_with(len, |_| T::default())
    }

    /// Maximum nesting depth of frames observed so far, exposed for test introspection only.
    pub fn high_water_mark(&self) -> usize {
        self.high_water_mark
    }

    pub fn is_fully_released(&self) -> bool {
        self.open.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_frames_close_in_lifo_order() {
        let mut arena = Arena::new();
        let outer = arena.begin_frame();
        let inner = arena.begin_frame();
        arena.end_frame(inner);
        arena.end_frame(outer);
        assert!(arena.is_fully_released());
        assert_eq!(arena.high_water_mark(), 2);
    }

    #[test]
    #[should_panic(expected = "LIFO order")]
    fn releasing_out_of_order_panics_in_debug() {
        let mut arena = Arena::new();
        let outer = arena.begin_frame();
        let _inner = arena.begin_frame();
        arena.end_frame(outer);
    }

    #[test]
    fn alloc_vec_default_produces_requested_length() {
        let arena = Arena::new();
        let v: Vec<u32> = arena.alloc_vec_default(10);
        assert_eq!(v.len(), 10);
        assert!(v.iter().all(|&x| x == 0));
    }
}
