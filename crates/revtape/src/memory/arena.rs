//! Slab-based bump allocator.

use std::alloc::{self, Layout};
use std::ptr::NonNull;

use log::debug;

use crate::config::{DEFAULT_GROWTH_FACTOR, DEFAULT_INITIAL_SLAB_BYTES, TapeConfig};

/// Alignment of every slab's base address.
const SLAB_ALIGN: usize = 16;

/// One contiguous block of raw memory owned by the arena.
#[derive(Debug)]
struct Slab {
    ptr: NonNull<u8>,
    size: usize,
}

impl Slab {
    fn new(size: usize) -> Self {
        let layout = Self::layout(size);
        // SAFETY: `size` is never zero (callers take the max with a positive
        // initial size), so the layout is valid for `alloc`.
        let raw = unsafe { alloc::alloc(layout) };
        let ptr = NonNull::new(raw).unwrap_or_else(|| alloc::handle_alloc_error(layout));
        Self { ptr, size }
    }

    fn layout(size: usize) -> Layout {
        Layout::from_size_align(size, SLAB_ALIGN).expect("slab size overflows isize")
    }

    fn contains(&self, addr: usize, used: usize) -> bool {
        let base = self.ptr.as_ptr() as usize;
        addr >= base && addr < base + used
    }
}

impl Drop for Slab {
    fn drop(&mut self) {
        // SAFETY: `ptr` was returned by `alloc` with exactly this layout.
        unsafe { alloc::dealloc(self.ptr.as_ptr(), Self::layout(self.size)) }
    }
}

/// An exact allocation position inside an [`Arena`].
///
/// Marks order lexicographically by (slab, offset), which is the order in
/// which the arena hands out memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ArenaMark {
    slab: usize,
    offset: usize,
}

/// Bump-pointer arena with bulk reclaim and checkpoint/rewind.
///
/// Memory is carved from a list of slabs. When the current slab cannot
/// satisfy a request the arena moves on to the next slab that can, and
/// allocates a new one of `max(request, last_slab * growth_factor)` bytes
/// when none is left. Slabs are kept across [`recover_all`](Arena::recover_all)
/// and [`rewind`](Arena::rewind), so a second expression of similar size
/// allocates nothing from the system.
///
/// Destructors are never run for arena contents. The typed entry point
/// [`alloc_value`](Arena::alloc_value) therefore only accepts `Copy` types.
///
/// # Example
///
/// ```
/// use revtape::memory::Arena;
///
/// let mut arena = Arena::new();
/// let mark = arena.mark();
/// let a = arena.alloc_value(1.5f64);
/// arena.rewind(mark);
/// let b = arena.alloc_value(2.5f64);
/// assert_eq!(a, b);
/// assert_eq!(arena.slab_count(), 1);
/// ```
#[derive(Debug)]
pub struct Arena {
    slabs: Vec<Slab>,
    cur: usize,
    offset: usize,
    initial_slab_bytes: usize,
    growth_factor: usize,
}

impl Arena {
    /// Create an empty arena with the default slab sizing.
    ///
    /// No memory is requested until the first allocation.
    pub fn new() -> Self {
        Self::with_sizes(DEFAULT_INITIAL_SLAB_BYTES, DEFAULT_GROWTH_FACTOR)
    }

    /// Create an empty arena using the slab sizing in `config`.
    pub fn with_config(config: &TapeConfig) -> Self {
        Self::with_sizes(config.slab_bytes(), config.growth())
    }

    fn with_sizes(initial_slab_bytes: usize, growth_factor: usize) -> Self {
        Self {
            slabs: Vec::new(),
            cur: 0,
            offset: 0,
            initial_slab_bytes: initial_slab_bytes.max(1),
            growth_factor: growth_factor.max(2),
        }
    }

    /// Allocate uninitialized memory for `layout`.
    ///
    /// The returned memory stays valid until the arena is recovered,
    /// rewound to a mark taken before this call, or dropped. Allocation
    /// failure aborts through [`std::alloc::handle_alloc_error`].
    pub fn alloc(&mut self, layout: Layout) -> NonNull<u8> {
        match self.bump(layout) {
            Some(ptr) => ptr,
            None => self.alloc_in_next_slab(layout),
        }
    }

    /// Move `value` into the arena and return a pointer to it.
    pub fn alloc_value<T: Copy>(&mut self, value: T) -> NonNull<T> {
        let ptr = self.alloc(Layout::new::<T>()).cast::<T>();
        // SAFETY: the block is freshly allocated, suitably aligned for `T`
        // and large enough to hold it.
        unsafe { ptr.as_ptr().write(value) };
        ptr
    }

    /// Copy `values` into the arena and return a pointer to the copy.
    pub fn alloc_slice_copy<T: Copy>(&mut self, values: &[T]) -> NonNull<[T]> {
        let layout = Layout::array::<T>(values.len()).expect("slice layout overflows isize");
        let ptr = self.alloc(layout).cast::<T>();
        // SAFETY: the block holds `values.len()` elements of `T`, is aligned
        // for `T`, and cannot overlap `values`, which lives outside it.
        unsafe { ptr.as_ptr().copy_from_nonoverlapping(values.as_ptr(), values.len()) };
        NonNull::slice_from_raw_parts(ptr, values.len())
    }

    /// Try to satisfy `layout` from the current slab.
    fn bump(&mut self, layout: Layout) -> Option<NonNull<u8>> {
        let slab = self.slabs.get(self.cur)?;
        let base = slab.ptr.as_ptr() as usize;
        let start = (base + self.offset).checked_next_multiple_of(layout.align())? - base;
        let end = start.checked_add(layout.size())?;
        if end > slab.size {
            return None;
        }
        self.offset = end;
        // SAFETY: `start <= end <= slab.size`, so the pointer stays inside the slab.
        Some(unsafe { NonNull::new_unchecked(slab.ptr.as_ptr().add(start)) })
    }

    fn alloc_in_next_slab(&mut self, layout: Layout) -> NonNull<u8> {
        // worst case: the whole alignment is lost to padding
        let needed = layout.size().saturating_add(layout.align());

        let mut next = if self.slabs.is_empty() { 0 } else { self.cur + 1 };
        while next < self.slabs.len() && self.slabs[next].size < needed {
            next += 1;
        }

        if next == self.slabs.len() {
            let last = self.slabs.last().map_or(0, |s| s.size);
            let size = needed
                .max(last.saturating_mul(self.growth_factor))
                .max(self.initial_slab_bytes);
            debug!(
                "arena: allocating slab {} of {} bytes ({} bytes reserved before)",
                self.slabs.len(),
                size,
                self.bytes_reserved()
            );
            self.slabs.push(Slab::new(size));
        }

        self.cur = next;
        self.offset = 0;
        self.bump(layout)
            .expect("a slab of at least size + align bytes fits the request")
    }

    /// Capture the current allocation position.
    pub fn mark(&self) -> ArenaMark {
        ArenaMark {
            slab: self.cur,
            offset: self.offset,
        }
    }

    /// Return to a position captured by [`mark`](Arena::mark).
    ///
    /// Only memory handed out after the mark becomes invalid.
    ///
    /// # Panics
    /// Panics if `mark` lies beyond the current position, which means the
    /// marks were not used in LIFO order.
    pub fn rewind(&mut self, mark: ArenaMark) {
        assert!(
            mark <= self.mark(),
            "arena rewind to {:?} is ahead of the current position {:?}",
            mark,
            self.mark()
        );
        self.cur = mark.slab;
        self.offset = mark.offset;
    }

    /// Rewind to the very beginning, keeping every slab for reuse.
    pub fn recover_all(&mut self) {
        self.cur = 0;
        self.offset = 0;
    }

    /// Return every slab to the system.
    pub fn free_all(&mut self) {
        if !self.slabs.is_empty() {
            debug!(
                "arena: releasing {} slabs ({} bytes)",
                self.slabs.len(),
                self.bytes_reserved()
            );
        }
        self.slabs.clear();
        self.recover_all();
    }

    /// Number of slabs currently owned.
    pub fn slab_count(&self) -> usize {
        self.slabs.len()
    }

    /// Total bytes owned across all slabs.
    pub fn bytes_reserved(&self) -> usize {
        self.slabs.iter().map(|s| s.size).sum()
    }

    /// Bytes consumed up to the current position, including alignment
    /// padding and the unused tails of slabs that were moved past.
    pub fn bytes_in_use(&self) -> usize {
        let full: usize = self.slabs.iter().take(self.cur).map(|s| s.size).sum();
        if self.slabs.is_empty() {
            0
        } else {
            full + self.offset
        }
    }

    /// Check whether `ptr` points into memory handed out since the last
    /// recovery.
    pub fn in_arena<T>(&self, ptr: *const T) -> bool {
        let addr = ptr as usize;
        self.slabs.iter().enumerate().any(|(i, slab)| {
            let used = match i.cmp(&self.cur) {
                std::cmp::Ordering::Less => slab.size,
                std::cmp::Ordering::Equal => self.offset,
                std::cmp::Ordering::Greater => 0,
            };
            slab.contains(addr, used)
        })
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_arena() -> Arena {
        let config = TapeConfig::default().initial_slab_bytes(64).unwrap();
        Arena::with_config(&config)
    }

    #[test]
    fn test_new_arena_is_empty() {
        let arena = Arena::new();
        assert_eq!(arena.slab_count(), 0);
        assert_eq!(arena.bytes_reserved(), 0);
        assert_eq!(arena.bytes_in_use(), 0);
    }

    #[test]
    fn test_alloc_respects_alignment() {
        let mut arena = Arena::new();
        arena.alloc(Layout::from_size_align(1, 1).unwrap());
        let p = arena.alloc(Layout::from_size_align(8, 8).unwrap());
        assert_eq!(p.as_ptr() as usize % 8, 0);
        let q = arena.alloc(Layout::from_size_align(3, 1).unwrap());
        let r = arena.alloc(Layout::from_size_align(16, 16).unwrap());
        assert_eq!(r.as_ptr() as usize % 16, 0);
        assert!(q.as_ptr() as usize >= p.as_ptr() as usize + 8);
    }

    #[test]
    fn test_allocations_do_not_overlap() {
        let mut arena = small_arena();
        let mut ptrs = Vec::new();
        for i in 0..100u64 {
            ptrs.push(arena.alloc_value(i));
        }
        for (i, p) in ptrs.iter().enumerate() {
            // SAFETY: nothing has been recovered, all pointers are live.
            assert_eq!(unsafe { *p.as_ptr() }, i as u64);
        }
        let mut addrs: Vec<usize> = ptrs.iter().map(|p| p.as_ptr() as usize).collect();
        addrs.sort_unstable();
        addrs.dedup();
        assert_eq!(addrs.len(), 100);
    }

    #[test]
    fn test_geometric_growth() {
        let mut arena = small_arena();
        for i in 0..64u64 {
            arena.alloc_value(i);
        }
        assert!(arena.slab_count() >= 2);
        let sizes: Vec<usize> = arena.slabs.iter().map(|s| s.size).collect();
        for pair in sizes.windows(2) {
            assert_eq!(pair[1], pair[0] * 2);
        }
    }

    #[test]
    fn test_oversized_request_gets_own_slab() {
        let mut arena = small_arena();
        arena.alloc(Layout::from_size_align(1000, 8).unwrap());
        assert_eq!(arena.slab_count(), 1);
        assert!(arena.bytes_reserved() >= 1000);
    }

    #[test]
    fn test_recover_all_reuses_slabs() {
        let mut arena = small_arena();
        let first = arena.alloc_value(1u64);
        for i in 0..40u64 {
            arena.alloc_value(i);
        }
        let slabs = arena.slab_count();
        let reserved = arena.bytes_reserved();

        arena.recover_all();
        assert_eq!(arena.bytes_in_use(), 0);
        let again = arena.alloc_value(2u64);
        assert_eq!(first, again);
        for i in 0..40u64 {
            arena.alloc_value(i);
        }
        assert_eq!(arena.slab_count(), slabs);
        assert_eq!(arena.bytes_reserved(), reserved);
    }

    #[test]
    fn test_mark_and_rewind() {
        let mut arena = small_arena();
        let keep = arena.alloc_value(7u32);
        let mark = arena.mark();
        let used = arena.bytes_in_use();

        let scratch = arena.alloc_value(9u32);
        for i in 0..50u32 {
            arena.alloc_value(i);
        }
        arena.rewind(mark);

        assert_eq!(arena.mark(), mark);
        assert_eq!(arena.bytes_in_use(), used);
        assert!(arena.in_arena(keep.as_ptr()));
        assert!(!arena.in_arena(scratch.as_ptr()));
        assert_eq!(arena.alloc_value(11u32), scratch);
        // SAFETY: `keep` was allocated before the mark.
        assert_eq!(unsafe { *keep.as_ptr() }, 7);
    }

    #[test]
    #[should_panic(expected = "ahead of the current position")]
    fn test_rewind_forward_panics() {
        let mut arena = small_arena();
        arena.alloc_value(1u64);
        let ahead = arena.mark();
        arena.recover_all();
        arena.rewind(ahead);
    }

    #[test]
    fn test_alloc_slice_copy() {
        let mut arena = small_arena();
        let values = [1.0f64, 2.0, 3.0];
        let copy = arena.alloc_slice_copy(&values);
        // SAFETY: freshly allocated and initialised by `alloc_slice_copy`.
        let copied = unsafe { copy.as_ref() };
        assert_eq!(copied, &values);
        assert_ne!(copied.as_ptr(), values.as_ptr());
        assert!(arena.in_arena(copied.as_ptr()));
    }

    #[test]
    fn test_free_all_releases_slabs() {
        let mut arena = small_arena();
        for i in 0..40u64 {
            arena.alloc_value(i);
        }
        arena.free_all();
        assert_eq!(arena.slab_count(), 0);
        assert_eq!(arena.bytes_reserved(), 0);
        arena.alloc_value(1u8);
        assert_eq!(arena.slab_count(), 1);
        assert_eq!(arena.bytes_reserved(), 64);
    }
}
