//! Allocation counters fed by [`TrackingAllocator`]
use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicU64, Ordering};

static ALLOCATED_BYTES: AtomicU64 = AtomicU64::new(0);
static FREED_BYTES: AtomicU64 = AtomicU64::new(0);
static ALLOCATIONS: AtomicU64 = AtomicU64::new(0);
static DEALLOCATIONS: AtomicU64 = AtomicU64::new(0);

/// A `GlobalAlloc` wrapper that counts allocations.
///
/// Install it in the embedding binary to populate the allocator fields of
/// every snapshot; without it they read zero.
///
/// ```ignore
/// #[global_allocator]
/// static ALLOC: runstats::stats::TrackingAllocator = runstats::stats::TrackingAllocator::new();
/// ```
pub struct TrackingAllocator<A = System> {
    inner: A,
}

impl TrackingAllocator<System> {
    pub const fn new() -> Self {
        Self { inner: System }
    }
}

impl<A> TrackingAllocator<A> {
    /// Wrap another allocator
    pub const fn wrap(inner: A) -> Self {
        Self { inner }
    }
}

impl Default for TrackingAllocator<System> {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn record_alloc(size: usize) {
    ALLOCATED_BYTES.fetch_add(size as u64, Ordering::Relaxed);
    ALLOCATIONS.fetch_add(1, Ordering::Relaxed);
}

#[inline]
fn record_dealloc(size: usize) {
    FREED_BYTES.fetch_add(size as u64, Ordering::Relaxed);
    DEALLOCATIONS.fetch_add(1, Ordering::Relaxed);
}

unsafe impl<A: GlobalAlloc> GlobalAlloc for TrackingAllocator<A> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { self.inner.alloc(layout) };
        if !ptr.is_null() {
            record_alloc(layout.size());
        }
        ptr
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { self.inner.alloc_zeroed(layout) };
        if !ptr.is_null() {
            record_alloc(layout.size());
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { self.inner.dealloc(ptr, layout) };
        record_dealloc(layout.size());
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = unsafe { self.inner.realloc(ptr, layout, new_size) };
        if !new_ptr.is_null() {
            record_dealloc(layout.size());
            record_alloc(new_size);
        }
        new_ptr
    }
}

/// Point-in-time view of the allocation counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocatorStats {
    /// Cumulative bytes handed out
    pub allocated_bytes: u64,
    /// Cumulative bytes returned
    pub freed_bytes: u64,
    pub allocations: u64,
    pub deallocations: u64,
}

impl AllocatorStats {
    /// Bytes currently live
    pub fn live_bytes(&self) -> u64 {
        self.allocated_bytes.saturating_sub(self.freed_bytes)
    }

    /// Allocations currently live
    pub fn live_objects(&self) -> u64 {
        self.allocations.saturating_sub(self.deallocations)
    }
}

/// Read the counters.
///
/// Frees are loaded before allocations so a concurrent alloc/free pair can
/// never make the live figures go negative.
pub fn allocator_stats() -> AllocatorStats {
    let freed_bytes = FREED_BYTES.load(Ordering::Relaxed);
    let deallocations = DEALLOCATIONS.load(Ordering::Relaxed);
    AllocatorStats {
        allocated_bytes: ALLOCATED_BYTES.load(Ordering::Relaxed),
        freed_bytes,
        allocations: ALLOCATIONS.load(Ordering::Relaxed),
        deallocations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_allocator_counts_round_trip() {
        let tracker = TrackingAllocator::new();
        let before = allocator_stats();

        let layout = Layout::from_size_align(64, 8).unwrap();
        unsafe {
            let ptr = tracker.alloc(layout);
            assert!(!ptr.is_null());
            let ptr = tracker.realloc(ptr, layout, 128);
            assert!(!ptr.is_null());
            tracker.dealloc(ptr, Layout::from_size_align(128, 8).unwrap());
        }

        let after = allocator_stats();
        assert!(after.allocated_bytes >= before.allocated_bytes + 64 + 128);
        assert!(after.freed_bytes >= before.freed_bytes + 64 + 128);
        assert!(after.allocations >= before.allocations + 2);
        assert!(after.deallocations >= before.deallocations + 2);
    }

    #[test]
    fn live_figures_saturate() {
        let stats = AllocatorStats {
            allocated_bytes: 10,
            freed_bytes: 20,
            allocations: 1,
            deallocations: 3,
        };
        assert_eq!(stats.live_bytes(), 0);
        assert_eq!(stats.live_objects(), 0);
    }
}
