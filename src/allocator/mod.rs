//! Allocation collaborator
//!
//! Every class and instance block is reserved here rather than created
//! directly, so size limits, accounting and test-mode fault injection live in
//! one place.

mod block;

#[cfg(test)]
mod tests;

pub use block::Block;

use crate::config;
use crate::error::{MetaError, Result};
use crate::logging::{log_allocation, log_deallocation};
use std::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering};

static STATS: AllocatorState = AllocatorState::new();

struct AllocatorState {
    live_blocks: AtomicUsize,
    live_bytes: AtomicUsize,
    total_allocations: AtomicUsize,
    failed_allocations: AtomicUsize,
}

impl AllocatorState {
    const fn new() -> Self {
        Self {
            live_blocks: AtomicUsize::new(0),
            live_bytes: AtomicUsize::new(0),
            total_allocations: AtomicUsize::new(0),
            failed_allocations: AtomicUsize::new(0),
        }
    }
}

thread_local! {
    /// Pending injected failures for the calling thread
    static INJECTED: Cell<usize> = const { Cell::new(0) };
}

fn take_injected() -> bool {
    INJECTED.with(|pending| match pending.get() {
        0 => false,
        n => {
            pending.set(n - 1);
            true
        }
    })
}

/// Reserve a zeroed block of `size` bytes on behalf of `label`
pub fn reserve(size: usize, label: &str) -> Result<Block> {
    let limit = config::max_block_size();
    if size > limit {
        STATS.failed_allocations.fetch_add(1, Ordering::Relaxed);
        return Err(MetaError::OutOfRange(format!(
            "{label}: block of {size} bytes exceeds limit of {limit}"
        )));
    }

    if take_injected() {
        STATS.failed_allocations.fetch_add(1, Ordering::Relaxed);
        return Err(MetaError::OutOfMemory {
            size,
            label: label.to_string(),
        });
    }

    STATS.live_blocks.fetch_add(1, Ordering::Relaxed);
    STATS.live_bytes.fetch_add(size, Ordering::Relaxed);
    STATS.total_allocations.fetch_add(1, Ordering::Relaxed);
    log_allocation(size, label);

    Ok(Block::zeroed(size))
}

/// Return a block obtained from [`reserve`]
pub fn release(block: Block, label: &str) {
    let size = block.size();
    STATS.live_blocks.fetch_sub(1, Ordering::Relaxed);
    STATS.live_bytes.fetch_sub(size, Ordering::Relaxed);
    log_deallocation(size, label);
    drop(block);
}

/// Make the calling thread's next `count` reservations fail with `OutOfMemory`
pub fn inject_failures(count: usize) {
    INJECTED.with(|pending| pending.set(count));
}

/// Cancel pending injected failures on the calling thread
pub fn clear_injected_failures() {
    INJECTED.with(|pending| pending.set(0));
}

/// Get allocator statistics
pub fn stats() -> AllocatorStats {
    AllocatorStats {
        live_blocks: STATS.live_blocks.load(Ordering::Relaxed),
        live_bytes: STATS.live_bytes.load(Ordering::Relaxed),
        total_allocations: STATS.total_allocations.load(Ordering::Relaxed),
        failed_allocations: STATS.failed_allocations.load(Ordering::Relaxed),
    }
}

/// Allocator statistics for monitoring and debugging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocatorStats {
    pub live_blocks: usize,
    pub live_bytes: usize,
    pub total_allocations: usize,
    pub failed_allocations: usize,
}
