//! Tests for blocks and the allocation collaborator

use super::*;
use crate::error::ErrorKind;
use std::sync::Arc;

#[cfg(test)]
mod block_tests {
    use super::*;

    #[test]
    fn test_block_starts_zeroed() {
        let block = Block::zeroed(32);
        assert_eq!(block.size(), 32);
        assert!(block.is_zeroed());
        assert_eq!(block.get::<u64>(0), None);
    }

    #[test]
    fn test_set_and_get() {
        let mut block = Block::zeroed(32);
        block.set(0, 7u32).unwrap();
        block.set(8, 9.5f64).unwrap();

        assert_eq!(block.get::<u32>(0), Some(&7));
        assert_eq!(block.get::<f64>(8), Some(&9.5));
        // Wrong type reads as absent
        assert_eq!(block.get::<u64>(0), None);
        assert_eq!(block.len(), 2);
    }

    #[test]
    fn test_get_mut_updates_in_place() {
        let mut block = Block::zeroed(16);
        block.set(0, 1u64).unwrap();
        *block.get_mut::<u64>(0).unwrap() += 41;
        assert_eq!(block.get::<u64>(0), Some(&42));
    }

    #[test]
    fn test_out_of_bounds_write() {
        let mut block = Block::zeroed(8);
        let err = block.set(4, 1u64).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutOfRange);
        assert!(block.set(0, 1u64).is_ok());
    }

    #[test]
    fn test_overlapping_writes_rejected() {
        let mut block = Block::zeroed(32);
        block.set(8, 1u64).unwrap();

        // Starts inside the existing value
        assert_eq!(block.set(12, 1u32).unwrap_err().kind(), ErrorKind::InvalidArgument);
        // Runs into the existing value
        assert_eq!(block.set(4, 1u64).unwrap_err().kind(), ErrorKind::InvalidArgument);
        // Adjacent is fine
        assert!(block.set(16, 1u64).is_ok());
        assert!(block.set(0, 1u64).is_ok());
    }

    #[test]
    fn test_replace_at_same_offset() {
        let mut block = Block::zeroed(16);
        block.set(0, 1u32).unwrap();
        block.set(0, "text").unwrap();
        assert_eq!(block.get::<&str>(0), Some(&"text"));
        assert_eq!(block.get::<u32>(0), None);
    }

    #[test]
    fn test_carved_range_rejected() {
        let mut block = Block::zeroed(64);
        block.carve(16..32);
        assert!(block.set(20, 1u8).is_err());
        assert!(block.set(8, 1u64).is_ok());
        assert!(block.set(32, 1u64).is_ok());
    }

    #[test]
    fn test_take_and_clear() {
        let mut block = Block::zeroed(32);
        block.set(0, String::from("hello")).unwrap();
        assert_eq!(block.take::<u32>(0), None);
        assert_eq!(block.take::<String>(0).as_deref(), Some("hello"));
        assert!(block.is_zeroed());

        let shared = Arc::new(5u8);
        block.set(8, shared.clone()).unwrap();
        assert_eq!(Arc::strong_count(&shared), 2);
        block.clear();
        assert_eq!(Arc::strong_count(&shared), 1);
    }
}

#[cfg(test)]
mod reserve_tests {
    use super::*;

    #[test]
    fn test_reserve_and_release() {
        let before = stats().total_allocations;
        let block = reserve(128, "test").unwrap();
        assert_eq!(block.size(), 128);
        assert!(block.is_zeroed());
        assert!(stats().total_allocations > before);
        release(block, "test");
    }

    #[test]
    fn test_reserve_over_limit() {
        let err = reserve(usize::MAX, "huge").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutOfRange);
    }

    #[test]
    fn test_injected_failures() {
        inject_failures(2);
        assert_eq!(reserve(8, "a").unwrap_err().kind(), ErrorKind::OutOfMemory);
        assert_eq!(reserve(8, "b").unwrap_err().kind(), ErrorKind::OutOfMemory);
        let block = reserve(8, "c").unwrap();
        release(block, "c");

        inject_failures(5);
        clear_injected_failures();
        let block = reserve(8, "d").unwrap();
        release(block, "d");
    }

    #[test]
    fn test_injection_is_thread_local() {
        inject_failures(1);
        std::thread::spawn(|| {
            let block = reserve(8, "other-thread").unwrap();
            release(block, "other-thread");
        })
        .join()
        .unwrap();
        assert!(reserve(8, "this-thread").is_err());
    }
}
