//! Integration tests for the LRU replacer

use std::sync::Arc;
use std::thread;

use strata::buffer::LruReplacer;
use strata::FrameId;

#[test]
fn test_lru_singleton_insert_victim() {
    let replacer = LruReplacer::new();
    replacer.insert(FrameId::new(1));

    assert_eq!(replacer.victim(), Some(FrameId::new(1)));
    assert_eq!(replacer.victim(), None);
}

#[test]
fn test_lru_promote_on_reinsert() {
    let replacer = LruReplacer::new();
    replacer.insert(FrameId::new(1));
    replacer.insert(FrameId::new(2));
    replacer.insert(FrameId::new(1));

    // Re-inserting frame 1 promoted it, so frame 2 is the victim.
    assert_eq!(replacer.victim(), Some(FrameId::new(2)));
    assert_eq!(replacer.victim(), Some(FrameId::new(1)));
}

#[test]
fn test_lru_victim_order_is_insertion_order() {
    let replacer = LruReplacer::new();
    for i in 0..6u32 {
        replacer.insert(FrameId::new(i));
    }
    for i in 0..6u32 {
        assert_eq!(replacer.victim(), Some(FrameId::new(i)));
    }
}

#[test]
fn test_lru_erase_never_victimized() {
    let replacer = LruReplacer::new();
    replacer.insert(FrameId::new(1));
    replacer.insert(FrameId::new(2));
    replacer.insert(FrameId::new(3));

    assert!(replacer.erase(&FrameId::new(2)));

    assert_eq!(replacer.victim(), Some(FrameId::new(1)));
    assert_eq!(replacer.victim(), Some(FrameId::new(3)));
    assert_eq!(replacer.victim(), None);
}

#[test]
fn test_lru_erase_absent_is_noop() {
    let replacer: LruReplacer<FrameId> = LruReplacer::new();
    assert!(!replacer.erase(&FrameId::new(9)));
    assert_eq!(replacer.len(), 0);
}

#[test]
fn test_lru_len_tracks_contents() {
    let replacer = LruReplacer::new();
    assert!(replacer.is_empty());

    replacer.insert(FrameId::new(1));
    replacer.insert(FrameId::new(2));
    replacer.insert(FrameId::new(1));
    assert_eq!(replacer.len(), 2);

    replacer.victim();
    assert_eq!(replacer.len(), 1);
}

#[test]
fn test_lru_concurrent_inserts() {
    let replacer = Arc::new(LruReplacer::new());

    let handles: Vec<_> = (0..4u32)
        .map(|t| {
            let replacer = Arc::clone(&replacer);
            thread::spawn(move || {
                for i in 0..25 {
                    replacer.insert(FrameId::new(t * 25 + i));
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(replacer.len(), 100);
    let mut seen = std::collections::HashSet::new();
    while let Some(frame_id) = replacer.victim() {
        assert!(seen.insert(frame_id), "victim returned {} twice", frame_id);
    }
    assert_eq!(seen.len(), 100);
}
