//! Tests for the lock-free MPSC staging ring

use bytes::BytesMut;

use crate::pool::SlotPool;
use crate::ring::{RingStage, MAX_CAPACITY, MIN_CAPACITY};

fn owned(data: &[u8]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(data.len());
    buf.extend_from_slice(data);
    buf
}

// ============================================================================
// sizing
// ============================================================================

#[test]
fn test_capacity_minimum() {
    assert_eq!(RingStage::new(0).capacity(), MIN_CAPACITY as u64);
    assert_eq!(RingStage::new(4).capacity(), MIN_CAPACITY as u64);
    assert_eq!(RingStage::new(63).capacity(), MIN_CAPACITY as u64);
}

#[test]
fn test_capacity_rounds_to_power_of_two() {
    assert_eq!(RingStage::new(64).capacity(), 64);
    assert_eq!(RingStage::new(100).capacity(), 128);
    assert_eq!(RingStage::new(1000).capacity(), 1024);
}

#[test]
fn test_capacity_ceiling() {
    assert_eq!(RingStage::new(100_000).capacity(), MAX_CAPACITY as u64);
}

// ============================================================================
// push / pop
// ============================================================================

#[test]
fn test_fifo_order() {
    let ring = RingStage::new(64);
    let pool = SlotPool::new(8, 64);

    assert!(ring.push(b"first", &pool));
    assert!(ring.push(b"second", &pool));
    assert!(ring.push(b"third", &pool));
    assert_eq!(ring.fill(), 3);

    assert_eq!(&ring.pop().unwrap()[..], b"first");
    assert_eq!(&ring.pop().unwrap()[..], b"second");
    assert_eq!(&ring.pop().unwrap()[..], b"third");
    assert!(ring.pop().is_none());
    assert_eq!(ring.fill(), 0);
}

#[test]
fn test_full_ring_rejects_push() {
    let ring = RingStage::new(64);
    let pool = SlotPool::new(8, 16);

    for i in 0..64 {
        assert!(ring.push(format!("{i}").as_bytes(), &pool), "push {i}");
    }
    assert_eq!(ring.fill(), ring.capacity());
    assert!(!ring.push(b"overflow", &pool));

    // Draining one slot makes room again
    assert!(ring.pop().is_some());
    assert!(ring.push(b"fits", &pool));
}

#[test]
fn test_push_owned_returns_buffer_when_full() {
    let ring = RingStage::new(64);

    for i in 0..64 {
        assert!(ring.push_owned(owned(format!("{i}").as_bytes())).is_ok());
    }

    let rejected = ring.push_owned(owned(b"overflow")).unwrap_err();
    assert_eq!(&rejected[..], b"overflow");
}

#[test]
fn test_push_owned_transfers_without_copy() {
    let ring = RingStage::new(64);
    ring.push_owned(owned(b"zero copy")).unwrap();
    assert_eq!(&ring.pop().unwrap()[..], b"zero copy");
}

#[test]
fn test_wraparound_reuses_slots() {
    let ring = RingStage::new(64);
    let pool = SlotPool::new(8, 16);

    // Cycle far past the capacity so indices wrap several times
    for round in 0..300u32 {
        assert!(ring.push(&round.to_le_bytes(), &pool));
        let got = ring.pop().unwrap();
        assert_eq!(&got[..], &round.to_le_bytes());
        pool.put(got);
    }
}

#[test]
fn test_drop_frees_unconsumed_payloads() {
    let ring = RingStage::new(64);
    for i in 0..10 {
        ring.push_owned(owned(format!("left behind {i}").as_bytes()))
            .unwrap();
    }
    // Dropping the ring with staged payloads must not leak or crash
    drop(ring);
}

// ============================================================================
// concurrency
// ============================================================================

#[test]
fn test_concurrent_producers_single_consumer() {
    const PRODUCERS: usize = 4;
    const PER_PRODUCER: usize = 2_000;

    let ring = RingStage::new(256);
    let pool = SlotPool::new(64, 64);

    std::thread::scope(|scope| {
        for producer in 0..PRODUCERS {
            let ring = &ring;
            let pool = &pool;
            scope.spawn(move || {
                for i in 0..PER_PRODUCER {
                    let line = format!("{producer}:{i}\n");
                    // Spin until accepted; the consumer is draining
                    while !ring.push(line.as_bytes(), pool) {
                        std::hint::spin_loop();
                    }
                }
            });
        }

        let mut received: Vec<Vec<usize>> = vec![Vec::new(); PRODUCERS];
        let mut total = 0;
        while total < PRODUCERS * PER_PRODUCER {
            // Occupancy invariant must hold at every observation
            assert!(ring.fill() <= ring.capacity());

            let Some(payload) = ring.pop() else {
                std::hint::spin_loop();
                continue;
            };
            let text = std::str::from_utf8(&payload).unwrap();
            let (producer, index) = text.trim_end().split_once(':').unwrap();
            received[producer.parse::<usize>().unwrap()].push(index.parse().unwrap());
            total += 1;
        }

        // Every producer's payloads arrive in the order it pushed them
        for indexes in &received {
            assert_eq!(indexes.len(), PER_PRODUCER);
            assert!(indexes.windows(2).all(|w| w[0] < w[1]));
        }

        assert!(ring.pop().is_none());
    });
}
