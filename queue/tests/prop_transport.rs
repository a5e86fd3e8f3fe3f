//! Model-based properties for the slot queue and the byte ring.
//!
//! Each case drives a random op sequence against the implementation and a
//! trivial `VecDeque` model, then checks they agree at every step.

use std::collections::VecDeque;

use lon_queue::{Queue, RingBuffer};
use proptest::prelude::*;

const MAX_OPS_PER_CASE: usize = 64;

#[derive(Clone, Debug)]
enum QueueOp {
    Push(Vec<u8>),
    Pop,
}

fn queue_op_strategy(item_size: usize) -> impl Strategy<Value = QueueOp> {
    prop_oneof![
        3 => proptest::collection::vec(any::<u8>(), item_size..=item_size).prop_map(QueueOp::Push),
        2 => Just(QueueOp::Pop),
    ]
}

proptest! {
    #[test]
    fn queue_matches_model(
        capacity in 1usize..8,
        item_size in 1usize..16,
        ops in proptest::collection::vec((0u8..2, proptest::collection::vec(any::<u8>(), 0..16)), 0..MAX_OPS_PER_CASE),
    ) {
        let mut q = Queue::new(item_size, capacity).unwrap();
        let mut model: VecDeque<Vec<u8>> = VecDeque::new();

        for (kind, bytes) in ops {
            if kind == 0 {
                // push: fill the slot with a deterministic pattern
                let mut entry = bytes;
                entry.resize(item_size, 0);
                match q.tail() {
                    Some(slot) => {
                        slot.copy_from_slice(&entry);
                        q.commit_tail();
                        model.push_back(entry);
                    }
                    None => prop_assert_eq!(model.len(), capacity),
                }
            } else {
                q.drop_head();
                model.pop_front();
            }

            prop_assert_eq!(q.len(), model.len());
            prop_assert!(q.len() <= q.capacity());
            match (q.peek(), model.front()) {
                (Some(got), Some(want)) => prop_assert_eq!(got, want.as_slice()),
                (None, None) => {}
                (got, want) => prop_assert!(false, "peek {:?} vs model {:?}", got, want),
            }
        }
    }

    #[test]
    fn queue_fifo_exact_sequence(
        payloads in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 4..=4), 1..16),
    ) {
        let mut q = Queue::new(4, payloads.len()).unwrap();
        for p in &payloads {
            let slot = q.tail().unwrap();
            slot.copy_from_slice(p);
            q.commit_tail();
        }
        for p in &payloads {
            prop_assert_eq!(q.peek().unwrap(), p.as_slice());
            q.drop_head();
        }
        prop_assert!(q.is_empty());
    }

    #[test]
    fn ring_round_trip(bytes in proptest::collection::vec(any::<u8>(), 0..=64)) {
        let mut ring = RingBuffer::new(64).unwrap();
        prop_assert_eq!(ring.write(&bytes), bytes.len());

        let mut out = vec![0u8; bytes.len()];
        prop_assert_eq!(ring.read(&mut out), bytes.len());
        prop_assert_eq!(out, bytes);
        prop_assert!(ring.is_empty());
    }

    #[test]
    fn ring_matches_model_across_wrap(
        capacity in 1usize..32,
        ops in proptest::collection::vec((0u8..2, proptest::collection::vec(any::<u8>(), 0..16), 0usize..16), 0..MAX_OPS_PER_CASE),
    ) {
        let mut ring = RingBuffer::new(capacity).unwrap();
        let mut model: VecDeque<u8> = VecDeque::new();

        for (kind, bytes, read_len) in ops {
            if kind == 0 {
                let wrote = ring.write(&bytes);
                let expected = bytes.len().min(capacity - model.len());
                prop_assert_eq!(wrote, expected);
                model.extend(bytes.iter().take(wrote));
            } else {
                let mut dst = vec![0u8; read_len];
                let got = ring.read(&mut dst);
                prop_assert_eq!(got, read_len.min(model.len()));
                for byte in dst.iter().take(got) {
                    prop_assert_eq!(*byte, model.pop_front().unwrap());
                }
            }
            prop_assert_eq!(ring.len(), model.len());
            prop_assert!(ring.len() <= ring.capacity());
        }
    }
}
