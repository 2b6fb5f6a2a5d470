//! Property tests for the bounded queues and the command pool.

use std::thread;
use std::time::Duration;

use pipeline::spsc::{channel, QueueError};
use pipeline::{Backpressure, CommandKind, CommandPool};
use proptest::prelude::*;
use wire::{Channel, Packet, PeerId};

proptest! {
    #[test]
    fn fifo_order_within_capacity(
        capacity_log2 in 0u32..7,
        items in prop::collection::vec(any::<u32>(), 0..64),
    ) {
        let capacity = 1usize << capacity_log2;
        let (tx, rx) = channel("prop", capacity).unwrap();
        let fitting = items.len().min(capacity);
        for &item in &items[..fitting] {
            prop_assert!(tx.try_enqueue(item).is_ok());
        }
        let out: Vec<u32> = rx.drain().collect();
        prop_assert_eq!(&out[..], &items[..fitting]);
    }

    #[test]
    fn reject_policy_is_deterministic(capacity_log2 in 0u32..5, extra in 1usize..8) {
        let capacity = 1usize << capacity_log2;
        let (tx, rx) = channel("prop", capacity).unwrap();
        for i in 0..capacity {
            prop_assert!(tx.enqueue(i, Backpressure::Reject).is_ok());
        }
        for i in 0..extra {
            let item = capacity + i;
            prop_assert_eq!(tx.enqueue(item, Backpressure::Reject), Err(QueueError::Full(item)));
        }
        prop_assert_eq!(rx.len(), capacity);
        prop_assert_eq!(rx.try_dequeue(), Some(0));
    }

    #[test]
    fn spin_policy_rejects_when_nobody_consumes(attempts in 1u32..16) {
        let (tx, _rx) = channel("prop", 1).unwrap();
        tx.try_enqueue(0u8).unwrap();
        prop_assert_eq!(
            tx.enqueue(1, Backpressure::Spin { attempts }),
            Err(QueueError::Full(1))
        );
    }

    #[test]
    fn pooled_commands_always_return(count in 1usize..64, retain in 1usize..16) {
        let pool = CommandPool::new(retain);
        let commands: Vec<_> = (0..count)
            .map(|i| pool.send(PeerId::new(i as u32), Channel::STATE, Packet::unreliable(vec![0; i])))
            .collect();
        prop_assert_eq!(pool.created(), count);
        drop(commands);
        prop_assert_eq!(pool.idle(), count.min(retain));
        let reused = pool.get();
        prop_assert_eq!(reused.kind, CommandKind::StartHost);
        prop_assert!(reused.packet.is_none());
    }
}

#[test]
fn fifo_across_threads() {
    const COUNT: u32 = 10_000;
    let (tx, rx) = channel("threads", 16).unwrap();
    let producer = thread::spawn(move || {
        for i in 0..COUNT {
            tx.enqueue(i, Backpressure::Block).unwrap();
        }
    });
    let mut expected = 0;
    while expected < COUNT {
        if let Some(item) = rx.dequeue_timeout(Duration::from_secs(5)) {
            assert_eq!(item, expected);
            expected += 1;
        } else {
            panic!("producer stalled at {expected}");
        }
    }
    producer.join().unwrap();
}
