//! Many producers feeding draining consumers through one `MessageQueue`.

#![allow(missing_docs)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use strider::primitives::concurrency::{Latch, MessageQueue};

const PRODUCERS: u64 = 6;
const PER_PRODUCER: u64 = 5_000;

#[test]
fn every_item_is_delivered_once_and_in_producer_order() {
    let queue = Arc::new(MessageQueue::new());
    let done = Arc::new(AtomicBool::new(false));

    let consumers: Vec<_> = (0..3)
        .map(|_| {
            let queue = Arc::clone(&queue);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut seen = Vec::new();
                let mut batch = Vec::new();
                loop {
                    let n = queue.pop_all_timeout(&mut batch, Duration::from_millis(5));
                    if n == 0 && done.load(Ordering::Acquire) && queue.is_empty() {
                        break;
                    }
                    seen.append(&mut batch);
                }
                seen
            })
        })
        .collect();

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    if i % 7 == 0 {
                        queue.push_batch([(p, i)]);
                    } else {
                        queue.push((p, i));
                    }
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }
    done.store(true, Ordering::Release);

    let mut all = HashSet::new();
    for consumer in consumers {
        let seen: Vec<(u64, u64)> = consumer.join().unwrap();
        // within one consumer, items of one producer keep their order
        for p in 0..PRODUCERS {
            let mine: Vec<u64> = seen.iter().filter(|(q, _)| *q == p).map(|(_, i)| *i).collect();
            assert!(mine.windows(2).all(|w| w[0] < w[1]));
        }
        for item in seen {
            assert!(all.insert(item), "duplicate delivery of {item:?}");
        }
    }
    assert_eq!(all.len() as u64, PRODUCERS * PER_PRODUCER);
}

#[test]
fn latch_releases_one_waiter_per_open() {
    let latch = Arc::new(Latch::new());
    let (ack, acked) = mpsc::channel();
    let waiter = {
        let latch = Arc::clone(&latch);
        thread::spawn(move || {
            for run in 0..3 {
                latch.wait();
                ack.send(run).unwrap();
            }
            latch.wait_timeout(Duration::from_millis(20))
        })
    };
    for run in 0..3 {
        latch.open();
        assert_eq!(acked.recv_timeout(Duration::from_secs(5)).unwrap(), run);
    }
    assert!(!waiter.join().unwrap(), "no open is left over");
}
