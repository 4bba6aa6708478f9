//! Bounded live-packet queue with drop-oldest overflow.
//!
//! The capture thread pushes every record here for external stream
//! consumers. The producer never blocks: when the queue is full, the oldest
//! queued record is discarded to admit the newest. Built explicitly on a
//! mutexed deque because channel primitives default to blocking or
//! drop-newest semantics on overflow.

use crate::record::PacketRecord;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::Duration;

pub const DEFAULT_CAPACITY: usize = 100;

pub struct LiveQueue {
    inner: Mutex<VecDeque<PacketRecord>>,
    capacity: usize,
    available: Condvar,
}

impl LiveQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            available: Condvar::new(),
        }
    }

    /// Enqueues a record, discarding the oldest one when full. Never blocks.
    pub fn push(&self, record: PacketRecord) {
        let mut queue = self.inner.lock();
        if queue.len() >= self.capacity {
            queue.pop_front();
        }
        queue.push_back(record);
        drop(queue);
        self.available.notify_one();
    }

    /// Blocking pop with a timeout; `None` when the queue stayed empty.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<PacketRecord> {
        let mut queue = self.inner.lock();
        if queue.is_empty() {
            self.available.wait_for(&mut queue, timeout);
        }
        queue.pop_front()
    }

    /// Removes and returns everything currently queued.
    pub fn drain(&self) -> Vec<PacketRecord> {
        self.inner.lock().drain(..).collect()
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Protocol;
    use chrono::{TimeZone, Utc};

    fn record(seq: usize) -> PacketRecord {
        PacketRecord {
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            src_ip: format!("10.0.0.{}", seq % 250),
            dst_ip: "10.0.0.254".into(),
            src_port: Some(seq as u16),
            dst_port: Some(443),
            protocol: Protocol::Tcp,
            length: seq,
            payload_preview: None,
            flags: None,
            process_name: None,
            pid: None,
            dns_query_id: None,
            dns_domain: None,
        }
    }

    #[test]
    fn overflow_drops_the_oldest() {
        let queue = LiveQueue::new(100);
        for seq in 0..101 {
            queue.push(record(seq));
        }

        assert_eq!(queue.len(), 100);
        // Record 0 was discarded; the head is now record 1.
        assert_eq!(queue.pop_timeout(Duration::ZERO).unwrap().length, 1);
    }

    #[test]
    fn drain_empties_in_order() {
        let queue = LiveQueue::new(10);
        for seq in 0..3 {
            queue.push(record(seq));
        }

        let drained = queue.drain();
        assert_eq!(drained.len(), 3);
        assert_eq!(drained[0].length, 0);
        assert_eq!(drained[2].length, 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn pop_timeout_returns_none_when_empty() {
        let queue = LiveQueue::new(10);
        assert!(queue.pop_timeout(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn pop_wakes_on_concurrent_push() {
        let queue = std::sync::Arc::new(LiveQueue::new(10));
        let producer = {
            let queue = queue.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                queue.push(record(7));
            })
        };

        let popped = queue.pop_timeout(Duration::from_secs(2));
        producer.join().unwrap();
        assert_eq!(popped.unwrap().length, 7);
    }
}
