// SPDX-License-Identifier: GPL-3.0-only

//! Latest-wins single-slot handoff between the acquisition thread and the consumer
//!
//! Publishing never blocks on the consumer and overwrites any unread value;
//! taking never blocks on the producer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

struct Shared<T> {
    slot: Mutex<Option<T>>,
    published: AtomicU64,
    overwritten: AtomicU64,
}

/// Single-slot mailbox; cloning yields another handle to the same slot
pub struct Mailbox<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Mailbox<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Mailbox<T> {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                slot: Mutex::new(None),
                published: AtomicU64::new(0),
                overwritten: AtomicU64::new(0),
            }),
        }
    }

    /// Store a value, discarding any unread one
    pub fn publish(&self, value: T) {
        let previous = self
            .shared
            .slot
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(value);
        if previous.is_some() {
            self.shared.overwritten.fetch_add(1, Ordering::Relaxed);
        }
        self.shared.published.fetch_add(1, Ordering::SeqCst);
    }

    /// Take the latest unread value, if any
    pub fn try_take(&self) -> Option<T> {
        self.shared
            .slot
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }

    /// Drop any unread value
    pub fn clear(&self) {
        self.try_take();
    }

    /// Total values published since creation
    pub fn published(&self) -> u64 {
        self.shared.published.load(Ordering::SeqCst)
    }

    /// Values discarded unread because a newer one replaced them
    pub fn overwritten(&self) -> u64 {
        self.shared.overwritten.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_value_wins() {
        let mailbox = Mailbox::new();
        for i in 1..=5 {
            mailbox.publish(i);
        }
        assert_eq!(mailbox.try_take(), Some(5));
        assert_eq!(mailbox.try_take(), None);
        assert_eq!(mailbox.published(), 5);
        assert_eq!(mailbox.overwritten(), 4);
    }

    #[test]
    fn test_handles_share_slot() {
        let producer = Mailbox::new();
        let consumer = producer.clone();
        let handle = std::thread::spawn(move || producer.publish("frame"));
        handle.join().unwrap();
        assert_eq!(consumer.try_take(), Some("frame"));
    }

    #[test]
    fn test_clear() {
        let mailbox = Mailbox::new();
        mailbox.publish(1);
        mailbox.clear();
        assert_eq!(mailbox.try_take(), None);
    }
}
