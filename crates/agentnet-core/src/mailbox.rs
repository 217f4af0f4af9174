//! Bounded FIFO mailbox of message batches
//!
//! Enqueue never waits: a full mailbox hands the batch back to the caller so
//! the dispatcher can report it. Dequeue is async and may be raced by several
//! consumers (the node loop and the pull-style `recv`), which share the
//! receiving half behind an async mutex.

use tokio::sync::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::types::Batch;

/// Default number of batches a mailbox holds
pub const DEFAULT_MAILBOX_CAPACITY: usize = 10;

pub struct Mailbox {
    sender: mpsc::Sender<Batch>,
    receiver: Mutex<mpsc::Receiver<Batch>>,
    capacity: usize,
}

impl std::fmt::Debug for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mailbox")
            .field("pending", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl Mailbox {
    /// Create a mailbox. A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            sender,
            receiver: Mutex::new(receiver),
            capacity,
        }
    }

    /// Enqueue without waiting. Returns the batch back if the mailbox is full.
    pub fn try_push(&self, batch: Batch) -> std::result::Result<(), Batch> {
        // The receiver lives as long as the mailbox, so Closed cannot happen
        self.sender.try_send(batch).map_err(|e| match e {
            TrySendError::Full(batch) | TrySendError::Closed(batch) => batch,
        })
    }

    /// Dequeue the oldest batch if one is pending.
    ///
    /// Returns None while another consumer is parked in [`Mailbox::pop`],
    /// which only happens when the queue is empty.
    pub fn try_pop(&self) -> Option<Batch> {
        self.receiver.try_lock().ok()?.try_recv().ok()
    }

    /// Wait until a batch is available and dequeue it.
    ///
    /// Cancel-safe: dropping the future never loses a queued batch.
    pub async fn pop(&self) -> Option<Batch> {
        self.receiver.lock().await.recv().await
    }

    /// Number of batches currently queued
    pub fn len(&self) -> usize {
        self.capacity - self.sender.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new(DEFAULT_MAILBOX_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;
    use std::sync::Arc;
    use std::time::Duration;

    fn batch(text: &str) -> Batch {
        vec![Message::user(text)]
    }

    #[test]
    fn test_fifo_order() {
        let mailbox = Mailbox::new(3);
        mailbox.try_push(batch("one")).unwrap();
        mailbox.try_push(batch("two")).unwrap();
        assert_eq!(mailbox.len(), 2);
        assert_eq!(mailbox.try_pop().unwrap()[0].content, "one");
        assert_eq!(mailbox.try_pop().unwrap()[0].content, "two");
        assert!(mailbox.try_pop().is_none());
    }

    #[test]
    fn test_full_mailbox_returns_batch() {
        let mailbox = Mailbox::new(1);
        mailbox.try_push(batch("first")).unwrap();
        let rejected = mailbox.try_push(batch("second")).unwrap_err();
        assert_eq!(rejected[0].content, "second");
        assert_eq!(mailbox.len(), 1);
    }

    #[test]
    fn test_zero_capacity_raised() {
        let mailbox = Mailbox::new(0);
        assert_eq!(mailbox.capacity(), 1);
        assert!(mailbox.try_push(batch("x")).is_ok());
    }

    #[tokio::test]
    async fn test_pop_waits_for_push() {
        let mailbox = Arc::new(Mailbox::new(2));
        let consumer = {
            let mailbox = mailbox.clone();
            tokio::spawn(async move { mailbox.pop().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        mailbox.try_push(batch("late")).unwrap();

        let got = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .expect("pop should wake on push")
            .unwrap()
            .unwrap();
        assert_eq!(got[0].content, "late");
    }

    #[tokio::test]
    async fn test_dropped_pop_keeps_batch() {
        let mailbox = Mailbox::new(2);
        let timed_out = tokio::time::timeout(Duration::from_millis(10), mailbox.pop()).await;
        assert!(timed_out.is_err());

        mailbox.try_push(batch("kept")).unwrap();
        let got = tokio::time::timeout(Duration::from_secs(1), mailbox.pop())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got[0].content, "kept");
    }

    #[tokio::test]
    async fn test_try_pop_yields_to_parked_consumer() {
        let mailbox = Arc::new(Mailbox::new(2));
        let consumer = {
            let mailbox = mailbox.clone();
            tokio::spawn(async move { mailbox.pop().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(mailbox.try_pop().is_none());

        mailbox.try_push(batch("one")).unwrap();
        let got = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(got[0].content, "one");
        assert!(mailbox.is_empty());
    }

    #[test]
    fn test_len_tracks_slots_in_use() {
        let mailbox = Mailbox::new(2);
        assert!(mailbox.is_empty());
        mailbox.try_push(batch("a")).unwrap();
        mailbox.try_push(batch("b")).unwrap();
        assert_eq!(mailbox.len(), 2);
        assert!(mailbox.try_push(batch("c")).is_err());
        mailbox.try_pop().unwrap();
        assert_eq!(mailbox.len(), 1);
        mailbox.try_push(batch("c")).unwrap();
        assert_eq!(mailbox.len(), 2);
    }
}
