//! Bounded FIFO work queue between the read producer and the worker pool.
//!
//! A thin wrapper over a bounded crossbeam channel. Sends block when the
//! queue is full, which is what bounds memory for queued-but-unprocessed
//! reads. End-of-stream is signalled by dropping every `WorkSender`;
//! receivers observe it as `recv() == None` once the queue has drained,
//! so the close is one-shot and race-free (it can only be seen after the
//! last send).

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

pub struct WorkSender<T> {
    tx: Sender<T>,
}

pub struct WorkReceiver<T> {
    rx: Receiver<T>,
}

pub fn work_queue<T>(capacity: usize) -> (WorkSender<T>, WorkReceiver<T>) {
    let (tx, rx) = bounded(capacity);
    (WorkSender { tx }, WorkReceiver { rx })
}

impl<T> WorkSender<T> {
    /// Blocking send; applies backpressure when the queue is full.
    /// Returns the item back if every receiver is gone.
    pub fn send(&self, item: T) -> Result<(), T> {
        self.tx.send(item).map_err(|e| e.into_inner())
    }

    /// Non-blocking send; fails when the queue is at capacity.
    pub fn try_send(&self, item: T) -> Result<(), T> {
        self.tx.try_send(item).map_err(|e| match e {
            TrySendError::Full(item) | TrySendError::Disconnected(item) => item,
        })
    }
}

impl<T> WorkReceiver<T> {
    /// Blocking receive. `None` means the stream has ended and the queue
    /// is drained; no further items will ever arrive.
    pub fn recv(&self) -> Option<T> {
        self.rx.recv().ok()
    }
}

impl<T> Clone for WorkReceiver<T> {
    fn clone(&self) -> Self {
        WorkReceiver {
            rx: self.rx.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order_single_consumer() {
        let (tx, rx) = work_queue(8);
        for i in 0..5 {
            tx.send(i).unwrap();
        }
        drop(tx);
        let drained: Vec<i32> = std::iter::from_fn(|| rx.recv()).collect();
        assert_eq!(drained, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_capacity_bounds_outstanding_items() {
        let (tx, _rx) = work_queue(3);
        for i in 0..3 {
            tx.try_send(i).unwrap();
        }
        // fourth item cannot be queued while workers are stalled
        assert_eq!(tx.try_send(3), Err(3));
    }

    #[test]
    fn test_close_observed_after_drain() {
        let (tx, rx) = work_queue(4);
        tx.send("a").unwrap();
        drop(tx);
        assert_eq!(rx.recv(), Some("a"));
        assert_eq!(rx.recv(), None);
        // close is idempotent from the receiver's point of view
        assert_eq!(rx.recv(), None);
    }

    #[test]
    fn test_send_fails_without_receivers() {
        let (tx, rx) = work_queue(4);
        drop(rx);
        assert_eq!(tx.send(1), Err(1));
    }
}
