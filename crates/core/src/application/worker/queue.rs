// Task Queue - bounded FIFO with blocking enqueue and non-blocking claim

use crate::domain::Task;
use crate::error::{AppError, Result};
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Semaphore;

/// Fixed-capacity task buffer
///
/// `slots` holds one permit per free position: producers wait on it, claims
/// hand it back. The capacity never grows.
pub struct TaskQueue {
    items: Mutex<VecDeque<Task>>,
    slots: Semaphore,
    capacity: usize,
}

impl TaskQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            slots: Semaphore::new(capacity),
            capacity,
        }
    }

    /// Append a task, waiting for a free slot when full
    ///
    /// # Errors
    /// - AppError::InvalidState once the queue was torn down
    pub async fn push(&self, task: Task) -> Result<()> {
        let permit = self
            .slots
            .acquire()
            .await
            .map_err(|_| AppError::InvalidState("task queue is closed".to_string()))?;
        permit.forget();
        self.lock().push_back(task);
        Ok(())
    }

    /// Claim the oldest task without waiting
    pub fn try_pop(&self) -> Option<Task> {
        let task = self.lock().pop_front();
        if task.is_some() {
            self.slots.add_permits(1);
        }
        task
    }

    /// Claim up to `max` of the oldest tasks without waiting
    pub fn drain(&self, max: usize) -> Vec<Task> {
        let mut items = self.lock();
        let count = max.min(items.len());
        let tasks: Vec<Task> = items.drain(..count).collect();
        drop(items);
        if count > 0 {
            self.slots.add_permits(count);
        }
        tasks
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Refuse further pushes; producers blocked on a full queue are released with an error
    pub fn close(&self) {
        self.slots.close();
    }

    pub fn is_closed(&self) -> bool {
        self.slots.is_closed()
    }

    // Nothing panics while holding the lock, a poisoned guard is still consistent
    fn lock(&self) -> MutexGuard<'_, VecDeque<Task>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Producer-side handle to a worker pool's queue
///
/// This is all an ingest adapter gets to see: it can add work, never claim it.
#[derive(Clone)]
pub struct TaskSink {
    queue: Arc<TaskQueue>,
}

impl TaskSink {
    pub(crate) fn new(queue: Arc<TaskQueue>) -> Self {
        Self { queue }
    }

    /// Queue a task, blocking while the queue is full
    ///
    /// Callers acknowledging upstream must do so only after this returns `Ok`.
    pub async fn enqueue(&self, key: impl Into<String>, payload: impl Into<Bytes>) -> Result<()> {
        self.queue.push(Task::new(key, payload)).await
    }

    /// Tasks currently waiting to be claimed
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready_ok, task};

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = TaskQueue::new(4);
        for i in 0..3 {
            queue.push(Task::new(format!("k{i}"), vec![i as u8])).await.unwrap();
        }
        assert_eq!(queue.len(), 3);

        let keys: Vec<String> = std::iter::from_fn(|| queue.try_pop())
            .map(|t| t.key().to_string())
            .collect();
        assert_eq!(keys, vec!["k0", "k1", "k2"]);
        assert!(queue.try_pop().is_none());
    }

    #[tokio::test]
    async fn test_drain_is_bounded_and_frees_slots() {
        let queue = TaskQueue::new(3);
        for i in 0..3 {
            queue.push(Task::new(format!("k{i}"), vec![i as u8])).await.unwrap();
        }

        let first = queue.drain(2);
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].key(), "k0");
        assert_eq!(queue.len(), 1);

        // Two slots came back
        queue.push(Task::new("k3", "3")).await.unwrap();
        queue.push(Task::new("k4", "4")).await.unwrap();
        let keys: Vec<String> = queue.drain(10).iter().map(|t| t.key().to_string()).collect();
        assert_eq!(keys, vec!["k2", "k3", "k4"]);
        assert!(queue.drain(10).is_empty());
    }

    #[test]
    fn test_push_blocks_when_full_until_claim() {
        let queue = Arc::new(TaskQueue::new(1));

        let mut first = task::spawn(queue.push(Task::new("a", "1")));
        assert_ready_ok!(first.poll());

        let mut second = task::spawn(queue.push(Task::new("b", "2")));
        assert_pending!(second.poll());
        assert_eq!(queue.len(), 1);

        // Claiming frees the slot and wakes the blocked producer
        let claimed = queue.try_pop().unwrap();
        assert_eq!(claimed.key(), "a");
        assert!(second.is_woken());
        assert_ready_ok!(second.poll());
        assert_eq!(queue.try_pop().unwrap().key(), "b");
    }

    #[tokio::test]
    async fn test_closed_queue_rejects_and_releases_producers() {
        let queue = Arc::new(TaskQueue::new(1));
        queue.push(Task::new("a", "1")).await.unwrap();

        let blocked = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.push(Task::new("b", "2")).await })
        };
        tokio::task::yield_now().await;
        queue.close();

        assert!(matches!(
            blocked.await.unwrap(),
            Err(AppError::InvalidState(_))
        ));
        assert!(queue.is_closed());
        // Tasks already queued stay claimable
        assert_eq!(queue.try_pop().unwrap().key(), "a");
    }

    #[tokio::test]
    async fn test_sink_enqueue() {
        let queue = Arc::new(TaskQueue::new(8));
        let sink = TaskSink::new(Arc::clone(&queue));
        sink.enqueue("orders-1", Bytes::from_static(b"x")).await.unwrap();
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.capacity(), 8);
        assert_eq!(queue.try_pop().unwrap().payload().as_ref(), b"x");
    }
}
