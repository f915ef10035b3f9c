//! Bounded FIFO queue feeding the worker pool.
//!
//! Admission never blocks: when the queue holds `capacity` tasks, further
//! enqueues fail immediately and hand the task back to the caller. Tasks are
//! dequeued strictly in arrival order; nothing is reordered by zoom, priority
//! or position.
//!
//! # Example
//!
//! ```ignore
//! let queue = DispatchQueue::new(80);
//! queue.try_enqueue(task)?;
//!
//! // In a worker
//! while let Some(task) = queue.dequeue().await {
//!     task.execute(&limiter, &in_flight, timeout).await;
//! }
//! ```

use std::collections::VecDeque;
use std::fmt;

use parking_lot::Mutex;
use tokio::sync::Notify;

use super::task::FetchTask;
use crate::coord::TileCoordinate;

/// Why a task was not admitted. The task is handed back unchanged.
pub enum EnqueueError {
    /// The queue already holds `capacity` tasks.
    Full(FetchTask),
    /// The queue has been closed.
    Closed(FetchTask),
}

impl EnqueueError {
    pub fn into_task(self) -> FetchTask {
        match self {
            Self::Full(task) | Self::Closed(task) => task,
        }
    }
}

impl fmt::Debug for EnqueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(task) => f.debug_tuple("Full").field(task).finish(),
            Self::Closed(task) => f.debug_tuple("Closed").field(task).finish(),
        }
    }
}

struct QueueState {
    tasks: VecDeque<FetchTask>,
    closed: bool,
}

/// Thread-safe bounded FIFO of pending fetch tasks.
///
/// Submission is synchronous and may come from any thread. Workers wait
/// asynchronously for tasks.
pub struct DispatchQueue {
    state: Mutex<QueueState>,
    capacity: usize,
    notify: Notify,
}

impl DispatchQueue {
    /// Creates an empty queue holding at most `capacity` tasks.
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                tasks: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            capacity,
            notify: Notify::new(),
        }
    }

    /// Appends a task unless the queue is full or closed.
    pub fn try_enqueue(&self, task: FetchTask) -> Result<(), EnqueueError> {
        {
            let mut state = self.state.lock();
            if state.closed {
                return Err(EnqueueError::Closed(task));
            }
            if state.tasks.len() >= self.capacity {
                return Err(EnqueueError::Full(task));
            }
            state.tasks.push_back(task);
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Removes the oldest task without waiting.
    pub fn try_dequeue(&self) -> Option<FetchTask> {
        self.state.lock().tasks.pop_front()
    }

    /// Waits for the oldest task.
    ///
    /// Returns `None` once the queue is closed.
    pub async fn dequeue(&self) -> Option<FetchTask> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before inspecting state so a close() in between is seen
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if let Some(task) = state.tasks.pop_front() {
                    let more = !state.tasks.is_empty();
                    drop(state);
                    if more {
                        self.notify.notify_one();
                    }
                    return Some(task);
                }
                if state.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Removes every queued task matching `predicate`, preserving the order
    /// of the remaining tasks.
    pub fn remove_matching<F>(&self, mut predicate: F) -> Vec<FetchTask>
    where
        F: FnMut(&FetchTask) -> bool,
    {
        let mut state = self.state.lock();
        let mut removed = Vec::new();
        let mut kept = VecDeque::with_capacity(state.tasks.len());
        for task in state.tasks.drain(..) {
            if predicate(&task) {
                removed.push(task);
            } else {
                kept.push_back(task);
            }
        }
        state.tasks = kept;
        removed
    }

    /// Closes the queue, returning the tasks that never ran.
    ///
    /// Waiting workers are woken and observe the close. Later enqueues fail
    /// with [`EnqueueError::Closed`].
    pub fn close(&self) -> Vec<FetchTask> {
        let drained = {
            let mut state = self.state.lock();
            state.closed = true;
            state.tasks.drain(..).collect()
        };
        self.notify.notify_waiters();
        drained
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn len(&self) -> usize {
        self.state.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().tasks.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the coordinates of queued tasks in arrival order.
    pub fn pending_coordinates(&self) -> Vec<TileCoordinate> {
        self.state
            .lock()
            .tasks
            .iter()
            .map(FetchTask::coordinate)
            .collect()
    }
}

impl fmt::Debug for DispatchQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("DispatchQueue")
            .field("len", &state.tasks.len())
            .field("capacity", &self.capacity)
            .field("closed", &state.closed)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
