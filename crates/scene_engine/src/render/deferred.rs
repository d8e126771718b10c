//! Cross-thread deferred GPU task queue
//!
//! The render state machine belongs to the render thread. Any other thread
//! that needs a GPU object (a texture created while handling a gameplay event,
//! buffers released from a component's `death`) wraps the work in a
//! [`GpuTask`] and submits it here. At the next frame boundary the render
//! thread swaps the live queue with its own secondary buffer and runs every
//! task outside the lock, then wakes the waiters of that generation.
//!
//! Ordering is FIFO within one swap. Once submitted, a task runs; there is no
//! cancellation.

use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::state::RenderStateMachine;
use super::{RenderError, RenderResult};

/// Work executed on the render thread at the next frame boundary
pub type GpuTask = Box<dyn FnOnce(&mut RenderStateMachine) + Send + 'static>;

struct QueueState {
    tasks: Vec<GpuTask>,
    /// Generation handed to the render thread by the latest swap
    swapped: u64,
    /// Latest generation fully executed
    completed: u64,
    closed: bool,
}

/// Double-buffered queue of GPU tasks shared by the update and render threads
pub struct GpuTaskQueue {
    state: Mutex<QueueState>,
    drained: Condvar,
    render_thread: Mutex<Option<ThreadId>>,
}

impl GpuTaskQueue {
    /// Create an empty queue, ready to be shared
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(QueueState {
                tasks: Vec::new(),
                swapped: 0,
                completed: 0,
                closed: false,
            }),
            drained: Condvar::new(),
            render_thread: Mutex::new(None),
        })
    }

    /// Record the calling thread as the render thread
    pub fn bind_render_thread(&self) {
        let current = thread::current().id();
        let mut render_thread = self.render_thread.lock();
        match *render_thread {
            Some(id) if id == current => {}
            Some(_) => {
                log::warn!("Render thread changed to {:?}", current);
                *render_thread = Some(current);
            }
            None => {
                log::debug!("Render thread bound to {:?}", current);
                *render_thread = Some(current);
            }
        }
    }

    /// Whether the caller is the bound render thread
    pub fn is_render_thread(&self) -> bool {
        *self.render_thread.lock() == Some(thread::current().id())
    }

    /// Enqueue a task without waiting for it
    ///
    /// Allowed from any thread, including the render thread itself (the task
    /// then runs at the following frame boundary).
    pub fn submit(self: &Arc<Self>, task: GpuTask) -> RenderResult<TaskTicket> {
        let mut state = self.state.lock();
        if state.closed {
            log::error!("GPU task submitted after the queue was closed");
            return Err(RenderError::QueueClosed);
        }
        state.tasks.push(task);
        Ok(TaskTicket {
            queue: Arc::clone(self),
            generation: state.swapped + 1,
        })
    }

    /// Enqueue a task and block until the render thread has executed it
    ///
    /// Returns the drained-frame counter observed after the wait.
    pub fn submit_and_wait(self: &Arc<Self>, task: GpuTask) -> RenderResult<u64> {
        if self.is_render_thread() {
            log::error!("Blocking GPU task submitted from the render thread");
            return Err(RenderError::WouldDeadlock);
        }
        self.submit(task)?.wait()
    }

    /// Run a closure on the render thread and hand its result back
    pub fn run<R, F>(self: &Arc<Self>, task: F) -> RenderResult<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut RenderStateMachine) -> R + Send + 'static,
    {
        let slot = Arc::new(Mutex::new(None));
        let output = Arc::clone(&slot);
        self.submit_and_wait(Box::new(move |state: &mut RenderStateMachine| {
            *output.lock() = Some(task(state));
        }))?;

        let result = slot.lock().take();
        result.ok_or(RenderError::TaskPanicked)
    }

    /// Number of frame boundaries that have drained the queue
    pub fn frames_drained(&self) -> u64 {
        self.state.lock().completed
    }

    /// Number of tasks waiting for the next frame boundary
    pub fn pending(&self) -> usize {
        self.state.lock().tasks.len()
    }

    /// Stop accepting tasks and release every waiter
    ///
    /// Tasks still queued are dropped; their waiters receive
    /// [`RenderError::QueueClosed`]. Tasks already handed to the render thread
    /// still complete, and their waiters keep waiting for that frame boundary.
    pub fn close(&self) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        if !state.tasks.is_empty() {
            log::warn!("Dropping {} GPU tasks on queue shutdown", state.tasks.len());
            state.tasks.clear();
        }
        self.drained.notify_all();
    }

    /// Whether [`GpuTaskQueue::close`] has been called
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Swap the live queue into `into` and return its generation
    pub(crate) fn swap_pending(&self, into: &mut Vec<GpuTask>) -> u64 {
        let mut state = self.state.lock();
        std::mem::swap(&mut state.tasks, into);
        state.swapped += 1;
        state.swapped
    }

    /// Mark a swapped generation executed and wake its waiters
    pub(crate) fn mark_completed(&self, generation: u64) {
        let mut state = self.state.lock();
        state.completed = state.completed.max(generation);
        self.drained.notify_all();
    }

    fn wait_for(&self, generation: u64, deadline: Option<Instant>) -> RenderResult<u64> {
        let mut state = self.state.lock();
        while state.completed < generation {
            // Dropped by close(): never reached the render thread
            if state.closed && generation > state.swapped {
                return Err(RenderError::QueueClosed);
            }
            if self.is_render_thread() {
                return Err(RenderError::WouldDeadlock);
            }
            match deadline {
                Some(deadline) => {
                    if self.drained.wait_until(&mut state, deadline).timed_out()
                        && state.completed < generation
                    {
                        return Err(RenderError::Timeout);
                    }
                }
                None => self.drained.wait(&mut state),
            }
        }
        Ok(state.completed)
    }
}

/// Handle to a submitted task
#[must_use = "a ticket does nothing unless waited on"]
pub struct TaskTicket {
    queue: Arc<GpuTaskQueue>,
    generation: u64,
}

impl TaskTicket {
    /// Frame-boundary generation the task will run in
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the task has already run
    pub fn is_done(&self) -> bool {
        self.queue.frames_drained() >= self.generation
    }

    /// Block until the task has run; returns the drained-frame counter
    pub fn wait(self) -> RenderResult<u64> {
        self.queue.wait_for(self.generation, None)
    }

    /// Block for at most `timeout`
    pub fn wait_timeout(self, timeout: Duration) -> RenderResult<u64> {
        self.queue.wait_for(self.generation, Some(Instant::now() + timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_generations() {
        let queue = GpuTaskQueue::new();
        let ticket = queue.submit(Box::new(|_: &mut RenderStateMachine| {})).unwrap();
        assert_eq!(ticket.generation(), 1);
        assert!(!ticket.is_done());

        let mut buffer = Vec::new();
        let generation = queue.swap_pending(&mut buffer);
        assert_eq!(generation, 1);
        assert_eq!(buffer.len(), 1);
        assert_eq!(queue.pending(), 0);

        // Submitted after the swap: belongs to the next frame
        let late = queue.submit(Box::new(|_: &mut RenderStateMachine| {})).unwrap();
        assert_eq!(late.generation(), 2);

        queue.mark_completed(generation);
        assert!(ticket.is_done());
        assert_eq!(ticket.wait().unwrap(), 1);
    }

    #[test]
    fn test_wait_timeout_without_render_thread() {
        let queue = GpuTaskQueue::new();
        let ticket = queue.submit(Box::new(|_: &mut RenderStateMachine| {})).unwrap();
        let result = ticket.wait_timeout(Duration::from_millis(10));
        assert!(matches!(result, Err(RenderError::Timeout)));
    }

    #[test]
    fn test_blocking_submit_on_render_thread_is_rejected() {
        let queue = GpuTaskQueue::new();
        queue.bind_render_thread();

        let ran = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ran);
        let result = queue.submit_and_wait(Box::new(move |_: &mut RenderStateMachine| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        assert!(matches!(result, Err(RenderError::WouldDeadlock)));
        assert_eq!(queue.pending(), 0);
    }

    #[test]
    fn test_close_releases_waiters() {
        let queue = GpuTaskQueue::new();
        let ticket = queue.submit(Box::new(|_: &mut RenderStateMachine| {})).unwrap();

        let closer = Arc::clone(&queue);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            closer.close();
        });

        assert!(matches!(ticket.wait(), Err(RenderError::QueueClosed)));
        handle.join().unwrap();
        assert!(matches!(queue.submit(Box::new(|_: &mut RenderStateMachine| {})), Err(RenderError::QueueClosed)));
    }

    #[test]
    fn test_close_keeps_in_flight_generation() {
        let queue = GpuTaskQueue::new();
        let ticket = queue.submit(Box::new(|_: &mut RenderStateMachine| {})).unwrap();

        let mut buffer = Vec::new();
        let generation = queue.swap_pending(&mut buffer);
        queue.close();

        let finisher = Arc::clone(&queue);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            finisher.mark_completed(generation);
        });

        assert_eq!(ticket.wait().unwrap(), 1);
        handle.join().unwrap();
    }
}
