//! Async bridge: a bounded worker pool behind the non-blocking API
//!
//! Synchronous dispatches are shipped to a fixed set of worker threads over a
//! bounded queue. Each submission gets a [`DispatchHandle`] that resolves
//! with exactly what the synchronous call would have returned. The handle
//! can be awaited from async code or waited on from a plain thread.

use crate::config::SaturationPolicy;
use crate::dispatch::DispatchReceipt;
use crate::error::{ConfigError, DispatchError};
use crate::events::{ClientEvent, EventSink};
use parking_lot::Mutex;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::thread::JoinHandle;
use tokio::sync::oneshot;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Outcome delivered through a [`DispatchHandle`]
pub type DispatchResult = Result<DispatchReceipt, DispatchError>;

/// Fixed-size pool of worker threads fed by a bounded queue
pub struct WorkerPool {
    sender: Mutex<Option<SyncSender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
    capacity: usize,
    policy: SaturationPolicy,
}

impl WorkerPool {
    /// Start `threads` workers sharing a queue of `capacity` pending tasks
    pub fn new(
        threads: usize,
        capacity: usize,
        policy: SaturationPolicy,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, ConfigError> {
        if threads == 0 {
            return Err(ConfigError::invalid("worker_threads", "must be positive"));
        }
        if capacity == 0 {
            return Err(ConfigError::invalid("queue_capacity", "must be positive"));
        }

        let (sender, receiver) = mpsc::sync_channel::<Job>(capacity);
        let receiver = Arc::new(Mutex::new(receiver));
        let mut workers = Vec::with_capacity(threads);
        for index in 0..threads {
            let receiver = receiver.clone();
            let sink = sink.clone();
            let spawned = std::thread::Builder::new()
                .name(format!("spiron-worker-{index}"))
                .spawn(move || worker_loop(index, &receiver, sink.as_ref()));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    // Let the already started workers exit before bailing out.
                    drop(sender);
                    for worker in workers {
                        let _ = worker.join();
                    }
                    return Err(ConfigError::Spawn(e));
                }
            }
        }

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            closed: AtomicBool::new(false),
            capacity,
            policy,
        })
    }

    /// Queue capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Active saturation policy
    pub fn policy(&self) -> SaturationPolicy {
        self.policy
    }

    /// Whether [`close`](Self::close) has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Run `task` on a worker and return a handle to its result
    pub fn spawn<F>(&self, task: F) -> Result<DispatchHandle, DispatchError>
    where
        F: FnOnce() -> DispatchResult + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.submit(Box::new(move || {
            // The caller may have dropped the handle; nothing to report then.
            let _ = tx.send(task());
        }))?;
        Ok(DispatchHandle { receiver: rx })
    }

    fn submit(&self, job: Job) -> Result<(), DispatchError> {
        if self.is_closed() {
            return Err(DispatchError::Closed);
        }
        // Clone the sender so a blocked submission does not hold the lock.
        let sender = self.sender.lock().clone().ok_or(DispatchError::Closed)?;
        match self.policy {
            SaturationPolicy::Block => sender.send(job).map_err(|_| DispatchError::Closed),
            SaturationPolicy::FailFast => sender.try_send(job).map_err(|e| match e {
                TrySendError::Full(_) => DispatchError::Saturated {
                    capacity: self.capacity,
                },
                TrySendError::Disconnected(_) => DispatchError::Closed,
            }),
        }
    }

    /// Stop accepting work, drain queued and running tasks, join the workers
    ///
    /// Calling this more than once is a no-op.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        drop(self.sender.lock().take());
        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            let _ = worker.join();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers.lock().len())
            .field("capacity", &self.capacity)
            .field("policy", &self.policy)
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn worker_loop(index: usize, receiver: &Mutex<Receiver<Job>>, sink: &dyn EventSink) {
    loop {
        let job = receiver.lock().recv();
        let Ok(job) = job else {
            // Every sender is gone and the queue is drained.
            return;
        };
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            sink.emit(&ClientEvent::TaskPanicked { worker: index });
        }
    }
}

/// Pending result of an asynchronous dispatch
///
/// Await it from async code, or call [`wait`](Self::wait) from a thread that
/// is not driving an async runtime.
#[derive(Debug)]
#[must_use = "a dispatch handle does nothing unless awaited or waited on"]
pub struct DispatchHandle {
    receiver: oneshot::Receiver<DispatchResult>,
}

impl DispatchHandle {
    /// Block the current thread until the dispatch finishes
    ///
    /// Panics if called from within an async runtime; await the handle there.
    pub fn wait(self) -> DispatchResult {
        self.receiver
            .blocking_recv()
            .unwrap_or(Err(DispatchError::WorkerLost))
    }
}

impl Future for DispatchHandle {
    type Output = DispatchResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(DispatchError::WorkerLost)))
    }
}
