//! Cross-thread dispatch - host callbacks always run on the owner thread
//!
//! Design: the thread that calls `init` owns the host. A callback needed on
//! any other thread is boxed into a job, sent over a flume channel to the
//! owner and awaited on a one-shot completion channel, so the caller still
//! sees a synchronous call. The owner drains jobs with `process_pending`
//! (from its event loop) or `process_one` (blocking).
//!
//! There are no timeouts: a job either completes or the caller waits.

use crate::error::ProtocolError;
use flume::{bounded, unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::thread::{self, ThreadId};
use tracing::{debug, trace};

type Job = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct Queue {
    owner: Option<ThreadId>,
    sender: Option<Sender<Job>>,
    receiver: Option<Receiver<Job>>,
}

enum Route {
    Inline,
    Queue(Sender<Job>),
}

/// Hand-off queue to the owner thread
pub struct Dispatcher {
    bound: usize,
    queue: Mutex<Queue>,
}

impl Dispatcher {
    /// `bound` limits queued jobs; 0 means unbounded
    pub fn new(bound: usize) -> Self {
        Self {
            bound,
            queue: Mutex::new(Queue::default()),
        }
    }

    /// Make the calling thread the owner and open a fresh queue
    pub fn bind_owner(&self) {
        let (sender, receiver) = if self.bound == 0 {
            unbounded()
        } else {
            bounded(self.bound)
        };
        let mut queue = self.queue.lock();
        queue.owner = Some(thread::current().id());
        queue.sender = Some(sender);
        queue.receiver = Some(receiver);
        debug!(event = "dispatch_owner_bound", owner = ?queue.owner, bound = self.bound);
    }

    /// Close the queue; jobs still queued are dropped and their callers fail
    pub fn close(&self) {
        let mut queue = self.queue.lock();
        queue.owner = None;
        queue.sender = None;
        queue.receiver = None;
    }

    pub fn owner(&self) -> Option<ThreadId> {
        self.queue.lock().owner
    }

    /// Whether the calling thread may talk to the host directly
    pub fn is_owner(&self) -> bool {
        match self.queue.lock().owner {
            Some(owner) => owner == thread::current().id(),
            None => true,
        }
    }

    fn route(&self) -> Result<Route, ProtocolError> {
        let queue = self.queue.lock();
        match queue.owner {
            None => Ok(Route::Inline),
            Some(owner) if owner == thread::current().id() => Ok(Route::Inline),
            Some(_) => queue
                .sender
                .clone()
                .map(Route::Queue)
                .ok_or(ProtocolError::DispatchAbandoned),
        }
    }

    /// Run `job` on the owner thread and wait for its result
    ///
    /// Runs inline when already on the owner thread, or when no owner is
    /// bound yet.
    pub fn run<R, F>(&self, job: F) -> Result<R, ProtocolError>
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        let sender = match self.route()? {
            Route::Inline => return Ok(job()),
            Route::Queue(sender) => sender,
        };

        let (done_tx, done_rx) = bounded(1);
        sender
            .send(Box::new(move || {
                let _ = done_tx.send(job());
            }))
            .map_err(|_| ProtocolError::DispatchAbandoned)?;
        drop(sender);
        trace!(event = "dispatch_enqueued");

        done_rx.recv().map_err(|_| ProtocolError::DispatchAbandoned)
    }

    fn receiver(&self) -> Option<Receiver<Job>> {
        self.queue.lock().receiver.clone()
    }

    /// Run every job queued so far without blocking; returns how many ran
    pub fn process_pending(&self) -> usize {
        let Some(receiver) = self.receiver() else {
            return 0;
        };
        let mut ran = 0;
        while let Ok(job) = receiver.try_recv() {
            job();
            ran += 1;
        }
        if ran > 0 {
            trace!(event = "dispatch_drained", jobs = ran);
        }
        ran
    }

    /// Block until one job arrives and run it; `false` once closed
    pub fn process_one(&self) -> bool {
        let Some(receiver) = self.receiver() else {
            return false;
        };
        match receiver.recv() {
            Ok(job) => {
                job();
                true
            }
            Err(_) => false,
        }
    }

    pub fn pending(&self) -> usize {
        self.receiver().map_or(0, |r| r.len())
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(0)
    }
}
