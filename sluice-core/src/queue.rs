use crate::{Context, DbError, ErrorKind, Result, codes, log_error};
use std::{
    collections::VecDeque,
    fmt::{self, Debug, Formatter},
    mem,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc, Mutex, PoisonError, RwLock,
        atomic::{AtomicU8, Ordering},
    },
    thread::{self, JoinHandle},
};

pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

enum Message {
    Run(Arc<Lane>),
    Shutdown,
}

#[derive(Default)]
struct LaneState {
    jobs: VecDeque<Job>,
    /// A worker owns the lane: it was sent on the channel and is not drained yet.
    scheduled: bool,
}

/// FIFO of pending invocations of one connection. Only the worker that got the lane from
/// the channel pops from it, so the jobs of one connection never run concurrently.
#[derive(Default)]
pub(crate) struct Lane {
    state: Mutex<LaneState>,
}

impl Lane {
    fn drain(&self) {
        loop {
            let job = {
                let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
                match state.jobs.pop_front() {
                    Some(job) => job,
                    None => {
                        state.scheduled = false;
                        return;
                    }
                }
            };
            if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(job)) {
                log::error!(
                    "Invocation panicked on {}: {}",
                    thread::current().name().unwrap_or("worker"),
                    panic_message(&*panic)
                );
            }
        }
    }

    pub(crate) fn pending(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .jobs
            .len()
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "Unknown panic".into()
    }
}

struct PoolInner {
    sender: flume::Sender<Message>,
    closed: RwLock<bool>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
}

impl PoolInner {
    fn close(&self) -> bool {
        let mut closed = self.closed.write().unwrap_or_else(PoisonError::into_inner);
        if *closed {
            return false;
        }
        *closed = true;
        for _ in 0..self.size {
            let _ = self.sender.send(Message::Shutdown);
        }
        true
    }
}

impl Drop for PoolInner {
    fn drop(&mut self) {
        // Workers finish the accepted invocations and exit on their own.
        self.close();
    }
}

/// Fixed set of worker threads executing queued invocations.
///
/// Workers receive connection lanes from a shared channel and drain them one at a time:
/// invocations of the same connection run in enqueue order, different connections run
/// in parallel with no ordering between them.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

impl WorkerPool {
    /// Start `max_threads` workers (at least one).
    pub fn new(max_threads: usize) -> Result<Self> {
        let size = max_threads.max(1);
        let (sender, receiver) = flume::unbounded::<Message>();
        let mut threads = Vec::with_capacity(size);
        for i in 0..size {
            let receiver = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("sluice-worker-{}", i))
                .spawn(move || {
                    while let Ok(Message::Run(lane)) = receiver.recv() {
                        lane.drain();
                    }
                    log::trace!(
                        "{} stopped",
                        thread::current().name().unwrap_or("worker")
                    );
                })
                .with_context(|| format!("While starting worker {} of {}", i, size))?;
            threads.push(handle);
        }
        log::debug!("Started {} worker threads", size);
        Ok(Self {
            inner: Arc::new(PoolInner {
                sender,
                closed: RwLock::new(false),
                threads: Mutex::new(threads),
                size,
            }),
        })
    }

    pub fn threads(&self) -> usize {
        self.inner.size
    }

    pub fn is_closed(&self) -> bool {
        *self
            .inner
            .closed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Stop accepting invocations, let the workers drain the accepted ones and wait for
    /// them. Called from a worker thread it does not wait for that thread.
    pub fn shutdown(&self) {
        if self.inner.close() {
            log::debug!("Shutting down {} worker threads", self.inner.size);
        }
        let threads = mem::take(
            &mut *self
                .inner
                .threads
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        let current = thread::current().id();
        for handle in threads {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                log::error!("A worker thread terminated with a panic");
            }
        }
    }

    pub(crate) fn lane(&self) -> Arc<Lane> {
        Default::default()
    }

    /// Append `job` to the lane and hand the lane to a worker unless one already owns it.
    pub(crate) fn enqueue(&self, lane: &Arc<Lane>, job: Job) -> Result<()> {
        let closed = self
            .inner
            .closed
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        if *closed {
            return Err(log_error!(anyhow::Error::from(DbError::new(
                ErrorKind::Connection,
                codes::POOL_CLOSED,
                "The worker pool is shut down and does not accept invocations",
            ))));
        }
        let schedule = {
            let mut state = lane.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.jobs.push_back(job);
            !mem::replace(&mut state.scheduled, true)
        };
        if schedule && self.inner.sender.send(Message::Run(lane.clone())).is_err() {
            return Err(log_error!(anyhow::Error::from(DbError::new(
                ErrorKind::Connection,
                codes::POOL_CLOSED,
                "Every worker thread has stopped",
            ))));
        }
        Ok(())
    }
}

impl Debug for WorkerPool {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("threads", &self.inner.size)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Lifecycle of one queued invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum InvocationState {
    Queued = 0,
    Running = 1,
    Completed = 2,
    Failed = 3,
}

impl InvocationState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => InvocationState::Queued,
            1 => InvocationState::Running,
            2 => InvocationState::Completed,
            _ => InvocationState::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, InvocationState::Completed | InvocationState::Failed)
    }
}

/// Handle returned by the enqueue operation, observes the invocation state.
#[derive(Debug, Clone)]
pub struct Ticket {
    state: Arc<AtomicU8>,
}

impl Ticket {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(InvocationState::Queued as u8)),
        }
    }

    pub(crate) fn set(&self, state: InvocationState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn state(&self) -> InvocationState {
        InvocationState::from_u8(self.state.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::mpsc, time::Duration};

    #[test]
    fn lane_order() {
        let pool = WorkerPool::new(4).unwrap();
        let lane = pool.lane();
        let (tx, rx) = mpsc::channel();
        for i in 0..100 {
            let tx = tx.clone();
            pool.enqueue(
                &lane,
                Box::new(move || {
                    if i % 10 == 0 {
                        thread::sleep(Duration::from_millis(1));
                    }
                    tx.send(i).unwrap();
                }),
            )
            .unwrap();
        }
        drop(tx);
        let received: Vec<i32> = rx.iter().collect();
        assert_eq!(received, (0..100).collect::<Vec<_>>());
        assert_eq!(lane.pending(), 0);
        pool.shutdown();
    }

    #[test]
    fn lanes_run_in_parallel() {
        let pool = WorkerPool::new(2).unwrap();
        let (first, second) = (pool.lane(), pool.lane());
        let (tx, rx) = mpsc::channel();
        let (unblock, blocked) = mpsc::channel::<()>();
        pool.enqueue(
            &first,
            Box::new(move || {
                blocked.recv_timeout(Duration::from_secs(10)).unwrap();
            }),
        )
        .unwrap();
        pool.enqueue(&second, Box::new(move || tx.send("second").unwrap()))
            .unwrap();
        // The second lane completes while the first one is still blocked.
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(10)).unwrap(),
            "second"
        );
        unblock.send(()).unwrap();
        pool.shutdown();
    }

    #[test]
    fn shutdown_drains_and_rejects() {
        let pool = WorkerPool::new(1).unwrap();
        let lane = pool.lane();
        let (tx, rx) = mpsc::channel();
        for i in 0..10 {
            let tx = tx.clone();
            pool.enqueue(&lane, Box::new(move || tx.send(i).unwrap()))
                .unwrap();
        }
        pool.shutdown();
        assert!(pool.is_closed());
        assert_eq!(rx.try_iter().count(), 10);

        let error = pool
            .enqueue(&lane, Box::new(move || tx.send(10).unwrap()))
            .unwrap_err();
        let error = error.downcast_ref::<DbError>().unwrap();
        assert_eq!(error.code(), codes::POOL_CLOSED);
        assert_eq!(error.kind(), ErrorKind::Connection);
    }

    #[test]
    fn worker_survives_panic() {
        let pool = WorkerPool::new(1).unwrap();
        let lane = pool.lane();
        let (tx, rx) = mpsc::channel();
        pool.enqueue(&lane, Box::new(|| panic!("boom"))).unwrap();
        pool.enqueue(&lane, Box::new(move || tx.send(()).unwrap()))
            .unwrap();
        assert!(rx.recv_timeout(Duration::from_secs(10)).is_ok());
        pool.shutdown();
    }

    #[test]
    fn ticket_states() {
        let ticket = Ticket::new();
        assert_eq!(ticket.state(), InvocationState::Queued);
        ticket.set(InvocationState::Running);
        assert!(!ticket.state().is_terminal());
        ticket.clone().set(InvocationState::Failed);
        assert_eq!(ticket.state(), InvocationState::Failed);
        assert!(ticket.state().is_terminal());
        assert_eq!(panic_message(&"message"), "message");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42), "Unknown panic");
    }
}
