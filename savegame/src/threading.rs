//! Funnels world access from worker threads back to the thread that owns the world.

use std::{
    panic,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex, MutexGuard, PoisonError,
    },
    thread::{self, ThreadId},
    time::Duration,
};

use crossbeam_channel::{bounded, select, unbounded, Receiver, RecvTimeoutError, Sender};
use rayon::{prelude::*, ThreadPool};
use tracing::trace;

use crate::{Error, Result};

type Task<W> = Box<dyn FnOnce(&mut W) + Send>;

/// Main thread task queue for one parallel phase.
///
/// Created on the main thread, which it treats as the only thread allowed to touch the world.
/// Workers hand it closures through [`ThreadScope::call`]; the main thread runs them in FIFO
/// order whenever it pumps the queue.
pub struct ThreadScope<'w, W> {
    main: ThreadId,
    tx: Sender<Task<W>>,
    rx: Receiver<Task<W>>,
    world: Mutex<&'w mut W>,
    poll_interval: Duration,
    closed: AtomicBool,
}

/// Closes the queue if the main thread unwinds while running tasks, so blocked workers
/// see [`Error::ThreadQueueClosed`] instead of waiting for a pump that never comes.
struct CloseOnUnwind<'s, 'w, W>(&'s ThreadScope<'w, W>);

impl<W> Drop for CloseOnUnwind<'_, '_, W> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.close();
        }
    }
}

impl<W> ThreadScope<'_, W> {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stops accepting tasks and drops the ones still queued, waking their callers.
    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let dropped = self.rx.try_iter().count();
        trace!("closed main thread queue, dropped {dropped} tasks");
    }
}

impl<'w, W: Send> ThreadScope<'w, W> {
    pub fn new(world: &'w mut W, poll_interval: Duration) -> Self {
        let (tx, rx) = unbounded();
        Self {
            main: thread::current().id(),
            tx,
            rx,
            world: Mutex::new(world),
            poll_interval,
            closed: AtomicBool::new(false),
        }
    }

    pub fn is_main_thread(&self) -> bool {
        thread::current().id() == self.main
    }

    fn world(&self) -> MutexGuard<'_, &'w mut W> {
        self.world.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` against the world on the main thread and returns its result.
    ///
    /// On the main thread the queue is drained first so earlier tasks keep their order, then
    /// `f` runs inline. Elsewhere the calling worker blocks until the main thread has run it.
    pub fn call<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut W) -> R + Send + 'static,
    {
        if self.is_main_thread() {
            self.pump();
            return Ok(f(&mut self.world()));
        }

        if self.is_closed() {
            return Err(Error::ThreadQueueClosed);
        }
        let (reply_tx, reply_rx) = bounded(1);
        self.tx
            .send(Box::new(move |world: &mut W| {
                let _ = reply_tx.send(f(world));
            }))
            .map_err(|_| Error::ThreadQueueClosed)?;

        loop {
            match reply_rx.recv_timeout(self.poll_interval) {
                Ok(result) => return Ok(result),
                // A task sent just as the queue closed is never run.
                Err(RecvTimeoutError::Timeout) if self.is_closed() => {
                    return reply_rx.try_recv().map_err(|_| Error::ThreadQueueClosed)
                }
                Err(RecvTimeoutError::Timeout) => thread::yield_now(),
                Err(RecvTimeoutError::Disconnected) => return Err(Error::ThreadQueueClosed),
            }
        }
    }

    /// Runs every queued task. Returns how many ran.
    pub fn pump(&self) -> usize {
        let _guard = CloseOnUnwind(self);
        let mut count = 0;
        while let Ok(task) = self.rx.try_recv() {
            task(&mut self.world());
            count += 1;
        }
        if count > 0 {
            trace!("pumped {count} main thread tasks");
        }
        count
    }

    /// Pumps the queue until `done` yields a value or disconnects.
    pub fn pump_until<T>(&self, done: &Receiver<T>) -> Option<T> {
        let _guard = CloseOnUnwind(self);
        loop {
            select! {
                recv(self.rx) -> task => {
                    if let Ok(task) = task {
                        task(&mut self.world());
                    }
                }
                recv(done) -> result => {
                    self.pump();
                    return result.ok();
                }
                default(self.poll_interval) => {}
            }
        }
    }

    /// Runs `f` over `items` on `pool` while the calling (main) thread services the queue.
    ///
    /// The first error wins. A panicking worker is re-raised on the caller once the phase has
    /// wound down.
    pub fn run_parallel<T, F>(&self, pool: &ThreadPool, items: &mut [T], f: F) -> Result<()>
    where
        T: Send,
        F: Fn(&mut T) -> Result<()> + Sync,
    {
        let (done_tx, done_rx) = bounded(1);
        let f = &f;
        thread::scope(|s| {
            // Owns the sender, so a panic in the pool disconnects `done_rx`.
            let phase = s.spawn(move || {
                let result = pool.install(|| items.par_iter_mut().try_for_each(|item| f(item)));
                let _ = done_tx.send(result);
            });
            let result = self.pump_until(&done_rx);
            match phase.join() {
                Ok(()) => result.unwrap_or(Err(Error::ThreadQueueClosed)),
                Err(payload) => panic::resume_unwind(payload),
            }
        })
    }
}
