//! Fixed-size pool of external worker processes.
//!
//! Each worker slot owns one child process plus the buffering state the
//! scheduler needs for it: the unwritten tail of the query currently being sent
//! and the output bytes not yet parsed into a record.
//!
//! ```text
//!                  ┌──────────────────────┐
//!    queries ────► │      Scheduler       │ ────► results
//!                  └──┬───────┬───────┬───┘
//!               stdin │ stdout│       │
//!                  ┌──▼───┐┌──▼───┐┌──▼───┐
//!                  │ w 0  ││ w 1  ││ w N  │
//!                  └──────┘└──────┘└──────┘
//! ```

mod ipc;
mod proc;
mod signals;
mod spawn;

pub use ipc::PipeFd;
pub use proc::Proc;
pub use signals::{TerminationReason, analyze_wait_status};
pub use spawn::spawn_worker;

use crate::error::{Error, Result};
use crate::launch::LaunchSpec;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long an aborted worker gets to honor SIGTERM before SIGKILL.
const ABORT_GRACE: Duration = Duration::from_secs(2);

/// How long a worker that closed its output gets to exit on its own.
const EXIT_GRACE: Duration = Duration::from_secs(30);

/// How the pool is being shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownMode {
    /// All work finished; wait for workers and report abnormal exits.
    Graceful,
    /// The run failed or was abandoned; terminate workers, ignore statuses.
    Abort,
}

/// Per-worker process handle and I/O buffers.
#[derive(Debug)]
pub struct Worker {
    id: usize,
    proc: Proc,
    /// Query bytes not yet accepted by the worker's stdin.
    pub(crate) query_buf: Vec<u8>,
    /// Output bytes not yet parsed into a record.
    pub(crate) result_buf: Vec<u8>,
    pub(crate) queries_sent: usize,
    pub(crate) records_received: usize,
}

impl Worker {
    fn new(id: usize, proc: Proc) -> Self {
        Self {
            id,
            proc,
            query_buf: Vec::new(),
            result_buf: Vec::new(),
            queries_sent: 0,
            records_received: 0,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn pid(&self) -> i32 {
        self.proc.pid().as_raw()
    }

    pub fn proc(&self) -> &Proc {
        &self.proc
    }

    pub fn is_writable(&self) -> bool {
        self.proc.stdin().is_some()
    }

    pub fn is_readable(&self) -> bool {
        self.proc.stdout().is_some()
    }

    pub fn is_closed(&self) -> bool {
        !self.is_writable() && !self.is_readable()
    }

    /// Close the write side. Any unsent query bytes are discarded.
    pub(crate) fn close_input(&mut self) {
        if self.proc.close_stdin() {
            if !self.query_buf.is_empty() {
                warn!(
                    worker_id = self.id,
                    unsent_bytes = self.query_buf.len(),
                    "Closing worker input with a partially written query"
                );
                self.query_buf.clear();
            }
            debug!(
                worker_id = self.id,
                queries_sent = self.queries_sent,
                "Closed worker input"
            );
        }
    }

    pub(crate) fn close_output(&mut self) {
        if self.proc.close_stdout() {
            debug!(
                worker_id = self.id,
                records = self.records_received,
                "Worker closed its output"
            );
        }
    }

    pub(crate) fn stdin(&self) -> Option<&PipeFd> {
        self.proc.stdin()
    }

    pub(crate) fn stdout(&self) -> Option<&PipeFd> {
        self.proc.stdout()
    }

    /// Reap the worker, returning an error if it did not exit cleanly.
    fn finish(&mut self) -> Result<()> {
        self.close_input();
        self.close_output();
        let reason = match self.proc.wait_timeout(EXIT_GRACE)? {
            Some(reason) => reason.clone(),
            None => {
                warn!(
                    worker_id = self.id,
                    pid = self.pid(),
                    "Worker did not exit after closing its output; terminating"
                );
                self.proc.stop(ABORT_GRACE)?.clone()
            }
        };
        if reason.is_success() {
            Ok(())
        } else {
            Err(Error::WorkerExit {
                worker_id: self.id,
                pid: self.pid(),
                reason: reason.description(),
            })
        }
    }
}

/// A fixed set of worker processes for one scheduling run.
#[derive(Debug)]
pub struct WorkerPool {
    workers: Vec<Worker>,
    torn_down: bool,
}

impl WorkerPool {
    /// Spawn `count` workers from `launch`.
    ///
    /// If any spawn fails, workers already started are terminated and reaped.
    pub fn spawn(count: usize, launch: &LaunchSpec, fields: &[String]) -> Result<Self> {
        if count == 0 {
            return Err(Error::Config("worker count must be positive".into()));
        }
        launch.validate()?;

        info!(
            workers = count,
            program = launch.program(),
            "Spawning worker pool"
        );

        let mut pool = Self {
            workers: Vec::with_capacity(count),
            torn_down: false,
        };
        for id in 0..count {
            let proc = spawn_worker(launch, fields)?;
            debug!(worker_id = id, pid = proc.pid().as_raw(), "Worker spawned");
            pool.workers.push(Worker::new(id, proc));
        }
        Ok(pool)
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn workers(&self) -> &[Worker] {
        &self.workers
    }

    pub(crate) fn workers_mut(&mut self) -> &mut [Worker] {
        &mut self.workers
    }

    pub fn pids(&self) -> Vec<i32> {
        self.workers.iter().map(Worker::pid).collect()
    }

    /// True once every worker has both pipes closed.
    pub fn all_closed(&self) -> bool {
        self.workers.iter().all(Worker::is_closed)
    }

    /// Close all pipes and reap every worker.
    ///
    /// In [`TeardownMode::Graceful`] the first abnormal exit is returned after
    /// all workers are reaped. Calling this more than once is a no-op.
    pub fn teardown(&mut self, mode: TeardownMode) -> Result<()> {
        if self.torn_down {
            return Ok(());
        }
        self.torn_down = true;

        // Close every stdin first so all workers see EOF concurrently.
        for worker in &mut self.workers {
            worker.close_input();
        }

        let mut first_error = None;
        for worker in &mut self.workers {
            let result = match mode {
                TeardownMode::Graceful => worker.finish(),
                TeardownMode::Abort => worker.proc.stop(ABORT_GRACE).map(|reason| {
                    debug!(worker_id = worker.id, %reason, "Worker stopped");
                }),
            };
            if let Err(e) = result {
                warn!(worker_id = worker.id, error = %e, "Worker teardown failed");
                first_error.get_or_insert(e);
            }
        }

        info!(workers = self.workers.len(), ?mode, "Worker pool torn down");

        match (mode, first_error) {
            (TeardownMode::Graceful, Some(e)) => Err(e),
            _ => Ok(()),
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        let _ = self.teardown(TeardownMode::Abort);
    }
}
