//! Readiness-driven scheduler multiplexing all worker pipes.
//!
//! A single thread owns every worker's buffers. Each pass blocks in `poll(2)`
//! until some pipe is ready, then:
//!
//! 1. reads at most one chunk from every readable worker and parses as many
//!    complete records as its buffer holds;
//! 2. writes to every writable worker, continuing a partially sent query or
//!    pulling the next one from the feeder. When the feeder is exhausted the
//!    worker's stdin is closed.
//!
//! [`ResultStream`] exposes this as an iterator: `next()` runs passes until a
//! record is available or every worker has closed both pipes.

use crate::config::RunConfig;
use crate::error::{Error, Result};
use crate::feeder::QueryFeeder;
use crate::launch::LaunchSpec;
use crate::parser::ResultParser;
use crate::pool::{TeardownMode, WorkerPool};
use crate::record::ResultRecord;
use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use std::collections::VecDeque;
use std::io::{self, BufRead};
use std::iter::FusedIterator;
use std::os::unix::io::AsFd;
use tracing::{debug, error, info, instrument, trace, warn};

/// Upper bound on bytes read from one worker per pass.
const READ_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Read,
    Write,
}

/// Counters for a scheduling run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Number of worker processes.
    pub workers: usize,
    /// Queries fully written to a worker.
    pub queries_sent: usize,
    /// Records parsed from worker output.
    pub records_received: usize,
    /// Readiness passes performed.
    pub passes: usize,
}

/// Lazy sequence of results from a pool of workers.
///
/// Results arrive in completion order; within one worker they keep submission
/// order. Dropping the stream before it is exhausted terminates and reaps all
/// workers.
pub struct ResultStream<R> {
    feeder: QueryFeeder<R>,
    parser: ResultParser,
    pool: WorkerPool,
    pending: VecDeque<ResultRecord>,
    read_buf: Vec<u8>,
    feeder_done: bool,
    finished: bool,
    passes: usize,
}

impl<R: BufRead> ResultStream<R> {
    /// Validate the configuration, spawn the workers and prepare the run.
    ///
    /// No I/O with the workers happens until the first call to `next()`.
    pub fn start(launch: &LaunchSpec, input: R, config: &RunConfig) -> Result<Self> {
        config.validate()?;
        launch.validate()?;

        let pool = WorkerPool::spawn(config.workers, launch, &config.fields)?;

        Ok(Self {
            feeder: QueryFeeder::with_marker(input, config.record_marker),
            parser: ResultParser::new(config.header_prefix.clone(), config.fields.clone()),
            pool,
            pending: VecDeque::new(),
            read_buf: vec![0; READ_CHUNK_SIZE],
            feeder_done: false,
            finished: false,
            passes: 0,
        })
    }

    /// Process IDs of all workers in the pool.
    pub fn pids(&self) -> Vec<i32> {
        self.pool.pids()
    }

    pub fn stats(&self) -> RunStats {
        RunStats {
            workers: self.pool.len(),
            queries_sent: self.pool.workers().iter().map(|w| w.queries_sent).sum(),
            records_received: self.pool.workers().iter().map(|w| w.records_received).sum(),
            passes: self.passes,
        }
    }

    /// Run one readiness pass over all open pipes.
    fn poll_once(&mut self) -> Result<()> {
        let ready = match self.wait_ready()? {
            Some(ready) => ready,
            None => return Ok(()),
        };
        self.passes += 1;

        for &(idx, side) in &ready {
            if side == Side::Read {
                self.drain(idx)?;
            }
        }
        for &(idx, side) in &ready {
            if side == Side::Write {
                self.feed(idx)?;
            }
        }
        Ok(())
    }

    /// Block until at least one pipe is ready. `None` means interrupted.
    fn wait_ready(&self) -> Result<Option<Vec<(usize, Side)>>> {
        let mut interest = Vec::new();
        let mut fds = Vec::new();
        for (idx, worker) in self.pool.workers().iter().enumerate() {
            if let Some(stdout) = worker.stdout() {
                fds.push(PollFd::new(stdout.as_fd(), PollFlags::POLLIN));
                interest.push((idx, Side::Read));
            }
            if let Some(stdin) = worker.stdin() {
                fds.push(PollFd::new(stdin.as_fd(), PollFlags::POLLOUT));
                interest.push((idx, Side::Write));
            }
        }

        match poll(&mut fds, PollTimeout::NONE) {
            Ok(_) => {}
            Err(Errno::EINTR) => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let ready = fds
            .iter()
            .zip(interest)
            .filter(|(fd, _)| fd.revents().is_some_and(|r| !r.is_empty()))
            .map(|(_, slot)| slot)
            .collect();
        Ok(Some(ready))
    }

    /// Read one chunk from a worker and queue every complete record.
    fn drain(&mut self, idx: usize) -> Result<()> {
        let worker = &mut self.pool.workers_mut()[idx];
        let Some(stdout) = worker.stdout() else {
            return Ok(());
        };

        let n = match stdout.read(&mut self.read_buf) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        if n == 0 {
            worker.close_output();
            // A worker that stopped producing output takes no more queries.
            worker.close_input();
            let leftover = std::mem::take(&mut worker.result_buf);
            return self.parser.finish(&leftover).map_err(|e| {
                error!(worker_id = worker.id(), error = %e, "Worker output ended mid-record");
                Error::from(e)
            });
        }

        worker.result_buf.extend_from_slice(&self.read_buf[..n]);
        trace!(worker_id = worker.id(), bytes = n, "Read worker output");

        let mut consumed = 0;
        while let Some((record, used)) = self.parser.try_extract(&worker.result_buf[consumed..])? {
            consumed += used;
            worker.records_received += 1;
            debug!(
                worker_id = worker.id(),
                query = record.id.as_deref().unwrap_or(""),
                hits = record.hits.len(),
                "Parsed result record"
            );
            self.pending.push_back(record);
        }
        worker.result_buf.drain(..consumed);
        Ok(())
    }

    /// Write pending query bytes to a worker, pulling a new query if idle.
    fn feed(&mut self, idx: usize) -> Result<()> {
        let worker = &mut self.pool.workers_mut()[idx];
        if !worker.is_writable() {
            return Ok(());
        }

        if worker.query_buf.is_empty() {
            let next = if self.feeder_done {
                None
            } else {
                self.feeder.next_query()?
            };
            match next {
                Some(query) => {
                    trace!(
                        worker_id = worker.id(),
                        query = %query.header(),
                        bytes = query.len(),
                        "Assigned query"
                    );
                    worker.query_buf = query.into_bytes();
                }
                None => {
                    if !self.feeder_done {
                        debug!(offset = self.feeder.offset(), "Query input exhausted");
                    }
                    self.feeder_done = true;
                    worker.close_input();
                    return Ok(());
                }
            }
        }

        let Some(stdin) = worker.stdin() else {
            return Ok(());
        };
        match stdin.write(&worker.query_buf) {
            Ok(n) => {
                worker.query_buf.drain(..n);
                if worker.query_buf.is_empty() {
                    worker.queries_sent += 1;
                }
            }
            // Readiness can be stale; try again on the next pass.
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                warn!(worker_id = worker.id(), "Worker closed its input early");
                worker.close_input();
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    fn complete(&mut self) -> Result<()> {
        self.finished = true;
        let stats = self.stats();
        info!(
            queries = stats.queries_sent,
            records = stats.records_received,
            passes = stats.passes,
            "All workers finished"
        );
        self.pool.teardown(TeardownMode::Graceful)
    }

    fn abort(&mut self, err: &Error) {
        self.finished = true;
        self.pending.clear();
        error!(error = %err, "Aborting run");
        let _ = self.pool.teardown(TeardownMode::Abort);
    }
}

impl<R: BufRead> Iterator for ResultStream<R> {
    type Item = Result<ResultRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.pending.pop_front() {
                return Some(Ok(record));
            }
            if self.finished {
                return None;
            }
            if self.pool.all_closed() {
                return self.complete().err().map(Err);
            }
            if let Err(e) = self.poll_once() {
                self.abort(&e);
                return Some(Err(e));
            }
        }
    }
}

impl<R: BufRead> FusedIterator for ResultStream<R> {}

impl<R> Drop for ResultStream<R> {
    fn drop(&mut self) {
        if !self.finished {
            debug!("Result stream dropped before completion; stopping workers");
            let _ = self.pool.teardown(TeardownMode::Abort);
        }
    }
}
