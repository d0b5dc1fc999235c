//! Process handle for worker subprocesses.
//!
//! Wraps a child process with its non-blocking stdin/stdout pipes. Either pipe
//! can be closed independently; closing stdin is how a worker learns there are
//! no more queries.

use super::ipc::PipeFd;
use super::signals::{TerminationReason, analyze_wait_status};
use crate::error::{Error, Result};
use nix::sys::signal::{self, Signal};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;
use std::time::{Duration, Instant};

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Handle to a worker subprocess.
#[derive(Debug)]
pub struct Proc {
    pid: Pid,
    stdin: Option<PipeFd>,
    stdout: Option<PipeFd>,
    /// Final status once the process has been reaped.
    exit: Option<TerminationReason>,
}

impl Proc {
    /// Take ownership of a spawned child's pipes and switch them to
    /// non-blocking mode before any I/O happens.
    pub fn from_child(mut child: std::process::Child) -> Result<Self> {
        let pid = Pid::from_raw(child.id() as i32);

        let stdin = child.stdin.take().map(PipeFd::from);
        let stdout = child.stdout.take().map(PipeFd::from);

        // `child` is dropped without waiting; reaping goes through waitpid.
        // On the error paths below, dropping `proc` kills and reaps the worker.
        let proc = Self {
            pid,
            stdin,
            stdout,
            exit: None,
        };
        if proc.stdin.is_none() || proc.stdout.is_none() {
            return Err(Error::Config("worker stdin/stdout were not piped".into()));
        }
        proc.set_nonblocking()?;

        Ok(proc)
    }

    fn set_nonblocking(&self) -> std::io::Result<()> {
        for pipe in self.stdin.iter().chain(self.stdout.iter()) {
            pipe.set_nonblocking()?;
        }
        Ok(())
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn stdin(&self) -> Option<&PipeFd> {
        self.stdin.as_ref()
    }

    pub fn stdout(&self) -> Option<&PipeFd> {
        self.stdout.as_ref()
    }

    /// Close the worker's stdin. Returns `false` if it was already closed.
    pub fn close_stdin(&mut self) -> bool {
        self.stdin.take().is_some()
    }

    /// Close our end of the worker's stdout. Returns `false` if already closed.
    pub fn close_stdout(&mut self) -> bool {
        self.stdout.take().is_some()
    }

    /// Final status, if the process has been reaped.
    pub fn exit_reason(&self) -> Option<&TerminationReason> {
        self.exit.as_ref()
    }

    pub fn is_reaped(&self) -> bool {
        self.exit.is_some()
    }

    /// Check for exit without blocking.
    pub fn try_wait(&mut self) -> Result<Option<&TerminationReason>> {
        if self.exit.is_none() {
            match waitpid(self.pid, Some(WaitPidFlag::WNOHANG))? {
                WaitStatus::StillAlive => return Ok(None),
                status => self.record(status),
            }
        }
        Ok(self.exit.as_ref())
    }

    /// Block until the process exits.
    pub fn wait(&mut self) -> Result<&TerminationReason> {
        while self.exit.is_none() {
            match waitpid(self.pid, None) {
                Ok(status) => self.record(status),
                Err(nix::errno::Errno::EINTR) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(self.exit.as_ref().unwrap_or(&TerminationReason::Unknown))
    }

    /// Wait up to `timeout` for the process to exit.
    pub fn wait_timeout(&mut self, timeout: Duration) -> Result<Option<&TerminationReason>> {
        let start = Instant::now();
        while self.try_wait()?.is_none() {
            if start.elapsed() >= timeout {
                return Ok(None);
            }
            std::thread::sleep(WAIT_POLL_INTERVAL);
        }
        Ok(self.exit.as_ref())
    }

    /// Send SIGTERM to the process.
    pub fn terminate(&self) -> Result<()> {
        if self.exit.is_some() {
            return Ok(());
        }
        signal::kill(self.pid, Signal::SIGTERM)?;
        Ok(())
    }

    /// Terminate the process, escalating to SIGKILL after `grace`, and reap it.
    pub fn stop(&mut self, grace: Duration) -> Result<&TerminationReason> {
        self.close_stdin();
        self.close_stdout();
        if self.try_wait()?.is_none() {
            // ESRCH here means it exited between the check and the signal.
            let _ = self.terminate();
            if self.wait_timeout(grace)?.is_none() {
                let _ = signal::kill(self.pid, Signal::SIGKILL);
            }
        }
        self.wait()
    }

    /// Best-effort SIGKILL and reap, ignoring errors.
    fn kill(&mut self) {
        if self.exit.is_none() {
            let _ = signal::kill(self.pid, Signal::SIGKILL);
            let _ = self.wait();
        }
    }

    fn record(&mut self, status: WaitStatus) {
        match analyze_wait_status(status) {
            TerminationReason::StillAlive | TerminationReason::Unknown => {}
            reason => self.exit = Some(reason),
        }
    }
}

impl Drop for Proc {
    fn drop(&mut self) {
        self.close_stdin();
        self.close_stdout();
        self.kill();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::{Command, Stdio};

    fn spawn(cmd: &str) -> Proc {
        let child = Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .expect("Failed to spawn sh");
        Proc::from_child(child).expect("Failed to create Proc")
    }

    #[test]
    fn test_pipes_are_nonblocking() {
        let mut proc = spawn("cat");
        assert!(proc.stdin().unwrap().is_nonblocking().unwrap());
        assert!(proc.stdout().unwrap().is_nonblocking().unwrap());
        proc.stop(Duration::from_secs(1)).unwrap();
    }

    #[test]
    fn test_closing_stdin_lets_cat_exit() {
        let mut proc = spawn("cat");
        assert!(proc.close_stdin());
        assert!(!proc.close_stdin());
        let reason = proc.wait().unwrap();
        assert!(reason.is_success());
        assert!(proc.is_reaped());
    }

    #[test]
    fn test_exit_code_reported() {
        let mut proc = spawn("exit 3");
        assert_eq!(proc.wait().unwrap(), &TerminationReason::Exited(3));
        assert_eq!(proc.exit_reason(), Some(&TerminationReason::Exited(3)));
    }

    #[test]
    fn test_stop_terminates_running_process() {
        let mut proc = spawn("exec sleep 60");
        assert!(proc.try_wait().unwrap().is_none());
        let reason = proc.stop(Duration::from_secs(2)).unwrap().clone();
        assert_eq!(reason, TerminationReason::Signaled(Signal::SIGTERM));
    }

    #[test]
    fn test_stop_escalates_to_sigkill() {
        let mut proc = spawn("trap '' TERM; while :; do sleep 1; done");
        std::thread::sleep(Duration::from_millis(100));
        let reason = proc.stop(Duration::from_millis(200)).unwrap().clone();
        assert_eq!(reason, TerminationReason::Signaled(Signal::SIGKILL));
    }

    #[test]
    fn test_stop_after_exit_is_noop() {
        let mut proc = spawn("exit 0");
        proc.wait().unwrap();
        assert!(proc.stop(Duration::from_millis(10)).unwrap().is_success());
        assert!(proc.terminate().is_ok());
    }
}
