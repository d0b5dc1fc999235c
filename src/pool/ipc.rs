//! Non-blocking pipe primitives for worker communication.
//!
//! Reads and writes retry on EINTR; EAGAIN surfaces as
//! `io::ErrorKind::WouldBlock` for the scheduler to handle.

use nix::fcntl::{FcntlArg, OFlag, fcntl};
use std::io;
use std::os::unix::io::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::process::{ChildStdin, ChildStdout};

/// One end of a pipe shared with a worker process.
#[derive(Debug)]
pub struct PipeFd {
    fd: OwnedFd,
}

impl PipeFd {
    pub fn new(fd: OwnedFd) -> Self {
        Self { fd }
    }

    /// Switch the descriptor to non-blocking mode.
    pub fn set_nonblocking(&self) -> io::Result<()> {
        let flags = fcntl(&self.fd, FcntlArg::F_GETFL).map_err(io::Error::from)?;
        let flags = OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK;
        fcntl(&self.fd, FcntlArg::F_SETFL(flags)).map_err(io::Error::from)?;
        Ok(())
    }

    pub fn is_nonblocking(&self) -> io::Result<bool> {
        let flags = fcntl(&self.fd, FcntlArg::F_GETFL).map_err(io::Error::from)?;
        Ok(OFlag::from_bits_truncate(flags).contains(OFlag::O_NONBLOCK))
    }

    /// Read available bytes. `Ok(0)` means the writer closed the pipe.
    pub fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match nix::unistd::read(&self.fd, buf) {
                Ok(n) => return Ok(n),
                Err(nix::errno::Errno::EINTR) => continue,
                Err(e) => return Err(io::Error::from(e)),
            }
        }
    }

    /// Write as much of `buf` as the pipe accepts.
    pub fn write(&self, buf: &[u8]) -> io::Result<usize> {
        loop {
            match nix::unistd::write(&self.fd, buf) {
                Ok(n) => return Ok(n),
                Err(nix::errno::Errno::EINTR) => continue,
                Err(e) => return Err(io::Error::from(e)),
            }
        }
    }
}

impl From<ChildStdin> for PipeFd {
    fn from(stdin: ChildStdin) -> Self {
        Self::new(OwnedFd::from(stdin))
    }
}

impl From<ChildStdout> for PipeFd {
    fn from(stdout: ChildStdout) -> Self {
        Self::new(OwnedFd::from(stdout))
    }
}

impl AsFd for PipeFd {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl AsRawFd for PipeFd {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_pipe() -> (PipeFd, PipeFd) {
        let (read_fd, write_fd) = nix::unistd::pipe().expect("Failed to create pipe");
        (PipeFd::new(read_fd), PipeFd::new(write_fd))
    }

    #[test]
    fn test_read_write_roundtrip() {
        let (reader, writer) = create_pipe();
        assert_eq!(writer.write(b"hello\n").unwrap(), 6);
        drop(writer);

        let mut buf = [0u8; 16];
        let n = reader.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello\n");
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_nonblocking_read_would_block() {
        let (reader, _writer) = create_pipe();
        assert!(!reader.is_nonblocking().unwrap());
        reader.set_nonblocking().unwrap();
        assert!(reader.is_nonblocking().unwrap());

        let mut buf = [0u8; 8];
        let err = reader.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn test_nonblocking_write_fills_pipe() {
        let (_reader, writer) = create_pipe();
        writer.set_nonblocking().unwrap();

        let chunk = vec![b'A'; 64 * 1024];
        let mut total = 0;
        let err = loop {
            match writer.write(&chunk) {
                Ok(n) => total += n,
                Err(e) => break e,
            }
        };
        assert!(total > 0);
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn test_write_to_closed_pipe_is_broken_pipe() {
        let (reader, writer) = create_pipe();
        drop(reader);
        let err = writer.write(b"x").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
