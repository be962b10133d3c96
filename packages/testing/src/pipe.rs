use std::fs::File;
use std::io::{Read, Write};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

/// An anonymous pipe, for driving readiness of real file descriptors in tests.
///
/// Both ends are closed when the pipe is dropped. The write end can be closed early via
/// [`close_write()`][Self::close_write], which makes the read end report a hangup once drained.
#[derive(Debug)]
pub struct Pipe {
    read: File,
    write: Option<File>,
}

impl Pipe {
    /// Creates a new pipe.
    ///
    /// # Panics
    ///
    /// Panics if the operating system fails to create the pipe.
    #[must_use]
    pub fn new() -> Self {
        let mut fds: [RawFd; 2] = [-1; 2];

        // SAFETY: `fds` is a valid out-parameter for two descriptors.
        let result = unsafe { libc::pipe(fds.as_mut_ptr()) };

        assert_eq!(
            result,
            0,
            "pipe() failed: {}",
            std::io::Error::last_os_error()
        );

        let [read, write] = fds;

        // SAFETY: pipe() succeeded, so the descriptor is open and owned by nobody else.
        let read = unsafe { OwnedFd::from_raw_fd(read) };
        // SAFETY: pipe() succeeded, so the descriptor is open and owned by nobody else.
        let write = unsafe { OwnedFd::from_raw_fd(write) };

        Self {
            read: File::from(read),
            write: Some(File::from(write)),
        }
    }

    /// The descriptor of the read end.
    #[must_use]
    pub fn read_fd(&self) -> RawFd {
        self.read.as_raw_fd()
    }

    /// The descriptor of the write end.
    ///
    /// # Panics
    ///
    /// Panics if the write end has been closed.
    #[must_use]
    pub fn write_fd(&self) -> RawFd {
        self.writer_ref().as_raw_fd()
    }

    /// # Panics
    ///
    /// Panics if the write end has been closed or the write fails.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.writer()
            .write_all(bytes)
            .expect("writing to a pipe with an open read end succeeds");
    }

    /// Reads one byte, returning `None` at end of stream.
    ///
    /// Blocks if the pipe is empty but the write end is still open.
    ///
    /// # Panics
    ///
    /// Panics if the read fails.
    pub fn read_byte(&mut self) -> Option<u8> {
        let mut buffer = [0_u8; 1];

        let count = self
            .read
            .read(&mut buffer)
            .expect("reading from a pipe succeeds");

        (count == 1).then_some(buffer[0])
    }

    /// Closes the write end of the pipe.
    pub fn close_write(&mut self) {
        self.write = None;
    }

    fn writer_ref(&self) -> &File {
        self.write.as_ref().expect("write end of pipe is still open")
    }

    fn writer(&mut self) -> &mut File {
        self.write.as_mut().expect("write end of pipe is still open")
    }
}

impl Default for Pipe {
    fn default() -> Self {
        Self::new()
    }
}
