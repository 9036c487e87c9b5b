// Copyright (c) The partest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use bytes::BytesMut;
use std::{io, process::Stdio};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::{Child as TokioChild, ChildStderr, ChildStdin, ChildStdout},
};

/// What the child's stdin is connected to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum StdinMode {
    /// Per-unit processes get no input.
    Null,

    /// Long-lived workers are fed requests over a pipe.
    Piped,
}

/// A spawned child process along with its file descriptors.
pub(crate) struct Child {
    pub(crate) child: TokioChild,
    pub(crate) stdin: Option<ChildStdin>,
    pub(crate) fds: ChildFds,
}

pub(super) fn spawn(mut cmd: std::process::Command, stdin: StdinMode) -> io::Result<Child> {
    match stdin {
        StdinMode::Null => cmd.stdin(Stdio::null()),
        StdinMode::Piped => cmd.stdin(Stdio::piped()),
    };
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    let mut cmd: tokio::process::Command = cmd.into();
    // An aborted run must not leave engine processes behind.
    cmd.kill_on_drop(true);
    let mut child = cmd.spawn()?;

    let stdout = child.stdout.take().expect("stdout was set");
    let stderr = child.stderr.take().expect("stderr was set");
    let stdin = child.stdin.take();

    Ok(Child {
        child,
        stdin,
        fds: ChildFds::new(stdout, stderr),
    })
}

/// The size of each buffered reader's buffer.
///
/// This is the (normal) page size on most systems.
const CHUNK_SIZE: usize = 4 * 1024;

/// A `BufReader` over an `AsyncRead` that tracks whether it has hit EOF.
pub(crate) struct FusedBufReader<R> {
    reader: BufReader<R>,
    done: bool,
}

impl<R: AsyncRead + Unpin> FusedBufReader<R> {
    pub(crate) fn new(reader: R) -> Self {
        Self {
            reader: BufReader::with_capacity(CHUNK_SIZE, reader),
            done: false,
        }
    }

    pub(crate) async fn fill_buf(&mut self, acc: &mut BytesMut) -> Result<(), io::Error> {
        if self.done {
            return Ok(());
        }

        match self.reader.fill_buf().await {
            Ok(buf) => {
                acc.extend_from_slice(buf);
                if buf.is_empty() {
                    self.done = true;
                }
                let len = buf.len();
                self.reader.consume(len);
                Ok(())
            }
            Err(error) => {
                self.done = true;
                Err(error)
            }
        }
    }

    pub(crate) fn is_done(&self) -> bool {
        self.done
    }
}

/// Separate stdout and stderr pipes of a child process.
pub(crate) struct ChildFds {
    stdout: FusedBufReader<ChildStdout>,
    stderr: FusedBufReader<ChildStderr>,
}

impl ChildFds {
    pub(crate) fn new(stdout: ChildStdout, stderr: ChildStderr) -> Self {
        Self {
            stdout: FusedBufReader::new(stdout),
            stderr: FusedBufReader::new(stderr),
        }
    }

    pub(crate) fn is_done(&self) -> bool {
        self.stdout.is_done() && self.stderr.is_done()
    }

    /// Reads whatever is available on either pipe.
    ///
    /// This is cancel-safe, since the underlying [`AsyncBufReadExt::fill_buf`] operation is
    /// cancel-safe.
    async fn fill_buf(
        &mut self,
        stdout_acc: &mut BytesMut,
        stderr_acc: &mut BytesMut,
    ) -> Result<(), io::Error> {
        let Self { stdout, stderr } = self;
        tokio::select! {
            res = stdout.fill_buf(stdout_acc), if !stdout.is_done() => res,
            res = stderr.fill_buf(stderr_acc), if !stderr.is_done() => res,
            // If both are done, do nothing.
            else => Ok(()),
        }
    }
}

/// Output accumulator for a child process.
///
/// The scheduler drives [`Self::fill_buf`] every tick so that pipes never fill up, and takes the
/// accumulated output when a unit is torn down.
pub(crate) struct ChildAccumulator {
    fds: ChildFds,
    stdout: BytesMut,
    stderr: BytesMut,
    errors: Vec<io::Error>,
}

impl ChildAccumulator {
    pub(crate) fn new(fds: ChildFds) -> Self {
        Self {
            fds,
            stdout: BytesMut::with_capacity(CHUNK_SIZE),
            stderr: BytesMut::with_capacity(CHUNK_SIZE),
            errors: Vec::new(),
        }
    }

    pub(crate) fn is_done(&self) -> bool {
        self.fds.is_done()
    }

    pub(crate) async fn fill_buf(&mut self) {
        let res = self.fds.fill_buf(&mut self.stdout, &mut self.stderr).await;
        if let Err(error) = res {
            self.errors.push(error);
        }
    }

    /// Reads until both pipes are closed.
    pub(crate) async fn fill_to_end(&mut self) {
        while !self.is_done() {
            self.fill_buf().await;
        }
    }

    /// Takes everything accumulated so far, as (stdout, stderr).
    ///
    /// While a pipe is still open, a character split across reads stays in the accumulator until
    /// the rest of it arrives.
    pub(crate) fn take_output(&mut self) -> (String, String) {
        (
            take_utf8(&mut self.stdout, self.fds.stdout.is_done()),
            take_utf8(&mut self.stderr, self.fds.stderr.is_done()),
        )
    }

    /// Returns read errors encountered so far. Reads stop on a pipe once it errors.
    pub(crate) fn take_errors(&mut self) -> Vec<io::Error> {
        std::mem::take(&mut self.errors)
    }
}

fn take_utf8(acc: &mut BytesMut, at_eof: bool) -> String {
    let len = if at_eof {
        acc.len()
    } else {
        complete_utf8_len(acc)
    };
    let taken = acc.split_to(len).freeze();
    String::from_utf8_lossy(&taken).into_owned()
}

/// Returns the length of `buf` without a trailing incomplete UTF-8 sequence.
fn complete_utf8_len(buf: &[u8]) -> usize {
    let tail = buf.len().saturating_sub(3);
    for start in (tail..buf.len()).rev() {
        let width = match buf[start] {
            0x80..=0xBF => continue,
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => 1,
        };
        return if start + width > buf.len() {
            start
        } else {
            buf.len()
        };
    }
    buf.len()
}
