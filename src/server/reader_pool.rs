//! Pooled line readers for the serving engine.
//!
//! Each connection checks a reader out of the pool for its lifetime and
//! returns it on close, so steady-state traffic does not allocate per
//! connection. Reader buffers are sized to the configured maximum message
//! size, which makes the buffer itself the per-command length bound: a
//! frame that fills the buffer without a newline is oversize by
//! definition. Readers are reset on check-in, so no bytes ever leak
//! between connections.

use std::io::{self, Read};
use std::sync::{Mutex, PoisonError};

/// Why `read_frame` did not produce a frame.
#[derive(Debug)]
pub(crate) enum FrameError {
    /// The peer closed the stream.
    Eof,
    /// The frame exceeded the buffer; the stream has been discarded
    /// through the next newline and is aligned on a frame boundary again.
    Oversize,
    /// The underlying read failed.
    Io(io::Error),
}

/// Buffered reader that yields newline-terminated frames.
pub(crate) struct LineReader {
    buf: Vec<u8>,
    /// End of the valid region of `buf`.
    filled: usize,
    /// Start of the unconsumed region of `buf`.
    pos: usize,
}

impl LineReader {
    fn with_buf_size(size: usize) -> Self {
        Self {
            buf: vec![0; size],
            filled: 0,
            pos: 0,
        }
    }

    fn reset(&mut self) {
        self.filled = 0;
        self.pos = 0;
    }

    /// Read one frame, terminator included.
    ///
    /// Bytes already buffered past a previous frame's newline are served
    /// first, so pipelined commands survive intact.
    pub(crate) fn read_frame<R: Read>(&mut self, conn: &mut R) -> Result<&[u8], FrameError> {
        loop {
            if let Some(nl) = find_newline(&self.buf[self.pos..self.filled]) {
                let start = self.pos;
                self.pos = start + nl + 1;
                return Ok(&self.buf[start..start + nl + 1]);
            }

            // Compact the partial frame to the front so the free space is
            // one contiguous tail.
            if self.pos > 0 {
                self.buf.copy_within(self.pos..self.filled, 0);
                self.filled -= self.pos;
                self.pos = 0;
            }
            if self.filled == self.buf.len() {
                return Err(self.discard_through_newline(conn));
            }

            match conn.read(&mut self.buf[self.filled..]) {
                Ok(0) => return Err(FrameError::Eof),
                Ok(n) => self.filled += n,
                Err(e) => return Err(FrameError::Io(e)),
            }
        }
    }

    /// The buffer holds a full partial frame with no newline. Throw it
    /// away and keep reading until the next newline so the stream realigns
    /// on a frame boundary. Bytes after that newline belong to the next
    /// frame and are kept. An error met while discarding outranks the
    /// oversize verdict.
    fn discard_through_newline<R: Read>(&mut self, conn: &mut R) -> FrameError {
        self.reset();
        loop {
            let n = match conn.read(&mut self.buf) {
                Ok(0) => return FrameError::Eof,
                Ok(n) => n,
                Err(e) => return FrameError::Io(e),
            };
            if let Some(nl) = find_newline(&self.buf[..n]) {
                self.buf.copy_within(nl + 1..n, 0);
                self.filled = n - nl - 1;
                return FrameError::Oversize;
            }
        }
    }
}

fn find_newline(b: &[u8]) -> Option<usize> {
    b.iter().position(|&c| c == b'\n')
}

/// Pool of [`LineReader`]s shared by all connection threads.
pub(crate) struct ReaderPool {
    buf_size: usize,
    pool: Mutex<Vec<LineReader>>,
}

impl ReaderPool {
    pub(crate) fn new(buf_size: usize) -> Self {
        Self {
            buf_size,
            pool: Mutex::new(Vec::new()),
        }
    }

    /// Draw a reader from the pool, or make a fresh one when it is empty.
    pub(crate) fn get(&self) -> LineReader {
        let mut pool = self.pool.lock().unwrap_or_else(PoisonError::into_inner);
        pool.pop()
            .unwrap_or_else(|| LineReader::with_buf_size(self.buf_size))
    }

    /// Return a reader drawn with [`ReaderPool::get`].
    pub(crate) fn put(&self, mut reader: LineReader) {
        reader.reset();
        let mut pool = self.pool.lock().unwrap_or_else(PoisonError::into_inner);
        pool.push(reader);
    }
}
