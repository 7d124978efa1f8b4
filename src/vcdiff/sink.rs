// Output sinks: where decoded target bytes go.
//
// The decoder only ever appends, once per decoded window, and never reads
// back what it wrote. Anything that can take bytes at its end can be a sink.

use std::collections::VecDeque;
use std::io::{self, Write};

/// An append-only destination for decoded target bytes.
pub trait OutputSink {
    /// Append one window's worth of target bytes.
    fn append(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Hint that `additional` more bytes are about to be appended.
    fn reserve(&mut self, _additional: usize) {}
}

impl OutputSink for Vec<u8> {
    fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.extend_from_slice(bytes);
        Ok(())
    }

    fn reserve(&mut self, additional: usize) {
        Vec::reserve(self, additional);
    }
}

impl OutputSink for VecDeque<u8> {
    fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.extend(bytes);
        Ok(())
    }

    fn reserve(&mut self, additional: usize) {
        VecDeque::reserve(self, additional);
    }
}

impl<S: OutputSink + ?Sized> OutputSink for &mut S {
    fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        (**self).append(bytes)
    }

    fn reserve(&mut self, additional: usize) {
        (**self).reserve(additional);
    }
}

/// Adapts any `io::Write` (file, socket, stdout) into a sink.
#[derive(Debug)]
pub struct WriteSink<W: Write> {
    inner: W,
    written: u64,
}

impl<W: Write> WriteSink<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }

    /// Total bytes written through this sink.
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> OutputSink for WriteSink<W> {
    fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.inner.write_all(bytes)?;
        self.written += bytes.len() as u64;
        Ok(())
    }
}
