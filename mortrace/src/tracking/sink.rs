//! Record sinks: where trackers write their output trace.

use crossbeam_channel::{bounded, Sender};
use mortrace_common::TraceRecord;
use std::io::{self, Write};
use std::thread::{self, JoinHandle};

/// Capacity of the channel between callback threads and the writer thread.
/// Callbacks block when the writer falls this far behind, which bounds memory
/// without dropping records.
const WRITER_QUEUE_DEPTH: usize = 1024;

/// Destination for emitted trace records.
///
/// Trackers format one record per emit; the sink decides whether that means a
/// buffered write, a channel send, or an in-memory append.
pub trait RecordSink: Send {
    /// Emit one record.
    ///
    /// # Errors
    ///
    /// Propagates the underlying write or channel failure.
    fn emit(&mut self, record: &TraceRecord) -> io::Result<()>;

    /// Flush any buffering.
    ///
    /// # Errors
    ///
    /// Propagates the underlying flush failure.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Sink writing records straight to a `Write` (wrap a `BufWriter` for files).
#[derive(Debug)]
pub struct WriteSink<W: Write + Send> {
    inner: W,
}

impl<W: Write + Send> WriteSink<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Recover the wrapped writer (used by tests to inspect the output).
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write + Send> RecordSink for WriteSink<W> {
    fn emit(&mut self, record: &TraceRecord) -> io::Result<()> {
        writeln!(self.inner, "{record}")
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Sink shipping formatted records over a bounded channel to a writer thread,
/// so online callbacks never perform file I/O while holding the tracker lock.
///
/// Records arrive at the writer in emit order: the online tracker emits under
/// its state lock, so channel order is lock order.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<String>,
}

impl RecordSink for ChannelSink {
    fn emit(&mut self, record: &TraceRecord) -> io::Result<()> {
        self.tx
            .send(record.to_string())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "record writer thread is gone"))
    }
}

/// Spawn the writer thread behind a [`ChannelSink`].
///
/// The thread drains lines into `writer` and flushes when the last sink clone
/// is dropped; join the handle to observe write errors.
pub fn spawn_writer<W: Write + Send + 'static>(
    writer: W,
) -> (ChannelSink, JoinHandle<io::Result<()>>) {
    let (tx, rx) = bounded::<String>(WRITER_QUEUE_DEPTH);
    let handle = thread::spawn(move || {
        let mut writer = writer;
        for line in rx {
            writeln!(writer, "{line}")?;
        }
        writer.flush()
    });
    (ChannelSink { tx }, handle)
}

/// Sink collecting records in memory, for tests and in-process consumers.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub records: Vec<TraceRecord>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordSink for MemorySink {
    fn emit(&mut self, record: &TraceRecord) -> io::Result<()> {
        self.records.push(record.clone());
        Ok(())
    }
}
