//! Queue between the collector thread and the CSV flush loop

use anyhow::{Context, Result};
use crossbeam::queue::SegQueue;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::csv_writer::TraceCsvWriter;
use super::TraceRecord;

/// Cloneable push handle handed to metrics sources. Never blocks.
///
/// Closing a sink closes every clone of it. Sources check `is_closed()`
/// between ticks and return once the consumer side is gone.
#[derive(Clone, Default)]
pub struct TraceSink {
    queue: Arc<SegQueue<TraceRecord>>,
    closed: Arc<AtomicBool>,
}

impl TraceSink {
    pub fn log(&self, record: TraceRecord) {
        self.queue.push(record);
    }

    /// Records waiting for the next flush
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

pub struct TraceLogger {
    sink: TraceSink,
    writer: TraceCsvWriter,
}

impl TraceLogger {
    pub fn new(directory: &Path, filename: &str) -> Result<Self> {
        Ok(Self {
            sink: TraceSink::default(),
            writer: TraceCsvWriter::new(directory, filename)?,
        })
    }

    pub fn sink(&self) -> TraceSink {
        self.sink.clone()
    }

    pub fn log(&self, record: TraceRecord) {
        self.sink.log(record);
    }

    pub fn writer(&self) -> &TraceCsvWriter {
        &self.writer
    }

    /// Write out the records queued at call time. Records pushed while the
    /// batch is being drained wait for the next flush. Returns the number of
    /// records written; an empty queue touches no file.
    pub fn flush(&mut self) -> Result<usize> {
        let size = self.sink.queue.len();
        if size == 0 {
            return Ok(0);
        }
        let rows: Vec<TraceRecord> = (0..size).filter_map(|_| self.sink.queue.pop()).collect();
        self.writer.write(&rows)?;
        debug!("Flushed {} trace records to {}", rows.len(), self.writer.path().display());
        Ok(rows.len())
    }

    /// Sleep `period`, flush, repeat. Only returns on a write error.
    /// File I/O runs on the blocking pool so the runtime keeps scheduling.
    pub async fn run_flush_loop(mut self, period: Duration) -> Result<()> {
        loop {
            tokio::time::sleep(period).await;
            self = tokio::task::spawn_blocking(move || -> Result<Self> {
                self.flush()?;
                Ok(self)
            })
            .await
            .context("Trace flush task panicked")??;
        }
    }
}
