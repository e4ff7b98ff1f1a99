//! Append-mode CSV output for GPU traces

use anyhow::{bail, Context, Result};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use super::{cell, TraceRecord};
use crate::constants::TRACE_FILE_SUFFIX;

/// Writes batches of trace records to `<directory>/<filename>_gpu_trace.csv`.
///
/// The header is emitted on the first write of this writer only. The gate is
/// a per-process counter, not a check on the file: a restarted collector
/// appending to an existing trace writes a second header row.
pub struct TraceCsvWriter {
    path: PathBuf,
    writes: u64,
}

impl TraceCsvWriter {
    /// Creates `directory` if needed. The file itself is only created by
    /// the first non-empty write.
    pub fn new(directory: &Path, filename: &str) -> Result<Self> {
        fs::create_dir_all(directory)
            .with_context(|| format!("Failed to create trace directory: {}", directory.display()))?;
        Ok(Self {
            path: trace_path(directory, filename),
            writes: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of batches written so far
    pub fn writes(&self) -> u64 {
        self.writes
    }

    /// Append `rows`. Columns come from the first row of the batch; a row
    /// missing a column gets an empty cell, a row with an extra key is an
    /// error.
    pub fn write(&mut self, rows: &[TraceRecord]) -> Result<()> {
        let Some(first) = rows.first() else {
            return Ok(());
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open trace file {}", self.path.display()))?;
        self.writes += 1;

        let fieldnames: Vec<String> = first.keys().map(str::to_string).collect();
        let mut wtr = csv::WriterBuilder::new()
            .delimiter(b',')
            .terminator(csv::Terminator::Any(b'\n'))
            .has_headers(false)
            .from_writer(file);

        if self.writes == 1 {
            wtr.write_record(&fieldnames)
                .with_context(|| format!("Failed to write header to {}", self.path.display()))?;
        }

        for row in rows {
            if let Some(extra) = row.keys().find(|k| !fieldnames.iter().any(|f| f.as_str() == *k)) {
                bail!("Trace record contains field {:?} not in header {:?}", extra, fieldnames);
            }
            let cells: Vec<String> = fieldnames
                .iter()
                .map(|f| row.get(f).map(cell).unwrap_or_default())
                .collect();
            wtr.write_record(&cells)
                .with_context(|| format!("Failed to write row to {}", self.path.display()))?;
        }

        wtr.flush()
            .with_context(|| format!("Failed to flush {}", self.path.display()))?;
        Ok(())
    }
}

/// `<directory>/<filename>_gpu_trace.csv`
pub fn trace_path(directory: &Path, filename: &str) -> PathBuf {
    directory.join(format!("{}{}", filename, TRACE_FILE_SUFFIX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(a: i64, b: i64) -> TraceRecord {
        TraceRecord::new().with("a", a).with("b", b)
    }

    #[test]
    fn test_creates_nested_directory() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("traces").join("node-1");
        let writer = TraceCsvWriter::new(&dir, "run1").unwrap();
        assert!(dir.is_dir());
        assert_eq!(writer.path(), dir.join("run1_gpu_trace.csv"));
        assert!(!writer.path().exists());
    }

    #[test]
    fn test_header_written_once() {
        let tmp = TempDir::new().unwrap();
        let mut writer = TraceCsvWriter::new(tmp.path(), "t").unwrap();
        writer.write(&[record(1, 2)]).unwrap();
        writer.write(&[record(3, 4), record(5, 6)]).unwrap();

        let text = fs::read_to_string(writer.path()).unwrap();
        assert_eq!(text, "a,b\n1,2\n3,4\n5,6\n");
        assert_eq!(writer.writes(), 2);
    }

    #[test]
    fn test_empty_batch_is_noop() {
        let tmp = TempDir::new().unwrap();
        let mut writer = TraceCsvWriter::new(tmp.path(), "t").unwrap();
        writer.write(&[]).unwrap();
        assert!(!writer.path().exists());
        assert_eq!(writer.writes(), 0);
    }

    #[test]
    fn test_missing_key_is_empty_cell() {
        let tmp = TempDir::new().unwrap();
        let mut writer = TraceCsvWriter::new(tmp.path(), "t").unwrap();
        let partial = TraceRecord::new().with("b", 7);
        writer.write(&[record(1, 2), partial]).unwrap();
        let text = fs::read_to_string(writer.path()).unwrap();
        assert_eq!(text, "a,b\n1,2\n,7\n");
    }

    #[test]
    fn test_extra_key_is_error() {
        let tmp = TempDir::new().unwrap();
        let mut writer = TraceCsvWriter::new(tmp.path(), "t").unwrap();
        let extra = record(3, 4).with("c", 5);
        assert!(writer.write(&[record(1, 2), extra]).is_err());
    }

    #[test]
    fn test_values_with_commas_are_quoted() {
        let tmp = TempDir::new().unwrap();
        let mut writer = TraceCsvWriter::new(tmp.path(), "t").unwrap();
        let row = TraceRecord::new().with("name", "GPU 0, A100").with("util", 87.5);
        writer.write(&[row]).unwrap();
        let text = fs::read_to_string(writer.path()).unwrap();
        assert_eq!(text, "name,util\n\"GPU 0, A100\",87.5\n");
    }

    #[test]
    fn test_new_writer_on_existing_file_repeats_header() {
        let tmp = TempDir::new().unwrap();
        let mut first = TraceCsvWriter::new(tmp.path(), "t").unwrap();
        first.write(&[record(1, 2)]).unwrap();

        // Simulates a process restart against the same trace file
        let mut second = TraceCsvWriter::new(tmp.path(), "t").unwrap();
        second.write(&[record(3, 4)]).unwrap();

        let text = fs::read_to_string(second.path()).unwrap();
        assert_eq!(text, "a,b\n1,2\na,b\n3,4\n");
    }
}
