use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Lines, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::StoreResult;
use crate::record::{LogRecord, RecordError};

/// Append-side of one collection's oplog.
///
/// Exactly one writer exists per log file, and it is only opened after the
/// collection's replay has fully drained (see `Collection::enable_logging`).
/// Writes land in issue order; `append` flushes each line, and [`close`]
/// additionally fsyncs — callers must wait for `close` before assuming
/// durability.
///
/// [`close`]: OplogWriter::close
#[derive(Debug)]
pub struct OplogWriter {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl OplogWriter {
    /// Open the log file for appending, creating it if absent.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }

    /// Append one newline-terminated encoded record.
    pub fn append(&mut self, record: &LogRecord) -> StoreResult<()> {
        let line = record.encode();
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        debug!(path = %self.path.display(), len = line.len(), "oplog append");
        Ok(())
    }

    /// Flush, fsync, and release the file handle.
    pub fn close(mut self) -> StoreResult<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        debug!(path = %self.path.display(), "oplog closed");
        Ok(())
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// An error produced while streaming records out of a log file.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Record(#[from] RecordError),
}

/// Read-side of one collection's oplog: a lazy, finite, non-restartable
/// sequence of `(ordinal, record)` pairs in file order. Ordinals are
/// 1-based line numbers.
///
/// A missing file yields an empty sequence, not an error.
pub struct OplogReader {
    lines: Option<Lines<BufReader<File>>>,
    ordinal: u64,
}

impl OplogReader {
    /// Open a log file for sequential reading from position zero.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let lines = match File::open(path) {
            Ok(file) => Some(BufReader::new(file).lines()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no oplog yet; empty collection");
                None
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self { lines, ordinal: 0 })
    }
}

impl Iterator for OplogReader {
    type Item = (u64, Result<LogRecord, StreamError>);

    fn next(&mut self) -> Option<Self::Item> {
        let line = self.lines.as_mut()?.next()?;
        self.ordinal += 1;
        let item = match line {
            Ok(line) => LogRecord::decode(&line).map_err(StreamError::from),
            Err(e) => Err(StreamError::from(e)),
        };
        Some((self.ordinal, item))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oplog_types::{ObjectId, Timestamp};
    use serde_json::json;

    fn record(n: u64) -> LogRecord {
        LogRecord::Remove {
            id: ObjectId::parse(format!("obj-{n}")).unwrap(),
            at: Timestamp::from_millis(n),
        }
    }

    #[test]
    fn append_then_read_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.oplog");

        let mut writer = OplogWriter::open(&path).unwrap();
        for n in 1..=5 {
            writer.append(&record(n)).unwrap();
        }
        writer.close().unwrap();

        let records: Vec<_> = OplogReader::open(&path)
            .unwrap()
            .map(|(ordinal, item)| (ordinal, item.unwrap()))
            .collect();
        assert_eq!(records.len(), 5);
        for (i, (ordinal, rec)) in records.iter().enumerate() {
            assert_eq!(*ordinal, i as u64 + 1);
            assert_eq!(*rec, record(i as u64 + 1));
        }
    }

    #[test]
    fn missing_file_is_empty_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let mut reader = OplogReader::open(&dir.path().join("absent.oplog")).unwrap();
        assert!(reader.next().is_none());
    }

    #[test]
    fn reopened_writer_appends_to_existing_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.oplog");

        let mut writer = OplogWriter::open(&path).unwrap();
        writer.append(&record(1)).unwrap();
        writer.close().unwrap();

        let mut writer = OplogWriter::open(&path).unwrap();
        writer.append(&record(2)).unwrap();
        writer.close().unwrap();

        let count = OplogReader::open(&path).unwrap().count();
        assert_eq!(count, 2);
    }

    #[test]
    fn bad_line_reports_its_ordinal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.oplog");

        let mut writer = OplogWriter::open(&path).unwrap();
        writer.append(&record(1)).unwrap();
        writer.close().unwrap();
        // Simulate trailing garbage from a torn write.
        std::fs::write(
            &path,
            format!("{}\nnot json at all\n", record(1).encode()),
        )
        .unwrap();

        let mut reader = OplogReader::open(&path).unwrap();
        let (first, item) = reader.next().unwrap();
        assert_eq!(first, 1);
        assert!(item.is_ok());
        let (second, item) = reader.next().unwrap();
        assert_eq!(second, 2);
        assert!(matches!(item, Err(StreamError::Record(_))));
    }

    #[test]
    fn add_record_survives_disk_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.oplog");

        let rec = LogRecord::Add {
            id: ObjectId::parse("u1").unwrap(),
            data: json!({"id": "u1", "profile": {"email": "a@b.c"}}),
            at: Timestamp::from_millis(42),
        };
        let mut writer = OplogWriter::open(&path).unwrap();
        writer.append(&rec).unwrap();
        writer.close().unwrap();

        let (_, item) = OplogReader::open(&path).unwrap().next().unwrap();
        assert_eq!(item.unwrap(), rec);
    }
}
