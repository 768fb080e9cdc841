//! Filesystem-based transaction log
//!
//! Records are stored as JSON lines in a single append-only file. Each
//! append writes one complete line and syncs it before returning.

use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tpc_log::{LogError, LogRecord, Result, TransactionLog};

/// Default file name inside a log directory
pub const LOG_FILE_NAME: &str = "transactions.log";

/// Append-only JSON-lines transaction log
pub struct FileTransactionLog {
    /// Path of the log file
    path: PathBuf,
    /// Handle opened in append mode, also serializes appends and reads
    file: Mutex<File>,
}

impl FileTransactionLog {
    /// Open (or create) the log file at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        Self::repair_torn_tail(&path)?;

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Open the default log file inside `dir`
    pub fn open_in_dir(dir: impl AsRef<Path>) -> Result<Self> {
        Self::open(dir.as_ref().join(LOG_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drop a trailing partial line left by a crash mid-append, so the next
    /// append does not get glued onto it
    fn repair_torn_tail(path: &Path) -> Result<()> {
        let mut file = match OpenOptions::new().read(true).write(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let mut contents = Vec::new();
        file.read_to_end(&mut contents)?;

        if contents.is_empty() || contents.ends_with(b"\n") {
            return Ok(());
        }

        let keep = contents
            .iter()
            .rposition(|&b| b == b'\n')
            .map(|pos| pos + 1)
            .unwrap_or(0);

        tracing::warn!(
            path = %path.display(),
            dropped_bytes = contents.len() - keep,
            "Truncating torn record at end of transaction log"
        );

        file.set_len(keep as u64)?;
        file.seek(SeekFrom::End(0))?;
        file.sync_all()?;
        Ok(())
    }

    /// Write one line through `write`, cutting the file back to its previous
    /// length if the write or sync fails part way
    fn append_line(
        file: &File,
        line: &[u8],
        write: impl FnOnce(&File, &[u8]) -> std::io::Result<()>,
    ) -> Result<()> {
        let committed_len = file.metadata()?.len();

        if let Err(e) = write(file, line) {
            if let Err(rewind) = file.set_len(committed_len) {
                tracing::error!(error = %rewind, "Failed to discard partial transaction log record");
            }
            return Err(e.into());
        }
        Ok(())
    }

    fn parse(contents: &str) -> Result<Vec<LogRecord>> {
        let lines: Vec<(usize, &str)> = contents
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .collect();

        let mut records = Vec::with_capacity(lines.len());
        for (position, (line_no, line)) in lines.iter().enumerate() {
            match serde_json::from_str::<LogRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) if position + 1 == lines.len() => {
                    // Only the final record can be torn by a crash
                    tracing::warn!(
                        line = line_no + 1,
                        error = %e,
                        "Ignoring unreadable final transaction log record"
                    );
                }
                Err(e) => {
                    return Err(LogError::Corrupt {
                        line: line_no + 1,
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(records)
    }
}

impl TransactionLog for FileTransactionLog {
    fn append(&self, record: LogRecord) -> Result<()> {
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        let file = self.file.lock();
        Self::append_line(&file, &line, write_synced)?;

        tracing::debug!(txn_id = %record.txn_id, phase = ?record.phase, "Appended log record");
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<LogRecord>> {
        // Hold the append lock so we never observe a half-written line
        let _guard = self.file.lock();

        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        Self::parse(&contents)
    }
}

fn write_synced(mut file: &File, line: &[u8]) -> std::io::Result<()> {
    file.write_all(line)?;
    file.sync_data()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tpc_common::{ParticipantId, TransactionId};
    use tpc_log::{Decision, Phase, RecoveryAction};

    #[test]
    fn test_append_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let txn = TransactionId::new();

        {
            let log = FileTransactionLog::open_in_dir(dir.path()).unwrap();
            log.append(LogRecord::begin(txn)).unwrap();
            log.append(LogRecord::enlist(txn, ParticipantId::from("a")))
                .unwrap();
            log.append(LogRecord::decide(
                txn,
                Decision::Prepared,
                vec![ParticipantId::from("a")],
            ))
            .unwrap();
        }

        // Survives a new instance over the same file
        let log = FileTransactionLog::open_in_dir(dir.path()).unwrap();
        let records = log.read_all().unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].phase, Phase::Decide);

        let pending = log.scan_incomplete().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].recovery_action(), RecoveryAction::Commit);
    }

    #[test]
    fn test_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let log = FileTransactionLog::open_in_dir(dir.path()).unwrap();
        let txn = TransactionId::new();

        log.append(LogRecord::begin(txn)).unwrap();
        log.append(LogRecord::rollback(txn, vec![])).unwrap();

        let contents = fs::read_to_string(log.path()).unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.ends_with('\n'));
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = FileTransactionLog::open(dir.path().join("nested/tx.log")).unwrap();
        assert!(log.read_all().unwrap().is_empty());
        assert!(log.scan_incomplete().unwrap().is_empty());
    }

    #[test]
    fn test_torn_tail_is_repaired_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LOG_FILE_NAME);
        let txn = TransactionId::new();

        {
            let log = FileTransactionLog::open(&path).unwrap();
            log.append(LogRecord::begin(txn)).unwrap();
        }

        // Simulate a crash halfway through writing the next record
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(br#"{"txn_id":"0190"#).unwrap();
        drop(file);

        let log = FileTransactionLog::open(&path).unwrap();
        log.append(LogRecord::rollback(txn, vec![])).unwrap();

        let records = log.read_all().unwrap();
        assert_eq!(records.len(), 2);
        assert!(log.scan_incomplete().unwrap().is_empty());
    }

    #[test]
    fn test_failed_append_leaves_no_fragment() {
        let dir = tempfile::tempdir().unwrap();
        let log = FileTransactionLog::open_in_dir(dir.path()).unwrap();
        let txn = TransactionId::new();
        log.append(LogRecord::begin(txn)).unwrap();

        let mut line =
            serde_json::to_vec(&LogRecord::decide(txn, Decision::Prepared, vec![])).unwrap();
        line.push(b'\n');

        // Disk fills up halfway through the record
        let result = {
            let file = log.file.lock();
            FileTransactionLog::append_line(&file, &line, |mut file, line| {
                file.write_all(&line[..line.len() / 2])?;
                Err(std::io::Error::other("no space left on device"))
            })
        };
        assert!(matches!(result, Err(LogError::Io(_))));

        log.append(LogRecord::decide(txn, Decision::Abort, vec![]))
            .unwrap();
        log.append(LogRecord::rollback(txn, vec![])).unwrap();

        let records = log.read_all().unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[1].decision, Some(Decision::Abort));
        assert!(log.scan_incomplete().unwrap().is_empty());

        // Still readable after a restart
        drop(log);
        let log = FileTransactionLog::open_in_dir(dir.path()).unwrap();
        assert_eq!(log.read_all().unwrap().len(), 3);
    }

    #[test]
    fn test_corruption_in_the_middle_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LOG_FILE_NAME);
        let txn = TransactionId::new();

        let good = serde_json::to_string(&LogRecord::begin(txn)).unwrap();
        fs::write(&path, format!("{}\nnot json\n{}\n", good, good)).unwrap();

        let log = FileTransactionLog::open(&path).unwrap();
        match log.read_all() {
            Err(LogError::Corrupt { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected corrupt error, got {:?}", other),
        }
    }

    #[test]
    fn test_unreadable_final_line_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LOG_FILE_NAME);
        let txn = TransactionId::new();

        let good = serde_json::to_string(&LogRecord::begin(txn)).unwrap();
        fs::write(&path, format!("{}\n{{\"txn_id\":\n", good)).unwrap();

        let log = FileTransactionLog::open(&path).unwrap();
        let records = log.read_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].txn_id, txn);
    }
}
