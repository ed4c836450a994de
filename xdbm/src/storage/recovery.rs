//! Crash recovery for the record manager.
//!
//! Recovery runs when a store is opened and its log is not empty. It
//! replays the page images of every committed transaction into the data
//! file, drops the images of transactions that never reached their commit
//! marker, syncs the data file and truncates the log.
//!
//! # Recovery Process
//!
//! 1. Scan the log from the start, stopping at a torn tail
//! 2. Group page images by transaction
//! 3. Write the images of committed transactions in commit order
//! 4. Sync the data file, then truncate the log
//!
//! Replaying the same log twice yields the same data file, so a crash
//! during recovery is handled by simply recovering again.

use std::collections::HashMap;

use crate::storage::StoreError;
use crate::storage::file::DatabaseFile;
use crate::storage::log::{LogRecordPayload, Lsn, TransactionLog, TxnId};
use crate::storage::page::{PAGE_SIZE, PageId};

/// Result of a recovery operation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of log records scanned.
    pub records_scanned: usize,
    /// Number of committed transactions replayed.
    pub transactions_replayed: usize,
    /// Number of uncommitted transactions discarded.
    pub transactions_discarded: usize,
    /// Number of page images written to the data file.
    pub pages_written: usize,
    /// Bytes at the end of the log that did not form a valid record.
    pub bytes_discarded: u64,
    /// Highest LSN seen during recovery.
    pub recovered_lsn: Lsn,
}

impl RecoveryResult {
    /// Whether the log held anything at all.
    #[must_use]
    pub const fn had_work(&self) -> bool {
        self.records_scanned > 0 || self.bytes_discarded > 0
    }
}

/// Page images of a transaction being replayed.
#[derive(Debug, Default)]
struct PendingTransaction {
    images: Vec<(PageId, Box<[u8; PAGE_SIZE]>)>,
    committed: bool,
}

/// Replay the committed contents of `log` into `file`.
pub fn recover(
    file: &mut DatabaseFile,
    log: &mut TransactionLog,
) -> Result<RecoveryResult, StoreError> {
    if log.is_empty() {
        return Ok(RecoveryResult::default());
    }

    let scan = log.scan()?;
    let mut result = RecoveryResult {
        records_scanned: scan.records.len(),
        bytes_discarded: scan.discarded_len,
        ..RecoveryResult::default()
    };

    let mut pending: HashMap<TxnId, PendingTransaction> = HashMap::new();
    let mut commit_order: Vec<TxnId> = Vec::new();

    for record in scan.records {
        result.recovered_lsn = result.recovered_lsn.max(record.lsn);
        let txn = pending.entry(record.txn_id).or_default();
        match record.payload {
            LogRecordPayload::PageImage { page_id, data } => txn.images.push((page_id, data)),
            LogRecordPayload::Commit => {
                txn.committed = true;
                commit_order.push(record.txn_id);
            }
        }
    }

    for txn_id in commit_order {
        if let Some(txn) = pending.remove(&txn_id) {
            for (page_id, data) in &txn.images {
                file.write_page(*page_id, data)?;
                result.pages_written += 1;
            }
            result.transactions_replayed += 1;
        }
    }
    result.transactions_discarded = pending.values().filter(|txn| !txn.committed).count();

    file.sync()?;
    log.truncate()?;

    tracing::info!(
        "recovered {}: {} transactions replayed, {} discarded, {} pages written",
        file.path().display(),
        result.transactions_replayed,
        result.transactions_discarded,
        result.pages_written
    );

    Ok(result)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::storage::log::LogRecord;

    fn create_test_store() -> (tempfile::TempDir, DatabaseFile, TransactionLog) {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = DatabaseFile::create(&dir.path().join("test.db")).expect("create file");
        let log = TransactionLog::open(&dir.path().join("test.lg")).expect("open log");
        (dir, file, log)
    }

    fn append_uncommitted(dir: &tempfile::TempDir, txn_id: TxnId, page_id: PageId, byte: u8) {
        let mut bytes = Vec::new();
        LogRecord {
            txn_id,
            lsn: 100,
            payload: LogRecordPayload::PageImage {
                page_id,
                data: Box::new([byte; PAGE_SIZE]),
            },
        }
        .write_to(&mut bytes);
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(dir.path().join("test.lg"))
            .expect("open log for append");
        file.write_all(&bytes).expect("append");
    }

    #[test]
    fn test_recover_empty_log() {
        let (_dir, mut file, mut log) = create_test_store();
        let result = recover(&mut file, &mut log).expect("recover");
        assert!(!result.had_work());
        assert_eq!(result, RecoveryResult::default());
    }

    #[test]
    fn test_recover_committed_transaction() {
        let (dir, mut file, mut log) = create_test_store();
        log.append_transaction(1, &[(1, &[0x11; PAGE_SIZE]), (2, &[0x22; PAGE_SIZE])])
            .expect("append");
        drop(log);

        let mut log = TransactionLog::open(&dir.path().join("test.lg")).expect("reopen log");
        let result = recover(&mut file, &mut log).expect("recover");

        assert_eq!(result.transactions_replayed, 1);
        assert_eq!(result.pages_written, 2);
        assert_eq!(file.read_page(2).expect("page 2").read_u8(100), 0x22);
        assert!(log.is_empty());
    }

    #[test]
    fn test_recover_discards_uncommitted_transaction() {
        let (dir, mut file, mut log) = create_test_store();
        log.append_transaction(1, &[(1, &[0x11; PAGE_SIZE])])
            .expect("append");
        drop(log);
        append_uncommitted(&dir, 2, 1, 0x99);

        let mut log = TransactionLog::open(&dir.path().join("test.lg")).expect("reopen log");
        let result = recover(&mut file, &mut log).expect("recover");

        assert_eq!(result.transactions_replayed, 1);
        assert_eq!(result.transactions_discarded, 1);
        assert_eq!(file.read_page(1).expect("page 1").read_u8(0), 0x11);
    }

    #[test]
    fn test_later_commit_wins() {
        let (dir, mut file, mut log) = create_test_store();
        log.append_transaction(1, &[(1, &[0x01; PAGE_SIZE])])
            .expect("append");
        log.append_transaction(2, &[(1, &[0x02; PAGE_SIZE])])
            .expect("append");
        drop(log);

        let mut log = TransactionLog::open(&dir.path().join("test.lg")).expect("reopen log");
        let result = recover(&mut file, &mut log).expect("recover");
        assert_eq!(result.transactions_replayed, 2);
        assert_eq!(file.read_page(1).expect("page 1").read_u8(0), 0x02);
    }
}
