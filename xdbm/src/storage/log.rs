//! Transaction log.
//!
//! Committed transactions are made durable by appending full images of every
//! page they changed to `<name>.lg`, followed by a commit marker. The data
//! file itself is only written at checkpoint time, from the images held
//! here, after which the log is truncated.
//!
//! # Log Record Format
//!
//! Each record has the following layout (integers big-endian):
//! ```text
//! +----------+--------------------------------------------------+
//! | 0-3      | record_length (4 bytes, includes header+payload) |
//! | 4        | record_type (1 byte)                             |
//! | 5-12     | transaction_id (8 bytes)                         |
//! | 13-20    | lsn (8 bytes) - Log Sequence Number              |
//! | 21-N     | payload (variable, depends on type)              |
//! | N-N+3    | CRC32 checksum (4 bytes)                         |
//! +----------+--------------------------------------------------+
//! ```
//!
//! A page image payload is the page id (8 bytes) followed by `PAGE_SIZE`
//! bytes. A commit payload is empty.
//!
//! # Invariants
//!
//! - A transaction's images are only visible to readers after its commit
//!   marker has been written and synced.
//! - `pending` holds, per page, the newest committed image not yet written
//!   to the data file, and the number of transactions that produced it.

// record_length fits in u32
#![allow(clippy::cast_possible_truncation)]

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::storage::page::{PAGE_SIZE, PageId};

/// Log record header size (before payload).
/// `record_length` (4) + `record_type` (1) + `txn_id` (8) + lsn (8) = 21 bytes
const RECORD_HEADER_SIZE: usize = 21;

/// CRC32 checksum size at end of record.
const CHECKSUM_SIZE: usize = 4;

/// Payload size of a page image record.
const PAGE_IMAGE_PAYLOAD_SIZE: usize = 8 + PAGE_SIZE;

/// Log Sequence Number - monotonically increasing identifier for log records.
pub type Lsn = u64;

/// Transaction identifier.
pub type TxnId = u64;

/// Log record types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LogRecordType {
    /// Full image of one page.
    PageImage = 0x01,
    /// Transaction commit marker.
    Commit = 0x02,
}

impl TryFrom<u8> for LogRecordType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Self::PageImage),
            0x02 => Ok(Self::Commit),
            _ => Err(value),
        }
    }
}

/// Payload for different log record types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRecordPayload {
    /// Page image written by a transaction.
    PageImage {
        page_id: PageId,
        data: Box<[u8; PAGE_SIZE]>,
    },
    /// Commit transaction - no additional data.
    Commit,
}

impl LogRecordPayload {
    #[must_use]
    pub const fn record_type(&self) -> LogRecordType {
        match self {
            Self::PageImage { .. } => LogRecordType::PageImage,
            Self::Commit => LogRecordType::Commit,
        }
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        match self {
            Self::PageImage { page_id, data } => {
                out.extend_from_slice(&page_id.to_be_bytes());
                out.extend_from_slice(data.as_slice());
            }
            Self::Commit => {}
        }
    }

    fn from_bytes(record_type: LogRecordType, bytes: &[u8]) -> Result<Self, LogError> {
        match record_type {
            LogRecordType::Commit => Ok(Self::Commit),
            LogRecordType::PageImage => {
                if bytes.len() != PAGE_IMAGE_PAYLOAD_SIZE {
                    return Err(LogError::CorruptRecord);
                }
                let mut id_bytes = [0u8; 8];
                id_bytes.copy_from_slice(&bytes[..8]);
                let mut data = Box::new([0u8; PAGE_SIZE]);
                data.copy_from_slice(&bytes[8..]);
                Ok(Self::PageImage {
                    page_id: u64::from_be_bytes(id_bytes),
                    data,
                })
            }
        }
    }
}

/// A complete log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Transaction ID that wrote this record.
    pub txn_id: TxnId,
    /// Log Sequence Number (position in the log).
    pub lsn: Lsn,
    /// The record payload.
    pub payload: LogRecordPayload,
}

impl LogRecord {
    /// Append the serialized record to `out`.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        let start = out.len();
        out.extend_from_slice(&[0u8; 4]);
        out.push(self.payload.record_type() as u8);
        out.extend_from_slice(&self.txn_id.to_be_bytes());
        out.extend_from_slice(&self.lsn.to_be_bytes());
        self.payload.write_to(out);

        let total_len = (out.len() - start + CHECKSUM_SIZE) as u32;
        out[start..start + 4].copy_from_slice(&total_len.to_be_bytes());

        // CRC32 over everything before it
        let checksum = crc32fast::hash(&out[start..]);
        out.extend_from_slice(&checksum.to_be_bytes());
    }

    /// Deserialize a record from bytes.
    ///
    /// Returns the record and the number of bytes consumed.
    pub fn from_bytes(bytes: &[u8]) -> Result<(Self, usize), LogError> {
        if bytes.len() < RECORD_HEADER_SIZE + CHECKSUM_SIZE {
            return Err(LogError::CorruptRecord);
        }

        let record_len = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        if record_len < RECORD_HEADER_SIZE + CHECKSUM_SIZE || record_len > bytes.len() {
            return Err(LogError::CorruptRecord);
        }

        let stored_checksum = u32::from_be_bytes([
            bytes[record_len - 4],
            bytes[record_len - 3],
            bytes[record_len - 2],
            bytes[record_len - 1],
        ]);
        let computed_checksum = crc32fast::hash(&bytes[..record_len - CHECKSUM_SIZE]);
        if stored_checksum != computed_checksum {
            return Err(LogError::ChecksumMismatch {
                expected: stored_checksum,
                actual: computed_checksum,
            });
        }

        let record_type =
            LogRecordType::try_from(bytes[4]).map_err(LogError::InvalidRecordType)?;
        let mut txn_bytes = [0u8; 8];
        txn_bytes.copy_from_slice(&bytes[5..13]);
        let mut lsn_bytes = [0u8; 8];
        lsn_bytes.copy_from_slice(&bytes[13..21]);

        let payload = LogRecordPayload::from_bytes(
            record_type,
            &bytes[RECORD_HEADER_SIZE..record_len - CHECKSUM_SIZE],
        )?;

        Ok((
            Self {
                txn_id: u64::from_be_bytes(txn_bytes),
                lsn: u64::from_be_bytes(lsn_bytes),
                payload,
            },
            record_len,
        ))
    }
}

/// Newest committed image of a page that has not reached the data file.
#[derive(Debug)]
pub struct PendingImage {
    pub data: Box<[u8; PAGE_SIZE]>,
    /// Committed transactions folded into this image.
    pub transactions: u32,
}

/// Result of reading the log from the start.
#[derive(Debug, Default)]
pub struct LogScan {
    /// Records in file order.
    pub records: Vec<LogRecord>,
    /// Bytes that parsed cleanly.
    pub valid_len: u64,
    /// Trailing bytes that did not form a valid record.
    pub discarded_len: u64,
}

/// The transaction log file.
pub struct TransactionLog {
    file: File,
    path: PathBuf,
    /// Append offset.
    end: u64,
    next_lsn: Lsn,
    pending: BTreeMap<PageId, PendingImage>,
    /// Commits appended since the last truncate.
    committed: usize,
}

impl TransactionLog {
    /// Open the log at `path`, creating it when absent.
    ///
    /// The log is positioned at its end. Callers replay it with
    /// [`scan`](Self::scan) before appending.
    pub fn open(path: &Path) -> Result<Self, LogError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(LogError::Io)?;
        let end = file.metadata().map_err(LogError::Io)?.len();

        Ok(Self {
            file,
            path: path.to_path_buf(),
            end,
            next_lsn: 0,
            pending: BTreeMap::new(),
            committed: 0,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the log in bytes.
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.end
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.end == 0
    }

    /// Read every record from the start of the file.
    ///
    /// Parsing stops at the first record that is short, has a bad length or
    /// fails its checksum; everything from there on is reported as discarded.
    pub fn scan(&mut self) -> Result<LogScan, LogError> {
        let mut bytes = Vec::new();
        self.file.seek(SeekFrom::Start(0)).map_err(LogError::Io)?;
        self.file.read_to_end(&mut bytes).map_err(LogError::Io)?;

        let mut scan = LogScan::default();
        let mut offset = 0usize;
        while offset < bytes.len() {
            match LogRecord::from_bytes(&bytes[offset..]) {
                Ok((record, consumed)) => {
                    self.next_lsn = self.next_lsn.max(record.lsn + 1);
                    scan.records.push(record);
                    offset += consumed;
                }
                Err(e) => {
                    tracing::warn!(
                        "transaction log {} has a torn tail at byte {offset}: {e}",
                        self.path.display()
                    );
                    break;
                }
            }
        }
        scan.valid_len = offset as u64;
        scan.discarded_len = (bytes.len() - offset) as u64;
        Ok(scan)
    }

    /// Append the images of one transaction and its commit marker, then sync.
    ///
    /// On failure the log is cut back to its previous length so a later
    /// append does not follow a half-written transaction.
    pub fn append_transaction(
        &mut self,
        txn_id: TxnId,
        images: &[(PageId, &[u8; PAGE_SIZE])],
    ) -> Result<Lsn, LogError> {
        let mut buf = Vec::with_capacity(
            images.len() * (RECORD_HEADER_SIZE + PAGE_IMAGE_PAYLOAD_SIZE + CHECKSUM_SIZE)
                + RECORD_HEADER_SIZE
                + CHECKSUM_SIZE,
        );
        let mut lsn = self.next_lsn;
        for (page_id, data) in images {
            let mut image = Box::new([0u8; PAGE_SIZE]);
            image.copy_from_slice(data.as_slice());
            LogRecord {
                txn_id,
                lsn,
                payload: LogRecordPayload::PageImage {
                    page_id: *page_id,
                    data: image,
                },
            }
            .write_to(&mut buf);
            lsn += 1;
        }
        let commit_lsn = lsn;
        LogRecord {
            txn_id,
            lsn: commit_lsn,
            payload: LogRecordPayload::Commit,
        }
        .write_to(&mut buf);

        if let Err(e) = self.write_at_end(&buf) {
            if let Err(cleanup) = self.file.set_len(self.end) {
                tracing::warn!("failed to cut back transaction log after error: {cleanup}");
            }
            return Err(e);
        }

        self.end += buf.len() as u64;
        self.next_lsn = commit_lsn + 1;
        self.committed += 1;
        for (page_id, data) in images {
            self.retain(*page_id, data);
        }
        Ok(commit_lsn)
    }

    fn write_at_end(&mut self, buf: &[u8]) -> Result<(), LogError> {
        self.file
            .seek(SeekFrom::Start(self.end))
            .map_err(LogError::Io)?;
        self.file.write_all(buf).map_err(LogError::Io)?;
        self.file.sync_data().map_err(LogError::Io)
    }

    fn retain(&mut self, page_id: PageId, data: &[u8; PAGE_SIZE]) {
        match self.pending.get_mut(&page_id) {
            Some(image) => {
                image.data.copy_from_slice(data.as_slice());
                image.transactions += 1;
            }
            None => {
                let mut copy = Box::new([0u8; PAGE_SIZE]);
                copy.copy_from_slice(data.as_slice());
                self.pending.insert(
                    page_id,
                    PendingImage {
                        data: copy,
                        transactions: 1,
                    },
                );
            }
        }
    }

    /// Newest committed image of `page_id` not yet in the data file.
    #[must_use]
    pub fn pending_image(&self, page_id: PageId) -> Option<&PendingImage> {
        self.pending.get(&page_id)
    }

    /// All pending images in page order.
    pub fn pending_images(&self) -> impl Iterator<Item = (PageId, &PendingImage)> {
        self.pending.iter().map(|(id, image)| (*id, image))
    }

    /// Commits appended since the last truncate.
    #[must_use]
    pub const fn committed_transactions(&self) -> usize {
        self.committed
    }

    /// Empty the log file.
    ///
    /// Returns the pending images that were covered by it, so the caller
    /// can settle the transaction counts of the pages involved.
    pub fn truncate(&mut self) -> Result<BTreeMap<PageId, PendingImage>, LogError> {
        self.file.set_len(0).map_err(LogError::Io)?;
        self.file.sync_all().map_err(LogError::Io)?;
        self.end = 0;
        self.committed = 0;
        Ok(std::mem::take(&mut self.pending))
    }
}

/// Errors that can occur during log operations.
#[derive(Debug)]
pub enum LogError {
    /// I/O error.
    Io(std::io::Error),
    /// Record is shorter than its header or its length field is out of range.
    CorruptRecord,
    /// Checksum mismatch.
    ChecksumMismatch { expected: u32, actual: u32 },
    /// Invalid record type byte.
    InvalidRecordType(u8),
}

impl std::fmt::Display for LogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::CorruptRecord => write!(f, "corrupt log record"),
            Self::ChecksumMismatch { expected, actual } => {
                write!(f, "checksum mismatch: expected {expected}, got {actual}")
            }
            Self::InvalidRecordType(t) => write!(f, "invalid record type: 0x{t:02x}"),
        }
    }
}

impl std::error::Error for LogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}
