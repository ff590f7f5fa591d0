//! Write-ahead log for crash recovery (§3.5, §4.1, §4.6).
//!
//! The log is a fixed 32-page region of the host file (§3.1, `WAL_REGION_*`
//! in [`types`]), not a separate file: the pager owns the one file handle
//! for the whole database (§3.6), so this crate never opens a file itself.
//! Instead a small buffer of records accumulates in memory and is handed to
//! a [`WalSink`] — implemented by whoever does own the handle — to be
//! durably written.
//!
//! Recovery is the other half: [`recover_scan`] is a pure function over a
//! byte slice so it can be unit-tested without any I/O, and so that this
//! crate never has to depend on `pager` (which depends on this crate for
//! exactly this function, to avoid forming a cycle).


mod record;

pub use record::{verify_checksum, HEADER_SIZE as RECORD_HEADER_SIZE, PAGE_RECORD_SIZE};

use common::{DbError, DbResult};
use types::{PageNum, TxnId, WalRecordType, PAGE_SIZE};

pub const BEGIN: u16 = WalRecordType::Begin as u16;
pub const COMMIT: u16 = WalRecordType::Commit as u16;
pub const ABORT: u16 = WalRecordType::Abort as u16;
pub const PAGE: u16 = WalRecordType::Page as u16;
pub const CHECKPOINT: u16 = WalRecordType::Checkpoint as u16;

/// Size of the in-memory staging buffer. One buffer's worth of records is
/// flushed per transaction under the eager-checkpoint protocol (§4.6), so
/// this also bounds how large a single transaction's dirty set can be.
pub const BUFFER_CAPACITY: usize = 32 * 1024;

/// Durable sink for the WAL's buffer, implemented by whoever owns the
/// underlying file handle (the pager). Kept as a trait here so this crate
/// never needs a dependency on `pager`.
pub trait WalSink {
    /// Write `bytes` at `relative_offset` within the WAL region.
    fn write_wal_region(&mut self, relative_offset: u64, bytes: &[u8]) -> DbResult<()>;

    /// Fsync the underlying file.
    fn sync(&mut self) -> DbResult<()>;

    /// Persist `(wal_head, wal_tail)` into the file header so a crash
    /// between this point and [`Wal::reset_buffer`] can still locate the
    /// flushed records on the next open.
    fn persist_wal_pointers(&mut self, wal_head: u64, wal_tail: u64) -> DbResult<()>;
}

/// In-memory WAL state: the staging buffer plus the head/tail offsets and
/// the running transaction id counter.
#[derive(Debug)]
pub struct Wal {
    buffer: Vec<u8>,
    wal_head: u64,
    wal_tail: u64,
    next_txn_id: TxnId,
    current_txn_id: TxnId,
}

impl Wal {
    /// A brand-new, empty log: used when initializing a fresh database file.
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(BUFFER_CAPACITY),
            wal_head: 0,
            wal_tail: 0,
            next_txn_id: 1,
            current_txn_id: 0,
        }
    }

    /// Rebuild in-memory state from a file header that has just been
    /// through recovery: the buffer starts empty and the pointers are
    /// whatever recovery left them at (normally `0, 0`).
    pub fn restore(wal_head: u64, wal_tail: u64, next_txn_id: TxnId) -> Self {
        Self {
            buffer: Vec::with_capacity(BUFFER_CAPACITY),
            wal_head,
            wal_tail,
            next_txn_id,
            current_txn_id: 0,
        }
    }

    pub fn wal_head(&self) -> u64 {
        self.wal_head
    }

    pub fn wal_tail(&self) -> u64 {
        self.wal_tail
    }

    pub fn next_txn_id(&self) -> TxnId {
        self.next_txn_id
    }

    /// Allocate a fresh transaction id and start staging its records.
    /// Returns the id plus the buffer offset to remember as the
    /// transaction's `txn_start_offset`, which [`Wal::truncate_buffer_to`]
    /// uses on abort.
    pub fn begin_txn(&mut self) -> DbResult<(TxnId, usize)> {
        let id = self.next_txn_id;
        self.next_txn_id += 1;
        self.current_txn_id = id;
        let start_offset = self.buffer.len();
        self.append_framed(record::begin(id))?;
        Ok((id, start_offset))
    }

    /// Append a PAGE record for `page_num`'s post-write image.
    pub fn log_page(&mut self, page_num: PageNum, image: &[u8; PAGE_SIZE]) -> DbResult<()> {
        let txn_id = self.current_txn_id;
        let bytes = record::page(txn_id, page_num, image);
        self.append_framed(bytes)
    }

    /// Append a COMMIT record for the active transaction.
    pub fn log_commit(&mut self) -> DbResult<()> {
        let bytes = record::commit(self.current_txn_id);
        self.append_framed(bytes)
    }

    /// Append an ABORT record for the active transaction.
    pub fn log_abort(&mut self) -> DbResult<()> {
        let bytes = record::abort(self.current_txn_id);
        self.append_framed(bytes)
    }

    /// Append a CHECKPOINT marker.
    pub fn log_checkpoint(&mut self) -> DbResult<()> {
        let bytes = record::checkpoint(self.current_txn_id);
        self.append_framed(bytes)
    }

    fn append_framed(&mut self, bytes: Vec<u8>) -> DbResult<()> {
        if self.buffer.len() + bytes.len() > BUFFER_CAPACITY {
            return Err(DbError::full("wal buffer exhausted"));
        }
        self.buffer.extend_from_slice(&bytes);
        Ok(())
    }

    /// Buffer offset a caller can remember before staging a transaction's
    /// records, for later use with [`Wal::truncate_buffer_to`].
    pub fn buffer_offset(&self) -> usize {
        self.buffer.len()
    }

    /// Discard everything staged since `offset` (used by abort to unwind a
    /// partially staged transaction without touching disk).
    pub fn truncate_buffer_to(&mut self, offset: usize) {
        self.buffer.truncate(offset);
        self.current_txn_id = 0;
    }

    /// Durability point (§4.6 step 3): append the buffer to the WAL region
    /// at the current `wal_head`, fsync, then persist the advanced head so
    /// a crash before [`Wal::reset_buffer`] can still be recovered.
    pub fn flush(&mut self, sink: &mut impl WalSink) -> DbResult<()> {
        sink.write_wal_region(self.wal_head, &self.buffer)?;
        sink.sync()?;
        self.wal_head += self.buffer.len() as u64;
        sink.persist_wal_pointers(self.wal_head, self.wal_tail)?;
        Ok(())
    }

    /// Eager checkpoint (§4.6 step 5): once the transaction's pages have
    /// been written home, the buffer and pointers go back to empty so the
    /// log never accumulates across transactions.
    pub fn reset_buffer(&mut self, sink: &mut impl WalSink) -> DbResult<()> {
        self.buffer.clear();
        self.wal_head = 0;
        self.wal_tail = 0;
        self.current_txn_id = 0;
        sink.persist_wal_pointers(0, 0)
    }
}

impl Default for Wal {
    fn default() -> Self {
        Self::new()
    }
}

/// One structurally valid record found during a scan: its header and the
/// payload slice (borrowed from `region`).
struct ScannedRecord<'a> {
    header: record::RecordHeader,
    payload: &'a [u8],
}

/// Walk `region` from offset 0, stopping at the first record whose magic or
/// checksum doesn't validate, or that would overrun `region`. Returns every
/// record up to (but not including) that point, in order.
fn valid_records(region: &[u8]) -> Vec<ScannedRecord<'_>> {
    let mut out = Vec::new();
    let mut offset = 0usize;

    loop {
        if offset + HEADER_SIZE_INTERNAL > region.len() {
            break;
        }
        let header_bytes = &region[offset..offset + HEADER_SIZE_INTERNAL];
        let header = record::RecordHeader::from_bytes(header_bytes);
        if header.magic != types::WAL_MAGIC {
            break;
        }
        let record_size = header.record_size as usize;
        if record_size < HEADER_SIZE_INTERNAL || offset + record_size > region.len() {
            break;
        }
        let whole = &region[offset..offset + record_size];
        if !record::verify_checksum(whole) {
            break;
        }
        let payload = &whole[HEADER_SIZE_INTERNAL..];
        out.push(ScannedRecord { header, payload });
        offset += record_size;
    }

    out
}

const HEADER_SIZE_INTERNAL: usize = record::HEADER_SIZE;

/// Two-pass redo recovery (§4.1): `region` should already be sliced down to
/// `[0, wal_head)` by the caller. Pass one collects the transaction ids
/// that reached a COMMIT record; pass two collects the PAGE images that
/// belong to one of those committed transactions, in log order (so a later
/// image for the same page in the same pass naturally wins if applied in
/// order).
pub fn recover_scan(region: &[u8]) -> Vec<(TxnId, PageNum, [u8; PAGE_SIZE])> {
    let records = valid_records(region);

    let mut committed = std::collections::HashSet::new();
    for r in &records {
        if r.header.record_type == COMMIT {
            committed.insert(r.header.txn_id);
        }
    }

    let mut out = Vec::new();
    for r in &records {
        if r.header.record_type != PAGE {
            continue;
        }
        if !committed.contains(&r.header.txn_id) {
            continue;
        }
        let (page_num, image_slice) = record::parse_page_payload(r.payload);
        let mut image = [0u8; PAGE_SIZE];
        image.copy_from_slice(image_slice);
        out.push((r.header.txn_id, page_num, image));
    }
    out
}
