//! The pager (§4.1): on-disk page format, the file header and free-page
//! bitmap, CRC-checked page I/O, and the crash-recovery trigger run at open.
//!
//! The pager is the sole owner of the file handle (§3.7 "Ownership
//! summary"), so it also owns the [`wal::Wal`] staging area and implements
//! [`wal::WalSink`] for it — the transaction manager drives the WAL through
//! whatever pager it was built on, never touching the file directly.

mod header;
mod page;

#[cfg(test)]
mod tests;

pub use header::{Bitmap, FileHeader};
pub use page::{page_type, set_page_type, stamp, verify as verify_page};

use common::file::{FileAdapter, OsFile};
use common::{DbError, DbResult};
use std::path::Path;
use types::{
    PageNum, PageType, BITMAP_OFFSET, HEADER_SIZE, PAGE_SIZE, WAL_REGION_OFFSET, WAL_REGION_SIZE,
};
use wal::{Wal, WalSink};

/// header (1 page) + WAL region (32 pages) + 2 pad pages, per §4.1.
const MIN_FILE_PAGES: u32 = 35;

/// Embeddable single-file pager. Generic over the file adapter so tests can
/// substitute an in-memory fake; real callers use the default, `OsFile`.
pub struct Pager<F: FileAdapter = OsFile> {
    file: F,
    header: FileHeader,
    bitmap: Bitmap,
    wal: Wal,
    read_only: bool,
}

impl<F: FileAdapter> Pager<F> {
    /// Open (creating if necessary) the database at `path`. See §4.1 for
    /// the full open/recovery algorithm.
    pub fn open(path: &Path, read_only: bool) -> DbResult<Self> {
        let mut file = F::open(path, read_only)?;
        let size = file.size()?;

        if read_only {
            if size < HEADER_SIZE as u64 {
                return Err(DbError::corrupt("file too short to contain a header"));
            }
            let mut head = [0u8; HEADER_SIZE];
            file.read_at(0, &mut head)?;
            let header = FileHeader::from_bytes(&head);
            if header.magic != types::FILE_MAGIC {
                return Err(DbError::corrupt("bad magic: not an amidb file"));
            }
            let mut bitmap_bytes = [0u8; types::BITMAP_SIZE];
            file.read_at(BITMAP_OFFSET as u64, &mut bitmap_bytes)?;
            let bitmap = Bitmap::from_bytes(&bitmap_bytes);
            let wal = Wal::restore(header.wal_head as u64, header.wal_tail as u64, 1);
            return Ok(Self {
                file,
                header,
                bitmap,
                wal,
                read_only,
            });
        }

        let existing = size >= HEADER_SIZE as u64 && {
            let mut head = [0u8; HEADER_SIZE];
            file.read_at(0, &mut head)?;
            FileHeader::from_bytes(&head).magic == types::FILE_MAGIC
        };

        let (mut header, bitmap, was_dirty) = if existing {
            let mut head = [0u8; HEADER_SIZE];
            file.read_at(0, &mut head)?;
            let header = FileHeader::from_bytes(&head);
            let mut bitmap_bytes = [0u8; types::BITMAP_SIZE];
            file.read_at(BITMAP_OFFSET as u64, &mut bitmap_bytes)?;
            let bitmap = Bitmap::from_bytes(&bitmap_bytes);
            let was_dirty = header.is_dirty();
            (header, bitmap, was_dirty)
        } else {
            (FileHeader::fresh(), Bitmap::fresh(), false)
        };

        let min_len = MIN_FILE_PAGES as u64 * PAGE_SIZE as u64;
        if file.size()? < min_len {
            file.set_len(min_len)?;
        }

        let mut wal = Wal::restore(header.wal_head as u64, header.wal_tail as u64, 1);

        if was_dirty {
            let mut region = vec![0u8; WAL_REGION_SIZE];
            file.read_at(WAL_REGION_OFFSET, &mut region)?;
            let bound = (header.wal_head as usize).min(region.len());
            let images = wal::recover_scan(&region[..bound]);
            for (_txn_id, page_num, image) in images {
                Self::raw_write_page(&mut file, page_num, &image)?;
            }
            header.set_dirty(false);
            header.wal_head = 0;
            header.wal_tail = 0;
            wal = Wal::restore(0, 0, wal.next_txn_id());
            Self::persist_header_and_bitmap(&mut file, &header, &bitmap)?;
            file.sync()?;
        }

        header.set_dirty(true);
        Self::persist_header_and_bitmap(&mut file, &header, &bitmap)?;
        file.sync()?;

        Ok(Self {
            file,
            header,
            bitmap,
            wal,
            read_only: false,
        })
    }

    /// Clean shutdown: clears DIRTY so the next open skips recovery.
    pub fn close(mut self) -> DbResult<()> {
        if !self.read_only {
            self.header.set_dirty(false);
            Self::persist_header_and_bitmap(&mut self.file, &self.header, &self.bitmap)?;
            self.file.sync()?;
        }
        Ok(())
    }

    pub fn wal(&self) -> &Wal {
        &self.wal
    }

    pub fn wal_mut(&mut self) -> &mut Wal {
        &mut self.wal
    }

    /// Drive the WAL's durability flush through this pager's own file
    /// handle. Split out from `wal_mut` because `Wal::flush` needs `&mut
    /// Pager` as its sink while also being called *on* `self.wal` — the
    /// classic split-borrow the borrow checker can't see through directly.
    pub fn flush_wal(&mut self) -> DbResult<()> {
        let mut wal = std::mem::take(&mut self.wal);
        let result = wal.flush(self);
        self.wal = wal;
        result
    }

    /// Eager-checkpoint reset (§4.6 step 5), driven through this pager.
    pub fn reset_wal_buffer(&mut self) -> DbResult<()> {
        let mut wal = std::mem::take(&mut self.wal);
        let result = wal.reset_buffer(self);
        self.wal = wal;
        result
    }

    pub fn page_count(&self) -> u32 {
        self.header.page_count
    }

    pub fn root_page(&self) -> PageNum {
        self.header.root_page
    }

    pub fn set_root_page(&mut self, page: PageNum) -> DbResult<()> {
        self.header.root_page = page;
        self.write_header()
    }

    pub fn catalog_root(&self) -> PageNum {
        self.header.catalog_root
    }

    pub fn set_catalog_root(&mut self, page: PageNum) -> DbResult<()> {
        self.header.catalog_root = page;
        self.write_header()
    }

    /// Explicitly persist the header and bitmap (§6.2).
    pub fn write_header(&mut self) -> DbResult<()> {
        Self::persist_header_and_bitmap(&mut self.file, &self.header, &self.bitmap)
    }

    pub fn sync(&mut self) -> DbResult<()> {
        self.file.sync()
    }

    /// Scan the bitmap from page 1 upward for the first clear bit, mark it
    /// allocated, and write a freshly stamped FREE page into the slot
    /// (§4.1: "allocate page").
    pub fn allocate_page(&mut self) -> DbResult<PageNum> {
        let page_num = self
            .bitmap
            .first_clear_from_one()
            .ok_or_else(|| DbError::full("bitmap exhausted: no free page"))?;
        self.bitmap.set(page_num);
        if page_num + 1 > self.header.page_count {
            self.header.page_count = page_num + 1;
        }
        self.write_header()?;

        let needed_len = (page_num as u64 + 1) * PAGE_SIZE as u64;
        if self.file.size()? < needed_len {
            self.file.set_len(needed_len)?;
        }

        let mut buf = [0u8; PAGE_SIZE];
        page::set_page_type(&mut buf, PageType::Free);
        page::stamp(&mut buf, page_num);
        Self::raw_write_page(&mut self.file, page_num, &buf)?;

        Ok(page_num)
    }

    /// Clear the bitmap bit. The page is left as-is on disk; the next
    /// allocation re-stamps it (§9 open question, resolved uniformly).
    pub fn free_page(&mut self, page_num: PageNum) -> DbResult<()> {
        self.bitmap.clear(page_num);
        self.write_header()
    }

    /// Read and verify a non-header page (§4.1: "read page").
    pub fn read_page(&mut self, page_num: PageNum) -> DbResult<[u8; PAGE_SIZE]> {
        if page_num == 0 {
            return Err(DbError::generic("page 0 is the header page"));
        }
        let mut buf = [0u8; PAGE_SIZE];
        self.file
            .read_at(page_num as u64 * PAGE_SIZE as u64, &mut buf)?;
        page::verify(&buf, page_num)?;
        Ok(buf)
    }

    /// Stamp and write a non-header page (§4.1: "write page"). The caller
    /// must have already placed the page_type byte in `body`.
    pub fn write_page(&mut self, page_num: PageNum, body: &mut [u8; PAGE_SIZE]) -> DbResult<()> {
        if page_num == 0 {
            return Err(DbError::generic("page 0 is the header page"));
        }
        page::stamp(body, page_num);
        Self::raw_write_page(&mut self.file, page_num, body)
    }

    fn raw_write_page(file: &mut F, page_num: PageNum, body: &[u8; PAGE_SIZE]) -> DbResult<()> {
        file.write_at(page_num as u64 * PAGE_SIZE as u64, body)
    }

    fn persist_header_and_bitmap(file: &mut F, header: &FileHeader, bitmap: &Bitmap) -> DbResult<()> {
        file.write_at(0, &header.to_bytes())?;
        file.write_at(BITMAP_OFFSET as u64, &bitmap.0)?;
        Ok(())
    }
}

impl<F: FileAdapter> WalSink for Pager<F> {
    fn write_wal_region(&mut self, relative_offset: u64, bytes: &[u8]) -> DbResult<()> {
        self.file
            .write_at(WAL_REGION_OFFSET + relative_offset, bytes)
    }

    fn sync(&mut self) -> DbResult<()> {
        self.file.sync()
    }

    fn persist_wal_pointers(&mut self, wal_head: u64, wal_tail: u64) -> DbResult<()> {
        self.header.wal_head = wal_head as u32;
        self.header.wal_tail = wal_tail as u32;
        self.write_header()
    }
}
