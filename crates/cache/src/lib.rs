//! The page cache (§4.2, §3.6): a bounded, fixed-size pool of page buffers
//! sitting between every other subsystem and the [`pager::Pager`].
//!
//! The cache owns a fixed slot array plus an intrusive doubly linked LRU
//! list threaded through the slots by index (§9's "arena-plus-index"
//! design) — not a generic LRU container — because eviction here is not a
//! plain least-recently-used policy: a slot is only a victim when its
//! `pin_count` is zero *and* it is not tagged by an active transaction
//! (§4.2 "get_page"). That extra predicate doesn't fit a borrowed
//! off-the-shelf cache, so the slot table and LRU chain are hand-rolled
//! here, the same way the pager hand-rolls its bitmap instead of reaching
//! for a bitset crate.

#[cfg(test)]
mod tests;

use common::{Config, DbError, DbResult};
use hashbrown::HashMap;
use pager::Pager;
use common::file::{FileAdapter, OsFile};
use types::{PageNum, TxnId, PAGE_SIZE};

/// Default slot-table size (§4.2 "Shape").
pub const DEFAULT_CAPACITY: usize = 128;

/// A cache entry's lifecycle state (§3.6).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryState {
    /// Slot is empty; its buffer contents are meaningless.
    Invalid,
    /// Slot holds a page identical to its on-disk image.
    Clean,
    /// Slot holds a page that has been mutated since the last write-through.
    Dirty,
}

/// A snapshot of one entry's bookkeeping fields, returned by [`Cache::find_entry`].
#[derive(Clone, Copy, Debug)]
pub struct EntryInfo {
    pub state: EntryState,
    pub pin_count: u32,
    pub txn_id: TxnId,
}

struct Slot {
    state: EntryState,
    page_num: PageNum,
    pin_count: u32,
    txn_id: TxnId,
    buf: Box<[u8; PAGE_SIZE]>,
    prev: Option<usize>,
    next: Option<usize>,
}

impl Slot {
    fn empty() -> Self {
        Self {
            state: EntryState::Invalid,
            page_num: 0,
            pin_count: 0,
            txn_id: 0,
            buf: Box::new([0u8; PAGE_SIZE]),
            prev: None,
            next: None,
        }
    }

    fn is_evictable(&self) -> bool {
        self.pin_count == 0 && self.txn_id == 0
    }
}

/// A bounded bulk record of pinned pages, so a caller (notably the B+Tree on
/// an error path) can unpin many pages with one call (§4.2 "pin / unpin").
#[derive(Debug, Default, Clone)]
pub struct PinList(Vec<PageNum>);

impl PinList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, page_num: PageNum) {
        if !self.0.contains(&page_num) {
            self.0.push(page_num);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = PageNum> + '_ {
        self.0.iter().copied()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The bounded page cache, generic over the file adapter the underlying
/// pager uses (so tests can substitute a fake).
pub struct Cache<F: FileAdapter = OsFile> {
    pager: Pager<F>,
    slots: Vec<Slot>,
    index: HashMap<PageNum, usize>,
    /// Most-recently-used end of the LRU chain.
    lru_head: Option<usize>,
    /// Least-recently-used end of the LRU chain.
    lru_tail: Option<usize>,
}

impl<F: FileAdapter> Cache<F> {
    /// Build a cache of `capacity` slots over an already-open pager
    /// (§4.2 "Shape"; §6.2 `Cache::create`).
    pub fn create(pager: Pager<F>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut slots = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            slots.push(Slot::empty());
        }
        Self {
            pager,
            slots,
            index: HashMap::new(),
            lru_head: None,
            lru_tail: None,
        }
    }

    /// Flush, then consume the cache and hand the pager back to the caller
    /// (§4.2 "destroy").
    pub fn destroy(mut self) -> DbResult<Pager<F>> {
        self.flush()?;
        Ok(self.pager)
    }

    pub fn pager(&self) -> &Pager<F> {
        &self.pager
    }

    pub fn pager_mut(&mut self) -> &mut Pager<F> {
        &mut self.pager
    }

    /// Allocate a fresh page through the underlying pager (§6.2).
    pub fn allocate_page(&mut self) -> DbResult<PageNum> {
        self.pager.allocate_page()
    }

    /// Free a page through the underlying pager. Evicts any resident entry
    /// for it so a later reallocation can't observe a stale cached image.
    pub fn free_page(&mut self, page_num: PageNum) -> DbResult<()> {
        if let Some(&slot_idx) = self.index.get(&page_num) {
            self.unlink_lru(slot_idx);
            self.index.remove(&page_num);
            self.slots[slot_idx].state = EntryState::Invalid;
            self.slots[slot_idx].pin_count = 0;
            self.slots[slot_idx].txn_id = 0;
        }
        self.pager.free_page(page_num)
    }

    pub fn sync(&mut self) -> DbResult<()> {
        self.pager.sync()
    }

    /// §4.2 "get_page(n)": resident hit moves the entry to the LRU head and
    /// pins it; a miss loads it through the pager into a reclaimed slot.
    pub fn get_page(&mut self, page_num: PageNum) -> DbResult<&mut [u8; PAGE_SIZE]> {
        if let Some(&slot_idx) = self.index.get(&page_num) {
            self.touch_lru(slot_idx);
            self.slots[slot_idx].pin_count += 1;
            return Ok(&mut self.slots[slot_idx].buf);
        }

        let slot_idx = self.reclaim_slot()?;
        let body = self.pager.read_page(page_num)?;
        let slot = &mut self.slots[slot_idx];
        slot.buf.copy_from_slice(&body);
        slot.state = EntryState::Clean;
        slot.page_num = page_num;
        slot.pin_count = 1;
        slot.txn_id = 0;
        self.index.insert(page_num, slot_idx);
        self.push_lru_head(slot_idx);
        Ok(&mut self.slots[slot_idx].buf)
    }

    /// Read-only peek at a resident page's buffer without touching LRU order
    /// or the pin count. Used by the transaction manager to snapshot a
    /// dirty page's image for a WAL PAGE record, and to write it home on
    /// commit, without disturbing the B+Tree's own pins.
    pub fn buffer(&self, page_num: PageNum) -> Option<&[u8; PAGE_SIZE]> {
        self.index.get(&page_num).map(|&i| &*self.slots[i].buf)
    }

    /// §4.2 "mark_dirty(n)": idempotent; fails if the page is not resident.
    pub fn mark_dirty(&mut self, page_num: PageNum) -> DbResult<()> {
        let idx = self.require_resident(page_num)?;
        self.slots[idx].state = EntryState::Dirty;
        Ok(())
    }

    /// Stamp a resident entry with the owning transaction's id, so
    /// [`Cache::flush`] skips it until commit/abort clears the tag (§4.3
    /// "Transaction integration" step (c)).
    pub fn set_txn_tag(&mut self, page_num: PageNum, txn_id: TxnId) -> DbResult<()> {
        let idx = self.require_resident(page_num)?;
        self.slots[idx].txn_id = txn_id;
        Ok(())
    }

    pub fn clear_txn_tag(&mut self, page_num: PageNum) {
        if let Some(&idx) = self.index.get(&page_num) {
            self.slots[idx].txn_id = 0;
        }
    }

    /// §4.2 "pin / unpin": adjust `pin_count`; unpinning an already-zero
    /// count is a no-op.
    pub fn pin(&mut self, page_num: PageNum) -> DbResult<()> {
        let idx = self.require_resident(page_num)?;
        self.slots[idx].pin_count += 1;
        Ok(())
    }

    pub fn unpin(&mut self, page_num: PageNum) {
        if let Some(&idx) = self.index.get(&page_num) {
            if self.slots[idx].pin_count > 0 {
                self.slots[idx].pin_count -= 1;
            }
        }
    }

    pub fn unpin_all(&mut self, pins: &PinList) {
        for page_num in pins.iter() {
            self.unpin(page_num);
        }
    }

    /// Bookkeeping snapshot for a resident page, used by the transaction
    /// manager (§6.2 `find_entry`).
    pub fn find_entry(&self, page_num: PageNum) -> Option<EntryInfo> {
        self.index.get(&page_num).map(|&idx| {
            let slot = &self.slots[idx];
            EntryInfo {
                state: slot.state,
                pin_count: slot.pin_count,
                txn_id: slot.txn_id,
            }
        })
    }

    /// Write a resident page's buffer through the pager unconditionally
    /// (regardless of dirty state or pin count) and mark it clean. Used by
    /// the eager-checkpoint commit path (§4.6 step 4).
    pub fn write_through(&mut self, page_num: PageNum) -> DbResult<()> {
        let idx = self.require_resident(page_num)?;
        let mut body = *self.slots[idx].buf;
        self.pager.write_page(page_num, &mut body)?;
        self.slots[idx].buf = Box::new(body);
        self.slots[idx].state = EntryState::Clean;
        Ok(())
    }

    /// Abort's reload step (§4.6 "Abort"): discard in-memory changes by
    /// re-reading the home image from disk into the resident buffer, then
    /// mark it clean and untagged. If the read itself fails the entry is
    /// invalidated instead of left in an inconsistent state.
    pub fn reload(&mut self, page_num: PageNum) {
        let Some(&idx) = self.index.get(&page_num) else {
            return;
        };
        match self.pager.read_page(page_num) {
            Ok(body) => {
                self.slots[idx].buf = Box::new(body);
                self.slots[idx].state = EntryState::Clean;
                self.slots[idx].txn_id = 0;
            }
            Err(_) => {
                self.unlink_lru(idx);
                self.index.remove(&page_num);
                self.slots[idx].state = EntryState::Invalid;
                self.slots[idx].pin_count = 0;
                self.slots[idx].txn_id = 0;
            }
        }
    }

    /// §4.2 "flush": write every DIRTY, untagged entry through the pager,
    /// then sync. Entries tagged by an active transaction are skipped —
    /// only that transaction's own commit may persist them.
    pub fn flush(&mut self) -> DbResult<()> {
        let dirty: Vec<PageNum> = self
            .slots
            .iter()
            .filter(|s| s.state == EntryState::Dirty && s.txn_id == 0)
            .map(|s| s.page_num)
            .collect();
        for page_num in dirty {
            self.write_through(page_num)?;
        }
        self.pager.sync()
    }

    fn require_resident(&self, page_num: PageNum) -> DbResult<usize> {
        self.index
            .get(&page_num)
            .copied()
            .ok_or_else(|| DbError::generic(format!("page {page_num} is not resident")))
    }

    /// Find an `Invalid` slot, or walk the LRU from the tail looking for an
    /// evictable victim (unpinned, untagged), flushing it first if dirty.
    fn reclaim_slot(&mut self) -> DbResult<usize> {
        if let Some(idx) = self.slots.iter().position(|s| s.state == EntryState::Invalid) {
            return Ok(idx);
        }

        let mut cursor = self.lru_tail;
        while let Some(idx) = cursor {
            let prev = self.slots[idx].prev;
            if self.slots[idx].is_evictable() {
                if self.slots[idx].state == EntryState::Dirty {
                    let page_num = self.slots[idx].page_num;
                    self.write_through(page_num)?;
                }
                let page_num = self.slots[idx].page_num;
                self.unlink_lru(idx);
                self.index.remove(&page_num);
                self.slots[idx].state = EntryState::Invalid;
                return Ok(idx);
            }
            cursor = prev;
        }

        Err(DbError::busy("cache full: no evictable page"))
    }

    fn push_lru_head(&mut self, idx: usize) {
        self.slots[idx].prev = None;
        self.slots[idx].next = self.lru_head;
        if let Some(old_head) = self.lru_head {
            self.slots[old_head].prev = Some(idx);
        }
        self.lru_head = Some(idx);
        if self.lru_tail.is_none() {
            self.lru_tail = Some(idx);
        }
    }

    fn unlink_lru(&mut self, idx: usize) {
        let prev = self.slots[idx].prev;
        let next = self.slots[idx].next;
        match prev {
            Some(p) => self.slots[p].next = next,
            None => self.lru_head = next,
        }
        match next {
            Some(n) => self.slots[n].prev = prev,
            None => self.lru_tail = prev,
        }
        self.slots[idx].prev = None;
        self.slots[idx].next = None;
    }

    fn touch_lru(&mut self, idx: usize) {
        if self.lru_head == Some(idx) {
            return;
        }
        self.unlink_lru(idx);
        self.push_lru_head(idx);
    }
}

impl Cache<OsFile> {
    /// Open the host file named by `config.path` and build a cache over it
    /// in one step — the ambient entry point an embedder uses instead of
    /// calling `Pager::open`/`Cache::create` separately (§6.2).
    pub fn open(config: &Config) -> DbResult<Self> {
        let pager = Pager::open(&config.path, config.read_only)?;
        Ok(Self::create(pager, config.cache_capacity))
    }
}
