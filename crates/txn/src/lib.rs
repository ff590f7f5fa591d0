//! The transaction manager (§4.5, §4.6): BEGIN/COMMIT/ABORT over a
//! [`cache::Cache`], with an eager-checkpoint commit protocol and abort via
//! reload.
//!
//! Unlike [`cache::Cache`] or [`pager::Pager`], a [`Transaction`] does not
//! hold a borrow of the cache across its lifetime — every method that needs
//! one takes `&mut Cache<F>` as an explicit argument, the same way
//! [`common::TxnHandle`] (the write-path hook a [`btree::BTree`] borrows
//! instead) needs no cache access at all for its bookkeeping-only methods.
//! That split keeps a `BTree` free to hold its own exclusive borrow of the
//! cache while a `Transaction` is attached to it via `set_transaction`.


use cache::{Cache, EntryState, PinList};
use common::file::FileAdapter;
use common::{DbError, DbResult, TxnHandle};
use types::{PageNum, TxnId};

/// Bound on the transaction's dirty-page set (§3.7).
pub const MAX_DIRTY_PAGES: usize = 64;

/// Bound on the transaction's pinned-page set (§3.7).
pub const MAX_PINNED_PAGES: usize = 64;

/// The transaction manager's state machine (§4.5): `Idle` → `Active` →
/// (`Committing` → `Idle`) | (`Aborting` → `Idle`). `Committing`/`Aborting`
/// are only ever observed mid-call (commit/abort are synchronous and run to
/// completion on one thread, per §5), but are modeled explicitly so a panic
/// or future async rendering can't silently skip past them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Idle,
    Active,
    Committing,
    Aborting,
}

/// Running counters for diagnostics (§3.7 "counters for stats").
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    pub commits: u64,
    pub aborts: u64,
}

/// One reusable transaction context (§6.2 `Transaction::create`). A single
/// instance cycles `begin` → `commit`/`abort` → `begin` → ... for as many
/// transactions as the embedding application runs, since spec.md's
/// concurrency model allows only one active transaction at a time (§5).
pub struct Transaction {
    state: State,
    txn_id: TxnId,
    txn_start_offset: usize,
    dirty_pages: Vec<PageNum>,
    pinned_pages: PinList,
    stats: Stats,
}

impl Transaction {
    /// A fresh, idle transaction context (§6.2 `Transaction::create`; the
    /// spec's `wal`/`cache` constructor arguments are supplied per-call
    /// instead, see the module docs).
    pub fn create() -> Self {
        Self {
            state: State::Idle,
            txn_id: 0,
            txn_start_offset: 0,
            dirty_pages: Vec::new(),
            pinned_pages: PinList::new(),
            stats: Stats::default(),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    pub fn dirty_pages(&self) -> &[PageNum] {
        &self.dirty_pages
    }

    pub fn pinned_pages(&self) -> &PinList {
        &self.pinned_pages
    }

    /// `txn_id()` as an inherent method so callers don't need
    /// `common::TxnHandle` in scope just to read it.
    pub fn txn_id(&self) -> TxnId {
        TxnHandle::txn_id(self)
    }

    pub fn is_page_dirty(&self, page_num: PageNum) -> bool {
        self.dirty_pages.contains(&page_num)
    }

    /// §4.6 "Begin": allocate a fresh txn id from the WAL's counter, record
    /// the buffer offset abort would truncate back to, and stage an
    /// implicit BEGIN record. Fails `BUSY` if a transaction is already
    /// active (§4.5, §4.7).
    pub fn begin<F: FileAdapter>(&mut self, cache: &mut Cache<F>) -> DbResult<()> {
        if self.state != State::Idle {
            return Err(DbError::busy("begin called while a transaction is already active"));
        }
        let (id, start_offset) = cache.pager_mut().wal_mut().begin_txn()?;
        self.txn_id = id;
        self.txn_start_offset = start_offset;
        self.dirty_pages.clear();
        self.pinned_pages.clear();
        self.state = State::Active;
        Ok(())
    }

    /// Pin `page_num` on the caller's behalf and remember it in this
    /// transaction's bounded pinned-page set, so `commit`/`abort` can unpin
    /// everything in one call (§4.2 "pin / unpin", §3.7).
    pub fn pin_page<F: FileAdapter>(&mut self, cache: &mut Cache<F>, page_num: PageNum) -> DbResult<()> {
        cache.pin(page_num)?;
        let already_tracked = self.pinned_pages.iter().any(|p| p == page_num);
        if !already_tracked && self.pinned_pages.iter().count() >= MAX_PINNED_PAGES {
            cache.unpin(page_num);
            return Err(DbError::full("transaction pinned-page set exhausted"));
        }
        self.pinned_pages.push(page_num);
        Ok(())
    }

    /// §4.6 "Commit (eager checkpoint)", steps 1-6. Preconditions: `ACTIVE`.
    /// Every dirty page in the transaction's set is logged as a full-page
    /// WAL image, a COMMIT record follows, and the WAL is flushed — the
    /// durability boundary (§4.6 step 3). A flush failure means the
    /// transaction never crossed that boundary, so it is rolled back in
    /// place and reported as aborted (§4.7). Once flushed, the dirty pages
    /// are written home, the WAL buffer is reset to empty (the eager
    /// checkpoint), and every pinned/tagged page is released.
    pub fn commit<F: FileAdapter>(&mut self, cache: &mut Cache<F>) -> DbResult<()> {
        if self.state != State::Active {
            return Err(DbError::busy("commit called while no transaction is active"));
        }
        self.state = State::Committing;

        let pages = self.dirty_pages.clone();
        for &page_num in &pages {
            if let Some(info) = cache.find_entry(page_num) {
                if info.state == EntryState::Dirty {
                    let image = *cache
                        .buffer(page_num)
                        .ok_or_else(|| DbError::generic("dirty page missing from cache"))?;
                    cache.pager_mut().wal_mut().log_page(page_num, &image)?;
                }
            }
        }
        cache.pager_mut().wal_mut().log_commit()?;

        if let Err(flush_err) = cache.pager_mut().flush_wal() {
            // The COMMIT record never reached disk: this transaction is not
            // durable. Treat it as aborted rather than leaving it half done.
            self.rollback_in_place(cache);
            return Err(flush_err);
        }

        // Past the durability boundary: an I/O error from here on is
        // tolerated (§4.7) because recovery will redo these exact images on
        // the next open.
        for &page_num in &pages {
            let _ = cache.write_through(page_num);
        }
        cache.sync()?;
        cache.pager_mut().reset_wal_buffer()?;

        cache.unpin_all(&self.pinned_pages);
        for &page_num in &pages {
            cache.clear_txn_tag(page_num);
        }
        self.dirty_pages.clear();
        self.pinned_pages.clear();
        self.txn_id = 0;
        self.stats.commits += 1;
        self.state = State::Idle;
        Ok(())
    }

    /// §4.6 "Abort": reload every dirty page's home image from disk
    /// (discarding in-memory changes), unpin everything, and truncate the
    /// WAL buffer back to this transaction's start offset. A no-op if no
    /// transaction is active, so `destroy` can call it unconditionally.
    pub fn abort<F: FileAdapter>(&mut self, cache: &mut Cache<F>) -> DbResult<()> {
        if self.state != State::Active {
            return Ok(());
        }
        self.rollback_in_place(cache);
        Ok(())
    }

    fn rollback_in_place<F: FileAdapter>(&mut self, cache: &mut Cache<F>) {
        self.state = State::Aborting;
        for &page_num in &self.dirty_pages.clone() {
            cache.reload(page_num);
        }
        cache.unpin_all(&self.pinned_pages);
        cache
            .pager_mut()
            .wal_mut()
            .truncate_buffer_to(self.txn_start_offset);
        self.dirty_pages.clear();
        self.pinned_pages.clear();
        self.txn_id = 0;
        self.stats.aborts += 1;
        self.state = State::Idle;
    }

    /// §6.2 `Transaction::destroy`: implicitly aborts an active transaction
    /// rather than leaving its pages pinned and tagged forever (§4.5
    /// "destroy in ACTIVE implicitly aborts").
    pub fn destroy<F: FileAdapter>(mut self, cache: &mut Cache<F>) -> DbResult<()> {
        if self.state == State::Active {
            self.abort(cache)?;
        }
        Ok(())
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Self::create()
    }
}

impl TxnHandle for Transaction {
    fn txn_id(&self) -> TxnId {
        self.txn_id
    }

    /// §3.7: deduplicated, bounded at [`MAX_DIRTY_PAGES`]. Exceeding the
    /// bound surfaces `FULL` so callers commit/abort more often (§4.6
    /// "Dirty page set").
    fn add_dirty_page(&mut self, page_num: PageNum) -> DbResult<()> {
        if self.dirty_pages.contains(&page_num) {
            return Ok(());
        }
        if self.dirty_pages.len() >= MAX_DIRTY_PAGES {
            return Err(DbError::full("transaction dirty-page set exhausted"));
        }
        self.dirty_pages.push(page_num);
        Ok(())
    }
}
