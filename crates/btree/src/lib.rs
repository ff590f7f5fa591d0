//! The B+Tree (§4.3): a fixed-order index over `i32` keys, built directly on
//! page buffers the [`cache::Cache`] hands back — no generic serializer, the
//! same "the page buffer *is* the wire format" discipline `pager` and `wal`
//! use for their own framed structures.
//!
//! Descent is iterative (plain child-pointer following, bounded by
//! [`MAX_HEIGHT`]); the ascent that insert/delete rebalancing needs follows
//! each node's `parent` field rather than a retained path stack, with the
//! handful of cascading split/merge calls recursing no deeper than the
//! tree's own height. That is safe here (unlike a stack-frame-heavy C
//! transliteration) because every node lives in a cache-owned `Box`, not a
//! large on-stack buffer.

mod node;


pub use node::{MIN_KEYS, ORDER};

use cache::Cache;
use common::file::{FileAdapter, OsFile};
use common::{DbError, DbResult, TxnHandle};
use types::{Key, NodeType, PageNum, PageType};

/// Bound on tree depth used by every iterative/recursive walk (§9 notes this
/// is generous for an order-64 tree: height 16 covers far more than
/// `MAX_PAGES` worth of keys).
const MAX_HEIGHT: usize = 16;

/// A fixed-order B+Tree over one page region, sharing a cache (and the
/// pager beneath it) with every other tree in the file — the catalog tree
/// and each user table's tree all route page I/O through the same `Cache`.
///
/// Borrows the cache and, optionally, the active transaction's write-path
/// hook for the duration of one borrow scope; callers construct a `BTree`
/// fresh for each operation (or short sequence of operations) rather than
/// holding one open across an entire session.
pub struct BTree<'c, F: FileAdapter = OsFile> {
    cache: &'c mut Cache<F>,
    root_page: PageNum,
    txn: Option<&'c mut dyn TxnHandle>,
}

/// A forward-only iterator over a tree's leaves in ascending key order
/// (§4.3 "cursor"). Holds no borrow of the tree between calls; each
/// operation re-borrows the `BTree` that produced it.
#[derive(Clone, Copy, Debug)]
pub struct Cursor {
    leaf: PageNum,
    index: usize,
    valid: bool,
}

impl Cursor {
    pub fn valid(&self) -> bool {
        self.valid
    }
}

/// Diagnostic counts returned by [`BTree::stats`] (§6.2).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Stats {
    pub entries: usize,
    pub height: usize,
    pub nodes: usize,
}

impl<'c, F: FileAdapter> BTree<'c, F> {
    /// Allocate a fresh, empty tree: one LEAF page, written and synced
    /// before returning so a crash immediately after `create` never leaves
    /// a root pointer dangling (§6.2 `BTree::create`).
    pub fn create(cache: &'c mut Cache<F>) -> DbResult<(Self, PageNum)> {
        let root_page = Self::create_root_leaf(cache)?;
        Ok((
            Self {
                cache,
                root_page,
                txn: None,
            },
            root_page,
        ))
    }

    fn create_root_leaf(cache: &mut Cache<F>) -> DbResult<PageNum> {
        let page_num = cache.allocate_page()?;
        {
            let buf = cache.get_page(page_num)?;
            pager::set_page_type(buf, PageType::BTree);
            node::init_leaf(buf, 0);
        }
        cache.unpin(page_num);
        cache.mark_dirty(page_num)?;
        cache.write_through(page_num)?;
        cache.sync()?;
        Ok(page_num)
    }

    /// Attach to an existing tree rooted at `root_page` (§6.2 `BTree::open`).
    pub fn open(cache: &'c mut Cache<F>, root_page: PageNum) -> Self {
        Self {
            cache,
            root_page,
            txn: None,
        }
    }

    /// Release the borrow on the cache. A no-op beyond dropping `self`;
    /// named to mirror the pager/cache/WAL lifecycle methods (§6.2).
    pub fn close(self) {}

    pub fn root_page(&self) -> PageNum {
        self.root_page
    }

    /// Attach (or detach, with `None`) the active transaction's write-path
    /// hook. Every subsequent mutation marks its touched pages dirty,
    /// records them in the transaction's dirty set, and tags the cache
    /// entry with the transaction's id so `Cache::flush` leaves them alone
    /// until that transaction commits or aborts (§4.3 "Transaction
    /// integration").
    pub fn set_transaction(&mut self, txn: Option<&'c mut dyn TxnHandle>) {
        self.txn = txn;
    }

    /// Mark `page_num` dirty and, if a transaction is attached, fold it
    /// into that transaction's bookkeeping. Always called with the page
    /// already unpinned, so a `FULL` dirty-set error never leaves a pin
    /// leaked on the error path (§9 "every exit restores pin state").
    fn touch(&mut self, page_num: PageNum) -> DbResult<()> {
        self.cache.mark_dirty(page_num)?;
        if let Some(txn) = self.txn.as_deref_mut() {
            let id = txn.txn_id();
            txn.add_dirty_page(page_num)?;
            self.cache.set_txn_tag(page_num, id)?;
        }
        Ok(())
    }

    /// Descend from the root to the leaf that would hold `target`,
    /// following `children[i]` for the first `i` with `keys[i] > target`
    /// (equal keys route to the right child, §4.3's routing rule).
    fn find_leaf(&mut self, target: Key) -> DbResult<PageNum> {
        let mut current = self.root_page;
        for _ in 0..MAX_HEIGHT {
            let buf = self.cache.get_page(current)?;
            if node::node_type(buf) == NodeType::Leaf {
                self.cache.unpin(current);
                return Ok(current);
            }
            let next = match node::binary_search(buf, target) {
                Ok(i) => node::child(buf, i + 1),
                Err(i) => node::child(buf, i),
            };
            self.cache.unpin(current);
            current = next;
        }
        Err(DbError::corrupt("btree descent exceeded MAX_HEIGHT"))
    }

    /// Point lookup (§4.3 `search`). `NOTFOUND` if the key is absent.
    pub fn search(&mut self, target: Key) -> DbResult<u32> {
        let leaf = self.find_leaf(target)?;
        let buf = self.cache.get_page(leaf)?;
        let result = node::binary_search(buf, target).map(|i| node::value(buf, i));
        self.cache.unpin(leaf);
        result.map_err(|_| DbError::not_found(format!("key {target} not found")))
    }

    /// Insert or, if `target` is already present, overwrite its value
    /// (§4.3 `insert`). Splits the destination leaf first if it is full,
    /// cascading splits up through ancestors as needed.
    pub fn insert(&mut self, target: Key, value: u32) -> DbResult<()> {
        let mut leaf = self.find_leaf(target)?;
        let is_full = {
            let buf = self.cache.get_page(leaf)?;
            let full = node::num_keys(buf) == ORDER;
            self.cache.unpin(leaf);
            full
        };
        if is_full {
            self.split_leaf(leaf)?;
            leaf = self.find_leaf(target)?;
        }

        let buf = self.cache.get_page(leaf)?;
        let n = node::num_keys(buf);
        match node::binary_search(buf, target) {
            Ok(i) => node::set_value(buf, i, value),
            Err(i) => {
                node::shift_leaf_right(buf, i, n);
                node::set_key(buf, i, target);
                node::set_value(buf, i, value);
                node::set_num_keys(buf, n + 1);
            }
        }
        self.cache.unpin(leaf);
        self.touch(leaf)
    }

    /// Split a full leaf in half, link `next_leaf` across the new sibling,
    /// and insert the separator (the new right half's first key) into the
    /// parent (§4.3 "split leaf").
    fn split_leaf(&mut self, left: PageNum) -> DbResult<()> {
        let right = self.cache.allocate_page()?;

        let split_key = {
            let left_buf = self.cache.get_page(left)?;
            let n = node::num_keys(left_buf);
            let split_at = ORDER / 2;
            let parent_of_left = node::parent(left_buf);
            let old_next = node::next_leaf(left_buf);

            let mut right_keys = Vec::with_capacity(n - split_at);
            let mut right_vals = Vec::with_capacity(n - split_at);
            for i in split_at..n {
                right_keys.push(node::key(left_buf, i));
                right_vals.push(node::value(left_buf, i));
            }
            node::set_num_keys(left_buf, split_at);
            node::set_next_leaf(left_buf, right);
            self.cache.unpin(left);
            self.touch(left)?;

            let right_buf = self.cache.get_page(right)?;
            pager::set_page_type(right_buf, PageType::BTree);
            node::init_leaf(right_buf, parent_of_left);
            node::set_next_leaf(right_buf, old_next);
            for (i, (k, v)) in right_keys.iter().zip(right_vals.iter()).enumerate() {
                node::set_key(right_buf, i, *k);
                node::set_value(right_buf, i, *v);
            }
            node::set_num_keys(right_buf, right_keys.len());
            self.cache.unpin(right);
            self.touch(right)?;

            right_keys[0]
        };

        self.insert_into_parent(left, split_key, right)
    }

    /// Insert separator `split_key` between `left` and its new right
    /// sibling `right` into `left`'s parent, creating a new root if `left`
    /// had none, splitting the parent first if it is already full
    /// (§4.3 "insert into parent").
    fn insert_into_parent(&mut self, left: PageNum, split_key: Key, right: PageNum) -> DbResult<()> {
        let parent = {
            let buf = self.cache.get_page(left)?;
            let p = node::parent(buf);
            self.cache.unpin(left);
            p
        };

        if parent == 0 {
            let new_root = self.cache.allocate_page()?;
            {
                let buf = self.cache.get_page(new_root)?;
                pager::set_page_type(buf, PageType::BTree);
                node::init_internal(buf, 0);
                node::set_key(buf, 0, split_key);
                node::set_child(buf, 0, left);
                node::set_child(buf, 1, right);
                node::set_num_keys(buf, 1);
            }
            self.cache.unpin(new_root);
            self.touch(new_root)?;

            self.set_parent_field(left, new_root)?;
            self.set_parent_field(right, new_root)?;
            self.root_page = new_root;
            return Ok(());
        }

        let parent_full = {
            let buf = self.cache.get_page(parent)?;
            let full = node::num_keys(buf) == ORDER;
            self.cache.unpin(parent);
            full
        };
        if parent_full {
            self.split_internal(parent)?;
        }

        // `left`'s parent may have changed if `left` moved into the new
        // right sibling produced by the split above.
        let parent_now = {
            let buf = self.cache.get_page(left)?;
            let p = node::parent(buf);
            self.cache.unpin(left);
            p
        };

        {
            let buf = self.cache.get_page(parent_now)?;
            let n = node::num_keys(buf);
            let idx = match node::binary_search(buf, split_key) {
                Ok(i) | Err(i) => i,
            };
            node::shift_internal_right(buf, idx, n);
            node::set_key(buf, idx, split_key);
            node::set_child(buf, idx + 1, right);
            node::set_num_keys(buf, n + 1);
        }
        self.cache.unpin(parent_now);
        self.touch(parent_now)?;

        self.set_parent_field(right, parent_now)
    }

    /// Split a full internal node around its median key, which is promoted
    /// (not copied) into the parent as the new separator (§4.3 "split
    /// internal").
    fn split_internal(&mut self, internal: PageNum) -> DbResult<()> {
        let right = self.cache.allocate_page()?;

        let (promoted, right_children) = {
            let buf = self.cache.get_page(internal)?;
            let n = node::num_keys(buf);
            let median = ORDER / 2;
            let promoted = node::key(buf, median);
            let parent_of_node = node::parent(buf);

            let mut right_keys = Vec::with_capacity(n - median - 1);
            for i in (median + 1)..n {
                right_keys.push(node::key(buf, i));
            }
            let mut right_children = Vec::with_capacity(n - median);
            for i in (median + 1)..=n {
                right_children.push(node::child(buf, i));
            }
            node::set_num_keys(buf, median);
            self.cache.unpin(internal);
            self.touch(internal)?;

            let right_buf = self.cache.get_page(right)?;
            pager::set_page_type(right_buf, PageType::BTree);
            node::init_internal(right_buf, parent_of_node);
            for (i, k) in right_keys.iter().enumerate() {
                node::set_key(right_buf, i, *k);
            }
            for (i, c) in right_children.iter().enumerate() {
                node::set_child(right_buf, i, *c);
            }
            node::set_num_keys(right_buf, right_keys.len());
            self.cache.unpin(right);
            self.touch(right)?;

            (promoted, right_children)
        };

        for child in right_children {
            self.set_parent_field(child, right)?;
        }

        self.insert_into_parent(internal, promoted, right)
    }

    fn set_parent_field(&mut self, page: PageNum, parent: PageNum) -> DbResult<()> {
        {
            let buf = self.cache.get_page(page)?;
            node::set_parent(buf, parent);
        }
        self.cache.unpin(page);
        self.touch(page)
    }

    /// Remove `target` (§4.3 `delete`). `NOTFOUND` if absent. Rebalances
    /// the containing leaf (and cascades upward) when its key count drops
    /// below [`MIN_KEYS`].
    pub fn delete(&mut self, target: Key) -> DbResult<()> {
        let leaf = self.find_leaf(target)?;
        let (idx, n) = {
            let buf = self.cache.get_page(leaf)?;
            let n = node::num_keys(buf);
            match node::binary_search(buf, target) {
                Ok(i) => (i, n),
                Err(_) => {
                    self.cache.unpin(leaf);
                    return Err(DbError::not_found(format!("key {target} not found")));
                }
            }
        };
        {
            let buf = self.cache.get_page(leaf)?;
            node::shift_leaf_left(buf, idx, n);
            node::set_num_keys(buf, n - 1);
        }
        self.cache.unpin(leaf);
        self.touch(leaf)?;

        let (is_root, new_n) = {
            let buf = self.cache.get_page(leaf)?;
            let p = node::parent(buf);
            let nn = node::num_keys(buf);
            self.cache.unpin(leaf);
            (p == 0, nn)
        };
        if !is_root && new_n < MIN_KEYS {
            self.rebalance(leaf)?;
        }
        Ok(())
    }

    /// Restore the B+Tree invariant for an underfull node: borrow a key
    /// from a sibling with room to spare, or merge with one, cascading
    /// upward through the parent chain as needed (§4.3 "rebalance").
    fn rebalance(&mut self, page: PageNum) -> DbResult<()> {
        let (parent, is_leaf) = {
            let buf = self.cache.get_page(page)?;
            let p = node::parent(buf);
            let leaf = node::node_type(buf) == NodeType::Leaf;
            self.cache.unpin(page);
            (p, leaf)
        };

        if parent == 0 {
            if !is_leaf {
                let n = {
                    let buf = self.cache.get_page(page)?;
                    let n = node::num_keys(buf);
                    self.cache.unpin(page);
                    n
                };
                if n == 0 {
                    let only_child = {
                        let buf = self.cache.get_page(page)?;
                        let c = node::child(buf, 0);
                        self.cache.unpin(page);
                        c
                    };
                    self.set_parent_field(only_child, 0)?;
                    self.root_page = only_child;
                    self.cache.free_page(page)?;
                }
            }
            return Ok(());
        }

        let idx_in_parent = {
            let buf = self.cache.get_page(parent)?;
            let n = node::num_keys(buf);
            let found = (0..=n).find(|&i| node::child(buf, i) == page);
            self.cache.unpin(parent);
            found.expect("a node must be a child of its own recorded parent")
        };
        let parent_n = {
            let buf = self.cache.get_page(parent)?;
            let n = node::num_keys(buf);
            self.cache.unpin(parent);
            n
        };

        if idx_in_parent < parent_n {
            let right_sibling = self.child_at(parent, idx_in_parent + 1)?;
            let right_n = self.num_keys_of(right_sibling)?;
            if right_n > MIN_KEYS {
                return self.borrow_from_right(page, parent, idx_in_parent, right_sibling, is_leaf);
            }
        }
        if idx_in_parent > 0 {
            let left_sibling = self.child_at(parent, idx_in_parent - 1)?;
            let left_n = self.num_keys_of(left_sibling)?;
            if left_n > MIN_KEYS {
                return self.borrow_from_left(page, parent, idx_in_parent, left_sibling, is_leaf);
            }
        }

        if idx_in_parent < parent_n {
            let right_sibling = self.child_at(parent, idx_in_parent + 1)?;
            self.merge(page, parent, idx_in_parent, right_sibling, is_leaf)
        } else {
            let left_sibling = self.child_at(parent, idx_in_parent - 1)?;
            self.merge(left_sibling, parent, idx_in_parent - 1, page, is_leaf)
        }
    }

    fn child_at(&mut self, page: PageNum, i: usize) -> DbResult<PageNum> {
        let buf = self.cache.get_page(page)?;
        let c = node::child(buf, i);
        self.cache.unpin(page);
        Ok(c)
    }

    fn num_keys_of(&mut self, page: PageNum) -> DbResult<usize> {
        let buf = self.cache.get_page(page)?;
        let n = node::num_keys(buf);
        self.cache.unpin(page);
        Ok(n)
    }

    /// Move one entry from `right`'s low end to `page`'s high end, then fix
    /// up the parent separator at `idx_in_parent` (§4.3 "borrow from right
    /// sibling").
    fn borrow_from_right(
        &mut self,
        page: PageNum,
        parent: PageNum,
        idx_in_parent: usize,
        right: PageNum,
        is_leaf: bool,
    ) -> DbResult<()> {
        if is_leaf {
            let (k, v) = {
                let buf = self.cache.get_page(right)?;
                let kv = (node::key(buf, 0), node::value(buf, 0));
                self.cache.unpin(right);
                kv
            };
            {
                let buf = self.cache.get_page(page)?;
                let n = node::num_keys(buf);
                node::set_key(buf, n, k);
                node::set_value(buf, n, v);
                node::set_num_keys(buf, n + 1);
            }
            self.cache.unpin(page);
            self.touch(page)?;

            let new_sep = {
                let buf = self.cache.get_page(right)?;
                let rn = node::num_keys(buf);
                node::shift_leaf_left(buf, 0, rn);
                node::set_num_keys(buf, rn - 1);
                node::key(buf, 0)
            };
            self.cache.unpin(right);
            self.touch(right)?;

            {
                let buf = self.cache.get_page(parent)?;
                node::set_key(buf, idx_in_parent, new_sep);
            }
            self.cache.unpin(parent);
            self.touch(parent)
        } else {
            let sep = {
                let buf = self.cache.get_page(parent)?;
                let k = node::key(buf, idx_in_parent);
                self.cache.unpin(parent);
                k
            };
            let (right_first_key, right_first_child) = {
                let buf = self.cache.get_page(right)?;
                let kv = (node::key(buf, 0), node::child(buf, 0));
                self.cache.unpin(right);
                kv
            };
            {
                let buf = self.cache.get_page(page)?;
                let n = node::num_keys(buf);
                node::set_key(buf, n, sep);
                node::set_child(buf, n + 1, right_first_child);
                node::set_num_keys(buf, n + 1);
            }
            self.cache.unpin(page);
            self.touch(page)?;
            self.set_parent_field(right_first_child, page)?;

            {
                let buf = self.cache.get_page(right)?;
                let rn = node::num_keys(buf);
                node::shift_internal_left(buf, 0, 0, rn);
                node::set_num_keys(buf, rn - 1);
            }
            self.cache.unpin(right);
            self.touch(right)?;

            {
                let buf = self.cache.get_page(parent)?;
                node::set_key(buf, idx_in_parent, right_first_key);
            }
            self.cache.unpin(parent);
            self.touch(parent)
        }
    }

    /// Mirror of [`Self::borrow_from_right`], pulling from `left`'s high end
    /// (§4.3 "borrow from left sibling").
    fn borrow_from_left(
        &mut self,
        page: PageNum,
        parent: PageNum,
        idx_in_parent: usize,
        left: PageNum,
        is_leaf: bool,
    ) -> DbResult<()> {
        if is_leaf {
            let (k, v) = {
                let buf = self.cache.get_page(left)?;
                let ln = node::num_keys(buf);
                let kv = (node::key(buf, ln - 1), node::value(buf, ln - 1));
                node::set_num_keys(buf, ln - 1);
                kv
            };
            self.cache.unpin(left);
            self.touch(left)?;

            {
                let buf = self.cache.get_page(page)?;
                let n = node::num_keys(buf);
                node::shift_leaf_right(buf, 0, n);
                node::set_key(buf, 0, k);
                node::set_value(buf, 0, v);
                node::set_num_keys(buf, n + 1);
            }
            self.cache.unpin(page);
            self.touch(page)?;

            {
                let buf = self.cache.get_page(parent)?;
                node::set_key(buf, idx_in_parent - 1, k);
            }
            self.cache.unpin(parent);
            self.touch(parent)
        } else {
            let sep = {
                let buf = self.cache.get_page(parent)?;
                let k = node::key(buf, idx_in_parent - 1);
                self.cache.unpin(parent);
                k
            };
            let (left_last_key, left_last_child, left_n) = {
                let buf = self.cache.get_page(left)?;
                let ln = node::num_keys(buf);
                (node::key(buf, ln - 1), node::child(buf, ln), ln)
            };
            self.cache.unpin(left);

            {
                let buf = self.cache.get_page(page)?;
                let n = node::num_keys(buf);
                node::shift_internal_right(buf, 0, n);
                node::set_key(buf, 0, sep);
                node::set_child(buf, 0, left_last_child);
                node::set_num_keys(buf, n + 1);
            }
            self.cache.unpin(page);
            self.touch(page)?;
            self.set_parent_field(left_last_child, page)?;

            {
                let buf = self.cache.get_page(left)?;
                node::set_num_keys(buf, left_n - 1);
            }
            self.cache.unpin(left);
            self.touch(left)?;

            {
                let buf = self.cache.get_page(parent)?;
                node::set_key(buf, idx_in_parent - 1, left_last_key);
            }
            self.cache.unpin(parent);
            self.touch(parent)
        }
    }

    /// Concatenate `right` into `left`, remove the now-redundant separator
    /// at `sep_idx` in `parent`, free `right`'s page, and recurse upward if
    /// the parent itself became underfull (§4.3 "merge"). For internal
    /// nodes the parent's separator is pulled down between the two halves
    /// rather than dropped, preserving the routing invariant.
    fn merge(
        &mut self,
        left: PageNum,
        parent: PageNum,
        sep_idx: usize,
        right: PageNum,
        is_leaf: bool,
    ) -> DbResult<()> {
        if is_leaf {
            let (right_keys, right_vals, right_next) = {
                let buf = self.cache.get_page(right)?;
                let rn = node::num_keys(buf);
                let mut ks = Vec::with_capacity(rn);
                let mut vs = Vec::with_capacity(rn);
                for i in 0..rn {
                    ks.push(node::key(buf, i));
                    vs.push(node::value(buf, i));
                }
                (ks, vs, node::next_leaf(buf))
            };
            self.cache.unpin(right);

            {
                let buf = self.cache.get_page(left)?;
                let ln = node::num_keys(buf);
                for (i, (k, v)) in right_keys.iter().zip(right_vals.iter()).enumerate() {
                    node::set_key(buf, ln + i, *k);
                    node::set_value(buf, ln + i, *v);
                }
                node::set_num_keys(buf, ln + right_keys.len());
                node::set_next_leaf(buf, right_next);
            }
            self.cache.unpin(left);
            self.touch(left)?;
        } else {
            let sep_key = {
                let buf = self.cache.get_page(parent)?;
                let k = node::key(buf, sep_idx);
                self.cache.unpin(parent);
                k
            };
            let (right_keys, right_children) = {
                let buf = self.cache.get_page(right)?;
                let rn = node::num_keys(buf);
                let mut ks = Vec::with_capacity(rn);
                for i in 0..rn {
                    ks.push(node::key(buf, i));
                }
                let mut cs = Vec::with_capacity(rn + 1);
                for i in 0..=rn {
                    cs.push(node::child(buf, i));
                }
                (ks, cs)
            };
            self.cache.unpin(right);

            {
                let buf = self.cache.get_page(left)?;
                let ln = node::num_keys(buf);
                node::set_key(buf, ln, sep_key);
                for (i, k) in right_keys.iter().enumerate() {
                    node::set_key(buf, ln + 1 + i, *k);
                }
                for (i, c) in right_children.iter().enumerate() {
                    node::set_child(buf, ln + 1 + i, *c);
                }
                node::set_num_keys(buf, ln + 1 + right_keys.len());
            }
            self.cache.unpin(left);
            self.touch(left)?;

            for child in right_children {
                self.set_parent_field(child, left)?;
            }
        }

        self.cache.free_page(right)?;

        let parent_n = {
            let buf = self.cache.get_page(parent)?;
            let n = node::num_keys(buf);
            node::shift_internal_left(buf, sep_idx, sep_idx + 1, n);
            node::set_num_keys(buf, n - 1);
            n - 1
        };
        self.cache.unpin(parent);
        self.touch(parent)?;

        let parent_parent = {
            let buf = self.cache.get_page(parent)?;
            let p = node::parent(buf);
            self.cache.unpin(parent);
            p
        };

        if parent_parent == 0 {
            if parent_n == 0 {
                self.rebalance(parent)?;
            }
        } else if parent_n < MIN_KEYS {
            self.rebalance(parent)?;
        }
        Ok(())
    }

    /// Position a cursor at the smallest key in the tree (§4.3 "cursor
    /// first").
    pub fn cursor_first(&mut self) -> DbResult<Cursor> {
        let mut current = self.root_page;
        for _ in 0..MAX_HEIGHT {
            let buf = self.cache.get_page(current)?;
            if node::node_type(buf) == NodeType::Leaf {
                let n = node::num_keys(buf);
                self.cache.unpin(current);
                return Ok(Cursor {
                    leaf: current,
                    index: 0,
                    valid: n > 0,
                });
            }
            let child0 = node::child(buf, 0);
            self.cache.unpin(current);
            current = child0;
        }
        Err(DbError::corrupt("btree descent exceeded MAX_HEIGHT"))
    }

    /// Advance `cursor` by one entry, crossing into the next leaf via its
    /// `next_leaf` link when the current leaf is exhausted (§4.3 "cursor
    /// next").
    pub fn cursor_next(&mut self, cursor: &mut Cursor) -> DbResult<()> {
        if !cursor.valid {
            return Ok(());
        }
        cursor.index += 1;
        let (n, next) = {
            let buf = self.cache.get_page(cursor.leaf)?;
            (node::num_keys(buf), node::next_leaf(buf))
        };
        self.cache.unpin(cursor.leaf);

        if cursor.index < n {
            return Ok(());
        }
        if next == 0 {
            cursor.valid = false;
            return Ok(());
        }
        cursor.leaf = next;
        cursor.index = 0;
        let buf = self.cache.get_page(next)?;
        cursor.valid = node::num_keys(buf) > 0;
        self.cache.unpin(next);
        Ok(())
    }

    /// The `(key, value)` pair a cursor currently addresses, or `None` once
    /// it has run off the end of the tree (§4.3 "cursor get").
    pub fn cursor_get(&mut self, cursor: &Cursor) -> DbResult<Option<(Key, u32)>> {
        if !cursor.valid {
            return Ok(None);
        }
        let buf = self.cache.get_page(cursor.leaf)?;
        let kv = (node::key(buf, cursor.index), node::value(buf, cursor.index));
        self.cache.unpin(cursor.leaf);
        Ok(Some(kv))
    }

    /// Full-tree diagnostics: entry count, height, and node count (§6.2
    /// `stats`). A traversal, not a cached counter — fine for the
    /// diagnostic/test use this is meant for, not a hot path.
    pub fn stats(&mut self) -> DbResult<Stats> {
        let height = self.height()?;
        let (entries, nodes) = self.count_subtree(self.root_page)?;
        Ok(Stats {
            entries,
            height,
            nodes,
        })
    }

    fn height(&mut self) -> DbResult<usize> {
        let mut current = self.root_page;
        let mut h = 1;
        for _ in 0..MAX_HEIGHT {
            let (is_leaf, child0) = {
                let buf = self.cache.get_page(current)?;
                let leaf = node::node_type(buf) == NodeType::Leaf;
                let c = if leaf { 0 } else { node::child(buf, 0) };
                (leaf, c)
            };
            self.cache.unpin(current);
            if is_leaf {
                return Ok(h);
            }
            current = child0;
            h += 1;
        }
        Err(DbError::corrupt("btree descent exceeded MAX_HEIGHT"))
    }

    fn count_subtree(&mut self, page: PageNum) -> DbResult<(usize, usize)> {
        let (is_leaf, n) = {
            let buf = self.cache.get_page(page)?;
            (node::node_type(buf) == NodeType::Leaf, node::num_keys(buf))
        };
        if is_leaf {
            self.cache.unpin(page);
            return Ok((n, 1));
        }
        let children: Vec<PageNum> = {
            let buf = self.cache.get_page(page)?;
            (0..=n).map(|i| node::child(buf, i)).collect()
        };
        self.cache.unpin(page);

        let mut entries = 0;
        let mut nodes = 1;
        for child in children {
            let (e, nd) = self.count_subtree(child)?;
            entries += e;
            nodes += nd;
        }
        Ok((entries, nodes))
    }
}
