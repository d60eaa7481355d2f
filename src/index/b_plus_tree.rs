use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use log::warn;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::buffer::{BufferPoolManager, PageWriteGuard, ReadPageGuard};
use crate::common::{
    KeelError, PageId, RecordId, Result, HEADER_PAGE_ID, INVALID_PAGE_ID,
};
use crate::storage::page::{
    set_node_parent_page_id, BPlusTreePage, HeaderPage, HeaderPageMut, InternalPage,
    InternalPageMut, LeafPage, LeafPageMut,
};

use super::IndexIterator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Insert,
    Delete,
}

/// Write latches held by one tree operation, in root-to-leaf order.
///
/// `root_guard` is the sentinel: holding it means the operation owns the
/// root pointer itself. Releasing is FIFO - sentinel first, then ancestors
/// top-down - and happens on drop, so every exit path unwinds cleanly.
/// Pages emptied by the operation are queued in `deleted` and reclaimed by
/// the caller once all latches are gone.
struct LatchStack<'a> {
    root_guard: Option<RwLockWriteGuard<'a, PageId>>,
    ancestors: VecDeque<PageWriteGuard>,
    deleted: Vec<PageId>,
}

impl<'a> LatchStack<'a> {
    fn new(root_guard: Option<RwLockWriteGuard<'a, PageId>>) -> Self {
        Self {
            root_guard,
            ancestors: VecDeque::new(),
            deleted: Vec::new(),
        }
    }

    /// Releases every held latch, sentinel first.
    fn release_ancestors(&mut self) {
        self.root_guard.take();
        self.ancestors.clear();
    }

    /// Rewrites the root pointer through the held sentinel.
    fn set_root(&mut self, page_id: PageId) -> Result<()> {
        match self.root_guard.as_mut() {
            Some(guard) => {
                **guard = page_id;
                Ok(())
            }
            None => Err(KeelError::IndexCorrupted(
                "root pointer changed without the root latch".into(),
            )),
        }
    }

    fn pop_parent(&mut self) -> Result<PageWriteGuard> {
        self.ancestors.pop_back().ok_or_else(|| {
            KeelError::IndexCorrupted("latch stack is missing the parent page".into())
        })
    }

    /// Drops all latches and hands back the pages queued for deletion.
    fn into_deleted(mut self) -> Vec<PageId> {
        std::mem::take(&mut self.deleted)
    }
}

/// Concurrent B+Tree mapping `u32` keys to record ids, unique keys only.
///
/// Pages are borrowed from the buffer pool via pin/latch guards; the tree
/// itself owns nothing but the root pointer, whose `RwLock` doubles as the
/// root-pointer latch. Traversals crab from root to leaf: optimistic
/// descents read-latch and release each parent once the child is held,
/// falling back to a pessimistic write-latched descent when the leaf turns
/// out to be unsafe for the operation.
pub struct BPlusTree {
    index_name: String,
    root_page_id: RwLock<PageId>,
    bpm: Arc<BufferPoolManager>,
    leaf_max_size: usize,
    internal_max_size: usize,
}

impl BPlusTree {
    pub fn new(
        name: &str,
        bpm: Arc<BufferPoolManager>,
        leaf_max_size: usize,
        internal_max_size: usize,
    ) -> Self {
        assert!(leaf_max_size >= 2);
        assert!(internal_max_size >= 3);
        Self {
            index_name: name.to_string(),
            root_page_id: RwLock::new(INVALID_PAGE_ID),
            bpm,
            leaf_max_size,
            internal_max_size,
        }
    }

    /// Reattaches to an index previously registered in the header page.
    pub fn open(
        name: &str,
        bpm: Arc<BufferPoolManager>,
        leaf_max_size: usize,
        internal_max_size: usize,
    ) -> Result<Self> {
        let root = {
            let guard = bpm.fetch_page_read(HEADER_PAGE_ID)?;
            HeaderPage::new(guard.data())
                .get_root_id(name)
                .unwrap_or(INVALID_PAGE_ID)
        };
        let tree = Self::new(name, bpm, leaf_max_size, internal_max_size);
        *tree.root_page_id.write() = root;
        Ok(tree)
    }

    pub fn is_empty(&self) -> bool {
        *self.root_page_id.read() == INVALID_PAGE_ID
    }

    pub fn root_page_id(&self) -> PageId {
        *self.root_page_id.read()
    }

    pub fn name(&self) -> &str {
        &self.index_name
    }

    /// Point lookup. Descends under read crabbing and searches the leaf.
    pub fn get_value(&self, key: u32) -> Result<Option<RecordId>> {
        let root_read = self.root_page_id.read();
        if *root_read == INVALID_PAGE_ID {
            return Ok(None);
        }
        let guard = self.find_leaf_read(key, root_read)?;
        let leaf = LeafPage::new(guard.data());
        Ok(leaf.key_index(key).map(|index| leaf.rid_at(index)))
    }

    /// Inserts `key -> rid`. Returns false without changing anything when
    /// the key already exists.
    pub fn insert(&self, key: u32, rid: RecordId) -> Result<bool> {
        loop {
            let root_read = self.root_page_id.read();
            if *root_read == INVALID_PAGE_ID {
                drop(root_read);
                let mut root_write = self.root_page_id.write();
                if *root_write != INVALID_PAGE_ID {
                    // Another writer started the tree first
                    continue;
                }
                let (page_id, mut guard) = self.bpm.new_page()?;
                let mut leaf = LeafPageMut::new(guard.data_mut());
                leaf.init(page_id, INVALID_PAGE_ID, self.leaf_max_size);
                leaf.insert(key, rid);
                *root_write = page_id;
                drop(guard);
                self.update_root_record(page_id, true)?;
                return Ok(true);
            }

            let leaf_guard = self.find_leaf_write(key, root_read)?;
            let safe = Self::is_safe(&BPlusTreePage::new(leaf_guard.data()), Operation::Insert);
            if safe {
                let mut ctx = LatchStack::new(None);
                return self.insert_into_leaf(&mut ctx, leaf_guard, key, rid);
            }

            drop(leaf_guard);
            match self.latch_path_to_leaf(key, Operation::Insert)? {
                Some((mut ctx, leaf_guard)) => {
                    return self.insert_into_leaf(&mut ctx, leaf_guard, key, rid);
                }
                // The tree emptied while we restarted; take it from the top
                None => continue,
            }
        }
    }

    /// Deletes `key`; absent keys are a no-op.
    pub fn remove(&self, key: u32) -> Result<()> {
        let root_read = self.root_page_id.read();
        if *root_read == INVALID_PAGE_ID {
            return Ok(());
        }

        let leaf_guard = self.find_leaf_write(key, root_read)?;
        let safe = Self::is_safe(&BPlusTreePage::new(leaf_guard.data()), Operation::Delete);
        let deleted = if safe {
            let mut ctx = LatchStack::new(None);
            self.delete_entry(&mut ctx, leaf_guard, key)?;
            ctx.into_deleted()
        } else {
            drop(leaf_guard);
            match self.latch_path_to_leaf(key, Operation::Delete)? {
                Some((mut ctx, leaf_guard)) => {
                    self.delete_entry(&mut ctx, leaf_guard, key)?;
                    ctx.into_deleted()
                }
                None => return Ok(()),
            }
        };

        for page_id in deleted {
            self.bpm.delete_page(page_id)?;
        }
        Ok(())
    }

    /// Iterator positioned at the first key of the index.
    pub fn iter(&self) -> Result<IndexIterator> {
        let root_read = self.root_page_id.read();
        if *root_read == INVALID_PAGE_ID {
            return Ok(IndexIterator::new(Arc::clone(&self.bpm), None, 0));
        }
        let mut current = *root_read;
        let mut root_read = Some(root_read);
        let mut prev: Option<ReadPageGuard> = None;
        loop {
            let guard = self.bpm.fetch_page_read(current)?;
            root_read.take();
            prev.take();
            if BPlusTreePage::new(guard.data()).is_leaf() {
                return Ok(IndexIterator::new(Arc::clone(&self.bpm), Some(guard), 0));
            }
            current = InternalPage::new(guard.data()).child_at(0);
            prev = Some(guard);
        }
    }

    /// Iterator positioned at `key`, which must exist.
    pub fn iter_from(&self, key: u32) -> Result<IndexIterator> {
        let root_read = self.root_page_id.read();
        if *root_read == INVALID_PAGE_ID {
            return Err(KeelError::KeyNotFound(key));
        }
        let guard = self.find_leaf_read(key, root_read)?;
        let index = LeafPage::new(guard.data())
            .key_index(key)
            .ok_or(KeelError::KeyNotFound(key))?;
        Ok(IndexIterator::new(Arc::clone(&self.bpm), Some(guard), index))
    }

    /// Writes the tree as a GraphViz digraph to `path`.
    pub fn draw<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if self.is_empty() {
            warn!("drawing an empty tree");
            return Ok(());
        }
        let mut out = String::from("digraph G {\n");
        self.to_graph(self.root_page_id(), &mut out)?;
        out.push_str("}\n");
        std::fs::write(path, out)?;
        Ok(())
    }

    /// Dumps the tree to stdout, one node per line.
    pub fn print(&self) -> Result<()> {
        if self.is_empty() {
            warn!("printing an empty tree");
            return Ok(());
        }
        self.print_node(self.root_page_id(), 0)
    }

    // ------------------------------------------------------------------
    // Traversal
    // ------------------------------------------------------------------

    /// A node is safe for an operation when performing it there cannot
    /// propagate to the node's ancestors. Reads are always safe and never
    /// consult this predicate.
    fn is_safe(node: &BPlusTreePage<'_>, op: Operation) -> bool {
        match op {
            Operation::Insert => {
                if node.is_leaf() {
                    node.size() < node.max_size() - 1
                } else {
                    node.size() < node.max_size()
                }
            }
            Operation::Delete => {
                if node.is_root() {
                    if node.is_leaf() {
                        node.size() > 1
                    } else {
                        node.size() > 2
                    }
                } else {
                    node.size() > node.min_size()
                }
            }
        }
    }

    /// Read-crabs from the root to the leaf covering `key`. The caller
    /// hands in the root-pointer read guard so no window exists between
    /// checking the root and starting the descent.
    fn find_leaf_read(
        &self,
        key: u32,
        root_read: RwLockReadGuard<'_, PageId>,
    ) -> Result<ReadPageGuard> {
        let mut current = *root_read;
        let mut root_read = Some(root_read);
        let mut prev: Option<ReadPageGuard> = None;
        loop {
            let guard = self.bpm.fetch_page_read(current)?;
            // The child is latched; everything above it can go
            root_read.take();
            prev.take();
            if BPlusTreePage::new(guard.data()).is_leaf() {
                return Ok(guard);
            }
            current = InternalPage::new(guard.data()).lookup_child(key);
            prev = Some(guard);
        }
    }

    /// Optimistic descent for a write: read-crabs to the leaf, then swaps
    /// the leaf latch for a write latch while the parent is still held, so
    /// the leaf cannot split or merge during the upgrade.
    fn find_leaf_write(
        &self,
        key: u32,
        root_read: RwLockReadGuard<'_, PageId>,
    ) -> Result<PageWriteGuard> {
        let mut current = *root_read;
        let mut root_read = Some(root_read);
        let mut prev: Option<ReadPageGuard> = None;
        loop {
            let guard = self.bpm.fetch_page_read(current)?;
            if BPlusTreePage::new(guard.data()).is_leaf() {
                drop(guard);
                let leaf_guard = self.bpm.fetch_page_write(current)?;
                root_read.take();
                prev.take();
                return Ok(leaf_guard);
            }
            root_read.take();
            prev.take();
            current = InternalPage::new(guard.data()).lookup_child(key);
            prev = Some(guard);
        }
    }

    /// Pessimistic descent: write-latches every node from the root down,
    /// releasing all held ancestors whenever the newly latched node is safe
    /// for the operation. Returns `None` when the tree is empty.
    fn latch_path_to_leaf(
        &self,
        key: u32,
        op: Operation,
    ) -> Result<Option<(LatchStack<'_>, PageWriteGuard)>> {
        let root_guard = self.root_page_id.write();
        let mut current = *root_guard;
        if current == INVALID_PAGE_ID {
            return Ok(None);
        }
        let mut ctx = LatchStack::new(Some(root_guard));
        loop {
            let guard = self.bpm.fetch_page_write(current)?;
            let (safe, is_leaf, next) = {
                let node = BPlusTreePage::new(guard.data());
                let safe = Self::is_safe(&node, op);
                let is_leaf = node.is_leaf();
                let next = if is_leaf {
                    INVALID_PAGE_ID
                } else {
                    InternalPage::new(guard.data()).lookup_child(key)
                };
                (safe, is_leaf, next)
            };
            if safe {
                ctx.release_ancestors();
            }
            if is_leaf {
                return Ok(Some((ctx, guard)));
            }
            ctx.ancestors.push_back(guard);
            current = next;
        }
    }

    // ------------------------------------------------------------------
    // Insertion
    // ------------------------------------------------------------------

    fn insert_into_leaf(
        &self,
        ctx: &mut LatchStack<'_>,
        mut leaf_guard: PageWriteGuard,
        key: u32,
        rid: RecordId,
    ) -> Result<bool> {
        if LeafPage::new(leaf_guard.data()).key_index(key).is_some() {
            return Ok(false);
        }

        let (size, max_size) = {
            let mut leaf = LeafPageMut::new(leaf_guard.data_mut());
            leaf.insert(key, rid);
            (leaf.size(), leaf.max_size())
        };
        if size < max_size {
            return Ok(true);
        }

        // The leaf overflowed: carve off the upper half into a new right
        // sibling and push the sibling's first key up
        let (new_page_id, mut new_guard) = self.bpm.new_page()?;
        let separator = {
            let mut leaf = LeafPageMut::new(leaf_guard.data_mut());
            let mut new_leaf = LeafPageMut::new(new_guard.data_mut());
            new_leaf.init(
                new_page_id,
                leaf.view().parent_page_id(),
                self.leaf_max_size,
            );
            new_leaf.set_next_page_id(leaf.next_page_id());
            leaf.move_half_to(&mut new_leaf);
            leaf.set_next_page_id(new_page_id);
            new_leaf.key_at(0)
        };

        self.insert_in_parent(ctx, leaf_guard, separator, new_page_id, new_guard)?;
        Ok(true)
    }

    /// Links a freshly split-off right sibling into the parent, splitting
    /// upward as needed.
    fn insert_in_parent(
        &self,
        ctx: &mut LatchStack<'_>,
        mut old_guard: PageWriteGuard,
        key: u32,
        new_page_id: PageId,
        mut new_guard: PageWriteGuard,
    ) -> Result<()> {
        let old_page_id = old_guard.page_id();
        let old_parent = BPlusTreePage::new(old_guard.data()).parent_page_id();

        if old_parent == INVALID_PAGE_ID {
            // The root itself split: grow the tree by one level
            let (root_page_id, mut root_guard) = self.bpm.new_page()?;
            {
                let mut root = InternalPageMut::new(root_guard.data_mut());
                root.init(root_page_id, INVALID_PAGE_ID, self.internal_max_size);
                root.populate_new_root(old_page_id, key, new_page_id);
            }
            set_node_parent_page_id(old_guard.data_mut(), root_page_id);
            set_node_parent_page_id(new_guard.data_mut(), root_page_id);
            ctx.set_root(root_page_id)?;
            drop(root_guard);
            drop(new_guard);
            drop(old_guard);
            return self.update_root_record(root_page_id, false);
        }

        let mut parent_guard = ctx.pop_parent()?;
        let parent_page_id = parent_guard.page_id();
        let parent_size = {
            let mut parent = InternalPageMut::new(parent_guard.data_mut());
            parent.insert(key, new_page_id);
            parent.size()
        };
        set_node_parent_page_id(new_guard.data_mut(), parent_page_id);
        drop(new_guard);
        drop(old_guard);

        if parent_size <= self.internal_max_size {
            return Ok(());
        }

        // Parent overflowed by one entry: the new right node takes the
        // upper `max / 2 + 1` entries and re-adopts the children it moved
        let (split_page_id, mut split_guard) = self.bpm.new_page()?;
        let (separator, moved_children) = {
            let mut parent = InternalPageMut::new(parent_guard.data_mut());
            let mut split = InternalPageMut::new(split_guard.data_mut());
            split.init(
                split_page_id,
                parent.view().parent_page_id(),
                self.internal_max_size,
            );
            let move_count = self.internal_max_size / 2 + 1;
            parent.move_tail_to(&mut split, move_count);
            let moved = (0..split.size()).map(|i| split.child_at(i)).collect::<Vec<_>>();
            (split.key_at(0), moved)
        };
        for child in moved_children {
            self.reparent(child, split_page_id)?;
        }

        self.insert_in_parent(ctx, parent_guard, separator, split_page_id, split_guard)
    }

    // ------------------------------------------------------------------
    // Deletion
    // ------------------------------------------------------------------

    fn delete_entry(
        &self,
        ctx: &mut LatchStack<'_>,
        mut guard: PageWriteGuard,
        key: u32,
    ) -> Result<()> {
        let page_id = guard.page_id();
        let is_leaf = BPlusTreePage::new(guard.data()).is_leaf();
        let removed = if is_leaf {
            LeafPageMut::new(guard.data_mut()).remove(key)
        } else {
            InternalPageMut::new(guard.data_mut()).remove(key)
        };
        if !removed {
            return Ok(());
        }

        let (is_root, size, min_size) = {
            let node = BPlusTreePage::new(guard.data());
            (node.is_root(), node.size(), node.min_size())
        };

        if is_root && is_leaf && size == 0 {
            // The last key is gone; the tree is empty again
            ctx.deleted.push(page_id);
            ctx.set_root(INVALID_PAGE_ID)?;
            drop(guard);
            return self.update_root_record(INVALID_PAGE_ID, false);
        }
        if is_root && (size > 1 || is_leaf) {
            return Ok(());
        }
        if is_root && size == 1 {
            // Internal root shrank to one child: that child becomes root
            let new_root = InternalPage::new(guard.data()).child_at(0);
            self.reparent(new_root, INVALID_PAGE_ID)?;
            ctx.deleted.push(page_id);
            ctx.set_root(new_root)?;
            drop(guard);
            return self.update_root_record(new_root, false);
        }
        if size >= min_size {
            return Ok(());
        }

        self.rebalance(ctx, guard, is_leaf)
    }

    /// Restores the min-size invariant of an underflowing node by merging
    /// with or borrowing from a sibling under the shared parent. Left
    /// sibling is preferred and latched first; merge is preferred over
    /// borrowing.
    fn rebalance(
        &self,
        ctx: &mut LatchStack<'_>,
        guard: PageWriteGuard,
        is_leaf: bool,
    ) -> Result<()> {
        let page_id = guard.page_id();
        let parent_guard = ctx.pop_parent()?;

        let (index, left_id, right_id) = {
            let parent = InternalPage::new(parent_guard.data());
            let index = parent.find_child_index(page_id).ok_or_else(|| {
                KeelError::IndexCorrupted(format!("page {page_id} missing from its parent"))
            })?;
            let left = (index > 0).then(|| parent.child_at(index - 1));
            let right = (index + 1 < parent.size()).then(|| parent.child_at(index + 1));
            (index, left, right)
        };
        if left_id.is_none() && right_id.is_none() {
            return Err(KeelError::IndexCorrupted(format!(
                "page {page_id} has no siblings"
            )));
        }

        let mut left_guard = match left_id {
            Some(id) => Some(self.bpm.fetch_page_write(id)?),
            None => None,
        };
        let mut right_guard = match right_id {
            Some(id) => Some(self.bpm.fetch_page_write(id)?),
            None => None,
        };

        let node = BPlusTreePage::new(guard.data());
        let (size, max_size, min_size) = (node.size(), node.max_size(), node.min_size());
        let left_size = left_guard
            .as_ref()
            .map(|g| BPlusTreePage::new(g.data()).size());
        let right_size = right_guard
            .as_ref()
            .map(|g| BPlusTreePage::new(g.data()).size());

        // Merge fit keeps the historical asymmetry: strict < for leaves,
        // <= for internals
        let fits = |sibling: usize| {
            if is_leaf {
                sibling + size < max_size
            } else {
                sibling + size <= max_size
            }
        };

        if let Some(left_size) = left_size {
            if fits(left_size) {
                drop(right_guard);
                let left = self.take_sibling(&mut left_guard)?;
                return self.merge(ctx, parent_guard, left, guard, index, is_leaf);
            }
        }
        if let Some(right_size) = right_size {
            if fits(right_size) {
                drop(left_guard);
                let right = self.take_sibling(&mut right_guard)?;
                return self.merge(ctx, parent_guard, guard, right, index + 1, is_leaf);
            }
        }
        if let Some(left_size) = left_size {
            if left_size > min_size {
                drop(right_guard);
                let left = self.take_sibling(&mut left_guard)?;
                return self.borrow_from_left(parent_guard, left, guard, index, is_leaf);
            }
        }
        if let Some(right_size) = right_size {
            if right_size > min_size {
                drop(left_guard);
                let right = self.take_sibling(&mut right_guard)?;
                return self.borrow_from_right(parent_guard, guard, right, index + 1, is_leaf);
            }
        }

        Err(KeelError::IndexCorrupted(format!(
            "no sibling of page {page_id} can merge or lend"
        )))
    }

    fn take_sibling(&self, slot: &mut Option<PageWriteGuard>) -> Result<PageWriteGuard> {
        slot.take()
            .ok_or_else(|| KeelError::IndexCorrupted("sibling latch vanished".into()))
    }

    /// Merges `right` into `left` and recurses upward to drop the
    /// separator at `sep_index` from the parent.
    fn merge(
        &self,
        ctx: &mut LatchStack<'_>,
        parent_guard: PageWriteGuard,
        mut left_guard: PageWriteGuard,
        mut right_guard: PageWriteGuard,
        sep_index: usize,
        is_leaf: bool,
    ) -> Result<()> {
        let separator = InternalPage::new(parent_guard.data()).key_at(sep_index);
        let left_page_id = left_guard.page_id();

        if is_leaf {
            let mut left = LeafPageMut::new(left_guard.data_mut());
            let mut right = LeafPageMut::new(right_guard.data_mut());
            let next = right.next_page_id();
            right.move_all_to(&mut left);
            left.set_next_page_id(next);
        } else {
            let moved_children = {
                let mut left = InternalPageMut::new(left_guard.data_mut());
                let right = InternalPage::new(right_guard.data());
                // The separator comes down to caption the right node's
                // first child, then the rest follow in order
                left.push_entry(separator, right.child_at(0));
                for i in 1..right.size() {
                    left.push_entry(right.key_at(i), right.child_at(i));
                }
                (0..right.size()).map(|i| right.child_at(i)).collect::<Vec<_>>()
            };
            InternalPageMut::new(right_guard.data_mut()).set_size(0);
            for child in moved_children {
                self.reparent(child, left_page_id)?;
            }
        }

        ctx.deleted.push(right_guard.page_id());
        drop(left_guard);
        drop(right_guard);
        self.delete_entry(ctx, parent_guard, separator)
    }

    /// Steals the left sibling's last entry onto the front of `guard`.
    fn borrow_from_left(
        &self,
        mut parent_guard: PageWriteGuard,
        mut left_guard: PageWriteGuard,
        mut guard: PageWriteGuard,
        sep_index: usize,
        is_leaf: bool,
    ) -> Result<()> {
        if is_leaf {
            let (key, rid) = {
                let mut left = LeafPageMut::new(left_guard.data_mut());
                let last = left.size() - 1;
                left.remove_at(last)
            };
            LeafPageMut::new(guard.data_mut()).insert(key, rid);
            InternalPageMut::new(parent_guard.data_mut()).set_key_at(sep_index, key);
        } else {
            let separator = InternalPage::new(parent_guard.data()).key_at(sep_index);
            let (donor_key, donor_child) = {
                let mut left = InternalPageMut::new(left_guard.data_mut());
                let last = left.size() - 1;
                let entry = (left.key_at(last), left.child_at(last));
                left.set_size(last);
                entry
            };
            {
                // The separator rotates down in front of the old entries;
                // the stolen key rotates up into the parent
                let mut node = InternalPageMut::new(guard.data_mut());
                node.shift_right();
                node.set_key_at(1, separator);
                node.set_child_at(0, donor_child);
            }
            InternalPageMut::new(parent_guard.data_mut()).set_key_at(sep_index, donor_key);
            let page_id = guard.page_id();
            self.reparent(donor_child, page_id)?;
        }
        Ok(())
    }

    /// Steals the right sibling's first entry onto the back of `guard`.
    fn borrow_from_right(
        &self,
        mut parent_guard: PageWriteGuard,
        mut guard: PageWriteGuard,
        mut right_guard: PageWriteGuard,
        sep_index: usize,
        is_leaf: bool,
    ) -> Result<()> {
        if is_leaf {
            let (key, rid) = LeafPageMut::new(right_guard.data_mut()).remove_at(0);
            LeafPageMut::new(guard.data_mut()).insert(key, rid);
            let new_first = LeafPage::new(right_guard.data()).key_at(0);
            InternalPageMut::new(parent_guard.data_mut()).set_key_at(sep_index, new_first);
        } else {
            let separator = InternalPage::new(parent_guard.data()).key_at(sep_index);
            let (donor_key, donor_child) = {
                let mut right = InternalPageMut::new(right_guard.data_mut());
                let entry = (right.key_at(1), right.child_at(0));
                right.shift_left();
                entry
            };
            InternalPageMut::new(guard.data_mut()).push_entry(separator, donor_child);
            InternalPageMut::new(parent_guard.data_mut()).set_key_at(sep_index, donor_key);
            let page_id = guard.page_id();
            self.reparent(donor_child, page_id)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Bookkeeping
    // ------------------------------------------------------------------

    fn reparent(&self, child: PageId, new_parent: PageId) -> Result<()> {
        let mut guard = self.bpm.fetch_page_write(child)?;
        set_node_parent_page_id(guard.data_mut(), new_parent);
        Ok(())
    }

    /// Keeps the header page's `(index_name, root_page_id)` record in sync
    /// with the in-memory root pointer.
    fn update_root_record(&self, root_page_id: PageId, insert: bool) -> Result<()> {
        let mut guard = self.bpm.fetch_page_write(HEADER_PAGE_ID)?;
        let mut header = HeaderPageMut::new(guard.data_mut());
        let ok = if insert {
            header.insert_record(&self.index_name, root_page_id)
                || header.update_record(&self.index_name, root_page_id)
        } else {
            header.update_record(&self.index_name, root_page_id)
                || header.insert_record(&self.index_name, root_page_id)
        };
        if !ok {
            return Err(KeelError::HeaderPageFull);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Debug output
    // ------------------------------------------------------------------

    fn to_graph(&self, page_id: PageId, out: &mut String) -> Result<()> {
        let guard = self.bpm.fetch_page_read(page_id)?;
        let node = BPlusTreePage::new(guard.data());
        if node.is_leaf() {
            let leaf = LeafPage::new(guard.data());
            let keys = (0..leaf.size())
                .map(|i| leaf.key_at(i).to_string())
                .collect::<Vec<_>>()
                .join("|");
            out.push_str(&format!(
                "  leaf{} [shape=record label=\"{}\"];\n",
                page_id.as_u32(),
                keys
            ));
            if leaf.next_page_id() != INVALID_PAGE_ID {
                out.push_str(&format!(
                    "  leaf{} -> leaf{} [constraint=false];\n",
                    page_id.as_u32(),
                    leaf.next_page_id().as_u32()
                ));
            }
        } else {
            let internal = InternalPage::new(guard.data());
            let keys = (1..internal.size())
                .map(|i| internal.key_at(i).to_string())
                .collect::<Vec<_>>()
                .join("|");
            out.push_str(&format!(
                "  int{} [shape=record label=\"{}\"];\n",
                page_id.as_u32(),
                keys
            ));
            let children = (0..internal.size())
                .map(|i| internal.child_at(i))
                .collect::<Vec<_>>();
            drop(guard);
            for child in children {
                let child_guard = self.bpm.fetch_page_read(child)?;
                let child_is_leaf = BPlusTreePage::new(child_guard.data()).is_leaf();
                drop(child_guard);
                let tag = if child_is_leaf { "leaf" } else { "int" };
                out.push_str(&format!(
                    "  int{} -> {}{};\n",
                    page_id.as_u32(),
                    tag,
                    child.as_u32()
                ));
                self.to_graph(child, out)?;
            }
        }
        Ok(())
    }

    fn print_node(&self, page_id: PageId, depth: usize) -> Result<()> {
        let guard = self.bpm.fetch_page_read(page_id)?;
        let node = BPlusTreePage::new(guard.data());
        let indent = "  ".repeat(depth);
        if node.is_leaf() {
            let leaf = LeafPage::new(guard.data());
            let keys = (0..leaf.size())
                .map(|i| leaf.key_at(i).to_string())
                .collect::<Vec<_>>()
                .join(",");
            println!(
                "{indent}leaf {} next={} keys=[{}]",
                page_id,
                leaf.next_page_id(),
                keys
            );
        } else {
            let internal = InternalPage::new(guard.data());
            let keys = (1..internal.size())
                .map(|i| internal.key_at(i).to_string())
                .collect::<Vec<_>>()
                .join(",");
            println!("{indent}internal {} seps=[{}]", page_id, keys);
            let children = (0..internal.size())
                .map(|i| internal.child_at(i))
                .collect::<Vec<_>>();
            drop(guard);
            for child in children {
                self.print_node(child, depth + 1)?;
            }
        }
        Ok(())
    }
}
