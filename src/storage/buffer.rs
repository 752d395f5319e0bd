//! A fixed-capacity buffer pool with clock-approximated LRU eviction,
//! restricted to unpinned pages.
//!
//! Grounded on `examples/harborgrid-justin-rusty-db/src/storage/buffer.rs`'s
//! `BufferPoolManager`/`LruReplacer`, generalized to hand back an RAII pin
//! guard (`PageHandle`) instead of a cloned `Page`, so a caller releasing the
//! handle is what decrements the pin count, per spec wording ("the handle
//! must be released to decrement the pin count").

use crate::error::{DbError, Result};
use crate::storage::disk::DiskManager;
use crate::storage::page::{Page, PageId};
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::Arc;

struct Frame {
    page: Page,
    pin_count: usize,
}

struct Inner {
    frames: Vec<Option<Frame>>,
    page_table: HashMap<PageId, usize>,
    free_list: Vec<usize>,
    /// Clock-hand order of unpinned frames, most-recently-unpinned last.
    lru_order: Vec<usize>,
}

/// Fixed-capacity cache of pages backed by a [`DiskManager`].
pub struct BufferPool {
    disk: Arc<dyn DiskManager>,
    inner: Mutex<Inner>,
    capacity: usize,
    not_full: Condvar,
}

impl BufferPool {
    pub fn new(disk: Arc<dyn DiskManager>, capacity: usize) -> Self {
        Self {
            disk,
            inner: Mutex::new(Inner {
                frames: (0..capacity).map(|_| None).collect(),
                page_table: HashMap::new(),
                free_list: (0..capacity).collect(),
                lru_order: Vec::new(),
            }),
            capacity,
            not_full: Condvar::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Pin and return the page identified by `id`, loading it from disk if
    /// it is not already resident. Blocks while at capacity and every frame
    /// is pinned, until a victim becomes available.
    pub fn get(self: &Arc<Self>, id: PageId) -> Result<PageHandle> {
        let mut guard = self.inner.lock();
        loop {
            if let Some(&frame_idx) = guard.page_table.get(&id) {
                let frame = guard.frames[frame_idx].as_mut().unwrap();
                frame.pin_count += 1;
                guard.lru_order.retain(|&f| f != frame_idx);
                return Ok(PageHandle {
                    pool: Arc::clone(self),
                    frame_idx,
                    page: frame.page.clone(),
                });
            }

            let frame_idx = if let Some(idx) = guard.free_list.pop() {
                idx
            } else if let Some(victim) = self.pick_victim(&mut guard) {
                victim
            } else {
                // At capacity, nothing unpinned: wait for a release.
                self.not_full.wait(&mut guard);
                continue;
            };

            let mut page = Page::new(id, self.disk.page_size());
            self.disk.read(id, &mut page)?;
            guard.frames[frame_idx] = Some(Frame { page: page.clone(), pin_count: 1 });
            guard.page_table.insert(id, frame_idx);
            return Ok(PageHandle {
                pool: Arc::clone(self),
                frame_idx,
                page,
            });
        }
    }

    /// Allocate a fresh page via the disk manager and pin it.
    pub fn new_page(self: &Arc<Self>) -> Result<PageHandle> {
        let mut guard = self.inner.lock();
        let frame_idx = if let Some(idx) = guard.free_list.pop() {
            idx
        } else if let Some(victim) = self.pick_victim(&mut guard) {
            victim
        } else {
            return Err(DbError::BufferPoolExhausted);
        };

        let mut page = Page::new(0, self.disk.page_size());
        let id = self.disk.allocate(&mut page)?;
        page.id = id;
        guard.frames[frame_idx] = Some(Frame { page: page.clone(), pin_count: 1 });
        guard.page_table.insert(id, frame_idx);
        Ok(PageHandle {
            pool: Arc::clone(self),
            frame_idx,
            page,
        })
    }

    /// Find an unpinned frame to evict, flushing it if dirty.
    fn pick_victim(&self, guard: &mut Inner) -> Option<usize> {
        let pos = guard.lru_order.iter().position(|&idx| {
            guard.frames[idx].as_ref().map(|f| f.pin_count == 0).unwrap_or(false)
        })?;
        let frame_idx = guard.lru_order.remove(pos);
        if let Some(frame) = &guard.frames[frame_idx] {
            if frame.page.dirty {
                let _ = self.disk.update(&frame.page);
            }
            let evicted_id = frame.page.id;
            guard.page_table.remove(&evicted_id);
        }
        Some(frame_idx)
    }

    pub fn flush_all(&self) -> Result<()> {
        let guard = self.inner.lock();
        for frame in guard.frames.iter().flatten() {
            if frame.page.dirty {
                self.disk.update(&frame.page)?;
            }
        }
        Ok(())
    }

    fn release(&self, frame_idx: usize, page: Page) {
        let mut guard = self.inner.lock();
        if let Some(frame) = guard.frames[frame_idx].as_mut() {
            frame.page = page;
            frame.pin_count = frame.pin_count.saturating_sub(1);
            if frame.pin_count == 0 {
                guard.lru_order.push(frame_idx);
                self.not_full.notify_one();
            }
        }
    }
}

/// An RAII-pinned page. Dropping it (or calling [`PageHandle::release`])
/// decrements the frame's pin count.
pub struct PageHandle {
    pool: Arc<BufferPool>,
    frame_idx: usize,
    page: Page,
}

impl PageHandle {
    pub fn id(&self) -> PageId {
        self.page.id
    }

    pub fn data(&self) -> &[u8] {
        &self.page.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        self.page.mark_dirty();
        &mut self.page.data
    }

    pub fn release(self) {
        // Drop does the work; this just gives call sites a named verb.
    }
}

impl Drop for PageHandle {
    fn drop(&mut self) {
        self.pool.release(self.frame_idx, self.page.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::disk::DirectDiskManager;
    use tempfile::tempdir;

    #[test]
    fn new_page_then_get_round_trips() {
        let dir = tempdir().unwrap();
        let dm = Arc::new(
            DirectDiskManager::open_default(&dir.path().join("col_test.db"), *b"COLM").unwrap(),
        );
        let pool = Arc::new(BufferPool::new(dm, 4));

        let mut handle = pool.new_page().unwrap();
        let id = handle.id();
        handle.data_mut()[0] = 5;
        drop(handle);

        let handle2 = pool.get(id).unwrap();
        assert_eq!(handle2.data()[0], 5);
    }

    #[test]
    fn exhaustion_when_all_pinned() {
        let dir = tempdir().unwrap();
        let dm = Arc::new(
            DirectDiskManager::open_default(&dir.path().join("col_test.db"), *b"COLM").unwrap(),
        );
        let pool = Arc::new(BufferPool::new(dm, 1));

        let _h1 = pool.new_page().unwrap();
        let err = pool.new_page().unwrap_err();
        assert!(matches!(err, DbError::BufferPoolExhausted));
    }
}
