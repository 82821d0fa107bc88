//! A pinned LRU page cache with dirty tracking.

use crate::error::StorageError;
use std::collections::HashMap;
use std::hash::Hash;

struct Frame {
    data: Vec<u8>,
    dirty: bool,
    pin_count: u32,
}

/// Cumulative hit/miss counters for the pool, plus derived hit rate.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BufferStats {
    pub hits: u64,
    pub misses: u64,
    pub dirty_count: usize,
}

impl BufferStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// A pinned LRU buffer pool keyed by an abstract page id `K` (in this core,
/// a table name: see DESIGN.md for why whole-table-file paging was chosen
/// over fixed-size physical pages).
pub struct BufferPool<K> {
    capacity: usize,
    page_size: usize,
    /// LRU order, oldest first. The back is most-recently-used.
    order: Vec<K>,
    frames: HashMap<K, Frame>,
    hits: u64,
    misses: u64,
}

impl<K: Eq + Hash + Clone> BufferPool<K> {
    pub fn new(capacity: usize, page_size: usize) -> Self {
        Self {
            capacity,
            page_size,
            order: Vec::new(),
            frames: HashMap::new(),
            hits: 0,
            misses: 0,
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    fn touch(&mut self, key: &K) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            let k = self.order.remove(pos);
            self.order.push(k);
        }
    }

    /// Fetches a page, loading it via `loader` on a miss. On hit, bumps
    /// LRU order and increments the pin count; the caller must
    /// [`BufferPool::unpin_page`] exactly once per successful call.
    pub fn get_page(
        &mut self,
        id: K,
        loader: impl FnOnce() -> Result<Vec<u8>, StorageError>,
    ) -> Result<Vec<u8>, StorageError> {
        if self.frames.contains_key(&id) {
            self.hits += 1;
            self.touch(&id);
            let frame = self.frames.get_mut(&id).unwrap();
            frame.pin_count += 1;
            return Ok(frame.data.clone());
        }
        self.misses += 1;
        let data = loader()?;
        self.install(id.clone(), data.clone(), false, 1)?;
        Ok(data)
    }

    /// Inserts or overwrites a page's bytes. On insert (not already cached)
    /// this may evict per the LRU policy.
    pub fn put_page(&mut self, id: K, data: Vec<u8>, mark_dirty: bool) -> Result<(), StorageError> {
        if let Some(frame) = self.frames.get_mut(&id) {
            frame.data = data;
            frame.dirty = frame.dirty || mark_dirty;
            self.touch(&id);
            return Ok(());
        }
        self.install(id, data, mark_dirty, 0)
    }

    fn install(&mut self, id: K, data: Vec<u8>, dirty: bool, pin_count: u32) -> Result<(), StorageError> {
        if self.frames.len() >= self.capacity && !self.frames.contains_key(&id) {
            self.evict_one()?;
        }
        self.frames.insert(
            id.clone(),
            Frame {
                data,
                dirty,
                pin_count,
            },
        );
        self.order.push(id);
        Ok(())
    }

    fn evict_one(&mut self) -> Result<(), StorageError> {
        let victim = self
            .order
            .iter()
            .find(|k| self.frames.get(*k).map(|f| f.pin_count == 0).unwrap_or(false))
            .cloned();
        match victim {
            Some(key) => {
                self.order.retain(|k| *k != key);
                self.frames.remove(&key);
                Ok(())
            }
            None => Err(StorageError::BufferPoolExhausted),
        }
    }

    pub fn unpin_page(&mut self, id: &K) {
        if let Some(frame) = self.frames.get_mut(id) {
            frame.pin_count = frame.pin_count.saturating_sub(1);
        }
    }

    /// Writes a dirty frame through `writer` and clears its dirty flag. A
    /// no-op for frames that are absent or already clean.
    pub fn flush_page(
        &mut self,
        id: &K,
        writer: impl FnOnce(&[u8]) -> Result<(), StorageError>,
    ) -> Result<(), StorageError> {
        if let Some(frame) = self.frames.get_mut(id) {
            if frame.dirty {
                writer(&frame.data)?;
                frame.dirty = false;
            }
        }
        Ok(())
    }

    pub fn flush_all(
        &mut self,
        mut writer: impl FnMut(&K, &[u8]) -> Result<(), StorageError>,
    ) -> Result<(), StorageError> {
        let keys: Vec<K> = self.order.clone();
        for key in keys {
            if let Some(frame) = self.frames.get_mut(&key) {
                if frame.dirty {
                    writer(&key, &frame.data)?;
                    frame.dirty = false;
                }
            }
        }
        Ok(())
    }

    pub fn stats(&self) -> BufferStats {
        BufferStats {
            hits: self.hits,
            misses: self.misses,
            dirty_count: self.frames.values().filter(|f| f.dirty).count(),
        }
    }

    pub fn contains(&self, id: &K) -> bool {
        self.frames.contains_key(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_then_hit_updates_stats() {
        let mut pool: BufferPool<String> = BufferPool::new(2, 4096);
        let data = pool.get_page("a".to_string(), || Ok(vec![1, 2, 3])).unwrap();
        assert_eq!(data, vec![1, 2, 3]);
        pool.unpin_page(&"a".to_string());
        let _ = pool.get_page("a".to_string(), || panic!("should not reload")).unwrap();
        pool.unpin_page(&"a".to_string());
        let stats = pool.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!(stats.hit_rate() > 0.0);
    }

    #[test]
    fn evicts_lru_unpinned_frame() {
        let mut pool: BufferPool<String> = BufferPool::new(1, 4096);
        pool.get_page("a".to_string(), || Ok(vec![1])).unwrap();
        pool.unpin_page(&"a".to_string());
        pool.get_page("b".to_string(), || Ok(vec![2])).unwrap();
        pool.unpin_page(&"b".to_string());
        assert!(!pool.contains(&"a".to_string()));
        assert!(pool.contains(&"b".to_string()));
    }

    #[test]
    fn refuses_to_evict_when_all_pinned() {
        let mut pool: BufferPool<String> = BufferPool::new(1, 4096);
        pool.get_page("a".to_string(), || Ok(vec![1])).unwrap();
        // "a" stays pinned (no unpin).
        let err = pool.get_page("b".to_string(), || Ok(vec![2])).unwrap_err();
        assert!(matches!(err, StorageError::BufferPoolExhausted));
    }

    #[test]
    fn flush_all_clears_dirty_and_calls_writer() {
        let mut pool: BufferPool<String> = BufferPool::new(4, 4096);
        pool.put_page("a".to_string(), vec![9], true).unwrap();
        let mut written = Vec::new();
        pool.flush_all(|k, data| {
            written.push((k.clone(), data.to_vec()));
            Ok(())
        })
        .unwrap();
        assert_eq!(written, vec![("a".to_string(), vec![9])]);
        assert_eq!(pool.stats().dirty_count, 0);
    }
}
