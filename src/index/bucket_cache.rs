use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

use crate::core::RawPlaceItem;

pub type BucketRecords = Arc<Vec<RawPlaceItem>>;

/// 解码桶 LRU 缓存。
///
/// 单把互斥锁保护整个 LruCache；锁内只做簿记，不做解码。
/// 数据在进程生命周期内不可变，没有 TTL，唯一失效方式是淘汰。
pub struct BucketCache {
    inner: Mutex<LruCache<String, BucketRecords>>,
    capacity: NonZeroUsize,
}

impl BucketCache {
    pub fn with_capacity(cap: usize) -> Self {
        let capacity = NonZeroUsize::new(cap.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// 命中时提升为最近使用
    pub fn get(&self, key: &str) -> Option<BucketRecords> {
        self.inner.lock().get(key).cloned()
    }

    /// 插入或替换；超出容量时淘汰最久未使用的条目
    pub fn put(&self, key: String, records: BucketRecords) {
        self.inner.lock().put(key, records);
    }

    /// 不改变新旧顺序
    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().contains(key)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 最近使用在前
    pub fn keys_by_recency(&self) -> Vec<String> {
        self.inner.lock().iter().map(|(k, _)| k.clone()).collect()
    }
}
