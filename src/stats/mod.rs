use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// 存储运行计数（原子，查询路径上无锁累加）
#[derive(Debug, Default)]
pub struct StoreStats {
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    /// 成功解码并入缓存的桶
    pub buckets_decoded: AtomicU64,
    /// 读到了字节但恢复不出记录的桶
    pub buckets_empty: AtomicU64,
    /// 读取失败（越界 / IO）的桶
    pub corrupt_buckets: AtomicU64,
    pub short_reads: AtomicU64,
    pub records_dropped: AtomicU64,
    pub queries: AtomicU64,
    pub cancelled: AtomicU64,
    pub images_served: AtomicU64,
}

impl StoreStats {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            cache_hits: load(&self.cache_hits),
            cache_misses: load(&self.cache_misses),
            buckets_decoded: load(&self.buckets_decoded),
            buckets_empty: load(&self.buckets_empty),
            corrupt_buckets: load(&self.corrupt_buckets),
            short_reads: load(&self.short_reads),
            records_dropped: load(&self.records_dropped),
            queries: load(&self.queries),
            cancelled: load(&self.cancelled),
            images_served: load(&self.images_served),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub buckets_decoded: u64,
    pub buckets_empty: u64,
    pub corrupt_buckets: u64,
    pub short_reads: u64,
    pub records_dropped: u64,
    pub queries: u64,
    pub cancelled: u64,
    pub images_served: u64,
}

/// 状态报告（/status 与 `geobucket stats`）
#[derive(Clone, Debug, Default, Serialize)]
pub struct StatsReport {
    pub index_loaded: bool,
    pub index_buckets: usize,
    pub precision: u8,
    pub cache_entries: usize,
    pub cache_capacity: usize,
    pub counters: StatsSnapshot,
}

impl StatsReport {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.counters.cache_hits + self.counters.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.counters.cache_hits as f64 / total as f64
        }
    }
}

impl fmt::Display for StatsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = &self.counters;
        writeln!(f, "╔══════════════════════════════════════════════════╗")?;
        writeln!(f, "║           geobucket Store Report                 ║")?;
        writeln!(f, "╠══════════════════════════════════════════════════╣")?;
        writeln!(
            f,
            "║ Index: {:>8}  buckets: {:>8}  precision: {:>2} ║",
            if self.index_loaded { "loaded" } else { "missing" },
            self.index_buckets,
            self.precision
        )?;
        writeln!(f, "╠──────────────────────────────────────────────────╣")?;
        writeln!(f, "║ Bucket Cache:                                    ║")?;
        writeln!(
            f,
            "║   entries:      {:>10} / {:<10}            ║",
            self.cache_entries, self.cache_capacity
        )?;
        writeln!(f, "║   hits:         {:>10}                       ║", c.cache_hits)?;
        writeln!(f, "║   misses:       {:>10}                       ║", c.cache_misses)?;
        writeln!(
            f,
            "║   hit ratio:    {:>9.1}%                       ║",
            self.hit_ratio() * 100.0
        )?;
        writeln!(f, "╠──────────────────────────────────────────────────╣")?;
        writeln!(f, "║ Decode:                                          ║")?;
        writeln!(f, "║   decoded:      {:>10}                       ║", c.buckets_decoded)?;
        writeln!(f, "║   empty:        {:>10}                       ║", c.buckets_empty)?;
        writeln!(f, "║   corrupt:      {:>10}                       ║", c.corrupt_buckets)?;
        writeln!(f, "║   short reads:  {:>10}                       ║", c.short_reads)?;
        writeln!(f, "║   rec dropped:  {:>10}                       ║", c.records_dropped)?;
        writeln!(f, "╠──────────────────────────────────────────────────╣")?;
        writeln!(f, "║ Queries:                                         ║")?;
        writeln!(f, "║   total:        {:>10}                       ║", c.queries)?;
        writeln!(f, "║   cancelled:    {:>10}                       ║", c.cancelled)?;
        writeln!(f, "║   images:       {:>10}                       ║", c.images_served)?;
        writeln!(f, "╚══════════════════════════════════════════════════╝")?;
        Ok(())
    }
}
