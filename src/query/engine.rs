use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::codec::DecodePipeline;
use crate::config::StoreConfig;
use crate::core::{Coordinate, Place};
use crate::error::{Result, StoreError};
use crate::geohash;
use crate::index::{BucketCache, BucketMeta, BucketRecords, IndexEnvelope};
use crate::query::select::{expansion_tiers, select_tiered, sort_places, SelectionTier};
use crate::stats::{StatsReport, StoreStats};
use crate::storage::{PayloadFile, ResourceResolver};

/// 已加载的索引 + 对应 payload
struct LoadedIndex {
    envelope: IndexEnvelope,
    payload: PayloadFile,
}

/// 只读地点存储：索引 → 解码管线（经 LRU）→ 查询。
///
/// 调用之间无状态，只共享解码缓存与计数；索引 / payload 缺失或损坏时所有查询返回空。
pub struct PlaceStore {
    config: StoreConfig,
    loaded: Option<LoadedIndex>,
    pipeline: DecodePipeline,
    cache: BucketCache,
    stats: Arc<StoreStats>,
}

/// nearby 查询结果（附带命中的回退层，便于日志与测试）
#[derive(Debug)]
pub struct NearbyOutcome {
    pub tier: SelectionTier,
    pub places: Vec<Place>,
    /// 实际展开到第几层（1..=3），取消时为 0
    pub expansion_depth: usize,
}

impl PlaceStore {
    pub fn open(resolver: &ResourceResolver, config: StoreConfig) -> Self {
        let loaded = match Self::load_index(resolver, &config) {
            Ok(l) => {
                tracing::info!(
                    "Loaded place index: {} buckets, precision {}, payload {:?} ({} bytes)",
                    l.envelope.len(),
                    l.envelope.precision,
                    l.payload.path(),
                    l.payload.len()
                );
                Some(l)
            }
            Err(e) => {
                tracing::warn!("Place index unavailable, serving empty results: {}", e);
                None
            }
        };
        Self {
            pipeline: DecodePipeline::for_buckets(&config.obfuscation_seed),
            cache: BucketCache::with_capacity(config.cache_capacity),
            stats: Arc::new(StoreStats::default()),
            loaded,
            config,
        }
    }

    /// 替换解码管线（自定义压缩格式时追加 ChunkInflater）
    pub fn with_pipeline(mut self, pipeline: DecodePipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    fn load_index(resolver: &ResourceResolver, config: &StoreConfig) -> Result<LoadedIndex> {
        let index_path = resolver
            .resolve(&config.index_file)
            .ok_or_else(|| StoreError::MissingResource(config.index_file.clone()))?;
        let bytes = std::fs::read(&index_path)?;
        let mut envelope = IndexEnvelope::parse(&bytes)?;

        let payload_path = resolve_payload(
            resolver,
            envelope.payload_file.as_deref(),
            &config.default_payload_file,
        )?;
        let payload = PayloadFile::open(payload_path)?;

        if let Some(declared) = envelope.payload_size_bytes {
            if declared != payload.len() {
                tracing::warn!(
                    "payload size mismatch: index declares {} bytes, file has {}",
                    declared,
                    payload.len()
                );
            }
        }
        if config.verify_payload_sha256 {
            if let Some(expected) = envelope.payload_sha256.as_deref() {
                let actual = payload.sha256_hex()?;
                if !actual.eq_ignore_ascii_case(expected) {
                    return Err(StoreError::Integrity(format!(
                        "payload sha256 mismatch: expected {}, got {}",
                        expected, actual
                    )));
                }
            }
        }

        let dropped = envelope.retain_within(payload.len());
        if dropped > 0 {
            tracing::warn!("{} buckets exceed payload bounds and were dropped", dropped);
        }
        Ok(LoadedIndex { envelope, payload })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    pub fn index(&self) -> Option<&IndexEnvelope> {
        self.loaded.as_ref().map(|l| &l.envelope)
    }

    pub fn cache(&self) -> &BucketCache {
        &self.cache
    }

    pub fn stats(&self) -> &StoreStats {
        &self.stats
    }

    /// 与 ImageStore 共享计数
    pub fn stats_handle(&self) -> Arc<StoreStats> {
        self.stats.clone()
    }

    pub fn report(&self) -> StatsReport {
        StatsReport {
            index_loaded: self.is_loaded(),
            index_buckets: self.index().map(|e| e.len()).unwrap_or(0),
            precision: self.index().map(|e| e.precision).unwrap_or(0),
            cache_entries: self.cache.len(),
            cache_capacity: self.cache.capacity(),
            counters: self.stats.snapshot(),
        }
    }

    /// 半径 R 内的地点，最多 N 条
    pub fn load_nearby(
        &self,
        center: Coordinate,
        radius_km: f64,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Vec<Place> {
        self.nearby(center, radius_km, limit, cancel).places
    }

    pub fn nearby(
        &self,
        center: Coordinate,
        radius_km: f64,
        limit: usize,
        cancel: &CancellationToken,
    ) -> NearbyOutcome {
        StoreStats::incr(&self.stats.queries);
        let empty = |depth| NearbyOutcome {
            tier: SelectionTier::Empty,
            places: Vec::new(),
            expansion_depth: depth,
        };

        let Some(loaded) = self.loaded.as_ref() else {
            return empty(0);
        };
        if !center.is_valid() {
            tracing::warn!("nearby: invalid center {:?}", center);
            return empty(0);
        }

        let tuning = &self.config.query;
        let radius_km = if radius_km.is_finite() {
            radius_km.max(tuning.min_radius_km)
        } else {
            tuning.min_radius_km
        };
        let limit = limit.max(1);
        let precision = loaded.envelope.precision;

        let mut inspected: HashSet<String> = HashSet::new();
        let mut acc: Vec<Place> = Vec::new();
        let mut depth = 0;

        for tier_km in expansion_tiers(radius_km, tuning) {
            if cancel.is_cancelled() {
                StoreStats::incr(&self.stats.cancelled);
                return empty(0);
            }
            depth += 1;
            let keys = geohash::covering_keys(
                &center,
                tier_km * 1000.0,
                precision,
                tuning.max_cells_per_axis,
            );
            for key in keys {
                if !inspected.insert(key.clone()) {
                    continue;
                }
                let Some(meta) = loaded.envelope.bucket(&key) else {
                    continue;
                };
                if cancel.is_cancelled() {
                    StoreStats::incr(&self.stats.cancelled);
                    return empty(0);
                }
                if let Some(records) = self.fetch_bucket(&key, meta, &loaded.payload) {
                    acc.extend(
                        records
                            .iter()
                            .map(|r| Place::from_raw(r, &center, &self.config.default_location)),
                    );
                }
            }
            // 逐层放宽，只要有结果就停
            if !acc.is_empty() {
                break;
            }
        }

        let candidates = acc.len();
        let (tier, places) = select_tiered(acc, radius_km * 1000.0, limit, tuning);
        tracing::debug!(
            "nearby ({:.5},{:.5}) r={}km limit={} depth={} candidates={} tier={:?} -> {}",
            center.lat,
            center.lng,
            radius_km,
            limit,
            depth,
            candidates,
            tier,
            places.len()
        );
        NearbyOutcome {
            tier,
            places,
            expansion_depth: depth,
        }
    }

    /// 全量：按 (offset, length) 顺序读桶，结果按统一比较器排序
    pub fn load_all(&self, center: Coordinate, cancel: &CancellationToken) -> Vec<Place> {
        StoreStats::incr(&self.stats.queries);
        let Some(loaded) = self.loaded.as_ref() else {
            return Vec::new();
        };

        let mut out = Vec::new();
        for (key, meta) in loaded.envelope.buckets_in_file_order() {
            if cancel.is_cancelled() {
                StoreStats::incr(&self.stats.cancelled);
                return Vec::new();
            }
            if let Some(records) = self.fetch_bucket(key, meta, &loaded.payload) {
                out.extend(
                    records
                        .iter()
                        .map(|r| Place::from_raw(r, &center, &self.config.default_location)),
                );
            }
        }
        sort_places(&mut out);
        out
    }

    /// 缓存优先取桶；失败的桶贡献零条且不入缓存（之后可重试）
    fn fetch_bucket(
        &self,
        key: &str,
        meta: &BucketMeta,
        payload: &PayloadFile,
    ) -> Option<BucketRecords> {
        let cache_key = meta.cache_key();
        if let Some(hit) = self.cache.get(&cache_key) {
            StoreStats::incr(&self.stats.cache_hits);
            return Some(hit);
        }
        StoreStats::incr(&self.stats.cache_misses);

        let raw = match payload.read_range(meta.payload_offset, meta.payload_length) {
            Ok(b) => b,
            Err(e) => {
                if matches!(e, StoreError::ShortRead { .. }) {
                    StoreStats::incr(&self.stats.short_reads);
                }
                StoreStats::incr(&self.stats.corrupt_buckets);
                tracing::warn!("bucket {} read failed: {}", key, e);
                return None;
            }
        };

        let Some(decoded) = self.pipeline.decode_records(&raw) else {
            StoreStats::incr(&self.stats.buckets_empty);
            tracing::warn!(
                "bucket {} ({}) yielded no records",
                key,
                cache_key
            );
            return None;
        };

        if decoded.dropped > 0 {
            StoreStats::add(&self.stats.records_dropped, decoded.dropped as u64);
            tracing::debug!("bucket {}: dropped {} malformed records", key, decoded.dropped);
        }
        if let Some(expected) = meta.record_count {
            let got = (decoded.records.len() + decoded.dropped) as u64;
            if expected != got {
                tracing::debug!("bucket {}: record_count {} but decoded {}", key, expected, got);
            }
        }
        StoreStats::incr(&self.stats.buckets_decoded);

        let records: BucketRecords = Arc::new(decoded.records);
        self.cache.put(cache_key, records.clone());
        Some(records)
    }
}

/// 索引声明的 payload 优先，解析不到再用默认文件名
fn resolve_payload(
    resolver: &ResourceResolver,
    declared: Option<&str>,
    default_name: &str,
) -> Result<PathBuf> {
    resolver
        .resolve_first(declared.into_iter().chain(std::iter::once(default_name)))
        .ok_or_else(|| {
            StoreError::MissingResource(declared.unwrap_or(default_name).to_string())
        })
}
