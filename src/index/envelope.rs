use std::collections::HashMap;

use serde::Deserialize;

use crate::error::Result;
use crate::geohash;

/// 单个桶在 payload 中的位置
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct BucketMeta {
    #[serde(default)]
    pub record_count: Option<u64>,
    #[serde(default)]
    pub payload_sha256: Option<String>,
    pub payload_offset: u64,
    pub payload_length: usize,
}

impl BucketMeta {
    /// 缓存 key：`{offset}:{length}:{hash 或 -}`
    pub fn cache_key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.payload_offset,
            self.payload_length,
            self.payload_sha256.as_deref().unwrap_or("-")
        )
    }
}

#[derive(Debug, Deserialize)]
struct SpatialIndexSection {
    #[serde(default = "default_scheme")]
    scheme: String,
    precision: u8,
    #[serde(default)]
    bucket_count: Option<u64>,
}

fn default_scheme() -> String {
    "geohash".to_string()
}

/// 索引文件的线上格式
#[derive(Debug, Deserialize)]
struct IndexFile {
    #[serde(default)]
    version: u32,
    spatial_index: SpatialIndexSection,
    #[serde(default)]
    payload_file: Option<String>,
    #[serde(default)]
    payload_sha256: Option<String>,
    #[serde(default)]
    payload_size_bytes: Option<u64>,
    #[serde(default)]
    payload_buckets: HashMap<String, BucketMeta>,
}

/// 解析后的索引信封：加载一次，之后不可变
#[derive(Clone, Debug)]
pub struct IndexEnvelope {
    pub version: u32,
    pub scheme: String,
    pub precision: u8,
    pub payload_file: Option<String>,
    pub payload_sha256: Option<String>,
    pub payload_size_bytes: Option<u64>,
    pub buckets: HashMap<String, BucketMeta>,
}

impl IndexEnvelope {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let f: IndexFile = serde_json::from_slice(bytes)?;
        if f.spatial_index.scheme != "geohash" {
            tracing::warn!("index scheme {:?} is not geohash, keys used as-is", f.spatial_index.scheme);
        }
        if let Some(n) = f.spatial_index.bucket_count {
            if n as usize != f.payload_buckets.len() {
                tracing::warn!(
                    "index bucket_count={} but {} buckets listed",
                    n,
                    f.payload_buckets.len()
                );
            }
        }
        // 桶 key 统一小写
        let buckets = f
            .payload_buckets
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .collect();
        Ok(Self {
            version: f.version,
            scheme: f.spatial_index.scheme,
            precision: geohash::clamp_precision(f.spatial_index.precision),
            payload_file: f.payload_file.filter(|s| !s.is_empty()),
            payload_sha256: f.payload_sha256.filter(|s| !s.is_empty()),
            payload_size_bytes: f.payload_size_bytes,
            buckets,
        })
    }

    pub fn bucket(&self, key: &str) -> Option<&BucketMeta> {
        self.buckets.get(key)
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// 丢弃超出 payload 实际长度的桶，返回丢弃数
    pub fn retain_within(&mut self, file_len: u64) -> usize {
        let before = self.buckets.len();
        self.buckets.retain(|key, b| {
            let ok = b
                .payload_offset
                .checked_add(b.payload_length as u64)
                .is_some_and(|end| end <= file_len);
            if !ok {
                tracing::warn!(
                    "bucket {} range {}+{} exceeds payload size {}, dropped",
                    key,
                    b.payload_offset,
                    b.payload_length,
                    file_len
                );
            }
            ok
        });
        before - self.buckets.len()
    }

    /// 全量扫描顺序：(offset, length) 升序，顺序读盘
    pub fn buckets_in_file_order(&self) -> Vec<(&str, &BucketMeta)> {
        let mut v: Vec<(&str, &BucketMeta)> =
            self.buckets.iter().map(|(k, b)| (k.as_str(), b)).collect();
        v.sort_by(|a, b| {
            (a.1.payload_offset, a.1.payload_length, a.0)
                .cmp(&(b.1.payload_offset, b.1.payload_length, b.0))
        });
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "version": 3,
        "spatial_index": {"scheme": "geohash", "precision": 5, "bucket_count": 3},
        "payload_file": "places_payload.bin",
        "payload_sha256": "abcd",
        "payload_size_bytes": 300,
        "payload_buckets": {
            "xn76G": {"record_count": 4, "payload_sha256": "h1", "payload_offset": 100, "payload_length": 50},
            "xn76u": {"payload_offset": 0, "payload_length": 100},
            "xn77h": {"record_count": 1, "payload_offset": 150, "payload_length": 200}
        }
    }"#;

    #[test]
    fn parses_envelope() {
        let env = IndexEnvelope::parse(SAMPLE.as_bytes()).unwrap();
        assert_eq!(env.version, 3);
        assert_eq!(env.precision, 5);
        assert_eq!(env.payload_file.as_deref(), Some("places_payload.bin"));
        assert_eq!(env.payload_size_bytes, Some(300));
        assert_eq!(env.len(), 3);
        let b = env.bucket("xn76g").unwrap();
        assert_eq!(b.record_count, Some(4));
        assert_eq!(b.cache_key(), "100:50:h1");
        assert_eq!(env.bucket("xn76u").unwrap().cache_key(), "0:100:-");
    }

    #[test]
    fn file_order_is_offset_then_length() {
        let env = IndexEnvelope::parse(SAMPLE.as_bytes()).unwrap();
        let keys: Vec<&str> = env.buckets_in_file_order().iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, ["xn76u", "xn76g", "xn77h"]);
    }

    #[test]
    fn out_of_range_buckets_dropped() {
        let mut env = IndexEnvelope::parse(SAMPLE.as_bytes()).unwrap();
        assert_eq!(env.retain_within(300), 1);
        assert!(env.bucket("xn77h").is_none());
        assert_eq!(env.len(), 2);
    }

    #[test]
    fn precision_clamped_and_missing_buckets_ok() {
        let env = IndexEnvelope::parse(
            br#"{"version":1,"spatial_index":{"scheme":"geohash","precision":12}}"#,
        )
        .unwrap();
        assert_eq!(env.precision, 8);
        assert!(env.is_empty());
    }

    #[test]
    fn corrupt_envelope_is_error() {
        assert!(IndexEnvelope::parse(b"{\"version\":").is_err());
        assert!(IndexEnvelope::parse(b"{\"version\":1}").is_err());
    }
}
