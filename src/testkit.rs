//! 测试夹具：构造混淆后的 payload 与索引文件。

use std::path::{Path, PathBuf};

use miniz_oxide::deflate::{compress_to_vec, compress_to_vec_zlib};
use serde_json::json;

use tokio_util::sync::CancellationToken;

use crate::codec::{ChunkInflater, DecodePipeline, ObfuscationKey, ZlibInflater};
use crate::core::{FusedRecord, LocalizedText, RawPlaceItem};

pub const TEST_SEED: &str = crate::config::DEFAULT_OBFUSCATION_SEED;

pub fn item(id: &str, lat: f64, lng: f64) -> RawPlaceItem {
    RawPlaceItem {
        category: "event".to_string(),
        id: id.to_string(),
        scores: None,
        start_date: None,
        end_date: None,
        start_time: None,
        end_time: None,
        title: LocalizedText::default(),
        summary: LocalizedText::default(),
        fused: FusedRecord {
            lat: Some(lat),
            lng: Some(lng),
            geo_source: Some("geocoded".to_string()),
            ..FusedRecord::default()
        },
        image: None,
    }
}

pub fn approximate(id: &str, lat: f64, lng: f64) -> RawPlaceItem {
    let mut r = item(id, lat, lng);
    r.fused.geo_source = Some("prefecture_center".to_string());
    r
}

pub fn obfuscate(bytes: &[u8], seed: &str) -> Vec<u8> {
    ObfuscationKey::from_seed(seed).apply(bytes)
}

pub fn encode_json_chunk(json: &[u8], seed: &str) -> Vec<u8> {
    obfuscate(&compress_to_vec_zlib(json, 6), seed)
}

pub fn encode_chunk(items: &[RawPlaceItem], seed: &str) -> Vec<u8> {
    let json = serde_json::to_vec(items).unwrap();
    encode_json_chunk(&json, seed)
}

pub fn encode_chunk_raw_deflate(items: &[RawPlaceItem], seed: &str) -> Vec<u8> {
    let json = serde_json::to_vec(items).unwrap();
    obfuscate(&compress_to_vec(&json, 6), seed)
}

/// 第一次解压成功后取消 token，用来在两次取桶之间制造取消
struct CancelOnInflate {
    inner: ZlibInflater,
    cancel: CancellationToken,
}

impl ChunkInflater for CancelOnInflate {
    fn name(&self) -> &'static str {
        "zlib-then-cancel"
    }

    fn inflate(&self, input: &[u8]) -> crate::error::Result<Vec<u8>> {
        let out = self.inner.inflate(input)?;
        self.cancel.cancel();
        Ok(out)
    }
}

pub fn cancel_on_first_inflate(cancel: CancellationToken) -> DecodePipeline {
    DecodePipeline::new(
        ObfuscationKey::from_seed(TEST_SEED),
        vec![Box::new(CancelOnInflate {
            inner: ZlibInflater::default(),
            cancel,
        })],
    )
}

pub fn unique_tmp_dir(tag: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("geobucket-{}-{}", tag, nanos));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// 按给定顺序把块写进 payload，返回每个块的 (offset, length)
pub fn write_payload(path: &Path, chunks: &[Vec<u8>]) -> Vec<(u64, usize)> {
    let mut data = Vec::new();
    let mut spans = Vec::new();
    for c in chunks {
        spans.push((data.len() as u64, c.len()));
        data.extend_from_slice(c);
    }
    std::fs::write(path, &data).unwrap();
    spans
}

/// 写出 places_index.json + places_payload.bin；`buckets` 里每项是 (geohash, 已编码块)
pub fn write_store<K: AsRef<str>>(dir: &Path, precision: u8, buckets: &[(K, Vec<u8>)]) {
    let chunks: Vec<Vec<u8>> = buckets.iter().map(|(_, c)| c.clone()).collect();
    let spans = write_payload(&dir.join(crate::config::DEFAULT_PAYLOAD_FILE), &chunks);
    let total: usize = chunks.iter().map(|c| c.len()).sum();

    let mut map = serde_json::Map::new();
    for ((key, _), (off, len)) in buckets.iter().zip(spans) {
        map.insert(
            key.as_ref().to_string(),
            json!({
                "record_count": null,
                "payload_sha256": format!("h{}", off),
                "payload_offset": off,
                "payload_length": len,
            }),
        );
    }
    let index = json!({
        "version": 3,
        "spatial_index": {"scheme": "geohash", "precision": precision, "bucket_count": buckets.len()},
        "payload_file": crate::config::DEFAULT_PAYLOAD_FILE,
        "payload_size_bytes": total,
        "payload_buckets": map,
    });
    std::fs::write(
        dir.join(crate::config::DEFAULT_INDEX_FILE),
        serde_json::to_vec_pretty(&index).unwrap(),
    )
    .unwrap();
}
