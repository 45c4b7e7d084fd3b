//! 解码管线：去混淆 → 解压（策略链）→ 容错 JSON 解析。
//!
//! 每一步都是纯函数；任何一步失败且最终恢复不出记录时返回 None（不是错误），
//! 由调用方决定不缓存。

pub mod inflate;
pub mod obfuscate;
pub mod records;

pub use inflate::{ChunkInflater, RawDeflateInflater, ZlibInflater};
pub use obfuscate::ObfuscationKey;
pub use records::{parse_records, ParsedRecords};

use crate::core::RawPlaceItem;
use crate::error::{Result, StoreError};

#[derive(Debug)]
pub struct DecodedBucket {
    pub records: Vec<RawPlaceItem>,
    pub dropped: usize,
    /// 胜出的解压策略
    pub inflater: &'static str,
}

pub struct DecodePipeline {
    key: ObfuscationKey,
    inflaters: Vec<Box<dyn ChunkInflater>>,
}

impl DecodePipeline {
    pub fn new(key: ObfuscationKey, inflaters: Vec<Box<dyn ChunkInflater>>) -> Self {
        Self { key, inflaters }
    }

    /// 桶管线：zlib 优先，raw deflate 兜底
    pub fn for_buckets(seed: &str) -> Self {
        Self::new(
            ObfuscationKey::from_seed(seed),
            vec![
                Box::new(ZlibInflater::default()),
                Box::new(RawDeflateInflater::default()),
            ],
        )
    }

    /// 图片管线：一张图一个引用，只走 zlib
    pub fn for_blobs(seed: &str) -> Self {
        Self::new(
            ObfuscationKey::from_seed(seed),
            vec![Box::new(ZlibInflater::default())],
        )
    }

    pub fn decode_records(&self, raw: &[u8]) -> Option<DecodedBucket> {
        let clear = self.key.apply(raw);
        for inflater in &self.inflaters {
            let bytes = match inflater.inflate(&clear) {
                Ok(b) => b,
                Err(e) => {
                    tracing::debug!("{} candidate rejected: {}", inflater.name(), e);
                    continue;
                }
            };
            match parse_records(&bytes) {
                Ok(parsed) if !parsed.records.is_empty() => {
                    return Some(DecodedBucket {
                        records: parsed.records,
                        dropped: parsed.dropped,
                        inflater: inflater.name(),
                    });
                }
                Ok(parsed) => {
                    tracing::debug!(
                        "{} candidate parsed but no records survived (dropped {})",
                        inflater.name(),
                        parsed.dropped
                    );
                }
                Err(e) => {
                    tracing::debug!("{} candidate unparsable: {}", inflater.name(), e);
                }
            }
        }
        None
    }

    /// 去混淆 + 解压，返回第一个成功的策略输出（图片用）
    pub fn decode_blob(&self, raw: &[u8]) -> Result<Vec<u8>> {
        let clear = self.key.apply(raw);
        let mut last = StoreError::Inflate("no inflater configured".to_string());
        for inflater in &self.inflaters {
            match inflater.inflate(&clear) {
                Ok(bytes) => return Ok(bytes),
                Err(e) => last = e,
            }
        }
        Err(last)
    }
}
