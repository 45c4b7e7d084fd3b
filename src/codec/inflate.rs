use miniz_oxide::inflate::{decompress_to_vec_with_limit, decompress_to_vec_zlib_with_limit, TINFLStatus};

use crate::error::{Result, StoreError};

/// 解压输出硬上限
pub const MAX_INFLATED_BYTES: usize = 64 * 1024 * 1024;
const MIN_INITIAL_LIMIT: usize = 64 * 1024;

/// 解压策略。管线按顺序尝试，第一个能被下游解析的输出胜出；
/// 新格式只需追加一个实现。
pub trait ChunkInflater: Send + Sync {
    fn name(&self) -> &'static str;
    fn inflate(&self, input: &[u8]) -> Result<Vec<u8>>;
}

/// zlib 包装流（header + adler32 footer）
pub struct ZlibInflater {
    pub max_output: usize,
}

impl Default for ZlibInflater {
    fn default() -> Self {
        Self {
            max_output: MAX_INFLATED_BYTES,
        }
    }
}

impl ChunkInflater for ZlibInflater {
    fn name(&self) -> &'static str {
        "zlib"
    }

    fn inflate(&self, input: &[u8]) -> Result<Vec<u8>> {
        decompress_to_vec_zlib_with_limit(input, self.max_output)
            .map_err(|e| StoreError::Inflate(format!("zlib: {:?}", e.status)))
    }
}

/// 旧管线产出的 raw deflate：输出上限指数增长，直到成功或撞到硬上限
pub struct RawDeflateInflater {
    pub max_output: usize,
}

impl Default for RawDeflateInflater {
    fn default() -> Self {
        Self {
            max_output: MAX_INFLATED_BYTES,
        }
    }
}

impl ChunkInflater for RawDeflateInflater {
    fn name(&self) -> &'static str {
        "raw-deflate"
    }

    fn inflate(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut limit = input
            .len()
            .saturating_mul(4)
            .max(MIN_INITIAL_LIMIT)
            .min(self.max_output);
        loop {
            match decompress_to_vec_with_limit(input, limit) {
                Ok(out) => return Ok(out),
                Err(e) if e.status == TINFLStatus::HasMoreOutput && limit < self.max_output => {
                    limit = limit.saturating_mul(2).min(self.max_output);
                }
                Err(e) => {
                    return Err(StoreError::Inflate(format!(
                        "raw deflate: {:?} (limit {})",
                        e.status, limit
                    )))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use miniz_oxide::deflate::{compress_to_vec, compress_to_vec_zlib};

    #[test]
    fn zlib_roundtrip() {
        let data = b"[{\"id\":\"a\"}]".repeat(10);
        let z = compress_to_vec_zlib(&data, 6);
        assert_eq!(ZlibInflater::default().inflate(&z).unwrap(), data);
    }

    #[test]
    fn zlib_rejects_raw_stream() {
        let raw = compress_to_vec(b"hello hello hello", 6);
        assert!(ZlibInflater::default().inflate(&raw).is_err());
    }

    #[test]
    fn raw_deflate_grows_past_initial_limit() {
        // 高压缩比：输出远超 max(4×输入, 64KiB)
        let data = vec![b'x'; 1024 * 1024];
        let raw = compress_to_vec(&data, 9);
        assert!(raw.len() * 4 < data.len());
        let out = RawDeflateInflater::default().inflate(&raw).unwrap();
        assert_eq!(out.len(), data.len());
    }

    #[test]
    fn raw_deflate_respects_hard_cap() {
        let data = vec![0u8; 512 * 1024];
        let raw = compress_to_vec(&data, 9);
        let inflater = RawDeflateInflater {
            max_output: 128 * 1024,
        };
        assert!(matches!(inflater.inflate(&raw), Err(StoreError::Inflate(_))));
    }

    #[test]
    fn garbage_fails_both() {
        let junk = [0xFFu8, 0x00, 0x13, 0x37, 0xAB];
        assert!(ZlibInflater::default().inflate(&junk).is_err());
        assert!(RawDeflateInflater::default().inflate(&junk).is_err());
    }
}
