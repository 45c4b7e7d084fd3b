use thiserror::Error;

/// 存储内部错误。
///
/// 只在库内部流动：消费者 API（`PlaceStore` / `ImageStore`）在边界处把它们
/// 转换成空结果或 `None`，并记录 tracing 日志。
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("short read at offset {offset}: expected {expected} bytes, got {got}")]
    ShortRead {
        offset: u64,
        expected: usize,
        got: usize,
    },

    #[error("range {offset}+{length} exceeds file length {file_len}")]
    OutOfBounds {
        offset: u64,
        length: usize,
        file_len: u64,
    },

    #[error("inflate failed: {0}")]
    Inflate(String),

    #[error("integrity check failed: {0}")]
    Integrity(String),

    #[error("json parse failed: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("image decode failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("resource not found: {0}")]
    MissingResource(String),

    #[error("invalid config: {0}")]
    Config(#[from] toml::de::Error),

    #[error("invalid config value: {0}")]
    ConfigValue(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
