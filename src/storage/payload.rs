use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::{Result, StoreError};

/// payload 区间读取器。
///
/// 每次读取都打开独立文件句柄（drop 即关闭），并发查询之间没有共享游标。
#[derive(Clone, Debug)]
pub struct PayloadFile {
    path: PathBuf,
    len: u64,
}

impl PayloadFile {
    pub fn open(path: PathBuf) -> Result<Self> {
        let len = std::fs::metadata(&path)?.len();
        Ok(Self { path, len })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn contains_range(&self, offset: u64, length: usize) -> bool {
        offset
            .checked_add(length as u64)
            .is_some_and(|end| end <= self.len)
    }

    pub fn read_range(&self, offset: u64, length: usize) -> Result<Vec<u8>> {
        if !self.contains_range(offset, length) {
            return Err(StoreError::OutOfBounds {
                offset,
                length,
                file_len: self.len,
            });
        }
        let mut f = File::open(&self.path)?;
        f.seek(SeekFrom::Start(offset))?;
        let mut buf = Vec::with_capacity(length);
        let got = f.take(length as u64).read_to_end(&mut buf)?;
        if got != length {
            return Err(StoreError::ShortRead {
                offset,
                expected: length,
                got,
            });
        }
        Ok(buf)
    }

    /// 整文件 SHA-256（hex 小写）
    pub fn sha256_hex(&self) -> Result<String> {
        let mut f = File::open(&self.path)?;
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let n = f.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(hex::encode(hasher.finalize()))
    }
}
