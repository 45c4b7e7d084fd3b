use sha2::{Digest, Sha256};

/// 资源混淆：XOR 流，防随手查看，不是安全措施。
///
/// `out[i] = in[i] ^ key[i % key.len()] ^ ((i * 131 + 17) mod 256)`，
/// i 是块内偏移（每个块独立寻址）。同一把 key 作用两次即还原。
#[derive(Clone)]
pub struct ObfuscationKey {
    key: [u8; 32],
}

impl ObfuscationKey {
    pub fn from_seed(seed: &str) -> Self {
        let digest = Sha256::digest(seed.as_bytes());
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        Self { key }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.key
    }

    /// 原地变换
    pub fn apply_in_place(&self, data: &mut [u8]) {
        let klen = self.key.len();
        for (i, b) in data.iter_mut().enumerate() {
            *b ^= self.key[i % klen] ^ mix_byte(i);
        }
    }

    pub fn apply(&self, data: &[u8]) -> Vec<u8> {
        let mut out = data.to_vec();
        self.apply_in_place(&mut out);
        out
    }
}

impl std::fmt::Debug for ObfuscationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObfuscationKey").finish_non_exhaustive()
    }
}

#[inline]
fn mix_byte(i: usize) -> u8 {
    (i.wrapping_mul(131).wrapping_add(17) & 0xFF) as u8
}
