use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::Coordinate;
use crate::error::{Result, StoreError};

/// 混淆密钥种子（SHA-256 后得到 32 字节 XOR 密钥）
pub const DEFAULT_OBFUSCATION_SEED: &str = "geobucket.payload.v1";

pub const DEFAULT_INDEX_FILE: &str = "places_index.json";
pub const DEFAULT_PAYLOAD_FILE: &str = "places_payload.bin";
pub const DEFAULT_IMAGE_INDEX_FILE: &str = "place_images_index.json";
pub const DEFAULT_IMAGE_PAYLOAD_FILE: &str = "place_images.bin";

/// 存储配置（TOML）。所有字段都有默认值，配置文件只需写要覆盖的部分。
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// 资源根目录（按顺序查找，先到先得）
    pub roots: Vec<PathBuf>,
    pub index_file: String,
    /// 索引未声明 payload_file 时使用
    pub default_payload_file: String,
    pub image_index_file: String,
    pub default_image_payload_file: String,
    pub obfuscation_seed: String,
    /// 解码桶 LRU 容量（条目数）
    pub cache_capacity: usize,
    /// 打开时对整个 payload 做 SHA-256 校验
    pub verify_payload_sha256: bool,
    /// 记录缺失坐标时使用的兜底位置
    pub default_location: Coordinate,
    pub query: QueryTuning,
    pub preheat: PreheatTuning,
    pub image: ImageTuning,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            index_file: DEFAULT_INDEX_FILE.to_string(),
            default_payload_file: DEFAULT_PAYLOAD_FILE.to_string(),
            image_index_file: DEFAULT_IMAGE_INDEX_FILE.to_string(),
            default_image_payload_file: DEFAULT_IMAGE_PAYLOAD_FILE.to_string(),
            obfuscation_seed: DEFAULT_OBFUSCATION_SEED.to_string(),
            cache_capacity: 256,
            verify_payload_sha256: false,
            // 东京站
            default_location: Coordinate::new(35.681236, 139.767125),
            query: QueryTuning::default(),
            preheat: PreheatTuning::default(),
            image: ImageTuning::default(),
        }
    }
}

impl StoreConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// 调参必须有限且上下限不倒置
    pub fn validate(&self) -> Result<()> {
        let q = &self.query;
        positive("query.min_radius_km", q.min_radius_km)?;
        positive("query.range_margin", q.range_margin)?;
        for v in q.expansion_multipliers {
            positive("query.expansion_multipliers", v)?;
        }
        for v in q.expansion_caps_km {
            positive("query.expansion_caps_km", v)?;
        }

        let p = &self.preheat;
        positive("preheat.radius_factor", p.radius_factor)?;
        positive("preheat.step_factor", p.step_factor)?;
        positive("preheat.min_radius_km", p.min_radius_km)?;
        positive("preheat.max_radius_km", p.max_radius_km)?;
        if p.min_radius_km > p.max_radius_km {
            return Err(StoreError::ConfigValue(format!(
                "preheat.min_radius_km ({}) > preheat.max_radius_km ({})",
                p.min_radius_km, p.max_radius_km
            )));
        }

        if !self.default_location.is_valid() {
            return Err(StoreError::ConfigValue(format!(
                "default_location {:?} out of range",
                self.default_location
            )));
        }
        Ok(())
    }
}

fn positive(name: &str, v: f64) -> Result<()> {
    if v.is_finite() && v > 0.0 {
        Ok(())
    } else {
        Err(StoreError::ConfigValue(format!("{} must be finite and > 0, got {}", name, v)))
    }
}

/// nearby 查询调参（产品经验值，不是正确性约束）
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryTuning {
    pub min_radius_km: f64,
    /// 第 2、3 层扩展半径倍数
    pub expansion_multipliers: [f64; 2],
    /// 第 2、3 层扩展半径上限（km）
    pub expansion_caps_km: [f64; 2],
    /// “范围内”判定的半径余量
    pub range_margin: f64,
    /// 近似坐标结果的条数上限
    pub approximate_cap: usize,
    /// 每个轴向最多展开的 geohash 格数
    pub max_cells_per_axis: u32,
}

impl Default for QueryTuning {
    fn default() -> Self {
        Self {
            min_radius_km: 0.5,
            expansion_multipliers: [2.0, 4.0],
            expansion_caps_km: [80.0, 140.0],
            range_margin: 1.2,
            approximate_cap: 40,
            max_cells_per_axis: 32,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PreheatTuning {
    pub radius_factor: f64,
    pub min_radius_km: f64,
    pub max_radius_km: f64,
    pub max_limit: usize,
    /// 采样点偏移 = warm 半径 × step_factor
    pub step_factor: f64,
}

impl Default for PreheatTuning {
    fn default() -> Self {
        Self {
            radius_factor: 0.88,
            min_radius_km: 8.0,
            max_radius_km: 45.0,
            max_limit: 60,
            step_factor: 1.0,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageTuning {
    /// 缩略图最大边长的下限
    pub min_max_pixel: u32,
}

impl Default for ImageTuning {
    fn default() -> Self {
        Self { min_max_pixel: 256 }
    }
}
