use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use crate::core::geo::Coordinate;

/// 图片定位符（只是坐标，不持有文件字节）
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageRef {
    pub offset: u64,
    pub length: usize,
    #[serde(default)]
    pub sha256: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawScores {
    #[serde(default)]
    pub scale: Option<f64>,
    #[serde(default)]
    pub heat: Option<f64>,
}

/// 最多三种语言的文本
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalizedText {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ja: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub en: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zh: Option<String>,
}

impl LocalizedText {
    /// ja → en → zh
    pub fn preferred(&self) -> Option<&str> {
        self.ja
            .as_deref()
            .or(self.en.as_deref())
            .or(self.zh.as_deref())
    }

    fn scrubbed(&self) -> LocalizedText {
        LocalizedText {
            ja: scrub_text(self.ja.as_deref()),
            en: scrub_text(self.en.as_deref()),
            zh: scrub_text(self.zh.as_deref()),
        }
    }
}

/// 场馆 / 活动融合字段
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FusedRecord {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub venue_name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub prefecture: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    #[serde(default)]
    pub geo_source: Option<String>,
}

/// 桶内解码单元
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawPlaceItem {
    pub category: String,
    pub id: String,
    #[serde(default)]
    pub scores: Option<RawScores>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub title: LocalizedText,
    #[serde(default)]
    pub summary: LocalizedText,
    #[serde(default)]
    pub fused: FusedRecord,
    #[serde(default)]
    pub image: Option<ImageRef>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeoSource {
    /// 真实地理编码
    Precise,
    /// 都道府县中心 / 默认位置兜底
    Approximate,
}

const APPROXIMATE_TAGS: &[&str] = &["prefecture_center", "prefecture", "default", "fallback"];

impl GeoSource {
    fn classify(tag: Option<&str>, has_coordinate: bool) -> Self {
        if !has_coordinate {
            return GeoSource::Approximate;
        }
        match tag {
            Some(t) if APPROXIMATE_TAGS.contains(&t.trim().to_ascii_lowercase().as_str()) => {
                GeoSource::Approximate
            }
            _ => GeoSource::Precise,
        }
    }
}

/// 面向调用方的记录：每次查询新建，distance 按查询中心重算
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Place {
    pub id: String,
    pub name: String,
    pub category: String,
    pub coordinate: Coordinate,
    pub geo_source: GeoSource,
    pub distance_meters: f64,
    pub scale_score: Option<f64>,
    pub heat_score: Option<f64>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub title: LocalizedText,
    pub summary: LocalizedText,
    pub venue_name: Option<String>,
    pub address: Option<String>,
    pub prefecture: Option<String>,
    pub city: Option<String>,
    pub url: Option<String>,
    pub image: Option<ImageRef>,
}

impl Place {
    pub fn from_raw(raw: &RawPlaceItem, center: &Coordinate, fallback: &Coordinate) -> Place {
        let fused = &raw.fused;
        let located = match (fused.lat, fused.lng) {
            (Some(lat), Some(lng)) => {
                let c = Coordinate::new(lat, lng);
                c.is_valid().then_some(c)
            }
            _ => None,
        };
        let geo_source = GeoSource::classify(fused.geo_source.as_deref(), located.is_some());
        let coordinate = located.unwrap_or(*fallback);

        let title = raw.title.scrubbed();
        let summary = raw.summary.scrubbed();
        let fused_name = scrub_text(fused.name.as_deref());
        let venue_name = scrub_text(fused.venue_name.as_deref());
        let name = title
            .preferred()
            .map(str::to_string)
            .or_else(|| fused_name.clone())
            .or_else(|| venue_name.clone())
            .unwrap_or_else(|| raw.id.clone());

        let scores = raw.scores.clone().unwrap_or_default();

        Place {
            id: raw.id.clone(),
            name,
            category: raw.category.clone(),
            coordinate,
            geo_source,
            distance_meters: center.distance_meters(&coordinate),
            scale_score: scores.scale.filter(|v| v.is_finite()),
            heat_score: scores.heat.filter(|v| v.is_finite()),
            start_date: scrub_text(raw.start_date.as_deref()),
            end_date: scrub_text(raw.end_date.as_deref()),
            start_time: scrub_text(raw.start_time.as_deref()),
            end_time: scrub_text(raw.end_time.as_deref()),
            title,
            summary,
            venue_name,
            address: scrub_text(fused.address.as_deref()),
            prefecture: scrub_text(fused.prefecture.as_deref()),
            city: scrub_text(fused.city.as_deref()),
            url: scrub_text(fused.url.as_deref()),
            image: raw.image.clone(),
        }
    }

    pub fn is_precise(&self) -> bool {
        self.geo_source == GeoSource::Precise
    }
}

/// 含 U+FFFD（编码损坏痕迹）或空白的文本置为 None；其余做 NFC
pub fn scrub_text(s: Option<&str>) -> Option<String> {
    let s = s?.trim();
    if s.is_empty() || s.contains('\u{FFFD}') {
        return None;
    }
    Some(s.nfc().collect())
}
