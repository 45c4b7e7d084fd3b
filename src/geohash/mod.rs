//! Geohash 编解码与邻格展开。
//!
//! 经度 / 纬度交替二分，每 5 bit 编码成一个 base-32 字符（偶数位是经度）。
//! 桶 key 就是索引精度下的 geohash 字符串。

use std::collections::BTreeSet;

use crate::core::geo::{clamp_lat, km_per_deg_lng, wrap_lng, Coordinate, KM_PER_DEG_LAT};

const BASE32: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";

pub const MIN_PRECISION: u8 = 1;
pub const MAX_PRECISION: u8 = 8;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    pub fn center(&self) -> Coordinate {
        Coordinate::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }

    pub fn lat_span(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    pub fn lng_span(&self) -> f64 {
        self.max_lng - self.min_lng
    }

    pub fn contains(&self, c: &Coordinate) -> bool {
        (self.min_lat..=self.max_lat).contains(&c.lat)
            && (self.min_lng..=self.max_lng).contains(&c.lng)
    }
}

pub fn clamp_precision(precision: u8) -> u8 {
    precision.clamp(MIN_PRECISION, MAX_PRECISION)
}

pub fn encode(c: &Coordinate, precision: u8) -> String {
    let precision = clamp_precision(precision) as usize;
    let lat = clamp_lat(c.lat);
    let lng = wrap_lng(c.lng);

    let (mut lat_lo, mut lat_hi) = (-90.0f64, 90.0f64);
    let (mut lng_lo, mut lng_hi) = (-180.0f64, 180.0f64);
    let mut out = String::with_capacity(precision);
    let mut even = true;
    let mut bits = 0u8;
    let mut ch = 0usize;

    while out.len() < precision {
        if even {
            let mid = (lng_lo + lng_hi) / 2.0;
            if lng >= mid {
                ch = (ch << 1) | 1;
                lng_lo = mid;
            } else {
                ch <<= 1;
                lng_hi = mid;
            }
        } else {
            let mid = (lat_lo + lat_hi) / 2.0;
            if lat >= mid {
                ch = (ch << 1) | 1;
                lat_lo = mid;
            } else {
                ch <<= 1;
                lat_hi = mid;
            }
        }
        even = !even;
        bits += 1;
        if bits == 5 {
            out.push(BASE32[ch] as char);
            bits = 0;
            ch = 0;
        }
    }
    out
}

/// 非法字符返回 None
pub fn bounding_box(hash: &str) -> Option<BoundingBox> {
    if hash.is_empty() {
        return None;
    }
    let (mut lat_lo, mut lat_hi) = (-90.0f64, 90.0f64);
    let (mut lng_lo, mut lng_hi) = (-180.0f64, 180.0f64);
    let mut even = true;

    for b in hash.bytes() {
        let idx = BASE32.iter().position(|&c| c == b.to_ascii_lowercase())?;
        for shift in (0..5).rev() {
            let bit = (idx >> shift) & 1;
            if even {
                let mid = (lng_lo + lng_hi) / 2.0;
                if bit == 1 {
                    lng_lo = mid;
                } else {
                    lng_hi = mid;
                }
            } else {
                let mid = (lat_lo + lat_hi) / 2.0;
                if bit == 1 {
                    lat_lo = mid;
                } else {
                    lat_hi = mid;
                }
            }
            even = !even;
        }
    }

    Some(BoundingBox {
        min_lat: lat_lo,
        max_lat: lat_hi,
        min_lng: lng_lo,
        max_lng: lng_hi,
    })
}

/// 覆盖 `radius_m` 的候选桶 key 集合（去重、有序）。
///
/// 只保证覆盖，不保证这些 key 在索引里存在。
pub fn covering_keys(
    center: &Coordinate,
    radius_m: f64,
    precision: u8,
    max_cells_per_axis: u32,
) -> BTreeSet<String> {
    let precision = clamp_precision(precision);
    let center_key = encode(center, precision);
    let mut keys = BTreeSet::new();
    let Some(cell) = bounding_box(&center_key) else {
        return keys;
    };

    let cell_lat_deg = cell.lat_span();
    let cell_lng_deg = cell.lng_span();
    let cell_h_m = cell_lat_deg * KM_PER_DEG_LAT * 1000.0;
    let cell_w_m = cell_lng_deg * km_per_deg_lng(center.lat) * 1000.0;

    let radius_m = if radius_m.is_finite() { radius_m.max(0.0) } else { 0.0 };
    let steps = |cell_m: f64| -> i64 {
        let n = (radius_m / cell_m.max(1e-9)).ceil();
        (n as i64).clamp(0, max_cells_per_axis as i64)
    };
    let lat_steps = steps(cell_h_m);
    let lng_steps = steps(cell_w_m);

    keys.insert(center_key);
    for dy in -lat_steps..=lat_steps {
        let lat = clamp_lat(center.lat + dy as f64 * cell_lat_deg);
        for dx in -lng_steps..=lng_steps {
            let lng = wrap_lng(center.lng + dx as f64 * cell_lng_deg);
            keys.insert(encode(&Coordinate::new(lat, lng), precision));
        }
    }
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn known_vectors() {
        assert_eq!(encode(&Coordinate::new(57.64911, 10.40744), 8), "u4pruydq");
        assert_eq!(encode(&Coordinate::new(35.6586, 139.7454), 5), "xn76g");
        assert_eq!(encode(&Coordinate::new(0.0, 0.0), 1), "s");
    }

    #[test]
    fn precision_is_clamped() {
        let c = Coordinate::new(35.6586, 139.7454);
        assert_eq!(encode(&c, 0).len(), 1);
        assert_eq!(encode(&c, 12).len(), 8);
    }

    #[test]
    fn invalid_hash_has_no_box() {
        assert!(bounding_box("").is_none());
        assert!(bounding_box("xn7a").is_none());
        assert!(bounding_box("XN76G").is_some());
    }

    #[test]
    fn zero_radius_is_center_cell_only() {
        let c = Coordinate::new(35.6586, 139.7454);
        let keys = covering_keys(&c, 0.0, 5, 32);
        assert_eq!(keys.len(), 1);
        assert!(keys.contains("xn76g"));
    }

    #[test]
    fn small_radius_covers_neighbor_ring() {
        let c = Coordinate::new(35.6586, 139.7454);
        let keys = covering_keys(&c, 1000.0, 5, 32);
        assert_eq!(keys.len(), 9);
    }

    #[test]
    fn huge_radius_is_capped_per_axis() {
        let c = Coordinate::new(35.6586, 139.7454);
        let keys = covering_keys(&c, 10_000_000.0, 5, 4);
        assert!(keys.len() <= 9 * 9);
    }

    #[test]
    fn antimeridian_wraps() {
        let c = Coordinate::new(0.0, 179.99);
        let keys = covering_keys(&c, 20_000.0, 4, 32);
        let west = encode(&Coordinate::new(0.0, -179.99), 4);
        assert!(keys.contains(&west));
    }

    #[test]
    fn near_pole_does_not_panic() {
        let c = Coordinate::new(89.9999, 10.0);
        let keys = covering_keys(&c, 50_000.0, 6, 32);
        assert!(!keys.is_empty());
    }

    proptest! {
        #[test]
        fn bbox_contains_encoded_point(lat in -89.9f64..89.9, lng in -179.9f64..179.9, p in 1u8..=8) {
            let c = Coordinate::new(lat, lng);
            let bb = bounding_box(&encode(&c, p)).unwrap();
            let eps = 1e-9;
            prop_assert!(bb.min_lat - eps <= lat && lat <= bb.max_lat + eps);
            prop_assert!(bb.min_lng - eps <= lng && lng <= bb.max_lng + eps);
        }

        #[test]
        fn doubling_radius_is_superset(lat in -60.0f64..60.0, lng in -170.0f64..170.0, r in 100.0f64..20_000.0, p in 3u8..=6) {
            let c = Coordinate::new(lat, lng);
            let small = covering_keys(&c, r, p, 32);
            let big = covering_keys(&c, r * 2.0, p, 32);
            prop_assert!(small.is_subset(&big));
        }
    }
}
