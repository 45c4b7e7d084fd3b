use serde::{Deserialize, Serialize};

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// 1° 纬度 ≈ 110.574 km
pub const KM_PER_DEG_LAT: f64 = 110.574;
/// 赤道处 1° 经度 ≈ 111.320 km（乘 cos(lat)）
pub const KM_PER_DEG_LNG_EQUATOR: f64 = 111.320;

/// 避免极点退化
pub const MAX_LAT: f64 = 89.999_999;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// 大圆距离（haversine，米）
    pub fn distance_meters(&self, other: &Coordinate) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let dlat = lat2 - lat1;
        let dlng = (other.lng - self.lng).to_radians();
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().min(1.0).asin()
    }

    /// 按公里偏移（北向 / 东向），纬度钳制、经度回绕
    pub fn offset_km(&self, north_km: f64, east_km: f64) -> Coordinate {
        let lat = self.lat + north_km / KM_PER_DEG_LAT;
        let lng = self.lng + east_km / km_per_deg_lng(self.lat);
        Coordinate::new(clamp_lat(lat), wrap_lng(lng))
    }
}

pub fn km_per_deg_lng(lat: f64) -> f64 {
    // 高纬度 cos→0，给个下限防止除零
    KM_PER_DEG_LNG_EQUATOR * lat.to_radians().cos().max(0.01)
}

pub fn clamp_lat(lat: f64) -> f64 {
    lat.clamp(-MAX_LAT, MAX_LAT)
}

/// 经度回绕到 [-180, 180)
pub fn wrap_lng(lng: f64) -> f64 {
    if (-180.0..180.0).contains(&lng) {
        return lng;
    }
    (lng + 180.0).rem_euclid(360.0) - 180.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokyo_tower_to_tokyo_station() {
        let tower = Coordinate::new(35.6586, 139.7454);
        let station = Coordinate::new(35.681236, 139.767125);
        let d = tower.distance_meters(&station);
        assert!((3000.0..3300.0).contains(&d), "got {}", d);
    }

    #[test]
    fn offset_km_roundtrips_distance() {
        let c = Coordinate::new(35.6586, 139.7454);
        let n = c.offset_km(2.0, 0.0);
        assert!((c.distance_meters(&n) - 2000.0).abs() < 20.0);
        let e = c.offset_km(0.0, 2.0);
        assert!((c.distance_meters(&e) - 2000.0).abs() < 20.0);
    }

    #[test]
    fn lng_wraps_and_lat_clamps() {
        assert_eq!(wrap_lng(190.0), -170.0);
        assert_eq!(wrap_lng(-190.0), 170.0);
        assert_eq!(wrap_lng(180.0), -180.0);
        assert_eq!(clamp_lat(95.0), MAX_LAT);
        let c = Coordinate::new(89.99, 179.9).offset_km(10.0, 50.0);
        assert!(c.lat <= MAX_LAT);
        assert!((-180.0..180.0).contains(&c.lng));
    }
}
