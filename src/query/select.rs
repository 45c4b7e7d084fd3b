use std::cmp::Ordering;

use serde::Serialize;

use crate::config::QueryTuning;
use crate::core::Place;

/// 距离升序 → scale 降序（缺失按 0）→ 名称 → id；任意并列集合都有确定顺序
pub fn compare_places(a: &Place, b: &Place) -> Ordering {
    a.distance_meters
        .total_cmp(&b.distance_meters)
        .then_with(|| {
            let sa = a.scale_score.unwrap_or(0.0);
            let sb = b.scale_score.unwrap_or(0.0);
            sb.total_cmp(&sa)
        })
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.id.cmp(&b.id))
}

pub fn sort_places(places: &mut [Place]) {
    places.sort_by(compare_places);
}

/// 命中的回退层
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionTier {
    PreciseInRange,
    PreciseAny,
    ApproximateInRange,
    ApproximateAny,
    Empty,
}

/// 扩展层半径：`[r, min(r×m1, c1), min(r×m2, c2)]`
pub fn expansion_tiers(radius_km: f64, tuning: &QueryTuning) -> [f64; 3] {
    let [m1, m2] = tuning.expansion_multipliers;
    let [c1, c2] = tuning.expansion_caps_km;
    [radius_km, (radius_km * m1).min(c1), (radius_km * m2).min(c2)]
}

/// 分层回退选择：精确坐标永远优先于近似坐标；没有精确数据时，范围只是软偏好。
///
/// 范围判定带 `range_margin` 余量；近似结果额外受 `approximate_cap` 限制。
pub fn select_tiered(
    places: Vec<Place>,
    radius_m: f64,
    limit: usize,
    tuning: &QueryTuning,
) -> (SelectionTier, Vec<Place>) {
    let limit = limit.max(1);
    let max_m = radius_m * tuning.range_margin;
    let in_range = |p: &Place| p.distance_meters <= max_m;

    let (mut precise, mut approx): (Vec<Place>, Vec<Place>) =
        places.into_iter().partition(Place::is_precise);
    sort_places(&mut precise);
    sort_places(&mut approx);

    if precise.iter().any(in_range) {
        let out = take_sorted(precise.into_iter().filter(in_range), limit);
        return (SelectionTier::PreciseInRange, out);
    }
    if !precise.is_empty() {
        return (SelectionTier::PreciseAny, take_sorted(precise.into_iter(), limit));
    }

    let approx_limit = limit.min(tuning.approximate_cap.max(1));
    if approx.iter().any(in_range) {
        let out = take_sorted(approx.into_iter().filter(in_range), approx_limit);
        return (SelectionTier::ApproximateInRange, out);
    }
    if !approx.is_empty() {
        return (
            SelectionTier::ApproximateAny,
            take_sorted(approx.into_iter(), approx_limit),
        );
    }
    (SelectionTier::Empty, Vec::new())
}

fn take_sorted(it: impl Iterator<Item = Place>, n: usize) -> Vec<Place> {
    it.take(n).collect()
}
