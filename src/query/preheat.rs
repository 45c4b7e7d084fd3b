//! 预热：在查询中心周围 8 个方向各跑一次 nearby，结果丢弃，只为把桶解码进缓存。

use std::f64::consts::FRAC_1_SQRT_2;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::PreheatTuning;
use crate::core::Coordinate;
use crate::query::engine::PlaceStore;

/// N, NE, E, SE, S, SW, W, NW（北向分量, 东向分量）
const DIRECTIONS: [(f64, f64); 8] = [
    (1.0, 0.0),
    (FRAC_1_SQRT_2, FRAC_1_SQRT_2),
    (0.0, 1.0),
    (-FRAC_1_SQRT_2, FRAC_1_SQRT_2),
    (-1.0, 0.0),
    (-FRAC_1_SQRT_2, -FRAC_1_SQRT_2),
    (0.0, -1.0),
    (FRAC_1_SQRT_2, -FRAC_1_SQRT_2),
];

#[derive(Clone, Debug, PartialEq)]
pub struct PreheatPlan {
    pub warm_radius_km: f64,
    pub warm_limit: usize,
    pub samples: Vec<Coordinate>,
}

pub fn preheat_plan(
    center: Coordinate,
    radius_km: f64,
    limit: usize,
    tuning: &PreheatTuning,
) -> PreheatPlan {
    let radius_km = if radius_km.is_finite() { radius_km.max(0.0) } else { 0.0 };
    // 配置上下限可能倒置或为 NaN，不能用 f64::clamp
    let warm_radius_km = (radius_km * tuning.radius_factor)
        .max(tuning.min_radius_km)
        .min(tuning.max_radius_km);
    let warm_limit = (limit / 2).clamp(1, tuning.max_limit.max(1));
    let step = warm_radius_km * tuning.step_factor;
    let samples = DIRECTIONS
        .iter()
        .map(|&(n, e)| center.offset_km(n * step, e * step))
        .collect();
    PreheatPlan {
        warm_radius_km,
        warm_limit,
        samples,
    }
}

impl PlaceStore {
    /// 同步预热，返回实际跑完的采样点数
    pub fn preheat(
        &self,
        center: Coordinate,
        radius_km: f64,
        limit: usize,
        cancel: &CancellationToken,
    ) -> usize {
        if !self.is_loaded() || !center.is_valid() {
            return 0;
        }
        let plan = preheat_plan(center, radius_km, limit, &self.config().preheat);
        let mut done = 0;
        for sample in &plan.samples {
            if cancel.is_cancelled() {
                tracing::debug!("preheat cancelled after {} samples", done);
                break;
            }
            let _ = self.load_nearby(*sample, plan.warm_radius_km, plan.warm_limit, cancel);
            done += 1;
        }
        tracing::debug!(
            "preheat ({:.5},{:.5}) warm r={}km limit={}: {} samples, cache {}",
            center.lat,
            center.lng,
            plan.warm_radius_km,
            plan.warm_limit,
            done,
            self.cache().len()
        );
        done
    }

    /// 扔到阻塞线程池里跑，调用方不等结果
    pub fn spawn_preheat(
        self: &Arc<Self>,
        center: Coordinate,
        radius_km: f64,
        limit: usize,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::task::spawn_blocking(move || {
            store.preheat(center, radius_km, limit, &cancel);
        })
    }
}
