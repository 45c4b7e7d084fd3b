use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::blob::ImageStore;
use crate::core::{Coordinate, Place};
use crate::query::engine::PlaceStore;
use crate::stats::StatsReport;

const DEFAULT_RADIUS_KM: f64 = 5.0;
const DEFAULT_LIMIT: usize = 20;
const DEFAULT_MAX_PIXEL: u32 = 512;

#[derive(Deserialize)]
pub struct NearbyParams {
    pub lat: f64,
    pub lng: f64,
    pub radius_km: Option<f64>,
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct AllParams {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

#[derive(Deserialize)]
pub struct ImageParams {
    pub id: String,
    pub max: Option<u32>,
}

#[derive(Serialize)]
pub struct PreheatAccepted {
    pub scheduled: bool,
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<PlaceStore>,
    pub images: Arc<ImageStore>,
    /// 当前这一代预热的 token；新预热或前台查询会取消它
    preheat: Arc<Mutex<CancellationToken>>,
}

impl AppState {
    pub fn new(store: Arc<PlaceStore>, images: Arc<ImageStore>) -> Self {
        Self {
            store,
            images,
            preheat: Arc::new(Mutex::new(CancellationToken::new())),
        }
    }

    /// 取消上一代预热，换上新 token
    fn next_preheat_generation(&self) -> CancellationToken {
        let fresh = CancellationToken::new();
        let stale = std::mem::replace(&mut *self.preheat.lock(), fresh.clone());
        stale.cancel();
        fresh
    }

    fn cancel_preheat(&self) {
        self.preheat.lock().cancel();
    }
}

pub struct QueryServer {
    state: AppState,
}

impl QueryServer {
    pub fn new(store: Arc<PlaceStore>, images: Arc<ImageStore>) -> Self {
        Self {
            state: AppState::new(store, images),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/nearby", get(nearby_handler))
            .route("/all", get(all_handler))
            .route("/preheat", get(preheat_handler))
            .route("/image", get(image_handler))
            .route("/status", get(status_handler))
            .with_state(self.state.clone())
    }

    /// `shutdown` 取消后停止接收新连接
    pub async fn run(self, port: u16, shutdown: CancellationToken) -> anyhow::Result<()> {
        let app = self.router();
        let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
        tracing::info!("HTTP Query Server listening on port {}", port);
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;
        Ok(())
    }
}

// 每个请求一个 token：连接断开 → handler future 被 drop → guard 取消阻塞线程上的查询

async fn nearby_handler(
    State(state): State<AppState>,
    Query(params): Query<NearbyParams>,
) -> Json<Vec<Place>> {
    // 前台查询优先，视口已经变了
    state.cancel_preheat();
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    let center = Coordinate::new(params.lat, params.lng);
    let radius_km = params.radius_km.unwrap_or(DEFAULT_RADIUS_KM);
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT);

    let store = state.store.clone();
    let places = tokio::task::spawn_blocking(move || {
        store.load_nearby(center, radius_km, limit, &cancel)
    })
    .await
    .unwrap_or_default();
    Json(places)
}

async fn all_handler(
    State(state): State<AppState>,
    Query(params): Query<AllParams>,
) -> Json<Vec<Place>> {
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    let fallback = state.store.config().default_location;
    let center = Coordinate::new(
        params.lat.unwrap_or(fallback.lat),
        params.lng.unwrap_or(fallback.lng),
    );

    let store = state.store.clone();
    let places = tokio::task::spawn_blocking(move || store.load_all(center, &cancel))
        .await
        .unwrap_or_default();
    Json(places)
}

async fn preheat_handler(
    State(state): State<AppState>,
    Query(params): Query<NearbyParams>,
) -> (StatusCode, Json<PreheatAccepted>) {
    let center = Coordinate::new(params.lat, params.lng);
    // 不绑定请求生命周期，只受代际 token 控制
    let cancel = state.next_preheat_generation();
    drop(state.store.spawn_preheat(
        center,
        params.radius_km.unwrap_or(DEFAULT_RADIUS_KM),
        params.limit.unwrap_or(DEFAULT_LIMIT),
        cancel,
    ));
    (StatusCode::ACCEPTED, Json(PreheatAccepted { scheduled: true }))
}

async fn image_handler(
    State(state): State<AppState>,
    Query(params): Query<ImageParams>,
) -> Response {
    let max = params.max.unwrap_or(DEFAULT_MAX_PIXEL);
    let images = state.images.clone();
    let thumb = tokio::task::spawn_blocking(move || images.load_place_image(&params.id, max))
        .await
        .ok()
        .flatten();
    match thumb {
        Some(t) => ([(header::CONTENT_TYPE, "image/png")], t.png).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn status_handler(State(state): State<AppState>) -> Json<StatsReport> {
    Json(state.store.report())
}
