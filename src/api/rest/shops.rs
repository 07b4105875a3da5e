use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::{get, patch, post, put};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::rest::identity::Identity;
use crate::engine::matching::{find_candidates, Candidate};
use crate::engine::tracker;
use crate::error::AppError;
use crate::geo::haversine_km;
use crate::hub::Role;
use crate::models::location::{GeoPoint, LocationInput};
use crate::models::request::{RequestStatus, ServiceCategory};
use crate::models::shop::{Shop, WorkingHours};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/shops", post(create_shop).get(list_shops))
        .route("/shops/search", get(search_shops))
        .route("/shops/stats", get(shop_stats))
        .route("/shops/status", patch(update_status))
        .route("/shops/location", put(report_location))
}

#[derive(Deserialize)]
pub struct CreateShopPayload {
    pub shop_name: String,
    pub services: Vec<ServiceCategory>,
    pub phone: String,
    pub email: String,
    pub address: String,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    #[serde(default)]
    pub working_hours: Option<WorkingHours>,
}

async fn create_shop(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Json(payload): Json<CreateShopPayload>,
) -> Result<Json<Shop>, AppError> {
    let identity = identity.require(Role::Provider)?;

    if payload.shop_name.trim().is_empty() {
        return Err(AppError::Validation("shop name cannot be empty".to_string()));
    }
    if payload.services.is_empty() {
        return Err(AppError::Validation(
            "at least one service must be offered".to_string(),
        ));
    }

    let point = match (payload.lat, payload.lng) {
        (Some(lat), Some(lng)) => LocationInput::Coordinates { lat, lng }.resolve().point,
        _ => GeoPoint::ORIGIN,
    };

    let now = Utc::now();
    let shop = Shop {
        id: Uuid::new_v4(),
        provider_id: identity.account,
        shop_name: payload.shop_name,
        services: payload.services,
        phone: payload.phone,
        email: payload.email,
        address: payload.address,
        location: point.into(),
        ratings: Vec::new(),
        average_rating: 0.0,
        total_ratings: 0,
        is_verified: false,
        is_online: false,
        working_hours: payload.working_hours,
        created_at: now,
        updated_at: now,
    };

    if !state.shops.register(shop.clone()) {
        return Err(AppError::Conflict(
            "provider already has a shop profile".to_string(),
        ));
    }

    Ok(Json(shop))
}

#[derive(Deserialize)]
struct NearbyQuery {
    lat: Option<f64>,
    lng: Option<f64>,
}

#[derive(Serialize)]
struct ShopSummary {
    #[serde(flatten)]
    shop: Shop,
    #[serde(skip_serializing_if = "Option::is_none")]
    distance_km: Option<f64>,
}

/// Every shop, nearest first when the caller supplies a point.
async fn list_shops(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NearbyQuery>,
) -> Json<Vec<ShopSummary>> {
    let origin = match (query.lat, query.lng) {
        (Some(lat), Some(lng)) => Some(GeoPoint { lat, lng }),
        _ => None,
    };

    let mut shops: Vec<ShopSummary> = state
        .shops
        .list()
        .into_iter()
        .map(|shop| {
            let distance_km = origin.map(|from| {
                let d = haversine_km(&from, &shop.location.as_point());
                (d * 10.0).round() / 10.0
            });
            ShopSummary { shop, distance_km }
        })
        .collect();

    if origin.is_some() {
        shops.sort_by(|a, b| {
            a.distance_km
                .unwrap_or(f64::MAX)
                .total_cmp(&b.distance_km.unwrap_or(f64::MAX))
        });
    }

    Json(shops)
}

#[derive(Deserialize)]
struct SearchQuery {
    lat: Option<f64>,
    lng: Option<f64>,
    category: Option<ServiceCategory>,
    #[serde(default)]
    query: Option<String>,
}

async fn search_shops(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<Vec<Candidate>>, AppError> {
    let (Some(lat), Some(lng), Some(category)) = (params.lat, params.lng, params.category) else {
        return Err(AppError::Validation(
            "latitude, longitude, and category are required".to_string(),
        ));
    };

    let ranked = find_candidates(
        &state.shops,
        &GeoPoint { lat, lng },
        params.query.as_deref().unwrap_or(""),
        category,
    );

    Ok(Json(ranked))
}

#[derive(Serialize)]
struct ShopStats {
    total_jobs: usize,
    completed_jobs: usize,
    total_earnings: f64,
    rating: f64,
}

async fn shop_stats(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<Json<ShopStats>, AppError> {
    let identity = identity.require(Role::Provider)?;
    let shop = state
        .shops
        .get_by_provider(identity.account)
        .ok_or_else(|| AppError::NotFound("shop not found, complete shop setup".to_string()))?;

    let jobs = state
        .requests
        .find(|r| r.provider_id == Some(identity.account));
    let completed: Vec<_> = jobs
        .iter()
        .filter(|r| r.status == RequestStatus::Completed)
        .collect();
    let total_earnings = completed.iter().map(|r| r.actual_cost).sum();

    let rating = if shop.total_ratings == 0 {
        5.0
    } else {
        shop.average_rating
    };

    Ok(Json(ShopStats {
        total_jobs: jobs.len(),
        completed_jobs: completed.len(),
        total_earnings,
        rating,
    }))
}

#[derive(Deserialize)]
struct StatusPayload {
    is_online: bool,
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Json(payload): Json<StatusPayload>,
) -> Result<Json<Shop>, AppError> {
    let identity = identity.require(Role::Provider)?;

    let shop = state
        .shops
        .update_by_provider(identity.account, |shop| {
            shop.is_online = payload.is_online;
            shop.updated_at = Utc::now();
        })
        .ok_or_else(|| AppError::NotFound("shop not found, complete shop setup".to_string()))?;

    Ok(Json(shop))
}

#[derive(Deserialize)]
struct LocationPayload {
    lat: f64,
    lng: f64,
}

#[derive(Serialize)]
struct LocationAck {
    /// True when the sample landed on an active job and the requester was
    /// notified.
    tracking: bool,
    request_id: Option<Uuid>,
}

async fn report_location(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Json(payload): Json<LocationPayload>,
) -> Result<Json<LocationAck>, AppError> {
    let identity = identity.require(Role::Provider)?;
    let touched = tracker::report_location(&state, identity.account, payload.lat, payload.lng)?;

    Ok(Json(LocationAck {
        tracking: touched.is_some(),
        request_id: touched.map(|r| r.id),
    }))
}
