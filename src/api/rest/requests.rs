use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::rest::identity::Identity;
use crate::engine::lifecycle;
use crate::engine::matching::{find_candidates, Candidate};
use crate::error::AppError;
use crate::hub::Role;
use crate::models::request::{RequestStatus, ServiceRequest};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/requests", post(create_request))
        .route("/requests/history", get(history))
        .route("/requests/active", get(active))
        .route("/requests/open", get(open_worklist))
        .route("/requests/:id", get(get_request))
        .route("/requests/:id/candidates", get(candidates))
        .route("/requests/:id/accept", put(accept_request))
        .route("/requests/:id/decline", put(decline_request))
        .route("/requests/:id/start", put(start_request))
        .route("/requests/:id/complete", put(complete_request))
        .route("/requests/:id/cancel", put(cancel_request))
        .route("/requests/:id/rate", put(rate_request))
}

#[derive(Serialize)]
struct CreatedResponse {
    request: ServiceRequest,
    /// Human-readable echo of the normalized location.
    location: String,
}

async fn create_request(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Json(payload): Json<lifecycle::NewRequestInput>,
) -> Result<(StatusCode, Json<CreatedResponse>), AppError> {
    let identity = identity.require(Role::Requester)?;
    let request = lifecycle::create(&state, identity.account, payload)?;
    let location = request.location_address.clone();

    Ok((
        StatusCode::CREATED,
        Json(CreatedResponse { request, location }),
    ))
}

async fn get_request(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> Result<Json<ServiceRequest>, AppError> {
    let request = state
        .requests
        .get(id)
        .ok_or_else(|| AppError::NotFound(format!("request {id} not found")))?;

    let is_participant = request.requester_id == identity.account
        || request.provider_id == Some(identity.account);
    if !is_participant {
        return Err(AppError::Conflict("access denied".to_string()));
    }

    Ok(Json(request))
}

async fn history(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Json<Vec<ServiceRequest>> {
    let mut requests = match identity.role {
        Role::Requester => state.requests.find(|r| r.requester_id == identity.account),
        Role::Provider => state
            .requests
            .find(|r| r.provider_id == Some(identity.account)),
    };
    requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    Json(requests)
}

#[derive(Serialize)]
struct ActiveResponse {
    request: Option<ServiceRequest>,
}

async fn active(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Json<ActiveResponse> {
    let request = match identity.role {
        Role::Requester => state
            .requests
            .find_one(|r| r.requester_id == identity.account && r.status.is_open()),
        Role::Provider => state
            .requests
            .find_one(|r| r.provider_id == Some(identity.account) && r.status.is_in_service()),
    };

    Json(ActiveResponse { request })
}

/// Provider worklist: unassigned pending requests, pending requests targeted
/// at the caller, and the caller's active jobs.
async fn open_worklist(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<Json<Vec<ServiceRequest>>, AppError> {
    let identity = identity.require(Role::Provider)?;

    let mut requests = state.requests.find(|r| {
        let unclaimed_or_mine = r.provider_id.is_none() || r.provider_id == Some(identity.account);
        let pending_offer = r.status == RequestStatus::Pending && unclaimed_or_mine;
        let active_job =
            r.provider_id == Some(identity.account) && r.status.is_in_service();
        pending_offer || active_job
    });
    requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    Ok(Json(requests))
}

async fn candidates(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Candidate>>, AppError> {
    let request = state
        .requests
        .get(id)
        .ok_or_else(|| AppError::NotFound(format!("request {id} not found")))?;

    if request.requester_id != identity.account {
        return Err(AppError::Conflict("access denied".to_string()));
    }

    let ranked = find_candidates(
        &state.shops,
        &request.location.as_point(),
        &request.location_address,
        request.category,
    );

    Ok(Json(ranked))
}

async fn accept_request(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> Result<Json<ServiceRequest>, AppError> {
    let identity = identity.require(Role::Provider)?;
    let request = lifecycle::accept(&state, id, identity.account)?;
    Ok(Json(request))
}

#[derive(Serialize)]
struct MessageResponse {
    message: &'static str,
}

async fn decline_request(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, AppError> {
    let identity = identity.require(Role::Provider)?;
    lifecycle::decline(&state, id, identity.account)?;
    Ok(Json(MessageResponse {
        message: "request declined",
    }))
}

async fn start_request(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> Result<Json<ServiceRequest>, AppError> {
    let identity = identity.require(Role::Provider)?;
    let request = lifecycle::start(&state, id, identity.account)?;
    Ok(Json(request))
}

#[derive(Deserialize, Default)]
struct CompletePayload {
    cost: Option<f64>,
}

async fn complete_request(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<Uuid>,
    payload: Option<Json<CompletePayload>>,
) -> Result<Json<ServiceRequest>, AppError> {
    let identity = identity.require(Role::Provider)?;
    let cost = payload.map(|Json(p)| p.cost).unwrap_or_default();
    let request = lifecycle::complete(&state, id, identity.account, cost)?;
    Ok(Json(request))
}

async fn cancel_request(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> Result<Json<ServiceRequest>, AppError> {
    let request = lifecycle::cancel(&state, id, identity.account)?;
    Ok(Json(request))
}

#[derive(Deserialize)]
struct RatePayload {
    rating: u8,
    #[serde(default)]
    review: Option<String>,
}

async fn rate_request(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<Uuid>,
    Json(payload): Json<RatePayload>,
) -> Result<Json<ServiceRequest>, AppError> {
    let request = lifecycle::rate(&state, id, identity.account, payload.rating, payload.review)?;
    Ok(Json(request))
}
