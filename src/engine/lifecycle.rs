use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::hub::{EventKind, Role};
use crate::models::location::LocationInput;
use crate::models::request::{
    estimated_cost, RequestStatus, ServiceCategory, ServiceRequest, Urgency,
    DEFAULT_COMPLETION_COST,
};
use crate::models::shop::ShopRating;
use crate::state::AppState;
use crate::store::UpdateOutcome;

const ESTIMATED_ARRIVAL_MINUTES: i64 = 30;

#[derive(Debug, Deserialize)]
pub struct NewRequestInput {
    pub category: ServiceCategory,
    #[serde(default)]
    pub description: Option<String>,
    pub location: LocationInput,
    #[serde(default)]
    pub urgency: Option<Urgency>,
    #[serde(default)]
    pub provider_id: Option<Uuid>,
    #[serde(default)]
    pub shop_id: Option<Uuid>,
}

/// Creates a pending request and dispatches the offer: a pre-targeted
/// provider gets a direct notification, otherwise the offer is broadcast to
/// every connected provider.
pub fn create(
    state: &AppState,
    requester: Uuid,
    input: NewRequestInput,
) -> Result<ServiceRequest, AppError> {
    let target = resolve_target(state, requester, &input)?;
    let resolved = input.location.resolve();

    let description = match input.description {
        Some(text) if !text.trim().is_empty() => text,
        _ => format!("{} service requested", input.category.as_str()),
    };
    let urgency = input.urgency.unwrap_or(Urgency::Medium);

    let request = ServiceRequest {
        id: Uuid::new_v4(),
        requester_id: requester,
        provider_id: target,
        category: input.category,
        description,
        location: resolved.point.into(),
        location_address: resolved.address,
        urgency,
        status: RequestStatus::Pending,
        estimated_cost: estimated_cost(input.category, urgency),
        actual_cost: 0.0,
        estimated_arrival: None,
        actual_arrival: None,
        accepted_at: None,
        completed_at: None,
        cancelled_at: None,
        provider_location: None,
        rating: None,
        review: None,
        rated_at: None,
        created_at: Utc::now(),
    };

    state.requests.insert(request.clone());
    state
        .metrics
        .requests_created_total
        .with_label_values(&[request.category.as_str()])
        .inc();
    state.metrics.open_requests.inc();

    let offer = json!({
        "request_id": request.id,
        "category": request.category,
        "description": request.description,
        "location": request.location_address,
        "urgency": request.urgency,
        "estimated_cost": request.estimated_cost,
        "created_at": request.created_at,
    });

    match target {
        Some(provider) => {
            state
                .hub
                .publish_to(provider, Role::Provider, EventKind::NewRequest, offer);
        }
        None => {
            state
                .hub
                .publish_broadcast(Role::Provider, EventKind::NewRequest, offer);
        }
    }

    info!(request_id = %request.id, category = request.category.as_str(), "request created");
    Ok(request)
}

/// Resolves a direct-target reference to a provider account. A target that
/// matches the requester is dropped rather than rejected.
fn resolve_target(
    state: &AppState,
    requester: Uuid,
    input: &NewRequestInput,
) -> Result<Option<Uuid>, AppError> {
    let target = if let Some(shop_id) = input.shop_id {
        let shop = state
            .shops
            .get(shop_id)
            .ok_or_else(|| AppError::NotFound("shop not found or no provider assigned".to_string()))?;
        Some(shop.provider_id)
    } else if let Some(provider_id) = input.provider_id {
        state
            .shops
            .get_by_provider(provider_id)
            .ok_or_else(|| AppError::NotFound("provider not found".to_string()))?;
        Some(provider_id)
    } else {
        None
    };

    Ok(target.filter(|t| *t != requester))
}

/// The critical race: one conditional update, at most one winner. Losers see
/// the same "not found or already accepted" outcome whether the id is
/// unknown or the request was taken first.
pub fn accept(state: &AppState, request_id: Uuid, provider: Uuid) -> Result<ServiceRequest, AppError> {
    let now = Utc::now();
    let outcome = state.requests.update_if(
        request_id,
        |r| {
            r.status == RequestStatus::Pending
                && r.provider_id.map_or(true, |targeted| targeted == provider)
        },
        |r| {
            r.provider_id = Some(provider);
            r.status = RequestStatus::Accepted;
            r.accepted_at = Some(now);
            r.estimated_arrival = Some(now + Duration::minutes(ESTIMATED_ARRIVAL_MINUTES));
        },
    );

    match outcome {
        UpdateOutcome::Updated(request) => {
            state
                .metrics
                .accept_attempts_total
                .with_label_values(&["won"])
                .inc();

            state.hub.publish_to(
                request.requester_id,
                Role::Requester,
                EventKind::RequestAccepted,
                json!({
                    "request_id": request.id,
                    "provider_id": provider,
                    "estimated_arrival": request.estimated_arrival,
                }),
            );

            info!(request_id = %request.id, provider_id = %provider, "request accepted");
            Ok(request)
        }
        UpdateOutcome::PreconditionFailed => {
            state
                .metrics
                .accept_attempts_total
                .with_label_values(&["lost"])
                .inc();
            Err(AppError::Conflict(
                "request not found or already accepted".to_string(),
            ))
        }
        UpdateOutcome::Missing => {
            state
                .metrics
                .accept_attempts_total
                .with_label_values(&["missing"])
                .inc();
            Err(AppError::NotFound("request not found".to_string()))
        }
    }
}

/// Signals disinterest without mutating the request; it stays pending for
/// other candidates.
pub fn decline(state: &AppState, request_id: Uuid, _provider: Uuid) -> Result<(), AppError> {
    let request = state
        .requests
        .get(request_id)
        .ok_or_else(|| AppError::NotFound("request not found".to_string()))?;

    if request.status != RequestStatus::Pending {
        return Err(AppError::Conflict(
            "request is no longer available".to_string(),
        ));
    }

    Ok(())
}

pub fn start(state: &AppState, request_id: Uuid, provider: Uuid) -> Result<ServiceRequest, AppError> {
    let now = Utc::now();
    let outcome = state.requests.update_if(
        request_id,
        |r| r.provider_id == Some(provider) && r.status == RequestStatus::Accepted,
        |r| {
            r.status = RequestStatus::InProgress;
            r.actual_arrival = Some(now);
        },
    );

    match outcome {
        UpdateOutcome::Updated(request) => {
            state.hub.publish_to(
                request.requester_id,
                Role::Requester,
                EventKind::StatusUpdate,
                json!({
                    "request_id": request.id,
                    "status": request.status,
                }),
            );
            Ok(request)
        }
        UpdateOutcome::PreconditionFailed => Err(AppError::Conflict(
            "job is not yours to start or not accepted".to_string(),
        )),
        UpdateOutcome::Missing => Err(AppError::NotFound("request not found".to_string())),
    }
}

pub fn complete(
    state: &AppState,
    request_id: Uuid,
    provider: Uuid,
    cost: Option<f64>,
) -> Result<ServiceRequest, AppError> {
    let outcome = state.requests.update_if(
        request_id,
        |r| r.provider_id == Some(provider) && r.status.is_in_service(),
        |r| {
            r.status = RequestStatus::Completed;
            r.completed_at = Some(Utc::now());
            r.actual_cost = cost.unwrap_or(DEFAULT_COMPLETION_COST);
        },
    );

    match outcome {
        UpdateOutcome::Updated(request) => {
            state.metrics.open_requests.dec();

            state.hub.publish_to(
                request.requester_id,
                Role::Requester,
                EventKind::JobCompleted,
                json!({
                    "request_id": request.id,
                    "provider_id": provider,
                    "actual_cost": request.actual_cost,
                }),
            );

            info!(request_id = %request.id, provider_id = %provider, "job completed");
            Ok(request)
        }
        UpdateOutcome::PreconditionFailed => Err(AppError::Conflict(
            "request not found or not your active job".to_string(),
        )),
        UpdateOutcome::Missing => Err(AppError::NotFound("request not found".to_string())),
    }
}

/// Requester privilege; races harmlessly against an in-flight accept. The
/// losing writer observes a conflict, never a corrupt record.
pub fn cancel(state: &AppState, request_id: Uuid, requester: Uuid) -> Result<ServiceRequest, AppError> {
    let outcome = state.requests.update_if(
        request_id,
        |r| r.requester_id == requester && r.status.is_open(),
        |r| {
            r.status = RequestStatus::Cancelled;
            r.cancelled_at = Some(Utc::now());
        },
    );

    match outcome {
        UpdateOutcome::Updated(request) => {
            state.metrics.open_requests.dec();

            if let Some(provider) = request.provider_id {
                state.hub.publish_to(
                    provider,
                    Role::Provider,
                    EventKind::RequestCancelled,
                    json!({
                        "request_id": request.id,
                        "category": request.category,
                        "requester_id": request.requester_id,
                    }),
                );
            }

            info!(request_id = %request.id, "request cancelled");
            Ok(request)
        }
        UpdateOutcome::PreconditionFailed => Err(AppError::Conflict(
            "request not found or cannot be cancelled".to_string(),
        )),
        UpdateOutcome::Missing => Err(AppError::NotFound("request not found".to_string())),
    }
}

/// The one operation touching two aggregates. The provider's shop is
/// resolved before the request is written, so a committed rating always has
/// its provider-side record.
pub fn rate(
    state: &AppState,
    request_id: Uuid,
    requester: Uuid,
    score: u8,
    review: Option<String>,
) -> Result<ServiceRequest, AppError> {
    if !(1..=5).contains(&score) {
        return Err(AppError::Validation(
            "rating must be between 1 and 5".to_string(),
        ));
    }

    let request = state
        .requests
        .get(request_id)
        .ok_or_else(|| AppError::NotFound("request not found".to_string()))?;
    let provider = request.provider_id.ok_or_else(|| {
        AppError::Conflict("request has no assigned provider".to_string())
    })?;
    state
        .shops
        .get_by_provider(provider)
        .ok_or_else(|| AppError::NotFound("provider profile not found".to_string()))?;

    let review_text = review.unwrap_or_default();
    let outcome = state.requests.update_if(
        request_id,
        |r| {
            r.requester_id == requester
                && r.status == RequestStatus::Completed
                && r.rating.is_none()
        },
        |r| {
            r.rating = Some(score);
            r.review = Some(review_text.clone());
            r.rated_at = Some(Utc::now());
        },
    );

    match outcome {
        UpdateOutcome::Updated(request) => {
            let review_text = request.review.clone().unwrap_or_default();
            state.shops.update_by_provider(provider, |shop| {
                shop.ratings.push(ShopRating {
                    rater_id: requester,
                    score,
                    comment: review_text.clone(),
                    created_at: Utc::now(),
                });
                shop.recompute_rating();
                shop.updated_at = Utc::now();
            });

            info!(request_id = %request.id, score, "rating recorded");
            Ok(request)
        }
        UpdateOutcome::PreconditionFailed => Err(AppError::Conflict(
            "request not found or already rated".to_string(),
        )),
        UpdateOutcome::Missing => Err(AppError::NotFound("request not found".to_string())),
    }
}
