use chrono::Utc;
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::{eta_minutes, haversine_km};
use crate::hub::{EventKind, Role};
use crate::models::location::GeoPoint;
use crate::models::request::{ProviderFix, ServiceRequest};
use crate::state::AppState;
use crate::store::UpdateOutcome;

/// Ingests one position sample. The shop position is overwritten
/// unconditionally (last write wins); when the provider holds an active job
/// the sample is also stamped on the request and a distance/ETA event goes
/// to the requester. Returns the request that was updated, if any.
pub fn report_location(
    state: &AppState,
    provider: Uuid,
    lat: f64,
    lng: f64,
) -> Result<Option<ServiceRequest>, AppError> {
    let now = Utc::now();
    let sample = GeoPoint { lat, lng };

    state
        .shops
        .update_by_provider(provider, |shop| {
            shop.location = sample.into();
            shop.updated_at = now;
        })
        .ok_or_else(|| AppError::NotFound("provider profile not found".to_string()))?;

    let active = state
        .requests
        .find_one(|r| r.provider_id == Some(provider) && r.status.is_in_service());

    let Some(active) = active else {
        debug!(provider_id = %provider, "location sample with no active job");
        return Ok(None);
    };

    // Re-checked under the entry lock: the job may have completed or been
    // cancelled since the scan. A stale sample is simply dropped.
    let outcome = state.requests.update_if(
        active.id,
        |r| r.provider_id == Some(provider) && r.status.is_in_service(),
        |r| {
            r.provider_location = Some(ProviderFix {
                lat,
                lng,
                timestamp: now,
            });
        },
    );

    let UpdateOutcome::Updated(request) = outcome else {
        debug!(request_id = %active.id, "active job closed before sample landed");
        return Ok(None);
    };

    let distance_km = haversine_km(&sample, &request.location.as_point());
    let eta = eta_minutes(distance_km);

    state.hub.publish_to(
        request.requester_id,
        Role::Requester,
        EventKind::MechanicLocation,
        json!({
            "request_id": request.id,
            "provider_id": provider,
            "location": { "lat": lat, "lng": lng },
            "distance_km": (distance_km * 10.0).round() / 10.0,
            "eta_minutes": eta,
            "timestamp": now,
        }),
    );

    Ok(Some(request))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use uuid::Uuid;

    use super::report_location;
    use crate::engine::lifecycle::{accept, create, NewRequestInput};
    use crate::error::AppError;
    use crate::hub::EventKind;
    use crate::models::location::{GeoPoint, LocationInput};
    use crate::models::request::ServiceCategory;
    use crate::models::shop::Shop;
    use crate::state::AppState;

    fn state() -> Arc<AppState> {
        Arc::new(AppState::new(64))
    }

    fn register_shop(state: &AppState, provider: Uuid) {
        state.shops.register(Shop {
            id: Uuid::new_v4(),
            provider_id: provider,
            shop_name: "Roadside Garage".to_string(),
            services: vec![ServiceCategory::Towing],
            phone: "555-0101".to_string(),
            email: "garage@example.com".to_string(),
            address: "Main Street".to_string(),
            location: GeoPoint { lat: 0.0, lng: 0.0 }.into(),
            ratings: Vec::new(),
            average_rating: 0.0,
            total_ratings: 0,
            is_verified: false,
            is_online: true,
            working_hours: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        });
    }

    #[test]
    fn sample_without_active_job_moves_only_the_shop() {
        let state = state();
        let provider = Uuid::new_v4();
        register_shop(&state, provider);

        let mut fallback = state.hub.subscribe_fallback();
        let touched = report_location(&state, provider, 12.97, 77.59).unwrap();

        assert!(touched.is_none());
        assert!(fallback.try_recv().is_err());

        let shop = state.shops.get_by_provider(provider).unwrap();
        assert_eq!(shop.location.coordinates, [77.59, 12.97]);
    }

    #[test]
    fn sample_with_active_job_stamps_request_and_emits_event() {
        let state = state();
        let provider = Uuid::new_v4();
        register_shop(&state, provider);

        let requester = Uuid::new_v4();
        let request = create(
            &state,
            requester,
            NewRequestInput {
                category: ServiceCategory::Towing,
                description: None,
                location: LocationInput::Text("12.9716,77.5946".to_string()),
                urgency: None,
                provider_id: None,
                shop_id: None,
            },
        )
        .unwrap();
        accept(&state, request.id, provider).unwrap();

        let mut fallback = state.hub.subscribe_fallback();
        let touched = report_location(&state, provider, 12.98, 77.60).unwrap().unwrap();

        let fix = touched.provider_location.unwrap();
        assert_eq!(fix.lat, 12.98);
        assert_eq!(fix.lng, 77.60);

        let event = fallback.try_recv().unwrap();
        assert_eq!(event.kind, EventKind::MechanicLocation);
        assert_eq!(event.for_account, Some(requester));
        assert!(event.payload["distance_km"].as_f64().unwrap() > 0.0);
        assert!(event.payload["eta_minutes"].as_u64().unwrap() > 0);
    }

    #[test]
    fn later_sample_overwrites_earlier_one() {
        let state = state();
        let provider = Uuid::new_v4();
        register_shop(&state, provider);

        report_location(&state, provider, 10.0, 10.0).unwrap();
        report_location(&state, provider, 11.0, 11.0).unwrap();

        let shop = state.shops.get_by_provider(provider).unwrap();
        assert_eq!(shop.location.coordinates, [11.0, 11.0]);
    }

    #[test]
    fn unregistered_provider_is_not_found() {
        let state = state();
        let err = report_location(&state, Uuid::new_v4(), 0.0, 0.0).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
