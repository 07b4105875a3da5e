use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use roadside_dispatch::api::rest::router;
use roadside_dispatch::state::AppState;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

fn setup() -> (axum::Router, Arc<AppState>) {
    let state = Arc::new(AppState::new(64));
    (router(state.clone()), state)
}

fn request_with_identity(
    method: &str,
    uri: &str,
    account: Uuid,
    role: &str,
    body: Option<Value>,
) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-account-id", account.to_string())
        .header("x-account-role", role);

    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn register_shop(app: &axum::Router, provider: Uuid, name: &str, lat: f64, lng: f64) -> Value {
    let response = app
        .clone()
        .oneshot(request_with_identity(
            "POST",
            "/shops",
            provider,
            "provider",
            Some(json!({
                "shop_name": name,
                "services": ["towing", "tire-repair"],
                "phone": "555-0101",
                "email": "garage@example.com",
                "address": "Main Street, Downtown",
                "lat": lat,
                "lng": lng
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let shop = body_json(response).await;

    let response = app
        .clone()
        .oneshot(request_with_identity(
            "PATCH",
            "/shops/status",
            provider,
            "provider",
            Some(json!({ "is_online": true })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    shop
}

async fn create_towing_request(app: &axum::Router, requester: Uuid) -> Value {
    let response = app
        .clone()
        .oneshot(request_with_identity(
            "POST",
            "/requests",
            requester,
            "requester",
            Some(json!({
                "category": "towing",
                "location": "12.9716,77.5946"
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await
}

#[tokio::test]
async fn health_returns_ok() {
    let (app, _state) = setup();
    let response = app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["requests"], 0);
    assert_eq!(body["shops"], 0);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let (app, _state) = setup();
    let response = app.oneshot(get_request("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_string(response).await;
    assert!(body.contains("open_requests"));
    assert!(body.contains("connected_clients"));
}

#[tokio::test]
async fn create_request_stores_longitude_first() {
    let (app, _state) = setup();
    let body = create_towing_request(&app, Uuid::new_v4()).await;

    let request = &body["request"];
    assert_eq!(request["status"], "pending");
    assert_eq!(request["location"]["type"], "Point");
    assert_eq!(request["location"]["coordinates"][0], 77.5946);
    assert_eq!(request["location"]["coordinates"][1], 12.9716);
    assert_eq!(request["description"], "towing service requested");
    assert_eq!(request["urgency"], "medium");
    assert_eq!(request["estimated_cost"], 1000.0);
    assert_eq!(body["location"], "12.9716,77.5946");
}

#[tokio::test]
async fn create_request_with_plain_address_degrades_to_neutral_point() {
    let (app, _state) = setup();
    let response = app
        .oneshot(request_with_identity(
            "POST",
            "/requests",
            Uuid::new_v4(),
            "requester",
            Some(json!({
                "category": "lockout",
                "location": "Oak Avenue, North District",
                "urgency": "high"
            })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);

    let body = body_json(response).await;
    let request = &body["request"];
    assert_eq!(request["location"]["coordinates"][0], 0.0);
    assert_eq!(request["location"]["coordinates"][1], 0.0);
    assert_eq!(request["location_address"], "Oak Avenue, North District");
    // lockout base 400 with the high-urgency surcharge
    assert_eq!(request["estimated_cost"], 600.0);
}

#[tokio::test]
async fn create_request_without_identity_is_rejected() {
    let (app, _state) = setup();
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/requests")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::to_string(&json!({
                        "category": "towing",
                        "location": "12.9,77.5"
                    }))
                    .unwrap(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn create_request_with_unknown_target_is_not_found() {
    let (app, _state) = setup();
    let response = app
        .oneshot(request_with_identity(
            "POST",
            "/requests",
            Uuid::new_v4(),
            "requester",
            Some(json!({
                "category": "towing",
                "location": "12.9,77.5",
                "provider_id": Uuid::new_v4()
            })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn second_shop_for_same_provider_is_conflict() {
    let (app, _state) = setup();
    let provider = Uuid::new_v4();
    register_shop(&app, provider, "First Garage", 12.97, 77.59).await;

    let response = app
        .oneshot(request_with_identity(
            "POST",
            "/shops",
            provider,
            "provider",
            Some(json!({
                "shop_name": "Second Garage",
                "services": ["towing"],
                "phone": "555-0102",
                "email": "second@example.com",
                "address": "Elsewhere"
            })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn shop_without_services_is_rejected() {
    let (app, _state) = setup();
    let response = app
        .oneshot(request_with_identity(
            "POST",
            "/shops",
            Uuid::new_v4(),
            "provider",
            Some(json!({
                "shop_name": "No Services",
                "services": [],
                "phone": "555-0103",
                "email": "none@example.com",
                "address": "Nowhere"
            })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn search_requires_point_and_category() {
    let (app, _state) = setup();
    let response = app
        .oneshot(get_request("/shops/search?lat=12.97"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn search_ranks_service_match_above_closer_mismatch() {
    let (app, _state) = setup();

    // A offers towing ~2 km away.
    let provider_a = Uuid::new_v4();
    register_shop(&app, provider_a, "Tow Town", 0.018, 0.0).await;

    // B is closer (~0.5 km) but does not offer towing.
    let provider_b = Uuid::new_v4();
    let response = app
        .clone()
        .oneshot(request_with_identity(
            "POST",
            "/shops",
            provider_b,
            "provider",
            Some(json!({
                "shop_name": "Lockout Lane",
                "services": ["lockout"],
                "phone": "555-0104",
                "email": "lockout@example.com",
                "address": "Main Street",
                "lat": 0.0045,
                "lng": 0.0
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let response = app
        .clone()
        .oneshot(request_with_identity(
            "PATCH",
            "/shops/status",
            provider_b,
            "provider",
            Some(json!({ "is_online": true })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(get_request("/shops/search?lat=0.0&lng=0.0&category=towing"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let ranked = body_json(response).await;
    let list = ranked.as_array().unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0]["shop_name"], "Tow Town");
    assert_eq!(list[1]["shop_name"], "Lockout Lane");
    assert!(list[0]["score"].as_f64().unwrap() > list[1]["score"].as_f64().unwrap());
}

#[tokio::test]
async fn accept_is_first_winner_takes_all() {
    let (app, _state) = setup();
    let body = create_towing_request(&app, Uuid::new_v4()).await;
    let request_id = body["request"]["id"].as_str().unwrap().to_string();

    let winner = Uuid::new_v4();
    let response = app
        .clone()
        .oneshot(request_with_identity(
            "PUT",
            &format!("/requests/{request_id}/accept"),
            winner,
            "provider",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let accepted = body_json(response).await;
    assert_eq!(accepted["status"], "accepted");
    assert_eq!(accepted["provider_id"], winner.to_string());
    assert!(accepted["estimated_arrival"].is_string());
    assert!(accepted["accepted_at"].is_string());

    // A racing provider loses with a conflict and the record is unchanged.
    let response = app
        .clone()
        .oneshot(request_with_identity(
            "PUT",
            &format!("/requests/{request_id}/accept"),
            Uuid::new_v4(),
            "provider",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .oneshot(request_with_identity(
            "GET",
            &format!("/requests/{request_id}"),
            winner,
            "provider",
            None,
        ))
        .await
        .unwrap();
    let stored = body_json(response).await;
    assert_eq!(stored["provider_id"], winner.to_string());
}

#[tokio::test]
async fn decline_leaves_request_available() {
    let (app, _state) = setup();
    let body = create_towing_request(&app, Uuid::new_v4()).await;
    let request_id = body["request"]["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(request_with_identity(
            "PUT",
            &format!("/requests/{request_id}/decline"),
            Uuid::new_v4(),
            "provider",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Someone else can still accept.
    let response = app
        .oneshot(request_with_identity(
            "PUT",
            &format!("/requests/{request_id}/accept"),
            Uuid::new_v4(),
            "provider",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn complete_by_stranger_is_conflict() {
    let (app, _state) = setup();
    let body = create_towing_request(&app, Uuid::new_v4()).await;
    let request_id = body["request"]["id"].as_str().unwrap().to_string();

    let assigned = Uuid::new_v4();
    app.clone()
        .oneshot(request_with_identity(
            "PUT",
            &format!("/requests/{request_id}/accept"),
            assigned,
            "provider",
            None,
        ))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(request_with_identity(
            "PUT",
            &format!("/requests/{request_id}/complete"),
            Uuid::new_v4(),
            "provider",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .oneshot(request_with_identity(
            "GET",
            &format!("/requests/{request_id}"),
            assigned,
            "provider",
            None,
        ))
        .await
        .unwrap();
    let stored = body_json(response).await;
    assert_eq!(stored["status"], "accepted");
}

#[tokio::test]
async fn cancel_requires_ownership() {
    let (app, _state) = setup();
    let requester = Uuid::new_v4();
    let body = create_towing_request(&app, requester).await;
    let request_id = body["request"]["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(request_with_identity(
            "PUT",
            &format!("/requests/{request_id}/cancel"),
            Uuid::new_v4(),
            "requester",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .oneshot(request_with_identity(
            "PUT",
            &format!("/requests/{request_id}/cancel"),
            requester,
            "requester",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let cancelled = body_json(response).await;
    assert_eq!(cancelled["status"], "cancelled");
    assert!(cancelled["cancelled_at"].is_string());
}

#[tokio::test]
async fn stranger_cannot_view_request() {
    let (app, _state) = setup();
    let body = create_towing_request(&app, Uuid::new_v4()).await;
    let request_id = body["request"]["id"].as_str().unwrap().to_string();

    let response = app
        .oneshot(request_with_identity(
            "GET",
            &format!("/requests/{request_id}"),
            Uuid::new_v4(),
            "requester",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn full_job_flow_with_single_rating() {
    let (app, _state) = setup();
    let requester = Uuid::new_v4();
    let provider = Uuid::new_v4();
    register_shop(&app, provider, "Roadside Garage", 12.98, 77.60).await;

    let body = create_towing_request(&app, requester).await;
    let request_id = body["request"]["id"].as_str().unwrap().to_string();

    for step in ["accept", "start"] {
        let response = app
            .clone()
            .oneshot(request_with_identity(
                "PUT",
                &format!("/requests/{request_id}/{step}"),
                provider,
                "provider",
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .clone()
        .oneshot(request_with_identity(
            "PUT",
            &format!("/requests/{request_id}/complete"),
            provider,
            "provider",
            Some(json!({ "cost": 1200.0 })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let completed = body_json(response).await;
    assert_eq!(completed["status"], "completed");
    assert_eq!(completed["actual_cost"], 1200.0);

    let response = app
        .clone()
        .oneshot(request_with_identity(
            "PUT",
            &format!("/requests/{request_id}/rate"),
            requester,
            "requester",
            Some(json!({ "rating": 4, "review": "fast arrival" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let rated = body_json(response).await;
    assert_eq!(rated["rating"], 4);

    // A second rating never lands.
    let response = app
        .clone()
        .oneshot(request_with_identity(
            "PUT",
            &format!("/requests/{request_id}/rate"),
            requester,
            "requester",
            Some(json!({ "rating": 1 })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .oneshot(request_with_identity(
            "GET",
            "/shops/stats",
            provider,
            "provider",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let stats = body_json(response).await;
    assert_eq!(stats["completed_jobs"], 1);
    assert_eq!(stats["total_earnings"], 1200.0);
    assert_eq!(stats["rating"], 4.0);
}

#[tokio::test]
async fn location_sample_tracks_only_active_jobs() {
    let (app, _state) = setup();
    let provider = Uuid::new_v4();
    register_shop(&app, provider, "Roadside Garage", 12.98, 77.60).await;

    // No active job yet: only the shop moves.
    let response = app
        .clone()
        .oneshot(request_with_identity(
            "PUT",
            "/shops/location",
            provider,
            "provider",
            Some(json!({ "lat": 12.99, "lng": 77.61 })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let ack = body_json(response).await;
    assert_eq!(ack["tracking"], false);
    assert!(ack["request_id"].is_null());

    let requester = Uuid::new_v4();
    let body = create_towing_request(&app, requester).await;
    let request_id = body["request"]["id"].as_str().unwrap().to_string();
    app.clone()
        .oneshot(request_with_identity(
            "PUT",
            &format!("/requests/{request_id}/accept"),
            provider,
            "provider",
            None,
        ))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(request_with_identity(
            "PUT",
            "/shops/location",
            provider,
            "provider",
            Some(json!({ "lat": 12.975, "lng": 77.596 })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let ack = body_json(response).await;
    assert_eq!(ack["tracking"], true);
    assert_eq!(ack["request_id"], request_id);

    let response = app
        .oneshot(request_with_identity(
            "GET",
            &format!("/requests/{request_id}"),
            requester,
            "requester",
            None,
        ))
        .await
        .unwrap();
    let stored = body_json(response).await;
    assert_eq!(stored["provider_location"]["lat"], 12.975);
    assert_eq!(stored["provider_location"]["lng"], 77.596);
}

#[tokio::test]
async fn candidates_are_ranked_for_the_requester() {
    let (app, _state) = setup();
    let provider = Uuid::new_v4();
    register_shop(&app, provider, "Tow Town", 12.98, 77.60).await;

    let requester = Uuid::new_v4();
    let body = create_towing_request(&app, requester).await;
    let request_id = body["request"]["id"].as_str().unwrap().to_string();

    let response = app
        .oneshot(request_with_identity(
            "GET",
            &format!("/requests/{request_id}/candidates"),
            requester,
            "requester",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let ranked = body_json(response).await;
    let list = ranked.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["shop_name"], "Tow Town");
    assert_eq!(list[0]["provider_id"], provider.to_string());
    assert!(list[0]["score"].as_f64().unwrap() > 100.0);
}

#[tokio::test]
async fn provider_worklist_shows_open_offers_and_active_jobs() {
    let (app, _state) = setup();
    let provider = Uuid::new_v4();

    let first = create_towing_request(&app, Uuid::new_v4()).await;
    let second = create_towing_request(&app, Uuid::new_v4()).await;
    let second_id = second["request"]["id"].as_str().unwrap().to_string();

    app.clone()
        .oneshot(request_with_identity(
            "PUT",
            &format!("/requests/{second_id}/accept"),
            provider,
            "provider",
            None,
        ))
        .await
        .unwrap();

    let response = app
        .oneshot(request_with_identity(
            "GET",
            "/requests/open",
            provider,
            "provider",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let worklist = body_json(response).await;
    let ids: Vec<&str> = worklist
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_str().unwrap())
        .collect();

    assert!(ids.contains(&first["request"]["id"].as_str().unwrap()));
    assert!(ids.contains(&second_id.as_str()));
}
