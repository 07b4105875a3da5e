use serde::Serialize;

use crate::geo::haversine_km;
use crate::models::location::GeoPoint;
use crate::models::request::ServiceCategory;
use crate::models::shop::Shop;

const SERVICE_MATCH_BONUS: f64 = 100.0;
const PROXIMITY_CUTOFF_KM: f64 = 50.0;
const TOKEN_MATCH_BONUS: f64 = 10.0;
const PLACE_MATCH_BONUS: f64 = 20.0;

/// Area names that identify the same neighborhood even when the raw address
/// strings differ.
const GAZETTEER: &[&str] = &[
    "downtown",
    "uptown",
    "midtown",
    "westside",
    "eastside",
    "southside",
    "northside",
    "city center",
    "old town",
    "riverside",
];

#[derive(Debug, Clone, Serialize)]
pub struct ScoreBreakdown {
    pub service_score: f64,
    pub proximity_score: f64,
    pub address_score: f64,
    pub distance_km: f64,
}

/// Scores a (request, shop) fit. Pure: identical inputs always produce the
/// identical score.
pub fn compute_score(
    point: &GeoPoint,
    address: &str,
    category: ServiceCategory,
    shop: &Shop,
) -> (f64, ScoreBreakdown) {
    let distance_km = haversine_km(point, &shop.location.as_point());

    let breakdown = ScoreBreakdown {
        service_score: service_score(category, shop),
        proximity_score: proximity_score(distance_km),
        address_score: address_score(address, &shop.address),
        distance_km,
    };

    let score = breakdown.service_score + breakdown.proximity_score + breakdown.address_score;
    (score, breakdown)
}

fn service_score(category: ServiceCategory, shop: &Shop) -> f64 {
    if shop.offers(category) {
        SERVICE_MATCH_BONUS
    } else {
        0.0
    }
}

fn proximity_score(distance_km: f64) -> f64 {
    (PROXIMITY_CUTOFF_KM - distance_km).max(0.0)
}

fn address_score(request_address: &str, shop_address: &str) -> f64 {
    let request_lower = request_address.to_lowercase();
    let shop_lower = shop_address.to_lowercase();

    let mut score = 0.0;
    for token in request_lower.split(|c: char| c.is_whitespace() || c == ',') {
        if token.chars().count() <= 2 {
            continue;
        }
        if shop_lower.contains(token) {
            score += TOKEN_MATCH_BONUS;
        }
    }

    let same_place = GAZETTEER
        .iter()
        .any(|place| request_lower.contains(place) && shop_lower.contains(place));
    if same_place {
        score += PLACE_MATCH_BONUS;
    }

    score
}
