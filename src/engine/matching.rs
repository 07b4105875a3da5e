use serde::Serialize;
use uuid::Uuid;

use crate::engine::scoring::compute_score;
use crate::models::location::GeoPoint;
use crate::models::request::ServiceCategory;
use crate::store::ShopStore;

/// Provider summary returned to requesters, ranked by fit.
#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
    pub shop_id: Uuid,
    pub provider_id: Uuid,
    pub shop_name: String,
    pub address: String,
    pub services: Vec<ServiceCategory>,
    pub average_rating: f64,
    pub total_ratings: usize,
    pub distance_km: f64,
    pub score: f64,
}

/// Ranks every online shop for the given pickup point. A service mismatch
/// lowers the score but never excludes the shop; ties break by ascending
/// distance.
pub fn find_candidates(
    shops: &ShopStore,
    point: &GeoPoint,
    address: &str,
    category: ServiceCategory,
) -> Vec<Candidate> {
    let mut scored: Vec<(f64, f64, Candidate)> = shops
        .online()
        .into_iter()
        .map(|shop| {
            let (score, breakdown) = compute_score(point, address, category, &shop);
            let candidate = Candidate {
                shop_id: shop.id,
                provider_id: shop.provider_id,
                shop_name: shop.shop_name,
                address: shop.address,
                services: shop.services,
                average_rating: shop.average_rating,
                total_ratings: shop.total_ratings,
                distance_km: (breakdown.distance_km * 10.0).round() / 10.0,
                score,
            };
            (score, breakdown.distance_km, candidate)
        })
        .collect();

    // Ties on score break by the raw distance, not the rounded display value.
    scored.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.total_cmp(&b.1)));

    scored.into_iter().map(|(_, _, candidate)| candidate).collect()
}
