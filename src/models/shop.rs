use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::location::GeoJsonPoint;
use crate::models::request::ServiceCategory;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingHours {
    pub open: String,
    pub close: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShopRating {
    pub rater_id: Uuid,
    pub score: u8,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

/// A provider's business profile. Exactly one per provider account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shop {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub shop_name: String,
    pub services: Vec<ServiceCategory>,
    pub phone: String,
    pub email: String,
    pub address: String,
    pub location: GeoJsonPoint,
    pub ratings: Vec<ShopRating>,
    pub average_rating: f64,
    pub total_ratings: usize,
    pub is_verified: bool,
    pub is_online: bool,
    pub working_hours: Option<WorkingHours>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Shop {
    /// Recomputes the derived average from the rating list. Called after
    /// every append; the mean is kept to one decimal place.
    pub fn recompute_rating(&mut self) {
        if self.ratings.is_empty() {
            self.average_rating = 0.0;
            self.total_ratings = 0;
            return;
        }

        let sum: u32 = self.ratings.iter().map(|r| u32::from(r.score)).sum();
        let mean = sum as f64 / self.ratings.len() as f64;
        self.average_rating = (mean * 10.0).round() / 10.0;
        self.total_ratings = self.ratings.len();
    }

    pub fn offers(&self, category: ServiceCategory) -> bool {
        self.services.contains(&category)
    }
}
