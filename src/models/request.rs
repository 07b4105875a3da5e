use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::location::GeoJsonPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceCategory {
    TireRepair,
    BatteryJump,
    FuelDelivery,
    Towing,
    Lockout,
    Other,
}

impl ServiceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceCategory::TireRepair => "tire-repair",
            ServiceCategory::BatteryJump => "battery-jump",
            ServiceCategory::FuelDelivery => "fuel-delivery",
            ServiceCategory::Towing => "towing",
            ServiceCategory::Lockout => "lockout",
            ServiceCategory::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    Medium,
    High,
    Emergency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestStatus {
    Pending,
    Accepted,
    InProgress,
    Completed,
    Cancelled,
}

impl RequestStatus {
    /// Statuses a requester considers live: not yet completed or cancelled.
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            RequestStatus::Pending | RequestStatus::Accepted | RequestStatus::InProgress
        )
    }

    /// Statuses during which the assigned provider is on the job.
    pub fn is_in_service(&self) -> bool {
        matches!(self, RequestStatus::Accepted | RequestStatus::InProgress)
    }
}

/// Last-known position of the assigned provider, stamped by the location
/// tracker. Last write wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderFix {
    pub lat: f64,
    pub lng: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub id: Uuid,
    pub requester_id: Uuid,
    pub provider_id: Option<Uuid>,
    pub category: ServiceCategory,
    pub description: String,
    pub location: GeoJsonPoint,
    pub location_address: String,
    pub urgency: Urgency,
    pub status: RequestStatus,
    pub estimated_cost: f64,
    pub actual_cost: f64,
    pub estimated_arrival: Option<DateTime<Utc>>,
    pub actual_arrival: Option<DateTime<Utc>>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub provider_location: Option<ProviderFix>,
    pub rating: Option<u8>,
    pub review: Option<String>,
    pub rated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Flat fee charged on completion when the provider reports no cost.
pub const DEFAULT_COMPLETION_COST: f64 = 500.0;

/// Quoted cost by category, with a surcharge for high-urgency callouts.
pub fn estimated_cost(category: ServiceCategory, urgency: Urgency) -> f64 {
    let base = match category {
        ServiceCategory::TireRepair => 500.0,
        ServiceCategory::BatteryJump => 300.0,
        ServiceCategory::FuelDelivery => 200.0,
        ServiceCategory::Towing => 1_000.0,
        ServiceCategory::Lockout => 400.0,
        ServiceCategory::Other => 500.0,
    };

    let multiplier = if urgency == Urgency::High { 1.5 } else { 1.0 };
    base * multiplier
}
