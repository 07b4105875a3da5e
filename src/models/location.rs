use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub const ORIGIN: GeoPoint = GeoPoint { lat: 0.0, lng: 0.0 };

    pub fn in_range(&self) -> bool {
        self.lat.abs() <= 90.0 && self.lng.abs() <= 180.0
    }
}

/// Geospatial-indexable point, longitude first. Matches the
/// `{type: "Point", coordinates: [lng, lat]}` layout the backing store
/// indexes on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoJsonPoint {
    #[serde(rename = "type")]
    pub kind: String,
    pub coordinates: [f64; 2],
}

impl From<GeoPoint> for GeoJsonPoint {
    fn from(point: GeoPoint) -> Self {
        Self {
            kind: "Point".to_string(),
            coordinates: [point.lng, point.lat],
        }
    }
}

impl GeoJsonPoint {
    pub fn as_point(&self) -> GeoPoint {
        GeoPoint {
            lat: self.coordinates[1],
            lng: self.coordinates[0],
        }
    }
}

/// Location as submitted by a client: either an explicit coordinate pair or
/// free text, where the text itself may be a `"lat,lng"` string or a street
/// address.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LocationInput {
    Coordinates { lat: f64, lng: f64 },
    Text(String),
}

#[derive(Debug, Clone)]
pub struct ResolvedLocation {
    pub point: GeoPoint,
    pub address: String,
}

impl LocationInput {
    /// Normalizes client input into one canonical point + address record.
    /// Unparseable or out-of-range coordinates degrade to the neutral origin
    /// rather than failing the request.
    pub fn resolve(&self) -> ResolvedLocation {
        let resolved = match self {
            LocationInput::Coordinates { lat, lng } => ResolvedLocation {
                point: GeoPoint {
                    lat: *lat,
                    lng: *lng,
                },
                address: format!("{lat}, {lng}"),
            },
            LocationInput::Text(text) if text.trim().is_empty() => ResolvedLocation {
                point: GeoPoint::ORIGIN,
                address: "Location not specified".to_string(),
            },
            LocationInput::Text(text) if text.contains(',') => match parse_coordinate_pair(text) {
                Some(point) => ResolvedLocation {
                    point,
                    address: text.clone(),
                },
                None => {
                    warn!(input = %text, "unparseable coordinate string, using neutral location");
                    ResolvedLocation {
                        point: GeoPoint::ORIGIN,
                        address: text.clone(),
                    }
                }
            },
            LocationInput::Text(text) => ResolvedLocation {
                point: GeoPoint::ORIGIN,
                address: text.clone(),
            },
        };

        if resolved.point != GeoPoint::ORIGIN && !resolved.point.in_range() {
            warn!(
                lat = resolved.point.lat,
                lng = resolved.point.lng,
                "coordinates out of range, using neutral location"
            );
            return ResolvedLocation {
                point: GeoPoint::ORIGIN,
                address: resolved.address,
            };
        }

        resolved
    }
}

fn parse_coordinate_pair(text: &str) -> Option<GeoPoint> {
    let parts: Vec<&str> = text.split(',').collect();
    if parts.len() != 2 {
        return None;
    }

    let lat = parts[0].trim().parse::<f64>().ok()?;
    let lng = parts[1].trim().parse::<f64>().ok()?;
    Some(GeoPoint { lat, lng })
}
