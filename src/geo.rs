use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

/// Client payloads send coordinates either as numbers or as numeric strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CoordinateValue {
    Number(f64),
    Text(String),
}

impl CoordinateValue {
    fn parse(&self, field: &str) -> Result<f64, AppError> {
        let value = match self {
            CoordinateValue::Number(n) => *n,
            CoordinateValue::Text(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| AppError::InvalidCoordinate(format!("{} is not a number: {:?}", field, s)))?,
        };
        if !value.is_finite() {
            return Err(AppError::InvalidCoordinate(format!("{} is not finite", field)));
        }
        Ok(value)
    }
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, AppError> {
        if !latitude.is_finite() || !longitude.is_finite() {
            return Err(AppError::InvalidCoordinate("coordinate is not finite".to_string()));
        }
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(AppError::InvalidCoordinate(format!("latitude out of range: {}", latitude)));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(AppError::InvalidCoordinate(format!("longitude out of range: {}", longitude)));
        }
        Ok(Self { latitude, longitude })
    }

    /// Builds a coordinate from optional raw request fields.
    pub fn from_parts(
        latitude: Option<&CoordinateValue>,
        longitude: Option<&CoordinateValue>,
    ) -> Result<Self, AppError> {
        let latitude = latitude
            .ok_or_else(|| AppError::InvalidCoordinate("latitude is missing".to_string()))?
            .parse("latitude")?;
        let longitude = longitude
            .ok_or_else(|| AppError::InvalidCoordinate("longitude is missing".to_string()))?
            .parse("longitude")?;
        Self::new(latitude, longitude)
    }
}

/// Great-circle distance in meters (haversine).
pub fn distance(a: &Coordinate, b: &Coordinate) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * c
}

pub fn is_within_radius(point: &Coordinate, center: &Coordinate, radius_m: f64) -> bool {
    distance(point, center) <= radius_m
}
