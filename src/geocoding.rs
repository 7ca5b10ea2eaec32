//! Best-effort geocoding of recognized place names.

use crate::config::Config;
use crate::google::format_endpoint;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Number of locations looked up per execution.
pub const MAX_GEOCODED_LOCATIONS: usize = 5;

/// Coordinates resolved for a single location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationCoordinate {
    /// Location text as recognized in the document.
    pub name: String,
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
    /// Address returned by the geocoding service.
    pub formatted_address: String,
}

/// Per-location lookup failure.
#[derive(Debug, Error)]
pub enum GeocodingError {
    /// Transport or decode failure.
    #[error("Geocoding request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The service answered with a non-2xx status.
    #[error("Geocoding service returned {status}: {body}")]
    UnexpectedStatus {
        /// HTTP status code.
        status: StatusCode,
        /// Response body for diagnostics.
        body: String,
    },
    /// The service reported a non-OK status such as `ZERO_RESULTS`.
    #[error("Geocoding status {0}")]
    NoMatch(String),
}

/// Resolves a free-text address to coordinates.
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Look up `address`.
    async fn geocode(&self, address: &str) -> Result<LocationCoordinate, GeocodingError>;
}

#[derive(Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Deserialize)]
struct GeocodeResult {
    formatted_address: String,
    geometry: Geometry,
}

#[derive(Deserialize)]
struct Geometry {
    location: LatLng,
}

#[derive(Deserialize)]
struct LatLng {
    lat: f64,
    lng: f64,
}

/// Google Maps Geocoding API client.
pub struct GoogleGeocoder {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) api_key: String,
}

impl GoogleGeocoder {
    /// Build a geocoder when an API key is configured; `None` disables the step.
    pub fn from_config(config: &Config) -> Result<Option<Self>, GeocodingError> {
        let Some(api_key) = config.geocoding_api_key.clone() else {
            tracing::info!("GOOGLE_MAPS_API_KEY not set; geocoding disabled");
            return Ok(None);
        };
        let client = Client::builder()
            .user_agent("mining-analysis/geocoding")
            .build()?;
        Ok(Some(Self {
            client,
            base_url: config.geocoding_base_url.clone(),
            api_key,
        }))
    }
}

#[async_trait]
impl Geocoder for GoogleGeocoder {
    async fn geocode(&self, address: &str) -> Result<LocationCoordinate, GeocodingError> {
        let response = self
            .client
            .get(format_endpoint(&self.base_url, "maps/api/geocode/json"))
            .query(&[("address", address), ("key", self.api_key.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GeocodingError::UnexpectedStatus { status, body });
        }

        let payload: GeocodeResponse = response.json().await?;
        match (payload.status.as_str(), payload.results.into_iter().next()) {
            ("OK", Some(first)) => Ok(LocationCoordinate {
                name: address.to_string(),
                lat: first.geometry.location.lat,
                lng: first.geometry.location.lng,
                formatted_address: first.formatted_address,
            }),
            (status, _) => Err(GeocodingError::NoMatch(status.to_string())),
        }
    }
}

/// Geocode the first [`MAX_GEOCODED_LOCATIONS`] locations in order, skipping failures.
pub async fn geocode_locations(
    geocoder: &Arc<dyn Geocoder>,
    locations: &[String],
) -> Vec<LocationCoordinate> {
    let mut coords = Vec::new();
    for location in locations.iter().take(MAX_GEOCODED_LOCATIONS) {
        match geocoder.geocode(location).await {
            Ok(coordinate) => coords.push(coordinate),
            Err(err) => {
                tracing::warn!(location = %location, error = %err, "Geocoding skipped location");
            }
        }
    }
    tracing::debug!(
        requested = locations.len().min(MAX_GEOCODED_LOCATIONS),
        resolved = coords.len(),
        "Geocoding finished"
    );
    coords
}
