//! Place lookups for event locations.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;

use convo_shared::{ConvoError, Result};
use convo_store::Place;

const PLACE_DETAILS_URL: &str = "https://maps.googleapis.com/maps/api/place/details/json";

#[async_trait]
pub trait PlaceResolver: Send + Sync {
    /// Resolve a place id. Unknown ids are a field error on `placeId`.
    async fn place_details(&self, place_id: &str) -> Result<Place>;
}

fn unknown_place() -> ConvoError {
    ConvoError::invalid("placeId", "This place could not be found")
}

#[derive(Deserialize)]
struct DetailsResponse {
    status: String,
    result: Option<DetailsResult>,
}

#[derive(Deserialize)]
struct DetailsResult {
    place_id: String,
    #[serde(default)]
    formatted_address: String,
    geometry: Geometry,
    /// Minutes east of UTC.
    #[serde(default)]
    utc_offset: i32,
}

#[derive(Deserialize)]
struct Geometry {
    location: Location,
}

#[derive(Deserialize)]
struct Location {
    lat: f64,
    lng: f64,
}

pub struct GooglePlaces {
    client: reqwest::Client,
    api_key: String,
}

impl GooglePlaces {
    pub fn new(client: reqwest::Client, api_key: String) -> Self {
        Self { client, api_key }
    }
}

impl From<DetailsResult> for Place {
    fn from(r: DetailsResult) -> Self {
        Place {
            place_id: r.place_id,
            address: r.formatted_address,
            lat: r.geometry.location.lat,
            lng: r.geometry.location.lng,
            utc_offset: r.utc_offset * 60,
        }
    }
}

#[async_trait]
impl PlaceResolver for GooglePlaces {
    async fn place_details(&self, place_id: &str) -> Result<Place> {
        let response: DetailsResponse = self
            .client
            .get(PLACE_DETAILS_URL)
            .query(&[
                ("place_id", place_id),
                ("fields", "place_id,formatted_address,geometry,utc_offset"),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ConvoError::Internal(format!("places request: {e}")))?
            .json()
            .await
            .map_err(|e| ConvoError::Internal(format!("places response: {e}")))?;

        match (response.status.as_str(), response.result) {
            ("OK", Some(result)) => Ok(result.into()),
            (status, _) => {
                tracing::debug!(place_id, status, "place lookup failed");
                Err(unknown_place())
            }
        }
    }
}

/// In-process place table for development and tests.
#[derive(Default)]
pub struct StaticPlaces {
    places: HashMap<String, Place>,
}

impl StaticPlaces {
    #[cfg(test)]
    pub fn with(mut self, place: Place) -> Self {
        self.places.insert(place.place_id.clone(), place);
        self
    }
}

#[async_trait]
impl PlaceResolver for StaticPlaces {
    async fn place_details(&self, place_id: &str) -> Result<Place> {
        self.places.get(place_id).cloned().ok_or_else(unknown_place)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_details_conversion() {
        let response: DetailsResponse = serde_json::from_value(serde_json::json!({
            "status": "OK",
            "result": {
                "place_id": "abc",
                "formatted_address": "1 Main St",
                "geometry": { "location": { "lat": 37.7, "lng": -122.4 } },
                "utc_offset": -420
            }
        }))
        .unwrap();
        let place: Place = response.result.unwrap().into();
        assert_eq!(place.address, "1 Main St");
        assert_eq!(place.utc_offset, -420 * 60);
    }

    #[tokio::test]
    async fn test_static_places() {
        let places = StaticPlaces::default().with(Place {
            place_id: "park".into(),
            address: "Dolores Park".into(),
            ..Place::default()
        });
        assert_eq!(places.place_details("park").await.unwrap().address, "Dolores Park");
        let err = places.place_details("nowhere").await.unwrap_err();
        assert!(err.fields().unwrap().contains_key("placeId"));
    }
}
