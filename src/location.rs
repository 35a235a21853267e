//! Geospatial (soil/slope) lookup proxy for map clicks.
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::RwLock;

use crate::DashboardError;

const CACHE_TTL: Duration = Duration::from_secs(600);
const MAX_RETRIES: u32 = 3;

pub struct LocationClient {
    client: reqwest::Client,
    base_url: Option<String>,
    cache: RwLock<Option<CacheEntry>>,
}

struct CacheEntry {
    fetched_at: Instant,
    lat: f64,
    lon: f64,
    data: Value,
}

impl LocationClient {
    pub fn new(base_url: Option<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|err| {
                tracing::warn!("falling back to default http client: {}", err);
                reqwest::Client::new()
            });
        Self {
            client,
            base_url,
            cache: RwLock::new(None),
        }
    }

    pub async fn fetch_location_data(&self, lat: f64, lon: f64) -> Result<Value, DashboardError> {
        validate_coordinates(lat, lon)?;
        let base_url = self
            .base_url
            .as_deref()
            .ok_or(DashboardError::GeospatialNotConfigured)?;

        if let Some(cached) = self.cache.read().await.as_ref() {
            if cached.lat == lat && cached.lon == lon && cached.fetched_at.elapsed() < CACHE_TTL {
                return Ok(cached.data.clone());
            }
        }

        let url = location_url(base_url, lat, lon);
        let data = fetch_with_retry(&self.client, &url).await?;
        let mut cache = self.cache.write().await;
        *cache = Some(CacheEntry {
            fetched_at: Instant::now(),
            lat,
            lon,
            data: data.clone(),
        });
        Ok(data)
    }
}

pub(crate) fn validate_coordinates(lat: f64, lon: f64) -> Result<(), DashboardError> {
    if (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon) {
        Ok(())
    } else {
        Err(DashboardError::InvalidCoordinates { lat, lon })
    }
}

fn location_url(base_url: &str, lat: f64, lon: f64) -> String {
    let query = format!(
        "lat={}&lon={}",
        urlencoding::encode(&lat.to_string()),
        urlencoding::encode(&lon.to_string())
    );
    let endpoint = format!("{}/get_geo_data", base_url.trim_end_matches('/'));
    if endpoint.contains('?') {
        format!("{}&{}", endpoint, query)
    } else {
        format!("{}?{}", endpoint, query)
    }
}

/// GETs `url` as JSON, backing off exponentially on 429 responses.
pub(crate) async fn fetch_with_retry(client: &reqwest::Client, url: &str) -> Result<Value, DashboardError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let response = client
            .get(url)
            .send()
            .await
            .map_err(|err| DashboardError::Upstream(format!("request failed: {err}")))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            if attempt >= MAX_RETRIES {
                return Err(DashboardError::Upstream(
                    "rate limited after retries".to_string(),
                ));
            }
            let delay = Duration::from_secs(2u64.pow(attempt));
            tracing::warn!(
                "upstream 429 from {}, retrying in {:?} (attempt {}/{})",
                url,
                delay,
                attempt,
                MAX_RETRIES
            );
            tokio::time::sleep(delay).await;
            continue;
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            return Err(DashboardError::Upstream(format!(
                "status {}: {}",
                status, body
            )));
        }

        return response
            .json::<Value>()
            .await
            .map_err(|err| DashboardError::Upstream(format!("response parse failed: {err}")));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_location_url() {
        assert_eq!(
            location_url("https://geo.example.com/", 14.5, 121.25),
            "https://geo.example.com/get_geo_data?lat=14.5&lon=121.25"
        );
        assert_eq!(
            location_url("https://geo.example.com", -7.0, 110.0),
            "https://geo.example.com/get_geo_data?lat=-7&lon=110"
        );
    }

    #[test]
    fn rejects_out_of_range_coordinates() {
        assert!(validate_coordinates(14.5, 121.0).is_ok());
        assert!(validate_coordinates(-90.0, 180.0).is_ok());
        assert!(matches!(
            validate_coordinates(91.0, 0.0),
            Err(DashboardError::InvalidCoordinates { .. })
        ));
        assert!(validate_coordinates(0.0, f64::NAN).is_err());
    }

    #[tokio::test]
    async fn requires_configured_service() {
        let client = LocationClient::new(None, Duration::from_secs(1));
        let result = client.fetch_location_data(14.5, 121.0).await;
        assert!(matches!(result, Err(DashboardError::GeospatialNotConfigured)));
    }

    #[tokio::test]
    async fn validates_before_calling_out() {
        let client = LocationClient::new(Some("http://127.0.0.1:9".to_string()), Duration::from_secs(1));
        let result = client.fetch_location_data(123.0, 0.0).await;
        assert!(matches!(result, Err(DashboardError::InvalidCoordinates { .. })));
    }
}
