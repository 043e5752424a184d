//! Road-network distances from an OSRM `table` service.
//!
//! Enabled with the `osrm` feature. The public demo server is the default
//! endpoint; point `base_url` at a self-hosted instance for real workloads.

use crate::matrix::{NetworkTable, ProviderError, TravelProvider};
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_OSRM_URL: &str = "http://router.project-osrm.org";

#[derive(Debug, Deserialize)]
struct TableResponse {
    code: String,
    #[serde(default)]
    message: Option<String>,
    /// Meters
    #[serde(default)]
    distances: Option<Vec<Vec<Option<f64>>>>,
    /// Seconds
    #[serde(default)]
    durations: Option<Vec<Vec<Option<f64>>>>,
}

/// [`TravelProvider`] backed by the OSRM HTTP API.
pub struct OsrmProvider {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl OsrmProvider {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;
        Ok(OsrmProvider { base_url: base_url.into().trim_end_matches('/').to_string(), client })
    }

    /// Public demo server with a 3 second timeout
    pub fn public() -> Result<Self, ProviderError> {
        Self::new(DEFAULT_OSRM_URL, Duration::from_secs(3))
    }

    fn table_url(&self, points: &[(f64, f64)]) -> String {
        // OSRM expects lon,lat
        let coords = points
            .iter()
            .map(|(lat, lon)| format!("{},{}", lon, lat))
            .collect::<Vec<_>>()
            .join(";");
        format!("{}/table/v1/driving/{}?annotations=distance,duration", self.base_url, coords)
    }
}

fn scale(grid: Vec<Vec<Option<f64>>>, factor: f64) -> Vec<Vec<Option<f64>>> {
    grid.into_iter()
        .map(|row| row.into_iter().map(|cell| cell.map(|v| v / factor)).collect())
        .collect()
}

impl TravelProvider for OsrmProvider {
    fn query(&self, points: &[(f64, f64)]) -> Result<NetworkTable, ProviderError> {
        let response = self.client.get(self.table_url(points)).send().map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout
            } else {
                ProviderError::Unavailable(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            return Err(ProviderError::Unavailable(format!("HTTP {}", response.status())));
        }

        let body: TableResponse = response
            .json()
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        if body.code != "Ok" {
            return Err(ProviderError::Unavailable(format!(
                "{}: {}",
                body.code,
                body.message.unwrap_or_default()
            )));
        }

        match (body.distances, body.durations) {
            (Some(distances), Some(durations)) => Ok(NetworkTable {
                distance_km: scale(distances, 1000.0),
                duration_h: scale(durations, 3600.0),
            }),
            _ => Err(ProviderError::Malformed("missing distances or durations".to_string())),
        }
    }

    fn name(&self) -> &str {
        "OSRM"
    }
}
