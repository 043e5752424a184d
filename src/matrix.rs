//! Distance and travel-time matrices.
//!
//! A [`MatrixBuilder`] turns an ordered node list into a pair of n×n tables:
//! `distance[i][j]` in km and `duration[i][j]` in hours. It first asks an
//! injected [`TravelProvider`] (a road-network service) for the whole table in
//! one call. When there is no provider, or the provider fails or answers with
//! something unusable, the whole table is rebuilt from great-circle distances
//! at a fixed average speed. Provider and fallback cells are never mixed.
//!
//! Matrices are not required to be symmetric. Every cell is finite: pairs the
//! network cannot connect carry the configured sentinel. An off-diagonal
//! distance is zero only when both nodes share the same coordinates.

use crate::config::MatrixParams;
use crate::instance::Node;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Mean Earth radius (IUGG), km
pub const EARTH_RADIUS_KM: f64 = 6371.0088;

/// Great-circle distance in km between two `(lat, lon)` points in degrees (haversine).
pub fn great_circle_km(a: (f64, f64), b: (f64, f64)) -> f64 {
    let d_lat = (b.0 - a.0).to_radians();
    let d_lon = (b.1 - a.1).to_radians();
    let lat1 = a.0.to_radians();
    let lat2 = b.0.to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// Failure reported by a [`TravelProvider`].
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// Service could not be reached or refused the request
    Unavailable(String),
    Timeout,
    /// Response could not be interpreted
    Malformed(String),
    /// Response table does not match the number of requested points
    ShapeMismatch { expected: usize, rows: usize },
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderError::Unavailable(reason) => write!(f, "provider unavailable: {}", reason),
            ProviderError::Timeout => write!(f, "provider timed out"),
            ProviderError::Malformed(reason) => write!(f, "malformed provider response: {}", reason),
            ProviderError::ShapeMismatch { expected, rows } => {
                write!(f, "provider returned {} rows for {} points", rows, expected)
            }
        }
    }
}

impl std::error::Error for ProviderError {}

/// Raw table returned by a road-network service.
///
/// `None` marks a pair the network cannot connect.
#[derive(Debug, Clone, Default)]
pub struct NetworkTable {
    pub distance_km: Vec<Vec<Option<f64>>>,
    pub duration_h: Vec<Vec<Option<f64>>>,
}

/// Source of real road distances and durations, queried for all points at once.
pub trait TravelProvider: Send + Sync {
    fn query(&self, points: &[(f64, f64)]) -> Result<NetworkTable, ProviderError>;
    fn name(&self) -> &str;
}

/// Where the cells of a [`TravelMatrices`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatrixSource {
    Network,
    Geodesic,
}

/// Parallel distance (km) and duration (h) tables indexed by node position.
#[derive(Debug, Clone)]
pub struct TravelMatrices {
    pub distance: Vec<Vec<f64>>,
    pub duration: Vec<Vec<f64>>,
    pub source: MatrixSource,
}

impl TravelMatrices {
    /// Great-circle distances with durations derived from `params.fallback_speed_kmh`.
    pub fn geodesic(points: &[(f64, f64)], params: &MatrixParams) -> Self {
        let n = points.len();
        let mut distance = vec![vec![0.0; n]; n];
        let mut duration = vec![vec![0.0; n]; n];

        for i in 0..n {
            for j in 0..n {
                if i == j {
                    continue;
                }
                let d = great_circle_km(points[i], points[j]);
                if !d.is_finite() {
                    distance[i][j] = params.unreachable;
                    duration[i][j] = params.unreachable;
                    continue;
                }
                distance[i][j] = d;
                duration[i][j] = if params.fallback_speed_kmh > 0.0 {
                    d / params.fallback_speed_kmh
                } else {
                    params.unreachable
                };
            }
        }

        TravelMatrices { distance, duration, source: MatrixSource::Geodesic }
    }

    /// Validate a provider table and replace unreachable cells with the sentinel.
    ///
    /// A zero distance between two distinct coordinates is rejected as malformed.
    pub fn from_network(table: NetworkTable, points: &[(f64, f64)], params: &MatrixParams) -> Result<Self, ProviderError> {
        let n = points.len();
        for grid in [&table.distance_km, &table.duration_h] {
            if grid.len() != n {
                return Err(ProviderError::ShapeMismatch { expected: n, rows: grid.len() });
            }
            if let Some(row) = grid.iter().find(|row| row.len() != n) {
                return Err(ProviderError::Malformed(format!("row of length {} in {}x{} table", row.len(), n, n)));
            }
        }

        let mut distance = vec![vec![0.0; n]; n];
        let mut duration = vec![vec![0.0; n]; n];
        let mut reachable = 0usize;

        for i in 0..n {
            for j in 0..n {
                if i == j {
                    continue;
                }
                match (table.distance_km[i][j], table.duration_h[i][j]) {
                    (Some(d), Some(t)) => {
                        if !d.is_finite() || !t.is_finite() || d < 0.0 || t < 0.0 {
                            return Err(ProviderError::Malformed(format!("invalid cell ({}, {})", i, j)));
                        }
                        if d == 0.0 && points[i] != points[j] {
                            return Err(ProviderError::Malformed(format!("zero distance between ({}, {})", i, j)));
                        }
                        distance[i][j] = d;
                        duration[i][j] = t;
                        reachable += 1;
                    }
                    _ => {
                        distance[i][j] = params.unreachable;
                        duration[i][j] = params.unreachable;
                    }
                }
            }
        }

        if n > 1 && reachable == 0 {
            return Err(ProviderError::Malformed("no reachable pairs".to_string()));
        }

        Ok(TravelMatrices { distance, duration, source: MatrixSource::Network })
    }

    pub fn size(&self) -> usize {
        self.distance.len()
    }

    #[inline]
    pub fn distance(&self, i: usize, j: usize) -> f64 {
        self.distance[i][j]
    }

    #[inline]
    pub fn duration(&self, i: usize, j: usize) -> f64 {
        self.duration[i][j]
    }
}

type CacheKey = Vec<(u64, u64)>;

/// Builds matrices for node lists, memoizing by exact coordinate sequence.
///
/// One builder is meant to live for one optimization run; the cache is
/// shared by every cluster and vehicle of that run.
pub struct MatrixBuilder {
    provider: Option<Arc<dyn TravelProvider>>,
    params: MatrixParams,
    cache: Mutex<HashMap<CacheKey, Arc<TravelMatrices>>>,
}

impl MatrixBuilder {
    pub fn new(provider: Option<Arc<dyn TravelProvider>>, params: MatrixParams) -> Self {
        MatrixBuilder { provider, params, cache: Mutex::new(HashMap::new()) }
    }

    /// Builder without a road-network provider
    pub fn geodesic(params: MatrixParams) -> Self {
        Self::new(None, params)
    }

    pub fn params(&self) -> &MatrixParams {
        &self.params
    }

    /// Number of distinct node lists built so far
    pub fn cached(&self) -> usize {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Distance and duration matrices for `nodes`, in node order.
    pub fn build(&self, nodes: &[Node]) -> Arc<TravelMatrices> {
        let key: CacheKey = nodes.iter().map(|n| (n.lat.to_bits(), n.lon.to_bits())).collect();
        if let Some(hit) = self.cache.lock().unwrap_or_else(|e| e.into_inner()).get(&key) {
            log::debug!("Matrix cache hit for {} nodes", nodes.len());
            return Arc::clone(hit);
        }

        let points: Vec<(f64, f64)> = nodes.iter().map(Node::coords).collect();
        let matrices = Arc::new(self.compute(&points));

        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, Arc::clone(&matrices));
        matrices
    }

    fn compute(&self, points: &[(f64, f64)]) -> TravelMatrices {
        let n = points.len();
        if n < 2 {
            return TravelMatrices {
                distance: vec![vec![0.0; n]; n],
                duration: vec![vec![0.0; n]; n],
                source: MatrixSource::Geodesic,
            };
        }

        if let Some(provider) = &self.provider {
            let result = provider
                .query(points)
                .and_then(|table| TravelMatrices::from_network(table, points, &self.params));
            match result {
                Ok(matrices) => {
                    log::info!("{} matrices generated for {} nodes", provider.name(), n);
                    return matrices;
                }
                Err(e) => {
                    log::warn!("{} matrix failed: {}. Falling back to great-circle distances", provider.name(), e);
                }
            }
        }

        log::info!("Great-circle matrices generated for {} nodes", n);
        TravelMatrices::geodesic(points, &self.params)
    }
}
