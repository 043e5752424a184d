//! Solver tunables.
//!
//! Every constant the optimizer depends on lives here so callers can adjust
//! them per request. All sections deserialize with defaults, so a JSON config
//! file only needs to name the values it changes.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Parameters of the route energy function.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnergyParams {
    /// Clock value (fractional hour of day) at the first node of a route
    pub day_start: f64,
    /// Cost added per hour of lateness, in km-equivalent
    pub late_penalty: f64,
}

impl Default for EnergyParams {
    fn default() -> Self {
        EnergyParams { day_start: 8.0, late_penalty: 100.0 }
    }
}

/// Parameters of the distance/time matrix builder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatrixParams {
    /// Average speed assumed by the great-circle fallback (km/h)
    pub fallback_speed_kmh: f64,
    /// Value stored for pairs the road network cannot connect
    pub unreachable: f64,
}

impl Default for MatrixParams {
    fn default() -> Self {
        MatrixParams { fallback_speed_kmh: 50.0, unreachable: 99999.0 }
    }
}

/// Parameters of the Metropolis-Hastings search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnealingConfig {
    /// Geometric cooling factor applied every iteration
    pub cooling_rate: f64,
    /// Fixed iteration budget
    pub iterations: usize,
    /// Initial temperature is `(initial_energy / n) * temperature_scale`
    pub temperature_scale: f64,
    /// Lower clamp on the temperature used in the acceptance exponent
    pub min_temperature: f64,
}

impl Default for AnnealingConfig {
    fn default() -> Self {
        AnnealingConfig {
            cooling_rate: 0.995,
            iterations: 1500,
            temperature_scale: 100.0,
            min_temperature: 1e-12,
        }
    }
}

/// Parameters of the k-means clustering provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    /// Independent k-means++ restarts; the lowest inertia wins
    pub restarts: usize,
    /// Lloyd iterations per restart
    pub max_iterations: usize,
    /// Convergence threshold on the total centroid shift (degrees)
    pub tolerance: f64,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        ClusteringConfig { restarts: 10, max_iterations: 300, tolerance: 1e-4 }
    }
}

/// Policy knobs of the hybrid dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// A single vehicle with fewer than this many nodes (start included) is annealed directly
    pub single_route_limit: usize,
    /// Target stops per sub-route when a single vehicle is clustered
    pub stops_per_cluster: usize,
    /// Run independent per-vehicle searches on the rayon thread pool
    pub parallel: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        DispatchConfig { single_route_limit: 10, stops_per_cluster: 5, parallel: false }
    }
}

/// Vehicle running costs used by the route metrics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostParams {
    /// Vehicle mileage in km per litre; zero disables fuel figures
    pub km_per_litre: f64,
    /// Price of one litre of fuel
    pub fuel_price: f64,
}

impl Default for CostParams {
    fn default() -> Self {
        CostParams { km_per_litre: 12.0, fuel_price: 96.0 }
    }
}

/// Complete solver configuration.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub energy: EnergyParams,
    pub matrix: MatrixParams,
    pub annealing: AnnealingConfig,
    pub clustering: ClusteringConfig,
    pub dispatch: DispatchConfig,
    pub costs: CostParams,
}

impl SolverConfig {
    /// Load a configuration from a JSON file. Missing fields keep their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let text = std::fs::read_to_string(&path)
            .map_err(|e| format!("Cannot open config: {}", e))?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, String> {
        serde_json::from_str(text).map_err(|e| format!("Invalid config: {}", e))
    }
}
