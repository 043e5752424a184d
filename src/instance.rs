//! Module for representing dispatch requests.
//!
//! A request is a depot (the start node), an ordered list of stops and a
//! fleet size. Requests are read from JSON files of the form
//!
//! ```json
//! {
//!   "start": { "name": "Depot", "lat": 12.97, "lon": 77.59 },
//!   "stops": [
//!     { "name": "A", "lat": 12.93, "lon": 77.62, "window": { "start": 9.0, "end": 11.0 } }
//!   ],
//!   "vehicles": 2,
//!   "round_trip": true
//! }
//! ```

use crate::config::DispatchConfig;
use crate::matrix::great_circle_km;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Permitted arrival interval at a stop, in fractional hours of the day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: f64,
    pub end: f64,
}

impl TimeWindow {
    /// Returns `None` for non-finite bounds or `start > end`.
    pub fn new(start: f64, end: f64) -> Option<Self> {
        if !start.is_finite() || !end.is_finite() || start > end {
            return None;
        }
        Some(TimeWindow { start, end })
    }

    pub fn is_valid(&self) -> bool {
        Self::new(self.start, self.end).is_some()
    }

    /// Apply the window to an arrival clock.
    ///
    /// Early arrivals wait until the window opens at no cost. Late arrivals
    /// keep their clock and report the hours past `end`.
    /// Returns `(clock after service starts, lateness in hours)`.
    #[inline]
    pub fn settle(&self, arrival: f64) -> (f64, f64) {
        if arrival < self.start {
            (self.start, 0.0)
        } else if arrival > self.end {
            (arrival, arrival - self.end)
        } else {
            (arrival, 0.0)
        }
    }
}

/// A visitable location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    /// Latitude in degrees
    pub lat: f64,
    /// Longitude in degrees
    pub lon: f64,
    /// Optional arrival window; `None` means the node accepts any arrival time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<TimeWindow>,
}

impl Node {
    pub fn new(name: impl Into<String>, lat: f64, lon: f64) -> Self {
        Node { name: name.into(), lat, lon, window: None }
    }

    pub fn with_window(mut self, window: TimeWindow) -> Self {
        self.window = Some(window);
        self
    }

    #[inline]
    pub fn coords(&self) -> (f64, f64) {
        (self.lat, self.lon)
    }
}

fn default_vehicles() -> usize {
    1
}

fn default_seed() -> u64 {
    42
}

/// Everything the dispatcher needs for one optimization run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchRequest {
    /// Depot every vehicle leaves from
    pub start: Node,
    /// Stops to visit, depot excluded
    pub stops: Vec<Node>,
    /// Fleet size
    #[serde(default = "default_vehicles")]
    pub vehicles: usize,
    /// Return to the depot at the end of a single-vehicle route
    #[serde(default)]
    pub round_trip: bool,
    /// Seed for clustering and annealing
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl DispatchRequest {
    pub fn new(start: Node, stops: Vec<Node>, vehicles: usize) -> Self {
        DispatchRequest { start, stops, vehicles, round_trip: false, seed: default_seed() }
    }

    pub fn round_trip(mut self, round_trip: bool) -> Self {
        self.round_trip = round_trip;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Fleet size with the degenerate `0` clamped to a single vehicle
    pub fn vehicle_count(&self) -> usize {
        self.vehicles.max(1)
    }

    /// Parse a request from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let text = std::fs::read_to_string(&path)
            .map_err(|e| format!("Cannot open file: {}", e))?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, String> {
        let request: DispatchRequest = serde_json::from_str(text)
            .map_err(|e| format!("Invalid request: {}", e))?;
        request.validate()?;
        Ok(request)
    }

    /// Reject coordinates and windows the optimizer cannot reason about
    pub fn validate(&self) -> Result<(), String> {
        for node in std::iter::once(&self.start).chain(self.stops.iter()) {
            if !node.lat.is_finite() || !node.lon.is_finite() {
                return Err(format!("Invalid coordinates for {}", node.name));
            }
            if let Some(window) = node.window {
                if !window.is_valid() {
                    return Err(format!("Invalid time window for {}", node.name));
                }
            }
        }
        Ok(())
    }

    /// Start followed by all stops
    pub fn all_nodes(&self) -> Vec<Node> {
        let mut nodes = Vec::with_capacity(self.stops.len() + 1);
        nodes.push(self.start.clone());
        nodes.extend(self.stops.iter().cloned());
        nodes
    }

    /// Get statistics about the request
    pub fn statistics(&self, policy: &DispatchConfig) -> InstanceStatistics {
        let nodes = self.all_nodes();

        let mut distances: Vec<f64> = Vec::new();
        for i in 0..nodes.len() {
            for j in i + 1..nodes.len() {
                distances.push(great_circle_km(nodes[i].coords(), nodes[j].coords()));
            }
        }
        let avg_distance = if distances.is_empty() {
            0.0
        } else {
            distances.iter().sum::<f64>() / distances.len() as f64
        };
        let max_distance = distances.iter().cloned().fold(0.0, f64::max);

        let min_lat = nodes.iter().map(|n| n.lat).fold(f64::INFINITY, f64::min);
        let max_lat = nodes.iter().map(|n| n.lat).fold(f64::NEG_INFINITY, f64::max);
        let min_lon = nodes.iter().map(|n| n.lon).fold(f64::INFINITY, f64::min);
        let max_lon = nodes.iter().map(|n| n.lon).fold(f64::NEG_INFINITY, f64::max);

        InstanceStatistics {
            num_stops: self.stops.len(),
            num_windowed: self.stops.iter().filter(|n| n.window.is_some()).count(),
            vehicles: self.vehicle_count(),
            clusters: cluster_count(self.stops.len(), self.vehicle_count(), policy),
            bounds: (min_lat, min_lon, max_lat, max_lon),
            avg_distance,
            max_distance,
        }
    }
}

/// Number of clusters the dispatcher asks for: one per vehicle for a fleet,
/// otherwise roughly `stops_per_cluster` stops per sub-route. Never exceeds
/// the number of stops.
pub fn cluster_count(num_stops: usize, vehicles: usize, policy: &DispatchConfig) -> usize {
    let k = if vehicles > 1 {
        vehicles
    } else {
        (num_stops / policy.stops_per_cluster.max(1)).max(1)
    };
    k.min(num_stops)
}

/// Statistics about a dispatch request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceStatistics {
    pub num_stops: usize,
    pub num_windowed: usize,
    pub vehicles: usize,
    pub clusters: usize,
    /// (min lat, min lon, max lat, max lon)
    pub bounds: (f64, f64, f64, f64),
    /// Mean pairwise great-circle distance (km), depot included
    pub avg_distance: f64,
    pub max_distance: f64,
}

impl std::fmt::Display for InstanceStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Request:")?;
        writeln!(f, "  Stops: {} ({} with time windows)", self.num_stops, self.num_windowed)?;
        writeln!(f, "  Vehicles: {}", self.vehicles)?;
        writeln!(f, "  Clusters: {}", self.clusters)?;
        writeln!(
            f,
            "  Bounds: ({:.4}, {:.4}) - ({:.4}, {:.4})",
            self.bounds.0, self.bounds.1, self.bounds.2, self.bounds.3
        )?;
        writeln!(f, "  Avg distance: {:.2} km", self.avg_distance)?;
        writeln!(f, "  Max distance: {:.2} km", self.max_distance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_window_settle() {
        let tw = TimeWindow::new(9.0, 10.0).unwrap();
        assert_eq!(tw.settle(8.5), (9.0, 0.0));
        assert_eq!(tw.settle(9.5), (9.5, 0.0));
        let (clock, late) = tw.settle(12.0);
        assert_eq!(clock, 12.0);
        assert!((late - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_time_window_rejects_inverted() {
        assert!(TimeWindow::new(10.0, 9.0).is_none());
        assert!(TimeWindow::new(f64::NAN, 9.0).is_none());
    }

    #[test]
    fn test_request_from_json_defaults() {
        let json = r#"{
            "start": {"name": "Depot", "lat": 12.97, "lon": 77.59},
            "stops": [
                {"name": "A", "lat": 12.93, "lon": 77.62, "window": {"start": 9.0, "end": 11.0}},
                {"name": "B", "lat": 13.01, "lon": 77.55}
            ]
        }"#;
        let request = DispatchRequest::from_json(json).unwrap();
        assert_eq!(request.vehicles, 1);
        assert!(!request.round_trip);
        assert_eq!(request.seed, 42);
        assert_eq!(request.stops[0].window, TimeWindow::new(9.0, 11.0));
        assert!(request.stops[1].window.is_none());
    }

    #[test]
    fn test_request_rejects_bad_window() {
        let json = r#"{
            "start": {"name": "Depot", "lat": 0.0, "lon": 0.0},
            "stops": [{"name": "A", "lat": 0.1, "lon": 0.1, "window": {"start": 12.0, "end": 9.0}}]
        }"#;
        assert!(DispatchRequest::from_json(json).is_err());
    }

    #[test]
    fn test_cluster_count_policy() {
        let policy = DispatchConfig::default();
        assert_eq!(cluster_count(9, 3, &policy), 3);
        assert_eq!(cluster_count(2, 3, &policy), 2);
        assert_eq!(cluster_count(12, 1, &policy), 2);
        assert_eq!(cluster_count(4, 1, &policy), 1);
        assert_eq!(cluster_count(0, 1, &policy), 0);
    }

    #[test]
    fn test_statistics() {
        let request = DispatchRequest::new(
            Node::new("Depot", 0.0, 0.0),
            vec![
                Node::new("A", 0.0, 1.0).with_window(TimeWindow::new(9.0, 10.0).unwrap()),
                Node::new("B", 1.0, 0.0),
            ],
            0,
        );
        let stats = request.statistics(&DispatchConfig::default());
        assert_eq!(stats.num_stops, 2);
        assert_eq!(stats.num_windowed, 1);
        assert_eq!(stats.vehicles, 1);
        assert_eq!(stats.bounds, (0.0, 0.0, 1.0, 1.0));
        assert!(stats.max_distance > 150.0);
    }

    #[test]
    fn test_demo_request_loads() {
        let request = DispatchRequest::from_json(include_str!("../demos/bangalore.json")).unwrap();
        assert_eq!(request.stops.len(), 12);
        assert_eq!(request.vehicle_count(), 2);
        assert!(request.round_trip);
        assert_eq!(request.stops.iter().filter(|n| n.window.is_some()).count(), 3);
    }
}
