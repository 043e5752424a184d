//! Route Annealer Library
//!
//! Sequences delivery stops for one or more vehicles, minimizing travel
//! distance plus a penalty for arriving after a stop's time window closes.
//!
//! # Features
//!
//! - Route energy with a running clock, free waiting and lateness penalties
//! - Simulated annealing over stop orderings (Metropolis acceptance)
//! - Seeded k-means partitioning of stops across a fleet
//! - Travel matrices from a road network with great-circle fallback
//! - Optional OSRM provider (`osrm` feature)
//! - Seed benchmarking with CSV export
//!
//! # Example
//!
//! ```no_run
//! use route_annealer::{DispatchRequest, Dispatcher, Node, SolverConfig, TimeWindow};
//!
//! let depot = Node::new("Depot", 12.9716, 77.5946);
//! let stops = vec![
//!     Node::new("Indiranagar", 12.9784, 77.6408),
//!     Node::new("Koramangala", 12.9352, 77.6245)
//!         .with_window(TimeWindow::new(8.0, 9.0).unwrap()),
//!     Node::new("Jayanagar", 12.9250, 77.5938),
//! ];
//!
//! let request = DispatchRequest::new(depot, stops, 1).round_trip(true);
//! let result = Dispatcher::new(SolverConfig::default()).dispatch(&request);
//!
//! println!("{}", result);
//! ```

pub mod config;
pub mod instance;
pub mod matrix;
#[cfg(feature = "osrm")]
pub mod osrm;
pub mod heuristics;
pub mod dispatch;
pub mod solution;
pub mod benchmark;

pub use config::SolverConfig;
pub use dispatch::Dispatcher;
pub use instance::{DispatchRequest, Node, TimeWindow};
pub use solution::{DispatchResult, Route};
