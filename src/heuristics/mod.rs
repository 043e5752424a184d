//! Search heuristics for route sequencing.
//!
//! This module exports the route energy, the annealing search and the
//! spatial partitioning used to split a fleet's work.

pub mod energy;
pub mod annealing;
pub mod clustering;

pub use energy::{energy, schedule, Visit};
pub use annealing::{AnnealOutcome, CancelToken, SimulatedAnnealing, Telemetry};
pub use clustering::{Cluster, ClusteringError, ClusteringProvider, KMeans, Partitioner};
