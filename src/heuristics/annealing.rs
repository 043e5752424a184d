//! Simulated annealing over visiting orders (Metropolis-Hastings).
//!
//! The first node of the input is the fixed route start. Candidates are made
//! by swapping two other positions; worse candidates are accepted with
//! probability `exp(-ΔE / T)` while the temperature decays geometrically every
//! iteration. The run always lasts for the configured iteration budget unless
//! a [`CancelToken`] fires, in which case the best route so far is returned.

use crate::config::{AnnealingConfig, EnergyParams};
use crate::heuristics::energy::energy;
use crate::instance::Node;
use crate::matrix::{MatrixBuilder, TravelMatrices};
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Search telemetry, kept for observability only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    /// Current energy after every iteration
    pub history: Vec<f64>,
    /// Accepted moves to a strictly worse state
    pub tunnels: usize,
    pub final_temperature: f64,
}

impl Telemetry {
    /// Append another run: histories are concatenated, tunnels summed and the
    /// final temperature taken from `other`.
    pub fn merge(&mut self, other: Telemetry) {
        self.history.extend(other.history);
        self.tunnels += other.tunnels;
        self.final_temperature = other.final_temperature;
    }

    pub fn iterations(&self) -> usize {
        self.history.len()
    }
}

/// Cooperative cancellation flag shared between a caller and running searches.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Result of one annealing run.
#[derive(Debug, Clone)]
pub struct AnnealOutcome {
    /// Nodes in best order; `route[0]` is the input start
    pub route: Vec<Node>,
    /// Best order as indices into the input
    pub order: Vec<usize>,
    pub initial_energy: f64,
    pub best_energy: f64,
    pub telemetry: Telemetry,
}

/// Simulated Annealing
///
/// Holds only parameters; every call to [`SimulatedAnnealing::anneal`] owns its
/// own search state, so one instance can serve parallel runs.
#[derive(Debug, Clone, Default)]
pub struct SimulatedAnnealing {
    pub config: AnnealingConfig,
    pub energy: EnergyParams,
    cancel: Option<CancelToken>,
}

impl SimulatedAnnealing {
    pub fn new(config: AnnealingConfig, energy: EnergyParams) -> Self {
        SimulatedAnnealing { config, energy, cancel: None }
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().map(CancelToken::is_cancelled).unwrap_or(false)
    }

    /// Optimize the order of `nodes`, keeping `nodes[0]` first.
    pub fn anneal<R: Rng + ?Sized>(&self, nodes: &[Node], builder: &MatrixBuilder, rng: &mut R) -> AnnealOutcome {
        let matrices = builder.build(nodes);
        self.search(nodes, &matrices, rng)
    }

    /// Same as [`anneal`](Self::anneal) with precomputed matrices.
    pub fn search<R: Rng + ?Sized>(&self, nodes: &[Node], matrices: &TravelMatrices, rng: &mut R) -> AnnealOutcome {
        let n = nodes.len();
        let identity: Vec<usize> = (0..n).collect();
        let initial_energy = energy(&identity, matrices, nodes, &self.energy);

        if n < 3 {
            return AnnealOutcome {
                route: nodes.to_vec(),
                order: identity,
                initial_energy,
                best_energy: initial_energy,
                telemetry: Telemetry::default(),
            };
        }

        let mut current = identity;
        let mut current_energy = initial_energy;
        let mut best = current.clone();
        let mut best_energy = current_energy;

        // Scale with the mean leg so acceptance is meaningful on any map size
        let mut temperature = (current_energy / n as f64) * self.config.temperature_scale;
        let mut history = Vec::with_capacity(self.config.iterations);
        let mut tunnels = 0usize;

        for _ in 0..self.config.iterations {
            temperature *= self.config.cooling_rate;

            if self.is_cancelled() {
                log::info!("Annealing cancelled after {} iterations", history.len());
                break;
            }

            let (i, j) = swap_positions(n, rng);
            let mut candidate = current.clone();
            candidate.swap(i, j);
            let candidate_energy = energy(&candidate, matrices, nodes, &self.energy);

            let accept = candidate_energy < current_energy || {
                let t = temperature.max(self.config.min_temperature);
                rng.gen::<f64>() < ((current_energy - candidate_energy) / t).exp()
            };

            if accept {
                if candidate_energy > current_energy {
                    tunnels += 1;
                }
                current = candidate;
                current_energy = candidate_energy;

                if current_energy < best_energy {
                    best = current.clone();
                    best_energy = current_energy;
                }
            }

            history.push(current_energy);
        }

        log::debug!(
            "Annealed {} nodes: energy {:.3} -> {:.3}, {} tunnels, final temperature {:.3e}",
            n,
            initial_energy,
            best_energy,
            tunnels,
            temperature
        );

        AnnealOutcome {
            route: best.iter().map(|&i| nodes[i].clone()).collect(),
            order: best,
            initial_energy,
            best_energy,
            telemetry: Telemetry { history, tunnels, final_temperature: temperature },
        }
    }
}

/// Two distinct uniform positions in `[1, n)`; requires `n >= 3`.
fn swap_positions<R: Rng + ?Sized>(n: usize, rng: &mut R) -> (usize, usize) {
    let i = rng.gen_range(1..n);
    let mut j = rng.gen_range(1..n - 1);
    if j >= i {
        j += 1;
    }
    (i, j)
}
