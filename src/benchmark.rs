//! Benchmarking module.
//!
//! Runs the same dispatch request under a range of seeds and summarizes
//! how much the stochastic search varies.

use crate::config::SolverConfig;
use crate::dispatch::Dispatcher;
use crate::instance::DispatchRequest;
use crate::matrix::TravelProvider;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Result of one seeded dispatch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub seed: u64,
    pub vehicles: usize,
    pub energy: f64,
    pub distance_km: f64,
    pub lateness_h: f64,
    pub tunnels: usize,
    pub iterations: usize,
    /// Wall-clock seconds
    pub time: f64,
}

/// Aggregated statistics over all runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStatistics {
    pub runs: usize,
    pub avg_energy: f64,
    pub std_energy: f64,
    pub best_energy: f64,
    pub worst_energy: f64,
    pub avg_distance: f64,
    pub std_distance: f64,
    pub avg_tunnels: f64,
    pub avg_time: f64,
    pub total_time: f64,
}

/// Benchmark configuration
#[derive(Debug, Clone)]
pub struct BenchmarkConfig {
    /// Number of seeds to run
    pub num_runs: usize,
    /// Run seeds on the rayon pool
    pub parallel: bool,
    pub solver: SolverConfig,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        BenchmarkConfig { num_runs: 5, parallel: true, solver: SolverConfig::default() }
    }
}

/// Benchmarking engine
pub struct Benchmark {
    config: BenchmarkConfig,
    provider: Option<Arc<dyn TravelProvider>>,
    results: Vec<RunResult>,
}

impl Benchmark {
    pub fn new(config: BenchmarkConfig) -> Self {
        Benchmark { config, provider: None, results: Vec::new() }
    }

    pub fn with_provider(mut self, provider: Arc<dyn TravelProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    fn dispatcher(&self) -> Dispatcher {
        let dispatcher = Dispatcher::new(self.config.solver);
        match &self.provider {
            Some(provider) => dispatcher.with_provider(Arc::clone(provider)),
            None => dispatcher,
        }
    }

    /// Dispatch `request` once
    pub fn run_single(&self, request: &DispatchRequest) -> RunResult {
        let start = Instant::now();
        let result = self.dispatcher().dispatch(request);
        let totals = result.totals();

        RunResult {
            seed: request.seed,
            vehicles: totals.vehicles,
            energy: totals.energy,
            distance_km: totals.distance_km,
            lateness_h: totals.lateness_h,
            tunnels: result.telemetry.tunnels,
            iterations: result.telemetry.iterations(),
            time: start.elapsed().as_secs_f64(),
        }
    }

    /// Dispatch `request` with seeds `request.seed .. request.seed + num_runs`,
    /// calling `on_done` after each run.
    pub fn run<F>(&mut self, request: &DispatchRequest, on_done: F)
    where
        F: Fn(&RunResult) + Send + Sync,
    {
        log::info!("Running {} seeds on {} stops", self.config.num_runs, request.stops.len());

        let seeds: Vec<u64> = (0..self.config.num_runs as u64).map(|i| request.seed.wrapping_add(i)).collect();
        let run_seed = |seed: u64| {
            let result = self.run_single(&request.clone().with_seed(seed));
            on_done(&result);
            result
        };

        let mut runs: Vec<RunResult> = if self.config.parallel {
            seeds.par_iter().map(|&seed| run_seed(seed)).collect()
        } else {
            seeds.iter().map(|&seed| run_seed(seed)).collect()
        };

        self.results.append(&mut runs);
    }

    /// Compute statistics over all recorded runs
    pub fn compute_statistics(&self) -> Option<RunStatistics> {
        if self.results.is_empty() {
            return None;
        }

        let energies: Vec<f64> = self.results.iter().map(|r| r.energy).collect();
        let distances: Vec<f64> = self.results.iter().map(|r| r.distance_km).collect();
        let tunnels: Vec<f64> = self.results.iter().map(|r| r.tunnels as f64).collect();
        let times: Vec<f64> = self.results.iter().map(|r| r.time).collect();

        // Sample deviation is undefined for a single run
        let deviation = |values: &[f64]| if values.len() > 1 { Statistics::std_dev(values) } else { 0.0 };

        Some(RunStatistics {
            runs: self.results.len(),
            avg_energy: Statistics::mean(&energies),
            std_energy: deviation(energies.as_slice()),
            best_energy: Statistics::min(&energies),
            worst_energy: Statistics::max(&energies),
            avg_distance: Statistics::mean(&distances),
            std_distance: deviation(distances.as_slice()),
            avg_tunnels: Statistics::mean(&tunnels),
            avg_time: Statistics::mean(&times),
            total_time: times.iter().sum(),
        })
    }

    /// Export results to CSV
    pub fn export_to_csv<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let file = File::create(path)?;
        let mut writer = csv::Writer::from_writer(file);

        for result in &self.results {
            writer.serialize(result)?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Export statistics to CSV
    pub fn export_statistics_csv<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let file = File::create(path)?;
        let mut writer = csv::Writer::from_writer(file);

        if let Some(stats) = self.compute_statistics() {
            writer.serialize(stats)?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Generate summary report
    pub fn generate_report(&self) -> String {
        let mut report = String::new();

        report.push_str("========================================\n");
        report.push_str("       Route Annealer Benchmark\n");
        report.push_str("========================================\n");
        report.push_str(&format!("Generated: {}\n\n", chrono::Local::now().format("%Y-%m-%d %H:%M:%S")));

        let Some(stats) = self.compute_statistics() else {
            report.push_str("No runs recorded.\n");
            return report;
        };

        report.push_str(&format!("{:<8} {:>12} {:>12} {:>10} {:>10} {:>10}\n",
            "Seed", "Energy", "Distance", "Late h", "Tunnels", "Time"));
        report.push_str("-".repeat(68).as_str());
        report.push('\n');

        for r in &self.results {
            report.push_str(&format!("{:<8} {:>12.2} {:>12.2} {:>10.2} {:>10} {:>10.4}\n",
                r.seed, r.energy, r.distance_km, r.lateness_h, r.tunnels, r.time));
        }

        report.push_str("-".repeat(68).as_str());
        report.push('\n');
        report.push_str(&format!("Runs: {}\n", stats.runs));
        report.push_str(&format!("Energy: {:.2} ± {:.2} (best {:.2}, worst {:.2})\n",
            stats.avg_energy, stats.std_energy, stats.best_energy, stats.worst_energy));
        report.push_str(&format!("Distance: {:.2} ± {:.2} km\n", stats.avg_distance, stats.std_distance));
        report.push_str(&format!("Avg tunneling events: {:.1}\n", stats.avg_tunnels));
        report.push_str(&format!("Avg time: {:.4}s (total {:.4}s)\n", stats.avg_time, stats.total_time));

        report
    }

    /// Get all results
    pub fn results(&self) -> &[RunResult] {
        &self.results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnnealingConfig;
    use crate::instance::Node;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn request() -> DispatchRequest {
        let stops = (0..7)
            .map(|i| Node::new(format!("S{}", i), 12.9 + 0.02 * i as f64, 77.5 + 0.03 * ((i * 3) % 5) as f64))
            .collect();
        DispatchRequest::new(Node::new("Depot", 12.95, 77.55), stops, 1)
    }

    fn config(parallel: bool) -> BenchmarkConfig {
        BenchmarkConfig {
            num_runs: 4,
            parallel,
            solver: SolverConfig {
                annealing: AnnealingConfig { iterations: 200, ..Default::default() },
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_benchmark_config() {
        let config = BenchmarkConfig::default();
        assert_eq!(config.num_runs, 5);
    }

    #[test]
    fn test_runs_every_seed() {
        let mut bench = Benchmark::new(config(false));
        let done = AtomicUsize::new(0);
        bench.run(&request(), |_| {
            done.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(done.load(Ordering::SeqCst), 4);
        let seeds: Vec<u64> = bench.results().iter().map(|r| r.seed).collect();
        assert_eq!(seeds, vec![42, 43, 44, 45]);

        let stats = bench.compute_statistics().unwrap();
        assert_eq!(stats.runs, 4);
        assert!(stats.best_energy <= stats.avg_energy && stats.avg_energy <= stats.worst_energy);
        assert!(stats.std_energy >= 0.0);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let mut sequential = Benchmark::new(config(false));
        sequential.run(&request(), |_| {});
        let mut parallel = Benchmark::new(config(true));
        parallel.run(&request(), |_| {});

        let energies = |b: &Benchmark| b.results().iter().map(|r| r.energy).collect::<Vec<_>>();
        assert_eq!(energies(&sequential), energies(&parallel));
    }

    #[test]
    fn test_report_without_runs() {
        let bench = Benchmark::new(BenchmarkConfig::default());
        assert!(bench.compute_statistics().is_none());
        assert!(bench.generate_report().contains("No runs recorded."));
    }
}
