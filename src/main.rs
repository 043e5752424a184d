//! Route Annealer - Command Line Interface
//!
//! Sequences delivery stops for a fleet from a JSON dispatch request.

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use route_annealer::benchmark::{Benchmark, BenchmarkConfig};
use route_annealer::dispatch::Dispatcher;
use route_annealer::instance::DispatchRequest;
use route_annealer::matrix::{MatrixBuilder, TravelProvider};
use route_annealer::solution::clock_label;
use route_annealer::SolverConfig;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "route-annealer")]
#[command(version = "1.0")]
#[command(about = "Multi-vehicle delivery routing with time windows and simulated annealing")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dispatch a request and print the routes
    Solve {
        /// Path to the JSON dispatch request
        #[arg(short, long)]
        request: PathBuf,

        /// JSON solver configuration
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the request seed
        #[arg(short, long)]
        seed: Option<u64>,

        /// Override the fleet size
        #[arg(long)]
        vehicles: Option<usize>,

        /// Return to the depot at the end
        #[arg(long)]
        round_trip: bool,

        /// Annealing iterations per route
        #[arg(long)]
        iterations: Option<usize>,

        /// Anneal clusters on the rayon pool
        #[arg(long)]
        parallel: bool,

        /// OSRM server for road distances
        #[cfg(feature = "osrm")]
        #[arg(long)]
        osrm_url: Option<String>,

        /// Write the full result as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write the per-stop itinerary as CSV
        #[arg(long)]
        itinerary: Option<PathBuf>,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Dispatch a request under several seeds and summarize the spread
    Benchmark {
        /// Path to the JSON dispatch request
        #[arg(short, long)]
        request: PathBuf,

        /// JSON solver configuration
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of seeds
        #[arg(short = 'n', long, default_value = "10")]
        runs: usize,

        /// Output directory for results
        #[arg(short, long, default_value = "results")]
        output: PathBuf,

        /// Run seeds one after another
        #[arg(long)]
        sequential: bool,
    },

    /// Analyze a request
    Analyze {
        /// Path to the JSON dispatch request
        #[arg(short, long)]
        request: PathBuf,
    },
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Solve {
            request,
            config,
            seed,
            vehicles,
            round_trip,
            iterations,
            parallel,
            #[cfg(feature = "osrm")]
            osrm_url,
            output,
            itinerary,
            verbose,
        } => {
            let mut solver = load_config(config.as_deref());
            if let Some(iterations) = iterations {
                solver.annealing.iterations = iterations;
            }
            solver.dispatch.parallel |= parallel;

            let mut request = load_request(&request);
            if let Some(seed) = seed {
                request.seed = seed;
            }
            if let Some(vehicles) = vehicles {
                request.vehicles = vehicles;
            }
            request.round_trip |= round_trip;

            #[cfg(feature = "osrm")]
            let provider = osrm_url.map(|url| osrm_provider(&url));
            #[cfg(not(feature = "osrm"))]
            let provider: Option<Arc<dyn TravelProvider>> = None;

            solve(&request, solver, provider, output, itinerary, verbose);
        }

        Commands::Benchmark { request, config, runs, output, sequential } => {
            let solver = load_config(config.as_deref());
            let request = load_request(&request);
            run_benchmark(&request, solver, runs, &output, !sequential);
        }

        Commands::Analyze { request } => {
            let request = load_request(&request);
            analyze_request(&request);
        }
    }
}

fn fail(message: String) -> ! {
    eprintln!("{}", message);
    std::process::exit(1);
}

fn load_config(path: Option<&Path>) -> SolverConfig {
    match path {
        Some(path) => SolverConfig::from_file(path).unwrap_or_else(|e| fail(format!("Error loading config: {}", e))),
        None => SolverConfig::default(),
    }
}

fn load_request(path: &Path) -> DispatchRequest {
    println!("Loading request from {:?}...", path);
    DispatchRequest::from_file(path).unwrap_or_else(|e| fail(format!("Error loading request: {}", e)))
}

#[cfg(feature = "osrm")]
fn osrm_provider(url: &str) -> Arc<dyn TravelProvider> {
    use route_annealer::osrm::OsrmProvider;

    match OsrmProvider::new(url, std::time::Duration::from_secs(3)) {
        Ok(provider) => Arc::new(provider),
        Err(e) => fail(format!("Error creating OSRM client: {}", e)),
    }
}

fn solve(
    request: &DispatchRequest,
    config: SolverConfig,
    provider: Option<Arc<dyn TravelProvider>>,
    output: Option<PathBuf>,
    itinerary: Option<PathBuf>,
    verbose: bool,
) {
    if verbose {
        println!("{}", request.statistics(&config.dispatch));
    }

    let mut dispatcher = Dispatcher::new(config);
    if let Some(provider) = provider {
        println!("Using {} travel tables", provider.name());
        dispatcher = dispatcher.with_provider(provider);
    }

    println!("Dispatching {} stops to {} vehicle(s)...", request.stops.len(), request.vehicle_count());
    let start = Instant::now();
    let result = dispatcher.dispatch(request);
    let elapsed = start.elapsed().as_secs_f64();

    println!("\n========== Dispatch ==========");
    print!("{}", result);
    println!("Time: {:.3}s", elapsed);

    if verbose {
        for (route, metrics) in result.routes.iter().zip(result.metrics.iter()) {
            println!("\nVehicle {} itinerary:", route.vehicle + 1);
            for visit in &metrics.visits {
                let node = &route.stops[visit.node];
                print!("  {} {:<24}", clock_label(visit.arrival), node.name);
                if visit.wait > 0.0 {
                    print!(" wait {:.0} min", visit.wait * 60.0);
                }
                if visit.lateness > 0.0 {
                    print!(" late {:.0} min", visit.lateness * 60.0);
                }
                println!();
            }
        }
    }

    if let Some(path) = output {
        let json = serde_json::to_string_pretty(&result)
            .unwrap_or_else(|e| fail(format!("Error serializing result: {}", e)));
        std::fs::write(&path, json).unwrap_or_else(|e| fail(format!("Error writing {:?}: {}", path, e)));
        println!("\nResult saved to {:?}", path);
    }

    if let Some(path) = itinerary {
        result
            .export_itinerary_csv(&path)
            .unwrap_or_else(|e| fail(format!("Error writing {:?}: {}", path, e)));
        println!("Itinerary exported to {:?}", path);
    }
}

fn run_benchmark(request: &DispatchRequest, solver: SolverConfig, runs: usize, output: &Path, parallel: bool) {
    std::fs::create_dir_all(output).unwrap_or_else(|e| fail(format!("Error creating {:?}: {}", output, e)));

    let config = BenchmarkConfig { num_runs: runs, parallel, solver };
    let mut benchmark = Benchmark::new(config);

    let bar = ProgressBar::new(runs as u64);
    if let Ok(style) = ProgressStyle::with_template("{bar:40} {pos}/{len} seeds [{elapsed_precise}] {msg}") {
        bar.set_style(style);
    }

    benchmark.run(request, |result| {
        bar.set_message(format!("seed {} energy {:.2}", result.seed, result.energy));
        bar.inc(1);
    });
    bar.finish_and_clear();

    let results_path = output.join("results.csv");
    benchmark
        .export_to_csv(&results_path)
        .unwrap_or_else(|e| fail(format!("Error exporting results: {}", e)));
    println!("Results exported to {:?}", results_path);

    let stats_path = output.join("statistics.csv");
    benchmark
        .export_statistics_csv(&stats_path)
        .unwrap_or_else(|e| fail(format!("Error exporting statistics: {}", e)));
    println!("Statistics exported to {:?}", stats_path);

    let report = benchmark.generate_report();
    println!("\n{}", report);

    let report_path = output.join("report.txt");
    std::fs::write(&report_path, &report).unwrap_or_else(|e| fail(format!("Error saving report: {}", e)));
    println!("Report saved to {:?}", report_path);
}

fn analyze_request(request: &DispatchRequest) {
    let config = SolverConfig::default();

    println!("========== Request Analysis ==========\n");
    println!("{}", request.statistics(&config.dispatch));

    let windowed: Vec<_> = request.stops.iter().filter_map(|n| n.window.map(|w| (n, w))).collect();
    if !windowed.is_empty() {
        println!("\nTime Windows:");
        for (node, window) in &windowed {
            println!("  {:<24} {} - {}", node.name, clock_label(window.start), clock_label(window.end));
        }
    }

    let builder = MatrixBuilder::geodesic(config.matrix);
    let matrices = builder.build(&request.all_nodes());
    println!("\nFrom depot (great-circle at {} km/h):", config.matrix.fallback_speed_kmh);
    for (i, stop) in request.stops.iter().enumerate() {
        println!(
            "  {:<24} {:>8.2} km  arrives {}",
            stop.name,
            matrices.distance(0, i + 1),
            clock_label(config.energy.day_start + matrices.duration(0, i + 1))
        );
    }
}
