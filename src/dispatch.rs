//! Hybrid dispatcher: clustering for the fleet, annealing for each route.
//!
//! Small single-vehicle requests are annealed directly. Otherwise the stops
//! are partitioned with k-means. A fleet gets one independent route per
//! cluster, all leaving from the depot. A single vehicle visits the clusters
//! nearest-centroid-first from wherever its route currently ends, annealing
//! each cluster from that last node.

use crate::config::SolverConfig;
use crate::heuristics::annealing::{AnnealOutcome, CancelToken, SimulatedAnnealing, Telemetry};
use crate::heuristics::clustering::{Cluster, Partitioner};
use crate::instance::{cluster_count, DispatchRequest, Node};
use crate::matrix::{great_circle_km, MatrixBuilder, TravelProvider};
use crate::solution::{DispatchResult, Route, RouteMetrics};
use ordered_float::OrderedFloat;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use std::sync::Arc;

/// Entry point of the optimizer.
///
/// A dispatcher carries configuration and injected collaborators only; all
/// search state lives inside a single [`dispatch`](Dispatcher::dispatch) call.
pub struct Dispatcher {
    config: SolverConfig,
    provider: Option<Arc<dyn TravelProvider>>,
    partitioner: Partitioner,
    cancel: Option<CancelToken>,
}

impl Dispatcher {
    /// Dispatcher using great-circle matrices and k-means clustering
    pub fn new(config: SolverConfig) -> Self {
        Dispatcher {
            config,
            provider: None,
            partitioner: Partitioner::kmeans(config.clustering),
            cancel: None,
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn TravelProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_partitioner(mut self, partitioner: Partitioner) -> Self {
        self.partitioner = partitioner;
        self
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    fn annealer(&self) -> SimulatedAnnealing {
        let annealer = SimulatedAnnealing::new(self.config.annealing, self.config.energy);
        match &self.cancel {
            Some(token) => annealer.with_cancel(token.clone()),
            None => annealer,
        }
    }

    /// Compute one route per vehicle for `request`.
    pub fn dispatch(&self, request: &DispatchRequest) -> DispatchResult {
        let builder = MatrixBuilder::new(self.provider.clone(), self.config.matrix);
        let annealer = self.annealer();
        let vehicles = request.vehicle_count();
        let mut rng = ChaCha8Rng::seed_from_u64(request.seed);

        let (sequences, telemetry) = if request.stops.is_empty() {
            log::info!("No stops to dispatch");
            (vec![vec![request.start.clone()]], Telemetry::default())
        } else if vehicles == 1 && 1 + request.stops.len() < self.config.dispatch.single_route_limit {
            log::info!("Annealing a single route over {} stops", request.stops.len());
            let outcome = annealer.anneal(&request.all_nodes(), &builder, &mut rng);
            (vec![outcome.route], outcome.telemetry)
        } else {
            let k = cluster_count(request.stops.len(), vehicles, &self.config.dispatch);
            let clusters = self.partitioner.partition(&request.stops, k, request.seed);
            log::info!(
                "Partitioned {} stops into {} clusters for {} vehicle(s)",
                request.stops.len(),
                clusters.len(),
                vehicles
            );

            if vehicles > 1 {
                self.fleet_routes(&request.start, &clusters, &annealer, &builder, &mut rng)
            } else {
                self.stitched_route(&request.start, clusters, &annealer, &builder, &mut rng)
            }
        };

        let close = request.round_trip || vehicles > 1;
        let routes: Vec<Route> = sequences
            .into_iter()
            .enumerate()
            .map(|(vehicle, mut stops)| {
                if close {
                    stops.push(request.start.clone());
                }
                Route { vehicle, stops }
            })
            .collect();

        let metrics = routes
            .iter()
            .map(|route| RouteMetrics::evaluate(route, &builder, &self.config))
            .collect();

        DispatchResult { routes, telemetry, metrics }
    }

    /// One independent depot-started route per cluster.
    fn fleet_routes(
        &self,
        start: &Node,
        clusters: &[Cluster],
        annealer: &SimulatedAnnealing,
        builder: &MatrixBuilder,
        rng: &mut ChaCha8Rng,
    ) -> (Vec<Vec<Node>>, Telemetry) {
        // Seeds are drawn up front so results do not depend on execution order
        let seeds: Vec<u64> = clusters.iter().map(|_| rng.gen()).collect();

        let run = |cluster: &Cluster, seed: u64| -> AnnealOutcome {
            let mut nodes = Vec::with_capacity(cluster.members.len() + 1);
            nodes.push(start.clone());
            nodes.extend(cluster.members.iter().cloned());
            annealer.anneal(&nodes, builder, &mut ChaCha8Rng::seed_from_u64(seed))
        };

        let outcomes: Vec<AnnealOutcome> = if self.config.dispatch.parallel {
            clusters
                .par_iter()
                .zip(seeds.par_iter())
                .map(|(cluster, &seed)| run(cluster, seed))
                .collect()
        } else {
            clusters.iter().zip(seeds.iter()).map(|(cluster, &seed)| run(cluster, seed)).collect()
        };

        let mut telemetry = Telemetry::default();
        let mut routes = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            telemetry.merge(outcome.telemetry);
            routes.push(outcome.route);
        }
        (routes, telemetry)
    }

    /// A single multi-leg route visiting clusters nearest-centroid-first.
    ///
    /// Each cluster is annealed with the current last node as its fixed start;
    /// other entry points into the cluster are not considered.
    fn stitched_route(
        &self,
        start: &Node,
        clusters: Vec<Cluster>,
        annealer: &SimulatedAnnealing,
        builder: &MatrixBuilder,
        rng: &mut ChaCha8Rng,
    ) -> (Vec<Vec<Node>>, Telemetry) {
        let mut route = vec![start.clone()];
        let mut remaining = clusters;
        let mut telemetry = Telemetry::default();

        while let Some(last) = route.last().cloned() {
            // min_by_key keeps the first of equally near clusters
            let Some(idx) = remaining
                .iter()
                .enumerate()
                .min_by_key(|(_, c)| OrderedFloat(great_circle_km(last.coords(), c.centroid)))
                .map(|(i, _)| i)
            else {
                break;
            };
            let cluster = remaining.remove(idx);
            log::debug!("Next cluster {} ({} stops) from {}", cluster.id, cluster.members.len(), last.name);

            let mut nodes = Vec::with_capacity(cluster.members.len() + 1);
            nodes.push(last);
            nodes.extend(cluster.members);

            let outcome = annealer.anneal(&nodes, builder, &mut ChaCha8Rng::seed_from_u64(rng.gen()));
            route.extend(outcome.route.into_iter().skip(1));
            telemetry.merge(outcome.telemetry);
        }

        (vec![route], telemetry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnnealingConfig;
    use crate::heuristics::clustering::{ClusteringError, ClusteringProvider};
    use std::collections::HashSet;

    fn depot() -> Node {
        Node::new("Depot", 12.97, 77.59)
    }

    fn stops(n: usize) -> Vec<Node> {
        (0..n)
            .map(|i| {
                let ring = (i % 3) as f64;
                let angle = i as f64 * 0.9;
                Node::new(
                    format!("S{}", i),
                    12.97 + (0.05 + 0.04 * ring) * angle.sin(),
                    77.59 + (0.05 + 0.04 * ring) * angle.cos(),
                )
            })
            .collect()
    }

    fn quick_config() -> SolverConfig {
        SolverConfig {
            annealing: AnnealingConfig { iterations: 300, ..Default::default() },
            ..Default::default()
        }
    }

    fn interior_names(result: &DispatchResult) -> Vec<String> {
        result
            .routes
            .iter()
            .flat_map(|r| r.stops.iter().filter(|n| n.name != "Depot").map(|n| n.name.clone()))
            .collect()
    }

    #[test]
    fn test_small_single_vehicle() {
        let request = DispatchRequest::new(depot(), stops(5), 1);
        let result = Dispatcher::new(SolverConfig::default()).dispatch(&request);
        assert_eq!(result.routes.len(), 1);
        assert_eq!(result.routes[0].stops.len(), 6);
        assert_eq!(result.routes[0].stops[0], depot());
        assert_eq!(result.telemetry.iterations(), 1500);
    }

    #[test]
    fn test_round_trip_appends_depot() {
        let request = DispatchRequest::new(depot(), stops(5), 1).round_trip(true);
        let result = Dispatcher::new(quick_config()).dispatch(&request);
        let route = &result.routes[0];
        assert_eq!(route.stops.len(), 7);
        assert_eq!(route.stops.first(), route.stops.last());
        assert!(route.is_round_trip());
    }

    #[test]
    fn test_fleet_of_three() {
        let request = DispatchRequest::new(depot(), stops(9), 3);
        let result = Dispatcher::new(quick_config()).dispatch(&request);

        assert!(result.routes.len() <= 3 && !result.routes.is_empty());
        for route in &result.routes {
            assert_eq!(route.stops[0], depot());
            assert_eq!(route.stops.last(), Some(&depot()));
        }

        let names = interior_names(&result);
        let unique: HashSet<&String> = names.iter().collect();
        assert_eq!(names.len(), 9);
        assert_eq!(unique.len(), 9);
        assert_eq!(result.metrics.len(), result.routes.len());
    }

    #[test]
    fn test_more_vehicles_than_stops() {
        let request = DispatchRequest::new(depot(), stops(2), 5);
        let result = Dispatcher::new(quick_config()).dispatch(&request);
        assert_eq!(result.routes.len(), 2);
        assert_eq!(interior_names(&result).len(), 2);
    }

    #[test]
    fn test_single_vehicle_stitching_covers_all() {
        let all = stops(17);
        let request = DispatchRequest::new(depot(), all.clone(), 1);
        let result = Dispatcher::new(quick_config()).dispatch(&request);

        assert_eq!(result.routes.len(), 1);
        let route = &result.routes[0];
        assert_eq!(route.stops[0], depot());
        assert_eq!(route.stops.len(), 18);

        let names: HashSet<String> = interior_names(&result).into_iter().collect();
        assert_eq!(names, all.iter().map(|n| n.name.clone()).collect());
        // 17 stops at five per leg: at most three annealed legs of 300 iterations
        let iterations = result.telemetry.iterations();
        assert!(iterations > 0 && iterations <= 900 && iterations % 300 == 0);
    }

    /// Five tight stops named `<group>-<i>` around `(lat, 0.0)`
    fn group(name: &str, lat: f64) -> Vec<Node> {
        [-0.002, -0.001, 0.0, 0.001, 0.002]
            .iter()
            .enumerate()
            .map(|(i, &off)| Node::new(format!("{}-{}", name, i), lat, off))
            .collect()
    }

    /// Group names in the order the route first enters them
    fn group_order(route: &Route) -> Vec<String> {
        let mut order: Vec<String> = Vec::new();
        for node in route.stops.iter().skip(1) {
            let group = node.name.split('-').next().unwrap_or_default().to_string();
            if order.last() != Some(&group) {
                order.push(group);
            }
        }
        order
    }

    /// Labels points north of the equator 0 and the rest 1
    struct Hemispheres;

    impl ClusteringProvider for Hemispheres {
        fn assign(&self, points: &[(f64, f64)], _k: usize, _seed: u64) -> Result<Vec<usize>, ClusteringError> {
            Ok(points.iter().map(|p| if p.0 > 0.0 { 0 } else { 1 }).collect())
        }

        fn name(&self) -> &str {
            "hemispheres"
        }
    }

    #[test]
    fn test_stitching_visits_nearest_cluster_first() {
        let depot = Node::new("Depot", 0.0, 0.0);
        let mut all = group("Far", 2.0);
        all.extend(group("Near", 0.5));
        all.extend(group("Mid", 1.0));

        let request = DispatchRequest::new(depot, all, 1);
        let result = Dispatcher::new(quick_config()).dispatch(&request);

        assert_eq!(result.routes.len(), 1);
        assert_eq!(result.routes[0].stops.len(), 16);
        assert_eq!(group_order(&result.routes[0]), vec!["Near", "Mid", "Far"]);
    }

    #[test]
    fn test_stitching_tie_goes_to_earlier_cluster() {
        // Centroids at (1, 0) and (-1, 0) are equally far from the depot;
        // the southern group is listed first but carries the later label
        let depot = Node::new("Depot", 0.0, 0.0);
        let mut all = group("South", -1.0);
        all.extend(group("North", 1.0));

        let request = DispatchRequest::new(depot, all, 1);
        let dispatcher = Dispatcher::new(quick_config()).with_partitioner(Partitioner::new(Box::new(Hemispheres)));
        let result = dispatcher.dispatch(&request);

        assert_eq!(group_order(&result.routes[0]), vec!["North", "South"]);
    }

    #[test]
    fn test_no_stops() {
        let request = DispatchRequest::new(depot(), Vec::new(), 2);
        let result = Dispatcher::new(quick_config()).dispatch(&request);
        assert_eq!(result.routes.len(), 1);
        assert_eq!(result.routes[0].stops, vec![depot(), depot()]);
        assert_eq!(result.telemetry, Telemetry::default());
    }

    #[test]
    fn test_deterministic_for_seed() {
        let request = DispatchRequest::new(depot(), stops(14), 1).with_seed(7);
        let dispatcher = Dispatcher::new(quick_config());
        let a = dispatcher.dispatch(&request);
        let b = dispatcher.dispatch(&request);
        assert_eq!(a.routes, b.routes);
        assert_eq!(a.telemetry, b.telemetry);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let request = DispatchRequest::new(depot(), stops(12), 3).with_seed(3);
        let sequential = Dispatcher::new(quick_config()).dispatch(&request);

        let mut config = quick_config();
        config.dispatch.parallel = true;
        let parallel = Dispatcher::new(config).dispatch(&request);

        assert_eq!(sequential.routes, parallel.routes);
        assert_eq!(sequential.telemetry, parallel.telemetry);
    }

    #[test]
    fn test_cancelled_dispatch_still_covers_stops() {
        let token = CancelToken::new();
        token.cancel();
        let request = DispatchRequest::new(depot(), stops(12), 2);
        let result = Dispatcher::new(quick_config()).with_cancel(token).dispatch(&request);
        assert_eq!(interior_names(&result).len(), 12);
        assert!(result.telemetry.history.is_empty());
    }
}
