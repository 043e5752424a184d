//! Dispatch results.
//!
//! This module provides the routes returned by the dispatcher, the logistics
//! metrics evaluated for each route, and itinerary export.

use crate::config::SolverConfig;
use crate::heuristics::annealing::Telemetry;
use crate::heuristics::energy::{energy, schedule, Visit};
use crate::instance::Node;
use crate::matrix::{MatrixBuilder, MatrixSource};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;

/// Ordered stops of one vehicle; `stops[0]` is where the vehicle starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub vehicle: usize,
    pub stops: Vec<Node>,
}

impl Route {
    pub fn len(&self) -> usize {
        self.stops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }

    /// Whether the route ends where it started
    pub fn is_round_trip(&self) -> bool {
        self.stops.len() > 1 && self.stops.first() == self.stops.last()
    }

    pub fn names(&self) -> Vec<&str> {
        self.stops.iter().map(|n| n.name.as_str()).collect()
    }
}

/// Logistics figures for one route, evaluated over the route as returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteMetrics {
    pub distance_km: f64,
    /// Driving time only, waits excluded
    pub travel_h: f64,
    /// Clock when the last stop is reached and served
    pub finish_clock: f64,
    pub lateness_h: f64,
    pub energy: f64,
    pub fuel_litres: f64,
    pub fuel_cost: f64,
    pub source: MatrixSource,
    pub visits: Vec<Visit>,
}

impl RouteMetrics {
    pub fn evaluate(route: &Route, builder: &MatrixBuilder, config: &SolverConfig) -> Self {
        let matrices = builder.build(&route.stops);
        let order: Vec<usize> = (0..route.stops.len()).collect();

        let distance_km: f64 = order.windows(2).map(|p| matrices.distance(p[0], p[1])).sum();
        let travel_h: f64 = order.windows(2).map(|p| matrices.duration(p[0], p[1])).sum();
        let visits = schedule(&order, &matrices, &route.stops, &config.energy);
        let lateness_h = visits.iter().map(|v| v.lateness).sum();
        let finish_clock = visits.last().map(|v| v.departure).unwrap_or(config.energy.day_start);

        let fuel_litres = if config.costs.km_per_litre > 0.0 {
            distance_km / config.costs.km_per_litre
        } else {
            0.0
        };

        RouteMetrics {
            distance_km,
            travel_h,
            finish_clock,
            lateness_h,
            energy: energy(&order, &matrices, &route.stops, &config.energy),
            fuel_litres,
            fuel_cost: fuel_litres * config.costs.fuel_price,
            source: matrices.source,
            visits,
        }
    }
}

/// Fleet-wide sums of [`RouteMetrics`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Totals {
    pub vehicles: usize,
    pub distance_km: f64,
    pub travel_h: f64,
    pub lateness_h: f64,
    pub energy: f64,
    pub fuel_litres: f64,
    pub fuel_cost: f64,
}

/// Routes, search telemetry and per-route metrics of one dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchResult {
    pub routes: Vec<Route>,
    pub telemetry: Telemetry,
    /// Parallel to `routes`
    pub metrics: Vec<RouteMetrics>,
}

#[derive(Debug, Serialize)]
struct ItineraryRow<'a> {
    vehicle: usize,
    position: usize,
    name: &'a str,
    lat: f64,
    lon: f64,
    arrival: f64,
    wait: f64,
    lateness: f64,
}

impl DispatchResult {
    pub fn totals(&self) -> Totals {
        self.metrics.iter().fold(
            Totals { vehicles: self.routes.len(), ..Default::default() },
            |mut t, m| {
                t.distance_km += m.distance_km;
                t.travel_h += m.travel_h;
                t.lateness_h += m.lateness_h;
                t.energy += m.energy;
                t.fuel_litres += m.fuel_litres;
                t.fuel_cost += m.fuel_cost;
                t
            },
        )
    }

    /// Write one CSV row per visit
    pub fn export_itinerary_csv<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let file = File::create(path)?;
        let mut writer = csv::Writer::from_writer(file);

        for (route, metrics) in self.routes.iter().zip(self.metrics.iter()) {
            for (position, visit) in metrics.visits.iter().enumerate() {
                let node = &route.stops[visit.node];
                writer.serialize(ItineraryRow {
                    vehicle: route.vehicle,
                    position,
                    name: &node.name,
                    lat: node.lat,
                    lon: node.lon,
                    arrival: visit.arrival,
                    wait: visit.wait,
                    lateness: visit.lateness,
                })?;
            }
        }

        writer.flush()?;
        Ok(())
    }
}

/// Format a fractional hour as `HH:MM`
pub fn clock_label(hours: f64) -> String {
    let minutes = (hours * 60.0).round().max(0.0) as u64;
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

impl std::fmt::Display for DispatchResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (route, m) in self.routes.iter().zip(self.metrics.iter()) {
            writeln!(f, "Vehicle {}", route.vehicle + 1)?;
            writeln!(f, "  Distance: {:.2} km", m.distance_km)?;
            writeln!(f, "  Driving: {:.2} h (done at {})", m.travel_h, clock_label(m.finish_clock))?;
            writeln!(f, "  Lateness: {:.2} h", m.lateness_h)?;
            writeln!(f, "  Fuel: {:.1} L ({:.2})", m.fuel_litres, m.fuel_cost)?;
            writeln!(f, "  Stops: {}", route.names().join(" -> "))?;
        }
        let totals = self.totals();
        writeln!(f, "Total distance: {:.2} km", totals.distance_km)?;
        writeln!(f, "Total fuel cost: {:.2}", totals.fuel_cost)?;
        writeln!(f, "Tunneling events: {}", self.telemetry.tunnels)?;
        writeln!(f, "Iterations: {}", self.telemetry.iterations())
    }
}
