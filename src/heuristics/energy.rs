//! Route energy: travelled distance plus a lateness penalty.
//!
//! A route is walked with a single running clock that starts at
//! `EnergyParams::day_start`. Arriving before a window opens waits for free;
//! arriving after it closes costs `late_penalty` km-equivalent per hour.

use crate::config::EnergyParams;
use crate::instance::Node;
use crate::matrix::TravelMatrices;
use serde::{Deserialize, Serialize};

/// Energy of visiting `nodes` in the order given by `route` (indices into `nodes`
/// and into the matrices).
pub fn energy(route: &[usize], matrices: &TravelMatrices, nodes: &[Node], params: &EnergyParams) -> f64 {
    let mut total = 0.0;
    let mut clock = params.day_start;

    for pair in route.windows(2) {
        let (u, v) = (pair[0], pair[1]);
        total += matrices.distance(u, v);
        clock += matrices.duration(u, v);

        if let Some(window) = nodes[v].window {
            let (settled, late) = window.settle(clock);
            clock = settled;
            total += late * params.late_penalty;
        }
    }

    total
}

/// One stop of a timed route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Visit {
    /// Index into the node list
    pub node: usize,
    /// Clock on arrival (hours)
    pub arrival: f64,
    /// Clock when service can start (after any free wait)
    pub departure: f64,
    pub wait: f64,
    pub lateness: f64,
}

/// Clock trace of a route, using the same window rule as [`energy`].
///
/// The first visit is the route start at `day_start`.
pub fn schedule(route: &[usize], matrices: &TravelMatrices, nodes: &[Node], params: &EnergyParams) -> Vec<Visit> {
    let mut visits = Vec::with_capacity(route.len());
    let Some(&first) = route.first() else {
        return visits;
    };

    let mut clock = params.day_start;
    visits.push(Visit { node: first, arrival: clock, departure: clock, wait: 0.0, lateness: 0.0 });

    for pair in route.windows(2) {
        let (u, v) = (pair[0], pair[1]);
        clock += matrices.duration(u, v);
        let arrival = clock;
        let mut lateness = 0.0;

        if let Some(window) = nodes[v].window {
            let (settled, late) = window.settle(clock);
            clock = settled;
            lateness = late;
        }

        visits.push(Visit { node: v, arrival, departure: clock, wait: clock - arrival, lateness });
    }

    visits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::TimeWindow;
    use crate::matrix::MatrixSource;

    fn matrices(distance: Vec<Vec<f64>>, duration: Vec<Vec<f64>>) -> TravelMatrices {
        TravelMatrices { distance, duration, source: MatrixSource::Network }
    }

    #[test]
    fn test_plain_distance() {
        let nodes = vec![Node::new("A", 0.0, 0.0), Node::new("B", 0.0, 0.1)];
        let m = matrices(vec![vec![0.0, 10.0], vec![10.0, 0.0]], vec![vec![0.0, 0.2], vec![0.2, 0.0]]);
        let e = energy(&[0, 1], &m, &nodes, &EnergyParams::default());
        assert!((e - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_late_arrival_penalty() {
        // Four hours of driving from 08:00 reaches the stop at 12:00, two hours past its window
        let nodes = vec![
            Node::new("Depot", 0.0, 0.0),
            Node::new("Late", 0.0, 1.0).with_window(TimeWindow::new(9.0, 10.0).unwrap()),
        ];
        let m = matrices(vec![vec![0.0, 30.0], vec![30.0, 0.0]], vec![vec![0.0, 4.0], vec![4.0, 0.0]]);
        let e = energy(&[0, 1], &m, &nodes, &EnergyParams::default());
        assert!((e - (30.0 + 200.0)).abs() < 1e-9);
    }

    #[test]
    fn test_early_arrival_waits_for_free() {
        let nodes = vec![
            Node::new("Depot", 0.0, 0.0),
            Node::new("Early", 0.0, 1.0).with_window(TimeWindow::new(11.0, 12.0).unwrap()),
            Node::new("Tight", 0.0, 2.0).with_window(TimeWindow::new(8.0, 11.5).unwrap()),
        ];
        let m = matrices(
            vec![vec![0.0, 5.0, 9.0], vec![5.0, 0.0, 4.0], vec![9.0, 4.0, 0.0]],
            vec![vec![0.0, 0.5, 1.0], vec![0.5, 0.0, 1.0], vec![1.0, 1.0, 0.0]],
        );
        let params = EnergyParams::default();
        // Arrive at 08:30, wait to 11:00, reach the last stop at 12:00: half an hour late
        let e = energy(&[0, 1, 2], &m, &nodes, &params);
        assert!((e - (9.0 + 50.0)).abs() < 1e-9);

        let visits = schedule(&[0, 1, 2], &m, &nodes, &params);
        assert_eq!(visits.len(), 3);
        assert!((visits[1].arrival - 8.5).abs() < 1e-12);
        assert!((visits[1].wait - 2.5).abs() < 1e-12);
        assert!((visits[2].arrival - 12.0).abs() < 1e-12);
        assert!((visits[2].lateness - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_energy_matches_schedule() {
        let nodes = vec![
            Node::new("Depot", 0.0, 0.0),
            Node::new("A", 0.0, 1.0).with_window(TimeWindow::new(8.0, 8.2).unwrap()),
            Node::new("B", 0.0, 2.0).with_window(TimeWindow::new(10.0, 10.5).unwrap()),
            Node::new("C", 0.0, 3.0),
        ];
        let m = matrices(
            vec![
                vec![0.0, 20.0, 35.0, 50.0],
                vec![21.0, 0.0, 15.0, 30.0],
                vec![34.0, 16.0, 0.0, 14.0],
                vec![49.0, 31.0, 13.0, 0.0],
            ],
            vec![
                vec![0.0, 0.4, 0.7, 1.0],
                vec![0.4, 0.0, 0.3, 0.6],
                vec![0.7, 0.3, 0.0, 0.3],
                vec![1.0, 0.6, 0.3, 0.0],
            ],
        );
        let params = EnergyParams::default();
        for route in [vec![0, 1, 2, 3], vec![0, 3, 2, 1], vec![0, 2, 1, 3]] {
            let visits = schedule(&route, &m, &nodes, &params);
            let distance: f64 = route.windows(2).map(|p| m.distance(p[0], p[1])).sum();
            let lateness: f64 = visits.iter().map(|v| v.lateness).sum();
            let e = energy(&route, &m, &nodes, &params);
            assert!((e - (distance + params.late_penalty * lateness)).abs() < 1e-9);
        }
    }

    #[test]
    fn test_trivial_routes() {
        let nodes = vec![Node::new("A", 0.0, 0.0)];
        let m = matrices(vec![vec![0.0]], vec![vec![0.0]]);
        assert_eq!(energy(&[0], &m, &nodes, &EnergyParams::default()), 0.0);
        assert_eq!(energy(&[], &m, &nodes, &EnergyParams::default()), 0.0);
        assert!(schedule(&[], &m, &nodes, &EnergyParams::default()).is_empty());
    }
}
