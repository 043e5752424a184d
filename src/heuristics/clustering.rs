//! Spatial partitioning of stops.
//!
//! The [`Partitioner`] splits stops into at most `k` groups through a
//! [`ClusteringProvider`] and attaches the plain mean of member coordinates to
//! each group. The built-in provider is seeded k-means on raw
//! `(lat, lon)` pairs, which is a fair approximation at city and regional
//! scale.

use crate::config::ClusteringConfig;
use crate::instance::Node;
use rand::distributions::WeightedIndex;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

/// Failure reported by a [`ClusteringProvider`].
#[derive(Debug, Clone, PartialEq)]
pub enum ClusteringError {
    InvalidK { k: usize, points: usize },
    Malformed(String),
}

impl std::fmt::Display for ClusteringError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClusteringError::InvalidK { k, points } => write!(f, "cannot form {} clusters from {} points", k, points),
            ClusteringError::Malformed(reason) => write!(f, "malformed clustering: {}", reason),
        }
    }
}

impl std::error::Error for ClusteringError {}

/// Assigns a label in `0..k` to every point, deterministically for a given seed.
pub trait ClusteringProvider: Send + Sync {
    fn assign(&self, points: &[(f64, f64)], k: usize, seed: u64) -> Result<Vec<usize>, ClusteringError>;
    fn name(&self) -> &str;
}

/// Lloyd's k-means with k-means++ seeding and several restarts.
#[derive(Debug, Clone, Default)]
pub struct KMeans {
    pub config: ClusteringConfig,
}

#[inline]
fn sq_dist(a: (f64, f64), b: (f64, f64)) -> f64 {
    let dx = a.0 - b.0;
    let dy = a.1 - b.1;
    dx * dx + dy * dy
}

fn nearest(point: (f64, f64), centroids: &[(f64, f64)]) -> (usize, f64) {
    let mut best_cluster = 0;
    let mut min_dist = f64::INFINITY;
    for (c, &centroid) in centroids.iter().enumerate() {
        let dist = sq_dist(point, centroid);
        if dist < min_dist {
            min_dist = dist;
            best_cluster = c;
        }
    }
    (best_cluster, min_dist)
}

impl KMeans {
    pub fn new(config: ClusteringConfig) -> Self {
        KMeans { config }
    }

    /// k-means++: each new centroid is drawn with probability proportional to
    /// its squared distance from the closest centroid chosen so far.
    fn seed_centroids(&self, points: &[(f64, f64)], k: usize, rng: &mut ChaCha8Rng) -> Vec<(f64, f64)> {
        let mut centroids = Vec::with_capacity(k);
        centroids.push(points[rng.gen_range(0..points.len())]);

        while centroids.len() < k {
            let weights: Vec<f64> = points.iter().map(|&p| nearest(p, &centroids).1).collect();
            let idx = match WeightedIndex::new(&weights) {
                Ok(dist) => dist.sample(rng),
                // Every point coincides with a centroid
                Err(_) => rng.gen_range(0..points.len()),
            };
            centroids.push(points[idx]);
        }

        centroids
    }

    /// One restart: returns labels and inertia.
    fn run_once(&self, points: &[(f64, f64)], k: usize, rng: &mut ChaCha8Rng) -> (Vec<usize>, f64) {
        let mut centroids = self.seed_centroids(points, k, rng);
        let mut labels = vec![0usize; points.len()];

        for _ in 0..self.config.max_iterations.max(1) {
            for (i, &p) in points.iter().enumerate() {
                labels[i] = nearest(p, &centroids).0;
            }

            let mut sums = vec![(0.0, 0.0, 0usize); k];
            for (i, &p) in points.iter().enumerate() {
                let s = &mut sums[labels[i]];
                s.0 += p.0;
                s.1 += p.1;
                s.2 += 1;
            }

            let mut shift = 0.0;
            for (c, &(sx, sy, count)) in sums.iter().enumerate() {
                // An emptied cluster keeps its previous centroid
                if count > 0 {
                    let updated = (sx / count as f64, sy / count as f64);
                    shift += sq_dist(updated, centroids[c]).sqrt();
                    centroids[c] = updated;
                }
            }

            if shift <= self.config.tolerance {
                break;
            }
        }

        let mut inertia = 0.0;
        for (i, &p) in points.iter().enumerate() {
            let (c, dist) = nearest(p, &centroids);
            labels[i] = c;
            inertia += dist;
        }

        (labels, inertia)
    }
}

impl ClusteringProvider for KMeans {
    fn assign(&self, points: &[(f64, f64)], k: usize, seed: u64) -> Result<Vec<usize>, ClusteringError> {
        if k == 0 || k > points.len() {
            return Err(ClusteringError::InvalidK { k, points: points.len() });
        }
        if points.iter().any(|p| !p.0.is_finite() || !p.1.is_finite()) {
            return Err(ClusteringError::Malformed("non-finite coordinates".to_string()));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut best: Option<(Vec<usize>, f64)> = None;

        for _ in 0..self.config.restarts.max(1) {
            let (labels, inertia) = self.run_once(points, k, &mut rng);
            if best.as_ref().map_or(true, |(_, b)| inertia < *b) {
                best = Some((labels, inertia));
            }
        }

        best.map(|(labels, _)| labels)
            .ok_or_else(|| ClusteringError::Malformed("no restart produced labels".to_string()))
    }

    fn name(&self) -> &str {
        "k-means"
    }
}

/// A group of stops and the mean of their coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    /// Label assigned by the provider
    pub id: usize,
    /// Members in input order
    pub members: Vec<Node>,
    /// (mean lat, mean lon)
    pub centroid: (f64, f64),
}

/// Splits stops into spatial groups.
pub struct Partitioner {
    provider: Box<dyn ClusteringProvider>,
}

impl Partitioner {
    pub fn new(provider: Box<dyn ClusteringProvider>) -> Self {
        Partitioner { provider }
    }

    pub fn kmeans(config: ClusteringConfig) -> Self {
        Self::new(Box::new(KMeans::new(config)))
    }

    /// Partition `stops` into at most `k` non-empty clusters, ordered by label.
    ///
    /// `k` is clamped to `[1, stops.len()]`. If the provider fails, the
    /// cluster count is reduced until it succeeds; a single cluster needs no
    /// provider at all.
    pub fn partition(&self, stops: &[Node], k: usize, seed: u64) -> Vec<Cluster> {
        if stops.is_empty() {
            return Vec::new();
        }

        let requested = k;
        let mut k = k.clamp(1, stops.len());
        if k != requested {
            log::debug!("Cluster count clamped from {} to {}", requested, k);
        }

        let points: Vec<(f64, f64)> = stops.iter().map(Node::coords).collect();
        let labels = loop {
            if k == 1 {
                break vec![0; stops.len()];
            }
            match self.provider.assign(&points, k, seed) {
                Ok(labels) if labels.len() == stops.len() && labels.iter().all(|&l| l < k) => break labels,
                Ok(labels) => log::warn!(
                    "{} returned {} labels for {} points with k={}",
                    self.provider.name(),
                    labels.len(),
                    stops.len(),
                    k
                ),
                Err(e) => log::warn!("{} failed with k={}: {}", self.provider.name(), k, e),
            }
            k -= 1;
        };

        let mut groups: Vec<Vec<Node>> = vec![Vec::new(); k];
        for (stop, &label) in stops.iter().zip(labels.iter()) {
            groups[label].push(stop.clone());
        }

        groups
            .into_iter()
            .enumerate()
            .filter(|(_, members)| !members.is_empty())
            .map(|(id, members)| {
                let lat = members.iter().map(|n| n.lat).sum::<f64>() / members.len() as f64;
                let lon = members.iter().map(|n| n.lon).sum::<f64>() / members.len() as f64;
                Cluster { id, members, centroid: (lat, lon) }
            })
            .collect()
    }
}

impl Default for Partitioner {
    fn default() -> Self {
        Self::kmeans(ClusteringConfig::default())
    }
}
