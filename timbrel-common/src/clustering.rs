//! Seeded k-means over fingerprint space
//!
//! Centroid-based partitioning with k-means++ initialization, Lloyd
//! iteration, and a fixed number of seeded restarts keeping the
//! lowest-inertia solution. Every source of randomness flows from the caller
//! seed, so a fit over identical input reproduces identical centroids and
//! labels, and a reloaded model predicts identically to the one that was
//! saved.

use crate::fingerprint::{Fingerprint, FINGERPRINT_DIM};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Independent restarts per fit; the lowest-inertia result wins
const N_RESTARTS: u64 = 10;

/// Lloyd iteration cap per restart
const MAX_ITERATIONS: usize = 300;

/// Squared centroid movement below which a restart is converged
const CONVERGENCE_TOL: f32 = 1e-6;

/// Precondition failures rejected before any computation begins
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrainingError {
    #[error("cluster count must be positive")]
    ZeroClusters,

    #[error("no fingerprints to fit")]
    EmptySample,

    #[error("cluster count {k} exceeds sample count {available}")]
    TooFewSamples { k: usize, available: usize },
}

/// Model persistence errors
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("failed to read or write model file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed model file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("model expects {actual}-dimensional fingerprints, this build uses {expected}")]
    Dimensionality { expected: usize, actual: usize },

    #[error("model file has {actual} centroids but k = {k}")]
    CentroidCount { k: usize, actual: usize },
}

/// Fitted k-means model: k centroids in fingerprint space.
///
/// Immutable after fitting. Assignment is nearest-centroid by Euclidean
/// distance with ties broken toward the lowest centroid index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KMeansModel {
    k: usize,
    seed: u64,
    dim: usize,
    centroids: Vec<Fingerprint>,
}

impl KMeansModel {
    /// Partition `samples` into exactly `k` clusters.
    ///
    /// Rejects `k == 0`, an empty sample, and `k` greater than the sample
    /// count before touching any data. Runs [`N_RESTARTS`] independent
    /// k-means++ / Lloyd passes with per-restart seeds derived from `seed`
    /// and keeps the lowest-inertia centroids.
    pub fn fit(samples: &[Fingerprint], k: usize, seed: u64) -> Result<Self, TrainingError> {
        if k == 0 {
            return Err(TrainingError::ZeroClusters);
        }
        if samples.is_empty() {
            return Err(TrainingError::EmptySample);
        }
        if k > samples.len() {
            return Err(TrainingError::TooFewSamples {
                k,
                available: samples.len(),
            });
        }

        let mut best_centroids = run_restart(samples, k, seed, 0);
        let mut best_inertia = inertia(samples, &best_centroids);
        for restart in 1..N_RESTARTS {
            let centroids = run_restart(samples, k, seed, restart);
            let candidate = inertia(samples, &centroids);
            if candidate < best_inertia {
                best_inertia = candidate;
                best_centroids = centroids;
            }
        }
        debug!(
            "k-means fit: k = {}, {} samples, best inertia {:.4}",
            k,
            samples.len(),
            best_inertia
        );

        Ok(Self {
            k,
            seed,
            dim: FINGERPRINT_DIM,
            centroids: best_centroids,
        })
    }

    /// Label of the nearest centroid, in `0..k`
    pub fn predict(&self, fingerprint: &Fingerprint) -> u32 {
        nearest_centroid(fingerprint, &self.centroids) as u32
    }

    /// Labels for a whole sample set, in input order
    pub fn labels(&self, samples: &[Fingerprint]) -> Vec<u32> {
        samples.iter().map(|fp| self.predict(fp)).collect()
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn centroids(&self) -> &[Fingerprint] {
        &self.centroids
    }

    /// Serialize to a JSON model file.
    ///
    /// serde_json emits shortest round-trip float forms, so a reloaded model
    /// predicts bit-identically to this one.
    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load a previously saved model, validating its own metadata
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let raw = std::fs::read_to_string(path)?;
        let model: Self = serde_json::from_str(&raw)?;
        if model.dim != FINGERPRINT_DIM {
            return Err(ModelError::Dimensionality {
                expected: FINGERPRINT_DIM,
                actual: model.dim,
            });
        }
        if model.centroids.len() != model.k {
            return Err(ModelError::CentroidCount {
                k: model.k,
                actual: model.centroids.len(),
            });
        }
        Ok(model)
    }
}

/// One k-means++ / Lloyd pass with a restart-specific RNG
fn run_restart(samples: &[Fingerprint], k: usize, seed: u64, restart: u64) -> Vec<Fingerprint> {
    let mut rng = StdRng::seed_from_u64(seed.wrapping_add(restart));
    let mut centroids = init_centroids(samples, k, &mut rng);

    for _ in 0..MAX_ITERATIONS {
        let labels: Vec<usize> = samples
            .iter()
            .map(|fp| nearest_centroid(fp, &centroids))
            .collect();
        let updated = update_centroids(samples, &labels, &centroids, k);

        let shift = centroids
            .iter()
            .zip(&updated)
            .map(|(old, new)| old.squared_distance(new))
            .fold(0.0f32, f32::max);
        centroids = updated;
        if shift <= CONVERGENCE_TOL {
            break;
        }
    }
    centroids
}

/// k-means++ seeding: first centroid uniform, the rest weighted by squared
/// distance to the nearest centroid chosen so far
fn init_centroids(samples: &[Fingerprint], k: usize, rng: &mut StdRng) -> Vec<Fingerprint> {
    let mut centroids = Vec::with_capacity(k);
    centroids.push(samples[rng.gen_range(0..samples.len())]);

    let mut nearest: Vec<f32> = samples
        .iter()
        .map(|fp| fp.squared_distance(&centroids[0]))
        .collect();

    while centroids.len() < k {
        let total: f64 = nearest.iter().map(|&d| d as f64).sum();
        let chosen = if total > 0.0 {
            let mut target = rng.gen_range(0.0..total);
            let mut index = samples.len() - 1;
            for (i, &d) in nearest.iter().enumerate() {
                target -= d as f64;
                if target <= 0.0 {
                    index = i;
                    break;
                }
            }
            index
        } else {
            // All remaining samples coincide with existing centroids
            rng.gen_range(0..samples.len())
        };

        centroids.push(samples[chosen]);
        for (d, fp) in nearest.iter_mut().zip(samples) {
            let candidate = fp.squared_distance(&centroids[centroids.len() - 1]);
            if candidate < *d {
                *d = candidate;
            }
        }
    }
    centroids
}

/// Index of the closest centroid; ties resolve to the lowest index
fn nearest_centroid(fingerprint: &Fingerprint, centroids: &[Fingerprint]) -> usize {
    let mut best = 0;
    let mut best_distance = fingerprint.squared_distance(&centroids[0]);
    for (i, centroid) in centroids.iter().enumerate().skip(1) {
        let distance = fingerprint.squared_distance(centroid);
        if distance < best_distance {
            best = i;
            best_distance = distance;
        }
    }
    best
}

/// Mean of each cluster's members; a cluster that lost all members is
/// relocated to the sample currently farthest from its assigned centroid
fn update_centroids(
    samples: &[Fingerprint],
    labels: &[usize],
    previous: &[Fingerprint],
    k: usize,
) -> Vec<Fingerprint> {
    let mut sums = vec![[0.0f64; FINGERPRINT_DIM]; k];
    let mut counts = vec![0usize; k];
    for (fp, &label) in samples.iter().zip(labels) {
        counts[label] += 1;
        for (acc, &c) in sums[label].iter_mut().zip(fp.as_slice()) {
            *acc += c as f64;
        }
    }

    // Distances to each sample's own centroid, for empty-cluster repair
    let mut displacement: Vec<f32> = samples
        .iter()
        .zip(labels)
        .map(|(fp, &label)| fp.squared_distance(&previous[label]))
        .collect();

    let mut centroids = Vec::with_capacity(k);
    for cluster in 0..k {
        if counts[cluster] == 0 {
            let farthest = displacement
                .iter()
                .enumerate()
                .max_by(|(_, a), (_, b)| a.total_cmp(b))
                .map(|(i, _)| i)
                .unwrap_or(0);
            displacement[farthest] = 0.0;
            centroids.push(samples[farthest]);
            continue;
        }
        let mut mean = [0.0f32; FINGERPRINT_DIM];
        for (m, &sum) in mean.iter_mut().zip(&sums[cluster]) {
            *m = (sum / counts[cluster] as f64) as f32;
        }
        centroids.push(Fingerprint::from(mean));
    }
    centroids
}

/// Sum of squared distances from each sample to its nearest centroid
fn inertia(samples: &[Fingerprint], centroids: &[Fingerprint]) -> f64 {
    samples
        .iter()
        .map(|fp| fp.squared_distance(&centroids[nearest_centroid(fp, centroids)]) as f64)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two tight, well-separated blobs in fingerprint space
    fn two_blobs(per_blob: usize) -> Vec<Fingerprint> {
        let mut samples = Vec::new();
        for i in 0..per_blob {
            let jitter = i as f32 * 0.001;
            samples.push(Fingerprint::from([jitter; FINGERPRINT_DIM]));
        }
        for i in 0..per_blob {
            let jitter = 100.0 + i as f32 * 0.001;
            samples.push(Fingerprint::from([jitter; FINGERPRINT_DIM]));
        }
        samples
    }

    fn spread_samples(count: usize) -> Vec<Fingerprint> {
        (0..count)
            .map(|i| {
                let mut values = [0.0f32; FINGERPRINT_DIM];
                for (j, v) in values.iter_mut().enumerate() {
                    *v = ((i * 31 + j * 7) % 17) as f32 - 8.0;
                }
                Fingerprint::from(values)
            })
            .collect()
    }

    #[test]
    fn rejects_zero_clusters() {
        let samples = spread_samples(5);
        assert_eq!(
            KMeansModel::fit(&samples, 0, 42).unwrap_err(),
            TrainingError::ZeroClusters
        );
    }

    #[test]
    fn rejects_empty_sample() {
        assert_eq!(
            KMeansModel::fit(&[], 3, 42).unwrap_err(),
            TrainingError::EmptySample
        );
    }

    #[test]
    fn rejects_k_above_sample_count() {
        let samples = spread_samples(4);
        assert_eq!(
            KMeansModel::fit(&samples, 5, 42).unwrap_err(),
            TrainingError::TooFewSamples { k: 5, available: 4 }
        );
    }

    #[test]
    fn single_cluster_labels_everything_zero() {
        let samples = spread_samples(9);
        let model = KMeansModel::fit(&samples, 1, 42).unwrap();
        assert_eq!(model.labels(&samples), vec![0; 9]);
        assert_eq!(model.k(), 1);
    }

    #[test]
    fn k_equal_to_sample_count_is_accepted() {
        let samples = spread_samples(3);
        let model = KMeansModel::fit(&samples, 3, 42).unwrap();
        let labels = model.labels(&samples);
        assert!(labels.iter().all(|&l| (l as usize) < 3));
    }

    #[test]
    fn refit_reproduces_identical_labels() {
        let samples = spread_samples(20);
        let first = KMeansModel::fit(&samples, 4, 42).unwrap();
        let second = KMeansModel::fit(&samples, 4, 42).unwrap();

        assert_eq!(first.centroids(), second.centroids());
        let labels = first.labels(&samples);
        assert_eq!(labels, second.labels(&samples));
        assert!(labels.iter().all(|&l| l < 4));
    }

    #[test]
    fn separated_blobs_land_in_different_clusters() {
        let samples = two_blobs(10);
        let model = KMeansModel::fit(&samples, 2, 42).unwrap();
        let labels = model.labels(&samples);

        let first_blob = labels[0];
        let second_blob = labels[10];
        assert_ne!(first_blob, second_blob);
        assert!(labels[..10].iter().all(|&l| l == first_blob));
        assert!(labels[10..].iter().all(|&l| l == second_blob));
    }

    #[test]
    fn predict_is_stable_across_save_and_load() {
        let samples = spread_samples(20);
        let model = KMeansModel::fit(&samples, 4, 7).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kmeans_model.json");
        model.save(&path).unwrap();
        let reloaded = KMeansModel::load(&path).unwrap();

        assert_eq!(model.centroids(), reloaded.centroids());
        assert_eq!(reloaded.k(), 4);
        assert_eq!(reloaded.seed(), 7);
        let probes = spread_samples(50);
        for probe in &probes {
            assert_eq!(model.predict(probe), reloaded.predict(probe));
        }
    }

    #[test]
    fn load_rejects_foreign_dimensionality() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kmeans_model.json");
        let doctored = serde_json::json!({
            "k": 1,
            "seed": 42,
            "dim": 12,
            "centroids": [[0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]],
        });
        std::fs::write(&path, doctored.to_string()).unwrap();

        match KMeansModel::load(&path) {
            Err(ModelError::Dimensionality { expected, actual }) => {
                assert_eq!(expected, FINGERPRINT_DIM);
                assert_eq!(actual, 12);
            }
            other => panic!("expected dimensionality error, got {other:?}"),
        }
    }

    #[test]
    fn load_rejects_centroid_count_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kmeans_model.json");
        let doctored = serde_json::json!({
            "k": 2,
            "seed": 42,
            "dim": 13,
            "centroids": [[0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]],
        });
        std::fs::write(&path, doctored.to_string()).unwrap();

        assert!(matches!(
            KMeansModel::load(&path),
            Err(ModelError::CentroidCount { k: 2, actual: 1 })
        ));
    }

    #[test]
    fn load_fails_on_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            KMeansModel::load(&dir.path().join("absent.json")),
            Err(ModelError::Io(_))
        ));
    }
}
