//! Cluster-co-membership recommendation
//!
//! Stateless per call: classify the query fingerprint, gather its cluster's
//! other members, and draw a seeded random sample. Pure given a fixed
//! catalog/model snapshot.

use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use timbrel_common::catalog::Catalog;
use timbrel_common::clustering::KMeansModel;
use timbrel_common::Fingerprint;

/// Default number of recommendations per query
pub const DEFAULT_COUNT: usize = 5;

/// Default sampling seed
pub const DEFAULT_SEED: u64 = 42;

/// Outcome of one recommendation query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecommendOutcome {
    /// Track ids sampled from the query's cluster, in draw order
    Recommendations { cluster: u32, tracks: Vec<String> },
    /// The predicted cluster has no other members; a defined non-error result
    NoRecommendations { cluster: u32 },
}

/// Read-only pairing of a labeled catalog and its fitted model
pub struct Recommender {
    catalog: Catalog,
    model: KMeansModel,
}

impl Recommender {
    pub fn new(catalog: Catalog, model: KMeansModel) -> Self {
        Self { catalog, model }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn model(&self) -> &KMeansModel {
        &self.model
    }

    /// Recommend up to `count` tracks sharing the query's timbre cluster.
    ///
    /// `exclude_track` drops the entry the query itself came from, so a
    /// cataloged track never recommends itself. Candidates are sorted by
    /// track id before sampling, so the result depends only on the candidate
    /// set, `seed`, and `count` - never on catalog row order. Output order
    /// is draw order.
    pub fn recommend(
        &self,
        query: &Fingerprint,
        exclude_track: Option<&str>,
        count: usize,
        seed: u64,
    ) -> RecommendOutcome {
        let cluster = self.model.predict(query);

        let mut candidates: Vec<&str> = self
            .catalog
            .entries_in_cluster(cluster)
            .map(|e| e.track_id.as_str())
            .filter(|id| Some(*id) != exclude_track)
            .collect();

        let take = count.min(candidates.len());
        if take == 0 {
            return RecommendOutcome::NoRecommendations { cluster };
        }
        candidates.sort_unstable();

        let mut rng = StdRng::seed_from_u64(seed);
        let tracks = index::sample(&mut rng, candidates.len(), take)
            .into_iter()
            .map(|i| candidates[i].to_string())
            .collect();

        RecommendOutcome::Recommendations { cluster, tracks }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use timbrel_common::catalog::CatalogEntry;
    use timbrel_common::FINGERPRINT_DIM;

    fn fp(fill: f32) -> Fingerprint {
        Fingerprint::from([fill; FINGERPRINT_DIM])
    }

    fn entry(track_id: &str, fill: f32, cluster: u32) -> CatalogEntry {
        CatalogEntry {
            track_id: track_id.to_string(),
            fingerprint: fp(fill),
            cluster: Some(cluster),
            analyzed_at: Utc::now(),
        }
    }

    /// Catalog split across two well-separated clusters, model fit on its
    /// own fingerprints
    fn recommender() -> Recommender {
        let near = [
            entry("near/a.mp3", 0.0, 0),
            entry("near/b.mp3", 0.1, 0),
            entry("near/c.mp3", 0.2, 0),
            entry("near/d.mp3", 0.3, 0),
        ];
        let far = [entry("far/x.mp3", 100.0, 1), entry("far/y.mp3", 100.1, 1)];

        let fingerprints: Vec<_> = near
            .iter()
            .chain(far.iter())
            .map(|e| e.fingerprint)
            .collect();
        let model = KMeansModel::fit(&fingerprints, 2, 42).unwrap();

        // Align entry labels with whatever the fit called each blob
        let near_label = model.predict(&fp(0.0));
        let far_label = model.predict(&fp(100.0));
        assert_ne!(near_label, far_label);

        let entries: Vec<CatalogEntry> = near
            .iter()
            .map(|e| CatalogEntry {
                cluster: Some(near_label),
                ..e.clone()
            })
            .chain(far.iter().map(|e| CatalogEntry {
                cluster: Some(far_label),
                ..e.clone()
            }))
            .collect();

        Recommender::new(Catalog::from_entries(entries).unwrap(), model)
    }

    #[test]
    fn identical_queries_return_identical_lists() {
        let recommender = recommender();
        let first = recommender.recommend(&fp(0.05), None, 3, 42);
        let second = recommender.recommend(&fp(0.05), None, 3, 42);
        assert_eq!(first, second);
    }

    #[test]
    fn excluded_track_never_appears() {
        let recommender = recommender();
        // Ask for more than exist so every candidate would be drawn
        let outcome = recommender.recommend(&fp(0.0), Some("near/a.mp3"), 10, 42);
        match outcome {
            RecommendOutcome::Recommendations { tracks, .. } => {
                assert_eq!(tracks.len(), 3);
                assert!(!tracks.contains(&"near/a.mp3".to_string()));
            }
            other => panic!("expected recommendations, got {other:?}"),
        }
    }

    #[test]
    fn count_bounds_the_result() {
        let recommender = recommender();

        let outcome = recommender.recommend(&fp(0.0), None, 2, 42);
        match outcome {
            RecommendOutcome::Recommendations { tracks, .. } => assert_eq!(tracks.len(), 2),
            other => panic!("expected recommendations, got {other:?}"),
        }

        // count above candidate count returns every candidate
        let outcome = recommender.recommend(&fp(0.0), None, 50, 42);
        match outcome {
            RecommendOutcome::Recommendations { tracks, .. } => {
                let mut sorted = tracks.clone();
                sorted.sort();
                assert_eq!(
                    sorted,
                    vec!["near/a.mp3", "near/b.mp3", "near/c.mp3", "near/d.mp3"]
                );
            }
            other => panic!("expected recommendations, got {other:?}"),
        }
    }

    #[test]
    fn lone_cluster_member_gets_no_recommendations() {
        let fingerprints = vec![fp(0.0), fp(100.0), fp(100.1)];
        let model = KMeansModel::fit(&fingerprints, 2, 42).unwrap();
        let lone_label = model.predict(&fp(0.0));
        let far_label = model.predict(&fp(100.0));

        let entries = vec![
            entry("lone.mp3", 0.0, lone_label),
            entry("other1.mp3", 100.0, far_label),
            entry("other2.mp3", 100.1, far_label),
        ];
        let recommender = Recommender::new(Catalog::from_entries(entries).unwrap(), model);

        let outcome = recommender.recommend(&fp(0.0), Some("lone.mp3"), 5, 42);
        assert_eq!(
            outcome,
            RecommendOutcome::NoRecommendations { cluster: lone_label }
        );
    }

    #[test]
    fn result_is_independent_of_catalog_row_order() {
        let base = recommender();
        let mut reversed_entries: Vec<CatalogEntry> = base.catalog().iter().cloned().collect();
        reversed_entries.reverse();
        let reversed = Recommender::new(
            Catalog::from_entries(reversed_entries).unwrap(),
            base.model().clone(),
        );

        let query = fp(0.1);
        assert_eq!(
            base.recommend(&query, None, 3, 7),
            reversed.recommend(&query, None, 3, 7)
        );
    }
}
