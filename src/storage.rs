use std::borrow::Cow;
use std::fmt;
use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, info};

use crate::config::RecommenderConfig;
use crate::error::{RecError, Result};
use crate::io::RatingObservation;
use crate::knn::galloping::galloping_neighborhood;
use crate::knn::inverted_list::{InvertedList, Posting};
use crate::knn::merge::{merge_neighborhood, WeightedList};
use crate::knn::neighborhood_cache::NeighborhoodCache;
use crate::knn::posting_store::{PostingIndex, PostingListStore};
use crate::knn::prediction::{
    predict_item_based, predict_user_based, to_rating_scale, top_predictions,
    unseen_items_of_neighbors,
};
use crate::knn::{Neighborhood, Paradigm, SimilarityAlgorithm};
use crate::ratings::normalization::Normalization;
use crate::ratings::{RatedResource, RatingStore};
use crate::resource_index::ResourceIndex;
use crate::ResourceId;

/// Pipeline stage of a [`RecommenderStorage`].
///
/// Ratings are only accepted while ingesting. Normalisation moves the session
/// forward once, compaction freezes the posting lists for queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Ingesting,
    Normalized,
    Indexed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Ingesting => f.write_str("ingesting"),
            Phase::Normalized => f.write_str("normalized"),
            Phase::Indexed => f.write_str("indexed"),
        }
    }
}

/// One recommendation session: resource ids, ratings, posting lists and
/// neighbourhoods, built strictly in that order.
#[derive(Debug)]
pub struct RecommenderStorage {
    config: RecommenderConfig,
    resources: ResourceIndex,
    ratings: RatingStore,
    postings: PostingIndex,
    neighborhoods: NeighborhoodCache,
    phase: Phase,
}

impl RecommenderStorage {
    pub fn new(config: RecommenderConfig) -> Result<Self> {
        config.validate()?;
        let postings = PostingIndex::new(config.posting_lists, config.rating_levels);
        Ok(RecommenderStorage {
            config,
            resources: ResourceIndex::new(),
            ratings: RatingStore::new(),
            postings,
            neighborhoods: NeighborhoodCache::new(),
            phase: Phase::Ingesting,
        })
    }

    pub fn config(&self) -> &RecommenderConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn ratings(&self) -> &RatingStore {
        &self.ratings
    }

    pub fn postings(&self) -> &PostingIndex {
        &self.postings
    }

    fn require_phase(&self, operation: &'static str, allowed: &[Phase]) -> Result<()> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(RecError::PhaseViolation {
                operation,
                phase: self.phase,
            })
        }
    }

    pub fn intern(&mut self, uri: &str) -> Result<ResourceId> {
        self.resources.intern(uri)
    }

    pub fn lookup(&self, uri: &str) -> Option<ResourceId> {
        self.resources.lookup(uri)
    }

    pub fn resolve(&self, id: ResourceId) -> Option<&str> {
        self.resources.resolve(id)
    }

    pub fn require(&self, uri: &str) -> Result<ResourceId> {
        self.resources.require(uri)
    }

    pub fn require_uri(&self, id: ResourceId) -> Result<&str> {
        self.resources.require_uri(id)
    }

    pub fn resource_counter(&self) -> usize {
        self.resources.resource_counter()
    }

    /// Appends a rating between two interned resources.
    pub fn add_rating(&mut self, user: ResourceId, item: ResourceId, rating: f64) -> Result<()> {
        self.require_phase("add_rating", &[Phase::Ingesting])?;
        self.resources.require_uri(user)?;
        self.resources.require_uri(item)?;
        self.ratings.add_rating(user, item, rating);
        Ok(())
    }

    pub fn ingest_observation(&mut self, observation: &RatingObservation) -> Result<()> {
        self.require_phase("ingest", &[Phase::Ingesting])?;
        let user = self.resources.intern(&observation.user)?;
        let item = self.resources.intern(&observation.item)?;
        self.ratings.add_rating(user, item, observation.rating);
        Ok(())
    }

    /// Ingests a rating stream. Every observation is validated before the first
    /// one is stored, so a malformed record leaves the session unchanged.
    pub fn ingest<I>(&mut self, observations: I) -> Result<usize>
    where
        I: IntoIterator<Item = RatingObservation>,
    {
        self.require_phase("ingest", &[Phase::Ingesting])?;
        let observations: Vec<RatingObservation> = observations.into_iter().collect();
        for (position, observation) in observations.iter().enumerate() {
            observation.validate(position + 1)?;
        }
        for observation in &observations {
            self.ingest_observation(observation)?;
        }
        info!(
            observations = observations.len(),
            resources = self.resources.resource_counter(),
            users = self.ratings.num_users(),
            "ingested ratings"
        );
        Ok(observations.len())
    }

    /// Normalises every user's ratings. Allowed once per session.
    pub fn normalize(&mut self, strategy: Normalization) -> Result<()> {
        self.require_phase("normalize", &[Phase::Ingesting])?;
        let start = Instant::now();
        self.ratings.normalize(strategy)?;
        self.phase = Phase::Normalized;
        info!(
            %strategy,
            users = self.ratings.num_users(),
            ratings = self.ratings.num_ratings(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "normalized ratings"
        );
        Ok(())
    }

    /// Adds the postings of one user. Unfreezes compacted lists and drops the
    /// neighbourhoods derived from them.
    pub fn build_for_user(&mut self, user: ResourceId) -> Result<()> {
        self.require_phase("build_for_user", &[Phase::Normalized, Phase::Indexed])?;
        self.unfreeze();
        let ratings = self.ratings.require_ratings(user)?;
        self.postings.build_for_user(user, ratings);
        Ok(())
    }

    /// Rebuilds the posting lists of every user from scratch.
    pub fn build_all(&mut self) -> Result<()> {
        self.require_phase("build_all", &[Phase::Normalized, Phase::Indexed])?;
        self.unfreeze();
        let start = Instant::now();
        self.postings.clear();
        for user in self.ratings.users() {
            if let Some(ratings) = self.ratings.ratings(user) {
                self.postings.build_for_user(user, ratings);
            }
        }
        info!(
            variant = %self.postings.variant(),
            lists = self.postings.num_lists(),
            postings = self.postings.num_postings(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "built posting lists"
        );
        Ok(())
    }

    fn unfreeze(&mut self) {
        if self.phase == Phase::Indexed {
            debug!(
                neighborhoods = self.neighborhoods.len(),
                "posting lists changed, dropping cached neighborhoods"
            );
            self.neighborhoods.clear();
            self.phase = Phase::Normalized;
        }
    }

    /// Sorts and compacts every list and marks the top resources to fold.
    /// Queries are answered from here on.
    pub fn compact_and_sort_all(&mut self) -> Result<()> {
        self.require_phase("compact_and_sort_all", &[Phase::Normalized, Phase::Indexed])?;
        let start = Instant::now();
        self.postings.compact_and_sort_all();
        let top_resources = self.config.top_resources;
        if top_resources > 0 {
            if let Some(scaled) = self.postings.as_scaled_mut() {
                let selected = scaled.select_top_resources(top_resources);
                debug!(top_resources = ?selected, "selected top resources to fold");
            }
        }
        self.phase = Phase::Indexed;
        info!(
            lists = self.postings.num_lists(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "compacted posting lists"
        );
        Ok(())
    }

    /// The unscaled posting list of `item`.
    pub fn get_list(&self, item: ResourceId) -> Option<&InvertedList> {
        self.postings.get_list(item)
    }

    /// The `neighborhood_size_k` most similar users (or items) of `anchor`.
    pub fn compute_neighborhood(&self, anchor: ResourceId) -> Result<Neighborhood> {
        self.require_phase("compute_neighborhood", &[Phase::Indexed])?;
        let k = self.config.neighborhood_size_k;

        let entries = match (self.config.paradigm, self.config.similarity) {
            (Paradigm::UserBased, SimilarityAlgorithm::Merge) => {
                let anchor_vector = self.ratings.require_ratings(anchor)?;
                let anchor_lists = self.postings.anchor_lists(anchor_vector);
                let lists: Vec<WeightedList<'_, Posting>> = anchor_lists
                    .iter()
                    .map(|anchor_list| {
                        WeightedList::new(anchor_list.list.postings(), anchor_list.weight)
                    })
                    .collect();
                merge_neighborhood(
                    anchor,
                    self.ratings.user_norm(anchor),
                    &lists,
                    |user| self.ratings.user_norm(user),
                    k,
                )
            }
            (Paradigm::UserBased, SimilarityAlgorithm::Galloping) => {
                let anchor_vector = self.ratings.require_ratings(anchor)?;
                let candidates = self.ratings.users().into_iter().filter_map(|user| {
                    self.ratings
                        .ratings(user)
                        .map(|vector| (user, vector, self.ratings.user_norm(user)))
                });
                galloping_neighborhood(
                    anchor,
                    anchor_vector,
                    self.ratings.user_norm(anchor),
                    candidates,
                    k,
                )
            }
            (Paradigm::ItemBased, SimilarityAlgorithm::Merge) => {
                let anchor_list = self.require_list(anchor)?;
                // Every rater's vector, weighted with the rater's score of the anchor item.
                let lists: Vec<WeightedList<'_, RatedResource>> = anchor_list
                    .postings()
                    .iter()
                    .filter_map(|posting| {
                        self.ratings
                            .ratings(posting.user)
                            .map(|vector| WeightedList::new(vector, posting.score))
                    })
                    .collect();
                merge_neighborhood(
                    anchor,
                    self.ratings.item_norm(anchor),
                    &lists,
                    |item| self.ratings.item_norm(item),
                    k,
                )
            }
            (Paradigm::ItemBased, SimilarityAlgorithm::Galloping) => {
                let anchor_list = self.require_list(anchor)?;
                let candidates = self.ratings.items().into_iter().filter_map(|item| {
                    self.postings
                        .get_list(item)
                        .map(|list| (item, list.postings(), self.ratings.item_norm(item)))
                });
                galloping_neighborhood(
                    anchor,
                    anchor_list.postings(),
                    self.ratings.item_norm(anchor),
                    candidates,
                    k,
                )
            }
        };

        Ok(Neighborhood::new(anchor, entries))
    }

    fn require_list(&self, item: ResourceId) -> Result<&InvertedList> {
        self.postings
            .get_list(item)
            .ok_or_else(|| RecError::NotIndexed(format!("item #{}", item)))
    }

    /// Computes and caches the neighbourhood of every user (or item) in parallel.
    pub fn compute_all_neighborhoods(&mut self) -> Result<usize> {
        self.require_phase("compute_all_neighborhoods", &[Phase::Indexed])?;
        let start = Instant::now();
        let anchors = match self.config.paradigm {
            Paradigm::UserBased => self.ratings.users(),
            Paradigm::ItemBased => self.ratings.items(),
        };

        let neighborhoods: Vec<Neighborhood> = anchors
            .par_iter()
            .map(|anchor| self.compute_neighborhood(*anchor))
            .collect::<Result<_>>()?;

        let num_neighborhoods = neighborhoods.len();
        self.neighborhoods = NeighborhoodCache::with_capacity(self.resources.resource_counter());
        for neighborhood in neighborhoods {
            self.neighborhoods.store_neighborhood(neighborhood);
        }

        if let Some(scaled) = self.postings.as_scaled() {
            let (hits, misses) = scaled.fold_cache_stats();
            debug!(hits, misses, folds = scaled.fold_cache_len(), "fold cache usage");
        }
        info!(
            paradigm = %self.config.paradigm,
            similarity = %self.config.similarity,
            neighborhoods = num_neighborhoods,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "computed neighborhoods"
        );
        Ok(num_neighborhoods)
    }

    pub fn get_neighborhood(&self, id: ResourceId) -> Option<&[RatedResource]> {
        self.neighborhoods.get_neighborhood(id)
    }

    pub fn store_neighborhood(&mut self, neighborhood: Neighborhood) {
        self.neighborhoods.store_neighborhood(neighborhood);
    }

    /// Cached neighbourhood of `anchor`, computed on the fly when absent.
    fn neighborhood_of(&self, anchor: ResourceId) -> Result<Cow<'_, [RatedResource]>> {
        match self.neighborhoods.get_neighborhood(anchor) {
            Some(entries) => Ok(Cow::Borrowed(entries)),
            None => Ok(Cow::Owned(self.compute_neighborhood(anchor)?.entries)),
        }
    }

    /// Predicted rating of `user` for `item` on the user's rating scale, rounded
    /// to the configured precision. `None` when no neighbour contributes.
    pub fn predict(&self, user: ResourceId, item: ResourceId) -> Result<Option<f64>> {
        self.require_phase("predict", &[Phase::Indexed])?;
        self.ratings.require_ratings(user)?;

        let normalized = match self.config.paradigm {
            Paradigm::UserBased => {
                let neighbors = self.neighborhood_of(user)?;
                predict_user_based(&self.ratings, &neighbors, item)
            }
            Paradigm::ItemBased => {
                let neighbors = self.neighborhood_of(item)?;
                predict_item_based(&self.ratings, user, &neighbors)
            }
        };

        Ok(normalized.map(|value| {
            to_rating_scale(&self.ratings, user, value, self.config.decimal_precision)
        }))
    }

    /// The `how_many` unrated items with the highest predicted rating for `user`.
    pub fn recommend(&self, user: ResourceId, how_many: usize) -> Result<Vec<RatedResource>> {
        self.require_phase("recommend", &[Phase::Indexed])?;
        self.ratings.require_ratings(user)?;
        let precision = self.config.decimal_precision;

        match self.config.paradigm {
            Paradigm::UserBased => {
                let neighbors = self.neighborhood_of(user)?;
                let scored = unseen_items_of_neighbors(&self.ratings, user, &neighbors)
                    .into_iter()
                    .filter_map(|item| {
                        predict_user_based(&self.ratings, &neighbors, item).map(|value| {
                            (item, to_rating_scale(&self.ratings, user, value, precision))
                        })
                    });
                Ok(top_predictions(scored, how_many))
            }
            Paradigm::ItemBased => {
                let mut scored = Vec::new();
                for item in self.ratings.items() {
                    if self.ratings.rating(user, item).is_some() {
                        continue;
                    }
                    if let Some(prediction) = self.predict(user, item)? {
                        scored.push((item, prediction));
                    }
                }
                Ok(top_predictions(scored, how_many))
            }
        }
    }

    /// Normalise, build, compact and compute every neighbourhood.
    pub fn prepare(&mut self) -> Result<()> {
        self.normalize(self.config.normalization)?;
        self.build_all()?;
        self.compact_and_sort_all()?;
        self.compute_all_neighborhoods()?;
        Ok(())
    }

    /// Clears all state for a new session.
    pub fn reset(&mut self) {
        self.resources.clear();
        self.ratings.clear();
        self.postings.clear();
        self.neighborhoods.clear();
        self.phase = Phase::Ingesting;
        debug!("storage reset");
    }
}

#[cfg(test)]
mod storage_test {
    use float_cmp::approx_eq;
    use rand::seq::SliceRandom;
    use rand::Rng;
    use rand::SeedableRng;
    use rand_pcg::Pcg64;

    use super::*;
    use crate::knn::posting_store::PostingListVariant;
    use crate::ratings::rating_order;

    const BOOK_RATINGS: [(&str, [Option<f64>; 5]); 5] = [
        ("Alice", [Some(5.0), Some(3.0), Some(4.0), Some(4.0), None]),
        ("User1", [Some(3.0), Some(1.0), Some(2.0), Some(3.0), Some(3.0)]),
        ("User2", [Some(4.0), Some(3.0), Some(4.0), Some(3.0), Some(5.0)]),
        ("User3", [Some(3.0), Some(3.0), Some(1.0), Some(5.0), Some(4.0)]),
        ("User4", [Some(1.0), Some(5.0), Some(5.0), Some(2.0), Some(1.0)]),
    ];

    fn book_observations() -> Vec<RatingObservation> {
        let mut observations = Vec::new();
        for (user, row) in BOOK_RATINGS.iter() {
            for (position, rating) in row.iter().enumerate() {
                if let Some(rating) = rating {
                    let item = format!("Item{}", position + 1);
                    observations.push(RatingObservation::new(user, &item, *rating));
                }
            }
        }
        observations
    }

    fn config(
        k: usize,
        posting_lists: PostingListVariant,
        similarity: SimilarityAlgorithm,
    ) -> RecommenderConfig {
        RecommenderConfig {
            neighborhood_size_k: k,
            posting_lists,
            similarity,
            ..RecommenderConfig::default()
        }
    }

    fn prepared(config: RecommenderConfig, observations: Vec<RatingObservation>) -> RecommenderStorage {
        let mut storage = RecommenderStorage::new(config).unwrap();
        storage.ingest(observations).unwrap();
        storage.prepare().unwrap();
        storage
    }

    fn all_user_based_configs(k: usize) -> Vec<RecommenderConfig> {
        vec![
            config(k, PostingListVariant::Plain, SimilarityAlgorithm::Merge),
            config(k, PostingListVariant::Plain, SimilarityAlgorithm::Galloping),
            config(k, PostingListVariant::Scaled, SimilarityAlgorithm::Merge),
            RecommenderConfig {
                top_resources: 2,
                ..config(k, PostingListVariant::Scaled, SimilarityAlgorithm::Merge)
            },
        ]
    }

    #[test]
    fn should_find_closest_readers_in_book_dataset() {
        for config in all_user_based_configs(4) {
            let storage = prepared(config, book_observations());
            let alice = storage.require("Alice").unwrap();
            let user1 = storage.require("User1").unwrap();
            let user2 = storage.require("User2").unwrap();

            let alice_neighbors = storage.get_neighborhood(alice).unwrap();
            assert_eq!(4, alice_neighbors.len());
            assert_eq!(user1, alice_neighbors[0].id);
            assert!(approx_eq!(f64, 0.82687, alice_neighbors[0].rating, epsilon = 1e-4));

            let user1_neighbors = storage.get_neighborhood(user1).unwrap();
            assert_eq!(user2, user1_neighbors[0].id);
            assert!(approx_eq!(f64, 0.95938, user1_neighbors[0].rating, epsilon = 1e-4));
        }
    }

    #[test]
    fn should_handle_minimal_overlap() {
        let observations = vec![
            RatingObservation::new("Alice", "x", 4.0),
            RatingObservation::new("Alice", "y", 2.0),
            RatingObservation::new("Bob", "x", 4.0),
            RatingObservation::new("Bob", "z", 1.0),
            RatingObservation::new("Bob", "w", 2.0),
        ];
        for config in all_user_based_configs(1) {
            let storage = prepared(config, observations.clone());
            let alice = storage.require("Alice").unwrap();
            let bob = storage.require("Bob").unwrap();

            let neighborhood = storage.compute_neighborhood(bob).unwrap();
            assert_eq!(1, neighborhood.len());
            assert_eq!(alice, neighborhood.best().unwrap().id);
            assert!(approx_eq!(f64, 0.78073, neighborhood.best().unwrap().rating, epsilon = 1e-4));
        }
    }

    #[test]
    fn should_agree_across_algorithms_and_posting_lists() {
        let mut rng = Pcg64::seed_from_u64(42);
        let items: Vec<String> = (0..40).map(|item| format!("item{}", item)).collect();
        let mut observations = Vec::new();
        for user in 0..30 {
            let num_rated = rng.gen_range(2..15);
            let rated: Vec<&String> = items.choose_multiple(&mut rng, num_rated).collect();
            let mut ratings: Vec<f64> = rated.iter().map(|_| rng.gen_range(1..=5) as f64).collect();
            // Every user needs some spread for the z-score.
            if ratings.iter().all(|rating| *rating == ratings[0]) {
                ratings[0] = if ratings[0] < 5.0 { ratings[0] + 1.0 } else { 1.0 };
            }
            for (item, rating) in rated.into_iter().zip(ratings) {
                observations.push(RatingObservation::new(&format!("user{}", user), item, rating));
            }
        }

        for normalization in [Normalization::None, Normalization::MeanCentering, Normalization::ZScore] {
            let storages: Vec<RecommenderStorage> = all_user_based_configs(10)
                .into_iter()
                .map(|config| RecommenderConfig {
                    normalization,
                    ..config
                })
                .map(|config| prepared(config, observations.clone()))
                .collect();

            let reference = &storages[0];
            for user in reference.ratings().users() {
                let expected = reference.get_neighborhood(user).unwrap();
                for other in &storages[1..] {
                    let actual = other.get_neighborhood(user).unwrap();
                    assert_eq!(expected.len(), actual.len());
                    for (left, right) in expected.iter().zip(actual) {
                        assert!(approx_eq!(f64, left.rating, right.rating, epsilon = 1e-4));
                    }
                }
            }
        }
    }

    #[test]
    fn should_bound_and_order_every_neighborhood() {
        for paradigm in [Paradigm::UserBased, Paradigm::ItemBased] {
            for similarity in [SimilarityAlgorithm::Merge, SimilarityAlgorithm::Galloping] {
                let config = RecommenderConfig {
                    paradigm,
                    ..config(2, PostingListVariant::Plain, similarity)
                };
                let storage = prepared(config, book_observations());
                let anchors = match paradigm {
                    Paradigm::UserBased => storage.ratings().users(),
                    Paradigm::ItemBased => storage.ratings().items(),
                };
                for anchor in anchors {
                    let neighbors = storage.get_neighborhood(anchor).unwrap();
                    assert!(neighbors.len() <= 2);
                    assert!(neighbors.iter().all(|neighbor| neighbor.id != anchor));
                    assert!(neighbors
                        .windows(2)
                        .all(|pair| rating_order(&pair[0], &pair[1]) == std::cmp::Ordering::Less));
                }
            }
        }
    }

    #[test]
    fn should_agree_on_item_neighborhoods_across_algorithms() {
        let merge = prepared(
            RecommenderConfig {
                paradigm: Paradigm::ItemBased,
                ..config(4, PostingListVariant::Plain, SimilarityAlgorithm::Merge)
            },
            book_observations(),
        );
        let galloping = prepared(
            RecommenderConfig {
                paradigm: Paradigm::ItemBased,
                ..config(4, PostingListVariant::Plain, SimilarityAlgorithm::Galloping)
            },
            book_observations(),
        );

        for item in merge.ratings().items() {
            let expected = merge.get_neighborhood(item).unwrap();
            let actual = galloping.get_neighborhood(item).unwrap();
            assert_eq!(expected.len(), actual.len());
            for (left, right) in expected.iter().zip(actual) {
                assert!(approx_eq!(f64, left.rating, right.rating, epsilon = 1e-9));
            }
        }
    }

    #[test]
    fn should_predict_weighted_average_of_neighbors() {
        let storage = prepared(
            config(4, PostingListVariant::Plain, SimilarityAlgorithm::Merge),
            book_observations(),
        );
        let alice = storage.require("Alice").unwrap();
        let item5 = storage.require("Item5").unwrap();

        let prediction = storage.predict(alice, item5).unwrap().unwrap();
        assert!(approx_eq!(f64, 3.2521, prediction, epsilon = 1e-3));

        let recommendations = storage.recommend(alice, 3).unwrap();
        assert_eq!(1, recommendations.len());
        assert_eq!(item5, recommendations[0].id);
        assert_eq!(prediction, recommendations[0].rating);
    }

    #[test]
    fn should_predict_on_the_original_rating_scale() {
        for paradigm in [Paradigm::UserBased, Paradigm::ItemBased] {
            let config = RecommenderConfig {
                paradigm,
                normalization: Normalization::MeanCentering,
                decimal_precision: 2,
                ..config(4, PostingListVariant::Plain, SimilarityAlgorithm::Merge)
            };
            let storage = prepared(config, book_observations());
            let alice = storage.require("Alice").unwrap();

            let recommendations = storage.recommend(alice, 5).unwrap();
            assert_eq!(1, recommendations.len());
            let rating = recommendations[0].rating;
            assert!(rating > 0.0 && rating < 6.0);
            assert_eq!(rating, (rating * 100.0).round() / 100.0);
        }
    }

    #[test]
    fn should_forget_everything_on_reset() {
        let mut storage = prepared(
            config(4, PostingListVariant::Scaled, SimilarityAlgorithm::Merge),
            book_observations(),
        );
        let alice = storage.require("Alice").unwrap();
        assert!(storage.get_neighborhood(alice).is_some());

        storage.reset();

        assert_eq!(0, storage.resource_counter());
        assert!(matches!(storage.require("Alice"), Err(RecError::NotIndexed(_))));
        assert!(storage.get_neighborhood(alice).is_none());
        assert_eq!(None, storage.get_list(1));
        assert_eq!(Phase::Ingesting, storage.phase());

        storage.ingest(book_observations()).unwrap();
        storage.prepare().unwrap();
        assert_eq!(10, storage.resource_counter());
    }

    #[test]
    fn should_enforce_pipeline_order() {
        let mut storage = RecommenderStorage::new(RecommenderConfig::default()).unwrap();
        storage.ingest(book_observations()).unwrap();
        let alice = storage.require("Alice").unwrap();

        assert!(matches!(
            storage.compute_neighborhood(alice),
            Err(RecError::PhaseViolation { phase: Phase::Ingesting, .. })
        ));
        assert!(matches!(
            storage.build_all(),
            Err(RecError::PhaseViolation { .. })
        ));

        storage.normalize(Normalization::None).unwrap();
        assert!(matches!(
            storage.add_rating(alice, alice, 1.0),
            Err(RecError::PhaseViolation { phase: Phase::Normalized, .. })
        ));
        assert!(matches!(
            storage.normalize(Normalization::None),
            Err(RecError::PhaseViolation { .. })
        ));

        storage.build_all().unwrap();
        assert!(storage.compute_neighborhood(alice).is_err());
        storage.compact_and_sort_all().unwrap();
        assert_eq!(Phase::Indexed, storage.phase());
        storage.compute_all_neighborhoods().unwrap();
        assert!(storage.get_neighborhood(alice).is_some());

        // Adding postings after compaction invalidates derived neighbourhoods.
        storage.build_for_user(alice).unwrap();
        assert_eq!(Phase::Normalized, storage.phase());
        assert!(storage.get_neighborhood(alice).is_none());
    }

    #[test]
    fn should_compact_idempotently() {
        let mut storage = RecommenderStorage::new(RecommenderConfig::default()).unwrap();
        storage.ingest(book_observations()).unwrap();
        storage.normalize(Normalization::None).unwrap();
        storage.build_all().unwrap();
        storage.compact_and_sort_all().unwrap();

        let items = storage.ratings().items();
        let once: Vec<InvertedList> = items.iter().map(|item| storage.get_list(*item).unwrap().clone()).collect();
        storage.compact_and_sort_all().unwrap();
        let twice: Vec<InvertedList> = items.iter().map(|item| storage.get_list(*item).unwrap().clone()).collect();
        assert_eq!(once, twice);
    }

    #[test]
    fn should_fail_z_score_for_single_rating_user() {
        let mut storage = RecommenderStorage::new(RecommenderConfig {
            normalization: Normalization::ZScore,
            ..RecommenderConfig::default()
        })
        .unwrap();
        storage.ingest(book_observations()).unwrap();
        storage
            .ingest(vec![RatingObservation::new("Loner", "Item1", 3.0)])
            .unwrap();
        let loner = storage.require("Loner").unwrap();

        assert!(matches!(storage.prepare(), Err(RecError::DivideByZero(id)) if id == loner));
        assert_eq!(Phase::Ingesting, storage.phase());
    }

    #[test]
    fn should_fail_z_score_for_user_with_identical_ratings() {
        let mut storage = RecommenderStorage::new(RecommenderConfig {
            normalization: Normalization::ZScore,
            ..RecommenderConfig::default()
        })
        .unwrap();
        storage.ingest(book_observations()).unwrap();
        storage
            .ingest(vec![
                RatingObservation::new("Flat", "Item1", 4.0),
                RatingObservation::new("Flat", "Item2", 4.0),
            ])
            .unwrap();
        let flat = storage.require("Flat").unwrap();

        assert!(matches!(storage.prepare(), Err(RecError::DivideByZero(id)) if id == flat));
        assert_eq!(Phase::Ingesting, storage.phase());
        assert!(storage.get_neighborhood(flat).is_none());
    }

    #[test]
    fn should_reject_malformed_streams_without_side_effects() {
        let mut storage = RecommenderStorage::new(RecommenderConfig::default()).unwrap();
        let observations = vec![
            RatingObservation::new("Alice", "Item1", 5.0),
            RatingObservation::new("Bob", "Item1", f64::INFINITY),
        ];

        assert!(matches!(
            storage.ingest(observations),
            Err(RecError::MalformedInput { record: 2, .. })
        ));
        assert_eq!(0, storage.resource_counter());
    }

    #[test]
    fn should_report_unknown_resources() {
        let mut storage = RecommenderStorage::new(RecommenderConfig::default()).unwrap();
        let alice = storage.intern("Alice").unwrap();
        assert!(matches!(
            storage.add_rating(alice, 99, 3.0),
            Err(RecError::NotIndexed(_))
        ));

        let storage = prepared(RecommenderConfig::default(), book_observations());
        let item1 = storage.require("Item1").unwrap();
        assert!(matches!(
            storage.compute_neighborhood(item1),
            Err(RecError::NotIndexed(_))
        ));
    }

    #[test]
    fn should_reject_invalid_configuration() {
        let config = RecommenderConfig {
            neighborhood_size_k: 0,
            ..RecommenderConfig::default()
        };
        assert!(matches!(
            RecommenderStorage::new(config),
            Err(RecError::InvalidConfiguration(_))
        ));
    }
}
