use std::cmp::Ordering;

use hashbrown::HashMap;
use rayon::prelude::*;

use crate::error::{RecError, Result};
use crate::ratings::normalization::{Normalization, NormalizationState};
use crate::ResourceId;

pub mod normalization;

/// A (resource, rating) pair. Depending on where it lives the resource is an item
/// (a user's rating vector), a user (a neighbourhood of users) or an item again
/// (a neighbourhood of items), and the rating may be a similarity.
///
/// The natural order is by id, then rating. Rankings use [`rating_order`] instead.
#[derive(Clone, Copy, Debug)]
pub struct RatedResource {
    pub id: ResourceId,
    pub rating: f64,
}

impl RatedResource {
    pub fn new(id: ResourceId, rating: f64) -> Self {
        RatedResource { id, rating }
    }
}

impl Ord for RatedResource {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id
            .cmp(&other.id)
            .then_with(|| self.rating.total_cmp(&other.rating))
    }
}

impl PartialOrd for RatedResource {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for RatedResource {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for RatedResource {}

/// Ranking order: higher rating first, equal ratings broken by the higher id first.
///
/// `Ordering::Less` means `left` ranks before `right`. The descending id
/// tie-break keeps neighbourhoods identical to existing fixtures.
pub fn rating_order(left: &RatedResource, right: &RatedResource) -> Ordering {
    right
        .rating
        .total_cmp(&left.rating)
        .then_with(|| right.id.cmp(&left.id))
}

/// Ratings per user, plus the per-user statistics of the last normalisation pass.
#[derive(Default, Debug)]
pub struct RatingStore {
    user_ratings: HashMap<ResourceId, Vec<RatedResource>>,
    states: HashMap<ResourceId, NormalizationState>,
    item_norms: HashMap<ResourceId, f64>,
    strategy: Option<Normalization>,
    num_ratings: usize,
}

impl RatingStore {
    pub fn new() -> Self {
        RatingStore::default()
    }

    /// Appends a rating. Repeated (user, item) pairs are kept side by side.
    pub fn add_rating(&mut self, user: ResourceId, item: ResourceId, rating: f64) {
        self.user_ratings
            .entry(user)
            .or_insert_with(Vec::new)
            .push(RatedResource::new(item, rating));
        self.num_ratings += 1;
    }

    /// Replaces the complete rating set of `user`.
    pub fn replace_ratings(&mut self, user: ResourceId, ratings: Vec<RatedResource>) {
        let added = ratings.len();
        let previous = self.user_ratings.insert(user, ratings).map_or(0, |r| r.len());
        self.num_ratings = self.num_ratings + added - previous;
    }

    /// The rating vector of `user`; sorted by item id once the store is normalised.
    pub fn ratings(&self, user: ResourceId) -> Option<&[RatedResource]> {
        self.user_ratings.get(&user).map(Vec::as_slice)
    }

    pub fn require_ratings(&self, user: ResourceId) -> Result<&[RatedResource]> {
        self.ratings(user)
            .ok_or_else(|| RecError::NotIndexed(format!("user #{}", user)))
    }

    /// Looks up a single rating by binary search. Requires a normalised store.
    pub fn rating(&self, user: ResourceId, item: ResourceId) -> Option<f64> {
        let ratings = self.user_ratings.get(&user)?;
        ratings
            .binary_search_by(|probe| probe.id.cmp(&item))
            .ok()
            .map(|position| ratings[position].rating)
    }

    /// User ids in ascending order.
    pub fn users(&self) -> Vec<ResourceId> {
        let mut users: Vec<ResourceId> = self.user_ratings.keys().copied().collect();
        users.sort_unstable();
        users
    }

    /// Item ids in ascending order. Only available after normalisation.
    pub fn items(&self) -> Vec<ResourceId> {
        let mut items: Vec<ResourceId> = self.item_norms.keys().copied().collect();
        items.sort_unstable();
        items
    }

    pub fn num_users(&self) -> usize {
        self.user_ratings.len()
    }

    pub fn num_ratings(&self) -> usize {
        self.num_ratings
    }

    pub fn state(&self, user: ResourceId) -> Option<&NormalizationState> {
        self.states.get(&user)
    }

    /// L2 norm of the (normalised) rating vector of `user`, zero when unknown.
    pub fn user_norm(&self, user: ResourceId) -> f64 {
        self.states.get(&user).map_or(0.0, |state| state.l2_norm)
    }

    /// L2 norm of the (normalised) rating column of `item`, zero when unknown.
    pub fn item_norm(&self, item: ResourceId) -> f64 {
        self.item_norms.get(&item).copied().unwrap_or(0.0)
    }

    pub fn strategy(&self) -> Option<Normalization> {
        self.strategy
    }

    /// Transforms every user's ratings with `strategy` and records the per-user
    /// statistics, user norms and item norms.
    ///
    /// All users are transformed before anything is written back: when a single
    /// user fails, the store is left untouched.
    pub fn normalize(&mut self, strategy: Normalization) -> Result<()> {
        let normalized: Vec<(ResourceId, Vec<RatedResource>, NormalizationState)> = {
            let users: Vec<(&ResourceId, &Vec<RatedResource>)> = self.user_ratings.iter().collect();
            users
                .par_iter()
                .map(|&(user, ratings)| {
                    normalization::normalize_user(*user, ratings, strategy)
                        .map(|(normalized, state)| (*user, normalized, state))
                })
                .collect::<Result<_>>()?
        };

        self.states.clear();
        for (user, mut ratings, state) in normalized {
            ratings.sort_unstable();
            self.replace_ratings(user, ratings);
            self.states.insert(user, state);
        }
        self.item_norms = self.compute_item_norms();
        self.strategy = Some(strategy);
        Ok(())
    }

    fn compute_item_norms(&self) -> HashMap<ResourceId, f64> {
        let mut sum_of_squares: HashMap<ResourceId, f64> = HashMap::new();
        for ratings in self.user_ratings.values() {
            for rated in ratings {
                *sum_of_squares.entry(rated.id).or_insert(0.0) += rated.rating * rated.rating;
            }
        }
        sum_of_squares
            .into_iter()
            .map(|(item, sum)| (item, sum.sqrt()))
            .collect()
    }

    pub fn clear(&mut self) {
        self.user_ratings.clear();
        self.states.clear();
        self.item_norms.clear();
        self.strategy = None;
        self.num_ratings = 0;
    }
}
