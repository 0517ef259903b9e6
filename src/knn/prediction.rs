use itertools::Itertools;

use crate::knn::TopK;
use crate::ratings::normalization::Normalization;
use crate::ratings::{RatedResource, RatingStore};
use crate::ResourceId;

/// `Σ sim · r / Σ |sim|` over (similarity, rating) contributions.
///
/// `None` when nothing contributes or the similarities cancel to zero weight.
pub fn weighted_average<I>(contributions: I) -> Option<f64>
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let mut weighted_sum = 0_f64;
    let mut weight_total = 0_f64;
    for (similarity, rating) in contributions {
        weighted_sum += similarity * rating;
        weight_total += similarity.abs();
    }
    if weight_total < f64::EPSILON {
        None
    } else {
        Some(weighted_sum / weight_total)
    }
}

/// Prediction on the normalised scale from the neighbours of `user` that rated `item`.
pub fn predict_user_based(
    ratings: &RatingStore,
    user_neighbors: &[RatedResource],
    item: ResourceId,
) -> Option<f64> {
    weighted_average(user_neighbors.iter().filter_map(|neighbor| {
        ratings
            .rating(neighbor.id, item)
            .map(|rating| (neighbor.rating, rating))
    }))
}

/// Prediction on the normalised scale from the neighbours of `item` that `user` rated.
pub fn predict_item_based(
    ratings: &RatingStore,
    user: ResourceId,
    item_neighbors: &[RatedResource],
) -> Option<f64> {
    weighted_average(item_neighbors.iter().filter_map(|neighbor| {
        ratings
            .rating(user, neighbor.id)
            .map(|rating| (neighbor.rating, rating))
    }))
}

/// Maps a normalised prediction back onto the rating scale of `user` and rounds it.
pub fn to_rating_scale(ratings: &RatingStore, user: ResourceId, value: f64, precision: u32) -> f64 {
    let strategy = ratings.strategy().unwrap_or(Normalization::None);
    let rating = ratings
        .state(user)
        .map_or(value, |state| state.denormalize(strategy, value));
    round_to(rating, precision)
}

pub fn round_to(value: f64, precision: u32) -> f64 {
    let factor = 10_f64.powi(precision as i32);
    (value * factor).round() / factor
}

/// Items rated by any neighbour but not by the user, ascending.
pub fn unseen_items_of_neighbors(
    ratings: &RatingStore,
    user: ResourceId,
    user_neighbors: &[RatedResource],
) -> Vec<ResourceId> {
    user_neighbors
        .iter()
        .filter_map(|neighbor| ratings.ratings(neighbor.id))
        .flatten()
        .map(|rated| rated.id)
        .filter(|item| ratings.rating(user, *item).is_none())
        .sorted_unstable()
        .dedup()
        .collect()
}

/// The `how_many` best scored items, best first.
pub fn top_predictions<I>(scored_items: I, how_many: usize) -> Vec<RatedResource>
where
    I: IntoIterator<Item = (ResourceId, f64)>,
{
    let mut top_items = TopK::new(how_many);
    for (item, score) in scored_items {
        top_items.offer(RatedResource::new(item, score));
    }
    top_items.into_sorted_vec()
}
