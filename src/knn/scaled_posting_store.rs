use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, RwLock};

use hashbrown::{HashMap, HashSet};
use rayon::prelude::*;
use tracing::debug;

use crate::knn::inverted_list::{InvertedList, Posting};
use crate::knn::merge::{merge_into_list, WeightedList};
use crate::knn::posting_store::{AnchorList, ListHandle, PostingListStore};
use crate::ratings::RatedResource;
use crate::ResourceId;

pub const MAX_RATING_LEVELS: u8 = 10;
const UNIT_LEVEL: u8 = 1;
// Folding a single list would only copy it.
const MIN_FOLD_SIZE: usize = 2;
const LEVEL_TOLERANCE: f64 = 1e-9;

/// Key of a scaled list: the postings of `item`, multiplied by `level`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScaledKey {
    pub item: ResourceId,
    pub level: u8,
}

impl ScaledKey {
    pub fn new(item: ResourceId, level: u8) -> Self {
        ScaledKey { item, level }
    }
}

/// Sorted combination of (top item, anchor level) pairs folded into one list.
type FoldKey = Vec<ScaledKey>;

/// Posting lists precomputed per discretised rating level.
///
/// Every rating `r` of a user lands in the lists `(item, s)` with score `r * s`
/// for each level `s` in `1..=rating_levels`. An anchor that rated the item with
/// level `s` merges the `(item, s)` list unweighted. Ratings that are not a level
/// fall back to the unit level list, weighted by the rating.
///
/// Items marked as top resources are folded: the lists an anchor would merge for
/// them are summed once into a synthetic list, which is cached under the exact
/// combination and reused by every later anchor with the same combination.
#[derive(Debug)]
pub struct ScaledPostingStore {
    rating_levels: u8,
    lists: HashMap<ScaledKey, InvertedList>,
    top_resources: HashSet<ResourceId>,
    fold_cache: RwLock<HashMap<FoldKey, Arc<InvertedList>>>,
    fold_hits: AtomicUsize,
    fold_misses: AtomicUsize,
    compacted: bool,
}

impl ScaledPostingStore {
    pub fn new(rating_levels: u8) -> Self {
        ScaledPostingStore {
            rating_levels: rating_levels.clamp(UNIT_LEVEL, MAX_RATING_LEVELS),
            lists: HashMap::new(),
            top_resources: HashSet::new(),
            fold_cache: RwLock::new(HashMap::new()),
            fold_hits: AtomicUsize::new(0),
            fold_misses: AtomicUsize::new(0),
            compacted: false,
        }
    }

    pub fn rating_levels(&self) -> u8 {
        self.rating_levels
    }

    /// The level a rating corresponds to, if it is one.
    pub fn level_of(&self, rating: f64) -> Option<u8> {
        let rounded = rating.round();
        if (rating - rounded).abs() > LEVEL_TOLERANCE {
            return None;
        }
        if rounded >= UNIT_LEVEL as f64 && rounded <= self.rating_levels as f64 {
            Some(rounded as u8)
        } else {
            None
        }
    }

    pub fn get_scaled_list(&self, item: ResourceId, level: u8) -> Option<&InvertedList> {
        self.lists.get(&ScaledKey::new(item, level))
    }

    /// Replaces the set of folded items. Cached folds are dropped.
    pub fn mark_top_resources<I: IntoIterator<Item = ResourceId>>(&mut self, items: I) {
        self.top_resources = items.into_iter().collect();
        self.clear_fold_cache();
    }

    /// Marks the `count` items with the most postings as top resources, higher
    /// summed ratings first among equally popular items.
    pub fn select_top_resources(&mut self, count: usize) -> Vec<ResourceId> {
        let mut candidates: Vec<(ResourceId, usize, f64)> = self
            .lists
            .iter()
            .filter(|(key, _)| key.level == UNIT_LEVEL)
            .map(|(key, list)| (key.item, list.len(), list.score_sum()))
            .collect();
        candidates.sort_unstable_by(|left, right| {
            right
                .1
                .cmp(&left.1)
                .then_with(|| right.2.total_cmp(&left.2))
                .then_with(|| left.0.cmp(&right.0))
        });
        candidates.truncate(count);

        let selected: Vec<ResourceId> = candidates.into_iter().map(|(item, _, _)| item).collect();
        self.mark_top_resources(selected.iter().copied());
        selected
    }

    pub fn top_resources(&self) -> Vec<ResourceId> {
        let mut items: Vec<ResourceId> = self.top_resources.iter().copied().collect();
        items.sort_unstable();
        items
    }

    pub fn fold_cache_len(&self) -> usize {
        self.fold_cache.read().map_or(0, |cache| cache.len())
    }

    /// (hits, misses) of the fold cache since the last clear.
    pub fn fold_cache_stats(&self) -> (usize, usize) {
        (
            self.fold_hits.load(AtomicOrdering::Relaxed),
            self.fold_misses.load(AtomicOrdering::Relaxed),
        )
    }

    fn clear_fold_cache(&mut self) {
        match self.fold_cache.get_mut() {
            Ok(cache) => cache.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
        self.fold_hits.store(0, AtomicOrdering::Relaxed);
        self.fold_misses.store(0, AtomicOrdering::Relaxed);
    }

    /// The synthetic list for a combination, from the cache when possible.
    fn folded_list(&self, key: FoldKey) -> Arc<InvertedList> {
        if let Ok(cache) = self.fold_cache.read() {
            if let Some(folded) = cache.get(&key) {
                self.fold_hits.fetch_add(1, AtomicOrdering::Relaxed);
                return Arc::clone(folded);
            }
        }

        let folded = Arc::new(self.fold(&key));
        self.fold_misses.fetch_add(1, AtomicOrdering::Relaxed);
        debug!(combination = key.len(), postings = folded.len(), "folded top resources");

        // A poisoned cache only costs recomputation.
        match self.fold_cache.write() {
            Ok(mut cache) => Arc::clone(cache.entry(key).or_insert(folded)),
            Err(_) => folded,
        }
    }

    fn fold(&self, keys: &[ScaledKey]) -> InvertedList {
        let lists: Vec<WeightedList<'_, Posting>> = keys
            .iter()
            .filter_map(|key| self.lists.get(key))
            .map(|list| WeightedList::new(list.postings(), 1.0))
            .collect();
        merge_into_list(&lists)
    }
}

impl PostingListStore for ScaledPostingStore {
    fn build_for_user(&mut self, user: ResourceId, ratings: &[RatedResource]) {
        for rated in ratings {
            for level in UNIT_LEVEL..=self.rating_levels {
                self.lists
                    .entry(ScaledKey::new(rated.id, level))
                    .or_insert_with(InvertedList::new)
                    .push(Posting::new(user, rated.rating * level as f64));
            }
        }
        self.compacted = false;
    }

    fn compact_and_sort_all(&mut self) {
        self.lists
            .values_mut()
            .collect::<Vec<&mut InvertedList>>()
            .par_iter_mut()
            .for_each(|list| list.compact());
        self.clear_fold_cache();
        self.compacted = true;
    }

    fn is_compacted(&self) -> bool {
        self.compacted
    }

    fn get_list(&self, item: ResourceId) -> Option<&InvertedList> {
        self.get_scaled_list(item, UNIT_LEVEL)
    }

    fn anchor_lists(&self, anchor: &[RatedResource]) -> Vec<AnchorList<'_>> {
        let mut lists = Vec::with_capacity(anchor.len());
        let mut fold_keys: FoldKey = Vec::new();

        for rated in anchor {
            match self.level_of(rated.rating) {
                Some(level) => {
                    let key = ScaledKey::new(rated.id, level);
                    if self.top_resources.contains(&rated.id) {
                        fold_keys.push(key);
                    } else if let Some(list) = self.lists.get(&key) {
                        lists.push(AnchorList {
                            list: ListHandle::Indexed(list),
                            weight: 1.0,
                        });
                    }
                }
                None => {
                    if let Some(list) = self.get_list(rated.id) {
                        lists.push(AnchorList {
                            list: ListHandle::Indexed(list),
                            weight: rated.rating,
                        });
                    }
                }
            }
        }

        if fold_keys.len() >= MIN_FOLD_SIZE {
            fold_keys.sort_unstable();
            lists.push(AnchorList {
                list: ListHandle::Folded(self.folded_list(fold_keys)),
                weight: 1.0,
            });
        } else {
            for key in fold_keys {
                if let Some(list) = self.lists.get(&key) {
                    lists.push(AnchorList {
                        list: ListHandle::Indexed(list),
                        weight: 1.0,
                    });
                }
            }
        }

        lists
    }

    fn num_lists(&self) -> usize {
        self.lists.len()
    }

    fn num_postings(&self) -> usize {
        self.lists.values().map(InvertedList::len).sum()
    }

    fn clear(&mut self) {
        self.lists.clear();
        self.top_resources.clear();
        self.clear_fold_cache();
        self.compacted = false;
    }
}

#[cfg(test)]
mod scaled_posting_store_test {
    use float_cmp::approx_eq;

    use super::*;
    use crate::knn::merge::merge_weighted;

    fn vector(pairs: &[(ResourceId, f64)]) -> Vec<RatedResource> {
        pairs.iter().map(|(id, rating)| RatedResource::new(*id, *rating)).collect()
    }

    fn dot_products(store: &ScaledPostingStore, anchor: &[RatedResource]) -> Vec<(ResourceId, f64)> {
        let anchor_lists = store.anchor_lists(anchor);
        let lists: Vec<WeightedList<'_, Posting>> = anchor_lists
            .iter()
            .map(|anchor_list| WeightedList::new(anchor_list.list.postings(), anchor_list.weight))
            .collect();
        let mut dots = Vec::new();
        merge_weighted(&lists, |user, dot| dots.push((user, dot)));
        dots
    }

    fn book_store() -> ScaledPostingStore {
        let mut store = ScaledPostingStore::new(5);
        store.build_for_user(0, &vector(&[(10, 5.0), (11, 3.0), (12, 4.0), (13, 4.0)]));
        store.build_for_user(1, &vector(&[(10, 3.0), (11, 1.0), (12, 2.0), (13, 3.0), (14, 3.0)]));
        store.build_for_user(2, &vector(&[(10, 4.0), (11, 3.0), (12, 4.0), (13, 3.0), (14, 5.0)]));
        store.compact_and_sort_all();
        store
    }

    #[test]
    fn should_precompute_one_list_per_level() {
        let store = book_store();
        assert_eq!(5 * 5, store.num_lists());
        let scaled = store.get_scaled_list(14, 3).unwrap();
        let scores: Vec<f64> = scaled.postings().iter().map(|p| p.score).collect();
        assert_eq!(vec![9.0, 15.0], scores);
        assert_eq!(Some(store.get_list(14).unwrap().len()), Some(scaled.len()));
    }

    #[test]
    fn should_recognize_rating_levels() {
        let store = ScaledPostingStore::new(5);
        assert_eq!(Some(4), store.level_of(4.0));
        assert_eq!(None, store.level_of(3.5));
        assert_eq!(None, store.level_of(0.0));
        assert_eq!(None, store.level_of(6.0));
    }

    #[test]
    fn should_produce_dot_products_without_runtime_multiplication() {
        let store = book_store();
        let dots = dot_products(&store, &vector(&[(10, 5.0), (11, 3.0), (12, 4.0), (13, 4.0)]));
        assert_eq!((1, 38.0), dots[1]);
        assert_eq!((2, 57.0), dots[2]);
    }

    #[test]
    fn should_fall_back_to_unit_level_for_fractional_ratings() {
        let store = book_store();
        let dots = dot_products(&store, &vector(&[(10, 0.5), (14, 1.5)]));
        assert!(approx_eq!(f64, 0.5 * 3.0 + 1.5 * 3.0, dots[1].1, epsilon = 1e-12));
    }

    #[test]
    fn should_fold_top_resources_into_one_cached_list() {
        let mut store = book_store();
        let anchor = vector(&[(10, 5.0), (11, 3.0), (12, 4.0), (13, 4.0)]);
        let unfolded = dot_products(&store, &anchor);

        store.mark_top_resources(vec![10, 11, 12]);
        assert_eq!(2, store.anchor_lists(&anchor).len());
        let folded = dot_products(&store, &anchor);
        let again = dot_products(&store, &anchor);

        assert_eq!(unfolded, folded);
        assert_eq!(folded, again);
        assert_eq!(1, store.fold_cache_len());
        let (hits, misses) = store.fold_cache_stats();
        assert_eq!(1, misses);
        assert!(hits >= 1);
    }

    #[test]
    fn should_not_fold_a_single_top_resource() {
        let mut store = book_store();
        store.mark_top_resources(vec![10]);
        let anchor = vector(&[(10, 5.0), (11, 3.0)]);
        assert_eq!(2, store.anchor_lists(&anchor).len());
        assert_eq!(0, store.fold_cache_len());
    }

    #[test]
    fn should_select_most_popular_items_as_top_resources() {
        let mut store = book_store();
        let selected = store.select_top_resources(2);
        // items 10..13 have three postings each; 10 has the highest rating sum
        assert_eq!(vec![10, 12], selected);
        assert_eq!(vec![10, 12], store.top_resources());
    }

    #[test]
    fn should_drop_fold_cache_when_lists_change() {
        let mut store = book_store();
        store.mark_top_resources(vec![10, 11]);
        dot_products(&store, &vector(&[(10, 5.0), (11, 3.0)]));
        assert_eq!(1, store.fold_cache_len());
        store.build_for_user(3, &vector(&[(10, 1.0)]));
        store.compact_and_sort_all();
        assert_eq!(0, store.fold_cache_len());
    }
}
