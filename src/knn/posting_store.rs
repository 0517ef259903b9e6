use std::fmt;
use std::ops::Deref;
use std::str::FromStr;
use std::sync::Arc;

use hashbrown::HashMap;
use rayon::prelude::*;

use crate::error::{RecError, Result};
use crate::knn::inverted_list::{InvertedList, Posting};
use crate::knn::scaled_posting_store::ScaledPostingStore;
use crate::ratings::RatedResource;
use crate::ResourceId;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PostingListVariant {
    Plain,
    Scaled,
}

impl FromStr for PostingListVariant {
    type Err = RecError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "plain" => Ok(PostingListVariant::Plain),
            "scaled" => Ok(PostingListVariant::Scaled),
            other => Err(RecError::InvalidConfiguration(format!(
                "unknown posting list variant '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for PostingListVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PostingListVariant::Plain => f.write_str("plain"),
            PostingListVariant::Scaled => f.write_str("scaled"),
        }
    }
}

/// A posting list owned by the store, or a synthetic one shared from a cache.
pub enum ListHandle<'a> {
    Indexed(&'a InvertedList),
    Folded(Arc<InvertedList>),
}

impl Deref for ListHandle<'_> {
    type Target = InvertedList;

    fn deref(&self) -> &InvertedList {
        match self {
            ListHandle::Indexed(list) => list,
            ListHandle::Folded(list) => list,
        }
    }
}

/// A posting list to merge and the factor to multiply its scores with.
pub struct AnchorList<'a> {
    pub list: ListHandle<'a>,
    pub weight: f64,
}

/// Inverted lists over the rating store.
///
/// Lists are appended user by user and compacted once before any query. Queries
/// assume a compacted store.
pub trait PostingListStore {
    /// Adds one posting per rating of `user`.
    fn build_for_user(&mut self, user: ResourceId, ratings: &[RatedResource]);

    /// Sorts and compacts every list. Idempotent.
    fn compact_and_sort_all(&mut self);

    fn is_compacted(&self) -> bool;

    /// The list holding the unscaled ratings of `item`.
    fn get_list(&self, item: ResourceId) -> Option<&InvertedList>;

    /// The lists to merge for an anchor vector, with their weights, so that the
    /// weighted merge yields the dot product of the anchor with every co-rater.
    fn anchor_lists(&self, anchor: &[RatedResource]) -> Vec<AnchorList<'_>>;

    fn num_lists(&self) -> usize;

    fn num_postings(&self) -> usize;

    fn clear(&mut self);
}

/// One list per item, scores are the raw (normalised) ratings.
#[derive(Default, Debug)]
pub struct PlainPostingStore {
    lists: HashMap<ResourceId, InvertedList>,
    compacted: bool,
}

impl PlainPostingStore {
    pub fn new() -> Self {
        PlainPostingStore::default()
    }

    /// Items that have a posting list, ascending.
    pub fn items(&self) -> Vec<ResourceId> {
        let mut items: Vec<ResourceId> = self.lists.keys().copied().collect();
        items.sort_unstable();
        items
    }
}

impl PostingListStore for PlainPostingStore {
    fn build_for_user(&mut self, user: ResourceId, ratings: &[RatedResource]) {
        for rated in ratings {
            self.lists
                .entry(rated.id)
                .or_insert_with(InvertedList::new)
                .push(Posting::new(user, rated.rating));
        }
        self.compacted = false;
    }

    fn compact_and_sort_all(&mut self) {
        self.lists
            .values_mut()
            .collect::<Vec<&mut InvertedList>>()
            .par_iter_mut()
            .for_each(|list| list.compact());
        self.compacted = true;
    }

    fn is_compacted(&self) -> bool {
        self.compacted
    }

    fn get_list(&self, item: ResourceId) -> Option<&InvertedList> {
        self.lists.get(&item)
    }

    fn anchor_lists(&self, anchor: &[RatedResource]) -> Vec<AnchorList<'_>> {
        anchor
            .iter()
            .filter_map(|rated| {
                self.lists.get(&rated.id).map(|list| AnchorList {
                    list: ListHandle::Indexed(list),
                    weight: rated.rating,
                })
            })
            .collect()
    }

    fn num_lists(&self) -> usize {
        self.lists.len()
    }

    fn num_postings(&self) -> usize {
        self.lists.values().map(InvertedList::len).sum()
    }

    fn clear(&mut self) {
        self.lists.clear();
        self.compacted = false;
    }
}

/// The posting list variant chosen at configuration time.
#[derive(Debug)]
pub enum PostingIndex {
    Plain(PlainPostingStore),
    Scaled(ScaledPostingStore),
}

impl PostingIndex {
    pub fn new(variant: PostingListVariant, rating_levels: u8) -> Self {
        match variant {
            PostingListVariant::Plain => PostingIndex::Plain(PlainPostingStore::new()),
            PostingListVariant::Scaled => {
                PostingIndex::Scaled(ScaledPostingStore::new(rating_levels))
            }
        }
    }

    pub fn variant(&self) -> PostingListVariant {
        match self {
            PostingIndex::Plain(_) => PostingListVariant::Plain,
            PostingIndex::Scaled(_) => PostingListVariant::Scaled,
        }
    }

    fn store(&self) -> &dyn PostingListStore {
        match self {
            PostingIndex::Plain(store) => store,
            PostingIndex::Scaled(store) => store,
        }
    }

    fn store_mut(&mut self) -> &mut dyn PostingListStore {
        match self {
            PostingIndex::Plain(store) => store,
            PostingIndex::Scaled(store) => store,
        }
    }

    pub fn as_plain(&self) -> Option<&PlainPostingStore> {
        match self {
            PostingIndex::Plain(store) => Some(store),
            PostingIndex::Scaled(_) => None,
        }
    }

    pub fn as_scaled(&self) -> Option<&ScaledPostingStore> {
        match self {
            PostingIndex::Scaled(store) => Some(store),
            PostingIndex::Plain(_) => None,
        }
    }

    pub fn as_scaled_mut(&mut self) -> Option<&mut ScaledPostingStore> {
        match self {
            PostingIndex::Scaled(store) => Some(store),
            PostingIndex::Plain(_) => None,
        }
    }
}

impl PostingListStore for PostingIndex {
    fn build_for_user(&mut self, user: ResourceId, ratings: &[RatedResource]) {
        self.store_mut().build_for_user(user, ratings)
    }

    fn compact_and_sort_all(&mut self) {
        self.store_mut().compact_and_sort_all()
    }

    fn is_compacted(&self) -> bool {
        self.store().is_compacted()
    }

    fn get_list(&self, item: ResourceId) -> Option<&InvertedList> {
        self.store().get_list(item)
    }

    fn anchor_lists(&self, anchor: &[RatedResource]) -> Vec<AnchorList<'_>> {
        self.store().anchor_lists(anchor)
    }

    fn num_lists(&self) -> usize {
        self.store().num_lists()
    }

    fn num_postings(&self) -> usize {
        self.store().num_postings()
    }

    fn clear(&mut self) {
        self.store_mut().clear()
    }
}
