use std::cmp::Ordering;

use crate::knn::SparseEntry;
use crate::ResourceId;

/// Postings are appended in blocks of this many slots.
pub const LIST_GROWTH_INCREMENT: usize = 16;

/// A (user, score) pair inside the posting list of one item.
#[derive(Clone, Copy, Debug)]
pub struct Posting {
    pub user: ResourceId,
    pub score: f64,
}

impl Posting {
    pub fn new(user: ResourceId, score: f64) -> Self {
        Posting { user, score }
    }
}

/// Merge order: ascending user id, ties broken by score.
impl Ord for Posting {
    fn cmp(&self, other: &Self) -> Ordering {
        self.user
            .cmp(&other.user)
            .then_with(|| self.score.total_cmp(&other.score))
    }
}

impl PartialOrd for Posting {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Posting {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Posting {}

impl SparseEntry for Posting {
    fn key(&self) -> ResourceId {
        self.user
    }

    fn value(&self) -> f64 {
        self.score
    }
}

/// Growable list of postings for one key.
///
/// Postings are appended in any order during the build phase. [`InvertedList::compact`]
/// turns the list into its merge-ready form: sorted by [`Posting`] order, without
/// spare capacity. Appending afterwards drops that state again.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InvertedList {
    postings: Vec<Posting>,
    compacted: bool,
}

impl InvertedList {
    pub fn new() -> Self {
        InvertedList {
            postings: Vec::with_capacity(LIST_GROWTH_INCREMENT),
            compacted: false,
        }
    }

    /// Wraps postings that are already in merge order.
    pub(crate) fn from_sorted(postings: Vec<Posting>) -> Self {
        debug_assert!(postings.windows(2).all(|pair| pair[0] <= pair[1]));
        let mut list = InvertedList {
            postings,
            compacted: true,
        };
        list.postings.shrink_to_fit();
        list
    }

    pub fn push(&mut self, posting: Posting) {
        if self.postings.len() == self.postings.capacity() {
            self.postings.reserve_exact(LIST_GROWTH_INCREMENT);
        }
        self.postings.push(posting);
        self.compacted = false;
    }

    pub fn compact(&mut self) {
        if !self.compacted {
            self.postings.sort_unstable();
            self.compacted = true;
        }
        self.postings.shrink_to_fit();
    }

    pub fn is_compacted(&self) -> bool {
        self.compacted
    }

    pub fn postings(&self) -> &[Posting] {
        &self.postings
    }

    pub fn len(&self) -> usize {
        self.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.postings.capacity()
    }

    pub fn score_sum(&self) -> f64 {
        self.postings.iter().map(|posting| posting.score).sum()
    }
}
