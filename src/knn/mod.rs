use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::str::FromStr;

use crate::error::{RecError, Result};
use crate::ratings::{rating_order, RatedResource};
use crate::ResourceId;

pub mod galloping;
pub mod inverted_list;
pub mod merge;
pub mod neighborhood_cache;
pub mod posting_store;
pub mod prediction;
pub mod scaled_posting_store;

/// How pairwise similarities are computed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimilarityAlgorithm {
    /// One multi-way merge over the anchor's posting lists.
    Merge,
    /// Pairwise sparse dot products with galloping search.
    Galloping,
}

impl FromStr for SimilarityAlgorithm {
    type Err = RecError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "merge" => Ok(SimilarityAlgorithm::Merge),
            "galloping" | "pairwise" => Ok(SimilarityAlgorithm::Galloping),
            other => Err(RecError::InvalidConfiguration(format!(
                "unknown similarity algorithm '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for SimilarityAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimilarityAlgorithm::Merge => f.write_str("merge"),
            SimilarityAlgorithm::Galloping => f.write_str("galloping"),
        }
    }
}

/// Whether neighbourhoods are formed between users or between items.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Paradigm {
    UserBased,
    ItemBased,
}

impl FromStr for Paradigm {
    type Err = RecError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "user" | "user_based" => Ok(Paradigm::UserBased),
            "item" | "item_based" => Ok(Paradigm::ItemBased),
            other => Err(RecError::InvalidConfiguration(format!(
                "unknown paradigm '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for Paradigm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Paradigm::UserBased => f.write_str("user"),
            Paradigm::ItemBased => f.write_str("item"),
        }
    }
}

/// An entry of a sparse vector sorted by key: user rating vectors are keyed by
/// item, posting lists by user.
pub trait SparseEntry {
    fn key(&self) -> ResourceId;
    fn value(&self) -> f64;
}

impl SparseEntry for RatedResource {
    fn key(&self) -> ResourceId {
        self.id
    }

    fn value(&self) -> f64 {
        self.rating
    }
}

/// Heap entry whose maximum is the worst ranked resource.
#[derive(Debug)]
struct Ranked(RatedResource);

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        rating_order(&self.0, &other.0)
    }
}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

/// Keeps the `k` best resources under [`rating_order`], evicting the worst on overflow.
pub struct TopK {
    heap: BinaryHeap<Ranked>,
    k: usize,
}

impl TopK {
    pub fn new(k: usize) -> Self {
        TopK {
            heap: BinaryHeap::with_capacity(k),
            k,
        }
    }

    pub fn offer(&mut self, candidate: RatedResource) {
        if !candidate.rating.is_finite() {
            return;
        }
        if self.heap.len() < self.k {
            self.heap.push(Ranked(candidate));
        } else if let Some(mut worst) = self.heap.peek_mut() {
            if rating_order(&candidate, &worst.0) == Ordering::Less {
                *worst = Ranked(candidate);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Best first.
    pub fn into_sorted_vec(self) -> Vec<RatedResource> {
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|ranked| ranked.0)
            .collect()
    }
}

/// The most similar users or items of an anchor, best first.
#[derive(Clone, Debug, PartialEq)]
pub struct Neighborhood {
    pub anchor: ResourceId,
    pub entries: Vec<RatedResource>,
}

impl Neighborhood {
    pub fn new(anchor: ResourceId, entries: Vec<RatedResource>) -> Self {
        Neighborhood { anchor, entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn best(&self) -> Option<&RatedResource> {
        self.entries.first()
    }
}
