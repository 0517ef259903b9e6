use std::cmp::Ordering;

use dary_heap::OctonaryHeap;

use crate::knn::inverted_list::{InvertedList, Posting};
use crate::knn::{SparseEntry, TopK};
use crate::ratings::RatedResource;
use crate::ResourceId;

/// A sorted sparse list together with the factor its values are multiplied with.
pub struct WeightedList<'a, E> {
    pub entries: &'a [E],
    pub weight: f64,
}

impl<'a, E> WeightedList<'a, E> {
    pub fn new(entries: &'a [E], weight: f64) -> Self {
        WeightedList { entries, weight }
    }
}

/// Cursor head of one list. Reverse order, so the octonary max-heap pops the smallest key.
#[derive(PartialEq, Eq, Debug)]
struct Head {
    key: ResourceId,
    list: usize,
}

impl Ord for Head {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .key
            .cmp(&self.key)
            .then_with(|| other.list.cmp(&self.list))
    }
}

impl PartialOrd for Head {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Multi-way merge over lists sorted ascending by key.
///
/// Calls `emit(key, sum)` once per distinct key, in ascending key order, where
/// `sum` adds `value * weight` over every list entry carrying that key.
pub fn merge_weighted<E, F>(lists: &[WeightedList<'_, E>], mut emit: F)
where
    E: SparseEntry,
    F: FnMut(ResourceId, f64),
{
    let mut heads = OctonaryHeap::with_capacity(lists.len());
    let mut cursors = vec![0_usize; lists.len()];

    for (list, weighted) in lists.iter().enumerate() {
        if let Some(first) = weighted.entries.first() {
            heads.push(Head {
                key: first.key(),
                list,
            });
        }
    }

    while let Some(head) = heads.pop() {
        let key = head.key;
        let mut accumulated = 0_f64;
        let mut next = Some(head);

        while let Some(current) = next {
            let weighted = &lists[current.list];
            let cursor = &mut cursors[current.list];
            while *cursor < weighted.entries.len() && weighted.entries[*cursor].key() == key {
                accumulated += weighted.entries[*cursor].value() * weighted.weight;
                *cursor += 1;
            }
            if let Some(entry) = weighted.entries.get(*cursor) {
                debug_assert!(entry.key() > key, "posting list is not sorted");
                heads.push(Head {
                    key: entry.key(),
                    list: current.list,
                });
            }
            next = match heads.peek() {
                Some(top) if top.key == key => heads.pop(),
                _ => None,
            };
        }

        emit(key, accumulated);
    }
}

/// Sums the lists key by key into a new merge-ready list.
pub fn merge_into_list<E: SparseEntry>(lists: &[WeightedList<'_, E>]) -> InvertedList {
    let capacity = lists.iter().map(|list| list.entries.len()).max().unwrap_or(0);
    let mut postings = Vec::with_capacity(capacity);
    merge_weighted(lists, |user, score| postings.push(Posting::new(user, score)));
    InvertedList::from_sorted(postings)
}

/// Cosine neighbourhood of `anchor` in a single merge pass over its lists.
///
/// The weights carry the anchor's ratings, so every merged sum is the dot product
/// of the anchor with one candidate. Candidates without a norm are skipped.
pub fn merge_neighborhood<E, N>(
    anchor: ResourceId,
    anchor_norm: f64,
    lists: &[WeightedList<'_, E>],
    norm_of: N,
    k: usize,
) -> Vec<RatedResource>
where
    E: SparseEntry,
    N: Fn(ResourceId) -> f64,
{
    let mut closest_neighbors = TopK::new(k);
    if anchor_norm <= 0.0 {
        return closest_neighbors.into_sorted_vec();
    }

    merge_weighted(lists, |candidate, dot_product| {
        if candidate == anchor {
            return;
        }
        let candidate_norm = norm_of(candidate);
        if candidate_norm > 0.0 {
            let similarity = dot_product / (anchor_norm * candidate_norm);
            closest_neighbors.offer(RatedResource::new(candidate, similarity));
        }
    });

    closest_neighbors.into_sorted_vec()
}
