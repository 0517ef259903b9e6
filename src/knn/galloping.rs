use crate::knn::{SparseEntry, TopK};
use crate::ratings::RatedResource;
use crate::ResourceId;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SparseDot {
    pub value: f64,
    /// Number of keys both vectors share.
    pub overlap: usize,
}

/// Dot product of two sparse vectors sorted ascending by key, without duplicate keys.
///
/// Walks the shorter vector and gallops through the longer one. The search
/// position in the longer vector only moves forward.
pub fn sparse_dot<E: SparseEntry>(left: &[E], right: &[E]) -> SparseDot {
    let (shorter, longer) = if left.len() <= right.len() {
        (left, right)
    } else {
        (right, left)
    };

    let mut dot = SparseDot {
        value: 0.0,
        overlap: 0,
    };
    let mut position = 0_usize;

    for entry in shorter {
        if position >= longer.len() {
            break;
        }
        match gallop(longer, position, entry.key()) {
            Ok(found) => {
                dot.value += entry.value() * longer[found].value();
                dot.overlap += 1;
                position = found + 1;
            }
            Err(insertion_point) => position = insertion_point,
        }
    }
    dot
}

/// Locates `key` in `sorted[from..]`.
///
/// The step from `from` doubles until the bracket passes `key`, then a binary
/// search runs inside the bracket. Returns `Ok(index)` on a match and
/// `Err(insertion_point)` otherwise, like `slice::binary_search`.
pub fn gallop<E: SparseEntry>(sorted: &[E], from: usize, key: ResourceId) -> Result<usize, usize> {
    let len = sorted.len();
    if from >= len {
        return Err(len);
    }
    if sorted[from].key() >= key {
        return if sorted[from].key() == key {
            Ok(from)
        } else {
            Err(from)
        };
    }

    // sorted[low] < key holds throughout.
    let mut low = from;
    let mut step = 1_usize;
    let mut high = from + step;
    while high < len && sorted[high].key() < key {
        low = high;
        step *= 2;
        high = low + step;
    }
    let top = if high < len { high + 1 } else { len };

    binary_search_left(sorted, low + 1, top, key)
}

// Leftmost match in sorted[bottom..top], so repeated keys resolve deterministically.
fn binary_search_left<E: SparseEntry>(
    sorted: &[E],
    mut bottom: usize,
    mut top: usize,
    key: ResourceId,
) -> Result<usize, usize> {
    while bottom < top {
        let mid = bottom + (top - bottom) / 2;
        if sorted[mid].key() < key {
            bottom = mid + 1;
        } else {
            top = mid;
        }
    }

    match sorted.get(top) {
        Some(entry) if entry.key() == key => Ok(top),
        _ => Err(top),
    }
}

pub fn l2_norm<E: SparseEntry>(vector: &[E]) -> f64 {
    vector
        .iter()
        .map(|entry| entry.value() * entry.value())
        .sum::<f64>()
        .sqrt()
}

/// Cosine similarity of two sorted sparse vectors, zero if either has no norm.
pub fn cosine<E: SparseEntry>(left: &[E], right: &[E]) -> f64 {
    let norms = l2_norm(left) * l2_norm(right);
    if norms <= 0.0 {
        return 0.0;
    }
    sparse_dot(left, right).value / norms
}

/// Cosine neighbourhood of `anchor` from pairwise dot products against every candidate.
///
/// Candidates come as `(id, vector, norm)`. Those sharing no key with the anchor
/// are not neighbours.
pub fn galloping_neighborhood<'a, E, I>(
    anchor: ResourceId,
    anchor_vector: &[E],
    anchor_norm: f64,
    candidates: I,
    k: usize,
) -> Vec<RatedResource>
where
    E: SparseEntry + 'a,
    I: IntoIterator<Item = (ResourceId, &'a [E], f64)>,
{
    let mut closest_neighbors = TopK::new(k);
    if anchor_norm <= 0.0 {
        return closest_neighbors.into_sorted_vec();
    }

    for (candidate, vector, candidate_norm) in candidates {
        if candidate == anchor || candidate_norm <= 0.0 {
            continue;
        }
        let dot = sparse_dot(anchor_vector, vector);
        if dot.overlap > 0 {
            let similarity = dot.value / (anchor_norm * candidate_norm);
            closest_neighbors.offer(RatedResource::new(candidate, similarity));
        }
    }

    closest_neighbors.into_sorted_vec()
}
