use crate::knn::Neighborhood;
use crate::ratings::RatedResource;
use crate::ResourceId;

/// Precomputed neighbourhoods, indexed by anchor id. No eviction.
#[derive(Default, Debug)]
pub struct NeighborhoodCache {
    neighborhoods: Vec<Option<Vec<RatedResource>>>,
    len: usize,
}

impl NeighborhoodCache {
    pub fn new() -> Self {
        NeighborhoodCache::default()
    }

    /// Sized for `num_resources` anchors; grows on demand beyond that.
    pub fn with_capacity(num_resources: usize) -> Self {
        NeighborhoodCache {
            neighborhoods: Vec::with_capacity(num_resources),
            len: 0,
        }
    }

    pub fn get_neighborhood(&self, id: ResourceId) -> Option<&[RatedResource]> {
        self.neighborhoods
            .get(id as usize)
            .and_then(|slot| slot.as_deref())
    }

    /// Stores the neighbourhood under its anchor, replacing an earlier one.
    pub fn store_neighborhood(&mut self, neighborhood: Neighborhood) {
        let slot = neighborhood.anchor as usize;
        if slot >= self.neighborhoods.len() {
            self.neighborhoods.resize(slot + 1, None);
        }
        if self.neighborhoods[slot].is_none() {
            self.len += 1;
        }
        self.neighborhoods[slot] = Some(neighborhood.entries);
    }

    /// Number of anchors with a stored neighbourhood.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.neighborhoods.clear();
        self.len = 0;
    }
}
