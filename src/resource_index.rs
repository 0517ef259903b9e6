use hashbrown::HashMap;

use crate::error::{RecError, Result};
use crate::ResourceId;

/// Bidirectional mapping between resource strings and dense ids.
///
/// Users and items share one id space. Ids are handed out in order of first
/// appearance, starting at zero, and are never reused until [`ResourceIndex::clear`].
#[derive(Default, Debug)]
pub struct ResourceIndex {
    id_for_uri: HashMap<String, ResourceId>,
    uri_for_id: Vec<String>,
}

impl ResourceIndex {
    pub fn new() -> Self {
        ResourceIndex::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        ResourceIndex {
            id_for_uri: HashMap::with_capacity(capacity),
            uri_for_id: Vec::with_capacity(capacity),
        }
    }

    /// Returns the id of `uri`, assigning the next free id on first sight.
    pub fn intern(&mut self, uri: &str) -> Result<ResourceId> {
        if let Some(id) = self.id_for_uri.get(uri) {
            return Ok(*id);
        }
        let next_free_id = self.uri_for_id.len();
        let id = ResourceId::try_from(next_free_id)
            .map_err(|_| RecError::CapacityExceeded(next_free_id))?;
        self.uri_for_id.push(uri.to_owned());
        self.id_for_uri.insert(uri.to_owned(), id);
        Ok(id)
    }

    pub fn lookup(&self, uri: &str) -> Option<ResourceId> {
        self.id_for_uri.get(uri).copied()
    }

    pub fn resolve(&self, id: ResourceId) -> Option<&str> {
        self.uri_for_id.get(id as usize).map(String::as_str)
    }

    /// Like [`ResourceIndex::lookup`], but unknown resources are an error.
    pub fn require(&self, uri: &str) -> Result<ResourceId> {
        self.lookup(uri)
            .ok_or_else(|| RecError::NotIndexed(uri.to_owned()))
    }

    pub fn require_uri(&self, id: ResourceId) -> Result<&str> {
        self.resolve(id)
            .ok_or_else(|| RecError::NotIndexed(format!("#{}", id)))
    }

    /// Number of interned resources, which is also the next id to be assigned.
    pub fn resource_counter(&self) -> usize {
        self.uri_for_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uri_for_id.is_empty()
    }

    pub fn clear(&mut self) {
        self.id_for_uri.clear();
        self.uri_for_id.clear();
    }
}

#[cfg(test)]
mod resource_index_test {
    use super::*;

    #[test]
    fn should_assign_dense_ids_in_order_of_first_sight() {
        let mut index = ResourceIndex::new();
        assert_eq!(0, index.intern("user:alice").unwrap());
        assert_eq!(1, index.intern("book:dune").unwrap());
        assert_eq!(0, index.intern("user:alice").unwrap());
        assert_eq!(2, index.intern("user:bob").unwrap());
        assert_eq!(3, index.resource_counter());
    }

    #[test]
    fn should_resolve_both_directions() {
        let mut index = ResourceIndex::with_capacity(2);
        let id = index.intern("book:dune").unwrap();
        assert_eq!(Some(id), index.lookup("book:dune"));
        assert_eq!(Some("book:dune"), index.resolve(id));
        assert_eq!(None, index.lookup("book:emma"));
        assert_eq!(None, index.resolve(42));
    }

    #[test]
    fn should_report_unknown_resources_as_not_indexed() {
        let index = ResourceIndex::new();
        assert!(matches!(
            index.require("user:nobody"),
            Err(RecError::NotIndexed(_))
        ));
        assert!(matches!(index.require_uri(7), Err(RecError::NotIndexed(_))));
    }

    #[test]
    fn should_restart_ids_after_clear() {
        let mut index = ResourceIndex::new();
        index.intern("a").unwrap();
        index.intern("b").unwrap();
        index.clear();
        assert!(index.is_empty());
        assert_eq!(None, index.lookup("a"));
        assert_eq!(0, index.intern("b").unwrap());
    }
}
