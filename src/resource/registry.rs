//! Top-level resource registry: every configured collection, singleton, blob,
//! relation and shortcut, keyed by its resource path for request dispatch.
//!
//! Built once by [`crate::engine::Engine::build`] and shared (behind an `Arc`)
//! across every request handler.

use super::blob::BlobHandler;
use super::collection::CollectionHandler;
use super::relation::RelationSide;
use crate::model::config_doc::Shortcut;
use std::collections::HashMap;

#[derive(Default)]
pub struct ResourceRegistry {
    pub collections: HashMap<String, CollectionHandler>,
    pub blobs: HashMap<String, BlobHandler>,
    /// Both directions of every relation, keyed by `<owner>/<target>`, e.g.
    /// `users/devices` and `devices/users` for a single `Relation{left: "users",
    /// right: "devices"}` (§4.7).
    pub relations: HashMap<String, RelationSide>,
    pub shortcuts: HashMap<String, Shortcut>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collection(&self, resource: &str) -> Option<&CollectionHandler> {
        self.collections.get(resource)
    }

    pub fn blob(&self, resource: &str) -> Option<&BlobHandler> {
        self.blobs.get(resource)
    }

    pub fn relation(&self, path: &str) -> Option<&RelationSide> {
        self.relations.get(path)
    }

    pub fn shortcut(&self, alias: &str) -> Option<&Shortcut> {
        self.shortcuts.get(alias)
    }
}
