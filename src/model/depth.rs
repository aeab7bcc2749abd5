//! Depth ordering (§4.1): parents must be materialized before children, and
//! relations after every collection/singleton/blob so both endpoints already exist.

use super::config_doc::{Collection, Configuration, Relation, ResourceKind, Shortcut};

#[derive(Debug, Clone)]
pub struct OrderedResource {
    pub kind: ResourceKind,
    pub collection: Collection,
    pub depth: usize,
}

/// Number of `/`-separated segments in a resource path, i.e. how many ancestors it
/// has. `"users"` has depth 0; `"users/devices"` has depth 1.
pub fn path_depth(resource: &str) -> usize {
    resource.trim_matches('/').matches('/').count()
}

/// Flatten collections, singletons and blobs into a single list ordered ascending by
/// depth, stable within a depth tier. Relations are appended after all of them,
/// ordered by `max(left_depth, right_depth)`, so both endpoints of a relation always
/// exist by the time it is materialized.
pub fn ordered_resources(config: &Configuration) -> Vec<OrderedResource> {
    let mut resources: Vec<OrderedResource> = Vec::new();

    for c in &config.collections {
        resources.push(OrderedResource {
            kind: ResourceKind::Collection,
            depth: path_depth(&c.resource),
            collection: c.clone(),
        });
    }
    for s in &config.singletons {
        resources.push(OrderedResource {
            kind: ResourceKind::Singleton,
            depth: path_depth(&s.resource),
            collection: s.clone(),
        });
    }
    for b in &config.blobs {
        resources.push(OrderedResource {
            kind: ResourceKind::Blob,
            depth: path_depth(&b.resource),
            collection: b.clone(),
        });
    }

    resources.sort_by_key(|r| r.depth);

    let relation_depth = resources.iter().map(|r| r.depth).max().unwrap_or(0) + 1;
    for r in &config.relations {
        let left_depth = depth_of(config, &r.left);
        let right_depth = depth_of(config, &r.right);
        let depth = relation_depth + left_depth.max(right_depth);
        resources.push(OrderedResource {
            kind: ResourceKind::Collection,
            depth,
            collection: relation_as_collection(r),
        });
    }

    resources
}

fn depth_of(config: &Configuration, resource: &str) -> usize {
    config
        .collections
        .iter()
        .chain(config.singletons.iter())
        .chain(config.blobs.iter())
        .find(|c| c.resource == resource)
        .map(|c| path_depth(&c.resource))
        .unwrap_or(0)
}

/// Relations do not carry the full [`Collection`] shape, but the depth-ordering
/// pipeline operates uniformly over a flat list; this produces a placeholder entry
/// carrying only the fields depth ordering and later stages (C2/C3) need to look the
/// relation back up by name. Schema materialization re-reads the original
/// [`Relation`] from [`Configuration::relations`] rather than relying on this shape.
fn relation_as_collection(r: &Relation) -> Collection {
    Collection {
        resource: format!("{}/{}", r.left, r.right),
        schema_id: None,
        static_properties: Vec::new(),
        searchable_properties: Vec::new(),
        external_index: None,
        default: None,
        with_log: false,
        with_companion_file: false,
        companion_presigned_url_validity: None,
        permits: Vec::new(),
    }
}

/// Validate that shortcut targets reference resources that are actually declared.
/// Returns the list of dangling shortcuts (empty when the configuration is
/// internally consistent).
pub fn dangling_shortcuts<'a>(
    config: &'a Configuration,
    known_resources: &[String],
) -> Vec<&'a Shortcut> {
    config
        .shortcuts
        .iter()
        .filter(|s| {
            let target_root = s.target.split('/').next().unwrap_or("");
            !known_resources.iter().any(|r| r.starts_with(target_root))
        })
        .collect()
}
