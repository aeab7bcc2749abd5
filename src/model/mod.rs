//! The declarative configuration model: parsing, meta-schema validation, depth
//! ordering, and fingerprinting (C1).

pub mod config_doc;
pub mod depth;
pub mod fingerprint;
pub mod meta_schema;

pub use config_doc::{
    Blob, Collection, Configuration, Operation, Permit, Relation, ResourceKind, Shortcut,
};
pub use depth::{ordered_resources, OrderedResource};
pub use fingerprint::{advisory_lock_key, fingerprint};
