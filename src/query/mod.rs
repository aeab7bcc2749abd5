//! Per-resource SQL query templates (C3) and the `{All, Id}` wildcard identifier
//! type (§9 Design Notes: "model this explicitly as a sum type").

pub mod identifier;
pub mod templates;

pub use identifier::Identifier;
pub use templates::{ancestor_table_name, QueryTemplates};
