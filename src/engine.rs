//! The top-level builder (C1-C9 wiring): parse and validate the declarative
//! configuration document, materialize its schema, precompute every resource's
//! query templates, and assemble the handler registry and job pipeline that
//! [`crate::server`] drives.

use crate::auth::BaseAuthorizer;
use crate::interceptor::InterceptorRegistry;
use crate::jobs::{EventRegistry, JobWorkerPool, JobWorkerPoolConfig, PostgresJobStore};
use crate::model::config_doc::{Configuration, ResourceKind};
use crate::model::depth::ordered_resources;
use crate::model::{meta_schema, Relation};
use crate::notification::NotificationRegistry;
use crate::query::QueryTemplates;
use crate::resource::blob::BlobHandler;
use crate::resource::collection::CollectionHandler;
use crate::resource::registry::ResourceRegistry;
use crate::resource::relation::RelationSide;
use crate::resource::SchemaRegistry;
use crate::schema::materializer::{self, relation_table_name};
use crate::storage::BaseCompanionStorage;
use serde_json::Value;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Options that don't come from the declarative document itself.
#[derive(Clone)]
pub struct EngineConfig {
    pub schema_name: String,
    pub force_migration: bool,
    pub default_presigned_ttl: Duration,
    pub worker_pool: JobWorkerPoolConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            schema_name: "public".to_string(),
            force_migration: false,
            default_presigned_ttl: Duration::from_secs(900),
            worker_pool: JobWorkerPoolConfig::default(),
        }
    }
}

/// Everything a running server needs: the handler registry, the job pipeline, and
/// the pool they all share.
pub struct Engine {
    pub pool: PgPool,
    pub registry: Arc<ResourceRegistry>,
    pub job_store: Arc<PostgresJobStore>,
    pub job_pool: Arc<JobWorkerPool>,
    pub authorizer: Arc<dyn BaseAuthorizer>,
    pub interceptors: Arc<InterceptorRegistry>,
    pub notifications: Arc<NotificationRegistry>,
    pub events: Arc<EventRegistry>,
}

impl Engine {
    /// Parse and validate `raw_document`, migrate the schema if its fingerprint
    /// changed, then build every handler against its precomputed query templates
    /// (§4.1-4.9).
    #[allow(clippy::too_many_arguments)]
    pub async fn build(
        pool: PgPool,
        raw_document: &str,
        raw_schemas: HashMap<String, Value>,
        authorizer: Arc<dyn BaseAuthorizer>,
        storage: Option<Arc<dyn BaseCompanionStorage>>,
        interceptors: Arc<InterceptorRegistry>,
        notifications: Arc<NotificationRegistry>,
        events: Arc<EventRegistry>,
        config: EngineConfig,
    ) -> Result<Self, crate::error::KurbisioError> {
        let document: Value = serde_json::from_str(raw_document)?;
        meta_schema::validate(&document)?;
        let parsed = Configuration::from_json(raw_document)?;

        materializer::materialize(
            &pool,
            &config.schema_name,
            &parsed,
            raw_document,
            config.force_migration,
        )
        .await?;

        let schemas = Arc::new(SchemaRegistry::compile(raw_schemas)?);
        let job_store = Arc::new(PostgresJobStore::new(pool.clone()));
        let job_pool = Arc::new(JobWorkerPool::new(
            job_store.clone(),
            notifications.clone(),
            events.clone(),
            config.worker_pool.clone(),
        ));

        let mut registry = ResourceRegistry::new();

        for resource in ordered_resources(&parsed) {
            if parsed
                .relations
                .iter()
                .any(|r| format!("{}/{}", r.left, r.right) == resource.collection.resource)
            {
                continue;
            }
            let templates =
                QueryTemplates::build(&resource.collection.resource, resource.kind, &resource.collection);

            match resource.kind {
                ResourceKind::Blob => {
                    registry.blobs.insert(
                        resource.collection.resource.clone(),
                        BlobHandler {
                            resource: resource.collection.resource.clone(),
                            config: resource.collection.clone(),
                            templates,
                            pool: pool.clone(),
                            notifications: notifications.clone(),
                            jobs: job_store.clone(),
                            job_pool: job_pool.clone(),
                            storage: storage.clone(),
                            schema_name: config.schema_name.clone(),
                            default_presigned_ttl: config.default_presigned_ttl,
                        },
                    );
                }
                ResourceKind::Collection | ResourceKind::Singleton => {
                    registry.collections.insert(
                        resource.collection.resource.clone(),
                        CollectionHandler {
                            resource: resource.collection.resource.clone(),
                            kind: resource.kind,
                            config: resource.collection.clone(),
                            templates,
                            pool: pool.clone(),
                            interceptors: interceptors.clone(),
                            notifications: notifications.clone(),
                            jobs: job_store.clone(),
                            job_pool: job_pool.clone(),
                            schemas: schemas.clone(),
                            storage: storage.clone(),
                            schema_name: config.schema_name.clone(),
                            default_presigned_ttl: config.default_presigned_ttl,
                        },
                    );
                }
            }
        }

        for relation in &parsed.relations {
            register_relation_sides(&mut registry, relation);
        }

        for shortcut in &parsed.shortcuts {
            registry
                .shortcuts
                .insert(shortcut.shortcut.clone(), shortcut.clone());
        }

        Ok(Self {
            pool,
            registry: Arc::new(registry),
            job_store,
            job_pool,
            authorizer,
            interceptors,
            notifications,
            events,
        })
    }
}

/// A relation registers two virtual collections, one per traversal direction
/// (§4.7): `<left>/<right>` (own=left, target=right) and `<right>/<left>`
/// (own=right, target=left), both backed by the same join table.
fn register_relation_sides(registry: &mut ResourceRegistry, relation: &Relation) {
    let join_table = relation_table_name(relation);
    let left_col = format!("{}_id", singular(&relation.left));
    let right_col = format!("{}_id", singular(&relation.right));

    registry.relations.insert(
        format!("{}/{}", relation.left, relation.right),
        RelationSide {
            join_table: join_table.clone(),
            own_column: left_col.clone(),
            target_column: right_col.clone(),
            target_table: relation.right.clone(),
            permits: relation.left_permits.clone(),
        },
    );
    registry.relations.insert(
        format!("{}/{}", relation.right, relation.left),
        RelationSide {
            join_table,
            own_column: right_col,
            target_column: left_col,
            target_table: relation.left.clone(),
            permits: relation.right_permits.clone(),
        },
    );
}

fn singular(resource: &str) -> String {
    let leaf = resource.trim_matches('/').rsplit('/').next().unwrap_or(resource);
    leaf.strip_suffix('s').filter(|s| !s.is_empty()).unwrap_or(leaf).to_string()
}
