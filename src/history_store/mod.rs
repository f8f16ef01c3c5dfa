// SQLite-backed short-time history: raw events plus multi-resolution aggregated buckets.
// Each collection is a table named after its full namespace; __collections records them.

pub mod aggregation;
pub mod bucket;
pub mod catalog;
pub mod naming;
pub mod query;
pub mod raw;
pub mod registry;
pub mod retention;

pub use catalog::{Collection, CollectionKind};
pub use naming::{DataModelStrategy, DocumentFilter, NamingResolver, RemovalPlan};
pub use query::AggregatedQuery;
pub use raw::RawQuery;
pub use retention::RetentionPolicy;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, instrument, warn};

use crate::config::{AppConfig, ShouldStore, TruncationConfig};
use crate::error::{StoreError, StoreResult};
use crate::models::{
    AggregatedBucket, AttributeEvent, CollectionNameEntry, DataModel, Identity, RawEvent,
    RemovalScope, Resolution,
};

/// Everything the store needs from the configuration.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub db_prefix: String,
    pub collection_prefix: String,
    pub data_model: DataModel,
    pub should_hash: bool,
    pub should_store: ShouldStore,
    pub ignore_blank_spaces: bool,
    pub aggregation_by: Vec<Resolution>,
    pub filter_out_empty: bool,
    pub truncation: TruncationConfig,
}

impl StoreOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            db_prefix: config.database.db_prefix.clone(),
            collection_prefix: config.database.collection_prefix.clone(),
            data_model: config.database.data_model,
            should_hash: config.database.should_hash,
            should_store: config.database.should_store,
            ignore_blank_spaces: config.database.ignore_blank_spaces,
            aggregation_by: config.aggregation.aggregation_by.clone(),
            filter_out_empty: config.aggregation.filter_out_empty,
            truncation: config.truncation.clone(),
        }
    }
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            db_prefix: "sth_".into(),
            collection_prefix: "sth_".into(),
            data_model: DataModel::CollectionPerEntity,
            should_hash: false,
            should_store: ShouldStore::Both,
            ignore_blank_spaces: true,
            aggregation_by: vec![Resolution::Day, Resolution::Hour, Resolution::Minute],
            filter_out_empty: true,
            truncation: TruncationConfig::default(),
        }
    }
}

/// How `resolve_collection` treats a collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectionOptions {
    pub aggregated: bool,
    /// Create the collection when it does not exist.
    pub create: bool,
    /// Register the hash of a newly created collection (hash mode only).
    pub store_hash: bool,
    /// Apply the retention policy to a newly created collection.
    pub truncate: bool,
}

impl CollectionOptions {
    pub fn write(aggregated: bool) -> Self {
        Self {
            aggregated,
            create: true,
            store_hash: true,
            truncate: true,
        }
    }

    pub fn read(aggregated: bool) -> Self {
        Self {
            aggregated,
            ..Self::default()
        }
    }
}

/// Outcome of `remove_data`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemovalOutcome {
    pub documents_deleted: u64,
    pub collections_dropped: u64,
}

impl RemovalOutcome {
    fn merge(self, other: RemovalOutcome) -> Self {
        Self {
            documents_deleted: self.documents_deleted + other.documents_deleted,
            collections_dropped: self.collections_dropped + other.collections_dropped,
        }
    }
}

pub struct HistoryStore {
    pool: SqlitePool,
    options: StoreOptions,
    naming: NamingResolver,
}

impl HistoryStore {
    pub async fn connect(
        path: &str,
        max_pool_size: u32,
        options: StoreOptions,
    ) -> anyhow::Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_pool_size)
            .connect_with(opts)
            .await?;
        let naming = NamingResolver::new(
            options.db_prefix.clone(),
            options.collection_prefix.clone(),
            options.data_model,
            options.should_hash,
        );
        Ok(Self {
            pool,
            options,
            naming,
        })
    }

    pub async fn init(&self) -> anyhow::Result<()> {
        catalog::init_catalog(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    pub fn naming(&self) -> &NamingResolver {
        &self.naming
    }

    /// Existing collection, or a new one when `create` is set. Returns whether this call created it.
    async fn ensure_collection(
        &self,
        database: &str,
        name: &str,
        kind: CollectionKind,
        create: bool,
        retention: RetentionPolicy,
    ) -> StoreResult<(Collection, bool)> {
        let namespace = naming::namespace(database, name);
        if let Some(existing) = catalog::find(&self.pool, &namespace).await? {
            return Ok((existing, false));
        }
        if !create {
            return Err(StoreError::CollectionNotFound { namespace });
        }

        let collection = Collection::new(database, name, kind, retention);
        let ddl = match kind {
            CollectionKind::Raw => raw::raw_ddl(&collection),
            CollectionKind::Aggregated => aggregation::aggregated_ddl(&collection),
            CollectionKind::Registry => registry::registry_ddl(&collection),
        };
        let created = catalog::create(&self.pool, &collection, &ddl).await?;
        if !created {
            // Lost the race against a concurrent creator; theirs is the recorded one.
            let recorded = catalog::find(&self.pool, &namespace).await?;
            return Ok((recorded.unwrap_or(collection), false));
        }
        info!(namespace = %namespace, kind = kind.as_str(), retention = ?retention, "created collection");
        Ok((collection, true))
    }

    async fn registry(&self, database: &str) -> StoreResult<Collection> {
        let (collection, _) = self
            .ensure_collection(
                database,
                &self.naming.registry_collection_name(),
                CollectionKind::Registry,
                true,
                RetentionPolicy::None,
            )
            .await?;
        Ok(collection)
    }

    async fn existing_registry(&self, database: &str) -> StoreResult<Option<Collection>> {
        let namespace = naming::namespace(database, &self.naming.registry_collection_name());
        catalog::find(&self.pool, &namespace).await
    }

    /// Handle of the collection holding `identity`'s history.
    ///
    /// The hash registry is written (and checked for collisions) only when this call creates
    /// the collection. An identity whose truncated hash matches an existing collection
    /// resolves to that collection without a registry check.
    #[instrument(skip(self), fields(store = "history", operation = "resolve_collection"))]
    pub async fn resolve_collection(
        &self,
        identity: &Identity,
        options: CollectionOptions,
    ) -> StoreResult<Collection> {
        let database = self.naming.database_name(&identity.service);
        let name = if options.aggregated {
            self.naming.aggregated_collection_name(identity)
        } else {
            self.naming.raw_collection_name(identity)
        }
        .inspect_err(|e| warn!(error = %e, "collection name could not be generated"))?;

        let kind = if options.aggregated {
            CollectionKind::Aggregated
        } else {
            CollectionKind::Raw
        };
        let retention = if options.truncate {
            RetentionPolicy::for_collection(&self.options.truncation, options.aggregated)
        } else {
            RetentionPolicy::None
        };
        let (collection, created) = self
            .ensure_collection(&database, &name, kind, options.create, retention)
            .await?;

        if created && options.store_hash && self.naming.should_hash() {
            let registry = self.registry(&database).await?;
            let entry = CollectionNameEntry {
                hash: name.clone(),
                data_model: self.naming.data_model(),
                is_aggregated: options.aggregated,
                service: identity.service.clone(),
                service_path: identity.service_path.clone(),
                identity: self.naming.strategy().collection_fields(identity),
            };
            registry::register(&self.pool, &registry, &entry).await?;
        }
        Ok(collection)
    }

    /// Reverse lookup of a hashed collection name.
    #[instrument(skip(self), fields(store = "history", operation = "lookup_collection_hash"))]
    pub async fn lookup_collection_hash(
        &self,
        service: &str,
        collection_name: &str,
    ) -> StoreResult<Option<CollectionNameEntry>> {
        let database = self.naming.database_name(service);
        match self.existing_registry(&database).await? {
            Some(registry) => registry::lookup(&self.pool, &registry, collection_name).await,
            None => Ok(None),
        }
    }

    /// Writes raw and/or aggregated history for the event, as configured.
    #[instrument(skip(self, event), fields(store = "history", operation = "store_event", attr = %event.identity.attr_name))]
    pub async fn store_event(&self, event: &AttributeEvent) -> StoreResult<()> {
        match self.options.should_store {
            ShouldStore::Both => {
                let (raw, aggregated) =
                    tokio::join!(self.store_raw(event), self.store_aggregated(event));
                raw.and(aggregated)
            }
            ShouldStore::OnlyRaw => self.store_raw(event).await,
            ShouldStore::OnlyAggregated => self.store_aggregated(event).await,
        }
    }

    #[instrument(skip(self, event), fields(store = "history", operation = "store_raw"))]
    pub async fn store_raw(&self, event: &AttributeEvent) -> StoreResult<()> {
        let collection = self
            .resolve_collection(&event.identity, CollectionOptions::write(false))
            .await?;
        let doc = self.naming.strategy().build_raw_document(event);
        raw::insert(&self.pool, &collection, &doc).await?;
        if matches!(collection.retention, RetentionPolicy::Capped { .. }) {
            let trimmed = retention::enforce_cap(&self.pool, &collection).await?;
            if trimmed > 0 {
                debug!(collection = %collection.name, trimmed, "capped collection trimmed");
            }
        }
        Ok(())
    }

    #[instrument(skip(self, event), fields(store = "history", operation = "store_aggregated"))]
    pub async fn store_aggregated(&self, event: &AttributeEvent) -> StoreResult<()> {
        let collection = self
            .resolve_collection(&event.identity, CollectionOptions::write(true))
            .await?;
        let fields = self.naming.strategy().document_fields(&event.identity);
        aggregation::store_all_resolutions(
            &self.pool,
            &collection,
            &fields,
            &event.attr_type,
            &event.attr_value,
            &self.options.aggregation_by,
            event.timestamp(),
        )
        .await
    }

    /// Collection for a read, or `None` when there is no history to read.
    async fn collection_for_read(
        &self,
        identity: &Identity,
        aggregated: bool,
    ) -> StoreResult<Option<Collection>> {
        match self
            .resolve_collection(identity, CollectionOptions::read(aggregated))
            .await
        {
            Ok(collection) => Ok(Some(collection)),
            Err(e) if e.is_absent_history() => {
                debug!(error = %e, "no history to read");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, query), fields(store = "history", operation = "query_raw"))]
    pub async fn query_raw(&self, query: &RawQuery) -> StoreResult<Vec<RawEvent>> {
        let Some(collection) = self.collection_for_read(&query.identity, false).await? else {
            return Ok(Vec::new());
        };
        let fields = self.naming.strategy().document_fields(&query.identity);
        raw::find(&self.pool, &collection, &DocumentFilter::from(&fields), query).await
    }

    #[instrument(skip(self, query), fields(store = "history", operation = "query_aggregated", resolution = %query.resolution, method = %query.method))]
    pub async fn query_aggregated(
        &self,
        query: &AggregatedQuery,
    ) -> StoreResult<Vec<AggregatedBucket>> {
        let Some(collection) = self.collection_for_read(&query.identity, true).await? else {
            return Ok(Vec::new());
        };
        let fields = self.naming.strategy().document_fields(&query.identity);
        let (origin_from, origin_to) = query.origin_range();
        let buckets = aggregation::find_buckets(
            &self.pool,
            &collection,
            &fields,
            query.resolution,
            origin_from,
            origin_to,
        )
        .await?;
        Ok(query::shape_results(
            buckets,
            query,
            self.options.filter_out_empty,
        ))
    }

    /// Deletes the history inside `scope` for the kinds of history being stored.
    #[instrument(skip(self), fields(store = "history", operation = "remove_data"))]
    pub async fn remove_data(&self, scope: &RemovalScope) -> StoreResult<RemovalOutcome> {
        let should_store = self.options.should_store;
        let (raw, aggregated) = tokio::join!(
            async {
                if should_store.raw() {
                    self.remove_kind(scope, false).await
                } else {
                    Ok(RemovalOutcome::default())
                }
            },
            async {
                if should_store.aggregated() {
                    self.remove_kind(scope, true).await
                } else {
                    Ok(RemovalOutcome::default())
                }
            }
        );
        let outcome = raw?.merge(aggregated?);
        info!(
            documents_deleted = outcome.documents_deleted,
            collections_dropped = outcome.collections_dropped,
            "history removed"
        );
        Ok(outcome)
    }

    async fn remove_kind(&self, scope: &RemovalScope, aggregated: bool) -> StoreResult<RemovalOutcome> {
        let database = self.naming.database_name(&scope.service);
        let plan = self.naming.strategy().removal_plan(scope)?;
        match plan {
            RemovalPlan::DeleteDocuments { segment, filter } => {
                let Some(collection) = self.named_collection(&database, &segment, aggregated).await?
                else {
                    return Ok(RemovalOutcome::default());
                };
                let documents_deleted = if aggregated {
                    aggregation::delete_documents(&self.pool, &collection, &filter).await?
                } else {
                    raw::delete_documents(&self.pool, &collection, &filter).await?
                };
                Ok(RemovalOutcome {
                    documents_deleted,
                    collections_dropped: 0,
                })
            }
            RemovalPlan::DropCollection { segment } => {
                let Some(collection) = self.named_collection(&database, &segment, aggregated).await?
                else {
                    return Ok(RemovalOutcome::default());
                };
                self.drop_collection(&database, &collection).await?;
                Ok(RemovalOutcome {
                    documents_deleted: 0,
                    collections_dropped: 1,
                })
            }
            RemovalPlan::DropPrefix { segment_prefix } => {
                let targets = if self.naming.should_hash() {
                    let Some(registry) = self.existing_registry(&database).await? else {
                        return Ok(RemovalOutcome::default());
                    };
                    let mut targets = Vec::new();
                    for entry in
                        registry::entries_in_scope(&self.pool, &registry, scope, aggregated).await?
                    {
                        let namespace = naming::namespace(&database, &entry.hash);
                        match catalog::find(&self.pool, &namespace).await? {
                            Some(collection) => targets.push(collection),
                            None => registry::remove(&self.pool, &registry, &entry.hash).await?,
                        }
                    }
                    targets
                } else {
                    let prefix = self.naming.literal_name_prefix(&segment_prefix);
                    let kind = if aggregated {
                        CollectionKind::Aggregated
                    } else {
                        CollectionKind::Raw
                    };
                    catalog::list(&self.pool, &database)
                        .await?
                        .into_iter()
                        .filter(|c| c.kind == kind && c.name.starts_with(&prefix))
                        .collect()
                };
                let mut outcome = RemovalOutcome::default();
                for collection in targets {
                    self.drop_collection(&database, &collection).await?;
                    outcome.collections_dropped += 1;
                }
                Ok(outcome)
            }
        }
    }

    /// Existing collection for an identity segment; `None` when it cannot be named or does not exist.
    async fn named_collection(
        &self,
        database: &str,
        segment: &str,
        aggregated: bool,
    ) -> StoreResult<Option<Collection>> {
        let name = match self
            .naming
            .collection_name_for_segment(database, segment, aggregated)
        {
            Ok(name) => name,
            Err(e) => {
                debug!(error = %e, "nothing to remove");
                return Ok(None);
            }
        };
        catalog::find(&self.pool, &naming::namespace(database, &name)).await
    }

    async fn drop_collection(&self, database: &str, collection: &Collection) -> StoreResult<()> {
        catalog::drop(&self.pool, collection).await?;
        if self.naming.should_hash()
            && let Some(registry) = self.existing_registry(database).await?
        {
            registry::remove(&self.pool, &registry, &collection.name).await?;
        }
        info!(namespace = %collection.namespace(), "dropped collection");
        Ok(())
    }

    /// Names of the collections of a service's database.
    pub async fn collection_names(&self, service: &str) -> StoreResult<Vec<String>> {
        let database = self.naming.database_name(service);
        Ok(catalog::list(&self.pool, &database)
            .await?
            .into_iter()
            .map(|c| c.name)
            .collect())
    }

    /// Deletes the documents of every TTL collection that expired at `now`.
    #[instrument(skip(self), fields(store = "history", operation = "prune_expired"))]
    pub async fn prune_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut pruned = 0;
        for collection in catalog::list_expiring(&self.pool).await? {
            pruned += retention::prune_collection(&self.pool, &collection, now).await?;
        }
        if pruned > 0 {
            info!(pruned, "expired documents pruned");
        }
        Ok(pruned)
    }

    #[instrument(skip(self), fields(store = "history", operation = "vacuum"))]
    pub async fn vacuum(&self) -> StoreResult<()> {
        sqlx::query("VACUUM").execute(&self.pool).await?;
        Ok(())
    }
}
