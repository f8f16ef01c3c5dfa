// Collection naming: data-model strategies and the namespace budget.
// Names are pure functions of the identity and the configured prefixes; the
// store resolves them on every call.

use sha2::{Digest, Sha512};

use crate::error::{NamingError, StoreError, StoreResult};
use crate::models::{AttributeEvent, DataModel, Identity, IdentityFields, RawEvent, RemovalScope};

/// Bytes available for `<database>.<collection>.aggr`.
pub const MAX_NAMESPACE_SIZE_IN_BYTES: usize = 113;
/// Shortest hash accepted as a collection name.
pub const MIN_HASH_SIZE_IN_BYTES: i64 = 20;
pub const AGGREGATED_SUFFIX: &str = ".aggr";
/// Registry collection (after the collection prefix) holding hash → identity entries.
pub const REGISTRY_COLLECTION: &str = "collection_names";

/// What `remove_data` has to do for a scope under a data model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemovalPlan {
    /// Delete the documents matching `filter` inside the collection named by `segment`.
    DeleteDocuments {
        segment: String,
        filter: DocumentFilter,
    },
    /// Drop the one collection named by `segment`.
    DropCollection { segment: String },
    /// Drop every collection whose segment starts with `segment_prefix`.
    DropPrefix { segment_prefix: String },
}

/// Identity match on documents of a shared collection. `None` fields are not matched;
/// `entity_type` is matched (absent included) whenever `entity_id` is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentFilter {
    pub entity_id: Option<String>,
    pub entity_type: Option<String>,
    pub attr_name: Option<String>,
}

/// How identities are spread over collections and documents.
pub trait DataModelStrategy: Send + Sync {
    fn data_model(&self) -> DataModel;

    /// Identity part of the collection name, before lower-casing.
    fn collection_segment(&self, identity: &Identity) -> String;

    /// Identity fields encoded in the collection name.
    fn collection_fields(&self, identity: &Identity) -> IdentityFields;

    /// Identity fields carried by every document.
    fn document_fields(&self, identity: &Identity) -> IdentityFields;

    fn removal_plan(&self, scope: &RemovalScope) -> StoreResult<RemovalPlan>;

    fn build_raw_document(&self, event: &AttributeEvent) -> RawEvent {
        RawEvent {
            recv_time: event.timestamp(),
            identity: self.document_fields(&event.identity),
            attr_type: event.attr_type.clone(),
            attr_value: event.attr_value.clone(),
        }
    }
}

fn entity_segment(service_path: &str, entity_id: &str, entity_type: Option<&str>) -> String {
    match entity_type {
        Some(entity_type) => format!("{}_{}_{}", service_path, entity_id, entity_type),
        None => format!("{}_{}", service_path, entity_id),
    }
}

fn require_entity(scope: &RemovalScope) -> StoreResult<&str> {
    scope.entity_id.as_deref().ok_or_else(|| {
        StoreError::Validation(format!(
            "removing attribute '{}' needs an entity id",
            scope.attr_name.as_deref().unwrap_or_default()
        ))
    })
}

pub struct PerServicePath;

impl DataModelStrategy for PerServicePath {
    fn data_model(&self) -> DataModel {
        DataModel::CollectionPerServicePath
    }

    fn collection_segment(&self, identity: &Identity) -> String {
        identity.service_path.clone()
    }

    fn collection_fields(&self, _identity: &Identity) -> IdentityFields {
        IdentityFields::default()
    }

    fn document_fields(&self, identity: &Identity) -> IdentityFields {
        IdentityFields {
            entity_id: Some(identity.entity_id.clone()),
            entity_type: identity.entity_type.clone(),
            attr_name: Some(identity.attr_name.clone()),
        }
    }

    fn removal_plan(&self, scope: &RemovalScope) -> StoreResult<RemovalPlan> {
        let segment = scope.service_path.clone();
        if scope.entity_id.is_none() && scope.attr_name.is_none() {
            return Ok(RemovalPlan::DropCollection { segment });
        }
        Ok(RemovalPlan::DeleteDocuments {
            segment,
            filter: DocumentFilter {
                entity_id: scope.entity_id.clone(),
                entity_type: scope.entity_type.clone(),
                attr_name: scope.attr_name.clone(),
            },
        })
    }
}

pub struct PerEntity;

impl DataModelStrategy for PerEntity {
    fn data_model(&self) -> DataModel {
        DataModel::CollectionPerEntity
    }

    fn collection_segment(&self, identity: &Identity) -> String {
        entity_segment(
            &identity.service_path,
            &identity.entity_id,
            identity.entity_type.as_deref(),
        )
    }

    fn collection_fields(&self, identity: &Identity) -> IdentityFields {
        IdentityFields {
            entity_id: Some(identity.entity_id.clone()),
            entity_type: identity.entity_type.clone(),
            attr_name: None,
        }
    }

    fn document_fields(&self, identity: &Identity) -> IdentityFields {
        IdentityFields {
            attr_name: Some(identity.attr_name.clone()),
            ..IdentityFields::default()
        }
    }

    fn removal_plan(&self, scope: &RemovalScope) -> StoreResult<RemovalPlan> {
        match (&scope.entity_id, &scope.attr_name) {
            (None, None) => Ok(RemovalPlan::DropPrefix {
                segment_prefix: format!("{}_", scope.service_path),
            }),
            (Some(entity_id), None) => Ok(RemovalPlan::DropCollection {
                segment: entity_segment(&scope.service_path, entity_id, scope.entity_type.as_deref()),
            }),
            (_, Some(attr_name)) => {
                let entity_id = require_entity(scope)?;
                Ok(RemovalPlan::DeleteDocuments {
                    segment: entity_segment(
                        &scope.service_path,
                        entity_id,
                        scope.entity_type.as_deref(),
                    ),
                    filter: DocumentFilter {
                        attr_name: Some(attr_name.clone()),
                        ..DocumentFilter::default()
                    },
                })
            }
        }
    }
}

pub struct PerAttribute;

impl DataModelStrategy for PerAttribute {
    fn data_model(&self) -> DataModel {
        DataModel::CollectionPerAttribute
    }

    fn collection_segment(&self, identity: &Identity) -> String {
        format!(
            "{}_{}",
            entity_segment(
                &identity.service_path,
                &identity.entity_id,
                identity.entity_type.as_deref(),
            ),
            identity.attr_name
        )
    }

    fn collection_fields(&self, identity: &Identity) -> IdentityFields {
        IdentityFields {
            entity_id: Some(identity.entity_id.clone()),
            entity_type: identity.entity_type.clone(),
            attr_name: Some(identity.attr_name.clone()),
        }
    }

    fn document_fields(&self, _identity: &Identity) -> IdentityFields {
        IdentityFields::default()
    }

    fn removal_plan(&self, scope: &RemovalScope) -> StoreResult<RemovalPlan> {
        match (&scope.entity_id, &scope.attr_name) {
            (None, None) => Ok(RemovalPlan::DropPrefix {
                segment_prefix: format!("{}_", scope.service_path),
            }),
            (Some(entity_id), None) => Ok(RemovalPlan::DropPrefix {
                segment_prefix: format!(
                    "{}_",
                    entity_segment(&scope.service_path, entity_id, scope.entity_type.as_deref())
                ),
            }),
            (_, Some(attr_name)) => {
                let entity_id = require_entity(scope)?;
                Ok(RemovalPlan::DropCollection {
                    segment: format!(
                        "{}_{}",
                        entity_segment(&scope.service_path, entity_id, scope.entity_type.as_deref()),
                        attr_name
                    ),
                })
            }
        }
    }
}

pub fn strategy_for(data_model: DataModel) -> Box<dyn DataModelStrategy> {
    match data_model {
        DataModel::CollectionPerServicePath => Box::new(PerServicePath),
        DataModel::CollectionPerEntity => Box::new(PerEntity),
        DataModel::CollectionPerAttribute => Box::new(PerAttribute),
    }
}

/// Lower-case hex SHA-512 of `input`, cut to `limit` characters.
pub fn generate_hash(input: &str, limit: usize) -> String {
    let mut hasher = Sha512::new();
    hasher.update(input.as_bytes());
    let mut hash = hex::encode(hasher.finalize());
    hash.truncate(limit);
    hash
}

pub fn is_aggregated(collection_name: &str) -> bool {
    collection_name.ends_with(AGGREGATED_SUFFIX)
}

/// Full namespace of a collection.
pub fn namespace(database: &str, collection: &str) -> String {
    format!("{}.{}", database, collection)
}

pub struct NamingResolver {
    db_prefix: String,
    collection_prefix: String,
    should_hash: bool,
    strategy: Box<dyn DataModelStrategy>,
}

impl NamingResolver {
    pub fn new(
        db_prefix: impl Into<String>,
        collection_prefix: impl Into<String>,
        data_model: DataModel,
        should_hash: bool,
    ) -> Self {
        Self {
            db_prefix: db_prefix.into(),
            collection_prefix: collection_prefix.into(),
            should_hash,
            strategy: strategy_for(data_model),
        }
    }

    pub fn strategy(&self) -> &dyn DataModelStrategy {
        self.strategy.as_ref()
    }

    pub fn data_model(&self) -> DataModel {
        self.strategy.data_model()
    }

    pub fn should_hash(&self) -> bool {
        self.should_hash
    }

    pub fn collection_prefix(&self) -> &str {
        &self.collection_prefix
    }

    pub fn database_name(&self, service: &str) -> String {
        format!("{}{}", self.db_prefix, service)
    }

    /// Characters left for the hash once database, separator, prefix and `.aggr` are counted.
    /// Negative when the fixed parts alone exceed the budget.
    pub fn hash_size_in_bytes(&self, database: &str) -> i64 {
        MAX_NAMESPACE_SIZE_IN_BYTES as i64
            - database.len() as i64
            - 1
            - self.collection_prefix.len() as i64
            - AGGREGATED_SUFFIX.len() as i64
    }

    pub fn raw_collection_name(&self, identity: &Identity) -> Result<String, NamingError> {
        let database = self.database_name(&identity.service);
        self.raw_name_for_segment(&database, &self.strategy.collection_segment(identity))
    }

    pub fn aggregated_collection_name(&self, identity: &Identity) -> Result<String, NamingError> {
        Ok(format!(
            "{}{}",
            self.raw_collection_name(identity)?,
            AGGREGATED_SUFFIX
        ))
    }

    /// Collection name for an already built identity segment.
    pub fn collection_name_for_segment(
        &self,
        database: &str,
        segment: &str,
        aggregated: bool,
    ) -> Result<String, NamingError> {
        let raw = self.raw_name_for_segment(database, segment)?;
        Ok(if aggregated {
            format!("{}{}", raw, AGGREGATED_SUFFIX)
        } else {
            raw
        })
    }

    /// Literal name prefix shared by every collection whose segment starts with `segment_prefix`.
    pub fn literal_name_prefix(&self, segment_prefix: &str) -> String {
        format!("{}{}", self.collection_prefix, segment_prefix.to_lowercase())
    }

    pub fn registry_collection_name(&self) -> String {
        format!("{}{}", self.collection_prefix, REGISTRY_COLLECTION)
    }

    fn raw_name_for_segment(&self, database: &str, segment: &str) -> Result<String, NamingError> {
        let segment = segment.to_lowercase();
        if self.should_hash {
            let limit = self.hash_size_in_bytes(database);
            if limit < MIN_HASH_SIZE_IN_BYTES {
                return Err(NamingError::HashBudgetTooSmall {
                    database: database.to_string(),
                    available: limit,
                    required: MIN_HASH_SIZE_IN_BYTES,
                });
            }
            return Ok(format!(
                "{}{}",
                self.collection_prefix,
                generate_hash(&segment, limit as usize)
            ));
        }
        let name = format!("{}{}", self.collection_prefix, segment);
        let aggregated_namespace = namespace(database, &format!("{}{}", name, AGGREGATED_SUFFIX));
        if aggregated_namespace.len() > MAX_NAMESPACE_SIZE_IN_BYTES {
            return Err(NamingError::NamespaceTooLong {
                size: aggregated_namespace.len(),
                namespace: aggregated_namespace,
                budget: MAX_NAMESPACE_SIZE_IN_BYTES,
            });
        }
        Ok(name)
    }
}
