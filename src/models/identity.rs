// Logical identity of an attribute history and the data models that partition it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Collection partitioning scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataModel {
    CollectionPerServicePath,
    CollectionPerEntity,
    CollectionPerAttribute,
}

impl DataModel {
    pub fn as_str(self) -> &'static str {
        match self {
            DataModel::CollectionPerServicePath => "collection-per-service-path",
            DataModel::CollectionPerEntity => "collection-per-entity",
            DataModel::CollectionPerAttribute => "collection-per-attribute",
        }
    }
}

impl fmt::Display for DataModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "collection-per-service-path" => Ok(DataModel::CollectionPerServicePath),
            "collection-per-entity" => Ok(DataModel::CollectionPerEntity),
            "collection-per-attribute" => Ok(DataModel::CollectionPerAttribute),
            other => Err(format!("unknown data model '{}'", other)),
        }
    }
}

/// One attribute of one entity, as seen by the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub service: String,
    pub service_path: String,
    pub entity_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    pub attr_name: String,
}

impl Identity {
    pub fn new(
        service: impl Into<String>,
        service_path: impl Into<String>,
        entity_id: impl Into<String>,
        entity_type: Option<&str>,
        attr_name: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            service_path: service_path.into(),
            entity_id: entity_id.into(),
            entity_type: entity_type.map(str::to_string),
            attr_name: attr_name.into(),
        }
    }
}

/// Subset of the identity fields (entity id, entity type, attribute name).
///
/// Used both for the fields encoded in a collection name and for the fields
/// carried inside documents; which is which depends on the data model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attr_name: Option<String>,
}

/// What to delete with `HistoryStore::remove_data`. Absent fields widen the scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovalScope {
    pub service: String,
    pub service_path: String,
    #[serde(default)]
    pub entity_id: Option<String>,
    #[serde(default)]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub attr_name: Option<String>,
}

impl RemovalScope {
    pub fn service_path(service: impl Into<String>, service_path: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            service_path: service_path.into(),
            entity_id: None,
            entity_type: None,
            attr_name: None,
        }
    }

    pub fn entity(mut self, entity_id: impl Into<String>, entity_type: Option<&str>) -> Self {
        self.entity_id = Some(entity_id.into());
        self.entity_type = entity_type.map(str::to_string);
        self
    }

    pub fn attribute(mut self, attr_name: impl Into<String>) -> Self {
        self.attr_name = Some(attr_name.into());
        self
    }
}

impl From<&Identity> for RemovalScope {
    fn from(identity: &Identity) -> Self {
        Self {
            service: identity.service.clone(),
            service_path: identity.service_path.clone(),
            entity_id: Some(identity.entity_id.clone()),
            entity_type: identity.entity_type.clone(),
            attr_name: Some(identity.attr_name.clone()),
        }
    }
}
