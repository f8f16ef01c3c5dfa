// Registry entry mapping a hashed collection name back to the identity it stands for.

use serde::{Deserialize, Serialize};

use super::identity::{DataModel, IdentityFields};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionNameEntry {
    /// Full collection name (hash, plus `.aggr` for aggregated collections).
    #[serde(rename = "_id")]
    pub hash: String,
    pub data_model: DataModel,
    pub is_aggregated: bool,
    pub service: String,
    pub service_path: String,
    /// Identity fields encoded in the collection name for `data_model`.
    #[serde(flatten)]
    pub identity: IdentityFields,
}

impl CollectionNameEntry {
    /// Same collection identity (the hash itself aside).
    pub fn same_identity(&self, other: &CollectionNameEntry) -> bool {
        self.data_model == other.data_model
            && self.is_aggregated == other.is_aggregated
            && self.service == other.service
            && self.service_path == other.service_path
            && self.identity == other.identity
    }
}
