// Shared test helpers

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use sth::history_store::{HistoryStore, StoreOptions};
use sth::models::{AttrValue, AttributeEvent, Identity};
use tempfile::TempDir;

pub async fn open_store(dir: &TempDir, options: StoreOptions) -> HistoryStore {
    let path = dir.path().join("sth.db");
    let store = HistoryStore::connect(path.to_str().unwrap(), 4, options)
        .await
        .unwrap();
    store.init().await.unwrap();
    store
}

pub fn ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

pub fn identity(attr_name: &str) -> Identity {
    Identity::new("smartcity", "/parking", "Car1", Some("Car"), attr_name)
}

pub fn numeric_event(identity: &Identity, value: f64, at: &str) -> AttributeEvent {
    AttributeEvent::new(identity.clone(), "Number", AttrValue::Number(value), ts(at))
}

pub fn text_event(identity: &Identity, value: &str, at: &str) -> AttributeEvent {
    AttributeEvent::new(
        identity.clone(),
        "Text",
        AttrValue::Text(value.to_string()),
        ts(at),
    )
}
