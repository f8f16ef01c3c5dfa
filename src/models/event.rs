// Attribute change events: the incoming notification, the validated event and the
// raw document stored for it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::identity::{Identity, IdentityFields};
use super::resolution::AggregationKind;
use crate::error::{StoreError, StoreResult};

/// An attribute value that can be stored and aggregated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Number(f64),
    Text(String),
}

impl AttrValue {
    /// Validates a notified value. Rejects null, objects, arrays, booleans, empty strings
    /// and (when `ignore_blank_spaces`) whitespace-only strings.
    pub fn from_json(value: &Value, ignore_blank_spaces: bool) -> StoreResult<Self> {
        match value {
            Value::Number(n) => n
                .as_f64()
                .map(AttrValue::Number)
                .ok_or_else(|| StoreError::Validation(format!("unsupported number {}", n))),
            Value::String(s) if s.is_empty() => {
                Err(StoreError::Validation("empty attribute value".into()))
            }
            Value::String(s) if ignore_blank_spaces && s.trim().is_empty() => Err(
                StoreError::Validation("attribute value only contains blank spaces".into()),
            ),
            Value::String(s) => Ok(AttrValue::Text(s.clone())),
            other => Err(StoreError::Validation(format!(
                "attribute value must be a string or a number, got {}",
                other
            ))),
        }
    }

    /// The numeric reading of the value: numbers, and strings holding a finite number
    /// (surrounding blanks allowed, blank-only strings excluded).
    pub fn as_number(&self) -> Option<f64> {
        match self {
            AttrValue::Number(v) => Some(*v),
            AttrValue::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return None;
                }
                trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
            }
        }
    }

    pub fn kind(&self) -> AggregationKind {
        if self.as_number().is_some() {
            AggregationKind::Numeric
        } else {
            AggregationKind::Textual
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            AttrValue::Number(v) => v.to_string(),
            AttrValue::Text(s) => s.clone(),
        }
    }
}

/// Attribute change as handed over by the notification layer (one per attribute).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub service: String,
    pub service_path: String,
    pub entity_id: String,
    #[serde(default)]
    pub entity_type: Option<String>,
    pub attr_name: String,
    pub attr_type: String,
    pub attr_value: Value,
    /// Receive time; the intake fills it in when absent.
    #[serde(default)]
    pub recv_time: Option<DateTime<Utc>>,
    /// `TimeInstant` metadata; overrides the receive time when present.
    #[serde(default)]
    pub time_instant: Option<DateTime<Utc>>,
}

impl Notification {
    pub fn into_event(
        self,
        received_at: DateTime<Utc>,
        ignore_blank_spaces: bool,
    ) -> StoreResult<AttributeEvent> {
        let attr_value = AttrValue::from_json(&self.attr_value, ignore_blank_spaces)?;
        Ok(AttributeEvent {
            identity: Identity {
                service: self.service,
                service_path: self.service_path,
                entity_id: self.entity_id,
                entity_type: self.entity_type,
                attr_name: self.attr_name,
            },
            attr_type: self.attr_type,
            attr_value,
            recv_time: self.recv_time.unwrap_or(received_at),
            time_instant: self.time_instant,
        })
    }
}

/// A validated attribute change, ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeEvent {
    pub identity: Identity,
    pub attr_type: String,
    pub attr_value: AttrValue,
    pub recv_time: DateTime<Utc>,
    pub time_instant: Option<DateTime<Utc>>,
}

impl AttributeEvent {
    pub fn new(
        identity: Identity,
        attr_type: impl Into<String>,
        attr_value: AttrValue,
        recv_time: DateTime<Utc>,
    ) -> Self {
        Self {
            identity,
            attr_type: attr_type.into(),
            attr_value,
            recv_time,
            time_instant: None,
        }
    }

    pub fn with_time_instant(mut self, time_instant: DateTime<Utc>) -> Self {
        self.time_instant = Some(time_instant);
        self
    }

    /// Time the value is stored and aggregated under.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.time_instant.unwrap_or(self.recv_time)
    }
}

/// Raw history document. Identity fields are present only when the data model keeps them
/// inside documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    pub recv_time: DateTime<Utc>,
    #[serde(flatten)]
    pub identity: IdentityFields,
    pub attr_type: String,
    pub attr_value: AttrValue,
}
