// Aggregated buckets: the stored document (one period's worth of points) and the
// shape returned to clients for one aggregation method.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::identity::IdentityFields;
use super::resolution::{AggregationMethod, Resolution};

/// Statistics for one sub-period of a bucket.
///
/// `sum`, `sum2`, `min` and `max` stay `None` until a numeric value is aggregated;
/// `occur` stays empty until a textual one is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Point {
    pub offset: u32,
    pub samples: u64,
    pub num_samples: u64,
    pub txt_samples: u64,
    pub sum: Option<f64>,
    pub sum2: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    #[serde(default)]
    pub occur: BTreeMap<String, u64>,
}

impl Point {
    pub fn empty(offset: u32) -> Self {
        Self {
            offset,
            samples: 0,
            num_samples: 0,
            txt_samples: 0,
            sum: None,
            sum2: None,
            min: None,
            max: None,
            occur: BTreeMap::new(),
        }
    }

    pub fn value_for(&self, method: AggregationMethod) -> PointValue {
        match method {
            AggregationMethod::Sum => PointValue::Sum(self.sum),
            AggregationMethod::Sum2 => PointValue::Sum2(self.sum2),
            AggregationMethod::Min => PointValue::Min(self.min),
            AggregationMethod::Max => PointValue::Max(self.max),
            AggregationMethod::Occur => PointValue::Occur(self.occur.clone()),
        }
    }

    /// Clears the counters and the value of `method`, keeping the point in place.
    pub fn reset_for(&mut self, method: AggregationMethod) {
        self.samples = 0;
        self.num_samples = 0;
        self.txt_samples = 0;
        match method {
            AggregationMethod::Sum => self.sum = None,
            AggregationMethod::Sum2 => self.sum2 = None,
            AggregationMethod::Min => self.min = None,
            AggregationMethod::Max => self.max = None,
            AggregationMethod::Occur => self.occur.clear(),
        }
    }
}

/// Key of an aggregated bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketId {
    #[serde(flatten)]
    pub identity: IdentityFields,
    pub resolution: Resolution,
    pub origin: DateTime<Utc>,
}

/// Stored aggregated bucket with the full prepopulated point array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationBucket {
    #[serde(rename = "_id")]
    pub id: BucketId,
    pub attr_type: String,
    pub points: Vec<Point>,
}

/// The value of one aggregation method inside a point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointValue {
    Sum(Option<f64>),
    Sum2(Option<f64>),
    Min(Option<f64>),
    Max(Option<f64>),
    Occur(BTreeMap<String, u64>),
}

impl PointValue {
    /// True when nothing of this kind was ever aggregated into the point.
    pub fn is_empty(&self) -> bool {
        match self {
            PointValue::Sum(v) | PointValue::Sum2(v) | PointValue::Min(v) | PointValue::Max(v) => {
                v.is_none()
            }
            PointValue::Occur(occur) => occur.is_empty(),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            PointValue::Sum(v) | PointValue::Sum2(v) | PointValue::Min(v) | PointValue::Max(v) => *v,
            PointValue::Occur(_) => None,
        }
    }

    pub fn as_occur(&self) -> Option<&BTreeMap<String, u64>> {
        match self {
            PointValue::Occur(occur) => Some(occur),
            _ => None,
        }
    }
}

/// A point as returned by an aggregated query: offset, samples and one method's value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultPoint {
    pub offset: u32,
    pub samples: u64,
    #[serde(flatten)]
    pub value: PointValue,
}

/// A bucket as returned by an aggregated query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedBucket {
    #[serde(rename = "_id")]
    pub id: BucketId,
    pub points: Vec<ResultPoint>,
}
