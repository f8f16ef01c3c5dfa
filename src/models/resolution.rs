// Aggregation resolutions and the aggregation methods clients can ask for.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Granularity of the points inside an aggregated bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Second,
    Minute,
    Hour,
    Day,
    Month,
}

impl Resolution {
    pub const ALL: [Resolution; 5] = [
        Resolution::Second,
        Resolution::Minute,
        Resolution::Hour,
        Resolution::Day,
        Resolution::Month,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Resolution::Second => "second",
            Resolution::Minute => "minute",
            Resolution::Hour => "hour",
            Resolution::Day => "day",
            Resolution::Month => "month",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "second" => Ok(Resolution::Second),
            "minute" => Ok(Resolution::Minute),
            "hour" => Ok(Resolution::Hour),
            "day" => Ok(Resolution::Day),
            "month" => Ok(Resolution::Month),
            other => Err(format!("unknown resolution '{}'", other)),
        }
    }
}

/// Whether a value (or an aggregation method) works on numbers or on text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationKind {
    Numeric,
    Textual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationMethod {
    Sum,
    Sum2,
    Min,
    Max,
    Occur,
}

impl AggregationMethod {
    pub fn kind(self) -> AggregationKind {
        match self {
            AggregationMethod::Occur => AggregationKind::Textual,
            _ => AggregationKind::Numeric,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AggregationMethod::Sum => "sum",
            AggregationMethod::Sum2 => "sum2",
            AggregationMethod::Min => "min",
            AggregationMethod::Max => "max",
            AggregationMethod::Occur => "occur",
        }
    }
}

impl fmt::Display for AggregationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregationMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sum" => Ok(AggregationMethod::Sum),
            "sum2" => Ok(AggregationMethod::Sum2),
            "min" => Ok(AggregationMethod::Min),
            "max" => Ok(AggregationMethod::Max),
            "occur" => Ok(AggregationMethod::Occur),
            other => Err(format!("unknown aggregation method '{}'", other)),
        }
    }
}
