// Shaping of aggregated reads: project the requested method, normalize sample counters and
// trim the points of the first and last buckets that fall outside [from, to].

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use super::bucket;
use crate::models::{
    AggregatedBucket, AggregationBucket, AggregationKind, AggregationMethod, Identity, PointValue,
    Resolution, ResultPoint,
};

#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedQuery {
    pub identity: Identity,
    pub resolution: Resolution,
    pub method: AggregationMethod,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
}

impl AggregatedQuery {
    pub fn new(identity: Identity, resolution: Resolution, method: AggregationMethod) -> Self {
        Self {
            identity,
            resolution,
            method,
            date_from: None,
            date_to: None,
        }
    }

    pub fn window(mut self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        self.date_from = from;
        self.date_to = to;
        self
    }

    /// Origins of the first and last buckets the window can touch.
    pub fn origin_range(&self) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        (
            self.date_from.map(|t| bucket::origin(t, self.resolution)),
            self.date_to.map(|t| bucket::origin(t, self.resolution)),
        )
    }
}

fn empty_value(method: AggregationMethod) -> PointValue {
    match method {
        AggregationMethod::Sum => PointValue::Sum(None),
        AggregationMethod::Sum2 => PointValue::Sum2(None),
        AggregationMethod::Min => PointValue::Min(None),
        AggregationMethod::Max => PointValue::Max(None),
        AggregationMethod::Occur => PointValue::Occur(BTreeMap::new()),
    }
}

/// Projects every bucket on `method`. Samples come from the method's own counter when it
/// is non-zero. With `filter_out_empty`, points without samples or without a value are
/// dropped, and so are buckets left without points.
pub fn fix_results(
    buckets: Vec<AggregationBucket>,
    method: AggregationMethod,
    filter_out_empty: bool,
) -> Vec<AggregatedBucket> {
    buckets
        .into_iter()
        .filter_map(|stored| {
            let points: Vec<ResultPoint> = stored
                .points
                .iter()
                .map(|point| {
                    let kind_samples = match method.kind() {
                        AggregationKind::Numeric => point.num_samples,
                        AggregationKind::Textual => point.txt_samples,
                    };
                    ResultPoint {
                        offset: point.offset,
                        samples: if kind_samples > 0 {
                            kind_samples
                        } else {
                            point.samples
                        },
                        value: point.value_for(method),
                    }
                })
                .filter(|point| !filter_out_empty || (point.samples > 0 && !point.value.is_empty()))
                .collect();
            if filter_out_empty && points.is_empty() {
                return None;
            }
            Some(AggregatedBucket {
                id: stored.id,
                points,
            })
        })
        .collect()
}

/// Removes (`filter_out_empty`) or empties the points outside the window in the bucket
/// whose origin matches the window bounds. A bucket left without points is dropped.
pub fn filter_results(
    mut results: Vec<AggregatedBucket>,
    resolution: Resolution,
    method: AggregationMethod,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    filter_out_empty: bool,
) -> Vec<AggregatedBucket> {
    let trim = |bucket: &mut AggregatedBucket, outside: &dyn Fn(u32) -> bool| {
        if filter_out_empty {
            bucket.points.retain(|point| !outside(point.offset));
        } else {
            for point in bucket.points.iter_mut().filter(|p| outside(p.offset)) {
                point.samples = 0;
                point.value = empty_value(method);
            }
        }
    };

    if let Some(from) = from
        && let Some(first) = results.first_mut()
        && first.id.origin == bucket::origin(from, resolution)
    {
        let min_offset = bucket::offset(resolution, from);
        trim(first, &|offset| offset < min_offset);
        if first.points.is_empty() {
            results.remove(0);
        }
    }

    if let Some(to) = to
        && let Some(last) = results.last_mut()
        && last.id.origin == bucket::origin(to, resolution)
    {
        let max_offset = bucket::offset(resolution, to);
        trim(last, &|offset| offset > max_offset);
        if last.points.is_empty() {
            results.pop();
        }
    }

    results
}

/// Full read-side shaping of the buckets returned for `query`.
pub fn shape_results(
    buckets: Vec<AggregationBucket>,
    query: &AggregatedQuery,
    filter_out_empty: bool,
) -> Vec<AggregatedBucket> {
    let fixed = fix_results(buckets, query.method, filter_out_empty);
    filter_results(
        fixed,
        query.resolution,
        query.method,
        query.date_from,
        query.date_to,
        filter_out_empty,
    )
}
