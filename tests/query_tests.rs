// Read-side shaping tests: method projection, empty filtering, window trimming

mod common;

use common::ts;
use sth::history_store::bucket::{origin, prepopulate};
use sth::history_store::query::{filter_results, fix_results};
use sth::models::{
    AggregatedBucket, AggregationBucket, AggregationMethod, BucketId, IdentityFields, PointValue,
    Resolution, ResultPoint,
};

fn stored_bucket(at: &str) -> AggregationBucket {
    AggregationBucket {
        id: BucketId {
            identity: IdentityFields {
                attr_name: Some("speed".into()),
                ..IdentityFields::default()
            },
            resolution: Resolution::Minute,
            origin: origin(ts(at), Resolution::Minute),
        },
        attr_type: "Number".into(),
        points: prepopulate(Resolution::Minute),
    }
}

fn record_numeric(bucket: &mut AggregationBucket, offset: usize, value: f64) {
    let point = &mut bucket.points[offset];
    point.samples += 1;
    point.num_samples += 1;
    point.sum = Some(point.sum.unwrap_or(0.0) + value);
    point.sum2 = Some(point.sum2.unwrap_or(0.0) + value * value);
    point.min = Some(point.min.map_or(value, |m| m.min(value)));
    point.max = Some(point.max.map_or(value, |m| m.max(value)));
}

fn record_text(bucket: &mut AggregationBucket, offset: usize, value: &str) {
    let point = &mut bucket.points[offset];
    point.samples += 1;
    point.txt_samples += 1;
    *point.occur.entry(value.to_string()).or_default() += 1;
}

fn offsets(bucket: &AggregatedBucket) -> Vec<u32> {
    bucket.points.iter().map(|p| p.offset).collect()
}

#[test]
fn fix_results_projects_the_requested_method() {
    let mut bucket = stored_bucket("2024-03-15T10:00:00Z");
    record_numeric(&mut bucket, 3, 2.0);
    record_numeric(&mut bucket, 3, 4.0);

    let sum2 = fix_results(vec![bucket.clone()], AggregationMethod::Sum2, true);
    assert_eq!(
        sum2[0].points,
        vec![ResultPoint {
            offset: 3,
            samples: 2,
            value: PointValue::Sum2(Some(20.0)),
        }]
    );

    let max = fix_results(vec![bucket], AggregationMethod::Max, true);
    assert_eq!(max[0].points[0].value, PointValue::Max(Some(4.0)));
}

#[test]
fn fix_results_uses_the_counter_of_the_method_kind() {
    let mut bucket = stored_bucket("2024-03-15T10:00:00Z");
    record_numeric(&mut bucket, 7, 1.0);
    record_text(&mut bucket, 7, "a");
    record_text(&mut bucket, 7, "b");
    record_text(&mut bucket, 7, "a");

    let sum = fix_results(vec![bucket.clone()], AggregationMethod::Sum, true);
    assert_eq!(sum[0].points[0].samples, 1);
    let occur = fix_results(vec![bucket], AggregationMethod::Occur, true);
    assert_eq!(occur[0].points[0].samples, 3);
    assert_eq!(occur[0].points[0].value.as_occur().unwrap().get("a"), Some(&2));
}

#[test]
fn fix_results_falls_back_to_total_samples() {
    let mut bucket = stored_bucket("2024-03-15T10:00:00Z");
    bucket.points[9].samples = 5;
    bucket.points[9].sum = Some(10.0);
    let fixed = fix_results(vec![bucket], AggregationMethod::Sum, true);
    assert_eq!(fixed[0].points[0].samples, 5);
}

#[test]
fn fix_results_drops_empty_points_and_buckets() {
    let mut with_data = stored_bucket("2024-03-15T10:00:00Z");
    record_numeric(&mut with_data, 1, 1.0);
    let untouched = stored_bucket("2024-03-15T11:00:00Z");
    let mut textual_only = stored_bucket("2024-03-15T12:00:00Z");
    record_text(&mut textual_only, 2, "x");

    let fixed = fix_results(
        vec![with_data, untouched, textual_only],
        AggregationMethod::Min,
        true,
    );
    assert_eq!(fixed.len(), 1);
    assert_eq!(fixed[0].id.origin, ts("2024-03-15T10:00:00Z"));
    assert_eq!(offsets(&fixed[0]), vec![1]);
}

#[test]
fn fix_results_keeps_everything_without_filtering() {
    let untouched = stored_bucket("2024-03-15T11:00:00Z");
    let fixed = fix_results(vec![untouched], AggregationMethod::Occur, false);
    assert_eq!(fixed.len(), 1);
    assert_eq!(fixed[0].points.len(), 60);
    assert!(fixed[0].points.iter().all(|p| p.samples == 0 && p.value.is_empty()));
}

#[test]
fn filter_results_trims_first_and_last_bucket() {
    let mut first = stored_bucket("2024-03-15T10:00:00Z");
    let mut middle = stored_bucket("2024-03-15T11:00:00Z");
    let mut last = stored_bucket("2024-03-15T12:00:00Z");
    for offset in [5, 30, 55] {
        record_numeric(&mut first, offset, 1.0);
        record_numeric(&mut middle, offset, 1.0);
        record_numeric(&mut last, offset, 1.0);
    }
    let fixed = fix_results(vec![first, middle, last], AggregationMethod::Sum, true);

    let filtered = filter_results(
        fixed,
        Resolution::Minute,
        AggregationMethod::Sum,
        Some(ts("2024-03-15T10:30:00Z")),
        Some(ts("2024-03-15T12:30:59Z")),
        true,
    );
    assert_eq!(filtered.len(), 3);
    assert_eq!(offsets(&filtered[0]), vec![30, 55]);
    assert_eq!(offsets(&filtered[1]), vec![5, 30, 55]);
    assert_eq!(offsets(&filtered[2]), vec![5, 30]);
}

#[test]
fn filter_results_resets_points_without_filtering() {
    let mut bucket = stored_bucket("2024-03-15T10:00:00Z");
    record_numeric(&mut bucket, 5, 1.0);
    record_numeric(&mut bucket, 30, 2.0);
    let fixed = fix_results(vec![bucket], AggregationMethod::Sum, false);

    let filtered = filter_results(
        fixed,
        Resolution::Minute,
        AggregationMethod::Sum,
        Some(ts("2024-03-15T10:10:00Z")),
        None,
        false,
    );
    assert_eq!(filtered[0].points.len(), 60);
    assert_eq!(filtered[0].points[5].samples, 0);
    assert_eq!(filtered[0].points[5].value, PointValue::Sum(None));
    assert_eq!(filtered[0].points[30].value, PointValue::Sum(Some(2.0)));
}

#[test]
fn filter_results_drops_buckets_emptied_by_trimming() {
    let mut first = stored_bucket("2024-03-15T10:00:00Z");
    record_numeric(&mut first, 5, 1.0);
    let mut last = stored_bucket("2024-03-15T11:00:00Z");
    record_numeric(&mut last, 50, 1.0);
    let fixed = fix_results(vec![first, last], AggregationMethod::Sum, true);

    let filtered = filter_results(
        fixed,
        Resolution::Minute,
        AggregationMethod::Sum,
        Some(ts("2024-03-15T10:20:00Z")),
        Some(ts("2024-03-15T11:10:00Z")),
        true,
    );
    assert!(filtered.is_empty());
}

#[test]
fn filter_results_leaves_buckets_not_on_the_window_edges() {
    let mut bucket = stored_bucket("2024-03-15T11:00:00Z");
    record_numeric(&mut bucket, 0, 1.0);
    record_numeric(&mut bucket, 59, 1.0);
    let fixed = fix_results(vec![bucket], AggregationMethod::Sum, true);

    let filtered = filter_results(
        fixed,
        Resolution::Minute,
        AggregationMethod::Sum,
        Some(ts("2024-03-15T10:30:00Z")),
        Some(ts("2024-03-15T12:30:00Z")),
        true,
    );
    assert_eq!(offsets(&filtered[0]), vec![0, 59]);
}

fn month_bucket(year_start: &str) -> AggregationBucket {
    AggregationBucket {
        id: BucketId {
            identity: IdentityFields::default(),
            resolution: Resolution::Month,
            origin: ts(year_start),
        },
        attr_type: "Number".into(),
        points: prepopulate(Resolution::Month),
    }
}

#[test]
fn month_trimming_compares_one_based_offsets() {
    let mut bucket = month_bucket("2024-01-01T00:00:00Z");
    // array index = month - 1
    for month in [2, 3, 5, 6] {
        record_numeric(&mut bucket, month - 1, 1.0);
    }

    let filtered = filter_results(
        fix_results(vec![bucket.clone()], AggregationMethod::Sum, true),
        Resolution::Month,
        AggregationMethod::Sum,
        Some(ts("2024-03-01T00:00:00Z")),
        Some(ts("2024-05-01T00:00:00Z")),
        true,
    );
    assert_eq!(offsets(&filtered[0]), vec![3, 5]);

    let reset = filter_results(
        fix_results(vec![bucket], AggregationMethod::Sum, false),
        Resolution::Month,
        AggregationMethod::Sum,
        Some(ts("2024-03-01T00:00:00Z")),
        Some(ts("2024-05-01T00:00:00Z")),
        false,
    );
    assert_eq!(reset[0].points.len(), 12);
    let kept: Vec<u32> = reset[0]
        .points
        .iter()
        .filter(|p| p.samples > 0)
        .map(|p| p.offset)
        .collect();
    assert_eq!(kept, vec![3, 5]);
    assert_eq!(reset[0].points[1].value, PointValue::Sum(None));
}
