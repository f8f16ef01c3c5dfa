// Domain models: identities, events, buckets and registry entries

mod bucket;
mod collection;
mod event;
mod identity;
mod resolution;

pub use bucket::{AggregatedBucket, AggregationBucket, BucketId, Point, PointValue, ResultPoint};
pub use collection::CollectionNameEntry;
pub use event::{AttrValue, AttributeEvent, Notification, RawEvent};
pub use identity::{DataModel, Identity, IdentityFields, RemovalScope};
pub use resolution::{AggregationKind, AggregationMethod, Resolution};
