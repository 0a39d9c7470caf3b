// src/records/mod.rs

use anyhow::{Context, Result};
use arrow::{
    array::{ArrayRef, StringArray},
    datatypes::{DataType, Field, Schema as ArrowSchema},
    record_batch::RecordBatch,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Table the records are persisted into and described as.
pub const TABLE_NAME: &str = "user_activities";

/// One normalized viewing-activity event.
///
/// `start_time` and `duration` are kept exactly as exported; the source
/// uses its own locale conventions and consumers interpret them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub address: String,
    pub profile_name: String,
    pub start_time: String,
    pub duration: Option<String>,
    pub attributes: Option<String>,
    pub title: Option<String>,
    pub supplemental_video_type: Option<String>,
    pub device_type: Option<String>,
    pub bookmark: Option<String>,
    pub latest_bookmark: Option<String>,
    pub country: Option<String>,
}

impl ActivityRecord {
    /// Column definitions for the record, in field declaration order.
    pub fn schema() -> ArrowSchema {
        ArrowSchema::new(vec![
            Field::new("address", DataType::Utf8, false),
            Field::new("profile_name", DataType::Utf8, false),
            Field::new("start_time", DataType::Utf8, false),
            Field::new("duration", DataType::Utf8, true),
            Field::new("attributes", DataType::Utf8, true),
            Field::new("title", DataType::Utf8, true),
            Field::new("supplemental_video_type", DataType::Utf8, true),
            Field::new("device_type", DataType::Utf8, true),
            Field::new("bookmark", DataType::Utf8, true),
            Field::new("latest_bookmark", DataType::Utf8, true),
            Field::new("country", DataType::Utf8, true),
        ])
    }
}

fn required_column<F>(records: &[ActivityRecord], get: F) -> ArrayRef
where
    F: Fn(&ActivityRecord) -> &str,
{
    Arc::new(StringArray::from_iter_values(records.iter().map(get)))
}

fn optional_column<F>(records: &[ActivityRecord], get: F) -> ArrayRef
where
    F: Fn(&ActivityRecord) -> Option<&str>,
{
    Arc::new(records.iter().map(get).collect::<StringArray>())
}

/// Build a single Arrow batch holding `records` in order.
pub fn to_record_batch(records: &[ActivityRecord]) -> Result<RecordBatch> {
    let columns = vec![
        required_column(records, |r| r.address.as_str()),
        required_column(records, |r| r.profile_name.as_str()),
        required_column(records, |r| r.start_time.as_str()),
        optional_column(records, |r| r.duration.as_deref()),
        optional_column(records, |r| r.attributes.as_deref()),
        optional_column(records, |r| r.title.as_deref()),
        optional_column(records, |r| r.supplemental_video_type.as_deref()),
        optional_column(records, |r| r.device_type.as_deref()),
        optional_column(records, |r| r.bookmark.as_deref()),
        optional_column(records, |r| r.latest_bookmark.as_deref()),
        optional_column(records, |r| r.country.as_deref()),
    ];

    RecordBatch::try_new(Arc::new(ActivityRecord::schema()), columns)
        .context("building activity record batch")
}
