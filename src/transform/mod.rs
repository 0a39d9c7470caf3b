// src/transform/mod.rs
use csv::{ReaderBuilder, StringRecord};
use std::{collections::HashMap, fs::File, io::Read, path::Path};
use tracing::{debug, info, instrument};

use crate::{error::RefineError, records::ActivityRecord};

pub const PROFILE_NAME: &str = "Profile Name";
pub const START_TIME: &str = "Start Time";
pub const DURATION: &str = "Duration";
pub const ATTRIBUTES: &str = "Attributes";
pub const TITLE: &str = "Title";
pub const SUPPLEMENTAL_VIDEO_TYPE: &str = "Supplemental Video Type";
pub const DEVICE_TYPE: &str = "Device Type";
pub const BOOKMARK: &str = "Bookmark";
pub const LATEST_BOOKMARK: &str = "Latest Bookmark";
pub const COUNTRY: &str = "Country";

/// Reason prefix of a `MalformedRow` raised for the header line.
pub const HEADER_ERROR: &str = "unreadable header";

/// Header labels, resolved once per file into cell positions.
struct Columns {
    index: HashMap<String, usize>,
}

impl Columns {
    fn from_headers(headers: &StringRecord) -> Self {
        let mut index = HashMap::with_capacity(headers.len());
        for (i, label) in headers.iter().enumerate() {
            // last occurrence wins on duplicated labels
            index.insert(label.to_string(), i);
        }
        Self { index }
    }

    fn get<'r>(&self, row: &'r StringRecord, label: &str) -> Option<&'r str> {
        self.index.get(label).and_then(|&i| row.get(i))
    }

    fn optional(&self, row: &StringRecord, label: &str) -> Option<String> {
        self.get(row, label).map(str::to_string)
    }

    fn required(
        &self,
        row: &StringRecord,
        label: &str,
        idx: usize,
    ) -> Result<String, RefineError> {
        self.get(row, label)
            .map(str::to_string)
            .ok_or_else(|| RefineError::MalformedRow {
                row: idx,
                reason: format!("missing required column `{}`", label),
            })
    }
}

/// Map a header-labeled CSV stream into activity records owned by `address`.
///
/// Cells are looked up by exact header label; unknown columns are ignored
/// and absent optional cells become `None`. The first row without a
/// required cell fails the whole call, so callers never see a partial list.
///
/// An undecodable header line is reported as `MalformedRow { row: 0 }` with
/// a reason starting with [`HEADER_ERROR`]; data-row failures never carry it.
pub fn transform<R: Read>(source: R, address: &str) -> Result<Vec<ActivityRecord>, RefineError> {
    if address.is_empty() {
        return Err(RefineError::MissingField {
            field: "address".into(),
            source_name: "owner identity".into(),
        });
    }

    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(source);

    let headers = rdr.headers().map_err(|e| RefineError::MalformedRow {
        row: 0,
        reason: format!("{}: {}", HEADER_ERROR, e),
    })?;
    let columns = Columns::from_headers(headers);
    debug!(headers = ?headers, "tabular headers");

    let mut records = Vec::new();
    for (idx, result) in rdr.records().enumerate() {
        let row = result.map_err(|e| RefineError::MalformedRow {
            row: idx,
            reason: e.to_string(),
        })?;

        records.push(ActivityRecord {
            address: address.to_string(),
            profile_name: columns.required(&row, PROFILE_NAME, idx)?,
            start_time: columns.required(&row, START_TIME, idx)?,
            duration: columns.optional(&row, DURATION),
            attributes: columns.optional(&row, ATTRIBUTES),
            title: columns.optional(&row, TITLE),
            supplemental_video_type: columns.optional(&row, SUPPLEMENTAL_VIDEO_TYPE),
            device_type: columns.optional(&row, DEVICE_TYPE),
            bookmark: columns.optional(&row, BOOKMARK),
            latest_bookmark: columns.optional(&row, LATEST_BOOKMARK),
            country: columns.optional(&row, COUNTRY),
        });
    }

    Ok(records)
}

/// [`transform`] over a file on disk.
#[instrument(level = "info", skip(path, address), fields(file = %path.as_ref().display()))]
pub fn transform_file<P: AsRef<Path>>(
    path: P,
    address: &str,
) -> Result<Vec<ActivityRecord>, RefineError> {
    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|e| RefineError::NotFound(format!("{}: {}", path.display(), e)))?;
    let records = transform(file, address)?;
    info!(rows = records.len(), "transformed activity rows");
    Ok(records)
}
