use anyhow::{Context, Result};
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use super::SchemaDescriptor;

/// Write `descriptor` as pretty JSON to `path`.
///
/// Written to a dot-prefixed temp file next to `path` first, then renamed
/// over it, so readers never see a half-written descriptor.
pub fn write_descriptor<P: AsRef<Path>>(path: P, descriptor: &SchemaDescriptor) -> Result<()> {
    let path = path.as_ref();
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).with_context(|| format!("creating {:?}", dir))?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("schema.json");
    let tmp_path: PathBuf = dir.join(format!(".{}.tmp", file_name));
    let mut tmp =
        fs::File::create(&tmp_path).with_context(|| format!("creating {:?}", tmp_path))?;

    // pretty-print with a trailing newline
    serde_json::to_writer_pretty(&mut tmp, descriptor).context("serializing schema descriptor")?;
    tmp.write_all(b"\n")?;
    tmp.sync_all()?;

    fs::rename(&tmp_path, path)
        .with_context(|| format!("renaming {:?} -> {:?}", tmp_path, path))?;

    Ok(())
}
