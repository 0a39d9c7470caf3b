// src/archive/mod.rs

use glob::{glob_with, MatchOptions};
use std::{
    fs::{self, File},
    io,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};
use zip::ZipArchive;

use crate::error::RefineError;

/// Find the archive in `dir` whose extension matches `extension`, ignoring case.
///
/// With several candidates the first one in file-name order wins; the rest
/// are logged and left untouched.
#[instrument(level = "info", skip(dir), fields(input = %dir.as_ref().display()))]
pub fn locate<P: AsRef<Path>>(dir: P, extension: &str) -> Result<PathBuf, RefineError> {
    let dir = dir.as_ref();
    let entries = fs::read_dir(dir)
        .map_err(|e| RefineError::NotFound(format!("input directory {}: {}", dir.display(), e)))?;

    let mut candidates: Vec<PathBuf> = entries
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "skipping unreadable directory entry");
                None
            }
        })
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case(extension))
                .unwrap_or(false)
        })
        .collect();
    candidates.sort();

    let mut iter = candidates.into_iter();
    let chosen = iter.next().ok_or_else(|| {
        RefineError::NotFound(format!(
            "no .{} archive in input directory {}",
            extension,
            dir.display()
        ))
    })?;

    for ignored in iter {
        warn!(chosen = %chosen.display(), ignored = %ignored.display(), "multiple archives found, ignoring extra");
    }

    info!(archive = %chosen.display(), "found archive");
    Ok(chosen)
}

/// Expand every entry of `archive_path` into `dest`, overwriting existing files.
/// Returns the number of entries in the archive.
#[instrument(level = "info", skip(archive_path, dest), fields(archive = %archive_path.as_ref().display()))]
pub fn extract<P: AsRef<Path>, Q: AsRef<Path>>(
    archive_path: P,
    dest: Q,
) -> Result<usize, RefineError> {
    let archive_path = archive_path.as_ref();
    let dest = dest.as_ref();
    let corrupt = |reason: String| RefineError::CorruptArchive {
        path: archive_path.to_path_buf(),
        reason,
    };

    fs::create_dir_all(dest)
        .map_err(|e| corrupt(format!("creating {}: {}", dest.display(), e)))?;

    let file = File::open(archive_path).map_err(|e| corrupt(format!("opening: {}", e)))?;
    let mut archive = ZipArchive::new(file).map_err(|e| corrupt(e.to_string()))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| corrupt(format!("entry #{}: {}", i, e)))?;
        // entries escaping the destination (absolute or `..`) are rejected
        let rel = entry
            .enclosed_name()
            .ok_or_else(|| corrupt(format!("entry #{} has an unsafe path {:?}", i, entry.name())))?;
        let out = dest.join(rel);

        if entry.is_dir() {
            fs::create_dir_all(&out)
                .map_err(|e| corrupt(format!("creating {}: {}", out.display(), e)))?;
            continue;
        }
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| corrupt(format!("creating {}: {}", parent.display(), e)))?;
        }
        // File::create truncates, so a colliding name is overwritten
        let mut target = File::create(&out)
            .map_err(|e| corrupt(format!("creating {}: {}", out.display(), e)))?;
        io::copy(&mut entry, &mut target)
            .map_err(|e| corrupt(format!("reading {}: {}", entry.name(), e)))?;
        debug!(entry = %out.display(), bytes = entry.size(), "extracted entry");
    }

    let entries = archive.len();
    info!(entries, dest = %dest.display(), "extracted archive");
    Ok(entries)
}

/// Resolve each of `names` inside `dir`.
///
/// A name is looked up at `dir/<name>` first, then anywhere below `dir`
/// (first match in path order), so archives wrapping their content in a
/// top-level folder still resolve. Output order follows `names`.
pub fn find_required_files<P: AsRef<Path>>(
    dir: P,
    names: &[&str],
) -> Result<Vec<PathBuf>, RefineError> {
    let dir = dir.as_ref();
    names
        .iter()
        .map(|name| {
            let path = resolve_one(dir, name)
                .ok_or_else(|| RefineError::NotFound(format!("{} in {}", name, dir.display())))?;
            debug!(name, path = %path.display(), "resolved required file");
            Ok(path)
        })
        .collect()
}

fn resolve_one(dir: &Path, name: &str) -> Option<PathBuf> {
    let direct = dir.join(name);
    if direct.is_file() {
        return Some(direct);
    }

    let pattern = format!(
        "{}/**/{}",
        glob::Pattern::escape(&dir.to_string_lossy()),
        glob::Pattern::escape(name)
    );
    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };
    let mut matches: Vec<PathBuf> = glob_with(&pattern, options)
        .ok()?
        .filter_map(Result::ok)
        .filter(|p| p.is_file())
        .collect();
    matches.sort();
    matches.into_iter().next()
}
