//! Timestamp-based directory mirroring for publish and backup copies.
//!
//! [`mirror_tree`] walks a source tree and copies every regular file whose
//! counterpart under the destination is missing or older. Copies keep the
//! source modification time, so the default [`TimestampBasis::Modified`]
//! comparison sees them as current on the next run.

use crate::context::{BuildContext, BuildEvent};
use crate::staleness::{self, TimestampBasis};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("source directory not found: {}", .0.display())]
    NoSource(PathBuf),
    #[error("cannot walk source tree: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// File counts of one mirror run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MirrorSummary {
    pub copied: usize,
    /// Destination already current.
    pub skipped: usize,
    /// Left out by extension.
    pub excluded: usize,
}

fn is_excluded(path: &Path, exclude_extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            exclude_extensions
                .iter()
                .any(|x| x.trim_start_matches('.').eq_ignore_ascii_case(ext))
        })
}

/// Mirror `source` into `dest`.
///
/// Directories are created as encountered (already existing is fine).
/// Extensions in `exclude_extensions` are compared case-insensitively,
/// with or without a leading dot.
pub fn mirror_tree(
    source: &Path,
    dest: &Path,
    basis: TimestampBasis,
    exclude_extensions: &[String],
    ctx: &BuildContext,
) -> Result<MirrorSummary, MirrorError> {
    if !source.is_dir() {
        return Err(MirrorError::NoSource(source.to_path_buf()));
    }
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| MirrorError::Io { path, source }
    };

    let mut summary = MirrorSummary::default();
    for entry in WalkDir::new(source).sort_by_file_name() {
        let entry = entry?;
        let Ok(rel) = entry.path().strip_prefix(source) else {
            continue;
        };
        let target = dest.join(rel);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(io_err(&target))?;
            continue;
        }
        if !entry.file_type().is_file() {
            continue;
        }
        if is_excluded(entry.path(), exclude_extensions) {
            summary.excluded += 1;
            continue;
        }
        if !staleness::is_stale(&[entry.path()], &target, basis).map_err(io_err(entry.path()))? {
            summary.skipped += 1;
            continue;
        }

        copy_preserving_mtime(entry.path(), &target).map_err(io_err(&target))?;
        ctx.emit(BuildEvent::Mirrored {
            dest: target.clone(),
        });
        summary.copied += 1;
    }
    Ok(summary)
}

fn copy_preserving_mtime(from: &Path, to: &Path) -> io::Result<()> {
    let modified = fs::metadata(from)?.modified()?;
    fs::copy(from, to)?;
    let file = fs::File::options().write(true).open(to)?;
    file.set_modified(modified)
}
