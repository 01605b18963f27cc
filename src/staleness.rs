//! Timestamp-based staleness checks.
//!
//! There is no build database: whether a derived artifact must be rebuilt is
//! always recomputed from the filesystem. A derived artifact is stale when it
//! is missing, or when any declared source has a timestamp strictly later
//! than the artifact's own.
//!
//! ## Timestamp basis
//!
//! Which timestamp is compared is chosen per artifact class, never globally:
//!
//! | Class | Default basis | Why it differs |
//! |---|---|---|
//! | Scene document | status change (`ctime`) | a copied-in source with a preserved old mtime still triggers a rebuild |
//! | Preview copy | status change | same as above |
//! | Twitter-card copy | status change | same as above |
//! | Directory mirror | modification (`mtime`) | mirrored copies carry the source mtime, so `ctime` would always look newer |
//!
//! All four are configurable in `[staleness]`. On platforms without a status
//! change time, [`TimestampBasis::StatusChanged`] falls back to modification.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use std::time::SystemTime;

/// Which filesystem timestamp a comparison reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimestampBasis {
    /// Last content modification (`mtime`).
    Modified,
    /// Last inode status change (`ctime`).
    StatusChanged,
}

/// The kinds of derived artifact the pipeline tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactClass {
    SceneDocument,
    Preview,
    TwitterCard,
    Mirror,
}

/// Timestamp basis chosen for each artifact class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StalenessPolicy {
    pub scene_document: TimestampBasis,
    pub preview: TimestampBasis,
    pub twitter_card: TimestampBasis,
    pub mirror: TimestampBasis,
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        Self {
            scene_document: TimestampBasis::StatusChanged,
            preview: TimestampBasis::StatusChanged,
            twitter_card: TimestampBasis::StatusChanged,
            mirror: TimestampBasis::Modified,
        }
    }
}

impl StalenessPolicy {
    pub fn basis_for(&self, class: ArtifactClass) -> TimestampBasis {
        match class {
            ArtifactClass::SceneDocument => self.scene_document,
            ArtifactClass::Preview => self.preview,
            ArtifactClass::TwitterCard => self.twitter_card,
            ArtifactClass::Mirror => self.mirror,
        }
    }
}

/// Read a path's timestamp under the given basis.
pub fn timestamp(path: &Path, basis: TimestampBasis) -> io::Result<SystemTime> {
    let meta = fs::metadata(path)?;
    match basis {
        TimestampBasis::Modified => meta.modified(),
        TimestampBasis::StatusChanged => status_changed(&meta),
    }
}

#[cfg(unix)]
fn status_changed(meta: &fs::Metadata) -> io::Result<SystemTime> {
    use std::os::unix::fs::MetadataExt;
    use std::time::Duration;

    let secs = meta.ctime();
    let nanos = meta.ctime_nsec().clamp(0, 999_999_999) as u32;
    let time = if secs >= 0 {
        SystemTime::UNIX_EPOCH + Duration::new(secs as u64, nanos)
    } else {
        SystemTime::UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs()) + Duration::from_nanos(nanos as u64)
    };
    Ok(time)
}

#[cfg(not(unix))]
fn status_changed(meta: &fs::Metadata) -> io::Result<SystemTime> {
    meta.modified()
}

/// Decide whether `derived` must be rebuilt from sources with the given
/// timestamps.
///
/// - `derived` missing → `true`
/// - any source strictly newer than `derived` → `true`
/// - otherwise → `false`
pub fn needs_rebuild(
    source_times: &[SystemTime],
    derived: &Path,
    basis: TimestampBasis,
) -> io::Result<bool> {
    let derived_time = match timestamp(derived, basis) {
        Ok(t) => t,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(true),
        Err(e) => return Err(e),
    };
    Ok(source_times.iter().any(|t| *t > derived_time))
}

/// [`needs_rebuild`] over source paths, reading each source's timestamp
/// under the same basis. Sources are only read when `derived` exists.
pub fn is_stale(sources: &[&Path], derived: &Path, basis: TimestampBasis) -> io::Result<bool> {
    if !derived.exists() {
        return Ok(true);
    }
    let times = sources
        .iter()
        .map(|s| timestamp(s, basis))
        .collect::<io::Result<Vec<_>>>()?;
    needs_rebuild(&times, derived, basis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    const HOUR: Duration = Duration::from_secs(3600);

    fn derived_file(tmp: &TempDir) -> std::path::PathBuf {
        let path = tmp.path().join("pano.xml");
        fs::write(&path, "<krpano/>").unwrap();
        path
    }

    #[test]
    fn missing_derived_always_rebuilds() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope.xml");
        for basis in [TimestampBasis::Modified, TimestampBasis::StatusChanged] {
            assert!(needs_rebuild(&[], &missing, basis).unwrap());
            assert!(needs_rebuild(&[SystemTime::UNIX_EPOCH], &missing, basis).unwrap());
        }
    }

    #[test]
    fn strictly_newer_source_rebuilds() {
        let tmp = TempDir::new().unwrap();
        let derived = derived_file(&tmp);
        let t = timestamp(&derived, TimestampBasis::Modified).unwrap();
        assert!(needs_rebuild(&[t + HOUR], &derived, TimestampBasis::Modified).unwrap());
    }

    #[test]
    fn older_source_skips() {
        let tmp = TempDir::new().unwrap();
        let derived = derived_file(&tmp);
        let t = timestamp(&derived, TimestampBasis::Modified).unwrap();
        assert!(!needs_rebuild(&[t - HOUR], &derived, TimestampBasis::Modified).unwrap());
    }

    #[test]
    fn equal_timestamp_is_not_stale() {
        let tmp = TempDir::new().unwrap();
        let derived = derived_file(&tmp);
        let t = timestamp(&derived, TimestampBasis::Modified).unwrap();
        assert!(!needs_rebuild(&[t], &derived, TimestampBasis::Modified).unwrap());
    }

    #[test]
    fn any_newer_source_among_many_rebuilds() {
        let tmp = TempDir::new().unwrap();
        let derived = derived_file(&tmp);
        let t = timestamp(&derived, TimestampBasis::Modified).unwrap();
        let sources = [t - HOUR, t - HOUR * 2, t + HOUR];
        assert!(needs_rebuild(&sources, &derived, TimestampBasis::Modified).unwrap());
    }

    #[test]
    fn no_sources_and_present_derived_skips() {
        let tmp = TempDir::new().unwrap();
        let derived = derived_file(&tmp);
        assert!(!needs_rebuild(&[], &derived, TimestampBasis::StatusChanged).unwrap());
    }

    #[test]
    fn is_stale_reads_source_mtime() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("input.jpg");
        fs::write(&source, "jpeg").unwrap();
        let derived = derived_file(&tmp);
        assert!(!is_stale(&[&source], &derived, TimestampBasis::Modified).unwrap());

        // Touch the source into the future.
        let future = SystemTime::now() + HOUR;
        fs::File::options()
            .write(true)
            .open(&source)
            .unwrap()
            .set_modified(future)
            .unwrap();
        assert!(is_stale(&[&source], &derived, TimestampBasis::Modified).unwrap());
    }

    #[test]
    fn is_stale_with_missing_derived_does_not_read_sources() {
        let tmp = TempDir::new().unwrap();
        let missing_source = tmp.path().join("gone.jpg");
        let missing_derived = tmp.path().join("gone.xml");
        assert!(
            is_stale(
                &[&missing_source],
                &missing_derived,
                TimestampBasis::Modified
            )
            .unwrap()
        );
    }

    #[test]
    fn is_stale_missing_source_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let derived = derived_file(&tmp);
        let missing_source = tmp.path().join("gone.jpg");
        assert!(is_stale(&[&missing_source], &derived, TimestampBasis::Modified).is_err());
    }

    #[test]
    fn status_changed_basis_reads_a_timestamp() {
        let tmp = TempDir::new().unwrap();
        let derived = derived_file(&tmp);
        let ctime = timestamp(&derived, TimestampBasis::StatusChanged).unwrap();
        assert!(ctime > SystemTime::UNIX_EPOCH);
    }

    #[test]
    fn default_policy_per_class() {
        let policy = StalenessPolicy::default();
        assert_eq!(
            policy.basis_for(ArtifactClass::SceneDocument),
            TimestampBasis::StatusChanged
        );
        assert_eq!(
            policy.basis_for(ArtifactClass::Preview),
            TimestampBasis::StatusChanged
        );
        assert_eq!(
            policy.basis_for(ArtifactClass::TwitterCard),
            TimestampBasis::StatusChanged
        );
        assert_eq!(
            policy.basis_for(ArtifactClass::Mirror),
            TimestampBasis::Modified
        );
    }

    #[test]
    fn policy_parses_kebab_case_bases() {
        let policy: StalenessPolicy =
            toml::from_str("scene_document = \"modified\"\nmirror = \"status-changed\"").unwrap();
        assert_eq!(policy.scene_document, TimestampBasis::Modified);
        assert_eq!(policy.mirror, TimestampBasis::StatusChanged);
        // Unspecified classes keep their defaults.
        assert_eq!(policy.preview, TimestampBasis::StatusChanged);
    }
}
