//! Bundled static assets and idempotent staging into output trees.
//!
//! The hotspot marker image and the krpano plugin fragments ship inside the
//! binary (embedded at compile time from `static/`). [`ensure`] copies one of
//! them into an output directory if it is not already there.
//!
//! Presence alone decides: an existing file is never compared, refreshed or
//! overwritten. Several builds sharing one output tree may race to stage the
//! same file; the copy goes through a temp file that is persisted with
//! no-clobber semantics, so exactly one of them reports [`Staged::Copied`]
//! and the rest see [`Staged::Present`].

use crate::context::{BuildContext, BuildEvent};
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AssetError {
    #[error("unknown bundled asset: {0}")]
    Unknown(String),
    #[error("cannot stage {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: io::Error,
    },
}

/// Marker image used by every generated hotspot.
pub const MARKER_ICON: &str = "hs_circle.png";
/// Fragment providing the `showtext` hover action.
pub const SHOWTEXT_PLUGIN: &str = "showtext.xml";
/// Helper fragment included by debug builds.
pub const HELPER_TOOL: &str = "partialpano_helpertool.xml";
/// Debug plugin fragments, staged under `plugins/` in this order.
pub const DEBUG_PLUGINS: [&str; 9] = [
    "grid.xml",
    "polygonalhotspot_editor.xml",
    "stickie_data.xml",
    "stickies.xml",
    "numbers.xml",
    "scrollingtext.xml",
    "stickie_engine.xml",
    "toolbox.xml",
    "distortedhotspot_editor.xml",
];
/// Subdirectory of the output tree that holds plugin fragments.
pub const PLUGINS_DIR: &str = "plugins";

const BUNDLE: &[(&str, &[u8])] = &[
    (MARKER_ICON, include_bytes!("../static/hs_circle.png")),
    (SHOWTEXT_PLUGIN, include_bytes!("../static/showtext.xml")),
    (HELPER_TOOL, include_bytes!("../static/partialpano_helpertool.xml")),
    ("grid.xml", include_bytes!("../static/grid.xml")),
    (
        "polygonalhotspot_editor.xml",
        include_bytes!("../static/polygonalhotspot_editor.xml"),
    ),
    ("stickie_data.xml", include_bytes!("../static/stickie_data.xml")),
    ("stickies.xml", include_bytes!("../static/stickies.xml")),
    ("numbers.xml", include_bytes!("../static/numbers.xml")),
    ("scrollingtext.xml", include_bytes!("../static/scrollingtext.xml")),
    ("stickie_engine.xml", include_bytes!("../static/stickie_engine.xml")),
    ("toolbox.xml", include_bytes!("../static/toolbox.xml")),
    (
        "distortedhotspot_editor.xml",
        include_bytes!("../static/distortedhotspot_editor.xml"),
    ),
];

/// Outcome of staging one asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staged {
    /// This call wrote the file.
    Copied,
    /// The file already existed; nothing was written.
    Present,
}

/// Contents of a bundled asset.
pub fn bundled(name: &str) -> Option<&'static [u8]> {
    BUNDLE
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, bytes)| *bytes)
}

/// Stage the bundled asset `name` as `dest_dir/name` unless already present.
///
/// `dest_dir` is created if needed; a concurrent creator is not an error.
pub fn ensure(name: &str, dest_dir: &Path, ctx: &BuildContext) -> Result<Staged, AssetError> {
    let bytes = bundled(name).ok_or_else(|| AssetError::Unknown(name.to_string()))?;
    let dest = dest_dir.join(name);
    if dest.exists() {
        return Ok(Staged::Present);
    }

    let io_err = |source: io::Error| AssetError::Io {
        name: name.to_string(),
        source,
    };
    fs::create_dir_all(dest_dir).map_err(io_err)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dest_dir).map_err(io_err)?;
    tmp.write_all(bytes).map_err(io_err)?;
    match tmp.persist_noclobber(&dest) {
        Ok(_) => {
            ctx.emit(BuildEvent::AssetStaged {
                name: name.to_string(),
                dest,
            });
            Ok(Staged::Copied)
        }
        Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => Ok(Staged::Present),
        Err(e) => Err(io_err(e.error)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[test]
    fn every_named_asset_is_bundled() {
        for name in [MARKER_ICON, SHOWTEXT_PLUGIN, HELPER_TOOL]
            .into_iter()
            .chain(DEBUG_PLUGINS)
        {
            let bytes = bundled(name).unwrap_or_else(|| panic!("{name} not bundled"));
            assert!(!bytes.is_empty(), "{name} is empty");
        }
    }

    #[test]
    fn marker_icon_is_a_png() {
        assert!(bundled(MARKER_ICON).unwrap().starts_with(b"\x89PNG"));
    }

    #[test]
    fn plugin_fragments_are_krpano_documents() {
        for name in DEBUG_PLUGINS.into_iter().chain([SHOWTEXT_PLUGIN, HELPER_TOOL]) {
            let text = std::str::from_utf8(bundled(name).unwrap()).unwrap();
            assert!(text.trim_start().starts_with("<krpano>"), "{name}");
        }
    }

    #[test]
    fn ensure_copies_when_absent_and_creates_directory() {
        let tmp = TempDir::new().unwrap();
        let dest_dir = tmp.path().join("out/plugins");
        let staged = ensure(SHOWTEXT_PLUGIN, &dest_dir, &BuildContext::new()).unwrap();
        assert_eq!(staged, Staged::Copied);
        assert_eq!(
            fs::read(dest_dir.join(SHOWTEXT_PLUGIN)).unwrap(),
            bundled(SHOWTEXT_PLUGIN).unwrap()
        );
    }

    #[test]
    fn ensure_never_overwrites_existing_file() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("grid.xml");
        fs::write(&dest, "locally edited").unwrap();

        let staged = ensure("grid.xml", tmp.path(), &BuildContext::new()).unwrap();
        assert_eq!(staged, Staged::Present);
        assert_eq!(fs::read_to_string(&dest).unwrap(), "locally edited");
    }

    #[test]
    fn ensure_second_call_is_noop() {
        let tmp = TempDir::new().unwrap();
        let ctx = BuildContext::new();
        assert_eq!(ensure(MARKER_ICON, tmp.path(), &ctx).unwrap(), Staged::Copied);
        assert_eq!(ensure(MARKER_ICON, tmp.path(), &ctx).unwrap(), Staged::Present);
    }

    #[test]
    fn ensure_unknown_asset_fails() {
        let tmp = TempDir::new().unwrap();
        let err = ensure("nope.xml", tmp.path(), &BuildContext::new()).unwrap_err();
        assert!(matches!(err, AssetError::Unknown(name) if name == "nope.xml"));
    }

    #[test]
    fn ensure_leaves_no_temp_files_behind() {
        let tmp = TempDir::new().unwrap();
        let ctx = BuildContext::new();
        ensure("toolbox.xml", tmp.path(), &ctx).unwrap();
        ensure("toolbox.xml", tmp.path(), &ctx).unwrap();
        let names: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["toolbox.xml"]);
    }

    #[test]
    fn concurrent_ensure_copies_exactly_once() {
        let tmp = TempDir::new().unwrap();
        let dest_dir = Arc::new(tmp.path().join("shared/plugins"));
        let copies = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let dest_dir = Arc::clone(&dest_dir);
                let copies = Arc::clone(&copies);
                std::thread::spawn(move || {
                    if ensure("stickies.xml", &dest_dir, &BuildContext::new()).unwrap()
                        == Staged::Copied
                    {
                        copies.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(copies.load(Ordering::SeqCst), 1);
    }
}
