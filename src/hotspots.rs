//! Interactive hotspot fragments.
//!
//! A panorama with hotspots gets a separate `<pname>_hotspots.xml` that the
//! scene document includes. The fragment starts with a fixed preamble (marker
//! style, tooltip text style, a "Toggle Hotspots" button and its action),
//! followed by one `<hotspot>` per descriptor entry, named `spot0`,
//! `spot1`, ... in input order.
//!
//! Each hotspot's hover action calls `showtext(<description>, STYLE7)` with
//! the description spliced in as written. Quotes and markup in the text are
//! *not* escaped: existing descriptors rely on the viewer interpreting the
//! text as-is.

use crate::assets::{self, AssetError, MARKER_ICON, PLUGINS_DIR, SHOWTEXT_PLUGIN};
use crate::context::{BuildContext, BuildEvent};
use crate::descriptor::{Hotspot, SceneDescriptor};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HotspotError {
    #[error(transparent)]
    Asset(#[from] AssetError),
    #[error("cannot write hotspot fragment: {0}")]
    Io(#[from] io::Error),
}

const PREAMBLE: &str = include_str!("../static/hotspots_preamble.xml");

/// File name of the hotspot fragment for a panorama.
pub fn fragment_name(pname: &str) -> String {
    format!("{pname}_hotspots.xml")
}

/// Render the complete fragment for the given hotspots.
pub fn render(hotspots: &[Hotspot]) -> String {
    let mut out = String::from(PREAMBLE);
    for (n, h) in hotspots.iter().enumerate() {
        out.push_str(&format!(
            "  <hotspot name=\"spot{n}\" style=\"letter\" type=\"image\" url=\"{MARKER_ICON}\"\n           scale=\"0.3\" ath=\"{ath}\" atv=\"{atv}\"\n           onhover=\"showtext({desc}, STYLE7);\"/>\n",
            ath = h.ath,
            atv = h.atv,
            desc = h.description,
        ));
    }
    out.push_str("</krpano>");
    out
}

/// Stage the marker icon and `showtext` plugin, then write the fragment.
///
/// Returns the fragment path, or `None` when the descriptor has no hotspots
/// (the assets are still staged).
pub fn write(
    descriptor: &SceneDescriptor,
    outdir: &Path,
    ctx: &BuildContext,
) -> Result<Option<PathBuf>, HotspotError> {
    fs::create_dir_all(outdir)?;
    assets::ensure(MARKER_ICON, outdir, ctx)?;
    assets::ensure(SHOWTEXT_PLUGIN, &outdir.join(PLUGINS_DIR), ctx)?;

    if descriptor.hotspots.is_empty() {
        return Ok(None);
    }

    let path = outdir.join(fragment_name(&descriptor.pname));
    fs::write(&path, render(&descriptor.hotspots))?;
    ctx.emit(BuildEvent::HotspotsWritten {
        pname: descriptor.pname.clone(),
        path: path.clone(),
        count: descriptor.hotspots.len(),
    });
    Ok(Some(path))
}
