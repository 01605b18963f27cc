//! Scene generation through the external tiling tool (`makepano`).
//!
//! [`generate`] is the only memoized step in the system: when the scene
//! document exists and none of its declared sources is newer, the tool is
//! not run at all. Otherwise the preview and twitter-card copies are
//! refreshed, the tool is invoked once with a deterministic argument list,
//! and the freshly written scene document is parsed and handed back for
//! post-processing.
//!
//! ## Output layout
//!
//! ```text
//! <outdir>/
//! ├── <pname>.xml                 # scene document
//! ├── <pname>.tiles/              # multires tiles, preview.jpg, thumb.jpg, mobile_*.jpg
//! ├── <pname>_small.jpg           # preview copy
//! ├── <pname>_tc.jpg              # twitter-card copy
//! └── <pname>.html                # only when the tool is asked for HTML
//! ```

use crate::context::{BuildContext, BuildEvent};
use crate::descriptor::SceneDescriptor;
use crate::scene::{SceneDocument, SceneError};
use crate::staleness::{self, ArtifactClass, StalenessPolicy};
use crate::tool::{self, ToolError, ToolInvocation, ToolRunner};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TilingError {
    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error(transparent)]
    Scene(#[from] SceneError),
}

/// Settings shared by every panorama of a build.
#[derive(Debug, Clone)]
pub struct TilingSettings {
    /// Resolved template config passed as `-config=`.
    pub template: PathBuf,
    pub staleness: StalenessPolicy,
}

/// Result of [`generate`].
#[derive(Debug)]
pub enum Generated {
    /// The tool ran; this document has not been post-processed yet.
    Fresh(SceneDocument),
    /// The existing scene document is current; nothing was run.
    UpToDate(PathBuf),
}

/// Resolve the template config: the path itself if it exists, otherwise
/// `templates/<template>` next to the tools binary.
pub fn resolve_template(tools: &Path, template: &Path) -> PathBuf {
    if template.exists() {
        return template.to_path_buf();
    }
    tools
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join("templates")
        .join(template)
}

pub fn scene_path(outdir: &Path, pname: &str) -> PathBuf {
    outdir.join(format!("{pname}.xml"))
}

pub fn tiles_dir(outdir: &Path, pname: &str) -> PathBuf {
    outdir.join(format!("{pname}.tiles"))
}

pub fn preview_copy_path(outdir: &Path, pname: &str) -> PathBuf {
    outdir.join(format!("{pname}_small.jpg"))
}

pub fn twittercard_copy_path(outdir: &Path, pname: &str) -> PathBuf {
    outdir.join(format!("{pname}_tc.jpg"))
}

pub fn html_path(outdir: &Path, pname: &str) -> PathBuf {
    outdir.join(format!("{pname}.html"))
}

/// Build the `makepano` argument list. Pure and deterministic: the same
/// descriptor always yields the same list.
pub fn makepano_args(
    descriptor: &SceneDescriptor,
    outdir: &Path,
    template: &Path,
    want_html: bool,
) -> Vec<String> {
    let pname = &descriptor.pname;
    let tiles = tiles_dir(outdir, pname);
    let mut args = vec![
        format!("-panotype={}", descriptor.panotype),
        format!("-hfov={}", descriptor.hfov),
        "-flash=false".to_string(),
        format!(
            "-tilepath={}/[mres_c/]l%Al/%Av/l%Al[_c]_%Av_%Ah.jpg",
            tiles.display()
        ),
        format!("-xmlpath={}", scene_path(outdir, pname).display()),
        format!("-previewpath={}/preview.jpg", tiles.display()),
        format!("-thumbpath={}/thumb.jpg", tiles.display()),
        format!("-customimage[mobile].path={}/mobile_%s.jpg", tiles.display()),
        format!("-config={}", template.display()),
    ];

    for (flag, value) in [("vfov", &descriptor.vfov), ("voffset", &descriptor.voffset)] {
        if let Some(value) = value {
            args.push(format!("-{flag}={value}"));
        }
    }

    if want_html {
        args.push("-html=true".to_string());
        args.push(format!("-htmlpath={}", html_path(outdir, pname).display()));
    } else {
        args.push("-html=false".to_string());
    }

    args.push(descriptor.input.display().to_string());
    args
}

/// Copy `source` to `dest` when `dest` is stale under the class's basis.
fn refresh_copy(
    source: &Path,
    dest: &Path,
    class: ArtifactClass,
    settings: &TilingSettings,
    pname: &str,
    ctx: &BuildContext,
) -> Result<bool, TilingError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| TilingError::Io { path, source }
    };
    let basis = settings.staleness.basis_for(class);
    if !staleness::is_stale(&[source], dest, basis).map_err(io_err(source))? {
        return Ok(false);
    }
    fs::copy(source, dest).map_err(io_err(dest))?;
    ctx.emit(BuildEvent::Copied {
        pname: pname.to_string(),
        class,
        source: source.to_path_buf(),
        dest: dest.to_path_buf(),
    });
    Ok(true)
}

/// Generate the scene document for one panorama, unless it is current.
///
/// Preview and twitter-card copies are refreshed first, each gated on its
/// own staleness. On tool failure the existing scene document, if any, is
/// left as it was.
pub fn generate(
    runner: &impl ToolRunner,
    settings: &TilingSettings,
    descriptor: &SceneDescriptor,
    outdir: &Path,
    want_html: bool,
    ctx: &BuildContext,
) -> Result<Generated, TilingError> {
    let pname = &descriptor.pname;
    fs::create_dir_all(outdir).map_err(|source| TilingError::Io {
        path: outdir.to_path_buf(),
        source,
    })?;

    if let Some(preview) = &descriptor.preview {
        let dest = preview_copy_path(outdir, pname);
        refresh_copy(preview, &dest, ArtifactClass::Preview, settings, pname, ctx)?;
    }
    if let Some(card) = &descriptor.twittercard {
        let dest = twittercard_copy_path(outdir, pname);
        refresh_copy(card, &dest, ArtifactClass::TwitterCard, settings, pname, ctx)?;
    }

    let scene = scene_path(outdir, pname);
    let mut sources: Vec<&Path> = vec![&descriptor.input];
    if let Some(origin) = &descriptor.origin {
        sources.push(origin);
    }
    let basis = settings.staleness.basis_for(ArtifactClass::SceneDocument);
    let stale = staleness::is_stale(&sources, &scene, basis).map_err(|source| TilingError::Io {
        path: scene.clone(),
        source,
    })?;
    if !stale {
        ctx.emit(BuildEvent::UpToDate {
            pname: pname.clone(),
        });
        return Ok(Generated::UpToDate(scene));
    }

    let invocation = ToolInvocation::new(
        "makepano",
        makepano_args(descriptor, outdir, &settings.template, want_html),
    );
    tool::run_checked(runner, &invocation, ctx)?;

    Ok(Generated::Fresh(SceneDocument::load(&scene)?))
}
