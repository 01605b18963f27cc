//! Per-panorama build orchestration and the parallel batch driver.
//!
//! A [`Publisher`] owns everything shared by the panoramas of one run: the
//! tool runner, tiling settings, panorama root and output directory. Building
//! one panorama is:
//!
//! 1. [`tiling::generate`]: copies, staleness check, `makepano`
//! 2. [`scene::finish`]: view overrides, hotspots, debug extensions, save
//!    (only when the tool actually ran)
//! 3. [`page::write`] when an HTML page is requested (always rewritten)
//!
//! Batches run on the rayon pool. Panoramas share nothing but the output
//! tree, and every write into it tolerates concurrent creators. Each failure
//! is paired with its pname and recorded; the batch always continues.

use crate::context::{BuildContext, BuildEvent};
use crate::descriptor::{self, SceneDescriptor, ValidationError};
use crate::hotspots::{self, HotspotError};
use crate::page;
use crate::protect::DEFAULT_VIEWER_NAME;
use crate::scene::{self, SceneError};
use crate::tiling::{self, Generated, TilingError, TilingSettings};
use crate::tool::ToolRunner;
use rayon::prelude::*;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Tiling(#[from] TilingError),
    #[error(transparent)]
    Scene(#[from] SceneError),
    #[error(transparent)]
    Hotspots(#[from] HotspotError),
    #[error("cannot write page {}: {source}", .path.display())]
    Page {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A build error paired with the panorama it belongs to.
#[derive(Error, Debug)]
#[error("{pname}: {error}")]
pub struct PanoramaError {
    pub pname: String,
    #[source]
    pub error: BuildError,
}

impl PanoramaError {
    pub fn new(pname: impl Into<String>, error: impl Into<BuildError>) -> Self {
        Self {
            pname: pname.into(),
            error: error.into(),
        }
    }
}

/// Per-run build switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {
    /// Inject the debug helper, trace events and plugin toolbox.
    pub debug: bool,
    /// Write our own `<pname>.html` page.
    pub html: bool,
    /// Ask the tiling tool for its HTML page.
    pub tool_html: bool,
}

/// What happened to one panorama.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum Status {
    /// The tiling tool ran and the scene document was post-processed.
    Generated,
    UpToDate,
    HotspotsWritten { count: usize },
    /// Descriptor validated; nothing built.
    Valid,
    Failed { message: String },
    /// Not started because the run was cancelled.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PanoramaOutcome {
    pub pname: String,
    pub descriptor: PathBuf,
    #[serde(flatten)]
    pub status: Status,
}

/// Report of a batch run, in descriptor order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    /// Seconds since the Unix epoch, from the context's "now".
    pub built_at: u64,
    pub panoramas: Vec<PanoramaOutcome>,
}

impl BatchSummary {
    fn new(ctx: &BuildContext, panoramas: Vec<PanoramaOutcome>) -> Self {
        let built_at = ctx
            .now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            built_at,
            panoramas,
        }
    }

    pub fn count(&self, pred: impl Fn(&Status) -> bool) -> usize {
        self.panoramas.iter().filter(|p| pred(&p.status)).count()
    }

    pub fn failures(&self) -> usize {
        self.count(|s| matches!(s, Status::Failed { .. } | Status::Cancelled))
    }

    pub fn is_success(&self) -> bool {
        self.failures() == 0
    }
}

/// Everything shared by the panoramas of one run.
pub struct Publisher<R> {
    runner: R,
    tiling: TilingSettings,
    panorama_root: PathBuf,
    outdir: PathBuf,
}

impl<R: ToolRunner> Publisher<R> {
    pub fn new(
        runner: R,
        tiling: TilingSettings,
        panorama_root: impl Into<PathBuf>,
        outdir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner,
            tiling,
            panorama_root: panorama_root.into(),
            outdir: outdir.into(),
        }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn outdir(&self) -> &Path {
        &self.outdir
    }

    /// Load and validate a descriptor file. Errors carry the pname as
    /// written, or the file stem when there is none.
    pub fn load(&self, path: &Path) -> Result<SceneDescriptor, PanoramaError> {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let raw = descriptor::read_raw(path).map_err(|e| PanoramaError::new(&stem, e))?;
        let pname = raw.pname_hint().unwrap_or(stem);
        let mut descriptor = SceneDescriptor::load(raw, &self.panorama_root)
            .map_err(|e| PanoramaError::new(&pname, e))?;
        descriptor.origin = Some(path.to_path_buf());
        Ok(descriptor)
    }

    /// Build one panorama.
    pub fn build_panorama(
        &self,
        descriptor: &SceneDescriptor,
        options: BuildOptions,
        ctx: &BuildContext,
    ) -> Result<Status, BuildError> {
        ctx.emit(BuildEvent::Started {
            pname: descriptor.pname.clone(),
        });

        let generated = tiling::generate(
            &self.runner,
            &self.tiling,
            descriptor,
            &self.outdir,
            options.tool_html,
            ctx,
        )?;
        let status = match generated {
            Generated::Fresh(doc) => {
                let path = doc.path().to_path_buf();
                if let Err(e) = scene::finish(doc, descriptor, &self.outdir, options.debug, ctx) {
                    // An unfinished document must not pass as current next run.
                    fs::remove_file(&path).ok();
                    return Err(e.into());
                }
                Status::Generated
            }
            Generated::UpToDate(_) => Status::UpToDate,
        };

        if options.html {
            page::write(descriptor, &self.outdir, DEFAULT_VIEWER_NAME, ctx).map_err(|source| {
                BuildError::Page {
                    path: page::page_path(&self.outdir, &descriptor.pname),
                    source,
                }
            })?;
        }
        Ok(status)
    }

    /// Build every descriptor file in parallel. Never stops early on failure.
    pub fn build_all(
        &self,
        paths: &[PathBuf],
        options: BuildOptions,
        ctx: &BuildContext,
    ) -> BatchSummary {
        self.run_batch(paths, ctx, |d| self.build_panorama(d, options, ctx))
    }

    /// Regenerate hotspot fragments only; scene documents are not touched.
    pub fn hotspots_all(&self, paths: &[PathBuf], ctx: &BuildContext) -> BatchSummary {
        self.run_batch(paths, ctx, |d| {
            hotspots::write(d, &self.outdir, ctx)?;
            Ok(Status::HotspotsWritten {
                count: d.hotspots.len(),
            })
        })
    }

    /// Validate every descriptor file without building anything.
    pub fn check_all(&self, paths: &[PathBuf], ctx: &BuildContext) -> BatchSummary {
        self.run_batch(paths, ctx, |_| Ok(Status::Valid))
    }

    fn run_batch<F>(&self, paths: &[PathBuf], ctx: &BuildContext, step: F) -> BatchSummary
    where
        F: Fn(&SceneDescriptor) -> Result<Status, BuildError> + Sync,
    {
        let outcomes = paths
            .par_iter()
            .map(|path| self.run_one(path, ctx, &step))
            .collect();
        BatchSummary::new(ctx, outcomes)
    }

    fn run_one<F>(&self, path: &Path, ctx: &BuildContext, step: &F) -> PanoramaOutcome
    where
        F: Fn(&SceneDescriptor) -> Result<Status, BuildError>,
    {
        let result = if ctx.is_cancelled() {
            Err(None)
        } else {
            self.load(path).map_err(Some).and_then(|d| {
                step(&d)
                    .map(|status| (d.pname.clone(), status))
                    .map_err(|e| Some(PanoramaError::new(d.pname, e)))
            })
        };

        let (pname, status) = match result {
            Ok(done) => done,
            Err(Some(err)) => {
                let message = err.error.to_string();
                ctx.emit(BuildEvent::Failed {
                    pname: err.pname.clone(),
                    message: message.clone(),
                });
                (err.pname, Status::Failed { message })
            }
            Err(None) => (
                path.file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                Status::Cancelled,
            ),
        };
        PanoramaOutcome {
            pname,
            descriptor: path.to_path_buf(),
            status,
        }
    }
}
