//! Domain-locked viewer script generation (`protect`).

use crate::context::{BuildContext, BuildEvent};
use crate::tool::{self, ToolError, ToolInvocation, ToolRunner};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default file name of the viewer script inside the output tree.
pub const DEFAULT_VIEWER_NAME: &str = "krpano.js";

#[derive(Error, Debug)]
pub enum ProtectError {
    #[error("no domains given")]
    NoDomains,
    #[error("cannot create {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Tool(#[from] ToolError),
}

/// Prompt-suppressing flags, then one `-domain=` per domain, then the
/// output path.
pub fn protect_args(viewer: &Path, domains: &[String]) -> Vec<String> {
    let mut args: Vec<String> = ["-noep", "-nolu", "-noex"]
        .into_iter()
        .map(String::from)
        .collect();
    args.extend(domains.iter().map(|d| format!("-domain={d}")));
    args.push(format!("-o={}", viewer.display()));
    args
}

/// Write a viewer script locked to `domains` at `viewer`.
///
/// The parent directory is created first. Always invokes the tool; there is
/// no staleness check for the viewer script.
pub fn protect(
    runner: &impl ToolRunner,
    viewer: &Path,
    domains: &[String],
    ctx: &BuildContext,
) -> Result<PathBuf, ProtectError> {
    if domains.is_empty() {
        return Err(ProtectError::NoDomains);
    }
    if let Some(parent) = viewer.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|source| ProtectError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let invocation = ToolInvocation::new("protect", protect_args(viewer, domains));
    tool::run_checked(runner, &invocation, ctx)?;

    ctx.emit(BuildEvent::ViewerProtected {
        path: viewer.to_path_buf(),
        domains: domains.to_vec(),
    });
    Ok(viewer.to_path_buf())
}
