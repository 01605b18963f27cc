//! CLI output formatting for build events and batch reports.
//!
//! # Information-First Display
//!
//! Output is organized by panorama, not by file. Each panorama's lines start
//! with its pname; paths are secondary context on indented lines. Tool
//! chatter is hidden unless `--verbose` is given.
//!
//! # Output Format
//!
//! ## Build
//!
//! ```text
//! harbour
//!     preview: 2024/harbour_small.jpg → out/harbour_small.jpg
//!     makepano: 13 args
//!     view: hlookat = 30
//!     hotspots: 2 → out/harbour_hotspots.xml
//!     scene: out/harbour.xml
//! bridge
//!     scene: up to date
//! mill: FAILED missing required field `input`
//!
//! harbour: generated
//! bridge: up to date
//! mill: FAILED missing required field `input`
//!
//! 3 panoramas: 1 generated, 1 up to date, 1 failed
//! ```
//!
//! Events of panoramas built in parallel may interleave; the summary at the
//! end is always in descriptor order.
//!
//! # Architecture
//!
//! Each format function returns `Vec<String>` (or `String`) for testability;
//! the `print_*` wrappers write to stdout. Format functions are pure: no I/O,
//! no side effects.

use crate::context::BuildEvent;
use crate::mirror::MirrorSummary;
use crate::pipeline::{BatchSummary, Status};
use crate::staleness::ArtifactClass;
use std::path::Path;

// ============================================================================
// Shared display helpers
// ============================================================================

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Indented `label: detail` context line under a panorama header.
fn context_line(label: &str, detail: impl std::fmt::Display) -> String {
    format!("{}{}: {}", indent(1), label, detail)
}

fn plural(n: usize, one: &str, many: &str) -> String {
    format!("{} {}", n, if n == 1 { one } else { many })
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

// ============================================================================
// Build events
// ============================================================================

/// Format one build event as display lines.
///
/// `verbose` additionally shows the full tool command and its output, plus
/// every staged asset.
pub fn format_build_event(event: &BuildEvent, verbose: bool) -> Vec<String> {
    match event {
        BuildEvent::Started { pname } => vec![pname.clone()],
        BuildEvent::Copied {
            class, source, dest, ..
        } => {
            let label = match class {
                ArtifactClass::TwitterCard => "twittercard",
                ArtifactClass::Preview => "preview",
                _ => "copy",
            };
            vec![context_line(
                label,
                format!("{} → {}", display(source), display(dest)),
            )]
        }
        BuildEvent::UpToDate { .. } => vec![context_line("scene", "up to date")],
        BuildEvent::ToolInvoked { subcommand, args } => {
            if verbose {
                vec![context_line(subcommand, args.join(" "))]
            } else {
                vec![context_line(subcommand, plural(args.len(), "arg", "args"))]
            }
        }
        BuildEvent::ToolOutput { line } if verbose => vec![format!("{}{}", indent(2), line)],
        BuildEvent::ToolOutput { .. } => Vec::new(),
        BuildEvent::ViewMissing { .. } => {
            vec![context_line("view", "no <view> element, overrides skipped")]
        }
        BuildEvent::ViewOverridden {
            attribute, value, ..
        } => vec![context_line("view", format!("{attribute} = {value}"))],
        BuildEvent::HotspotsWritten { path, count, .. } => vec![context_line(
            "hotspots",
            format!("{count} → {}", display(path)),
        )],
        BuildEvent::AssetStaged { dest, .. } if verbose => {
            vec![context_line("staged", display(dest))]
        }
        BuildEvent::AssetStaged { .. } => Vec::new(),
        BuildEvent::SceneWritten { path, .. } => vec![context_line("scene", display(path))],
        BuildEvent::PageWritten { path, .. } => vec![context_line("page", display(path))],
        BuildEvent::ViewerProtected { path, domains } => vec![format!(
            "viewer {} locked to {}",
            display(path),
            domains.join(", ")
        )],
        BuildEvent::Mirrored { dest } if verbose => vec![format!("copied {}", display(dest))],
        BuildEvent::Mirrored { .. } => Vec::new(),
        BuildEvent::Failed { pname, message } => vec![format!("{pname}: FAILED {message}")],
    }
}

// ============================================================================
// Batch reports
// ============================================================================

fn status_label(status: &Status) -> String {
    match status {
        Status::Generated => "generated".into(),
        Status::UpToDate => "up to date".into(),
        Status::HotspotsWritten { count } => plural(*count, "hotspot", "hotspots"),
        Status::Valid => "ok".into(),
        Status::Failed { message } => format!("FAILED {message}"),
        Status::Cancelled => "cancelled".into(),
    }
}

/// Format the per-panorama result table and a totals line.
pub fn format_summary(summary: &BatchSummary) -> Vec<String> {
    let mut lines: Vec<String> = summary
        .panoramas
        .iter()
        .map(|p| format!("{}: {}", p.pname, status_label(&p.status)))
        .collect();

    let mut totals = Vec::new();
    for (label, n) in [
        (
            "generated",
            summary.count(|s| matches!(s, Status::Generated)),
        ),
        (
            "up to date",
            summary.count(|s| matches!(s, Status::UpToDate)),
        ),
        (
            "hotspots written",
            summary.count(|s| matches!(s, Status::HotspotsWritten { .. })),
        ),
        ("valid", summary.count(|s| matches!(s, Status::Valid))),
        (
            "failed",
            summary.count(|s| matches!(s, Status::Failed { .. })),
        ),
        (
            "cancelled",
            summary.count(|s| matches!(s, Status::Cancelled)),
        ),
    ] {
        if n > 0 {
            totals.push(format!("{n} {label}"));
        }
    }

    lines.push(String::new());
    lines.push(format!(
        "{}: {}",
        plural(summary.panoramas.len(), "panorama", "panoramas"),
        if totals.is_empty() {
            "nothing to do".to_string()
        } else {
            totals.join(", ")
        }
    ));
    lines
}

pub fn print_summary(summary: &BatchSummary) {
    for line in format_summary(summary) {
        println!("{}", line);
    }
}

/// One-line report of a mirror run.
pub fn format_mirror_summary(source: &Path, dest: &Path, summary: &MirrorSummary) -> String {
    let mut line = format!(
        "{} → {}: {} copied, {} current",
        display(source),
        display(dest),
        summary.copied,
        summary.skipped
    );
    if summary.excluded > 0 {
        line.push_str(&format!(", {} excluded", summary.excluded));
    }
    line
}
