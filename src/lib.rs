//! # Simple Pano
//!
//! Publishes interactive panorama viewers with the krpano tools. Given a
//! source panorama and a small YAML descriptor, it produces a tiled
//! multi-resolution viewer bundle, rebuilding only what is stale.
//!
//! # Architecture: Build and Mutate
//!
//! Tiling is delegated to the external `makepano` tool. Everything around it
//! is ours:
//!
//! ```text
//! descriptor.yaml ─▶ validate ─▶ stale? ─no─▶ done
//!                                  │yes
//!                                  ▼
//!                     copy preview / twitter card
//!                                  ▼
//!                     makepano ─▶ <pname>.xml + <pname>.tiles/
//!                                  ▼
//!                     post-process scene document:
//!                     view overrides, hotspots, debug extensions
//!                                  ▼
//!                     save <pname>.xml (and <pname>.html with --html)
//! ```
//!
//! There is no build database: freshness is always recomputed from file
//! timestamps, and a scene document that is already current is never
//! touched again, not even re-saved.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`descriptor`] | YAML scene descriptors, validation, image reference resolution |
//! | [`staleness`] | Timestamp comparisons, with a chosen basis per artifact class |
//! | [`tool`] | `ToolRunner` trait and the process runner (timeout, cancellation) |
//! | [`tiling`] | `makepano` arguments, preview copies, scene generation |
//! | [`scene`] | Parsed scene document and its post-processing |
//! | [`hotspots`] | Hotspot fragment (`<pname>_hotspots.xml`) |
//! | [`assets`] | Bundled marker icon and plugin fragments, staged idempotently |
//! | [`protect`] | Domain-locked viewer script (`krpano.js`) |
//! | [`page`] | Standalone HTML page embedding one viewer, rendered with Maud |
//! | [`mirror`] | Timestamp-based directory mirroring for publish and backup copies |
//! | [`pipeline`] | Per-panorama orchestration and the parallel batch driver |
//! | [`context`] | Event sink, fixed "now", cancellation flag, tool timeout |
//! | [`config`] | `~/.simple-pano.toml` loading, validation, merging |
//! | [`output`] | CLI output formatting of build events and reports |
//!
//! # Design Decisions
//!
//! ## Timestamp Basis Per Artifact Class
//!
//! Scene documents and image copies compare status-change times by default:
//! a source copied in with an old preserved mtime still triggers a rebuild.
//! Mirrored trees compare modification times, since the mirror preserves
//! them. Both are configurable in `[staleness]`, per class.
//!
//! ## Staging Without Overwrites
//!
//! Plugin fragments and the marker icon are staged into the output tree
//! only when absent. Parallel builds sharing an output directory race on
//! this; a no-clobber rename makes exactly one of them win and the others
//! treat "already exists" as success.
//!
//! ## One Mutation Per Generation
//!
//! A parsed scene document is only produced when the tool has just run, and
//! saving consumes it. Overrides, hotspot includes and debug extensions are
//! therefore applied exactly once per generated document.

pub mod assets;
pub mod config;
pub mod context;
pub mod descriptor;
pub mod hotspots;
pub mod mirror;
pub mod output;
pub mod page;
pub mod pipeline;
pub mod protect;
pub mod scene;
pub mod staleness;
pub mod tiling;
pub mod tool;

#[cfg(test)]
pub(crate) mod test_helpers;
