//! Per-run build context.
//!
//! Every pipeline operation receives a [`BuildContext`] instead of reaching
//! for global state. It carries:
//!
//! - the event sink the CLI printer listens on (see [`crate::output`]),
//! - a fixed "now" stamped into reports, so tests are reproducible,
//! - the cancellation flag shared with every running tool invocation,
//! - the timeout bounding each external tool call.

use crate::staleness::ArtifactClass;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::time::{Duration, SystemTime};

/// Default bound on a single external tool invocation.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Progress events emitted while building panoramas.
///
/// Consumers format these with [`crate::output::format_build_event`].
#[derive(Debug, Clone, PartialEq)]
pub enum BuildEvent {
    Started {
        pname: String,
    },
    /// A preview or twitter-card image was refreshed.
    Copied {
        pname: String,
        class: ArtifactClass,
        source: PathBuf,
        dest: PathBuf,
    },
    /// The scene document is newer than all of its sources.
    UpToDate {
        pname: String,
    },
    ToolInvoked {
        subcommand: String,
        args: Vec<String>,
    },
    /// One non-empty line of tool output.
    ToolOutput {
        line: String,
    },
    /// The scene document has no `<view>` element; overrides were skipped.
    ViewMissing {
        pname: String,
    },
    ViewOverridden {
        pname: String,
        attribute: &'static str,
        value: String,
    },
    HotspotsWritten {
        pname: String,
        path: PathBuf,
        count: usize,
    },
    AssetStaged {
        name: String,
        dest: PathBuf,
    },
    SceneWritten {
        pname: String,
        path: PathBuf,
    },
    PageWritten {
        pname: String,
        path: PathBuf,
    },
    ViewerProtected {
        path: PathBuf,
        domains: Vec<String>,
    },
    /// A file was copied by a directory mirror.
    Mirrored {
        dest: PathBuf,
    },
    Failed {
        pname: String,
        message: String,
    },
}

/// Cooperative cancellation flag, cheap to clone and share across threads.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Explicit context threaded through every build operation.
#[derive(Debug, Clone)]
pub struct BuildContext {
    events: Option<Sender<BuildEvent>>,
    now: SystemTime,
    cancel: CancelFlag,
    tool_timeout: Duration,
}

impl BuildContext {
    /// Context for a real run: wall-clock "now", default timeout, no sink.
    pub fn new() -> Self {
        Self {
            events: None,
            now: SystemTime::now(),
            cancel: CancelFlag::new(),
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    pub fn with_events(mut self, events: Sender<BuildEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Pin "now" to a fixed instant.
    pub fn with_now(mut self, now: SystemTime) -> Self {
        self.now = now;
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    /// Send an event to the sink, if any. A disconnected receiver is ignored.
    pub fn emit(&self, event: BuildEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    pub fn now(&self) -> SystemTime {
        self.now
    }

    pub fn tool_timeout(&self) -> Duration {
        self.tool_timeout
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Default for BuildContext {
    fn default() -> Self {
        Self::new()
    }
}
