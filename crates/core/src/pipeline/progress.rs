//! # Progress Display
//!
//! Terminal progress for pipeline runs. A [`ProgressRouter`] hands out at
//! most one interactive display at a time; concurrent runs (and pipelines
//! nested inside a step) fall back to plain log lines instead of fighting
//! over the cursor.

use std::io::{self, IsTerminal, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const BAR_WIDTH: usize = 30;

/// How a run's advancement is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressMode {
    /// Owns the terminal and redraws a bar in place.
    Interactive,
    /// Emits one log line per completed step.
    Log,
}

/// Hands out at most one interactive display at a time.
///
/// Clones share the claim, so an engine and any pipelines nested inside its
/// steps route through the same router.
#[derive(Debug, Clone)]
pub struct ProgressRouter {
    inner: Arc<RouterInner>,
}

#[derive(Debug)]
struct RouterInner {
    active: AtomicBool,
    interactive_allowed: bool,
}

impl ProgressRouter {
    /// Router that may draw on stderr when stderr is a terminal.
    pub fn stderr() -> Self {
        Self::with_interactive(io::stderr().is_terminal())
    }

    /// Router with interactive drawing forced on or off.
    pub fn with_interactive(allowed: bool) -> Self {
        Self {
            inner: Arc::new(RouterInner {
                active: AtomicBool::new(false),
                interactive_allowed: allowed,
            }),
        }
    }

    /// Claim the display for one run. When the display is already claimed
    /// (or stderr is not a terminal) the scope downgrades to log lines.
    pub(crate) fn acquire(&self, label: &str, total: usize) -> ProgressScope {
        let owns_display = self.inner.interactive_allowed
            && self
                .inner
                .active
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok();

        if !owns_display {
            tracing::debug!(label, total, "progress display unavailable, using log lines");
        }

        ProgressScope {
            router: self.clone(),
            owns_display,
            label: label.to_string(),
            total,
            done: 0,
        }
    }
}

impl Default for ProgressRouter {
    fn default() -> Self {
        Self::stderr()
    }
}

/// One run's progress handle; releases the display claim on drop.
pub struct ProgressScope {
    router: ProgressRouter,
    owns_display: bool,
    label: String,
    total: usize,
    done: usize,
}

impl ProgressScope {
    pub fn mode(&self) -> ProgressMode {
        if self.owns_display {
            ProgressMode::Interactive
        } else {
            ProgressMode::Log
        }
    }

    /// Mark one step finished and repaint (or log) the position.
    pub(crate) fn advance(&mut self, step_name: &str) {
        self.done += 1;
        if self.owns_display {
            let bar = render_block(self.done, self.total, BAR_WIDTH);
            let mut err = io::stderr();
            let _ = write!(
                err,
                "\r{} [{}] {}/{} {:<24}",
                self.label, bar, self.done, self.total, step_name
            );
            let _ = err.flush();
        } else {
            tracing::info!(
                step = step_name,
                done = self.done,
                total = self.total,
                "step complete"
            );
        }
    }
}

impl Drop for ProgressScope {
    fn drop(&mut self) {
        if self.owns_display {
            if self.done > 0 {
                let _ = writeln!(io::stderr());
            }
            self.router.inner.active.store(false, Ordering::SeqCst);
        }
    }
}

/// Fixed-width block bar, e.g. `██████░░░░` at 60%.
fn render_block(done: usize, total: usize, width: usize) -> String {
    let ratio = if total == 0 {
        0.0
    } else {
        (done as f64 / total as f64).clamp(0.0, 1.0)
    };
    let filled = (ratio * width as f64).round() as usize;
    format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
}
