//! Progress reporting and cancellation signals owned by the caller.
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Receives progress updates from long running conversions.
pub trait ProgressMonitor: Sync {
    fn set_progress(&self, fraction: f64, message: &str);
}

/// Discards all progress updates.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressMonitor for NoProgress {
    fn set_progress(&self, _fraction: f64, _message: &str) {}
}

/// Logs progress at `debug` level, once per completed tenth.
#[derive(Debug)]
pub struct LogProgress {
    label: String,
    last_decile: AtomicUsize,
}

impl LogProgress {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            last_decile: AtomicUsize::new(0),
        }
    }
}

impl ProgressMonitor for LogProgress {
    fn set_progress(&self, fraction: f64, message: &str) {
        let decile = (fraction.clamp(0.0, 1.0) * 10.0) as usize;
        if self.last_decile.fetch_max(decile, Ordering::AcqRel) < decile {
            log::debug!("{}: {:.0}% ({})", self.label, fraction * 100.0, message);
        }
    }
}

/// An externally owned "please stop" signal that the core polls.
pub trait CancellationSource: Send + Sync {
    fn is_cancel_requested(&self) -> bool;
}

impl CancellationSource for AtomicBool {
    fn is_cancel_requested(&self) -> bool {
        self.load(Ordering::Acquire)
    }
}

/// Never requests cancellation.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverCancel;

impl CancellationSource for NeverCancel {
    fn is_cancel_requested(&self) -> bool {
        false
    }
}

/// Cloneable cancellation handle; all clones share one flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

impl CancellationSource for CancellationToken {
    fn is_cancel_requested(&self) -> bool {
        self.is_cancelled()
    }
}
