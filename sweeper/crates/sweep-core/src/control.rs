//! Run ownership, cancellation and progress reporting.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard, mpsc};

use crate::optimizer::{BestResult, Trial};

// ---------------------------------------------------------------------------
// RunLock
// ---------------------------------------------------------------------------

/// Exclusive claim on one page.
///
/// The page is a single shared mutable resource, so at most one sweep or
/// replay may drive it at a time. Clones share the same lock; give every
/// optimizer that targets the same page a clone of one `RunLock`.
#[derive(Debug, Clone, Default)]
pub struct RunLock {
    inner: Arc<Mutex<()>>,
}

/// Proof that the holder owns a [`RunLock`]. Released on drop.
#[derive(Debug)]
pub struct RunGuard {
    lock: Arc<Mutex<()>>,
    _held: OwnedMutexGuard<()>,
}

impl RunLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the page without waiting. `None` when already claimed.
    pub fn try_acquire(&self) -> Option<RunGuard> {
        let held = Arc::clone(&self.inner).try_lock_owned().ok()?;
        Some(RunGuard {
            lock: Arc::clone(&self.inner),
            _held: held,
        })
    }

    pub fn is_held(&self) -> bool {
        self.inner.try_lock().is_err()
    }

    /// Whether `guard` was issued by this lock (or a clone of it).
    pub fn issued(&self, guard: &RunGuard) -> bool {
        Arc::ptr_eq(&self.inner, &guard.lock)
    }
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Cooperative stop request, observed between candidates.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Progress events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SweepEvent {
    RunStarted {
        parameters: usize,
        candidates: usize,
    },
    ParameterStarted {
        name: String,
        candidates: usize,
    },
    CandidateEvaluated {
        trial: Trial,
    },
    NewBest {
        best: BestResult,
    },
    RunFinished {
        found: bool,
        cancelled: bool,
        trials: usize,
    },
}

/// Caller-side handles for one run.
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    cancel: CancelToken,
    progress: Option<mpsc::UnboundedSender<SweepEvent>>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, tx: mpsc::UnboundedSender<SweepEvent>) -> Self {
        self.progress = Some(tx);
        self
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Best effort: a dropped receiver never fails the run.
    pub(crate) fn emit(&self, event: SweepEvent) {
        if let Some(tx) = &self.progress {
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_until_release() {
        let lock = RunLock::new();
        let guard = lock.try_acquire().unwrap();
        assert!(lock.is_held());
        assert!(lock.clone().try_acquire().is_none());
        drop(guard);
        assert!(!lock.is_held());
        assert!(lock.try_acquire().is_some());
    }

    #[test]
    fn issued_distinguishes_locks() {
        let a = RunLock::new();
        let b = RunLock::new();
        let guard = a.try_acquire().unwrap();
        assert!(a.issued(&guard));
        assert!(a.clone().issued(&guard));
        assert!(!b.issued(&guard));
    }

    #[test]
    fn cancel_is_shared_between_clones() {
        let token = CancelToken::new();
        let control = RunControl::new().with_cancel(token.clone());
        assert!(!control.is_cancelled());
        token.cancel();
        assert!(control.is_cancelled());
    }

    #[test]
    fn emit_survives_dropped_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let control = RunControl::new().with_progress(tx);
        control.emit(SweepEvent::RunStarted {
            parameters: 1,
            candidates: 1,
        });
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_value(SweepEvent::ParameterStarted {
            name: "length".into(),
            candidates: 3,
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "parameter_started", "name": "length", "candidates": 3})
        );
    }
}
