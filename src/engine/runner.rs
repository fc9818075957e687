//! Matching engine: snapshot ingestion, the evaluation task and observer fan-out

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use super::condition::Condition;
use super::matcher::Matcher;
use crate::common::channels::SnapshotQueue;
use crate::common::errors::{Result, TraderError};
use crate::common::traits::EngineObserver;
use crate::common::types::{ConditionSetView, Snapshot, Trigger};
use crate::config::types::EngineSettings;

/// Lifecycle of an engine instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Stopped,
    Running,
}

/// Counters exposed for monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub submitted: u64,
    pub evaluated: u64,
    pub dropped: u64,
    pub state_changes: u64,
    pub triggers: u64,
}

struct Shared {
    matcher: Mutex<Matcher>,
    queue: SnapshotQueue,
    observers: RwLock<Vec<Arc<dyn EngineObserver>>>,
    running: AtomicBool,
    /// Set by management calls; the evaluation task publishes the new view
    dirty: AtomicBool,
    poll_interval: Duration,
    submitted: AtomicU64,
    evaluated: AtomicU64,
    state_changes: AtomicU64,
    triggers: AtomicU64,
}

impl Shared {
    fn matcher(&self) -> MutexGuard<'_, Matcher> {
        self.matcher.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn observers(&self) -> Vec<Arc<dyn EngineObserver>> {
        self.observers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Run a callback on every observer, isolating panics
    fn notify(&self, what: &str, call: impl Fn(&dyn EngineObserver)) {
        for observer in self.observers() {
            let result = catch_unwind(AssertUnwindSafe(|| call(observer.as_ref())));
            if result.is_err() {
                error!(observer = observer.name(), callback = what, "observer panicked");
            }
        }
    }

    fn publish_state(&self, view: &ConditionSetView) {
        self.state_changes.fetch_add(1, Ordering::Relaxed);
        self.notify("on_state_changed", |o| o.on_state_changed(view));
    }

    fn publish_trigger(&self, trigger: &Trigger) {
        self.triggers.fetch_add(1, Ordering::Relaxed);
        info!(
            symbol = %trigger.symbol,
            generation = trigger.conditions.generation,
            conditions = trigger.conditions.len(),
            "all conditions met"
        );
        self.notify("on_trigger", |o| o.on_trigger(trigger));
    }

    /// One evaluation pass; errors only on a poisoned matcher
    fn process(&self, snapshot: Snapshot) -> Result<()> {
        let outcome = {
            let mut matcher = self.matcher.lock().map_err(|_| {
                TraderError::Internal("condition set lock poisoned".to_string())
            })?;
            matcher.evaluate(snapshot)
        };
        self.evaluated.fetch_add(1, Ordering::Relaxed);

        if let Some(view) = outcome.state_changed {
            debug!(met = view.met_count(), total = view.len(), "condition state changed");
            self.publish_state(&view);
        }
        if let Some(trigger) = outcome.trigger {
            self.publish_trigger(&trigger);
        }
        Ok(())
    }

    async fn run(self: Arc<Self>) {
        info!("evaluation loop started");

        while self.running.load(Ordering::SeqCst) {
            if self.dirty.swap(false, Ordering::AcqRel) {
                let view = self.matcher().view();
                self.publish_state(&view);
            }

            match self.queue.pop() {
                Some(snapshot) => {
                    if let Err(e) = self.process(snapshot) {
                        error!(error = %e, "fatal engine error, stopping evaluation");
                        self.running.store(false, Ordering::SeqCst);
                        break;
                    }
                    tokio::task::yield_now().await;
                }
                None => self.queue.wait(self.poll_interval).await,
            }
        }

        info!("evaluation loop stopped");
    }
}

/// Evaluates the active condition set against submitted snapshots
///
/// All condition state lives behind one lock that the evaluation task holds
/// for a whole pass, so every pass sees either the old or the new set when
/// `replace_conditions` races with evaluation. Observers are always invoked
/// from the evaluation task, never from the caller of a management method.
pub struct MatchingEngine {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MatchingEngine {
    /// Create a stopped engine
    pub fn new(settings: &EngineSettings) -> Self {
        Self {
            shared: Arc::new(Shared {
                matcher: Mutex::new(Matcher::new()),
                queue: SnapshotQueue::new(settings.queue_capacity),
                observers: RwLock::new(Vec::new()),
                running: AtomicBool::new(false),
                dirty: AtomicBool::new(false),
                poll_interval: Duration::from_millis(settings.poll_interval_ms.max(1)),
                submitted: AtomicU64::new(0),
                evaluated: AtomicU64::new(0),
                state_changes: AtomicU64::new(0),
                triggers: AtomicU64::new(0),
            }),
            task: Mutex::new(None),
        }
    }

    /// Register an observer; takes effect from the next notification
    pub fn register_observer(&self, observer: Arc<dyn EngineObserver>) {
        info!(observer = observer.name(), "observer registered");
        self.shared
            .observers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(observer);
    }

    /// Remove every observer
    pub fn clear_observers(&self) {
        self.shared
            .observers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// Enqueue a snapshot for evaluation; never blocks
    ///
    /// When the queue is full the oldest pending snapshot of the same symbol
    /// is discarded.
    pub fn submit(&self, snapshot: Snapshot) {
        self.shared.submitted.fetch_add(1, Ordering::Relaxed);
        if let Some(evicted) = self.shared.queue.push(snapshot) {
            debug!(symbol = %evicted.symbol, "queue full, dropped stale snapshot");
        }
    }

    /// Atomically swap the active condition set
    pub fn replace_conditions(&self, conditions: Vec<Condition>) -> Result<()> {
        let view = self.shared.matcher().replace(conditions)?;
        if view.is_empty() {
            warn!("condition set replaced with an empty set; nothing to watch");
        } else {
            info!(count = view.len(), generation = view.generation, "condition set replaced");
        }
        self.mark_dirty();
        Ok(())
    }

    /// Append conditions to the active set
    pub fn add_conditions(&self, conditions: Vec<Condition>) -> Result<()> {
        let view = self.shared.matcher().add(conditions)?;
        info!(count = view.len(), generation = view.generation, "conditions added");
        self.mark_dirty();
        Ok(())
    }

    /// Clear every condition back to pending
    pub fn reset_conditions(&self) {
        let view = self.shared.matcher().reset();
        info!(generation = view.generation, "conditions reset");
        self.mark_dirty();
    }

    /// Stop watching anything
    pub fn clear_conditions(&self) {
        let view = self.shared.matcher().clear();
        info!(generation = view.generation, "conditions cleared");
        self.mark_dirty();
    }

    fn mark_dirty(&self) {
        self.shared.dirty.store(true, Ordering::Release);
        self.shared.queue.wake();
    }

    /// Current read-only view of the condition set
    ///
    /// Carries the state of the most recently evaluated symbol, or the
    /// pending set when nothing has been evaluated since the last change.
    pub fn conditions(&self) -> ConditionSetView {
        self.shared.matcher().view()
    }

    /// Evaluation state of the set for one symbol
    pub fn conditions_for(&self, symbol: &str) -> Option<ConditionSetView> {
        self.shared.matcher().symbol_view(symbol)
    }

    /// Last evaluated snapshot for a symbol
    pub fn latest_snapshot(&self, symbol: &str) -> Option<Snapshot> {
        self.shared.matcher().latest_snapshot(symbol).cloned()
    }

    pub fn state(&self) -> EngineState {
        if self.is_running() {
            EngineState::Running
        } else {
            EngineState::Stopped
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            submitted: self.shared.submitted.load(Ordering::Relaxed),
            evaluated: self.shared.evaluated.load(Ordering::Relaxed),
            dropped: self.shared.queue.dropped(),
            state_changes: self.shared.state_changes.load(Ordering::Relaxed),
            triggers: self.shared.triggers.load(Ordering::Relaxed),
        }
    }

    /// Number of snapshots waiting to be evaluated
    pub fn pending(&self) -> usize {
        self.shared.queue.len()
    }

    /// Spawn the evaluation task; must be called inside a tokio runtime
    #[instrument(skip(self))]
    pub fn start(&self) -> Result<()> {
        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if task.as_ref().map_or(false, |handle| handle.is_finished()) {
            debug!("previous evaluation task already exited");
            task.take();
        }
        if task.is_some() {
            return Err(TraderError::AlreadyRunning);
        }

        self.shared.running.store(true, Ordering::SeqCst);
        self.shared.dirty.store(true, Ordering::Release);
        *task = Some(tokio::spawn(self.shared.clone().run()));
        info!("matching engine started");
        Ok(())
    }

    /// Stop evaluating and wait for the evaluation task to finish
    ///
    /// Idempotent. Once this returns no observer is called again and the
    /// queue is no longer drained. Must not be awaited from inside an
    /// observer callback.
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.queue.wake();

        let handle = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        match handle {
            Some(handle) => {
                if let Err(e) = handle.await {
                    error!(error = %e, "evaluation task ended abnormally");
                }
                info!(pending = self.shared.queue.len(), "matching engine stopped");
            }
            None => debug!("stop called on a stopped engine"),
        }
    }
}

impl Default for MatchingEngine {
    fn default() -> Self {
        Self::new(&EngineSettings::default())
    }
}
