use crate::store::StoreWriter;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// Why a whole-document save was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveReason {
    /// A cell edit.
    Edit,
    /// The deferred re-save that follows a schema migration.
    Migration,
    /// Row added, moved or deleted in standalone mode.
    RowStructure,
}

impl SaveReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SaveReason::Edit => "edit",
            SaveReason::Migration => "migration",
            SaveReason::RowStructure => "row_structure",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SaveOutcome {
    Saved,
    Failed { code: String, message: String },
    /// A later save was dispatched before this deferred one ran, so its
    /// document was stale and nothing was written.
    Superseded,
}

/// Reported once per dispatched save. In-memory state is never rolled back
/// on failure; the next read is the authority on what was persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaveEvent {
    pub entity: String,
    pub reason: SaveReason,
    pub outcome: SaveOutcome,
    /// Rows in the document that was written.
    pub rows: usize,
}

impl SaveEvent {
    pub fn is_saved(&self) -> bool {
        matches!(self.outcome, SaveOutcome::Saved)
    }

    fn failed(entity: String, reason: SaveReason, rows: usize, message: String) -> Self {
        Self {
            entity,
            reason,
            outcome: SaveOutcome::Failed {
                code: "persist_failure".to_string(),
                message,
            },
            rows,
        }
    }
}

pub trait SaveHook: Send + Sync {
    fn on_save(&self, event: &SaveEvent);
}

/// Handle to a dispatched save. Dropping it does not cancel the save.
#[derive(Debug)]
pub struct PendingSave {
    state: PendingState,
}

#[derive(Debug)]
enum PendingState {
    Done(SaveEvent),
    Background {
        rx: oneshot::Receiver<SaveEvent>,
        finished: Arc<AtomicBool>,
    },
}

impl PendingSave {
    fn done(event: SaveEvent) -> Self {
        Self {
            state: PendingState::Done(event),
        }
    }

    /// The outcome, when the save already ran inline.
    pub fn event(&self) -> Option<&SaveEvent> {
        match &self.state {
            PendingState::Done(event) => Some(event),
            PendingState::Background { .. } => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        match &self.state {
            PendingState::Done(_) => true,
            PendingState::Background { finished, .. } => finished.load(Ordering::Acquire),
        }
    }

    /// Waits for the outcome. `None` when the background save stopped
    /// before reporting.
    pub async fn wait(self) -> Option<SaveEvent> {
        match self.state {
            PendingState::Done(event) => Some(event),
            PendingState::Background { rx, .. } => match rx.await {
                Ok(event) => Some(event),
                Err(_) => {
                    warn!("save task did not complete");
                    None
                }
            },
        }
    }

    /// Blocks the current thread until the outcome is known. Must not be
    /// called from inside an async context; use [`PendingSave::wait`] there.
    pub fn wait_blocking(self) -> Option<SaveEvent> {
        match self.state {
            PendingState::Done(event) => Some(event),
            PendingState::Background { rx, .. } => match rx.blocking_recv() {
                Ok(event) => Some(event),
                Err(_) => {
                    warn!("save thread did not complete");
                    None
                }
            },
        }
    }
}

struct SaveJob {
    writer: Arc<dyn StoreWriter>,
    hooks: Vec<Arc<dyn SaveHook>>,
    gate: Arc<Mutex<()>>,
    generation: Arc<AtomicU64>,
    /// Set for deferred saves: the dispatch generation they were issued at.
    stamp: Option<u64>,
    entity: String,
    document: Value,
    reason: SaveReason,
    rows: usize,
}

impl SaveJob {
    fn run(self) -> SaveEvent {
        let outcome = {
            let _gate = self.gate.lock();
            match self.stamp {
                Some(stamp) if self.generation.load(Ordering::SeqCst) != stamp => {
                    debug!(
                        entity = %self.entity,
                        reason = self.reason.as_str(),
                        "deferred save superseded by a later save"
                    );
                    SaveOutcome::Superseded
                }
                _ => self.write(),
            }
        };
        let event = SaveEvent {
            entity: self.entity,
            reason: self.reason,
            outcome,
            rows: self.rows,
        };
        notify_hooks(&self.hooks, &event);
        event
    }

    fn write(&self) -> SaveOutcome {
        match self.writer.write_store(&self.entity, &self.document) {
            Ok(()) => {
                info!(
                    entity = %self.entity,
                    reason = self.reason.as_str(),
                    rows = self.rows,
                    "table data saved"
                );
                SaveOutcome::Saved
            }
            Err(err) => {
                error!(
                    entity = %self.entity,
                    reason = self.reason.as_str(),
                    code = err.code_str(),
                    error = %err,
                    "save failed"
                );
                SaveOutcome::Failed {
                    code: err.code_str().to_string(),
                    message: err.to_string(),
                }
            }
        }
    }
}

fn notify_hooks(hooks: &[Arc<dyn SaveHook>], event: &SaveEvent) {
    for hook in hooks {
        if std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| hook.on_save(event))).is_err() {
            warn!("save hook panicked while handling event");
        }
    }
}

/// Sends whole documents to the store writer.
///
/// With a tokio runtime every write runs on the blocking pool and the caller
/// gets a handle back right away. Without one, immediate saves happen inline
/// and deferred saves run on a detached thread. A deferred save is dropped
/// as [`SaveOutcome::Superseded`] when any save was dispatched after it, and
/// writes are serialized so a stale document never lands after a newer one.
#[derive(Clone)]
pub struct SaveDispatcher {
    writer: Arc<dyn StoreWriter>,
    hooks: Arc<Mutex<Vec<Arc<dyn SaveHook>>>>,
    gate: Arc<Mutex<()>>,
    generation: Arc<AtomicU64>,
}

impl SaveDispatcher {
    pub fn new(writer: Arc<dyn StoreWriter>) -> Self {
        Self {
            writer,
            hooks: Arc::new(Mutex::new(Vec::new())),
            gate: Arc::new(Mutex::new(())),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn add_hook(&self, hook: Arc<dyn SaveHook>) {
        self.hooks.lock().push(hook);
    }

    pub fn remove_hook(&self, hook: &Arc<dyn SaveHook>) {
        self.hooks
            .lock()
            .retain(|existing| !Arc::ptr_eq(existing, hook));
    }

    /// Dispatches one save. `delay` marks the save as deferred: it waits,
    /// then writes only if nothing else was dispatched in the meantime.
    pub fn dispatch(
        &self,
        entity: &str,
        document: Value,
        reason: SaveReason,
        rows: usize,
        delay: Option<Duration>,
    ) -> PendingSave {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let job = SaveJob {
            writer: Arc::clone(&self.writer),
            hooks: self.hooks.lock().clone(),
            gate: Arc::clone(&self.gate),
            generation: Arc::clone(&self.generation),
            stamp: delay.map(|_| generation),
            entity: entity.to_string(),
            document,
            reason,
            rows,
        };
        let finished = Arc::new(AtomicBool::new(false));
        let (tx, rx) = oneshot::channel();
        let report = {
            let finished = Arc::clone(&finished);
            move |event: SaveEvent| {
                finished.store(true, Ordering::Release);
                // The caller may have dropped the handle.
                let _ = tx.send(event);
            }
        };

        if let Ok(runtime) = Handle::try_current() {
            let entity = entity.to_string();
            runtime.spawn(async move {
                if let Some(delay) = delay
                    && !delay.is_zero()
                {
                    tokio::time::sleep(delay).await;
                }
                let event = match tokio::task::spawn_blocking(move || job.run()).await {
                    Ok(event) => event,
                    Err(err) => {
                        error!(entity = %entity, error = %err, "save task panicked");
                        SaveEvent::failed(entity, reason, rows, err.to_string())
                    }
                };
                report(event);
            });
        } else {
            let Some(delay) = delay else {
                return PendingSave::done(job.run());
            };
            let spawned = std::thread::Builder::new()
                .name("powertable-save".into())
                .spawn(move || {
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                    report(job.run());
                });
            if let Err(err) = spawned {
                error!(entity = %entity, error = %err, "could not start save thread");
                let event = SaveEvent::failed(entity.to_string(), reason, rows, err.to_string());
                let hooks = self.hooks.lock().clone();
                notify_hooks(&hooks, &event);
                return PendingSave::done(event);
            }
        }
        PendingSave {
            state: PendingState::Background { rx, finished },
        }
    }
}
