use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};

use crate::auth::Role;
use crate::notify::{ChangeEvent, ChangeNotifier};
use crate::queue::engine;
use crate::queue::types::{Barber, Command, EntryId, Snapshot, TransitionError};
use crate::server::monitoring::QUEUE_METRICS;
use crate::store::{QueueStore, StoreError};

/// Error type for the command path: engine rejections plus the concerns the
/// engine delegates outward (auth, optimistic-write contention).
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("a staff or admin session is required")]
    Unauthorized,
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("queue changed concurrently; try again")]
    Contention,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ServiceError {
    /// Stable machine-readable kind used in API bodies and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Unauthorized => "unauthorized",
            ServiceError::Transition(err) => err.kind(),
            ServiceError::Contention => "contention",
            ServiceError::Store(_) => "store",
        }
    }
}

/// Outcome of a successfully executed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReceipt {
    /// Store version the command's writes produced.
    pub version: u64,
    /// Id of the entry created by check-in, if any.
    pub entry_id: Option<EntryId>,
}

/// Executes commands end to end: auth gate, snapshot read, pure transition,
/// conditional write, change broadcast.
///
/// The service holds no queue state of its own, so a retried command simply
/// re-runs against a fresh snapshot.
pub struct QueueService {
    store: Arc<dyn QueueStore>,
    notifier: ChangeNotifier,
}

impl QueueService {
    pub fn new(store: Arc<dyn QueueStore>, notifier: ChangeNotifier) -> Self {
        Self { store, notifier }
    }

    pub fn snapshot(&self) -> Snapshot {
        self.store.load_snapshot()
    }

    /// Runs one command as an optimistic write against the snapshot version,
    /// retried once from fresh state on conflict, then surfaced as transient
    /// contention.
    pub fn execute(
        &self,
        command: &Command,
        role: Option<Role>,
    ) -> Result<CommandReceipt, ServiceError> {
        if role.is_none() && !command.allows_anonymous() {
            self.count_rejected(command.name(), "unauthorized");
            return Err(ServiceError::Unauthorized);
        }

        const MAX_ATTEMPTS: u32 = 2;
        for attempt in 1..=MAX_ATTEMPTS {
            let snapshot = self.store.load_snapshot();
            let writes = match engine::apply(&snapshot, command, Utc::now()) {
                Ok(writes) => writes,
                Err(err) => {
                    self.count_rejected(command.name(), err.kind());
                    return Err(err.into());
                }
            };

            match self.store.apply_writes(snapshot.version, writes) {
                Ok(outcome) => {
                    self.notifier.broadcast(ChangeEvent::EntriesChanged {
                        version: outcome.version,
                    });
                    self.record_applied(command.name(), outcome.version);
                    info!(
                        event = "command_applied",
                        command = command.name(),
                        version = outcome.version,
                        attempt,
                        "applied queue command"
                    );
                    return Ok(CommandReceipt {
                        version: outcome.version,
                        entry_id: outcome.inserted.first().copied(),
                    });
                }
                Err(err) if err.is_version_conflict() && attempt < MAX_ATTEMPTS => {
                    warn!(
                        event = "command_version_conflict",
                        command = command.name(),
                        attempt,
                        "snapshot moved underneath command, retrying from fresh state"
                    );
                    continue;
                }
                Err(err) if err.is_version_conflict() => {
                    self.count_rejected(command.name(), "contention");
                    return Err(ServiceError::Contention);
                }
                Err(err) => {
                    self.count_rejected(command.name(), "store");
                    return Err(err.into());
                }
            }
        }
        unreachable!("loop either returns or retries within MAX_ATTEMPTS")
    }

    /// Replaces the barber roster (admin surface).
    pub fn replace_barbers(
        &self,
        role: Option<Role>,
        barbers: Vec<Barber>,
    ) -> Result<u64, ServiceError> {
        if role.is_none() {
            return Err(ServiceError::Unauthorized);
        }
        let version = self.store.replace_barbers(barbers)?;
        self.notifier
            .broadcast(ChangeEvent::ConfigChanged { version });
        info!(event = "roster_replaced", version, "replaced barber roster");
        Ok(version)
    }

    /// Sets the display's visible-entry budget (admin surface).
    pub fn set_visible_count(
        &self,
        role: Option<Role>,
        visible_count: usize,
    ) -> Result<u64, ServiceError> {
        if role.is_none() {
            return Err(ServiceError::Unauthorized);
        }
        if visible_count == 0 {
            return Err(TransitionError::InvalidInput(
                "visible_count must be > 0".to_string(),
            )
            .into());
        }
        let version = self.store.set_visible_count(visible_count);
        self.notifier
            .broadcast(ChangeEvent::ConfigChanged { version });
        info!(
            event = "visible_count_updated",
            visible_count, version, "updated display visible count"
        );
        Ok(version)
    }

    fn record_applied(&self, command: &'static str, version: u64) {
        if let Some(metrics) = QUEUE_METRICS.get() {
            metrics.count_applied(command);
            metrics.snapshot_version.set(version as i64);
        }
    }

    fn count_rejected(&self, command: &'static str, kind: &'static str) {
        if let Some(metrics) = QUEUE_METRICS.get() {
            metrics.count_rejected(command, kind);
        }
    }
}
