use std::sync::RwLock;

use thiserror::Error;
use uuid::Uuid;

use crate::queue::types::{
    Barber, BarberId, EntryId, EntryPatch, QueueEntry, QueueStatus, ShopConfig, Snapshot, Write,
};

/// Error type for persistence operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("snapshot version conflict: expected {expected}, store is at {found}")]
    VersionConflict { expected: u64, found: u64 },
    #[error("update targets unknown entry {0}")]
    UnknownEntry(EntryId),
    #[error("duplicate barber id in roster: {0}")]
    DuplicateBarberId(BarberId),
}

impl StoreError {
    pub fn is_version_conflict(&self) -> bool {
        matches!(self, StoreError::VersionConflict { .. })
    }
}

/// Result of a successful conditional write batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Store version after the batch.
    pub version: u64,
    /// Ids assigned to inserted entries, in write order.
    pub inserted: Vec<EntryId>,
}

/// Persistence collaborator seam.
///
/// One logical writer-sequence per shop: `apply_writes` is conditional on the
/// version the caller read, so racing commands surface as `VersionConflict`
/// instead of interleaved partial state. Entries are never deleted here;
/// retention is a storage policy, not an engine concern.
pub trait QueueStore: Send + Sync {
    /// Reads a consistent view: every non-terminal entry plus the config.
    fn load_snapshot(&self) -> Snapshot;

    /// Applies a write batch atomically iff the store is still at
    /// `expected_version`.
    fn apply_writes(&self, expected_version: u64, writes: Vec<Write>)
        -> Result<ApplyOutcome, StoreError>;

    /// Replaces the barber roster. Ids must be unique.
    fn replace_barbers(&self, barbers: Vec<Barber>) -> Result<u64, StoreError>;

    /// Sets how many waiting entries displays surface at once.
    fn set_visible_count(&self, visible_count: usize) -> u64;
}

struct StoreInner {
    version: u64,
    next_seq: u64,
    entries: Vec<QueueEntry>,
    config: ShopConfig,
}

/// In-process reference store.
///
/// Timestamps come from the engine; the store only assigns identity: a v4
/// `id` and a monotonic `seq` that breaks FIFO ties between entries created
/// in the same millisecond.
pub struct MemoryStore {
    inner: RwLock<StoreInner>,
}

impl MemoryStore {
    pub fn new(config: ShopConfig) -> Self {
        Self {
            inner: RwLock::new(StoreInner {
                version: 0,
                next_seq: 1,
                entries: Vec::new(),
                config,
            }),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(ShopConfig::default())
    }
}

impl QueueStore for MemoryStore {
    fn load_snapshot(&self) -> Snapshot {
        let inner = self.inner.read().expect("store lock poisoned");
        Snapshot {
            version: inner.version,
            entries: inner
                .entries
                .iter()
                .filter(|entry| !entry.status.is_terminal())
                .cloned()
                .collect(),
            config: inner.config.clone(),
        }
    }

    fn apply_writes(
        &self,
        expected_version: u64,
        writes: Vec<Write>,
    ) -> Result<ApplyOutcome, StoreError> {
        let mut inner = self.inner.write().expect("store lock poisoned");
        if inner.version != expected_version {
            return Err(StoreError::VersionConflict {
                expected: expected_version,
                found: inner.version,
            });
        }

        // Validate update targets up front so the batch applies fully or not
        // at all.
        for write in &writes {
            if let Write::Update { id, .. } = write {
                if !inner.entries.iter().any(|entry| entry.id == *id) {
                    return Err(StoreError::UnknownEntry(*id));
                }
            }
        }

        let mut inserted = Vec::new();
        for write in writes {
            match write {
                Write::Insert(new_entry) => {
                    let id = Uuid::new_v4();
                    let seq = inner.next_seq;
                    inner.next_seq += 1;
                    inner.entries.push(QueueEntry {
                        id,
                        seq,
                        first_name: new_entry.first_name,
                        last_initial: new_entry.last_initial,
                        preferred_barber_id: new_entry.preferred_barber_id,
                        status: QueueStatus::Waiting,
                        created_at: new_entry.created_at,
                        called_at: None,
                        called_by_barber_id: None,
                        served_at: None,
                        skipped_at: None,
                    });
                    inserted.push(id);
                }
                Write::Update { id, patch } => {
                    let entry = inner
                        .entries
                        .iter_mut()
                        .find(|entry| entry.id == id)
                        .expect("update target validated above");
                    apply_patch(entry, patch);
                }
            }
        }

        inner.version += 1;
        Ok(ApplyOutcome {
            version: inner.version,
            inserted,
        })
    }

    fn replace_barbers(&self, barbers: Vec<Barber>) -> Result<u64, StoreError> {
        for (index, barber) in barbers.iter().enumerate() {
            if barbers[..index].iter().any(|other| other.id == barber.id) {
                return Err(StoreError::DuplicateBarberId(barber.id.clone()));
            }
        }

        let mut inner = self.inner.write().expect("store lock poisoned");
        inner.config.barbers = barbers;
        inner.version += 1;
        Ok(inner.version)
    }

    fn set_visible_count(&self, visible_count: usize) -> u64 {
        let mut inner = self.inner.write().expect("store lock poisoned");
        inner.config.visible_count = visible_count;
        inner.version += 1;
        inner.version
    }
}

fn apply_patch(entry: &mut QueueEntry, patch: EntryPatch) {
    if let Some(status) = patch.status {
        entry.status = status;
    }
    if let Some(called_at) = patch.called_at {
        entry.called_at = Some(called_at);
    }
    if let Some(called_by) = patch.called_by_barber_id {
        entry.called_by_barber_id = Some(called_by);
    }
    if let Some(served_at) = patch.served_at {
        entry.served_at = Some(served_at);
    }
    if let Some(skipped_at) = patch.skipped_at {
        entry.skipped_at = skipped_at;
    }
    if let Some(preferred) = patch.preferred_barber_id {
        entry.preferred_barber_id = preferred;
    }
}
