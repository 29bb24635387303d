use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub type EntryId = Uuid;
pub type BarberId = String;

/// Error type for queue transition commands.
///
/// Every variant is a recoverable, caller-rendered outcome; the engine never
/// panics on user input.
#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("invalid check-in input: {0}")]
    InvalidInput(String),
    #[error("entry {0} does not exist or is not waiting")]
    NotFound(EntryId),
    #[error("no eligible waiting entry to call")]
    EmptyQueue,
    #[error("no active call to recall")]
    NoActiveCall,
    #[error("entry {0} is already in a terminal state")]
    AlreadyTerminal(EntryId),
    #[error("operation not legal in current entry state: {0}")]
    InvalidState(String),
}

impl TransitionError {
    /// Stable machine-readable kind used in API bodies and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            TransitionError::InvalidInput(_) => "invalid_input",
            TransitionError::NotFound(_) => "not_found",
            TransitionError::EmptyQueue => "empty_queue",
            TransitionError::NoActiveCall => "no_active_call",
            TransitionError::AlreadyTerminal(_) => "already_terminal",
            TransitionError::InvalidState(_) => "invalid_state",
        }
    }
}

/// Lifecycle states for a queue entry. `Served` and `NoShow` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Waiting,
    Called,
    Served,
    NoShow,
}

impl QueueStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, QueueStatus::Served | QueueStatus::NoShow)
    }
}

/// One client's visit.
///
/// `seq` is the store-assigned insertion sequence; it is the deterministic
/// tie-break for every timestamp comparison, so two entries created in the
/// same millisecond still have a total order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueEntry {
    pub id: EntryId,
    pub seq: u64,
    pub first_name: String,
    pub last_initial: String,
    pub preferred_barber_id: Option<BarberId>,
    pub status: QueueStatus,
    pub created_at: DateTime<Utc>,
    pub called_at: Option<DateTime<Utc>>,
    pub called_by_barber_id: Option<BarberId>,
    pub served_at: Option<DateTime<Utc>>,
    pub skipped_at: Option<DateTime<Utc>>,
}

impl QueueEntry {
    /// Composed display name, e.g. `"Sam Q."`.
    ///
    /// Name fields are normalized once at check-in and never re-derived.
    pub fn display_name(&self) -> String {
        format!("{} {}.", self.first_name, self.last_initial)
    }

    /// FIFO position key for non-held entries.
    pub fn fifo_key(&self) -> (DateTime<Utc>, u64) {
        (self.created_at, self.seq)
    }
}

/// A barber on the shop roster. `working` controls whether the barber counts
/// toward display segmentation sizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Barber {
    pub id: BarberId,
    pub name: String,
    pub working: bool,
}

/// Process-wide shop configuration, owned by the store and read-only to both
/// engines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShopConfig {
    pub barbers: Vec<Barber>,
    /// How many waiting entries the display surfaces at once.
    pub visible_count: usize,
    /// Roster size assumed when no barber is marked working, so segmentation
    /// never degenerates to an empty highlight window.
    pub fallback_barber_count: usize,
}

impl Default for ShopConfig {
    fn default() -> Self {
        Self {
            barbers: Vec::new(),
            visible_count: 10,
            fallback_barber_count: 1,
        }
    }
}

/// Consistent view of the queue at one store version: every non-terminal
/// entry plus the config. Commands are pure functions of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub version: u64,
    pub entries: Vec<QueueEntry>,
    pub config: ShopConfig,
}

/// Insert payload produced by check-in. The store assigns `id` and `seq`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    pub first_name: String,
    pub last_initial: String,
    pub preferred_barber_id: Option<BarberId>,
    pub created_at: DateTime<Utc>,
}

/// Field-level update for one entry.
///
/// Plain `Option` fields are set-only (`called_at`, `served_at` are stamped,
/// never cleared); double-`Option` fields distinguish "leave alone"
/// (`None`) from "set or clear" (`Some(_)`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryPatch {
    pub status: Option<QueueStatus>,
    pub called_at: Option<DateTime<Utc>>,
    pub called_by_barber_id: Option<BarberId>,
    pub served_at: Option<DateTime<Utc>>,
    pub skipped_at: Option<Option<DateTime<Utc>>>,
    pub preferred_barber_id: Option<Option<BarberId>>,
}

/// One persistence side effect issued by the transition engine. A command's
/// writes are applied atomically against the snapshot version they were
/// computed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Write {
    Insert(NewEntry),
    Update { id: EntryId, patch: EntryPatch },
}

/// Staff and kiosk commands accepted by the transition engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    CheckIn {
        first_name: String,
        last_initial: String,
        preferred_barber_id: Option<BarberId>,
    },
    Accept {
        entry_id: EntryId,
        barber_id: BarberId,
    },
    CallNext {
        barber_id: BarberId,
    },
    Skip {
        entry_id: EntryId,
    },
    UndoSkip {
        entry_id: EntryId,
    },
    Recall,
    MarkServed {
        entry_id: EntryId,
    },
    MarkNoShow {
        entry_id: EntryId,
    },
    AssignPreferredBarber {
        entry_id: EntryId,
        barber_id: Option<BarberId>,
    },
}

impl Command {
    /// Stable command name used in logs and metrics labels.
    pub fn name(&self) -> &'static str {
        match self {
            Command::CheckIn { .. } => "check_in",
            Command::Accept { .. } => "accept",
            Command::CallNext { .. } => "call_next",
            Command::Skip { .. } => "skip",
            Command::UndoSkip { .. } => "undo_skip",
            Command::Recall => "recall",
            Command::MarkServed { .. } => "mark_served",
            Command::MarkNoShow { .. } => "mark_no_show",
            Command::AssignPreferredBarber { .. } => "assign_preferred_barber",
        }
    }

    /// Whether the command may be issued without a staff session.
    ///
    /// Check-in is the only anonymous mutation (the kiosk has no login).
    pub fn allows_anonymous(&self) -> bool {
        matches!(self, Command::CheckIn { .. })
    }
}
