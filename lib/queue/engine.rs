use chrono::{DateTime, Utc};

use super::types::{
    BarberId, Command, EntryId, EntryPatch, NewEntry, QueueEntry, QueueStatus, Snapshot,
    TransitionError, Write,
};

/// Returns the currently active call, if any.
///
/// The active call is derived, never stored: among `called` entries, the one
/// with the maximum `(called_at, seq)`. Auto-serve-previous keeps the called
/// set at size one, but the derivation must stay exact because it is how
/// `Accept`/`CallNext` locate the entry to auto-serve.
pub fn active_call(entries: &[QueueEntry]) -> Option<&QueueEntry> {
    entries
        .iter()
        .filter(|entry| entry.status == QueueStatus::Called)
        .max_by_key(|entry| (entry.called_at, entry.seq))
}

/// Applies one command against a snapshot and returns the write set to
/// persist.
///
/// Pure function of `(snapshot, command, now)`: no clock reads, no hidden
/// state, so retrying the same command against a freshly re-read snapshot is
/// always safe.
pub fn apply(
    snapshot: &Snapshot,
    command: &Command,
    now: DateTime<Utc>,
) -> Result<Vec<Write>, TransitionError> {
    match command {
        Command::CheckIn {
            first_name,
            last_initial,
            preferred_barber_id,
        } => check_in(first_name, last_initial, preferred_barber_id.clone(), now),
        Command::Accept {
            entry_id,
            barber_id,
        } => accept(&snapshot.entries, *entry_id, barber_id.clone(), now),
        Command::CallNext { barber_id } => call_next(&snapshot.entries, barber_id, now),
        Command::Skip { entry_id } => skip(&snapshot.entries, *entry_id, now),
        Command::UndoSkip { entry_id } => undo_skip(&snapshot.entries, *entry_id),
        Command::Recall => recall(&snapshot.entries, now),
        Command::MarkServed { entry_id } => {
            mark_terminal(&snapshot.entries, *entry_id, QueueStatus::Served, now)
        }
        Command::MarkNoShow { entry_id } => {
            mark_terminal(&snapshot.entries, *entry_id, QueueStatus::NoShow, now)
        }
        Command::AssignPreferredBarber {
            entry_id,
            barber_id,
        } => assign_preferred(&snapshot.entries, *entry_id, barber_id.clone()),
    }
}

/// Normalizes a last-initial to exactly one uppercase letter.
///
/// `"Quinn"` reduces to `"Q"`; anything that does not start with a letter is
/// rejected.
fn normalize_initial(raw: &str) -> Result<String, TransitionError> {
    let first = raw
        .trim()
        .chars()
        .next()
        .ok_or_else(|| TransitionError::InvalidInput("last initial is required".to_string()))?;
    if !first.is_alphabetic() {
        return Err(TransitionError::InvalidInput(format!(
            "last initial must be a letter, got {first:?}"
        )));
    }
    // Some uppercase mappings expand to several chars ("ß" becomes "SS");
    // keep only the first so the initial is always a single letter.
    Ok(first.to_uppercase().take(1).collect())
}

fn check_in(
    first_name: &str,
    last_initial: &str,
    preferred_barber_id: Option<BarberId>,
    now: DateTime<Utc>,
) -> Result<Vec<Write>, TransitionError> {
    let first_name = first_name.trim();
    if first_name.is_empty() {
        return Err(TransitionError::InvalidInput(
            "first name is required".to_string(),
        ));
    }
    let last_initial = normalize_initial(last_initial)?;

    Ok(vec![Write::Insert(NewEntry {
        first_name: first_name.to_string(),
        last_initial,
        preferred_barber_id,
        created_at: now,
    })])
}

fn find_waiting(
    entries: &[QueueEntry],
    entry_id: EntryId,
) -> Result<&QueueEntry, TransitionError> {
    entries
        .iter()
        .find(|entry| entry.id == entry_id && entry.status == QueueStatus::Waiting)
        .ok_or(TransitionError::NotFound(entry_id))
}

/// Calls one waiting entry, auto-serving whoever is currently called.
///
/// Auto-serve-previous is how the "exactly one active call" invariant holds
/// by construction: the engine never rejects a second call, it resolves the
/// first one.
fn accept(
    entries: &[QueueEntry],
    entry_id: EntryId,
    barber_id: BarberId,
    now: DateTime<Utc>,
) -> Result<Vec<Write>, TransitionError> {
    let target = find_waiting(entries, entry_id)?;

    let mut writes = Vec::new();
    if let Some(previous) = active_call(entries) {
        writes.push(Write::Update {
            id: previous.id,
            patch: EntryPatch {
                status: Some(QueueStatus::Served),
                served_at: Some(now),
                ..EntryPatch::default()
            },
        });
    }

    // Being called always exits the holding area.
    writes.push(Write::Update {
        id: target.id,
        patch: EntryPatch {
            status: Some(QueueStatus::Called),
            called_at: Some(now),
            called_by_barber_id: Some(barber_id),
            skipped_at: Some(None),
            ..EntryPatch::default()
        },
    });

    Ok(writes)
}

/// Selects the next entry for a barber and calls it.
///
/// Selection order: earliest non-skipped waiting entry preferring this
/// barber, then earliest non-skipped any-barber entry. Held (skipped)
/// entries are never auto-selected; staff pull them out explicitly.
fn call_next(
    entries: &[QueueEntry],
    barber_id: &str,
    now: DateTime<Utc>,
) -> Result<Vec<Write>, TransitionError> {
    let eligible = |entry: &&QueueEntry| {
        entry.status == QueueStatus::Waiting && entry.skipped_at.is_none()
    };

    let next = entries
        .iter()
        .filter(eligible)
        .filter(|entry| entry.preferred_barber_id.as_deref() == Some(barber_id))
        .min_by_key(|entry| entry.fifo_key())
        .or_else(|| {
            entries
                .iter()
                .filter(eligible)
                .filter(|entry| entry.preferred_barber_id.is_none())
                .min_by_key(|entry| entry.fifo_key())
        })
        .ok_or(TransitionError::EmptyQueue)?;

    accept(entries, next.id, barber_id.to_string(), now)
}

/// Moves a waiting entry into the holding area.
///
/// Only entries with a preferred barber can be held: an any-barber entry has
/// no barber to group under and would vanish from both display bands, so the
/// mutation is rejected instead of silently accepted.
fn skip(
    entries: &[QueueEntry],
    entry_id: EntryId,
    now: DateTime<Utc>,
) -> Result<Vec<Write>, TransitionError> {
    let target = find_waiting(entries, entry_id)?;
    if target.skipped_at.is_some() {
        return Err(TransitionError::InvalidState(format!(
            "entry {entry_id} is already skipped"
        )));
    }
    if target.preferred_barber_id.is_none() {
        return Err(TransitionError::InvalidState(format!(
            "entry {entry_id} has no preferred barber to wait for"
        )));
    }

    Ok(vec![Write::Update {
        id: target.id,
        patch: EntryPatch {
            skipped_at: Some(Some(now)),
            ..EntryPatch::default()
        },
    }])
}

/// Clears the holding-area marker; `created_at` is untouched, so the entry
/// resumes its exact pre-skip FIFO position.
fn undo_skip(entries: &[QueueEntry], entry_id: EntryId) -> Result<Vec<Write>, TransitionError> {
    let target = find_waiting(entries, entry_id)?;
    if target.skipped_at.is_none() {
        return Err(TransitionError::InvalidState(format!(
            "entry {entry_id} is not currently skipped"
        )));
    }

    Ok(vec![Write::Update {
        id: target.id,
        patch: EntryPatch {
            skipped_at: Some(None),
            ..EntryPatch::default()
        },
    }])
}

/// Re-stamps `called_at` on the active call so viewing surfaces re-announce
/// it. No other field changes.
fn recall(entries: &[QueueEntry], now: DateTime<Utc>) -> Result<Vec<Write>, TransitionError> {
    let current = active_call(entries).ok_or(TransitionError::NoActiveCall)?;

    Ok(vec![Write::Update {
        id: current.id,
        patch: EntryPatch {
            called_at: Some(now),
            ..EntryPatch::default()
        },
    }])
}

/// Terminal transition shared by mark-served and mark-no-show.
///
/// Legal from `waiting` or `called`; a terminal entry is never mutated again.
fn mark_terminal(
    entries: &[QueueEntry],
    entry_id: EntryId,
    status: QueueStatus,
    now: DateTime<Utc>,
) -> Result<Vec<Write>, TransitionError> {
    let target = entries
        .iter()
        .find(|entry| entry.id == entry_id)
        .ok_or(TransitionError::NotFound(entry_id))?;
    if target.status.is_terminal() {
        return Err(TransitionError::AlreadyTerminal(entry_id));
    }

    let served_at = (status == QueueStatus::Served).then_some(now);
    Ok(vec![Write::Update {
        id: target.id,
        patch: EntryPatch {
            status: Some(status),
            served_at,
            ..EntryPatch::default()
        },
    }])
}

/// Re-points (or clears) an entry's preferred barber while it is waiting.
///
/// Clearing the preference on a held entry also clears `skipped_at`: a held
/// entry must always name the barber it is waiting for.
fn assign_preferred(
    entries: &[QueueEntry],
    entry_id: EntryId,
    barber_id: Option<BarberId>,
) -> Result<Vec<Write>, TransitionError> {
    let target = entries
        .iter()
        .find(|entry| entry.id == entry_id)
        .ok_or(TransitionError::NotFound(entry_id))?;
    if target.status.is_terminal() {
        return Err(TransitionError::AlreadyTerminal(entry_id));
    }
    if target.status != QueueStatus::Waiting {
        return Err(TransitionError::InvalidState(format!(
            "entry {entry_id} has already been called"
        )));
    }

    let skipped_at = (barber_id.is_none() && target.skipped_at.is_some()).then_some(None);
    Ok(vec![Write::Update {
        id: target.id,
        patch: EntryPatch {
            preferred_barber_id: Some(barber_id),
            skipped_at,
            ..EntryPatch::default()
        },
    }])
}
