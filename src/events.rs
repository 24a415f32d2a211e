use chrono::NaiveDate;
use serde::Serialize;

use crate::model::HabitId;

/// Capacity of the store's broadcast channel. Slow subscribers that fall
/// further behind than this observe `RecvError::Lagged`.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Change notifications emitted by `HabitStore` after each state transition.
///
/// Subscribe with `HabitStore::subscribe`; dropping the receiver unsubscribes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HabitEvent {
    /// The collection was (re)loaded from the remote store.
    Loaded { count: usize },
    HabitCreated { habit_id: HabitId },
    HabitUpdated { habit_id: HabitId },
    HabitRemoved { habit_id: HabitId },
    /// Optimistic local change applied; the remote write is in flight.
    ToggleStarted {
        habit_id: HabitId,
        date: NaiveDate,
        completed: bool,
        streak_count: u32,
    },
    /// The remote write succeeded and the streak was reconciled.
    ToggleCommitted {
        habit_id: HabitId,
        date: NaiveDate,
        completed: bool,
        streak_count: u32,
    },
    /// The remote write failed and the optimistic change was undone.
    ToggleRolledBack {
        habit_id: HabitId,
        date: NaiveDate,
        error: String,
    },
}

impl HabitEvent {
    pub fn habit_id(&self) -> Option<&HabitId> {
        match self {
            HabitEvent::Loaded { .. } => None,
            HabitEvent::HabitCreated { habit_id }
            | HabitEvent::HabitUpdated { habit_id }
            | HabitEvent::HabitRemoved { habit_id }
            | HabitEvent::ToggleStarted { habit_id, .. }
            | HabitEvent::ToggleCommitted { habit_id, .. }
            | HabitEvent::ToggleRolledBack { habit_id, .. } => Some(habit_id),
        }
    }
}
