use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::events::HabitEvent;
use crate::model::{Habit, HabitId, UserId};
use crate::store::StoreInner;
use crate::streak::streak;

/// Lifecycle of one toggle: `Idle -> Pending -> {Committed, RolledBack} -> Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToggleState {
    Idle,
    Pending,
    Committed,
    RolledBack,
}

/// At most one toggle per key may be pending.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct ToggleKey {
    habit_id: HabitId,
    date: NaiveDate,
}

impl ToggleKey {
    pub(crate) fn new(habit_id: HabitId, date: NaiveDate) -> Self {
        Self { habit_id, date }
    }
}

/// Result of a committed toggle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToggleOutcome {
    pub habit_id: HabitId,
    pub date: NaiveDate,
    /// Whether the habit is now completed on `date`.
    pub completed: bool,
    /// Streak held locally once the toggle settled: the remote count, or a
    /// local recount if another write to the habit settled in between.
    pub streak_count: u32,
    pub state: ToggleState,
}

/// Local state captured before the optimistic change, for rollback.
#[derive(Debug, Clone, Copy)]
struct Snapshot {
    was_completed: bool,
    prior_streak: u32,
    optimistic_streak: u32,
}

/// Claim on a key in the pending set, released on drop.
struct PendingGuard {
    store: Arc<StoreInner>,
    key: ToggleKey,
}

impl PendingGuard {
    fn claim(store: &Arc<StoreInner>, key: ToggleKey) -> Result<Self> {
        let mut pending = store.pending();
        if !pending.insert(key.clone()) {
            return Err(Error::Conflict {
                habit_id: key.habit_id.to_string(),
                date: key.date,
            });
        }
        Ok(Self {
            store: Arc::clone(store),
            key,
        })
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.store.pending().remove(&self.key);
    }
}

/// Runs a single completion toggle against the store.
///
/// 1. Flip membership of the date locally and recompute the streak so the
///    change is visible immediately.
/// 2. Write the completion (insert or delete) remotely.
/// 3. On success, overwrite the local streak with the remote's count.
/// 4. On failure, restore the previous membership and streak.
///
/// Steps 2-4 run on a spawned task that owns the pending claim, so the
/// store is reconciled or rolled back even if the caller stops waiting.
pub struct CompletionToggler {
    store: Arc<StoreInner>,
}

impl CompletionToggler {
    pub(crate) fn new(store: Arc<StoreInner>) -> Self {
        Self { store }
    }

    pub async fn toggle(&self, habit_id: HabitId, date: NaiveDate) -> Result<ToggleOutcome> {
        let user_id = self.store.require_user()?;
        let today = self.store.clock.today();
        if date > today {
            return Err(Error::Validation(format!(
                "cannot toggle {date}: it is after today ({today})"
            )));
        }

        let key = ToggleKey::new(habit_id, date);
        let guard = PendingGuard::claim(&self.store, key.clone())?;
        let snapshot = self.apply_optimistic(&key, today)?;
        log::debug!(
            "Toggle {} on {} pending (completed={})",
            key.habit_id,
            key.date,
            !snapshot.was_completed
        );
        self.store.emit(HabitEvent::ToggleStarted {
            habit_id: key.habit_id.clone(),
            date: key.date,
            completed: !snapshot.was_completed,
            streak_count: snapshot.optimistic_streak,
        });

        let store = Arc::clone(&self.store);
        let task = tokio::spawn(async move {
            let (result, event) = settle(&store, &user_id, &key, snapshot, today).await;
            drop(guard);
            store.emit(event);
            result
        });

        task.await
            .map_err(|e| Error::Sync(format!("toggle task did not finish: {e}")))?
    }

    /// Step 1. Fails with `NotFound` (releasing the claim) for unknown habits.
    fn apply_optimistic(&self, key: &ToggleKey, today: NaiveDate) -> Result<Snapshot> {
        let mut state = self.store.state();
        let habit = state
            .habit_mut(&key.habit_id)
            .ok_or_else(|| Error::NotFound(key.habit_id.to_string()))?;

        let was_completed = habit.completions.contains(&key.date);
        if was_completed {
            habit.completions.remove(&key.date);
        } else {
            habit.completions.insert(key.date);
        }
        let prior_streak = habit.streak_count;
        habit.streak_count = streak(&habit.completions, today);

        Ok(Snapshot {
            was_completed,
            prior_streak,
            optimistic_streak: habit.streak_count,
        })
    }
}

/// Steps 2-4. Returns the caller's result and the event to publish once the
/// key is back to idle.
async fn settle(
    store: &StoreInner,
    user_id: &UserId,
    key: &ToggleKey,
    snapshot: Snapshot,
    today: NaiveDate,
) -> (Result<ToggleOutcome>, HabitEvent) {
    let completed = !snapshot.was_completed;
    let write = if completed {
        store
            .client
            .insert_completion(&key.habit_id, user_id, key.date)
            .await
    } else {
        store
            .client
            .delete_completion(&key.habit_id, user_id, key.date)
            .await
    };

    if let Err(e) = write {
        log::warn!(
            "Toggle {} on {} failed, rolling back: {e}",
            key.habit_id,
            key.date
        );
        rollback(store, key, snapshot, today);
        let event = HabitEvent::ToggleRolledBack {
            habit_id: key.habit_id.clone(),
            date: key.date,
            error: e.to_string(),
        };
        return (Err(e), event);
    }

    let seq = record_write(store, key, completed);
    let read = store.client.get_streak_count(&key.habit_id).await;
    let streak_count = reconcile(store, key, completed, seq, read.as_ref().ok().copied(), today);

    let event = HabitEvent::ToggleCommitted {
        habit_id: key.habit_id.clone(),
        date: key.date,
        completed,
        streak_count,
    };
    match read {
        Ok(_) => {
            log::debug!(
                "Toggle {} on {} committed, streak {streak_count}",
                key.habit_id,
                key.date
            );
            let outcome = ToggleOutcome {
                habit_id: key.habit_id.clone(),
                date: key.date,
                completed,
                streak_count,
                state: ToggleState::Committed,
            };
            (Ok(outcome), event)
        }
        Err(e) => {
            // The write is durable, so the new membership stays; only the
            // streak is computed locally.
            log::warn!(
                "Toggle {} on {} committed but streak refresh failed: {e}",
                key.habit_id,
                key.date
            );
            (Err(e), event)
        }
    }
}

/// Note a confirmed completion write and make the local membership match it.
/// A `load` that ran while the write was in flight may have dropped it.
/// Returns the habit's write sequence number after this write.
fn record_write(store: &StoreInner, key: &ToggleKey, completed: bool) -> u64 {
    let mut state = store.state();
    let seq = state
        .settled_writes
        .entry(key.habit_id.clone())
        .or_default();
    *seq += 1;
    let seq = *seq;
    if let Some(habit) = state.habit_mut(&key.habit_id) {
        set_membership(habit, key.date, completed);
    }
    seq
}

/// Apply the committed membership and settle the local streak. The remote
/// count is used only if no later write of the same habit has settled since
/// `seq`; otherwise it may predate that write and the streak is recomputed.
fn reconcile(
    store: &StoreInner,
    key: &ToggleKey,
    completed: bool,
    seq: u64,
    remote_count: Option<u32>,
    today: NaiveDate,
) -> u32 {
    let mut state = store.state();
    let latest = state.settled_writes.get(&key.habit_id).copied() == Some(seq);
    let Some(habit) = state.habit_mut(&key.habit_id) else {
        return remote_count.unwrap_or(0);
    };
    set_membership(habit, key.date, completed);
    habit.streak_count = match remote_count {
        Some(count) if latest => count,
        _ => streak(&habit.completions, today),
    };
    habit.streak_count
}

fn set_membership(habit: &mut Habit, date: NaiveDate, completed: bool) {
    if completed {
        habit.completions.insert(date);
    } else {
        habit.completions.remove(&date);
    }
}

fn rollback(store: &StoreInner, key: &ToggleKey, snapshot: Snapshot, today: NaiveDate) {
    let mut state = store.state();
    let Some(habit) = state.habit_mut(&key.habit_id) else {
        return;
    };
    set_membership(habit, key.date, snapshot.was_completed);
    // Another date of the same habit may have been toggled meanwhile; only
    // restore the old number if nobody else has touched it.
    habit.streak_count = if habit.streak_count == snapshot.optimistic_streak {
        snapshot.prior_streak
    } else {
        streak(&habit.completions, today)
    };
}
