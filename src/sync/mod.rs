pub mod sqlite;

#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{Category, HabitId, HabitPatch, NewHabit, UserId};

pub use sqlite::SqliteSyncClient;

/// A habit row as stored remotely, without its completions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteHabit {
    pub id: HabitId,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<Category>,
    pub created_at: DateTime<Utc>,
    pub streak_count: u32,
}

/// One completed day of one habit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteCompletion {
    pub habit_id: HabitId,
    pub date: NaiveDate,
}

/// The durable owner of record for habits and completions.
///
/// Implementations are responsible for recomputing a habit's streak after
/// every completion mutation; `get_streak_count` returns that authoritative
/// value. Failures should be reported as `Error::Sync` or `Error::Network`
/// (`Error::NotFound` for unknown habits).
#[async_trait]
pub trait SyncClient: Send + Sync {
    /// All habits of the user, newest first.
    async fn list_habits(&self, user_id: &UserId) -> Result<Vec<RemoteHabit>>;

    /// Every completion of every habit of the user.
    async fn list_completions(&self, user_id: &UserId) -> Result<Vec<RemoteCompletion>>;

    /// Create a habit; the returned row has a streak of 0.
    async fn insert_habit(&self, user_id: &UserId, habit: &NewHabit) -> Result<RemoteHabit>;

    async fn update_habit(
        &self,
        habit_id: &HabitId,
        user_id: &UserId,
        patch: &HabitPatch,
    ) -> Result<RemoteHabit>;

    /// Delete a habit and all of its completions.
    async fn delete_habit(&self, habit_id: &HabitId, user_id: &UserId) -> Result<()>;

    /// Record a completion. Fails if `(habit_id, date)` already exists.
    async fn insert_completion(
        &self,
        habit_id: &HabitId,
        user_id: &UserId,
        date: NaiveDate,
    ) -> Result<()>;

    async fn delete_completion(
        &self,
        habit_id: &HabitId,
        user_id: &UserId,
        date: NaiveDate,
    ) -> Result<()>;

    async fn get_streak_count(&self, habit_id: &HabitId) -> Result<u32>;
}
