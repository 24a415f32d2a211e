use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};

use crate::date_util::{Clock, SystemClock};
use crate::error::{Error, Result};
use crate::model::{HabitId, HabitPatch, NewHabit, UserId};
use crate::storage::repository;
use crate::storage::Database;
use crate::sync::{RemoteCompletion, RemoteHabit, SyncClient};

/// `SyncClient` backed by the local SQLite database.
///
/// Acts as the owner of record: ownership is checked on every mutation and
/// the stored streak is recomputed after every completion change, using the
/// same streak rule as the client.
#[derive(Clone)]
pub struct SqliteSyncClient {
    db: Database,
    clock: Arc<dyn Clock>,
}

/// Result of a completion write, decided inside the database call.
enum CompletionWrite {
    Applied(u32),
    Duplicate,
    UnknownHabit,
}

impl SqliteSyncClient {
    pub fn new(db: Database) -> Self {
        Self::with_clock(db, Arc::new(SystemClock))
    }

    pub fn with_clock(db: Database, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }
}

fn remote<E: fmt::Display>(e: tokio_rusqlite::Error<E>) -> Error {
    Error::Sync(e.to_string())
}

#[async_trait]
impl SyncClient for SqliteSyncClient {
    async fn list_habits(&self, user_id: &UserId) -> Result<Vec<RemoteHabit>> {
        let user_id = user_id.clone();
        let today = self.clock.today();
        self.db
            .writer()
            .call(move |conn| {
                let tx = conn.transaction()?;
                let refreshed = repository::refresh_streaks(&tx, &user_id, today)?;
                if refreshed > 0 {
                    log::debug!("Refreshed {refreshed} stale streaks for {user_id}");
                }
                let habits = repository::list_habits(&tx, &user_id)?;
                tx.commit()?;
                Ok::<_, rusqlite::Error>(habits)
            })
            .await
            .map_err(remote)
    }

    async fn list_completions(&self, user_id: &UserId) -> Result<Vec<RemoteCompletion>> {
        let user_id = user_id.clone();
        self.db
            .reader()
            .call(move |conn| repository::list_completions(conn, &user_id))
            .await
            .map_err(remote)
    }

    async fn insert_habit(&self, user_id: &UserId, habit: &NewHabit) -> Result<RemoteHabit> {
        let habit = habit.normalized()?;
        let row = RemoteHabit {
            id: HabitId::generate(),
            name: habit.name,
            description: habit.description,
            category: habit.category,
            created_at: Utc::now(),
            streak_count: 0,
        };
        self.db
            .writer()
            .call({
                let user_id = user_id.clone();
                let row = row.clone();
                move |conn| repository::insert_habit(conn, &user_id, &row)
            })
            .await
            .map_err(remote)?;
        Ok(row)
    }

    async fn update_habit(
        &self,
        habit_id: &HabitId,
        user_id: &UserId,
        patch: &HabitPatch,
    ) -> Result<RemoteHabit> {
        let patch = patch.normalized()?;
        let updated = self
            .db
            .writer()
            .call({
                let habit_id = habit_id.clone();
                let user_id = user_id.clone();
                move |conn| {
                    let Some(mut habit) = repository::get_habit(conn, &habit_id, &user_id)? else {
                        return Ok::<_, rusqlite::Error>(None);
                    };
                    if let Some(name) = patch.name {
                        habit.name = name;
                    }
                    if let Some(description) = patch.description {
                        habit.description = description;
                    }
                    if let Some(category) = patch.category {
                        habit.category = category;
                    }
                    repository::update_habit_fields(conn, &habit)?;
                    Ok(Some(habit))
                }
            })
            .await
            .map_err(remote)?;
        updated.ok_or_else(|| Error::NotFound(habit_id.to_string()))
    }

    async fn delete_habit(&self, habit_id: &HabitId, user_id: &UserId) -> Result<()> {
        let removed = self
            .db
            .writer()
            .call({
                let habit_id = habit_id.clone();
                let user_id = user_id.clone();
                move |conn| repository::delete_habit(conn, &habit_id, &user_id)
            })
            .await
            .map_err(remote)?;
        if removed {
            Ok(())
        } else {
            Err(Error::NotFound(habit_id.to_string()))
        }
    }

    async fn insert_completion(
        &self,
        habit_id: &HabitId,
        user_id: &UserId,
        date: NaiveDate,
    ) -> Result<()> {
        let today = self.clock.today();
        let outcome = self
            .db
            .writer()
            .call({
                let habit_id = habit_id.clone();
                let user_id = user_id.clone();
                move |conn| {
                    let tx = conn.transaction()?;
                    if !repository::habit_belongs_to(&tx, &habit_id, &user_id)? {
                        return Ok::<_, rusqlite::Error>(CompletionWrite::UnknownHabit);
                    }
                    if !repository::insert_completion(&tx, &habit_id, &user_id, date)? {
                        return Ok(CompletionWrite::Duplicate);
                    }
                    let count = repository::recompute_streak(&tx, &habit_id, today)?;
                    tx.commit()?;
                    Ok(CompletionWrite::Applied(count))
                }
            })
            .await
            .map_err(remote)?;

        match outcome {
            CompletionWrite::Applied(count) => {
                log::debug!("Recorded {habit_id} on {date}; streak now {count}");
                Ok(())
            }
            CompletionWrite::Duplicate => Err(Error::Sync(format!(
                "completion for habit {habit_id} on {date} already exists"
            ))),
            CompletionWrite::UnknownHabit => Err(Error::NotFound(habit_id.to_string())),
        }
    }

    async fn delete_completion(
        &self,
        habit_id: &HabitId,
        user_id: &UserId,
        date: NaiveDate,
    ) -> Result<()> {
        let today = self.clock.today();
        let outcome = self
            .db
            .writer()
            .call({
                let habit_id = habit_id.clone();
                let user_id = user_id.clone();
                move |conn| {
                    let tx = conn.transaction()?;
                    if !repository::habit_belongs_to(&tx, &habit_id, &user_id)? {
                        return Ok::<_, rusqlite::Error>(CompletionWrite::UnknownHabit);
                    }
                    repository::delete_completion(&tx, &habit_id, &user_id, date)?;
                    let count = repository::recompute_streak(&tx, &habit_id, today)?;
                    tx.commit()?;
                    Ok(CompletionWrite::Applied(count))
                }
            })
            .await
            .map_err(remote)?;

        match outcome {
            CompletionWrite::UnknownHabit => Err(Error::NotFound(habit_id.to_string())),
            CompletionWrite::Applied(count) => {
                log::debug!("Cleared {habit_id} on {date}; streak now {count}");
                Ok(())
            }
            CompletionWrite::Duplicate => Ok(()),
        }
    }

    async fn get_streak_count(&self, habit_id: &HabitId) -> Result<u32> {
        let count = self
            .db
            .reader()
            .call({
                let habit_id = habit_id.clone();
                move |conn| repository::get_streak_count(conn, &habit_id)
            })
            .await
            .map_err(remote)?;
        count.ok_or_else(|| Error::NotFound(habit_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date_util::FixedClock;
    use crate::model::Category;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    async fn client(today: NaiveDate) -> SqliteSyncClient {
        let db = Database::open_memory().await.unwrap();
        SqliteSyncClient::with_clock(db, Arc::new(FixedClock(today)))
    }

    #[tokio::test]
    async fn test_insert_habit_starts_at_zero() {
        let c = client(d(2024, 1, 3)).await;
        let user = UserId::new("u1");
        let h = c
            .insert_habit(&user, &NewHabit::new("  Meditate ").category(Category::Mindfulness))
            .await
            .unwrap();
        assert_eq!(h.name, "Meditate");
        assert_eq!(h.streak_count, 0);

        let listed = c.list_habits(&user).await.unwrap();
        assert_eq!(listed, vec![h]);
    }

    #[tokio::test]
    async fn test_newest_habit_listed_first() {
        let c = client(d(2024, 1, 3)).await;
        let user = UserId::new("u1");
        c.insert_habit(&user, &NewHabit::new("First")).await.unwrap();
        c.insert_habit(&user, &NewHabit::new("Second")).await.unwrap();

        let names: Vec<String> = c
            .list_habits(&user)
            .await
            .unwrap()
            .into_iter()
            .map(|h| h.name)
            .collect();
        assert_eq!(names, vec!["Second", "First"]);
    }

    #[tokio::test]
    async fn test_completion_updates_authoritative_streak() {
        let c = client(d(2024, 1, 3)).await;
        let user = UserId::new("u1");
        let h = c.insert_habit(&user, &NewHabit::new("Read")).await.unwrap();

        for day in 1..=3 {
            c.insert_completion(&h.id, &user, d(2024, 1, day)).await.unwrap();
        }
        assert_eq!(c.get_streak_count(&h.id).await.unwrap(), 3);

        c.delete_completion(&h.id, &user, d(2024, 1, 2)).await.unwrap();
        assert_eq!(c.get_streak_count(&h.id).await.unwrap(), 1);

        let completions = c.list_completions(&user).await.unwrap();
        let dates: Vec<NaiveDate> = completions.iter().map(|c| c.date).collect();
        assert_eq!(dates, vec![d(2024, 1, 1), d(2024, 1, 3)]);
    }

    #[tokio::test]
    async fn test_duplicate_completion_rejected() {
        let c = client(d(2024, 1, 3)).await;
        let user = UserId::new("u1");
        let h = c.insert_habit(&user, &NewHabit::new("Read")).await.unwrap();

        c.insert_completion(&h.id, &user, d(2024, 1, 3)).await.unwrap();
        let err = c
            .insert_completion(&h.id, &user, d(2024, 1, 3))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Sync(_)), "got {err:?}");
        assert_eq!(c.list_completions(&user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_other_users_habit_is_not_found() {
        let c = client(d(2024, 1, 3)).await;
        let owner = UserId::new("owner");
        let other = UserId::new("other");
        let h = c.insert_habit(&owner, &NewHabit::new("Read")).await.unwrap();

        assert!(matches!(
            c.insert_completion(&h.id, &other, d(2024, 1, 3)).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            c.delete_habit(&h.id, &other).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            c.update_habit(&h.id, &other, &HabitPatch::default()).await,
            Err(Error::NotFound(_))
        ));
        assert!(c.list_habits(&other).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_habit_patch() {
        let c = client(d(2024, 1, 3)).await;
        let user = UserId::new("u1");
        let h = c
            .insert_habit(
                &user,
                &NewHabit::new("Read")
                    .description("ten pages")
                    .category(Category::Learning),
            )
            .await
            .unwrap();

        let patch = HabitPatch {
            name: Some("Read more".into()),
            description: Some(None),
            category: None,
        };
        let updated = c.update_habit(&h.id, &user, &patch).await.unwrap();
        assert_eq!(updated.name, "Read more");
        assert_eq!(updated.description, None);
        assert_eq!(updated.category, Some(Category::Learning));

        let listed = c.list_habits(&user).await.unwrap();
        assert_eq!(listed[0], updated);
    }

    #[tokio::test]
    async fn test_delete_habit_cascades() {
        let c = client(d(2024, 1, 3)).await;
        let user = UserId::new("u1");
        let h = c.insert_habit(&user, &NewHabit::new("Read")).await.unwrap();
        c.insert_completion(&h.id, &user, d(2024, 1, 3)).await.unwrap();

        c.delete_habit(&h.id, &user).await.unwrap();
        assert!(c.list_habits(&user).await.unwrap().is_empty());
        assert!(c.list_completions(&user).await.unwrap().is_empty());
        assert!(matches!(
            c.get_streak_count(&h.id).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_habits_refreshes_stale_streaks() {
        let db = Database::open_memory().await.unwrap();
        let user = UserId::new("u1");

        let then = SqliteSyncClient::with_clock(db.clone(), Arc::new(FixedClock(d(2024, 1, 3))));
        let h = then.insert_habit(&user, &NewHabit::new("Read")).await.unwrap();
        for day in 1..=3 {
            then.insert_completion(&h.id, &user, d(2024, 1, day)).await.unwrap();
        }
        assert_eq!(then.list_habits(&user).await.unwrap()[0].streak_count, 3);

        let later = SqliteSyncClient::with_clock(db, Arc::new(FixedClock(d(2024, 1, 6))));
        assert_eq!(later.list_habits(&user).await.unwrap()[0].streak_count, 0);
        assert_eq!(later.get_streak_count(&h.id).await.unwrap(), 0);
    }
}
