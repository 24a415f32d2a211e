//! Fault-injecting `SyncClient` wrapper for store and toggle tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Semaphore;

use crate::date_util::FixedClock;
use crate::error::{Error, Result};
use crate::model::{HabitId, HabitPatch, NewHabit, UserId};
use crate::storage::Database;
use crate::sync::{RemoteCompletion, RemoteHabit, SqliteSyncClient, SyncClient};

pub(crate) struct FaultyClient {
    inner: SqliteSyncClient,
    pub fail_list: AtomicBool,
    pub fail_insert_habit: AtomicBool,
    pub fail_delete_habit: AtomicBool,
    pub fail_completion_writes: AtomicBool,
    pub fail_streak: AtomicBool,
    /// When set, completion writes wait for a permit before proceeding.
    gate: Option<Arc<Semaphore>>,
    /// When set, habit inserts wait for a permit before proceeding.
    create_gate: Option<Arc<Semaphore>>,
    /// While `hold_streak` is on, a streak read completes remotely and then
    /// waits for a permit here before returning its value.
    streak_gate: Arc<Semaphore>,
    pub hold_streak: AtomicBool,
    pub completion_writes: AtomicUsize,
    pub habit_inserts: AtomicUsize,
    pub streak_reads: AtomicUsize,
    pub remote_calls: AtomicUsize,
}

impl FaultyClient {
    pub async fn new(today: NaiveDate) -> Self {
        let db = Database::open_memory().await.unwrap();
        Self {
            inner: SqliteSyncClient::with_clock(db, Arc::new(FixedClock(today))),
            fail_list: AtomicBool::new(false),
            fail_insert_habit: AtomicBool::new(false),
            fail_delete_habit: AtomicBool::new(false),
            fail_completion_writes: AtomicBool::new(false),
            fail_streak: AtomicBool::new(false),
            gate: None,
            create_gate: None,
            streak_gate: Arc::new(Semaphore::new(0)),
            hold_streak: AtomicBool::new(false),
            completion_writes: AtomicUsize::new(0),
            habit_inserts: AtomicUsize::new(0),
            streak_reads: AtomicUsize::new(0),
            remote_calls: AtomicUsize::new(0),
        }
    }

    /// Hold every completion write until `release` is called.
    pub async fn gated(today: NaiveDate) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let mut client = Self::new(today).await;
        client.gate = Some(Arc::clone(&gate));
        (client, gate)
    }

    /// Hold every habit insert until a permit is added.
    pub async fn create_gated(today: NaiveDate) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let mut client = Self::new(today).await;
        client.create_gate = Some(Arc::clone(&gate));
        (client, gate)
    }

    /// Permits for streak reads started while `hold_streak` was on.
    pub fn streak_gate(&self) -> Arc<Semaphore> {
        Arc::clone(&self.streak_gate)
    }

    pub fn inner(&self) -> &SqliteSyncClient {
        &self.inner
    }

    pub fn set(flag: &AtomicBool, on: bool) {
        flag.store(on, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.remote_calls.load(Ordering::SeqCst)
    }

    fn check(&self, flag: &AtomicBool) -> Result<()> {
        self.remote_calls.fetch_add(1, Ordering::SeqCst);
        if flag.load(Ordering::SeqCst) {
            Err(Error::Network("connection reset".into()))
        } else {
            Ok(())
        }
    }

    async fn completion_write(&self) -> Result<()> {
        self.completion_writes.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            pass(gate).await?;
        }
        self.check(&self.fail_completion_writes)
    }
}

async fn pass(gate: &Semaphore) -> Result<()> {
    gate.acquire()
        .await
        .map_err(|e| Error::Network(e.to_string()))?
        .forget();
    Ok(())
}

#[async_trait]
impl SyncClient for FaultyClient {
    async fn list_habits(&self, user_id: &UserId) -> Result<Vec<RemoteHabit>> {
        self.check(&self.fail_list)?;
        self.inner.list_habits(user_id).await
    }

    async fn list_completions(&self, user_id: &UserId) -> Result<Vec<RemoteCompletion>> {
        self.check(&self.fail_list)?;
        self.inner.list_completions(user_id).await
    }

    async fn insert_habit(&self, user_id: &UserId, habit: &NewHabit) -> Result<RemoteHabit> {
        self.habit_inserts.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.create_gate {
            pass(gate).await?;
        }
        self.check(&self.fail_insert_habit)?;
        self.inner.insert_habit(user_id, habit).await
    }

    async fn update_habit(
        &self,
        habit_id: &HabitId,
        user_id: &UserId,
        patch: &HabitPatch,
    ) -> Result<RemoteHabit> {
        self.remote_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.update_habit(habit_id, user_id, patch).await
    }

    async fn delete_habit(&self, habit_id: &HabitId, user_id: &UserId) -> Result<()> {
        self.check(&self.fail_delete_habit)?;
        self.inner.delete_habit(habit_id, user_id).await
    }

    async fn insert_completion(
        &self,
        habit_id: &HabitId,
        user_id: &UserId,
        date: NaiveDate,
    ) -> Result<()> {
        self.completion_write().await?;
        self.inner.insert_completion(habit_id, user_id, date).await
    }

    async fn delete_completion(
        &self,
        habit_id: &HabitId,
        user_id: &UserId,
        date: NaiveDate,
    ) -> Result<()> {
        self.completion_write().await?;
        self.inner.delete_completion(habit_id, user_id, date).await
    }

    async fn get_streak_count(&self, habit_id: &HabitId) -> Result<u32> {
        let hold = self.hold_streak.load(Ordering::SeqCst);
        self.check(&self.fail_streak)?;
        let count = self.inner.get_streak_count(habit_id).await;
        self.streak_reads.fetch_add(1, Ordering::SeqCst);
        if hold {
            pass(&self.streak_gate).await?;
        }
        count
    }
}
