use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::NaiveDate;
use tokio::sync::broadcast;

use crate::date_util::{Clock, SystemClock};
use crate::error::{Error, Result};
use crate::events::{HabitEvent, EVENT_CHANNEL_CAPACITY};
use crate::model::{Habit, HabitId, HabitPatch, NewHabit, UserId};
use crate::quota::{self, QuotaTier};
use crate::session::Session;
use crate::sync::SyncClient;
use crate::toggle::{CompletionToggler, ToggleKey, ToggleOutcome, ToggleState};

/// Local view of the user's habits.
pub(crate) struct StoreState {
    /// Newest first.
    pub(crate) habits: Vec<Habit>,
    pub(crate) loading: bool,
    /// Creates that passed the quota check but have not returned yet.
    pub(crate) creating: usize,
    /// Completion writes confirmed by the remote, per habit. A streak read
    /// is only applied if no other write settled after the one it follows.
    pub(crate) settled_writes: HashMap<HabitId, u64>,
}

impl StoreState {
    pub(crate) fn habit_mut(&mut self, habit_id: &HabitId) -> Option<&mut Habit> {
        self.habits.iter_mut().find(|h| &h.id == habit_id)
    }

    fn habit(&self, habit_id: &HabitId) -> Option<&Habit> {
        self.habits.iter().find(|h| &h.id == habit_id)
    }
}

/// A create that passed the quota check. Counts against the quota until
/// released with the outcome of the remote insert.
struct CreateSlot {
    inner: Arc<StoreInner>,
    released: bool,
}

impl CreateSlot {
    fn reserve(inner: &Arc<StoreInner>, tier: QuotaTier) -> Result<Self> {
        let mut state = inner.state();
        let count = state.habits.len() + state.creating;
        if !quota::can_create(tier, count) {
            return Err(Error::QuotaExceeded {
                tier,
                limit: tier.limit().unwrap_or(count),
            });
        }
        state.creating += 1;
        Ok(Self {
            inner: Arc::clone(inner),
            released: false,
        })
    }

    fn release(mut self, state: &mut StoreState) {
        state.creating -= 1;
        self.released = true;
    }
}

impl Drop for CreateSlot {
    fn drop(&mut self) {
        if !self.released {
            self.inner.state().creating -= 1;
        }
    }
}

pub(crate) struct StoreInner {
    pub(crate) client: Arc<dyn SyncClient>,
    pub(crate) session: Arc<dyn Session>,
    pub(crate) clock: Arc<dyn Clock>,
    state: Mutex<StoreState>,
    pub(crate) pending: Mutex<HashSet<ToggleKey>>,
    events: broadcast::Sender<HabitEvent>,
}

impl StoreInner {
    pub(crate) fn state(&self) -> MutexGuard<'_, StoreState> {
        // No lock is held across an await, and every mutation below leaves
        // the state consistent before it can panic, so a poisoned lock is
        // still usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn pending(&self) -> MutexGuard<'_, HashSet<ToggleKey>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn emit(&self, event: HabitEvent) {
        // Sending only fails when nobody is subscribed.
        let _ = self.events.send(event);
    }

    pub(crate) fn require_user(&self) -> Result<UserId> {
        self.session
            .user_id()
            .ok_or_else(|| Error::Auth("no user is signed in".into()))
    }
}

/// Canonical local collection of habits for one user session.
///
/// Every mutation goes through `load`, `create`, `update`, `remove` or
/// `toggle`; each one talks to the `SyncClient` and then emits a
/// `HabitEvent`. Cloning yields another handle to the same store.
#[derive(Clone)]
pub struct HabitStore {
    inner: Arc<StoreInner>,
}

impl HabitStore {
    pub fn new(client: Arc<dyn SyncClient>, session: Arc<dyn Session>) -> Self {
        Self::with_clock(client, session, Arc::new(SystemClock))
    }

    pub fn with_clock(
        client: Arc<dyn SyncClient>,
        session: Arc<dyn Session>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(StoreInner {
                client,
                session,
                clock,
                state: Mutex::new(StoreState {
                    habits: Vec::new(),
                    loading: true,
                    creating: 0,
                    settled_writes: HashMap::new(),
                }),
                pending: Mutex::new(HashSet::new()),
                events,
            }),
        }
    }

    // ── Observers ──────────────────────────────────────────────────

    /// Receive a `HabitEvent` after every state transition.
    /// Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<HabitEvent> {
        self.inner.events.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.events.receiver_count()
    }

    // ── Reads ──────────────────────────────────────────────────────

    /// Snapshot of all habits, newest first.
    pub fn habits(&self) -> Vec<Habit> {
        self.inner.state().habits.clone()
    }

    /// True until the first `load` has finished, successfully or not.
    pub fn loading_habits(&self) -> bool {
        self.inner.state().loading
    }

    pub fn get_by_id(&self, habit_id: &HabitId) -> Option<Habit> {
        self.inner.state().habit(habit_id).cloned()
    }

    pub fn is_completed_on_date(&self, habit_id: &HabitId, date: NaiveDate) -> bool {
        self.inner
            .state()
            .habit(habit_id)
            .is_some_and(|h| h.is_completed_on(date))
    }

    /// Current streak, or 0 for an unknown habit.
    pub fn get_streak(&self, habit_id: &HabitId) -> u32 {
        self.inner
            .state()
            .habit(habit_id)
            .map_or(0, |h| h.streak_count)
    }

    /// Completed days of a habit within `[start, end]`.
    pub fn completions_between(
        &self,
        habit_id: &HabitId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Vec<NaiveDate> {
        if start > end {
            return Vec::new();
        }
        self.inner
            .state()
            .habit(habit_id)
            .map(|h| h.completions.range(start..=end).copied().collect())
            .unwrap_or_default()
    }

    pub fn tier(&self) -> QuotaTier {
        self.inner.session.tier()
    }

    pub fn today(&self) -> NaiveDate {
        self.inner.clock.today()
    }

    pub fn toggle_state(&self, habit_id: &HabitId, date: NaiveDate) -> ToggleState {
        let key = ToggleKey::new(habit_id.clone(), date);
        if self.inner.pending().contains(&key) {
            ToggleState::Pending
        } else {
            ToggleState::Idle
        }
    }

    // ── Mutations ──────────────────────────────────────────────────

    /// Replace the local collection with the remote one.
    pub async fn load(&self) -> Result<Vec<Habit>> {
        let result = self.fetch().await;
        let mut state = self.inner.state();
        state.loading = false;
        let habits = result.inspect_err(|e| log::error!("Failed to load habits: {e}"))?;
        state.habits = habits.clone();
        drop(state);

        log::info!("Loaded {} habits", habits.len());
        self.inner.emit(HabitEvent::Loaded {
            count: habits.len(),
        });
        Ok(habits)
    }

    async fn fetch(&self) -> Result<Vec<Habit>> {
        let user_id = self.inner.require_user()?;
        let remote_habits = self.inner.client.list_habits(&user_id).await?;
        let completions = self.inner.client.list_completions(&user_id).await?;

        let mut by_habit: BTreeMap<HabitId, BTreeSet<NaiveDate>> = BTreeMap::new();
        for c in completions {
            by_habit.entry(c.habit_id).or_default().insert(c.date);
        }

        Ok(remote_habits
            .into_iter()
            .map(|remote| {
                let dates = by_habit.remove(&remote.id).unwrap_or_default();
                Habit::from_remote(remote, dates)
            })
            .collect())
    }

    /// Create a habit, subject to validation and the user's quota.
    ///
    /// The remote insert runs on a spawned task that owns the quota slot, so
    /// a habit the remote accepted is added locally even if the caller stops
    /// waiting.
    pub async fn create(&self, habit: NewHabit) -> Result<Habit> {
        let user_id = self.inner.require_user()?;
        let habit = habit.normalized()?;
        let tier = self.inner.session.tier();

        let slot = CreateSlot::reserve(&self.inner, tier)?;
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let result = inner.client.insert_habit(&user_id, &habit).await;

            let created = {
                let mut state = inner.state();
                slot.release(&mut state);
                let remote =
                    result.inspect_err(|e| log::error!("Failed to create habit: {e}"))?;
                let created = Habit::from_remote(remote, BTreeSet::new());
                state.habits.insert(0, created.clone());
                created
            };

            log::info!("Created habit {} ({})", created.id, created.name);
            inner.emit(HabitEvent::HabitCreated {
                habit_id: created.id.clone(),
            });
            Ok::<_, Error>(created)
        });

        task.await
            .map_err(|e| Error::Sync(format!("create task did not finish: {e}")))?
    }

    /// Change a habit's name, description or category.
    pub async fn update(&self, habit_id: &HabitId, patch: HabitPatch) -> Result<Habit> {
        let user_id = self.inner.require_user()?;
        let patch = patch.normalized()?;
        if self.inner.state().habit(habit_id).is_none() {
            return Err(Error::NotFound(habit_id.to_string()));
        }
        if patch.is_empty() {
            return self
                .get_by_id(habit_id)
                .ok_or_else(|| Error::NotFound(habit_id.to_string()));
        }

        let remote = self
            .inner
            .client
            .update_habit(habit_id, &user_id, &patch)
            .await?;

        let updated = {
            let mut state = self.inner.state();
            let habit = state
                .habit_mut(habit_id)
                .ok_or_else(|| Error::NotFound(habit_id.to_string()))?;
            habit.name = remote.name;
            habit.description = remote.description;
            habit.category = remote.category;
            habit.clone()
        };

        log::info!("Updated habit {habit_id}");
        self.inner.emit(HabitEvent::HabitUpdated {
            habit_id: habit_id.clone(),
        });
        Ok(updated)
    }

    /// Delete a habit and its completions. The local copy is removed only
    /// after the remote store confirms.
    pub async fn remove(&self, habit_id: &HabitId) -> Result<()> {
        let user_id = self.inner.require_user()?;
        if self.inner.state().habit(habit_id).is_none() {
            return Err(Error::NotFound(habit_id.to_string()));
        }

        self.inner
            .client
            .delete_habit(habit_id, &user_id)
            .await
            .inspect_err(|e| log::error!("Failed to remove habit {habit_id}: {e}"))?;

        {
            let mut state = self.inner.state();
            state.habits.retain(|h| &h.id != habit_id);
            state.settled_writes.remove(habit_id);
        }
        log::info!("Removed habit {habit_id}");
        self.inner.emit(HabitEvent::HabitRemoved {
            habit_id: habit_id.clone(),
        });
        Ok(())
    }

    /// Flip completion of `habit_id` on `date`. See `CompletionToggler`.
    pub async fn toggle(&self, habit_id: &HabitId, date: NaiveDate) -> Result<ToggleOutcome> {
        CompletionToggler::new(Arc::clone(&self.inner))
            .toggle(habit_id.clone(), date)
            .await
    }
}
