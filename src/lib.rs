pub mod calendar;
pub mod date_util;
pub mod error;
pub mod events;
pub mod metrics;
pub mod model;
pub mod quota;
pub mod session;
pub mod storage;
pub mod store;
pub mod streak;
pub mod sync;
pub mod toggle;

pub use calendar::{CalendarDay, DayStatus, Month};
pub use date_util::{Clock, FixedClock, SystemClock};
pub use error::{Error, Result};
pub use events::HabitEvent;
pub use metrics::{DashboardMetrics, HabitFilter, HabitStats};
pub use model::{Category, Habit, HabitId, HabitPatch, NewHabit, UserId};
pub use quota::{can_create, QuotaTier, FREE_HABIT_LIMIT};
pub use session::{Session, StaticSession};
pub use storage::Database;
pub use store::HabitStore;
pub use streak::streak;
pub use sync::{RemoteCompletion, RemoteHabit, SqliteSyncClient, SyncClient};
pub use toggle::{ToggleOutcome, ToggleState};

use std::sync::Arc;

use storage::repository;

/// Config key holding the signed-in user id.
pub const CONFIG_USER_ID: &str = "user_id";
/// Config key holding the plan (`free` or `premium`).
pub const CONFIG_TIER: &str = "tier";

const KNOWN_CONFIG_KEYS: &[&str] = &[CONFIG_USER_ID, CONFIG_TIER];

/// Main entry point: a local database plus the configuration stored in it.
pub struct HabitTracker {
    db: Database,
    clock: Arc<dyn Clock>,
}

impl HabitTracker {
    pub fn new(db: Database) -> Self {
        Self::with_clock(db, Arc::new(SystemClock))
    }

    pub fn with_clock(db: Database, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Access the database (for direct queries in the CLI).
    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn today(&self) -> chrono::NaiveDate {
        self.clock.today()
    }

    // ── User identity ────────────────────────────────────────────

    /// Return the configured user id, generating and storing one on first use.
    pub async fn ensure_user_id(&self) -> Result<UserId> {
        if let Some(id) = self.config_get(CONFIG_USER_ID).await? {
            return Ok(UserId::new(id));
        }

        let id = uuid::Uuid::new_v4().to_string();
        self.config_set(CONFIG_USER_ID, &id).await?;
        log::info!("Generated user id {id}");
        Ok(UserId::new(id))
    }

    /// Build the session from stored configuration. Without a `user_id`
    /// the session is anonymous and store operations fail with `Error::Auth`.
    pub async fn session(&self) -> Result<StaticSession> {
        let tier = match self.config_get(CONFIG_TIER).await? {
            Some(t) => t.parse::<QuotaTier>()?,
            None => QuotaTier::default(),
        };
        Ok(match self.config_get(CONFIG_USER_ID).await? {
            Some(id) => StaticSession::new(UserId::new(id), tier),
            None => StaticSession::anonymous(),
        })
    }

    /// A store for the configured user, backed by this database.
    pub async fn store(&self) -> Result<HabitStore> {
        let session = self.session().await?;
        let client = SqliteSyncClient::with_clock(self.db.clone(), Arc::clone(&self.clock));
        Ok(HabitStore::with_clock(
            Arc::new(client),
            Arc::new(session),
            Arc::clone(&self.clock),
        ))
    }

    // ── Config commands ────────────────────────────────────────────

    pub async fn config_get(&self, key: &str) -> Result<Option<String>> {
        self.db
            .reader()
            .call({
                let key = key.to_string();
                move |conn| repository::get_config(conn, &key)
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    pub async fn config_set(&self, key: &str, value: &str) -> Result<()> {
        let mut value = value.trim().to_string();
        match key {
            CONFIG_TIER => {
                value = value.parse::<QuotaTier>()?.to_string();
            }
            CONFIG_USER_ID if value.is_empty() => {
                return Err(Error::Config("user_id cannot be empty".into()));
            }
            k if !KNOWN_CONFIG_KEYS.contains(&k) => {
                return Err(Error::Config(format!(
                    "unknown config key '{k}', expected one of: {}",
                    KNOWN_CONFIG_KEYS.join(", ")
                )));
            }
            _ => {}
        }

        self.db
            .writer()
            .call({
                let key = key.to_string();
                move |conn| repository::set_config(conn, &key, &value)
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    pub async fn config_list(&self) -> Result<Vec<(String, String)>> {
        self.db
            .reader()
            .call(|conn| repository::list_config(conn))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }
}
