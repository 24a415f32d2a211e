use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::date_util::{format_date, DATE_FORMAT};
use crate::model::{Category, HabitId, UserId};
use crate::streak::streak;
use crate::sync::{RemoteCompletion, RemoteHabit};

// ── Habits ─────────────────────────────────────────────────────────

const HABIT_COLUMNS: &str =
    "habit_id, name, description, category, created_at, streak_count";

pub fn insert_habit(
    conn: &Connection,
    user_id: &UserId,
    habit: &RemoteHabit,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO habits (
            habit_id, user_id, name, description, category, streak_count, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            habit.id.as_str(),
            user_id.as_str(),
            habit.name,
            habit.description,
            habit.category.map(|c| c.as_str()),
            habit.streak_count,
            format_timestamp(&habit.created_at),
        ],
    )?;
    Ok(())
}

/// Fetch a habit, only if it belongs to `user_id`.
pub fn get_habit(
    conn: &Connection,
    habit_id: &HabitId,
    user_id: &UserId,
) -> Result<Option<RemoteHabit>, rusqlite::Error> {
    conn.query_row(
        &format!("SELECT {HABIT_COLUMNS} FROM habits WHERE habit_id = ?1 AND user_id = ?2"),
        params![habit_id.as_str(), user_id.as_str()],
        habit_from_row,
    )
    .optional()
}

/// All habits of a user, newest first.
pub fn list_habits(conn: &Connection, user_id: &UserId) -> Result<Vec<RemoteHabit>, rusqlite::Error> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {HABIT_COLUMNS} FROM habits WHERE user_id = ?1
         ORDER BY created_at DESC, rowid DESC"
    ))?;
    let rows = stmt.query_map(params![user_id.as_str()], habit_from_row)?;
    rows.collect()
}

/// Overwrite the editable fields (name, description, category) of a habit.
pub fn update_habit_fields(conn: &Connection, habit: &RemoteHabit) -> Result<bool, rusqlite::Error> {
    let changed = conn.execute(
        "UPDATE habits SET name = ?2, description = ?3, category = ?4 WHERE habit_id = ?1",
        params![
            habit.id.as_str(),
            habit.name,
            habit.description,
            habit.category.map(|c| c.as_str()),
        ],
    )?;
    Ok(changed > 0)
}

/// Delete a habit owned by `user_id`. Completions go with it (ON DELETE CASCADE).
/// Returns false when no such habit exists for that user.
pub fn delete_habit(
    conn: &Connection,
    habit_id: &HabitId,
    user_id: &UserId,
) -> Result<bool, rusqlite::Error> {
    let removed = conn.execute(
        "DELETE FROM habits WHERE habit_id = ?1 AND user_id = ?2",
        params![habit_id.as_str(), user_id.as_str()],
    )?;
    Ok(removed > 0)
}

pub fn habit_belongs_to(
    conn: &Connection,
    habit_id: &HabitId,
    user_id: &UserId,
) -> Result<bool, rusqlite::Error> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM habits WHERE habit_id = ?1 AND user_id = ?2",
            params![habit_id.as_str(), user_id.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn get_streak_count(conn: &Connection, habit_id: &HabitId) -> Result<Option<u32>, rusqlite::Error> {
    conn.query_row(
        "SELECT streak_count FROM habits WHERE habit_id = ?1",
        params![habit_id.as_str()],
        |row| row.get(0),
    )
    .optional()
}

// ── Completions ────────────────────────────────────────────────────

/// Record a completion. Returns false if `(habit_id, date)` already existed.
pub fn insert_completion(
    conn: &Connection,
    habit_id: &HabitId,
    user_id: &UserId,
    date: NaiveDate,
) -> Result<bool, rusqlite::Error> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO habit_completions (habit_id, user_id, completed_date)
         VALUES (?1, ?2, ?3)",
        params![habit_id.as_str(), user_id.as_str(), format_date(date)],
    )?;
    Ok(inserted > 0)
}

/// Remove a completion. Returns false if there was nothing to remove.
pub fn delete_completion(
    conn: &Connection,
    habit_id: &HabitId,
    user_id: &UserId,
    date: NaiveDate,
) -> Result<bool, rusqlite::Error> {
    let removed = conn.execute(
        "DELETE FROM habit_completions
         WHERE habit_id = ?1 AND user_id = ?2 AND completed_date = ?3",
        params![habit_id.as_str(), user_id.as_str(), format_date(date)],
    )?;
    Ok(removed > 0)
}

pub fn list_completions(
    conn: &Connection,
    user_id: &UserId,
) -> Result<Vec<RemoteCompletion>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT habit_id, completed_date FROM habit_completions
         WHERE user_id = ?1 ORDER BY habit_id, completed_date",
    )?;
    let rows = stmt.query_map(params![user_id.as_str()], |row| {
        Ok(RemoteCompletion {
            habit_id: HabitId::new(row.get::<_, String>(0)?),
            date: date_from_row(row, 1)?,
        })
    })?;
    rows.collect()
}

pub fn completion_dates(conn: &Connection, habit_id: &HabitId) -> Result<Vec<NaiveDate>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT completed_date FROM habit_completions WHERE habit_id = ?1",
    )?;
    let rows = stmt.query_map(params![habit_id.as_str()], |row| date_from_row(row, 0))?;
    rows.collect()
}

// ── Streaks ────────────────────────────────────────────────────────

/// Recompute and store a habit's streak from its full completion set.
/// Plays the role of a trigger on `habit_completions`.
pub fn recompute_streak(
    conn: &Connection,
    habit_id: &HabitId,
    today: NaiveDate,
) -> Result<u32, rusqlite::Error> {
    let dates = completion_dates(conn, habit_id)?;
    let count = streak(&dates, today);
    conn.execute(
        "UPDATE habits SET streak_count = ?2 WHERE habit_id = ?1",
        params![habit_id.as_str(), count],
    )?;
    Ok(count)
}

/// Bring every stored streak of a user up to date for `today`.
/// Returns how many rows changed.
pub fn refresh_streaks(
    conn: &Connection,
    user_id: &UserId,
    today: NaiveDate,
) -> Result<usize, rusqlite::Error> {
    let habits: Vec<(HabitId, u32)> = {
        let mut stmt =
            conn.prepare("SELECT habit_id, streak_count FROM habits WHERE user_id = ?1")?;
        let rows = stmt.query_map(params![user_id.as_str()], |row| {
            Ok((HabitId::new(row.get::<_, String>(0)?), row.get(1)?))
        })?;
        rows.collect::<Result<_, _>>()?
    };

    let mut changed = 0;
    for (habit_id, stored) in habits {
        let dates = completion_dates(conn, &habit_id)?;
        let count = streak(&dates, today);
        if count != stored {
            conn.execute(
                "UPDATE habits SET streak_count = ?2 WHERE habit_id = ?1",
                params![habit_id.as_str(), count],
            )?;
            changed += 1;
        }
    }
    Ok(changed)
}

// ── Config ─────────────────────────────────────────────────────────

pub fn get_config(conn: &Connection, key: &str) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT value FROM app_config WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub fn set_config(conn: &Connection, key: &str, value: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO app_config (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

pub fn list_config(conn: &Connection) -> Result<Vec<(String, String)>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT key, value FROM app_config ORDER BY key")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}

// ── Row helpers ────────────────────────────────────────────────────

fn habit_from_row(row: &Row<'_>) -> Result<RemoteHabit, rusqlite::Error> {
    let category: Option<String> = row.get(3)?;
    let category = category.and_then(|c| match c.parse::<Category>() {
        Ok(c) => Some(c),
        Err(e) => {
            log::warn!("Ignoring stored category: {e}");
            None
        }
    });
    let created_at: String = row.get(4)?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?
        .with_timezone(&Utc);

    Ok(RemoteHabit {
        id: HabitId::new(row.get::<_, String>(0)?),
        name: row.get(1)?,
        description: row.get(2)?,
        category,
        created_at,
        streak_count: row.get(5)?,
    })
}

fn date_from_row(row: &Row<'_>, idx: usize) -> Result<NaiveDate, rusqlite::Error> {
    let s: String = row.get(idx)?;
    NaiveDate::parse_from_str(&s, DATE_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    // Fixed-width so lexical order in SQL matches chronological order.
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}
