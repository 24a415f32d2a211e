pub mod types;

pub use types::*;

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;

use crate::error::{Error, Result};
use crate::model::Habit;
use crate::quota::QuotaTier;

/// Dashboard tab filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HabitFilter {
    #[default]
    All,
    /// Completed today.
    Active,
    /// Not yet completed today.
    Inactive,
}

impl HabitFilter {
    pub fn matches(&self, habit: &Habit, today: NaiveDate) -> bool {
        match self {
            HabitFilter::All => true,
            HabitFilter::Active => habit.is_completed_on(today),
            HabitFilter::Inactive => !habit.is_completed_on(today),
        }
    }

    pub fn apply<'a>(&self, habits: &'a [Habit], today: NaiveDate) -> Vec<&'a Habit> {
        habits.iter().filter(|h| self.matches(h, today)).collect()
    }
}

impl fmt::Display for HabitFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HabitFilter::All => write!(f, "all"),
            HabitFilter::Active => write!(f, "active"),
            HabitFilter::Inactive => write!(f, "inactive"),
        }
    }
}

impl FromStr for HabitFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(HabitFilter::All),
            "active" => Ok(HabitFilter::Active),
            "inactive" => Ok(HabitFilter::Inactive),
            other => Err(Error::Validation(format!(
                "unknown filter '{other}', expected all, active or inactive"
            ))),
        }
    }
}

/// Compute dashboard metrics over a snapshot of habits.
pub fn compute_dashboard(habits: &[Habit], tier: QuotaTier, today: NaiveDate) -> DashboardMetrics {
    DashboardMetrics {
        total_habits: habits.len(),
        completed_today: habits.iter().filter(|h| h.is_completed_on(today)).count(),
        highest_streak: habits.iter().map(|h| h.streak_count).max().unwrap_or(0),
        total_completions: habits.iter().map(|h| h.completions.len()).sum(),
        remaining_slots: tier.remaining(habits.len()),
    }
}

pub fn compute_habit_stats(habit: &Habit, today: NaiveDate) -> HabitStats {
    HabitStats {
        habit_id: habit.id.clone(),
        name: habit.name.clone(),
        category: habit.category,
        streak_count: habit.streak_count,
        total_completions: habit.completions.len(),
        completed_today: habit.is_completed_on(today),
    }
}
