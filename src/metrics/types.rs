use serde::Serialize;

use crate::model::{Category, HabitId};

/// Summary across all habits of the user, as shown on a dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DashboardMetrics {
    pub total_habits: usize,
    pub completed_today: usize,
    pub highest_streak: u32,
    pub total_completions: usize,
    /// Habits that can still be created on the current plan; `None` when unlimited.
    pub remaining_slots: Option<usize>,
}

/// Per-habit figures for a detail view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HabitStats {
    pub habit_id: HabitId,
    pub name: String,
    pub category: Option<Category>,
    pub streak_count: u32,
    pub total_completions: usize,
    pub completed_today: bool,
}
