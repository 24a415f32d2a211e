use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::sync::RemoteHabit;

/// Opaque habit identifier assigned by the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HabitId(String);

impl HabitId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A fresh random identifier (uuid v4).
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HabitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for HabitId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Opaque identifier of the authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Fitness,
    Health,
    Productivity,
    Finance,
    Personal,
    Learning,
    Mindfulness,
    Social,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Fitness,
        Category::Health,
        Category::Productivity,
        Category::Finance,
        Category::Personal,
        Category::Learning,
        Category::Mindfulness,
        Category::Social,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Fitness => "fitness",
            Category::Health => "health",
            Category::Productivity => "productivity",
            Category::Finance => "finance",
            Category::Personal => "personal",
            Category::Learning => "learning",
            Category::Mindfulness => "mindfulness",
            Category::Social => "social",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = Category::ALL.iter().map(|c| c.as_str()).collect();
                Error::Validation(format!(
                    "unknown category '{}', expected one of: {}",
                    s.trim(),
                    known.join(", ")
                ))
            })
    }
}

/// A habit as held by the local store, with its full completion set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Habit {
    pub id: HabitId,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<Category>,
    pub created_at: DateTime<Utc>,
    pub completions: BTreeSet<NaiveDate>,
    /// Derived from `completions`; may be stale while a toggle is in flight.
    pub streak_count: u32,
}

impl Habit {
    pub fn from_remote(remote: RemoteHabit, completions: BTreeSet<NaiveDate>) -> Self {
        Self {
            id: remote.id,
            name: remote.name,
            description: remote.description,
            category: remote.category,
            created_at: remote.created_at,
            completions,
            streak_count: remote.streak_count,
        }
    }

    pub fn is_completed_on(&self, date: NaiveDate) -> bool {
        self.completions.contains(&date)
    }
}

/// Input for habit creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewHabit {
    pub name: String,
    pub description: Option<String>,
    pub category: Option<Category>,
}

impl NewHabit {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    /// Trim the name and description, rejecting an empty name.
    /// A blank description becomes `None`.
    pub fn normalized(&self) -> Result<Self, Error> {
        Ok(Self {
            name: normalize_name(&self.name)?,
            description: normalize_description(self.description.as_deref()),
            category: self.category,
        })
    }
}

/// Partial update of a habit. `None` leaves a field unchanged; for the
/// optional fields `Some(None)` clears the value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HabitPatch {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub category: Option<Option<Category>>,
}

impl HabitPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.category.is_none()
    }

    pub fn normalized(&self) -> Result<Self, Error> {
        let name = match &self.name {
            Some(n) => Some(normalize_name(n)?),
            None => None,
        };
        let description = self
            .description
            .as_ref()
            .map(|d| normalize_description(d.as_deref()));
        Ok(Self {
            name,
            description,
            category: self.category,
        })
    }
}

fn normalize_name(name: &str) -> Result<String, Error> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::Validation("habit name cannot be empty".into()));
    }
    Ok(name.to_string())
}

fn normalize_description(description: Option<&str>) -> Option<String> {
    description
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_parse() {
        assert_eq!("fitness".parse::<Category>().unwrap(), Category::Fitness);
        assert_eq!(" Mindfulness".parse::<Category>().unwrap(), Category::Mindfulness);
        let err = "cooking".parse::<Category>().unwrap_err();
        assert!(err.to_string().contains("cooking"));
    }

    #[test]
    fn test_category_round_trips_through_display() {
        for c in Category::ALL {
            assert_eq!(c.to_string().parse::<Category>().unwrap(), c);
        }
    }

    #[test]
    fn test_new_habit_normalized() {
        let h = NewHabit::new("  Read  ").description("   ").normalized().unwrap();
        assert_eq!(h.name, "Read");
        assert_eq!(h.description, None);

        let h = NewHabit::new("Run").description(" 5k ").normalized().unwrap();
        assert_eq!(h.description.as_deref(), Some("5k"));
    }

    #[test]
    fn test_new_habit_rejects_blank_name() {
        assert!(matches!(
            NewHabit::new(" \t ").normalized(),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_patch_normalized() {
        let patch = HabitPatch {
            name: Some(" Walk ".into()),
            description: Some(Some("  ".into())),
            category: Some(None),
        };
        let p = patch.normalized().unwrap();
        assert_eq!(p.name.as_deref(), Some("Walk"));
        assert_eq!(p.description, Some(None));
        assert_eq!(p.category, Some(None));

        let bad = HabitPatch {
            name: Some("".into()),
            ..Default::default()
        };
        assert!(bad.normalized().is_err());
        assert!(HabitPatch::default().is_empty());
    }

    #[test]
    fn test_habit_serializes_dates_as_iso_strings() {
        let habit = Habit {
            id: HabitId::new("h1"),
            name: "Read".into(),
            description: None,
            category: Some(Category::Learning),
            created_at: DateTime::parse_from_rfc3339("2024-01-01T08:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            completions: [NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()].into(),
            streak_count: 1,
        };
        let json = serde_json::to_value(&habit).unwrap();
        assert_eq!(json["id"], "h1");
        assert_eq!(json["category"], "learning");
        assert_eq!(json["completions"][0], "2024-01-02");
    }
}
