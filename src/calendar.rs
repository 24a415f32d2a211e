use std::fmt;
use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use serde::Serialize;

use crate::date_util::last_day_of_month;
use crate::error::{Error, Result};
use crate::model::Habit;

static RE_MONTH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4})-(\d{1,2})$").expect("month pattern is valid")
});

/// A calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Month {
    year: i32,
    month: u32,
}

impl Month {
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) || NaiveDate::from_ymd_opt(year, month, 1).is_none() {
            return Err(Error::Validation(format!("invalid month: {year}-{month}")));
        }
        Ok(Self { year, month })
    }

    pub fn containing(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Parse a month.
    ///
    /// Supported formats:
    /// - `2024-01` (or `2024-1`)
    /// - `current` / `mtd`: the month containing `today`
    /// - `previous` / `last`: the month before that
    pub fn parse(s: &str, today: NaiveDate) -> Result<Self> {
        let s = s.trim();
        match s.to_lowercase().as_str() {
            "current" | "mtd" => return Ok(Self::containing(today)),
            "previous" | "last" => return Ok(Self::containing(today).previous()),
            _ => {}
        }

        let caps = RE_MONTH
            .captures(s)
            .ok_or_else(|| Error::Validation(format!("unrecognized month: {s}")))?;
        let year: i32 = caps[1]
            .parse()
            .map_err(|_| Error::Validation(format!("invalid year: {s}")))?;
        let month: u32 = caps[2]
            .parse()
            .map_err(|_| Error::Validation(format!("invalid month: {s}")))?;
        Self::new(year, month)
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn previous(&self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    /// First and last day of the month, inclusive.
    pub fn date_range(&self) -> (NaiveDate, NaiveDate) {
        // `new`/`containing` only build months whose first day exists.
        let start = NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN);
        let end = last_day_of_month(self.year, self.month).unwrap_or(start);
        (start, end)
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let (start, end) = self.date_range();
        start.iter_days().take_while(move |d| *d <= end)
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.year, self.month)
    }
}

/// How a single day looks for one habit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DayStatus {
    Future,
    /// Today, not completed yet.
    Today,
    Completed,
    /// Completed, and the previous day was completed too.
    Streak,
    Missed,
}

impl DayStatus {
    pub fn symbol(&self) -> char {
        match self {
            DayStatus::Future => ' ',
            DayStatus::Today => '?',
            DayStatus::Completed => 'o',
            DayStatus::Streak => '#',
            DayStatus::Missed => '.',
        }
    }
}

pub fn day_status(habit: &Habit, date: NaiveDate, today: NaiveDate) -> DayStatus {
    if date > today {
        return DayStatus::Future;
    }
    if habit.is_completed_on(date) {
        if date.pred_opt().is_some_and(|prev| habit.is_completed_on(prev)) {
            DayStatus::Streak
        } else {
            DayStatus::Completed
        }
    } else if date < today {
        DayStatus::Missed
    } else {
        DayStatus::Today
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub status: DayStatus,
}

/// Status of every day of `month` for one habit.
pub fn month_view(habit: &Habit, month: Month, today: NaiveDate) -> Vec<CalendarDay> {
    month
        .days()
        .map(|date| CalendarDay {
            date,
            status: day_status(habit, date, today),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::HabitId;
    use chrono::Utc;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn habit(days: &[NaiveDate]) -> Habit {
        Habit {
            id: HabitId::new("h1"),
            name: "Read".into(),
            description: None,
            category: None,
            created_at: Utc::now(),
            completions: days.iter().copied().collect(),
            streak_count: 0,
        }
    }

    #[test]
    fn test_parse_month() {
        let today = d(2024, 3, 15);
        assert_eq!(Month::parse("2024-01", today).unwrap(), Month::new(2024, 1).unwrap());
        assert_eq!(Month::parse("2024-2", today).unwrap(), Month::new(2024, 2).unwrap());
        assert_eq!(Month::parse("current", today).unwrap(), Month::new(2024, 3).unwrap());
        assert_eq!(Month::parse("MTD", today).unwrap(), Month::new(2024, 3).unwrap());
        assert_eq!(Month::parse("last", d(2024, 1, 5)).unwrap(), Month::new(2023, 12).unwrap());
    }

    #[test]
    fn test_parse_invalid() {
        let today = d(2024, 3, 15);
        assert!(Month::parse("2024-13", today).is_err());
        assert!(Month::parse("2024-00", today).is_err());
        assert!(Month::parse("March", today).is_err());
        assert!(Month::parse("2024", today).is_err());
    }

    #[test]
    fn test_date_range_and_days() {
        let feb = Month::new(2024, 2).unwrap();
        assert_eq!(feb.date_range(), (d(2024, 2, 1), d(2024, 2, 29)));
        assert_eq!(feb.days().count(), 29);
        assert_eq!(feb.to_string(), "2024-02");

        let dec = Month::new(2023, 12).unwrap();
        assert_eq!(dec.date_range(), (d(2023, 12, 1), d(2023, 12, 31)));
    }

    #[test]
    fn test_day_status() {
        let today = d(2024, 1, 4);
        let h = habit(&[d(2024, 1, 1), d(2024, 1, 2), d(2024, 1, 4)]);
        assert_eq!(day_status(&h, d(2024, 1, 1), today), DayStatus::Completed);
        assert_eq!(day_status(&h, d(2024, 1, 2), today), DayStatus::Streak);
        assert_eq!(day_status(&h, d(2024, 1, 3), today), DayStatus::Missed);
        assert_eq!(day_status(&h, d(2024, 1, 4), today), DayStatus::Completed);
        assert_eq!(day_status(&h, d(2024, 1, 5), today), DayStatus::Future);

        let h = habit(&[]);
        assert_eq!(day_status(&h, today, today), DayStatus::Today);
    }

    #[test]
    fn test_streak_spans_month_boundary() {
        let today = d(2024, 2, 10);
        let h = habit(&[d(2024, 1, 31), d(2024, 2, 1)]);
        assert_eq!(day_status(&h, d(2024, 2, 1), today), DayStatus::Streak);
    }

    #[test]
    fn test_month_view() {
        let today = d(2024, 1, 3);
        let h = habit(&[d(2024, 1, 2), d(2024, 1, 3)]);
        let view = month_view(&h, Month::new(2024, 1).unwrap(), today);
        assert_eq!(view.len(), 31);
        let statuses: Vec<DayStatus> = view.iter().take(4).map(|c| c.status).collect();
        assert_eq!(
            statuses,
            vec![
                DayStatus::Missed,
                DayStatus::Completed,
                DayStatus::Streak,
                DayStatus::Future
            ]
        );
    }
}
