use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Maximum number of habits on the free plan.
pub const FREE_HABIT_LIMIT: usize = 5;

/// Plan of the current user. Gates habit creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaTier {
    #[default]
    Free,
    Premium,
}

impl QuotaTier {
    /// Habit cap for this tier, `None` when unlimited.
    pub fn limit(&self) -> Option<usize> {
        match self {
            QuotaTier::Free => Some(FREE_HABIT_LIMIT),
            QuotaTier::Premium => None,
        }
    }

    /// How many more habits can be created, `None` when unlimited.
    pub fn remaining(&self, current_count: usize) -> Option<usize> {
        self.limit().map(|l| l.saturating_sub(current_count))
    }
}

impl fmt::Display for QuotaTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuotaTier::Free => write!(f, "free"),
            QuotaTier::Premium => write!(f, "premium"),
        }
    }
}

impl FromStr for QuotaTier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "free" => Ok(QuotaTier::Free),
            "premium" => Ok(QuotaTier::Premium),
            other => Err(Error::Validation(format!(
                "unknown tier '{other}', expected free or premium"
            ))),
        }
    }
}

/// Whether a user on `tier` who already owns `current_count` habits may create another.
pub fn can_create(tier: QuotaTier, current_count: usize) -> bool {
    match tier.limit() {
        Some(limit) => current_count < limit,
        None => true,
    }
}
