//! Reminder model, patch input and validation.
//!
//! # Invariants
//! - `mode == Repeat` implies `recurring_mode` is present.
//! - `selected_days` holds weekdays 0–6 for weekly recurrence and
//!   days-of-month 1–31 for monthly recurrence; it is ignored otherwise.
//! - A `Once` reminder never fires again after its anchor passes.

use super::{ItemId, Patch, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderMode {
    Once,
    Repeat,
}

impl ReminderMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Once => "once",
            Self::Repeat => "repeat",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "once" => Some(Self::Once),
            "repeat" => Some(Self::Repeat),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurringMode {
    Day,
    Week,
    Month,
    Year,
}

impl RecurringMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Year => "year",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "day" => Some(Self::Day),
            "week" => Some(Self::Week),
            "month" => Some(Self::Month),
            "year" => Some(Self::Year),
            _ => None,
        }
    }
}

impl Display for RecurringMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    pub id: ItemId,
    pub title: String,
    pub description: Option<String>,
    pub mode: ReminderMode,
    /// Epoch-ms anchor; carries the time-of-day for recurring reminders.
    pub date: i64,
    pub recurring_mode: Option<RecurringMode>,
    pub selected_days: Vec<u32>,
    pub disabled: bool,
    pub date_created: i64,
    pub date_modified: i64,
}

impl Reminder {
    /// Validates the mode/recurrence shape.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::EmptyTitle(super::ItemType::Reminder));
        }
        let recurring = match (self.mode, self.recurring_mode) {
            (ReminderMode::Repeat, None) => return Err(ValidationError::MissingRecurringMode),
            (ReminderMode::Once, _) => return Ok(()),
            (ReminderMode::Repeat, Some(mode)) => mode,
        };
        for &day in &self.selected_days {
            let valid = match recurring {
                RecurringMode::Week => day <= 6,
                RecurringMode::Month => (1..=31).contains(&day),
                RecurringMode::Day | RecurringMode::Year => true,
            };
            if !valid {
                return Err(ValidationError::InvalidSelectedDay {
                    mode: recurring,
                    day,
                });
            }
        }
        Ok(())
    }
}

/// Field-level patch for `Reminders::add`.
#[derive(Debug, Clone, Default)]
pub struct ReminderPatch {
    pub id: Option<ItemId>,
    pub title: Option<String>,
    pub description: Patch<String>,
    pub mode: Option<ReminderMode>,
    pub date: Option<i64>,
    pub recurring_mode: Patch<RecurringMode>,
    pub selected_days: Option<Vec<u32>>,
    pub disabled: Option<bool>,
}
