//! Recurrence engine: next-trigger arithmetic for reminders.
//!
//! # Responsibility
//! - Compute a reminder's next trigger timestamp from a reference "now",
//!   as a pure function for single-row callers.
//! - Expose the same computation to SQL scans as a registered scalar
//!   function, so "due before T" queries evaluate natively without loading
//!   every row.
//!
//! # Invariants
//! - Both entry points call one shared core; they cannot diverge.
//! - All arithmetic is UTC; the anchor timestamp carries the time-of-day.
//! - A month shorter than a selected day-of-month skips that occurrence; it
//!   is never clamped to the month's last day.

use crate::model::{RecurringMode, Reminder, ReminderMode};
use chrono::{DateTime, Datelike, Days, Months, NaiveTime, TimeZone, Utc};
use rusqlite::functions::FunctionFlags;
use rusqlite::Connection;

/// SQL name of the registered scalar function.
pub const NEXT_TRIGGER_FN: &str = "reminder_next_trigger";

/// Returns the next trigger time for `reminder` strictly after `now_ms`, or
/// `None` if it can never fire again.
pub fn next_trigger(reminder: &Reminder, now_ms: i64) -> Option<i64> {
    next_trigger_raw(
        reminder.mode,
        reminder.date,
        reminder.recurring_mode,
        &reminder.selected_days,
        reminder.disabled,
        now_ms,
    )
}

/// Field-level form of [`next_trigger`], shared with the SQL function.
pub fn next_trigger_raw(
    mode: ReminderMode,
    anchor_ms: i64,
    recurring_mode: Option<RecurringMode>,
    selected_days: &[u32],
    disabled: bool,
    now_ms: i64,
) -> Option<i64> {
    if disabled {
        return None;
    }
    match mode {
        ReminderMode::Once => (anchor_ms > now_ms).then_some(anchor_ms),
        ReminderMode::Repeat => {
            let recurring = recurring_mode?;
            let now = Utc.timestamp_millis_opt(now_ms).single()?;
            let anchor = Utc.timestamp_millis_opt(anchor_ms).single()?;
            let time_of_day = anchor.time();
            match recurring {
                RecurringMode::Day => next_daily(now, time_of_day),
                RecurringMode::Week => {
                    let mut days: Vec<u32> =
                        selected_days.iter().copied().filter(|&d| d <= 6).collect();
                    days.sort_unstable();
                    days.dedup();
                    if days.is_empty() {
                        // An empty weekday selection behaves like a daily reminder.
                        next_daily(now, time_of_day)
                    } else {
                        next_weekly(now, time_of_day, &days)
                    }
                }
                RecurringMode::Month => {
                    let mut days: Vec<u32> = selected_days
                        .iter()
                        .copied()
                        .filter(|&d| (1..=31).contains(&d))
                        .collect();
                    days.sort_unstable();
                    days.dedup();
                    if days.is_empty() {
                        days.push(anchor.day());
                    }
                    next_monthly(now, time_of_day, &days)
                }
                RecurringMode::Year => next_yearly(now, time_of_day, anchor.month(), anchor.day()),
            }
        }
    }
}

fn next_daily(now: DateTime<Utc>, time_of_day: NaiveTime) -> Option<i64> {
    let today = now.date_naive().and_time(time_of_day).and_utc();
    if today > now {
        return Some(today.timestamp_millis());
    }
    let tomorrow = now.date_naive().checked_add_days(Days::new(1))?;
    Some(tomorrow.and_time(time_of_day).and_utc().timestamp_millis())
}

fn next_weekly(now: DateTime<Utc>, time_of_day: NaiveTime, days: &[u32]) -> Option<i64> {
    // Offset 7 covers a single selected weekday whose time already passed
    // today: it recurs the same weekday next week.
    for offset in 0..=7u64 {
        let date = now.date_naive().checked_add_days(Days::new(offset))?;
        if !days.contains(&date.weekday().num_days_from_sunday()) {
            continue;
        }
        let candidate = date.and_time(time_of_day).and_utc();
        if candidate > now {
            return Some(candidate.timestamp_millis());
        }
    }
    None
}

fn next_monthly(now: DateTime<Utc>, time_of_day: NaiveTime, days: &[u32]) -> Option<i64> {
    let first_of_month = now.date_naive().with_day(1)?;
    // 24 months is enough for any day 1-31 to occur at least once.
    for month_offset in 0..24u32 {
        let month_start = first_of_month.checked_add_months(Months::new(month_offset))?;
        for &day in days {
            // Months without this day (e.g. 31 in February) skip the
            // occurrence rather than clamping.
            let Some(date) = month_start.with_day(day) else {
                continue;
            };
            let candidate = date.and_time(time_of_day).and_utc();
            if candidate > now {
                return Some(candidate.timestamp_millis());
            }
        }
    }
    None
}

fn next_yearly(
    now: DateTime<Utc>,
    time_of_day: NaiveTime,
    anchor_month: u32,
    anchor_day: u32,
) -> Option<i64> {
    // Eight years covers the worst-case gap between leap-day occurrences.
    for year_offset in 0..=8i32 {
        let year = now.year().checked_add(year_offset)?;
        let Some(date) = chrono::NaiveDate::from_ymd_opt(year, anchor_month, anchor_day) else {
            continue;
        };
        let candidate = date.and_time(time_of_day).and_utc();
        if candidate > now {
            return Some(candidate.timestamp_millis());
        }
    }
    None
}

/// Registers the recurrence scalar function on `conn`.
///
/// Argument order: `(mode, date, recurring_mode, selected_days_json,
/// disabled, now_ms)`; returns the next trigger in epoch ms or NULL.
pub fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        NEXT_TRIGGER_FN,
        6,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let mode_text: String = ctx.get(0)?;
            let mode = ReminderMode::parse(&mode_text).ok_or_else(|| {
                rusqlite::Error::UserFunctionError(
                    format!("invalid reminder mode `{mode_text}`").into(),
                )
            })?;
            let anchor_ms: i64 = ctx.get(1)?;
            let recurring_mode = match ctx.get::<Option<String>>(2)? {
                Some(text) => Some(RecurringMode::parse(&text).ok_or_else(|| {
                    rusqlite::Error::UserFunctionError(
                        format!("invalid recurring mode `{text}`").into(),
                    )
                })?),
                None => None,
            };
            let days_json: String = ctx.get(3)?;
            let selected_days: Vec<u32> = serde_json::from_str(&days_json).map_err(|err| {
                rusqlite::Error::UserFunctionError(
                    format!("invalid selected_days JSON: {err}").into(),
                )
            })?;
            let disabled: i64 = ctx.get(4)?;
            let now_ms: i64 = ctx.get(5)?;
            Ok(next_trigger_raw(
                mode,
                anchor_ms,
                recurring_mode,
                &selected_days,
                disabled != 0,
                now_ms,
            ))
        },
    )
}
