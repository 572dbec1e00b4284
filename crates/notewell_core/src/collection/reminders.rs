//! Reminders collection: CRUD, validation and native due-date scans.
//!
//! # Responsibility
//! - Own the `reminders` table.
//! - Run "due before T" scans through the registered recurrence function so
//!   bulk queries never load rows just to evaluate the predicate in process.
//!
//! # Invariants
//! - Rows are validated through `Reminder::validate` before every write.
//! - Repeating reminders require the `RecurringReminders` entitlement.

use crate::collection::{bool_to_int, get_bool, get_id, StoreError, StoreResult};
use crate::entitlement::{Entitlement, EntitlementChecker};
use crate::model::{
    now_ms, ItemId, ItemRef, ItemType, RecurringMode, Reminder, ReminderMode, ReminderPatch,
};
use crate::recur::{self, NEXT_TRIGGER_FN};
use crate::relation::RelationGraph;
use rusqlite::{params, Connection, Row, TransactionBehavior};
use uuid::Uuid;

pub(crate) const REMINDER_SELECT_SQL: &str = "SELECT
    id, title, description, mode, date, recurring_mode, selected_days, disabled,
    date_created, date_modified
FROM reminders";

/// Reminders collection facade over one connection.
pub struct Reminders<'a> {
    conn: &'a mut Connection,
    entitlements: &'a dyn EntitlementChecker,
}

impl<'a> Reminders<'a> {
    pub fn new(conn: &'a mut Connection, entitlements: &'a dyn EntitlementChecker) -> Self {
        Self { conn, entitlements }
    }

    /// Creates a reminder or applies a field-level patch. Returns the id.
    pub fn add(&mut self, patch: ReminderPatch) -> StoreResult<ItemId> {
        let id = patch.id.unwrap_or_else(Uuid::new_v4);
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let existing = reminder_by_id(&tx, id)?;

        let now = now_ms();
        let mut reminder = existing.unwrap_or(Reminder {
            id,
            title: String::new(),
            description: None,
            mode: ReminderMode::Once,
            date: now,
            recurring_mode: None,
            selected_days: Vec::new(),
            disabled: false,
            date_created: now,
            date_modified: now,
        });

        if let Some(title) = patch.title {
            reminder.title = title;
        }
        if !patch.description.is_keep() {
            reminder.description = patch.description.apply(reminder.description);
        }
        if let Some(mode) = patch.mode {
            reminder.mode = mode;
        }
        if let Some(date) = patch.date {
            reminder.date = date;
        }
        if !patch.recurring_mode.is_keep() {
            reminder.recurring_mode = patch.recurring_mode.apply(reminder.recurring_mode);
        }
        if let Some(days) = patch.selected_days {
            reminder.selected_days = days;
        }
        if let Some(disabled) = patch.disabled {
            reminder.disabled = disabled;
        }
        reminder.date_modified = now;

        reminder.validate()?;
        if reminder.mode == ReminderMode::Repeat
            && !self.entitlements.is_allowed(Entitlement::RecurringReminders)
        {
            return Err(StoreError::EntitlementDenied(Entitlement::RecurringReminders));
        }

        upsert_reminder_row(&tx, &reminder)?;
        tx.commit()?;
        Ok(id)
    }

    /// Gets one reminder.
    pub fn reminder(&self, id: ItemId) -> StoreResult<Option<Reminder>> {
        reminder_by_id(self.conn, id)
    }

    /// Lists all reminders sorted by anchor date.
    pub fn all(&self) -> StoreResult<Vec<Reminder>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{REMINDER_SELECT_SQL} ORDER BY date ASC, id ASC;"))?;
        let mut rows = stmt.query([])?;
        let mut reminders = Vec::new();
        while let Some(row) = rows.next()? {
            reminders.push(parse_reminder_row(row)?);
        }
        Ok(reminders)
    }

    /// Deletes reminders and their edges. Missing ids are no-ops.
    pub fn remove(&mut self, ids: &[ItemId]) -> StoreResult<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        for id in ids {
            tx.execute("DELETE FROM reminders WHERE id = ?1;", [id.to_string()])?;
            RelationGraph::new(&tx).unlink_all(ItemRef::new(ItemType::Reminder, *id))?;
        }
        tx.commit()?;
        Ok(())
    }

    /// The next trigger time for one reminder, for "next due" display.
    pub fn next_trigger(&self, id: ItemId, now: i64) -> StoreResult<Option<i64>> {
        let Some(reminder) = reminder_by_id(self.conn, id)? else {
            return Err(StoreError::NotFound {
                kind: ItemType::Reminder,
                id,
            });
        };
        Ok(recur::next_trigger(&reminder, now))
    }

    /// Reminders whose next trigger falls in `(now, until]`, evaluated
    /// natively by the storage backend, ordered by trigger time.
    pub fn due_before(&self, now: i64, until: i64) -> StoreResult<Vec<(ItemId, i64)>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT id, {NEXT_TRIGGER_FN}(mode, date, recurring_mode, selected_days, disabled, ?1)
                 AS next_trigger
             FROM reminders
             WHERE next_trigger IS NOT NULL AND next_trigger <= ?2
             ORDER BY next_trigger ASC, id ASC;"
        ))?;
        let mut rows = stmt.query(params![now, until])?;
        let mut due = Vec::new();
        while let Some(row) = rows.next()? {
            due.push((get_id(row, "id")?, row.get("next_trigger")?));
        }
        Ok(due)
    }
}

pub(crate) fn upsert_reminder_row(conn: &Connection, reminder: &Reminder) -> StoreResult<()> {
    let selected_days = serde_json::to_string(&reminder.selected_days)
        .unwrap_or_else(|_| "[]".to_string());
    conn.execute(
        "INSERT INTO reminders (
            id, title, description, mode, date, recurring_mode, selected_days,
            disabled, date_created, date_modified
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(id) DO UPDATE SET
            title = excluded.title,
            description = excluded.description,
            mode = excluded.mode,
            date = excluded.date,
            recurring_mode = excluded.recurring_mode,
            selected_days = excluded.selected_days,
            disabled = excluded.disabled,
            date_modified = excluded.date_modified;",
        params![
            reminder.id.to_string(),
            reminder.title,
            reminder.description,
            reminder.mode.as_str(),
            reminder.date,
            reminder.recurring_mode.map(RecurringMode::as_str),
            selected_days,
            bool_to_int(reminder.disabled),
            reminder.date_created,
            reminder.date_modified,
        ],
    )?;
    Ok(())
}

pub(crate) fn reminder_by_id(conn: &Connection, id: ItemId) -> StoreResult<Option<Reminder>> {
    let mut stmt = conn.prepare(&format!("{REMINDER_SELECT_SQL} WHERE id = ?1;"))?;
    let mut rows = stmt.query([id.to_string()])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_reminder_row(row)?));
    }
    Ok(None)
}

pub(crate) fn parse_reminder_row(row: &Row<'_>) -> StoreResult<Reminder> {
    let mode_text: String = row.get("mode")?;
    let mode = ReminderMode::parse(&mode_text).ok_or_else(|| {
        StoreError::InvalidData(format!("invalid reminder mode `{mode_text}` in reminders.mode"))
    })?;
    let recurring_mode = match row.get::<_, Option<String>>("recurring_mode")? {
        Some(text) => Some(RecurringMode::parse(&text).ok_or_else(|| {
            StoreError::InvalidData(format!(
                "invalid recurring mode `{text}` in reminders.recurring_mode"
            ))
        })?),
        None => None,
    };
    let days_raw: String = row.get("selected_days")?;
    let selected_days: Vec<u32> = serde_json::from_str(&days_raw).map_err(|err| {
        StoreError::InvalidData(format!("invalid JSON in reminders.selected_days: {err}"))
    })?;
    Ok(Reminder {
        id: get_id(row, "id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        mode,
        date: row.get("date")?,
        recurring_mode,
        selected_days,
        disabled: get_bool(row, "disabled")?,
        date_created: row.get("date_created")?,
        date_modified: row.get("date_modified")?,
    })
}
