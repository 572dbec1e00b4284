use chrono::{TimeZone, Utc};
use notewell_core::db::open_db_in_memory;
use notewell_core::recur;
use notewell_core::{
    AllowAll, DenyAll, Patch, RecurringMode, ReminderMode, ReminderPatch, Reminders, StoreError,
    ValidationError,
};

fn ms(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> i64 {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, 0)
        .unwrap()
        .timestamp_millis()
}

fn repeating(title: &str, date: i64, mode: RecurringMode, days: Vec<u32>) -> ReminderPatch {
    let mut patch = ReminderPatch::default();
    patch.title = Some(title.to_string());
    patch.mode = Some(ReminderMode::Repeat);
    patch.date = Some(date);
    patch.recurring_mode = Patch::Set(mode);
    patch.selected_days = Some(days);
    patch
}

#[test]
fn once_reminder_fires_only_in_the_future() {
    let mut conn = open_db_in_memory().unwrap();
    let mut reminders = Reminders::new(&mut conn, &AllowAll);

    let date = ms(2024, 6, 10, 9, 0);
    let mut patch = ReminderPatch::default();
    patch.title = Some("dentist".to_string());
    patch.mode = Some(ReminderMode::Once);
    patch.date = Some(date);
    let id = reminders.add(patch).unwrap();

    assert_eq!(
        reminders.next_trigger(id, date - 1_000).unwrap(),
        Some(date)
    );
    assert_eq!(reminders.next_trigger(id, date).unwrap(), None);
}

#[test]
fn weekly_selected_days_pick_the_next_match() {
    let mut conn = open_db_in_memory().unwrap();
    let mut reminders = Reminders::new(&mut conn, &AllowAll);

    // Anchor Monday 2024-06-03 08:00 UTC, firing Wednesday (3) and Friday (5).
    let anchor = ms(2024, 6, 3, 8, 0);
    let id = reminders
        .add(repeating("standup", anchor, RecurringMode::Week, vec![3, 5]))
        .unwrap();

    // Tuesday -> Wednesday 08:00.
    let tuesday = ms(2024, 6, 4, 12, 0);
    assert_eq!(
        reminders.next_trigger(id, tuesday).unwrap(),
        Some(ms(2024, 6, 5, 8, 0))
    );

    // Friday after the slot -> next Wednesday.
    let friday_evening = ms(2024, 6, 7, 20, 0);
    assert_eq!(
        reminders.next_trigger(id, friday_evening).unwrap(),
        Some(ms(2024, 6, 12, 8, 0))
    );
}

#[test]
fn empty_weekly_selection_behaves_daily() {
    let anchor = ms(2024, 6, 3, 8, 0);
    let now = ms(2024, 6, 4, 9, 0);
    let next = recur::next_trigger_raw(
        ReminderMode::Repeat,
        anchor,
        Some(RecurringMode::Week),
        &[],
        false,
        now,
    );
    assert_eq!(next, Some(ms(2024, 6, 5, 8, 0)));
}

#[test]
fn short_months_skip_missing_days() {
    // Day 31 in February rolls forward to March 31.
    let anchor = ms(2024, 1, 31, 7, 30);
    let now = ms(2024, 2, 1, 0, 0);
    let next = recur::next_trigger_raw(
        ReminderMode::Repeat,
        anchor,
        Some(RecurringMode::Month),
        &[31],
        false,
        now,
    );
    assert_eq!(next, Some(ms(2024, 3, 31, 7, 30)));
}

#[test]
fn disabled_reminders_never_fire() {
    let anchor = ms(2024, 6, 3, 8, 0);
    let next = recur::next_trigger_raw(
        ReminderMode::Repeat,
        anchor,
        Some(RecurringMode::Day),
        &[],
        true,
        anchor - 1_000,
    );
    assert_eq!(next, None);
}

#[test]
fn due_before_scan_agrees_with_pure_computation() {
    let mut conn = open_db_in_memory().unwrap();
    let mut reminders = Reminders::new(&mut conn, &AllowAll);

    let anchor = ms(2024, 6, 3, 8, 0);
    let daily = reminders
        .add(repeating("stretch", anchor, RecurringMode::Day, vec![]))
        .unwrap();
    let weekly = reminders
        .add(repeating("review", anchor, RecurringMode::Week, vec![5]))
        .unwrap();
    let mut far = ReminderPatch::default();
    far.title = Some("renewal".to_string());
    far.mode = Some(ReminderMode::Once);
    far.date = Some(ms(2025, 1, 1, 0, 0));
    let far_off = reminders.add(far).unwrap();

    let now = ms(2024, 6, 4, 12, 0);
    let until = ms(2024, 6, 8, 0, 0);
    let due = reminders.due_before(now, until).unwrap();

    let due_ids: Vec<_> = due.iter().map(|(id, _)| *id).collect();
    assert!(due_ids.contains(&daily));
    assert!(due_ids.contains(&weekly));
    assert!(!due_ids.contains(&far_off));

    // The native scan and the pure function agree on every trigger.
    for (id, trigger) in &due {
        let reminder = reminders.reminder(*id).unwrap().unwrap();
        assert_eq!(recur::next_trigger(&reminder, now), Some(*trigger));
    }

    // Ordered by trigger time.
    let triggers: Vec<_> = due.iter().map(|(_, t)| *t).collect();
    let mut sorted = triggers.clone();
    sorted.sort_unstable();
    assert_eq!(triggers, sorted);
}

#[test]
fn repeat_without_recurring_mode_fails_validation() {
    let mut conn = open_db_in_memory().unwrap();
    let mut reminders = Reminders::new(&mut conn, &AllowAll);

    let mut patch = ReminderPatch::default();
    patch.title = Some("broken".to_string());
    patch.mode = Some(ReminderMode::Repeat);
    patch.date = Some(ms(2024, 6, 3, 8, 0));
    let err = reminders.add(patch).unwrap_err();
    assert!(matches!(
        err,
        StoreError::Validation(ValidationError::MissingRecurringMode)
    ));
}

#[test]
fn out_of_range_selected_day_fails_validation() {
    let mut conn = open_db_in_memory().unwrap();
    let mut reminders = Reminders::new(&mut conn, &AllowAll);

    let err = reminders
        .add(repeating("bad", ms(2024, 6, 3, 8, 0), RecurringMode::Week, vec![7]))
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::Validation(ValidationError::InvalidSelectedDay { .. })
    ));
}

#[test]
fn repeating_reminders_are_entitlement_gated() {
    let mut conn = open_db_in_memory().unwrap();
    let mut reminders = Reminders::new(&mut conn, &DenyAll);

    let err = reminders
        .add(repeating("gated", ms(2024, 6, 3, 8, 0), RecurringMode::Day, vec![]))
        .unwrap_err();
    assert!(matches!(err, StoreError::EntitlementDenied(_)));

    let mut once = ReminderPatch::default();
    once.title = Some("allowed".to_string());
    once.mode = Some(ReminderMode::Once);
    once.date = Some(ms(2024, 6, 3, 8, 0));
    reminders.add(once).unwrap();
}
