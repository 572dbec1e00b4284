use notewell_core::db::open_db_in_memory;
use notewell_core::{
    AllowAll, GroupBy, GroupOptions, GroupSlot, GroupedView, Note, NotePatch, Notes, PlainCodec,
    SortBy, SortDirection,
};
use rusqlite::Connection;
use uuid::Uuid;

fn insert_note_row(conn: &Connection, title: &str, stamp: i64) -> Uuid {
    let id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO notes (id, title, date_created, date_modified, date_edited)
         VALUES (?1, ?2, ?3, ?3, ?3);",
        rusqlite::params![id.to_string(), title, stamp],
    )
    .unwrap();
    id
}

fn alphabetic_by_title() -> GroupOptions {
    GroupOptions {
        group_by: GroupBy::Alphabetic,
        sort_by: SortBy::Title,
        direction: SortDirection::Ascending,
    }
}

#[test]
fn empty_view_has_length_zero() {
    let conn = open_db_in_memory().unwrap();
    let mut view: GroupedView<'_, Note> = GroupedView::new(&conn, alphabetic_by_title()).unwrap();
    assert_eq!(view.len(), 0);
    assert!(view.is_empty());
    assert!(view.item(0).unwrap().is_none());
}

#[test]
fn alphabetic_headers_interleave_with_items() {
    let conn = open_db_in_memory().unwrap();
    insert_note_row(&conn, "apple", 1_000);
    insert_note_row(&conn, "avocado", 2_000);
    insert_note_row(&conn, "banana", 3_000);
    insert_note_row(&conn, "cherry", 4_000);

    let mut view: GroupedView<'_, Note> = GroupedView::new(&conn, alphabetic_by_title()).unwrap();
    assert_eq!(view.headers(), vec!["A", "B", "C"]);
    assert_eq!(view.len(), 7);

    assert_eq!(
        view.item(0).unwrap().unwrap(),
        GroupSlot::Header("A".to_string())
    );
    match view.item(1).unwrap().unwrap() {
        GroupSlot::Item(note) => assert_eq!(note.title, "apple"),
        other => panic!("expected item, got {other:?}"),
    }
    match view.item(2).unwrap().unwrap() {
        GroupSlot::Item(note) => assert_eq!(note.title, "avocado"),
        other => panic!("expected item, got {other:?}"),
    }
    assert_eq!(
        view.item(3).unwrap().unwrap(),
        GroupSlot::Header("B".to_string())
    );
    match view.item(4).unwrap().unwrap() {
        GroupSlot::Item(note) => assert_eq!(note.title, "banana"),
        other => panic!("expected item, got {other:?}"),
    }
    assert_eq!(
        view.item(5).unwrap().unwrap(),
        GroupSlot::Header("C".to_string())
    );
}

#[test]
fn group_by_none_yields_no_headers() {
    let conn = open_db_in_memory().unwrap();
    insert_note_row(&conn, "one", 1_000);
    insert_note_row(&conn, "two", 2_000);

    let view: GroupedView<'_, Note> = GroupedView::new(&conn, GroupOptions::default()).unwrap();
    assert!(view.headers().is_empty());
    assert_eq!(view.len(), 2);
}

#[test]
fn month_grouping_follows_the_sort_column() {
    let conn = open_db_in_memory().unwrap();
    // 2024-01-15 and 2024-02-15 UTC.
    insert_note_row(&conn, "january", 1_705_276_800_000);
    insert_note_row(&conn, "february", 1_707_955_200_000);

    let options = GroupOptions {
        group_by: GroupBy::Month,
        sort_by: SortBy::DateCreated,
        direction: SortDirection::Ascending,
    };
    let view: GroupedView<'_, Note> = GroupedView::new(&conn, options).unwrap();
    assert_eq!(view.headers(), vec!["2024-01", "2024-02"]);
    assert_eq!(view.len(), 4);
}

#[test]
fn set_options_invalidates_and_regroups() {
    let conn = open_db_in_memory().unwrap();
    insert_note_row(&conn, "alpha", 1_000);
    insert_note_row(&conn, "beta", 2_000);

    let mut view: GroupedView<'_, Note> = GroupedView::new(&conn, alphabetic_by_title()).unwrap();
    assert_eq!(view.len(), 4);

    view.set_options(GroupOptions::default()).unwrap();
    assert_eq!(view.len(), 2);
    assert!(view.headers().is_empty());
    match view.item(0).unwrap().unwrap() {
        GroupSlot::Item(_) => {}
        other => panic!("expected item, got {other:?}"),
    }
}

#[test]
fn refresh_picks_up_new_rows() {
    let conn = open_db_in_memory().unwrap();
    insert_note_row(&conn, "first", 1_000);

    let mut view: GroupedView<'_, Note> = GroupedView::new(&conn, GroupOptions::default()).unwrap();
    assert_eq!(view.len(), 1);

    insert_note_row(&conn, "second", 2_000);
    assert_eq!(view.len(), 1);
    view.refresh().unwrap();
    assert_eq!(view.len(), 2);
}

#[test]
fn corrupt_row_renders_unavailable_not_error() {
    let conn = open_db_in_memory().unwrap();
    let good = insert_note_row(&conn, "good", 1_000);
    let bad = insert_note_row(&conn, "bad", 2_000);
    conn.execute(
        "UPDATE notes SET tags = 'not-json' WHERE id = ?1;",
        [bad.to_string()],
    )
    .unwrap();

    let options = GroupOptions {
        group_by: GroupBy::None,
        sort_by: SortBy::DateCreated,
        direction: SortDirection::Ascending,
    };
    let mut view: GroupedView<'_, Note> = GroupedView::new(&conn, options).unwrap();
    assert_eq!(view.len(), 2);

    match view.item(0).unwrap().unwrap() {
        GroupSlot::Item(note) => assert_eq!(note.id, good),
        other => panic!("expected item, got {other:?}"),
    }
    assert_eq!(view.item(1).unwrap().unwrap(), GroupSlot::Unavailable);
}

#[test]
fn batches_page_past_the_first_boundary() {
    let conn = open_db_in_memory().unwrap();
    for n in 0..750 {
        insert_note_row(&conn, &format!("note {n:04}"), 1_000 + n);
    }

    let options = GroupOptions {
        group_by: GroupBy::Alphabetic,
        sort_by: SortBy::DateCreated,
        direction: SortDirection::Ascending,
    };
    let mut view: GroupedView<'_, Note> = GroupedView::new(&conn, options).unwrap();
    // One header ("N"), 750 items.
    assert_eq!(view.headers().len(), 1);
    assert_eq!(view.len(), 751);

    assert_eq!(
        view.item(0).unwrap().unwrap(),
        GroupSlot::Header("N".to_string())
    );
    match view.item(1).unwrap().unwrap() {
        GroupSlot::Item(note) => assert_eq!(note.title, "note 0000"),
        other => panic!("expected item, got {other:?}"),
    }
    // Index 600 lives in the second batch.
    match view.item(601).unwrap().unwrap() {
        GroupSlot::Item(note) => assert_eq!(note.title, "note 0600"),
        other => panic!("expected item, got {other:?}"),
    }
    match view.item(750).unwrap().unwrap() {
        GroupSlot::Item(note) => assert_eq!(note.title, "note 0749"),
        other => panic!("expected item, got {other:?}"),
    }
    assert!(view.item(751).unwrap().is_none());
}

#[test]
fn trashed_notes_are_excluded() {
    let mut conn = open_db_in_memory().unwrap();
    let codec = PlainCodec;
    let kept;
    {
        let mut notes = Notes::new(&mut conn, &codec, &AllowAll);
        kept = notes.add(NotePatch::with_title("kept")).unwrap();
        let gone = notes.add(NotePatch::with_title("gone")).unwrap();
        notes.remove(&[gone]).unwrap();
    }

    let mut view: GroupedView<'_, Note> = GroupedView::new(&conn, GroupOptions::default()).unwrap();
    assert_eq!(view.len(), 1);
    match view.item(0).unwrap().unwrap() {
        GroupSlot::Item(note) => assert_eq!(note.id, kept),
        other => panic!("expected item, got {other:?}"),
    }
}
