use notewell_core::db::open_db_in_memory;
use notewell_core::{AllowAll, Keywords, NotePatch, Notes, PlainCodec, StoreError};
use uuid::Uuid;

#[test]
fn add_is_get_or_create() {
    let mut conn = open_db_in_memory().unwrap();
    let mut tags = Keywords::tags(&mut conn);

    let first = tags.add("Ideas").unwrap();
    let second = tags.add("  ideas ").unwrap();
    assert_eq!(first, second);

    let all = tags.all().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].title, "ideas");
}

#[test]
fn tags_and_colors_are_separate_namespaces() {
    let mut conn = open_db_in_memory().unwrap();

    let tag_id = Keywords::tags(&mut conn).add("red").unwrap();
    let color_id = Keywords::colors(&mut conn).add("Red").unwrap();
    assert_ne!(tag_id, color_id);

    // Color titles keep their case; tag titles are lowercased.
    let colors = Keywords::colors(&mut conn);
    assert_eq!(colors.all().unwrap()[0].title, "Red");
    assert!(colors.keyword(tag_id).unwrap().is_none());
}

#[test]
fn rename_normalizes_and_requires_the_row() {
    let mut conn = open_db_in_memory().unwrap();
    let mut tags = Keywords::tags(&mut conn);

    let id = tags.add("draft").unwrap();
    tags.rename(id, " Final ").unwrap();
    assert_eq!(tags.keyword(id).unwrap().unwrap().title, "final");

    let err = tags.rename(Uuid::new_v4(), "anything").unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));
}

#[test]
fn remove_unlinks_tagged_notes() {
    let mut conn = open_db_in_memory().unwrap();
    let codec = PlainCodec;

    let tag_id = {
        let mut notes = Notes::new(&mut conn, &codec, &AllowAll);
        let note_id = notes.add(NotePatch::with_title("tagged")).unwrap();
        notes.tag(note_id, "fleeting").unwrap()
    };

    {
        let mut tags = Keywords::tags(&mut conn);
        tags.remove(&[tag_id]).unwrap();
        assert!(tags.keyword(tag_id).unwrap().is_none());
    }

    // The edge is gone even though the note still lists the title.
    let relations: i64 = conn
        .query_row(
            "SELECT count(*) FROM relations WHERE from_id = ?1;",
            [tag_id.to_string()],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(relations, 0);
}

#[test]
fn remove_scrubs_denormalized_note_state() {
    let mut conn = open_db_in_memory().unwrap();
    let codec = PlainCodec;

    let (note_id, tag_id, color_id) = {
        let mut notes = Notes::new(&mut conn, &codec, &AllowAll);
        let note_id = notes.add(NotePatch::with_title("decorated")).unwrap();
        let tag_id = notes.tag(note_id, "work").unwrap();
        notes.tag(note_id, "urgent").unwrap();
        let color_id = notes.set_color(note_id, "Red").unwrap();
        (note_id, tag_id, color_id)
    };

    Keywords::tags(&mut conn).remove(&[tag_id]).unwrap();
    Keywords::colors(&mut conn).remove(&[color_id]).unwrap();

    let notes = Notes::new(&mut conn, &codec, &AllowAll);
    let note = notes.note(note_id).unwrap().unwrap();
    assert_eq!(note.tags, vec!["urgent".to_string()]);
    assert_eq!(note.color, None);
}

#[test]
fn prune_only_removes_unreferenced_rows() {
    let mut conn = open_db_in_memory().unwrap();
    let codec = PlainCodec;

    let used = {
        let mut notes = Notes::new(&mut conn, &codec, &AllowAll);
        let note_id = notes.add(NotePatch::with_title("keeper")).unwrap();
        notes.tag(note_id, "used").unwrap()
    };
    let orphan = Keywords::tags(&mut conn).add("orphan").unwrap();

    let mut tags = Keywords::tags(&mut conn);
    let pruned = tags.prune().unwrap();
    assert_eq!(pruned, 1);
    assert!(tags.keyword(used).unwrap().is_some());
    assert!(tags.keyword(orphan).unwrap().is_none());
}
