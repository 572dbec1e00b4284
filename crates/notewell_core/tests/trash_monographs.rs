use notewell_core::db::open_db_in_memory;
use notewell_core::{
    AllowAll, DraftContent, ItemRef, ItemType, MonographOptions, Monographs, NotePatch,
    NotebookPatch, Notebooks, Notes, PlainCodec, RelationGraph, StoreError,
};
use rusqlite::Connection;
use uuid::Uuid;

fn count(conn: &Connection, sql: &str, id: &str) -> i64 {
    conn.query_row(sql, [id], |row| row.get(0)).unwrap()
}

#[test]
fn trash_lists_notes_and_notebooks() {
    let mut conn = open_db_in_memory().unwrap();
    let codec = PlainCodec;

    let note_id = {
        let mut notes = Notes::new(&mut conn, &codec, &AllowAll);
        let id = notes.add(NotePatch::with_title("note in trash")).unwrap();
        notes.remove(&[id]).unwrap();
        id
    };
    let notebook_id = {
        let mut notebooks = Notebooks::new(&mut conn);
        let id = notebooks
            .add(NotebookPatch::with_title("notebook in trash"))
            .unwrap();
        notebooks.remove(&[id]).unwrap();
        id
    };

    let trash = notewell_core::Trash::new(&mut conn);
    let items = trash.all().unwrap();
    assert_eq!(items.len(), 2);
    assert!(items
        .iter()
        .any(|i| i.kind == ItemType::Note && i.id == note_id));
    assert!(items
        .iter()
        .any(|i| i.kind == ItemType::Notebook && i.id == notebook_id));
}

#[test]
fn restore_brings_items_back() {
    let mut conn = open_db_in_memory().unwrap();
    let codec = PlainCodec;

    let id = {
        let mut notes = Notes::new(&mut conn, &codec, &AllowAll);
        let id = notes.add(NotePatch::with_title("round trip")).unwrap();
        notes.remove(&[id]).unwrap();
        id
    };

    {
        let mut trash = notewell_core::Trash::new(&mut conn);
        trash.restore(&[id]).unwrap();
        // Restoring again is a no-op.
        trash.restore(&[id, Uuid::new_v4()]).unwrap();
        assert!(trash.all().unwrap().is_empty());
    }

    let notes = Notes::new(&mut conn, &codec, &AllowAll);
    let note = notes.note(id).unwrap().unwrap();
    assert_eq!(note.title, "round trip");
}

#[test]
fn purge_removes_content_publication_and_edges() {
    let mut conn = open_db_in_memory().unwrap();
    let codec = PlainCodec;

    let note_id = {
        let mut notes = Notes::new(&mut conn, &codec, &AllowAll);
        let mut patch = NotePatch::with_title("fully owned");
        patch.content = Some(DraftContent::new("text", "the body"));
        let id = notes.add(patch).unwrap();
        notes.tag(id, "keepsake").unwrap();
        id
    };
    {
        let mut monographs = Monographs::new(&mut conn);
        monographs
            .publish(note_id, MonographOptions::default())
            .unwrap();
    }
    {
        let mut notes = Notes::new(&mut conn, &codec, &AllowAll);
        notes.remove(&[note_id]).unwrap();
    }

    {
        let mut trash = notewell_core::Trash::new(&mut conn);
        trash.purge(&[note_id]).unwrap();
    }

    let id = note_id.to_string();
    assert_eq!(count(&conn, "SELECT count(*) FROM notes WHERE id = ?1;", &id), 0);
    assert_eq!(
        count(&conn, "SELECT count(*) FROM content WHERE note_id = ?1;", &id),
        0
    );
    assert_eq!(
        count(&conn, "SELECT count(*) FROM monographs WHERE note_id = ?1;", &id),
        0
    );
    let graph = RelationGraph::new(&conn);
    assert!(graph
        .edges_of(ItemRef::new(ItemType::Note, note_id))
        .unwrap()
        .is_empty());
}

#[test]
fn purging_a_notebook_scrubs_note_lists() {
    let mut conn = open_db_in_memory().unwrap();
    let codec = PlainCodec;

    let note_id = {
        let mut notes = Notes::new(&mut conn, &codec, &AllowAll);
        notes.add(NotePatch::with_title("member")).unwrap()
    };
    let notebook_id = {
        let mut notebooks = Notebooks::new(&mut conn);
        let id = notebooks
            .add(NotebookPatch::with_title("doomed shelf"))
            .unwrap();
        notebooks.add_note(id, note_id).unwrap();
        notebooks.remove(&[id]).unwrap();
        id
    };

    {
        let mut trash = notewell_core::Trash::new(&mut conn);
        trash.purge(&[notebook_id]).unwrap();
    }

    // No dangling id in the note's denormalized list, and no edge either.
    let notes = Notes::new(&mut conn, &codec, &AllowAll);
    assert!(notes.note(note_id).unwrap().unwrap().notebooks.is_empty());
    let graph = RelationGraph::new(&conn);
    assert!(graph
        .edges_of(ItemRef::new(ItemType::Notebook, notebook_id))
        .unwrap()
        .is_empty());
}

#[test]
fn purge_skips_active_items() {
    let mut conn = open_db_in_memory().unwrap();
    let codec = PlainCodec;

    let id = {
        let mut notes = Notes::new(&mut conn, &codec, &AllowAll);
        notes.add(NotePatch::with_title("still active")).unwrap()
    };

    {
        let mut trash = notewell_core::Trash::new(&mut conn);
        trash.purge(&[id]).unwrap();
    }

    let notes = Notes::new(&mut conn, &codec, &AllowAll);
    assert!(notes.note(id).unwrap().is_some());
}

#[test]
fn clear_empties_the_trash() {
    let mut conn = open_db_in_memory().unwrap();
    let codec = PlainCodec;

    {
        let mut notes = Notes::new(&mut conn, &codec, &AllowAll);
        let a = notes.add(NotePatch::with_title("a")).unwrap();
        let b = notes.add(NotePatch::with_title("b")).unwrap();
        notes.remove(&[a, b]).unwrap();
    }

    let mut trash = notewell_core::Trash::new(&mut conn);
    trash.clear().unwrap();
    assert!(trash.all().unwrap().is_empty());
}

#[test]
fn publish_and_unpublish_roundtrip() {
    let mut conn = open_db_in_memory().unwrap();
    let codec = PlainCodec;

    let note_id = {
        let mut notes = Notes::new(&mut conn, &codec, &AllowAll);
        notes.add(NotePatch::with_title("published")).unwrap()
    };

    let mut monographs = Monographs::new(&mut conn);
    assert!(!monographs.is_published(note_id).unwrap());

    let options = MonographOptions {
        password: Some("hunter2".to_string()),
        self_destruct: true,
    };
    monographs.publish(note_id, options).unwrap();
    assert!(monographs.is_published(note_id).unwrap());

    let record = monographs.monograph(note_id).unwrap().unwrap();
    assert_eq!(record.password.as_deref(), Some("hunter2"));
    assert!(record.self_destruct);

    monographs.unpublish(note_id).unwrap();
    monographs.unpublish(note_id).unwrap();
    assert!(!monographs.is_published(note_id).unwrap());
    assert!(monographs.all().unwrap().is_empty());
}

#[test]
fn publishing_a_missing_or_trashed_note_fails() {
    let mut conn = open_db_in_memory().unwrap();
    let codec = PlainCodec;

    let trashed = {
        let mut notes = Notes::new(&mut conn, &codec, &AllowAll);
        let id = notes.add(NotePatch::with_title("gone soon")).unwrap();
        notes.remove(&[id]).unwrap();
        id
    };

    let mut monographs = Monographs::new(&mut conn);
    let err = monographs
        .publish(Uuid::new_v4(), MonographOptions::default())
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));
    let err = monographs
        .publish(trashed, MonographOptions::default())
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));
}
