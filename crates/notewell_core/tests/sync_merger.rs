use notewell_core::db::open_db_in_memory;
use notewell_core::{
    AllowAll, ContentCodec, DraftContent, Merger, Note, NotePatch, Notebook, NotebookPatch,
    Notebooks, Notes, PlainCodec, PushOutcome, RemoteItem, SyncKind, SyncTransport, TransportError,
};
use uuid::Uuid;

fn remote_note(note: &Note, date_modified: i64) -> RemoteItem {
    let json = serde_json::to_string(note).unwrap();
    let payload = PlainCodec.encode("note", &json).unwrap();
    RemoteItem {
        kind: SyncKind::Note,
        id: note.id,
        payload,
        date_modified,
        session_id: note.session_id,
        deleted: false,
    }
}

fn sample_note(title: &str, stamp: i64) -> Note {
    Note {
        id: Uuid::new_v4(),
        title: title.to_string(),
        excerpt: None,
        content_id: None,
        tags: Vec::new(),
        notebooks: Vec::new(),
        color: None,
        pinned: false,
        favorite: false,
        readonly: false,
        local_only: false,
        conflicted: false,
        date_created: stamp,
        date_modified: stamp,
        date_edited: stamp,
        session_id: 1,
    }
}

#[test]
fn new_remote_metadata_is_applied() {
    let mut conn = open_db_in_memory().unwrap();
    let codec = PlainCodec;
    let incoming = sample_note("from the server", 5_000);

    {
        let mut merger = Merger::new(&mut conn, &codec);
        let report = merger
            .merge_batch(&[remote_note(&incoming, incoming.date_modified)])
            .unwrap();
        assert_eq!(report.applied, 1);
    }

    let notes = Notes::new(&mut conn, &codec, &AllowAll);
    let loaded = notes.note(incoming.id).unwrap().unwrap();
    assert_eq!(loaded.title, "from the server");
}

#[test]
fn stale_remote_metadata_is_skipped() {
    let mut conn = open_db_in_memory().unwrap();
    let codec = PlainCodec;

    let local_id = {
        let mut notes = Notes::new(&mut conn, &codec, &AllowAll);
        notes.add(NotePatch::with_title("local truth")).unwrap()
    };

    let mut stale = sample_note("server relic", 1_000);
    stale.id = local_id;

    {
        let mut merger = Merger::new(&mut conn, &codec);
        let report = merger.merge_batch(&[remote_note(&stale, 1_000)]).unwrap();
        assert_eq!(report.skipped, 1);
    }

    let notes = Notes::new(&mut conn, &codec, &AllowAll);
    assert_eq!(notes.note(local_id).unwrap().unwrap().title, "local truth");
}

#[test]
fn remote_tombstone_trashes_the_local_note() {
    let mut conn = open_db_in_memory().unwrap();
    let codec = PlainCodec;

    let local_id = {
        let mut notes = Notes::new(&mut conn, &codec, &AllowAll);
        notes.add(NotePatch::with_title("doomed")).unwrap()
    };
    let far_future = notewell_core::model::now_ms() + 60_000;

    {
        let mut merger = Merger::new(&mut conn, &codec);
        let report = merger
            .merge_batch(&[RemoteItem {
                kind: SyncKind::Note,
                id: local_id,
                payload: Vec::new(),
                date_modified: far_future,
                session_id: 2,
                deleted: true,
            }])
            .unwrap();
        assert_eq!(report.applied, 1);
    }

    let notes = Notes::new(&mut conn, &codec, &AllowAll);
    assert!(notes.note(local_id).unwrap().is_none());
}

#[test]
fn remote_notebook_update_keeps_the_local_tombstone() {
    let mut conn = open_db_in_memory().unwrap();
    let codec = PlainCodec;

    let notebook_id = {
        let mut notebooks = Notebooks::new(&mut conn);
        let id = notebooks
            .add(NotebookPatch::with_title("shelved"))
            .unwrap();
        notebooks.remove(&[id]).unwrap();
        id
    };

    let remote = Notebook {
        id: notebook_id,
        title: "renamed elsewhere".to_string(),
        description: None,
        pinned: false,
        date_created: 1_000,
        date_modified: notewell_core::model::now_ms() + 60_000,
    };
    let json = serde_json::to_string(&remote).unwrap();
    let payload = PlainCodec.encode("notebook", &json).unwrap();

    {
        let mut merger = Merger::new(&mut conn, &codec);
        let report = merger
            .merge_batch(&[RemoteItem {
                kind: SyncKind::Notebook,
                id: notebook_id,
                payload,
                date_modified: remote.date_modified,
                session_id: 3,
                deleted: false,
            }])
            .unwrap();
        assert_eq!(report.applied, 1);
    }

    // The rename lands, the tombstone stays.
    let notebooks = Notebooks::new(&mut conn);
    assert!(notebooks.notebook(notebook_id).unwrap().is_none());
    let trash = notewell_core::Trash::new(&mut conn);
    let trashed = trash.all().unwrap();
    assert_eq!(trashed.len(), 1);
    assert_eq!(trashed[0].title, "renamed elsewhere");
}

#[test]
fn one_bad_payload_never_fails_the_batch() {
    let mut conn = open_db_in_memory().unwrap();
    let codec = PlainCodec;
    let good = sample_note("intact", 5_000);
    let bad = RemoteItem {
        kind: SyncKind::Note,
        id: Uuid::new_v4(),
        payload: b"garbage".to_vec(),
        date_modified: 5_000,
        session_id: 1,
        deleted: false,
    };

    {
        let mut merger = Merger::new(&mut conn, &codec);
        let report = merger
            .merge_batch(&[bad, remote_note(&good, 5_000)])
            .unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.applied, 1);
    }

    let notes = Notes::new(&mut conn, &codec, &AllowAll);
    assert!(notes.note(good.id).unwrap().is_some());
}

struct FakeTransport {
    batches: Vec<Vec<RemoteItem>>,
    pushed: Vec<RemoteItem>,
}

impl SyncTransport for FakeTransport {
    fn pull(&mut self, _since_ms: i64) -> Result<Vec<Vec<RemoteItem>>, TransportError> {
        Ok(std::mem::take(&mut self.batches))
    }

    fn push(&mut self, items: &[RemoteItem]) -> Result<PushOutcome, TransportError> {
        self.pushed.extend_from_slice(items);
        Ok(PushOutcome {
            accepted: items.len(),
            server_time: 10_000,
        })
    }
}

#[test]
fn sync_merges_batches_and_pushes_unsynced_content() {
    let mut conn = open_db_in_memory().unwrap();
    let codec = PlainCodec;

    // A local edit awaiting upload.
    let local_id = {
        let mut notes = Notes::new(&mut conn, &codec, &AllowAll);
        let mut patch = NotePatch::with_title("outgoing");
        patch.content = Some(DraftContent::new("text", "unpushed body"));
        notes.add(patch).unwrap()
    };

    let incoming_one = sample_note("pulled one", 5_000);
    let incoming_two = sample_note("pulled two", 6_000);
    let mut transport = FakeTransport {
        batches: vec![
            vec![remote_note(&incoming_one, 5_000)],
            vec![remote_note(&incoming_two, 6_000)],
        ],
        pushed: Vec::new(),
    };

    {
        let mut merger = Merger::new(&mut conn, &codec);
        let report = merger.sync(&mut transport, 0).unwrap();
        assert_eq!(report.merge.applied, 2);
        assert_eq!(report.pushed, 1);
    }

    assert_eq!(transport.pushed.len(), 1);
    assert_eq!(transport.pushed[0].kind, SyncKind::Content);

    // The pushed row is now marked synced; a second run pushes nothing.
    {
        let mut merger = Merger::new(&mut conn, &codec);
        let report = merger.sync(&mut transport, 0).unwrap();
        assert_eq!(report.pushed, 0);
    }

    let notes = Notes::new(&mut conn, &codec, &AllowAll);
    assert!(notes.note(incoming_one.id).unwrap().is_some());
    assert!(notes.note(incoming_two.id).unwrap().is_some());
    assert_eq!(notes.content(local_id).unwrap().unwrap().text, "unpushed body");
}

#[test]
fn local_only_content_never_leaves_the_device() {
    let mut conn = open_db_in_memory().unwrap();
    let codec = PlainCodec;

    {
        let mut notes = Notes::new(&mut conn, &codec, &AllowAll);
        let mut patch = NotePatch::with_title("private");
        patch.content = Some(DraftContent::new("text", "stays here"));
        patch.local_only = Some(true);
        notes.add(patch).unwrap();
    }

    let mut transport = FakeTransport {
        batches: Vec::new(),
        pushed: Vec::new(),
    };
    let mut merger = Merger::new(&mut conn, &codec);
    let report = merger.sync(&mut transport, 0).unwrap();
    assert_eq!(report.pushed, 0);
    assert!(transport.pushed.is_empty());
}
