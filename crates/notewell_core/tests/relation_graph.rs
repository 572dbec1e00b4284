use notewell_core::db::open_db_in_memory;
use notewell_core::{Endpoint, ItemRef, ItemType, RelationGraph};
use uuid::Uuid;

fn note_ref() -> ItemRef {
    ItemRef::new(ItemType::Note, Uuid::new_v4())
}

fn tag_ref() -> ItemRef {
    ItemRef::new(ItemType::Tag, Uuid::new_v4())
}

#[test]
fn add_is_idempotent() {
    let conn = open_db_in_memory().unwrap();
    let graph = RelationGraph::new(&conn);
    let tag = tag_ref();
    let note = note_ref();

    graph.add(tag, note).unwrap();
    graph.add(tag, note).unwrap();

    assert!(graph.has(tag, note).unwrap());
    assert_eq!(graph.edges_of(tag).unwrap().len(), 1);
}

#[test]
fn directional_queries_resolve_both_ends() {
    let conn = open_db_in_memory().unwrap();
    let graph = RelationGraph::new(&conn);
    let tag = tag_ref();
    let first = note_ref();
    let second = note_ref();

    graph.add(tag, first).unwrap();
    graph.add(tag, second).unwrap();

    let notes = graph.from_refs(tag, ItemType::Note).unwrap();
    assert_eq!(notes.len(), 2);

    let tags = graph.to_refs(first, ItemType::Tag).unwrap();
    assert_eq!(tags, vec![tag]);

    assert_eq!(graph.reference_count(first).unwrap(), 1);
}

#[test]
fn unlink_by_selector() {
    let conn = open_db_in_memory().unwrap();
    let graph = RelationGraph::new(&conn);
    let tag = tag_ref();
    let color = ItemRef::new(ItemType::Color, Uuid::new_v4());
    let note = note_ref();

    graph.add(tag, note).unwrap();
    graph.add(color, note).unwrap();

    // Only the color edge matches the kind selector.
    let removed = graph
        .unlink(Endpoint::Kind(ItemType::Color), Endpoint::Exact(note))
        .unwrap();
    assert_eq!(removed, 1);
    assert!(graph.has(tag, note).unwrap());
    assert!(!graph.has(color, note).unwrap());
}

#[test]
fn unlink_missing_edge_is_noop() {
    let conn = open_db_in_memory().unwrap();
    let graph = RelationGraph::new(&conn);
    let removed = graph
        .unlink(Endpoint::Exact(tag_ref()), Endpoint::Exact(note_ref()))
        .unwrap();
    assert_eq!(removed, 0);
}

#[test]
fn unlink_all_clears_both_directions() {
    let conn = open_db_in_memory().unwrap();
    let graph = RelationGraph::new(&conn);
    let notebook = ItemRef::new(ItemType::Notebook, Uuid::new_v4());
    let note = note_ref();
    let tag = tag_ref();

    // Edges pointing at and away from the note.
    graph.add(notebook, note).unwrap();
    graph.add(note, ItemRef::new(ItemType::Monograph, note.id)).unwrap();
    graph.add(tag, note).unwrap();

    graph.unlink_all(note).unwrap();

    assert!(graph.edges_of(note).unwrap().is_empty());
    assert_eq!(graph.reference_count(note).unwrap(), 0);
    assert!(graph.from_refs(notebook, ItemType::Note).unwrap().is_empty());
}
