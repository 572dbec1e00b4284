//! Virtualized grouped views over large collections.
//!
//! # Responsibility
//! - Present a flat logical index space of group headers and items without
//!   materializing full rows: one native ORDER BY key scan (`id` + group
//!   label) up front, then fixed-size batch fetches on demand.
//!
//! # Invariants
//! - Ordering comes from the storage backend's ORDER BY, never an in-process
//!   sort.
//! - Header slots are merged into the index space once per reload;
//!   `item(index)` resolves a slot with a binary search over headers.
//! - The batch cache is keyed by (generation, batch index); `set_options`
//!   and `refresh` bump the generation, so a fetch raced against a
//!   superseded generation can never populate the cache.
//! - A row that fails to materialize renders as `Unavailable`, never an
//!   error for the whole page.

use crate::collection::{keywords, notebooks, notes, reminders, StoreResult};
use crate::model::{ItemId, Keyword, Note, Notebook, Reminder};
use log::{debug, warn};
use rusqlite::{Connection, Row};
use std::collections::{HashMap, VecDeque};

/// Items fetched per batch.
pub const BATCH_SIZE: usize = 500;
/// Warm batches kept before evicting the oldest.
const MAX_CACHED_BATCHES: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupBy {
    #[default]
    None,
    Alphabetic,
    Year,
    Month,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortBy {
    Title,
    DateCreated,
    #[default]
    DateModified,
    DateEdited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    Ascending,
    #[default]
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GroupOptions {
    pub group_by: GroupBy,
    pub sort_by: SortBy,
    pub direction: SortDirection,
}

/// One logical slot of a grouped view.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupSlot<T> {
    Header(String),
    Item(T),
    /// The key scan knows this item but the row failed to materialize.
    Unavailable,
}

/// A collection type that grouped views can page over.
pub trait Groupable: Clone {
    /// Full-row select with FROM clause, no WHERE.
    fn select_sql() -> &'static str;
    fn table() -> &'static str;
    /// Filter fragment excluding trashed rows; `1 = 1` when none apply.
    fn filter_sql() -> &'static str;
    /// Column backing a sort option. Types without the column fall back to
    /// `date_modified`.
    fn sort_column(sort: SortBy) -> &'static str;
    fn from_row(row: &Row<'_>) -> StoreResult<Self>;
}

struct GroupHeader {
    label: String,
    /// Logical index of the header slot.
    slot: usize,
}

struct CachedBatch<T> {
    generation: u64,
    items: Vec<Option<T>>,
}

/// A virtualized grouped view bound to one connection.
pub struct GroupedView<'conn, T: Groupable> {
    conn: &'conn Connection,
    options: GroupOptions,
    ids: Vec<ItemId>,
    headers: Vec<GroupHeader>,
    generation: u64,
    cache: HashMap<usize, CachedBatch<T>>,
    cache_order: VecDeque<usize>,
}

impl<'conn, T: Groupable> GroupedView<'conn, T> {
    pub fn new(conn: &'conn Connection, options: GroupOptions) -> StoreResult<Self> {
        let mut view = Self {
            conn,
            options,
            ids: Vec::new(),
            headers: Vec::new(),
            generation: 0,
            cache: HashMap::new(),
            cache_order: VecDeque::new(),
        };
        view.reload()?;
        Ok(view)
    }

    /// Total logical length: items plus header slots.
    pub fn len(&self) -> usize {
        self.ids.len() + self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn options(&self) -> GroupOptions {
        self.options
    }

    /// Group labels in display order.
    pub fn headers(&self) -> Vec<&str> {
        self.headers.iter().map(|h| h.label.as_str()).collect()
    }

    /// Resolves one logical slot. `None` past the end.
    pub fn item(&mut self, index: usize) -> StoreResult<Option<GroupSlot<T>>> {
        if index >= self.len() {
            return Ok(None);
        }
        // Headers with slot <= index; an exact hit is the header itself,
        // otherwise all of them sit before the item and shift its position.
        let headers_before = self.headers.partition_point(|h| h.slot <= index);
        if headers_before > 0 && self.headers[headers_before - 1].slot == index {
            return Ok(Some(GroupSlot::Header(
                self.headers[headers_before - 1].label.clone(),
            )));
        }
        let item_index = index - headers_before;
        let batch = item_index / BATCH_SIZE;
        self.ensure_batch(batch)?;
        let slot = match &self.cache[&batch].items[item_index % BATCH_SIZE] {
            Some(item) => GroupSlot::Item(item.clone()),
            None => GroupSlot::Unavailable,
        };
        Ok(Some(slot))
    }

    /// Replaces the options, invalidating every cached batch.
    pub fn set_options(&mut self, options: GroupOptions) -> StoreResult<()> {
        self.options = options;
        self.refresh()
    }

    /// Re-runs the key scan after underlying data changed.
    pub fn refresh(&mut self) -> StoreResult<()> {
        self.generation += 1;
        self.cache.clear();
        self.cache_order.clear();
        self.reload()
    }

    fn reload(&mut self) -> StoreResult<()> {
        self.ids.clear();
        self.headers.clear();

        let order = order_sql::<T>(self.options);
        let label = label_sql::<T>(self.options);
        let sql = format!(
            "SELECT id, {label} AS group_label FROM {} WHERE {} ORDER BY {order};",
            T::table(),
            T::filter_sql(),
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut last_label: Option<String> = None;
        while let Some(row) = rows.next()? {
            let id = crate::collection::get_id(row, "id")?;
            if self.options.group_by != GroupBy::None {
                let group: String = row.get("group_label")?;
                if last_label.as_deref() != Some(group.as_str()) {
                    self.headers.push(GroupHeader {
                        label: group.clone(),
                        slot: self.ids.len() + self.headers.len(),
                    });
                    last_label = Some(group);
                }
            }
            self.ids.push(id);
        }
        debug!(
            "event=group_reload module=grouping status=ok table={} items={} groups={}",
            T::table(),
            self.ids.len(),
            self.headers.len()
        );
        Ok(())
    }

    fn ensure_batch(&mut self, batch: usize) -> StoreResult<()> {
        if self
            .cache
            .get(&batch)
            .is_some_and(|cached| cached.generation == self.generation)
        {
            return Ok(());
        }
        let generation = self.generation;
        let start = batch * BATCH_SIZE;
        let end = (start + BATCH_SIZE).min(self.ids.len());
        let items = self.fetch_items(&self.ids[start..end])?;
        self.install_batch(generation, batch, items);
        Ok(())
    }

    /// Stores a fetched batch unless the view moved on to a newer
    /// generation while the fetch ran.
    fn install_batch(&mut self, generation: u64, batch: usize, items: Vec<Option<T>>) {
        if generation != self.generation {
            debug!(
                "event=group_fetch module=grouping status=stale table={} batch={batch}",
                T::table()
            );
            return;
        }
        if self.cache.insert(batch, CachedBatch { generation, items }).is_none() {
            self.cache_order.push_back(batch);
        }
        while self.cache.len() > MAX_CACHED_BATCHES {
            match self.cache_order.pop_front() {
                Some(oldest) => {
                    self.cache.remove(&oldest);
                }
                None => break,
            }
        }
    }

    /// Fetches full rows for one batch, in key-scan order. A row that is
    /// missing or fails to parse becomes `None` for that slot only.
    fn fetch_items(&self, ids: &[ItemId]) -> StoreResult<Vec<Option<T>>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = (1..=ids.len())
            .map(|n| format!("?{n}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("{} WHERE id IN ({placeholders});", T::select_sql());
        let mut stmt = self.conn.prepare(&sql)?;
        let id_texts: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
        let mut rows = stmt.query(rusqlite::params_from_iter(id_texts.iter()))?;

        let mut by_id: HashMap<ItemId, T> = HashMap::with_capacity(ids.len());
        while let Some(row) = rows.next()? {
            let id = crate::collection::get_id(row, "id")?;
            match T::from_row(row) {
                Ok(item) => {
                    by_id.insert(id, item);
                }
                Err(err) => {
                    warn!(
                        "event=group_fetch module=grouping status=degraded table={} id={id} reason={err}",
                        T::table()
                    );
                }
            }
        }
        Ok(ids.iter().map(|id| by_id.remove(id)).collect())
    }
}

fn order_sql<T: Groupable>(options: GroupOptions) -> String {
    let column = T::sort_column(options.sort_by);
    let collation = if options.sort_by == SortBy::Title {
        " COLLATE NOCASE"
    } else {
        ""
    };
    let direction = match options.direction {
        SortDirection::Ascending => "ASC",
        SortDirection::Descending => "DESC",
    };
    format!("{column}{collation} {direction}, id ASC")
}

/// SQL expression for the group label of one key-scan row.
fn label_sql<T: Groupable>(options: GroupOptions) -> String {
    // Temporal groups follow the active sort column when it is a date,
    // otherwise creation time.
    let time_column = match options.sort_by {
        SortBy::Title => T::sort_column(SortBy::DateCreated),
        sort => T::sort_column(sort),
    };
    match options.group_by {
        GroupBy::None => "''".to_string(),
        GroupBy::Alphabetic => "upper(substr(trim(title), 1, 1))".to_string(),
        GroupBy::Year => {
            format!("strftime('%Y', {time_column} / 1000, 'unixepoch')")
        }
        GroupBy::Month => {
            format!("strftime('%Y-%m', {time_column} / 1000, 'unixepoch')")
        }
    }
}

impl Groupable for Note {
    fn select_sql() -> &'static str {
        notes::NOTE_SELECT_SQL
    }

    fn table() -> &'static str {
        "notes"
    }

    fn filter_sql() -> &'static str {
        "deleted = 0"
    }

    fn sort_column(sort: SortBy) -> &'static str {
        match sort {
            SortBy::Title => "title",
            SortBy::DateCreated => "date_created",
            SortBy::DateModified => "date_modified",
            SortBy::DateEdited => "date_edited",
        }
    }

    fn from_row(row: &Row<'_>) -> StoreResult<Self> {
        notes::parse_note_row(row)
    }
}

impl Groupable for Notebook {
    fn select_sql() -> &'static str {
        notebooks::NOTEBOOK_SELECT_SQL
    }

    fn table() -> &'static str {
        "notebooks"
    }

    fn filter_sql() -> &'static str {
        "deleted = 0"
    }

    fn sort_column(sort: SortBy) -> &'static str {
        match sort {
            SortBy::Title => "title",
            SortBy::DateCreated => "date_created",
            SortBy::DateModified | SortBy::DateEdited => "date_modified",
        }
    }

    fn from_row(row: &Row<'_>) -> StoreResult<Self> {
        notebooks::parse_notebook_row(row)
    }
}

impl Groupable for Keyword {
    fn select_sql() -> &'static str {
        "SELECT id, kind, title, date_created, date_modified FROM keywords"
    }

    fn table() -> &'static str {
        "keywords"
    }

    fn filter_sql() -> &'static str {
        "kind = 'tag'"
    }

    fn sort_column(sort: SortBy) -> &'static str {
        match sort {
            SortBy::Title => "title",
            SortBy::DateCreated => "date_created",
            SortBy::DateModified | SortBy::DateEdited => "date_modified",
        }
    }

    fn from_row(row: &Row<'_>) -> StoreResult<Self> {
        keywords::parse_keyword_row(row)
    }
}

impl Groupable for Reminder {
    fn select_sql() -> &'static str {
        reminders::REMINDER_SELECT_SQL
    }

    fn table() -> &'static str {
        "reminders"
    }

    fn filter_sql() -> &'static str {
        "1 = 1"
    }

    fn sort_column(sort: SortBy) -> &'static str {
        match sort {
            SortBy::Title => "title",
            SortBy::DateCreated => "date_created",
            SortBy::DateModified | SortBy::DateEdited => "date_modified",
        }
    }

    fn from_row(row: &Row<'_>) -> StoreResult<Self> {
        reminders::parse_reminder_row(row)
    }
}
