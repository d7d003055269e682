//! Event capture for simulation runs.
//!
//! A tracing subscriber files every event under its target ("production",
//! "placement", ...) as one row of a column table. Fields an event does not
//! carry are left null, so tables with optional fields stay aligned.
//!
//! ```ignore
//! let (_, log) = instrument::capture(|| sim.run(1_000));
//! let amounts = log.texts("production", "amount");
//! let refused = log.rows("placement");
//! ```

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Record};
use tracing::{Event, Id, Level, Metadata, Subscriber};

/// One value read off an event field.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    U64(u64),
    I64(i64),
    F64(f64),
    Bool(bool),
    Text(String),
}

/// Nullable column; its type is fixed by the first value it sees.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    U64(Vec<Option<u64>>),
    I64(Vec<Option<i64>>),
    F64(Vec<Option<f64>>),
    Bool(Vec<Option<bool>>),
    Text(Vec<Option<String>>),
}

impl Column {
    fn empty_like(cell: &Cell, rows: usize) -> Self {
        match cell {
            Cell::U64(_) => Column::U64(vec![None; rows]),
            Cell::I64(_) => Column::I64(vec![None; rows]),
            Cell::F64(_) => Column::F64(vec![None; rows]),
            Cell::Bool(_) => Column::Bool(vec![None; rows]),
            Cell::Text(_) => Column::Text(vec![None; rows]),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Column::U64(v) => v.len(),
            Column::I64(v) => v.len(),
            Column::F64(v) => v.len(),
            Column::Bool(v) => v.len(),
            Column::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push_null(&mut self) {
        match self {
            Column::U64(v) => v.push(None),
            Column::I64(v) => v.push(None),
            Column::F64(v) => v.push(None),
            Column::Bool(v) => v.push(None),
            Column::Text(v) => v.push(None),
        }
    }

    /// Push `cell`, or a null when its type disagrees with the column.
    fn push(&mut self, cell: Cell) {
        match (self, cell) {
            (Column::U64(v), Cell::U64(x)) => v.push(Some(x)),
            (Column::I64(v), Cell::I64(x)) => v.push(Some(x)),
            (Column::I64(v), Cell::U64(x)) => v.push(i64::try_from(x).ok()),
            (Column::U64(v), Cell::I64(x)) => v.push(u64::try_from(x).ok()),
            (Column::F64(v), Cell::F64(x)) => v.push(Some(x)),
            (Column::Bool(v), Cell::Bool(x)) => v.push(Some(x)),
            (Column::Text(v), Cell::Text(x)) => v.push(Some(x)),
            (column, _) => column.push_null(),
        }
    }
}

/// All events recorded for one target.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventTable {
    pub columns: BTreeMap<String, Column>,
    pub rows: usize,
}

impl EventTable {
    pub fn push_row(&mut self, cells: Vec<(String, Cell)>) {
        let rows = self.rows;
        for (name, cell) in cells {
            let column = self
                .columns
                .entry(name)
                .or_insert_with(|| Column::empty_like(&cell, rows));
            // A field repeated within one event keeps its first value
            if column.len() == rows {
                column.push(cell);
            }
        }
        self.rows += 1;
        for column in self.columns.values_mut() {
            if column.len() < self.rows {
                column.push_null();
            }
        }
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }
}

/// Event tables keyed by tracing target.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventLog {
    pub tables: BTreeMap<String, EventTable>,
}

impl EventLog {
    pub fn table(&self, target: &str) -> Option<&EventTable> {
        self.tables.get(target)
    }

    pub fn rows(&self, target: &str) -> usize {
        self.table(target).map_or(0, |t| t.rows)
    }

    /// Non-null values of a u64 column; empty if absent or differently typed.
    pub fn u64s(&self, target: &str, column: &str) -> Vec<u64> {
        match self.table(target).and_then(|t| t.column(column)) {
            Some(Column::U64(v)) => v.iter().flatten().copied().collect(),
            _ => Vec::new(),
        }
    }

    pub fn texts(&self, target: &str, column: &str) -> Vec<String> {
        match self.table(target).and_then(|t| t.column(column)) {
            Some(Column::Text(v)) => v.iter().flatten().cloned().collect(),
            _ => Vec::new(),
        }
    }

    pub fn bools(&self, target: &str, column: &str) -> Vec<bool> {
        match self.table(target).and_then(|t| t.column(column)) {
            Some(Column::Bool(v)) => v.iter().flatten().copied().collect(),
            _ => Vec::new(),
        }
    }
}

thread_local! {
    static LOG: RefCell<EventLog> = RefCell::default();
}

#[derive(Default)]
struct CellVisitor {
    cells: Vec<(String, Cell)>,
}

impl CellVisitor {
    fn put(&mut self, field: &Field, cell: Cell) {
        self.cells.push((field.name().to_string(), cell));
    }
}

impl Visit for CellVisitor {
    fn record_u64(&mut self, field: &Field, value: u64) {
        self.put(field, Cell::U64(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.put(field, Cell::I64(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.put(field, Cell::F64(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.put(field, Cell::Bool(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, Cell::Text(value.to_string()));
    }

    // Display-captured fields (`amount = %gold`) and the message land here
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.put(field, Cell::Text(format!("{:?}", value)));
    }
}

/// Subscriber that appends events to the thread-local [`EventLog`].
///
/// Spans are ignored. Every row gets a `level` column.
pub struct TableSubscriber {
    max_level: Level,
}

impl Default for TableSubscriber {
    fn default() -> Self {
        Self {
            max_level: Level::INFO,
        }
    }
}

impl TableSubscriber {
    /// Also keep debug events, such as scheduler bookkeeping.
    pub fn verbose() -> Self {
        Self {
            max_level: Level::DEBUG,
        }
    }
}

impl Subscriber for TableSubscriber {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.is_event() && *metadata.level() <= self.max_level
    }

    fn new_span(&self, _span: &Attributes<'_>) -> Id {
        Id::from_u64(1)
    }

    fn record(&self, _span: &Id, _values: &Record<'_>) {}

    fn record_follows_from(&self, _span: &Id, _follows: &Id) {}

    fn event(&self, event: &Event<'_>) {
        let metadata = event.metadata();
        let mut visitor = CellVisitor::default();
        visitor.cells.push((
            "level".to_string(),
            Cell::Text(metadata.level().as_str().to_ascii_lowercase()),
        ));
        event.record(&mut visitor);

        LOG.with(|log| {
            log.borrow_mut()
                .tables
                .entry(metadata.target().to_string())
                .or_default()
                .push_row(visitor.cells);
        });
    }

    fn enter(&self, _span: &Id) {}

    fn exit(&self, _span: &Id) {}
}

/// Install a [`TableSubscriber`] globally. Later calls are no-ops.
pub fn install() {
    let _ = tracing::subscriber::set_global_default(TableSubscriber::default());
}

/// Take everything recorded on this thread so far.
pub fn take() -> EventLog {
    LOG.with(|log| std::mem::take(&mut *log.borrow_mut()))
}

pub fn reset() {
    LOG.with(|log| *log.borrow_mut() = EventLog::default());
}

/// Run `f` under a scoped [`TableSubscriber`] and return what it logged.
pub fn capture<R>(f: impl FnOnce() -> R) -> (R, EventLog) {
    capture_with(TableSubscriber::default(), f)
}

pub fn capture_with<R>(subscriber: TableSubscriber, f: impl FnOnce() -> R) -> (R, EventLog) {
    reset();
    let out = tracing::subscriber::with_default(subscriber, f);
    (out, take())
}

// === Polars ===

use polars::prelude::*;

impl EventTable {
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let columns = self
            .columns
            .iter()
            .map(|(name, column)| match column {
                Column::U64(v) => polars::prelude::Column::new(name.into(), v),
                Column::I64(v) => polars::prelude::Column::new(name.into(), v),
                Column::F64(v) => polars::prelude::Column::new(name.into(), v),
                Column::Bool(v) => polars::prelude::Column::new(name.into(), v),
                Column::Text(v) => polars::prelude::Column::new(name.into(), v),
            })
            .collect();
        DataFrame::new(columns)
    }
}

impl EventLog {
    pub fn to_dataframes(&self) -> PolarsResult<BTreeMap<String, DataFrame>> {
        self.tables
            .iter()
            .map(|(target, table)| Ok((target.clone(), table.to_dataframe()?)))
            .collect()
    }
}

fn io_error(error: std::io::Error) -> PolarsError {
    PolarsError::IO {
        error: error.into(),
        msg: None,
    }
}

/// Write each frame to `{dir}/{target}.parquet`.
pub fn write_parquet(frames: &mut BTreeMap<String, DataFrame>, dir: &Path) -> PolarsResult<()> {
    std::fs::create_dir_all(dir).map_err(io_error)?;
    for (target, frame) in frames.iter_mut() {
        let file = std::fs::File::create(dir.join(format!("{target}.parquet"))).map_err(io_error)?;
        ParquetWriter::new(file).finish(frame)?;
    }
    Ok(())
}

fn run_dir_name(name: &str) -> String {
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let slug: String = name
        .chars()
        .take(48)
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{secs}_{slug}")
}

/// Records a long run and writes its tables as parquet when dropped.
///
/// Output goes to `{parent}/{unix_secs}_{name}/`, followed by an empty
/// `_ready` file once every table is on disk.
pub struct RunRecorder {
    dir: PathBuf,
    log: Option<EventLog>,
}

impl RunRecorder {
    pub fn new(parent: impl Into<PathBuf>, name: &str) -> Self {
        reset();
        install();
        Self {
            dir: parent.into().join(run_dir_name(name)),
            log: None,
        }
    }

    /// Events recorded so far. The first call takes them off the thread.
    pub fn log(&mut self) -> &EventLog {
        self.log.get_or_insert_with(take)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Drop for RunRecorder {
    fn drop(&mut self) {
        let log = self.log.take().unwrap_or_else(take);
        if log.tables.is_empty() {
            return;
        }
        let written = log
            .to_dataframes()
            .and_then(|mut frames| write_parquet(&mut frames, &self.dir).map(|_| frames.len()));
        match written {
            Ok(tables) => {
                if let Err(e) = std::fs::File::create(self.dir.join("_ready")) {
                    eprintln!("RunRecorder: {}: {}", self.dir.display(), e);
                } else {
                    eprintln!("RunRecorder: {} tables in {}", tables, self.dir.display());
                }
            }
            Err(e) => eprintln!("RunRecorder: {}: {}", self.dir.display(), e),
        }
    }
}
