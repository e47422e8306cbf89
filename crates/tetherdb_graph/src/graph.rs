//! In-memory reference engine.
//!
//! [`MemGraph`] is a complete, transactional object graph kept in memory. It
//! exists for two reasons: tests need a real producer of transaction logs,
//! and the change-tracking crates need a concrete [`GraphSnapshot`] /
//! [`LogSource`] to develop against.
//!
//! Every mutation goes through one path: the public method validates its
//! arguments, expresses the mutation as [`Instruction`]s, and each
//! instruction is applied to the state and appended to the open transaction.
//! `snapshot_at` replays the recorded history through the same interpreter,
//! so a reconstructed state can never drift from the live one.
//!
//! The engine also reproduces the bookkeeping a real storage engine performs
//! around structural row changes:
//!
//! - before a row is erased, every stored link to it is nullified, and the
//!   nullification is emitted to the log
//! - when a row changes position (move-last-over, swap, move, ordered
//!   shifts), stored links follow it silently, with no log instruction
//! - a unique-key collision merges the two rows and emits
//!   [`Instruction::MergeRows`] ahead of the erase that resolves it

use crate::error::{GraphError, GraphResult};
use crate::keys::{ColKey, TableKey, Version};
use crate::log::{CommittedLog, Instruction, Value};
use crate::schema::{ColumnDef, ColumnKind, Schema, TableDef};
use crate::snapshot::{GraphSnapshot, LogSource, SnapshotSource};

#[derive(Debug, Clone)]
enum ColumnData {
    Int(Vec<i64>),
    Link(Vec<Option<usize>>),
    List(Vec<Vec<usize>>),
}

impl ColumnData {
    fn new(kind: ColumnKind, rows: usize) -> Self {
        match kind {
            ColumnKind::Scalar => Self::Int(vec![0; rows]),
            ColumnKind::Link { .. } => Self::Link(vec![None; rows]),
            ColumnKind::LinkList { .. } => Self::List(vec![Vec::new(); rows]),
        }
    }

    fn insert_default(&mut self, at: usize, count: usize) {
        match self {
            Self::Int(cells) => {
                for _ in 0..count {
                    cells.insert(at, 0);
                }
            }
            Self::Link(cells) => {
                for _ in 0..count {
                    cells.insert(at, None);
                }
            }
            Self::List(cells) => {
                for _ in 0..count {
                    cells.insert(at, Vec::new());
                }
            }
        }
    }

    fn remove(&mut self, at: usize) {
        match self {
            Self::Int(cells) => {
                cells.remove(at);
            }
            Self::Link(cells) => {
                cells.remove(at);
            }
            Self::List(cells) => {
                cells.remove(at);
            }
        }
    }

    fn swap_remove(&mut self, at: usize) {
        match self {
            Self::Int(cells) => {
                cells.swap_remove(at);
            }
            Self::Link(cells) => {
                cells.swap_remove(at);
            }
            Self::List(cells) => {
                cells.swap_remove(at);
            }
        }
    }

    fn swap(&mut self, a: usize, b: usize) {
        match self {
            Self::Int(cells) => cells.swap(a, b),
            Self::Link(cells) => cells.swap(a, b),
            Self::List(cells) => cells.swap(a, b),
        }
    }

    fn move_entry(&mut self, from: usize, to: usize) {
        match self {
            Self::Int(cells) => {
                let cell = cells.remove(from);
                cells.insert(to, cell);
            }
            Self::Link(cells) => {
                let cell = cells.remove(from);
                cells.insert(to, cell);
            }
            Self::List(cells) => {
                let cell = cells.remove(from);
                cells.insert(to, cell);
            }
        }
    }

    fn clear(&mut self) {
        match self {
            Self::Int(cells) => cells.clear(),
            Self::Link(cells) => cells.clear(),
            Self::List(cells) => cells.clear(),
        }
    }
}

#[derive(Debug, Clone)]
struct Column {
    key: ColKey,
    name: String,
    kind: ColumnKind,
    data: ColumnData,
}

#[derive(Debug, Clone)]
struct Table {
    key: TableKey,
    name: String,
    columns: Vec<Column>,
    rows: usize,
}

/// Interpreter selection state, one per transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Cursor {
    table: Option<usize>,
    list: Option<(usize, usize)>,
}

#[derive(Debug, Default)]
struct OpenLog {
    instructions: Vec<Instruction>,
    cursor: Cursor,
}

enum LinkFilter {
    Row(usize),
    Any,
}

/// An in-memory transactional object graph.
///
/// See the module documentation for the role this type plays. All mutation
/// methods require an open transaction and return
/// [`GraphError::NoOpenTransaction`] otherwise.
#[derive(Debug, Default)]
pub struct MemGraph {
    tables: Vec<Table>,
    next_table_key: u32,
    next_col_key: u32,
    version: Version,
    history: Vec<CommittedLog>,
    open: Option<OpenLog>,
}

impl MemGraph {
    /// Creates an empty graph at version 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true while a transaction is open.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.open.is_some()
    }

    /// Opens a transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if a transaction is already open.
    pub fn begin_transaction(&mut self) -> GraphResult<()> {
        if self.open.is_some() {
            return Err(GraphError::TransactionInProgress);
        }
        self.open = Some(OpenLog::default());
        Ok(())
    }

    /// Commits the open transaction and returns the new version.
    ///
    /// # Errors
    ///
    /// Returns an error if no transaction is open.
    pub fn commit(&mut self) -> GraphResult<Version> {
        let open = self.open.take().ok_or(GraphError::NoOpenTransaction)?;
        self.version = self.version.next();
        self.history.push(CommittedLog {
            version: self.version,
            instructions: open.instructions,
        });
        Ok(self.version)
    }

    // === Structural operations ===

    /// Creates a table at the end of the table list.
    ///
    /// # Errors
    ///
    /// Returns an error if no transaction is open.
    pub fn add_table(&mut self, name: &str) -> GraphResult<TableKey> {
        self.insert_table(self.tables.len(), name)
    }

    /// Creates a table at `ndx`, shifting later tables up.
    ///
    /// # Errors
    ///
    /// Returns an error if the position is out of range or no transaction is
    /// open.
    pub fn insert_table(&mut self, ndx: usize, name: &str) -> GraphResult<TableKey> {
        if ndx > self.tables.len() {
            return Err(GraphError::PositionOutOfRange {
                position: ndx,
                len: self.tables.len(),
            });
        }
        let key = TableKey::new(self.next_table_key);
        self.next_table_key += 1;
        self.emit(Instruction::InsertTable {
            ndx,
            key,
            name: name.to_owned(),
        })?;
        Ok(key)
    }

    /// Moves a table from one position to another.
    ///
    /// # Errors
    ///
    /// Returns an error if either position is out of range or no transaction
    /// is open.
    pub fn move_table(&mut self, from: usize, to: usize) -> GraphResult<()> {
        let len = self.tables.len();
        for position in [from, to] {
            if position >= len {
                return Err(GraphError::PositionOutOfRange { position, len });
            }
        }
        self.emit(Instruction::MoveTable { from, to })
    }

    /// Erases a table.
    ///
    /// # Errors
    ///
    /// Returns an error if the table does not exist, another table still has
    /// link columns pointing into it, or no transaction is open.
    pub fn erase_table(&mut self, table: TableKey) -> GraphResult<()> {
        let ndx = self.table_pos(table)?;
        let in_use = self.tables.iter().any(|t| {
            t.key != table && t.columns.iter().any(|c| c.kind.target() == Some(table))
        });
        if in_use {
            return Err(GraphError::TargetOfLinks { table });
        }
        self.emit(Instruction::EraseTable { ndx })
    }

    /// Adds a column at the end of a table's column list.
    ///
    /// # Errors
    ///
    /// Returns an error if the table (or a link target) does not exist or no
    /// transaction is open.
    pub fn add_column(
        &mut self,
        table: TableKey,
        name: &str,
        kind: ColumnKind,
    ) -> GraphResult<ColKey> {
        let pos = self.table_pos(table)?;
        let ndx = self.tables[pos].columns.len();
        self.insert_column(table, ndx, name, kind)
    }

    /// Adds a column to a table at `ndx`, shifting later columns up.
    ///
    /// # Errors
    ///
    /// Returns an error if the table (or a link target) does not exist, the
    /// position is out of range, or no transaction is open.
    pub fn insert_column(
        &mut self,
        table: TableKey,
        ndx: usize,
        name: &str,
        kind: ColumnKind,
    ) -> GraphResult<ColKey> {
        let pos = self.table_pos(table)?;
        let cols = self.tables[pos].columns.len();
        if ndx > cols {
            return Err(GraphError::PositionOutOfRange {
                position: ndx,
                len: cols,
            });
        }
        if let Some(target) = kind.target() {
            self.table_pos(target)?;
        }
        let key = ColKey::new(self.next_col_key);
        self.next_col_key += 1;
        self.ensure_table_selected(pos)?;
        self.emit(Instruction::InsertColumn {
            ndx,
            key,
            name: name.to_owned(),
            kind,
        })?;
        Ok(key)
    }

    /// Moves a column of a table from one position to another.
    ///
    /// # Errors
    ///
    /// Returns an error if the table does not exist, a position is out of
    /// range, or no transaction is open.
    pub fn move_column(&mut self, table: TableKey, from: usize, to: usize) -> GraphResult<()> {
        let pos = self.table_pos(table)?;
        let len = self.tables[pos].columns.len();
        for position in [from, to] {
            if position >= len {
                return Err(GraphError::PositionOutOfRange { position, len });
            }
        }
        self.ensure_table_selected(pos)?;
        self.emit(Instruction::MoveColumn { from, to })
    }

    /// Erases a column of a table.
    ///
    /// # Errors
    ///
    /// Returns an error if the table or column does not exist or no
    /// transaction is open.
    pub fn erase_column(&mut self, table: TableKey, col: ColKey) -> GraphResult<()> {
        let pos = self.table_pos(table)?;
        let ndx = self.col_ndx(pos, col)?;
        self.ensure_table_selected(pos)?;
        self.emit(Instruction::EraseColumn { ndx })
    }

    // === Row operations ===

    /// Appends one row and returns its index.
    ///
    /// # Errors
    ///
    /// Returns an error if the table does not exist or no transaction is
    /// open.
    pub fn add_row(&mut self, table: TableKey) -> GraphResult<usize> {
        self.add_rows(table, 1)
    }

    /// Appends `count` rows and returns the index of the first.
    ///
    /// # Errors
    ///
    /// Returns an error if the table does not exist or no transaction is
    /// open.
    pub fn add_rows(&mut self, table: TableKey, count: usize) -> GraphResult<usize> {
        let pos = self.table_pos(table)?;
        let rows = self.tables[pos].rows;
        self.ensure_table_selected(pos)?;
        self.emit(Instruction::InsertRows {
            row: rows,
            count,
            prior_rows: rows,
        })?;
        Ok(rows)
    }

    /// Inserts `count` rows at `row`, shifting later rows up.
    ///
    /// # Errors
    ///
    /// Returns an error if the table does not exist, the row is out of
    /// range, or no transaction is open.
    pub fn insert_rows(&mut self, table: TableKey, row: usize, count: usize) -> GraphResult<()> {
        let pos = self.table_pos(table)?;
        let rows = self.tables[pos].rows;
        if row > rows {
            return Err(GraphError::RowOutOfRange { row, len: rows });
        }
        self.ensure_table_selected(pos)?;
        self.emit(Instruction::InsertRows {
            row,
            count,
            prior_rows: rows,
        })
    }

    /// Erases a row, shifting later rows down.
    ///
    /// Stored links to the row are nullified first; stored links to later
    /// rows follow their targets silently.
    ///
    /// # Errors
    ///
    /// Returns an error if the table or row does not exist or no transaction
    /// is open.
    pub fn erase_row(&mut self, table: TableKey, row: usize) -> GraphResult<()> {
        let pos = self.table_pos(table)?;
        self.check_row(pos, row)?;
        self.nullify_links_into(pos, &LinkFilter::Row(row))?;
        let prior = self.tables[pos].rows;
        self.ensure_table_selected(pos)?;
        self.emit(Instruction::EraseRows {
            row,
            prior_rows: prior,
            unordered: false,
        })
    }

    /// Erases a row by moving the last row into its slot.
    ///
    /// Stored links to the erased row are nullified first; stored links to
    /// the relocated row follow it silently.
    ///
    /// # Errors
    ///
    /// Returns an error if the table or row does not exist or no transaction
    /// is open.
    pub fn move_last_over(&mut self, table: TableKey, row: usize) -> GraphResult<()> {
        let pos = self.table_pos(table)?;
        self.check_row(pos, row)?;
        self.move_last_over_at(pos, row)
    }

    fn move_last_over_at(&mut self, pos: usize, row: usize) -> GraphResult<()> {
        self.nullify_links_into(pos, &LinkFilter::Row(row))?;
        let prior = self.tables[pos].rows;
        self.ensure_table_selected(pos)?;
        self.emit(Instruction::EraseRows {
            row,
            prior_rows: prior,
            unordered: true,
        })
    }

    /// Exchanges the positions of two rows. Equal indices are a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the table or a row does not exist or no
    /// transaction is open.
    pub fn swap_rows(&mut self, table: TableKey, row_1: usize, row_2: usize) -> GraphResult<()> {
        let pos = self.table_pos(table)?;
        self.check_row(pos, row_1)?;
        self.check_row(pos, row_2)?;
        if row_1 == row_2 {
            return Ok(());
        }
        self.ensure_table_selected(pos)?;
        self.emit(Instruction::SwapRows { row_1, row_2 })
    }

    /// Moves a row from one position to another, shifting rows in between.
    ///
    /// # Errors
    ///
    /// Returns an error if the table or a row does not exist or no
    /// transaction is open.
    pub fn move_row(&mut self, table: TableKey, from: usize, to: usize) -> GraphResult<()> {
        let pos = self.table_pos(table)?;
        self.check_row(pos, from)?;
        self.check_row(pos, to)?;
        self.ensure_table_selected(pos)?;
        self.emit(Instruction::MoveRow { from, to })
    }

    /// Removes every row of a table.
    ///
    /// Stored links into the table are nullified first.
    ///
    /// # Errors
    ///
    /// Returns an error if the table does not exist or no transaction is
    /// open.
    pub fn clear(&mut self, table: TableKey) -> GraphResult<()> {
        let pos = self.table_pos(table)?;
        self.nullify_links_into(pos, &LinkFilter::Any)?;
        let prior = self.tables[pos].rows;
        self.ensure_table_selected(pos)?;
        self.emit(Instruction::ClearTable { prior_rows: prior })
    }

    // === Value operations ===

    /// Assigns a scalar value.
    ///
    /// # Errors
    ///
    /// Returns an error if the cell does not exist, the column is not a
    /// scalar column, or no transaction is open.
    pub fn set_int(&mut self, table: TableKey, col: ColKey, row: usize, value: i64) -> GraphResult<()> {
        self.set_int_impl(table, col, row, value, false)
    }

    /// Assigns a scalar default value.
    ///
    /// Default assignments are part of object initialization and are ignored
    /// by change tracking.
    ///
    /// # Errors
    ///
    /// Returns an error if the cell does not exist, the column is not a
    /// scalar column, or no transaction is open.
    pub fn set_int_default(
        &mut self,
        table: TableKey,
        col: ColKey,
        row: usize,
        value: i64,
    ) -> GraphResult<()> {
        self.set_int_impl(table, col, row, value, true)
    }

    fn set_int_impl(
        &mut self,
        table: TableKey,
        col: ColKey,
        row: usize,
        value: i64,
        is_default: bool,
    ) -> GraphResult<()> {
        let (pos, col_ndx) = self.locate(table, col, row, "scalar")?;
        self.ensure_table_selected(pos)?;
        self.emit(Instruction::SetValue {
            col_ndx,
            row,
            value: Value::Int(value),
            is_default,
        })
    }

    /// Assigns a unique-key scalar value.
    ///
    /// When another row already holds `value` in this column, the two rows
    /// are merged: the freshly created row and the existing row become one
    /// object, and the redundant slot is erased. The merge is emitted to the
    /// log as [`Instruction::MergeRows`] followed by the erase.
    ///
    /// # Errors
    ///
    /// Returns an error if the cell does not exist, the column is not a
    /// scalar column, or no transaction is open.
    pub fn set_int_unique(
        &mut self,
        table: TableKey,
        col: ColKey,
        row: usize,
        value: i64,
    ) -> GraphResult<()> {
        let (pos, col_ndx) = self.locate(table, col, row, "scalar")?;
        let existing = match &self.tables[pos].columns[col_ndx].data {
            ColumnData::Int(cells) => cells
                .iter()
                .enumerate()
                .position(|(r, &v)| r != row && v == value),
            _ => None,
        };
        self.ensure_table_selected(pos)?;
        self.emit(Instruction::SetUnique {
            col_ndx,
            row,
            value: Value::Int(value),
        })?;

        let Some(existing) = existing else {
            return Ok(());
        };
        let last = self.tables[pos].rows - 1;
        if row == last {
            // The fresh row loses: its identity continues as the existing row.
            self.emit(Instruction::MergeRows {
                row,
                new_row: existing,
            })?;
            self.emit(Instruction::EraseRows {
                row,
                prior_rows: last + 1,
                unordered: true,
            })
        } else {
            // The existing row's slot is vacated: its identity continues as
            // the fresh row, and the last row fills the hole.
            self.emit(Instruction::MergeRows {
                row: existing,
                new_row: row,
            })?;
            self.move_last_over_at(pos, existing)
        }
    }

    /// Assigns a link cell.
    ///
    /// # Errors
    ///
    /// Returns an error if the cell or target row does not exist, the column
    /// is not a link column, or no transaction is open.
    pub fn set_link(
        &mut self,
        table: TableKey,
        col: ColKey,
        row: usize,
        target: Option<usize>,
    ) -> GraphResult<()> {
        let (pos, col_ndx) = self.locate(table, col, row, "link")?;
        if let Some(target_row) = target {
            let target_key = self.link_target(pos, col_ndx)?;
            let target_pos = self.table_pos(target_key)?;
            self.check_row(target_pos, target_row)?;
        }
        self.ensure_table_selected(pos)?;
        self.emit(Instruction::SetValue {
            col_ndx,
            row,
            value: Value::Link(target),
            is_default: false,
        })
    }

    // === List operations ===

    /// Appends an entry to a link list and returns its index.
    ///
    /// # Errors
    ///
    /// Returns an error if the list or target row does not exist or no
    /// transaction is open.
    pub fn list_add(
        &mut self,
        table: TableKey,
        col: ColKey,
        row: usize,
        target: usize,
    ) -> GraphResult<usize> {
        let len = self.list_len(table, col, row)?;
        self.list_insert(table, col, row, len, target)?;
        Ok(len)
    }

    /// Inserts an entry into a link list, shifting later entries up.
    ///
    /// # Errors
    ///
    /// Returns an error if the list, index, or target row does not exist or
    /// no transaction is open.
    pub fn list_insert(
        &mut self,
        table: TableKey,
        col: ColKey,
        row: usize,
        ndx: usize,
        target: usize,
    ) -> GraphResult<usize> {
        let (pos, col_ndx) = self.locate(table, col, row, "link list")?;
        let len = self.list_len_at(pos, col_ndx, row)?;
        if ndx > len {
            return Err(GraphError::ListIndexOutOfRange { index: ndx, len });
        }
        self.check_list_target(pos, col_ndx, target)?;
        self.ensure_list_selected(pos, col_ndx, row)?;
        self.emit(Instruction::ListInsert { ndx, target })?;
        Ok(ndx)
    }

    /// Assigns a new target to a link list entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the list, index, or target row does not exist or
    /// no transaction is open.
    pub fn list_set(
        &mut self,
        table: TableKey,
        col: ColKey,
        row: usize,
        ndx: usize,
        target: usize,
    ) -> GraphResult<()> {
        let (pos, col_ndx) = self.locate(table, col, row, "link list")?;
        let len = self.list_len_at(pos, col_ndx, row)?;
        if ndx >= len {
            return Err(GraphError::ListIndexOutOfRange { index: ndx, len });
        }
        self.check_list_target(pos, col_ndx, target)?;
        self.ensure_list_selected(pos, col_ndx, row)?;
        self.emit(Instruction::ListSet { ndx, target })
    }

    /// Moves a link list entry, shifting entries in between.
    ///
    /// # Errors
    ///
    /// Returns an error if the list or an index does not exist or no
    /// transaction is open.
    pub fn list_move(
        &mut self,
        table: TableKey,
        col: ColKey,
        row: usize,
        from: usize,
        to: usize,
    ) -> GraphResult<()> {
        let (pos, col_ndx) = self.locate(table, col, row, "link list")?;
        let len = self.list_len_at(pos, col_ndx, row)?;
        for index in [from, to] {
            if index >= len {
                return Err(GraphError::ListIndexOutOfRange { index, len });
            }
        }
        self.ensure_list_selected(pos, col_ndx, row)?;
        self.emit(Instruction::ListMove { from, to })
    }

    /// Exchanges two link list entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the list or an index does not exist or no
    /// transaction is open.
    pub fn list_swap(
        &mut self,
        table: TableKey,
        col: ColKey,
        row: usize,
        ndx_1: usize,
        ndx_2: usize,
    ) -> GraphResult<()> {
        let (pos, col_ndx) = self.locate(table, col, row, "link list")?;
        let len = self.list_len_at(pos, col_ndx, row)?;
        for index in [ndx_1, ndx_2] {
            if index >= len {
                return Err(GraphError::ListIndexOutOfRange { index, len });
            }
        }
        self.ensure_list_selected(pos, col_ndx, row)?;
        self.emit(Instruction::ListSwap { ndx_1, ndx_2 })
    }

    /// Removes a link list entry, shifting later entries down.
    ///
    /// # Errors
    ///
    /// Returns an error if the list or index does not exist or no
    /// transaction is open.
    pub fn list_erase(
        &mut self,
        table: TableKey,
        col: ColKey,
        row: usize,
        ndx: usize,
    ) -> GraphResult<()> {
        let (pos, col_ndx) = self.locate(table, col, row, "link list")?;
        let len = self.list_len_at(pos, col_ndx, row)?;
        if ndx >= len {
            return Err(GraphError::ListIndexOutOfRange { index: ndx, len });
        }
        self.ensure_list_selected(pos, col_ndx, row)?;
        self.emit(Instruction::ListErase { ndx })
    }

    /// Removes every entry of a link list.
    ///
    /// # Errors
    ///
    /// Returns an error if the list does not exist or no transaction is
    /// open.
    pub fn list_clear(&mut self, table: TableKey, col: ColKey, row: usize) -> GraphResult<()> {
        let (pos, col_ndx) = self.locate(table, col, row, "link list")?;
        let prior_size = self.list_len_at(pos, col_ndx, row)?;
        self.ensure_list_selected(pos, col_ndx, row)?;
        self.emit(Instruction::ListClear { prior_size })
    }

    /// Deletes every row a link list points at, via move-last-over.
    ///
    /// The list empties as a side effect of the deletions.
    ///
    /// # Errors
    ///
    /// Returns an error if the list does not exist or no transaction is
    /// open.
    pub fn remove_all_target_rows(
        &mut self,
        table: TableKey,
        col: ColKey,
        row: usize,
    ) -> GraphResult<()> {
        let (pos, col_ndx) = self.locate(table, col, row, "link list")?;
        let target_key = self.link_target(pos, col_ndx)?;
        loop {
            let first = match &self.tables[pos].columns[col_ndx].data {
                ColumnData::List(cells) => cells[row].first().copied(),
                _ => None,
            };
            let Some(target_row) = first else {
                return Ok(());
            };
            self.move_last_over(target_key, target_row)?;
        }
    }

    // === Reads ===

    /// Reads a scalar cell.
    ///
    /// # Errors
    ///
    /// Returns an error if the cell does not exist or the column is not a
    /// scalar column.
    pub fn get_int(&self, table: TableKey, col: ColKey, row: usize) -> GraphResult<i64> {
        let (pos, col_ndx) = self.locate(table, col, row, "scalar")?;
        match &self.tables[pos].columns[col_ndx].data {
            ColumnData::Int(cells) => Ok(cells[row]),
            _ => Err(GraphError::ColumnKindMismatch {
                column: col,
                expected: "scalar",
            }),
        }
    }

    /// Returns the length of a link list.
    ///
    /// # Errors
    ///
    /// Returns an error if the list does not exist.
    pub fn list_len(&self, table: TableKey, col: ColKey, row: usize) -> GraphResult<usize> {
        let (pos, col_ndx) = self.locate(table, col, row, "link list")?;
        self.list_len_at(pos, col_ndx, row)
    }

    /// Reconstructs the graph as of a committed version by replaying the
    /// recorded history.
    ///
    /// # Errors
    ///
    /// Returns an error if the version has not been committed.
    pub fn snapshot_at(&self, version: Version) -> GraphResult<MemGraph> {
        if version > self.version {
            return Err(GraphError::UnknownVersion { version });
        }
        let mut graph = MemGraph::new();
        for log in &self.history {
            if log.version > version {
                break;
            }
            let mut cursor = Cursor::default();
            for instr in &log.instructions {
                match instr {
                    Instruction::InsertTable { key, .. } => {
                        graph.next_table_key = graph.next_table_key.max(key.value() + 1);
                    }
                    Instruction::InsertColumn { key, .. } => {
                        graph.next_col_key = graph.next_col_key.max(key.value() + 1);
                    }
                    _ => {}
                }
                apply(&mut graph.tables, &mut cursor, instr)?;
            }
            graph.version = log.version;
            graph.history.push(log.clone());
        }
        Ok(graph)
    }

    // === Internal helpers ===

    fn table_pos(&self, table: TableKey) -> GraphResult<usize> {
        self.tables
            .iter()
            .position(|t| t.key == table)
            .ok_or(GraphError::UnknownTable { table })
    }

    fn col_ndx(&self, table_pos: usize, col: ColKey) -> GraphResult<usize> {
        let table = &self.tables[table_pos];
        table
            .columns
            .iter()
            .position(|c| c.key == col)
            .ok_or(GraphError::UnknownColumn {
                table: table.key,
                column: col,
            })
    }

    fn check_row(&self, table_pos: usize, row: usize) -> GraphResult<()> {
        let len = self.tables[table_pos].rows;
        if row >= len {
            return Err(GraphError::RowOutOfRange { row, len });
        }
        Ok(())
    }

    /// Resolves a cell and checks the column kind.
    fn locate(
        &self,
        table: TableKey,
        col: ColKey,
        row: usize,
        expected: &'static str,
    ) -> GraphResult<(usize, usize)> {
        let pos = self.table_pos(table)?;
        let col_ndx = self.col_ndx(pos, col)?;
        self.check_row(pos, row)?;
        let matches = match self.tables[pos].columns[col_ndx].kind {
            ColumnKind::Scalar => expected == "scalar",
            ColumnKind::Link { .. } => expected == "link",
            ColumnKind::LinkList { .. } => expected == "link list",
        };
        if !matches {
            return Err(GraphError::ColumnKindMismatch {
                column: col,
                expected,
            });
        }
        Ok((pos, col_ndx))
    }

    fn link_target(&self, table_pos: usize, col_ndx: usize) -> GraphResult<TableKey> {
        let col = &self.tables[table_pos].columns[col_ndx];
        col.kind.target().ok_or(GraphError::ColumnKindMismatch {
            column: col.key,
            expected: "link",
        })
    }

    fn check_list_target(&self, table_pos: usize, col_ndx: usize, target: usize) -> GraphResult<()> {
        let target_key = self.link_target(table_pos, col_ndx)?;
        let target_pos = self.table_pos(target_key)?;
        self.check_row(target_pos, target)
    }

    fn list_len_at(&self, table_pos: usize, col_ndx: usize, row: usize) -> GraphResult<usize> {
        match &self.tables[table_pos].columns[col_ndx].data {
            ColumnData::List(cells) => Ok(cells[row].len()),
            _ => Err(GraphError::ColumnKindMismatch {
                column: self.tables[table_pos].columns[col_ndx].key,
                expected: "link list",
            }),
        }
    }

    fn cursor(&self) -> GraphResult<Cursor> {
        self.open
            .as_ref()
            .map(|o| o.cursor)
            .ok_or(GraphError::NoOpenTransaction)
    }

    fn ensure_table_selected(&mut self, ndx: usize) -> GraphResult<()> {
        if self.cursor()?.table != Some(ndx) {
            self.emit(Instruction::SelectTable { ndx })?;
        }
        Ok(())
    }

    fn ensure_list_selected(&mut self, table_ndx: usize, col_ndx: usize, row: usize) -> GraphResult<()> {
        self.ensure_table_selected(table_ndx)?;
        if self.cursor()?.list != Some((col_ndx, row)) {
            self.emit(Instruction::SelectList { col_ndx, row })?;
        }
        Ok(())
    }

    /// Applies an instruction to the state and appends it to the open log.
    fn emit(&mut self, instr: Instruction) -> GraphResult<()> {
        let open = self.open.as_mut().ok_or(GraphError::NoOpenTransaction)?;
        apply(&mut self.tables, &mut open.cursor, &instr)?;
        open.instructions.push(instr);
        Ok(())
    }

    /// Nullifies stored links into `table_pos` that match the filter,
    /// emitting the nullification instructions a real engine would.
    ///
    /// Cells owned by the dying row itself are skipped: they disappear with
    /// the row.
    fn nullify_links_into(&mut self, table_pos: usize, filter: &LinkFilter) -> GraphResult<()> {
        let target_key = self.tables[table_pos].key;
        let mut sites = Vec::new();
        for (p, table) in self.tables.iter().enumerate() {
            for (c, col) in table.columns.iter().enumerate() {
                if col.kind.target() != Some(target_key) {
                    continue;
                }
                if p == table_pos && matches!(filter, LinkFilter::Any) {
                    continue;
                }
                let is_list = matches!(col.kind, ColumnKind::LinkList { .. });
                sites.push((p, c, is_list));
            }
        }

        let matches = |v: usize| match *filter {
            LinkFilter::Row(row) => v == row,
            LinkFilter::Any => true,
        };
        let skip_owner = |p: usize, r: usize| match *filter {
            LinkFilter::Row(row) => p == table_pos && r == row,
            LinkFilter::Any => false,
        };

        for (p, c, is_list) in sites {
            if is_list {
                loop {
                    let hit = match &self.tables[p].columns[c].data {
                        ColumnData::List(cells) => cells.iter().enumerate().find_map(|(r, list)| {
                            if skip_owner(p, r) {
                                return None;
                            }
                            list.iter().position(|&v| matches(v)).map(|ndx| (r, ndx))
                        }),
                        _ => None,
                    };
                    let Some((r, ndx)) = hit else { break };
                    self.ensure_list_selected(p, c, r)?;
                    self.emit(Instruction::ListNullify { ndx })?;
                }
            } else {
                let hits: Vec<usize> = match &self.tables[p].columns[c].data {
                    ColumnData::Link(cells) => cells
                        .iter()
                        .enumerate()
                        .filter_map(|(r, cell)| match cell {
                            Some(v) if matches(*v) && !skip_owner(p, r) => Some(r),
                            _ => None,
                        })
                        .collect(),
                    _ => Vec::new(),
                };
                for r in hits {
                    self.ensure_table_selected(p)?;
                    self.emit(Instruction::NullifyLink { col_ndx: c, row: r })?;
                }
            }
        }
        Ok(())
    }
}

/// Rewrites every stored link into `target` through `f`.
fn renumber_links(tables: &mut [Table], target: TableKey, f: impl Fn(usize) -> usize) {
    for table in tables.iter_mut() {
        for col in table.columns.iter_mut() {
            if col.kind.target() != Some(target) {
                continue;
            }
            match &mut col.data {
                ColumnData::Link(cells) => {
                    for cell in cells.iter_mut().flatten() {
                        *cell = f(*cell);
                    }
                }
                ColumnData::List(cells) => {
                    for list in cells.iter_mut() {
                        for entry in list.iter_mut() {
                            *entry = f(*entry);
                        }
                    }
                }
                ColumnData::Int(_) => {}
            }
        }
    }
}

fn selected_table<'a>(
    tables: &'a mut Vec<Table>,
    cursor: &Cursor,
) -> GraphResult<(usize, &'a mut Table)> {
    let ndx = cursor
        .table
        .ok_or_else(|| GraphError::malformed("row operation with no selected table"))?;
    let len = tables.len();
    let table = tables
        .get_mut(ndx)
        .ok_or(GraphError::PositionOutOfRange { position: ndx, len })?;
    Ok((ndx, table))
}

fn selected_list<'a>(tables: &'a mut Vec<Table>, cursor: &Cursor) -> GraphResult<&'a mut Vec<usize>> {
    let (_, table) = selected_table(tables, cursor)?;
    let (col_ndx, row) = cursor
        .list
        .ok_or_else(|| GraphError::malformed("list operation with no selected list"))?;
    let rows = table.rows;
    let cols = table.columns.len();
    let col = table
        .columns
        .get_mut(col_ndx)
        .ok_or(GraphError::PositionOutOfRange {
            position: col_ndx,
            len: cols,
        })?;
    let key = col.key;
    match &mut col.data {
        ColumnData::List(cells) => cells
            .get_mut(row)
            .ok_or(GraphError::RowOutOfRange { row, len: rows }),
        _ => Err(GraphError::ColumnKindMismatch {
            column: key,
            expected: "link list",
        }),
    }
}

/// The single interpreter for instruction streams.
///
/// Both live mutation and history replay go through here, so the two can
/// never disagree about what an instruction means.
#[allow(clippy::too_many_lines)]
fn apply(tables: &mut Vec<Table>, cursor: &mut Cursor, instr: &Instruction) -> GraphResult<()> {
    match *instr {
        Instruction::SelectTable { ndx } => {
            if ndx >= tables.len() {
                return Err(GraphError::PositionOutOfRange {
                    position: ndx,
                    len: tables.len(),
                });
            }
            cursor.table = Some(ndx);
            cursor.list = None;
        }

        Instruction::SelectList { col_ndx, row } => {
            let (_, table) = selected_table(tables, cursor)?;
            let cols = table.columns.len();
            let col = table
                .columns
                .get(col_ndx)
                .ok_or(GraphError::PositionOutOfRange {
                    position: col_ndx,
                    len: cols,
                })?;
            if !matches!(col.kind, ColumnKind::LinkList { .. }) {
                return Err(GraphError::ColumnKindMismatch {
                    column: col.key,
                    expected: "link list",
                });
            }
            if row >= table.rows {
                return Err(GraphError::RowOutOfRange {
                    row,
                    len: table.rows,
                });
            }
            cursor.list = Some((col_ndx, row));
        }

        Instruction::InsertRows { row, count, prior_rows } => {
            let (_, table) = selected_table(tables, cursor)?;
            if prior_rows != table.rows {
                return Err(GraphError::malformed("insert with stale row count"));
            }
            if row > table.rows {
                return Err(GraphError::RowOutOfRange {
                    row,
                    len: table.rows,
                });
            }
            let key = table.key;
            for col in table.columns.iter_mut() {
                col.data.insert_default(row, count);
            }
            table.rows += count;
            renumber_links(tables, key, |v| if v >= row { v + count } else { v });
            cursor.list = None;
        }

        Instruction::EraseRows { row, prior_rows, unordered } => {
            let (_, table) = selected_table(tables, cursor)?;
            if prior_rows != table.rows {
                return Err(GraphError::malformed("erase with stale row count"));
            }
            if row >= table.rows {
                return Err(GraphError::RowOutOfRange {
                    row,
                    len: table.rows,
                });
            }
            let key = table.key;
            let last = table.rows - 1;
            if unordered {
                for col in table.columns.iter_mut() {
                    col.data.swap_remove(row);
                }
                table.rows -= 1;
                if row != last {
                    renumber_links(tables, key, |v| {
                        debug_assert_ne!(v, row);
                        if v == last {
                            row
                        } else {
                            v
                        }
                    });
                }
            } else {
                for col in table.columns.iter_mut() {
                    col.data.remove(row);
                }
                table.rows -= 1;
                renumber_links(tables, key, |v| {
                    debug_assert_ne!(v, row);
                    if v > row {
                        v - 1
                    } else {
                        v
                    }
                });
            }
            cursor.list = None;
        }

        Instruction::SwapRows { row_1, row_2 } => {
            let (_, table) = selected_table(tables, cursor)?;
            for row in [row_1, row_2] {
                if row >= table.rows {
                    return Err(GraphError::RowOutOfRange {
                        row,
                        len: table.rows,
                    });
                }
            }
            let key = table.key;
            if row_1 != row_2 {
                for col in table.columns.iter_mut() {
                    col.data.swap(row_1, row_2);
                }
                renumber_links(tables, key, |v| {
                    if v == row_1 {
                        row_2
                    } else if v == row_2 {
                        row_1
                    } else {
                        v
                    }
                });
            }
            cursor.list = None;
        }

        Instruction::MoveRow { from, to } => {
            let (_, table) = selected_table(tables, cursor)?;
            for row in [from, to] {
                if row >= table.rows {
                    return Err(GraphError::RowOutOfRange {
                        row,
                        len: table.rows,
                    });
                }
            }
            let key = table.key;
            if from != to {
                for col in table.columns.iter_mut() {
                    col.data.move_entry(from, to);
                }
                renumber_links(tables, key, |v| {
                    if v == from {
                        to
                    } else if from < to && v > from && v <= to {
                        v - 1
                    } else if from > to && v >= to && v < from {
                        v + 1
                    } else {
                        v
                    }
                });
            }
            cursor.list = None;
        }

        Instruction::ClearTable { prior_rows } => {
            let (_, table) = selected_table(tables, cursor)?;
            if prior_rows != table.rows {
                return Err(GraphError::malformed("clear with stale row count"));
            }
            for col in table.columns.iter_mut() {
                col.data.clear();
            }
            table.rows = 0;
            cursor.list = None;
        }

        Instruction::SetValue { col_ndx, row, value, .. } => {
            set_cell(tables, cursor, col_ndx, row, value)?;
        }

        Instruction::SetUnique { col_ndx, row, value } => {
            set_cell(tables, cursor, col_ndx, row, value)?;
        }

        Instruction::MergeRows { row, new_row } => {
            let (_, table) = selected_table(tables, cursor)?;
            for r in [row, new_row] {
                if r >= table.rows {
                    return Err(GraphError::RowOutOfRange {
                        row: r,
                        len: table.rows,
                    });
                }
            }
            let key = table.key;
            renumber_links(tables, key, |v| if v == row { new_row } else { v });
            cursor.list = None;
        }

        Instruction::NullifyLink { col_ndx, row } => {
            set_cell(tables, cursor, col_ndx, row, Value::Link(None))?;
        }

        Instruction::ListSet { ndx, target } => {
            check_list_target_valid(tables, cursor, target)?;
            let list = selected_list(tables, cursor)?;
            let len = list.len();
            let entry = list
                .get_mut(ndx)
                .ok_or(GraphError::ListIndexOutOfRange { index: ndx, len })?;
            *entry = target;
        }

        Instruction::ListInsert { ndx, target } => {
            check_list_target_valid(tables, cursor, target)?;
            let list = selected_list(tables, cursor)?;
            if ndx > list.len() {
                return Err(GraphError::ListIndexOutOfRange {
                    index: ndx,
                    len: list.len(),
                });
            }
            list.insert(ndx, target);
        }

        Instruction::ListMove { from, to } => {
            let list = selected_list(tables, cursor)?;
            for index in [from, to] {
                if index >= list.len() {
                    return Err(GraphError::ListIndexOutOfRange {
                        index,
                        len: list.len(),
                    });
                }
            }
            if from != to {
                let entry = list.remove(from);
                list.insert(to, entry);
            }
        }

        Instruction::ListSwap { ndx_1, ndx_2 } => {
            let list = selected_list(tables, cursor)?;
            for index in [ndx_1, ndx_2] {
                if index >= list.len() {
                    return Err(GraphError::ListIndexOutOfRange {
                        index,
                        len: list.len(),
                    });
                }
            }
            list.swap(ndx_1, ndx_2);
        }

        Instruction::ListErase { ndx } | Instruction::ListNullify { ndx } => {
            let list = selected_list(tables, cursor)?;
            if ndx >= list.len() {
                return Err(GraphError::ListIndexOutOfRange {
                    index: ndx,
                    len: list.len(),
                });
            }
            list.remove(ndx);
        }

        Instruction::ListClear { prior_size } => {
            let list = selected_list(tables, cursor)?;
            if prior_size != list.len() {
                return Err(GraphError::malformed("list clear with stale size"));
            }
            list.clear();
        }

        Instruction::InsertTable { ndx, key, ref name } => {
            if ndx > tables.len() {
                return Err(GraphError::PositionOutOfRange {
                    position: ndx,
                    len: tables.len(),
                });
            }
            tables.insert(
                ndx,
                Table {
                    key,
                    name: name.clone(),
                    columns: Vec::new(),
                    rows: 0,
                },
            );
            *cursor = Cursor::default();
        }

        Instruction::MoveTable { from, to } => {
            for position in [from, to] {
                if position >= tables.len() {
                    return Err(GraphError::PositionOutOfRange {
                        position,
                        len: tables.len(),
                    });
                }
            }
            if from != to {
                let table = tables.remove(from);
                tables.insert(to, table);
            }
            *cursor = Cursor::default();
        }

        Instruction::EraseTable { ndx } => {
            if ndx >= tables.len() {
                return Err(GraphError::PositionOutOfRange {
                    position: ndx,
                    len: tables.len(),
                });
            }
            tables.remove(ndx);
            *cursor = Cursor::default();
        }

        Instruction::InsertColumn { ndx, key, ref name, kind } => {
            let (_, table) = selected_table(tables, cursor)?;
            if ndx > table.columns.len() {
                return Err(GraphError::PositionOutOfRange {
                    position: ndx,
                    len: table.columns.len(),
                });
            }
            let rows = table.rows;
            table.columns.insert(
                ndx,
                Column {
                    key,
                    name: name.clone(),
                    kind,
                    data: ColumnData::new(kind, rows),
                },
            );
            cursor.list = None;
        }

        Instruction::MoveColumn { from, to } => {
            let (_, table) = selected_table(tables, cursor)?;
            for position in [from, to] {
                if position >= table.columns.len() {
                    return Err(GraphError::PositionOutOfRange {
                        position,
                        len: table.columns.len(),
                    });
                }
            }
            if from != to {
                let col = table.columns.remove(from);
                table.columns.insert(to, col);
            }
            cursor.list = None;
        }

        Instruction::EraseColumn { ndx } => {
            let (_, table) = selected_table(tables, cursor)?;
            if ndx >= table.columns.len() {
                return Err(GraphError::PositionOutOfRange {
                    position: ndx,
                    len: table.columns.len(),
                });
            }
            table.columns.remove(ndx);
            cursor.list = None;
        }
    }
    Ok(())
}

/// Validates a list target row against the selected list's target table.
fn check_list_target_valid(
    tables: &mut Vec<Table>,
    cursor: &Cursor,
    target: usize,
) -> GraphResult<()> {
    let (_, table) = selected_table(tables, cursor)?;
    let (col_ndx, _) = cursor
        .list
        .ok_or_else(|| GraphError::malformed("list operation with no selected list"))?;
    let cols = table.columns.len();
    let col = table
        .columns
        .get(col_ndx)
        .ok_or(GraphError::PositionOutOfRange {
            position: col_ndx,
            len: cols,
        })?;
    let Some(target_key) = col.kind.target() else {
        return Err(GraphError::ColumnKindMismatch {
            column: col.key,
            expected: "link list",
        });
    };
    let target_table = tables
        .iter()
        .find(|t| t.key == target_key)
        .ok_or(GraphError::UnknownTable { table: target_key })?;
    if target >= target_table.rows {
        return Err(GraphError::RowOutOfRange {
            row: target,
            len: target_table.rows,
        });
    }
    Ok(())
}

fn set_cell(
    tables: &mut Vec<Table>,
    cursor: &Cursor,
    col_ndx: usize,
    row: usize,
    value: Value,
) -> GraphResult<()> {
    // Validate link targets against the live target table first.
    if let Value::Link(Some(target)) = value {
        let (_, table) = selected_table(tables, cursor)?;
        let cols = table.columns.len();
        let col = table
            .columns
            .get(col_ndx)
            .ok_or(GraphError::PositionOutOfRange {
                position: col_ndx,
                len: cols,
            })?;
        let Some(target_key) = col.kind.target() else {
            return Err(GraphError::ColumnKindMismatch {
                column: col.key,
                expected: "link",
            });
        };
        let target_table = tables
            .iter()
            .find(|t| t.key == target_key)
            .ok_or(GraphError::UnknownTable { table: target_key })?;
        if target >= target_table.rows {
            return Err(GraphError::RowOutOfRange {
                row: target,
                len: target_table.rows,
            });
        }
    }

    let (_, table) = selected_table(tables, cursor)?;
    if row >= table.rows {
        return Err(GraphError::RowOutOfRange {
            row,
            len: table.rows,
        });
    }
    let cols = table.columns.len();
    let col = table
        .columns
        .get_mut(col_ndx)
        .ok_or(GraphError::PositionOutOfRange {
            position: col_ndx,
            len: cols,
        })?;
    let key = col.key;
    match (&mut col.data, value) {
        (ColumnData::Int(cells), Value::Int(v)) => {
            cells[row] = v;
            Ok(())
        }
        (ColumnData::Link(cells), Value::Link(v)) => {
            cells[row] = v;
            Ok(())
        }
        (ColumnData::Int(_), _) => Err(GraphError::ColumnKindMismatch {
            column: key,
            expected: "scalar",
        }),
        (ColumnData::Link(_), _) => Err(GraphError::ColumnKindMismatch {
            column: key,
            expected: "link",
        }),
        (ColumnData::List(_), _) => Err(GraphError::ColumnKindMismatch {
            column: key,
            expected: "link list",
        }),
    }
}

impl GraphSnapshot for MemGraph {
    fn schema(&self) -> Schema {
        Schema {
            tables: self
                .tables
                .iter()
                .map(|t| TableDef {
                    key: t.key,
                    name: t.name.clone(),
                    columns: t
                        .columns
                        .iter()
                        .map(|c| ColumnDef {
                            key: c.key,
                            name: c.name.clone(),
                            kind: c.kind,
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    fn table_len(&self, table: TableKey) -> GraphResult<usize> {
        Ok(self.tables[self.table_pos(table)?].rows)
    }

    fn link(&self, table: TableKey, col: ColKey, row: usize) -> GraphResult<Option<usize>> {
        let (pos, col_ndx) = self.locate(table, col, row, "link")?;
        match &self.tables[pos].columns[col_ndx].data {
            ColumnData::Link(cells) => Ok(cells[row]),
            _ => Err(GraphError::ColumnKindMismatch {
                column: col,
                expected: "link",
            }),
        }
    }

    fn link_list(&self, table: TableKey, col: ColKey, row: usize) -> GraphResult<&[usize]> {
        let (pos, col_ndx) = self.locate(table, col, row, "link list")?;
        match &self.tables[pos].columns[col_ndx].data {
            ColumnData::List(cells) => Ok(&cells[row]),
            _ => Err(GraphError::ColumnKindMismatch {
                column: col,
                expected: "link list",
            }),
        }
    }
}

impl LogSource for MemGraph {
    fn current_version(&self) -> Version {
        self.version
    }

    fn logs_since(&self, after: Version) -> Vec<CommittedLog> {
        self.history
            .iter()
            .filter(|log| log.version > after)
            .cloned()
            .collect()
    }

    fn schema_at(&self, version: Version) -> GraphResult<Schema> {
        Ok(self.snapshot_at(version)?.schema())
    }
}

impl SnapshotSource for MemGraph {
    type Snapshot = MemGraph;

    fn snapshot_at(&self, version: Version) -> GraphResult<MemGraph> {
        MemGraph::snapshot_at(self, version)
    }
}
