//! Transaction log replay.
//!
//! Replaying committed logs turns the instruction stream back into change
//! information: which rows of which tables were inserted, deleted, moved and
//! modified, and what happened inside tracked link lists. The log speaks
//! positions, so the replayer keeps a positional view of the schema that
//! structural instructions update as they go by, while everything recorded
//! for a consumer is keyed by stable [`TableKey`] / [`ColKey`] handles.
//!
//! Two entry points share one dispatch. [`advance`] accumulates collection
//! change information into a [`TransactionChangeInfo`] and accepts any
//! well-formed log. [`advance_observed`] additionally maintains per-object
//! [`ObserverState`]s and polices schema changes according to a
//! [`SchemaMode`].

use std::collections::{BTreeMap, BTreeSet};

use tetherdb_graph::{ColKey, CommittedLog, GraphError, Instruction, Schema, TableKey};
use tracing::trace;

use crate::changeset::CollectionChangeBuilder;
use crate::config::SchemaMode;
use crate::error::{NotifyError, NotifyResult};
use crate::observer::{ObserverKey, ObserverState};

/// How much detail a tracked table records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackLevel {
    /// Row insertions, deletions and modifications.
    Modifications,
    /// Insertions, deletions, modifications and explicit row relocations.
    Moves,
}

/// Handle for reading a tracked list's changes back after a replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListHandle(usize);

/// A tracked link list: its current location plus the index of its builder
/// in [`TransactionChangeInfo::list_changes`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRef {
    /// The owning table.
    pub table: TableKey,
    /// The owning row, kept current as the replay shifts rows around.
    pub row: usize,
    /// The list column.
    pub col: ColKey,
    /// Index of the builder in the arena.
    pub changes: usize,
}

/// Accumulated change information for one replay span.
///
/// Consumers register what they care about before the replay and read the
/// results back afterwards. Tables absent from both needed-sets are skipped
/// entirely; their instructions still maintain list and observer positions
/// but no builder is created for them.
#[derive(Debug, Default)]
pub struct TransactionChangeInfo {
    /// Tables to record changes for.
    pub modifications_needed: BTreeSet<TableKey>,
    /// Tables to additionally record row relocations for.
    pub moves_needed: BTreeSet<TableKey>,
    /// Per-table builders, created lazily when a tracked table first
    /// changes. A tracked table that nothing touched has no entry.
    pub tables: BTreeMap<TableKey, CollectionChangeBuilder>,
    /// Tracked lists still alive. An entry is removed when its owning row or
    /// table goes away; its builder stays in the arena.
    pub lists: Vec<ListRef>,
    /// Builder arena indexed by [`ListRef::changes`]. Several refs may share
    /// one builder; when the same list is registered twice the latest
    /// registration wins during replay.
    pub list_changes: Vec<CollectionChangeBuilder>,
}

impl TransactionChangeInfo {
    /// Creates an info that tracks nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a table for change recording.
    pub fn track_table(&mut self, table: TableKey, level: TrackLevel) {
        self.modifications_needed.insert(table);
        if level == TrackLevel::Moves {
            self.moves_needed.insert(table);
        }
    }

    /// Registers a link list for change recording.
    ///
    /// The owning table is implicitly tracked at modification level so that
    /// changes to the owning row are seen.
    pub fn track_list(&mut self, table: TableKey, row: usize, col: ColKey) -> ListHandle {
        self.modifications_needed.insert(table);
        let changes = self.list_changes.len();
        self.list_changes.push(CollectionChangeBuilder::new());
        self.lists.push(ListRef {
            table,
            row,
            col,
            changes,
        });
        ListHandle(changes)
    }

    /// The changes recorded for a tracked table, if anything touched it.
    #[must_use]
    pub fn table_changes(&self, table: TableKey) -> Option<&CollectionChangeBuilder> {
        self.tables.get(&table)
    }

    /// The changes recorded for a tracked list, or `None` if the list was
    /// destroyed during the replay.
    #[must_use]
    pub fn list_changes(&self, handle: ListHandle) -> Option<&CollectionChangeBuilder> {
        self.list_ref(handle).map(|r| &self.list_changes[r.changes])
    }

    /// The live location of a tracked list, or `None` if it was destroyed.
    #[must_use]
    pub fn list_ref(&self, handle: ListHandle) -> Option<&ListRef> {
        self.lists.iter().find(|r| r.changes == handle.0)
    }

    /// The builder for a table, created on first use. `None` when the table
    /// is not tracked.
    fn builder_for(&mut self, table: TableKey) -> Option<&mut CollectionChangeBuilder> {
        if !self.modifications_needed.contains(&table) {
            return None;
        }
        Some(self.tables.entry(table).or_default())
    }

    fn track_moves(&self, table: TableKey) -> bool {
        self.moves_needed.contains(&table)
    }
}

/// Accumulates collection change information from committed logs.
///
/// `schema` must be the schema as of the version the first log builds on.
/// At the end of the span every table builder is finished with a stale-move
/// scrub and its moves sorted; list builders only get the scrub, keeping
/// their move order.
///
/// # Errors
///
/// Returns an error if the instruction stream is malformed. Schema changes
/// of any kind are accepted on this path.
pub fn advance(
    schema: &Schema,
    logs: &[CommittedLog],
    info: &mut TransactionChangeInfo,
) -> NotifyResult<()> {
    let mut observers = Vec::new();
    let mut replayer = Replayer::new(schema, info, &mut observers, None);
    replayer.run(logs)?;
    finish(info);
    Ok(())
}

/// Replays committed logs over registered object observers.
///
/// Returns the keys of observers whose rows were deleted; those observers
/// are removed from `observers` and the survivors carry their accumulated
/// column changes. Change information is recorded into `info` for whatever
/// it tracks, so one pass can serve both consumers.
///
/// # Errors
///
/// Returns an error if the stream is malformed or contains a schema change
/// that `mode` rejects. On error the observers may have been partially
/// advanced and should be rebuilt before the next attempt.
pub fn advance_observed(
    schema: &Schema,
    logs: &[CommittedLog],
    info: &mut TransactionChangeInfo,
    observers: &mut Vec<ObserverState>,
    mode: SchemaMode,
) -> NotifyResult<Vec<ObserverKey>> {
    let mut replayer = Replayer::new(schema, info, observers, Some(mode));
    replayer.run(logs)?;
    let invalidated = replayer.invalidated;
    finish(info);
    Ok(invalidated)
}

fn finish(info: &mut TransactionChangeInfo) {
    for builder in info.tables.values_mut() {
        builder.parse_complete();
    }
    for builder in &mut info.list_changes {
        builder.clean_up_stale_moves();
    }
}

fn malformed(reason: &str) -> NotifyError {
    NotifyError::Graph(GraphError::malformed(reason))
}

/// Positional view of one table during replay.
#[derive(Debug)]
struct TableSlot {
    key: TableKey,
    columns: Vec<ColKey>,
    /// Created during this replay span. Such tables may change shape freely
    /// even under [`SchemaMode::Strict`]: nothing can have observed them.
    created: bool,
}

/// The selected list, resolved once at selection time.
#[derive(Debug, Clone, Copy)]
struct ListSelection {
    col: ColKey,
    /// Arena index of the tracked builder, if the list is tracked.
    builder: Option<usize>,
    /// Index of the observer watching the owning row, if any.
    observer: Option<usize>,
}

struct Replayer<'a> {
    slots: Vec<TableSlot>,
    info: &'a mut TransactionChangeInfo,
    observers: &'a mut Vec<ObserverState>,
    invalidated: Vec<ObserverKey>,
    validate: Option<SchemaMode>,
    selected: Option<usize>,
    list: Option<ListSelection>,
}

impl<'a> Replayer<'a> {
    fn new(
        schema: &Schema,
        info: &'a mut TransactionChangeInfo,
        observers: &'a mut Vec<ObserverState>,
        validate: Option<SchemaMode>,
    ) -> Self {
        let slots = schema
            .tables
            .iter()
            .map(|t| TableSlot {
                key: t.key,
                columns: t.columns.iter().map(|c| c.key).collect(),
                created: false,
            })
            .collect();
        Self {
            slots,
            info,
            observers,
            invalidated: Vec::new(),
            validate,
            selected: None,
            list: None,
        }
    }

    fn run(&mut self, logs: &[CommittedLog]) -> NotifyResult<()> {
        for log in logs {
            trace!(
                version = %log.version,
                instructions = log.instructions.len(),
                "replaying committed log"
            );
            // Each transaction starts with a fresh cursor.
            self.selected = None;
            self.list = None;
            for instr in &log.instructions {
                self.dispatch(instr)?;
            }
        }
        Ok(())
    }

    fn dispatch(&mut self, instr: &Instruction) -> NotifyResult<()> {
        trace!(?instr, "replay");
        match *instr {
            Instruction::SelectTable { ndx } => self.select_table(ndx),
            Instruction::SelectList { col_ndx, row } => self.select_list(col_ndx, row),
            Instruction::InsertRows { row, count, .. } => self.insert_rows(row, count),
            Instruction::EraseRows {
                row,
                prior_rows,
                unordered,
            } => self.erase_rows(row, prior_rows, unordered),
            Instruction::SwapRows { row_1, row_2 } => self.swap_rows(row_1, row_2),
            Instruction::MoveRow { from, to } => self.move_row(from, to),
            Instruction::ClearTable { prior_rows } => self.clear_table(prior_rows),
            Instruction::SetValue {
                col_ndx,
                row,
                is_default,
                ..
            } => self.set_value(col_ndx, row, is_default),
            Instruction::SetUnique { col_ndx, row, .. } => self.set_unique(col_ndx, row),
            Instruction::MergeRows { row, new_row } => self.merge_rows(row, new_row),
            Instruction::NullifyLink { col_ndx, row } => self.set_value(col_ndx, row, false),
            Instruction::ListSet { ndx, .. } => self.list_set(ndx),
            Instruction::ListInsert { ndx, .. } => self.list_insert(ndx),
            Instruction::ListMove { from, to } => self.list_move(from, to),
            Instruction::ListSwap { ndx_1, ndx_2 } => self.list_swap(ndx_1, ndx_2),
            Instruction::ListErase { ndx } | Instruction::ListNullify { ndx } => {
                self.list_erase(ndx)
            }
            Instruction::ListClear { prior_size } => self.list_clear(prior_size),
            Instruction::InsertTable { ndx, key, .. } => self.insert_table(ndx, key),
            Instruction::MoveTable { from, to } => self.move_table(from, to),
            Instruction::EraseTable { ndx } => self.erase_table(ndx),
            Instruction::InsertColumn { ndx, key, .. } => self.insert_column(ndx, key),
            Instruction::MoveColumn { from, to } => self.move_column(from, to),
            Instruction::EraseColumn { ndx } => self.erase_column(ndx),
        }
    }

    // === Selection ===

    fn select_table(&mut self, ndx: usize) -> NotifyResult<()> {
        if ndx >= self.slots.len() {
            return Err(malformed("selected table position out of range"));
        }
        self.selected = Some(ndx);
        self.list = None;
        Ok(())
    }

    fn select_list(&mut self, col_ndx: usize, row: usize) -> NotifyResult<()> {
        let table = self.current_table()?;
        let col = self.current_column(col_ndx)?;
        // A change inside a list is a change of the owning row.
        if let Some(builder) = self.info.builder_for(table) {
            builder.modify(row);
        }
        let builder = self
            .info
            .lists
            .iter()
            .rev()
            .find(|r| r.table == table && r.row == row && r.col == col)
            .map(|r| r.changes);
        let observer = self
            .observers
            .iter()
            .position(|o| o.table == table && o.row == row);
        self.list = Some(ListSelection {
            col,
            builder,
            observer,
        });
        Ok(())
    }

    fn current_table(&self) -> NotifyResult<TableKey> {
        let ndx = self
            .selected
            .ok_or_else(|| malformed("operation with no selected table"))?;
        Ok(self.slots[ndx].key)
    }

    fn current_column(&self, col_ndx: usize) -> NotifyResult<ColKey> {
        let ndx = self
            .selected
            .ok_or_else(|| malformed("operation with no selected table"))?;
        self.slots[ndx]
            .columns
            .get(col_ndx)
            .copied()
            .ok_or_else(|| malformed("column position out of range"))
    }

    // === Row operations ===

    fn insert_rows(&mut self, row: usize, count: usize) -> NotifyResult<()> {
        let table = self.current_table()?;
        let track_moves = self.info.track_moves(table);
        if let Some(builder) = self.info.builder_for(table) {
            builder.insert(row, count, track_moves);
        }
        for r in self.info.lists.iter_mut().filter(|r| r.table == table) {
            if r.row >= row {
                r.row += count;
            }
        }
        for o in self.observers.iter_mut().filter(|o| o.table == table) {
            if o.row >= row {
                o.row += count;
            }
        }
        self.list = None;
        Ok(())
    }

    fn erase_rows(&mut self, row: usize, prior_rows: usize, unordered: bool) -> NotifyResult<()> {
        let table = self.current_table()?;
        let track_moves = self.info.track_moves(table);
        if unordered {
            let last_row = prior_rows
                .checked_sub(1)
                .ok_or_else(|| malformed("unordered erase of an empty table"))?;
            if let Some(builder) = self.info.builder_for(table) {
                builder.move_over(row, last_row, track_moves);
            }
            self.info
                .lists
                .retain(|r| !(r.table == table && r.row == row));
            for r in self.info.lists.iter_mut().filter(|r| r.table == table) {
                if r.row == last_row {
                    r.row = row;
                }
            }
            self.invalidate_observers_at(table, row);
            for o in self.observers.iter_mut().filter(|o| o.table == table) {
                if o.row == last_row {
                    o.row = row;
                }
            }
        } else {
            if let Some(builder) = self.info.builder_for(table) {
                builder.erase(row);
            }
            self.info
                .lists
                .retain(|r| !(r.table == table && r.row == row));
            for r in self.info.lists.iter_mut().filter(|r| r.table == table) {
                if r.row > row {
                    r.row -= 1;
                }
            }
            self.invalidate_observers_at(table, row);
            for o in self.observers.iter_mut().filter(|o| o.table == table) {
                if o.row > row {
                    o.row -= 1;
                }
            }
        }
        self.list = None;
        Ok(())
    }

    fn swap_rows(&mut self, row_1: usize, row_2: usize) -> NotifyResult<()> {
        let table = self.current_table()?;
        if let Some(builder) = self.info.builder_for(table) {
            builder.swap(row_1, row_2);
        }
        for r in self.info.lists.iter_mut().filter(|r| r.table == table) {
            if r.row == row_1 {
                r.row = row_2;
            } else if r.row == row_2 {
                r.row = row_1;
            }
        }
        for o in self.observers.iter_mut().filter(|o| o.table == table) {
            if o.row == row_1 {
                o.row = row_2;
            } else if o.row == row_2 {
                o.row = row_1;
            }
        }
        self.list = None;
        Ok(())
    }

    fn move_row(&mut self, from: usize, to: usize) -> NotifyResult<()> {
        let table = self.current_table()?;
        if let Some(builder) = self.info.builder_for(table) {
            builder.move_row(from, to);
        }
        if from != to {
            let relocate = |row: &mut usize| {
                if *row == from {
                    *row = to;
                } else if from < to && *row > from && *row <= to {
                    *row -= 1;
                } else if from > to && *row >= to && *row < from {
                    *row += 1;
                }
            };
            for r in self.info.lists.iter_mut().filter(|r| r.table == table) {
                relocate(&mut r.row);
            }
            for o in self.observers.iter_mut().filter(|o| o.table == table) {
                relocate(&mut o.row);
            }
        }
        self.list = None;
        Ok(())
    }

    fn clear_table(&mut self, prior_rows: usize) -> NotifyResult<()> {
        let table = self.current_table()?;
        if let Some(builder) = self.info.builder_for(table) {
            builder.clear(prior_rows);
        }
        self.info.lists.retain(|r| r.table != table);
        let invalidated = &mut self.invalidated;
        self.observers.retain(|o| {
            if o.table == table {
                invalidated.push(o.key);
                false
            } else {
                true
            }
        });
        self.list = None;
        Ok(())
    }

    fn merge_rows(&mut self, row: usize, new_row: usize) -> NotifyResult<()> {
        let table = self.current_table()?;
        let track_moves = self.info.track_moves(table);
        if let Some(builder) = self.info.builder_for(table) {
            builder.subsume(row, new_row, track_moves);
        }
        for o in self.observers.iter_mut().filter(|o| o.table == table) {
            if o.row == row {
                o.row = new_row;
            }
        }
        self.list = None;
        Ok(())
    }

    fn invalidate_observers_at(&mut self, table: TableKey, row: usize) {
        let invalidated = &mut self.invalidated;
        self.observers.retain(|o| {
            if o.table == table && o.row == row {
                invalidated.push(o.key);
                false
            } else {
                true
            }
        });
    }

    // === Value operations ===

    fn set_value(&mut self, col_ndx: usize, row: usize, is_default: bool) -> NotifyResult<()> {
        if is_default {
            // Object initialization, not a change.
            return Ok(());
        }
        let table = self.current_table()?;
        let col = self.current_column(col_ndx)?;
        if let Some(builder) = self.info.builder_for(table) {
            builder.modify(row);
        }
        for o in self.observers.iter_mut() {
            if o.table == table && o.row == row {
                o.record_set(col);
            }
        }
        Ok(())
    }

    /// Unique-key assignment establishes identity rather than changing
    /// state; collections do not report it, but observers of the row do.
    fn set_unique(&mut self, col_ndx: usize, row: usize) -> NotifyResult<()> {
        let table = self.current_table()?;
        let col = self.current_column(col_ndx)?;
        for o in self.observers.iter_mut() {
            if o.table == table && o.row == row {
                o.record_set(col);
            }
        }
        Ok(())
    }

    // === List operations ===

    fn list_selection(&self) -> NotifyResult<ListSelection> {
        self.list
            .ok_or_else(|| malformed("list operation with no selected list"))
    }

    fn list_set(&mut self, ndx: usize) -> NotifyResult<()> {
        let sel = self.list_selection()?;
        if let Some(b) = sel.builder {
            self.info.list_changes[b].modify(ndx);
        }
        if let Some(o) = sel.observer {
            self.observers[o].record_list_set(sel.col, ndx);
        }
        Ok(())
    }

    fn list_insert(&mut self, ndx: usize) -> NotifyResult<()> {
        let sel = self.list_selection()?;
        if let Some(b) = sel.builder {
            self.info.list_changes[b].insert(ndx, 1, true);
        }
        if let Some(o) = sel.observer {
            self.observers[o].record_list_insert(sel.col, ndx);
        }
        Ok(())
    }

    fn list_move(&mut self, from: usize, to: usize) -> NotifyResult<()> {
        if from == to {
            return Ok(());
        }
        let sel = self.list_selection()?;
        if let Some(b) = sel.builder {
            self.info.list_changes[b].move_row(from, to);
        }
        if let Some(o) = sel.observer {
            self.observers[o].record_list_move(sel.col, from, to);
        }
        Ok(())
    }

    fn list_swap(&mut self, ndx_1: usize, ndx_2: usize) -> NotifyResult<()> {
        let sel = self.list_selection()?;
        if let Some(b) = sel.builder {
            self.info.list_changes[b].swap(ndx_1, ndx_2);
        }
        if let Some(o) = sel.observer {
            self.observers[o].record_list_swap(sel.col, ndx_1, ndx_2);
        }
        Ok(())
    }

    fn list_erase(&mut self, ndx: usize) -> NotifyResult<()> {
        let sel = self.list_selection()?;
        if let Some(b) = sel.builder {
            self.info.list_changes[b].erase(ndx);
        }
        if let Some(o) = sel.observer {
            self.observers[o].record_list_remove(sel.col, ndx);
        }
        Ok(())
    }

    fn list_clear(&mut self, prior_size: usize) -> NotifyResult<()> {
        let sel = self.list_selection()?;
        if let Some(b) = sel.builder {
            self.info.list_changes[b].clear(prior_size);
        }
        if let Some(o) = sel.observer {
            self.observers[o].record_list_clear(sel.col, prior_size);
        }
        Ok(())
    }

    // === Structural operations ===

    fn insert_table(&mut self, ndx: usize, key: TableKey) -> NotifyResult<()> {
        if ndx > self.slots.len() {
            return Err(malformed("table insertion position out of range"));
        }
        self.slots.insert(
            ndx,
            TableSlot {
                key,
                columns: Vec::new(),
                created: true,
            },
        );
        self.selected = None;
        self.list = None;
        Ok(())
    }

    fn move_table(&mut self, from: usize, to: usize) -> NotifyResult<()> {
        if from >= self.slots.len() || to >= self.slots.len() {
            return Err(malformed("table move position out of range"));
        }
        if self.validate == Some(SchemaMode::Strict) {
            return Err(NotifyError::TableMoved { from, to });
        }
        let slot = self.slots.remove(from);
        self.slots.insert(to, slot);
        self.selected = None;
        self.list = None;
        Ok(())
    }

    fn erase_table(&mut self, ndx: usize) -> NotifyResult<()> {
        let slot = self
            .slots
            .get(ndx)
            .ok_or_else(|| malformed("table erase position out of range"))?;
        if self.validate.is_some() && !slot.created {
            return Err(NotifyError::TableErased { table: slot.key });
        }
        let slot = self.slots.remove(ndx);
        self.info.lists.retain(|r| r.table != slot.key);
        let invalidated = &mut self.invalidated;
        self.observers.retain(|o| {
            if o.table == slot.key {
                invalidated.push(o.key);
                false
            } else {
                true
            }
        });
        self.selected = None;
        self.list = None;
        Ok(())
    }

    fn insert_column(&mut self, ndx: usize, key: ColKey) -> NotifyResult<()> {
        let sel = self
            .selected
            .ok_or_else(|| malformed("column change with no selected table"))?;
        let slot = &mut self.slots[sel];
        if ndx > slot.columns.len() {
            return Err(malformed("column insertion position out of range"));
        }
        if self.validate == Some(SchemaMode::Strict) && !slot.created {
            return Err(NotifyError::ColumnAddedToExistingTable { table: slot.key });
        }
        slot.columns.insert(ndx, key);
        self.list = None;
        Ok(())
    }

    fn move_column(&mut self, from: usize, to: usize) -> NotifyResult<()> {
        let sel = self
            .selected
            .ok_or_else(|| malformed("column change with no selected table"))?;
        let slot = &mut self.slots[sel];
        if from >= slot.columns.len() || to >= slot.columns.len() {
            return Err(malformed("column move position out of range"));
        }
        if self.validate == Some(SchemaMode::Strict) {
            return Err(NotifyError::ColumnMoved { table: slot.key });
        }
        let col = slot.columns.remove(from);
        slot.columns.insert(to, col);
        self.list = None;
        Ok(())
    }

    fn erase_column(&mut self, ndx: usize) -> NotifyResult<()> {
        let sel = self
            .selected
            .ok_or_else(|| malformed("column change with no selected table"))?;
        let slot = &mut self.slots[sel];
        if ndx >= slot.columns.len() {
            return Err(malformed("column erase position out of range"));
        }
        if self.validate.is_some() && !slot.created {
            return Err(NotifyError::ColumnErased { table: slot.key });
        }
        let table = slot.key;
        let col = slot.columns.remove(ndx);
        self.info
            .lists
            .retain(|r| !(r.table == table && r.col == col));
        self.list = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changeset::Move;
    use crate::index_set::IndexSet;
    use tetherdb_graph::{ColumnKind, LogSource, MemGraph, Version};

    fn indexes(set: &IndexSet) -> Vec<usize> {
        set.indexes().collect()
    }

    fn mv(from: usize, to: usize) -> Move {
        Move { from, to }
    }

    fn advance_since(graph: &MemGraph, info: &mut TransactionChangeInfo, after: Version) {
        let schema = graph.schema_at(after).unwrap();
        let logs = graph.logs_since(after);
        advance(&schema, &logs, info).unwrap();
    }

    fn track(
        graph: &mut MemGraph,
        info: &mut TransactionChangeInfo,
        f: impl FnOnce(&mut MemGraph),
    ) {
        let before = graph.current_version();
        graph.begin_transaction().unwrap();
        f(graph);
        graph.commit().unwrap();
        advance_since(graph, info, before);
    }

    // === Table changes ===

    struct Rows {
        graph: MemGraph,
        table: TableKey,
        value: ColKey,
    }

    /// One table, one scalar column, ten rows holding their own index.
    fn ten_rows() -> Rows {
        let mut graph = MemGraph::new();
        graph.begin_transaction().unwrap();
        let table = graph.add_table("object").unwrap();
        let value = graph.add_column(table, "value", ColumnKind::Scalar).unwrap();
        graph.add_rows(table, 10).unwrap();
        for i in 0..10 {
            graph.set_int(table, value, i, i as i64).unwrap();
        }
        graph.commit().unwrap();
        Rows {
            graph,
            table,
            value,
        }
    }

    fn run_table(
        fx: &mut Rows,
        f: impl FnOnce(&mut MemGraph, TableKey, ColKey),
    ) -> TransactionChangeInfo {
        let mut info = TransactionChangeInfo::new();
        info.track_table(fx.table, TrackLevel::Moves);
        let (table, value) = (fx.table, fx.value);
        track(&mut fx.graph, &mut info, |g| f(g, table, value));
        info
    }

    #[test]
    fn modifying_a_row_marks_it_modified() {
        let mut fx = ten_rows();
        let info = run_table(&mut fx, |g, t, v| {
            g.set_int(t, v, 1, 2).unwrap();
        });
        let changes = info.table_changes(fx.table).unwrap();
        assert_eq!(indexes(&changes.modifications), [1]);
        assert!(changes.insertions.is_empty());
        assert!(changes.deletions.is_empty());
    }

    #[test]
    fn untracked_tables_are_ignored() {
        let mut fx = ten_rows();
        let mut info = TransactionChangeInfo::new();
        let (table, value) = (fx.table, fx.value);
        track(&mut fx.graph, &mut info, |g| {
            g.set_int(table, value, 1, 2).unwrap();
        });
        assert!(info.tables.is_empty());
    }

    #[test]
    fn new_rows_are_reported() {
        let mut fx = ten_rows();
        let info = run_table(&mut fx, |g, t, _| {
            g.add_rows(t, 2).unwrap();
        });
        let changes = info.table_changes(fx.table).unwrap();
        assert_eq!(indexes(&changes.insertions), [10, 11]);
    }

    #[test]
    fn erasing_a_fresh_row_removes_the_insertion() {
        let mut fx = ten_rows();
        let info = run_table(&mut fx, |g, t, _| {
            g.add_rows(t, 2).unwrap();
            g.move_last_over(t, 10).unwrap();
        });
        let changes = info.table_changes(fx.table).unwrap();
        assert_eq!(indexes(&changes.insertions), [10]);
        assert!(changes.deletions.is_empty());
    }

    #[test]
    fn setting_a_fresh_row_reports_only_the_insertion() {
        let mut fx = ten_rows();
        let info = run_table(&mut fx, |g, t, v| {
            g.add_row(t).unwrap();
            g.set_int(t, v, 10, 10).unwrap();
        });
        let changes = info.table_changes(fx.table).unwrap();
        assert_eq!(indexes(&changes.insertions), [10]);
        assert!(changes.modifications.is_empty());
    }

    #[test]
    fn move_last_over_does_not_shift_rows() {
        let mut fx = ten_rows();
        let info = run_table(&mut fx, |g, t, _| {
            g.move_last_over(t, 2).unwrap();
            g.move_last_over(t, 3).unwrap();
        });
        let changes = info.table_changes(fx.table).unwrap();
        assert_eq!(indexes(&changes.deletions), [2, 3, 8, 9]);
        assert_eq!(indexes(&changes.insertions), [2, 3]);
        assert_eq!(changes.moves, [mv(8, 3), mv(9, 2)]);
    }

    #[test]
    fn tracking_follows_a_table_inserted_before() {
        let mut fx = ten_rows();
        let info = run_table(&mut fx, |g, t, v| {
            g.insert_table(0, "newtable").unwrap();
            g.set_int(t, v, 1, 2).unwrap();
        });
        let changes = info.table_changes(fx.table).unwrap();
        assert_eq!(indexes(&changes.modifications), [1]);
    }

    #[test]
    fn tracking_follows_reordered_tables() {
        let mut fx = ten_rows();
        let info = run_table(&mut fx, |g, t, v| {
            g.add_table("newtable").unwrap();
            g.move_table(1, 0).unwrap();
            g.set_int(t, v, 1, 2).unwrap();
        });
        let changes = info.table_changes(fx.table).unwrap();
        assert_eq!(indexes(&changes.modifications), [1]);
    }

    #[test]
    fn swapping_rows_marks_both_modified() {
        let mut fx = ten_rows();
        let info = run_table(&mut fx, |g, t, _| {
            g.swap_rows(t, 1, 5).unwrap();
        });
        let changes = info.table_changes(fx.table).unwrap();
        assert_eq!(indexes(&changes.modifications), [1, 5]);
        assert!(changes.deletions.is_empty());
        assert!(changes.insertions.is_empty());
        assert!(changes.moves.is_empty());
    }

    #[test]
    fn swap_then_move_last_over_nets_out() {
        let mut fx = ten_rows();
        let info = run_table(&mut fx, |g, t, v| {
            g.set_int(t, v, 8, 15).unwrap();
            g.swap_rows(t, 8, 9).unwrap();
            g.move_last_over(t, 8).unwrap();
        });
        let changes = info.table_changes(fx.table).unwrap();
        assert_eq!(indexes(&changes.deletions), [8]);
        assert!(changes.insertions.is_empty());
        assert!(changes.moves.is_empty());
        assert_eq!(indexes(&changes.modifications), [8]);
    }

    #[test]
    fn advance_spans_multiple_commits() {
        let mut fx = ten_rows();
        let before = fx.graph.current_version();
        fx.graph.begin_transaction().unwrap();
        fx.graph.add_row(fx.table).unwrap();
        fx.graph.commit().unwrap();
        fx.graph.begin_transaction().unwrap();
        fx.graph.set_int(fx.table, fx.value, 10, 7).unwrap();
        fx.graph.commit().unwrap();

        let mut info = TransactionChangeInfo::new();
        info.track_table(fx.table, TrackLevel::Moves);
        advance_since(&fx.graph, &mut info, before);
        let changes = info.table_changes(fx.table).unwrap();
        assert_eq!(indexes(&changes.insertions), [10]);
        assert!(changes.modifications.is_empty());
    }

    // === Unique-key merges ===

    struct Keyed {
        graph: MemGraph,
        table: TableKey,
        pk: ColKey,
        value: ColKey,
    }

    /// Ten rows with unique keys 0 through 9.
    fn keyed_rows() -> Keyed {
        let mut graph = MemGraph::new();
        graph.begin_transaction().unwrap();
        let table = graph.add_table("object").unwrap();
        let pk = graph.add_column(table, "pk", ColumnKind::Scalar).unwrap();
        let value = graph.add_column(table, "value", ColumnKind::Scalar).unwrap();
        graph.add_rows(table, 10).unwrap();
        for i in 0..10 {
            graph.set_int(table, pk, i, i as i64).unwrap();
        }
        graph.commit().unwrap();
        Keyed {
            graph,
            table,
            pk,
            value,
        }
    }

    fn run_keyed(
        fx: &mut Keyed,
        f: impl FnOnce(&mut MemGraph, TableKey, ColKey, ColKey),
    ) -> TransactionChangeInfo {
        let mut info = TransactionChangeInfo::new();
        info.track_table(fx.table, TrackLevel::Moves);
        let (table, pk, value) = (fx.table, fx.pk, fx.value);
        track(&mut fx.graph, &mut info, |g| f(g, table, pk, value));
        info
    }

    #[test]
    fn merging_into_the_last_row_cancels_out() {
        let mut fx = keyed_rows();
        let info = run_keyed(&mut fx, |g, t, pk, _| {
            g.add_row(t).unwrap();
            g.set_int_unique(t, pk, 10, 5).unwrap();
        });
        assert!(info.table_changes(fx.table).unwrap().is_empty());
    }

    #[test]
    fn merge_reports_the_surviving_relocation() {
        let mut fx = keyed_rows();
        let info = run_keyed(&mut fx, |g, t, pk, _| {
            g.add_rows(t, 2).unwrap();
            g.set_int_unique(t, pk, 10, 5).unwrap();
        });
        let changes = info.table_changes(fx.table).unwrap();
        assert_eq!(indexes(&changes.insertions), [5, 10]);
        assert_eq!(indexes(&changes.deletions), [5]);
        assert_eq!(changes.moves, [mv(5, 10)]);
    }

    #[test]
    fn merging_into_a_modified_row_keeps_the_modification() {
        let mut fx = keyed_rows();
        let info = run_keyed(&mut fx, |g, t, pk, v| {
            g.set_int(t, v, 5, 15).unwrap();
            g.add_rows(t, 2).unwrap();
            g.set_int_unique(t, pk, 10, 5).unwrap();
        });
        let changes = info.table_changes(fx.table).unwrap();
        assert_eq!(indexes(&changes.modifications), [10]);
    }

    #[test]
    fn modifying_the_merge_survivor_is_reported() {
        let mut fx = keyed_rows();
        let info = run_keyed(&mut fx, |g, t, pk, v| {
            g.add_rows(t, 2).unwrap();
            g.set_int_unique(t, pk, 10, 5).unwrap();
            g.set_int(t, v, 10, 15).unwrap();
        });
        let changes = info.table_changes(fx.table).unwrap();
        assert_eq!(indexes(&changes.modifications), [10]);
    }

    #[test]
    fn non_conflicting_unique_set_records_nothing() {
        let mut fx = keyed_rows();
        let info = run_keyed(&mut fx, |g, t, pk, _| {
            g.set_int_unique(t, pk, 0, 20).unwrap();
        });
        assert!(info.tables.is_empty());
    }

    #[test]
    fn default_values_do_not_mark() {
        let mut fx = keyed_rows();
        let info = run_keyed(&mut fx, |g, t, _, v| {
            g.set_int_default(t, v, 0, 10).unwrap();
        });
        assert!(info.tables.is_empty());
    }

    // === Link list changes ===

    #[derive(Clone, Copy)]
    struct LinkedKeys {
        origin: TableKey,
        target: TableKey,
        list: ColKey,
    }

    struct Linked {
        graph: MemGraph,
        keys: LinkedKeys,
    }

    /// A target table with ten rows and an origin row whose list points at
    /// each of them in order.
    fn linked_rows() -> Linked {
        let mut graph = MemGraph::new();
        graph.begin_transaction().unwrap();
        let target = graph.add_table("target").unwrap();
        graph
            .add_column(target, "value", ColumnKind::Scalar)
            .unwrap();
        graph.add_rows(target, 10).unwrap();
        let origin = graph.add_table("origin").unwrap();
        let list = graph
            .add_column(origin, "list", ColumnKind::LinkList { target })
            .unwrap();
        graph.add_row(origin).unwrap();
        for i in 0..10 {
            graph.list_add(origin, list, 0, i).unwrap();
        }
        graph.commit().unwrap();
        Linked {
            graph,
            keys: LinkedKeys {
                origin,
                target,
                list,
            },
        }
    }

    fn list_run(
        fx: &mut Linked,
        f: impl FnOnce(&mut MemGraph, LinkedKeys),
    ) -> Option<CollectionChangeBuilder> {
        let mut info = TransactionChangeInfo::new();
        let handle = info.track_list(fx.keys.origin, 0, fx.keys.list);
        let keys = fx.keys;
        track(&mut fx.graph, &mut info, |g| f(g, keys));
        info.list_changes(handle).cloned()
    }

    #[test]
    fn adding_a_list_entry() {
        let mut fx = linked_rows();
        let c = list_run(&mut fx, |g, k| {
            g.list_add(k.origin, k.list, 0, 0).unwrap();
        })
        .unwrap();
        assert_eq!(indexes(&c.insertions), [10]);
    }

    #[test]
    fn adding_multiple_list_entries() {
        let mut fx = linked_rows();
        let c = list_run(&mut fx, |g, k| {
            g.list_add(k.origin, k.list, 0, 0).unwrap();
            g.list_add(k.origin, k.list, 0, 1).unwrap();
        })
        .unwrap();
        assert_eq!(indexes(&c.insertions), [10, 11]);
    }

    #[test]
    fn removing_a_list_entry() {
        let mut fx = linked_rows();
        let c = list_run(&mut fx, |g, k| {
            g.list_erase(k.origin, k.list, 0, 5).unwrap();
        })
        .unwrap();
        assert_eq!(indexes(&c.deletions), [5]);
    }

    #[test]
    fn removing_contiguous_list_entries() {
        let mut fx = linked_rows();
        let c = list_run(&mut fx, |g, k| {
            g.list_erase(k.origin, k.list, 0, 5).unwrap();
            g.list_erase(k.origin, k.list, 0, 5).unwrap();
            g.list_erase(k.origin, k.list, 0, 5).unwrap();
        })
        .unwrap();
        assert_eq!(indexes(&c.deletions), [5, 6, 7]);
    }

    #[test]
    fn removing_scattered_list_entries() {
        let mut fx = linked_rows();
        let c = list_run(&mut fx, |g, k| {
            g.list_erase(k.origin, k.list, 0, 3).unwrap();
            g.list_erase(k.origin, k.list, 0, 4).unwrap();
            g.list_erase(k.origin, k.list, 0, 5).unwrap();
        })
        .unwrap();
        assert_eq!(indexes(&c.deletions), [3, 5, 7]);
    }

    #[test]
    fn setting_a_list_entry() {
        let mut fx = linked_rows();
        let c = list_run(&mut fx, |g, k| {
            g.list_set(k.origin, k.list, 0, 5, 0).unwrap();
        })
        .unwrap();
        assert_eq!(indexes(&c.modifications), [5]);
    }

    #[test]
    fn setting_contiguous_list_entries() {
        let mut fx = linked_rows();
        let c = list_run(&mut fx, |g, k| {
            g.list_set(k.origin, k.list, 0, 5, 0).unwrap();
            g.list_set(k.origin, k.list, 0, 6, 0).unwrap();
            g.list_set(k.origin, k.list, 0, 7, 0).unwrap();
        })
        .unwrap();
        assert_eq!(indexes(&c.modifications), [5, 6, 7]);
    }

    #[test]
    fn setting_scattered_list_entries() {
        let mut fx = linked_rows();
        let c = list_run(&mut fx, |g, k| {
            g.list_set(k.origin, k.list, 0, 5, 0).unwrap();
            g.list_set(k.origin, k.list, 0, 7, 0).unwrap();
            g.list_set(k.origin, k.list, 0, 9, 0).unwrap();
        })
        .unwrap();
        assert_eq!(indexes(&c.modifications), [5, 7, 9]);
    }

    #[test]
    fn setting_an_entry_twice_records_one_modification() {
        let mut fx = linked_rows();
        let c = list_run(&mut fx, |g, k| {
            g.list_set(k.origin, k.list, 0, 5, 0).unwrap();
            g.list_set(k.origin, k.list, 0, 5, 1).unwrap();
            g.list_set(k.origin, k.list, 0, 5, 2).unwrap();
        })
        .unwrap();
        assert_eq!(indexes(&c.modifications), [5]);
    }

    #[test]
    fn clearing_a_list() {
        let mut fx = linked_rows();
        let c = list_run(&mut fx, |g, k| {
            g.list_clear(k.origin, k.list, 0).unwrap();
        })
        .unwrap();
        assert_eq!(indexes(&c.deletions), (0..10).collect::<Vec<_>>());
        assert!(c.insertions.is_empty());
    }

    #[test]
    fn moving_an_entry_backward() {
        let mut fx = linked_rows();
        let c = list_run(&mut fx, |g, k| {
            g.list_move(k.origin, k.list, 0, 5, 3).unwrap();
        })
        .unwrap();
        assert_eq!(c.moves, [mv(5, 3)]);
    }

    #[test]
    fn moving_an_entry_forward() {
        let mut fx = linked_rows();
        let c = list_run(&mut fx, |g, k| {
            g.list_move(k.origin, k.list, 0, 1, 3).unwrap();
        })
        .unwrap();
        assert_eq!(c.moves, [mv(1, 3)]);
    }

    #[test]
    fn chained_moves_collapse() {
        let mut fx = linked_rows();
        let c = list_run(&mut fx, |g, k| {
            g.list_move(k.origin, k.list, 0, 1, 3).unwrap();
            g.list_move(k.origin, k.list, 0, 3, 5).unwrap();
        })
        .unwrap();
        assert_eq!(c.moves, [mv(1, 5)]);
    }

    #[test]
    fn backward_chained_moves_collapse() {
        let mut fx = linked_rows();
        let c = list_run(&mut fx, |g, k| {
            g.list_move(k.origin, k.list, 0, 5, 3).unwrap();
            g.list_move(k.origin, k.list, 0, 3, 1).unwrap();
        })
        .unwrap();
        assert_eq!(c.moves, [mv(5, 1)]);
    }

    #[test]
    fn moves_shift_other_moves() {
        let mut fx = linked_rows();
        let c = list_run(&mut fx, |g, k| {
            g.list_move(k.origin, k.list, 0, 1, 5).unwrap();
            g.list_move(k.origin, k.list, 0, 2, 7).unwrap();
        })
        .unwrap();
        assert_eq!(c.moves, [mv(1, 4), mv(3, 7)]);
    }

    #[test]
    fn moves_shift_other_moves_backward() {
        let mut fx = linked_rows();
        let c = list_run(&mut fx, |g, k| {
            g.list_move(k.origin, k.list, 0, 1, 5).unwrap();
            g.list_move(k.origin, k.list, 0, 7, 0).unwrap();
        })
        .unwrap();
        assert_eq!(c.moves, [mv(1, 6), mv(7, 0)]);
    }

    #[test]
    fn self_move_is_a_no_op() {
        let mut fx = linked_rows();
        let c = list_run(&mut fx, |g, k| {
            g.list_move(k.origin, k.list, 0, 5, 5).unwrap();
        })
        .unwrap();
        assert!(c.is_empty());
    }

    #[test]
    fn swapping_entries_marks_both() {
        let mut fx = linked_rows();
        let c = list_run(&mut fx, |g, k| {
            g.list_swap(k.origin, k.list, 0, 3, 5).unwrap();
        })
        .unwrap();
        assert_eq!(indexes(&c.modifications), [3, 5]);
    }

    #[test]
    fn deleting_a_target_row_removes_its_entry() {
        let mut fx = linked_rows();
        let c = list_run(&mut fx, |g, k| {
            g.move_last_over(k.target, 5).unwrap();
        })
        .unwrap();
        assert_eq!(indexes(&c.deletions), [5]);
        assert!(c.insertions.is_empty());
    }

    #[test]
    fn removing_all_target_rows_empties_the_list() {
        let mut fx = linked_rows();
        let c = list_run(&mut fx, |g, k| {
            g.remove_all_target_rows(k.origin, k.list, 0).unwrap();
        })
        .unwrap();
        assert_eq!(indexes(&c.deletions), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn clearing_the_target_table_empties_the_list() {
        let mut fx = linked_rows();
        let c = list_run(&mut fx, |g, k| {
            g.clear(k.target).unwrap();
        })
        .unwrap();
        assert_eq!(indexes(&c.deletions), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn set_before_insert_shifts_the_modification() {
        let mut fx = linked_rows();
        let c = list_run(&mut fx, |g, k| {
            g.list_set(k.origin, k.list, 0, 5, 0).unwrap();
            g.list_insert(k.origin, k.list, 0, 5, 0).unwrap();
        })
        .unwrap();
        assert_eq!(indexes(&c.insertions), [5]);
        assert_eq!(indexes(&c.modifications), [6]);
    }

    #[test]
    fn set_below_insert_stays_put() {
        let mut fx = linked_rows();
        let c = list_run(&mut fx, |g, k| {
            g.list_set(k.origin, k.list, 0, 4, 0).unwrap();
            g.list_insert(k.origin, k.list, 0, 5, 0).unwrap();
        })
        .unwrap();
        assert_eq!(indexes(&c.insertions), [5]);
        assert_eq!(indexes(&c.modifications), [4]);
    }

    #[test]
    fn setting_a_fresh_entry_reports_only_the_insertion() {
        let mut fx = linked_rows();
        let c = list_run(&mut fx, |g, k| {
            g.list_insert(k.origin, k.list, 0, 5, 0).unwrap();
            g.list_set(k.origin, k.list, 0, 5, 1).unwrap();
        })
        .unwrap();
        assert_eq!(indexes(&c.insertions), [5]);
        assert!(c.modifications.is_empty());
    }

    #[test]
    fn setting_above_an_insert_marks_the_shifted_row() {
        let mut fx = linked_rows();
        let c = list_run(&mut fx, |g, k| {
            g.list_insert(k.origin, k.list, 0, 5, 0).unwrap();
            g.list_set(k.origin, k.list, 0, 6, 1).unwrap();
        })
        .unwrap();
        assert_eq!(indexes(&c.insertions), [5]);
        assert_eq!(indexes(&c.modifications), [6]);
    }

    #[test]
    fn setting_below_an_insert_marks_the_original_row() {
        let mut fx = linked_rows();
        let c = list_run(&mut fx, |g, k| {
            g.list_insert(k.origin, k.list, 0, 6, 0).unwrap();
            g.list_set(k.origin, k.list, 0, 5, 1).unwrap();
        })
        .unwrap();
        assert_eq!(indexes(&c.insertions), [6]);
        assert_eq!(indexes(&c.modifications), [5]);
    }

    #[test]
    fn erasing_a_set_entry_drops_the_modification() {
        let mut fx = linked_rows();
        let c = list_run(&mut fx, |g, k| {
            g.list_set(k.origin, k.list, 0, 5, 0).unwrap();
            g.list_erase(k.origin, k.list, 0, 5).unwrap();
        })
        .unwrap();
        assert_eq!(indexes(&c.deletions), [5]);
        assert!(c.modifications.is_empty());
    }

    #[test]
    fn erasing_below_a_set_entry_shifts_the_modification() {
        let mut fx = linked_rows();
        let c = list_run(&mut fx, |g, k| {
            g.list_set(k.origin, k.list, 0, 5, 0).unwrap();
            g.list_erase(k.origin, k.list, 0, 4).unwrap();
        })
        .unwrap();
        assert_eq!(indexes(&c.deletions), [4]);
        assert_eq!(indexes(&c.modifications), [4]);
    }

    #[test]
    fn erasing_the_shifted_set_entry_drops_it_too() {
        let mut fx = linked_rows();
        let c = list_run(&mut fx, |g, k| {
            g.list_set(k.origin, k.list, 0, 5, 0).unwrap();
            g.list_erase(k.origin, k.list, 0, 4).unwrap();
            g.list_erase(k.origin, k.list, 0, 4).unwrap();
        })
        .unwrap();
        assert_eq!(indexes(&c.deletions), [4, 5]);
        assert!(c.modifications.is_empty());
    }

    #[test]
    fn setting_the_successor_of_an_erased_entry() {
        let mut fx = linked_rows();
        let c = list_run(&mut fx, |g, k| {
            g.list_erase(k.origin, k.list, 0, 5).unwrap();
            g.list_set(k.origin, k.list, 0, 5, 0).unwrap();
        })
        .unwrap();
        assert_eq!(indexes(&c.deletions), [5]);
        assert_eq!(indexes(&c.modifications), [5]);
    }

    #[test]
    fn clearing_after_an_insert_reports_only_original_rows() {
        let mut fx = linked_rows();
        let c = list_run(&mut fx, |g, k| {
            g.list_add(k.origin, k.list, 0, 0).unwrap();
            g.list_clear(k.origin, k.list, 0).unwrap();
        })
        .unwrap();
        assert_eq!(indexes(&c.deletions), (0..10).collect::<Vec<_>>());
        assert!(c.insertions.is_empty());
    }

    #[test]
    fn clearing_after_a_set_drops_the_modification() {
        let mut fx = linked_rows();
        let c = list_run(&mut fx, |g, k| {
            g.list_set(k.origin, k.list, 0, 5, 0).unwrap();
            g.list_clear(k.origin, k.list, 0).unwrap();
        })
        .unwrap();
        assert_eq!(indexes(&c.deletions), (0..10).collect::<Vec<_>>());
        assert!(c.modifications.is_empty());
    }

    #[test]
    fn inserting_after_a_clear() {
        let mut fx = linked_rows();
        let c = list_run(&mut fx, |g, k| {
            g.list_clear(k.origin, k.list, 0).unwrap();
            g.list_add(k.origin, k.list, 0, 0).unwrap();
        })
        .unwrap();
        assert_eq!(indexes(&c.deletions), (0..10).collect::<Vec<_>>());
        assert_eq!(indexes(&c.insertions), [0]);
    }

    #[test]
    fn erasing_a_fresh_entry_cancels_out() {
        let mut fx = linked_rows();
        let c = list_run(&mut fx, |g, k| {
            g.list_add(k.origin, k.list, 0, 0).unwrap();
            g.list_erase(k.origin, k.list, 0, 10).unwrap();
        })
        .unwrap();
        assert!(c.is_empty());
    }

    #[test]
    fn erasing_below_a_fresh_entry_shifts_it() {
        let mut fx = linked_rows();
        let c = list_run(&mut fx, |g, k| {
            g.list_add(k.origin, k.list, 0, 0).unwrap();
            g.list_erase(k.origin, k.list, 0, 9).unwrap();
        })
        .unwrap();
        assert_eq!(indexes(&c.deletions), [9]);
        assert_eq!(indexes(&c.insertions), [9]);
    }

    #[test]
    fn erasures_walk_past_fresh_entries() {
        let mut fx = linked_rows();
        let c = list_run(&mut fx, |g, k| {
            g.list_insert(k.origin, k.list, 0, 1, 0).unwrap();
            g.list_insert(k.origin, k.list, 0, 2, 0).unwrap();
            g.list_insert(k.origin, k.list, 0, 3, 0).unwrap();
            g.list_erase(k.origin, k.list, 0, 4).unwrap();
            g.list_erase(k.origin, k.list, 0, 4).unwrap();
            g.list_erase(k.origin, k.list, 0, 4).unwrap();
        })
        .unwrap();
        assert_eq!(indexes(&c.deletions), [1, 2, 3]);
        assert_eq!(indexes(&c.insertions), [1, 2, 3]);
    }

    #[test]
    fn inserting_after_an_erase() {
        let mut fx = linked_rows();
        let c = list_run(&mut fx, |g, k| {
            g.list_erase(k.origin, k.list, 0, 9).unwrap();
            g.list_add(k.origin, k.list, 0, 0).unwrap();
        })
        .unwrap();
        assert_eq!(indexes(&c.deletions), [9]);
        assert_eq!(indexes(&c.insertions), [9]);
    }

    #[test]
    fn interleaved_erases_and_inserts() {
        let mut fx = linked_rows();
        let c = list_run(&mut fx, |g, k| {
            for _ in 0..5 {
                g.list_erase(k.origin, k.list, 0, 0).unwrap();
                g.list_erase(k.origin, k.list, 0, 0).unwrap();
                g.list_add(k.origin, k.list, 0, 0).unwrap();
            }
        })
        .unwrap();
        assert_eq!(indexes(&c.deletions), (0..10).collect::<Vec<_>>());
        assert_eq!(indexes(&c.insertions), (0..5).collect::<Vec<_>>());
    }

    #[test]
    fn moving_a_set_entry_subsumes_the_modification() {
        let mut fx = linked_rows();
        let c = list_run(&mut fx, |g, k| {
            g.list_set(k.origin, k.list, 0, 5, 0).unwrap();
            g.list_move(k.origin, k.list, 0, 5, 0).unwrap();
        })
        .unwrap();
        assert_eq!(indexes(&c.deletions), [5]);
        assert_eq!(indexes(&c.insertions), [0]);
        assert_eq!(c.moves, [mv(5, 0)]);
        assert!(c.modifications.is_empty());
    }

    #[test]
    fn setting_a_moved_entry_marks_the_destination() {
        let mut fx = linked_rows();
        let c = list_run(&mut fx, |g, k| {
            g.list_move(k.origin, k.list, 0, 5, 0).unwrap();
            g.list_set(k.origin, k.list, 0, 0, 0).unwrap();
        })
        .unwrap();
        assert_eq!(indexes(&c.deletions), [5]);
        assert_eq!(indexes(&c.insertions), [0]);
        assert_eq!(c.moves, [mv(5, 0)]);
        assert_eq!(indexes(&c.modifications), [0]);
    }

    #[test]
    fn erasing_a_moved_entry_drops_the_move() {
        let mut fx = linked_rows();
        let c = list_run(&mut fx, |g, k| {
            g.list_move(k.origin, k.list, 0, 5, 0).unwrap();
            g.list_erase(k.origin, k.list, 0, 0).unwrap();
        })
        .unwrap();
        assert_eq!(indexes(&c.deletions), [5]);
        assert!(c.insertions.is_empty());
        assert!(c.moves.is_empty());
    }

    #[test]
    fn moving_a_fresh_entry_moves_the_insertion() {
        let mut fx = linked_rows();
        let c = list_run(&mut fx, |g, k| {
            g.list_insert(k.origin, k.list, 0, 5, 0).unwrap();
            g.list_move(k.origin, k.list, 0, 5, 0).unwrap();
        })
        .unwrap();
        assert_eq!(indexes(&c.insertions), [0]);
        assert!(c.moves.is_empty());
        assert!(c.deletions.is_empty());
    }

    #[test]
    fn moves_shift_insertions_and_modifications() {
        let mut fx = linked_rows();
        let c = list_run(&mut fx, |g, k| {
            g.list_insert(k.origin, k.list, 0, 5, 0).unwrap();
            g.list_set(k.origin, k.list, 0, 6, 0).unwrap();
            g.list_move(k.origin, k.list, 0, 7, 4).unwrap();
        })
        .unwrap();
        assert_eq!(indexes(&c.deletions), [6]);
        assert_eq!(indexes(&c.insertions), [4, 6]);
        assert_eq!(indexes(&c.modifications), [7]);
        assert_eq!(c.moves, [mv(6, 4)]);
    }

    #[test]
    fn clearing_after_an_erase() {
        let mut fx = linked_rows();
        let c = list_run(&mut fx, |g, k| {
            g.list_erase(k.origin, k.list, 0, 5).unwrap();
            g.list_clear(k.origin, k.list, 0).unwrap();
        })
        .unwrap();
        assert_eq!(indexes(&c.deletions), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn erasing_before_a_move_target_shifts_the_move() {
        let mut fx = linked_rows();
        let c = list_run(&mut fx, |g, k| {
            g.list_move(k.origin, k.list, 0, 2, 8).unwrap();
            g.list_erase(k.origin, k.list, 0, 5).unwrap();
        })
        .unwrap();
        assert_eq!(indexes(&c.insertions), [7]);
        assert_eq!(indexes(&c.deletions), [2, 6]);
        assert_eq!(c.moves, [mv(2, 7)]);
    }

    #[test]
    fn inserting_before_a_move_target_shifts_the_move() {
        let mut fx = linked_rows();
        let c = list_run(&mut fx, |g, k| {
            g.list_move(k.origin, k.list, 0, 2, 8).unwrap();
            g.list_insert(k.origin, k.list, 0, 5, 0).unwrap();
        })
        .unwrap();
        assert_eq!(c.moves, [mv(2, 9)]);
    }

    #[test]
    fn changes_to_other_lists_are_ignored() {
        let mut fx = linked_rows();
        let c = list_run(&mut fx, |g, k| {
            g.add_row(k.origin).unwrap();
            g.list_add(k.origin, k.list, 1, 0).unwrap();
            g.list_add(k.origin, k.list, 1, 1).unwrap();
            g.list_add(k.origin, k.list, 1, 2).unwrap();
            g.list_set(k.origin, k.list, 1, 0, 3).unwrap();
            g.list_move(k.origin, k.list, 1, 0, 2).unwrap();
            g.list_erase(k.origin, k.list, 1, 1).unwrap();
            g.list_clear(k.origin, k.list, 1).unwrap();
        })
        .unwrap();
        assert!(c.is_empty());
    }

    #[test]
    fn deleting_the_owning_row_destroys_the_list() {
        let mut fx = linked_rows();
        let c = list_run(&mut fx, |g, k| {
            g.list_add(k.origin, k.list, 0, 0).unwrap();
            g.move_last_over(k.origin, 0).unwrap();
        });
        assert!(c.is_none());
    }

    #[test]
    fn tracking_follows_a_relocated_owner() {
        let mut graph = MemGraph::new();
        graph.begin_transaction().unwrap();
        let target = graph.add_table("target").unwrap();
        graph.add_rows(target, 10).unwrap();
        let origin = graph.add_table("origin").unwrap();
        let list = graph
            .add_column(origin, "list", ColumnKind::LinkList { target })
            .unwrap();
        graph.add_rows(origin, 2).unwrap();
        graph.list_add(origin, list, 1, 0).unwrap();
        graph.commit().unwrap();

        let mut info = TransactionChangeInfo::new();
        let handle = info.track_list(origin, 1, list);
        track(&mut graph, &mut info, |g| {
            g.move_last_over(origin, 0).unwrap();
            g.list_add(origin, list, 0, 1).unwrap();
        });
        assert_eq!(info.list_ref(handle).unwrap().row, 0);
        let c = info.list_changes(handle).unwrap();
        assert_eq!(indexes(&c.insertions), [1]);
    }

    // === Structural changes ===

    #[test]
    fn tracking_survives_a_table_inserted_before_the_origin() {
        let mut fx = linked_rows();
        let c = list_run(&mut fx, |g, k| {
            g.insert_table(0, "newtable").unwrap();
            g.list_add(k.origin, k.list, 0, 0).unwrap();
            g.list_add(k.origin, k.list, 0, 1).unwrap();
        })
        .unwrap();
        assert_eq!(indexes(&c.insertions), [10, 11]);
    }

    #[test]
    fn tracking_survives_reordered_tables() {
        let mut fx = linked_rows();
        let c = list_run(&mut fx, |g, k| {
            g.move_table(1, 0).unwrap();
            g.list_add(k.origin, k.list, 0, 0).unwrap();
            g.list_add(k.origin, k.list, 0, 1).unwrap();
            g.list_add(k.origin, k.list, 0, 2).unwrap();
        })
        .unwrap();
        assert_eq!(indexes(&c.insertions), [10, 11, 12]);
    }

    #[test]
    fn tracking_survives_a_column_inserted_before_the_list() {
        let mut fx = linked_rows();
        let c = list_run(&mut fx, |g, k| {
            g.insert_column(k.origin, 0, "pad", ColumnKind::Scalar)
                .unwrap();
            g.list_add(k.origin, k.list, 0, 0).unwrap();
            g.list_add(k.origin, k.list, 0, 1).unwrap();
        })
        .unwrap();
        assert_eq!(indexes(&c.insertions), [10, 11]);
    }

    #[test]
    fn tracking_survives_reordered_columns() {
        let mut fx = linked_rows();
        let c = list_run(&mut fx, |g, k| {
            g.add_column(k.origin, "pad", ColumnKind::Scalar).unwrap();
            g.move_column(k.origin, 1, 0).unwrap();
            g.list_add(k.origin, k.list, 0, 0).unwrap();
            g.list_add(k.origin, k.list, 0, 1).unwrap();
            g.list_add(k.origin, k.list, 0, 2).unwrap();
        })
        .unwrap();
        assert_eq!(indexes(&c.insertions), [10, 11, 12]);
    }

    // === Schema validation ===

    fn observed_run(
        graph: &mut MemGraph,
        mode: SchemaMode,
        f: impl FnOnce(&mut MemGraph),
    ) -> NotifyResult<Vec<ObserverKey>> {
        let before = graph.current_version();
        graph.begin_transaction().unwrap();
        f(graph);
        graph.commit().unwrap();
        let schema = graph.schema_at(before).unwrap();
        let logs = graph.logs_since(before);
        let mut info = TransactionChangeInfo::new();
        let mut observers = Vec::new();
        advance_observed(&schema, &logs, &mut info, &mut observers, mode)
    }

    fn empty_graph_with_table() -> (MemGraph, TableKey) {
        let mut graph = MemGraph::new();
        graph.begin_transaction().unwrap();
        let table = graph.add_table("existing").unwrap();
        graph
            .add_column(table, "value", ColumnKind::Scalar)
            .unwrap();
        graph.commit().unwrap();
        (graph, table)
    }

    #[test]
    fn adding_a_table_is_allowed_while_observing() {
        let (mut graph, _) = empty_graph_with_table();
        let result = observed_run(&mut graph, SchemaMode::Strict, |g| {
            g.add_table("another").unwrap();
        });
        assert!(result.is_ok());
    }

    #[test]
    fn a_new_table_may_grow_columns_in_strict_mode() {
        let (mut graph, _) = empty_graph_with_table();
        let result = observed_run(&mut graph, SchemaMode::Strict, |g| {
            let t = g.add_table("another").unwrap();
            g.add_column(t, "value", ColumnKind::Scalar).unwrap();
        });
        assert!(result.is_ok());
    }

    #[test]
    fn growing_an_existing_table_is_a_strict_error() {
        let (mut graph, table) = empty_graph_with_table();
        let result = observed_run(&mut graph, SchemaMode::Strict, |g| {
            g.add_column(table, "extra", ColumnKind::Scalar).unwrap();
        });
        assert!(matches!(
            result,
            Err(NotifyError::ColumnAddedToExistingTable { table: t }) if t == table
        ));
    }

    #[test]
    fn additive_mode_accepts_new_columns() {
        let (mut graph, table) = empty_graph_with_table();
        let result = observed_run(&mut graph, SchemaMode::Additive, |g| {
            g.add_column(table, "extra", ColumnKind::Scalar).unwrap();
        });
        assert!(result.is_ok());
    }

    #[test]
    fn moving_a_table_is_a_strict_error() {
        let (mut graph, _) = empty_graph_with_table();
        graph.begin_transaction().unwrap();
        graph.add_table("second").unwrap();
        graph.commit().unwrap();
        let result = observed_run(&mut graph, SchemaMode::Strict, |g| {
            g.move_table(1, 0).unwrap();
        });
        assert!(matches!(
            result,
            Err(NotifyError::TableMoved { from: 1, to: 0 })
        ));
    }

    #[test]
    fn additive_mode_accepts_moved_tables() {
        let (mut graph, _) = empty_graph_with_table();
        graph.begin_transaction().unwrap();
        graph.add_table("second").unwrap();
        graph.commit().unwrap();
        let result = observed_run(&mut graph, SchemaMode::Additive, |g| {
            g.move_table(1, 0).unwrap();
        });
        assert!(result.is_ok());
    }

    #[test]
    fn moving_a_column_is_a_strict_error() {
        let (mut graph, table) = empty_graph_with_table();
        graph.begin_transaction().unwrap();
        graph
            .add_column(table, "second", ColumnKind::Scalar)
            .unwrap();
        graph.commit().unwrap();
        let result = observed_run(&mut graph, SchemaMode::Strict, |g| {
            g.move_column(table, 1, 0).unwrap();
        });
        assert!(matches!(
            result,
            Err(NotifyError::ColumnMoved { table: t }) if t == table
        ));
    }

    #[test]
    fn additive_mode_accepts_moved_columns() {
        let (mut graph, table) = empty_graph_with_table();
        graph.begin_transaction().unwrap();
        graph
            .add_column(table, "second", ColumnKind::Scalar)
            .unwrap();
        graph.commit().unwrap();
        let result = observed_run(&mut graph, SchemaMode::Additive, |g| {
            g.move_column(table, 1, 0).unwrap();
        });
        assert!(result.is_ok());
    }

    #[test]
    fn erasing_an_existing_table_fails_in_both_modes() {
        for mode in [SchemaMode::Strict, SchemaMode::Additive] {
            let (mut graph, table) = empty_graph_with_table();
            let result = observed_run(&mut graph, mode, |g| {
                g.erase_table(table).unwrap();
            });
            assert!(matches!(
                result,
                Err(NotifyError::TableErased { table: t }) if t == table
            ));
        }
    }

    #[test]
    fn erasing_an_existing_column_fails_in_both_modes() {
        for mode in [SchemaMode::Strict, SchemaMode::Additive] {
            let (mut graph, table) = empty_graph_with_table();
            let col = {
                graph.begin_transaction().unwrap();
                let col = graph
                    .add_column(table, "doomed", ColumnKind::Scalar)
                    .unwrap();
                graph.commit().unwrap();
                col
            };
            let result = observed_run(&mut graph, mode, |g| {
                g.erase_column(table, col).unwrap();
            });
            assert!(matches!(
                result,
                Err(NotifyError::ColumnErased { table: t }) if t == table
            ));
        }
    }

    #[test]
    fn erasing_a_table_created_in_the_transaction_is_allowed() {
        let (mut graph, _) = empty_graph_with_table();
        let result = observed_run(&mut graph, SchemaMode::Strict, |g| {
            let t = g.add_table("ephemeral").unwrap();
            g.erase_table(t).unwrap();
        });
        assert!(result.is_ok());
    }

    #[test]
    fn plain_replay_accepts_any_schema_change() {
        let (mut graph, table) = empty_graph_with_table();
        graph.begin_transaction().unwrap();
        graph.add_table("second").unwrap();
        let doomed = graph
            .add_column(table, "extra", ColumnKind::Scalar)
            .unwrap();
        graph.commit().unwrap();

        let mut info = TransactionChangeInfo::new();
        info.track_table(table, TrackLevel::Moves);
        track(&mut graph, &mut info, |g| {
            g.move_table(1, 0).unwrap();
            g.erase_column(table, doomed).unwrap();
        });
        assert!(info.tables.is_empty());
    }
}
