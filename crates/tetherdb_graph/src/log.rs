//! The transaction log instruction set.
//!
//! Every committed transaction is described by an ordered list of
//! [`Instruction`]s. The stream is stateful: row and list operations apply to
//! the most recent [`Instruction::SelectTable`] / [`Instruction::SelectList`].
//! Tables and columns are addressed by *position* in the stream (the
//! positions they had when the instruction executed); consumers that track
//! state across structural changes resolve positions back to stable keys as
//! they replay.
//!
//! The stream also carries the engine's internal bookkeeping: backlink
//! maintenance shows up as [`Instruction::NullifyLink`] / list nullification
//! before the erase that caused it, and unique-key collisions show up as an
//! explicit [`Instruction::MergeRows`] followed by the erase of the losing
//! row. Position-only changes (a link's target moving to a different row)
//! produce no instruction at all.

use crate::keys::{ColKey, TableKey, Version};
use crate::schema::ColumnKind;

/// A value carried by a set instruction.
///
/// Change tracking never inspects values; they are carried so the log is a
/// complete record that can reproduce the transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value {
    /// A scalar integer.
    Int(i64),
    /// A link to a row of the column's target table, or null.
    Link(Option<usize>),
}

/// A single transaction log instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// Selects the table at `ndx` for subsequent row and column operations.
    SelectTable {
        /// The table's current position.
        ndx: usize,
    },

    /// Selects a link list of the selected table for subsequent list
    /// operations.
    SelectList {
        /// The list column's current position.
        col_ndx: usize,
        /// The owning row.
        row: usize,
    },

    /// Inserts `count` rows at `row`, shifting later rows up.
    ///
    /// Appends have `row == prior_rows`.
    InsertRows {
        /// First inserted row index.
        row: usize,
        /// Number of rows inserted.
        count: usize,
        /// Table length before the insert.
        prior_rows: usize,
    },

    /// Erases the row at `row`.
    ///
    /// When `unordered` is true this is a move-last-over: the last row is
    /// moved into the erased slot and no other row shifts. When false the
    /// erase is ordered and later rows shift down.
    EraseRows {
        /// The erased row.
        row: usize,
        /// Table length before the erase.
        prior_rows: usize,
        /// Whether the last row was moved into the hole.
        unordered: bool,
    },

    /// Exchanges the positions of two rows.
    SwapRows {
        /// One row.
        row_1: usize,
        /// The other row.
        row_2: usize,
    },

    /// Moves a row from one position to another, shifting rows in between.
    MoveRow {
        /// The row's position before the move.
        from: usize,
        /// The row's position after the move.
        to: usize,
    },

    /// Removes every row of the selected table.
    ClearTable {
        /// Table length before the clear.
        prior_rows: usize,
    },

    /// Assigns a value to a cell.
    SetValue {
        /// The column's current position.
        col_ndx: usize,
        /// The row.
        row: usize,
        /// The assigned value.
        value: Value,
        /// True when the assignment only established a default value.
        is_default: bool,
    },

    /// Assigns a unique-key value to a cell.
    ///
    /// On collision the engine follows up with [`Instruction::MergeRows`] and
    /// an erase; a lone `SetUnique` means no collision occurred.
    SetUnique {
        /// The column's current position.
        col_ndx: usize,
        /// The row.
        row: usize,
        /// The assigned value.
        value: Value,
    },

    /// Transfers the identity of `row` to `new_row`.
    ///
    /// Incoming links are re-pointed by the engine as part of the transfer;
    /// an erase of `row`'s slot follows in the same transaction.
    MergeRows {
        /// The row giving up its identity.
        row: usize,
        /// The row assuming it.
        new_row: usize,
    },

    /// Sets a link cell to null because its target row was deleted.
    NullifyLink {
        /// The link column's current position.
        col_ndx: usize,
        /// The owning row.
        row: usize,
    },

    /// Assigns a new target to an entry of the selected list.
    ListSet {
        /// The entry index.
        ndx: usize,
        /// The new target row.
        target: usize,
    },

    /// Inserts an entry into the selected list, shifting later entries up.
    ListInsert {
        /// The insertion index.
        ndx: usize,
        /// The target row.
        target: usize,
    },

    /// Moves an entry of the selected list, shifting entries in between.
    ListMove {
        /// The entry's index before the move.
        from: usize,
        /// The entry's index after the move.
        to: usize,
    },

    /// Exchanges two entries of the selected list.
    ListSwap {
        /// One entry index.
        ndx_1: usize,
        /// The other entry index.
        ndx_2: usize,
    },

    /// Removes an entry from the selected list, shifting later entries down.
    ListErase {
        /// The removed entry index.
        ndx: usize,
    },

    /// Removes an entry from the selected list because its target row was
    /// deleted.
    ListNullify {
        /// The removed entry index.
        ndx: usize,
    },

    /// Removes every entry of the selected list.
    ListClear {
        /// List length before the clear.
        prior_size: usize,
    },

    /// Creates a table at `ndx`, shifting later tables up.
    InsertTable {
        /// The new table's position.
        ndx: usize,
        /// The new table's stable key.
        key: TableKey,
        /// The new table's name.
        name: String,
    },

    /// Moves a table from one position to another.
    MoveTable {
        /// The table's position before the move.
        from: usize,
        /// The table's position after the move.
        to: usize,
    },

    /// Erases the table at `ndx`, shifting later tables down.
    EraseTable {
        /// The erased table's position.
        ndx: usize,
    },

    /// Adds a column to the selected table at `ndx`, shifting later columns
    /// up.
    InsertColumn {
        /// The new column's position.
        ndx: usize,
        /// The new column's stable key.
        key: ColKey,
        /// The new column's name.
        name: String,
        /// The new column's kind.
        kind: ColumnKind,
    },

    /// Moves a column of the selected table from one position to another.
    MoveColumn {
        /// The column's position before the move.
        from: usize,
        /// The column's position after the move.
        to: usize,
    },

    /// Erases the column of the selected table at `ndx`, shifting later
    /// columns down.
    EraseColumn {
        /// The erased column's position.
        ndx: usize,
    },
}

/// The log of one committed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedLog {
    /// The version this transaction produced.
    pub version: Version,
    /// The transaction's instructions, in execution order.
    pub instructions: Vec<Instruction>,
}
