//! Property-based operation generators using proptest.
//!
//! Provides strategies for generating random mutation sequences
//! together with helpers that apply them to a graph.
//!
//! Generated positions are raw values; [`RowOperation::apply`] and
//! [`ListOperation::apply`] clamp them to the collection's current size so
//! a shrunk sequence stays valid no matter how the rows shifted before it.

use proptest::prelude::*;
use tetherdb_graph::{ColKey, GraphResult, GraphSnapshot, MemGraph, TableKey};

/// A single row-level operation against a scalar table.
#[derive(Debug, Clone, Copy)]
pub enum RowOperation {
    /// Write a row's value cell.
    Set {
        /// Row position, taken modulo the current row count.
        row: usize,
        /// The value to write.
        value: i64,
    },
    /// Append rows at the end.
    Add {
        /// Number of rows to append.
        count: usize,
    },
    /// Insert rows at a position, shifting those after it.
    Insert {
        /// Insertion position, taken modulo the row count plus one.
        row: usize,
        /// Number of rows to insert.
        count: usize,
    },
    /// Erase a row, shifting those after it.
    Erase {
        /// Row position, taken modulo the current row count.
        row: usize,
    },
    /// Erase a row by relocating the last row into its slot.
    MoveLastOver {
        /// Row position, taken modulo the current row count.
        row: usize,
    },
    /// Swap two rows in place.
    Swap {
        /// First row, taken modulo the current row count.
        row_1: usize,
        /// Second row, taken modulo the current row count.
        row_2: usize,
    },
    /// Move a row to a new position, shifting the rows in between.
    Move {
        /// Source row, taken modulo the current row count.
        from: usize,
        /// Destination row, taken modulo the current row count.
        to: usize,
    },
    /// Remove every row.
    Clear,
}

impl RowOperation {
    /// Applies the operation to `table`, clamping positions to the current
    /// row count. Operations that need a row are skipped on an empty table.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph rejects the mutation, which a clamped
    /// operation inside an open transaction never does.
    pub fn apply(&self, graph: &mut MemGraph, table: TableKey, value: ColKey) -> GraphResult<()> {
        let len = graph.table_len(table)?;
        match *self {
            RowOperation::Set { row, value: new } => {
                if len > 0 {
                    graph.set_int(table, value, row % len, new)?;
                }
            }
            RowOperation::Add { count } => {
                graph.add_rows(table, count)?;
            }
            RowOperation::Insert { row, count } => {
                graph.insert_rows(table, row % (len + 1), count)?;
            }
            RowOperation::Erase { row } => {
                if len > 0 {
                    graph.erase_row(table, row % len)?;
                }
            }
            RowOperation::MoveLastOver { row } => {
                if len > 0 {
                    graph.move_last_over(table, row % len)?;
                }
            }
            RowOperation::Swap { row_1, row_2 } => {
                if len > 0 {
                    graph.swap_rows(table, row_1 % len, row_2 % len)?;
                }
            }
            RowOperation::Move { from, to } => {
                if len > 0 {
                    let (from, to) = (from % len, to % len);
                    if from != to {
                        graph.move_row(table, from, to)?;
                    }
                }
            }
            RowOperation::Clear => graph.clear(table)?,
        }
        Ok(())
    }
}

/// Strategy for a single row operation, weighted towards plain writes.
pub fn row_operation_strategy() -> impl Strategy<Value = RowOperation> {
    let pos = 0usize..32;
    prop_oneof![
        4 => (pos.clone(), any::<i64>()).prop_map(|(row, value)| RowOperation::Set { row, value }),
        2 => (1usize..4).prop_map(|count| RowOperation::Add { count }),
        2 => (pos.clone(), 1usize..4).prop_map(|(row, count)| RowOperation::Insert { row, count }),
        2 => pos.clone().prop_map(|row| RowOperation::Erase { row }),
        2 => pos.clone().prop_map(|row| RowOperation::MoveLastOver { row }),
        1 => (pos.clone(), pos.clone()).prop_map(|(row_1, row_2)| RowOperation::Swap { row_1, row_2 }),
        1 => (pos.clone(), pos).prop_map(|(from, to)| RowOperation::Move { from, to }),
        1 => Just(RowOperation::Clear),
    ]
}

/// Strategy for a sequence of row operations.
pub fn row_operation_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<RowOperation>> {
    prop::collection::vec(row_operation_strategy(), min_ops..max_ops)
}

/// A single membership operation against a link list.
#[derive(Debug, Clone, Copy)]
pub enum ListOperation {
    /// Append an entry at the end.
    Add {
        /// Target row, taken modulo the target table's row count.
        target: usize,
    },
    /// Insert an entry, shifting those after it.
    Insert {
        /// Insertion position, taken modulo the list length plus one.
        ndx: usize,
        /// Target row, taken modulo the target table's row count.
        target: usize,
    },
    /// Overwrite an entry in place.
    Set {
        /// Entry position, taken modulo the current list length.
        ndx: usize,
        /// Target row, taken modulo the target table's row count.
        target: usize,
    },
    /// Move an entry to a new position, shifting those in between.
    Move {
        /// Source position, taken modulo the current list length.
        from: usize,
        /// Destination position, taken modulo the current list length.
        to: usize,
    },
    /// Swap two entries in place.
    Swap {
        /// First position, taken modulo the current list length.
        ndx_1: usize,
        /// Second position, taken modulo the current list length.
        ndx_2: usize,
    },
    /// Remove an entry, shifting those after it.
    Erase {
        /// Entry position, taken modulo the current list length.
        ndx: usize,
    },
    /// Remove every entry.
    Clear,
}

impl ListOperation {
    /// Applies the operation to the list owned by `row`, clamping positions
    /// to the current list length. Operations that need an entry are skipped
    /// on an empty list. `targets` is the target table's row count and must
    /// be nonzero.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph rejects the mutation, which a clamped
    /// operation inside an open transaction never does.
    pub fn apply(
        &self,
        graph: &mut MemGraph,
        table: TableKey,
        col: ColKey,
        row: usize,
        targets: usize,
    ) -> GraphResult<()> {
        let len = graph.list_len(table, col, row)?;
        match *self {
            ListOperation::Add { target } => {
                graph.list_add(table, col, row, target % targets)?;
            }
            ListOperation::Insert { ndx, target } => {
                graph.list_insert(table, col, row, ndx % (len + 1), target % targets)?;
            }
            ListOperation::Set { ndx, target } => {
                if len > 0 {
                    graph.list_set(table, col, row, ndx % len, target % targets)?;
                }
            }
            ListOperation::Move { from, to } => {
                if len > 0 {
                    let (from, to) = (from % len, to % len);
                    if from != to {
                        graph.list_move(table, col, row, from, to)?;
                    }
                }
            }
            ListOperation::Swap { ndx_1, ndx_2 } => {
                if len > 0 {
                    graph.list_swap(table, col, row, ndx_1 % len, ndx_2 % len)?;
                }
            }
            ListOperation::Erase { ndx } => {
                if len > 0 {
                    graph.list_erase(table, col, row, ndx % len)?;
                }
            }
            ListOperation::Clear => graph.list_clear(table, col, row)?,
        }
        Ok(())
    }
}

/// Strategy for a single list operation, weighted towards membership edits.
pub fn list_operation_strategy() -> impl Strategy<Value = ListOperation> {
    let pos = 0usize..32;
    prop_oneof![
        3 => pos.clone().prop_map(|target| ListOperation::Add { target }),
        2 => (pos.clone(), pos.clone()).prop_map(|(ndx, target)| ListOperation::Insert { ndx, target }),
        2 => (pos.clone(), pos.clone()).prop_map(|(ndx, target)| ListOperation::Set { ndx, target }),
        2 => pos.clone().prop_map(|ndx| ListOperation::Erase { ndx }),
        1 => (pos.clone(), pos.clone()).prop_map(|(from, to)| ListOperation::Move { from, to }),
        1 => (pos.clone(), pos).prop_map(|(ndx_1, ndx_2)| ListOperation::Swap { ndx_1, ndx_2 }),
        1 => Just(ListOperation::Clear),
    ]
}

/// Strategy for a sequence of list operations.
pub fn list_operation_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<ListOperation>> {
    prop::collection::vec(list_operation_strategy(), min_ops..max_ops)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
