//! Error types for graph operations.

use crate::keys::{ColKey, TableKey, Version};
use thiserror::Error;

/// Result type for graph operations.
pub type GraphResult<T> = Result<T, GraphError>;

/// Errors that can occur during graph operations.
#[derive(Debug, Error)]
pub enum GraphError {
    /// The table key does not name a live table.
    #[error("unknown table: {table}")]
    UnknownTable {
        /// The key that was looked up.
        table: TableKey,
    },

    /// The column key does not name a live column of the table.
    #[error("unknown column {column} in table {table}")]
    UnknownColumn {
        /// The table that was searched.
        table: TableKey,
        /// The key that was looked up.
        column: ColKey,
    },

    /// A row index is beyond the end of its table.
    #[error("row {row} out of range for table of {len} rows")]
    RowOutOfRange {
        /// The requested row.
        row: usize,
        /// The current table length.
        len: usize,
    },

    /// A position is beyond the end of a positional sequence.
    #[error("position {position} out of range ({len} entries)")]
    PositionOutOfRange {
        /// The requested position.
        position: usize,
        /// The current number of entries.
        len: usize,
    },

    /// A list index is beyond the end of the list.
    #[error("list index {index} out of range for list of {len} entries")]
    ListIndexOutOfRange {
        /// The requested index.
        index: usize,
        /// The current list length.
        len: usize,
    },

    /// A column was used as the wrong kind.
    #[error("column {column} is not a {expected} column")]
    ColumnKindMismatch {
        /// The column that was accessed.
        column: ColKey,
        /// The kind the operation required.
        expected: &'static str,
    },

    /// A table could not be erased because link columns point into it.
    #[error("table {table} is the target of link columns")]
    TargetOfLinks {
        /// The table that was to be erased.
        table: TableKey,
    },

    /// A mutation was attempted outside a transaction.
    #[error("no transaction is open")]
    NoOpenTransaction,

    /// A transaction was opened while another was still open.
    #[error("a transaction is already open")]
    TransactionInProgress,

    /// The version is newer than anything committed.
    #[error("unknown version: {version}")]
    UnknownVersion {
        /// The version that was requested.
        version: Version,
    },

    /// An instruction stream could not be interpreted.
    #[error("malformed instruction stream: {reason}")]
    MalformedLog {
        /// Description of the problem.
        reason: String,
    },
}

impl GraphError {
    /// Creates a malformed-log error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedLog {
            reason: reason.into(),
        }
    }
}
