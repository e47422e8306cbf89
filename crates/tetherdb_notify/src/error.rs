//! Error types for change tracking.

use tetherdb_graph::{GraphError, TableKey};
use thiserror::Error;

/// Result alias for change-tracking operations.
pub type NotifyResult<T> = Result<T, NotifyError>;

/// Errors surfaced while replaying transaction logs.
///
/// Schema errors are only raised on the observed replay path, and only for
/// the changes the configured [`SchemaMode`](crate::SchemaMode) rejects.
/// Plain change-info replay accepts any well-formed log.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// A log added a column to a table that predates the transaction.
    #[error("cannot add a column to existing table {table} after observation started")]
    ColumnAddedToExistingTable {
        /// The table that grew a column.
        table: TableKey,
    },

    /// A log moved a table to a new position.
    #[error("moving tables is not supported while observing (from {from} to {to})")]
    TableMoved {
        /// The old table position.
        from: usize,
        /// The new table position.
        to: usize,
    },

    /// A log moved a column to a new position.
    #[error("moving columns of table {table} is not supported while observing")]
    ColumnMoved {
        /// The table whose column moved.
        table: TableKey,
    },

    /// A log erased a table that predates the transaction.
    #[error("cannot remove existing table {table} while observing")]
    TableErased {
        /// The table that was erased.
        table: TableKey,
    },

    /// A log erased a column of a table that predates the transaction.
    #[error("cannot remove a column of existing table {table} while observing")]
    ColumnErased {
        /// The table that lost a column.
        table: TableKey,
    },

    /// The underlying graph reported an error.
    #[error(transparent)]
    Graph(#[from] GraphError),
}
