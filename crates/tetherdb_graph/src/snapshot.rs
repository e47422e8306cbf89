//! Read-side traits consumed by change tracking.

use crate::error::GraphResult;
use crate::keys::{ColKey, TableKey, Version};
use crate::log::CommittedLog;
use crate::schema::Schema;

/// Read-only access to a committed state of the graph.
///
/// Change tracking uses this to walk stored links when deciding whether a
/// row is transitively affected by a transaction. Implementations hand out
/// the state as of one fixed version; they are never asked about uncommitted
/// data.
///
/// # Invariants
///
/// - `schema` describes exactly the tables and columns visible through the
///   other methods
/// - `link` and `link_list` targets are valid row indices of the column's
///   target table
pub trait GraphSnapshot {
    /// Returns the schema of this state.
    fn schema(&self) -> Schema;

    /// Returns the number of rows in a table.
    ///
    /// # Errors
    ///
    /// Returns an error if the table does not exist.
    fn table_len(&self, table: TableKey) -> GraphResult<usize>;

    /// Reads a link cell.
    ///
    /// # Errors
    ///
    /// Returns an error if the table, column, or row does not exist, or the
    /// column is not a link column.
    fn link(&self, table: TableKey, col: ColKey, row: usize) -> GraphResult<Option<usize>>;

    /// Reads a link list cell.
    ///
    /// # Errors
    ///
    /// Returns an error if the table, column, or row does not exist, or the
    /// column is not a link-list column.
    fn link_list(&self, table: TableKey, col: ColKey, row: usize) -> GraphResult<&[usize]>;
}

/// Access to the committed transaction history.
///
/// Observers replay logs obtained here to advance from the version they last
/// saw to the current one. The history is append-only: once returned for a
/// version, a log never changes.
pub trait LogSource {
    /// Returns the most recently committed version.
    fn current_version(&self) -> Version;

    /// Returns the logs of every transaction committed after `after`, in
    /// commit order.
    fn logs_since(&self, after: Version) -> Vec<CommittedLog>;

    /// Returns the schema as of a committed version.
    ///
    /// # Errors
    ///
    /// Returns an error if the version has not been committed.
    fn schema_at(&self, version: Version) -> GraphResult<Schema>;
}

/// A log source that can also open snapshots of committed versions.
///
/// Notifiers need both halves: the logs say what happened between two
/// versions, and the snapshot at the end of each replayed transaction is
/// what link traversal and list reads run against.
pub trait SnapshotSource: LogSource {
    /// The snapshot type handed out.
    type Snapshot: GraphSnapshot;

    /// Opens the state as of a committed version.
    ///
    /// # Errors
    ///
    /// Returns an error if the version has not been committed.
    fn snapshot_at(&self, version: Version) -> GraphResult<Self::Snapshot>;
}
