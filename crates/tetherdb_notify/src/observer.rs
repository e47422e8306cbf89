//! Per-object observation.
//!
//! Collection tracking answers "which rows changed"; observation answers
//! "which columns of this row changed". An [`ObserverState`] is registered
//! for one row and accumulates per-column change detail as logs replay over
//! it: scalar and link columns are simply marked, list columns additionally
//! carry the affected indices and the shape of the change as a
//! [`ChangeKind`].
//!
//! [`advance_and_observe`] wraps the whole cycle for a delegate: ask it what
//! to watch, replay everything committed since the delegate's version, and
//! hand back the observers that changed along with the ones whose rows were
//! deleted.

use std::collections::BTreeMap;

use tetherdb_graph::{ColKey, LogSource, TableKey, Version};
use tracing::debug;

use crate::config::NotifyConfig;
use crate::error::NotifyResult;
use crate::index_set::IndexSet;
use crate::replay::{self, TransactionChangeInfo};

/// Caller-assigned identity for a registered observer.
///
/// Keys only need to be unique among the observers of one advance; they let
/// a delegate match invalidation reports back to its own bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObserverKey(u64);

impl ObserverKey {
    /// Creates an observer key from a raw value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ObserverKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "obs:{}", self.0)
    }
}

/// A row a delegate wants observed, named by its position as of the
/// delegate's current version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObservedRow {
    /// The row's table.
    pub table: TableKey,
    /// The row's index.
    pub row: usize,
    /// The delegate's identity for this observer.
    pub key: ObserverKey,
}

/// The shape of the accumulated change to one list column.
///
/// A single kind of operation keeps its precise indices. Once operations of
/// different kinds mix, the combined effect can no longer be described index
/// by index and the column degrades to [`ChangeKind::SetAll`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChangeKind {
    /// The column changed with no index detail, as for scalar and link
    /// columns.
    #[default]
    None,
    /// Existing entries were overwritten.
    Set,
    /// Entries were inserted.
    Insert,
    /// Entries were removed.
    Remove,
    /// The list changed in a way indices cannot describe.
    SetAll,
}

/// Accumulated change detail for one column of an observed row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnChange {
    /// The shape of the change.
    pub kind: ChangeKind,
    /// The affected list indices, in the coordinates [`ChangeKind`]
    /// implies. Empty for non-list changes and for
    /// [`ChangeKind::SetAll`].
    pub indices: IndexSet,
}

impl ColumnChange {
    fn degrade(&mut self) {
        self.kind = ChangeKind::SetAll;
        self.indices.clear();
    }
}

/// One registered observer: the row it follows and the column changes seen
/// so far.
///
/// The row index is live; the replay rewrites it as rows shift, swap, and
/// merge, so after an advance it names the row's position at the new
/// version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObserverState {
    /// The observed row's table.
    pub table: TableKey,
    /// The observed row's current index.
    pub row: usize,
    /// The caller's identity for this observer.
    pub key: ObserverKey,
    /// Changes per column. Presence alone means the column changed.
    pub columns: BTreeMap<ColKey, ColumnChange>,
}

impl ObserverState {
    /// Creates an observer for one row with no changes recorded.
    #[must_use]
    pub fn new(table: TableKey, row: usize, key: ObserverKey) -> Self {
        Self {
            table,
            row,
            key,
            columns: BTreeMap::new(),
        }
    }

    /// Returns true if any column change has been recorded.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        !self.columns.is_empty()
    }

    /// Marks a column as changed.
    pub fn record_set(&mut self, col: ColKey) {
        self.columns.entry(col).or_default();
    }

    /// Records an insertion into a list column at `ndx`.
    pub fn record_list_insert(&mut self, col: ColKey, ndx: usize) {
        let change = self.columns.entry(col).or_default();
        match change.kind {
            ChangeKind::None | ChangeKind::Insert => {
                change.kind = ChangeKind::Insert;
                change.indices.insert_at(ndx, 1);
            }
            ChangeKind::SetAll => {}
            _ => change.degrade(),
        }
    }

    /// Records the removal of a list column's entry at `ndx`.
    pub fn record_list_remove(&mut self, col: ColKey, ndx: usize) {
        let change = self.columns.entry(col).or_default();
        match change.kind {
            ChangeKind::None | ChangeKind::Remove => {
                change.kind = ChangeKind::Remove;
                change.indices.add_shifted(ndx);
            }
            ChangeKind::SetAll => {}
            _ => change.degrade(),
        }
    }

    /// Records an overwrite of a list column's entry at `ndx`.
    pub fn record_list_set(&mut self, col: ColKey, ndx: usize) {
        let change = self.columns.entry(col).or_default();
        match change.kind {
            ChangeKind::None | ChangeKind::Set => {
                change.kind = ChangeKind::Set;
                change.indices.add(ndx);
            }
            ChangeKind::SetAll => {}
            _ => change.degrade(),
        }
    }

    /// Records a list column's entry moving from `from` to `to`.
    ///
    /// Every entry between the endpoints shifts, so the whole span is
    /// reported as overwritten.
    pub fn record_list_move(&mut self, col: ColKey, from: usize, to: usize) {
        let (from, to) = if from > to { (to, from) } else { (from, to) };
        let change = self.columns.entry(col).or_default();
        match change.kind {
            ChangeKind::None | ChangeKind::Set => {
                change.kind = ChangeKind::Set;
                for i in from..=to {
                    change.indices.add(i);
                }
            }
            ChangeKind::SetAll => {}
            _ => change.degrade(),
        }
    }

    /// Records two list column entries exchanging places.
    pub fn record_list_swap(&mut self, col: ColKey, ndx_1: usize, ndx_2: usize) {
        self.record_list_set(col, ndx_1);
        self.record_list_set(col, ndx_2);
    }

    /// Records a list column being emptied, given its size before the
    /// clear.
    ///
    /// The removal is reported against the list's size at the start of the
    /// replay span, so earlier recorded insertions and removals are folded
    /// into the count rather than reported separately.
    pub fn record_list_clear(&mut self, col: ColKey, prior_size: usize) {
        let change = self.columns.entry(col).or_default();
        let mut size = prior_size;
        match change.kind {
            ChangeKind::SetAll => return,
            ChangeKind::Remove => size += change.indices.len(),
            ChangeKind::Insert => size -= change.indices.len(),
            _ => {}
        }
        change.kind = ChangeKind::Remove;
        change.indices.set(size);
    }
}

/// A consumer of per-object observation.
///
/// The delegate names the rows it cares about before each advance and is
/// handed the outcome afterwards. Both calls happen exactly once per
/// advance that has logs to replay.
pub trait ObservationDelegate {
    /// The rows to observe, positioned as of the delegate's current
    /// version.
    fn observed_rows(&self) -> Vec<ObservedRow>;

    /// Delivers the outcome of an advance: the observers that saw changes
    /// and the keys of observers whose rows were deleted.
    ///
    /// Called even when both lists are empty, so the delegate always learns
    /// that its version moved.
    fn did_change(&mut self, changed: Vec<ObserverState>, invalidated: Vec<ObserverKey>);
}

/// Advances a delegate from `after` to the source's current version.
///
/// Returns the version the delegate is now at. When nothing has been
/// committed since `after` the delegate is not called at all.
///
/// # Errors
///
/// Returns an error if the log span cannot be replayed or contains a schema
/// change rejected by the configured [`crate::SchemaMode`]. The delegate's
/// version is unchanged on error.
pub fn advance_and_observe<S, D>(
    source: &S,
    delegate: &mut D,
    after: Version,
    config: &NotifyConfig,
) -> NotifyResult<Version>
where
    S: LogSource,
    D: ObservationDelegate,
{
    let logs = source.logs_since(after);
    if logs.is_empty() {
        return Ok(after);
    }
    let new_version = logs.last().map_or(after, |log| log.version);
    debug!(from = %after, to = %new_version, logs = logs.len(), "advancing observers");

    let schema = source.schema_at(after)?;
    let mut observers: Vec<ObserverState> = delegate
        .observed_rows()
        .into_iter()
        .map(|o| ObserverState::new(o.table, o.row, o.key))
        .collect();
    let mut info = TransactionChangeInfo::new();
    let invalidated =
        replay::advance_observed(&schema, &logs, &mut info, &mut observers, config.schema_mode)?;
    let changed = observers.into_iter().filter(ObserverState::has_changes).collect();
    delegate.did_change(changed, invalidated);
    Ok(new_version)
}
