//! Version-chained collection notifiers.
//!
//! A notifier watches one collection, a whole table or a single link list,
//! and turns the logs committed since its last refresh into one
//! [`CollectionChangeSet`] relative to exactly the state its consumer saw
//! last. Each refresh replays the pending span transaction by transaction,
//! carrying the collection's position forward between steps, then walks
//! stored links once over the final state so that rows whose linked data
//! changed are reported as modified too.
//!
//! Notifiers are independent. Several of them over the same collection at
//! different base versions each compute their own changeset from the same
//! log history, and none of them shares accumulator state with another.

use tetherdb_graph::{
    ColKey, ColumnKind, GraphSnapshot, LogSource, Schema, SnapshotSource, TableKey, Version,
};
use tracing::debug;

use crate::changeset::{CollectionChangeBuilder, CollectionChangeSet};
use crate::config::NotifyConfig;
use crate::deep_change::{find_related_tables, DeepChangeChecker};
use crate::error::NotifyResult;
use crate::replay::{self, TrackLevel, TransactionChangeInfo};

/// The outcome of one notifier refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionEvent {
    /// Nothing committed since the last refresh touched the collection.
    Unchanged,

    /// The collection changed. The changeset spans every transaction
    /// committed since the previous refresh, merged in commit order.
    Changed(CollectionChangeSet),

    /// The collection itself is gone. The notifier is detached and every
    /// further refresh reports `Destroyed` without replaying anything.
    Destroyed,
}

/// True when `schema` still contains the observed table, and the observed
/// column when one is given.
fn survives(schema: &Schema, table: TableKey, col: Option<ColKey>) -> bool {
    match (schema.table(table), col) {
        (None, _) => false,
        (Some(def), Some(col)) => def.column(col).is_some(),
        (Some(_), None) => true,
    }
}

/// The target table of a link-list column, if it still exists as one.
fn list_target(schema: &Schema, table: TableKey, col: ColKey) -> Option<TableKey> {
    match schema.table(table)?.column(col)?.kind {
        ColumnKind::LinkList { target } => Some(target),
        _ => None,
    }
}

/// Delivers version-relative changesets for one link list.
///
/// The notifier remembers the version its consumer last saw. Each
/// [`refresh`](Self::refresh) replays the logs committed since then and
/// reports the net effect on the list, including modifications of the rows
/// its elements point at through any number of link hops up to the
/// configured depth. The owning row is tracked by position across the
/// replay, so the notifier keeps following its list when other rows shift
/// it around.
///
/// The coordinates passed to [`new`](Self::new) are taken on trust. If they
/// do not name a live link list, the first refresh with anything to replay
/// reports [`CollectionEvent::Destroyed`].
#[derive(Debug)]
pub struct ListNotifier {
    table: TableKey,
    row: usize,
    col: ColKey,
    version: Version,
    config: NotifyConfig,
    detached: bool,
}

impl ListNotifier {
    /// Starts observing the link list in column `col` of `row` in `table`,
    /// as of the source's current version.
    pub fn new<S: LogSource>(source: &S, table: TableKey, row: usize, col: ColKey) -> Self {
        Self::with_config(source, table, row, col, NotifyConfig::new())
    }

    /// Like [`new`](Self::new), with explicit configuration.
    pub fn with_config<S: LogSource>(
        source: &S,
        table: TableKey,
        row: usize,
        col: ColKey,
        config: NotifyConfig,
    ) -> Self {
        Self {
            table,
            row,
            col,
            version: source.current_version(),
            config,
            detached: false,
        }
    }

    /// The version the notifier has reported changes up to.
    #[must_use]
    pub fn version(&self) -> Version {
        self.version
    }

    /// The owning row's current position.
    #[must_use]
    pub fn row(&self) -> usize {
        self.row
    }

    /// True once the observed list was destroyed.
    #[must_use]
    pub fn is_detached(&self) -> bool {
        self.detached
    }

    /// Computes the net effect of everything committed since the last
    /// refresh.
    ///
    /// The pending logs are replayed one transaction at a time with the
    /// list's position carried forward between steps, and the per-step
    /// changes are merged into a single changeset. The rows the surviving
    /// elements point at are then checked against the span's change
    /// information, so an element is reported as modified when anything
    /// within [`NotifyConfig::max_link_depth`] hops of it changed. On
    /// success the notifier advances to the source's current version.
    ///
    /// # Errors
    ///
    /// Returns an error if a pending log is malformed or contains a schema
    /// change the configured [`SchemaMode`](crate::SchemaMode) rejects,
    /// unless that change is what destroyed the observed list. The notifier
    /// stays at its previous version and the next refresh retries the same
    /// span.
    pub fn refresh<S: SnapshotSource>(&mut self, source: &S) -> NotifyResult<CollectionEvent> {
        if self.detached {
            return Ok(CollectionEvent::Destroyed);
        }
        let logs = source.logs_since(self.version);
        if logs.is_empty() {
            return Ok(CollectionEvent::Unchanged);
        }
        let new_version = logs.last().map_or(self.version, |log| log.version);
        debug!(
            table = %self.table,
            col = %self.col,
            from = %self.version,
            to = %new_version,
            "refreshing list notifier"
        );

        let mut acc = CollectionChangeBuilder::new();
        let mut span = TransactionChangeInfo::new();
        let mut row = self.row;
        let mut prev = self.version;
        for log in &logs {
            let schema = source.schema_at(prev)?;
            let Some(target) = list_target(&schema, self.table, self.col) else {
                self.detached = true;
                return Ok(CollectionEvent::Destroyed);
            };
            let mut info = TransactionChangeInfo::new();
            let handle = info.track_list(self.table, row, self.col);
            for related in find_related_tables(&schema, target) {
                info.track_table(related.table, TrackLevel::Modifications);
            }
            if let Err(err) = replay::advance_observed(
                &schema,
                std::slice::from_ref(log),
                &mut info,
                &mut Vec::new(),
                self.config.schema_mode,
            ) {
                if !survives(&source.schema_at(log.version)?, self.table, Some(self.col)) {
                    self.detached = true;
                    return Ok(CollectionEvent::Destroyed);
                }
                return Err(err);
            }
            let Some(list) = info.list_ref(handle) else {
                self.detached = true;
                return Ok(CollectionEvent::Destroyed);
            };
            row = list.row;
            let changes = list.changes;
            acc.merge(std::mem::take(&mut info.list_changes[changes]));
            for (table, builder) in std::mem::take(&mut info.tables) {
                span.tables.entry(table).or_default().merge(builder);
            }
            prev = log.version;
        }

        let snapshot = source.snapshot_at(prev)?;
        let schema = snapshot.schema();
        let Some(target) = list_target(&schema, self.table, self.col) else {
            self.detached = true;
            return Ok(CollectionEvent::Destroyed);
        };
        let related = find_related_tables(&schema, target);
        let targets = snapshot.link_list(self.table, self.col, row)?;
        let mut checker = DeepChangeChecker::new(&span, &snapshot, target, &related)
            .with_max_depth(self.config.max_link_depth);
        for (ndx, &target_row) in targets.iter().enumerate() {
            if !acc.insertions.contains(ndx) && checker.check(target_row) {
                acc.modifications.add(ndx);
            }
        }

        self.version = prev;
        self.row = row;
        let change = acc.finalize();
        if change.is_empty() {
            return Ok(CollectionEvent::Unchanged);
        }
        Ok(CollectionEvent::Changed(change))
    }
}

/// Delivers version-relative changesets for all rows of one table.
///
/// Works like [`ListNotifier`] with rows in place of list elements: row
/// insertions, deletions and relocations are reported positionally, and a
/// row counts as modified when one of its own cells changed or when
/// anything reachable from it over links did.
#[derive(Debug)]
pub struct TableNotifier {
    table: TableKey,
    version: Version,
    config: NotifyConfig,
    detached: bool,
}

impl TableNotifier {
    /// Starts observing `table` as of the source's current version.
    pub fn new<S: LogSource>(source: &S, table: TableKey) -> Self {
        Self::with_config(source, table, NotifyConfig::new())
    }

    /// Like [`new`](Self::new), with explicit configuration.
    pub fn with_config<S: LogSource>(source: &S, table: TableKey, config: NotifyConfig) -> Self {
        Self {
            table,
            version: source.current_version(),
            config,
            detached: false,
        }
    }

    /// The version the notifier has reported changes up to.
    #[must_use]
    pub fn version(&self) -> Version {
        self.version
    }

    /// True once the observed table was erased.
    #[must_use]
    pub fn is_detached(&self) -> bool {
        self.detached
    }

    /// Computes the net effect of everything committed since the last
    /// refresh.
    ///
    /// # Errors
    ///
    /// Returns an error under the same conditions as
    /// [`ListNotifier::refresh`], and like it reports
    /// [`CollectionEvent::Destroyed`] instead when the rejected change is
    /// the erasure of the observed table itself.
    pub fn refresh<S: SnapshotSource>(&mut self, source: &S) -> NotifyResult<CollectionEvent> {
        if self.detached {
            return Ok(CollectionEvent::Destroyed);
        }
        let logs = source.logs_since(self.version);
        if logs.is_empty() {
            return Ok(CollectionEvent::Unchanged);
        }
        let new_version = logs.last().map_or(self.version, |log| log.version);
        debug!(
            table = %self.table,
            from = %self.version,
            to = %new_version,
            "refreshing table notifier"
        );

        let mut span = TransactionChangeInfo::new();
        let mut prev = self.version;
        for log in &logs {
            let schema = source.schema_at(prev)?;
            let mut info = TransactionChangeInfo::new();
            info.track_table(self.table, TrackLevel::Moves);
            for related in find_related_tables(&schema, self.table) {
                info.track_table(related.table, TrackLevel::Modifications);
            }
            if let Err(err) = replay::advance_observed(
                &schema,
                std::slice::from_ref(log),
                &mut info,
                &mut Vec::new(),
                self.config.schema_mode,
            ) {
                if !survives(&source.schema_at(log.version)?, self.table, None) {
                    self.detached = true;
                    return Ok(CollectionEvent::Destroyed);
                }
                return Err(err);
            }
            for (table, builder) in std::mem::take(&mut info.tables) {
                span.tables.entry(table).or_default().merge(builder);
            }
            prev = log.version;
        }

        let snapshot = source.snapshot_at(prev)?;
        let schema = snapshot.schema();
        let related = find_related_tables(&schema, self.table);
        let mut acc = span.tables.get(&self.table).cloned().unwrap_or_default();
        let rows = snapshot.table_len(self.table)?;
        let mut checker = DeepChangeChecker::new(&span, &snapshot, self.table, &related)
            .with_max_depth(self.config.max_link_depth);
        for row in 0..rows {
            if acc.insertions.contains(row) || acc.modifications.contains(row) {
                continue;
            }
            if checker.check(row) {
                acc.modifications.add(row);
            }
        }

        self.version = prev;
        let change = acc.finalize();
        if change.is_empty() {
            return Ok(CollectionEvent::Unchanged);
        }
        Ok(CollectionEvent::Changed(change))
    }
}
