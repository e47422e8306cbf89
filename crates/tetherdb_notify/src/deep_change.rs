//! Transitive change detection across stored links.
//!
//! A row can be affected by a transaction without any of its own cells
//! changing: something it links to, directly or through a chain of links,
//! was modified. The [`DeepChangeChecker`] answers that question for rows of
//! one root table by walking the stored link graph of the post-transaction
//! state and consulting the change information accumulated for the span.
//!
//! The link graph is discovered once per root with [`find_related_tables`]
//! and reused across checks; the checker itself memoizes negative verdicts
//! so that shared substructure is only walked once.

use std::collections::BTreeMap;

use tetherdb_graph::{ColKey, ColumnKind, GraphSnapshot, Schema, TableKey};

use crate::index_set::IndexSet;
use crate::replay::TransactionChangeInfo;

/// A link or link-list column and the table it points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutgoingLink {
    /// The column holding the link.
    pub col: ColKey,
    /// The target table.
    pub target: TableKey,
    /// Whether the column is a link list.
    pub is_list: bool,
}

/// A table reachable from the root along with its outgoing links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelatedTable {
    /// The reachable table.
    pub table: TableKey,
    /// Its link and link-list columns.
    pub links: Vec<OutgoingLink>,
}

/// Collects every table reachable from `root` over link and link-list
/// columns, the root itself included.
///
/// The result is deduplicated and cycle-safe; each table appears once no
/// matter how many paths lead to it.
#[must_use]
pub fn find_related_tables(schema: &Schema, root: TableKey) -> Vec<RelatedTable> {
    let mut out = Vec::new();
    collect_related(schema, root, &mut out);
    out
}

fn collect_related(schema: &Schema, table: TableKey, out: &mut Vec<RelatedTable>) {
    if out.iter().any(|t| t.table == table) {
        return;
    }
    let Some(def) = schema.table(table) else {
        return;
    };
    let links: Vec<OutgoingLink> = def
        .columns
        .iter()
        .filter_map(|c| match c.kind {
            ColumnKind::Link { target } => Some(OutgoingLink {
                col: c.key,
                target,
                is_list: false,
            }),
            ColumnKind::LinkList { target } => Some(OutgoingLink {
                col: c.key,
                target,
                is_list: true,
            }),
            ColumnKind::Scalar => None,
        })
        .collect();
    let targets: Vec<TableKey> = links.iter().map(|l| l.target).collect();
    out.push(RelatedTable { table, links });
    for target in targets {
        collect_related(schema, target, out);
    }
}

/// One step of the path currently being searched.
#[derive(Debug, Clone, Copy)]
struct PathEntry {
    table: TableKey,
    row: usize,
    col: ColKey,
    /// Set when the subtree below this entry was cut short by the depth cap
    /// or a cycle; a negative verdict above a poisoned entry is not safe to
    /// memoize.
    depth_exceeded: bool,
}

/// Decides whether rows of one table were changed by a replay span, either
/// directly or through the rows they link to.
///
/// Traversal is depth-first over the stored links of the post-transaction
/// snapshot, capped at a maximum depth: with the default cap of 16 a change
/// is found when the nearest modification is at most 15 hops away. Rows
/// whose entire subtree was searched without finding a change are memoized,
/// so verdicts do not depend on the order rows are checked in.
pub struct DeepChangeChecker<'a, S> {
    info: &'a TransactionChangeInfo,
    snapshot: &'a S,
    root: TableKey,
    related: &'a [RelatedTable],
    not_modified: BTreeMap<TableKey, IndexSet>,
    path: Vec<PathEntry>,
    max_depth: usize,
    trivial_false: bool,
}

impl<'a, S: GraphSnapshot> DeepChangeChecker<'a, S> {
    /// Creates a checker for rows of `root`.
    ///
    /// `related` must be the result of [`find_related_tables`] for the same
    /// root, and `snapshot` the state the replay span ended at. When none of
    /// the related tables has a modification recorded every check is
    /// trivially false and no traversal happens.
    #[must_use]
    pub fn new(
        info: &'a TransactionChangeInfo,
        snapshot: &'a S,
        root: TableKey,
        related: &'a [RelatedTable],
    ) -> Self {
        let trivial_false = !related.iter().any(|tbl| {
            info.tables
                .get(&tbl.table)
                .is_some_and(|c| !c.modifications.is_empty())
        });
        Self {
            info,
            snapshot,
            root,
            related,
            not_modified: BTreeMap::new(),
            path: Vec::new(),
            max_depth: 16,
            trivial_false,
        }
    }

    /// Sets the traversal depth cap.
    #[must_use]
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Returns true if the row changed in this span, directly or through
    /// its links.
    pub fn check(&mut self, row: usize) -> bool {
        if self.trivial_false {
            return false;
        }
        if self.directly_changed(self.root, row) {
            return true;
        }
        self.path.clear();
        self.check_row(self.root, row, 0)
    }

    /// A row changed directly when its table's modification set says so, or
    /// when it appears in the insertion set for a reason other than a
    /// relocation. Moves reuse the insertion set for their destinations,
    /// and a row that merely moved has not changed.
    fn directly_changed(&self, table: TableKey, row: usize) -> bool {
        let Some(changes) = self.info.tables.get(&table) else {
            return false;
        };
        changes.modifications.contains(row)
            || (changes.insertions.contains(row)
                && !changes.moves.iter().any(|mv| mv.to == row))
    }

    fn check_row(&mut self, table: TableKey, row: usize, depth: usize) -> bool {
        if depth >= self.max_depth {
            // A truncated search proves nothing about the rows along the
            // way; poison the whole path so none of them are memoized.
            for entry in &mut self.path {
                entry.depth_exceeded = true;
            }
            return false;
        }
        if depth > 0 && self.directly_changed(table, row) {
            return true;
        }
        if self
            .not_modified
            .get(&table)
            .is_some_and(|set| set.contains(row))
        {
            return false;
        }

        let changed = self.check_outgoing_links(table, row, depth);
        if !changed && (depth == 0 || !self.path[depth - 1].depth_exceeded) {
            self.not_modified.entry(table).or_default().add(row);
        }
        changed
    }

    fn check_outgoing_links(&mut self, table: TableKey, row: usize, depth: usize) -> bool {
        let related = self.related;
        let Some(tbl) = related.iter().find(|t| t.table == table) else {
            return false;
        };
        let snapshot = self.snapshot;

        for link in &tbl.links {
            if self.already_checking(table, row, link.col, depth) {
                continue;
            }
            if link.is_list {
                let entries = snapshot.link_list(table, link.col, row).unwrap_or(&[]);
                for &target in entries {
                    if self.check_row(link.target, target, depth + 1) {
                        return true;
                    }
                }
            } else {
                let target = snapshot.link(table, link.col, row).unwrap_or(None);
                if let Some(target) = target {
                    if self.check_row(link.target, target, depth + 1) {
                        return true;
                    }
                }
            }
        }
        false
    }

    /// Detects link cycles: a (table, row, column) triple already on the
    /// current path means this branch has looped. Everything from the first
    /// visit down is poisoned, since the loop cut the search short there.
    /// Otherwise the triple is recorded as the path's entry at `depth`.
    fn already_checking(&mut self, table: TableKey, row: usize, col: ColKey, depth: usize) -> bool {
        if let Some(pos) = self.path[..depth]
            .iter()
            .position(|p| p.table == table && p.row == row && p.col == col)
        {
            for entry in &mut self.path[pos..depth] {
                entry.depth_exceeded = true;
            }
            return true;
        }
        self.path.truncate(depth);
        self.path.push(PathEntry {
            table,
            row,
            col,
            depth_exceeded: false,
        });
        false
    }
}
