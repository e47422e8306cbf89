//! Graph fixtures and read helpers.
//!
//! Provides convenience functions for building populated graphs
//! and reading their state back for assertions.

use tetherdb_graph::{ColKey, ColumnKind, GraphSnapshot, MemGraph, TableKey, Version};

/// Builds a committed graph with one scalar table.
///
/// The table is named `object` and carries a `value` column holding each
/// row's own index.
pub fn scalar_table(rows: usize) -> (MemGraph, TableKey, ColKey) {
    let mut graph = MemGraph::new();
    graph.begin_transaction().expect("Failed to begin transaction");
    let table = graph.add_table("object").expect("Failed to add table");
    let value = graph
        .add_column(table, "value", ColumnKind::Scalar)
        .expect("Failed to add column");
    graph.add_rows(table, rows).expect("Failed to add rows");
    for i in 0..rows {
        graph
            .set_int(table, value, i, i as i64)
            .expect("Failed to set value");
    }
    graph.commit().expect("Failed to commit");
    (graph, table, value)
}

/// Builds a committed graph with a keyed scalar table.
///
/// Like [`scalar_table`], with an additional `pk` column holding each row's
/// index for unique-key operations. Returns `(graph, table, pk, value)`.
pub fn keyed_table(rows: usize) -> (MemGraph, TableKey, ColKey, ColKey) {
    let mut graph = MemGraph::new();
    graph.begin_transaction().expect("Failed to begin transaction");
    let table = graph.add_table("object").expect("Failed to add table");
    let pk = graph
        .add_column(table, "pk", ColumnKind::Scalar)
        .expect("Failed to add column");
    let value = graph
        .add_column(table, "value", ColumnKind::Scalar)
        .expect("Failed to add column");
    graph.add_rows(table, rows).expect("Failed to add rows");
    for i in 0..rows {
        graph
            .set_int(table, pk, i, i as i64)
            .expect("Failed to set key");
    }
    graph.commit().expect("Failed to commit");
    (graph, table, pk, value)
}

/// An origin row whose list column references every row of a target table.
pub struct ListedPair {
    /// The graph holding both tables.
    pub graph: MemGraph,
    /// The referenced table.
    pub target: TableKey,
    /// Scalar column on the target table.
    pub value: ColKey,
    /// The owning table.
    pub origin: TableKey,
    /// The list column on the owning table.
    pub list: ColKey,
}

/// Builds a [`ListedPair`] with `targets` target rows, each listed once in
/// order by origin row 0.
pub fn listed_pair(targets: usize) -> ListedPair {
    let mut graph = MemGraph::new();
    graph.begin_transaction().expect("Failed to begin transaction");
    let target = graph.add_table("target").expect("Failed to add table");
    let value = graph
        .add_column(target, "value", ColumnKind::Scalar)
        .expect("Failed to add column");
    let origin = graph.add_table("origin").expect("Failed to add table");
    let list = graph
        .add_column(origin, "array", ColumnKind::LinkList { target })
        .expect("Failed to add column");
    graph.add_rows(target, targets).expect("Failed to add rows");
    for i in 0..targets {
        graph
            .set_int(target, value, i, i as i64)
            .expect("Failed to set value");
    }
    graph.add_row(origin).expect("Failed to add row");
    for i in 0..targets {
        graph
            .list_add(origin, list, 0, i)
            .expect("Failed to add list entry");
    }
    graph.commit().expect("Failed to commit");
    ListedPair {
        graph,
        target,
        value,
        origin,
        list,
    }
}

/// Reads the value column of every row, top to bottom.
pub fn table_values(graph: &MemGraph, table: TableKey, value: ColKey) -> Vec<i64> {
    let rows = graph.table_len(table).expect("Failed to read table length");
    (0..rows)
        .map(|row| {
            graph
                .get_int(table, value, row)
                .expect("Failed to read value")
        })
        .collect()
}

/// Reads a link list's entries as target row indexes.
pub fn list_entries(graph: &MemGraph, table: TableKey, col: ColKey, row: usize) -> Vec<usize> {
    graph
        .link_list(table, col, row)
        .expect("Failed to read list")
        .to_vec()
}

/// Runs `f` inside a transaction and commits it.
pub fn commit_with<F>(graph: &mut MemGraph, f: F) -> Version
where
    F: FnOnce(&mut MemGraph),
{
    graph.begin_transaction().expect("Failed to begin transaction");
    f(graph);
    graph.commit().expect("Failed to commit")
}
