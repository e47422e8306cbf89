//! Schema descriptors.
//!
//! A [`Schema`] is a point-in-time description of the graph's structure:
//! tables in position order, each with its columns in position order. It is
//! plain data, detached from any engine, so it can be captured before a
//! transaction and consulted while replaying the log that transaction
//! produced.

use crate::keys::{ColKey, TableKey};

/// The kind of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// A scalar value column.
    Scalar,
    /// A single link to a row of the target table, possibly null.
    Link {
        /// The table the link points into.
        target: TableKey,
    },
    /// An ordered list of links to rows of the target table.
    LinkList {
        /// The table the list points into.
        target: TableKey,
    },
}

impl ColumnKind {
    /// Returns the link target, if this is a link or link-list column.
    #[must_use]
    pub const fn target(&self) -> Option<TableKey> {
        match self {
            Self::Scalar => None,
            Self::Link { target } | Self::LinkList { target } => Some(*target),
        }
    }
}

/// A column description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    /// The column's stable key.
    pub key: ColKey,
    /// The column's name.
    pub name: String,
    /// The column's kind.
    pub kind: ColumnKind,
}

/// A table description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDef {
    /// The table's stable key.
    pub key: TableKey,
    /// The table's name.
    pub name: String,
    /// Columns in position order.
    pub columns: Vec<ColumnDef>,
}

impl TableDef {
    /// Looks up a column by key.
    #[must_use]
    pub fn column(&self, key: ColKey) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.key == key)
    }

    /// Returns the position of a column by key.
    #[must_use]
    pub fn column_position(&self, key: ColKey) -> Option<usize> {
        self.columns.iter().position(|c| c.key == key)
    }
}

/// A point-in-time schema snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    /// Tables in position order.
    pub tables: Vec<TableDef>,
}

impl Schema {
    /// Looks up a table by key.
    #[must_use]
    pub fn table(&self, key: TableKey) -> Option<&TableDef> {
        self.tables.iter().find(|t| t.key == key)
    }

    /// Returns the position of a table by key.
    #[must_use]
    pub fn table_position(&self, key: TableKey) -> Option<usize> {
        self.tables.iter().position(|t| t.key == key)
    }

    /// Looks up a table by name.
    #[must_use]
    pub fn table_named(&self, name: &str) -> Option<&TableDef> {
        self.tables.iter().find(|t| t.name == name)
    }
}
