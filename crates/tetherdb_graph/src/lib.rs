//! # TetherDB Graph
//!
//! The storage-facing layer of TetherDB: the object-graph data model, the
//! transaction log that every mutation is expressed in, and the snapshot
//! traits the change-tracking crates consume.
//!
//! The interesting type for most users is [`MemGraph`], a complete in-memory
//! engine that produces well-formed transaction logs and can reconstruct any
//! committed version. Change tracking itself lives in `tetherdb_notify`,
//! which depends only on the read-side traits defined here:
//! [`GraphSnapshot`], [`LogSource`] and [`SnapshotSource`].
//!
//! ## Example
//!
//! ```
//! use tetherdb_graph::{ColumnKind, MemGraph};
//!
//! # fn main() -> tetherdb_graph::GraphResult<()> {
//! let mut graph = MemGraph::new();
//! graph.begin_transaction()?;
//! let table = graph.add_table("people")?;
//! let age = graph.add_column(table, "age", ColumnKind::Scalar)?;
//! let row = graph.add_row(table)?;
//! graph.set_int(table, age, row, 41)?;
//! let version = graph.commit()?;
//! assert_eq!(graph.get_int(table, age, row)?, 41);
//! # let _ = version;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod graph;
mod keys;
mod log;
mod schema;
mod shared;
mod snapshot;

pub use error::{GraphError, GraphResult};
pub use graph::MemGraph;
pub use keys::{ColKey, TableKey, Version};
pub use log::{CommittedLog, Instruction, Value};
pub use schema::{ColumnDef, ColumnKind, Schema, TableDef};
pub use shared::SharedGraph;
pub use snapshot::{GraphSnapshot, LogSource, SnapshotSource};
