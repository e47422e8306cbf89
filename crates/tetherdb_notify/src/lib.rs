//! # TetherDB Notify
//!
//! Change tracking for TetherDB object graphs. This crate turns the
//! transaction logs a graph commits into precise, version-relative change
//! descriptions: which rows or list elements appeared, which disappeared,
//! which moved and which hold data that changed, including changes only
//! visible by following stored links.
//!
//! The pieces layer bottom-up:
//!
//! - [`IndexSet`] stores row positions as sorted, coalesced ranges
//! - [`CollectionChangeBuilder`] folds one collection's mutations in log
//!   order into a [`CollectionChangeSet`]
//! - [`advance`] and [`advance_observed`] replay committed logs into a
//!   [`TransactionChangeInfo`] and any registered [`ObserverState`]s
//! - [`DeepChangeChecker`] decides whether a row changed through the rows
//!   it links to
//! - [`ListNotifier`] and [`TableNotifier`] tie those together behind a
//!   refresh call that reports everything committed since the caller last
//!   looked
//!
//! ## Example
//!
//! ```
//! use tetherdb_graph::{ColumnKind, MemGraph};
//! use tetherdb_notify::{CollectionEvent, ListNotifier};
//!
//! # fn main() -> tetherdb_notify::NotifyResult<()> {
//! let mut graph = MemGraph::new();
//! graph.begin_transaction()?;
//! let target = graph.add_table("items")?;
//! let origin = graph.add_table("baskets")?;
//! let list = graph.add_column(origin, "contents", ColumnKind::LinkList { target })?;
//! let owner = graph.add_row(origin)?;
//! for _ in 0..3 {
//!     let row = graph.add_row(target)?;
//!     graph.list_add(origin, list, owner, row)?;
//! }
//! graph.commit()?;
//!
//! let mut notifier = ListNotifier::new(&graph, origin, owner, list);
//! graph.begin_transaction()?;
//! graph.list_erase(origin, list, owner, 1)?;
//! graph.commit()?;
//!
//! match notifier.refresh(&graph)? {
//!     CollectionEvent::Changed(change) => {
//!         assert_eq!(change.deletions.indexes().collect::<Vec<_>>(), [1]);
//!     }
//!     event => panic!("unexpected event: {event:?}"),
//! }
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod changeset;
mod config;
mod deep_change;
mod error;
mod index_set;
mod notifier;
mod observer;
mod replay;

pub use changeset::{CollectionChangeBuilder, CollectionChangeSet, Move};
pub use config::{NotifyConfig, SchemaMode};
pub use deep_change::{find_related_tables, DeepChangeChecker, OutgoingLink, RelatedTable};
pub use error::{NotifyError, NotifyResult};
pub use index_set::IndexSet;
pub use notifier::{CollectionEvent, ListNotifier, TableNotifier};
pub use observer::{
    advance_and_observe, ChangeKind, ColumnChange, ObservationDelegate, ObservedRow, ObserverKey,
    ObserverState,
};
pub use replay::{advance, advance_observed, ListHandle, ListRef, TrackLevel, TransactionChangeInfo};
