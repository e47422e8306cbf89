//! Shared ownership of a graph across threads.

use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::graph::MemGraph;

/// A cloneable, thread-safe handle to a [`MemGraph`].
///
/// Writers take the write lock for the duration of a transaction; change
/// consumers take short read locks to pull committed logs. The lock is not
/// held across user callbacks anywhere in this crate.
#[derive(Debug, Clone, Default)]
pub struct SharedGraph {
    inner: Arc<RwLock<MemGraph>>,
}

impl SharedGraph {
    /// Wraps an existing graph.
    #[must_use]
    pub fn new(graph: MemGraph) -> Self {
        Self {
            inner: Arc::new(RwLock::new(graph)),
        }
    }

    /// Acquires the graph for reading.
    pub fn read(&self) -> RwLockReadGuard<'_, MemGraph> {
        self.inner.read()
    }

    /// Acquires the graph for writing.
    pub fn write(&self) -> RwLockWriteGuard<'_, MemGraph> {
        self.inner.write()
    }
}
