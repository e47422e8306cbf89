//! Change-tracking configuration.

/// How strictly schema changes in incoming transaction logs are policed on
/// the observed replay path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SchemaMode {
    /// The schema is fixed once observation starts. Adding columns to
    /// pre-existing tables, moving tables or columns, and erasing either is
    /// an error. Tables created within the same transaction may still grow
    /// columns freely.
    Strict,

    /// The schema may grow and reorganize. Adding tables and columns and
    /// moving them is accepted; erasing a pre-existing table or column is
    /// still an error.
    #[default]
    Additive,
}

/// Configuration for a change-tracking session.
#[derive(Debug, Clone)]
pub struct NotifyConfig {
    /// How schema changes in replayed logs are validated.
    pub schema_mode: SchemaMode,

    /// How many links deep a change may be and still mark a row as changed.
    ///
    /// A row counts as changed when the nearest modification is strictly
    /// fewer than this many hops away along link and list columns.
    pub max_link_depth: usize,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            schema_mode: SchemaMode::default(),
            max_link_depth: 16,
        }
    }
}

impl NotifyConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the schema validation mode.
    #[must_use]
    pub const fn schema_mode(mut self, mode: SchemaMode) -> Self {
        self.schema_mode = mode;
        self
    }

    /// Sets the link-traversal depth cap.
    #[must_use]
    pub const fn max_link_depth(mut self, depth: usize) -> Self {
        self.max_link_depth = depth;
        self
    }
}
