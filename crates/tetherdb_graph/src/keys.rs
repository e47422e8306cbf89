//! Stable handle types for tables, columns, and committed versions.
//!
//! Handles are assigned by the engine when a table or column is created and
//! are never reused. They survive structural reorganization: moving a table
//! or column changes its *position*, never its key. Everything above the
//! storage layer identifies schema objects by key and resolves positions
//! lazily.

/// A stable handle for a table.
///
/// Table keys are assigned at creation time and remain valid until the table
/// is erased, regardless of how tables are reordered afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableKey(u32);

impl TableKey {
    /// Creates a table key from a raw value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn value(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for TableKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tbl:{}", self.0)
    }
}

/// A stable handle for a column.
///
/// Column keys are unique across the whole graph, not per table, so a key on
/// its own is enough to identify a column once its table is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ColKey(u32);

impl ColKey {
    /// Creates a column key from a raw value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn value(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for ColKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "col:{}", self.0)
    }
}

/// A committed transaction version.
///
/// Versions are monotonically increasing. Version 0 is the empty graph
/// before any transaction has committed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(u64);

impl Version {
    /// Creates a version from a raw value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// Returns the next version.
    #[must_use]
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_ordered_by_value() {
        assert!(TableKey::new(1) < TableKey::new(2));
        assert!(ColKey::new(10) > ColKey::new(9));
    }

    #[test]
    fn version_next_increments() {
        let v = Version::new(41);
        assert_eq!(v.next(), Version::new(42));
        assert_eq!(Version::default(), Version::new(0));
    }

    #[test]
    fn display_formats() {
        assert_eq!(TableKey::new(3).to_string(), "tbl:3");
        assert_eq!(ColKey::new(7).to_string(), "col:7");
        assert_eq!(Version::new(12).to_string(), "v:12");
    }
}
