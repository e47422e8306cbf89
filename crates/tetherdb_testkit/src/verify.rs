//! Changeset verification against committed state.
//!
//! The checks here treat a changeset as a recipe: applying its deletions,
//! insertions and modifications to the state a notifier last reported must
//! reproduce the state it advanced to. The property tests at the bottom
//! drive random operation sequences through a graph and hold every
//! reported changeset to that promise.

use std::fmt::Debug;

use tetherdb_notify::CollectionChangeSet;

/// Asserts that `change` transforms `before` into `after`.
///
/// Deletions are applied in old coordinates, insertions in new ones, and
/// every position whose value still differs afterwards must be marked
/// modified. Every move must have its source among the deletions and its
/// destination among the insertions. The destination's value is not
/// compared against the source: a write folded into a later move is
/// reported as the move alone.
///
/// # Panics
///
/// Panics when the changeset does not replay `before` into `after`.
pub fn check_changeset<T>(before: &[T], after: &[T], change: &CollectionChangeSet)
where
    T: Copy + PartialEq + Debug,
{
    let mut derived: Vec<T> = before.to_vec();
    let deletions: Vec<usize> = change.deletions.indexes().collect();
    for &index in deletions.iter().rev() {
        assert!(
            index < derived.len(),
            "deletion {index} out of bounds for {} rows",
            derived.len()
        );
        derived.remove(index);
    }
    for index in change.insertions.indexes() {
        assert!(
            index <= derived.len() && index < after.len(),
            "insertion {index} out of bounds for {} rows",
            after.len()
        );
        derived.insert(index, after[index]);
    }
    assert_eq!(
        derived.len(),
        after.len(),
        "changeset does not account for the committed row count"
    );
    for (index, (&value, &actual)) in derived.iter().zip(after).enumerate() {
        if value != actual {
            assert!(
                change.modifications_new.contains(index),
                "row {index} changed from {value:?} to {actual:?} without being marked"
            );
        }
    }
    for mv in &change.moves {
        assert!(
            change.deletions.contains(mv.from),
            "move source {} not deleted",
            mv.from
        );
        assert!(
            change.insertions.contains(mv.to),
            "move destination {} not inserted",
            mv.to
        );
    }
}
