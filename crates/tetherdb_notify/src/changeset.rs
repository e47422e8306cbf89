//! Accumulation of row-level changes for a single tracked collection.
//!
//! [`CollectionChangeBuilder`] is fed one operation at a time while a
//! transaction log is replayed, keeping its sets in post-change coordinates
//! as rows shift underneath it. Builders from consecutive transactions are
//! combined with [`merge`](CollectionChangeBuilder::merge), and
//! [`finalize`](CollectionChangeBuilder::finalize) produces the
//! [`CollectionChangeSet`] handed to observers.

use crate::index_set::IndexSet;

/// A row which moved from one position to another within a collection.
///
/// `from` is relative to the collection before any changes were applied,
/// `to` is relative to the collection after all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Move {
    /// Position before the transaction.
    pub from: usize,
    /// Position after the transaction.
    pub to: usize,
}

/// The finished description of everything that happened to a collection
/// between two versions.
///
/// `deletions` and `modifications` are positions in the old collection,
/// `insertions` and `modifications_new` positions in the new one. A row
/// listed in `moves` also appears in `deletions` and `insertions`, so a
/// consumer which does not animate moves can ignore the field entirely.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionChangeSet {
    /// Rows removed, in pre-transaction positions.
    pub deletions: IndexSet,
    /// Rows added, in post-transaction positions.
    pub insertions: IndexSet,
    /// Rows changed, in pre-transaction positions.
    pub modifications: IndexSet,
    /// Rows changed, in post-transaction positions.
    pub modifications_new: IndexSet,
    /// Rows which were relocated, with both positions.
    pub moves: Vec<Move>,
}

impl CollectionChangeSet {
    /// Returns true if nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deletions.is_empty()
            && self.insertions.is_empty()
            && self.modifications.is_empty()
            && self.modifications_new.is_empty()
            && self.moves.is_empty()
    }
}

/// Running change accumulator for one collection.
///
/// Operations arrive in log order with row numbers that are correct at the
/// time each operation was performed, and the builder rewrites its earlier
/// state so that `insertions`, `modifications` and every `Move::to` stay in
/// current coordinates while `deletions` and every `Move::from` stay in the
/// coordinates of the version the replay started from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionChangeBuilder {
    /// Rows removed, in pre-transaction positions.
    pub deletions: IndexSet,
    /// Rows added, in current positions.
    pub insertions: IndexSet,
    /// Rows changed, in current positions.
    pub modifications: IndexSet,
    /// Relocations recorded so far.
    pub moves: Vec<Move>,
}

impl CollectionChangeBuilder {
    /// Creates a builder with no recorded changes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds from already-known sets, folding move endpoints into the
    /// deletion and insertion sets.
    #[must_use]
    pub fn from_parts(
        deletions: IndexSet,
        insertions: IndexSet,
        modifications: IndexSet,
        moves: Vec<Move>,
    ) -> Self {
        let mut deletions = deletions;
        let mut insertions = insertions;
        for mv in &moves {
            deletions.add(mv.from);
            insertions.add(mv.to);
        }
        let builder = Self {
            deletions,
            insertions,
            modifications,
            moves,
        };
        builder.verify();
        builder
    }

    /// Returns true if no changes have been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deletions.is_empty()
            && self.insertions.is_empty()
            && self.modifications.is_empty()
            && self.moves.is_empty()
    }

    /// Records a modification of the row currently at `index`.
    ///
    /// Rows inserted earlier in the same replay span are reported as
    /// insertions only. The destination of a move is an existing row, so
    /// writes to it are still recorded.
    pub fn modify(&mut self, index: usize) {
        if self.insertions.contains(index) && !self.moves.iter().any(|mv| mv.to == index) {
            return;
        }
        self.modifications.add(index);
    }

    /// Records `count` rows inserted at `index`.
    ///
    /// With `track_moves` unset only the modification set is kept current;
    /// insertions themselves are not reported.
    pub fn insert(&mut self, index: usize, count: usize, track_moves: bool) {
        self.modifications.shift_for_insert_at(index, count);
        if !track_moves {
            return;
        }

        self.insertions.insert_at(index, count);
        for mv in &mut self.moves {
            if mv.to >= index {
                mv.to += count;
            }
        }
    }

    /// Records an ordered removal of the row currently at `index`, shifting
    /// the rows after it down by one.
    pub fn erase(&mut self, index: usize) {
        self.modifications.erase_at(index);
        if let Some(unshifted) = self.insertions.erase_and_unshift(index) {
            self.deletions.add_shifted(unshifted);
        }

        self.moves.retain_mut(|mv| {
            if mv.to == index {
                return false;
            }
            if mv.to > index {
                mv.to -= 1;
            }
            true
        });
    }

    /// Records the removal of every row. `prior_size` is the number of rows
    /// immediately before the clear.
    pub fn clear(&mut self, prior_size: usize) {
        let original_size = prior_size + self.deletions.len() - self.insertions.len();
        self.modifications.clear();
        self.insertions.clear();
        self.moves.clear();
        self.deletions.set(original_size);
    }

    /// Records the row at `from` moving to `to`, shifting the rows in
    /// between by one.
    pub fn move_row(&mut self, from: usize, to: usize) {
        if from == to {
            return;
        }

        let mut collapsed = false;
        for mv in &mut self.moves {
            if mv.to == from {
                // A -> B followed by B -> C collapses to A -> C.
                debug_assert!(!collapsed);
                mv.to = to;
                collapsed = true;
            } else if mv.to >= to && mv.to < from {
                mv.to += 1;
            } else if mv.to <= to && mv.to > from {
                mv.to -= 1;
            }
        }

        if !collapsed && !self.insertions.contains(from) {
            let unshifted = self.insertions.unshift(from);
            let shifted_from = self.deletions.add_shifted(unshifted);
            self.moves.push(Move {
                from: shifted_from,
                to,
            });
        }

        self.modifications.erase_at(from);
        self.insertions.erase_at(from);
        self.modifications.shift_for_insert_at(to, 1);
        self.insertions.insert_at(to, 1);
    }

    /// Records the unordered removal of the row at `row_index`, with the row
    /// at `last_row` taking over the vacated position.
    ///
    /// With `track_moves` unset only the modification set is maintained.
    pub fn move_over(&mut self, row_index: usize, last_row: usize, track_moves: bool) {
        debug_assert!(row_index <= last_row);
        if row_index == last_row {
            if track_moves {
                self.erase(row_index);
            } else {
                self.modifications.remove(row_index, 1);
            }
            return;
        }

        if !track_moves {
            self.modifications.remove(row_index, 1);
            if self.modifications.contains(last_row) {
                self.modifications.remove(last_row, 1);
                self.modifications.add(row_index);
            }
            return;
        }

        // Translate both rows to pre-transaction positions before the sets
        // start changing underneath them.
        let row_was_inserted = self.insertions.contains(row_index);
        let last_was_inserted = self.insertions.contains(last_row);
        let orig_row = if row_was_inserted {
            None
        } else {
            Some(self.deletions.shift(self.insertions.unshift(row_index)))
        };
        let orig_last = if last_was_inserted {
            None
        } else {
            Some(self.deletions.shift(self.insertions.unshift(last_row)))
        };

        let mut redirected = false;
        let mut i = 0;
        while i < self.moves.len() {
            if self.moves[i].to == row_index {
                self.moves.swap_remove(i);
            } else if self.moves[i].to == last_row {
                self.moves[i].to = row_index;
                redirected = true;
                i += 1;
            } else {
                i += 1;
            }
        }

        match orig_row {
            Some(orig) => self.deletions.add(orig),
            None => self.insertions.remove(row_index, 1),
        }
        self.modifications.remove(row_index, 1);

        if let Some(orig) = orig_last {
            if !redirected {
                self.deletions.add(orig);
                self.moves.push(Move {
                    from: orig,
                    to: row_index,
                });
            }
        } else {
            self.insertions.remove(last_row, 1);
        }

        self.insertions.add(row_index);

        if self.modifications.contains(last_row) {
            self.modifications.remove(last_row, 1);
            self.modifications.add(row_index);
        }
    }

    /// Records the values of two rows being exchanged in place. Neither row
    /// changes position, so both are plain modifications.
    pub fn swap(&mut self, index_1: usize, index_2: usize) {
        if index_1 == index_2 {
            return;
        }
        self.modify(index_1);
        self.modify(index_2);
    }

    /// Records the row at `old_index` handing its identity over to the row
    /// at `new_index`, as happens when a uniqueness conflict is resolved by
    /// discarding one of the two rows.
    ///
    /// The stale row is expected to be removed later in the same log; the
    /// marker insertion added here makes that removal cancel out instead of
    /// being reported.
    pub fn subsume(&mut self, old_index: usize, new_index: usize, track_moves: bool) {
        if self.modifications.contains(old_index) {
            self.modifications.add(new_index);
        }

        if !track_moves {
            return;
        }

        // A row created within this replay span never moved from anywhere.
        if self.insertions.contains(old_index) {
            return;
        }

        let orig = self.deletions.shift(self.insertions.unshift(old_index));
        if !self.modifications.contains(old_index) {
            self.moves.push(Move {
                from: orig,
                to: new_index,
            });
            self.insertions.add(new_index);
        }
        self.deletions.add(orig);
        self.insertions.add(old_index);
    }

    /// Folds the changes from a later transaction into this builder.
    pub fn merge(&mut self, other: CollectionChangeBuilder) {
        if other.is_empty() {
            return;
        }
        if self.is_empty() {
            *self = other;
            return;
        }

        let CollectionChangeBuilder {
            deletions: new_deletions,
            insertions: new_insertions,
            modifications: mut new_modifications,
            moves: mut new_moves,
        } = other;

        // Chase our move destinations through the new transaction: a row
        // moved again is collapsed into a single move, a deleted destination
        // drops the move, and everything else is shifted into place.
        self.moves.retain_mut(|old| {
            if let Some(i) = new_moves.iter().position(|new| new.from == old.to) {
                old.to = new_moves.swap_remove(i).to;
                return true;
            }
            if new_deletions.contains(old.to) {
                return false;
            }
            old.to = new_insertions.shift(new_deletions.unshift(old.to));
            true
        });

        // New moves of rows we inserted are not moves from the merged
        // perspective; the sources of the rest are translated back to the
        // base version's coordinates.
        new_moves.retain_mut(|mv| {
            if self.insertions.contains(mv.from) {
                return false;
            }
            mv.from = self.deletions.shift(self.insertions.unshift(mv.from));
            true
        });
        self.moves.append(&mut new_moves);

        // The new deletions are numbered after our insertions, so unshift
        // them on the way in. Rows we inserted ourselves and the other side
        // then deleted vanish entirely.
        self.deletions
            .add_shifted_by(&self.insertions, &new_deletions);
        self.insertions.erase_at_set(&new_deletions);
        self.insertions.insert_at_set(&new_insertions);

        // Modifications of rows that are insertions from the merged
        // perspective are already covered by the insertion itself.
        new_modifications.remove_set(&self.insertions);

        self.modifications.erase_at_set(&new_deletions);
        self.modifications.shift_for_insert_at_set(&new_insertions);
        self.modifications.add_set(&new_modifications);

        self.verify();
    }

    /// Drops moves whose source and destination line up once surrounding
    /// deletions and insertions are accounted for, along with the entries
    /// they contributed to those sets.
    pub fn clean_up_stale_moves(&mut self) {
        let Self {
            deletions,
            insertions,
            moves,
            ..
        } = self;
        moves.retain(|mv| {
            // Not just `from == to`: rows are also displaced by unrelated
            // deletions and insertions around them.
            if mv.from - deletions.count(0, mv.from) != mv.to - insertions.count(0, mv.to) {
                return true;
            }
            deletions.remove(mv.from, 1);
            insertions.remove(mv.to, 1);
            false
        });
    }

    /// Finishes a replay span: scrubs moves that cancelled out and orders
    /// the remainder by source row.
    pub fn parse_complete(&mut self) {
        self.clean_up_stale_moves();
        self.moves.sort_unstable_by_key(|mv| mv.from);
        self.verify();
    }

    /// Converts the accumulated changes into the form delivered to
    /// observers, deriving the pre-transaction modification positions from
    /// the tracked post-transaction ones.
    #[must_use]
    pub fn finalize(self) -> CollectionChangeSet {
        let mut modifications = self.modifications.clone();
        modifications.erase_at_set(&self.insertions);
        modifications.shift_for_insert_at_set(&self.deletions);

        CollectionChangeSet {
            deletions: self.deletions,
            insertions: self.insertions,
            modifications,
            modifications_new: self.modifications,
            moves: self.moves,
        }
    }

    /// Checks that every move's endpoints are present in the deletion and
    /// insertion sets. Debug builds only.
    pub fn verify(&self) {
        for mv in &self.moves {
            debug_assert!(
                self.deletions.contains(mv.from),
                "move source {} missing from deletions",
                mv.from
            );
            debug_assert!(
                self.insertions.contains(mv.to),
                "move destination {} missing from insertions",
                mv.to
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indexes(set: &IndexSet) -> Vec<usize> {
        set.indexes().collect()
    }

    fn mv(from: usize, to: usize) -> Move {
        Move { from, to }
    }

    fn builder(
        deletions: &[usize],
        insertions: &[usize],
        modifications: &[usize],
        moves: &[(usize, usize)],
    ) -> CollectionChangeBuilder {
        CollectionChangeBuilder::from_parts(
            deletions.iter().copied().collect(),
            insertions.iter().copied().collect(),
            modifications.iter().copied().collect(),
            moves.iter().map(|&(from, to)| mv(from, to)).collect(),
        )
    }

    // === insert ===

    #[test]
    fn insert_adds_the_row_to_the_insertions_set() {
        let mut c = CollectionChangeBuilder::new();
        c.insert(5, 1, true);
        c.insert(8, 1, true);
        assert_eq!(indexes(&c.insertions), [5, 8]);
    }

    #[test]
    fn insert_shifts_previous_insertions_and_modifications() {
        let mut c = CollectionChangeBuilder::new();
        c.insert(5, 1, true);
        c.modify(8);

        c.insert(1, 1, true);
        assert_eq!(indexes(&c.insertions), [1, 6]);
        assert_eq!(indexes(&c.modifications), [9]);
    }

    #[test]
    fn insert_does_not_shift_previous_deletions() {
        let mut c = CollectionChangeBuilder::new();
        c.erase(8);
        c.erase(3);
        c.insert(5, 1, true);

        assert_eq!(indexes(&c.insertions), [5]);
        assert_eq!(indexes(&c.deletions), [3, 8]);
    }

    #[test]
    fn insert_without_move_tracking_only_shifts_modifications() {
        let mut c = CollectionChangeBuilder::new();
        c.modify(5);
        c.insert(2, 3, false);
        assert_eq!(indexes(&c.modifications), [8]);
        assert!(c.insertions.is_empty());
    }

    // === modify ===

    #[test]
    fn modify_adds_the_row_to_the_modifications_set() {
        let mut c = CollectionChangeBuilder::new();
        c.modify(3);
        c.modify(4);
        assert_eq!(indexes(&c.modifications), [3, 4]);
    }

    #[test]
    fn modify_on_a_row_inserted_this_span_is_not_reported() {
        let mut c = CollectionChangeBuilder::new();
        c.insert(3, 1, true);
        c.modify(3);
        assert_eq!(indexes(&c.insertions), [3]);
        assert!(c.modifications.is_empty());
    }

    #[test]
    fn modify_on_the_destination_of_a_move_is_reported() {
        let mut c = CollectionChangeBuilder::new();
        c.move_row(5, 10);
        c.modify(10);
        assert_eq!(indexes(&c.modifications), [10]);
        assert_eq!(c.moves, [mv(5, 10)]);
    }

    #[test]
    fn modify_does_not_interact_with_deleted_rows() {
        let mut c = CollectionChangeBuilder::new();
        c.erase(5);
        c.erase(4);
        c.erase(3);

        c.modify(4);
        assert_eq!(indexes(&c.modifications), [4]);
    }

    // === erase ===

    #[test]
    fn erase_adds_the_row_to_the_deletions_set() {
        let mut c = CollectionChangeBuilder::new();
        c.erase(5);
        assert_eq!(indexes(&c.deletions), [5]);
    }

    #[test]
    fn erase_is_shifted_by_previous_deletions() {
        let mut c = CollectionChangeBuilder::new();
        c.erase(5);
        c.erase(6);
        assert_eq!(indexes(&c.deletions), [5, 7]);
    }

    #[test]
    fn erase_is_shifted_by_previous_insertions() {
        let mut c = CollectionChangeBuilder::new();
        c.insert(5, 1, true);
        c.erase(6);
        assert_eq!(indexes(&c.deletions), [5]);
    }

    #[test]
    fn erase_removes_previous_insertions() {
        let mut c = CollectionChangeBuilder::new();
        c.insert(5, 1, true);
        c.erase(5);
        assert!(c.insertions.is_empty());
        assert!(c.deletions.is_empty());
    }

    #[test]
    fn erase_removes_previous_modifications() {
        let mut c = CollectionChangeBuilder::new();
        c.modify(5);
        c.erase(5);
        assert!(c.modifications.is_empty());
        assert_eq!(indexes(&c.deletions), [5]);
    }

    #[test]
    fn erase_shifts_previous_modifications() {
        let mut c = CollectionChangeBuilder::new();
        c.modify(5);
        c.erase(4);
        assert_eq!(indexes(&c.modifications), [4]);
        assert_eq!(indexes(&c.deletions), [4]);
    }

    // === move_row ===

    #[test]
    fn move_adds_the_move_to_the_list_of_moves() {
        let mut c = CollectionChangeBuilder::new();
        c.move_row(5, 6);
        assert_eq!(c.moves, [mv(5, 6)]);
        c.verify();
    }

    #[test]
    fn move_to_the_same_index_is_a_no_op() {
        let mut c = CollectionChangeBuilder::new();
        c.move_row(5, 5);
        assert!(c.is_empty());
    }

    #[test]
    fn move_updates_previous_moves_of_the_same_row() {
        let mut c = CollectionChangeBuilder::new();
        c.move_row(5, 6);
        c.move_row(6, 7);
        assert_eq!(c.moves, [mv(5, 7)]);
        c.verify();
    }

    #[test]
    fn move_shifts_previous_moves_and_is_shifted_by_them() {
        let mut c = CollectionChangeBuilder::new();
        c.move_row(5, 10);
        c.move_row(6, 12);
        assert_eq!(c.moves, [mv(5, 9), mv(7, 12)]);

        c.move_row(10, 0);
        assert_eq!(c.moves, [mv(5, 10), mv(7, 12), mv(11, 0)]);
        c.verify();
    }

    #[test]
    fn moving_a_newly_inserted_row_is_not_reported_as_a_move() {
        let mut c = CollectionChangeBuilder::new();
        c.insert(5, 1, true);
        c.move_row(5, 10);
        assert_eq!(indexes(&c.insertions), [10]);
        assert!(c.moves.is_empty());
    }

    #[test]
    fn move_shifts_previous_insertions_and_modifications() {
        let mut c = CollectionChangeBuilder::new();
        c.insert(5, 1, true);
        c.modify(6);
        c.move_row(10, 0);
        assert_eq!(indexes(&c.insertions), [0, 6]);
        assert_eq!(indexes(&c.modifications), [7]);
        assert_eq!(c.moves, [mv(9, 0)]);
    }

    #[test]
    fn move_keeps_a_modification_of_the_moved_row_out_of_the_set() {
        let mut c = CollectionChangeBuilder::new();
        c.modify(5);
        c.move_row(5, 0);
        assert_eq!(indexes(&c.deletions), [5]);
        assert_eq!(indexes(&c.insertions), [0]);
        assert_eq!(c.moves, [mv(5, 0)]);
        assert!(c.modifications.is_empty());
    }

    // === move_over ===

    #[test]
    fn move_over_marks_the_old_last_row_as_moved() {
        let mut c = CollectionChangeBuilder::new();
        c.move_over(5, 8, true);
        assert_eq!(c.moves, [mv(8, 5)]);
        c.verify();
    }

    #[test]
    fn move_over_does_not_report_a_move_for_a_newly_inserted_last_row() {
        let mut c = CollectionChangeBuilder::new();
        c.insert(8, 1, true);
        c.move_over(5, 8, true);
        assert!(c.moves.is_empty());
        assert_eq!(indexes(&c.deletions), [5]);
        assert_eq!(indexes(&c.insertions), [5]);
    }

    #[test]
    fn move_over_removes_previous_modifications_of_the_removed_row() {
        let mut c = CollectionChangeBuilder::new();
        c.modify(5);
        c.move_over(5, 8, true);
        assert!(c.modifications.is_empty());
    }

    #[test]
    fn move_over_updates_previous_insertions_of_the_old_last_row() {
        let mut c = CollectionChangeBuilder::new();
        c.insert(5, 1, true);
        c.move_over(3, 5, true);
        assert_eq!(indexes(&c.insertions), [3]);
    }

    #[test]
    fn move_over_updates_previous_modifications_of_the_old_last_row() {
        let mut c = CollectionChangeBuilder::new();
        c.modify(5);
        c.move_over(3, 5, true);
        assert_eq!(indexes(&c.modifications), [3]);
    }

    #[test]
    fn move_over_removes_moves_to_the_removed_row() {
        let mut c = CollectionChangeBuilder::new();
        c.move_row(3, 5);
        c.move_over(5, 8, true);
        assert_eq!(c.moves, [mv(8, 5)]);
    }

    #[test]
    fn move_over_redirects_moves_of_the_old_last_row() {
        let mut c = CollectionChangeBuilder::new();
        c.move_row(3, 8);
        c.move_over(5, 8, true);
        assert_eq!(c.moves, [mv(3, 5)]);
    }

    #[test]
    fn move_over_is_not_shifted_by_previous_calls() {
        let mut c = CollectionChangeBuilder::new();
        c.move_over(5, 10, true);
        c.move_over(6, 9, true);
        assert_eq!(indexes(&c.deletions), [5, 6, 9, 10]);
        assert_eq!(indexes(&c.insertions), [5, 6]);
        assert_eq!(c.moves, [mv(10, 5), mv(9, 6)]);
    }

    #[test]
    fn move_over_of_the_last_row_is_a_plain_erase() {
        let mut c = CollectionChangeBuilder::new();
        c.insert(10, 1, true);
        c.move_over(10, 10, true);
        assert!(c.is_empty());
    }

    #[test]
    fn move_over_without_move_tracking_relocates_modifications() {
        let mut c = CollectionChangeBuilder::new();
        c.modify(2);
        c.modify(9);
        c.move_over(2, 9, false);
        assert_eq!(indexes(&c.modifications), [2]);
        assert!(c.deletions.is_empty());
        assert!(c.insertions.is_empty());
    }

    // === clear ===

    #[test]
    fn clear_resets_to_a_deletion_of_every_original_row() {
        let mut c = CollectionChangeBuilder::new();
        c.insert(5, 1, true);
        c.modify(7);
        c.erase(2);
        c.clear(10);
        assert_eq!(indexes(&c.deletions), (0..10).collect::<Vec<_>>());
        assert!(c.insertions.is_empty());
        assert!(c.modifications.is_empty());
        assert!(c.moves.is_empty());
    }

    // === swap ===

    #[test]
    fn swap_reports_both_rows_as_modified() {
        let mut c = CollectionChangeBuilder::new();
        c.swap(1, 5);
        assert_eq!(indexes(&c.modifications), [1, 5]);
        assert!(c.deletions.is_empty());
        assert!(c.insertions.is_empty());
        assert!(c.moves.is_empty());
    }

    #[test]
    fn swap_with_itself_is_a_no_op() {
        let mut c = CollectionChangeBuilder::new();
        c.swap(3, 3);
        assert!(c.is_empty());
    }

    #[test]
    fn swap_skips_rows_inserted_this_span() {
        let mut c = CollectionChangeBuilder::new();
        c.insert(5, 1, true);
        c.swap(5, 2);
        assert_eq!(indexes(&c.modifications), [2]);
        assert_eq!(indexes(&c.insertions), [5]);
    }

    // === subsume ===

    #[test]
    fn subsume_of_a_fresh_row_leaves_no_trace_once_it_is_removed() {
        let mut c = CollectionChangeBuilder::new();
        c.insert(10, 1, true);
        c.subsume(10, 5, true);
        c.move_over(10, 10, true);
        assert!(c.is_empty());
    }

    #[test]
    fn subsume_records_a_move_to_the_new_position() {
        let mut c = CollectionChangeBuilder::new();
        c.insert(10, 2, true);
        c.subsume(5, 10, true);
        c.move_over(5, 11, true);
        assert_eq!(indexes(&c.deletions), [5]);
        assert_eq!(indexes(&c.insertions), [5, 10]);
        assert_eq!(c.moves, [mv(5, 10)]);
    }

    #[test]
    fn subsume_after_a_modification_reports_the_new_position_as_modified() {
        let mut c = CollectionChangeBuilder::new();
        c.modify(5);
        c.insert(10, 2, true);
        c.subsume(5, 10, true);
        c.move_over(5, 11, true);
        assert_eq!(indexes(&c.modifications), [10]);
        assert!(c.moves.is_empty());
    }

    #[test]
    fn modification_after_subsume_is_tracked_at_the_new_position() {
        let mut c = CollectionChangeBuilder::new();
        c.insert(10, 2, true);
        c.subsume(5, 10, true);
        c.move_over(5, 11, true);
        c.modify(10);
        assert_eq!(indexes(&c.modifications), [10]);
    }

    // === merge ===

    #[test]
    fn merge_into_an_empty_builder_adopts_the_other_side() {
        let mut c = CollectionChangeBuilder::new();
        c.merge(builder(&[1], &[2], &[3], &[]));
        assert_eq!(c, builder(&[1], &[2], &[3], &[]));
    }

    #[test]
    fn merge_deletions_are_shifted_by_previous_deletions() {
        let mut c = builder(&[5], &[], &[], &[]);
        c.merge(builder(&[3], &[], &[], &[]));
        assert_eq!(indexes(&c.deletions), [3, 5]);

        c = builder(&[5], &[], &[], &[]);
        c.merge(builder(&[4], &[], &[], &[]));
        assert_eq!(indexes(&c.deletions), [4, 5]);

        c = builder(&[5], &[], &[], &[]);
        c.merge(builder(&[5], &[], &[], &[]));
        assert_eq!(indexes(&c.deletions), [5, 6]);

        c = builder(&[5], &[], &[], &[]);
        c.merge(builder(&[6], &[], &[], &[]));
        assert_eq!(indexes(&c.deletions), [5, 7]);
    }

    #[test]
    fn merge_deletions_are_shifted_by_previous_insertions() {
        let mut c = builder(&[], &[5], &[], &[]);
        c.merge(builder(&[4], &[], &[], &[]));
        assert_eq!(indexes(&c.deletions), [4]);

        c = builder(&[], &[5], &[], &[]);
        c.merge(builder(&[6], &[], &[], &[]));
        assert_eq!(indexes(&c.deletions), [5]);
    }

    #[test]
    fn merge_deletions_shift_previous_insertions() {
        let mut c = builder(&[], &[2, 3], &[], &[]);
        c.merge(builder(&[1], &[], &[], &[]));
        assert_eq!(indexes(&c.insertions), [1, 2]);
    }

    #[test]
    fn merge_deletions_remove_previous_insertions() {
        let mut c = builder(&[], &[1, 2], &[], &[]);
        c.merge(builder(&[2], &[], &[], &[]));
        assert_eq!(indexes(&c.insertions), [1]);
    }

    #[test]
    fn merge_deletions_remove_previous_modifications() {
        let mut c = builder(&[], &[], &[2, 3], &[]);
        c.merge(builder(&[2], &[], &[], &[]));
        assert_eq!(indexes(&c.modifications), [2]);
    }

    #[test]
    fn merge_deletions_shift_previous_modifications() {
        let mut c = builder(&[], &[], &[2, 3], &[]);
        c.merge(builder(&[1], &[], &[], &[]));
        assert_eq!(indexes(&c.modifications), [1, 2]);
    }

    #[test]
    fn merge_deletions_remove_previous_moves_to_the_deleted_row() {
        let mut c = builder(&[], &[], &[], &[(2, 3)]);
        c.merge(builder(&[3], &[], &[], &[]));
        assert!(c.moves.is_empty());
    }

    #[test]
    fn merge_deletions_shift_the_destination_of_previous_moves() {
        let mut c = builder(&[], &[], &[], &[(2, 5)]);
        c.merge(builder(&[3], &[], &[], &[]));
        assert_eq!(c.moves, [mv(2, 4)]);
    }

    #[test]
    fn merge_insertions_do_not_interact_with_previous_deletions() {
        let mut c = builder(&[1, 3], &[], &[], &[]);
        c.merge(builder(&[], &[1, 2, 3], &[], &[]));
        assert_eq!(indexes(&c.deletions), [1, 3]);
        assert_eq!(indexes(&c.insertions), [1, 2, 3]);
    }

    #[test]
    fn merge_insertions_shift_previous_insertions() {
        let mut c = builder(&[], &[1, 5], &[], &[]);
        c.merge(builder(&[], &[1, 4], &[], &[]));
        assert_eq!(indexes(&c.insertions), [1, 2, 4, 7]);
    }

    #[test]
    fn merge_insertions_shift_previous_modifications() {
        let mut c = builder(&[], &[], &[1, 5], &[]);
        c.merge(builder(&[], &[1, 4], &[], &[]));
        assert_eq!(indexes(&c.modifications), [2, 7]);
        assert_eq!(indexes(&c.insertions), [1, 4]);
    }

    #[test]
    fn merge_insertions_shift_the_destination_of_previous_moves() {
        let mut c = builder(&[], &[], &[], &[(2, 5)]);
        c.merge(builder(&[], &[3], &[], &[]));
        assert_eq!(c.moves, [mv(2, 6)]);
    }

    #[test]
    fn merge_modifications_do_not_interact_with_previous_deletions() {
        let mut c = builder(&[1, 2, 3], &[], &[], &[]);
        c.merge(builder(&[], &[], &[2], &[]));
        assert_eq!(indexes(&c.deletions), [1, 2, 3]);
        assert_eq!(indexes(&c.modifications), [2]);
    }

    #[test]
    fn merge_modifications_are_discarded_for_previous_insertions() {
        let mut c = builder(&[], &[2], &[], &[]);
        c.merge(builder(&[], &[], &[1, 2, 3], &[]));
        assert_eq!(indexes(&c.insertions), [2]);
        assert_eq!(indexes(&c.modifications), [1, 3]);
    }

    #[test]
    fn merge_modifications_are_merged_with_previous_modifications() {
        let mut c = builder(&[], &[], &[2], &[]);
        c.merge(builder(&[], &[], &[1, 2, 3], &[]));
        assert_eq!(indexes(&c.modifications), [1, 2, 3]);
    }

    #[test]
    fn merge_modifications_are_discarded_for_the_destination_of_previous_moves() {
        let mut c = builder(&[], &[], &[], &[(1, 2)]);
        c.merge(builder(&[], &[], &[2, 3], &[]));
        assert_eq!(indexes(&c.modifications), [3]);
    }

    #[test]
    fn merge_move_sources_are_shifted_by_previous_deletions_and_insertions() {
        let mut c = builder(&[1], &[], &[], &[]);
        c.merge(builder(&[], &[], &[], &[(2, 3)]));
        assert_eq!(c.moves, [mv(3, 3)]);

        c = builder(&[], &[1], &[], &[]);
        c.merge(builder(&[], &[], &[], &[(2, 3)]));
        assert_eq!(c.moves, [mv(1, 3)]);

        c = builder(&[2], &[4], &[], &[]);
        c.merge(builder(&[], &[], &[], &[(5, 10)]));
        assert_eq!(c.moves, [mv(5, 10)]);
    }

    #[test]
    fn merge_moves_remove_previous_modifications_of_the_source() {
        let mut c = builder(&[], &[], &[1], &[]);
        c.merge(builder(&[], &[], &[], &[(1, 3)]));
        assert!(c.modifications.is_empty());
        assert_eq!(c.moves, [mv(1, 3)]);
    }

    #[test]
    fn merge_moves_of_previously_inserted_rows_relocate_the_insertion() {
        let mut c = builder(&[], &[1], &[], &[]);
        c.merge(builder(&[], &[], &[], &[(1, 3)]));
        assert!(c.moves.is_empty());
        assert_eq!(indexes(&c.insertions), [3]);
    }

    #[test]
    fn merge_moves_update_previous_moves_of_the_same_row() {
        let mut c = builder(&[], &[], &[], &[(1, 3)]);
        c.merge(builder(&[], &[], &[], &[(3, 5)]));
        assert_eq!(c.moves, [mv(1, 5)]);
    }

    #[test]
    fn merge_moves_shift_the_destination_of_previous_moves_like_an_insert_delete_pair() {
        let mut c = builder(&[], &[], &[], &[(1, 3)]);
        c.merge(builder(&[], &[], &[], &[(2, 5)]));
        assert_eq!(c.moves, [mv(1, 2), mv(3, 5)]);

        c = builder(&[], &[], &[], &[(1, 10)]);
        c.merge(builder(&[], &[], &[], &[(2, 5)]));
        assert_eq!(c.moves, [mv(1, 10), mv(3, 5)]);

        c = builder(&[], &[], &[], &[(5, 10)]);
        c.merge(builder(&[], &[], &[], &[(12, 2)]));
        assert_eq!(c.moves, [mv(5, 11), mv(12, 2)]);
    }

    #[test]
    fn merge_moves_shift_previous_insertions_like_an_insert_delete_pair() {
        let mut c = builder(&[], &[5], &[], &[]);
        c.merge(builder(&[], &[], &[], &[(2, 6)]));
        assert_eq!(indexes(&c.insertions), [4, 6]);
    }

    #[test]
    fn merge_moves_shift_previous_modifications_like_an_insert_delete_pair() {
        let mut c = builder(&[], &[], &[5], &[]);
        c.merge(builder(&[], &[], &[], &[(2, 6)]));
        assert_eq!(indexes(&c.modifications), [4]);
    }

    #[test]
    fn merge_moves_are_shifted_by_previous_deletions_like_an_insert_delete_pair() {
        let mut c = builder(&[5], &[], &[], &[]);
        c.merge(builder(&[], &[], &[], &[(2, 6)]));
        assert_eq!(c.moves, [mv(2, 6)]);

        c = builder(&[5], &[], &[], &[]);
        c.merge(builder(&[], &[], &[], &[(6, 2)]));
        assert_eq!(c.moves, [mv(7, 2)]);
    }

    // === parse_complete ===

    #[test]
    fn parse_complete_scrubs_moves_which_cancel_out() {
        let mut c = CollectionChangeBuilder::new();
        c.move_row(5, 3);
        c.move_row(3, 5);
        c.parse_complete();
        assert!(c.is_empty());
    }

    #[test]
    fn parse_complete_orders_moves_by_source_row() {
        let mut c = CollectionChangeBuilder::new();
        c.move_over(2, 9, true);
        c.move_over(3, 8, true);
        c.parse_complete();
        assert_eq!(c.moves, [mv(8, 3), mv(9, 2)]);
    }

    #[test]
    fn stale_move_scrubbing_accounts_for_surrounding_changes() {
        let mut c = builder(&[], &[], &[], &[(5, 10)]);
        c.clean_up_stale_moves();
        assert_eq!(c.moves, [mv(5, 10)]);

        // A move displaced only by its own delete/insert pair is stale.
        c = builder(&[], &[], &[], &[(7, 7)]);
        c.clean_up_stale_moves();
        assert!(c.is_empty());
    }

    // === finalize ===

    #[test]
    fn finalize_reports_modifications_in_both_coordinate_systems() {
        let mut c = CollectionChangeBuilder::new();
        c.erase(0);
        c.modify(0);
        let change = c.finalize();
        assert_eq!(indexes(&change.deletions), [0]);
        assert_eq!(indexes(&change.modifications), [1]);
        assert_eq!(indexes(&change.modifications_new), [0]);
    }

    #[test]
    fn finalize_translates_modifications_back_through_insertions() {
        let mut c = CollectionChangeBuilder::new();
        c.modify(3);
        c.insert(1, 1, true);
        let change = c.finalize();
        assert_eq!(indexes(&change.modifications), [3]);
        assert_eq!(indexes(&change.modifications_new), [4]);
    }

    #[test]
    fn finalize_of_an_untouched_builder_is_empty() {
        let change = CollectionChangeBuilder::new().finalize();
        assert!(change.is_empty());
    }
}
