//! A set of row indices stored as sorted ranges.
//!
//! [`IndexSet`] is the currency of change tracking: deletions, insertions,
//! and modifications are each an `IndexSet`, and reconciling them across
//! transactions is a matter of shifting sets against each other. The
//! operations here come in pairs: plain mutations (`add`, `erase_at`,
//! `insert_at`) and coordinate translations (`shift`, `unshift`,
//! `add_shifted`) that convert between pre- and post-change row numbering.

use std::cmp::{max, min};

/// An ordered set of `usize` indices, stored as sorted, non-overlapping,
/// non-adjacent half-open ranges.
///
/// Adjacent indices are always coalesced into a single range, so two sets
/// holding the same indices compare equal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexSet {
    ranges: Vec<(usize, usize)>,
}

impl IndexSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the underlying ranges.
    #[must_use]
    pub fn ranges(&self) -> &[(usize, usize)] {
        &self.ranges
    }

    /// Iterates over the individual indices in ascending order.
    pub fn indexes(&self) -> impl Iterator<Item = usize> + '_ {
        self.ranges.iter().flat_map(|&(begin, end)| begin..end)
    }

    /// Returns true if `index` is in the set.
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        match self.ranges.get(self.find(index)) {
            Some(&(begin, _)) => begin <= index,
            None => false,
        }
    }

    /// Returns the number of indices in the set within `[start_index,
    /// end_index)`.
    #[must_use]
    pub fn count(&self, start_index: usize, end_index: usize) -> usize {
        let ranges = &self.ranges;
        let mut it = self.find(start_index);
        if it == ranges.len() || ranges[it].0 >= end_index {
            return 0;
        }
        if ranges[it].1 >= end_index {
            return min(ranges[it].1, end_index) - max(ranges[it].0, start_index);
        }

        let mut ret = ranges[it].1 - max(ranges[it].0, start_index);
        it += 1;
        while it != ranges.len() && ranges[it].1 < end_index {
            ret += ranges[it].1 - ranges[it].0;
            it += 1;
        }
        if it != ranges.len() && ranges[it].0 < end_index {
            ret += end_index - ranges[it].0;
        }
        ret
    }

    /// Returns the total number of indices in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ranges.iter().map(|&(begin, end)| end - begin).sum()
    }

    /// Returns true if the set holds no indices.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Adds `index` to the set, coalescing with neighboring ranges.
    pub fn add(&mut self, index: usize) {
        let pos = self.find(index);
        self.do_add(pos, index);
    }

    /// Adds every index of `other` to the set.
    pub fn add_set(&mut self, other: &IndexSet) {
        let mut hint = 0;
        for index in other.indexes() {
            let pos = self.find_from(index, hint);
            hint = self.do_add(pos, index);
        }
    }

    /// Adds `index` after shifting it past the indices already in the set,
    /// and returns the shifted index.
    ///
    /// This is the operation for recording an insertion in a sequence that
    /// has already had rows inserted: the new row's index is relative to a
    /// state in which the existing insertions are invisible.
    pub fn add_shifted(&mut self, index: usize) -> usize {
        let mut index = index;
        let mut it = 0;
        while it != self.ranges.len() && self.ranges[it].0 <= index {
            index += self.ranges[it].1 - self.ranges[it].0;
            it += 1;
        }
        self.do_add(it, index);
        index
    }

    /// Adds each index of `values` that is not in `shifted_by`, unshifted by
    /// the preceding indices of `shifted_by`, then shifted by the contents
    /// of this set.
    ///
    /// This folds one transaction's set of indices into an older
    /// transaction's coordinate space: `shifted_by` is typically the newer
    /// deletions and `values` the newer insertions or deletions.
    pub fn add_shifted_by(&mut self, shifted_by: &IndexSet, values: &IndexSet) {
        let mut it = 0;
        let mut shift = 0;
        let mut skip_until = 0;
        for index in values.indexes() {
            while it != shifted_by.ranges.len() && shifted_by.ranges[it].0 <= index {
                shift += shifted_by.ranges[it].1 - shifted_by.ranges[it].0;
                skip_until = shifted_by.ranges[it].1;
                it += 1;
            }
            if index >= skip_until {
                debug_assert!(index >= shift);
                self.add_shifted(index - shift);
                shift += 1;
            }
        }
    }

    /// Replaces the contents with the single range `[0, len)`.
    pub fn set(&mut self, len: usize) {
        self.ranges.clear();
        if len > 0 {
            self.ranges.push((0, len));
        }
    }

    /// Records `count` indices inserted at `index`: shifts existing indices
    /// at or after `index` up and adds `[index, index + count)` to the set.
    ///
    /// A range containing `index` is extended rather than split, since the
    /// inserted indices become part of it.
    ///
    /// # Panics
    ///
    /// Panics if `count` is zero.
    pub fn insert_at(&mut self, index: usize, count: usize) {
        assert!(count > 0);

        let mut pos = self.find(index);
        let mut in_existing = false;
        if pos != self.ranges.len() {
            if self.ranges[pos].0 <= index {
                in_existing = true;
            } else {
                self.ranges[pos].0 += count;
            }
            self.ranges[pos].1 += count;
            for range in &mut self.ranges[pos + 1..] {
                range.0 += count;
                range.1 += count;
            }
        }
        if !in_existing {
            for i in 0..count {
                pos = self.do_add(pos, index + i) + 1;
            }
        }
    }

    /// Applies [`insert_at`](Self::insert_at) for every range of
    /// `positions`.
    pub fn insert_at_set(&mut self, positions: &IndexSet) {
        for &(begin, end) in positions.ranges() {
            self.insert_at(begin, end - begin);
        }
    }

    /// Shifts indices at or after `index` up by `count` without adding the
    /// inserted indices, splitting any range that straddles `index`.
    ///
    /// This is how sets other than the insertion set itself react to rows
    /// being inserted.
    ///
    /// # Panics
    ///
    /// Panics if `count` is zero.
    pub fn shift_for_insert_at(&mut self, index: usize, count: usize) {
        assert!(count > 0);

        let mut it = self.find(index);
        if it == self.ranges.len() {
            return;
        }

        if self.ranges[it].0 < index {
            // split the range so that we can exclude `index`
            let old_end = self.ranges[it].1;
            self.ranges[it].1 = index;
            self.ranges.insert(it + 1, (index, old_end));
            it += 1;
        }

        for range in &mut self.ranges[it..] {
            range.0 += count;
            range.1 += count;
        }
    }

    /// Applies [`shift_for_insert_at`](Self::shift_for_insert_at) for every
    /// range of `values`.
    pub fn shift_for_insert_at_set(&mut self, values: &IndexSet) {
        for &(begin, end) in values.ranges() {
            self.shift_for_insert_at(begin, end - begin);
        }
    }

    /// Records the index `index` being erased: removes it from the set and
    /// shifts every later index down by one.
    pub fn erase_at(&mut self, index: usize) {
        let it = self.find(index);
        if it != self.ranges.len() {
            self.do_erase(it, index);
        }
    }

    /// Applies [`erase_at`](Self::erase_at) for every index of `values`,
    /// accounting for the shift produced by the earlier erases.
    pub fn erase_at_set(&mut self, values: &IndexSet) {
        let mut shift = 0;
        for index in values.indexes() {
            self.erase_at(index - shift);
            shift += 1;
        }
    }

    /// Erases `index` like [`erase_at`](Self::erase_at), and reports where
    /// the index landed in the set's unshifted coordinate space.
    ///
    /// Returns `None` if `index` was itself in the set, and otherwise the
    /// index with the preceding set indices subtracted, as
    /// [`unshift`](Self::unshift) would compute it.
    pub fn erase_and_unshift(&mut self, index: usize) -> Option<usize> {
        let mut shifted = index;
        let mut it = 0;
        while it != self.ranges.len() && self.ranges[it].1 <= index {
            shifted -= self.ranges[it].1 - self.ranges[it].0;
            it += 1;
        }
        if it == self.ranges.len() {
            return Some(shifted);
        }

        let result = if self.ranges[it].0 <= index {
            None
        } else {
            Some(shifted)
        };
        self.do_erase(it, index);
        result
    }

    /// Removes `[index, index + count)` from the set without shifting
    /// anything.
    pub fn remove(&mut self, index: usize, count: usize) {
        let pos = self.find(index);
        self.do_remove(pos, index, index + count);
    }

    /// Removes every index of `values` from the set without shifting
    /// anything.
    pub fn remove_set(&mut self, values: &IndexSet) {
        let mut it = 0;
        for &(begin, end) in values.ranges() {
            it = self.do_remove(it, begin, end);
            if it == self.ranges.len() {
                return;
            }
        }
    }

    /// Translates an index from the set's unshifted coordinate space to the
    /// raw one by skipping past the indices in the set.
    #[must_use]
    pub fn shift(&self, index: usize) -> usize {
        let mut index = index;
        for &(begin, end) in &self.ranges {
            if begin > index {
                break;
            }
            index += end - begin;
        }
        index
    }

    /// Translates a raw index not in the set to the set's unshifted
    /// coordinate space by subtracting the set indices before it.
    #[must_use]
    pub fn unshift(&self, index: usize) -> usize {
        debug_assert!(!self.contains(index));
        let mut shifted = index;
        for &(begin, end) in &self.ranges {
            if begin >= index {
                break;
            }
            shifted -= min(end, index) - begin;
        }
        shifted
    }

    /// Removes all indices.
    pub fn clear(&mut self) {
        self.ranges.clear();
    }

    /// Position of the first range whose end is past `index`.
    fn find(&self, index: usize) -> usize {
        self.find_from(index, 0)
    }

    fn find_from(&self, index: usize, from: usize) -> usize {
        from + self.ranges[from..].partition_point(|&(_, end)| end <= index)
    }

    /// Adds `index` at range position `it`, which must be `find(index)`.
    /// Returns the position of the range now containing `index`.
    fn do_add(&mut self, it: usize, index: usize) -> usize {
        self.check_invariants();
        let more_before = it != 0;
        let valid = it != self.ranges.len();
        debug_assert!(!more_before || index >= self.ranges[it - 1].1);

        if valid && self.ranges[it].0 <= index && self.ranges[it].1 > index {
            // already in the set
            return it;
        }
        if more_before && self.ranges[it - 1].1 == index {
            // immediately after an existing range
            self.ranges[it - 1].1 += 1;
            if valid && self.ranges[it - 1].1 == self.ranges[it].0 {
                // joins two existing ranges
                self.ranges[it - 1].1 = self.ranges[it].1;
                self.ranges.remove(it);
            }
            return it - 1;
        }
        if valid && self.ranges[it].0 == index + 1 {
            // immediately before an existing range
            self.ranges[it].0 -= 1;
            return it;
        }

        self.ranges.insert(it, (index, index + 1));
        it
    }

    /// Erases `index` with range position `it` at `find(index)`.
    fn do_erase(&mut self, it: usize, index: usize) {
        let mut it = it;
        if self.ranges[it].0 <= index {
            self.ranges[it].1 -= 1;
            if self.ranges[it].0 == self.ranges[it].1 {
                self.ranges.remove(it);
            } else {
                it += 1;
            }
        } else if it != 0 && self.ranges[it - 1].1 + 1 == self.ranges[it].0 {
            // the erase closes the gap between two ranges
            self.ranges[it - 1].1 = self.ranges[it].1 - 1;
            self.ranges.remove(it);
        }

        for range in &mut self.ranges[it..] {
            range.0 -= 1;
            range.1 -= 1;
        }
    }

    /// Removes `[begin, end)` starting the search at range position `it`.
    /// Returns the position to resume a later removal from.
    fn do_remove(&mut self, it: usize, begin: usize, end: usize) -> usize {
        let mut begin = begin;
        let mut it = self.find_from(begin, it);
        while it != self.ranges.len() && self.ranges[it].0 < end {
            begin = max(self.ranges[it].0, begin);

            // if the matching range extends to both sides of the range to
            // remove, split it on the range to remove
            if self.ranges[it].0 < begin && self.ranges[it].1 > end {
                let old_end = self.ranges[it].1;
                self.ranges[it].1 = begin;
                self.ranges.insert(it + 1, (end, old_end));
            }

            if begin == self.ranges[it].0 && end >= self.ranges[it].1 {
                self.ranges.remove(it);
            } else if begin == self.ranges[it].0 {
                self.ranges[it].0 = end;
            } else {
                self.ranges[it].1 = begin;
            }
            it = self.find_from(begin, it);
        }
        it
    }

    fn check_invariants(&self) {
        if cfg!(debug_assertions) {
            let mut prev_end = None;
            for &(begin, end) in &self.ranges {
                debug_assert!(begin < end);
                debug_assert!(prev_end.map_or(true, |prev| begin > prev));
                prev_end = Some(end);
            }
        }
    }
}

impl FromIterator<usize> for IndexSet {
    fn from_iter<T: IntoIterator<Item = usize>>(iter: T) -> Self {
        let mut set = Self::new();
        for index in iter {
            set.add(index);
        }
        set
    }
}

impl<const N: usize> From<[usize; N]> for IndexSet {
    fn from(values: [usize; N]) -> Self {
        values.into_iter().collect()
    }
}
