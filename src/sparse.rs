//! Sparse row-indexed interaction matrices.
//!
//! [`SparseBooleanMatrix`] stores positive-only feedback, attribute
//! indicators and relation graphs; [`SparseMatrix`] is its general-valued
//! sibling. Rows auto-expand on first mutable access and never shrink
//! implicitly, so the row count is always one plus the highest row id ever
//! touched.

use ahash::RandomState;
use std::collections::{HashMap, HashSet};

/// One boolean row: the set of column ids that are present.
pub type RowSet = HashSet<u32, RandomState>;
/// One valued row: column id to value.
pub type RowMap = HashMap<u32, f64, RandomState>;

// Fixed hasher keys keep row iteration order identical across runs, which
// keeps seeded training runs byte-for-byte reproducible.
fn row_state() -> RandomState {
    RandomState::with_seeds(
        0x243f_6a88_85a3_08d3,
        0x1319_8a2e_0370_7344,
        0xa409_3822_299f_31d0,
        0x082e_fa98_ec4e_6c89,
    )
}

pub(crate) fn new_row_set() -> RowSet {
    RowSet::with_hasher(row_state())
}

pub(crate) fn new_row_map() -> RowMap {
    RowMap::with_hasher(row_state())
}

/// Sparse boolean matrix with fast row-wise access.
#[derive(Clone, Debug, Default)]
pub struct SparseBooleanMatrix {
    rows: Vec<RowSet>,
}

impl SparseBooleanMatrix {
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }

    /// Build from `(row, column)` pairs.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (u32, u32)>) -> Self {
        let mut matrix = Self::new();
        for (row, col) in pairs {
            matrix.set(row as usize, col);
        }
        matrix
    }

    /// Whether `(row, col)` is set. Out-of-range rows read as `false` and
    /// are not materialized.
    #[inline]
    pub fn get(&self, row: usize, col: u32) -> bool {
        self.rows.get(row).is_some_and(|r| r.contains(&col))
    }

    /// Immutable row access; `None` for rows never touched.
    #[inline]
    pub fn row(&self, row: usize) -> Option<&RowSet> {
        self.rows.get(row)
    }

    /// Iterate a row's columns; empty for rows never touched.
    pub fn iter_row(&self, row: usize) -> impl Iterator<Item = u32> + '_ {
        self.rows.get(row).into_iter().flatten().copied()
    }

    #[inline]
    pub fn row_len(&self, row: usize) -> usize {
        self.rows.get(row).map_or(0, RowSet::len)
    }

    /// Mutable row handle. Creates every row up to and including `row` if
    /// absent; callers may rely on this as an "ensure capacity" side effect.
    pub fn row_mut(&mut self, row: usize) -> &mut RowSet {
        while self.rows.len() <= row {
            self.rows.push(new_row_set());
        }
        &mut self.rows[row]
    }

    pub fn set(&mut self, row: usize, col: u32) {
        self.row_mut(row).insert(col);
    }

    /// Clears one entry. Never materializes a missing row.
    pub fn unset(&mut self, row: usize, col: u32) {
        if let Some(r) = self.rows.get_mut(row) {
            r.remove(&col);
        }
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// One plus the highest column id present, 0 for an empty matrix.
    pub fn num_columns(&self) -> usize {
        self.rows
            .iter()
            .flatten()
            .map(|&c| c as usize + 1)
            .max()
            .unwrap_or(0)
    }

    pub fn num_entries(&self) -> usize {
        self.rows.iter().map(RowSet::len).sum()
    }

    pub fn non_empty_row_ids(&self) -> Vec<usize> {
        (0..self.rows.len())
            .filter(|&r| !self.rows[r].is_empty())
            .collect()
    }

    /// Independent matrix with rows and columns interchanged. O(entries).
    pub fn transpose(&self) -> SparseBooleanMatrix {
        let mut transposed = SparseBooleanMatrix::new();
        for (row, cols) in self.rows.iter().enumerate() {
            for &col in cols {
                transposed.set(col as usize, row as u32);
            }
        }
        transposed
    }

    /// Number of coordinates set in both matrices. Purely diagnostic:
    /// evaluation warns about leaked train/test pairs but never filters.
    pub fn overlap(&self, other: &SparseBooleanMatrix) -> usize {
        self.rows
            .iter()
            .enumerate()
            .map(|(row, cols)| cols.iter().filter(|&&c| other.get(row, c)).count())
            .sum()
    }

    /// Removes column `y`; every column id greater than `y` is decremented
    /// by one.
    pub fn remove_column(&mut self, y: u32) {
        self.remove_columns(&[y]);
    }

    /// Removes several columns at once. `columns` must be sorted ascending.
    /// Each surviving column's new id is its old id minus the number of
    /// removed columns below it; every row is rebuilt in a single pass so a
    /// freshly renumbered id can never collide with a not-yet-visited one.
    pub fn remove_columns(&mut self, columns: &[u32]) {
        debug_assert!(columns.windows(2).all(|w| w[0] < w[1]));
        for row in &mut self.rows {
            let old = std::mem::replace(row, new_row_set());
            for col in old {
                match columns.binary_search(&col) {
                    Ok(_) => {}
                    Err(removed_below) => {
                        row.insert(col - removed_below as u32);
                    }
                }
            }
        }
    }
}

/// Sparse matrix of `f64` values with fast row-wise access.
#[derive(Clone, Debug, Default)]
pub struct SparseMatrix {
    rows: Vec<RowMap>,
}

impl SparseMatrix {
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }

    /// Value at `(row, col)`; 0.0 for absent entries. Out-of-range rows are
    /// not materialized by a read.
    #[inline]
    pub fn get(&self, row: usize, col: u32) -> f64 {
        self.rows
            .get(row)
            .and_then(|r| r.get(&col))
            .copied()
            .unwrap_or(0.0)
    }

    #[inline]
    pub fn contains(&self, row: usize, col: u32) -> bool {
        self.rows.get(row).is_some_and(|r| r.contains_key(&col))
    }

    pub fn row(&self, row: usize) -> Option<&RowMap> {
        self.rows.get(row)
    }

    /// Mutable row handle, creating rows up to and including `row`.
    pub fn row_mut(&mut self, row: usize) -> &mut RowMap {
        while self.rows.len() <= row {
            self.rows.push(new_row_map());
        }
        &mut self.rows[row]
    }

    pub fn set(&mut self, row: usize, col: u32, value: f64) {
        self.row_mut(row).insert(col, value);
    }

    pub fn remove(&mut self, row: usize, col: u32) {
        if let Some(r) = self.rows.get_mut(row) {
            r.remove(&col);
        }
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn num_entries(&self) -> usize {
        self.rows.iter().map(RowMap::len).sum()
    }

    pub fn transpose(&self) -> SparseMatrix {
        let mut transposed = SparseMatrix::new();
        for (row, cols) in self.rows.iter().enumerate() {
            for (&col, &value) in cols {
                transposed.set(col as usize, row as u32, value);
            }
        }
        transposed
    }

    /// Number of coordinates present in both matrices, regardless of value.
    pub fn overlap(&self, other: &SparseMatrix) -> usize {
        self.rows
            .iter()
            .enumerate()
            .map(|(row, cols)| cols.keys().filter(|&&c| other.contains(row, c)).count())
            .sum()
    }

    /// Same renumbering contract as
    /// [`SparseBooleanMatrix::remove_columns`].
    pub fn remove_columns(&mut self, columns: &[u32]) {
        debug_assert!(columns.windows(2).all(|w| w[0] < w[1]));
        for row in &mut self.rows {
            let old = std::mem::replace(row, new_row_map());
            for (col, value) in old {
                match columns.binary_search(&col) {
                    Ok(_) => {}
                    Err(removed_below) => {
                        row.insert(col - removed_below as u32, value);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(m: &SparseBooleanMatrix) -> Vec<(usize, u32)> {
        let mut out: Vec<(usize, u32)> = (0..m.num_rows())
            .flat_map(|r| m.iter_row(r).map(move |c| (r, c)))
            .collect();
        out.sort_unstable();
        out
    }

    #[test]
    fn get_reflects_net_mutations() {
        let mut m = SparseBooleanMatrix::new();
        m.set(2, 1);
        m.set(2, 3);
        m.unset(2, 1);
        m.set(0, 7);
        m.unset(5, 9); // no-op on untouched row
        assert!(!m.get(2, 1));
        assert!(m.get(2, 3));
        assert!(m.get(0, 7));
        assert!(!m.get(100, 0));
        assert_eq!(m.num_entries(), 2);
        assert_eq!(m.non_empty_row_ids(), vec![0, 2]);
        assert_eq!(m.num_columns(), 8);
    }

    #[test]
    fn reads_do_not_materialize_rows() {
        let mut m = SparseBooleanMatrix::new();
        m.set(1, 1);
        assert!(!m.get(10, 0));
        assert!(m.row(10).is_none());
        assert_eq!(m.num_rows(), 2);
        // row_mut is the one deliberate exception
        m.row_mut(4);
        assert_eq!(m.num_rows(), 5);
    }

    #[test]
    fn double_transpose_is_identity_on_entries() {
        let m = SparseBooleanMatrix::from_pairs([(0, 2), (1, 0), (3, 2), (3, 5)]);
        assert_eq!(entries(&m.transpose().transpose()), entries(&m));
    }

    #[test]
    fn overlap_is_symmetric() {
        let a = SparseBooleanMatrix::from_pairs([(0, 0), (0, 1), (2, 3), (4, 4)]);
        let b = SparseBooleanMatrix::from_pairs([(0, 1), (2, 3), (2, 4), (9, 9)]);
        assert_eq!(a.overlap(&b), 2);
        assert_eq!(b.overlap(&a), a.overlap(&b));
    }

    #[test]
    fn remove_columns_renumbers_survivors() {
        // entries at columns {1,2,3,4,5}; removing {2,4} must leave {1,2,3}
        let mut m = SparseBooleanMatrix::from_pairs([(0, 1), (0, 2), (0, 3), (0, 4), (0, 5)]);
        m.remove_columns(&[2, 4]);
        let mut cols: Vec<u32> = m.iter_row(0).collect();
        cols.sort_unstable();
        assert_eq!(cols, vec![1, 2, 3]);
    }

    #[test]
    fn batched_removal_matches_one_at_a_time() {
        let original = SparseBooleanMatrix::from_pairs([
            (0, 0),
            (0, 3),
            (0, 6),
            (1, 1),
            (1, 2),
            (1, 5),
            (2, 4),
        ]);

        let mut batched = original.clone();
        batched.remove_columns(&[1, 4, 5]);

        // one at a time, descending, so earlier removals do not shift the
        // ids of later ones
        let mut one_by_one = original.clone();
        one_by_one.remove_column(5);
        one_by_one.remove_column(4);
        one_by_one.remove_column(1);

        assert_eq!(entries(&batched), entries(&one_by_one));
    }

    #[test]
    fn valued_matrix_round_trip() {
        let mut m = SparseMatrix::new();
        m.set(0, 2, 1.5);
        m.set(3, 1, -2.0);
        m.set(0, 2, 2.5); // overwrite
        m.remove(3, 1);
        assert_eq!(m.get(0, 2), 2.5);
        assert_eq!(m.get(3, 1), 0.0);
        assert_eq!(m.num_entries(), 1);
        let t = m.transpose();
        assert_eq!(t.get(2, 0), 2.5);
    }

    #[test]
    fn valued_matrix_remove_columns() {
        let mut m = SparseMatrix::new();
        for c in 1..=5 {
            m.set(0, c, c as f64);
        }
        m.remove_columns(&[2, 4]);
        assert_eq!(m.get(0, 1), 1.0);
        assert_eq!(m.get(0, 2), 3.0);
        assert_eq!(m.get(0, 3), 5.0);
        assert_eq!(m.num_entries(), 3);
    }
}
