//! A spatial hash over (RT, m/z) that reduces neighbor discovery from an
//! all-pairs scan to a constant number of cell lookups per feature.
use std::collections::HashMap;

use crate::feature::{FeatureArena, FeatureKey};

/// Buckets features into 2D cells sized to the linking tolerances. With the
/// cell sizes equal to the widest tolerated RT and m/z differences, every
/// linkable partner of a feature lies in its own cell or one of the 8
/// adjacent cells.
#[derive(Debug)]
pub struct HashGrid {
    cells: HashMap<(i64, i64), Vec<FeatureKey>>,
    rt_cell: f64,
    mz_cell: f64,
}

impl HashGrid {
    pub fn new(rt_cell: f64, mz_cell: f64) -> Self {
        debug_assert!(rt_cell > 0.0 && mz_cell > 0.0);
        Self {
            cells: HashMap::new(),
            rt_cell,
            mz_cell,
        }
    }

    /// Build a grid holding every feature of the arena
    pub fn populate(arena: &FeatureArena, rt_cell: f64, mz_cell: f64) -> Self {
        let mut grid = Self::new(rt_cell, mz_cell);
        for (key, feature) in arena.iter() {
            grid.insert(key, feature.rt, feature.mz);
        }
        grid
    }

    #[inline]
    fn cell_of(&self, rt: f64, mz: f64) -> (i64, i64) {
        (
            (rt / self.rt_cell).floor() as i64,
            (mz / self.mz_cell).floor() as i64,
        )
    }

    pub fn insert(&mut self, key: FeatureKey, rt: f64, mz: f64) {
        let cell = self.cell_of(rt, mz);
        self.cells.entry(cell).or_default().push(key);
    }

    /// Every feature in the 3×3 block of cells around the query position.
    /// The iterator is single-use but cheap to re-issue. An empty
    /// neighborhood is a valid result.
    pub fn neighborhood(&self, rt: f64, mz: f64) -> impl Iterator<Item = FeatureKey> + '_ {
        let (cx, cy) = self.cell_of(rt, mz);
        (-1i64..=1)
            .flat_map(move |dx| (-1i64..=1).map(move |dy| (cx + dx, cy + dy)))
            .filter_map(|cell| self.cells.get(&cell))
            .flat_map(|bucket| bucket.iter().copied())
    }

    /// The number of occupied cells
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::feature::FeatureRecord;

    fn arena_of(positions: &[(f64, f64)]) -> FeatureArena {
        let mut arena = FeatureArena::new();
        arena.add_map(
            positions
                .iter()
                .enumerate()
                .map(|(i, (rt, mz))| FeatureRecord::new(i as u64, *rt, *mz, 2, 1.0))
                .collect(),
        );
        arena
    }

    #[test]
    fn test_neighborhood_spans_adjacent_cells() {
        let arena = arena_of(&[(100.0, 500.0), (104.9, 500.005), (100.0, 500.02)]);
        let grid = HashGrid::populate(&arena, 5.0, 0.01);

        let near: Vec<_> = grid.neighborhood(100.0, 500.0).collect();
        // the first two share a neighborhood; the third is two m/z cells away
        assert!(near.contains(&FeatureKey(0)));
        assert!(near.contains(&FeatureKey(1)));
        assert!(!near.contains(&FeatureKey(2)));
    }

    #[test]
    fn test_neighborhood_is_symmetric() {
        let arena = arena_of(&[(99.9, 500.0), (100.1, 500.0)]);
        let grid = HashGrid::populate(&arena, 5.0, 0.01);
        // the two features straddle a cell boundary
        let a: Vec<_> = grid.neighborhood(99.9, 500.0).collect();
        let b: Vec<_> = grid.neighborhood(100.1, 500.0).collect();
        assert!(a.contains(&FeatureKey(1)));
        assert!(b.contains(&FeatureKey(0)));
    }

    #[test]
    fn test_empty_neighborhood_is_valid() {
        let arena = arena_of(&[(100.0, 500.0)]);
        let grid = HashGrid::populate(&arena, 5.0, 0.01);
        assert_eq!(grid.neighborhood(900.0, 1200.0).count(), 0);
    }

    #[test]
    fn test_negative_coordinates_floor_consistently() {
        let arena = arena_of(&[(-0.5, 500.0), (0.5, 500.0)]);
        let grid = HashGrid::populate(&arena, 5.0, 0.01);
        let near: Vec<_> = grid.neighborhood(-0.5, 500.0).collect();
        assert!(near.contains(&FeatureKey(0)));
        assert!(near.contains(&FeatureKey(1)));
    }
}
