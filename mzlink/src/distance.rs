//! The feature distance model and the pair-level memoization cache.
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::mem;

use identity_hash::{BuildIdentityHasher, IdentityHashable};
use rayon::prelude::*;

use crate::config::LinkParams;
use crate::feature::{FeatureArena, FeatureKey, GridFeature};
use crate::grid::HashGrid;

/// A canonical unordered feature pair: the smaller key occupies the high half
/// so `(a, b)` and `(b, a)` collapse to the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairKey(u64);

impl PairKey {
    #[inline]
    pub fn new(a: FeatureKey, b: FeatureKey) -> Self {
        let (lo, hi) = if a.0 <= b.0 { (a, b) } else { (b, a) };
        PairKey(((lo.0 as u64) << 32) | hi.0 as u64)
    }
}

impl Hash for PairKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.0)
    }
}

impl IdentityHashable for PairKey {}

/// The stateless distance policy: decides whether two features may be linked
/// at all and, if so, how far apart they are on a normalized `[0, 1]` scale.
#[derive(Debug, Clone, Copy)]
pub struct FeatureDistance {
    params: LinkParams,
    weight_norm: f64,
}

impl FeatureDistance {
    pub fn new(params: LinkParams) -> Self {
        let weight_norm = params.rt_weight + params.mz_weight + params.intensity_weight;
        Self {
            params,
            weight_norm,
        }
    }

    /// `None` means the pair violates a hard constraint and must never be
    /// linked: same map, differing charge (when required), disagreeing
    /// peptide annotations (when required), or a separation beyond the
    /// configured windows.
    pub fn between(&self, a: &GridFeature, b: &GridFeature) -> Option<f64> {
        if a.map_index == b.map_index {
            return None;
        }
        if self.params.require_matching_charge && a.charge != b.charge {
            return None;
        }
        if self.params.require_matching_ids && !a.peptide_compatible(b) {
            return None;
        }
        let rt_diff = (a.rt - b.rt).abs();
        if rt_diff > self.params.max_rt_diff {
            return None;
        }
        // evaluate the window at the larger m/z so the check is symmetric;
        // a window of zero width (non-positive m/z under a relative
        // tolerance) can never produce a finite m/z term
        let half = self.params.mz_half_width(a.mz.max(b.mz));
        let mz_diff = (a.mz - b.mz).abs();
        if half <= 0.0 || mz_diff > half {
            return None;
        }
        let rt_term = (rt_diff / self.params.max_rt_diff).powf(self.params.rt_exponent);
        let mz_term = (mz_diff / half).powf(self.params.mz_exponent);
        let mut d = self.params.rt_weight * rt_term + self.params.mz_weight * mz_term;
        if self.params.intensity_weight > 0.0 {
            let upper = a.intensity.max(b.intensity) as f64;
            let int_term = if upper > 0.0 {
                (a.intensity - b.intensity).abs() as f64 / upper
            } else {
                0.0
            };
            d += self.params.intensity_weight * int_term;
        }
        Some(d / self.weight_norm)
    }
}

type PairMap = HashMap<PairKey, Option<f64>, BuildIdentityHasher<PairKey>>;

/// Memoized compatibility verdicts and distances for every unordered
/// neighborhood pair. Built once, in parallel, before clustering begins and
/// read-only afterwards.
///
/// Each pair is generated from its lower-keyed side only, so the distance
/// policy is invoked exactly once per unordered pair regardless of how the
/// work is sharded across threads.
#[derive(Debug, Default)]
pub struct PairDistanceCache {
    entries: PairMap,
}

impl PairDistanceCache {
    pub fn build(arena: &FeatureArena, grid: &HashGrid, metric: &FeatureDistance) -> Self {
        let entries = (0..arena.len() as u32)
            .into_par_iter()
            .map(FeatureKey)
            .fold(PairMap::default, |mut acc: PairMap, key| {
                let feature = arena.get(key);
                for other in grid.neighborhood(feature.rt, feature.mz) {
                    if other.0 <= key.0 {
                        continue;
                    }
                    let candidate = arena.get(other);
                    if candidate.map_index == feature.map_index {
                        continue;
                    }
                    acc.insert(PairKey::new(key, other), metric.between(feature, candidate));
                }
                acc
            })
            .reduce(PairMap::default, |mut a, mut b| {
                if a.len() < b.len() {
                    mem::swap(&mut a, &mut b);
                }
                a.extend(b);
                a
            });
        Self { entries }
    }

    /// The finite distance of a compatible, cached pair
    #[inline]
    pub fn get(&self, a: FeatureKey, b: FeatureKey) -> Option<f64> {
        self.entries.get(&PairKey::new(a, b)).copied().flatten()
    }

    /// The number of unordered pairs the distance policy was evaluated on
    pub fn evaluations(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::feature::FeatureRecord;
    use mzpeaks::Tolerance;

    fn two_map_arena() -> FeatureArena {
        let mut arena = FeatureArena::new();
        arena.add_map(vec![
            FeatureRecord::new(1, 100.0, 500.0, 2, 1000.0),
            FeatureRecord::new(2, 300.0, 500.0, 2, 800.0),
        ]);
        arena.add_map(vec![
            FeatureRecord::new(1, 101.0, 500.002, 2, 950.0),
            FeatureRecord::new(2, 100.5, 500.0, 3, 400.0),
        ]);
        arena
    }

    fn params() -> LinkParams {
        LinkParams::new(5.0, Tolerance::Da(0.01))
    }

    #[test]
    fn test_distance_is_symmetric_and_normalized() {
        let arena = two_map_arena();
        let metric = FeatureDistance::new(params());
        let a = arena.get(FeatureKey(0));
        let b = arena.get(FeatureKey(2));
        let d_ab = metric.between(a, b).unwrap();
        let d_ba = metric.between(b, a).unwrap();
        assert_eq!(d_ab, d_ba);
        assert!((0.0..=1.0).contains(&d_ab));
    }

    #[test]
    fn test_hard_constraints() {
        let arena = two_map_arena();
        let metric = FeatureDistance::new(params());
        // same map
        assert!(metric
            .between(arena.get(FeatureKey(0)), arena.get(FeatureKey(1)))
            .is_none());
        // differing charge
        assert!(metric
            .between(arena.get(FeatureKey(0)), arena.get(FeatureKey(3)))
            .is_none());
        // RT window exceeded
        assert!(metric
            .between(arena.get(FeatureKey(1)), arena.get(FeatureKey(2)))
            .is_none());
    }

    #[test]
    fn test_charge_ignored_when_not_required() {
        let arena = two_map_arena();
        let mut p = params();
        p.require_matching_charge = false;
        let metric = FeatureDistance::new(p);
        assert!(metric
            .between(arena.get(FeatureKey(0)), arena.get(FeatureKey(3)))
            .is_some());
    }

    #[test]
    fn test_id_constraint() {
        let mut arena = FeatureArena::new();
        arena.add_map(vec![
            FeatureRecord::new(1, 100.0, 500.0, 2, 1.0).with_peptide("PEPTIDEK")
        ]);
        arena.add_map(vec![
            FeatureRecord::new(1, 100.0, 500.0, 2, 1.0).with_peptide("ELVISK"),
            FeatureRecord::new(2, 100.0, 500.0, 2, 1.0),
        ]);
        let mut p = params();
        p.require_matching_ids = true;
        let metric = FeatureDistance::new(p);
        assert!(metric
            .between(arena.get(FeatureKey(0)), arena.get(FeatureKey(1)))
            .is_none());
        // an unannotated feature is compatible with anything
        assert!(metric
            .between(arena.get(FeatureKey(0)), arena.get(FeatureKey(2)))
            .is_some());
    }

    #[test]
    fn test_degenerate_window_is_incompatible_not_nan() {
        // a relative tolerance has zero width at m/z 0, so the pair must be
        // refused instead of dividing 0 by 0
        let mut arena = FeatureArena::new();
        arena.add_map(vec![FeatureRecord::new(1, 100.0, 0.0, 2, 1.0)]);
        arena.add_map(vec![FeatureRecord::new(1, 100.0, 0.0, 2, 1.0)]);
        let metric = FeatureDistance::new(LinkParams::new(5.0, Tolerance::PPM(10.0)));
        assert!(metric
            .between(arena.get(FeatureKey(0)), arena.get(FeatureKey(1)))
            .is_none());
    }

    #[test]
    fn test_cache_evaluates_each_pair_once() {
        let arena = two_map_arena();
        let metric = FeatureDistance::new(params());
        let grid = HashGrid::populate(&arena, 5.0, 0.01);
        let cache = PairDistanceCache::build(&arena, &grid, &metric);
        // cross-map neighborhood pairs: (0,2), (0,3); feature 1 is 200s away
        // from everything and shares a neighborhood with nothing
        assert_eq!(cache.evaluations(), 2);
        assert_eq!(cache.get(FeatureKey(0), FeatureKey(2)), cache.get(FeatureKey(2), FeatureKey(0)));
        assert!(cache.get(FeatureKey(0), FeatureKey(2)).is_some());
        // incompatible verdicts are cached too
        assert!(cache.get(FeatureKey(0), FeatureKey(3)).is_none());
    }
}
