use std::hash::{Hash, Hasher};

use identity_hash::IdentityHashable;

use crate::feature::{FeatureKey, MapIndex};

/// Handle of a [`QTCluster`]. Every feature seeds exactly one cluster, so the
/// key equals the arena index of the cluster's center feature.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ClusterKey(pub u32);

impl Hash for ClusterKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.0 as u64)
    }
}

impl IdentityHashable for ClusterKey {}

impl ClusterKey {
    #[inline(always)]
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for ClusterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Lifecycle of a candidate cluster. The terminal states are never left:
/// an extracted cluster has been converted into a consensus feature, an
/// invalidated one lost its center to a competitor.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ClusterState {
    #[default]
    Pending,
    Extracted,
    Invalidated,
}

/// The outcome of removing consumed features from a pending cluster
#[derive(Debug, Default)]
pub struct ClusterUpdate {
    /// False when the cluster's center itself was consumed; the cluster is
    /// then permanently invalidated and must be dropped from the index
    pub still_valid: bool,
    /// Whether any element changed, requiring the cluster to be repositioned
    /// in the priority index under its recomputed quality
    pub changed: bool,
    /// Extras promoted into elements, to be registered in the reverse index
    pub promoted: Vec<(MapIndex, FeatureKey)>,
}

/// A candidate grouping anchored on one center feature: at most one accepted
/// element per foreign map, plus a ranked pool of compatible alternates per
/// map that may be promoted if an element is consumed elsewhere.
#[derive(Debug)]
pub struct QTCluster {
    key: ClusterKey,
    center: FeatureKey,
    center_map: MapIndex,
    /// The accepted neighbor per map; the center's own slot stays empty
    elements: Vec<Option<(FeatureKey, f64)>>,
    /// Compatible but unaccepted candidates per map, ascending by distance
    extras: Vec<Vec<(FeatureKey, f64)>>,
    quality: f64,
    version: u32,
    state: ClusterState,
    open: bool,
}

impl QTCluster {
    pub fn new(key: ClusterKey, center: FeatureKey, center_map: MapIndex, num_maps: usize) -> Self {
        debug_assert!(center_map < num_maps);
        Self {
            key,
            center,
            center_map,
            elements: vec![None; num_maps],
            extras: vec![Vec::new(); num_maps],
            quality: 0.0,
            version: 0,
            state: ClusterState::Pending,
            open: false,
        }
    }

    pub fn key(&self) -> ClusterKey {
        self.key
    }

    pub fn center(&self) -> FeatureKey {
        self.center
    }

    pub fn center_map(&self) -> MapIndex {
        self.center_map
    }

    pub fn quality(&self) -> f64 {
        self.quality
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn state(&self) -> ClusterState {
        self.state
    }

    pub fn is_pending(&self) -> bool {
        self.state == ClusterState::Pending
    }

    pub fn mark_extracted(&mut self) {
        debug_assert_eq!(self.state, ClusterState::Pending);
        self.state = ClusterState::Extracted;
    }

    pub fn invalidate(&mut self) {
        debug_assert_eq!(self.state, ClusterState::Pending);
        self.state = ClusterState::Invalidated;
    }

    /// Begin a batch of [`QTCluster::add`] calls
    pub fn open(&mut self) {
        debug_assert!(!self.open, "cluster {} opened twice", self.key);
        self.open = true;
    }

    /// Close the batch, recomputing the quality exactly once
    pub fn finalize(&mut self) {
        debug_assert!(self.open, "cluster {} finalized while closed", self.key);
        self.open = false;
        self.recompute_quality();
    }

    /// Offer a compatible candidate. The closest candidate per map is kept as
    /// the element; every other candidate is retained as a ranked extra for
    /// possible later promotion, never discarded.
    pub fn add(&mut self, map_index: MapIndex, feature: FeatureKey, distance: f64) {
        debug_assert!(self.open, "add outside an open/finalize bracket");
        debug_assert_ne!(map_index, self.center_map);
        debug_assert!(distance.is_finite());
        match self.elements[map_index] {
            None => self.elements[map_index] = Some((feature, distance)),
            Some((current, current_distance)) => {
                let wins = distance < current_distance
                    || (distance == current_distance && feature < current);
                if wins {
                    self.elements[map_index] = Some((feature, distance));
                    Self::insert_extra(&mut self.extras[map_index], (current, current_distance));
                } else {
                    Self::insert_extra(&mut self.extras[map_index], (feature, distance));
                }
            }
        }
    }

    /// Keep the pool ascending by distance, breaking ties on the lower key so
    /// the ranking is reproducible
    fn insert_extra(pool: &mut Vec<(FeatureKey, f64)>, entry: (FeatureKey, f64)) {
        let at = pool
            .partition_point(|(key, d)| *d < entry.1 || (*d == entry.1 && *key < entry.0));
        pool.insert(at, entry);
    }

    /// Drop every element that has been consumed, promoting the closest
    /// surviving extra for each affected map. Consuming the center kills the
    /// cluster outright: its geometric identity is defined by its center, so
    /// there is nothing to promote.
    pub fn update(&mut self, consumed: &[bool]) -> ClusterUpdate {
        debug_assert!(!self.open);
        debug_assert_eq!(self.state, ClusterState::Pending);
        let mut outcome = ClusterUpdate {
            still_valid: true,
            changed: false,
            promoted: Vec::new(),
        };
        if consumed[self.center.index()] {
            self.state = ClusterState::Invalidated;
            outcome.still_valid = false;
            return outcome;
        }
        for map_index in 0..self.elements.len() {
            let Some((current, _)) = self.elements[map_index] else {
                continue;
            };
            if !consumed[current.index()] {
                continue;
            }
            self.elements[map_index] = None;
            outcome.changed = true;
            let pool = &mut self.extras[map_index];
            match pool.iter().position(|(k, _)| !consumed[k.index()]) {
                Some(at) => {
                    let (candidate, distance) = pool[at];
                    pool.drain(..=at);
                    self.elements[map_index] = Some((candidate, distance));
                    outcome.promoted.push((map_index, candidate));
                }
                None => pool.clear(),
            }
        }
        if outcome.changed {
            self.version += 1;
            self.recompute_quality();
        }
        outcome
    }

    /// Quality is a pure function of the current elements: the sum of their
    /// closeness `1 - d` over the number of foreign maps. More elements can
    /// only raise it, larger distances can only lower it.
    fn recompute_quality(&mut self) {
        let num_maps = self.elements.len();
        if num_maps < 2 {
            self.quality = 0.0;
            return;
        }
        let sum: f64 = self
            .elements
            .iter()
            .flatten()
            .map(|(_, d)| 1.0 - d)
            .sum();
        self.quality = sum / (num_maps - 1) as f64;
    }

    /// The accepted element of each foreign map
    pub fn elements(&self) -> impl Iterator<Item = (MapIndex, FeatureKey, f64)> + '_ {
        self.elements
            .iter()
            .enumerate()
            .filter_map(|(map_index, slot)| slot.as_ref().map(|(k, d)| (map_index, *k, *d)))
    }

    pub fn element_count(&self) -> usize {
        self.elements.iter().flatten().count()
    }

    /// The union of the accepted elements and each map's best-ranked extra
    /// that is still available. Extras are only purged lazily during
    /// promotion, so the ranking is filtered against `consumed` here.
    /// Used by diagnostic consumers, not by the extraction loop.
    pub fn all_neighbors(&self, consumed: &[bool]) -> Vec<(MapIndex, FeatureKey)> {
        let mut out = Vec::new();
        for (map_index, slot) in self.elements.iter().enumerate() {
            if let Some((key, _)) = slot {
                out.push((map_index, *key));
            }
            let best_extra = self.extras[map_index]
                .iter()
                .find(|(key, _)| !consumed[key.index()]);
            if let Some((key, _)) = best_extra {
                out.push((map_index, *key));
            }
        }
        out
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn cluster() -> QTCluster {
        // center is feature 0 in map 0, three maps total
        QTCluster::new(ClusterKey(0), FeatureKey(0), 0, 3)
    }

    #[test]
    fn test_add_keeps_closest_per_map() {
        let mut c = cluster();
        c.open();
        c.add(1, FeatureKey(5), 0.6);
        c.add(1, FeatureKey(6), 0.2);
        c.add(1, FeatureKey(7), 0.4);
        c.finalize();
        let elements: Vec<_> = c.elements().collect();
        assert_eq!(elements, vec![(1, FeatureKey(6), 0.2)]);
        // losers are retained in ascending order
        assert_eq!(
            c.all_neighbors(&[false; 10]),
            vec![(1, FeatureKey(6)), (1, FeatureKey(7))]
        );
    }

    #[test]
    fn test_all_neighbors_skips_consumed_extras() {
        let mut c = cluster();
        c.open();
        c.add(1, FeatureKey(5), 0.2);
        c.add(1, FeatureKey(6), 0.4);
        c.add(1, FeatureKey(7), 0.6);
        c.finalize();
        // the best-ranked extra was taken by another cluster but has not been
        // purged from the pool yet
        let mut consumed = vec![false; 10];
        consumed[6] = true;
        assert_eq!(
            c.all_neighbors(&consumed),
            vec![(1, FeatureKey(5)), (1, FeatureKey(7))]
        );
        consumed[7] = true;
        assert_eq!(c.all_neighbors(&consumed), vec![(1, FeatureKey(5))]);
    }

    #[test]
    fn test_quality_is_monotone() {
        let mut c = cluster();
        c.open();
        c.add(1, FeatureKey(5), 0.5);
        c.finalize();
        let one_element = c.quality();
        assert!((one_element - 0.25).abs() < 1e-12);

        // filling a previously unoccupied map cannot decrease quality
        let mut c2 = cluster();
        c2.open();
        c2.add(1, FeatureKey(5), 0.5);
        c2.add(2, FeatureKey(9), 0.9);
        c2.finalize();
        assert!(c2.quality() >= one_element);

        // a strictly closer element for the same map raises quality
        let mut c3 = cluster();
        c3.open();
        c3.add(1, FeatureKey(5), 0.1);
        c3.finalize();
        assert!(c3.quality() > one_element);
    }

    #[test]
    fn test_update_promotes_best_surviving_extra() {
        let mut c = cluster();
        c.open();
        c.add(1, FeatureKey(5), 0.2);
        c.add(1, FeatureKey(6), 0.6);
        c.add(1, FeatureKey(7), 0.4);
        c.finalize();
        let before = c.quality();
        let version = c.version();

        let mut consumed = vec![false; 10];
        consumed[5] = true;
        // the second-ranked extra is gone too, forcing a skip
        consumed[7] = true;
        let outcome = c.update(&consumed);
        assert!(outcome.still_valid);
        assert!(outcome.changed);
        assert_eq!(outcome.promoted, vec![(1, FeatureKey(6))]);
        assert_eq!(c.elements().collect::<Vec<_>>(), vec![(1, FeatureKey(6), 0.6)]);
        assert!(c.quality() < before);
        assert!(c.version() > version);
        // the consumed entry skipped on the way was purged from the pool
        assert_eq!(c.all_neighbors(&consumed), vec![(1, FeatureKey(6))]);
    }

    #[test]
    fn test_update_with_no_extras_leaves_map_empty() {
        let mut c = cluster();
        c.open();
        c.add(1, FeatureKey(5), 0.2);
        c.finalize();
        let mut consumed = vec![false; 10];
        consumed[5] = true;
        let outcome = c.update(&consumed);
        assert!(outcome.still_valid);
        assert!(outcome.changed);
        assert!(outcome.promoted.is_empty());
        assert_eq!(c.element_count(), 0);
        assert_eq!(c.quality(), 0.0);
    }

    #[test]
    fn test_stolen_center_invalidates_permanently() {
        let mut c = cluster();
        c.open();
        c.add(1, FeatureKey(5), 0.2);
        c.finalize();
        let mut consumed = vec![false; 10];
        consumed[0] = true;
        let outcome = c.update(&consumed);
        assert!(!outcome.still_valid);
        assert_eq!(c.state(), ClusterState::Invalidated);
    }

    #[test]
    fn test_update_ignores_unaffected_clusters() {
        let mut c = cluster();
        c.open();
        c.add(1, FeatureKey(5), 0.2);
        c.finalize();
        let consumed = vec![false; 10];
        let outcome = c.update(&consumed);
        assert!(outcome.still_valid);
        assert!(!outcome.changed);
    }
}
