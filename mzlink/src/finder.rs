//! Orchestrates a full grouping run: spatial indexing, parallel distance
//! evaluation, candidate cluster construction, and the greedy extraction
//! loop that turns clusters into consensus features.
use tracing::{debug, trace};

use crate::cluster_graph::{ClusterKey, ClusterPriorityIndex, ElementGraph, QTCluster};
use crate::config::{LinkError, LinkParams};
use crate::consensus::{ConsensusFeature, ConsensusMap};
use crate::distance::{FeatureDistance, PairDistanceCache};
use crate::feature::{FeatureArena, FeatureRecord, MapDescription, MapIndex};
use crate::grid::HashGrid;

/// Groups corresponding features across any number of independently acquired
/// maps using a single-pass, greedy variant of QT clustering.
///
/// Ingest maps with [`QTClusterFinder::add_map`], then call
/// [`QTClusterFinder::run`]. Every input feature ends up in exactly one
/// emitted consensus feature; an unmatched feature yields a singleton, which
/// is an expected outcome, not an error.
#[derive(Debug)]
pub struct QTClusterFinder {
    params: LinkParams,
    arena: FeatureArena,
    descriptions: Vec<MapDescription>,
}

impl QTClusterFinder {
    pub fn new(params: LinkParams) -> Result<Self, LinkError> {
        params.validate()?;
        Ok(Self {
            params,
            arena: FeatureArena::new(),
            descriptions: Vec::new(),
        })
    }

    pub fn params(&self) -> &LinkParams {
        &self.params
    }

    pub fn num_maps(&self) -> usize {
        self.arena.num_maps()
    }

    pub fn num_features(&self) -> usize {
        self.arena.len()
    }

    /// Ingest one map's features. Records are validated eagerly so that a
    /// malformed one aborts the job before any clustering starts.
    pub fn add_map<S: Into<String>>(
        &mut self,
        name: S,
        records: Vec<FeatureRecord>,
    ) -> Result<MapIndex, LinkError> {
        let map_index = self.arena.num_maps();
        for record in records.iter() {
            if !(record.rt.is_finite() && record.mz.is_finite()) {
                return Err(LinkError::NonFiniteCoordinate {
                    map_index,
                    feature_id: record.feature_id,
                });
            }
            // a relative tolerance window degenerates to zero width at
            // m/z <= 0, which would make the m/z term of the distance NaN
            if record.mz <= 0.0 {
                return Err(LinkError::NonPositiveMz {
                    map_index,
                    feature_id: record.feature_id,
                });
            }
            if !record.intensity.is_finite() || record.intensity < 0.0 {
                return Err(LinkError::InvalidIntensity {
                    map_index,
                    feature_id: record.feature_id,
                });
            }
        }
        let size = records.len();
        self.arena.add_map(records);
        self.descriptions.push(MapDescription {
            name: name.into(),
            size,
        });
        Ok(map_index)
    }

    /// Run the clustering and emit the consensus map. The finder is not
    /// consumed; running again over the same inputs produces identical
    /// output.
    pub fn run(&self) -> Result<ConsensusMap, LinkError> {
        if self.arena.num_maps() == 0 {
            return Err(LinkError::NoMaps);
        }
        let n = self.arena.len();
        let num_maps = self.arena.num_maps();

        // The m/z cell size is taken at the highest observed m/z, where a
        // relative tolerance window is widest, so a true neighbor can never
        // fall outside the 3x3 block. The exact window is still enforced by
        // the distance policy.
        let mz_max = self
            .arena
            .iter()
            .map(|(_, f)| f.mz)
            .fold(0.0f64, f64::max);
        let mz_cell = self.params.mz_half_width(mz_max.max(1.0));
        let grid = HashGrid::populate(&self.arena, self.params.max_rt_diff, mz_cell);

        let metric = FeatureDistance::new(self.params);
        let cache = PairDistanceCache::build(&self.arena, &grid, &metric);
        debug!(
            "Indexed {n} features from {num_maps} maps into {} cells, {} candidate pairs evaluated",
            grid.len(),
            cache.evaluations()
        );

        let (mut clusters, mut index, mut element_graph) = self.build_clusters(&grid, &cache);

        // Greedy extraction: repeatedly take the best pending cluster,
        // consume its features, and repair every cluster that referenced one
        // of them. This phase is inherently sequential.
        let mut consumed = vec![false; n];
        let mut features = Vec::new();
        while let Some(entry) = index.pop_valid(|e| {
            let cluster = &clusters[e.key.index()];
            cluster.is_pending() && cluster.version() == e.version
        }) {
            let best_key = entry.key;
            let best = &clusters[best_key.index()];
            let mut consumed_now = Vec::with_capacity(best.element_count() + 1);
            consumed_now.push(best.center());
            consumed_now.extend(best.elements().map(|(_, key, _)| key));

            let members: Vec<_> = consumed_now.iter().map(|key| self.arena.get(*key)).collect();
            let charge = members[0].charge;
            features.push(ConsensusFeature::from_group(charge, best.quality(), &members));
            trace!(
                "Extracted cluster {best_key} with quality {:.4} and {} members",
                best.quality(),
                consumed_now.len()
            );

            clusters[best_key.index()].mark_extracted();
            for key in consumed_now.iter() {
                consumed[key.index()] = true;
            }
            element_graph
                .drop_cluster_dependence(consumed_now.iter().skip(1).copied(), best_key);

            // A cluster whose center was just consumed is dead regardless of
            // whether anything referenced it as an element.
            for key in consumed_now.iter() {
                let center_cluster = ClusterKey(key.0);
                if center_cluster == best_key || !clusters[center_cluster.index()].is_pending() {
                    continue;
                }
                let elements: Vec<_> = clusters[center_cluster.index()]
                    .elements()
                    .map(|(_, k, _)| k)
                    .collect();
                clusters[center_cluster.index()].invalidate();
                element_graph.drop_cluster_dependence(elements.into_iter(), center_cluster);
            }

            // Repair the survivors that referenced a consumed element.
            for key in consumed_now.iter() {
                for referent in element_graph.referents(*key) {
                    element_graph.remove(*key, referent);
                    let cluster = &mut clusters[referent.index()];
                    if !cluster.is_pending() {
                        continue;
                    }
                    let outcome = cluster.update(&consumed);
                    if !outcome.still_valid {
                        let elements: Vec<_> =
                            clusters[referent.index()].elements().map(|(_, k, _)| k).collect();
                        element_graph.drop_cluster_dependence(elements.into_iter(), referent);
                        continue;
                    }
                    for (_, promoted) in outcome.promoted.iter() {
                        element_graph.add(*promoted, referent);
                    }
                    if outcome.changed {
                        let cluster = &clusters[referent.index()];
                        index.push(referent, cluster.version(), cluster.quality());
                    }
                }
            }
        }

        // Every feature must have been extracted or consumed exactly once; a
        // violation here is a programming error, not a data problem.
        debug_assert!(consumed.iter().all(|c| *c));
        debug!(
            "Emitted {} consensus features covering {n} input features",
            features.len()
        );
        Ok(ConsensusMap {
            features,
            descriptions: self.descriptions.clone(),
        })
    }

    /// Build one candidate cluster per feature, retaining the closest
    /// compatible candidate per foreign map as an element and the rest as
    /// ranked extras.
    fn build_clusters(
        &self,
        grid: &HashGrid,
        cache: &PairDistanceCache,
    ) -> (Vec<QTCluster>, ClusterPriorityIndex, ElementGraph) {
        let n = self.arena.len();
        let num_maps = self.arena.num_maps();
        let mut clusters = Vec::with_capacity(n);
        let mut index = ClusterPriorityIndex::with_capacity(n);
        let mut element_graph = ElementGraph::new();
        for (key, feature) in self.arena.iter() {
            let cluster_key = ClusterKey(key.0);
            let mut cluster = QTCluster::new(cluster_key, key, feature.map_index, num_maps);
            cluster.open();
            for candidate in grid.neighborhood(feature.rt, feature.mz) {
                if candidate == key {
                    continue;
                }
                if let Some(distance) = cache.get(key, candidate) {
                    cluster.add(self.arena.get(candidate).map_index, candidate, distance);
                }
            }
            cluster.finalize();
            for (_, element, _) in cluster.elements() {
                element_graph.add(element, cluster_key);
            }
            index.push(cluster_key, cluster.version(), cluster.quality());
            clusters.push(cluster);
        }
        debug!("Constructed {} candidate clusters", clusters.len());
        (clusters, index, element_graph)
    }
}
