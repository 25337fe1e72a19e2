use std::collections::{HashMap, HashSet};

use identity_hash::BuildIdentityHasher;

use crate::feature::FeatureKey;

use super::cluster::ClusterKey;

type ReferentSet = HashSet<ClusterKey, BuildIdentityHasher<ClusterKey>>;

/// The reverse index from a feature to every pending cluster currently
/// holding it as an element. This is what makes "consume a feature, then fix
/// up every affected cluster" tractable without a scan of all clusters.
///
/// Centers are not tracked here: every feature is the center of exactly one
/// cluster (the one sharing its key), so stealing a center is resolved
/// through that identity instead.
#[derive(Debug, Default)]
pub struct ElementGraph {
    nodes: HashMap<FeatureKey, ReferentSet, BuildIdentityHasher<FeatureKey>>,
}

impl ElementGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, feature: FeatureKey, cluster: ClusterKey) {
        self.nodes.entry(feature).or_default().insert(cluster);
    }

    pub fn remove(&mut self, feature: FeatureKey, cluster: ClusterKey) {
        if let Some(node) = self.nodes.get_mut(&feature) {
            node.remove(&cluster);
            if node.is_empty() {
                self.nodes.remove(&feature);
            }
        }
    }

    /// The clusters referencing `feature`, in key order so that callers
    /// process them deterministically
    pub fn referents(&self, feature: FeatureKey) -> Vec<ClusterKey> {
        let mut keys: Vec<_> = self
            .nodes
            .get(&feature)
            .map(|node| node.iter().copied().collect())
            .unwrap_or_default();
        keys.sort_unstable();
        keys
    }

    /// Unhook a dead cluster from every element it referenced
    pub fn drop_cluster_dependence<I: Iterator<Item = FeatureKey>>(
        &mut self,
        features: I,
        cluster: ClusterKey,
    ) {
        for feature in features {
            match self.nodes.get_mut(&feature) {
                Some(node) => {
                    node.remove(&cluster);
                    if node.is_empty() {
                        self.nodes.remove(&feature);
                    }
                }
                None => {
                    tracing::warn!("Failed to remove {cluster} for {feature}");
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_referents_are_sorted() {
        let mut graph = ElementGraph::new();
        graph.add(FeatureKey(3), ClusterKey(9));
        graph.add(FeatureKey(3), ClusterKey(2));
        graph.add(FeatureKey(3), ClusterKey(5));
        assert_eq!(
            graph.referents(FeatureKey(3)),
            vec![ClusterKey(2), ClusterKey(5), ClusterKey(9)]
        );
    }

    #[test]
    fn test_remove_clears_empty_nodes() {
        let mut graph = ElementGraph::new();
        graph.add(FeatureKey(1), ClusterKey(4));
        graph.remove(FeatureKey(1), ClusterKey(4));
        assert!(graph.is_empty());
        assert!(graph.referents(FeatureKey(1)).is_empty());
    }

    #[test]
    fn test_drop_cluster_dependence() {
        let mut graph = ElementGraph::new();
        graph.add(FeatureKey(1), ClusterKey(4));
        graph.add(FeatureKey(2), ClusterKey(4));
        graph.add(FeatureKey(2), ClusterKey(6));
        graph.drop_cluster_dependence([FeatureKey(1), FeatureKey(2)].into_iter(), ClusterKey(4));
        assert!(graph.referents(FeatureKey(1)).is_empty());
        assert_eq!(graph.referents(FeatureKey(2)), vec![ClusterKey(6)]);
    }
}
