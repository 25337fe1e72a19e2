//! The output of a linking run.
use itertools::Itertools;

use crate::feature::{GridFeature, MapDescription, MapIndex};

/// A reference to one contributing feature of a consensus feature
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FeatureHandle {
    pub map_index: MapIndex,
    pub feature_id: u64,
    pub rt: f64,
    pub mz: f64,
    pub intensity: f32,
}

impl FeatureHandle {
    pub fn new(feature: &GridFeature) -> Self {
        Self {
            map_index: feature.map_index,
            feature_id: feature.feature_id,
            rt: feature.rt,
            mz: feature.mz,
            intensity: feature.intensity,
        }
    }
}

/// A group of features, at most one per map, believed to represent the same
/// analyte across runs.
///
/// The representative position is the arithmetic centroid of the contributing
/// features, the intensity is their sum, and the charge follows the cluster
/// center.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConsensusFeature {
    pub rt: f64,
    pub mz: f64,
    pub intensity: f32,
    pub charge: i32,
    /// The quality of the cluster this feature was extracted from
    pub quality: f64,
    /// Contributing features, ascending by map index
    pub handles: Vec<FeatureHandle>,
}

impl ConsensusFeature {
    pub(crate) fn from_group(charge: i32, quality: f64, members: &[&GridFeature]) -> Self {
        debug_assert!(!members.is_empty());
        let n = members.len() as f64;
        let rt = members.iter().map(|f| f.rt).sum::<f64>() / n;
        let mz = members.iter().map(|f| f.mz).sum::<f64>() / n;
        let intensity = members.iter().map(|f| f.intensity).sum();
        let handles = members
            .iter()
            .map(|f| FeatureHandle::new(f))
            .sorted_by_key(|h| h.map_index)
            .collect();
        Self {
            rt,
            mz,
            intensity,
            charge,
            quality,
            handles,
        }
    }

    /// The number of contributing features
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FeatureHandle> {
        self.handles.iter()
    }

    /// Whether a map contributed to this group
    pub fn contains_map(&self, map_index: MapIndex) -> bool {
        self.handles.iter().any(|h| h.map_index == map_index)
    }
}

/// The ordered sequence of consensus features emitted by a run, in extraction
/// order (best cluster first), plus the input map metadata passed through
/// unmodified.
#[derive(Debug, Default, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConsensusMap {
    pub features: Vec<ConsensusFeature>,
    pub descriptions: Vec<MapDescription>,
}

impl ConsensusMap {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ConsensusFeature> {
        self.features.iter()
    }

    /// The total number of input features across all groups
    pub fn total_feature_count(&self) -> usize {
        self.features.iter().map(|f| f.len()).sum()
    }
}

impl<'a> IntoIterator for &'a ConsensusMap {
    type Item = &'a ConsensusFeature;
    type IntoIter = std::slice::Iter<'a, ConsensusFeature>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.iter()
    }
}

impl IntoIterator for ConsensusMap {
    type Item = ConsensusFeature;
    type IntoIter = std::vec::IntoIter<ConsensusFeature>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.into_iter()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::feature::{FeatureRecord, GridFeature};

    #[test]
    fn test_consensus_derivation() {
        let a = GridFeature::from_record(0, FeatureRecord::new(1, 100.0, 500.0, 2, 1000.0));
        let b = GridFeature::from_record(1, FeatureRecord::new(9, 102.0, 500.01, 2, 600.0));
        let consensus = ConsensusFeature::from_group(2, 0.8, &[&b, &a]);
        assert_eq!(consensus.rt, 101.0);
        assert!((consensus.mz - 500.005).abs() < 1e-9);
        assert_eq!(consensus.intensity, 1600.0);
        assert_eq!(consensus.charge, 2);
        // handles come back sorted by map index regardless of input order
        assert_eq!(consensus.handles[0].map_index, 0);
        assert_eq!(consensus.handles[1].map_index, 1);
        assert!(consensus.contains_map(1));
        assert!(!consensus.contains_map(2));
    }
}
