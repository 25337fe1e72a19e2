//! The immutable feature pool shared by a whole grouping run.
use std::hash::{Hash, Hasher};

use identity_hash::IdentityHashable;

/// Index of an input map within a run
pub type MapIndex = usize;

/// Represent a sufficiently unique key for indexing or hashing features
/// from the [`FeatureArena`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FeatureKey(pub u32);

impl Hash for FeatureKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.0 as u64)
    }
}

impl IdentityHashable for FeatureKey {}

impl FeatureKey {
    #[inline(always)]
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl From<usize> for FeatureKey {
    fn from(value: usize) -> Self {
        FeatureKey(value as u32)
    }
}

impl std::fmt::Display for FeatureKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// One detected feature of one input map, as supplied by the caller
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FeatureRecord {
    /// Stable identity of the feature within its map
    pub feature_id: u64,
    /// Retention time, in whatever unit the upstream alignment produced
    pub rt: f64,
    /// Mass-to-charge ratio
    pub mz: f64,
    /// Charge state
    pub charge: i32,
    /// Summed or apex intensity of the feature
    pub intensity: f32,
    /// The best-hit peptide sequence if the feature carries an identification
    pub peptide: Option<Box<str>>,
}

impl FeatureRecord {
    pub fn new(feature_id: u64, rt: f64, mz: f64, charge: i32, intensity: f32) -> Self {
        Self {
            feature_id,
            rt,
            mz,
            charge,
            intensity,
            peptide: None,
        }
    }

    pub fn with_peptide<S: Into<Box<str>>>(mut self, sequence: S) -> Self {
        self.peptide = Some(sequence.into());
        self
    }
}

/// A [`FeatureRecord`] pinned to the map it came from. Immutable once created;
/// clustering structures refer to it through [`FeatureKey`] handles only.
#[derive(Debug, Clone)]
pub struct GridFeature {
    pub map_index: MapIndex,
    pub feature_id: u64,
    pub rt: f64,
    pub mz: f64,
    pub charge: i32,
    pub intensity: f32,
    pub peptide: Option<Box<str>>,
}

impl GridFeature {
    pub fn from_record(map_index: MapIndex, record: FeatureRecord) -> Self {
        Self {
            map_index,
            feature_id: record.feature_id,
            rt: record.rt,
            mz: record.mz,
            charge: record.charge,
            intensity: record.intensity,
            peptide: record.peptide,
        }
    }

    /// Whether `other`'s annotation agrees with this feature's. A feature
    /// without an annotation is compatible with anything.
    pub fn peptide_compatible(&self, other: &GridFeature) -> bool {
        match (&self.peptide, &other.peptide) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }
    }
}

/// Metadata of one input map, passed through to the output unmodified
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MapDescription {
    /// A caller-facing label, usually the source file name
    pub name: String,
    /// The number of features the map contributed
    pub size: usize,
}

/// Owns every [`GridFeature`] for the lifetime of a run, outliving all of the
/// clustering structures that point into it.
#[derive(Debug, Default)]
pub struct FeatureArena {
    features: Vec<GridFeature>,
    num_maps: usize,
}

impl FeatureArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorb one map's features, assigning the next map index
    pub fn add_map(&mut self, records: Vec<FeatureRecord>) -> MapIndex {
        let map_index = self.num_maps;
        self.features.reserve(records.len());
        self.features
            .extend(records.into_iter().map(|r| GridFeature::from_record(map_index, r)));
        self.num_maps += 1;
        map_index
    }

    #[inline(always)]
    pub fn get(&self, key: FeatureKey) -> &GridFeature {
        &self.features[key.index()]
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn num_maps(&self) -> usize {
        self.num_maps
    }

    pub fn keys(&self) -> impl Iterator<Item = FeatureKey> {
        (0..self.features.len() as u32).map(FeatureKey)
    }

    pub fn iter(&self) -> impl Iterator<Item = (FeatureKey, &GridFeature)> {
        self.features
            .iter()
            .enumerate()
            .map(|(i, f)| (FeatureKey(i as u32), f))
    }
}
