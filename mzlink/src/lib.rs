//! Label-free grouping of LC-MS features across runs.
//!
//! Given any number of independently acquired feature maps whose retention
//! times have already been aligned, this crate decides which features from
//! different runs represent the same analyte, using a greedy, single-pass
//! variant of QT clustering, and emits one consensus feature per group.
pub mod cluster_graph;
pub mod config;
pub mod consensus;
pub mod distance;
pub mod feature;
pub mod finder;
pub mod grid;

mod api;

pub use api::link_maps;
pub use config::{LinkError, LinkParams};
pub use consensus::{ConsensusFeature, ConsensusMap, FeatureHandle};
pub use feature::{FeatureRecord, MapDescription};
pub use finder::QTClusterFinder;
