//! Bookkeeping for candidate clusters: the clusters themselves, the priority
//! index ordering them by quality, and the reverse index from features to the
//! clusters referencing them.
mod cluster;
mod graph;
mod heap;

pub use cluster::{ClusterKey, ClusterState, ClusterUpdate, QTCluster};
pub use graph::ElementGraph;
pub use heap::{ClusterPriorityIndex, ClusterRef};
