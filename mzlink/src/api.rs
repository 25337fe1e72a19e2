//! A single-call entry point for the common case.
use crate::config::{LinkError, LinkParams};
use crate::consensus::ConsensusMap;
use crate::feature::FeatureRecord;
use crate::finder::QTClusterFinder;

/// Group the features of `maps` into a consensus map using QT clustering.
///
/// ```
/// use mzlink::{link_maps, FeatureRecord, LinkParams};
/// use mzpeaks::Tolerance;
///
/// let params = LinkParams::new(5.0, Tolerance::Da(0.01));
/// let consensus = link_maps(
///     vec![
///         ("run_1", vec![FeatureRecord::new(1, 100.0, 500.0, 2, 1000.0)]),
///         ("run_2", vec![FeatureRecord::new(1, 101.0, 500.002, 2, 900.0)]),
///     ],
///     params,
/// )
/// .unwrap();
/// assert_eq!(consensus.len(), 1);
/// assert_eq!(consensus.features[0].len(), 2);
/// ```
pub fn link_maps<S: Into<String>>(
    maps: Vec<(S, Vec<FeatureRecord>)>,
    params: LinkParams,
) -> Result<ConsensusMap, LinkError> {
    let mut finder = QTClusterFinder::new(params)?;
    for (name, records) in maps {
        finder.add_map(name, records)?;
    }
    finder.run()
}
