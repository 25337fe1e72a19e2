//! Run configuration and the error taxonomy shared across the crate.
use mzpeaks::Tolerance;
use thiserror::Error;

/// An error that might occur while preparing or running a linking job
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LinkError {
    #[error("at least one input map is required")]
    NoMaps,
    #[error("the maximum RT difference must be positive and finite, was {0}")]
    InvalidRtTolerance(f64),
    #[error("the m/z tolerance must describe a positive window, was {0}")]
    InvalidMzTolerance(String),
    #[error("distance weights and exponents must be finite, non-negative, and not all zero")]
    InvalidDistanceWeights,
    #[error("feature {feature_id} of map {map_index} has a non-finite RT or m/z")]
    NonFiniteCoordinate { map_index: usize, feature_id: u64 },
    #[error("feature {feature_id} of map {map_index} has a non-positive m/z")]
    NonPositiveMz { map_index: usize, feature_id: u64 },
    #[error("feature {feature_id} of map {map_index} has a non-finite or negative intensity")]
    InvalidIntensity { map_index: usize, feature_id: u64 },
}

/// Parameters controlling which features may be linked and how their
/// separation is converted into a distance.
///
/// Distances produced under these parameters are normalized into `[0, 1]`,
/// which the cluster quality computation relies on.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LinkParams {
    /// Widest tolerated RT difference between linked features
    pub max_rt_diff: f64,
    /// Widest tolerated m/z difference between linked features
    pub mz_tolerance: Tolerance,
    /// Refuse to link features with differing charge states
    pub require_matching_charge: bool,
    /// Refuse to link features whose best-hit peptide annotations disagree.
    /// A feature without an annotation is compatible with anything.
    pub require_matching_ids: bool,
    /// Relative weight of the RT term of the distance
    pub rt_weight: f64,
    /// Relative weight of the m/z term of the distance
    pub mz_weight: f64,
    /// Relative weight of the intensity term of the distance. Zero disables it.
    pub intensity_weight: f64,
    /// Exponent applied to the normalized RT difference
    pub rt_exponent: f64,
    /// Exponent applied to the normalized m/z difference
    pub mz_exponent: f64,
}

impl Default for LinkParams {
    fn default() -> Self {
        Self {
            max_rt_diff: 100.0,
            mz_tolerance: Tolerance::Da(0.3),
            require_matching_charge: true,
            require_matching_ids: false,
            rt_weight: 1.0,
            mz_weight: 1.0,
            intensity_weight: 0.0,
            rt_exponent: 1.0,
            mz_exponent: 2.0,
        }
    }
}

impl LinkParams {
    pub fn new(max_rt_diff: f64, mz_tolerance: Tolerance) -> Self {
        Self {
            max_rt_diff,
            mz_tolerance,
            ..Default::default()
        }
    }

    /// The half-width of the m/z window at `mz`
    pub fn mz_half_width(&self, mz: f64) -> f64 {
        let (lo, hi) = self.mz_tolerance.bounds(mz);
        (hi - lo) / 2.0
    }

    /// Reject ill-formed configurations before any clustering starts
    pub fn validate(&self) -> Result<(), LinkError> {
        if !(self.max_rt_diff.is_finite() && self.max_rt_diff > 0.0) {
            return Err(LinkError::InvalidRtTolerance(self.max_rt_diff));
        }
        let width = self.mz_half_width(1000.0);
        if !(width.is_finite() && width > 0.0) {
            return Err(LinkError::InvalidMzTolerance(format!(
                "{:?}",
                self.mz_tolerance
            )));
        }
        let weights = [self.rt_weight, self.mz_weight, self.intensity_weight];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(LinkError::InvalidDistanceWeights);
        }
        if weights.iter().sum::<f64>() <= 0.0 {
            return Err(LinkError::InvalidDistanceWeights);
        }
        for e in [self.rt_exponent, self.mz_exponent] {
            if !(e.is_finite() && e > 0.0) {
                return Err(LinkError::InvalidDistanceWeights);
            }
        }
        Ok(())
    }
}
