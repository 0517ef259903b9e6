use std::fmt;
use std::str::FromStr;

use crate::error::{RecError, Result};
use crate::ratings::RatedResource;
use crate::ResourceId;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Normalization {
    None,
    MeanCentering,
    ZScore,
}

impl FromStr for Normalization {
    type Err = RecError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "none" => Ok(Normalization::None),
            "mean_centering" | "mean-centering" => Ok(Normalization::MeanCentering),
            "z_score" | "z-score" | "zscore" => Ok(Normalization::ZScore),
            other => Err(RecError::InvalidConfiguration(format!(
                "unknown normalization strategy '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for Normalization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Normalization::None => "none",
            Normalization::MeanCentering => "mean_centering",
            Normalization::ZScore => "z_score",
        };
        f.write_str(name)
    }
}

/// Statistics of one user's raw ratings and the norm of the transformed vector.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NormalizationState {
    pub mean: f64,
    pub std_dev: f64,
    pub l2_norm: f64,
}

impl NormalizationState {
    /// Maps a value on the normalised scale back onto the user's rating scale.
    pub fn denormalize(&self, strategy: Normalization, value: f64) -> f64 {
        match strategy {
            Normalization::None => value,
            Normalization::MeanCentering => self.mean + value,
            Normalization::ZScore => self.mean + self.std_dev * value,
        }
    }
}

/// Arithmetic mean, zero for an empty rating set.
pub fn mean(ratings: &[RatedResource]) -> f64 {
    if ratings.is_empty() {
        return 0.0;
    }
    ratings.iter().map(|rated| rated.rating).sum::<f64>() / ratings.len() as f64
}

/// Population standard deviation around `mean`, zero for an empty rating set.
pub fn population_std_dev(ratings: &[RatedResource], mean: f64) -> f64 {
    if ratings.is_empty() {
        return 0.0;
    }
    let sum_of_squares: f64 = ratings
        .iter()
        .map(|rated| (rated.rating - mean) * (rated.rating - mean))
        .sum();
    (sum_of_squares / ratings.len() as f64).sqrt()
}

pub fn l2_norm(ratings: &[RatedResource]) -> f64 {
    ratings
        .iter()
        .map(|rated| rated.rating * rated.rating)
        .sum::<f64>()
        .sqrt()
}

pub(crate) fn normalize_user(
    user: ResourceId,
    ratings: &[RatedResource],
    strategy: Normalization,
) -> Result<(Vec<RatedResource>, NormalizationState)> {
    let mean = mean(ratings);
    let std_dev = population_std_dev(ratings, mean);

    let normalized: Vec<RatedResource> = match strategy {
        Normalization::None => ratings.to_vec(),
        Normalization::MeanCentering => ratings
            .iter()
            .map(|rated| RatedResource::new(rated.id, rated.rating - mean))
            .collect(),
        Normalization::ZScore => {
            if ratings.is_empty() {
                return Err(RecError::EmptyRatingSet(user));
            }
            // Rounding noise around identical ratings scales with the mean.
            if std_dev <= f64::EPSILON * mean.abs() {
                return Err(RecError::DivideByZero(user));
            }
            ratings
                .iter()
                .map(|rated| RatedResource::new(rated.id, (rated.rating - mean) / std_dev))
                .collect()
        }
    };

    let state = NormalizationState {
        mean,
        std_dev,
        l2_norm: l2_norm(&normalized),
    };
    Ok((normalized, state))
}
