use std::fs::File;
use std::io::Read;
use std::path::Path;

use itertools::Itertools;

use crate::error::{RecError, Result};

/// One `(user, item, rating)` triple of the rating stream.
#[derive(Clone, Debug, PartialEq)]
pub struct RatingObservation {
    pub user: String,
    pub item: String,
    pub rating: f64,
}

impl RatingObservation {
    pub fn new(user: &str, item: &str, rating: f64) -> Self {
        RatingObservation {
            user: user.to_string(),
            item: item.to_string(),
            rating,
        }
    }

    /// Checks the fields the core relies on. `record` is the 1-based position in the stream.
    pub fn validate(&self, record: usize) -> Result<()> {
        if self.user.trim().is_empty() {
            return Err(RecError::MalformedInput {
                record,
                reason: "missing user".to_string(),
            });
        }
        if self.item.trim().is_empty() {
            return Err(RecError::MalformedInput {
                record,
                reason: "missing item".to_string(),
            });
        }
        if !self.rating.is_finite() {
            return Err(RecError::MalformedInput {
                record,
                reason: format!("rating {} is not a finite number", self.rating),
            });
        }
        Ok(())
    }
}

pub fn read_ratings<P: AsRef<Path>>(
    ratings_path: P,
    delimiter: u8,
    has_headers: bool,
) -> Result<Vec<RatingObservation>> {
    let file = File::open(ratings_path)?;
    read_ratings_from(file, delimiter, has_headers)
}

/// Reads delimited `user, item, rating` records by position; further columns are ignored.
pub fn read_ratings_from<R: Read>(
    reader: R,
    delimiter: u8,
    has_headers: bool,
) -> Result<Vec<RatingObservation>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(has_headers)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut observations = Vec::new();
    for (position, row) in csv_reader.records().enumerate() {
        let record = position + 1;
        let row = row.map_err(|e| {
            if e.is_io_error() {
                RecError::from(e)
            } else {
                RecError::MalformedInput {
                    record,
                    reason: e.to_string(),
                }
            }
        })?;
        if row.len() < 3 {
            return Err(RecError::MalformedInput {
                record,
                reason: format!("expected 3 fields, found {}", row.len()),
            });
        }
        let rating = row[2]
            .parse::<f64>()
            .map_err(|e| RecError::MalformedInput {
                record,
                reason: format!("rating '{}': {}", &row[2], e),
            })?;
        let observation = RatingObservation::new(&row[0], &row[1], rating);
        observation.validate(record)?;
        observations.push(observation);
    }
    Ok(observations)
}

/// Splits off the last rating of every user with at least two ratings as a test case.
///
/// Returns `(training, test)`. The test cases are ordered by user.
pub fn leave_one_out(
    observations: Vec<RatingObservation>,
) -> (Vec<RatingObservation>, Vec<RatingObservation>) {
    let per_user = observations
        .into_iter()
        .map(|observation| (observation.user.clone(), observation))
        .into_group_map();

    let mut training = Vec::new();
    let mut test = Vec::new();
    for (_, mut user_observations) in per_user.into_iter().sorted_by(|a, b| a.0.cmp(&b.0)) {
        if user_observations.len() >= 2 {
            if let Some(held_out) = user_observations.pop() {
                test.push(held_out);
            }
        }
        training.extend(user_observations);
    }
    (training, test)
}
