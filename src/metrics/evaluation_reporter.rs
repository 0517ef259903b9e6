use serde::Serialize;

use crate::metrics::coverage::Coverage;
use crate::metrics::hitrate::HitRate;
use crate::metrics::mae::Mae;
use crate::metrics::rmse::Rmse;
use crate::metrics::{RankingMetric, RatingMetric};
use crate::ResourceId;

/// One row of evaluation results.
#[derive(Debug, Serialize)]
pub struct EvaluationSummary {
    pub test_cases: usize,
    pub mae: f64,
    pub rmse: f64,
    pub coverage: f64,
    pub hitrate: f64,
}

pub struct EvaluationReporter {
    mae: Mae,
    rmse: Rmse,
    coverage: Coverage,
    hitrate: HitRate,
    test_cases: usize,
}

impl EvaluationReporter {
    pub fn new(length: usize) -> EvaluationReporter {
        EvaluationReporter {
            mae: Mae::new(),
            rmse: Rmse::new(),
            coverage: Coverage::new(),
            hitrate: HitRate::new(length),
            test_cases: 0,
        }
    }

    /// Held-out items that never occur in the training data only count for the
    /// rating metrics.
    pub fn add(
        &mut self,
        predicted: Option<f64>,
        actual: f64,
        recommendations: &[ResourceId],
        held_out_item: Option<ResourceId>,
    ) {
        self.test_cases += 1;
        self.mae.add(predicted, actual);
        self.rmse.add(predicted, actual);
        self.coverage.add(predicted, actual);
        if let Some(item) = held_out_item {
            self.hitrate.add(recommendations, item);
        }
    }

    pub fn summary(&self) -> EvaluationSummary {
        EvaluationSummary {
            test_cases: self.test_cases,
            mae: self.mae.result(),
            rmse: self.rmse.result(),
            coverage: self.coverage.result(),
            hitrate: self.hitrate.result(),
        }
    }

    pub fn result(&self) -> String {
        format!(
            "{:.4},{:.4},{:.4},{:.4}",
            self.mae.result(),
            self.rmse.result(),
            self.coverage.result(),
            self.hitrate.result()
        )
    }

    pub fn get_name(&self) -> String {
        format!(
            "{},{},{},{}",
            self.mae.get_name(),
            self.rmse.get_name(),
            self.coverage.get_name(),
            self.hitrate.get_name()
        )
    }
}
