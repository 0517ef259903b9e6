use crate::ResourceId;

pub mod coverage;
pub mod evaluation_reporter;
pub mod hitrate;
pub mod mae;
pub mod rmse;

/// Accuracy of point predictions against held-out ratings.
pub trait RatingMetric {
    fn add(&mut self, predicted: Option<f64>, actual: f64);
    fn result(&self) -> f64;
    fn get_name(&self) -> String;
}

/// Quality of a top-N list against the held-out item.
pub trait RankingMetric {
    fn add(&mut self, recommendations: &[ResourceId], held_out_item: ResourceId);
    fn result(&self) -> f64;
    fn get_name(&self) -> String;
}
