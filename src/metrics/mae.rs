use crate::metrics::RatingMetric;

/// Mean absolute error over the test cases that received a prediction.
pub struct Mae {
    sum_of_errors: f64,
    qty: usize,
}

impl Default for Mae {
    fn default() -> Self {
        Self::new()
    }
}

impl Mae {
    pub fn new() -> Mae {
        Mae {
            sum_of_errors: 0_f64,
            qty: 0,
        }
    }
}

impl RatingMetric for Mae {
    fn add(&mut self, predicted: Option<f64>, actual: f64) {
        if let Some(predicted) = predicted {
            self.sum_of_errors += (predicted - actual).abs();
            self.qty += 1;
        }
    }

    fn result(&self) -> f64 {
        if self.qty > 0 {
            self.sum_of_errors / self.qty as f64
        } else {
            0.0
        }
    }

    fn get_name(&self) -> String {
        "MAE".to_string()
    }
}
