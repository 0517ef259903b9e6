use crate::metrics::RatingMetric;

/// Root mean squared error over the test cases that received a prediction.
pub struct Rmse {
    sum_of_squared_errors: f64,
    qty: usize,
}

impl Default for Rmse {
    fn default() -> Self {
        Self::new()
    }
}

impl Rmse {
    pub fn new() -> Rmse {
        Rmse {
            sum_of_squared_errors: 0_f64,
            qty: 0,
        }
    }
}

impl RatingMetric for Rmse {
    fn add(&mut self, predicted: Option<f64>, actual: f64) {
        if let Some(predicted) = predicted {
            self.sum_of_squared_errors += (predicted - actual).powi(2);
            self.qty += 1;
        }
    }

    fn result(&self) -> f64 {
        if self.qty > 0 {
            (self.sum_of_squared_errors / self.qty as f64).sqrt()
        } else {
            0.0
        }
    }

    fn get_name(&self) -> String {
        "RMSE".to_string()
    }
}
