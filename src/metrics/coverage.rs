use crate::metrics::RatingMetric;

/// Share of test cases for which a prediction could be made.
pub struct Coverage {
    predicted: usize,
    qty: usize,
}

impl Default for Coverage {
    fn default() -> Self {
        Self::new()
    }
}

impl Coverage {
    pub fn new() -> Coverage {
        Coverage {
            predicted: 0,
            qty: 0,
        }
    }
}

impl RatingMetric for Coverage {
    fn add(&mut self, predicted: Option<f64>, _actual: f64) {
        self.qty += 1;
        if predicted.is_some() {
            self.predicted += 1;
        }
    }

    fn result(&self) -> f64 {
        if self.qty > 0 {
            self.predicted as f64 / self.qty as f64
        } else {
            0.0
        }
    }

    fn get_name(&self) -> String {
        "Coverage".to_string()
    }
}
