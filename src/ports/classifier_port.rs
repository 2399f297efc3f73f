//! Classifier port traits.

use crate::domain::error::KabuError;

/// A binary classifier predicting the probability of the BUY class.
pub trait Classifier {
    /// Fit on feature vectors with targets 1.0 (BUY) / 0.0 (not BUY).
    fn fit(&mut self, features: &[Vec<f64>], targets: &[f64]) -> Result<(), KabuError>;

    /// BUY probability for each feature vector, in `[0, 1]`.
    fn predict_probability(&self, features: &[Vec<f64>]) -> Result<Vec<f64>, KabuError>;
}

/// Creates fresh, unfitted classifiers. One per backtest candidate.
pub trait ClassifierFactory: Sync {
    fn create(&self) -> Box<dyn Classifier>;
}
