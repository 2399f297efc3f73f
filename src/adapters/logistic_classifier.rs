//! Logistic regression classifier fitted by batch gradient descent.
//!
//! Features are standardised with the training mean and standard deviation
//! before fitting; prediction applies the same scaling.

use ndarray::{Array1, Array2, Axis};

use crate::domain::error::KabuError;
use crate::ports::classifier_port::{Classifier, ClassifierFactory};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogisticParams {
    pub learning_rate: f64,
    pub max_iter: usize,
    pub tolerance: f64,
    /// L2 penalty on the weights (not the intercept).
    pub l2: f64,
}

impl Default for LogisticParams {
    fn default() -> Self {
        LogisticParams {
            learning_rate: 0.1,
            max_iter: 1000,
            tolerance: 1e-7,
            l2: 1e-3,
        }
    }
}

#[derive(Debug, Clone)]
struct FittedModel {
    means: Array1<f64>,
    scales: Array1<f64>,
    weights: Array1<f64>,
    bias: f64,
}

impl FittedModel {
    fn standardise(&self, x: &Array2<f64>) -> Array2<f64> {
        (x - &self.means) / &self.scales
    }

    fn linear(&self, scaled: &Array2<f64>) -> Array1<f64> {
        scaled.dot(&self.weights) + self.bias
    }
}

#[derive(Debug, Clone, Default)]
pub struct LogisticClassifier {
    params: LogisticParams,
    model: Option<FittedModel>,
    cost_history: Vec<f64>,
}

impl LogisticClassifier {
    pub fn new(params: LogisticParams) -> Self {
        Self {
            params,
            model: None,
            cost_history: Vec::new(),
        }
    }

    fn sigmoid(z: f64) -> f64 {
        if z >= 0.0 {
            1.0 / (1.0 + (-z).exp())
        } else {
            let exp_z = z.exp();
            exp_z / (1.0 + exp_z)
        }
    }

    fn log_loss(targets: &Array1<f64>, predictions: &Array1<f64>) -> f64 {
        let eps = 1e-15;
        -targets
            .iter()
            .zip(predictions.iter())
            .map(|(&y, &p)| {
                let p = p.clamp(eps, 1.0 - eps);
                y * p.ln() + (1.0 - y) * (1.0 - p).ln()
            })
            .sum::<f64>()
            / targets.len() as f64
    }

    /// Packs rows into a matrix, rejecting ragged input.
    fn to_matrix(features: &[Vec<f64>], width: usize) -> Result<Array2<f64>, KabuError> {
        if let Some(row) = features.iter().find(|row| row.len() != width) {
            return Err(KabuError::Classifier {
                reason: format!(
                    "dimension mismatch: expected {} features, got {}",
                    width,
                    row.len()
                ),
            });
        }
        let flat: Vec<f64> = features.iter().flatten().copied().collect();
        Array2::from_shape_vec((features.len(), width), flat).map_err(|e| KabuError::Classifier {
            reason: e.to_string(),
        })
    }
}

/// Column means and population standard deviations; a flat column scales by 1.
fn column_scaling(x: &Array2<f64>) -> (Array1<f64>, Array1<f64>) {
    let means = x
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(x.ncols()));
    let scales = x
        .std_axis(Axis(0), 0.0)
        .mapv(|s| if s == 0.0 || !s.is_finite() { 1.0 } else { s });
    (means, scales)
}

impl Classifier for LogisticClassifier {
    fn fit(&mut self, features: &[Vec<f64>], targets: &[f64]) -> Result<(), KabuError> {
        if features.is_empty() {
            return Err(KabuError::Classifier {
                reason: "no training rows".to_string(),
            });
        }
        if features.len() != targets.len() {
            return Err(KabuError::Classifier {
                reason: format!(
                    "{} feature rows but {} targets",
                    features.len(),
                    targets.len()
                ),
            });
        }
        let x = Self::to_matrix(features, features[0].len())?;
        let y = Array1::from(targets.to_vec());

        let (means, scales) = column_scaling(&x);
        let mut model = FittedModel {
            means,
            scales,
            weights: Array1::zeros(x.ncols()),
            bias: 0.0,
        };
        let scaled = model.standardise(&x);
        let n_samples = scaled.nrows() as f64;
        let lr = self.params.learning_rate;

        self.cost_history.clear();
        for iter in 0..self.params.max_iter {
            let predictions = model.linear(&scaled).mapv(Self::sigmoid);

            let errors = &predictions - &y;
            let dw = scaled.t().dot(&errors) / n_samples + &model.weights * self.params.l2;
            let db = errors.sum() / n_samples;

            model.weights = &model.weights - &(dw * lr);
            model.bias -= lr * db;

            let cost = Self::log_loss(&y, &predictions);
            self.cost_history.push(cost);
            if iter > 0 && (self.cost_history[iter - 1] - cost).abs() < self.params.tolerance {
                log::debug!("logistic regression converged at iteration {}", iter);
                break;
            }
        }

        self.model = Some(model);
        Ok(())
    }

    fn predict_probability(&self, features: &[Vec<f64>]) -> Result<Vec<f64>, KabuError> {
        let model = self.model.as_ref().ok_or_else(|| KabuError::Classifier {
            reason: "model has not been fitted".to_string(),
        })?;
        let x = Self::to_matrix(features, model.weights.len())?;

        Ok(model
            .linear(&model.standardise(&x))
            .mapv(Self::sigmoid)
            .to_vec())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LogisticClassifierFactory {
    pub params: LogisticParams,
}

impl ClassifierFactory for LogisticClassifierFactory {
    fn create(&self) -> Box<dyn Classifier> {
        Box::new(LogisticClassifier::new(self.params))
    }
}
