//! Labeled feature dataset for training and backtesting.
//!
//! Joins indicator rows with ground-truth labels and keeps only rows where
//! every feature column is defined and a label exists.

use crate::domain::error::KabuError;
use crate::domain::indicator::IndicatorRow;
use crate::domain::label::{Label, LabelSpec, build_labels};
use crate::domain::ohlcv::PriceBar;

#[derive(Debug, Clone, PartialEq)]
pub struct DatasetRow {
    pub row: IndicatorRow,
    /// Values of the dataset's feature columns, in column order.
    pub features: Vec<f64>,
    pub label: Label,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub code: String,
    pub feature_columns: Vec<String>,
    pub horizon_days: usize,
    pub rows: Vec<DatasetRow>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of the first test row for a chronological split.
    pub fn split_index(&self, ratio: f64) -> usize {
        (((self.rows.len() as f64) * ratio).floor() as usize).min(self.rows.len())
    }

    pub fn features(&self, range: std::ops::Range<usize>) -> Vec<Vec<f64>> {
        self.rows[range].iter().map(|r| r.features.clone()).collect()
    }

    pub fn bar(&self, index: usize) -> &PriceBar {
        &self.rows[index].row.bar
    }
}

pub fn build_dataset(
    code: &str,
    rows: &[IndicatorRow],
    feature_columns: &[String],
    label_spec: &LabelSpec,
) -> Result<Dataset, KabuError> {
    if rows.is_empty() {
        return Err(KabuError::NoData {
            code: code.to_string(),
        });
    }

    // The engine emits the same columns on every row.
    let missing: Vec<String> = feature_columns
        .iter()
        .filter(|c| !rows[0].has_column(c))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(KabuError::MissingColumns {
            code: code.to_string(),
            columns: missing,
        });
    }

    let bars: Vec<PriceBar> = rows.iter().map(|r| r.bar.clone()).collect();
    let labels = build_labels(&bars, label_spec).map_err(|e| match e {
        KabuError::InsufficientData { rows, minimum, .. } => KabuError::InsufficientData {
            code: code.to_string(),
            rows,
            minimum,
        },
        other => other,
    })?;

    let mut out = Vec::with_capacity(labels.len());
    let mut undefined = 0usize;
    for labeled in &labels.rows {
        let row = &rows[labeled.index];
        let features: Option<Vec<f64>> = feature_columns.iter().map(|c| row.get(c)).collect();
        match features {
            Some(features) => out.push(DatasetRow {
                row: row.clone(),
                features,
                label: labeled.label,
            }),
            None => undefined += 1,
        }
    }

    log::debug!(
        "{}: dataset of {} rows ({} with undefined features, {} without label)",
        code,
        out.len(),
        undefined,
        rows.len() - labels.len()
    );

    Ok(Dataset {
        code: code.to_string(),
        feature_columns: feature_columns.to_vec(),
        horizon_days: label_spec.horizon_days,
        rows: out,
    })
}
