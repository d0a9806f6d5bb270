//! Pairwise Criteria Consistency (AHP)
//!
//! A criteria file holds pairwise importance ratios `{row: {column: ratio}}`
//! per curtailment state (`curtail`, `augment`), or a single flat matrix in
//! older files. Validation approximates the principal eigenvector by
//! column normalisation and row averaging, then compares the consistency
//! index with Saaty's random index for the matrix size.
//!
//! Everything here except [`load`] is pure arithmetic.

use std::path::Path;

use serde_json::{Map, Value};

use crate::config::strip_comments;

/// Random consistency index for n = 1..=15. Larger matrices use the last entry.
const RANDOM_INDEX: [f64; 15] = [
    0.0, 0.0, 0.58, 0.90, 1.12, 1.24, 1.32, 1.41, 1.45, 1.49, 1.51, 1.48, 1.56, 1.57, 1.59,
];

/// Default consistency ratio threshold
pub const DEFAULT_THRESHOLD: f64 = 0.10;

const STATES: [&str; 2] = ["curtail", "augment"];

#[derive(Debug, thiserror::Error)]
pub enum PairwiseError {
    #[error("Failed to read criteria file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Invalid json: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Criteria section '{0}' is not an object")]
    NotAnObject(String),

    #[error("No comparison between '{row}' and '{column}'")]
    MissingComparison { row: String, column: String },

    #[error("Comparison of '{row}' to '{column}' must be a positive number")]
    InvalidRatio { row: String, column: String },

    #[error("Criteria matrix is empty")]
    Empty,
}

/// Square matrix of pairwise ratios with its labels
#[derive(Debug, Clone, PartialEq)]
pub struct CriteriaMatrix {
    labels: Vec<String>,
    cells: Vec<Vec<f64>>,
}

impl CriteriaMatrix {
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn cells(&self) -> &[Vec<f64>] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Result of a consistency check
#[derive(Debug, Clone, PartialEq)]
pub struct Consistency {
    pub priorities: Vec<f64>,
    pub lambda_max: f64,
    pub ratio: f64,
    pub consistent: bool,
}

/// Build the matrix for one criteria section
///
/// Labels are every criterion named as a row or a column, in sorted order.
/// An explicit cell wins over the reciprocal of its mirror; a pair with
/// neither is an error. The diagonal is always 1.
pub fn extract_criteria(section: &Map<String, Value>) -> Result<CriteriaMatrix, PairwiseError> {
    let mut labels: Vec<String> = Vec::new();
    for (row, columns) in section {
        labels.push(row.clone());
        let Value::Object(columns) = columns else {
            return Err(PairwiseError::NotAnObject(row.clone()));
        };
        labels.extend(columns.keys().cloned());
    }
    labels.sort();
    labels.dedup();
    if labels.is_empty() {
        return Err(PairwiseError::Empty);
    }

    let ratio = |row: &str, column: &str| -> Result<Option<f64>, PairwiseError> {
        match section.get(row).and_then(|columns| columns.get(column)) {
            None => Ok(None),
            Some(value) => match value.as_f64() {
                Some(r) if r.is_finite() && r > 0.0 => Ok(Some(r)),
                _ => Err(PairwiseError::InvalidRatio {
                    row: row.to_string(),
                    column: column.to_string(),
                }),
            },
        }
    };

    let mut cells = vec![vec![1.0; labels.len()]; labels.len()];
    for (i, row) in labels.iter().enumerate() {
        for (j, column) in labels.iter().enumerate() {
            if i == j {
                continue;
            }
            cells[i][j] = match (ratio(row, column)?, ratio(column, row)?) {
                (Some(r), _) => r,
                (None, Some(mirror)) => 1.0 / mirror,
                (None, None) => {
                    return Err(PairwiseError::MissingComparison {
                        row: row.clone(),
                        column: column.clone(),
                    });
                }
            };
        }
    }

    Ok(CriteriaMatrix { labels, cells })
}

pub fn column_sums(matrix: &CriteriaMatrix) -> Vec<f64> {
    let n = matrix.len();
    (0..n)
        .map(|j| matrix.cells.iter().map(|row| row[j]).sum())
        .collect()
}

/// Consistency ratio of `matrix` against `threshold`
pub fn validate(matrix: &CriteriaMatrix, column_sums: &[f64], threshold: f64) -> Consistency {
    let n = matrix.len();
    let nf = n as f64;

    let priorities: Vec<f64> = matrix
        .cells
        .iter()
        .map(|row| {
            row.iter()
                .zip(column_sums)
                .map(|(cell, sum)| cell / sum)
                .sum::<f64>()
                / nf
        })
        .collect();

    let lambda_max = matrix
        .cells
        .iter()
        .zip(&priorities)
        .map(|(row, w_i)| {
            let weighted: f64 = row.iter().zip(&priorities).map(|(a, w)| a * w).sum();
            weighted / w_i
        })
        .sum::<f64>()
        / nf;

    let ratio = if n <= 2 {
        0.0
    } else {
        let ci = (lambda_max - nf) / (nf - 1.0);
        let ri = RANDOM_INDEX[(n - 1).min(RANDOM_INDEX.len() - 1)];
        ci / ri
    };

    Consistency {
        priorities,
        lambda_max,
        ratio,
        consistent: ratio < threshold,
    }
}

/// Read a (comment tolerant) criteria file
pub fn load(path: &Path) -> Result<Value, PairwiseError> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&strip_comments(&content))?)
}

/// Criteria sections of a document: `curtail`/`augment` when present,
/// otherwise the whole document as one flat matrix
pub fn criteria_sections(doc: &Value) -> Result<Vec<(String, CriteriaMatrix)>, PairwiseError> {
    let Value::Object(root) = doc else {
        return Err(PairwiseError::NotAnObject("<root>".to_string()));
    };

    let states: Vec<&str> = STATES
        .iter()
        .copied()
        .filter(|state| root.contains_key(*state))
        .collect();
    if states.is_empty() {
        return Ok(vec![("criteria".to_string(), extract_criteria(root)?)]);
    }

    states
        .into_iter()
        .map(|state| match root.get(state) {
            Some(Value::Object(section)) => Ok((state.to_string(), extract_criteria(section)?)),
            _ => Err(PairwiseError::NotAnObject(state.to_string())),
        })
        .collect()
}
