//! Feature matrices with one timestamp per column.

use super::MessageError;
use super::matrix::{Matrix, check_finite};

/// Feature frames for one utterance. `feature_names` is a free-form
/// descriptor naming the matrix rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Features {
    utterance_id: String,
    features: Matrix,
    timestamps: Vec<u64>,
    feature_names: String,
}

impl Features {
    /// Each column of `features` must have exactly one timestamp, and every
    /// value must be finite.
    pub fn new(
        utterance_id: impl Into<String>,
        features: Matrix,
        timestamps: Vec<u64>,
        feature_names: impl Into<String>,
    ) -> Result<Self, MessageError> {
        if features.cols() != timestamps.len() {
            return Err(MessageError::FeatureShape {
                columns: features.cols(),
                timestamps: timestamps.len(),
            });
        }
        for column in features.columns() {
            check_finite("features", column.as_slice())?;
        }
        Ok(Self {
            utterance_id: utterance_id.into(),
            features,
            timestamps,
            feature_names: feature_names.into(),
        })
    }

    pub fn utterance_id(&self) -> &str {
        &self.utterance_id
    }

    pub fn feature_names(&self) -> &str {
        &self.feature_names
    }

    pub fn features(&self) -> &Matrix {
        &self.features
    }

    pub fn timestamps(&self) -> &[u64] {
        &self.timestamps
    }

    /// Number of feature frames (columns).
    pub fn frames(&self) -> usize {
        self.timestamps.len()
    }

    /// Appends the frames of `other`, keeping columns and timestamps aligned.
    pub fn append(&mut self, other: &Features) -> Result<(), MessageError> {
        self.features.add_columns(&other.features)?;
        self.timestamps.extend_from_slice(&other.timestamps);
        Ok(())
    }
}
