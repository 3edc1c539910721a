//! Recorded training data.
//!
//! Self-play emits one [`Sample`] per visited position: the position's
//! representation, the search-improved policy as the training target, the
//! final game outcome from that position's perspective, and any feature
//! targets. The set is serializable for export between runs.

use serde::{Deserialize, Serialize};

use game_core::Game;

use crate::error::ModelError;

/// One training example.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Flattened representation tensor of the position.
    pub representation: Vec<f32>,

    /// Target policy: the improved policy the search produced at this
    /// position. Full length, zeros on illegal actions.
    pub policy: Vec<f32>,

    /// Target value: the terminal outcome seen from this position's side to
    /// move.
    pub value: f32,

    /// Concatenated feature targets; empty when no feature set is active.
    pub features: Vec<f32>,
}

/// Describes the game type and tensor sizes of a data set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSetMeta {
    pub game: String,
    pub shape: (usize, usize, usize),
    pub policy_len: usize,
    pub feature_len: usize,
}

impl DataSetMeta {
    pub fn of<G: Game>(feature_len: usize) -> Self {
        Self {
            game: G::NAME.to_string(),
            shape: G::SHAPE,
            policy_len: G::POLICY_LEN,
            feature_len,
        }
    }
}

/// An ordered collection of training samples for one game type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSet {
    meta: DataSetMeta,
    samples: Vec<Sample>,
}

impl DataSet {
    pub fn new(meta: DataSetMeta) -> Self {
        Self {
            meta,
            samples: Vec::new(),
        }
    }

    pub fn for_game<G: Game>(feature_len: usize) -> Self {
        Self::new(DataSetMeta::of::<G>(feature_len))
    }

    #[inline]
    pub fn meta(&self) -> &DataSetMeta {
        &self.meta
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[inline]
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Append a sample after checking it against the metadata.
    pub fn push(&mut self, sample: Sample) -> Result<(), ModelError> {
        let (h, w, c) = self.meta.shape;
        if sample.representation.len() != h * w * c {
            return Err(ModelError::ShapeMismatch {
                expected: h * w * c,
                actual: sample.representation.len(),
            });
        }
        if sample.policy.len() != self.meta.policy_len {
            return Err(ModelError::ShapeMismatch {
                expected: self.meta.policy_len,
                actual: sample.policy.len(),
            });
        }
        if sample.features.len() != self.meta.feature_len {
            return Err(ModelError::ShapeMismatch {
                expected: self.meta.feature_len,
                actual: sample.features.len(),
            });
        }
        self.samples.push(sample);
        Ok(())
    }

    /// Move all samples of `other` into `self`. Fails when the metadata
    /// disagrees.
    pub fn merge(&mut self, other: DataSet) -> Result<(), ModelError> {
        if other.meta != self.meta {
            return Err(ModelError::Evaluation(format!(
                "cannot merge data sets for '{}' and '{}'",
                self.meta.game, other.meta.game
            )));
        }
        self.samples.extend(other.samples);
        Ok(())
    }

    /// Contiguous minibatches of at most `size` samples.
    pub fn minibatches(&self, size: usize) -> impl Iterator<Item = &[Sample]> {
        self.samples.chunks(size.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use games_tictactoe::TicTacToe;

    fn sample(value: f32) -> Sample {
        Sample {
            representation: vec![0.0; 9],
            policy: vec![1.0 / 9.0; 9],
            value,
            features: Vec::new(),
        }
    }

    #[test]
    fn meta_is_derived_from_the_game_type() {
        let meta = DataSetMeta::of::<TicTacToe>(0);
        assert_eq!(meta.game, "tictactoe");
        assert_eq!(meta.shape, (3, 3, 1));
        assert_eq!(meta.policy_len, 9);
    }

    #[test]
    fn push_checks_tensor_sizes() {
        let mut set = DataSet::for_game::<TicTacToe>(0);

        set.push(sample(0.0)).unwrap();
        assert_eq!(set.len(), 1);

        let mut bad = sample(0.0);
        bad.policy = vec![0.5; 4];
        assert!(set.push(bad).is_err());

        let mut bad = sample(0.0);
        bad.representation = vec![0.0; 4];
        assert!(set.push(bad).is_err());

        let mut bad = sample(0.0);
        bad.features = vec![1.0];
        assert!(set.push(bad).is_err());

        assert_eq!(set.len(), 1);
    }

    #[test]
    fn merge_requires_matching_meta() {
        let mut a = DataSet::for_game::<TicTacToe>(0);
        let mut b = DataSet::for_game::<TicTacToe>(0);
        a.push(sample(1.0)).unwrap();
        b.push(sample(-1.0)).unwrap();
        b.push(sample(0.0)).unwrap();

        a.merge(b).unwrap();
        assert_eq!(a.len(), 3);

        let incompatible = DataSet::for_game::<TicTacToe>(2);
        assert!(a.merge(incompatible).is_err());
    }

    #[test]
    fn minibatches_cover_all_samples() {
        let mut set = DataSet::for_game::<TicTacToe>(0);
        for i in 0..10 {
            set.push(sample(i as f32 / 10.0)).unwrap();
        }

        let batches: Vec<_> = set.minibatches(4).collect();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 4);
        assert_eq!(batches[2].len(), 2);
    }

    #[test]
    fn data_sets_survive_json_round_trips() {
        let mut set = DataSet::for_game::<TicTacToe>(0);
        set.push(sample(0.5)).unwrap();

        let json = serde_json::to_string(&set).unwrap();
        let restored: DataSet = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.meta(), set.meta());
        assert_eq!(restored.samples(), set.samples());
    }
}
