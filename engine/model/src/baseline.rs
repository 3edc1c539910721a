//! Baseline models without trainable parameters.

use std::sync::Mutex;

use game_core::{random_playout, Game, GameError};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::error::ModelError;
use crate::model::{uniform_policy, Evaluation, Model};

fn reject_finished<G: Game>(game: &G) -> Result<(), ModelError> {
    if game.status().is_over() {
        return Err(GameError::GameOver.into());
    }
    Ok(())
}

/// Uniform policy over legal actions, value 0. The weakest possible prior.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomModel;

impl RandomModel {
    pub fn new() -> Self {
        Self
    }
}

impl<G: Game> Model<G> for RandomModel {
    fn evaluate(&self, game: &G) -> Result<Evaluation, ModelError> {
        reject_finished(game)?;
        Ok(Evaluation {
            value: 0.0,
            policy: uniform_policy(G::POLICY_LEN, &game.legal_actions()),
            features: Vec::new(),
        })
    }
}

/// Values a position by a single uniformly random playout, converted to the
/// current player's perspective; the policy is uniform over legal actions.
///
/// A fast search prior when no trained network is available. Holds its
/// random source behind a mutex so evaluation stays `&self`.
#[derive(Debug)]
pub struct RolloutModel {
    rng: Mutex<ChaCha20Rng>,
}

impl RolloutModel {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(ChaCha20Rng::from_entropy()),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(ChaCha20Rng::seed_from_u64(seed)),
        }
    }
}

impl Default for RolloutModel {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for RolloutModel {
    fn clone(&self) -> Self {
        // Fork the random stream so the copy is independent.
        let seed = self
            .rng
            .lock()
            .map(|mut rng| rng.gen())
            .unwrap_or_else(|poisoned| poisoned.into_inner().gen());
        Self::with_seed(seed)
    }
}

impl<G: Game> Model<G> for RolloutModel {
    fn evaluate(&self, game: &G) -> Result<Evaluation, ModelError> {
        reject_finished(game)?;

        let status = {
            let mut rng = self
                .rng
                .lock()
                .map_err(|_| ModelError::Evaluation("rollout rng poisoned".into()))?;
            random_playout(game, &mut rng)?
        };

        Ok(Evaluation {
            value: status.score_for(game.current_player()),
            policy: uniform_policy(G::POLICY_LEN, &game.legal_actions()),
            features: Vec::new(),
        })
    }
}

/// Constant value with a uniform policy. For tests.
#[derive(Debug, Clone, Copy)]
pub struct DummyModel {
    value: f32,
}

impl DummyModel {
    /// `value` is clamped into `[-1, 1]`.
    pub fn new(value: f32) -> Self {
        Self {
            value: value.clamp(-1.0, 1.0),
        }
    }

    #[inline]
    pub fn value(&self) -> f32 {
        self.value
    }
}

impl Default for DummyModel {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl<G: Game> Model<G> for DummyModel {
    fn evaluate(&self, game: &G) -> Result<Evaluation, ModelError> {
        reject_finished(game)?;
        Ok(Evaluation {
            value: self.value,
            policy: uniform_policy(G::POLICY_LEN, &game.legal_actions()),
            features: Vec::new(),
        })
    }
}
