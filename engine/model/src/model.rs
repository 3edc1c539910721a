//! The `Model` trait and its evaluation result types.

use game_core::Game;

use crate::error::ModelError;

/// Computational backend a model's parameters live on.
///
/// The GPU variant is a tag for collaborating array backends; every model in
/// this crate computes on the CPU, but wrappers and snapshots must preserve
/// and migrate the tag faithfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Cpu,
    Gpu,
}

impl Backend {
    #[inline]
    pub fn other(self) -> Self {
        match self {
            Backend::Cpu => Backend::Gpu,
            Backend::Gpu => Backend::Cpu,
        }
    }
}

/// Describes one auxiliary feature head of a model: its name, the number of
/// outputs it produces, and the weight of its loss term during training.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureDescriptor {
    pub name: &'static str,
    pub len: usize,
    pub weight: f32,
}

/// Result of evaluating a single position.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Value estimate for the side to move, in `[-1, 1]`.
    pub value: f32,

    /// Policy over all `POLICY_LEN` actions. Entries on illegal actions are
    /// zero and the legal entries sum to 1 (up to rounding).
    pub policy: Vec<f32>,

    /// Concatenated feature head outputs; empty when the model has none.
    pub features: Vec<f32>,
}

/// A position evaluator: value, policy, and optional feature outputs.
///
/// Models are type-narrowed to the game they accept; applying a model to a
/// different game type is a compile error, and a model whose input size
/// disagrees with the game's representation fails with
/// [`ModelError::ShapeMismatch`] at runtime.
///
/// Evaluating a finished position is a contract violation and fails.
pub trait Model<G: Game>: Send + Sync {
    /// Evaluate a single position.
    fn evaluate(&self, game: &G) -> Result<Evaluation, ModelError>;

    /// Evaluate several positions. The default maps elementwise; wrappers
    /// and batched backends override this for efficiency.
    fn evaluate_batch(&self, games: &[G]) -> Result<Vec<Evaluation>, ModelError> {
        games.iter().map(|game| self.evaluate(game)).collect()
    }

    /// How many evaluation requests the model wants in flight at once. The
    /// search keeps this many traversals pending before each evaluation.
    fn ntasks(&self) -> usize {
        1
    }

    /// Feature heads this model produces, in output order.
    fn features(&self) -> Vec<FeatureDescriptor> {
        Vec::new()
    }

    fn backend(&self) -> Backend {
        Backend::Cpu
    }
}

impl<G: Game, M: Model<G>> Model<G> for &M {
    fn evaluate(&self, game: &G) -> Result<Evaluation, ModelError> {
        (**self).evaluate(game)
    }

    fn evaluate_batch(&self, games: &[G]) -> Result<Vec<Evaluation>, ModelError> {
        (**self).evaluate_batch(games)
    }

    fn ntasks(&self) -> usize {
        (**self).ntasks()
    }

    fn features(&self) -> Vec<FeatureDescriptor> {
        (**self).features()
    }

    fn backend(&self) -> Backend {
        (**self).backend()
    }
}

/// Shared ownership keeps a model reachable (e.g. for training) while a
/// wrapper that takes its model by value, like the batching wrapper's
/// collector, holds another handle.
impl<G: Game, M: Model<G>> Model<G> for std::sync::Arc<M> {
    fn evaluate(&self, game: &G) -> Result<Evaluation, ModelError> {
        (**self).evaluate(game)
    }

    fn evaluate_batch(&self, games: &[G]) -> Result<Vec<Evaluation>, ModelError> {
        (**self).evaluate_batch(games)
    }

    fn ntasks(&self) -> usize {
        (**self).ntasks()
    }

    fn features(&self) -> Vec<FeatureDescriptor> {
        (**self).features()
    }

    fn backend(&self) -> Backend {
        (**self).backend()
    }
}

/// Computes feature targets from positions, matching a model's feature
/// heads head for head.
///
/// Feature targets are properties of the position itself (the model learns
/// to predict them), so they are supplied by the game side rather than by
/// the model. Recording with an extractor requires a model that actually
/// exposes the corresponding heads; a caching wrapper strips them and
/// therefore cannot serve such a recording.
pub trait FeatureExtractor<G: Game>: Send + Sync {
    fn descriptors(&self) -> Vec<FeatureDescriptor>;

    /// Concatenated targets, in descriptor order.
    fn targets(&self, game: &G) -> Vec<f32>;
}

/// Uniform distribution over `legal`, expanded to a full-length policy.
pub fn uniform_policy(policy_len: usize, legal: &[usize]) -> Vec<f32> {
    let mut policy = vec![0.0; policy_len];
    if legal.is_empty() {
        return policy;
    }
    let mass = 1.0 / legal.len() as f32;
    for &action in legal {
        policy[action] = mass;
    }
    policy
}
