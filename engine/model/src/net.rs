//! The trainable model stack: logit-producing networks and the head layer
//! that turns raw logits into value/policy/feature outputs.
//!
//! Network internals (layer kinds, gradient propagation, array backends)
//! stay behind the [`LogitNet`] / [`TrainableNet`] boundary. This crate only
//! assumes a function from a flat input tensor to `1 + POLICY_LEN + f` raw
//! outputs: one value logit, the policy logits, and optional feature
//! outputs. [`LinearNet`] is the minimal reference implementation.

use std::marker::PhantomData;

use game_core::{Game, GameError};
use rand::Rng;
use rand_chacha::ChaCha20Rng;

use crate::error::ModelError;
use crate::model::{uniform_policy, Backend, Evaluation, FeatureDescriptor, Model};

/// A differentiable function from a flat input tensor to raw logits.
pub trait LogitNet: Send + Sync {
    /// Flattened input length the net expects.
    fn input_len(&self) -> usize;

    /// Number of raw outputs per input.
    fn output_len(&self) -> usize;

    fn backend(&self) -> Backend;

    fn forward(&self, input: &[f32]) -> Vec<f32>;

    /// Forward a batch of inputs. The default maps elementwise; array
    /// backends override this with one fused call.
    fn forward_batch(&self, inputs: &[Vec<f32>]) -> Vec<Vec<f32>> {
        inputs.iter().map(|input| self.forward(input)).collect()
    }

    /// An equivalent net on the other backend.
    fn swap(&self) -> Self
    where
        Self: Sized;
}

/// A logit net with trainable parameters.
///
/// Gradients are accumulated by [`TrainableNet::backward`] and consumed by
/// an optimizer through [`TrainableNet::visit_params`].
pub trait TrainableNet: LogitNet {
    /// Reset all accumulated gradients to zero.
    fn zero_grads(&mut self);

    /// Accumulate parameter gradients for one input, given the loss
    /// gradient with respect to the raw outputs.
    fn backward(&mut self, input: &[f32], grad_output: &[f32]);

    /// Visit every parameter slice together with its gradient slice. The
    /// flag marks slices that participate in L2 regularization.
    fn visit_params(&mut self, visit: &mut dyn FnMut(&mut [f32], &mut [f32], bool));

    /// Sum of squares over the regularizable parameters.
    fn regularizable_norm(&self) -> f32;
}

/// A single dense layer: `output = weights · input + bias`.
///
/// The reference trainable net. Weights are regularizable, the bias is not.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearNet {
    input_len: usize,
    output_len: usize,
    weights: Vec<f32>,
    bias: Vec<f32>,
    weight_grads: Vec<f32>,
    bias_grads: Vec<f32>,
    backend: Backend,
}

impl LinearNet {
    /// A net with small random weights.
    pub fn new(input_len: usize, output_len: usize, rng: &mut ChaCha20Rng) -> Self {
        let mut net = Self::zeroed(input_len, output_len);
        for weight in &mut net.weights {
            *weight = rng.gen_range(-0.05..0.05);
        }
        net
    }

    /// A net with all parameters zero.
    pub fn zeroed(input_len: usize, output_len: usize) -> Self {
        Self {
            input_len,
            output_len,
            weights: vec![0.0; input_len * output_len],
            bias: vec![0.0; output_len],
            weight_grads: vec![0.0; input_len * output_len],
            bias_grads: vec![0.0; output_len],
            backend: Backend::Cpu,
        }
    }

    pub(crate) fn from_parts(
        input_len: usize,
        output_len: usize,
        weights: Vec<f32>,
        bias: Vec<f32>,
    ) -> Result<Self, ModelError> {
        if weights.len() != input_len * output_len || bias.len() != output_len {
            return Err(ModelError::Load(format!(
                "dense layer parameter count mismatch for {}x{}",
                output_len, input_len
            )));
        }
        Ok(Self {
            input_len,
            output_len,
            weights,
            bias,
            weight_grads: vec![0.0; input_len * output_len],
            bias_grads: vec![0.0; output_len],
            backend: Backend::Cpu,
        })
    }

    pub(crate) fn weights(&self) -> &[f32] {
        &self.weights
    }

    pub(crate) fn bias(&self) -> &[f32] {
        &self.bias
    }
}

impl LogitNet for LinearNet {
    fn input_len(&self) -> usize {
        self.input_len
    }

    fn output_len(&self) -> usize {
        self.output_len
    }

    fn backend(&self) -> Backend {
        self.backend
    }

    fn forward(&self, input: &[f32]) -> Vec<f32> {
        debug_assert_eq!(input.len(), self.input_len);
        let mut output = self.bias.clone();
        for (o, out) in output.iter_mut().enumerate() {
            let row = &self.weights[o * self.input_len..(o + 1) * self.input_len];
            for (weight, x) in row.iter().zip(input) {
                *out += weight * x;
            }
        }
        output
    }

    fn swap(&self) -> Self {
        let mut swapped = self.clone();
        swapped.backend = self.backend.other();
        swapped
    }
}

impl TrainableNet for LinearNet {
    fn zero_grads(&mut self) {
        self.weight_grads.iter_mut().for_each(|g| *g = 0.0);
        self.bias_grads.iter_mut().for_each(|g| *g = 0.0);
    }

    fn backward(&mut self, input: &[f32], grad_output: &[f32]) {
        debug_assert_eq!(input.len(), self.input_len);
        debug_assert_eq!(grad_output.len(), self.output_len);
        for (o, &grad) in grad_output.iter().enumerate() {
            let row = &mut self.weight_grads[o * self.input_len..(o + 1) * self.input_len];
            for (weight_grad, x) in row.iter_mut().zip(input) {
                *weight_grad += grad * x;
            }
            self.bias_grads[o] += grad;
        }
    }

    fn visit_params(&mut self, visit: &mut dyn FnMut(&mut [f32], &mut [f32], bool)) {
        visit(&mut self.weights, &mut self.weight_grads, true);
        visit(&mut self.bias, &mut self.bias_grads, false);
    }

    fn regularizable_norm(&self) -> f32 {
        self.weights.iter().map(|w| w * w).sum()
    }
}

/// Softmax over `logits` restricted to `legal`, expanded to `policy_len`.
///
/// Falls back to the uniform distribution over `legal` when the masked mass
/// vanishes or degenerates.
pub(crate) fn masked_softmax(logits: &[f32], legal: &[usize], policy_len: usize) -> Vec<f32> {
    let mut max_logit = f32::NEG_INFINITY;
    for &action in legal {
        if logits[action] > max_logit {
            max_logit = logits[action];
        }
    }
    if !max_logit.is_finite() {
        return uniform_policy(policy_len, legal);
    }

    let mut policy = vec![0.0; policy_len];
    let mut sum = 0.0;
    for &action in legal {
        let mass = (logits[action] - max_logit).exp();
        policy[action] = mass;
        sum += mass;
    }

    if sum <= 0.0 || !sum.is_finite() {
        return uniform_policy(policy_len, legal);
    }
    for p in &mut policy {
        *p /= sum;
    }
    policy
}

/// The head layer over a logit net: `tanh` on the value logit, legal-masked
/// softmax on the policy logits, feature outputs passed through.
///
/// The net must emit `1 + POLICY_LEN + Σ feature.len` raw outputs for inputs
/// of the game's flattened representation size; both are checked at
/// construction.
#[derive(Debug, Clone)]
pub struct BaseModel<G: Game, N: LogitNet> {
    net: N,
    features: Vec<FeatureDescriptor>,
    _game: PhantomData<fn() -> G>,
}

impl<G: Game, N: LogitNet> BaseModel<G, N> {
    pub fn new(net: N) -> Result<Self, ModelError> {
        Self::with_features(net, Vec::new())
    }

    pub fn with_features(
        net: N,
        features: Vec<FeatureDescriptor>,
    ) -> Result<Self, ModelError> {
        let (h, w, c) = G::SHAPE;
        let expected_input = h * w * c;
        if net.input_len() != expected_input {
            return Err(ModelError::ShapeMismatch {
                expected: expected_input,
                actual: net.input_len(),
            });
        }

        let feature_len: usize = features.iter().map(|f| f.len).sum();
        let expected_output = 1 + G::POLICY_LEN + feature_len;
        if net.output_len() != expected_output {
            return Err(ModelError::ShapeMismatch {
                expected: expected_output,
                actual: net.output_len(),
            });
        }

        Ok(Self {
            net,
            features,
            _game: PhantomData,
        })
    }

    #[inline]
    pub fn net(&self) -> &N {
        &self.net
    }

    #[inline]
    pub fn net_mut(&mut self) -> &mut N {
        &mut self.net
    }

    pub fn into_net(self) -> N {
        self.net
    }

    /// An equivalent model on the other backend.
    pub fn swap(&self) -> Self {
        Self {
            net: self.net.swap(),
            features: self.features.clone(),
            _game: PhantomData,
        }
    }

    /// A deep copy with independent parameters.
    pub fn duplicate(&self) -> Self
    where
        N: Clone,
    {
        self.clone()
    }

    fn heads(&self, game: &G, raw: Vec<f32>) -> Evaluation {
        let value = raw[0].tanh();
        let policy = masked_softmax(
            &raw[1..1 + G::POLICY_LEN],
            &game.legal_actions(),
            G::POLICY_LEN,
        );
        let features = raw[1 + G::POLICY_LEN..].to_vec();
        Evaluation {
            value,
            policy,
            features,
        }
    }
}

impl<G: Game, N: LogitNet> Model<G> for BaseModel<G, N> {
    fn evaluate(&self, game: &G) -> Result<Evaluation, ModelError> {
        if game.status().is_over() {
            return Err(GameError::GameOver.into());
        }

        let input = game.representation();
        if input.len() != self.net.input_len() {
            return Err(ModelError::ShapeMismatch {
                expected: self.net.input_len(),
                actual: input.len(),
            });
        }

        let raw = self.net.forward(&input);
        Ok(self.heads(game, raw))
    }

    fn evaluate_batch(&self, games: &[G]) -> Result<Vec<Evaluation>, ModelError> {
        let mut inputs = Vec::with_capacity(games.len());
        for game in games {
            if game.status().is_over() {
                return Err(GameError::GameOver.into());
            }
            let input = game.representation();
            if input.len() != self.net.input_len() {
                return Err(ModelError::ShapeMismatch {
                    expected: self.net.input_len(),
                    actual: input.len(),
                });
            }
            inputs.push(input);
        }

        let raw = self.net.forward_batch(&inputs);
        Ok(games
            .iter()
            .zip(raw)
            .map(|(game, logits)| self.heads(game, logits))
            .collect())
    }

    fn features(&self) -> Vec<FeatureDescriptor> {
        self.features.clone()
    }

    fn backend(&self) -> Backend {
        self.net.backend()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use games_tictactoe::TicTacToe;
    use rand::SeedableRng;

    fn test_net(seed: u64) -> LinearNet {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        LinearNet::new(9, 10, &mut rng)
    }

    #[test]
    fn linear_forward_is_an_affine_map() {
        let mut net = LinearNet::zeroed(2, 2);
        net.weights = vec![1.0, 2.0, 3.0, 4.0];
        net.bias = vec![0.5, -0.5];

        let output = net.forward(&[1.0, -1.0]);
        assert_eq!(output, vec![1.0 - 2.0 + 0.5, 3.0 - 4.0 - 0.5]);
    }

    #[test]
    fn linear_backward_accumulates_outer_products() {
        let mut net = LinearNet::zeroed(2, 2);
        net.backward(&[1.0, 2.0], &[1.0, -1.0]);
        net.backward(&[1.0, 2.0], &[1.0, -1.0]);

        assert_eq!(net.weight_grads, vec![2.0, 4.0, -2.0, -4.0]);
        assert_eq!(net.bias_grads, vec![2.0, -2.0]);

        net.zero_grads();
        assert!(net.weight_grads.iter().all(|&g| g == 0.0));
        assert!(net.bias_grads.iter().all(|&g| g == 0.0));
    }

    #[test]
    fn masked_softmax_normalizes_over_the_mask() {
        let logits = vec![1.0, 2.0, 3.0, 4.0];
        let policy = masked_softmax(&logits, &[0, 2], 4);

        let sum: f32 = policy.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert_eq!(policy[1], 0.0);
        assert_eq!(policy[3], 0.0);
        assert!(policy[2] > policy[0]);
    }

    #[test]
    fn masked_softmax_degenerate_logits_fall_back_to_uniform() {
        let logits = vec![f32::NEG_INFINITY; 3];
        let policy = masked_softmax(&logits, &[0, 1, 2], 3);
        for &p in &policy {
            assert!((p - 1.0 / 3.0).abs() < 1e-6);
        }
    }

    #[test]
    fn base_model_checks_shapes_at_construction() {
        // Wrong input size for a 3×3×1 game.
        let net = LinearNet::zeroed(4, 10);
        assert!(matches!(
            BaseModel::<TicTacToe, _>::new(net),
            Err(ModelError::ShapeMismatch {
                expected: 9,
                actual: 4
            })
        ));

        // Wrong output size: needs 1 + 9 logits.
        let net = LinearNet::zeroed(9, 9);
        assert!(matches!(
            BaseModel::<TicTacToe, _>::new(net),
            Err(ModelError::ShapeMismatch {
                expected: 10,
                actual: 9
            })
        ));
    }

    #[test]
    fn base_model_outputs_are_well_formed() {
        let model = BaseModel::<TicTacToe, _>::new(test_net(1)).unwrap();
        let game = TicTacToe::with_moves(&[0, 4]).unwrap();

        let eval = model.evaluate(&game).unwrap();
        assert!((-1.0..=1.0).contains(&eval.value));
        assert_eq!(eval.policy.len(), 9);
        assert_eq!(eval.policy[0], 0.0);
        assert_eq!(eval.policy[4], 0.0);
        let sum: f32 = eval.policy.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(eval.features.is_empty());
    }

    #[test]
    fn base_model_batch_matches_single_calls() {
        let model = BaseModel::<TicTacToe, _>::new(test_net(2)).unwrap();
        let games = vec![
            TicTacToe::new(),
            TicTacToe::with_moves(&[4]).unwrap(),
            TicTacToe::with_moves(&[4, 0]).unwrap(),
        ];

        let batched = model.evaluate_batch(&games).unwrap();
        for (game, eval) in games.iter().zip(&batched) {
            assert_eq!(eval, &model.evaluate(game).unwrap());
        }
    }

    #[test]
    fn feature_heads_extend_the_expected_output_len() {
        let features = vec![FeatureDescriptor {
            name: "occupancy",
            len: 2,
            weight: 0.5,
        }];

        // 1 value + 9 policy + 2 feature outputs.
        let net = LinearNet::zeroed(9, 12);
        let model = BaseModel::<TicTacToe, _>::with_features(net, features).unwrap();

        let eval = model.evaluate(&TicTacToe::new()).unwrap();
        assert_eq!(eval.features.len(), 2);
        assert_eq!(model.features().len(), 1);
    }

    #[test]
    fn duplicate_is_observationally_equivalent() {
        let model = BaseModel::<TicTacToe, _>::new(test_net(3)).unwrap();
        let copy = model.duplicate();
        let game = TicTacToe::with_moves(&[2, 6]).unwrap();

        assert_eq!(model.evaluate(&game).unwrap(), copy.evaluate(&game).unwrap());
    }

    #[test]
    fn double_swap_round_trips() {
        let model = BaseModel::<TicTacToe, _>::new(test_net(4)).unwrap();
        assert_eq!(model.backend(), Backend::Cpu);

        let swapped = model.swap();
        assert_eq!(swapped.backend(), Backend::Gpu);

        let back = swapped.swap();
        assert_eq!(back.backend(), Backend::Cpu);

        let game = TicTacToe::new();
        assert_eq!(model.evaluate(&game).unwrap(), back.evaluate(&game).unwrap());
    }
}
