//! Composite loss and the optimizer step that closes the learning loop.
//!
//! For a minibatch the loss is
//!
//! ```text
//! L = MSE(v, z) + CE(p, π) + Σ_f w_f · MSE_f + λ · ‖θ‖²
//! ```
//!
//! with the mean squared error of the value head against the recorded
//! outcome, the cross entropy of the policy head against the improved
//! policy, one weighted squared-error term per feature head, and L2
//! regularization over the parameters flagged as regularizable. Head
//! gradients are formed analytically (`tanh` and softmax have closed-form
//! Jacobians against these losses); everything below the raw logits is the
//! net's own business via [`TrainableNet::backward`].

use game_core::Game;

use crate::dataset::Sample;
use crate::error::ModelError;
use crate::model::Model;
use crate::net::{BaseModel, TrainableNet};

const CE_EPSILON: f32 = 1e-9;

/// The loss components of one minibatch, already averaged over the batch.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LossBreakdown {
    pub value: f32,
    pub policy: f32,
    pub features: f32,
    pub regularization: f32,
}

impl LossBreakdown {
    pub fn total(&self) -> f32 {
        self.value + self.policy + self.features + self.regularization
    }
}

/// Applies one update from accumulated gradients to a parameter slice.
pub trait Optimizer {
    fn update(&mut self, params: &mut [f32], grads: &[f32]);
}

/// Plain stochastic gradient descent.
#[derive(Debug, Clone, Copy)]
pub struct Sgd {
    pub learning_rate: f32,
}

impl Sgd {
    pub fn new(learning_rate: f32) -> Self {
        Self { learning_rate }
    }
}

impl Optimizer for Sgd {
    fn update(&mut self, params: &mut [f32], grads: &[f32]) {
        for (param, grad) in params.iter_mut().zip(grads) {
            *param -= self.learning_rate * grad;
        }
    }
}

/// Mean squared error of a single value prediction.
#[inline]
pub fn value_mse(predicted: f32, target: f32) -> f32 {
    let diff = predicted - target;
    diff * diff
}

/// Cross entropy of a predicted distribution against a full-length target.
/// Zero target entries contribute zero.
pub fn policy_cross_entropy(predicted: &[f32], target: &[f32]) -> f32 {
    predicted
        .iter()
        .zip(target)
        .filter(|(_, &t)| t > 0.0)
        .map(|(&p, &t)| -t * (p + CE_EPSILON).ln())
        .sum()
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let mut out: Vec<f32> = logits.iter().map(|&l| (l - max).exp()).collect();
    let sum: f32 = out.iter().sum();
    for value in &mut out {
        *value /= sum;
    }
    out
}

/// Per-sample forward pass: loss components and, when requested, the loss
/// gradient with respect to the raw logits (already scaled by `1 / n`).
fn sample_pass<G: Game, N: TrainableNet>(
    model: &BaseModel<G, N>,
    sample: &Sample,
    scale: f32,
) -> Result<(LossBreakdown, Vec<f32>), ModelError> {
    let net = model.net();
    if sample.representation.len() != net.input_len() {
        return Err(ModelError::ShapeMismatch {
            expected: net.input_len(),
            actual: sample.representation.len(),
        });
    }

    let descriptors = model.features();
    let feature_len: usize = descriptors.iter().map(|f| f.len).sum();
    if sample.features.len() != feature_len {
        return Err(ModelError::ShapeMismatch {
            expected: feature_len,
            actual: sample.features.len(),
        });
    }
    if sample.policy.len() != G::POLICY_LEN {
        return Err(ModelError::ShapeMismatch {
            expected: G::POLICY_LEN,
            actual: sample.policy.len(),
        });
    }

    let raw = net.forward(&sample.representation);
    let mut grad = vec![0.0; raw.len()];
    let mut losses = LossBreakdown::default();

    // Value head: v = tanh(l₀), squared error against the outcome.
    let value = raw[0].tanh();
    losses.value = value_mse(value, sample.value) * scale;
    grad[0] = 2.0 * (value - sample.value) * (1.0 - value * value) * scale;

    // Policy head: softmax over the full policy logits; the gradient of the
    // cross entropy against the logits is `p - π`.
    let policy_logits = &raw[1..1 + G::POLICY_LEN];
    let predicted = softmax(policy_logits);
    losses.policy = policy_cross_entropy(&predicted, &sample.policy) * scale;
    for (a, slot) in grad[1..1 + G::POLICY_LEN].iter_mut().enumerate() {
        *slot = (predicted[a] - sample.policy[a]) * scale;
    }

    // Feature heads: weighted squared error, raw outputs, no activation.
    let mut offset = 0;
    for descriptor in &descriptors {
        let head = &raw[1 + G::POLICY_LEN + offset..1 + G::POLICY_LEN + offset + descriptor.len];
        let target = &sample.features[offset..offset + descriptor.len];
        for (j, (&predicted, &target)) in head.iter().zip(target).enumerate() {
            let diff = predicted - target;
            losses.features += descriptor.weight * diff * diff * scale;
            grad[1 + G::POLICY_LEN + offset + j] = descriptor.weight * 2.0 * diff * scale;
        }
        offset += descriptor.len;
    }

    Ok((losses, grad))
}

/// Compute the composite loss of `batch` without touching any gradients.
pub fn evaluate_loss<G: Game, N: TrainableNet>(
    model: &BaseModel<G, N>,
    batch: &[Sample],
    weight_decay: f32,
) -> Result<LossBreakdown, ModelError> {
    if batch.is_empty() {
        return Err(ModelError::Evaluation("empty minibatch".into()));
    }

    let scale = 1.0 / batch.len() as f32;
    let mut total = LossBreakdown::default();
    for sample in batch {
        let (losses, _) = sample_pass(model, sample, scale)?;
        total.value += losses.value;
        total.policy += losses.policy;
        total.features += losses.features;
    }
    total.regularization = weight_decay * model.net().regularizable_norm();
    Ok(total)
}

/// One training step: accumulate gradients over `batch`, add the
/// regularization term, and apply `optimizer` once to the net's parameters.
///
/// Returns the loss breakdown measured before the update.
pub fn train_step<G: Game, N: TrainableNet>(
    model: &mut BaseModel<G, N>,
    batch: &[Sample],
    weight_decay: f32,
    optimizer: &mut impl Optimizer,
) -> Result<LossBreakdown, ModelError> {
    if batch.is_empty() {
        return Err(ModelError::Evaluation("empty minibatch".into()));
    }

    let scale = 1.0 / batch.len() as f32;
    let mut total = LossBreakdown::default();

    model.net_mut().zero_grads();
    for sample in batch {
        let (losses, grad) = sample_pass(model, sample, scale)?;
        total.value += losses.value;
        total.policy += losses.policy;
        total.features += losses.features;
        model.net_mut().backward(&sample.representation, &grad);
    }
    total.regularization = weight_decay * model.net().regularizable_norm();

    model.net_mut().visit_params(&mut |params, grads, regularizable| {
        if regularizable && weight_decay > 0.0 {
            for (grad, param) in grads.iter_mut().zip(params.iter()) {
                *grad += 2.0 * weight_decay * param;
            }
        }
        optimizer.update(params, grads);
    });

    Ok(total)
}
