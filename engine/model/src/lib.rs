//! Position evaluation models for AlphaZero-style search and training.
//!
//! A [`Model`] maps a game position to a value estimate in `[-1, 1]`, a
//! policy distribution over all actions of the game, and optional auxiliary
//! feature outputs. The tree search consumes models through this trait; the
//! concrete implementations range from trivial baselines ([`RandomModel`],
//! [`RolloutModel`], [`DummyModel`]) over a trainable head stack
//! ([`BaseModel`] on top of a [`LogitNet`]) to decorating wrappers that add
//! memoization ([`CachedModel`]) or request coalescing ([`BatchedModel`])
//! while preserving the trait.
//!
//! The crate also owns the training side: recorded [`DataSet`]s, the
//! composite loss, and [`train_step`] which applies one optimizer update.

pub mod baseline;
pub mod batched;
pub mod cached;
pub mod dataset;
pub mod error;
pub mod model;
pub mod net;
pub mod snapshot;
pub mod training;

pub use baseline::{DummyModel, RandomModel, RolloutModel};
pub use batched::BatchedModel;
pub use cached::CachedModel;
pub use dataset::{DataSet, DataSetMeta, Sample};
pub use error::ModelError;
pub use model::{
    uniform_policy, Backend, Evaluation, FeatureDescriptor, FeatureExtractor, Model,
};
pub use net::{BaseModel, LinearNet, LogitNet, TrainableNet};
pub use snapshot::{LayerDescriptor, LayerKind, Snapshot};
pub use training::{train_step, LossBreakdown, Optimizer, Sgd};
