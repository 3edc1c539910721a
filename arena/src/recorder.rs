//! Self-play recording: search-driven games turned into training data.
//!
//! Every non-terminal position of a self-play game contributes one sample:
//! its representation, the improved policy the search produced there, and
//! the terminal outcome as seen from that position's side to move, which is
//! backfilled once the game ends. Each position is then amplified through the
//! game's symmetry set before it enters the data set.
//!
//! A game that fails mid-way (model failure, contract violation) is
//! discarded whole; recording continues with the next game and the failure
//! count is reported alongside the data.

use anyhow::{anyhow, Result};
use game_core::{Game, Status};
use mcts::{run_search, SearchConfig};
use model::{DataSet, FeatureExtractor, Model, ModelError, Sample};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use tracing::{debug, warn};

use crate::agents::sample_policy;

/// Outcome of a recording run.
#[derive(Debug)]
pub struct SelfPlayReport {
    pub dataset: DataSet,
    pub failed_games: u32,
}

/// Record `games` self-play games of `model` against itself, starting each
/// from a clone of `template`. `on_game` is invoked after every finished
/// (or discarded) game with the number of games processed so far.
pub fn record_selfplay<G, M>(
    model: &M,
    template: &G,
    games: u32,
    config: &SearchConfig,
    rng: &mut ChaCha20Rng,
    on_game: impl FnMut(u32),
) -> Result<SelfPlayReport>
where
    G: Game,
    M: Model<G>,
{
    record_selfplay_with(model, template, games, config, None, rng, on_game)
}

/// Like [`record_selfplay`], additionally storing feature targets computed
/// by `features` for every recorded position.
///
/// The extractor's heads must match the model's feature heads; a model
/// that exposes none (the caching wrapper strips them) cannot serve a
/// feature-recording run.
pub fn record_selfplay_with<G, M>(
    model: &M,
    template: &G,
    games: u32,
    config: &SearchConfig,
    features: Option<&dyn FeatureExtractor<G>>,
    rng: &mut ChaCha20Rng,
    mut on_game: impl FnMut(u32),
) -> Result<SelfPlayReport>
where
    G: Game,
    M: Model<G>,
{
    let feature_len = match features {
        Some(extractor) => {
            let heads = model.features();
            if heads.is_empty() {
                return Err(ModelError::FeatureUnsupported.into());
            }
            if heads != extractor.descriptors() {
                return Err(anyhow!(
                    "feature extractor does not match the model's feature heads"
                ));
            }
            heads.iter().map(|head| head.len).sum()
        }
        None => 0,
    };

    let mut dataset = DataSet::for_game::<G>(feature_len);
    let mut failed_games = 0;

    for index in 0..games {
        // Decorrelate games while keeping the run reproducible from the
        // caller's seed.
        let mut game_rng = ChaCha20Rng::seed_from_u64(rng.gen());

        match record_game(model, template, config, &mut game_rng) {
            Ok((positions, status)) => {
                debug!(game = index, moves = positions.len(), %status, "recorded self-play game");
                for (position, policy) in positions {
                    let value = status.score_for(position.current_player());
                    for (transformed, transformed_policy) in position.augment(&policy) {
                        // Targets are recomputed per symmetry variant; the
                        // extractor sees the transformed position.
                        let targets = features
                            .map(|extractor| extractor.targets(&transformed))
                            .unwrap_or_default();
                        dataset.push(Sample {
                            representation: transformed.representation(),
                            policy: transformed_policy,
                            value,
                            features: targets,
                        })?;
                    }
                }
            }
            Err(error) => {
                warn!(game = index, error = %error, "discarding failed self-play game");
                failed_games += 1;
            }
        }
        on_game(index + 1);
    }

    Ok(SelfPlayReport {
        dataset,
        failed_games,
    })
}

/// Play one game, returning the visited positions with their improved
/// policies and the terminal status.
fn record_game<G, M>(
    model: &M,
    template: &G,
    config: &SearchConfig,
    rng: &mut ChaCha20Rng,
) -> Result<(Vec<(G, Vec<f32>)>, Status)>
where
    G: Game,
    M: Model<G>,
{
    let mut game = template.clone();
    let mut positions = Vec::new();

    while !game.status().is_over() {
        let outcome = run_search(&game, model, config.clone())?;
        let action = sample_policy(&outcome.policy, rng)?;
        positions.push((game.clone(), outcome.policy));
        game.apply(action)?;
    }

    Ok((positions, game.status()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use games_tictactoe::TicTacToe;
    use model::{DummyModel, Evaluation, ModelError};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn config() -> SearchConfig {
        SearchConfig::for_testing().with_power(25).with_temperature(1.0)
    }

    fn record(
        games: u32,
        seed: u64,
    ) -> SelfPlayReport {
        let model = DummyModel::new(0.0);
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        record_selfplay(&model, &TicTacToe::new(), games, &config(), &mut rng, |_| {}).unwrap()
    }

    #[test]
    fn dataset_length_counts_moves_times_symmetries() {
        let report = record(5, 1);

        assert_eq!(report.failed_games, 0);
        // Eight symmetry variants per recorded position.
        assert_eq!(report.dataset.len() % 8, 0);
        let moves = report.dataset.len() / 8;
        // Five TicTacToe games take between 5 and 9 moves each.
        assert!((25..=45).contains(&moves), "recorded {moves} moves");
    }

    #[test]
    fn target_values_alternate_with_the_seat_to_move() {
        let report = record(1, 2);
        let samples = report.dataset.samples();
        assert!(!samples.is_empty());

        // The eight symmetry variants of one position share its value, and
        // consecutive positions see the fixed outcome from alternating
        // seats.
        let values: Vec<f32> = samples.chunks(8).map(|chunk| chunk[0].value).collect();
        for chunk in samples.chunks(8) {
            assert!(chunk.iter().all(|sample| sample.value == chunk[0].value));
        }

        let last = *values.last().unwrap();
        if last == 0.0 {
            assert!(values.iter().all(|&v| v == 0.0), "draws score every seat 0");
        } else {
            for (offset, &value) in values.iter().rev().enumerate() {
                let expected = if offset % 2 == 0 { last } else { -last };
                assert_eq!(value, expected);
            }
        }
    }

    #[test]
    fn recording_is_reproducible_under_a_fixed_seed() {
        let first = record(3, 7);
        let second = record(3, 7);

        assert_eq!(first.dataset.len(), second.dataset.len());
        assert_eq!(first.dataset.samples(), second.dataset.samples());
    }

    #[test]
    fn progress_callback_fires_per_game() {
        let model = DummyModel::new(0.0);
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let mut seen = Vec::new();
        record_selfplay(&model, &TicTacToe::new(), 4, &config(), &mut rng, |done| {
            seen.push(done)
        })
        .unwrap();
        assert_eq!(seen, vec![1, 2, 3, 4]);
    }

    /// Fails after a fixed number of evaluations.
    struct FlakyModel {
        budget: AtomicU32,
    }

    impl Model<TicTacToe> for FlakyModel {
        fn evaluate(&self, game: &TicTacToe) -> Result<Evaluation, ModelError> {
            if self.budget.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| {
                left.checked_sub(1)
            }) == Err(0)
            {
                return Err(ModelError::Evaluation("budget exhausted".into()));
            }
            Ok(Evaluation {
                value: 0.0,
                policy: model::uniform_policy(9, &game.legal_actions()),
                features: Vec::new(),
            })
        }
    }

    /// Fraction of occupied cells, a symmetry-invariant position property.
    struct Occupancy;

    impl model::FeatureExtractor<TicTacToe> for Occupancy {
        fn descriptors(&self) -> Vec<model::FeatureDescriptor> {
            vec![model::FeatureDescriptor {
                name: "occupancy",
                len: 1,
                weight: 0.5,
            }]
        }

        fn targets(&self, game: &TicTacToe) -> Vec<f32> {
            let occupied = (0..9).filter(|&cell| game.cell(cell) != 0).count();
            vec![occupied as f32 / 9.0]
        }
    }

    fn feature_model() -> model::BaseModel<TicTacToe, model::LinearNet> {
        // 1 value + 9 policy + 1 feature output.
        model::BaseModel::with_features(
            model::LinearNet::zeroed(9, 11),
            Occupancy.descriptors(),
        )
        .unwrap()
    }

    #[test]
    fn feature_targets_are_recorded_per_position() {
        let model = feature_model();
        let mut rng = ChaCha20Rng::seed_from_u64(5);

        let report = record_selfplay_with(
            &model,
            &TicTacToe::new(),
            1,
            &config(),
            Some(&Occupancy),
            &mut rng,
            |_| {},
        )
        .unwrap();

        assert_eq!(report.dataset.meta().feature_len, 1);
        for sample in report.dataset.samples() {
            let occupied = sample
                .representation
                .iter()
                .filter(|&&cell| cell != 0.0)
                .count();
            assert_eq!(sample.features, vec![occupied as f32 / 9.0]);
        }
    }

    #[test]
    fn feature_recording_through_a_cache_is_unsupported() {
        let cached = model::CachedModel::new(feature_model(), 64);
        let mut rng = ChaCha20Rng::seed_from_u64(6);

        let error = record_selfplay_with(
            &cached,
            &TicTacToe::new(),
            1,
            &config(),
            Some(&Occupancy),
            &mut rng,
            |_| {},
        )
        .unwrap_err();

        assert!(matches!(
            error.downcast_ref::<ModelError>(),
            Some(ModelError::FeatureUnsupported)
        ));
    }

    #[test]
    fn failed_games_are_discarded_and_counted() {
        // Enough budget for the first game, not for all three.
        let model = FlakyModel {
            budget: AtomicU32::new(250),
        };
        let mut rng = ChaCha20Rng::seed_from_u64(4);

        let report =
            record_selfplay(&model, &TicTacToe::new(), 3, &config(), &mut rng, |_| {}).unwrap();

        assert!(report.failed_games >= 1);
        assert!(report.failed_games < 3, "the first game had budget to finish");
        // Only complete games contribute samples.
        assert_eq!(report.dataset.len() % 8, 0);
        assert!(!report.dataset.is_empty());
    }
}
