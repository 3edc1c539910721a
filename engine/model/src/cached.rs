//! A memoizing wrapper that caches evaluations by position hash.
//!
//! Transpositions make identical positions recur frequently during search;
//! caching the `(value, policy)` pair per position hash turns those repeats
//! into lookups. The cache is bounded with a simple admission rule: once
//! full, new entries are computed but not inserted. There is no eviction,
//! since an LRU policy would change observable hit rates.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use game_core::{state_key, Game};
use tracing::warn;

use crate::error::ModelError;
use crate::model::{Backend, Evaluation, Model};

/// Caching decorator over an inner model.
///
/// Only value and policy are cached; feature outputs are disabled through
/// this wrapper (`features()` reports none, and cached evaluations carry
/// empty features). Consumers that require feature outputs must not stack a
/// cache in between.
#[derive(Debug)]
pub struct CachedModel<G: Game, M: Model<G>> {
    inner: M,
    max_entries: usize,
    entries: Mutex<HashMap<u64, (f32, Vec<f32>)>>,
    hits: AtomicU64,
    misses: AtomicU64,
    _game: PhantomData<fn() -> G>,
}

impl<G: Game, M: Model<G>> CachedModel<G, M> {
    pub fn new(inner: M, max_entries: usize) -> Self {
        Self {
            inner,
            max_entries,
            entries: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            _game: PhantomData,
        }
    }

    #[inline]
    pub fn inner(&self) -> &M {
        &self.inner
    }

    pub fn into_inner(self) -> M {
        self.inner
    }

    /// Number of evaluations answered from the cache.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Number of evaluations delegated to the inner model.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .map(|entries| entries.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Backend migration is unsupported for the cache wrapper: the inner
    /// model's identity would change under the memoized entries. Warns and
    /// returns the wrapper unchanged.
    pub fn swap(self) -> Self {
        warn!("swap is not supported through a caching wrapper; returning it unchanged");
        self
    }
}

impl<G: Game, M: Model<G>> Model<G> for CachedModel<G, M> {
    fn evaluate(&self, game: &G) -> Result<Evaluation, ModelError> {
        let key = state_key(game);

        {
            let entries = self
                .entries
                .lock()
                .map_err(|_| ModelError::Evaluation("evaluation cache poisoned".into()))?;
            if let Some((value, policy)) = entries.get(&key) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Evaluation {
                    value: *value,
                    policy: policy.clone(),
                    features: Vec::new(),
                });
            }
        }

        let mut eval = self.inner.evaluate(game)?;
        eval.features.clear();
        self.misses.fetch_add(1, Ordering::Relaxed);

        let mut entries = self
            .entries
            .lock()
            .map_err(|_| ModelError::Evaluation("evaluation cache poisoned".into()))?;
        if entries.len() < self.max_entries {
            entries.insert(key, (eval.value, eval.policy.clone()));
        }

        Ok(eval)
    }

    // Batched calls largely defeat the cache but stay correct: delegate one
    // by one so every position still passes through the lookup.
    fn evaluate_batch(&self, games: &[G]) -> Result<Vec<Evaluation>, ModelError> {
        games.iter().map(|game| self.evaluate(game)).collect()
    }

    fn ntasks(&self) -> usize {
        self.inner.ntasks()
    }

    fn backend(&self) -> Backend {
        self.inner.backend()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::{DummyModel, RolloutModel};
    use games_tictactoe::TicTacToe;

    #[test]
    fn repeated_calls_hit_the_cache() {
        let cached = CachedModel::new(RolloutModel::with_seed(5), 64);
        let game = TicTacToe::new();

        let first = cached.evaluate(&game).unwrap();
        for _ in 0..999 {
            // Cached answers are bit-identical to the first one.
            assert_eq!(cached.evaluate(&game).unwrap(), first);
        }

        assert_eq!(cached.misses(), 1);
        assert_eq!(cached.hits(), 999);
        assert_eq!(cached.len(), 1);
    }

    #[test]
    fn distinct_positions_get_distinct_entries() {
        let cached = CachedModel::new(DummyModel::new(0.5), 64);

        cached.evaluate(&TicTacToe::new()).unwrap();
        cached
            .evaluate(&TicTacToe::with_moves(&[0]).unwrap())
            .unwrap();
        cached
            .evaluate(&TicTacToe::with_moves(&[1]).unwrap())
            .unwrap();

        assert_eq!(cached.len(), 3);
        assert_eq!(cached.misses(), 3);
        assert_eq!(cached.hits(), 0);
    }

    #[test]
    fn full_cache_computes_but_does_not_insert() {
        let cached = CachedModel::new(DummyModel::new(0.0), 1);

        cached.evaluate(&TicTacToe::new()).unwrap();
        assert_eq!(cached.len(), 1);

        // Second distinct position: computed, not admitted.
        let other = TicTacToe::with_moves(&[3]).unwrap();
        cached.evaluate(&other).unwrap();
        cached.evaluate(&other).unwrap();

        assert_eq!(cached.len(), 1);
        assert_eq!(cached.misses(), 3);
        assert_eq!(cached.hits(), 0);
    }

    #[test]
    fn features_are_disabled_through_the_cache() {
        let cached = CachedModel::new(DummyModel::new(0.0), 8);
        assert!(Model::<TicTacToe>::features(&cached).is_empty());

        let eval = cached.evaluate(&TicTacToe::new()).unwrap();
        assert!(eval.features.is_empty());
    }

    #[test]
    fn batched_calls_delegate_through_the_cache() {
        let cached = CachedModel::new(DummyModel::new(0.25), 64);
        let games = vec![TicTacToe::new(), TicTacToe::new(), TicTacToe::new()];

        let evals = cached.evaluate_batch(&games).unwrap();
        assert_eq!(evals.len(), 3);
        assert_eq!(cached.misses(), 1);
        assert_eq!(cached.hits(), 2);
    }

    #[test]
    fn swap_is_a_warning_no_op() {
        let cached = CachedModel::new(DummyModel::new(0.5), 4);
        cached.evaluate(&TicTacToe::new()).unwrap();

        let swapped = cached.swap();
        assert_eq!(swapped.len(), 1);
        assert_eq!(Model::<TicTacToe>::backend(&swapped), Backend::Cpu);
    }

    #[test]
    fn inner_errors_pass_through() {
        let cached = CachedModel::new(DummyModel::new(0.0), 4);
        let finished = TicTacToe::with_moves(&[0, 3, 1, 4, 2]).unwrap();
        assert!(cached.evaluate(&finished).is_err());
    }
}
