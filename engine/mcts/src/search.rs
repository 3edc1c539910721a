//! The search loop: selection, expansion, evaluation, backup.

use std::time::Instant;

use game_core::{Game, GameError};
use model::{Evaluation, Model, ModelError};
use thiserror::Error;
use tracing::trace;

use crate::config::SearchConfig;
use crate::node::NodeId;
use crate::tree::Tree;

/// Errors that abort a search.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("cannot search a finished game")]
    GameOver,

    #[error("invalid search configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Game(#[from] GameError),
}

/// Result of a finished search.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    /// Improved policy over all actions, zeros on illegal indices. Sums to
    /// one.
    pub policy: Vec<f32>,

    /// Mean value at the root, from the root's side-to-move perspective.
    pub value: f32,

    /// Simulations actually completed. Equals `power` unless a deadline
    /// cut the search short, and stays zero on the single-action fast
    /// path.
    pub simulations: u32,

    /// Nodes allocated by the search.
    pub nodes: usize,
}

/// One tree search from a root position.
///
/// The tree is owned by the search and dropped with it; the model is only
/// borrowed for leaf evaluations. A model failure aborts the whole search.
pub struct Search<'a, G: Game, M: Model<G>> {
    tree: Tree<G>,
    model: &'a M,
    config: SearchConfig,
}

impl<'a, G: Game, M: Model<G>> Search<'a, G, M> {
    pub fn new(game: &G, model: &'a M, config: SearchConfig) -> Result<Self, SearchError> {
        config.validate().map_err(SearchError::Config)?;
        if game.status().is_over() {
            return Err(SearchError::GameOver);
        }

        Ok(Self {
            tree: Tree::new(game.clone()),
            model,
            config,
        })
    }

    /// Run the configured number of simulations and extract the improved
    /// policy.
    pub fn run(&mut self) -> Result<SearchOutcome, SearchError> {
        let root = self.tree.root();
        let legal = self.tree.get(root).game.legal_actions();

        // A single legal action needs no search.
        if let [only] = legal.as_slice() {
            let mut policy = vec![0.0; G::POLICY_LEN];
            policy[*only] = 1.0;
            return Ok(SearchOutcome {
                policy,
                value: 0.0,
                simulations: 0,
                nodes: self.tree.len(),
            });
        }

        // Root expansion is the first evaluation; its backup makes the
        // root visit count exceed the child visit total by exactly one.
        let root_eval = self.model.evaluate(&self.tree.get(root).game)?;
        self.expand(root, &root_eval)?;
        self.dilute_root();
        self.tree.backpropagate(root, root_eval.value);

        let deadline = self.config.deadline.map(|limit| Instant::now() + limit);
        let ntasks = self.model.ntasks().max(1) as u32;
        let mut completed = 0u32;

        while completed < self.config.power {
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    trace!(completed, "deadline reached, ending search early");
                    break;
                }
            }

            // Collect up to `ntasks` leaves; pending paths hold a virtual
            // loss so the traversals spread out.
            let wave = ntasks.min(self.config.power - completed);
            let mut pending: Vec<(NodeId, Vec<NodeId>)> = Vec::with_capacity(wave as usize);

            for _ in 0..wave {
                let path = self.select_path();
                let leaf = *path.last().expect("path contains at least the root");

                if self.tree.get(leaf).terminal {
                    let value = self.tree.get(leaf).terminal_value;
                    self.tree.revert_virtual(&path[1..]);
                    self.tree.backpropagate(leaf, value);
                    completed += 1;
                } else {
                    pending.push((leaf, path));
                }
            }

            if pending.is_empty() {
                continue;
            }

            let games: Vec<G> = pending
                .iter()
                .map(|&(leaf, _)| self.tree.get(leaf).game.clone())
                .collect();
            let evals = self.model.evaluate_batch(&games)?;

            for ((leaf, path), eval) in pending.into_iter().zip(evals) {
                self.tree.revert_virtual(&path[1..]);
                // Two traversals of one wave can land on the same leaf; the
                // second finds it expanded and only contributes its backup.
                if !self.tree.get(leaf).is_expanded() {
                    self.expand(leaf, &eval)?;
                }
                self.tree.backpropagate(leaf, eval.value);
                completed += 1;
            }
        }

        let stats = self.tree.stats();
        trace!(
            simulations = completed,
            nodes = stats.total_nodes,
            depth = stats.max_depth,
            value = stats.root_value,
            "search finished"
        );

        Ok(SearchOutcome {
            policy: self
                .tree
                .improved_policy(G::POLICY_LEN, self.config.temperature),
            value: self.tree.get(root).mean_value(),
            simulations: completed,
            nodes: self.tree.len(),
        })
    }

    /// Descend from the root to a leaf, taking a virtual loss on every
    /// traversed edge.
    fn select_path(&mut self) -> Vec<NodeId> {
        let mut path = vec![self.tree.root()];
        let mut current = self.tree.root();

        loop {
            let node = self.tree.get(current);
            if node.terminal || !node.is_expanded() {
                break;
            }
            match self.tree.select_child(current, self.config.exploration) {
                Some(child) => {
                    path.push(child);
                    current = child;
                }
                None => break,
            }
        }

        self.tree.apply_virtual(&path[1..]);
        path
    }

    /// Expand a non-terminal leaf: mask the prior to the legal actions and
    /// allocate one child per legal action, stepping the game eagerly.
    fn expand(&mut self, id: NodeId, eval: &Evaluation) -> Result<(), SearchError> {
        if eval.policy.len() != G::POLICY_LEN {
            return Err(ModelError::ShapeMismatch {
                expected: G::POLICY_LEN,
                actual: eval.policy.len(),
            }
            .into());
        }

        let game = self.tree.get(id).game.clone();
        let legal = game.legal_actions();
        let mover = game.current_player();

        let legal_mass: f32 = legal.iter().map(|&a| eval.policy[a]).sum();
        let uniform = 1.0 / legal.len() as f32;

        for &action in &legal {
            let prior = if legal_mass > 0.0 {
                eval.policy[action] / legal_mass
            } else {
                uniform
            };

            let mut child_game = game.clone();
            child_game.apply(action)?;
            let status = child_game.status();

            // A terminal child is scored for the seat that would observe
            // it, the opponent of the mover; backup flips it for the
            // parent.
            let terminal_value = status.score_for(mover.opponent());
            self.tree.add_child(
                id,
                action,
                prior,
                child_game,
                status.is_over(),
                terminal_value,
            );
        }
        Ok(())
    }

    /// Mix the root prior toward the uniform distribution.
    fn dilute_root(&mut self) {
        let dilution = self.config.dilution;
        if dilution <= 0.0 {
            return;
        }

        let root = self.tree.root();
        let children: Vec<NodeId> = self
            .tree
            .get(root)
            .children
            .iter()
            .map(|&(_, id)| id)
            .collect();
        let uniform = 1.0 / children.len() as f32;

        for id in children {
            let child = self.tree.get_mut(id);
            child.prior = (1.0 - dilution) * child.prior + dilution * uniform;
        }
    }

    /// The finished tree, for inspection.
    pub fn tree(&self) -> &Tree<G> {
        &self.tree
    }
}

/// Convenience wrapper: build a [`Search`] and run it once.
pub fn run_search<G: Game, M: Model<G>>(
    game: &G,
    model: &M,
    config: SearchConfig,
) -> Result<SearchOutcome, SearchError> {
    Search::new(game, model, config)?.run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use games_tictactoe::TicTacToe;
    use model::{uniform_policy, DummyModel, RandomModel, RolloutModel};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// All policy mass on action 0; for dilution tests.
    struct SkewedModel;

    impl Model<TicTacToe> for SkewedModel {
        fn evaluate(&self, game: &TicTacToe) -> Result<Evaluation, ModelError> {
            let mut policy = vec![0.0; 9];
            let legal = game.legal_actions();
            policy[legal[0]] = 1.0;
            Ok(Evaluation {
                value: 0.0,
                policy,
                features: Vec::new(),
            })
        }
    }

    /// Uniform model that pretends to want four traversals in flight and
    /// records its batch sizes.
    struct WideModel {
        calls: AtomicU32,
        max_seen: AtomicU32,
    }

    impl WideModel {
        fn new() -> Self {
            Self {
                calls: AtomicU32::new(0),
                max_seen: AtomicU32::new(0),
            }
        }
    }

    impl Model<TicTacToe> for WideModel {
        fn evaluate(&self, game: &TicTacToe) -> Result<Evaluation, ModelError> {
            Ok(Evaluation {
                value: 0.0,
                policy: uniform_policy(9, &game.legal_actions()),
                features: Vec::new(),
            })
        }

        fn evaluate_batch(&self, games: &[TicTacToe]) -> Result<Vec<Evaluation>, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.max_seen
                .fetch_max(games.len() as u32, Ordering::SeqCst);
            games.iter().map(|game| self.evaluate(game)).collect()
        }

        fn ntasks(&self) -> usize {
            4
        }
    }

    fn assert_normalized(policy: &[f32], game: &TicTacToe) {
        let sum: f32 = policy.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5, "policy sums to {sum}");
        for (action, &mass) in policy.iter().enumerate() {
            if mass > 0.0 {
                assert!(game.is_legal(action), "mass on illegal action {action}");
            }
        }
    }

    #[test]
    fn fresh_board_search_is_well_formed() {
        let game = TicTacToe::new();
        let outcome = run_search(
            &game,
            &RandomModel::new(),
            SearchConfig::for_testing().with_temperature(1.0),
        )
        .unwrap();

        assert_normalized(&outcome.policy, &game);
        assert_eq!(outcome.simulations, 50);
        assert!(outcome.nodes > 9);
        assert!((-1.0..=1.0).contains(&outcome.value));
    }

    #[test]
    fn root_visits_exceed_child_visits_by_one() {
        let game = TicTacToe::new();
        let model = RandomModel::new();
        let mut search =
            Search::new(&game, &model, SearchConfig::for_testing().with_power(30)).unwrap();
        search.run().unwrap();

        let tree = search.tree();
        let root = tree.get(tree.root());
        let child_visits: u32 = root
            .children
            .iter()
            .map(|&(_, id)| tree.get(id).visits)
            .sum();
        assert_eq!(root.visits, child_visits + 1);
        assert_eq!(root.visits, 31);
    }

    #[test]
    fn finds_the_immediate_win() {
        // X X _ / O O _ / _ _ _ with X to move; cell 2 wins on the spot.
        let game = TicTacToe::with_moves(&[0, 3, 1, 4]).unwrap();
        let model = RolloutModel::with_seed(42);
        let outcome = run_search(&game, &model, SearchConfig::for_testing().with_power(50)).unwrap();

        let mut expected = vec![0.0; 9];
        expected[2] = 1.0;
        assert_eq!(outcome.policy, expected);
        assert!(outcome.value > 0.0, "a winning root should score positive");
    }

    #[test]
    fn forced_loss_still_yields_a_reproducible_choice() {
        // X at 0, 2, 4 with two open threats (6 and 8); any reply loses
        // within two plies.
        let game = TicTacToe::with_moves(&[0, 1, 2, 7, 4]).unwrap();
        let config = SearchConfig::for_testing().with_power(200);

        let outcome = run_search(&game, &RolloutModel::with_seed(9), config.clone()).unwrap();
        let repeat = run_search(&game, &RolloutModel::with_seed(9), config).unwrap();

        // Deterministic one-hot on the most visited action.
        assert_eq!(outcome.policy, repeat.policy);
        let chosen = outcome.policy.iter().position(|&p| p == 1.0).unwrap();
        assert!(game.is_legal(chosen));

        // The opponent converts either remaining threat and wins.
        let mut continuation = game.clone();
        continuation.apply(chosen).unwrap();
        let winning = continuation
            .legal_actions()
            .into_iter()
            .find(|&a| {
                let mut probe = continuation.clone();
                probe.apply(a).unwrap();
                probe.status().is_over()
            })
            .expect("the double threat leaves an immediate win");
        continuation.apply(winning).unwrap();
        assert_eq!(
            continuation.status().score_for(game.current_player()),
            -1.0
        );
    }

    #[test]
    fn power_one_visits_exactly_one_child() {
        let game = TicTacToe::new();
        let model = RandomModel::new();
        let mut search = Search::new(
            &game,
            &model,
            SearchConfig::for_testing().with_power(1).with_temperature(1.0),
        )
        .unwrap();
        let outcome = search.run().unwrap();

        assert_eq!(outcome.simulations, 1);
        // One-hot on the single visited child.
        assert_eq!(outcome.policy.iter().filter(|&&p| p > 0.0).count(), 1);

        let tree = search.tree();
        let visited: u32 = tree
            .get(tree.root())
            .children
            .iter()
            .map(|&(_, id)| tree.get(id).visits)
            .sum();
        assert_eq!(visited, 1);
    }

    #[test]
    fn vanishing_temperature_converges_to_argmax() {
        // The immediate win at cell 2 dominates the visit counts, so even
        // a small positive temperature leaves almost all mass there.
        let game = TicTacToe::with_moves(&[0, 3, 1, 4]).unwrap();
        let power = SearchConfig::for_testing().with_power(100);

        let greedy = run_search(
            &game,
            &RolloutModel::with_seed(3),
            power.clone().with_temperature(0.0),
        )
        .unwrap();
        let near_greedy = run_search(
            &game,
            &RolloutModel::with_seed(3),
            power.with_temperature(0.05),
        )
        .unwrap();

        let argmax = |policy: &[f32]| {
            policy
                .iter()
                .enumerate()
                .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap())
                .map(|(i, _)| i)
                .unwrap()
        };
        assert_eq!(argmax(&greedy.policy), argmax(&near_greedy.policy));
        assert!(near_greedy.policy[argmax(&near_greedy.policy)] > 0.95);
    }

    #[test]
    fn full_dilution_makes_the_root_prior_uniform() {
        let game = TicTacToe::new();
        let model = SkewedModel;
        let mut search = Search::new(
            &game,
            &model,
            SearchConfig::for_testing().with_power(10).with_dilution(1.0),
        )
        .unwrap();
        search.run().unwrap();

        let tree = search.tree();
        for &(_, id) in &tree.get(tree.root()).children {
            assert!((tree.get(id).prior - 1.0 / 9.0).abs() < 1e-6);
        }
    }

    #[test]
    fn skewed_prior_survives_without_dilution() {
        let game = TicTacToe::new();
        let model = SkewedModel;
        let mut search = Search::new(
            &game,
            &model,
            SearchConfig::for_testing().with_power(10).with_dilution(0.0),
        )
        .unwrap();
        search.run().unwrap();

        let tree = search.tree();
        let root = tree.get(tree.root());
        let (first_action, first_child) = root.children[0];
        assert_eq!(first_action, 0);
        assert!((tree.get(first_child).prior - 1.0).abs() < 1e-6);
    }

    #[test]
    fn single_legal_action_skips_the_search() {
        // Eight moves played, only cell 8 left.
        let game = TicTacToe::with_moves(&[0, 2, 5, 3, 6, 4, 1, 7]).unwrap();
        let outcome = run_search(&game, &RandomModel::new(), SearchConfig::for_testing()).unwrap();

        let mut expected = vec![0.0; 9];
        expected[8] = 1.0;
        assert_eq!(outcome.policy, expected);
        assert_eq!(outcome.simulations, 0);
    }

    #[test]
    fn terminal_root_is_an_error() {
        let game = TicTacToe::with_moves(&[0, 3, 1, 4, 2]).unwrap();
        assert!(matches!(
            run_search(&game, &RandomModel::new(), SearchConfig::for_testing()),
            Err(SearchError::GameOver)
        ));
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let game = TicTacToe::new();
        assert!(matches!(
            run_search(
                &game,
                &RandomModel::new(),
                SearchConfig::for_testing().with_power(0)
            ),
            Err(SearchError::Config(_))
        ));
    }

    #[test]
    fn expired_deadline_ends_the_search_early() {
        let game = TicTacToe::new();
        let config = SearchConfig::for_testing()
            .with_power(100_000)
            .with_temperature(1.0)
            .with_deadline(Duration::ZERO);

        let outcome = run_search(&game, &RandomModel::new(), config).unwrap();
        assert!(outcome.simulations < 100_000);
        assert_normalized(&outcome.policy, &game);
    }

    #[test]
    fn wide_models_get_batched_waves() {
        let game = TicTacToe::new();
        let model = WideModel::new();
        let outcome =
            run_search(&game, &model, SearchConfig::for_testing().with_power(40)).unwrap();

        assert_eq!(outcome.simulations, 40);
        assert_normalized(&outcome.policy, &game);

        // The search batched several traversals per model call.
        let calls = model.calls.load(Ordering::SeqCst);
        assert!(calls < 40, "expected coalesced evaluations, got {calls} calls");
        assert!(model.max_seen.load(Ordering::SeqCst) > 1);
    }

    #[test]
    fn dummy_model_search_is_deterministic() {
        let game = TicTacToe::with_moves(&[4, 0]).unwrap();
        let config = SearchConfig::for_testing().with_power(64).with_temperature(1.0);

        let first = run_search(&game, &DummyModel::new(0.25), config.clone()).unwrap();
        let second = run_search(&game, &DummyModel::new(0.25), config).unwrap();
        assert_eq!(first.policy, second.policy);
        assert_eq!(first.value, second.value);
    }
}
