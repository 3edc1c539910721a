//! Playing agents and the match driver.
//!
//! An [`Agent`] turns a position into a full-length action distribution
//! (`think`) and samples a concrete move from it (`decide`). The variants
//! range from uniformly random play over the raw model policy to the full
//! tree search, plus a terminal-driven human seat.

use std::fmt;
use std::io::BufRead;
use std::marker::PhantomData;

use anyhow::{anyhow, Context, Result};
use game_core::{Game, Player, Status};
use mcts::{run_search, SearchConfig};
use model::Model;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use tracing::debug;

/// An acting seat: produces a distribution over actions and picks moves.
pub trait Agent<G: Game> {
    /// Distribution over all actions of the game, masked to legal moves.
    fn think(&mut self, game: &G) -> Result<Vec<f32>>;

    /// The agent's random source, used by the default `decide`.
    fn rng(&mut self) -> &mut ChaCha20Rng;

    /// Sample a move from `think`'s distribution.
    fn decide(&mut self, game: &G) -> Result<usize> {
        let policy = self.think(game)?;
        sample_policy(&policy, self.rng())
    }
}

/// Sample an index from a distribution.
pub fn sample_policy(policy: &[f32], rng: &mut ChaCha20Rng) -> Result<usize> {
    let draw: f32 = rng.gen();
    let mut cumulative = 0.0;
    for (action, &mass) in policy.iter().enumerate() {
        cumulative += mass;
        if draw < cumulative {
            return Ok(action);
        }
    }

    // Rounding can leave the cumulative sum a hair short of one; fall back
    // to the last supported action.
    policy
        .iter()
        .rposition(|&mass| mass > 0.0)
        .ok_or_else(|| anyhow!("cannot sample from a distribution without support"))
}

/// Restrict a full-length policy to the legal actions and renormalize;
/// uniform over legal actions when no mass survives the mask.
pub fn mask_to_legal<G: Game>(policy: &[f32], game: &G) -> Vec<f32> {
    let legal = game.legal_actions();
    let mut masked = vec![0.0; policy.len()];
    let mut mass = 0.0;
    for &action in &legal {
        masked[action] = policy[action];
        mass += policy[action];
    }

    if mass > 0.0 {
        for value in &mut masked {
            *value /= mass;
        }
    } else if !legal.is_empty() {
        let uniform = 1.0 / legal.len() as f32;
        for &action in &legal {
            masked[action] = uniform;
        }
    }
    masked
}

/// Cool a distribution: `p^(1/temperature)` renormalized, argmax one-hot at
/// zero temperature (ties to the lowest index).
pub fn cool_policy(policy: &[f32], temperature: f32) -> Vec<f32> {
    if temperature < 1e-6 {
        let mut cooled = vec![0.0; policy.len()];
        let mut best: Option<(usize, f32)> = None;
        for (action, &mass) in policy.iter().enumerate() {
            match best {
                Some((_, best_mass)) if mass <= best_mass => {}
                _ => best = Some((action, mass)),
            }
        }
        if let Some((action, _)) = best {
            cooled[action] = 1.0;
        }
        return cooled;
    }

    let mut cooled: Vec<f32> = policy
        .iter()
        .map(|&mass| if mass > 0.0 { mass.powf(1.0 / temperature) } else { 0.0 })
        .collect();
    let total: f32 = cooled.iter().sum();
    if total > 0.0 {
        for value in &mut cooled {
            *value /= total;
        }
    }
    cooled
}

/// Uniformly random legal moves.
#[derive(Debug)]
pub struct RandomAgent {
    rng: ChaCha20Rng,
}

impl RandomAgent {
    pub fn new() -> Self {
        Self {
            rng: ChaCha20Rng::from_entropy(),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: ChaCha20Rng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl<G: Game> Agent<G> for RandomAgent {
    fn think(&mut self, game: &G) -> Result<Vec<f32>> {
        if game.status().is_over() {
            return Err(anyhow!("cannot act on a finished game"));
        }
        Ok(model::uniform_policy(G::POLICY_LEN, &game.legal_actions()))
    }

    fn rng(&mut self) -> &mut ChaCha20Rng {
        &mut self.rng
    }
}

/// The model policy without any lookahead, cooled by a temperature.
pub struct IntuitionAgent<G: Game, M: Model<G>> {
    model: M,
    temperature: f32,
    rng: ChaCha20Rng,
    _game: PhantomData<fn() -> G>,
}

impl<G: Game, M: Model<G>> IntuitionAgent<G, M> {
    pub fn with_seed(model: M, temperature: f32, seed: u64) -> Self {
        Self {
            model,
            temperature,
            rng: ChaCha20Rng::seed_from_u64(seed),
            _game: PhantomData,
        }
    }
}

impl<G: Game, M: Model<G>> Agent<G> for IntuitionAgent<G, M> {
    fn think(&mut self, game: &G) -> Result<Vec<f32>> {
        let eval = self.model.evaluate(game)?;
        Ok(cool_policy(&mask_to_legal(&eval.policy, game), self.temperature))
    }

    fn rng(&mut self) -> &mut ChaCha20Rng {
        &mut self.rng
    }
}

/// Full tree search per move.
pub struct MctsAgent<G: Game, M: Model<G>> {
    model: M,
    config: SearchConfig,
    rng: ChaCha20Rng,
    _game: PhantomData<fn() -> G>,
}

impl<G: Game, M: Model<G>> MctsAgent<G, M> {
    pub fn with_seed(model: M, config: SearchConfig, seed: u64) -> Self {
        Self {
            model,
            config,
            rng: ChaCha20Rng::seed_from_u64(seed),
            _game: PhantomData,
        }
    }
}

impl<G: Game, M: Model<G>> Agent<G> for MctsAgent<G, M> {
    fn think(&mut self, game: &G) -> Result<Vec<f32>> {
        let outcome = run_search(game, &self.model, self.config.clone())?;
        debug!(
            value = outcome.value,
            simulations = outcome.simulations,
            nodes = outcome.nodes,
            "search complete"
        );
        Ok(outcome.policy)
    }

    fn rng(&mut self) -> &mut ChaCha20Rng {
        &mut self.rng
    }
}

/// A human on the terminal: prints the position, reads an action index,
/// and re-prompts on anything unparseable or illegal.
pub struct HumanAgent<R: BufRead> {
    input: R,
    rng: ChaCha20Rng,
}

impl<R: BufRead> HumanAgent<R> {
    pub fn new(input: R) -> Self {
        Self {
            input,
            rng: ChaCha20Rng::from_entropy(),
        }
    }
}

impl<G: Game + fmt::Display, R: BufRead> Agent<G> for HumanAgent<R> {
    fn think(&mut self, game: &G) -> Result<Vec<f32>> {
        println!("{game}");
        loop {
            println!("enter an action index for {}:", game.current_player());

            let mut line = String::new();
            let read = self
                .input
                .read_line(&mut line)
                .context("failed to read input")?;
            if read == 0 {
                return Err(anyhow!("input closed before an action was chosen"));
            }

            match line.trim().parse::<usize>() {
                Ok(action) if game.is_legal(action) => {
                    let mut policy = vec![0.0; G::POLICY_LEN];
                    policy[action] = 1.0;
                    return Ok(policy);
                }
                Ok(action) => println!("action {action} is not legal here"),
                Err(_) => println!("could not parse '{}' as an action index", line.trim()),
            }
        }
    }

    fn rng(&mut self) -> &mut ChaCha20Rng {
        &mut self.rng
    }
}

/// Drive a match between two agents on a clone of `template`, invoking
/// `on_move` after every move. Returns the terminal status; the first
/// agent holds seat one.
pub fn play_match<G, A, B>(
    first: &mut A,
    second: &mut B,
    template: &G,
    mut on_move: impl FnMut(&G, usize),
) -> Result<Status>
where
    G: Game,
    A: Agent<G> + ?Sized,
    B: Agent<G> + ?Sized,
{
    let mut game = template.clone();
    while !game.status().is_over() {
        let action = match game.current_player() {
            Player::One => first.decide(&game)?,
            Player::Two => second.decide(&game)?,
        };
        game.apply(action)?;
        on_move(&game, action);
    }
    Ok(game.status())
}
