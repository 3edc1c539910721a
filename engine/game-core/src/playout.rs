//! Uniformly random play, used by rollout models and baseline agents.

use rand::Rng;
use rand_chacha::ChaCha20Rng;

use crate::game::{Game, GameError, Status};

/// Play one uniformly random legal action and return it.
///
/// Fails with [`GameError::GameOver`] when the game is already finished.
pub fn random_turn<G: Game>(game: &mut G, rng: &mut ChaCha20Rng) -> Result<usize, GameError> {
    if game.status().is_over() {
        return Err(GameError::GameOver);
    }

    let legal = game.legal_actions();
    let action = legal[rng.gen_range(0..legal.len())];
    game.apply(action)?;
    Ok(action)
}

/// Play uniformly random legal actions on a scratch copy of `game` until it
/// finishes, and return the terminal status.
///
/// Terminates because games are finite. The input position is not modified.
pub fn random_playout<G: Game>(game: &G, rng: &mut ChaCha20Rng) -> Result<Status, GameError> {
    let mut scratch = game.clone();
    while !scratch.status().is_over() {
        random_turn(&mut scratch, rng)?;
    }
    Ok(scratch.status())
}
