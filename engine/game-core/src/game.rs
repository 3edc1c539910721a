//! The `Game` trait and the seat/outcome types shared by every game.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use thiserror::Error;

/// Errors raised by game-progress operations.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum GameError {
    #[error("illegal action {action}")]
    IllegalAction { action: usize },

    #[error("the game is already over")]
    GameOver,
}

/// One of the two seats. `One` always moves first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Player {
    One,
    Two,
}

impl Player {
    /// Numeric sign of this seat: `+1.0` for `One`, `-1.0` for `Two`.
    ///
    /// Values, rewards, and board representations are always expressed
    /// relative to a seat via this sign.
    #[inline]
    pub fn sign(self) -> f32 {
        match self {
            Player::One => 1.0,
            Player::Two => -1.0,
        }
    }

    /// The other seat.
    #[inline]
    pub fn opponent(self) -> Self {
        match self {
            Player::One => Player::Two,
            Player::Two => Player::One,
        }
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Player::One => write!(f, "player one"),
            Player::Two => write!(f, "player two"),
        }
    }
}

/// Outcome of a game position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// The game continues; at least one legal action exists.
    Undecided,
    /// Finished without a winner.
    Draw,
    /// Finished with the given seat winning.
    Won(Player),
}

impl Status {
    #[inline]
    pub fn is_over(self) -> bool {
        !matches!(self, Status::Undecided)
    }

    /// Score of this outcome as seen by `player`: `+1.0` for a win, `-1.0`
    /// for a loss, `0.0` for a draw or an unfinished game.
    #[inline]
    pub fn score_for(self, player: Player) -> f32 {
        match self {
            Status::Undecided | Status::Draw => 0.0,
            Status::Won(winner) => {
                if winner == player {
                    1.0
                } else {
                    -1.0
                }
            }
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Undecided => write!(f, "undecided"),
            Status::Draw => write!(f, "draw"),
            Status::Won(player) => write!(f, "won by {}", player),
        }
    }
}

/// Contract for a two-player, perfect-information, finite, deterministic
/// board game.
///
/// A game value is a position. It is cheap to clone, hashable (the hash is
/// used as a cache key), and only ever mutated through [`Game::apply`].
///
/// # Invariants
///
/// * `status() == Undecided` if and only if `legal_actions()` is non-empty,
///   and `apply` succeeds for every listed action.
/// * `apply` fails with [`GameError::GameOver`] on a finished game and with
///   [`GameError::IllegalAction`] for an action outside `legal_actions()`.
/// * `representation()` has length `H * W * C` per [`Game::SHAPE`] and is
///   encoded from the perspective of the side to move, so the same encoding
///   scheme serves both seats.
pub trait Game:
    Clone + PartialEq + Eq + Hash + fmt::Debug + Send + Sync + 'static
{
    /// Short identifier for this game type, e.g. `"tictactoe"`. Used as the
    /// tag in model snapshots and recorded data sets.
    const NAME: &'static str;

    /// Number of distinct actions. Policies over this game have exactly this
    /// length; `legal_actions` is always a subset of `0..POLICY_LEN`.
    const POLICY_LEN: usize;

    /// Shape `(height, width, channels)` of the representation tensor.
    const SHAPE: (usize, usize, usize);

    fn status(&self) -> Status;

    /// The seat to move. Only meaningful while `status()` is `Undecided`.
    fn current_player(&self) -> Player;

    /// Legal action indices in ascending order. Empty exactly when the game
    /// is over.
    fn legal_actions(&self) -> Vec<usize>;

    fn is_legal(&self, action: usize) -> bool {
        self.legal_actions().contains(&action)
    }

    /// Play `action`, advancing the turn.
    fn apply(&mut self, action: usize) -> Result<(), GameError>;

    /// Flat representation tensor of length `H * W * C`, encoded from the
    /// current player's perspective.
    fn representation(&self) -> Vec<f32>;

    /// Symmetry-equivalent `(position, policy)` pairs, identity included.
    ///
    /// All returned pairs share the same value. Games without symmetries
    /// keep this default.
    fn augment(&self, policy: &[f32]) -> Vec<(Self, Vec<f32>)> {
        vec![(self.clone(), policy.to_vec())]
    }
}

/// Hash of a position, stable within one process run.
///
/// This is the key the caching model wrapper memoizes evaluations under.
pub fn state_key<G: Game>(game: &G) -> u64 {
    let mut hasher = DefaultHasher::new();
    game.hash(&mut hasher);
    hasher.finish()
}
