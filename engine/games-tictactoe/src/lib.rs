//! TicTacToe, the minimal reference implementation of the `Game` trait.
//!
//! The board is a 3×3 grid; action `a` places the mover's piece on cell `a`
//! (row-major). The representation is a single signed 3×3 channel: `+1.0`
//! for the current player's pieces, `-1.0` for the opponent's, `0.0` for
//! empty cells. All eight dihedral symmetries are reported by `augment`.

use std::fmt;

use game_core::{dihedral_maps, Game, GameError, Player, Status};

/// Cell indices of the eight winning lines (rows, columns, diagonals).
const LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

/// A TicTacToe position.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TicTacToe {
    /// `+1` = player one, `-1` = player two, `0` = empty.
    cells: [i8; 9],
    current: Player,
    status: Status,
}

impl TicTacToe {
    pub fn new() -> Self {
        Self {
            cells: [0; 9],
            current: Player::One,
            status: Status::Undecided,
        }
    }

    /// Build a position by playing `moves` in order from the empty board.
    /// Convenient for tests and benchmarks.
    pub fn with_moves(moves: &[usize]) -> Result<Self, GameError> {
        let mut game = Self::new();
        for &action in moves {
            game.apply(action)?;
        }
        Ok(game)
    }

    /// Raw cell content: `+1` player one, `-1` player two, `0` empty.
    #[inline]
    pub fn cell(&self, index: usize) -> i8 {
        self.cells[index]
    }

    fn winner(cells: &[i8; 9]) -> Option<Player> {
        for line in &LINES {
            let [a, b, c] = *line;
            if cells[a] != 0 && cells[a] == cells[b] && cells[b] == cells[c] {
                return Some(if cells[a] > 0 { Player::One } else { Player::Two });
            }
        }
        None
    }

    fn from_parts(cells: [i8; 9], current: Player, status: Status) -> Self {
        Self {
            cells,
            current,
            status,
        }
    }
}

impl Default for TicTacToe {
    fn default() -> Self {
        Self::new()
    }
}

impl Game for TicTacToe {
    const NAME: &'static str = "tictactoe";
    const POLICY_LEN: usize = 9;
    const SHAPE: (usize, usize, usize) = (3, 3, 1);

    fn status(&self) -> Status {
        self.status
    }

    fn current_player(&self) -> Player {
        self.current
    }

    fn legal_actions(&self) -> Vec<usize> {
        if self.status.is_over() {
            return Vec::new();
        }
        (0..9).filter(|&a| self.cells[a] == 0).collect()
    }

    fn is_legal(&self, action: usize) -> bool {
        !self.status.is_over() && action < 9 && self.cells[action] == 0
    }

    fn apply(&mut self, action: usize) -> Result<(), GameError> {
        if self.status.is_over() {
            return Err(GameError::GameOver);
        }
        if !self.is_legal(action) {
            return Err(GameError::IllegalAction { action });
        }

        self.cells[action] = self.current.sign() as i8;

        if let Some(winner) = Self::winner(&self.cells) {
            self.status = Status::Won(winner);
        } else if self.cells.iter().all(|&c| c != 0) {
            self.status = Status::Draw;
        } else {
            self.current = self.current.opponent();
        }
        Ok(())
    }

    fn representation(&self) -> Vec<f32> {
        let sign = self.current.sign();
        self.cells.iter().map(|&c| c as f32 * sign).collect()
    }

    fn augment(&self, policy: &[f32]) -> Vec<(Self, Vec<f32>)> {
        dihedral_maps(3)
            .iter()
            .map(|map| {
                let cells: [i8; 9] = map
                    .apply(&self.cells)
                    .try_into()
                    .expect("map preserves cell count");
                let game = Self::from_parts(cells, self.current, self.status);
                (game, map.apply(policy))
            })
            .collect()
    }
}

impl fmt::Display for TicTacToe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in 0..3 {
            for col in 0..3 {
                let index = row * 3 + col;
                let glyph = match self.cells[index] {
                    1 => 'X'.to_string(),
                    -1 => 'O'.to_string(),
                    _ => index.to_string(),
                };
                write!(f, " {}", glyph)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
