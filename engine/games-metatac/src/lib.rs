//! MetaTac: ultimate tic-tac-toe on a 9×9 grid of nine local boards.
//!
//! Playing cell `c` of a local board sends the opponent to local board `c`;
//! when that board is already decided the opponent chooses freely. A local
//! three-in-a-row captures the board for the mover, three captured boards
//! in a line win the game, and the game is drawn when every local board is
//! decided without a meta line.
//!
//! Actions are global cell indices on the 9×9 grid (row-major), so the
//! policy has length 81 and the dihedral maps of the grid double as policy
//! transforms. The representation follows the signed single-channel scheme:
//! `+1.0` for the mover's pieces, `-1.0` for the opponent's.

use std::fmt;

use game_core::{dihedral_maps, Game, GameError, Player, Status};

/// Cell indices of the winning lines of a 3×3 board.
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

/// Outcome of one local board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
enum LocalState {
    #[default]
    Open,
    Won(Player),
    Drawn,
}

impl LocalState {
    #[inline]
    fn is_decided(self) -> bool {
        !matches!(self, LocalState::Open)
    }
}

/// A MetaTac position.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetaTac {
    /// Global 9×9 grid: `+1` player one, `-1` player two, `0` empty.
    cells: [i8; 81],
    /// Per local board outcome, indexed like a 3×3 board.
    boards: [LocalState; 9],
    /// Local board the mover is confined to; `None` means free choice.
    active: Option<usize>,
    current: Player,
    status: Status,
}

/// Global cell index of `cell` within local `board`.
pub fn action_at(board: usize, cell: usize) -> usize {
    let row = (board / 3) * 3 + cell / 3;
    let col = (board % 3) * 3 + cell % 3;
    row * 9 + col
}

#[inline]
fn board_of(action: usize) -> usize {
    let (row, col) = (action / 9, action % 9);
    (row / 3) * 3 + col / 3
}

#[inline]
fn cell_of(action: usize) -> usize {
    let (row, col) = (action / 9, action % 9);
    (row % 3) * 3 + col % 3
}

impl MetaTac {
    pub fn new() -> Self {
        Self {
            cells: [0; 81],
            boards: [LocalState::Open; 9],
            active: None,
            current: Player::One,
            status: Status::Undecided,
        }
    }

    /// Build a position by playing `moves` in order from the empty board.
    pub fn with_moves(moves: &[usize]) -> Result<Self, GameError> {
        let mut game = Self::new();
        for &action in moves {
            game.apply(action)?;
        }
        Ok(game)
    }

    #[inline]
    pub fn cell(&self, action: usize) -> i8 {
        self.cells[action]
    }

    /// Board the mover is currently confined to, if any.
    #[inline]
    pub fn active_board(&self) -> Option<usize> {
        self.active
    }

    /// Winner of a local board, if it has been captured.
    pub fn board_winner(&self, board: usize) -> Option<Player> {
        match self.boards[board] {
            LocalState::Won(player) => Some(player),
            _ => None,
        }
    }

    fn local_cell_open(&self, action: usize) -> bool {
        self.cells[action] == 0 && !self.boards[board_of(action)].is_decided()
    }

    fn local_line_completed(&self, board: usize, sign: i8) -> bool {
        LINES.iter().any(|line| {
            line.iter()
                .all(|&cell| self.cells[action_at(board, cell)] == sign)
        })
    }

    fn local_board_full(&self, board: usize) -> bool {
        (0..9).all(|cell| self.cells[action_at(board, cell)] != 0)
    }

    fn meta_line_completed(&self, player: Player) -> bool {
        LINES.iter().any(|line| {
            line.iter()
                .all(|&board| self.boards[board] == LocalState::Won(player))
        })
    }
}

impl Default for MetaTac {
    fn default() -> Self {
        Self::new()
    }
}

impl Game for MetaTac {
    const NAME: &'static str = "metatac";
    const POLICY_LEN: usize = 81;
    const SHAPE: (usize, usize, usize) = (9, 9, 1);

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
        match self.active {
            Some(board) => (0..9)
                .map(|cell| action_at(board, cell))
                .filter(|&action| self.cells[action] == 0)
                .collect(),
            None => (0..81).filter(|&a| self.local_cell_open(a)).collect(),
        }
    }

    fn is_legal(&self, action: usize) -> bool {
        if self.status.is_over() || action >= 81 || !self.local_cell_open(action) {
            return false;
        }
        match self.active {
            Some(board) => board_of(action) == board,
            None => true,
        }
    }

    fn apply(&mut self, action: usize) -> Result<(), GameError> {
        if self.status.is_over() {
            return Err(GameError::GameOver);
        }
        if !self.is_legal(action) {
            return Err(GameError::IllegalAction { action });
        }

        let board = board_of(action);
        let sign = self.current.sign() as i8;
        self.cells[action] = sign;

        if self.local_line_completed(board, sign) {
            self.boards[board] = LocalState::Won(self.current);
        } else if self.local_board_full(board) {
            self.boards[board] = LocalState::Drawn;
        }

        if self.meta_line_completed(self.current) {
            self.status = Status::Won(self.current);
        } else if self.boards.iter().all(|b| b.is_decided()) {
            self.status = Status::Draw;
        }

        if self.status.is_over() {
            self.active = None;
        } else {
            // The played cell names the opponent's board; a decided target
            // frees the choice.
            let target = cell_of(action);
            self.active = if self.boards[target].is_decided() {
                None
            } else {
                Some(target)
            };
            self.current = self.current.opponent();
        }
        Ok(())
    }

    fn representation(&self) -> Vec<f32> {
        let sign = self.current.sign();
        self.cells.iter().map(|&c| c as f32 * sign).collect()
    }

    fn augment(&self, policy: &[f32]) -> Vec<(Self, Vec<f32>)> {
        let grid_maps = dihedral_maps(9);
        let board_maps = dihedral_maps(3);

        grid_maps
            .iter()
            .zip(&board_maps)
            .map(|(grid_map, board_map)| {
                let cells: [i8; 81] = grid_map
                    .apply(&self.cells)
                    .try_into()
                    .expect("map preserves cell count");
                let boards: [LocalState; 9] = board_map
                    .apply(&self.boards)
                    .try_into()
                    .expect("map preserves board count");
                let game = Self {
                    cells,
                    boards,
                    active: self.active.map(|board| board_map.image(board)),
                    current: self.current,
                    status: self.status,
                };
                (game, grid_map.apply(policy))
            })
            .collect()
    }
}

impl fmt::Display for MetaTac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in 0..9 {
            if row > 0 && row % 3 == 0 {
                writeln!(f, "---+---+---")?;
            }
            for col in 0..9 {
                if col > 0 && col % 3 == 0 {
                    write!(f, "|")?;
                }
                let glyph = match self.cells[row * 9 + col] {
                    1 => 'X',
                    -1 => 'O',
                    _ => '.',
                };
                write!(f, "{}", glyph)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
