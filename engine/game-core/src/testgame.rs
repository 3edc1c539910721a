//! Minimal game used by this crate's own tests.

use crate::game::{Game, GameError, Player, Status};

/// Subtraction game: a pile of `count` tokens, each turn removes one or two,
/// whoever takes the last token wins. Action `a` removes `a + 1` tokens.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TakeAway {
    count: u8,
    current: Player,
    winner: Option<Player>,
}

impl TakeAway {
    pub fn new(count: u8) -> Self {
        Self {
            count,
            current: Player::One,
            winner: None,
        }
    }
}

impl Game for TakeAway {
    const NAME: &'static str = "takeaway";
    const POLICY_LEN: usize = 2;
    const SHAPE: (usize, usize, usize) = (1, 1, 1);

    fn status(&self) -> Status {
        match self.winner {
            Some(player) => Status::Won(player),
            None => Status::Undecided,
        }
    }

    fn current_player(&self) -> Player {
        self.current
    }

    fn legal_actions(&self) -> Vec<usize> {
        if self.winner.is_some() {
            return Vec::new();
        }
        (0..2).filter(|a| (a + 1) as u8 <= self.count).collect()
    }

    fn apply(&mut self, action: usize) -> Result<(), GameError> {
        if self.winner.is_some() {
            return Err(GameError::GameOver);
        }
        if !self.is_legal(action) {
            return Err(GameError::IllegalAction { action });
        }

        self.count -= (action + 1) as u8;
        if self.count == 0 {
            self.winner = Some(self.current);
        } else {
            self.current = self.current.opponent();
        }
        Ok(())
    }

    fn representation(&self) -> Vec<f32> {
        vec![self.count as f32 * self.current.sign()]
    }
}
