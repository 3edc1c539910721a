//! Core abstractions for two-player, perfect-information board games.
//!
//! This crate defines the [`Game`] trait that every concrete game implements,
//! the shared seat ([`Player`]) and outcome ([`Status`]) types, uniformly
//! random playouts, and the dihedral symmetry maps square-board games use to
//! amplify training data.
//!
//! Everything downstream (models, tree search, self-play) is generic over a
//! `G: Game`; there is no runtime registry or type erasure. A model built for
//! one game type cannot be applied to another by construction.

pub mod game;
pub mod playout;
pub mod symmetry;

#[cfg(test)]
pub(crate) mod testgame;

pub use game::{state_key, Game, GameError, Player, Status};
pub use playout::{random_playout, random_turn};
pub use symmetry::{dihedral_maps, CellMap};
