//! Command-line configuration.
//!
//! Flags carry environment-variable overrides (`ARENA_*`) so orchestrated
//! runs can configure the binary without rewriting command lines. CLI
//! arguments take priority over the environment.

use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use mcts::SearchConfig;
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;

#[derive(Parser, Debug)]
#[command(name = "arena")]
#[command(about = "Self-play recorder, trainer, and match driver")]
pub struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "ARENA_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Seed for all randomness; drawn from entropy when omitted
    #[arg(long, env = "ARENA_SEED")]
    pub seed: Option<u64>,

    /// Game to drive
    #[arg(long, env = "ARENA_GAME", value_enum, default_value = "tictactoe")]
    pub game: GameChoice,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameChoice {
    Tictactoe,
    Metatac,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Record self-play games and optionally train on them
    Selfplay(SelfPlayArgs),

    /// Pit two agents against each other over a series of matches
    Duel(DuelArgs),

    /// Play against the tree search on the terminal
    Play(PlayArgs),
}

/// Search knobs shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    /// Simulations per search
    #[arg(long, env = "ARENA_POWER", default_value_t = 200)]
    pub power: u32,

    /// PUCT exploration weight
    #[arg(long, default_value_t = 1.25)]
    pub exploration: f32,

    /// Root prior dilution toward uniform, in [0, 1]
    #[arg(long, default_value_t = 0.25)]
    pub dilution: f32,

    /// Visit-count temperature (0 = argmax)
    #[arg(long, default_value_t = 1.0)]
    pub temperature: f32,
}

impl SearchArgs {
    pub fn to_config(&self) -> SearchConfig {
        SearchConfig::default()
            .with_power(self.power)
            .with_exploration(self.exploration)
            .with_dilution(self.dilution)
            .with_temperature(self.temperature)
    }
}

#[derive(Args, Debug)]
pub struct SelfPlayArgs {
    #[command(flatten)]
    pub search: SearchArgs,

    /// Number of games to record
    #[arg(long, env = "ARENA_GAMES", default_value_t = 20)]
    pub games: u32,

    /// Training epochs over the recorded data (0 = record only, using the
    /// rollout baseline instead of a trainable model)
    #[arg(long, default_value_t = 0)]
    pub epochs: u32,

    /// Minibatch size for training
    #[arg(long, default_value_t = 32)]
    pub batch_size: usize,

    /// SGD learning rate
    #[arg(long, default_value_t = 0.01)]
    pub learning_rate: f32,

    /// L2 regularization weight
    #[arg(long, default_value_t = 1e-4)]
    pub weight_decay: f32,

    /// Write the recorded data set as JSON
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Write the trained model snapshot
    #[arg(long)]
    pub model_out: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentChoice {
    /// Uniformly random legal actions
    Random,
    /// The model policy without search
    Intuition,
    /// Full tree search
    Mcts,
}

#[derive(Args, Debug)]
pub struct DuelArgs {
    #[command(flatten)]
    pub search: SearchArgs,

    /// Agent taking the first seat
    #[arg(long, value_enum, default_value = "mcts")]
    pub first: AgentChoice,

    /// Agent taking the second seat
    #[arg(long, value_enum, default_value = "random")]
    pub second: AgentChoice,

    /// Number of matches to play
    #[arg(long, default_value_t = 20)]
    pub matches: u32,
}

#[derive(Args, Debug)]
pub struct PlayArgs {
    #[command(flatten)]
    pub search: SearchArgs,
}

impl Cli {
    pub fn validate(&self) -> Result<()> {
        if self.log_level.parse::<LevelFilter>().is_err() {
            return Err(anyhow!(
                "invalid log level '{}', expected one of trace, debug, info, warn, error",
                self.log_level
            ));
        }

        let search = match &self.command {
            Command::Selfplay(args) => {
                if args.games == 0 {
                    return Err(anyhow!("games must be at least 1"));
                }
                if args.batch_size == 0 {
                    return Err(anyhow!("batch-size must be at least 1"));
                }
                if args.epochs > 0 && args.learning_rate <= 0.0 {
                    return Err(anyhow!("learning-rate must be positive"));
                }
                &args.search
            }
            Command::Duel(args) => {
                if args.matches == 0 {
                    return Err(anyhow!("matches must be at least 1"));
                }
                &args.search
            }
            Command::Play(args) => &args.search,
        };

        search.to_config().validate().map_err(|message| anyhow!(message))
    }
}
