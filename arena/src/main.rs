//! Arena - self-play recorder, trainer, and match driver.
//!
//! Subcommands:
//! 1. `selfplay` records search-driven self-play games into a data set and
//!    can train a dense reference net on it for a number of epochs.
//! 2. `duel` pits two configured agents against each other and tallies the
//!    results from the first seat's perspective.
//! 3. `play` puts a human on the terminal against the tree search.

use std::fmt;
use std::fs::File;
use std::io::BufWriter;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use tracing::info;

mod agents;
mod config;
mod recorder;

use game_core::{Game, Player, Status};
use games_metatac::MetaTac;
use games_tictactoe::TicTacToe;
use model::{snapshot, train_step, BaseModel, DataSet, LinearNet, RolloutModel, Sgd};

use crate::agents::{play_match, Agent, HumanAgent, IntuitionAgent, MctsAgent, RandomAgent};
use crate::config::{AgentChoice, Cli, Command, DuelArgs, GameChoice, PlayArgs, SelfPlayArgs};
use crate::recorder::record_selfplay;

fn init_tracing(level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}

fn seed_rng(seed: Option<u64>) -> ChaCha20Rng {
    match seed {
        Some(seed) => ChaCha20Rng::seed_from_u64(seed),
        None => ChaCha20Rng::from_entropy(),
    }
}

fn progress_bar(total: u64) -> ProgressBar {
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")
            .expect("static template is valid"),
    );
    bar
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.validate()?;
    init_tracing(&cli.log_level);

    let mut rng = seed_rng(cli.seed);
    info!(game = ?cli.game, seed = ?cli.seed, "arena starting");

    match (cli.game, cli.command) {
        (GameChoice::Tictactoe, Command::Selfplay(args)) => {
            cmd_selfplay::<TicTacToe>(&args, &mut rng)
        }
        (GameChoice::Metatac, Command::Selfplay(args)) => cmd_selfplay::<MetaTac>(&args, &mut rng),
        (GameChoice::Tictactoe, Command::Duel(args)) => cmd_duel::<TicTacToe>(&args, &mut rng),
        (GameChoice::Metatac, Command::Duel(args)) => cmd_duel::<MetaTac>(&args, &mut rng),
        (GameChoice::Tictactoe, Command::Play(args)) => cmd_play::<TicTacToe>(&args, &mut rng),
        (GameChoice::Metatac, Command::Play(args)) => cmd_play::<MetaTac>(&args, &mut rng),
    }
}

fn representation_len<G: Game>() -> usize {
    let (h, w, c) = G::SHAPE;
    h * w * c
}

/// Record self-play data; with `--epochs` also train the dense reference
/// net on it and report the loss per epoch.
fn cmd_selfplay<G: Game + Default>(args: &SelfPlayArgs, rng: &mut ChaCha20Rng) -> Result<()> {
    let search = args.search.to_config();
    let bar = progress_bar(args.games as u64);

    let (dataset, failed) = if args.epochs > 0 {
        let net = LinearNet::new(representation_len::<G>(), 1 + G::POLICY_LEN, rng);
        let mut model = BaseModel::<G, _>::new(net)?;

        let report = record_selfplay(&model, &G::default(), args.games, &search, rng, |_| {
            bar.inc(1)
        })?;
        bar.finish_and_clear();
        info!(
            samples = report.dataset.len(),
            failed = report.failed_games,
            "self-play recorded"
        );

        let mut optimizer = Sgd::new(args.learning_rate);
        for epoch in 0..args.epochs {
            let mut last = None;
            for batch in report.dataset.minibatches(args.batch_size) {
                last = Some(train_step(
                    &mut model,
                    batch,
                    args.weight_decay,
                    &mut optimizer,
                )?);
            }
            if let Some(losses) = last {
                info!(
                    epoch,
                    value = losses.value,
                    policy = losses.policy,
                    regularization = losses.regularization,
                    total = losses.total(),
                    "epoch finished"
                );
            }
        }

        if let Some(path) = &args.model_out {
            snapshot::save_file(path, G::NAME, model.net())?;
            info!(path = %path.display(), "model snapshot written");
        }

        (report.dataset, report.failed_games)
    } else {
        let model = RolloutModel::with_seed(rng.gen());
        let report = record_selfplay(&model, &G::default(), args.games, &search, rng, |_| {
            bar.inc(1)
        })?;
        bar.finish_and_clear();
        (report.dataset, report.failed_games)
    };

    info!(
        samples = dataset.len(),
        failed, "self-play run complete"
    );
    if let Some(path) = &args.out {
        write_dataset(&dataset, path)?;
        info!(path = %path.display(), "data set written");
    }
    Ok(())
}

fn write_dataset(dataset: &DataSet, path: &std::path::Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    serde_json::to_writer(BufWriter::new(file), dataset)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// A boxed agent so duel seats can mix agent kinds at runtime.
type BoxedAgent<G> = Box<dyn Agent<G>>;

fn build_agent<G: Game>(
    choice: AgentChoice,
    args: &DuelArgs,
    rng: &mut ChaCha20Rng,
) -> BoxedAgent<G> {
    match choice {
        AgentChoice::Random => Box::new(RandomAgent::with_seed(rng.gen())),
        AgentChoice::Intuition => Box::new(IntuitionAgent::with_seed(
            RolloutModel::with_seed(rng.gen()),
            args.search.temperature,
            rng.gen(),
        )),
        AgentChoice::Mcts => Box::new(MctsAgent::with_seed(
            RolloutModel::with_seed(rng.gen()),
            args.search.to_config(),
            rng.gen(),
        )),
    }
}

fn cmd_duel<G: Game + Default>(args: &DuelArgs, rng: &mut ChaCha20Rng) -> Result<()> {
    let mut first = build_agent::<G>(args.first, args, rng);
    let mut second = build_agent::<G>(args.second, args, rng);
    let template = G::default();

    let bar = progress_bar(args.matches as u64);
    let (mut wins, mut draws, mut losses) = (0u32, 0u32, 0u32);

    for _ in 0..args.matches {
        let status = play_match(first.as_mut(), second.as_mut(), &template, |_, _| {})?;
        match status.score_for(Player::One) {
            score if score > 0.0 => wins += 1,
            score if score < 0.0 => losses += 1,
            _ => draws += 1,
        }
        bar.inc(1);
    }
    bar.finish_and_clear();

    info!(wins, draws, losses, "duel finished");
    println!(
        "{:?} vs {:?}: {wins} wins / {draws} draws / {losses} losses over {} matches",
        args.first, args.second, args.matches
    );
    Ok(())
}

fn cmd_play<G: Game + Default + fmt::Display>(args: &PlayArgs, rng: &mut ChaCha20Rng) -> Result<()> {
    let stdin = std::io::stdin();
    let mut human = HumanAgent::new(stdin.lock());
    let mut engine: MctsAgent<G, _> = MctsAgent::with_seed(
        RolloutModel::with_seed(rng.gen()),
        args.search.to_config(),
        rng.gen(),
    );

    println!("you are {}; actions are cell indices", Player::One);
    let status = play_match(&mut human, &mut engine, &G::default(), |game, action| {
        println!("played {action}:");
        println!("{game}");
    })?;

    match status {
        Status::Draw => println!("draw"),
        Status::Won(Player::One) => println!("you win"),
        Status::Won(Player::Two) => println!("the engine wins"),
        Status::Undecided => unreachable!("the match driver returns terminal statuses"),
    }
    Ok(())
}
