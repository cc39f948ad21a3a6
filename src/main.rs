//! `chessrl` CLI: `train` drives the Training Pipeline,
//! `evaluate` runs the Baseline Evaluator against a saved checkpoint, either
//! head-to-head (`--compare`) or against a fixed opponent (`--baseline`).

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};

use chessrl::agent::Agent;
use chessrl::config::RunConfig;
use chessrl::network::NetworkBackend;
use chessrl::training::Pipeline;
use chessrl::{evaluate, ChessRlError, Result};

#[derive(Parser)]
#[command(name = "chessrl", version, about = "Self-play DQN training core for a chess-playing agent")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the self-play training pipeline.
    Train(TrainArgs),
    /// Evaluate a saved checkpoint against a baseline opponent or another checkpoint.
    Evaluate(EvaluateArgs),
}

#[derive(Args)]
struct TrainArgs {
    /// Named config profile (`default`, `fast-debug`, `deep`).
    #[arg(long, default_value = "default")]
    profile: String,
    /// Path to a JSON-serialized `RunConfig`, overriding `--profile`.
    #[arg(long)]
    config: Option<PathBuf>,
    /// `key=value` overrides, dotted-path style (e.g. `rl.gamma=0.95`). Repeatable.
    #[arg(long = "override")]
    overrides: Vec<String>,
    /// Resume from the latest checkpoint under `system.checkpointDirectory`.
    #[arg(long)]
    resume: bool,
    /// Seed online/target nets from an explicit checkpoint before training starts.
    #[arg(long)]
    load: Option<PathBuf>,
    /// Explicit path to the `selfplay-worker` binary (defaults to the sibling binary).
    #[arg(long)]
    worker_binary: Option<PathBuf>,
}

#[derive(Args)]
struct EvaluateArgs {
    /// Play `--model` against a fixed opponent (`--opponent`).
    #[arg(long)]
    baseline: bool,
    /// Play `--model-a` against `--model-b`, alternating colors.
    #[arg(long)]
    compare: bool,
    /// Checkpoint to evaluate, for `--baseline`.
    #[arg(long)]
    model: Option<PathBuf>,
    #[arg(long = "model-a")]
    model_a: Option<PathBuf>,
    #[arg(long = "model-b")]
    model_b: Option<PathBuf>,
    #[arg(long, default_value_t = 100)]
    games: usize,
    #[arg(long, value_enum, default_value = "heuristic")]
    opponent: OpponentKind,
    /// Minimax search depth, for `--opponent minimax`.
    #[arg(long, default_value_t = 2)]
    depth: u8,
    #[arg(long, default_value = "default")]
    profile: String,
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long = "override")]
    overrides: Vec<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum OpponentKind {
    Heuristic,
    Minimax,
}

#[tokio::main]
async fn main() {
    let code = match run().await {
        Ok(()) => 0,
        Err(e) => {
            log::error!("chessrl failed: {e}");
            eprintln!("chessrl: {e}");
            1
        }
    };
    std::process::exit(code);
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Train(args) => run_train(args).await,
        Command::Evaluate(args) => run_evaluate(args).await,
    }
}

fn build_config(profile: &str, config_path: Option<&Path>, overrides: &[String]) -> Result<RunConfig> {
    let mut cfg = match config_path {
        Some(path) => {
            let bytes = std::fs::read(path)?;
            serde_json::from_slice(&bytes)?
        }
        None => RunConfig::profile(profile),
    };
    for kv in overrides {
        cfg.apply_override(kv)?;
    }
    cfg.validate()?;
    Ok(cfg)
}

async fn run_train(args: TrainArgs) -> Result<()> {
    let cfg = build_config(&args.profile, args.config.as_deref(), &args.overrides)?;
    chessrl::setup_logging(cfg.system.log_directory.as_deref())?;
    log::info!("starting training run (fingerprint {})", cfg.fingerprint());

    let mut pipeline = Pipeline::with_worker_binary(cfg, args.worker_binary)?;
    if let Some(path) = &args.load {
        pipeline.load_weights(path)?;
    }
    if args.resume {
        pipeline.resume()?;
    }
    pipeline.run().await
}

async fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    let cfg = build_config(&args.profile, args.config.as_deref(), &args.overrides)?;
    chessrl::setup_logging(cfg.system.log_directory.as_deref())?;

    let engine = cfg.system.engine_backend.build();
    let env_config = evaluate::env_config_for_eval(&cfg.eval_env, &cfg.reward, cfg.selfplay.max_steps_per_game);
    let base_seed = cfg.system.seed.unwrap_or(0);

    if args.compare {
        let model_a = args
            .model_a
            .ok_or_else(|| ChessRlError::ConfigInvalid("--compare requires --model-a".to_string()))?;
        let model_b = args
            .model_b
            .ok_or_else(|| ChessRlError::ConfigInvalid("--compare requires --model-b".to_string()))?;

        let mut agent_a = Agent::new(&cfg.network, &cfg.rl, cfg.system.seed)?;
        agent_a.online.load(&model_a)?;
        let mut agent_b = Agent::new(&cfg.network, &cfg.rl, cfg.system.seed)?;
        agent_b.online.load(&model_b)?;

        let result = evaluate::compare_models(
            engine.as_ref(),
            &env_config,
            cfg.selfplay.max_steps_per_game,
            &agent_a,
            &agent_b,
            cfg.eval_env.eval_epsilon,
            args.games,
            base_seed,
        );
        print_result("compare (from model-a's perspective)", &result);
        return Ok(());
    }

    if args.baseline {
        let model = args
            .model
            .ok_or_else(|| ChessRlError::ConfigInvalid("--baseline requires --model".to_string()))?;
        let mut agent = Agent::new(&cfg.network, &cfg.rl, cfg.system.seed)?;
        agent.online.load(&model)?;

        let result = match args.opponent {
            OpponentKind::Heuristic => evaluate::evaluate_vs_heuristic(
                engine.as_ref(),
                &env_config,
                cfg.selfplay.max_steps_per_game,
                &agent,
                cfg.eval_env.eval_epsilon,
                args.games,
                base_seed,
            ),
            OpponentKind::Minimax => evaluate::evaluate_vs_minimax(
                engine.as_ref(),
                &env_config,
                cfg.selfplay.max_steps_per_game,
                &agent,
                cfg.eval_env.eval_epsilon,
                args.games,
                base_seed,
                args.depth,
            ),
        };
        print_result("baseline", &result);
        return Ok(());
    }

    Err(ChessRlError::ConfigInvalid(
        "evaluate: specify either --baseline or --compare".to_string(),
    ))
}

fn print_result(label: &str, result: &evaluate::EvalResult) {
    println!(
        "{label}: games={} wins={} losses={} draws={} win_rate={:.3} loss_rate={:.3} perf_score={:.3} avg_length={:.1}",
        result.games, result.wins, result.losses, result.draws, result.win_rate, result.loss_rate, result.perf_score, result.avg_length
    );
}
