//! `selfplay-worker`: plays exactly one game and exits.
//!
//! Invoked by [`chessrl::selfplay::Orchestrator`] as an isolated OS process
//! per game; reads a [`chessrl::selfplay::WorkerRequest`] JSON file, plays to
//! a terminal state or the configured step limit, and writes a
//! [`chessrl::selfplay::WorkerResponse`] JSON file back. Process isolation
//! means a panic or a `libtorch` crash in one game cannot take down the
//! orchestrator or other concurrent games.

use std::path::PathBuf;

use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;

use chessrl::agent::Agent;
use chessrl::config::OpponentType;
use chessrl::engine::Color;
use chessrl::environment::{DrawSubcode, EnvConfig, Environment, TerminationOutcome};
use chessrl::network::NetworkBackend;
use chessrl::opponent;
use chessrl::replay::Transition;
use chessrl::selfplay::{WorkerRequest, WorkerResponse};

#[derive(Parser)]
struct Args {
    #[arg(long)]
    request: PathBuf,
    #[arg(long)]
    output: PathBuf,
}

fn main() {
    let _ = chessrl::setup_logging(None);
    let args = Args::parse();
    if let Err(e) = run(args) {
        log::error!("selfplay-worker failed: {e}");
        eprintln!("selfplay-worker failed: {e}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> chessrl::Result<()> {
    let bytes = std::fs::read(&args.request)?;
    let request: WorkerRequest = serde_json::from_slice(&bytes)?;

    let engine = request.engine_backend.build();

    let mut agent = Agent::new(&request.network, &request.rl, Some(request.seed))?;
    agent.online.load(&request.model_path)?;

    let env_config = EnvConfig {
        early_adjudication: request.train_env.early_adjudication,
        resign_material_threshold: request.train_env.resign_material_threshold,
        no_progress_plies: request.train_env.no_progress_plies,
        max_steps_per_game: request.max_steps_per_game,
        reward: request.reward.clone(),
        illegal_selection_loses_after: None,
    };
    let mut env = Environment::new(engine.as_ref(), env_config);
    let mut rng = StdRng::seed_from_u64(request.seed);

    let mut state = env.reset();
    let mut transitions: Vec<Transition> = Vec::new();
    let mut outcome = TerminationOutcome::Ongoing;
    let mut length = 0usize;

    loop {
        if env.is_terminal() {
            break;
        }
        if length >= request.max_steps_per_game {
            // `spec.md` §4.7 step 4 / §9: apply the step-limit penalty to the
            // final transition and mark it terminal, rather than discarding it.
            if let Some(last) = transitions.last_mut() {
                last.reward = Environment::apply_step_limit_penalty(last.reward, request.reward.step_limit_penalty);
                last.done = true;
                last.next_legal_actions = Some(Vec::new());
            }
            outcome = TerminationOutcome::Draw(DrawSubcode::StepLimit);
            break;
        }

        let legal_actions = env.valid_actions();
        if legal_actions.is_empty() {
            outcome = TerminationOutcome::Manual;
            break;
        }

        let side = env.position().side_to_move;
        let action = if side == Color::White || request.train_env.opponent_type == OpponentType::SelfPlay {
            agent.act_eval(&state, &legal_actions, &mut rng, request.epsilon)
        } else {
            let legal_moves = engine.legal_moves(env.position());
            match request.train_env.opponent_type {
                OpponentType::Heuristic => opponent::heuristic_move(engine.as_ref(), env.position(), &legal_moves, &mut rng).action_id(),
                OpponentType::Minimax => opponent::minimax_move(
                    engine.as_ref(),
                    env.position(),
                    &legal_moves,
                    request.train_env.opponent_depth,
                    request.train_env.opponent_tau,
                    &mut rng,
                )
                .action_id(),
                OpponentType::SelfPlay => unreachable!("handled above"),
            }
        };

        let (next_state, reward, done, info) = env.step(action);
        let next_legal_actions = if done { Some(Vec::new()) } else { Some(env.valid_actions()) };
        transitions.push(Transition {
            state: state.clone(),
            action,
            reward,
            next_state: next_state.clone(),
            done,
            next_legal_actions,
        });
        state = next_state;
        length += 1;
        if done {
            outcome = info.outcome;
            break;
        }
    }

    let final_fen = engine.to_fen(env.position());
    let response = WorkerResponse { game_id: request.game_id, outcome, length, final_fen, transitions };
    std::fs::write(&args.output, serde_json::to_vec(&response)?)?;
    Ok(())
}
