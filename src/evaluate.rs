//! Baseline Evaluator: plays the Agent against a fixed
//! heuristic, a minimax search, or another agent (for `evaluate --compare`),
//! alternating colors across games, and reduces the results to a single
//! `perf_score` the Training Pipeline uses to decide the "best" checkpoint.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::agent::Agent;
use crate::encoding;
use crate::engine::{Color, EngineAdapter};
use crate::environment::{DrawSubcode, EnvConfig, Environment, TerminationOutcome};
use crate::opponent;

/// Aggregate result of an evaluation series.
#[derive(Debug, Clone)]
pub struct EvalResult {
    pub games: usize,
    pub wins: usize,
    pub losses: usize,
    pub draws: usize,
    pub win_rate: f64,
    pub loss_rate: f64,
    /// `win_rate - loss_rate`: the single scalar the pipeline compares across cycles.
    pub perf_score: f64,
    pub avg_length: f64,
    pub draw_breakdown: HashMap<DrawSubcode, usize>,
}

/// Decide whether `candidate` is a strict improvement over `incumbent`: higher `perf_score`
/// wins; ties broken by higher `win_rate`, then by shorter `avg_length` (prefers decisive,
/// efficient play).
pub fn is_improvement(candidate: &EvalResult, incumbent: &EvalResult) -> bool {
    if candidate.perf_score != incumbent.perf_score {
        return candidate.perf_score > incumbent.perf_score;
    }
    if candidate.win_rate != incumbent.win_rate {
        return candidate.win_rate > incumbent.win_rate;
    }
    candidate.avg_length < incumbent.avg_length
}

enum Opponent<'a> {
    SelfAgent(&'a Agent),
    Heuristic,
    Minimax(u8),
}

fn opponent_action(
    opponent: &Opponent,
    engine: &dyn EngineAdapter,
    env: &Environment,
    state: &[f32],
    legal_actions: &[u16],
    eval_epsilon: f64,
    rng: &mut StdRng,
) -> u16 {
    match opponent {
        Opponent::SelfAgent(agent) => agent.act_eval(state, legal_actions, rng, eval_epsilon),
        Opponent::Heuristic => {
            let legal_moves = engine.legal_moves(env.position());
            opponent::heuristic_move(engine, env.position(), &legal_moves, rng).action_id()
        }
        Opponent::Minimax(depth) => {
            let legal_moves = engine.legal_moves(env.position());
            opponent::minimax_move(engine, env.position(), &legal_moves, *depth, None, rng).action_id()
        }
    }
}

/// Play one game, `agent` controlling `agent_color`, returning the
/// termination outcome and ply count. Deterministic for a fixed `rng` seed
/// and fixed network weights.
#[allow(clippy::too_many_arguments)]
fn play_game(
    engine: &dyn EngineAdapter,
    env_config: EnvConfig,
    max_steps: usize,
    agent: &Agent,
    eval_epsilon: f64,
    agent_color: Color,
    opp: &Opponent,
    rng: &mut StdRng,
) -> (TerminationOutcome, usize) {
    let mut env = Environment::new(engine, env_config);
    let mut state = env.reset();
    let mut steps = 0usize;

    loop {
        if env.is_terminal() {
            return (TerminationOutcome::Ongoing, steps);
        }
        if steps >= max_steps {
            return (TerminationOutcome::Draw(DrawSubcode::StepLimit), steps);
        }

        let legal_actions = env.valid_actions();
        if legal_actions.is_empty() {
            return (TerminationOutcome::Manual, steps);
        }

        let side = env.position().side_to_move;
        let action = if side == agent_color {
            agent.act_eval(&state, &legal_actions, rng, eval_epsilon)
        } else {
            opponent_action(opp, engine, &env, &state, &legal_actions, eval_epsilon, rng)
        };

        let (next_state, _reward, done, info) = env.step(action);
        state = next_state;
        steps += 1;
        if done {
            return (info.outcome, steps);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run_series(
    engine: &dyn EngineAdapter,
    env_config: &EnvConfig,
    max_steps: usize,
    agent: &Agent,
    eval_epsilon: f64,
    opp: Opponent,
    n_games: usize,
    base_seed: u64,
) -> EvalResult {
    let mut wins = 0usize;
    let mut losses = 0usize;
    let mut draws = 0usize;
    let mut total_len = 0usize;
    let mut draw_breakdown: HashMap<DrawSubcode, usize> = HashMap::new();

    for i in 0..n_games {
        let agent_color = if i % 2 == 0 { Color::White } else { Color::Black };
        let mut rng = StdRng::seed_from_u64(base_seed ^ i as u64);
        let (outcome, len) = play_game(engine, env_config.clone(), max_steps, agent, eval_epsilon, agent_color, &opp, &mut rng);
        total_len += len;

        match outcome {
            TerminationOutcome::WhiteWins if agent_color == Color::White => wins += 1,
            TerminationOutcome::BlackWins if agent_color == Color::Black => wins += 1,
            TerminationOutcome::WhiteWins | TerminationOutcome::BlackWins => losses += 1,
            TerminationOutcome::Draw(sub) => {
                draws += 1;
                *draw_breakdown.entry(sub).or_insert(0) += 1;
            }
            TerminationOutcome::Manual | TerminationOutcome::Ongoing => {
                draws += 1;
                *draw_breakdown.entry(DrawSubcode::Other).or_insert(0) += 1;
            }
        }
    }

    let n = n_games.max(1) as f64;
    let win_rate = wins as f64 / n;
    let loss_rate = losses as f64 / n;
    EvalResult {
        games: n_games,
        wins,
        losses,
        draws,
        win_rate,
        loss_rate,
        perf_score: win_rate - loss_rate,
        avg_length: total_len as f64 / n,
        draw_breakdown,
    }
}

/// `evaluate --baseline --opponent heuristic`.
pub fn evaluate_vs_heuristic(
    engine: &dyn EngineAdapter,
    env_config: &EnvConfig,
    max_steps: usize,
    agent: &Agent,
    eval_epsilon: f64,
    n_games: usize,
    base_seed: u64,
) -> EvalResult {
    run_series(engine, env_config, max_steps, agent, eval_epsilon, Opponent::Heuristic, n_games, base_seed)
}

/// `evaluate --baseline --opponent minimax --depth D`.
#[allow(clippy::too_many_arguments)]
pub fn evaluate_vs_minimax(
    engine: &dyn EngineAdapter,
    env_config: &EnvConfig,
    max_steps: usize,
    agent: &Agent,
    eval_epsilon: f64,
    n_games: usize,
    base_seed: u64,
    depth: u8,
) -> EvalResult {
    run_series(engine, env_config, max_steps, agent, eval_epsilon, Opponent::Minimax(depth), n_games, base_seed)
}

/// `evaluate --compare`: head-to-head between two agents,
/// alternating colors. Result is from `agent_a`'s perspective.
#[allow(clippy::too_many_arguments)]
pub fn compare_models(
    engine: &dyn EngineAdapter,
    env_config: &EnvConfig,
    max_steps: usize,
    agent_a: &Agent,
    agent_b: &Agent,
    eval_epsilon: f64,
    n_games: usize,
    base_seed: u64,
) -> EvalResult {
    run_series(engine, env_config, max_steps, agent_a, eval_epsilon, Opponent::SelfAgent(agent_b), n_games, base_seed)
}

/// Convenience used by `src/main.rs` to build an `EnvConfig` from the
/// evaluation-time config group.
pub fn env_config_for_eval(
    eval: &crate::config::EvalEnvConfig,
    reward: &crate::config::RewardConfig,
    max_steps_per_game: usize,
) -> EnvConfig {
    EnvConfig {
        early_adjudication: eval.early_adjudication,
        resign_material_threshold: eval.resign_material_threshold,
        no_progress_plies: eval.no_progress_plies,
        max_steps_per_game,
        reward: reward.clone(),
        illegal_selection_loses_after: None,
    }
}

#[allow(dead_code)]
fn _assert_state_dim() {
    let _ = encoding::STATE_DIM;
}
