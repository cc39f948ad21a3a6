//! Heuristic and minimax opponents. Shared between self-play workers (training opponent for the
//! Black side) and the Baseline Evaluator, which is why both live behind one
//! small module instead of being duplicated per caller.

use rand::rngs::StdRng;
use rand::Rng;

use crate::engine::{ChessMove, Color, EngineAdapter, Outcome, Position};

const MATE_SCORE: i32 = 1_000_000;

/// Static evaluation from the perspective of the side to move: material
/// difference plus a small mobility term, matching the teacher's preference
/// for simple, explainable heuristics over hand-tuned piece-square tables.
fn evaluate_relative(engine: &dyn EngineAdapter, pos: &Position) -> i32 {
    let material = pos.material_diff() * 100;
    let mobility = engine.legal_moves(pos).len() as i32;
    let relative_material = if pos.side_to_move == Color::White { material } else { -material };
    let relative_mobility = if pos.side_to_move == Color::White { mobility } else { -mobility };
    relative_material + relative_mobility
}

/// One-ply greedy heuristic move: maximize the evaluation after the move,
/// tie-broken uniformly at random among equally-good candidates.
pub fn heuristic_move(
    engine: &dyn EngineAdapter,
    pos: &Position,
    legal: &[ChessMove],
    rng: &mut StdRng,
) -> ChessMove {
    debug_assert!(!legal.is_empty());
    let mut best_score = i32::MIN;
    let mut best: Vec<ChessMove> = Vec::new();
    for &mv in legal {
        let (next, _) = engine.step(pos, mv);
        // `evaluate_relative` is from the mover's perspective at `next`,
        // where the opponent is to move; negate back to the mover's view.
        let score = -evaluate_relative(engine, &next);
        match score.cmp(&best_score) {
            std::cmp::Ordering::Greater => {
                best_score = score;
                best.clear();
                best.push(mv);
            }
            std::cmp::Ordering::Equal => best.push(mv),
            std::cmp::Ordering::Less => {}
        }
    }
    best[rng.random_range(0..best.len())]
}

fn negamax(engine: &dyn EngineAdapter, pos: &Position, depth: u8, mut alpha: i32, beta: i32) -> i32 {
    match engine.status(pos) {
        Outcome::WhiteWins | Outcome::BlackWins => return -MATE_SCORE - depth as i32,
        Outcome::Draw(_) => return 0,
        Outcome::Ongoing => {}
    }
    if depth == 0 {
        return evaluate_relative(engine, pos);
    }

    let mut moves = engine.legal_moves(pos);
    // Deterministic move ordering.
    moves.sort_by_key(|m| m.action_id());

    let mut best = i32::MIN;
    for mv in moves {
        let (next, _) = engine.step(pos, mv);
        let score = -negamax(engine, &next, depth - 1, -beta, -alpha);
        if score > best {
            best = score;
        }
        alpha = alpha.max(best);
        if alpha >= beta {
            break;
        }
    }
    best
}

/// Full-width alpha-beta minimax to `depth`. `tau`, when set, samples among the top-K root moves with a
/// softmax of temperature `tau` instead of always taking the single best
/// move; intended for the training opponent only — the baseline evaluator
/// always passes `tau = None` for determinism.
pub fn minimax_move(
    engine: &dyn EngineAdapter,
    pos: &Position,
    legal: &[ChessMove],
    depth: u8,
    tau: Option<f64>,
    rng: &mut StdRng,
) -> ChessMove {
    debug_assert!(!legal.is_empty());
    let mut ordered: Vec<ChessMove> = legal.to_vec();
    ordered.sort_by_key(|m| m.action_id());

    let mut scored: Vec<(ChessMove, i32)> = ordered
        .into_iter()
        .map(|mv| {
            let (next, _) = engine.step(pos, mv);
            let score = -negamax(engine, &next, depth.saturating_sub(1), i32::MIN + 1, i32::MAX - 1);
            (mv, score)
        })
        .collect();
    scored.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.action_id().cmp(&b.0.action_id())));

    match tau {
        None | Some(_) if scored.len() == 1 => scored[0].0,
        Some(tau) if tau > 0.0 => {
            const TOP_K: usize = 4;
            let top = &scored[..scored.len().min(TOP_K)];
            let max_score = top[0].1 as f64;
            let weights: Vec<f64> = top.iter().map(|(_, s)| ((*s as f64 - max_score) / tau).exp()).collect();
            let total: f64 = weights.iter().sum();
            let mut target = rng.random_range(0.0..total);
            for (i, w) in weights.iter().enumerate() {
                if target < *w {
                    return top[i].0;
                }
                target -= w;
            }
            top[0].0
        }
        _ => scored[0].0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::BuiltinAdapter;
    use rand::SeedableRng;

    #[test]
    fn heuristic_prefers_free_capture() {
        let adapter = BuiltinAdapter;
        // White rook can capture a hanging black knight.
        let pos = crate::engine::Position::from_fen("4k3/8/8/8/8/8/n7/R3K3 w - - 0 1").unwrap();
        let legal = adapter.legal_moves(&pos);
        let mut rng = StdRng::seed_from_u64(1);
        let mv = heuristic_move(&adapter, &pos, &legal, &mut rng);
        let a2 = crate::engine::position::parse_square("a2").unwrap();
        assert_eq!(mv.to, a2);
    }

    #[test]
    fn minimax_finds_mate_in_one() {
        let adapter = BuiltinAdapter;
        let pos = crate::engine::Position::from_fen("6k1/5ppp/8/8/8/8/8/R6K w - - 0 1").unwrap();
        let legal = adapter.legal_moves(&pos);
        let mut rng = StdRng::seed_from_u64(1);
        let mv = minimax_move(&adapter, &pos, &legal, 2, None, &mut rng);
        let (next, _) = adapter.step(&pos, mv);
        assert_eq!(adapter.status(&next), Outcome::BlackWins);
    }

    #[test]
    fn minimax_is_deterministic_without_tau() {
        let adapter = BuiltinAdapter;
        let pos = adapter.init();
        let legal = adapter.legal_moves(&pos);
        let mut rng1 = StdRng::seed_from_u64(9);
        let mut rng2 = StdRng::seed_from_u64(123);
        let mv1 = minimax_move(&adapter, &pos, &legal, 2, None, &mut rng1);
        let mv2 = minimax_move(&adapter, &pos, &legal, 2, None, &mut rng2);
        assert_eq!(mv1, mv2);
    }
}
