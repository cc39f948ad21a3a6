//! Black-box test for `spec.md` §8 scenario 2: `evaluate --baseline` against
//! the heuristic opponent should produce well-formed, complementary rates.

use chessrl::agent::Agent;
use chessrl::config::{EvalEnvConfig, NetworkConfig, RewardConfig, RlConfig};
use chessrl::engine::BuiltinAdapter;
use chessrl::evaluate::{self, env_config_for_eval};

#[test]
fn evaluate_vs_heuristic_rates_are_well_formed() {
 let adapter = BuiltinAdapter;
 let network = NetworkConfig { hidden_layers: vec![16],..NetworkConfig::default() };
 let rl = RlConfig::default();
 let agent = Agent::new(&network, &rl, Some(7)).unwrap();

 let eval_env = EvalEnvConfig { evaluation_games: 20,..EvalEnvConfig::default() };
 let reward = RewardConfig::default();
 let env_config = env_config_for_eval(&eval_env, &reward, 40);

 let result = evaluate::evaluate_vs_heuristic(&adapter, &env_config, 40, &agent, 0.0, 20, 7);

 assert_eq!(result.games, 20);
 assert_eq!(result.wins + result.losses + result.draws, 20);
 let rate_sum = result.win_rate + result.loss_rate + (result.draws as f64 / 20.0);
 assert!((rate_sum - 1.0).abs() < 1e-9);
 assert!(result.avg_length <= 40.0);
 let draw_total: usize = result.draw_breakdown.values().sum();
 assert_eq!(draw_total, result.draws);
}

#[test]
fn evaluate_vs_heuristic_is_deterministic_for_a_fixed_seed() {
 let adapter = BuiltinAdapter;
 let network = NetworkConfig { hidden_layers: vec![16],..NetworkConfig::default() };
 let rl = RlConfig::default();
 let agent = Agent::new(&network, &rl, Some(3)).unwrap();

 let eval_env = EvalEnvConfig { evaluation_games: 8,..EvalEnvConfig::default() };
 let reward = RewardConfig::default();
 let env_config = env_config_for_eval(&eval_env, &reward, 30);

 let r1 = evaluate::evaluate_vs_heuristic(&adapter, &env_config, 30, &agent, 0.0, 8, 42);
 let r2 = evaluate::evaluate_vs_heuristic(&adapter, &env_config, 30, &agent, 0.0, 8, 42);

 assert_eq!(r1.wins, r2.wins);
 assert_eq!(r1.losses, r2.losses);
 assert_eq!(r1.draws, r2.draws);
 assert_eq!(r1.avg_length, r2.avg_length);
}
