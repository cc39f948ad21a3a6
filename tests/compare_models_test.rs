//! Black-box test for `spec.md` §8 scenario 3: `evaluate --compare` should
//! alternate colors and report complementary rates from model-a's perspective.

use chessrl::agent::Agent;
use chessrl::config::{EvalEnvConfig, NetworkConfig, RewardConfig, RlConfig};
use chessrl::engine::BuiltinAdapter;
use chessrl::evaluate::{self, env_config_for_eval};

#[test]
fn compare_models_rates_sum_to_one() {
 let adapter = BuiltinAdapter;
 let network = NetworkConfig { hidden_layers: vec![16],..NetworkConfig::default() };
 let rl = RlConfig::default();
 let agent_a = Agent::new(&network, &rl, Some(1)).unwrap();
 let agent_b = Agent::new(&network, &rl, Some(2)).unwrap();

 let eval_env = EvalEnvConfig::default();
 let reward = RewardConfig::default();
 let env_config = env_config_for_eval(&eval_env, &reward, 30);

 let result = evaluate::compare_models(&adapter, &env_config, 30, &agent_a, &agent_b, 0.0, 10, 5);

 assert_eq!(result.games, 10);
 let rate_sum = result.win_rate + result.loss_rate + (result.draws as f64 / 10.0);
 assert!((rate_sum - 1.0).abs() < 1e-9);
}

#[test]
fn compare_models_is_reproducible_for_a_fixed_seed() {
 let adapter = BuiltinAdapter;
 let network = NetworkConfig { hidden_layers: vec![16],..NetworkConfig::default() };
 let rl = RlConfig::default();
 let agent_a = Agent::new(&network, &rl, Some(10)).unwrap();
 let agent_b = Agent::new(&network, &rl, Some(20)).unwrap();

 let eval_env = EvalEnvConfig::default();
 let reward = RewardConfig::default();
 let env_config = env_config_for_eval(&eval_env, &reward, 30);

 let r1 = evaluate::compare_models(&adapter, &env_config, 30, &agent_a, &agent_b, 0.0, 6, 99);
 let r2 = evaluate::compare_models(&adapter, &env_config, 30, &agent_a, &agent_b, 0.0, 6, 99);

 assert_eq!(r1.wins, r2.wins);
 assert_eq!(r1.losses, r2.losses);
 assert_eq!(r1.draws, r2.draws);
}
