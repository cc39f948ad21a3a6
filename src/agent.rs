//! DQN Agent: policy over legal actions, target network,
//! Double-DQN, Huber loss (delegated to the network backend), gradient
//! clipping, epsilon schedule.

use rand::rngs::StdRng;
use rand::Rng;

use crate::config::{NetworkConfig, RlConfig};
use crate::network::{NetworkBackend, NetworkBackendKind, QNetwork, TrainStepStats};
use crate::replay::Transition;
use crate::{ChessRlError, Result};

/// Metrics surfaced after one `train_batch` call, aggregated by the Pipeline
/// into the Cycle Result.
#[derive(Debug, Clone)]
pub struct BatchUpdateStats {
    pub loss: f64,
    pub grad_norm: f64,
    pub target_synced: bool,
    /// One TD error per transition in the batch, in the same order as the
    /// sampled batch's `indices` — fed to `ReplayBuffer::update_priorities`.
    pub td_errors: Vec<f64>,
}

/// The DQN Agent. Owns the online network θ, the target
/// network θ⁻, and the epsilon schedule. The Agent conceptually owns the
/// Replay Buffer too, but the buffer lives in
/// [`crate::training`] so the Pipeline can merge self-play transitions into
/// it between cycles without borrowing the agent mutably at the same time;
/// `train_batch` here takes an already-sampled batch rather than the buffer
/// itself.
pub struct Agent {
    pub online: QNetwork,
    pub target: QNetwork,
    rl: RlConfig,
    update_counter: u64,
    epsilon: f64,
}

impl Agent {
    pub fn new(network: &NetworkConfig, rl: &RlConfig, seed: Option<u64>) -> Result<Self> {
        let online = NetworkBackendKind::Dqn.build(network, seed)?;
        let mut target = NetworkBackendKind::Dqn.build(network, seed.map(|s| s.wrapping_add(1)))?;
        online.copy_weights_to(&mut target)?;
        Ok(Self {
            online,
            target,
            rl: rl.clone(),
            update_counter: 0,
            epsilon: rl.exploration_rate,
        })
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn update_count(&self) -> u64 {
        self.update_counter
    }

    /// `select_action(s, L)`: ε-greedy over the legal set
    /// with tie-break by smallest index, using the agent's own decayed ε.
    pub fn select_action(&self, state: &[f32], legal: &[u16], rng: &mut StdRng) -> u16 {
        self.act_with_epsilon(state, legal, rng, self.epsilon)
    }

    /// Same ε-greedy policy as [`Self::select_action`] but with an
    /// explicit `eval_epsilon` rather than the agent's training schedule —
    /// used by the Baseline Evaluator, which plays at a fixed, usually
    /// greedy (`0.0`), exploration rate independent of training progress.
    pub fn act_eval(&self, state: &[f32], legal: &[u16], rng: &mut StdRng, eval_epsilon: f64) -> u16 {
        self.act_with_epsilon(state, legal, rng, eval_epsilon)
    }

    fn act_with_epsilon(&self, state: &[f32], legal: &[u16], rng: &mut StdRng, epsilon: f64) -> u16 {
        if legal.is_empty() {
            return 0;
        }
        if rng.random_range(0.0..1.0) < epsilon {
            return legal[rng.random_range(0..legal.len())];
        }

        let q = self.online.predict(std::slice::from_ref(&state.to_vec()));
        let q = &q[0];
        let nan_detected = legal.iter().any(|&a| !q[a as usize].is_finite());
        if nan_detected {
            // Fall back to a random legal action and flag the step via the
            // caller's logging, not a panic.
            log::warn!("non-finite Q-value during action selection; falling back to random legal action");
            return legal[rng.random_range(0..legal.len())];
        }

        let mut best = legal[0];
        let mut best_q = q[best as usize];
        for &a in &legal[1..] {
            let qa = q[a as usize];
            if qa > best_q {
                best = a;
                best_q = qa;
            }
        }
        best
    }

    /// `train_batch(transitions)`: builds targets, invokes
    /// the backend, synchronizes the target network every `T` updates.
    pub fn train_batch(&mut self, transitions: &[Transition], is_weights: Option<&[f64]>) -> Result<BatchUpdateStats> {
        let states: Vec<Vec<f32>> = transitions.iter().map(|t| t.state.clone()).collect();
        let next_states: Vec<Vec<f32>> = transitions.iter().map(|t| t.next_state.clone()).collect();

        let q_online_current = self.online.predict(&states);
        let q_online_next = self.online.predict(&next_states);
        let q_target_next = self.target.predict(&next_states);

        let mut targets = q_online_current;
        for (i, t) in transitions.iter().enumerate() {
            let bootstrap = if t.done {
                0.0
            } else {
                let legal: Vec<u16> = t
                    .next_legal_actions
                    .clone()
                    .unwrap_or_else(|| (0..crate::encoding::ACTION_DIM as u16).collect());
                let q_next_best = if legal.is_empty() {
                    0.0
                } else if self.rl.double_dqn {
                    let a_star = argmax_over(&q_online_next[i], &legal);
                    q_target_next[i][a_star as usize] as f64
                } else {
                    legal
                        .iter()
                        .map(|&a| q_target_next[i][a as usize] as f64)
                        .fold(f64::NEG_INFINITY, f64::max)
                };
                self.rl.gamma * q_next_best
            };
            let y = t.reward + bootstrap;
            targets[i][t.action as usize] = y as f32;
        }

        let stats = self
            .online
            .train_batch(&states, &targets, is_weights)
            .map_err(|e| ChessRlError::TrainingDiverged(e.to_string()))?;

        self.update_counter += 1;
        let target_synced = self.update_counter % self.rl.target_update_frequency == 0;
        if target_synced {
            self.online.copy_weights_to(&mut self.target)?;
        }

        Ok(BatchUpdateStats { loss: stats.loss, grad_norm: stats.grad_norm, target_synced, td_errors: stats.td_errors })
    }

    /// Linear epsilon decay from `ε_start` to `ε_end` across
    /// `exploration_decay_updates` updates.
    pub fn decay_epsilon(&mut self) {
        let frac = (self.update_counter as f64 / self.rl.exploration_decay_updates.max(1) as f64).min(1.0);
        self.epsilon = self.rl.exploration_rate + frac * (self.rl.exploration_rate_end - self.rl.exploration_rate);
    }
}

fn argmax_over(q: &[f32], legal: &[u16]) -> u16 {
    let mut best = legal[0];
    let mut best_q = q[best as usize];
    for &a in &legal[1..] {
        let qa = q[a as usize];
        if qa > best_q {
            best = a;
            best_q = qa;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NetworkConfig, RlConfig};
    use crate::replay::Transition;
    use rand::SeedableRng;

    fn small_config() -> (NetworkConfig, RlConfig) {
        (
            NetworkConfig { hidden_layers: vec![16], ..NetworkConfig::default() },
            RlConfig { target_update_frequency: 2, ..RlConfig::default() },
        )
    }

    #[test]
    fn online_and_target_start_synchronized() {
        let (net, rl) = small_config();
        let agent = Agent::new(&net, &rl, Some(1)).unwrap();
        let state = vec![0.1f32; crate::encoding::STATE_DIM];
        let a = agent.online.predict(&[state.clone()]);
        let b = agent.target.predict(&[state]);
        assert_eq!(a, b);
    }

    #[test]
    fn select_action_respects_legal_set() {
        let (net, rl) = small_config();
        let mut agent = Agent::new(&net, &rl, Some(1)).unwrap();
        agent.epsilon = 0.0;
        let state = vec![0.0f32; crate::encoding::STATE_DIM];
        let legal = vec![10u16, 20, 30];
        let mut rng = StdRng::seed_from_u64(5);
        let action = agent.select_action(&state, &legal, &mut rng);
        assert!(legal.contains(&action));
    }

    #[test]
    fn target_syncs_every_t_updates() {
        let (net, rl) = small_config();
        let mut agent = Agent::new(&net, &rl, Some(2)).unwrap();
        let t = Transition {
            state: vec![0.0; crate::encoding::STATE_DIM],
            action: 5,
            reward: 1.0,
            next_state: vec![0.0; crate::encoding::STATE_DIM],
            done: true,
            next_legal_actions: Some(vec![]),
        };
        let batch = vec![t; 4];
        let s1 = agent.train_batch(&batch, None).unwrap();
        assert!(!s1.target_synced);
        let s2 = agent.train_batch(&batch, None).unwrap();
        assert!(s2.target_synced);
        assert_eq!(agent.update_count(), 2);
    }

    #[test]
    fn epsilon_decays_toward_end_value() {
        let (net, mut rl) = small_config();
        rl.exploration_decay_updates = 4;
        rl.exploration_rate = 0.5;
        rl.exploration_rate_end = 0.1;
        let mut agent = Agent::new(&net, &rl, Some(3)).unwrap();
        let t = Transition {
            state: vec![0.0; crate::encoding::STATE_DIM],
            action: 1,
            reward: 0.0,
            next_state: vec![0.0; crate::encoding::STATE_DIM],
            done: true,
            next_legal_actions: Some(vec![]),
        };
        let batch = vec![t; 2];
        for _ in 0..4 {
            agent.train_batch(&batch, None).unwrap();
            agent.decay_epsilon();
        }
        assert!((agent.epsilon() - 0.1).abs() < 1e-9);
    }
}
