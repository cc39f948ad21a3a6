//! Replay Buffer: uniform FIFO or
//! prioritized storage of transitions with bounded capacity.

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::RlConfig;

/// A single `(s, a, r, s', done)` tuple.
/// Immutable once stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transition {
    pub state: Vec<f32>,
    pub action: u16,
    pub reward: f64,
    pub next_state: Vec<f32>,
    pub done: bool,
    /// `L(s')`, the legal action set at `next_state`, used by Double-DQN /
    /// vanilla target computation. `None` when the
    /// legal set is unavailable (documented degradation in `spec.md` §4.6).
    pub next_legal_actions: Option<Vec<u16>>,
}

/// A sampled minibatch, with importance-sampling weights (all `1.0` for
/// uniform replay) and buffer indices (needed to feed back TD errors for
/// prioritized replay, `spec.md` §4.5).
pub struct SampledBatch {
    pub transitions: Vec<Transition>,
    pub indices: Vec<usize>,
    pub is_weights: Vec<f64>,
}

enum Storage {
    Uniform { buffer: std::collections::VecDeque<Transition> },
    Prioritized { entries: Vec<(Transition, f64)>, next: usize, alpha: f64, beta: f64 },
}

/// Bounded transition store, either uniform (FIFO eviction) or prioritized
/// (`pᵅ`-weighted sampling with importance weights), per `spec.md` §4.5.
pub struct ReplayBuffer {
    storage: Storage,
    capacity: usize,
}

impl ReplayBuffer {
    pub fn new(config: &RlConfig) -> Self {
        let storage = match config.replay_type {
            crate::config::ReplayType::Uniform => {
                Storage::Uniform { buffer: std::collections::VecDeque::with_capacity(config.max_experience_buffer) }
            }
            crate::config::ReplayType::Prioritized => Storage::Prioritized {
                entries: Vec::with_capacity(config.max_experience_buffer),
                next: 0,
                alpha: config.priority_alpha,
                beta: config.priority_beta0,
            },
        };
        Self { storage, capacity: config.max_experience_buffer }
    }

    pub fn len(&self) -> usize {
        match &self.storage {
            Storage::Uniform { buffer } => buffer.len(),
            Storage::Prioritized { entries, .. } => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// `set_beta` lets the pipeline anneal β toward 1.0 over the run; a
    /// no-op for uniform replay.
    pub fn set_beta(&mut self, beta: f64) {
        if let Storage::Prioritized { beta: b, .. } = &mut self.storage {
            *b = beta;
        }
    }

    /// `add(τ)`: O(1) for uniform; initial priority `p_max` for prioritized.
    /// Invariant: `|B| ≤ C_max` after every insert.
    pub fn add(&mut self, transition: Transition) {
        match &mut self.storage {
            Storage::Uniform { buffer } => {
                if buffer.len() >= self.capacity {
                    buffer.pop_front();
                }
                buffer.push_back(transition);
            }
            Storage::Prioritized { entries, next, .. } => {
                let p_max = entries.iter().map(|(_, p)| *p).fold(1.0, f64::max);
                if entries.len() < self.capacity {
                    entries.push((transition, p_max));
                } else {
                    entries[*next] = (transition, p_max);
                    *next = (*next + 1) % self.capacity;
                }
            }
        }
        debug_assert!(self.len() <= self.capacity);
    }

    /// `sample(n)`: uniform without replacement when `n ≤ |B|`; for
    /// prioritized replay, weighted by `pᵅ` with importance weights
    /// `wᵢ = (1/(N·Pᵢ))^β`, normalized by the batch max.
    pub fn sample(&self, n: usize, rng: &mut StdRng) -> Option<SampledBatch> {
        if self.len() < n || n == 0 {
            return None;
        }
        match &self.storage {
            Storage::Uniform { buffer } => {
                let mut indices: Vec<usize> = (0..buffer.len()).collect();
                partial_shuffle(&mut indices, n, rng);
                indices.truncate(n);
                let transitions = indices.iter().map(|&i| buffer[i].clone()).collect();
                Some(SampledBatch { transitions, indices, is_weights: vec![1.0; n] })
            }
            Storage::Prioritized { entries, alpha, beta, .. } => {
                let weights: Vec<f64> = entries.iter().map(|(_, p)| p.powf(*alpha)).collect();
                let total: f64 = weights.iter().sum();
                if total <= 0.0 {
                    return None;
                }
                let probs: Vec<f64> = weights.iter().map(|w| w / total).collect();
                let indices = weighted_sample_without_replacement(&probs, n, rng);
                let n_total = entries.len() as f64;
                let raw_weights: Vec<f64> = indices
                    .iter()
                    .map(|&i| (1.0 / (n_total * probs[i])).powf(*beta))
                    .collect();
                let max_w = raw_weights.iter().cloned().fold(0.0, f64::max).max(1e-12);
                let is_weights = raw_weights.into_iter().map(|w| w / max_w).collect();
                let transitions = indices.iter().map(|&i| entries[i].0.clone()).collect();
                Some(SampledBatch { transitions, indices, is_weights })
            }
        }
    }

    /// `update_priorities(indices, td_errors)`. No-op for
    /// uniform replay.
    pub fn update_priorities(&mut self, indices: &[usize], td_errors: &[f64]) {
        if let Storage::Prioritized { entries, .. } = &mut self.storage {
            for (&idx, &err) in indices.iter().zip(td_errors) {
                if let Some((_, p)) = entries.get_mut(idx) {
                    *p = err.abs().max(1e-6);
                }
            }
        }
    }
}

/// Partial Fisher-Yates: after this call the first `n.min(indices.len())`
/// slots hold a uniform sample without replacement. Callers must
/// `truncate(n)` afterward to drop the unsampled remainder.
fn partial_shuffle(indices: &mut [usize], n: usize, rng: &mut StdRng) {
    let len = indices.len();
    for i in 0..n.min(len) {
        let j = rng.random_range(i..len);
        indices.swap(i, j);
    }
}

fn weighted_sample_without_replacement(probs: &[f64], n: usize, rng: &mut StdRng) -> Vec<usize> {
    let mut remaining: Vec<(usize, f64)> = probs.iter().copied().enumerate().collect();
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        let total: f64 = remaining.iter().map(|(_, p)| p).sum();
        if total <= 0.0 {
            break;
        }
        let mut target = rng.random_range(0.0..total);
        let mut pick = remaining.len() - 1;
        for (i, (_, p)) in remaining.iter().enumerate() {
            if target < *p {
                pick = i;
                break;
            }
            target -= p;
        }
        out.push(remaining.remove(pick).0);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ReplayType, RlConfig};
    use rand::SeedableRng;

    fn transition(action: u16) -> Transition {
        Transition {
            state: vec![0.0; 4],
            action,
            reward: 0.0,
            next_state: vec![0.0; 4],
            done: false,
            next_legal_actions: Some(vec![action]),
        }
    }

    #[test]
    fn uniform_capacity_is_enforced_via_fifo_eviction() {
        let mut cfg = RlConfig::default();
        cfg.max_experience_buffer = 3;
        let mut buf = ReplayBuffer::new(&cfg);
        for i in 0..10u16 {
            buf.add(transition(i));
            assert!(buf.len() <= buf.capacity());
        }
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn uniform_sample_without_replacement_returns_distinct_indices() {
        let mut cfg = RlConfig::default();
        cfg.max_experience_buffer = 100;
        let mut buf = ReplayBuffer::new(&cfg);
        for i in 0..20u16 {
            buf.add(transition(i));
        }
        let mut rng = StdRng::seed_from_u64(1);
        let batch = buf.sample(10, &mut rng).unwrap();
        assert_eq!(batch.transitions.len(), 10);
        let mut idx = batch.indices.clone();
        idx.sort_unstable();
        idx.dedup();
        assert_eq!(idx.len(), 10);
        assert!(batch.is_weights.iter().all(|&w| w == 1.0));
    }

    #[test]
    fn sample_returns_none_when_insufficient_transitions() {
        let cfg = RlConfig::default();
        let mut buf = ReplayBuffer::new(&cfg);
        buf.add(transition(1));
        let mut rng = StdRng::seed_from_u64(1);
        assert!(buf.sample(5, &mut rng).is_none());
    }

    #[test]
    fn prioritized_capacity_enforced_and_weights_positive() {
        let mut cfg = RlConfig::default();
        cfg.replay_type = ReplayType::Prioritized;
        cfg.max_experience_buffer = 5;
        let mut buf = ReplayBuffer::new(&cfg);
        for i in 0..20u16 {
            buf.add(transition(i));
        }
        assert_eq!(buf.len(), 5);
        let mut rng = StdRng::seed_from_u64(2);
        let batch = buf.sample(3, &mut rng).unwrap();
        assert_eq!(batch.transitions.len(), 3);
        assert!(batch.is_weights.iter().all(|&w| w > 0.0 && w <= 1.0 + 1e-9));
    }

    #[test]
    fn update_priorities_changes_future_sampling_distribution() {
        let mut cfg = RlConfig::default();
        cfg.replay_type = ReplayType::Prioritized;
        cfg.max_experience_buffer = 10;
        let mut buf = ReplayBuffer::new(&cfg);
        for i in 0..10u16 {
            buf.add(transition(i));
        }
        buf.update_priorities(&[0], &[100.0]);
        // Should not panic and should still be sampleable.
        let mut rng = StdRng::seed_from_u64(3);
        assert!(buf.sample(5, &mut rng).is_some());
    }
}
