//! `tch`-based dense Q-network: a `nn::VarStore`-owned stack of dense
//! layers, He-style init applied via `tch::no_grad`, and an `nn::Adam`
//! optimizer built with `OptimizerConfig::build`.

use std::any::Any;
use std::path::Path;

use tch::nn::OptimizerConfig;
use tch::{nn, Device, Kind, Tensor};

use crate::config::NetworkConfig;
use crate::encoding::{ACTION_DIM, STATE_DIM};
use crate::network::model_io;
use crate::network::{NetworkBackend, TrainStepStats};
use crate::{ChessRlError, Result};

pub struct QNetwork {
    vs: nn::VarStore,
    layers: Vec<nn::Linear>,
    optimizer: nn::Optimizer,
    config: NetworkConfig,
}

impl QNetwork {
    pub fn new(config: &NetworkConfig, seed: Option<u64>) -> Result<Self> {
        if config.optimizer != "adam" {
            return Err(ChessRlError::ConfigInvalid(format!(
                "network.optimizer {:?}: only \"adam\" is implemented",
                config.optimizer
            )));
        }
        if let Some(seed) = seed {
            tch::manual_seed(seed as i64);
        }

        let vs = nn::VarStore::new(Device::Cpu);
        let root = vs.root();

        let mut dims = vec![STATE_DIM as i64];
        dims.extend(config.hidden_layers.iter().copied());
        dims.push(ACTION_DIM as i64);

        let mut layers = Vec::with_capacity(dims.len() - 1);
        for (i, w) in dims.windows(2).enumerate() {
            layers.push(nn::linear(&root / format!("fc{i}"), w[0], w[1], Default::default()));
        }

        he_init(&vs);

        let optimizer = nn::Adam { wd: config.l2, ..Default::default() }
            .build(&vs, config.learning_rate)
            .map_err(|e| ChessRlError::Backend(format!("optimizer build: {e}")))?;

        Ok(Self { vs, layers, optimizer, config: config.clone() })
    }

    fn forward(&self, x: &Tensor) -> Tensor {
        let last = self.layers.len() - 1;
        let mut h = x.shallow_clone();
        for (i, layer) in self.layers.iter().enumerate() {
            h = h.apply(layer);
            if i != last {
                h = h.relu();
            }
        }
        h
    }

    fn states_to_tensor(states: &[Vec<f32>]) -> Tensor {
        let batch = states.len() as i64;
        let flat: Vec<f32> = states.iter().flat_map(|s| s.iter().copied()).collect();
        Tensor::from_slice(&flat).view([batch, STATE_DIM as i64])
    }

    fn tensor_to_rows(t: &Tensor, cols: usize) -> Vec<Vec<f32>> {
        let flat: Vec<f32> = Vec::<f32>::try_from(t.flatten(0, -1)).unwrap_or_default();
        flat.chunks_exact(cols).map(|c| c.to_vec()).collect()
    }

    /// Per-sample Huber loss with δ=1.0 (summed over the
    /// action dimension, one scalar per row), computed manually so the
    /// behavior does not depend on a particular `tch` smooth-L1 binding.
    /// Since `target` equals `pred` at every index except the one action
    /// actually taken, the row sum collapses to the loss at that index.
    fn huber_loss_per_sample(pred: &Tensor, target: &Tensor, delta: f64) -> Tensor {
        let diff = pred - target;
        let abs_diff = diff.abs();
        let quadratic = abs_diff.clamp_max(delta);
        let linear = &abs_diff - &quadratic;
        (0.5 * quadratic.pow_tensor_scalar(2.0) + delta * linear).sum_dim_intlist(&[1i64][..], false, Kind::Float)
    }

    fn clip_gradients(&self) -> f64 {
        let clip = self.config.gradient_clip;
        let mut max_norm_sq = 0.0f64;
        tch::no_grad(|| {
            for (_, tensor) in self.vs.variables() {
                let grad = tensor.grad();
                if grad.defined() {
                    let norm = grad.norm().double_value(&[]);
                    max_norm_sq += norm * norm;
                    let _ = grad.clamp_(-clip, clip);
                }
            }
        });
        max_norm_sq.sqrt()
    }
}

fn he_init(vs: &nn::VarStore) {
    for (_name, mut param) in vs.variables() {
        let size = param.size();
        tch::no_grad(|| match size.len() {
            2 => {
                let fan_in = size[1] as f64;
                let bound = (6.0 / fan_in).sqrt();
                let _ = param.f_uniform_(-bound, bound).unwrap();
            }
            1 => {
                let _ = param.f_zero_().unwrap();
            }
            _ => {}
        });
    }
}

impl NetworkBackend for QNetwork {
    fn predict(&self, states: &[Vec<f32>]) -> Vec<Vec<f32>> {
        let x = Self::states_to_tensor(states);
        let out = tch::no_grad(|| self.forward(&x));
        Self::tensor_to_rows(&out, ACTION_DIM)
    }

    fn train_batch(&mut self, states: &[Vec<f32>], targets: &[Vec<f32>], is_weights: Option<&[f64]>) -> Result<TrainStepStats> {
        let x = Self::states_to_tensor(states);
        let y = Self::states_to_tensor(targets);
        let batch = states.len() as i64;

        let pred = self.forward(&x);
        let per_sample = Self::huber_loss_per_sample(&pred, &y, 1.0);

        let weights_tensor = match is_weights {
            Some(w) => Tensor::from_slice(&w.iter().map(|&v| v as f32).collect::<Vec<f32>>()),
            None => Tensor::ones([batch], (Kind::Float, Device::Cpu)),
        };
        let loss = (&per_sample * &weights_tensor).mean(Kind::Float);
        let loss_value = loss.double_value(&[]);
        if !loss_value.is_finite() {
            return Err(ChessRlError::Backend(format!(
                "non-finite loss during train_batch: {loss_value}"
            )));
        }

        let td_errors: Vec<f64> = tch::no_grad(|| {
            let abs_diff = (&pred - &y).abs();
            let per_row_max = abs_diff.amax(&[1i64][..], false);
            Vec::<f64>::try_from(per_row_max).unwrap_or_else(|_| vec![0.0; states.len()])
        });

        self.optimizer.zero_grad();
        loss.backward();
        let grad_norm = self.clip_gradients();
        self.optimizer.step();

        Ok(TrainStepStats { loss: loss_value, grad_norm, td_errors })
    }

    fn copy_weights_to(&self, other: &mut dyn NetworkBackend) -> Result<()> {
        let other = other
            .as_any_mut()
            .downcast_mut::<QNetwork>()
            .ok_or_else(|| ChessRlError::Backend("copy_weights_to: cross-backend copy rejected".into()))?;

        let source: std::collections::HashMap<String, Tensor> = self.vs.variables();
        tch::no_grad(|| {
            for (name, mut target_var) in other.vs.variables() {
                if let Some(src) = source.get(&name) {
                    target_var.copy_(src);
                }
            }
        });
        Ok(())
    }

    fn save(&self, path: &Path) -> Result<()> {
        model_io::save_varstore(&self.vs, path)
    }

    fn load(&mut self, path: &Path) -> Result<()> {
        model_io::load_varstore(&mut self.vs, path)
    }

    fn parameter_count(&self) -> i64 {
        self.vs.variables().values().map(|t| t.numel() as i64).sum()
    }

    fn backend_id(&self) -> &'static str {
        "tch-dense-dqn"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> NetworkConfig {
        NetworkConfig { hidden_layers: vec![32, 16], ..NetworkConfig::default() }
    }

    #[test]
    fn predict_has_expected_shape() {
        let net = QNetwork::new(&config(), Some(1)).unwrap();
        let states = vec![vec![0.0f32; STATE_DIM]; 3];
        let out = net.predict(&states);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].len(), ACTION_DIM);
        assert!(out[0].iter().all(|x| x.is_finite()));
    }

    #[test]
    fn same_seed_gives_same_predictions() {
        let net_a = QNetwork::new(&config(), Some(42)).unwrap();
        let net_b = QNetwork::new(&config(), Some(42)).unwrap();
        let states = vec![vec![0.1f32; STATE_DIM]];
        assert_eq!(net_a.predict(&states), net_b.predict(&states));
    }

    #[test]
    fn train_batch_reduces_loss_on_repeated_target() {
        let mut net = QNetwork::new(&config(), Some(7)).unwrap();
        let states = vec![vec![0.2f32; STATE_DIM]; 4];
        let targets = vec![vec![0.0f32; ACTION_DIM]; 4];
        let first = net.train_batch(&states, &targets, None).unwrap();
        let first_loss = first.loss;
        let mut last = first;
        for _ in 0..20 {
            last = net.train_batch(&states, &targets, None).unwrap();
        }
        assert!(last.loss <= first_loss);
        assert!(last.loss.is_finite());
    }

    #[test]
    fn save_load_roundtrips_predictions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q.safetensors");
        let net = QNetwork::new(&config(), Some(3)).unwrap();
        net.save(&path).unwrap();

        let mut net2 = QNetwork::new(&config(), Some(99)).unwrap();
        net2.load(&path).unwrap();

        let states = vec![vec![0.05f32; STATE_DIM]];
        let p1 = net.predict(&states);
        let p2 = net2.predict(&states);
        for (a, b) in p1[0].iter().zip(p2[0].iter()) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn copy_weights_to_matches_source_predictions() {
        let net = QNetwork::new(&config(), Some(5)).unwrap();
        let mut target = QNetwork::new(&config(), Some(123)).unwrap();
        net.copy_weights_to(&mut target).unwrap();

        let states = vec![vec![0.3f32; STATE_DIM]];
        assert_eq!(net.predict(&states), target.predict(&states));
    }

    #[test]
    fn parameter_count_is_positive() {
        let net = QNetwork::new(&config(), Some(1)).unwrap();
        assert!(net.parameter_count() > 0);
    }

    #[test]
    fn rejects_unsupported_optimizer() {
        let cfg = NetworkConfig { optimizer: "sgd".to_string(), ..config() };
        assert!(QNetwork::new(&cfg, Some(1)).is_err());
    }
}
