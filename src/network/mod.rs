//! Network Backend: the Q-network contract consumed by the
//! Agent, plus its concrete `tch`-based implementation.

mod model_io;
mod qnetwork;

pub use qnetwork::QNetwork;

use std::any::Any;
use std::path::Path;

use crate::config::NetworkConfig;
use crate::Result;

/// Stats returned by one `train_batch` call. `td_errors` is one
/// per-sample TD error (the absolute difference between the row's
/// prediction and its target at the index that changed), fed back into
/// the prioritized replay buffer's `update_priorities`.
#[derive(Debug, Clone)]
pub struct TrainStepStats {
    pub loss: f64,
    pub grad_norm: f64,
    pub td_errors: Vec<f64>,
}

/// Backend-agnostic Q-network contract.
pub trait NetworkBackend: Send {
    /// `predict(x: ℝ^{B×839}) → ℝ^{B×4096}`.
    fn predict(&self, states: &[Vec<f32>]) -> Vec<Vec<f32>>;

    /// `train_batch(x, y, is_weights?) → loss`. `is_weights`
    /// carries prioritized-replay importance-sampling weights (`None` for
    /// uniform replay, equivalent to all-ones). Returns `Err` on
    /// non-finite loss.
    fn train_batch(&mut self, states: &[Vec<f32>], targets: &[Vec<f32>], is_weights: Option<&[f64]>) -> Result<TrainStepStats>;

    /// Parameter-by-parameter duplication. Backends MUST reject cross-backend
    /// copies.
    fn copy_weights_to(&self, other: &mut dyn NetworkBackend) -> Result<()>;

    fn save(&self, path: &Path) -> Result<()>;

    fn load(&mut self, path: &Path) -> Result<()>;

    fn parameter_count(&self) -> i64;

    /// Backend id, recorded in checkpoint metadata.
    fn backend_id(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Explicit factory keyed by enum. Only the
/// native dense DQN backend is implemented; an alternate backend is
/// explicitly out of scope for this crate and deliberately not stubbed out,
/// so the switch point matches the factory shape without fabricating an
/// unused dependency (see `DESIGN.md`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkBackendKind {
    Dqn,
}

impl NetworkBackendKind {
    pub fn build(self, config: &NetworkConfig, seed: Option<u64>) -> Result<QNetwork> {
        match self {
            NetworkBackendKind::Dqn => QNetwork::new(config, seed),
        }
    }
}
