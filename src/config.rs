//! Typed configuration surface for the training core.
//!
//! Generalizes a flat `clap::Parser` config into nested groups, validated
//! once at startup and frozen for the lifetime of a run.

use serde::{Deserialize, Serialize};

use crate::{ChessRlError, Result};

/// Network architecture and optimizer hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    pub hidden_layers: Vec<i64>,
    pub learning_rate: f64,
    pub batch_size: usize,
    pub optimizer: String,
    pub l2: f64,
    pub gradient_clip: f64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            hidden_layers: vec![512, 256, 128],
            learning_rate: 1e-3,
            batch_size: 64,
            optimizer: "adam".to_string(),
            l2: 0.0,
            gradient_clip: 1.0,
        }
    }
}

/// Reinforcement-learning hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RlConfig {
    pub exploration_rate: f64,
    pub exploration_rate_end: f64,
    pub exploration_decay_updates: u64,
    pub target_update_frequency: u64,
    pub max_experience_buffer: usize,
    pub gamma: f64,
    pub double_dqn: bool,
    pub replay_type: ReplayType,
    pub priority_alpha: f64,
    pub priority_beta0: f64,
}

impl Default for RlConfig {
    fn default() -> Self {
        Self {
            exploration_rate: 0.1,
            exploration_rate_end: 0.02,
            exploration_decay_updates: 10_000,
            target_update_frequency: 100,
            max_experience_buffer: 50_000,
            gamma: 0.99,
            double_dqn: false,
            replay_type: ReplayType::Uniform,
            priority_alpha: 0.6,
            priority_beta0: 0.4,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
pub enum ReplayType {
    Uniform,
    Prioritized,
}

impl std::str::FromStr for ReplayType {
    type Err = ChessRlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "UNIFORM" => Ok(ReplayType::Uniform),
            "PRIORITIZED" => Ok(ReplayType::Prioritized),
            other => Err(ChessRlError::ConfigInvalid(format!(
                "replayType: unknown variant {other:?}, expected UNIFORM|PRIORITIZED"
            ))),
        }
    }
}

/// Self-play orchestration knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SelfPlayConfig {
    pub games_per_cycle: usize,
    pub max_concurrent_games: usize,
    pub max_steps_per_game: usize,
    pub max_cycles: usize,
    pub max_batches_per_cycle: usize,
    pub worker_timeout_secs: u64,
    /// Fraction of `games_per_cycle` that must succeed for the cycle to
    /// proceed; the orchestrator requires `min(min_success_ratio, 0.5) * N`
    /// (`spec.md` §4.7).
    pub min_success_ratio: f64,
}

impl Default for SelfPlayConfig {
    fn default() -> Self {
        Self {
            games_per_cycle: 20,
            max_concurrent_games: 4,
            max_steps_per_game: 80,
            max_cycles: 100,
            max_batches_per_cycle: 50,
            worker_timeout_secs: 120,
            min_success_ratio: 0.8,
        }
    }
}

/// Reward shaping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RewardConfig {
    pub win_reward: f64,
    pub loss_reward: f64,
    pub draw_reward: f64,
    pub step_limit_penalty: f64,
    pub enable_position_rewards: bool,
    pub invalid_action_reward: f64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            win_reward: 1.0,
            loss_reward: -1.0,
            draw_reward: -0.2,
            step_limit_penalty: -1.0,
            enable_position_rewards: false,
            invalid_action_reward: -0.05,
        }
    }
}

/// Opponent used by a worker's Black side during self-play.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
pub enum OpponentType {
    #[value(name = "self")]
    SelfPlay,
    Minimax,
    Heuristic,
}

impl std::str::FromStr for OpponentType {
    type Err = ChessRlError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "self" => Ok(OpponentType::SelfPlay),
            "minimax" => Ok(OpponentType::Minimax),
            "heuristic" => Ok(OpponentType::Heuristic),
            other => Err(ChessRlError::ConfigInvalid(format!(
                "trainOpponentType: unknown variant {other:?}"
            ))),
        }
    }
}

/// Environment configuration used during training self-play.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainEnvConfig {
    pub early_adjudication: bool,
    pub resign_material_threshold: i32,
    pub no_progress_plies: u32,
    pub opponent_type: OpponentType,
    pub opponent_depth: u8,
    /// Softmax temperature for top-K sampling over the minimax
    /// training opponent's root moves; `None` always plays the single best
    /// move (`spec.md` §4.10).
    pub opponent_tau: Option<f64>,
}

impl Default for TrainEnvConfig {
    fn default() -> Self {
        Self {
            early_adjudication: false,
            resign_material_threshold: 12,
            no_progress_plies: 80,
            opponent_type: OpponentType::SelfPlay,
            opponent_depth: 2,
            opponent_tau: None,
        }
    }
}

/// Environment configuration used during evaluation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvalEnvConfig {
    pub early_adjudication: bool,
    pub resign_material_threshold: i32,
    pub no_progress_plies: u32,
    pub eval_epsilon: f64,
    pub evaluation_games: usize,
}

impl Default for EvalEnvConfig {
    fn default() -> Self {
        Self {
            early_adjudication: false,
            resign_material_threshold: 15,
            no_progress_plies: 100,
            eval_epsilon: 0.0,
            evaluation_games: 100,
        }
    }
}

/// System-level knobs: seeding, checkpoint directory and retention policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemConfig {
    pub seed: Option<u64>,
    pub engine_backend: crate::engine::EngineBackend,
    pub checkpoint_directory: String,
    pub checkpoint_interval: usize,
    pub checkpoint_max_versions: usize,
    pub checkpoint_keep_every: Option<usize>,
    pub checkpoint_validation: bool,
    pub checkpoint_compression: bool,
    pub evaluation_interval: usize,
    pub metrics_file: Option<String>,
    pub plateau_patience: Option<usize>,
    pub log_directory: Option<String>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            seed: None,
            engine_backend: crate::engine::EngineBackend::Builtin,
            checkpoint_directory: "checkpoints".to_string(),
            checkpoint_interval: 5,
            checkpoint_max_versions: 10,
            checkpoint_keep_every: None,
            checkpoint_validation: true,
            checkpoint_compression: false,
            evaluation_interval: 5,
            metrics_file: Some("metrics.csv".to_string()),
            plateau_patience: None,
            log_directory: None,
        }
    }
}

/// The complete, frozen run configuration composed from the groups above.
///
/// Constructed via [`RunConfig::profile`] or [`RunConfig::default`], then
/// mutated by `--override k=v` pairs via [`RunConfig::apply_override`], then
/// validated once with [`RunConfig::validate`] before a run starts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RunConfig {
    pub network: NetworkConfig,
    pub rl: RlConfig,
    pub selfplay: SelfPlayConfig,
    pub reward: RewardConfig,
    pub train_env: TrainEnvConfig,
    pub eval_env: EvalEnvConfig,
    pub system: SystemConfig,
}

impl RunConfig {
    /// Resolve a named profile.
    ///
    /// Unknown names fall back to `default`; `fast-debug` is tuned to
    /// complete a couple of cycles quickly for smoke-testing the pipeline.
    pub fn profile(name: &str) -> Self {
        match name {
            "fast-debug" => Self {
                selfplay: SelfPlayConfig {
                    max_cycles: 2,
                    games_per_cycle: 5,
                    max_concurrent_games: 2,
                    max_steps_per_game: 40,
                    max_batches_per_cycle: 10,
                    worker_timeout_secs: 30,
                    ..SelfPlayConfig::default()
                },
                network: NetworkConfig {
                    batch_size: 32,
                    ..NetworkConfig::default()
                },
                system: SystemConfig {
                    seed: Some(12345),
                    checkpoint_interval: 1,
                    evaluation_interval: 1,
                    ..SystemConfig::default()
                },
                ..Self::default()
            },
            "deep" => Self {
                network: NetworkConfig {
                    hidden_layers: vec![768, 512, 256],
                    ..NetworkConfig::default()
                },
                ..Self::default()
            },
            _ => Self::default(),
        }
    }

    /// Apply a single `key=value` override, using dotted paths matching the
    /// group names above (e.g. `network.learningRate=5e-4`, `rl.gamma=0.95`).
    pub fn apply_override(&mut self, kv: &str) -> Result<()> {
        let (key, value) = kv.split_once('=').ok_or_else(|| {
            ChessRlError::ConfigInvalid(format!("--override {kv:?}: expected key=value"))
        })?;

        macro_rules! parse_field {
            ($field:expr, $ty:ty) => {
                $field = value.parse::<$ty>().map_err(|e| {
                    ChessRlError::ConfigInvalid(format!("--override {key}: {e}"))
                })?
            };
        }

        match key {
            "network.learningRate" => parse_field!(self.network.learning_rate, f64),
            "network.batchSize" => parse_field!(self.network.batch_size, usize),
            "network.gradientClip" => parse_field!(self.network.gradient_clip, f64),
            "network.l2" => parse_field!(self.network.l2, f64),
            "network.hiddenLayers" => {
                self.network.hidden_layers = value
                    .split(',')
                    .map(|s| s.trim().parse::<i64>())
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(|e| ChessRlError::ConfigInvalid(format!("--override {key}: {e}")))?;
            }
            "rl.explorationRate" => parse_field!(self.rl.exploration_rate, f64),
            "rl.targetUpdateFrequency" => parse_field!(self.rl.target_update_frequency, u64),
            "rl.maxExperienceBuffer" => parse_field!(self.rl.max_experience_buffer, usize),
            "rl.gamma" => parse_field!(self.rl.gamma, f64),
            "rl.doubleDqn" => parse_field!(self.rl.double_dqn, bool),
            "rl.replayType" => self.rl.replay_type = value.parse()?,
            "selfplay.gamesPerCycle" => parse_field!(self.selfplay.games_per_cycle, usize),
            "selfplay.maxConcurrentGames" => {
                parse_field!(self.selfplay.max_concurrent_games, usize)
            }
            "selfplay.maxStepsPerGame" => parse_field!(self.selfplay.max_steps_per_game, usize),
            "selfplay.maxCycles" => parse_field!(self.selfplay.max_cycles, usize),
            "selfplay.maxBatchesPerCycle" => {
                parse_field!(self.selfplay.max_batches_per_cycle, usize)
            }
            "reward.winReward" => parse_field!(self.reward.win_reward, f64),
            "reward.lossReward" => parse_field!(self.reward.loss_reward, f64),
            "reward.drawReward" => parse_field!(self.reward.draw_reward, f64),
            "reward.stepLimitPenalty" => parse_field!(self.reward.step_limit_penalty, f64),
            "system.seed" => {
                self.system.seed = if value.eq_ignore_ascii_case("none") {
                    None
                } else {
                    Some(value.parse::<u64>().map_err(|e| {
                        ChessRlError::ConfigInvalid(format!("--override {key}: {e}"))
                    })?)
                }
            }
            "system.checkpointDirectory" => self.system.checkpoint_directory = value.to_string(),
            "system.checkpointInterval" => parse_field!(self.system.checkpoint_interval, usize),
            "system.checkpointMaxVersions" => {
                parse_field!(self.system.checkpoint_max_versions, usize)
            }
            "system.evaluationInterval" => parse_field!(self.system.evaluation_interval, usize),
            other => {
                return Err(ChessRlError::ConfigInvalid(format!(
                    "--override: unknown key {other:?}"
                )))
            }
        }
        Ok(())
    }

    /// Validate the frozen config before a run starts.
    pub fn validate(&self) -> Result<()> {
        if self.network.hidden_layers.is_empty() {
            return Err(ChessRlError::ConfigInvalid(
                "network.hiddenLayers must not be empty".to_string(),
            ));
        }
        if self.network.hidden_layers.iter().any(|&h| h <= 0) {
            return Err(ChessRlError::ConfigInvalid(
                "network.hiddenLayers entries must be positive".to_string(),
            ));
        }
        if self.network.learning_rate <= 0.0 {
            return Err(ChessRlError::ConfigInvalid(
                "network.learningRate must be positive".to_string(),
            ));
        }
        if self.network.batch_size == 0 {
            return Err(ChessRlError::ConfigInvalid(
                "network.batchSize must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.rl.gamma) {
            return Err(ChessRlError::ConfigInvalid(
                "rl.gamma must be in [0,1]".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.rl.exploration_rate) {
            return Err(ChessRlError::ConfigInvalid(
                "rl.explorationRate must be in [0,1]".to_string(),
            ));
        }
        if self.rl.target_update_frequency == 0 {
            return Err(ChessRlError::ConfigInvalid(
                "rl.targetUpdateFrequency must be positive".to_string(),
            ));
        }
        if self.rl.max_experience_buffer == 0 {
            return Err(ChessRlError::ConfigInvalid(
                "rl.maxExperienceBuffer must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.rl.priority_alpha) {
            return Err(ChessRlError::ConfigInvalid(
                "rl.priorityAlpha must be in [0,1]".to_string(),
            ));
        }
        if self.selfplay.games_per_cycle == 0 {
            return Err(ChessRlError::ConfigInvalid(
                "selfplay.gamesPerCycle must be positive".to_string(),
            ));
        }
        if self.selfplay.max_concurrent_games == 0 {
            return Err(ChessRlError::ConfigInvalid(
                "selfplay.maxConcurrentGames must be positive".to_string(),
            ));
        }
        if self.selfplay.max_steps_per_game == 0 {
            return Err(ChessRlError::ConfigInvalid(
                "selfplay.maxStepsPerGame must be positive".to_string(),
            ));
        }
        if self.network.batch_size > self.rl.max_experience_buffer {
            return Err(ChessRlError::ConfigInvalid(
                "network.batchSize must not exceed rl.maxExperienceBuffer".to_string(),
            ));
        }
        if self.system.checkpoint_max_versions == 0 {
            return Err(ChessRlError::ConfigInvalid(
                "system.checkpointMaxVersions must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Stable fingerprint used in checkpoint metadata.
    pub fn fingerprint(&self) -> String {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let json = serde_json::to_string(self).unwrap_or_default();
        let mut hasher = DefaultHasher::new();
        json.hash(&mut hasher);
        format!("{:016x}", hasher.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(RunConfig::default().validate().is_ok());
    }

    #[test]
    fn fast_debug_profile_validates_and_matches_scenario() {
        let cfg = RunConfig::profile("fast-debug");
        cfg.validate().unwrap();
        assert_eq!(cfg.selfplay.max_cycles, 2);
        assert_eq!(cfg.selfplay.games_per_cycle, 5);
        assert_eq!(cfg.selfplay.max_concurrent_games, 2);
        assert_eq!(cfg.selfplay.max_steps_per_game, 40);
        assert_eq!(cfg.network.batch_size, 32);
        assert_eq!(cfg.system.seed, Some(12345));
    }

    #[test]
    fn rejects_empty_hidden_layers() {
        let mut cfg = RunConfig::default();
        cfg.network.hidden_layers.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_batch_size_over_buffer_capacity() {
        let mut cfg = RunConfig::default();
        cfg.network.batch_size = cfg.rl.max_experience_buffer + 1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn override_parses_dotted_keys() {
        let mut cfg = RunConfig::default();
        cfg.apply_override("network.learningRate=5e-4").unwrap();
        assert_eq!(cfg.network.learning_rate, 5e-4);
        cfg.apply_override("rl.doubleDqn=true").unwrap();
        assert!(cfg.rl.double_dqn);
        cfg.apply_override("network.hiddenLayers=768,512,256").unwrap();
        assert_eq!(cfg.network.hidden_layers, vec![768, 512, 256]);
    }

    #[test]
    fn override_rejects_unknown_key() {
        let mut cfg = RunConfig::default();
        assert!(cfg.apply_override("bogus.key=1").is_err());
    }

    #[test]
    fn fingerprint_is_stable_and_sensitive_to_changes() {
        let a = RunConfig::default();
        let mut b = RunConfig::default();
        assert_eq!(a.fingerprint(), b.fingerprint());
        b.network.learning_rate = 2e-3;
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
