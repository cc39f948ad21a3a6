//! Training Pipeline: the cycle loop that ties the
//! Self-Play Orchestrator, Replay Buffer, Agent, Checkpoint Manager and
//! Baseline Evaluator together, plus the Metrics Sink
//! that records one row per cycle.

use std::fs;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use crate::agent::Agent;
use crate::checkpoint::CheckpointManager;
use crate::config::{ReplayType, RunConfig};
use crate::engine::EngineAdapter;
use crate::evaluate::{self, EvalResult};
use crate::replay::ReplayBuffer;
use crate::selfplay::Orchestrator;
use crate::{ChessRlError, Result};

/// One row of the Cycle Result, written to `metrics.csv` and
/// logged at `info` level.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle: usize,
    pub games_played: usize,
    pub games_failed: usize,
    pub buffer_size: usize,
    pub batches_trained: usize,
    pub avg_loss: f64,
    pub avg_grad_norm: f64,
    pub epsilon: f64,
    pub evaluation: Option<EvalResult>,
}

/// The cycle-based Training Pipeline.
pub struct Pipeline {
    config: RunConfig,
    engine: Box<dyn EngineAdapter>,
    agent: Agent,
    buffer: ReplayBuffer,
    checkpoints: CheckpointManager,
    orchestrator: Orchestrator,
    metrics: Option<MetricsSink>,
    best: Option<EvalResult>,
    plateau_cycles: usize,
    start_cycle: usize,
}

impl Pipeline {
    pub fn new(config: RunConfig) -> Result<Self> {
        Self::with_worker_binary(config, None)
    }

    /// `worker_binary` lets callers (tests, `train --worker-binary`) point at
    /// an explicit `selfplay-worker`; `None` resolves the sibling binary via
    /// [`Orchestrator::default_worker_binary`].
    pub fn with_worker_binary(config: RunConfig, worker_binary: Option<PathBuf>) -> Result<Self> {
        config.validate()?;

        let engine = config.system.engine_backend.build();
        let agent = Agent::new(&config.network, &config.rl, config.system.seed)?;
        let buffer = ReplayBuffer::new(&config.rl);
        let checkpoints = CheckpointManager::new(
            config.system.checkpoint_directory.clone(),
            config.system.checkpoint_max_versions,
            config.system.checkpoint_keep_every,
        );

        let worker_binary = match worker_binary {
            Some(p) => p,
            None => Orchestrator::default_worker_binary()?,
        };
        let work_root = std::env::temp_dir().join(format!("chessrl-selfplay-{}", std::process::id()));
        let orchestrator = Orchestrator::new(worker_binary, work_root);

        let metrics = config.system.metrics_file.as_ref().map(|p| MetricsSink::open(Path::new(p))).transpose()?;

        Ok(Self {
            config,
            engine,
            agent,
            buffer,
            checkpoints,
            orchestrator,
            metrics,
            best: None,
            plateau_cycles: 0,
            start_cycle: 1,
        })
    }

    /// `train --load <path>`: seed both online and target nets from an
    /// explicit checkpoint before training starts, without touching the
    /// cycle counter or the incumbent `best` result the way
    /// [`Self::resume`] does.
    pub fn load_weights(&mut self, path: &Path) -> Result<()> {
        self.agent.online.load(path)?;
        self.agent.online.copy_weights_to(&mut self.agent.target)?;
        Ok(())
    }

    /// `train --resume`: load the latest checkpoint's
    /// weights into both online and target nets and continue from the next
    /// cycle. Warns, but does not fail, on a config fingerprint mismatch.
    pub fn resume(&mut self) -> Result<()> {
        let meta = self
            .checkpoints
            .latest_meta()
            .ok_or_else(|| ChessRlError::Checkpoint("no checkpoint found to resume from".to_string()))?;

        if meta.config_fingerprint != self.config.fingerprint() {
            log::warn!("resuming from a checkpoint saved under a different config fingerprint");
        }

        let weights_path = self
            .checkpoints
            .directory()
            .join(format!("checkpoint_cycle_{}.safetensors", meta.cycle));
        self.agent.online.load(&weights_path)?;
        self.agent.online.copy_weights_to(&mut self.agent.target)?;

        // No historical `EvalResult` survives a restart, only its scalar
        // `perf_score`; synthesize an incumbent so the next evaluation is
        // compared fairly instead of unconditionally winning.
        self.best = Some(EvalResult {
            games: 0,
            wins: 0,
            losses: 0,
            draws: 0,
            win_rate: 0.0,
            loss_rate: 0.0,
            perf_score: meta.performance,
            avg_length: f64::INFINITY,
            draw_breakdown: std::collections::HashMap::new(),
        });
        self.start_cycle = meta.cycle + 1;
        log::info!("resumed from cycle {} (perf_score={:.4})", meta.cycle, meta.performance);
        Ok(())
    }

    /// Run cycles `start_cycle..=max_cycles`, stopping early on plateau.
    pub async fn run(&mut self) -> Result<()> {
        let max_cycles = self.config.selfplay.max_cycles;
        for cycle in self.start_cycle..=max_cycles {
            let report = self.run_one_cycle(cycle).await?;

            log::info!(
                "cycle {cycle}/{max_cycles}: games={}/{} buffer={} batches={} loss={:.4} grad_norm={:.4} eps={:.3}",
                report.games_played,
                report.games_played + report.games_failed,
                report.buffer_size,
                report.batches_trained,
                report.avg_loss,
                report.avg_grad_norm,
                report.epsilon,
            );
            if let Some(result) = &report.evaluation {
                log::info!(
                    "cycle {cycle}: eval perf_score={:.4} win_rate={:.3} loss_rate={:.3} avg_length={:.1}",
                    result.perf_score, result.win_rate, result.loss_rate, result.avg_length
                );
            }

            if let Some(sink) = &mut self.metrics {
                sink.write_row(&report)?;
            }

            if let Some(patience) = self.config.system.plateau_patience {
                if self.plateau_cycles >= patience {
                    log::info!("plateau patience ({patience}) exceeded after cycle {cycle}; stopping early");
                    break;
                }
            }
        }
        Ok(())
    }

    async fn run_one_cycle(&mut self, cycle: usize) -> Result<CycleReport> {
        let snapshot_dir = self.checkpoints.directory().join("snapshots");
        fs::create_dir_all(&snapshot_dir)?;
        let snapshot_path = snapshot_dir.join(format!("snapshot_cycle_{cycle}.safetensors"));
        self.agent.online.save(&snapshot_path)?;

        let epsilon = self.agent.epsilon();
        let base_seed = self.config.system.seed.unwrap_or(0) ^ (cycle as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);

        let outcome = self
            .orchestrator
            .run_cycle(&self.config, &snapshot_path, cycle, epsilon, base_seed)
            .await?;
        let _ = fs::remove_file(&snapshot_path);

        let games_played = outcome.results.len();
        let mut buffered = 0usize;
        for worker_result in &outcome.results {
            for t in &worker_result.transitions {
                self.buffer.add(t.clone());
                buffered += 1;
            }
        }
        log::debug!("cycle {cycle}: merged {buffered} transitions from {games_played} games");

        let max_cycles = self.config.selfplay.max_cycles.max(1) as f64;
        let beta = self.config.rl.priority_beta0 + (1.0 - self.config.rl.priority_beta0) * (cycle as f64 / max_cycles).min(1.0);
        self.buffer.set_beta(beta);

        let mut rng = StdRng::seed_from_u64(base_seed ^ 0xABCD);
        let mut batches_trained = 0usize;
        let mut total_loss = 0.0;
        let mut total_grad_norm = 0.0;
        for _ in 0..self.config.selfplay.max_batches_per_cycle {
            let Some(batch) = self.buffer.sample(self.config.network.batch_size, &mut rng) else {
                break;
            };
            let stats = self.agent.train_batch(&batch.transitions, Some(&batch.is_weights))?;
            if self.config.rl.replay_type == ReplayType::Prioritized {
                self.buffer.update_priorities(&batch.indices, &stats.td_errors);
            }
            total_loss += stats.loss;
            total_grad_norm += stats.grad_norm;
            batches_trained += 1;
        }
        self.agent.decay_epsilon();

        let (avg_loss, avg_grad_norm) = if batches_trained > 0 {
            (total_loss / batches_trained as f64, total_grad_norm / batches_trained as f64)
        } else {
            (0.0, 0.0)
        };

        let should_evaluate = cycle % self.config.system.evaluation_interval.max(1) == 0;
        let mut evaluation = None;
        let mut is_best = false;
        if should_evaluate {
            let eval_env_config =
                evaluate::env_config_for_eval(&self.config.eval_env, &self.config.reward, self.config.selfplay.max_steps_per_game);
            let eval_seed = base_seed ^ 0xD1CE;
            let result = evaluate::evaluate_vs_heuristic(
                self.engine.as_ref(),
                &eval_env_config,
                self.config.selfplay.max_steps_per_game,
                &self.agent,
                self.config.eval_env.eval_epsilon,
                self.config.eval_env.evaluation_games,
                eval_seed,
            );
            is_best = self.best.as_ref().map(|b| evaluate::is_improvement(&result, b)).unwrap_or(true);
            if is_best {
                self.plateau_cycles = 0;
                self.best = Some(result.clone());
            } else {
                self.plateau_cycles += 1;
            }
            evaluation = Some(result);
        }

        let should_checkpoint = cycle % self.config.system.checkpoint_interval.max(1) == 0;
        if should_checkpoint || evaluation.is_some() {
            let performance = evaluation
                .as_ref()
                .map(|r| r.perf_score)
                .unwrap_or_else(|| self.best.as_ref().map(|b| b.perf_score).unwrap_or(0.0));
            self.checkpoints
                .save_cycle(&self.agent.online, cycle, performance, is_best, &self.config.fingerprint())?;
        }

        Ok(CycleReport {
            cycle,
            games_played,
            games_failed: outcome.failed,
            buffer_size: self.buffer.len(),
            batches_trained,
            avg_loss,
            avg_grad_norm,
            epsilon: self.agent.epsilon(),
            evaluation,
        })
    }
}

/// Metrics sink: append-only `metrics.csv`, header written only once.
struct MetricsSink {
    writer: csv::Writer<fs::File>,
}

#[derive(Serialize)]
struct MetricsRow {
    cycle: usize,
    games_played: usize,
    games_failed: usize,
    buffer_size: usize,
    batches_trained: usize,
    avg_loss: f64,
    avg_grad_norm: f64,
    epsilon: f64,
    evaluated: bool,
    perf_score: f64,
    win_rate: f64,
    loss_rate: f64,
    avg_length: f64,
}

impl MetricsSink {
    fn open(path: &Path) -> Result<Self> {
        let write_header = !path.exists();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = fs::OpenOptions::new().create(true).append(true).open(path)?;
        let writer = csv::WriterBuilder::new().has_headers(write_header).from_writer(file);
        Ok(Self { writer })
    }

    fn write_row(&mut self, report: &CycleReport) -> Result<()> {
        let row = MetricsRow {
            cycle: report.cycle,
            games_played: report.games_played,
            games_failed: report.games_failed,
            buffer_size: report.buffer_size,
            batches_trained: report.batches_trained,
            avg_loss: report.avg_loss,
            avg_grad_norm: report.avg_grad_norm,
            epsilon: report.epsilon,
            evaluated: report.evaluation.is_some(),
            perf_score: report.evaluation.as_ref().map(|r| r.perf_score).unwrap_or(0.0),
            win_rate: report.evaluation.as_ref().map(|r| r.win_rate).unwrap_or(0.0),
            loss_rate: report.evaluation.as_ref().map(|r| r.loss_rate).unwrap_or(0.0),
            avg_length: report.evaluation.as_ref().map(|r| r.avg_length).unwrap_or(0.0),
        };
        self.writer
            .serialize(row)
            .map_err(|e| ChessRlError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?;
        self.writer
            .flush()
            .map_err(|e| ChessRlError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))
    }
}
