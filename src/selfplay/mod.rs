//! Self-Play Orchestrator: spawns one OS process per game
//! via `tokio::process::Command`, bounded to a sliding window of
//! `maxConcurrentGames` concurrent workers, and collects the resulting
//! transitions for the Training Pipeline to merge into the Replay Buffer.
//!
//! Grounded in the teacher's process-isolation choice for its own training
//! workers (`src/training/session.rs`'s subprocess-per-game pattern),
//! generalized here from a fixed worker count to the spec's sliding-window
//! scheduling over `tokio::task::JoinSet` + `tokio::sync::Semaphore` (no
//! `futures`/`rayon` dependency needed for this).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::{NetworkConfig, RewardConfig, RlConfig, RunConfig, TrainEnvConfig};
use crate::engine::EngineBackend;
use crate::environment::TerminationOutcome;
use crate::replay::Transition;
use crate::{ChessRlError, Result};

/// Everything a `selfplay-worker` process needs to play one game, passed as
/// a JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub model_path: PathBuf,
    pub engine_backend: EngineBackend,
    pub network: NetworkConfig,
    pub rl: RlConfig,
    pub train_env: TrainEnvConfig,
    pub reward: RewardConfig,
    pub max_steps_per_game: usize,
    pub game_id: u64,
    pub seed: u64,
    pub epsilon: f64,
}

/// One game's result, written by the worker to its output file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerResponse {
    pub game_id: u64,
    pub outcome: TerminationOutcome,
    pub length: usize,
    pub final_fen: String,
    pub transitions: Vec<Transition>,
}

/// Per-cycle results: successful games plus how many were skipped.
pub struct CycleOutcome {
    pub results: Vec<WorkerResponse>,
    pub failed: usize,
    pub attempted: usize,
}

pub struct Orchestrator {
    worker_binary: PathBuf,
    work_root: PathBuf,
}

impl Orchestrator {
    pub fn new(worker_binary: impl Into<PathBuf>, work_root: impl Into<PathBuf>) -> Self {
        Self { worker_binary: worker_binary.into(), work_root: work_root.into() }
    }

    /// The `selfplay-worker` binary built alongside this one (`Cargo.toml`'s
    /// second `[[bin]]` target).
    pub fn default_worker_binary() -> Result<PathBuf> {
        let mut path = std::env::current_exe()?;
        let name = if cfg!(windows) { "selfplay-worker.exe" } else { "selfplay-worker" };
        path.set_file_name(name);
        Ok(path)
    }

    /// Run one self-play cycle: up to `games_per_cycle` games, at most
    /// `max_concurrent_games` running at once.
    /// Fails the cycle if fewer than `min(min_success_ratio, 0.5) * N` games
    /// succeeded.
    pub async fn run_cycle(
        &self,
        config: &RunConfig,
        snapshot_path: &Path,
        cycle: usize,
        epsilon: f64,
        base_seed: u64,
    ) -> Result<CycleOutcome> {
        let work_dir = self.work_root.join(format!("cycle_{cycle}"));
        std::fs::create_dir_all(&work_dir)?;

        let n = config.selfplay.games_per_cycle;
        let semaphore = Arc::new(Semaphore::new(config.selfplay.max_concurrent_games.max(1)));
        let timeout = Duration::from_secs(config.selfplay.worker_timeout_secs.max(1));
        let mut set = JoinSet::new();

        for game_id in 0..n as u64 {
            let request = WorkerRequest {
                model_path: snapshot_path.to_path_buf(),
                engine_backend: EngineBackend::Builtin,
                network: config.network.clone(),
                rl: config.rl.clone(),
                train_env: config.train_env.clone(),
                reward: config.reward.clone(),
                max_steps_per_game: config.selfplay.max_steps_per_game,
                game_id,
                seed: base_seed ^ game_id,
                epsilon,
            };
            let req_path = work_dir.join(format!("req_{game_id}.json"));
            let out_path = work_dir.join(format!("out_{game_id}.json"));
            std::fs::write(&req_path, serde_json::to_vec(&request)?)?;

            let sem = semaphore.clone();
            let worker_binary = self.worker_binary.clone();
            set.spawn(async move {
                let _permit = sem.acquire_owned().await.expect("semaphore never closed");
                run_one_worker(&worker_binary, &req_path, &out_path, timeout, game_id).await
            });
        }

        let mut results = Vec::with_capacity(n);
        let mut failed = 0usize;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(resp)) => results.push(resp),
                Ok(Err(e)) => {
                    log::warn!("self-play worker failed: {e}");
                    failed += 1;
                }
                Err(join_err) => {
                    log::warn!("self-play worker task panicked: {join_err}");
                    failed += 1;
                }
            }
        }

        let required = ((config.selfplay.min_success_ratio * n as f64).min(0.5 * n as f64)).ceil() as usize;
        if results.len() < required {
            return Err(ChessRlError::WorkerFailure(format!(
                "cycle {cycle}: only {}/{n} self-play games succeeded, required at least {required}",
                results.len()
            )));
        }

        let _ = std::fs::remove_dir_all(&work_dir);
        Ok(CycleOutcome { results, failed, attempted: n })
    }
}

async fn run_one_worker(
    worker_binary: &Path,
    req_path: &Path,
    out_path: &Path,
    timeout: Duration,
    game_id: u64,
) -> Result<WorkerResponse> {
    let mut cmd = tokio::process::Command::new(worker_binary);
    cmd.arg("--request").arg(req_path).arg("--output").arg(out_path);

    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return Err(ChessRlError::WorkerFailure(format!("game {game_id}: failed to spawn worker: {e}")))
        }
        Err(_) => return Err(ChessRlError::WorkerFailure(format!("game {game_id}: worker timed out after {timeout:?}"))),
    };

    if !output.status.success() {
        return Err(ChessRlError::WorkerFailure(format!(
            "game {game_id}: worker exited with {:?}: {}",
            output.status.code(),
            String::from_utf8_lossy(&output.stderr)
        )));
    }

    let bytes = std::fs::read(out_path)
        .map_err(|e| ChessRlError::WorkerFailure(format!("game {game_id}: missing output file: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| ChessRlError::WorkerFailure(format!("game {game_id}: malformed output: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_successes_is_capped_at_half_the_batch() {
        let n = 20usize;
        let min_success_ratio = 0.9;
        let required = ((min_success_ratio * n as f64).min(0.5 * n as f64)).ceil() as usize;
        assert_eq!(required, 10);
    }

    #[test]
    fn required_successes_uses_ratio_when_below_half() {
        let n = 20usize;
        let min_success_ratio = 0.3;
        let required = ((min_success_ratio * n as f64).min(0.5 * n as f64)).ceil() as usize;
        assert_eq!(required, 6);
    }

    #[test]
    fn default_worker_binary_is_sibling_of_current_exe() {
        let path = Orchestrator::default_worker_binary().unwrap();
        let expected_name = if cfg!(windows) { "selfplay-worker.exe" } else { "selfplay-worker" };
        assert_eq!(path.file_name().unwrap().to_str().unwrap(), expected_name);
    }
}
