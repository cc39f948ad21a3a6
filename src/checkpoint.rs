//! Checkpoint Manager: versioned, atomically-written model
//! artifacts plus a JSON metadata sidecar, with bounded retention and a
//! best-model resolution order used by `evaluate`/`train --resume`.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::network::NetworkBackend;
use crate::{ChessRlError, Result};

const WEIGHTS_EXT: &str = "safetensors";

/// Sidecar recorded next to every weights file. `config_fingerprint` lets `train --resume` detect a config
/// drift between the checkpoint and the run that's resuming it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub cycle: usize,
    pub is_best: bool,
    pub performance: f64,
    pub timestamp: String,
    pub backend: String,
    pub config_fingerprint: String,
}

/// Versioned artifact store under `system.checkpointDirectory`.
pub struct CheckpointManager {
    directory: PathBuf,
    max_versions: usize,
    keep_every: Option<usize>,
}

impl CheckpointManager {
    pub fn new(directory: impl Into<PathBuf>, max_versions: usize, keep_every: Option<usize>) -> Self {
        Self { directory: directory.into(), max_versions, keep_every }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn weights_path(&self, cycle: usize) -> PathBuf {
        self.directory.join(format!("checkpoint_cycle_{cycle}.{WEIGHTS_EXT}"))
    }

    fn meta_path(&self, cycle: usize) -> PathBuf {
        self.directory.join(format!("checkpoint_cycle_{cycle}_meta.json"))
    }

    fn best_weights_path(&self) -> PathBuf {
        self.directory.join(format!("best_model.{WEIGHTS_EXT}"))
    }

    fn best_meta_path(&self) -> PathBuf {
        self.directory.join("best_model_meta.json")
    }

    /// Write the weights for `cycle` plus its metadata sidecar, atomically. When `is_best`, also
    /// refreshes `best_model.<ext>` and demotes every previously-tagged-best sidecar so at most
    /// one per-cycle checkpoint is ever `is_best` at a time. Runs retention afterward.
    pub fn save_cycle(
        &self,
        network: &dyn NetworkBackend,
        cycle: usize,
        performance: f64,
        is_best: bool,
        config_fingerprint: &str,
    ) -> Result<PathBuf> {
        fs::create_dir_all(&self.directory)?;

        let weights_path = self.weights_path(cycle);
        write_atomic_via(|tmp| network.save(tmp), &weights_path)?;

        let meta = CheckpointMeta {
            cycle,
            is_best,
            performance,
            timestamp: Utc::now().to_rfc3339(),
            backend: network.backend_id().to_string(),
            config_fingerprint: config_fingerprint.to_string(),
        };
        write_atomic_bytes(&serde_json::to_vec_pretty(&meta)?, &self.meta_path(cycle))?;

        if is_best {
            self.demote_previous_best(cycle)?;
            write_atomic_via(|tmp| network.save(tmp), &self.best_weights_path())?;
            write_atomic_bytes(&serde_json::to_vec_pretty(&meta)?, &self.best_meta_path())?;
        }

        self.apply_retention()?;
        Ok(weights_path)
    }

    /// Rewrite every other cycle's sidecar still tagged `is_best` to `is_best=false`, so only
    /// `cycle` carries the flag afterward: retention (and `resolve_best`) must never see two
    /// cycles tagged best at once.
    fn demote_previous_best(&self, cycle: usize) -> Result<()> {
        for mut other in self.list_metas() {
            if other.is_best && other.cycle != cycle {
                other.is_best = false;
                write_atomic_bytes(&serde_json::to_vec_pretty(&other)?, &self.meta_path(other.cycle))?;
            }
        }
        Ok(())
    }

    /// List all per-cycle metadata sidecars, sorted by cycle ascending.
    fn list_metas(&self) -> Vec<CheckpointMeta> {
        let Ok(entries) = fs::read_dir(&self.directory) else {
            return Vec::new();
        };
        let mut metas: Vec<CheckpointMeta> = entries
            .flatten()
            .filter_map(|e| {
                let name = e.file_name();
                let name = name.to_str()?;
                if !name.starts_with("checkpoint_cycle_") || !name.ends_with("_meta.json") {
                    return None;
                }
                let bytes = fs::read(e.path()).ok()?;
                serde_json::from_slice(&bytes).ok()
            })
            .collect();
        metas.sort_by_key(|m| m.cycle);
        metas
    }

    /// Retention: keep the newest `max_versions` cycles,
    /// plus every `keep_every`-th cycle if configured; the checkpoint
    /// currently tagged `is_best` is never deleted even if it falls outside
    /// those windows.
    fn apply_retention(&self) -> Result<()> {
        let metas = self.list_metas();
        if metas.len() <= self.max_versions {
            return Ok(());
        }

        let newest_cutoff = metas.len().saturating_sub(self.max_versions);
        for (i, meta) in metas.iter().enumerate() {
            if meta.is_best {
                continue;
            }
            let within_newest_window = i >= newest_cutoff;
            let on_keep_every = self.keep_every.is_some_and(|k| k > 0 && meta.cycle % k == 0);
            if within_newest_window || on_keep_every {
                continue;
            }
            let _ = fs::remove_file(self.weights_path(meta.cycle));
            let _ = fs::remove_file(self.meta_path(meta.cycle));
        }
        Ok(())
    }

    /// Resolve the best model to load: an explicit path, else the highest-performance checkpoint
    /// tagged `is_best` (ties broken by newest), else the newest weights
    /// file by cycle, else the `best_model.<ext>` fallback.
    pub fn resolve_best(&self, explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(p) = explicit {
            if p.exists() {
                return Ok(p.to_path_buf());
            }
            return Err(ChessRlError::Checkpoint(format!("explicit checkpoint path not found: {}", p.display())));
        }

        let metas = self.list_metas();
        let best_tagged = metas
            .iter()
            .filter(|m| m.is_best)
            .max_by(|a, b| {
                a.performance
                    .partial_cmp(&b.performance)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.cycle.cmp(&b.cycle))
            });
        if let Some(m) = best_tagged {
            return Ok(self.weights_path(m.cycle));
        }

        if let Some(m) = metas.last() {
            return Ok(self.weights_path(m.cycle));
        }

        let fallback = self.best_weights_path();
        if fallback.exists() {
            return Ok(fallback);
        }

        Err(ChessRlError::Checkpoint(format!(
            "no checkpoint found under {}",
            self.directory.display()
        )))
    }

    pub fn load_into(&self, network: &mut dyn NetworkBackend, path: &Path) -> Result<()> {
        network.load(path)
    }

    /// Metadata for the latest saved cycle, if any (`train --resume`).
    pub fn latest_meta(&self) -> Option<CheckpointMeta> {
        self.list_metas().into_iter().next_back()
    }
}

/// Write via a caller-provided closure that writes to a temp path, then
/// fsync + rename into place.
fn write_atomic_via(write: impl FnOnce(&Path) -> Result<()>, final_path: &Path) -> Result<()> {
    let tmp_path = tmp_path_for(final_path);
    write(&tmp_path)?;
    fsync_and_rename(&tmp_path, final_path)
}

fn write_atomic_bytes(bytes: &[u8], final_path: &Path) -> Result<()> {
    let tmp_path = tmp_path_for(final_path);
    fs::write(&tmp_path, bytes)?;
    fsync_and_rename(&tmp_path, final_path)
}

fn tmp_path_for(final_path: &Path) -> PathBuf {
    let file_name = final_path.file_name().and_then(|n| n.to_str()).unwrap_or("checkpoint");
    final_path.with_file_name(format!(".{file_name}.tmp"))
}

fn fsync_and_rename(tmp_path: &Path, final_path: &Path) -> Result<()> {
    let f = File::open(tmp_path)?;
    f.sync_all()?;
    fs::rename(tmp_path, final_path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetworkConfig;
    use crate::network::{NetworkBackendKind, QNetwork};

    fn small_network() -> QNetwork {
        NetworkBackendKind::Dqn
            .build(&NetworkConfig { hidden_layers: vec![8], ..NetworkConfig::default() }, Some(1))
            .unwrap()
    }

    #[test]
    fn save_cycle_writes_weights_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = CheckpointManager::new(dir.path(), 10, None);
        let net = small_network();
        let path = mgr.save_cycle(&net, 1, 0.1, false, "fp").unwrap();
        assert!(path.exists());
        assert!(mgr.meta_path(1).exists());
    }

    #[test]
    fn best_flag_refreshes_best_model_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = CheckpointManager::new(dir.path(), 10, None);
        let net = small_network();
        mgr.save_cycle(&net, 1, 0.5, true, "fp").unwrap();
        assert!(mgr.best_weights_path().exists());
        assert!(mgr.best_meta_path().exists());
    }

    #[test]
    fn retention_keeps_newest_and_never_deletes_best() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = CheckpointManager::new(dir.path(), 2, None);
        let net = small_network();
        mgr.save_cycle(&net, 1, 0.1, true, "fp").unwrap();
        mgr.save_cycle(&net, 2, 0.2, false, "fp").unwrap();
        mgr.save_cycle(&net, 3, 0.3, false, "fp").unwrap();
        mgr.save_cycle(&net, 4, 0.4, false, "fp").unwrap();

        assert!(mgr.weights_path(1).exists(), "best checkpoint must survive retention");
        assert!(!mgr.weights_path(2).exists());
        assert!(mgr.weights_path(3).exists());
        assert!(mgr.weights_path(4).exists());
    }

    #[test]
    fn a_new_best_demotes_the_previous_one() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = CheckpointManager::new(dir.path(), 2, None);
        let net = small_network();
        mgr.save_cycle(&net, 1, 0.1, true, "fp").unwrap();
        mgr.save_cycle(&net, 2, 0.2, true, "fp").unwrap();
        mgr.save_cycle(&net, 3, 0.3, false, "fp").unwrap();
        mgr.save_cycle(&net, 4, 0.4, false, "fp").unwrap();

        // Cycle 1 is no longer tagged best, so only the newest-window
        // protection applies to it, and it falls outside that window.
        assert!(!mgr.weights_path(1).exists(), "demoted best must lose retention protection");
        assert!(mgr.weights_path(2).exists(), "the current best must survive retention");
        assert!(mgr.weights_path(3).exists());
        assert!(mgr.weights_path(4).exists());

        let metas = mgr.list_metas();
        assert_eq!(metas.iter().filter(|m| m.is_best).count(), 1);
        assert!(metas.iter().find(|m| m.cycle == 2).unwrap().is_best);
    }

    #[test]
    fn resolve_best_prefers_highest_performance_tagged_best() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = CheckpointManager::new(dir.path(), 10, None);
        let net = small_network();
        mgr.save_cycle(&net, 1, 0.2, true, "fp").unwrap();
        mgr.save_cycle(&net, 2, 0.1, false, "fp").unwrap();
        let resolved = mgr.resolve_best(None).unwrap();
        assert_eq!(resolved, mgr.weights_path(1));
    }

    #[test]
    fn resolve_best_falls_back_to_newest_when_none_tagged() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = CheckpointManager::new(dir.path(), 10, None);
        let net = small_network();
        mgr.save_cycle(&net, 1, 0.2, false, "fp").unwrap();
        mgr.save_cycle(&net, 2, 0.1, false, "fp").unwrap();
        let resolved = mgr.resolve_best(None).unwrap();
        assert_eq!(resolved, mgr.weights_path(2));
    }

    #[test]
    fn resolve_best_errors_when_directory_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = CheckpointManager::new(dir.path(), 10, None);
        assert!(mgr.resolve_best(None).is_err());
    }
}
