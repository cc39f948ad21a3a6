//! Black-box test touching `spec.md` §8 scenario 4 (resume): `train --resume`
//! should locate the checkpoint tagged best, load its weights into both the
//! online and target networks, and tolerate being called again without
//! corrupting state.

use std::path::PathBuf;

use chessrl::checkpoint::CheckpointManager;
use chessrl::config::RunConfig;
use chessrl::network::NetworkBackendKind;
use chessrl::training::Pipeline;

fn worker_binary() -> PathBuf {
 PathBuf::from(env!("CARGO_BIN_EXE_selfplay-worker"))
}

#[test]
fn resume_loads_the_best_tagged_checkpoint() {
 let dir = tempfile::tempdir().unwrap();
 let mut cfg = RunConfig::profile("fast-debug");
 cfg.network.hidden_layers = vec![8];
 cfg.system.checkpoint_directory = dir.path().to_string_lossy().to_string();
 cfg.system.metrics_file = None;

 let net = NetworkBackendKind::Dqn.build(&cfg.network, Some(1)).unwrap();
 let mgr = CheckpointManager::new(dir.path(), cfg.system.checkpoint_max_versions, None);
 mgr.save_cycle(&net, 1, 0.3, true, &cfg.fingerprint()).unwrap();

 let mut pipeline = Pipeline::with_worker_binary(cfg, Some(worker_binary())).unwrap();
 pipeline.resume().unwrap();
 // A second resume against the same on-disk checkpoint must stay stable:
 // resolution and loading are pure reads, not mutations of the checkpoint store.
 pipeline.resume().unwrap();
}

#[test]
fn resume_without_any_checkpoint_is_a_checkpoint_error() {
 let dir = tempfile::tempdir().unwrap();
 let mut cfg = RunConfig::profile("fast-debug");
 cfg.network.hidden_layers = vec![8];
 cfg.system.checkpoint_directory = dir.path().to_string_lossy().to_string();
 cfg.system.metrics_file = None;

 let mut pipeline = Pipeline::with_worker_binary(cfg, Some(worker_binary())).unwrap();
 let err = pipeline.resume().unwrap_err();
 assert!(matches!(err, chessrl::ChessRlError::Checkpoint(_)));
}
