//! Black-box end-to-end test for `spec.md` §8 scenario 1 (cold start,
//! `fast-debug` profile): the pipeline should complete two cycles and leave
//! `checkpoint_cycle_2.*` and `best_model.*` behind.

use std::path::PathBuf;

use chessrl::config::RunConfig;
use chessrl::training::Pipeline;

fn worker_binary() -> PathBuf {
 PathBuf::from(env!("CARGO_BIN_EXE_selfplay-worker"))
}

#[tokio::test]
async fn fast_debug_profile_completes_and_checkpoints() {
 let dir = tempfile::tempdir().unwrap();
 let mut cfg = RunConfig::profile("fast-debug");
 // Keep the network tiny so the test exercises the full pipeline quickly.
 cfg.network.hidden_layers = vec![16, 8];
 cfg.system.checkpoint_directory = dir.path().to_string_lossy().to_string();
 cfg.system.metrics_file = None;

 let mut pipeline = Pipeline::with_worker_binary(cfg, Some(worker_binary())).unwrap();
 pipeline.run().await.unwrap();

 let checkpoint_dir = dir.path();
 assert!(
 checkpoint_dir.join("checkpoint_cycle_2.safetensors").exists(),
 "expected checkpoint_cycle_2 weights"
 );
 assert!(
 checkpoint_dir.join("checkpoint_cycle_2_meta.json").exists(),
 "expected checkpoint_cycle_2 metadata sidecar"
 );
 assert!(
 checkpoint_dir.join("best_model.safetensors").exists(),
 "expected best_model compatibility artifact"
 );
}
