//! # chessrl
//!
//! Self-play deep Q-learning training core for a chess-playing agent.
//!
//! ## Modules
//!
//! - **engine**: chess rules adapter (state, legal moves, outcomes, FEN).
//! - **encoding**: board/action encoding used by the neural network.
//! - **environment**: reward shaping, termination, adjudication.
//! - **network**: Q-network backend contract and its `tch` implementation.
//! - **replay**: uniform and prioritized replay buffers.
//! - **agent**: DQN agent (action selection, batch updates, target sync).
//! - **selfplay**: process-isolated self-play orchestration.
//! - **training**: the cycle-based training pipeline.
//! - **checkpoint**: versioned checkpoint artifacts and retention.
//! - **evaluate**: baseline evaluation and head-to-head comparison.
//! - **opponent**: heuristic and minimax training/evaluation opponents.

pub mod config;
pub mod engine;
pub mod encoding;
pub mod environment;
pub mod network;
pub mod replay;
pub mod agent;
pub mod selfplay;
pub mod training;
pub mod checkpoint;
pub mod evaluate;
pub mod opponent;

mod logging;

pub use logging::setup_logging;

/// Main error type for the chessrl training core.
#[derive(Debug, thiserror::Error)]
pub enum ChessRlError {
    #[error("config error: {0}")]
    ConfigInvalid(String),

    #[error("adapter error: {0}")]
    Adapter(String),

    #[error("worker failure: {0}")]
    WorkerFailure(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("training diverged: {0}")]
    TrainingDiverged(String),

    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error("evaluation error: {0}")]
    Evaluation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Result type alias for convenience.
pub type Result<T> = std::result::Result<T, ChessRlError>;

/// Library version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
