//! DareDuel node: configuration, logging, metrics and the long-running
//! tasks that tie the engine crates together.

pub mod config;
pub mod error;
pub mod game_bridge;
pub mod logging;
pub mod metrics;
pub mod node;
pub mod scheduler;
pub mod shutdown;

pub use config::NodeConfig;
pub use error::NodeError;
pub use game_bridge::LedgerGameCreator;
pub use logging::{init_logging, LogFormat};
pub use metrics::NodeMetrics;
pub use node::DuelNode;
pub use scheduler::SweepScheduler;
pub use shutdown::ShutdownController;
