//! boxtar Core - Foundational Types and Utilities
//!
//! Error taxonomy, configuration, the retry/throttle executor and progress
//! reporting shared by the archive writer and the CLI.

pub mod config;
pub mod error;
pub mod progress;
pub mod retry;
pub mod throttle;

// Re-export commonly used types
pub use config::{LogLevel, WriterConfig};
pub use error::{ArchiveError, Result};
pub use progress::{NoopProgress, ProgressLogger, TracingProgress};
pub use retry::{retry_with_backoff, RetryConfig};
pub use throttle::{Executor, Outcome};

/// boxtar version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
