//! boxtar CLI - pack OCI image layouts into deterministic tar archives.

pub mod commands;
pub mod output;
