//! Common types module for the contract deployment pipeline.
//!
//! This module defines the core data types and structures used throughout
//! the deployment system. It provides a centralized location for shared types
//! to ensure consistency across all pipeline components.

/// Chain-execution types: transaction hashes, receipts, compiled artifacts.
pub mod chain;
/// Chain table configuration types.
pub mod chains;
/// Deployment records, jobs, and confirmation tasks.
pub mod deployment;
/// Event types for inter-service communication.
pub mod events;
/// Per-chain daily metric types.
pub mod metrics;
/// Storage key definitions for persistent collections.
pub mod storage;
/// Utility functions for formatting and timestamps.
pub mod utils;

// Re-export all types for convenient access
pub use chain::*;
pub use chains::{deserialize_chains, ChainConfig, ChainsConfig, DEFAULT_CHAIN_PRIORITY};
pub use deployment::*;
pub use events::*;
pub use metrics::*;
pub use storage::*;
pub use utils::{current_timestamp, truncate_id, with_0x_prefix, without_0x_prefix};
