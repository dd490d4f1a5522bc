//! Cycle-level superscalar out-of-order core with checkpointed recovery.
//!
//! This crate implements the register-renaming and checkpoint-repair
//! subsystem of an out-of-order processor simulator:
//! 1. **Renaming core:** free list, rename map table, physical register
//!    file with ready/unmapped/usage metadata, and the checkpoint buffer.
//! 2. **Recovery:** checkpoint-grained rollback for branch mispredictions
//!    and total squash for traps, with per-checkpoint squash masks.
//! 3. **Pipeline hooks:** the payload buffer, pipeline latches, rename
//!    bundle driver, writeback branch resolution, and the retire state
//!    machine, against capability traits for the external collaborators.
//! 4. **Configuration and statistics:** JSON-deserializable sizing and a
//!    counter block for retirement, recovery, and stall accounting.

/// Common types (identifiers, traps, configuration errors).
pub mod common;
/// Simulator configuration (defaults and hierarchical config structures).
pub mod config;
/// Processor core: renaming subsystem and pipeline drivers.
pub mod core;
/// Simulation statistics collection and reporting.
pub mod stats;

/// Root configuration type; use `CoreConfig::default()` or deserialize from JSON.
pub use crate::config::CoreConfig;
/// The renaming core behind the rename/commit/rollback protocol.
pub use crate::core::rename::Renamer;
/// Core statistics block.
pub use crate::stats::SimStats;
