//! Pipeline integration for the renaming core.
//!
//! The renamer never acts on its own: the pipeline drives it. This module
//! provides the pieces that sit between the renamer and the rest of the
//! machine:
//! 1. **Payload buffer:** per-instruction records carrying operands,
//!    oracle knowledge, and recovery coordinates.
//! 2. **Latches:** pipeline register slots and the usage-reference release
//!    discipline for squashes.
//! 3. **Traits:** the capability vocabularies of the external
//!    collaborators (fetch, LSU, issue queue, trap, checker, serializer).
//! 4. **Stage drivers:** the rename bundle walk, the writeback branch
//!    resolution, and the retire state machine.

/// Pipeline latch slots and squash reference accounting.
pub mod latches;
/// Decoded-instruction payload buffer.
pub mod payload;
/// Rename stage: dry run, atomic bundle rename, checkpoint insertion.
pub mod rename_stage;
/// Retire stage: checkpoint-grained bulk commit.
pub mod retire;
/// Capability traits for external collaborators.
pub mod traits;
/// Writeback stage: branch resolution and selective squash.
pub mod writeback;
