//! Processor core: the renaming subsystem and its pipeline-facing drivers.

/// Pipeline integration: payload buffer, latches, collaborator traits, and
/// the rename/writeback/retire stage drivers.
pub mod pipeline;
/// Register renaming core with checkpointed recovery.
pub mod rename;
