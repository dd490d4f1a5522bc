//! Register and checkpoint identifiers.
//!
//! This module defines the small index newtypes shared across the renamer and
//! the pipeline. It provides:
//! 1. **Physical register names:** `PhysReg`, an index into the physical
//!    register file and its metadata arrays.
//! 2. **Checkpoint names:** `CheckpointId`, an index into the checkpoint
//!    buffer ring.
//!
//! Logical (architectural) register numbers stay plain `usize`: they are only
//! ever used to index the rename map table and never cross a speculation
//! boundary, so a newtype buys nothing there.

use std::fmt;

/// Name of a physical register, in `[0, n_phys_regs)`.
///
/// Physical registers are referenced by index throughout: the rename map
/// table, checkpoint snapshots, the free list, and instruction payloads all
/// store `PhysReg` values rather than owning any register state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct PhysReg(pub usize);

impl fmt::Display for PhysReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// Name of a checkpoint buffer slot, in `[0, n_chkpts)`.
///
/// A `CheckpointId` is both the identity of a speculation interval and the
/// index of its slot in the checkpoint ring. Instructions carry the ID of the
/// interval they were renamed into so that recovery can squash by interval.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct CheckpointId(pub usize);

impl fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}
