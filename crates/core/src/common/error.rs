//! Trap and configuration error definitions.
//!
//! This module defines the error surface of the simulator core. It provides:
//! 1. **Trap Representation:** Architectural faults flagged by the functional
//!    reference, delivered to the trap machinery at retire.
//! 2. **Configuration Errors:** Typed validation failures for `CoreConfig`.
//!
//! Structural-invariant violations (free-list underflow at rename, duplicate
//! pushes, usage-counter underflow, rollback to a dead checkpoint) are *not*
//! represented here: they are bugs in the coupled pipeline, and the core
//! aborts on them with `panic!`/`assert!` diagnostics.

use thiserror::Error;

/// Architectural faults surfaced through the retire stage.
///
/// These are expected inputs from the program under simulation: the oracle
/// flags them at rename time, the checkpoint carrying the offending
/// instruction is marked, and the trap is taken when that checkpoint reaches
/// the head of the buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum Trap {
    /// Instruction fetch fault. The value is the faulting address.
    #[error("InstructionAccessFault({0:#x})")]
    InstructionAccessFault(u64),

    /// Illegal instruction. The value is the instruction encoding.
    #[error("IllegalInstruction({0:#x})")]
    IllegalInstruction(u32),

    /// Load fault. The value is the faulting address.
    #[error("LoadAccessFault({0:#x})")]
    LoadAccessFault(u64),

    /// Store or AMO fault. The value is the faulting address.
    #[error("StoreAccessFault({0:#x})")]
    StoreAccessFault(u64),

    /// Environment call.
    #[error("EnvironmentCall")]
    EnvironmentCall,

    /// Micro-architectural CSR serialize trap.
    ///
    /// Not an ISA exception: the CSR instruction must be refetched after the
    /// pipeline drains, rather than vectoring to a trap handler.
    #[error("CsrSerialize")]
    CsrSerialize,
}

impl Trap {
    /// Whether taking this trap refetches the offending instruction instead
    /// of redirecting to the handler.
    #[inline]
    pub fn is_serialize(self) -> bool {
        matches!(self, Self::CsrSerialize)
    }
}

/// Validation failures for [`CoreConfig`](crate::config::CoreConfig).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The physical register file must be strictly larger than the logical
    /// register space, or the free list would be empty at reset.
    #[error("n_phys_regs ({phys}) must exceed n_log_regs ({log})")]
    TooFewPhysRegs {
        /// Configured physical register count.
        phys: usize,
        /// Configured logical register count.
        log: usize,
    },

    /// The checkpoint buffer needs room for the resident head checkpoint and
    /// at least one speculative successor.
    #[error("n_chkpts ({0}) must be at least 2")]
    TooFewCheckpoints(usize),

    /// The inflight-instruction cap must be positive.
    #[error("n_active must be positive")]
    ZeroActive,

    /// Stage widths must be positive.
    #[error("{0} width must be positive")]
    ZeroWidth(&'static str),

    /// The auto-checkpoint interval must be positive.
    #[error("max_instr_bw_checkpoints must be positive")]
    ZeroCheckpointInterval,
}
