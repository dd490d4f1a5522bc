//! Simulation statistics collection and reporting.
//!
//! This module tracks the core's performance counters. It provides:
//! 1. **Retirement:** instructions, loads, stores, and branches committed.
//! 2. **Speculation:** checkpoints created and freed, branch recoveries,
//!    total squashes, and traps taken.
//! 3. **Stalls:** rename bundle holds split by cause (registers vs
//!    checkpoints).

/// Core statistics structure tracking retirement, recovery, and stalls.
#[derive(Clone, Debug, Default)]
pub struct SimStats {
    /// Total simulator cycles elapsed.
    pub cycles: u64,
    /// Number of instructions committed (retired).
    pub instructions_retired: u64,

    /// Loads committed.
    pub loads_committed: u64,
    /// Stores committed.
    pub stores_committed: u64,
    /// Branches committed.
    pub branches_committed: u64,
    /// Serializing (AMO/CSR) instructions executed at retire.
    pub serializers_executed: u64,

    /// Checkpoints created.
    pub checkpoints_created: u64,
    /// Checkpoints freed by commit.
    pub checkpoints_freed: u64,
    /// Branch-misprediction recoveries (selective rollbacks).
    pub recoveries: u64,
    /// Total pipeline squashes (trap delivery).
    pub squashes: u64,
    /// Traps (exceptions) taken.
    pub traps_taken: u64,

    /// Rename bundles held for lack of free physical registers.
    pub stalls_reg: u64,
    /// Rename bundles held for lack of free checkpoints.
    pub stalls_checkpoint: u64,
}

impl SimStats {
    /// Creates a zeroed statistics block.
    pub fn new() -> Self {
        Self::default()
    }

    /// Instructions per cycle over the run so far.
    pub fn ipc(&self) -> f64 {
        if self.cycles == 0 {
            0.0
        } else {
            self.instructions_retired as f64 / self.cycles as f64
        }
    }

    /// Renders a human-readable summary block.
    pub fn summary(&self) -> String {
        format!(
            "cycles: {}\nretired: {} (ipc {:.3})\n\
             loads: {}  stores: {}  branches: {}  serializers: {}\n\
             checkpoints: {} created, {} freed\n\
             recoveries: {}  squashes: {}  traps: {}\n\
             stalls: {} reg, {} chkpt",
            self.cycles,
            self.instructions_retired,
            self.ipc(),
            self.loads_committed,
            self.stores_committed,
            self.branches_committed,
            self.serializers_executed,
            self.checkpoints_created,
            self.checkpoints_freed,
            self.recoveries,
            self.squashes,
            self.traps_taken,
            self.stalls_reg,
            self.stalls_checkpoint,
        )
    }
}
