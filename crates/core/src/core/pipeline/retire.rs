//! Retire stage: bulk commit at checkpoint granularity.
//!
//! Retirement is checkpoint-grained: instead of retiring instruction by
//! instruction, the stage waits until the head checkpoint's whole interval
//! has completed, then drains it in bulk. Three states:
//! 1. **Idle:** probe `precommit`. On success, execute a serializer's side
//!    effect if the interval holds one, or take the trap if the interval is
//!    flagged as an exception (total squash, payload clear, refetch).
//! 2. **BulkCommit:** each cycle drain up to the retire width of each of:
//!    loads, stores, branches, and architectural register commits. When all
//!    four run dry, free the checkpoint.
//! 3. **Finalize:** pop the interval's payload records in program order,
//!    invoking the checker for each, and resume the stalled fetch unit
//!    after a serializer. A retire budget can pause the drain mid-interval;
//!    the state machine picks up where it left off.

use tracing::debug;

use crate::common::reg::CheckpointId;
use crate::core::pipeline::latches::{PipelineRegs, release_rename_refs};
use crate::core::pipeline::payload::PayloadBuffer;
use crate::core::pipeline::rename_stage::RenameStage;
use crate::core::pipeline::traits::{
    FetchUnit, IssueQueue, LoadStoreUnit, RetireChecker, SerializerExec, TrapHandler,
};
use crate::core::rename::Renamer;
use crate::stats::SimStats;

/// External collaborators the retire stage steers.
#[derive(Debug)]
pub struct Externals<'a, F, L, Q, T, C, S> {
    /// Fetch unit.
    pub fetch: &'a mut F,
    /// Load/store unit.
    pub lsu: &'a mut L,
    /// Issue queue.
    pub iq: &'a mut Q,
    /// Trap delivery machinery.
    pub trap: &'a mut T,
    /// Functional-reference comparator hook.
    pub checker: &'a mut C,
    /// AMO/CSR side-effect executor.
    pub serializer: &'a mut S,
}

/// Retire state machine states.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
enum RetireState {
    /// Waiting for the head checkpoint to become committable.
    #[default]
    Idle,
    /// Draining the head interval's loads, stores, branches, and registers.
    BulkCommit,
    /// Popping the interval's payload records past the checker.
    Finalize,
}

/// The retire stage driver.
#[derive(Debug)]
pub struct RetireUnit {
    state: RetireState,
    /// Checkpoint being committed.
    chkpt: CheckpointId,
    loads_left: u64,
    stores_left: u64,
    branches_left: u64,
    /// Next architectural register to commit.
    log_reg: usize,
    amo: bool,
    csr: bool,
    retire_width: usize,
    n_log_regs: usize,
}

impl RetireUnit {
    /// Creates the stage in the idle state.
    pub fn new(retire_width: usize, n_log_regs: usize) -> Self {
        assert!(retire_width > 0, "retire width must be positive");
        Self {
            state: RetireState::default(),
            chkpt: CheckpointId(0),
            loads_left: 0,
            stores_left: 0,
            branches_left: 0,
            log_reg: 0,
            amo: false,
            csr: false,
            retire_width,
            n_log_regs,
        }
    }

    /// Returns true if the stage is mid-commit (not idle).
    pub fn busy(&self) -> bool {
        self.state != RetireState::Idle
    }

    /// Advances the retire stage by one cycle.
    ///
    /// `budget` caps the instructions retired this call; the drain pauses
    /// and resumes if it runs out. Returns the number retired.
    #[allow(clippy::too_many_arguments)]
    pub fn tick<F, L, Q, T, C, S>(
        &mut self,
        renamer: &mut Renamer,
        payload: &mut PayloadBuffer,
        regs: &mut PipelineRegs,
        rename_stage: &mut RenameStage,
        ext: &mut Externals<'_, F, L, Q, T, C, S>,
        stats: &mut SimStats,
        budget: u64,
    ) -> u64
    where
        F: FetchUnit,
        L: LoadStoreUnit,
        Q: IssueQueue,
        T: TrapHandler,
        C: RetireChecker,
        S: SerializerExec,
    {
        if budget == 0 {
            return 0;
        }
        match self.state {
            RetireState::Idle => self.idle(renamer, payload, regs, rename_stage, ext, stats),
            RetireState::BulkCommit => self.bulk_commit(renamer, ext, stats),
            RetireState::Finalize => self.finalize(payload, ext, stats, budget),
        }
    }

    fn idle<F, L, Q, T, C, S>(
        &mut self,
        renamer: &mut Renamer,
        payload: &mut PayloadBuffer,
        regs: &mut PipelineRegs,
        rename_stage: &mut RenameStage,
        ext: &mut Externals<'_, F, L, Q, T, C, S>,
        stats: &mut SimStats,
    ) -> u64
    where
        F: FetchUnit,
        L: LoadStoreUnit,
        Q: IssueQueue,
        T: TrapHandler,
        C: RetireChecker,
        S: SerializerExec,
    {
        let Some(pc) = renamer.precommit() else {
            return 0;
        };
        self.chkpt = pc.id;
        self.loads_left = pc.loads;
        self.stores_left = pc.stores;
        self.branches_left = pc.branches;
        self.log_reg = 0;
        self.amo = pc.amo;
        self.csr = pc.csr;

        let head_index = payload.head();
        if pc.amo || pc.csr {
            // A serializer is isolated in its own interval: nothing but the
            // serializer itself can be attributed to it.
            assert!(
                pc.branches == 0 && pc.loads <= 1 && pc.stores <= 1,
                "serializer interval is not a singleton"
            );
            let head = payload.get(head_index);
            assert!(!pc.amo || head.class.amo, "amo flag without amo at head");
            assert!(!pc.csr || head.class.csr, "csr flag without csr at head");
        }

        if pc.exception {
            return self.take_trap(renamer, payload, regs, rename_stage, ext, stats);
        }

        if self.csr || (self.amo && pc.loads == 0 && pc.stores == 0) {
            // Run the side effect against architectural state. LR/SC pairs
            // (amo with a queue entry) commit through the LSU instead.
            let dst = payload.get(head_index).phys_c;
            match ext.serializer.execute(head_index) {
                Ok(value) => {
                    if let Some(pr) = dst {
                        renamer.set_ready(pr);
                        renamer.write(pr, value);
                    }
                }
                Err(trap) => {
                    renamer.set_exception(self.chkpt);
                    payload.get_mut(head_index).trap = Some(trap);
                }
            }
            stats.serializers_executed += 1;
        }

        debug!(chkpt = %self.chkpt, "bulk commit begins");
        self.state = RetireState::BulkCommit;
        0
    }

    fn take_trap<F, L, Q, T, C, S>(
        &mut self,
        renamer: &mut Renamer,
        payload: &mut PayloadBuffer,
        regs: &mut PipelineRegs,
        rename_stage: &mut RenameStage,
        ext: &mut Externals<'_, F, L, Q, T, C, S>,
        stats: &mut SimStats,
    ) -> u64
    where
        F: FetchUnit,
        L: LoadStoreUnit,
        Q: IssueQueue,
        T: TrapHandler,
        C: RetireChecker,
        S: SerializerExec,
    {
        let head_index = payload.head();
        let entry = payload.get(head_index).clone();
        let Some(trap) = entry.trap else {
            panic!("head checkpoint flagged exception but no trap recorded")
        };

        // CSR serialize traps are micro-architectural: refetch the
        // offending instruction rather than vectoring to the handler.
        let jump_pc = if trap.is_serialize() {
            entry.pc
        } else {
            ext.trap.take_trap(trap, entry.pc)
        };

        ext.checker.check(head_index);
        stats.instructions_retired += 1;
        stats.traps_taken += 1;

        // Squash the whole pipeline back to the committed state.
        let _ = renamer.squash();
        rename_stage.reset_interval();
        regs.flush(renamer, payload);
        for squashed in ext.iq.flush() {
            release_rename_refs(renamer, payload, squashed);
        }
        ext.lsu.flush();
        ext.fetch.flush(jump_pc);
        payload.clear();
        stats.squashes += 1;

        debug!(pc = entry.pc, %trap, "trap taken");
        self.state = RetireState::Idle;
        1
    }

    fn bulk_commit<F, L, Q, T, C, S>(
        &mut self,
        renamer: &mut Renamer,
        ext: &mut Externals<'_, F, L, Q, T, C, S>,
        stats: &mut SimStats,
    ) -> u64
    where
        F: FetchUnit,
        L: LoadStoreUnit,
        Q: IssueQueue,
        T: TrapHandler,
        C: RetireChecker,
        S: SerializerExec,
    {
        for _ in 0..self.retire_width {
            if self.loads_left == 0 {
                break;
            }
            ext.lsu.train(true);
            assert!(
                ext.lsu.commit(true, self.amo),
                "load commit refused by the LSU"
            );
            self.loads_left -= 1;
            stats.loads_committed += 1;
        }
        for _ in 0..self.retire_width {
            if self.stores_left == 0 {
                break;
            }
            ext.lsu.train(false);
            assert!(
                ext.lsu.commit(false, self.amo),
                "store commit refused by the LSU"
            );
            self.stores_left -= 1;
            stats.stores_committed += 1;
        }
        for _ in 0..self.retire_width {
            if self.branches_left == 0 {
                break;
            }
            ext.fetch.commit();
            self.branches_left -= 1;
            stats.branches_committed += 1;
        }
        for _ in 0..self.retire_width {
            if self.log_reg == self.n_log_regs {
                break;
            }
            renamer.commit(self.log_reg);
            self.log_reg += 1;
        }

        if self.loads_left == 0
            && self.stores_left == 0
            && self.branches_left == 0
            && self.log_reg == self.n_log_regs
        {
            renamer.free_checkpoint();
            stats.checkpoints_freed += 1;
            self.state = RetireState::Finalize;
        }
        0
    }

    fn finalize<F, L, Q, T, C, S>(
        &mut self,
        payload: &mut PayloadBuffer,
        ext: &mut Externals<'_, F, L, Q, T, C, S>,
        stats: &mut SimStats,
        budget: u64,
    ) -> u64
    where
        F: FetchUnit,
        L: LoadStoreUnit,
        Q: IssueQueue,
        T: TrapHandler,
        C: RetireChecker,
        S: SerializerExec,
    {
        let mut retired = 0;
        while !payload.is_empty() && payload.get(payload.head()).checkpoint_id == self.chkpt {
            if retired == budget {
                // Budget exhausted mid-drain: resume here next tick.
                return retired;
            }
            let index = payload.pop();
            ext.checker.check(index);
            stats.instructions_retired += 1;
            retired += 1;

            #[cfg(feature = "commit-log")]
            eprintln!(
                "RET pc={:#x} chkpt={}",
                payload.get(index).pc,
                self.chkpt
            );

            if self.amo || self.csr {
                // The serializer stalled fetch; the pipeline is empty.
                // Resume at the instruction after it.
                ext.fetch.flush(ext.serializer.resume_pc(index));
            }
        }
        self.state = RetireState::Idle;
        retired
    }
}
