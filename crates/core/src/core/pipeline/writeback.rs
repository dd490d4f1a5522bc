//! Writeback-time branch resolution and selective squash.
//!
//! A branch reaching writeback with a computed next-PC that differs from
//! its prediction triggers checkpoint-grained recovery:
//! 1. Redirect the fetch unit and repair its predictor state.
//! 2. Roll the renamer back to the checkpoint just after the branch.
//! 3. Restore the load/store queues to the coordinates the branch captured.
//! 4. Walk every pipeline register and the issue queue, invalidating
//!    instructions whose checkpoint bit is set and releasing the register
//!    references they still hold.
//! 5. Retract the payload buffer to the branch.
//!
//! Correctly predicted branches (and every other instruction) just mark
//! completion on their checkpoint interval.

use tracing::debug;

use crate::core::pipeline::latches::{PipelineRegs, release_rename_refs};
use crate::core::pipeline::payload::PayloadBuffer;
use crate::core::pipeline::rename_stage::RenameStage;
use crate::core::pipeline::traits::{FetchUnit, IssueQueue, LoadStoreUnit};
use crate::core::rename::{Renamer, Rollback};
use crate::stats::SimStats;

/// Resolves one instruction at writeback.
///
/// `index` is the instruction's payload record. Returns the rollback
/// outcome if the instruction was a mispredicted branch and recovery ran.
#[allow(clippy::too_many_arguments)]
pub fn resolve_at_writeback<F, L, Q>(
    index: usize,
    renamer: &mut Renamer,
    payload: &mut PayloadBuffer,
    regs: &mut PipelineRegs,
    rename_stage: &mut RenameStage,
    iq: &mut Q,
    fetch: &mut F,
    lsu: &mut L,
    stats: &mut SimStats,
) -> Option<Rollback>
where
    F: FetchUnit,
    L: LoadStoreUnit,
    Q: IssueQueue,
{
    let entry = payload.get(index).clone();
    let mut recovery = None;

    if entry.next_pc != entry.oracle_next_pc {
        debug!(pc = entry.pc, target = entry.oracle_next_pc, "branch mispredicted");

        // Redirect fetch: taken if the branch does not fall through.
        let fallthrough = entry.pc.wrapping_add(4);
        fetch.mispredict(
            entry.pred_tag,
            entry.oracle_next_pc != fallthrough,
            entry.oracle_next_pc,
        );

        // Recover the renamer to the anchor after the branch.
        let outcome = renamer.rollback(entry.checkpoint_id, true);
        rename_stage.reset_interval();

        // Recover the load/store queues.
        lsu.restore(entry.lq_index, entry.lq_phase, entry.sq_index, entry.sq_phase);

        // Selectively squash everything keyed by the mask. Issue-queue
        // entries have consumed nothing yet, so their full rename
        // references come back here.
        regs.squash(&outcome.mask, renamer, payload);
        for squashed in iq.squash(&outcome.mask) {
            release_rename_refs(renamer, payload, squashed);
        }

        // Drop the squashed payload records.
        payload.rollback(index);

        stats.recoveries += 1;
        recovery = Some(outcome);
    }

    // The branch itself stays inflight and completes normally.
    renamer.set_complete(payload.get(index).checkpoint_id);
    recovery
}
