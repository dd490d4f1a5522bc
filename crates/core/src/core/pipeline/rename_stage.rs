//! Rename stage: atomic bundle rename with checkpoint insertion.
//!
//! The stage walks each rename bundle twice. The first pass is a dry run
//! that only counts the checkpoints and destination registers the bundle
//! needs; if the renamer cannot supply either, the whole bundle is held and
//! retried next cycle. The second pass renames for real, punctuating the
//! instruction stream with checkpoints.
//!
//! Checkpoint insertion policy, per instruction:
//! 1. A serializing instruction (AMO/CSR) closes the open interval if it is
//!    non-empty and always closes its own, so the serializer sits alone.
//! 2. A branch the oracle knows is mispredicted, or an interval reaching
//!    the configured length cap, closes the interval after the instruction.
//! 3. An instruction the oracle knows will raise an exception closes the
//!    open interval before itself if non-empty, and nothing after.
//! 4. Anything else just extends the open interval.
//!
//! Both passes share one decision function, so the dry-run count and the
//! executed insertions cannot drift apart. The running
//! instructions-since-last-checkpoint counter belongs to this stage, not
//! the renamer, and resets on every insertion, on rollback, and on squash.

use crate::core::pipeline::payload::{InstrPayload, PayloadBuffer};
use crate::core::rename::Renamer;
use crate::stats::SimStats;

/// Checkpoint insertions one instruction requires.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct ChkptActions {
    /// Close the currently open interval before renaming the instruction.
    before: bool,
    /// Close the instruction's own interval right after renaming it.
    after: bool,
}

/// Resource demand of one rename bundle, from the dry run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BundlePlan {
    /// Checkpoints the bundle will install.
    pub checkpoints: usize,
    /// Destination registers the bundle will pop.
    pub dests: usize,
    /// Per-instruction insertion actions, replayed by the rename pass.
    actions: Vec<ChkptActions>,
}

/// The rename stage driver.
#[derive(Debug)]
pub struct RenameStage {
    /// Instructions renamed since the most recent checkpoint.
    since_last: u64,
    /// Interval length cap driving automatic insertion.
    max_between: u64,
}

impl RenameStage {
    /// Creates the stage with the configured interval cap.
    pub fn new(max_instr_bw_checkpoints: u64) -> Self {
        assert!(max_instr_bw_checkpoints > 0, "interval cap must be positive");
        Self {
            since_last: 0,
            max_between: max_instr_bw_checkpoints,
        }
    }

    /// Instructions renamed since the most recent checkpoint.
    #[inline]
    pub fn since_last(&self) -> u64 {
        self.since_last
    }

    /// Resets the interval counter.
    ///
    /// Called after any recovery that re-arms a checkpoint (rollback tail
    /// retraction, total squash): renaming resumes into a fresh interval.
    pub fn reset_interval(&mut self) {
        self.since_last = 0;
    }

    /// Decides the insertions for one instruction, advancing the running
    /// counter the same way the rename pass will.
    fn decide(&self, since: &mut u64, instr: &InstrPayload) -> ChkptActions {
        if instr.class.amo || instr.class.csr {
            let before = *since != 0;
            *since = 0;
            ChkptActions {
                before,
                after: true,
            }
        } else if instr.oracle_exception {
            let before = *since != 0;
            *since = 1;
            ChkptActions {
                before,
                after: false,
            }
        } else if instr.next_pc != instr.oracle_next_pc || *since == self.max_between {
            *since = 0;
            ChkptActions {
                before: false,
                after: true,
            }
        } else {
            *since += 1;
            ChkptActions::default()
        }
    }

    /// Dry run: tallies the checkpoints and destinations `bundle` needs.
    ///
    /// `bundle` holds payload indices in program order.
    pub fn plan(&self, payload: &PayloadBuffer, bundle: &[usize]) -> BundlePlan {
        let mut since = self.since_last;
        let mut plan = BundlePlan {
            checkpoints: 0,
            dests: 0,
            actions: Vec::with_capacity(bundle.len()),
        };
        for &index in bundle {
            let instr = payload.get(index);
            let actions = self.decide(&mut since, instr);
            plan.checkpoints += usize::from(actions.before) + usize::from(actions.after);
            plan.dests += usize::from(instr.dst_c.is_some());
            plan.actions.push(actions);
        }
        plan
    }

    /// Renames a bundle atomically.
    ///
    /// Performs the dry run, holds the whole bundle if the renamer cannot
    /// supply the checkpoints or registers it needs, and otherwise renames
    /// every instruction in program order, updating each payload record
    /// with its physical registers and checkpoint ID. Returns false when
    /// the bundle was held.
    pub fn rename(
        &mut self,
        renamer: &mut Renamer,
        payload: &mut PayloadBuffer,
        bundle: &[usize],
        stats: &mut SimStats,
    ) -> bool {
        let plan = self.plan(payload, bundle);
        if renamer.stall_checkpoint(plan.checkpoints) {
            stats.stalls_checkpoint += 1;
            return false;
        }
        if renamer.stall_reg(plan.dests) {
            stats.stalls_reg += 1;
            return false;
        }

        for (&index, actions) in bundle.iter().zip(&plan.actions) {
            if actions.before {
                let _ = renamer.checkpoint();
                stats.checkpoints_created += 1;
                self.since_last = 0;
            }

            let class = payload.get(index).class;
            // A before-checkpoint installed above is now the newest, so the
            // instruction attributes to the interval it opened, not to the
            // one it closed.
            let cid = renamer.get_checkpoint_id(class);

            let entry = payload.get(index).clone();
            if let Some(lr) = entry.src_a {
                payload.get_mut(index).phys_a = Some(renamer.rename_rsrc(lr));
            }
            if let Some(lr) = entry.src_b {
                payload.get_mut(index).phys_b = Some(renamer.rename_rsrc(lr));
            }
            if let Some(lr) = entry.src_d {
                payload.get_mut(index).phys_d = Some(renamer.rename_rsrc(lr));
            }
            if let Some(lr) = entry.dst_c {
                let pr = renamer.rename_rdst(lr);
                renamer.clear_ready(pr);
                payload.get_mut(index).phys_c = Some(pr);
            }
            payload.get_mut(index).checkpoint_id = cid;
            self.since_last += 1;

            if actions.after {
                let _ = renamer.checkpoint();
                stats.checkpoints_created += 1;
                self.since_last = 0;
            }
        }
        true
    }
}
