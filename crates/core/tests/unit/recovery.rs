//! Recovery scenarios: checkpoint rollback, branch-misprediction recovery
//! end to end, exception commit, and total squash.

use pretty_assertions::assert_eq;

use cprsim_core::common::error::Trap;
use cprsim_core::common::reg::{CheckpointId, PhysReg};
use cprsim_core::core::pipeline::latches::PipelineRegs;
use cprsim_core::core::pipeline::payload::PayloadBuffer;
use cprsim_core::core::pipeline::rename_stage::RenameStage;
use cprsim_core::core::pipeline::retire::{Externals, RetireUnit};
use cprsim_core::core::pipeline::writeback::resolve_at_writeback;
use cprsim_core::core::rename::Renamer;
use cprsim_core::stats::SimStats;

use crate::common::{
    InstrBuilder, RecordingChecker, StubFetch, StubIq, StubLsu, StubSerializer, StubTrap,
    small_renamer,
};

/// Everything a retire-driven scenario needs, wired to stubs.
struct Rig {
    renamer: Renamer,
    payload: PayloadBuffer,
    regs: PipelineRegs,
    rename_stage: RenameStage,
    retire: RetireUnit,
    fetch: StubFetch,
    lsu: StubLsu,
    iq: StubIq,
    trap: StubTrap,
    checker: RecordingChecker,
    serializer: StubSerializer,
    stats: SimStats,
}

impl Rig {
    fn new() -> Self {
        Self {
            renamer: small_renamer(),
            payload: PayloadBuffer::new(16),
            regs: PipelineRegs::new(2, 1, 2),
            rename_stage: RenameStage::new(4),
            retire: RetireUnit::new(2, 4),
            fetch: StubFetch::default(),
            lsu: StubLsu::default(),
            iq: StubIq::default(),
            trap: StubTrap::default(),
            checker: RecordingChecker::default(),
            serializer: StubSerializer::default(),
            stats: SimStats::new(),
        }
    }

    fn retire_tick(&mut self, budget: u64) -> u64 {
        let mut ext = Externals {
            fetch: &mut self.fetch,
            lsu: &mut self.lsu,
            iq: &mut self.iq,
            trap: &mut self.trap,
            checker: &mut self.checker,
            serializer: &mut self.serializer,
        };
        self.retire.tick(
            &mut self.renamer,
            &mut self.payload,
            &mut self.regs,
            &mut self.rename_stage,
            &mut ext,
            &mut self.stats,
            budget,
        )
    }

    fn resolve(&mut self, index: usize) -> Option<cprsim_core::core::rename::Rollback> {
        resolve_at_writeback(
            index,
            &mut self.renamer,
            &mut self.payload,
            &mut self.regs,
            &mut self.rename_stage,
            &mut self.iq,
            &mut self.fetch,
            &mut self.lsu,
            &mut self.stats,
        )
    }
}

#[test]
fn checkpoint_then_rollback_releases_speculative_register() {
    let mut ren = small_renamer();

    // Rename src r1, dest r0 -> p4.
    let _ = ren.rename_rsrc(1);
    let dst0 = ren.rename_rdst(0);
    assert_eq!(dst0, PhysReg(4));

    // Anchor the state, then speculate one more rename.
    let anchor = ren.checkpoint();
    assert_eq!(ren.usage(PhysReg(4)), 2);
    let dst1 = ren.rename_rdst(1);
    assert_eq!(dst1, PhysReg(5));

    // Branch-style recovery to the anchor.
    let outcome = ren.rollback(CheckpointId(0), true);
    assert!(outcome.mask.contains(anchor));
    assert!(!outcome.mask.contains(CheckpointId(0)));

    let mapping: Vec<_> = (0..4).map(|lr| ren.mapping(lr)).collect();
    assert_eq!(mapping, vec![PhysReg(4), PhysReg(1), PhysReg(2), PhysReg(3)]);

    // The squashed writer still pins p5; releasing it (as the pipeline
    // walk does) reclaims the register.
    assert!(ren.is_unmapped(PhysReg(5)));
    assert!(!ren.is_free(PhysReg(5)));
    ren.dec_usage(PhysReg(5));
    assert!(ren.is_free(PhysReg(5)));
    ren.audit();
}

#[test]
fn rollback_restores_snapshot_bit_identical() {
    let mut ren = small_renamer();
    let _ = ren.rename_rdst(0);
    let _ = ren.rename_rdst(2);

    let anchor = ren.checkpoint();
    let frozen_map: Vec<_> = (0..4).map(|lr| ren.mapping(lr)).collect();
    let frozen_unmapped: Vec<_> = (0..8).map(|i| ren.is_unmapped(PhysReg(i))).collect();

    // Speculate past the anchor, then recover to it.
    let w0 = ren.rename_rdst(1);
    let _ = ren.checkpoint();
    let w1 = ren.rename_rdst(3);
    let outcome = ren.rollback(anchor, false);
    for pr in [w0, w1] {
        ren.dec_usage(pr);
    }
    assert_eq!(outcome.mask.iter().count(), 2);

    let map_now: Vec<_> = (0..4).map(|lr| ren.mapping(lr)).collect();
    let unmapped_now: Vec<_> = (0..8).map(|i| ren.is_unmapped(PhysReg(i))).collect();
    assert_eq!(map_now, frozen_map);
    assert_eq!(unmapped_now, frozen_unmapped);
    ren.audit();
}

#[test]
fn rollback_to_fresh_checkpoint_is_noop() {
    let mut ren = small_renamer();
    let _ = ren.rename_rdst(0);
    let id = ren.checkpoint();

    let map_before: Vec<_> = (0..4).map(|lr| ren.mapping(lr)).collect();
    let unmapped_before: Vec<_> = (0..8).map(|i| ren.is_unmapped(PhysReg(i))).collect();
    let usage_before: Vec<_> = (0..8).map(|i| ren.usage(PhysReg(i))).collect();

    let _ = ren.rollback(id, false);

    assert_eq!((0..4).map(|lr| ren.mapping(lr)).collect::<Vec<_>>(), map_before);
    assert_eq!(
        (0..8).map(|i| ren.is_unmapped(PhysReg(i))).collect::<Vec<_>>(),
        unmapped_before
    );
    assert_eq!(
        (0..8).map(|i| ren.usage(PhysReg(i))).collect::<Vec<_>>(),
        usage_before
    );
}

#[test]
fn misprediction_recovery_end_to_end() {
    let mut rig = Rig::new();

    // Interval A (the resident head): one load.
    let mut load = InstrBuilder::at(0x100).load().build();
    load.checkpoint_id = rig.renamer.get_checkpoint_id(load.class);
    let cid_a = load.checkpoint_id;
    let load_idx = rig.payload.push(load).unwrap();

    // Interval B: the branch, predicted to fall through but actually taken,
    // followed by its post-branch anchor C.
    let _b = rig.renamer.checkpoint();
    let mut branch = InstrBuilder::at(0x104).branch_to(0x2000).build();
    branch.checkpoint_id = rig.renamer.get_checkpoint_id(branch.class);
    let cid_b = branch.checkpoint_id;
    let branch_idx = rig.payload.push(branch).unwrap();
    let anchor_c = rig.renamer.checkpoint();

    // Wrong-path work in C's interval: a load, a store, and a renamed
    // instruction waiting in the issue queue.
    let mut wrong = InstrBuilder::at(0x108).load().store().src(1).dst(2).build();
    wrong.checkpoint_id = rig.renamer.get_checkpoint_id(wrong.class);
    assert_eq!(wrong.checkpoint_id, anchor_c);
    wrong.phys_a = Some(rig.renamer.rename_rsrc(1));
    wrong.phys_c = Some(rig.renamer.rename_rdst(2));
    let wrong_src = wrong.phys_a.unwrap();
    let src_usage_before = rig.renamer.usage(wrong_src);
    let wrong_dst = wrong.phys_c.unwrap();
    let wrong_idx = rig.payload.push(wrong).unwrap();
    rig.iq.entries.push((wrong_idx, anchor_c));

    // The branch resolves at writeback.
    let outcome = rig.resolve(branch_idx).expect("recovery must run");

    // Only the anchor interval is squashed, and the totals are its
    // operation counts.
    assert!(outcome.mask.contains(anchor_c));
    assert!(!outcome.mask.contains(cid_a));
    assert!(!outcome.mask.contains(cid_b));
    assert_eq!((outcome.loads, outcome.stores, outcome.branches), (1, 1, 0));

    // The wrong-path destination returned to the free list, its source
    // reference drained, and fetch was redirected to the actual target.
    assert!(rig.renamer.is_free(wrong_dst));
    assert_eq!(rig.renamer.usage(wrong_src), src_usage_before - 1);
    assert_eq!(rig.fetch.mispredicts, vec![(0, true, 0x2000)]);
    assert!(!rig.payload.is_live(wrong_idx));
    rig.renamer.audit();

    // Drain both surviving intervals through retire.
    rig.renamer.set_complete(cid_a);
    let mut retired = 0;
    for _ in 0..32 {
        retired += rig.retire_tick(8);
    }
    assert_eq!(retired, 2);
    assert_eq!(rig.checker.retired, vec![load_idx, branch_idx]);
    assert_eq!(rig.stats.loads_committed, 1);
    assert_eq!(rig.stats.branches_committed, 1);
    assert_eq!(rig.fetch.commits, 1);
    // The re-armed anchor is now the resident checkpoint.
    assert!(rig.renamer.is_chkpt_valid(anchor_c));
    rig.renamer.audit_quiescent();
}

#[test]
fn exception_at_lone_head_commits_and_squashes() {
    let mut rig = Rig::new();

    let mut faulting = InstrBuilder::at(0x2000)
        .load()
        .excepts(Trap::LoadAccessFault(0xbad))
        .build();
    faulting.checkpoint_id = rig.renamer.get_checkpoint_id(faulting.class);
    let cid = faulting.checkpoint_id;
    let _ = rig.payload.push(faulting).unwrap();
    rig.renamer.set_complete(cid);
    rig.renamer.set_exception(cid);

    // No newer checkpoint exists; the exception overrides the gate.
    assert_eq!(rig.retire_tick(8), 1);
    assert_eq!(rig.trap.taken, vec![(Trap::LoadAccessFault(0xbad), 0x2000)]);
    assert_eq!(rig.fetch.flushes, vec![0x8000_0000]);
    assert!(rig.lsu.flushed);
    assert!(rig.payload.is_empty());
    assert_eq!(rig.stats.squashes, 1);

    // Exactly one checkpoint remains, and the renamer is architectural.
    assert!(rig.renamer.is_chkpt_valid(cid));
    assert!(!rig.renamer.is_chkpt_valid(CheckpointId(1)));
    assert!(!rig.renamer.stall_checkpoint(3));
    rig.renamer.audit_quiescent();
}

#[test]
fn total_squash_matches_last_committed_state() {
    let mut ren = small_renamer();

    // Commit one (empty) interval so the resident checkpoint is not the
    // reset one.
    let _ = ren.checkpoint();
    for lr in 0..4 {
        ren.commit(lr);
    }
    ren.free_checkpoint();

    let committed_map: Vec<_> = (0..4).map(|lr| ren.mapping(lr)).collect();
    let committed_usage: Vec<_> = (0..8).map(|i| ren.usage(PhysReg(i))).collect();
    let committed_free = ren.free_regs();

    // Speculate: two renames and a checkpoint.
    let w0 = ren.rename_rdst(0);
    let _ = ren.checkpoint();
    let w1 = ren.rename_rdst(3);

    let outcome = ren.squash();
    assert!(!outcome.mask.is_empty());
    for pr in [w0, w1] {
        ren.dec_usage(pr);
    }

    assert_eq!((0..4).map(|lr| ren.mapping(lr)).collect::<Vec<_>>(), committed_map);
    assert_eq!(
        (0..8).map(|i| ren.usage(PhysReg(i))).collect::<Vec<_>>(),
        committed_usage
    );
    assert_eq!(ren.free_regs(), committed_free);
    ren.audit_quiescent();
}
