//! Randomized properties: free-list ring equivalence to a deque model,
//! reference-counting invariants under arbitrary speculation, and the
//! structural reproducibility of rename sequences across rollback.

use std::collections::VecDeque;

use proptest::prelude::*;

use cprsim_core::common::reg::{CheckpointId, PhysReg};
use cprsim_core::config::RenameConfig;
use cprsim_core::core::rename::Renamer;
use cprsim_core::core::rename::free_list::FreeList;

fn config() -> RenameConfig {
    RenameConfig {
        n_log_regs: 4,
        n_phys_regs: 12,
        n_chkpts: 4,
        n_active: 32,
        max_instr_bw_checkpoints: 8,
    }
}

/// One step of the speculation property.
#[derive(Clone, Debug)]
enum Op {
    /// Rename a destination register.
    Rename(usize),
    /// Install a checkpoint.
    Checkpoint,
    /// Roll back to the newest checkpoint, squashing its interval.
    Rollback,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..4usize).prop_map(Op::Rename),
        2 => Just(Op::Checkpoint),
        1 => Just(Op::Rollback),
    ]
}

proptest! {
    #[test]
    fn free_list_matches_deque_model(ops in proptest::collection::vec(any::<bool>(), 1..128)) {
        let mut fl = FreeList::full(8, 8);
        let mut model: VecDeque<PhysReg> = (8..16).map(PhysReg).collect();
        let mut held: Vec<PhysReg> = Vec::new();

        for pop in ops {
            if pop {
                let got = fl.pop();
                prop_assert_eq!(got, model.pop_front());
                if let Some(pr) = got {
                    held.push(pr);
                }
            } else if let Some(pr) = held.pop() {
                fl.push(pr);
                model.push_back(pr);
            }
            prop_assert_eq!(fl.len(), model.len());
            prop_assert_eq!(fl.is_empty(), model.is_empty());
            prop_assert_eq!(fl.is_full(), model.len() == 8);
        }
    }

    #[test]
    fn speculation_preserves_reference_invariants(
        ops in proptest::collection::vec(op_strategy(), 1..64)
    ) {
        let mut ren = Renamer::new(&config());
        // Writers renamed into the newest checkpoint's interval; released
        // when that interval is squashed, as the pipeline walk would.
        let mut current: Vec<PhysReg> = Vec::new();
        // Writers of older intervals, still inflight.
        let mut older: Vec<PhysReg> = Vec::new();
        let mut newest = CheckpointId(0);

        for op in ops {
            match op {
                Op::Rename(lr) => {
                    if !ren.stall_reg(1) {
                        current.push(ren.rename_rdst(lr));
                    }
                }
                Op::Checkpoint => {
                    if !ren.stall_checkpoint(1) {
                        newest = ren.checkpoint();
                        older.append(&mut current);
                    }
                }
                Op::Rollback => {
                    let outcome = ren.rollback(newest, false);
                    prop_assert!(outcome.mask.contains(newest));
                    for pr in current.drain(..) {
                        ren.dec_usage(pr);
                    }
                }
            }
            ren.audit();
        }

        // Unwind everything: total squash, then drain the inflight writers.
        let _ = ren.squash();
        for pr in current.drain(..).chain(older.drain(..)) {
            ren.dec_usage(pr);
        }
        ren.audit_quiescent();
        prop_assert_eq!(ren.free_regs(), 8);
    }

    #[test]
    fn rename_sequences_reproduce_structure(
        dsts in proptest::collection::vec(0..4usize, 1..8)
    ) {
        let mut ren = Renamer::new(&config());
        let baseline: Vec<_> = (0..4).map(|lr| ren.mapping(lr)).collect();
        let anchor = ren.checkpoint();

        let mut apply = |ren: &mut Renamer| -> (Vec<PhysReg>, Vec<PhysReg>) {
            let mut writers = Vec::new();
            for &lr in &dsts {
                writers.push(ren.rename_rdst(lr));
            }
            ((0..4).map(|lr| ren.mapping(lr)).collect(), writers)
        };

        let (first, writers) = apply(&mut ren);
        let outcome = ren.rollback(anchor, false);
        prop_assert!(outcome.mask.contains(anchor));
        for pr in writers {
            ren.dec_usage(pr);
        }

        let (second, _) = apply(&mut ren);

        // The physical names differ (the free list moved on), but the
        // structural shape is identical: the same slots were remapped, and
        // the same slots alias each other.
        for lr in 0..4 {
            prop_assert_eq!(first[lr] == baseline[lr], second[lr] == baseline[lr]);
            for other in 0..4 {
                prop_assert_eq!(first[lr] == first[other], second[lr] == second[other]);
            }
        }
        ren.audit();
    }
}
