//! Pipeline register slots and the reference-release discipline.
//!
//! Latches carry payload-buffer indices between stages. What matters to the
//! renamer is which usage references a squashed slot still holds, and that
//! depends on where the slot sits:
//! 1. **Upstream of register read** (the dispatch latch, and issue-queue
//!    entries): the instruction has consumed nothing, so release every
//!    source reference and the destination reference taken at rename.
//! 2. **Register read through writeback** (the execution-lane latches):
//!    source references were consumed by [`Renamer::read`]; only the
//!    destination reference remains until [`Renamer::write`] consumes it.
//!
//! Every squash path funnels through [`release_rename_refs`] and
//! [`release_dest_ref`] so the accounting lives in one place.
//!
//! [`Renamer::read`]: crate::core::rename::Renamer::read
//! [`Renamer::write`]: crate::core::rename::Renamer::write

use crate::core::pipeline::payload::PayloadBuffer;
use crate::core::rename::Renamer;
use crate::core::rename::checkpoints::SquashMask;

/// One pipeline register slot: a payload index plus a valid bit.
#[derive(Clone, Copy, Debug, Default)]
pub struct LatchSlot {
    /// Whether the slot holds an instruction.
    pub valid: bool,
    /// Payload-buffer index of the instruction.
    pub index: usize,
}

impl LatchSlot {
    /// Fills the slot.
    pub fn fill(&mut self, index: usize) {
        self.valid = true;
        self.index = index;
    }

    /// Empties the slot and returns the index it held, if any.
    pub fn take(&mut self) -> Option<usize> {
        let held = self.valid.then_some(self.index);
        self.valid = false;
        held
    }
}

/// Releases the references an instruction still holds before register read:
/// every renamed source plus the destination.
pub fn release_rename_refs(renamer: &mut Renamer, payload: &PayloadBuffer, index: usize) {
    let entry = payload.get(index);
    for pr in [entry.phys_a, entry.phys_b, entry.phys_d, entry.phys_c]
        .into_iter()
        .flatten()
    {
        renamer.dec_usage(pr);
    }
}

/// Releases the destination reference an instruction holds between register
/// read and writeback.
pub fn release_dest_ref(renamer: &mut Renamer, payload: &PayloadBuffer, index: usize) {
    let entry = payload.get(index);
    if let Some(pr) = entry.phys_c {
        renamer.dec_usage(pr);
    }
}

/// The rename-to-dispatch pipeline register.
///
/// Slots here are upstream of register read and hold full rename references.
#[derive(Debug)]
pub struct DispatchLatch {
    /// One slot per dispatch lane.
    pub slots: Vec<LatchSlot>,
}

impl DispatchLatch {
    /// Creates an empty latch of `width` slots.
    pub fn new(width: usize) -> Self {
        Self {
            slots: vec![LatchSlot::default(); width],
        }
    }

    /// Invalidates slots whose checkpoint bit is set, releasing their
    /// rename references.
    pub fn squash(&mut self, mask: &SquashMask, renamer: &mut Renamer, payload: &PayloadBuffer) {
        for slot in &mut self.slots {
            if slot.valid && mask.contains(payload.get(slot.index).checkpoint_id) {
                release_rename_refs(renamer, payload, slot.index);
                slot.valid = false;
            }
        }
    }

    /// Invalidates every slot, releasing all rename references.
    pub fn flush(&mut self, renamer: &mut Renamer, payload: &PayloadBuffer) {
        for slot in &mut self.slots {
            if slot.valid {
                release_rename_refs(renamer, payload, slot.index);
                slot.valid = false;
            }
        }
    }
}

/// One execution lane: the register-read output latch, the execute-depth
/// latches, and the writeback latch.
///
/// Everything in a lane has consumed its source references; each slot holds
/// only the destination reference.
#[derive(Debug)]
pub struct ExecLane {
    /// Register-read output latch.
    pub reg_read: LatchSlot,
    /// Execute pipeline latches, one per cycle of depth.
    pub execute: Vec<LatchSlot>,
    /// Writeback input latch.
    pub writeback: LatchSlot,
}

impl ExecLane {
    /// Creates an empty lane with `depth` execute latches.
    pub fn new(depth: usize) -> Self {
        Self {
            reg_read: LatchSlot::default(),
            execute: vec![LatchSlot::default(); depth],
            writeback: LatchSlot::default(),
        }
    }

    /// Invalidates lane slots whose checkpoint bit is set, releasing their
    /// destination references.
    pub fn squash(&mut self, mask: &SquashMask, renamer: &mut Renamer, payload: &PayloadBuffer) {
        for slot in self.slots_mut() {
            if slot.valid && mask.contains(payload.get(slot.index).checkpoint_id) {
                release_dest_ref(renamer, payload, slot.index);
                slot.valid = false;
            }
        }
    }

    /// Invalidates every lane slot, releasing all destination references.
    pub fn flush(&mut self, renamer: &mut Renamer, payload: &PayloadBuffer) {
        for slot in self.slots_mut() {
            if slot.valid {
                release_dest_ref(renamer, payload, slot.index);
                slot.valid = false;
            }
        }
    }

    fn slots_mut(&mut self) -> impl Iterator<Item = &mut LatchSlot> {
        std::iter::once(&mut self.reg_read)
            .chain(self.execute.iter_mut())
            .chain(std::iter::once(&mut self.writeback))
    }
}

/// All backend pipeline registers: the dispatch latch plus the execution
/// lanes. Recovery paths squash or flush them as one unit.
#[derive(Debug)]
pub struct PipelineRegs {
    /// Rename-to-dispatch latch.
    pub dispatch: DispatchLatch,
    /// Execution lanes.
    pub lanes: Vec<ExecLane>,
}

impl PipelineRegs {
    /// Creates empty pipeline registers: a `width`-wide dispatch latch and
    /// `n_lanes` execution lanes of `depth` execute stages each.
    pub fn new(width: usize, n_lanes: usize, depth: usize) -> Self {
        Self {
            dispatch: DispatchLatch::new(width),
            lanes: (0..n_lanes).map(|_| ExecLane::new(depth)).collect(),
        }
    }

    /// Selectively squashes every register keyed by the mask.
    pub fn squash(&mut self, mask: &SquashMask, renamer: &mut Renamer, payload: &PayloadBuffer) {
        self.dispatch.squash(mask, renamer, payload);
        for lane in &mut self.lanes {
            lane.squash(mask, renamer, payload);
        }
    }

    /// Flushes every register, releasing all held references.
    pub fn flush(&mut self, renamer: &mut Renamer, payload: &PayloadBuffer) {
        self.dispatch.flush(renamer, payload);
        for lane in &mut self.lanes {
            lane.flush(renamer, payload);
        }
    }
}
