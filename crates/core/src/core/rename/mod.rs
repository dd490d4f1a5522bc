//! Register renaming core with checkpointed recovery.
//!
//! This module owns the four structures that make out-of-order execution
//! correct, and the protocol that keeps them mutually consistent:
//! 1. **Free list:** ring of physical registers with no live references.
//! 2. **Map table:** the current logical-to-physical mapping.
//! 3. **Physical register file:** values plus ready/unmapped/usage metadata.
//! 4. **Checkpoint buffer:** the FIFO window of speculation anchors.
//!
//! Recovery is checkpoint-grained: a misprediction or exception rolls the
//! map state back to an anchor and hands the pipeline a per-checkpoint
//! squash predicate, rather than repairing per instruction.

/// Checkpoint buffer, squash masks, and precommit status.
pub mod checkpoints;
/// Free list ring of reclaimable physical registers.
pub mod free_list;
/// Rename map table.
pub mod map_table;
/// Physical register file and metadata.
pub mod registers;

use tracing::{debug, trace};

use crate::common::reg::{CheckpointId, PhysReg};
use crate::config::RenameConfig;
use crate::core::rename::checkpoints::{CheckpointBuffer, InstrClass, Precommit, SquashMask};
use crate::core::rename::free_list::FreeList;
use crate::core::rename::map_table::MapTable;
use crate::core::rename::registers::PhysRegFile;

/// Result of a rollback: the squash predicate plus the inflight-operation
/// totals of the invalidated intervals.
#[derive(Clone, Debug)]
pub struct Rollback {
    /// Checkpoints whose instructions downstream stages must invalidate.
    /// Includes the resumption anchor itself: its interval is squashed even
    /// though the anchor slot survives, re-armed and empty.
    pub mask: SquashMask,
    /// Loads attributed to the squashed intervals.
    pub loads: u64,
    /// Stores attributed to the squashed intervals.
    pub stores: u64,
    /// Branches attributed to the squashed intervals.
    pub branches: u64,
}

/// The renaming core: free list, map table, physical registers, and
/// checkpoint buffer behind the rename/commit/rollback protocol.
///
/// All four structures are privately owned; the pipeline interacts only
/// through the operations below. Structural misuse (popping an empty free
/// list from rename, usage underflow, rolling back to a dead checkpoint)
/// aborts the simulation: those states mean the coupled pipeline is buggy,
/// and continuing would corrupt the architectural state silently.
pub struct Renamer {
    rmt: MapTable,
    prf: PhysRegFile,
    free: FreeList,
    chkpts: CheckpointBuffer,
}

impl Renamer {
    /// Builds the reset state: identity mapping, full free list, and the
    /// initial resident checkpoint.
    ///
    /// # Panics
    ///
    /// Aborts on structurally impossible sizing; run
    /// [`CoreConfig::validate`](crate::config::CoreConfig::validate) first
    /// for a recoverable error.
    pub fn new(config: &RenameConfig) -> Self {
        assert!(
            config.n_phys_regs > config.n_log_regs,
            "need more physical than logical registers"
        );
        assert!(config.n_active > 0, "n_active must be positive");

        let rmt = MapTable::identity(config.n_log_regs);
        let mut prf = PhysRegFile::new(config.n_phys_regs);
        let mut chkpts = CheckpointBuffer::new(
            config.n_chkpts,
            config.n_log_regs,
            config.n_phys_regs,
        );

        // Install the initial architectural checkpoint: the low registers
        // become mapped and each carries one snapshot reference.
        for lr in 0..config.n_log_regs {
            let pr = rmt.read(lr);
            prf.map(pr);
            prf.inc_usage(pr);
        }
        let _ = chkpts.install(&rmt.snapshot(), &prf.unmapped_snapshot());

        let free = FreeList::full(config.n_log_regs, config.n_phys_regs - config.n_log_regs);

        Self {
            rmt,
            prf,
            free,
            chkpts,
        }
    }

    /// Number of logical registers.
    #[inline]
    pub fn n_log_regs(&self) -> usize {
        self.rmt.len()
    }

    /// Number of physical registers.
    #[inline]
    pub fn n_phys_regs(&self) -> usize {
        self.prf.len()
    }

    /// Checkpoint buffer capacity.
    #[inline]
    pub fn n_chkpts(&self) -> usize {
        self.chkpts.capacity()
    }

    // ---- Rename stage ----------------------------------------------------

    /// Returns true if the free list cannot supply `bundle_dst` destination
    /// registers.
    pub fn stall_reg(&self, bundle_dst: usize) -> bool {
        self.free.len() < bundle_dst
    }

    /// Returns true if the checkpoint buffer cannot accept `bundle_chkpt`
    /// new checkpoints.
    pub fn stall_checkpoint(&self, bundle_chkpt: usize) -> bool {
        self.chkpts.stall(bundle_chkpt)
    }

    /// Renames a source register and records the inflight reference.
    ///
    /// The reference is released when the consumer reads the register
    /// ([`read`](Self::read)) or when the instruction is squashed.
    pub fn rename_rsrc(&mut self, log_reg: usize) -> PhysReg {
        let pr = self.rmt.read(log_reg);
        self.prf.inc_usage(pr);
        pr
    }

    /// Renames a destination register: pops a fresh physical register, maps
    /// it, and unmaps (possibly reclaiming) the displaced one.
    ///
    /// # Panics
    ///
    /// Aborts if the free list is empty (the caller must consult
    /// [`stall_reg`](Self::stall_reg) first) or if the popped register is
    /// still mapped; both are structural bugs.
    pub fn rename_rdst(&mut self, log_reg: usize) -> PhysReg {
        let old = self.rmt.read(log_reg);
        let Some(pr) = self.free.pop() else {
            panic!("rename_rdst: free list empty; stall_reg was not honored")
        };
        assert!(
            !self.rmt.contains(pr),
            "{pr} popped from the free list but still mapped"
        );

        self.rmt.write(log_reg, pr);
        self.prf.map(pr);
        self.prf.inc_usage(pr);
        self.release(old);

        trace!(log_reg, new = %pr, old = %old, "rename_rdst");
        pr
    }

    /// Creates a new checkpoint at the tail from the current map state.
    ///
    /// Every register in the snapshot gains a usage reference, held until
    /// the checkpoint is committed (released register-by-register via
    /// [`commit`](Self::commit)) or squashed.
    pub fn checkpoint(&mut self) -> CheckpointId {
        for lr in 0..self.rmt.len() {
            self.prf.inc_usage(self.rmt.read(lr));
        }
        let id = self
            .chkpts
            .install(&self.rmt.snapshot(), &self.prf.unmapped_snapshot());
        trace!(id = %id, "checkpoint installed");
        id
    }

    /// Attributes one renamed instruction to the newest checkpoint and
    /// returns that checkpoint's ID.
    pub fn get_checkpoint_id(&mut self, class: InstrClass) -> CheckpointId {
        self.chkpts.attribute(class)
    }

    /// Returns true if `cid` names a live checkpoint.
    pub fn is_chkpt_valid(&self, cid: CheckpointId) -> bool {
        self.chkpts.is_valid(cid)
    }

    // ---- Dispatch / issue / execute --------------------------------------

    /// Tests a physical register's ready bit.
    pub fn is_ready(&self, pr: PhysReg) -> bool {
        self.prf.is_ready(pr)
    }

    /// Clears a physical register's ready bit.
    pub fn clear_ready(&mut self, pr: PhysReg) {
        self.prf.clear_ready(pr);
    }

    /// Sets a physical register's ready bit.
    pub fn set_ready(&mut self, pr: PhysReg) {
        self.prf.set_ready(pr);
    }

    /// Reads a physical register, consuming one inflight source reference.
    pub fn read(&mut self, pr: PhysReg) -> u64 {
        self.dec_usage(pr);
        self.prf.value(pr)
    }

    /// Writes a physical register, consuming the inflight writer reference.
    pub fn write(&mut self, pr: PhysReg, value: u64) {
        self.dec_usage(pr);
        self.prf.set_value(pr, value);
    }

    /// Adds a usage reference to a physical register.
    pub fn inc_usage(&mut self, pr: PhysReg) {
        self.prf.inc_usage(pr);
    }

    /// Drops a usage reference, reclaiming the register onto the free list
    /// if it was the last reference to an unmapped register.
    pub fn dec_usage(&mut self, pr: PhysReg) {
        if self.prf.dec_usage(pr) {
            self.free.push(pr);
        }
    }

    // ---- Writeback -------------------------------------------------------

    /// Marks one instruction of a checkpoint interval as completed.
    pub fn set_complete(&mut self, cid: CheckpointId) {
        self.chkpts.set_complete(cid);
    }

    /// Flags a checkpoint interval as holding an excepting instruction.
    pub fn set_exception(&mut self, cid: CheckpointId) {
        self.chkpts.set_exception(cid);
    }

    // ---- Retire ----------------------------------------------------------

    /// Probes whether the head checkpoint may begin bulk commit.
    pub fn precommit(&self) -> Option<Precommit> {
        self.chkpts.precommit()
    }

    /// Commits one architectural register of the head checkpoint, releasing
    /// its snapshot reference.
    pub fn commit(&mut self, log_reg: usize) {
        let pr = self.chkpts.entry(self.chkpts.head_id()).rmt[log_reg];
        self.dec_usage(pr);
    }

    /// Frees the head checkpoint after its interval has fully committed.
    ///
    /// The caller must have drained every architectural register via
    /// [`commit`](Self::commit) and every inflight load/store/branch first.
    pub fn free_checkpoint(&mut self) {
        trace!(id = %self.chkpts.head_id(), "checkpoint freed");
        self.chkpts.free_head();
    }

    // ---- Recovery --------------------------------------------------------

    /// Rolls the map state back to a checkpoint anchor.
    ///
    /// With `next` false the anchor is `cid` itself (exception/total-squash
    /// recovery); with `next` true it is the checkpoint just after `cid`
    /// (branch recovery: `cid` is the mispredicted branch's interval, and
    /// the anchor is the snapshot taken right after the branch renamed).
    ///
    /// Restores the map table and unmapped bits from the anchor, releases
    /// the snapshot references of every checkpoint after the anchor,
    /// re-arms the anchor with cleared counters, and retracts the tail.
    /// The returned mask covers the anchor and everything after it: the
    /// anchor's own interval is squashed even though its slot survives.
    ///
    /// # Panics
    ///
    /// Aborts if the anchor is not a live checkpoint.
    pub fn rollback(&mut self, cid: CheckpointId, next: bool) -> Rollback {
        let rc = if next { self.chkpts.next(cid) } else { cid };
        assert!(
            self.chkpts.is_valid(rc),
            "rollback to invalid checkpoint {rc}"
        );

        // Restore the mapping and align the unmapped bits to the anchor,
        // reclaiming registers whose last reference was already gone.
        self.rmt.restore(&self.chkpts.entry(rc).rmt.clone());
        for idx in 0..self.prf.len() {
            let pr = PhysReg(idx);
            let frozen = self.chkpts.entry(rc).unmapped[idx];
            if frozen == self.prf.is_unmapped(pr) {
                continue;
            }
            if frozen {
                self.release(pr);
            } else {
                self.prf.map(pr);
            }
        }

        let mask = self.chkpts.squash_set(rc);
        let mut outcome = Rollback {
            loads: self.chkpts.entry(rc).loads,
            stores: self.chkpts.entry(rc).stores,
            branches: self.chkpts.entry(rc).branches,
            mask,
        };
        outcome.mask.set(rc);

        // Release the snapshot references of the squashed checkpoints. The
        // anchor keeps its own: it remains live, and its references are
        // released later by commit or a further rollback.
        for cid in outcome.mask.iter() {
            if cid == rc {
                continue;
            }
            assert!(self.chkpts.is_valid(cid));
            outcome.loads += self.chkpts.entry(cid).loads;
            outcome.stores += self.chkpts.entry(cid).stores;
            outcome.branches += self.chkpts.entry(cid).branches;
            for slot in 0..self.n_log_regs() {
                let pr = self.chkpts.entry(cid).rmt[slot];
                self.dec_usage(pr);
            }
        }

        self.chkpts.reset_entry(rc);
        self.chkpts.retract_tail_to(rc);

        debug!(
            anchor = %rc,
            squashed = outcome.mask.iter().count(),
            "rollback"
        );
        outcome
    }

    /// Total squash: rolls back to the oldest live checkpoint, leaving the
    /// renamer in the last committed architectural state with exactly the
    /// resident checkpoint live.
    ///
    /// The surrounding stages clear their own registers; inflight usage
    /// references drain through the selective-squash walk.
    pub fn squash(&mut self) -> Rollback {
        debug!("total squash");
        self.rollback(self.chkpts.head_id(), false)
    }

    // ---- Diagnostics -----------------------------------------------------

    /// Current mapping of a logical register, without taking a reference.
    pub fn mapping(&self, log_reg: usize) -> PhysReg {
        self.rmt.read(log_reg)
    }

    /// Usage counter of a physical register.
    pub fn usage(&self, pr: PhysReg) -> u64 {
        self.prf.usage(pr)
    }

    /// Unmapped bit of a physical register.
    pub fn is_unmapped(&self, pr: PhysReg) -> bool {
        self.prf.is_unmapped(pr)
    }

    /// Number of free physical registers available.
    pub fn free_regs(&self) -> usize {
        self.free.len()
    }

    /// Returns true if the register is on the free list.
    pub fn is_free(&self, pr: PhysReg) -> bool {
        self.free.contains(pr)
    }

    /// Checks the reference-counting invariants that hold at any point:
    /// mapped registers are never on the free list, every reclaimable
    /// register is on it, and the map table is injective.
    ///
    /// # Panics
    ///
    /// Panics with a diagnostic on the first violated invariant.
    pub fn audit(&self) {
        for idx in 0..self.prf.len() {
            let pr = PhysReg(idx);
            if self.prf.is_unmapped(pr) && self.prf.usage(pr) == 0 {
                assert!(
                    self.free.contains(pr),
                    "{pr} is reclaimable but not on the free list"
                );
            } else {
                assert!(
                    !self.free.contains(pr),
                    "{pr} is on the free list but still referenced or mapped"
                );
            }
        }
        for lr in 0..self.rmt.len() {
            let pr = self.rmt.read(lr);
            assert!(!self.prf.is_unmapped(pr), "mapped {pr} has unmapped bit set");
            for other in (lr + 1)..self.rmt.len() {
                assert!(
                    self.rmt.read(other) != pr,
                    "{pr} mapped by both r{lr} and r{other}"
                );
            }
        }
    }

    /// [`audit`](Self::audit) plus the quiescent-only partition law: with no
    /// inflight references, every register is either free or mapped.
    pub fn audit_quiescent(&self) {
        self.audit();
        assert_eq!(
            self.free.len() + self.prf.mapped_count(),
            self.prf.len(),
            "free/mapped partition does not cover the register file"
        );
    }

    fn release(&mut self, pr: PhysReg) {
        if self.prf.unmap(pr) {
            self.free.push(pr);
        }
    }
}

impl std::fmt::Debug for Renamer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renamer")
            .field("free", &self.free)
            .field("chkpts", &self.chkpts)
            .field("mapped", &self.prf.mapped_count())
            .finish_non_exhaustive()
    }
}
