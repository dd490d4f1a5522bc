//! Checkpoint buffer: the FIFO window of speculation anchors.
//!
//! A ring of structural checkpoints with head/tail phase bits. Each entry
//! freezes the rename map table and the unmapped-bit vector at its creation
//! point and accumulates counters for the interval of instructions renamed
//! after it: inflight loads, stores, branches, an uncompleted-instruction
//! count, and serializer/exception flags.
//!
//! The head entry is the committed architectural state and is always
//! resident; recovery retracts the tail back to a surviving anchor and hands
//! the pipeline a per-checkpoint squash predicate for everything in between.

use crate::common::reg::{CheckpointId, PhysReg};

/// Opcode classification bits attributed to a checkpoint interval.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InstrClass {
    /// Instruction is a load.
    pub load: bool,
    /// Instruction is a store.
    pub store: bool,
    /// Instruction is a branch.
    pub branch: bool,
    /// Instruction is an atomic memory operation.
    pub amo: bool,
    /// Instruction is a CSR/system instruction.
    pub csr: bool,
}

/// A single speculation anchor.
#[derive(Clone, Debug)]
pub struct Checkpoint {
    /// Frozen rename map table.
    pub rmt: Vec<PhysReg>,
    /// Frozen unmapped-bit vector.
    pub unmapped: Vec<bool>,
    /// Loads renamed into this interval and not yet committed.
    pub loads: u64,
    /// Stores renamed into this interval and not yet committed.
    pub stores: u64,
    /// Branches renamed into this interval and not yet committed.
    pub branches: u64,
    /// Instructions renamed into this interval and not yet completed.
    pub uncompleted: u64,
    /// Interval holds an atomic memory operation.
    pub amo: bool,
    /// Interval holds a CSR/system instruction.
    pub csr: bool,
    /// Interval holds an instruction that will raise an exception.
    pub exception: bool,
}

impl Checkpoint {
    fn empty(n_log_regs: usize, n_phys_regs: usize) -> Self {
        Self {
            rmt: vec![PhysReg(0); n_log_regs],
            unmapped: vec![true; n_phys_regs],
            loads: 0,
            stores: 0,
            branches: 0,
            uncompleted: 0,
            amo: false,
            csr: false,
            exception: false,
        }
    }

    /// Zeroes the counters and flags, leaving the snapshots in place.
    fn reset(&mut self) {
        self.loads = 0;
        self.stores = 0;
        self.branches = 0;
        self.uncompleted = 0;
        self.amo = false;
        self.csr = false;
        self.exception = false;
    }
}

/// Head-checkpoint status returned by a successful precommit probe.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Precommit {
    /// The head checkpoint's ID.
    pub id: CheckpointId,
    /// Loads attributed to the head interval.
    pub loads: u64,
    /// Stores attributed to the head interval.
    pub stores: u64,
    /// Branches attributed to the head interval.
    pub branches: u64,
    /// Head interval holds an AMO.
    pub amo: bool,
    /// Head interval holds a CSR instruction.
    pub csr: bool,
    /// Head interval holds an excepting instruction.
    pub exception: bool,
}

/// Per-checkpoint squash predicate handed to downstream stages.
///
/// A boolean vector rather than an integer bitmask, so the configured
/// checkpoint capacity is not limited to the width of a machine word.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SquashMask {
    bits: Vec<bool>,
}

impl SquashMask {
    /// Creates an all-clear mask for `n_chkpts` checkpoints.
    pub fn none(n_chkpts: usize) -> Self {
        Self {
            bits: vec![false; n_chkpts],
        }
    }

    /// Marks a checkpoint for squashing.
    #[inline]
    pub fn set(&mut self, cid: CheckpointId) {
        self.bits[cid.0] = true;
    }

    /// Returns true if the checkpoint is marked.
    #[inline]
    pub fn contains(&self, cid: CheckpointId) -> bool {
        self.bits[cid.0]
    }

    /// Returns true if no checkpoint is marked.
    pub fn is_empty(&self) -> bool {
        !self.bits.iter().any(|&b| b)
    }

    /// Iterates over the marked checkpoint IDs.
    pub fn iter(&self) -> impl Iterator<Item = CheckpointId> + '_ {
        self.bits
            .iter()
            .enumerate()
            .filter_map(|(i, &b)| b.then_some(CheckpointId(i)))
    }
}

/// Ring buffer of speculation anchors.
pub struct CheckpointBuffer {
    entries: Vec<Checkpoint>,
    head: usize,
    tail: usize,
    head_phase: bool,
    tail_phase: bool,
}

impl CheckpointBuffer {
    /// Creates an empty buffer with `n_chkpts` slots.
    ///
    /// The renamer installs the initial resident checkpoint immediately
    /// after construction; the buffer is never observed empty afterwards.
    pub fn new(n_chkpts: usize, n_log_regs: usize, n_phys_regs: usize) -> Self {
        assert!(n_chkpts >= 2, "checkpoint buffer needs at least 2 slots");
        let mut entries = Vec::with_capacity(n_chkpts);
        entries.resize_with(n_chkpts, || Checkpoint::empty(n_log_regs, n_phys_regs));
        Self {
            entries,
            head: 0,
            tail: 0,
            head_phase: false,
            tail_phase: false,
        }
    }

    /// Returns the fixed slot count.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no checkpoint is live.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head == self.tail && self.head_phase == self.tail_phase
    }

    /// Returns true if every slot holds a live checkpoint.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.head == self.tail && self.head_phase != self.tail_phase
    }

    /// Returns the slot after `cid` in ring order.
    #[inline]
    pub fn next(&self, cid: CheckpointId) -> CheckpointId {
        CheckpointId((cid.0 + 1) % self.capacity())
    }

    /// Returns the number of free slots.
    ///
    /// # Panics
    ///
    /// Aborts if the head/tail ordering contradicts the phase bits.
    pub fn free_count(&self) -> usize {
        if self.is_full() {
            return 0;
        }
        if self.is_empty() {
            return self.capacity();
        }
        if self.head_phase == self.tail_phase {
            assert!(
                self.tail > self.head,
                "checkpoint buffer inconsistent: head {} ahead of tail {} in same phase",
                self.head,
                self.tail
            );
            self.capacity() - (self.tail - self.head)
        } else {
            assert!(
                self.head > self.tail,
                "checkpoint buffer inconsistent: tail {} ahead of head {} across phases",
                self.tail,
                self.head
            );
            self.head - self.tail
        }
    }

    /// Returns the number of live checkpoints.
    #[inline]
    pub fn live_count(&self) -> usize {
        self.capacity() - self.free_count()
    }

    /// Returns true if fewer than `n` slots are free.
    #[inline]
    pub fn stall(&self, n: usize) -> bool {
        self.free_count() < n
    }

    /// Returns the head (oldest, architectural) checkpoint ID.
    #[inline]
    pub fn head_id(&self) -> CheckpointId {
        CheckpointId(self.head)
    }

    /// Returns the newest installed checkpoint ID: the slot before the tail.
    ///
    /// # Panics
    ///
    /// Aborts if the buffer is empty (no checkpoint has been installed).
    pub fn newest(&self) -> CheckpointId {
        assert!(!self.is_empty(), "newest() on empty checkpoint buffer");
        if self.tail == 0 {
            CheckpointId(self.capacity() - 1)
        } else {
            CheckpointId(self.tail - 1)
        }
    }

    /// Returns true if `cid` lies in the live window `[head, tail)`.
    pub fn is_valid(&self, cid: CheckpointId) -> bool {
        if cid.0 >= self.capacity() {
            return false;
        }
        if self.is_full() {
            return true;
        }
        if self.is_empty() {
            return false;
        }
        if self.head_phase == self.tail_phase {
            cid.0 >= self.head && cid.0 < self.tail
        } else {
            cid.0 >= self.head || cid.0 < self.tail
        }
    }

    /// Installs a new checkpoint at the tail from frozen renamer state.
    ///
    /// Counters and flags start at zero. Returns the new checkpoint's ID.
    /// The caller owns the usage-counter increments for the snapshot.
    ///
    /// # Panics
    ///
    /// Aborts if the buffer is full; the rename stage must consult
    /// [`stall`](Self::stall) first.
    pub fn install(&mut self, rmt: &[PhysReg], unmapped: &[bool]) -> CheckpointId {
        assert!(!self.is_full(), "checkpoint buffer overflow");
        let id = CheckpointId(self.tail);
        let entry = &mut self.entries[self.tail];
        entry.rmt.copy_from_slice(rmt);
        entry.unmapped.copy_from_slice(unmapped);
        entry.reset();
        self.tail += 1;
        if self.tail == self.capacity() {
            self.tail = 0;
            self.tail_phase = !self.tail_phase;
        }
        id
    }

    /// Attributes one renamed instruction to the newest checkpoint.
    ///
    /// Bumps the class counters, sets the serializer flags, and
    /// unconditionally bumps the uncompleted-instruction counter. Returns
    /// the checkpoint the instruction now belongs to.
    pub fn attribute(&mut self, class: InstrClass) -> CheckpointId {
        let cid = self.newest();
        let entry = &mut self.entries[cid.0];
        if class.load {
            entry.loads += 1;
        }
        if class.store {
            entry.stores += 1;
        }
        if class.branch {
            entry.branches += 1;
        }
        if class.amo {
            entry.amo = true;
        }
        if class.csr {
            entry.csr = true;
        }
        entry.uncompleted += 1;
        cid
    }

    /// Marks one instruction of the interval as completed.
    ///
    /// # Panics
    ///
    /// Aborts if the interval has no uncompleted instructions.
    pub fn set_complete(&mut self, cid: CheckpointId) {
        let entry = &mut self.entries[cid.0];
        assert!(
            entry.uncompleted > 0,
            "completion underflow on checkpoint {cid}"
        );
        entry.uncompleted -= 1;
    }

    /// Flags the interval as holding an excepting instruction.
    pub fn set_exception(&mut self, cid: CheckpointId) {
        self.entries[cid.0].exception = true;
    }

    /// Probes whether the head checkpoint may begin bulk commit.
    ///
    /// Succeeds when the head interval has fully completed and either a
    /// newer checkpoint exists to take over as the resident anchor, or the
    /// head is flagged as an exception (the trap path rebuilds the anchor).
    ///
    /// # Panics
    ///
    /// Aborts if the buffer is empty.
    pub fn precommit(&self) -> Option<Precommit> {
        assert!(!self.is_empty(), "precommit on empty checkpoint buffer");
        let entry = &self.entries[self.head];
        let successor_live = self.is_valid(self.next(self.head_id()));
        if entry.uncompleted == 0 && (successor_live || entry.exception) {
            Some(Precommit {
                id: self.head_id(),
                loads: entry.loads,
                stores: entry.stores,
                branches: entry.branches,
                amo: entry.amo,
                csr: entry.csr,
                exception: entry.exception,
            })
        } else {
            None
        }
    }

    /// Frees the head checkpoint after its interval has fully committed.
    ///
    /// # Panics
    ///
    /// Aborts unless at least one newer checkpoint remains: the buffer must
    /// never be empty between committed states.
    pub fn free_head(&mut self) {
        assert!(
            self.live_count() > 1,
            "freeing the only resident checkpoint"
        );
        self.entries[self.head].reset();
        self.head += 1;
        if self.head == self.capacity() {
            self.head = 0;
            self.head_phase = !self.head_phase;
        }
    }

    /// Collects the checkpoints strictly between `rc` and the tail.
    ///
    /// These are the intervals a rollback to `rc` invalidates; `rc` itself
    /// survives as the resumption anchor.
    pub fn squash_set(&self, rc: CheckpointId) -> SquashMask {
        let mut mask = SquashMask::none(self.capacity());
        let mut i = self.next(rc);
        while i.0 != self.tail {
            mask.set(i);
            i = self.next(i);
        }
        mask
    }

    /// Zeroes the counters and flags of a slot, leaving its snapshots.
    pub fn reset_entry(&mut self, cid: CheckpointId) {
        self.entries[cid.0].reset();
    }

    /// Retracts the tail back to the slot just after `rc`.
    ///
    /// Walks the tail pointer backwards, flipping its phase bit whenever it
    /// wraps from slot 0 back to the top, then resets the new tail slot so
    /// the next install starts clean.
    pub fn retract_tail_to(&mut self, rc: CheckpointId) {
        let new_tail = self.next(rc).0;
        while self.tail != new_tail {
            if self.tail == 0 {
                self.tail = self.capacity() - 1;
                self.tail_phase = !self.tail_phase;
            } else {
                self.tail -= 1;
            }
        }
        if self.head != self.tail {
            self.entries[self.tail].reset();
        }
    }

    /// Returns a live checkpoint entry.
    #[inline]
    pub fn entry(&self, cid: CheckpointId) -> &Checkpoint {
        &self.entries[cid.0]
    }
}

impl std::fmt::Debug for CheckpointBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "CheckpointBuffer {{ live: {}/{}, head: {}({}), tail: {}({}) }}",
            self.live_count(),
            self.capacity(),
            self.head,
            u8::from(self.head_phase),
            self.tail,
            u8::from(self.tail_phase)
        )
    }
}
