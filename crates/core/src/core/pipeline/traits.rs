//! Capability traits for the renamer's external collaborators.
//!
//! The retire and writeback drivers steer the fetch unit, load/store unit,
//! issue queue, trap machinery, and the functional checker, but the core
//! needs only a small method vocabulary from each. Keeping those
//! vocabularies behind traits lets the drivers be unit-tested against
//! hand-rolled stubs, the same way the bus and memory mocks work in the
//! test harness.

use crate::common::error::Trap;
use crate::core::rename::checkpoints::SquashMask;

/// Fetch unit operations consumed by recovery and retire.
pub trait FetchUnit {
    /// Redirects fetch to `pc`, discarding everything in flight.
    fn flush(&mut self, pc: u64);

    /// Repairs predictor state for a mispredicted branch and redirects.
    fn mispredict(&mut self, pred_tag: u64, taken: bool, target: u64);

    /// Notifies the predictor that one branch committed.
    fn commit(&mut self);

    /// Returns true if the fetch unit is running (not stalled waiting for a
    /// serializing instruction to retire).
    fn active(&self) -> bool;
}

/// Load/store unit operations consumed by recovery and retire.
pub trait LoadStoreUnit {
    /// Commits the oldest load (`is_load`) or store at retire. Returns
    /// false if the queue disagrees about having one, a fatal accounting
    /// divergence the retire driver asserts on.
    fn commit(&mut self, is_load: bool, is_amo: bool) -> bool;

    /// Trains the memory-dependence predictor on a committed access.
    fn train(&mut self, is_load: bool);

    /// Restores the queue tails to the coordinates captured by a branch.
    fn restore(&mut self, lq_index: usize, lq_phase: bool, sq_index: usize, sq_phase: bool);

    /// Drops every speculative queue entry.
    fn flush(&mut self);
}

/// Issue queue operations consumed by recovery.
///
/// Entries in the queue are instructions that have not yet read their
/// operands, so each squashed entry still holds its rename-time register
/// references. The queue reports the payload indices it dropped and the
/// caller releases those references.
pub trait IssueQueue {
    /// Removes entries whose checkpoint bit is set in `mask`, returning
    /// their payload indices.
    fn squash(&mut self, mask: &SquashMask) -> Vec<usize>;

    /// Removes every entry, returning the payload indices.
    fn flush(&mut self) -> Vec<usize>;
}

/// Trap delivery, external to the core.
pub trait TrapHandler {
    /// Delivers a trap raised at `pc`; returns the PC to refetch from.
    fn take_trap(&mut self, trap: Trap, pc: u64) -> u64;
}

/// Per-retired-instruction hook for the functional-reference comparator.
pub trait RetireChecker {
    /// Called once, in program order, for every retired instruction.
    fn check(&mut self, payload_index: usize);
}

/// Executes a serializing instruction's side effect at retire.
///
/// AMO and CSR instructions run against architectural state once their
/// checkpoint reaches the head. The side effect either produces the value
/// destined for the instruction's renamed destination register, or faults.
pub trait SerializerExec {
    /// Performs the AMO or CSR operation for the instruction at
    /// `payload_index`. Returns the destination value (the loaded word for
    /// an AMO, the old CSR value for a CSR access) on success, or the trap
    /// on a fault.
    fn execute(&mut self, payload_index: usize) -> Result<u64, Trap>;

    /// The PC to resume fetch at after the serializer retires.
    fn resume_pc(&self, payload_index: usize) -> u64;
}
