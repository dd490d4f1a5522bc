//! Shared test infrastructure: builders, stubs, and the retire rig.

use cprsim_core::common::error::Trap;
use cprsim_core::common::reg::CheckpointId;
use cprsim_core::config::RenameConfig;
use cprsim_core::core::pipeline::payload::InstrPayload;
use cprsim_core::core::rename::Renamer;
use cprsim_core::core::rename::checkpoints::SquashMask;
use cprsim_core::core::pipeline::traits::{
    FetchUnit, IssueQueue, LoadStoreUnit, RetireChecker, SerializerExec, TrapHandler,
};

/// Installs the test tracing subscriber once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// The small configuration the scenarios are written against:
/// four logical registers mapped onto eight physical, four checkpoints.
pub fn small_config() -> RenameConfig {
    RenameConfig {
        n_log_regs: 4,
        n_phys_regs: 8,
        n_chkpts: 4,
        n_active: 16,
        max_instr_bw_checkpoints: 4,
    }
}

/// A renamer in the reset state of [`small_config`].
pub fn small_renamer() -> Renamer {
    init_tracing();
    Renamer::new(&small_config())
}

/// Fluent builder for instruction payload records.
pub struct InstrBuilder {
    payload: InstrPayload,
}

impl InstrBuilder {
    /// Starts a record for a plain instruction at `pc` that falls through.
    pub fn at(pc: u64) -> Self {
        Self {
            payload: InstrPayload {
                pc,
                next_pc: pc.wrapping_add(4),
                oracle_next_pc: pc.wrapping_add(4),
                ..Default::default()
            },
        }
    }

    /// Adds a first source register.
    pub fn src(mut self, lr: usize) -> Self {
        self.payload.src_a = Some(lr);
        self
    }

    /// Adds a destination register.
    pub fn dst(mut self, lr: usize) -> Self {
        self.payload.dst_c = Some(lr);
        self
    }

    /// Classifies the instruction as a branch predicted to `next_pc` but
    /// actually going to `target`.
    pub fn branch_to(mut self, target: u64) -> Self {
        self.payload.class.branch = true;
        self.payload.oracle_next_pc = target;
        self
    }

    /// Classifies the instruction as a load.
    pub fn load(mut self) -> Self {
        self.payload.class.load = true;
        self
    }

    /// Classifies the instruction as a store.
    pub fn store(mut self) -> Self {
        self.payload.class.store = true;
        self
    }

    /// Classifies the instruction as a CSR access.
    pub fn csr(mut self) -> Self {
        self.payload.class.csr = true;
        self
    }

    /// Flags the instruction with an oracle exception carrying `trap`.
    pub fn excepts(mut self, trap: Trap) -> Self {
        self.payload.oracle_exception = true;
        self.payload.trap = Some(trap);
        self
    }

    /// Finishes the record.
    pub fn build(self) -> InstrPayload {
        self.payload
    }
}

// ---- Collaborator stubs ---------------------------------------------------

/// Fetch unit stub recording redirects.
#[derive(Default)]
pub struct StubFetch {
    /// PCs passed to `flush`.
    pub flushes: Vec<u64>,
    /// `(pred_tag, taken, target)` triples passed to `mispredict`.
    pub mispredicts: Vec<(u64, bool, u64)>,
    /// Branch commit notifications.
    pub commits: u64,
    /// Value returned by `active`.
    pub running: bool,
}

impl FetchUnit for StubFetch {
    fn flush(&mut self, pc: u64) {
        self.flushes.push(pc);
    }
    fn mispredict(&mut self, pred_tag: u64, taken: bool, target: u64) {
        self.mispredicts.push((pred_tag, taken, target));
    }
    fn commit(&mut self) {
        self.commits += 1;
    }
    fn active(&self) -> bool {
        self.running
    }
}

/// Load/store unit stub recording commits and restores.
#[derive(Default)]
pub struct StubLsu {
    /// Loads committed.
    pub load_commits: u64,
    /// Stores committed.
    pub store_commits: u64,
    /// Queue restore coordinates received.
    pub restores: Vec<(usize, bool, usize, bool)>,
    /// Whether the queues were flushed.
    pub flushed: bool,
}

impl LoadStoreUnit for StubLsu {
    fn commit(&mut self, is_load: bool, _is_amo: bool) -> bool {
        if is_load {
            self.load_commits += 1;
        } else {
            self.store_commits += 1;
        }
        true
    }
    fn train(&mut self, _is_load: bool) {}
    fn restore(&mut self, lq_index: usize, lq_phase: bool, sq_index: usize, sq_phase: bool) {
        self.restores.push((lq_index, lq_phase, sq_index, sq_phase));
    }
    fn flush(&mut self) {
        self.flushed = true;
    }
}

/// Issue queue stub: `(payload index, checkpoint)` pairs.
#[derive(Default)]
pub struct StubIq {
    /// Live queue entries.
    pub entries: Vec<(usize, CheckpointId)>,
}

impl IssueQueue for StubIq {
    fn squash(&mut self, mask: &SquashMask) -> Vec<usize> {
        let (dead, live): (Vec<_>, Vec<_>) = self
            .entries
            .drain(..)
            .partition(|&(_, cid)| mask.contains(cid));
        self.entries = live;
        dead.into_iter().map(|(index, _)| index).collect()
    }
    fn flush(&mut self) -> Vec<usize> {
        self.entries.drain(..).map(|(index, _)| index).collect()
    }
}

/// Trap handler stub vectoring everything to a fixed handler base.
#[derive(Default)]
pub struct StubTrap {
    /// Traps delivered, with the offending PC.
    pub taken: Vec<(Trap, u64)>,
}

impl TrapHandler for StubTrap {
    fn take_trap(&mut self, trap: Trap, pc: u64) -> u64 {
        self.taken.push((trap, pc));
        0x8000_0000
    }
}

/// Checker stub recording the retired payload indices in order.
#[derive(Default)]
pub struct RecordingChecker {
    /// Retired payload indices, in retirement order.
    pub retired: Vec<usize>,
}

impl RetireChecker for RecordingChecker {
    fn check(&mut self, payload_index: usize) {
        self.retired.push(payload_index);
    }
}

/// Serializer stub returning a fixed value, or a configured fault.
#[derive(Default)]
pub struct StubSerializer {
    /// Executions performed.
    pub executed: u64,
    /// Fault to raise instead of succeeding.
    pub fault: Option<Trap>,
    /// Resume PCs handed out.
    pub resume: u64,
}

impl SerializerExec for StubSerializer {
    fn execute(&mut self, _payload_index: usize) -> Result<u64, Trap> {
        self.executed += 1;
        match self.fault {
            Some(trap) => Err(trap),
            None => Ok(0xC5),
        }
    }
    fn resume_pc(&self, _payload_index: usize) -> u64 {
        self.resume
    }
}
