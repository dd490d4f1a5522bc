//! Configuration system for the simulator core.
//!
//! This module defines the configuration structures used to parameterize the
//! renamer and the pipeline hooks. It provides:
//! 1. **Defaults:** Baseline machine constants (register file sizes,
//!    checkpoint capacity, stage widths).
//! 2. **Structures:** Hierarchical config for the rename core and pipeline.
//! 3. **Validation:** Structural constraints checked before construction.
//!
//! Configuration is supplied via JSON (`serde_json`) or `CoreConfig::default()`.

use serde::Deserialize;

use crate::common::error::ConfigError;

/// Default configuration constants for the simulator core.
///
/// These values define the baseline machine configuration when not
/// explicitly overridden.
mod defaults {
    /// Number of logical (architectural) registers.
    ///
    /// Covers both integer and floating-point architectural spaces, which
    /// share one rename namespace in this core.
    pub const N_LOG_REGS: usize = 64;

    /// Number of physical registers.
    ///
    /// Must exceed `N_LOG_REGS`; the difference is the free-list capacity.
    pub const N_PHYS_REGS: usize = 320;

    /// Checkpoint buffer capacity.
    pub const N_CHKPTS: usize = 32;

    /// Maximum number of inflight instructions.
    pub const N_ACTIVE: usize = 256;

    /// Maximum instructions between automatically inserted checkpoints.
    pub const MAX_INSTR_BW_CHECKPOINTS: u64 = 8;

    /// Rename/dispatch bundle width (instructions per cycle).
    pub const DISPATCH_WIDTH: usize = 4;

    /// Retire width (drain operations per cycle per category).
    pub const RETIRE_WIDTH: usize = 4;
}

/// Root configuration for the simulator core.
///
/// # Examples
///
/// Creating a default configuration:
///
/// ```
/// use cprsim_core::config::CoreConfig;
///
/// let config = CoreConfig::default();
/// assert_eq!(config.rename.n_log_regs, 64);
/// assert!(config.validate().is_ok());
/// ```
///
/// Deserializing from JSON:
///
/// ```
/// use cprsim_core::config::CoreConfig;
///
/// let json = r#"{
///     "rename": {
///         "n_log_regs": 32,
///         "n_phys_regs": 128,
///         "n_chkpts": 8
///     },
///     "pipeline": {
///         "dispatch_width": 2
///     }
/// }"#;
///
/// let config: CoreConfig = serde_json::from_str(json).unwrap();
/// assert_eq!(config.rename.n_phys_regs, 128);
/// assert_eq!(config.pipeline.dispatch_width, 2);
/// assert_eq!(config.pipeline.retire_width, 4);
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CoreConfig {
    /// Rename core sizing (register files, checkpoints, inflight cap).
    #[serde(default)]
    pub rename: RenameConfig,
    /// Pipeline stage widths.
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl CoreConfig {
    /// Parses a configuration from its JSON representation.
    ///
    /// # Errors
    ///
    /// Returns the underlying deserialization error on malformed input.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Checks the structural constraints the renamer is built on.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] naming the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let r = &self.rename;
        if r.n_phys_regs <= r.n_log_regs {
            return Err(ConfigError::TooFewPhysRegs {
                phys: r.n_phys_regs,
                log: r.n_log_regs,
            });
        }
        if r.n_chkpts < 2 {
            return Err(ConfigError::TooFewCheckpoints(r.n_chkpts));
        }
        if r.n_active == 0 {
            return Err(ConfigError::ZeroActive);
        }
        if r.max_instr_bw_checkpoints == 0 {
            return Err(ConfigError::ZeroCheckpointInterval);
        }
        if self.pipeline.dispatch_width == 0 {
            return Err(ConfigError::ZeroWidth("dispatch"));
        }
        if self.pipeline.retire_width == 0 {
            return Err(ConfigError::ZeroWidth("retire"));
        }
        Ok(())
    }
}

/// Rename core sizing.
#[derive(Debug, Clone, Deserialize)]
pub struct RenameConfig {
    /// Number of logical registers (`L`).
    #[serde(default = "RenameConfig::default_log_regs")]
    pub n_log_regs: usize,

    /// Number of physical registers (`P`); must satisfy `P > L`.
    #[serde(default = "RenameConfig::default_phys_regs")]
    pub n_phys_regs: usize,

    /// Checkpoint buffer capacity (`C`).
    #[serde(default = "RenameConfig::default_chkpts")]
    pub n_chkpts: usize,

    /// Inflight-instruction cap; must be positive.
    #[serde(default = "RenameConfig::default_active")]
    pub n_active: usize,

    /// Maximum instructions between auto-inserted checkpoints.
    #[serde(default = "RenameConfig::default_chkpt_interval")]
    pub max_instr_bw_checkpoints: u64,
}

impl RenameConfig {
    /// Returns the default logical register count.
    fn default_log_regs() -> usize {
        defaults::N_LOG_REGS
    }

    /// Returns the default physical register count.
    fn default_phys_regs() -> usize {
        defaults::N_PHYS_REGS
    }

    /// Returns the default checkpoint buffer capacity.
    fn default_chkpts() -> usize {
        defaults::N_CHKPTS
    }

    /// Returns the default inflight-instruction cap.
    fn default_active() -> usize {
        defaults::N_ACTIVE
    }

    /// Returns the default auto-checkpoint interval.
    fn default_chkpt_interval() -> u64 {
        defaults::MAX_INSTR_BW_CHECKPOINTS
    }
}

impl Default for RenameConfig {
    fn default() -> Self {
        Self {
            n_log_regs: defaults::N_LOG_REGS,
            n_phys_regs: defaults::N_PHYS_REGS,
            n_chkpts: defaults::N_CHKPTS,
            n_active: defaults::N_ACTIVE,
            max_instr_bw_checkpoints: defaults::MAX_INSTR_BW_CHECKPOINTS,
        }
    }
}

/// Pipeline stage widths.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Rename/dispatch bundle width.
    #[serde(default = "PipelineConfig::default_dispatch_width")]
    pub dispatch_width: usize,

    /// Retire width.
    #[serde(default = "PipelineConfig::default_retire_width")]
    pub retire_width: usize,
}

impl PipelineConfig {
    /// Returns the default dispatch width.
    fn default_dispatch_width() -> usize {
        defaults::DISPATCH_WIDTH
    }

    /// Returns the default retire width.
    fn default_retire_width() -> usize {
        defaults::RETIRE_WIDTH
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dispatch_width: defaults::DISPATCH_WIDTH,
            retire_width: defaults::RETIRE_WIDTH,
        }
    }
}
