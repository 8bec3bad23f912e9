use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::probes::block::ReqFlagsLayout;

/// Top-level configuration for a probe session.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Logging verbosity (trace, debug, info, warn, error). Default: "info".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Which probe families to enable.
    #[serde(default)]
    pub probes: ProbesConfig,

    /// Correlation table capacities.
    #[serde(default)]
    pub tables: TablesConfig,

    /// Block I/O decoding configuration.
    #[serde(default)]
    pub block: BlockConfig,
}

/// Probe family enablement. Everything is on by default.
#[derive(Debug, Deserialize)]
pub struct ProbesConfig {
    #[serde(default = "default_true")]
    pub block: bool,

    #[serde(default = "default_true")]
    pub fs: bool,

    #[serde(default = "default_true")]
    pub tcp: bool,

    #[serde(default = "default_true")]
    pub sched: bool,

    #[serde(default = "default_true")]
    pub irq: bool,

    #[serde(default = "default_true")]
    pub krb5kdc: bool,
}

/// Correlation table capacities.
///
/// Each capacity bounds the number of in-flight records one family keeps;
/// once a table is full, start events for fresh keys are dropped until a
/// completion frees a slot. Defaults are sized for a busy host.
#[derive(Debug, Deserialize)]
pub struct TablesConfig {
    /// In-flight block requests. Default: 16384.
    #[serde(default = "default_block_requests")]
    pub block_requests: usize,

    /// Threads with an open filesystem call. Default: 16384.
    #[serde(default = "default_fs_tasks")]
    pub fs_tasks: usize,

    /// Sockets mid-handshake. Default: 65536.
    #[serde(default = "default_tcp_sockets")]
    pub tcp_sockets: usize,

    /// Threads inside a connect call. Default: 16384.
    #[serde(default = "default_tcp_connect_args")]
    pub tcp_connect_args: usize,

    /// Runnable tasks waiting for a CPU. Default: 65536.
    #[serde(default = "default_sched_tasks")]
    pub sched_tasks: usize,

    /// Throttled cgroups. Default: 4096.
    #[serde(default = "default_sched_cgroups")]
    pub sched_cgroups: usize,

    /// Tasks inside an interrupt handler. Default: 16384.
    #[serde(default = "default_irq_tasks")]
    pub irq_tasks: usize,
}

/// Block I/O decoding configuration.
#[derive(Debug, Default, Deserialize)]
pub struct BlockConfig {
    /// How to read the write indicator out of a request's cmd_flags word.
    /// Defaults to the modern REQ_OP_MASK layout.
    #[serde(default)]
    pub req_flags: ReqFlagsLayout,
}

// --- Default value functions ---

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_block_requests() -> usize {
    16384
}

fn default_fs_tasks() -> usize {
    16384
}

fn default_tcp_sockets() -> usize {
    65536
}

fn default_tcp_connect_args() -> usize {
    16384
}

fn default_sched_tasks() -> usize {
    65536
}

fn default_sched_cgroups() -> usize {
    4096
}

fn default_irq_tasks() -> usize {
    16384
}

// --- Default trait impls ---

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            probes: ProbesConfig::default(),
            tables: TablesConfig::default(),
            block: BlockConfig::default(),
        }
    }
}

impl Default for ProbesConfig {
    fn default() -> Self {
        Self {
            block: true,
            fs: true,
            tcp: true,
            sched: true,
            irq: true,
            krb5kdc: true,
        }
    }
}

impl Default for TablesConfig {
    fn default() -> Self {
        Self {
            block_requests: default_block_requests(),
            fs_tasks: default_fs_tasks(),
            tcp_sockets: default_tcp_sockets(),
            tcp_connect_args: default_tcp_connect_args(),
            sched_tasks: default_sched_tasks(),
            sched_cgroups: default_sched_cgroups(),
            irq_tasks: default_irq_tasks(),
        }
    }
}

// --- Validation and loading ---

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;

        let cfg = Self::from_yaml(&data)
            .with_context(|| format!("parsing config file {}", path.display()))?;

        Ok(cfg)
    }

    /// Parse and validate configuration from a YAML string.
    pub fn from_yaml(data: &str) -> Result<Self> {
        let cfg: Config = serde_yaml::from_str(data).context("parsing config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validate the configuration for required fields and consistency.
    pub fn validate(&self) -> Result<()> {
        let p = &self.probes;
        if !(p.block || p.fs || p.tcp || p.sched || p.irq || p.krb5kdc) {
            bail!("at least one probe family must be enabled");
        }

        if p.block && self.tables.block_requests == 0 {
            bail!("tables.block_requests must be positive when probes.block is enabled");
        }
        if p.fs && self.tables.fs_tasks == 0 {
            bail!("tables.fs_tasks must be positive when probes.fs is enabled");
        }
        if p.tcp && self.tables.tcp_sockets == 0 {
            bail!("tables.tcp_sockets must be positive when probes.tcp is enabled");
        }
        if p.tcp && self.tables.tcp_connect_args == 0 {
            bail!("tables.tcp_connect_args must be positive when probes.tcp is enabled");
        }
        if p.sched && self.tables.sched_tasks == 0 {
            bail!("tables.sched_tasks must be positive when probes.sched is enabled");
        }
        if p.sched && self.tables.sched_cgroups == 0 {
            bail!("tables.sched_cgroups must be positive when probes.sched is enabled");
        }
        if p.irq && self.tables.irq_tasks == 0 {
            bail!("tables.irq_tasks must be positive when probes.irq is enabled");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let cfg = Config::default();
        assert_eq!(cfg.log_level, "info");
        assert!(cfg.probes.block);
        assert!(cfg.probes.krb5kdc);
        assert_eq!(cfg.tables.block_requests, 16384);
        assert_eq!(cfg.tables.tcp_sockets, 65536);
        assert_eq!(cfg.tables.sched_cgroups, 4096);
        assert_eq!(cfg.block.req_flags, ReqFlagsLayout::MODERN);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_empty_yaml_is_the_default() {
        let cfg = Config::from_yaml("{}").expect("empty config should parse");
        assert_eq!(cfg.tables.fs_tasks, Config::default().tables.fs_tasks);
        assert!(cfg.probes.irq);
    }

    #[test]
    fn test_partial_yaml_overrides() {
        let cfg = Config::from_yaml(
            r"
            log_level: debug
            probes:
              krb5kdc: false
            tables:
              tcp_sockets: 1024
            ",
        )
        .expect("config should parse");

        assert_eq!(cfg.log_level, "debug");
        assert!(!cfg.probes.krb5kdc);
        assert!(cfg.probes.tcp);
        assert_eq!(cfg.tables.tcp_sockets, 1024);
        assert_eq!(cfg.tables.fs_tasks, 16384);
    }

    #[test]
    fn test_req_flags_layout_from_yaml() {
        let cfg = Config::from_yaml(
            r"
            block:
              req_flags:
                layout: write_bit
                bit: 1
            ",
        )
        .expect("config should parse");

        assert_eq!(cfg.block.req_flags, ReqFlagsLayout::WriteBit { bit: 1 });

        let cfg = Config::from_yaml(
            r"
            block:
              req_flags:
                layout: op_shift
                shift: 8
                write_op: 1
            ",
        )
        .expect("config should parse");

        assert_eq!(
            cfg.block.req_flags,
            ReqFlagsLayout::OpShift {
                shift: 8,
                write_op: 1
            }
        );
    }

    #[test]
    fn test_zero_capacity_rejected_when_enabled() {
        let err = Config::from_yaml(
            r"
            tables:
              sched_tasks: 0
            ",
        )
        .unwrap_err();
        assert!(err.to_string().contains("sched_tasks"));
    }

    #[test]
    fn test_zero_capacity_allowed_when_disabled() {
        let cfg = Config::from_yaml(
            r"
            probes:
              sched: false
            tables:
              sched_tasks: 0
            ",
        )
        .expect("config should parse");
        assert!(!cfg.probes.sched);
    }

    #[test]
    fn test_all_probes_disabled_rejected() {
        let err = Config::from_yaml(
            r"
            probes:
              block: false
              fs: false
              tcp: false
              sched: false
              irq: false
              krb5kdc: false
            ",
        )
        .unwrap_err();
        assert!(err.to_string().contains("at least one probe family"));
    }
}
