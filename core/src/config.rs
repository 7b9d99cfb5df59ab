//! Run configuration types
//!
//! A [`RunConfig`] is fixed before any worker starts and is shared read-only
//! by every component afterwards.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol::WorkerId;

/// Default log port; the control port is always one above it
pub const DEFAULT_PORT: u16 = 8888;

/// Default number of operations per workload phase
pub const DEFAULT_NUM_OPS: usize = 50_000;

/// Default object size in bytes
pub const DEFAULT_OBJECT_SIZE: usize = 8;

/// Storage service endpoint workers connect to unless told otherwise
pub const DEFAULT_STORAGE_ENDPOINT: &str = "10.1.0.10:9070";

/// Key prefix for uploaded result files
pub const DEFAULT_RESULTS_PREFIX: &str = "pocket";

/// Prefix that selects wave-based fan-out in a mode string
pub const SCALE_PREFIX: &str = "scale";

// ============================================================================
// Workload mode
// ============================================================================

/// One benchmark phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// `put` every object
    Write,
    /// `get` every object
    Read,
}

impl Operation {
    /// Every phase, in the order result files are collected
    pub const ALL: [Operation; 2] = [Operation::Write, Operation::Read];

    /// Lowercase name used in mode strings and result file names
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Write => "write",
            Operation::Read => "read",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered list of phases a worker executes
///
/// Parsed from strings such as `write_read` or `read`: components are
/// separated by any non-alphabetic character and run in the order given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WorkloadMode {
    ops: Vec<Operation>,
}

impl WorkloadMode {
    /// Parse a mode string
    pub fn parse(mode: &str) -> Result<Self, ConfigError> {
        let mut ops = Vec::new();
        for part in mode
            .split(|c: char| !c.is_ascii_alphabetic())
            .filter(|p| !p.is_empty())
        {
            let op = match part.to_ascii_lowercase().as_str() {
                "write" => Operation::Write,
                "read" => Operation::Read,
                other => {
                    return Err(ConfigError::InvalidMode(format!(
                        "unknown component {other:?} in {mode:?}"
                    )))
                }
            };
            if !ops.contains(&op) {
                ops.push(op);
            }
        }

        if ops.is_empty() {
            return Err(ConfigError::InvalidMode(format!(
                "{mode:?} selects no read or write phase"
            )));
        }

        Ok(Self { ops })
    }

    /// Phases in execution order
    pub fn operations(&self) -> &[Operation] {
        &self.ops
    }
}

impl Default for WorkloadMode {
    fn default() -> Self {
        Self {
            ops: vec![Operation::Write, Operation::Read],
        }
    }
}

impl fmt::Display for WorkloadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.ops.iter().map(Operation::as_str).collect();
        f.write_str(&names.join("_"))
    }
}

impl TryFrom<String> for WorkloadMode {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        WorkloadMode::parse(&value)
    }
}

impl From<WorkloadMode> for String {
    fn from(mode: WorkloadMode) -> Self {
        mode.to_string()
    }
}

// ============================================================================
// Scale plan
// ============================================================================

/// Wave layout: `num_batches` waves of `batch_size` workers each
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalePlan {
    /// Workers per wave
    pub batch_size: usize,

    /// Number of waves
    pub num_batches: usize,

    /// Pause between consecutive waves, in seconds
    #[serde(default)]
    pub delay_secs: f64,
}

impl Default for ScalePlan {
    fn default() -> Self {
        Self {
            batch_size: 1,
            num_batches: 1,
            delay_secs: 0.0,
        }
    }
}

impl ScalePlan {
    /// Create a plan
    pub fn new(batch_size: usize, num_batches: usize, delay: Duration) -> Self {
        Self {
            batch_size,
            num_batches,
            delay_secs: delay.as_secs_f64(),
        }
    }

    /// Split a mode string into its workload part and an optional plan.
    ///
    /// `scale:<mode>:<batch_size>:<delay>:<num_batches>` yields a plan;
    /// anything else is returned unchanged with no plan.
    pub fn split_mode(mode: &str) -> Result<(String, Option<ScalePlan>), ConfigError> {
        if !mode.starts_with(SCALE_PREFIX) {
            return Ok((mode.to_string(), None));
        }

        let parts: Vec<&str> = mode.split(':').collect();
        let [_, workload, batch_size, delay, num_batches] = parts.as_slice() else {
            return Err(ConfigError::InvalidScale(format!(
                "expected scale:<mode>:<batch_size>:<delay>:<num_batches>, got {mode:?}"
            )));
        };

        let batch_size = batch_size
            .parse::<usize>()
            .map_err(|_| ConfigError::InvalidScale(format!("batch size {batch_size:?}")))?;
        let delay_secs = delay
            .parse::<f64>()
            .map_err(|_| ConfigError::InvalidScale(format!("delay {delay:?}")))?;
        let num_batches = num_batches
            .parse::<usize>()
            .map_err(|_| ConfigError::InvalidScale(format!("number of batches {num_batches:?}")))?;

        let plan = ScalePlan {
            batch_size,
            num_batches,
            delay_secs,
        };
        plan.validate()?;

        Ok((workload.to_string(), Some(plan)))
    }

    /// Total number of workers the plan launches
    pub fn total_workers(&self) -> usize {
        self.batch_size.saturating_mul(self.num_batches)
    }

    /// Pause between waves
    pub fn delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.delay_secs.max(0.0)).unwrap_or(Duration::MAX)
    }

    /// Validate the plan
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidScale("batch size must be at least 1".into()));
        }
        if self.num_batches == 0 {
            return Err(ConfigError::InvalidScale(
                "number of batches must be at least 1".into(),
            ));
        }
        if !self.delay_secs.is_finite() || self.delay_secs < 0.0 {
            return Err(ConfigError::InvalidScale(format!(
                "delay must be a non-negative number of seconds, got {}",
                self.delay_secs
            )));
        }
        if Duration::try_from_secs_f64(self.delay_secs).is_err() {
            return Err(ConfigError::InvalidScale(format!(
                "delay of {} seconds is out of range",
                self.delay_secs
            )));
        }
        if self.batch_size.checked_mul(self.num_batches).is_none() {
            return Err(ConfigError::InvalidScale(format!(
                "{} batches of {} workers is too many",
                self.num_batches, self.batch_size
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Verbosity
// ============================================================================

/// How much the control process prints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    /// Forward every worker log line and every coordinator event
    #[default]
    Normal,
    /// Suppress worker log lines
    Quiet,
    /// Suppress worker log lines and per-worker coordinator events
    Quieter,
}

impl Verbosity {
    /// From the `--quiet` / `--quieter` flags
    pub fn from_flags(quiet: bool, quieter: bool) -> Self {
        if quieter {
            Verbosity::Quieter
        } else if quiet {
            Verbosity::Quiet
        } else {
            Verbosity::Normal
        }
    }

    /// Whether worker log lines are forwarded
    pub fn log_workers(&self) -> bool {
        matches!(self, Verbosity::Normal)
    }

    /// Whether per-worker coordinator events are logged at info level
    pub fn log_control(&self) -> bool {
        !matches!(self, Verbosity::Quieter)
    }
}

// ============================================================================
// Run configuration
// ============================================================================

/// Parameters of one benchmark run
///
/// Every field is optional when loading from JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Host workers connect back to
    pub host: String,

    /// Log port; the control port is `port + 1`
    pub port: u16,

    /// Phases each worker executes
    #[serde(default)]
    pub mode: WorkloadMode,

    /// Object size in bytes
    pub object_size: usize,

    /// Operations per phase
    pub num_ops: usize,

    /// Wave layout
    #[serde(default)]
    pub scale: ScalePlan,

    /// Storage service endpoint handed to workers
    #[serde(default = "default_storage_endpoint")]
    pub storage_endpoint: String,

    /// Key prefix for uploaded result files
    #[serde(default = "default_results_prefix")]
    pub results_prefix: String,

    /// Give up waiting for registrations after this many seconds and
    /// release whoever registered. `None` waits forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_timeout_secs: Option<u64>,

    /// Output verbosity
    #[serde(default)]
    pub verbosity: Verbosity,
}

fn default_storage_endpoint() -> String {
    DEFAULT_STORAGE_ENDPOINT.to_string()
}

fn default_results_prefix() -> String {
    DEFAULT_RESULTS_PREFIX.to_string()
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: DEFAULT_PORT,
            mode: WorkloadMode::default(),
            object_size: DEFAULT_OBJECT_SIZE,
            num_ops: DEFAULT_NUM_OPS,
            scale: ScalePlan::default(),
            storage_endpoint: default_storage_endpoint(),
            results_prefix: default_results_prefix(),
            registration_timeout_secs: None,
            verbosity: Verbosity::default(),
        }
    }
}

impl RunConfig {
    /// Create a config for `host:port` with defaults elsewhere
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Apply a CLI-style mode string, which may carry a `scale:` plan
    pub fn with_mode_str(mut self, mode: &str) -> Result<Self, ConfigError> {
        let (workload, plan) = ScalePlan::split_mode(mode)?;
        self.mode = WorkloadMode::parse(&workload)?;
        self.scale = plan.unwrap_or_default();
        Ok(self)
    }

    /// Set the workload mode
    pub fn with_mode(mut self, mode: WorkloadMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the wave layout
    pub fn with_scale(mut self, plan: ScalePlan) -> Self {
        self.scale = plan;
        self
    }

    /// Set the object size
    pub fn with_object_size(mut self, size: usize) -> Self {
        self.object_size = size;
        self
    }

    /// Set the operation count
    pub fn with_num_ops(mut self, num_ops: usize) -> Self {
        self.num_ops = num_ops;
        self
    }

    /// Set the verbosity
    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set the registration timeout
    pub fn with_registration_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.registration_timeout_secs = timeout.map(|t| t.as_secs());
        self
    }

    /// Port of the control server
    pub fn control_port(&self) -> u16 {
        self.port.saturating_add(1)
    }

    /// Number of workers this run launches
    pub fn total_workers(&self) -> usize {
        self.scale.total_workers()
    }

    /// Registration timeout, if any
    pub fn registration_timeout(&self) -> Option<Duration> {
        self.registration_timeout_secs.map(Duration::from_secs)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::InvalidAddress("host must not be empty".into()));
        }
        if self.port == u16::MAX {
            return Err(ConfigError::InvalidAddress(format!(
                "port {} leaves no room for the control port",
                self.port
            )));
        }
        if self.object_size == 0 {
            return Err(ConfigError::InvalidWorkload(
                "object size must be at least 1 byte".into(),
            ));
        }
        if self.num_ops == 0 {
            return Err(ConfigError::InvalidWorkload(
                "operation count must be at least 1".into(),
            ));
        }
        self.scale.validate()
    }

    /// Build the invocation payload for one worker
    pub fn invocation_event(
        &self,
        worker_id: WorkerId,
        job_id: impl Into<String>,
        port: u16,
        control_port: u16,
    ) -> InvocationEvent {
        InvocationEvent {
            host: self.host.clone(),
            port,
            control_port: Some(control_port),
            object_size: self.object_size,
            num_ops: self.num_ops,
            mode: self.mode.clone(),
            job_id: job_id.into(),
            worker_id,
            storage_endpoint: self.storage_endpoint.clone(),
            results_prefix: self.results_prefix.clone(),
        }
    }
}

// ============================================================================
// Invocation event
// ============================================================================

/// Per-worker parameters handed to a launcher
///
/// Serialized as JSON for remote invocation, so every field a remote
/// function needs to find its way back to the control process is here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationEvent {
    /// Control process host
    pub host: String,

    /// Log port
    pub port: u16,

    /// Control port; `port + 1` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_port: Option<u16>,

    /// Object size in bytes
    pub object_size: usize,

    /// Operations per phase
    pub num_ops: usize,

    /// Phases to execute
    pub mode: WorkloadMode,

    /// Storage job this worker writes under
    pub job_id: String,

    /// Identity used in the readiness handshake
    pub worker_id: WorkerId,

    /// Storage service endpoint
    #[serde(default = "default_storage_endpoint")]
    pub storage_endpoint: String,

    /// Key prefix for uploaded result files
    #[serde(default = "default_results_prefix")]
    pub results_prefix: String,
}

impl InvocationEvent {
    /// `host:port` of the log server
    pub fn log_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// `host:port` of the control server
    pub fn control_addr(&self) -> String {
        let port = self.control_port.unwrap_or(self.port.saturating_add(1));
        format!("{}:{}", self.host, port)
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ConfigError {
    /// Bad host or port
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Bad workload mode string
    #[error("Invalid mode: {0}")]
    InvalidMode(String),

    /// Bad `scale:` mode string
    #[error("Invalid scale plan: {0}")]
    InvalidScale(String),

    /// Bad object size or operation count
    #[error("Invalid workload: {0}")]
    InvalidWorkload(String),
}

impl From<ConfigError> for crate::error::BenchError {
    fn from(err: ConfigError) -> Self {
        crate::error::BenchError::config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RunConfig::default();
        assert_eq!(config.port, 8888);
        assert_eq!(config.control_port(), 8889);
        assert_eq!(config.num_ops, 50_000);
        assert_eq!(config.object_size, 8);
        assert_eq!(config.total_workers(), 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_mode_order_is_preserved() {
        let mode = WorkloadMode::parse("write_read").unwrap();
        assert_eq!(mode.operations(), &[Operation::Write, Operation::Read]);

        let mode = WorkloadMode::parse("read-write").unwrap();
        assert_eq!(mode.operations(), &[Operation::Read, Operation::Write]);

        let mode = WorkloadMode::parse("read").unwrap();
        assert_eq!(mode.operations(), &[Operation::Read]);
    }

    #[test]
    fn test_mode_rejects_unknown_components() {
        assert!(WorkloadMode::parse("write_delete").is_err());
        assert!(WorkloadMode::parse("").is_err());
        assert!(WorkloadMode::parse("__").is_err());
    }

    #[test]
    fn test_scale_mode_string() {
        let config = RunConfig::default()
            .with_mode_str("scale:write_read:4:2:3")
            .unwrap();
        assert_eq!(config.scale.batch_size, 4);
        assert_eq!(config.scale.num_batches, 3);
        assert_eq!(config.scale.delay(), Duration::from_secs(2));
        assert_eq!(config.total_workers(), 12);
        assert_eq!(config.mode, WorkloadMode::default());
    }

    #[test]
    fn test_plain_mode_string_means_single_worker() {
        let config = RunConfig::default().with_mode_str("read").unwrap();
        assert_eq!(config.scale, ScalePlan::default());
        assert_eq!(config.total_workers(), 1);
    }

    #[test]
    fn test_bad_scale_strings() {
        assert!(ScalePlan::split_mode("scale:write:4:2").is_err());
        assert!(ScalePlan::split_mode("scale:write:0:2:3").is_err());
        assert!(ScalePlan::split_mode("scale:write:4:2:0").is_err());
        assert!(ScalePlan::split_mode("scale:write:4:-1:3").is_err());
        assert!(ScalePlan::split_mode("scale:write:x:2:3").is_err());
        assert!(ScalePlan::split_mode("scale:write:1:1e20:2").is_err());
        assert!(ScalePlan::split_mode("scale:write:9223372036854775808:0:2").is_err());
    }

    #[test]
    fn test_out_of_range_plan_from_json_is_rejected() {
        let config: RunConfig = serde_json::from_str(
            r#"{"scale": {"batch_size": 18446744073709551615, "num_batches": 2}}"#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidScale(_))));
        assert_eq!(config.total_workers(), usize::MAX);

        let plan = ScalePlan {
            batch_size: 1,
            num_batches: 2,
            delay_secs: 1e20,
        };
        assert!(plan.validate().is_err());
        assert_eq!(plan.delay(), Duration::MAX);
    }

    #[test]
    fn test_validation() {
        assert!(RunConfig::new("h", u16::MAX).validate().is_err());
        assert!(RunConfig::new("", 8888).validate().is_err());
        assert!(RunConfig::default().with_num_ops(0).validate().is_err());
        assert!(RunConfig::default().with_object_size(0).validate().is_err());
    }

    #[test]
    fn test_verbosity_flags() {
        let v = Verbosity::from_flags(false, false);
        assert!(v.log_workers() && v.log_control());

        let v = Verbosity::from_flags(true, false);
        assert!(!v.log_workers() && v.log_control());

        let v = Verbosity::from_flags(true, true);
        assert!(!v.log_workers() && !v.log_control());
    }

    #[test]
    fn test_invocation_event_addresses() {
        let config = RunConfig::new("10.0.0.5", 9000);
        let event = config.invocation_event(WorkerId(3), "job-0", 9000, 9001);
        assert_eq!(event.log_addr(), "10.0.0.5:9000");
        assert_eq!(event.control_addr(), "10.0.0.5:9001");

        let mut event = event;
        event.control_port = None;
        assert_eq!(event.control_addr(), "10.0.0.5:9001");
    }

    #[test]
    fn test_config_serialization() {
        let config = RunConfig::default()
            .with_mode_str("scale:read_write:2:0.5:2")
            .unwrap();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"mode\":\"read_write\""));

        let back: RunConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.scale, config.scale);
        assert_eq!(back.mode, config.mode);
    }

    #[test]
    fn test_minimal_json_config() {
        let back: RunConfig = serde_json::from_str(
            r#"{"host":"bench-host","port":7000,"object_size":1024,"num_ops":10}"#,
        )
        .unwrap();
        assert_eq!(back.storage_endpoint, DEFAULT_STORAGE_ENDPOINT);
        assert_eq!(back.mode, WorkloadMode::default());
        assert!(back.validate().is_ok());
    }
}
