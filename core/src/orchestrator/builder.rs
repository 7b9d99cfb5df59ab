//! Builder pattern for Orchestrator construction

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::channel::ChannelConfig;
use crate::config::RunConfig;
use crate::error::{BenchError, BenchResult};
use crate::logmux::LogRecord;
use crate::traits::{JobRegistry, WorkerLauncher};

use super::executor::Orchestrator;

/// Builder for creating an Orchestrator with proper configuration
///
/// # Example
///
/// ```ignore
/// let orchestrator = OrchestratorBuilder::new()
///     .config(config)
///     .launcher(Arc::new(LocalLauncher::new(storage, results, "/tmp")))
///     .job_registry(Arc::new(LocalJobRegistry::new()))
///     .build()?;
///
/// let report = orchestrator.run().await?;
/// ```
pub struct OrchestratorBuilder {
    config: RunConfig,
    launcher: Option<Arc<dyn WorkerLauncher>>,
    registry: Option<Arc<dyn JobRegistry>>,
    channel_config: ChannelConfig,
    log_sink: Option<mpsc::Sender<LogRecord>>,
}

impl OrchestratorBuilder {
    /// Create a new orchestrator builder with default configuration
    pub fn new() -> Self {
        Self {
            config: RunConfig::default(),
            launcher: None,
            registry: None,
            channel_config: ChannelConfig::default(),
            log_sink: None,
        }
    }

    /// Set the full run configuration
    pub fn config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the worker launcher
    pub fn launcher(mut self, launcher: Arc<dyn WorkerLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// Set the job registry
    pub fn job_registry(mut self, registry: Arc<dyn JobRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set the channel configuration
    pub fn channel_config(mut self, config: ChannelConfig) -> Self {
        self.channel_config = config;
        self
    }

    /// Forward every multiplexed log line to `sink`
    pub fn log_sink(mut self, sink: mpsc::Sender<LogRecord>) -> Self {
        self.log_sink = Some(sink);
        self
    }

    /// Build the orchestrator
    ///
    /// # Errors
    ///
    /// Returns an error if launcher or job registry are not set, or if
    /// configuration validation fails.
    pub fn build(self) -> BenchResult<Orchestrator> {
        let launcher = self
            .launcher
            .ok_or_else(|| BenchError::missing_config("launcher"))?;

        let registry = self
            .registry
            .ok_or_else(|| BenchError::missing_config("job_registry"))?;

        self.config
            .validate()
            .map_err(|e| BenchError::config(e.to_string()))?;

        Ok(Orchestrator::new(
            self.config,
            launcher,
            registry,
            self.channel_config,
            self.log_sink,
        ))
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
