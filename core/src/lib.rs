//! pbench-core: wave-scheduled storage benchmark fan-out
//!
//! This crate provides everything the control process and the benchmark
//! functions share, including:
//!
//! - Wire protocol for the control and log channels
//! - Control coordinator (readiness rendezvous and wave release)
//! - Log multiplexer (one observer for every worker's log stream)
//! - Worker runtime (handshake, timed workload, result upload)
//! - Orchestrator (run lifecycle, job registration, worker launch)
//! - Collaborator traits, configuration, errors and latency metrics

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod channel;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod logmux;
pub mod metrics;
pub mod orchestrator;
pub mod protocol;
pub mod traits;
pub mod worker;

pub use channel::ChannelConfig;
pub use config::*;
pub use coordinator::{ControlCoordinator, CoordinatorConfig, CoordinatorPhase, CoordinatorReport};
pub use error::*;
pub use logmux::{LogMultiplexer, LogRecord, LogSummary};
pub use metrics::*;
pub use orchestrator::{
    LocalLauncher, Orchestrator, OrchestratorBuilder, RunReport, RunSummary, WorkerResult,
};
pub use protocol::*;
pub use traits::*;
pub use worker::{Worker, WorkerBuilder, WorkerOutcome, WorkerStats};

#[cfg(test)]
mod integration_tests {
    use super::*;

    // =========================================================================
    // Round-trip serialization tests
    // =========================================================================

    #[test]
    fn test_invocation_event_roundtrip() {
        let config = RunConfig::default()
            .with_mode_str("scale:read_write:4:0.5:2")
            .unwrap();
        let event = config.invocation_event(WorkerId(7), "job-1", 8888, 8889);

        let json = serde_json::to_string(&event).unwrap();
        let deserialized: InvocationEvent = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized, event);
        assert_eq!(deserialized.log_addr(), "127.0.0.1:8888");
        assert_eq!(deserialized.control_addr(), "127.0.0.1:8889");
        assert_eq!(
            deserialized.mode.operations(),
            &[Operation::Read, Operation::Write]
        );
    }

    #[test]
    fn test_invocation_event_minimal_json() {
        let json = r#"{
            "host": "10.0.0.5",
            "port": 9000,
            "object_size": 1024,
            "num_ops": 10,
            "mode": "write",
            "job_id": "job-0",
            "worker_id": 3
        }"#;
        let event: InvocationEvent = serde_json::from_str(json).unwrap();

        assert_eq!(event.control_addr(), "10.0.0.5:9001");
        assert_eq!(event.storage_endpoint, DEFAULT_STORAGE_ENDPOINT);
        assert_eq!(event.results_prefix, DEFAULT_RESULTS_PREFIX);
    }

    #[test]
    fn test_run_config_roundtrip() {
        let config = RunConfig::new("10.0.0.1", 7000)
            .with_scale(ScalePlan::new(8, 3, std::time::Duration::from_secs(2)))
            .with_verbosity(Verbosity::Quiet);
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: RunConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized.total_workers(), 24);
        assert_eq!(deserialized.control_port(), 7001);
        assert_eq!(deserialized.verbosity, Verbosity::Quiet);
    }

    #[test]
    fn test_log_line_roundtrip() {
        for line in [
            LogLine::info("hello"),
            LogLine::warn("slow"),
            LogLine::error("put buffer failed: tmp-0-1"),
            LogLine::Abort("Control returned ABORT".into()),
            LogLine::Close,
        ] {
            assert_eq!(LogLine::parse(line.encode().trim_end()), line);
        }
    }
}
