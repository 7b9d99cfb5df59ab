//! Coordinator event loop and wave release

use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;

use crate::channel::ChannelConfig;
use crate::config::RunConfig;
use crate::error::BenchResult;
use crate::protocol::{ControlMessage, WorkerId};

use super::handler::{read_readiness, ReadinessEvent, ReadyRegistration};
use super::registry::{Admission, Registry};

/// How long registrations already in flight when collection ends are
/// still answered
const LATE_REGISTRATION_GRACE: Duration = Duration::from_millis(50);

/// Per-worker events go to info when verbose, debug otherwise.
macro_rules! control_event {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            tracing::info!($($arg)+);
        } else {
            tracing::debug!($($arg)+);
        }
    };
}

/// Coordinator settings
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Workers per wave
    pub batch_size: usize,

    /// Number of waves
    pub num_batches: usize,

    /// Pause between consecutive waves
    pub delay: Duration,

    /// Release whoever registered once this elapses. `None` waits until
    /// every expected worker registered.
    pub registration_timeout: Option<Duration>,

    /// Log per-worker events at info level
    pub verbose: bool,

    /// Internal channel sizes
    pub channel: ChannelConfig,
}

impl CoordinatorConfig {
    /// Create a config for `num_batches` waves of `batch_size`
    pub fn new(batch_size: usize, num_batches: usize, delay: Duration) -> Self {
        Self {
            batch_size,
            num_batches,
            delay,
            registration_timeout: None,
            verbose: true,
            channel: ChannelConfig::default(),
        }
    }

    /// Derive from a run configuration
    pub fn from_run_config(config: &RunConfig) -> Self {
        Self::new(
            config.scale.batch_size,
            config.scale.num_batches,
            config.scale.delay(),
        )
        .with_registration_timeout(config.registration_timeout())
        .with_verbose(config.verbosity.log_control())
    }

    /// Set the registration timeout
    pub fn with_registration_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.registration_timeout = timeout;
        self
    }

    /// Set verbosity
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Set channel sizes
    pub fn with_channel_config(mut self, channel: ChannelConfig) -> Self {
        self.channel = channel;
        self
    }

    /// Registrations needed before release
    pub fn capacity(&self) -> usize {
        self.batch_size.saturating_mul(self.num_batches)
    }
}

/// Lifecycle of a coordinator run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorPhase {
    /// Accepting connections and registrations
    Collecting,
    /// Sending `RUN` wave by wave
    Releasing,
    /// All waves sent, listener closed
    Done,
}

/// What happened during a coordinator run
#[derive(Debug, Clone, Default)]
pub struct CoordinatorReport {
    /// Accepted identities in arrival order
    pub accepted: Vec<WorkerId>,

    /// Identities refused as duplicates
    pub rejected: Vec<WorkerId>,

    /// Connections refused for sending something other than `READY:<id>`
    pub malformed: usize,

    /// Wave membership in release order
    pub waves: Vec<Vec<WorkerId>>,

    /// When each wave finished sending
    pub released_at: Vec<Instant>,

    /// Workers whose `RUN` could not be delivered
    pub run_failures: Vec<WorkerId>,

    /// Release was triggered by the registration timeout
    pub timed_out: bool,
}

impl CoordinatorReport {
    /// Number of workers sent `RUN`
    pub fn released(&self) -> usize {
        self.waves.iter().map(Vec::len).sum::<usize>() - self.run_failures.len()
    }
}

/// Rendezvous engine for the control channel
#[derive(Debug)]
pub struct ControlCoordinator {
    config: CoordinatorConfig,
    phase: watch::Sender<CoordinatorPhase>,
}

impl ControlCoordinator {
    /// Create a coordinator
    pub fn new(config: CoordinatorConfig) -> Self {
        let (phase, _) = watch::channel(CoordinatorPhase::Collecting);
        Self { config, phase }
    }

    /// Get the configuration
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Observe phase transitions
    pub fn subscribe_phase(&self) -> watch::Receiver<CoordinatorPhase> {
        self.phase.subscribe()
    }

    /// Run until every wave has been released
    ///
    /// Without a registration timeout this does not return until
    /// `batch_size * num_batches` distinct workers have registered.
    pub async fn run(self, listener: TcpListener) -> BenchResult<CoordinatorReport> {
        let capacity = self.config.capacity();
        let mut report = CoordinatorReport::default();

        tracing::info!(
            addr = ?listener.local_addr().ok(),
            batch_size = self.config.batch_size,
            num_batches = self.config.num_batches,
            delay_secs = self.config.delay.as_secs_f64(),
            "Control coordinator collecting registrations"
        );

        let registry = self.collect(&listener, capacity, &mut report).await;
        report.accepted = registry.ids();

        self.set_phase(CoordinatorPhase::Releasing);
        tracing::info!(
            registered = registry.len(),
            expected = capacity,
            "Starting benchmark"
        );

        let waves = registry.into_waves(self.config.batch_size);
        let total = waves.len();
        let mut released: Vec<ReadyRegistration> = Vec::with_capacity(report.accepted.len());

        for wave in waves {
            let index = wave.index;
            report.waves.push(wave.ids());

            for (id, mut reg) in wave.members {
                control_event!(self.config.verbose, worker_id = %id, wave = index, "Running function");
                if let Err(e) = reg.send(ControlMessage::Run).await {
                    tracing::warn!(worker_id = %id, peer = %reg.peer, error = %e, "Failed to send RUN");
                    report.run_failures.push(id);
                }
                // Workers close their own side after reading the reply.
                released.push(reg);
            }
            report.released_at.push(Instant::now());
            control_event!(self.config.verbose, wave = index, "End of wave");

            if index + 1 < total && !self.config.delay.is_zero() {
                control_event!(
                    self.config.verbose,
                    delay_secs = self.config.delay.as_secs_f64(),
                    "Sleeping before next wave"
                );
                tokio::time::sleep(self.config.delay).await;
            }
        }

        drop(listener);
        self.set_phase(CoordinatorPhase::Done);
        tracing::info!(
            waves = report.waves.len(),
            released = report.released(),
            rejected = report.rejected.len(),
            "Control coordinator done"
        );

        drop(released);
        Ok(report)
    }

    /// Accept connections and registrations until the registry is full or
    /// the registration timeout fires
    async fn collect(
        &self,
        listener: &TcpListener,
        capacity: usize,
        report: &mut CoordinatorReport,
    ) -> Registry<ReadyRegistration> {
        let mut registry = Registry::new(capacity);
        let (event_tx, mut event_rx) = mpsc::channel(self.config.channel.control_buffer);
        let mut handlers = JoinSet::new();

        let deadline = self
            .config
            .registration_timeout
            .map(|t| tokio::time::Instant::now() + t);
        let timeout = async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(timeout);

        while !registry.is_full() {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tracing::debug!(%peer, "Control connection accepted");
                        let tx = event_tx.clone();
                        handlers.spawn(async move {
                            let event = read_readiness(stream, peer).await;
                            let _ = tx.send(event).await;
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to accept control connection");
                    }
                },

                Some(event) = event_rx.recv() => {
                    self.on_event(event, &mut registry, report).await;
                }

                Some(_) = handlers.join_next(), if !handlers.is_empty() => {}

                _ = &mut timeout => {
                    tracing::warn!(
                        registered = registry.len(),
                        expected = capacity,
                        "Registration timeout elapsed, releasing partial waves"
                    );
                    report.timed_out = true;
                    break;
                }
            }
        }

        // Registrations that raced the last accepted one still get an answer.
        drop(event_tx);
        let grace = tokio::time::sleep(LATE_REGISTRATION_GRACE);
        tokio::pin!(grace);
        loop {
            tokio::select! {
                event = event_rx.recv() => match event {
                    Some(event) => self.on_event(event, &mut registry, report).await,
                    None => break,
                },
                _ = &mut grace => break,
            }
        }

        // Connections that never announced themselves are dropped here.
        handlers.abort_all();
        registry
    }

    async fn on_event(
        &self,
        event: ReadinessEvent,
        registry: &mut Registry<ReadyRegistration>,
        report: &mut CoordinatorReport,
    ) {
        let verbose = self.config.verbose;

        match event {
            ReadinessEvent::Ready(reg) => {
                let id = reg.id;
                control_event!(verbose, worker_id = %id, peer = %reg.peer, "Function ready");

                match registry.admit(id, reg) {
                    Admission::Accepted {
                        registered,
                        capacity,
                    } => {
                        control_event!(
                            verbose,
                            worker_id = %id,
                            progress = %format!("{registered}/{capacity}"),
                            "Queuing function"
                        );
                    }
                    Admission::Duplicate(reg) | Admission::Full(reg) => {
                        control_event!(verbose, worker_id = %id, "Aborting function");
                        report.rejected.push(id);
                        if let Err(e) = reg.refuse().await {
                            tracing::debug!(worker_id = %id, error = %e, "Failed to send ABORT");
                        }
                    }
                }
            }
            ReadinessEvent::Malformed {
                peer,
                mut stream,
                reason,
            } => {
                tracing::warn!(%peer, %reason, "Malformed readiness message");
                report.malformed += 1;

                let _ = stream.write_all(&ControlMessage::Abort.encode()).await;
                let _ = stream.shutdown().await;
            }
            ReadinessEvent::Disconnected { peer } => {
                tracing::debug!(%peer, "Control connection closed before readiness");
            }
            ReadinessEvent::Failed { peer, error } => {
                tracing::warn!(%peer, %error, "Control connection read failed");
            }
        }
    }

    fn set_phase(&self, phase: CoordinatorPhase) {
        self.phase.send_replace(phase);
    }
}
