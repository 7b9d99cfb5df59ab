//! Command execution

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use pbench_core::{
    InvocationEvent, JobRegistry, LocalLauncher, OrchestratorBuilder, RunConfig, RunReport,
    StorageConnector, Verbosity, WorkerBuilder, WorkerLauncher, WorkerOutcome,
};
use pbench_invokers::{HttpInvokeConfig, HttpLauncher};
use pbench_storage::{DirResultStore, FsStore, LocalJobRegistry, MemoryStore};

use super::{Cli, Commands};

/// Dispatch the parsed command line
pub async fn execute(cli: Cli) -> Result<()> {
    if let Some(Commands::Worker { event }) = &cli.command {
        return run_worker(&cli, event).await;
    }

    match plan(&cli) {
        Step::Deploy => {
            bail!("--create is not supported: deploy the benchmark function separately")
        }
        Step::Nothing => bail!("nothing to do: pass --invoke or --invoke-local"),
        Step::Run => {}
    }

    let config = run_config(&cli)?;
    let launcher = launcher(&cli)?;
    let registry: Arc<dyn JobRegistry> = Arc::new(LocalJobRegistry::new());

    let orchestrator = OrchestratorBuilder::new()
        .config(config)
        .launcher(launcher)
        .job_registry(registry)
        .build()
        .context("invalid run configuration")?;

    let report = orchestrator.run().await.context("benchmark run failed")?;
    print_report(&report)?;

    if !report.is_success() {
        bail!(
            "{} worker(s) failed and {} aborted",
            report.summary.failed,
            report.summary.aborted
        );
    }

    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum Step {
    /// Only deployment was asked for
    Deploy,
    /// No mode flag at all
    Nothing,
    /// Launch workers
    Run,
}

/// Deployment is a separate step; asking for it alongside an invoke mode
/// only skips it.
fn plan(cli: &Cli) -> Step {
    let invoke = cli.invoke || cli.invoke_local;
    if cli.create {
        if !invoke {
            return Step::Deploy;
        }
        tracing::warn!("Function deployment is not supported, skipping --create");
    }
    if invoke {
        Step::Run
    } else {
        Step::Nothing
    }
}

fn run_config(cli: &Cli) -> Result<RunConfig> {
    if let Some(path) = &cli.config {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config {}", path.display()))?;
        let config: RunConfig = serde_json::from_str(&raw)
            .with_context(|| format!("cannot parse config {}", path.display()))?;
        return Ok(config);
    }

    let config = RunConfig::new(cli.host.clone(), cli.port)
        .with_mode_str(&cli.mode)
        .with_context(|| format!("invalid mode '{}'", cli.mode))?
        .with_object_size(cli.obj_size)
        .with_num_ops(cli.num_ops)
        .with_verbosity(Verbosity::from_flags(cli.quiet, cli.quieter))
        .with_registration_timeout(cli.registration_timeout.map(Duration::from_secs));

    Ok(config)
}

fn storage(cli: &Cli) -> Arc<dyn StorageConnector> {
    match &cli.storage_dir {
        Some(dir) => Arc::new(FsStore::new(dir)),
        None => Arc::new(MemoryStore::new()),
    }
}

fn launcher(cli: &Cli) -> Result<Arc<dyn WorkerLauncher>> {
    if cli.invoke {
        let url = cli
            .function_url
            .clone()
            .context("--invoke needs --function-url")?;
        let mut config = HttpInvokeConfig::default();
        if let Some(token) = &cli.function_token {
            config = config.with_bearer_token(token.clone());
        }
        let launcher = HttpLauncher::new(url, config).context("cannot set up invoker")?;
        return Ok(Arc::new(launcher));
    }

    Ok(Arc::new(LocalLauncher::new(
        storage(cli),
        Arc::new(DirResultStore::new(&cli.results_dir)),
        &cli.output_dir,
    )))
}

async fn run_worker(cli: &Cli, event: &str) -> Result<()> {
    let event: InvocationEvent =
        serde_json::from_str(event).context("cannot parse invocation event")?;

    let worker = WorkerBuilder::new(event)
        .storage(storage(cli))
        .results(Arc::new(DirResultStore::new(&cli.results_dir)))
        .output_dir(&cli.output_dir)
        .build()
        .context("cannot build worker")?;

    let id = worker.id();
    match worker.run().await.context("worker failed")? {
        WorkerOutcome::Completed(stats) => tracing::info!(
            worker_id = %id,
            operations = stats.total_operations(),
            uploaded = stats.uploaded.len(),
            "Worker completed"
        ),
        WorkerOutcome::Aborted { reply } => {
            tracing::warn!(worker_id = %id, %reply, "Worker aborted by control")
        }
        WorkerOutcome::Dispatched => {}
    }

    Ok(())
}

fn print_report(report: &RunReport) -> Result<()> {
    for op in &report.summary.operations {
        tracing::info!(
            op = %op.op,
            operations = op.operations,
            ops_per_second = op.ops_per_second,
            p50_us = op.latency.p50,
            p99_us = op.latency.p99,
            "Phase summary"
        );
    }

    let json = serde_json::to_string_pretty(&report.summary).context("cannot encode summary")?;
    println!("{json}");
    Ok(())
}
