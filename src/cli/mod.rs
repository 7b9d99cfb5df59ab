//! CLI argument parsing and command dispatch

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

pub use commands::execute;

#[derive(Parser, Debug)]
#[command(name = "pbench")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Deploy the benchmark function (not supported by this build)
    #[arg(long)]
    pub create: bool,

    /// Invoke workers as remote functions over HTTP
    #[arg(long, conflicts_with = "invoke_local", requires = "function_url")]
    pub invoke: bool,

    /// Run workers as tasks inside this process
    #[arg(long)]
    pub invoke_local: bool,

    /// Do not forward worker log lines
    #[arg(long)]
    pub quiet: bool,

    /// Like --quiet, and only log coordinator events at debug level
    #[arg(long)]
    pub quieter: bool,

    /// Host workers connect back to
    #[arg(long, env = "PBENCH_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Log port; the control server listens on the next port
    #[arg(long, default_value_t = pbench_core::DEFAULT_PORT)]
    pub port: u16,

    /// Operations per phase
    #[arg(long, default_value_t = pbench_core::DEFAULT_NUM_OPS)]
    pub num_ops: usize,

    /// Object size in bytes
    #[arg(long, default_value_t = pbench_core::DEFAULT_OBJECT_SIZE)]
    pub obj_size: usize,

    /// Workload mode, optionally `scale:<mode>:<batch_size>:<delay>:<num_batches>`
    #[arg(long, default_value = "write_read")]
    pub mode: String,

    /// Function endpoint used by --invoke
    #[arg(long, env = "PBENCH_FUNCTION_URL")]
    pub function_url: Option<String>,

    /// Bearer token sent with every invocation
    #[arg(long, env = "PBENCH_FUNCTION_TOKEN", hide_env_values = true)]
    pub function_token: Option<String>,

    /// Directory uploaded result files are copied into
    #[arg(long, default_value = "results")]
    pub results_dir: PathBuf,

    /// Directory workers write their timing files to
    #[arg(long, default_value = "/tmp")]
    pub output_dir: PathBuf,

    /// Keep objects in this directory instead of in memory
    #[arg(long)]
    pub storage_dir: Option<PathBuf>,

    /// Load the run configuration from a JSON file instead of flags
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Release partial waves after this many seconds without a full set
    #[arg(long)]
    pub registration_timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a single worker from an invocation event
    Worker {
        /// Invocation event as JSON
        #[arg(long)]
        event: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["pbench", "--invoke-local"]).unwrap();
        assert!(cli.invoke_local);
        assert_eq!(cli.port, 8888);
        assert_eq!(cli.num_ops, 50_000);
        assert_eq!(cli.obj_size, 8);
        assert_eq!(cli.mode, "write_read");
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_invoke_requires_function_url() {
        assert!(Cli::try_parse_from(["pbench", "--invoke"]).is_err());
        let cli = Cli::try_parse_from([
            "pbench",
            "--invoke",
            "--function-url",
            "http://localhost:9000/invoke",
        ])
        .unwrap();
        assert_eq!(cli.function_url.as_deref(), Some("http://localhost:9000/invoke"));
    }

    #[test]
    fn test_worker_subcommand() {
        let cli = Cli::try_parse_from(["pbench", "worker", "--event", "{}"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Worker { ref event }) if event == "{}"));
    }
}
