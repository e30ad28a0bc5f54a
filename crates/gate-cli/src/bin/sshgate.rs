use std::process::ExitCode;

use clap::Parser;
use gate_cli::{cli::GateArgs, exit_code, init_tracing, run_gateway};
use tracing::{debug, error, warn};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = GateArgs::parse();
    let (config, found) = match args.resolve_config() {
        Ok(resolved) => resolved,
        Err(err) => {
            eprintln!("sshgate: {err:#}");
            return ExitCode::FAILURE;
        }
    };

    if let Some(err) = init_tracing(&config.log_level, config.log_file.as_deref()) {
        warn!(error = %err, "log file unavailable; logging to stderr");
    }
    if !found {
        debug!(path = %args.config.display(), "config file not found; using defaults");
    }

    match run_gateway(&args, config).await {
        Ok(status) => exit_code(status),
        Err(err) => {
            error!(error = ?err, "gateway failed");
            eprintln!("sshgate: {err:#}");
            ExitCode::FAILURE
        }
    }
}
