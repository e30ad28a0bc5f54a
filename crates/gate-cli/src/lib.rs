pub mod cli;
pub mod env;
pub mod picker;

use std::{
    fs::{self, File, OpenOptions},
    io,
    path::Path,
    process::ExitCode,
    sync::{Arc, Mutex},
};

use anyhow::{Context, Result};
use gateway_core::{
    GatewayConfig, GatewayCore, HostCache, ProviderRegistry, UserContext,
    config::expand_home,
};
use ssh_core::InterruptShield;
use tracing::{info, warn};

use crate::{cli::GateArgs, env::StdioEnvironment, picker::TerminalPicker};

/// Install the global subscriber. Logs go to `log_file` without ANSI colours,
/// or to stderr when the file cannot be opened. `RUST_LOG` overrides `level`.
/// Returns the open error when falling back to stderr.
pub fn init_tracing(level: &str, log_file: Option<&Path>) -> Option<io::Error> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    let builder = tracing_subscriber::fmt().with_env_filter(env_filter).with_ansi(false);

    let (file, open_error) = match log_file.map(open_log) {
        Some(Ok(file)) => (Some(file), None),
        Some(Err(err)) => (None, Some(err)),
        None => (None, None),
    };
    let _ = match file {
        Some(file) => builder.with_writer(Mutex::new(file)).try_init(),
        None => builder.with_writer(io::stderr).try_init(),
    };
    open_error
}

fn open_log(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Exit code for the remote status; statuses above 255 saturate.
pub fn exit_code(status: Option<u32>) -> ExitCode {
    match status {
        Some(status) => ExitCode::from(u8::try_from(status).unwrap_or(u8::MAX)),
        None => ExitCode::SUCCESS,
    }
}

fn host_cache(config: &GatewayConfig) -> HostCache {
    match &config.cache_file {
        Some(path) => HostCache::persistent(config.cache_ttl(), expand_home(path)),
        None => HostCache::new(config.cache_ttl()),
    }
}

/// One gateway invocation for the current OS user.
pub async fn run_gateway(args: &GateArgs, config: GatewayConfig) -> Result<Option<u32>> {
    let _shield = InterruptShield::install()
        .inspect_err(|err| warn!(?err, "interrupt handlers unavailable"))
        .ok();
    let config = Arc::new(config);
    let username = whoami::username();
    let source = args.source();
    info!(user = %username, from = %source, ssh_port = config.ssh_port, idp = %config.idp, "gateway started");

    let mode = args.launch_mode()?;
    let cache = Arc::new(host_cache(&config));
    let user = UserContext::login(&config, &ProviderRegistry::with_builtin(), cache, &username)
        .await
        .with_context(|| format!("failed to load hosts for {username}"))?;
    if user.allowed_hosts.is_empty() {
        warn!(user = %username, group = %config.gateway_group, "user has no allowed hosts");
    }

    let env = StdioEnvironment::new(config.clone());
    let mut core = GatewayCore::new(config, user, source, env);
    let mut picker = TerminalPicker::stdio();
    let status = core.run(mode, &mut picker).await?;
    Ok(status)
}
