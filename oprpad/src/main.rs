use opr_core::Network;
use oprpad::{cli, ui, Config, ConfigError, Daemon, DaemonError};
use std::process;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let args = cli::parse_args();
    init_logging(&args);

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => fail(DaemonError::from(e)),
    };

    ui::print_banner(env!("CARGO_PKG_VERSION"), &config.network.network.to_string());
    ui::print_config_summary(&config);

    let daemon = match Daemon::new(config).await {
        Ok(d) => d,
        Err(e) => fail(e),
    };

    if let Err(e) = daemon.run().await {
        fail(e);
    }

    ui::print_status("✓", "oprpad daemon stopped gracefully", ui::StatusType::Success);
    info!("oprpad daemon stopped gracefully");
}

/// A config file wins over `--network`; CLI flags are applied last.
fn load_config(args: &cli::Args) -> Result<Config, ConfigError> {
    let mut config = match (&args.config_path, &args.network) {
        (Some(path), _) => Config::load(path)?,
        (None, Some(name)) => {
            let network = name
                .parse::<Network>()
                .map_err(|_| ConfigError::UnknownNetwork(name.clone()))?;
            Config::for_network(network)
        }
        (None, None) => Config::default(),
    };
    config.apply_cli_overrides(args);
    config.validate()?;
    Ok(config)
}

fn fail(e: DaemonError) -> ! {
    let message = format!("{} failed: {}", e.subsystem(), e);
    ui::print_status("✗", &message, ui::StatusType::Error);
    error!("{}", message);
    process::exit(1);
}

fn init_logging(args: &cli::Args) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();
}
