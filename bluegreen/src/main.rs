mod config;

use clap::{Args, Parser};
use config::{Config, LoggingConfig, MetricsConfig};
use endpoints::auth::Credential;
use endpoints::config::StoreConfig;
use endpoints::storage::{StoreError, get_store, save_typed};
use metrics_exporter_statsd::StatsdBuilder;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(version, about = "Blue/green endpoint tracker")]
enum CliCommand {
    /// Serve the endpoint API and the admin listener
    Run(ConfigArgs),
    /// Print the stored form of a password
    HashPassword { password: String },
    /// Store a credential allowed to create and flip endpoints
    AddCredential {
        #[command(flatten)]
        config: ConfigArgs,
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
}

#[derive(Args)]
struct ConfigArgs {
    #[arg(long)]
    config_file_path: PathBuf,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Endpoints(#[from] endpoints::EndpointsError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("could not set up metrics: {0}")]
    Metrics(String),
    #[error("credentials need a persistent store, the configured store is in-memory")]
    EphemeralStore,
    #[error("store {0} is in use, stop the server before adding credentials")]
    StoreInUse(String),
}

fn main() {
    let cli = CliCommand::parse();

    if let Err(err) = run_cli(cli) {
        eprintln!("Error: {err}");
        process::exit(1);
    }
}

fn run_cli(cli: CliCommand) -> Result<(), CliError> {
    match cli {
        CliCommand::Run(args) => {
            let config = Config::from_file(&args.config_file_path)?;
            let _sentry = init_logging(config.common.logging.as_ref());
            if let Some(metrics) = &config.common.metrics {
                init_metrics(metrics)?;
            }

            tracing::info!("starting bluegreen");
            runtime()?.block_on(endpoints::run(config.endpoints))?;
            Ok(())
        }
        CliCommand::HashPassword { password } => {
            let credential = Credential::from_password(&password);
            println!("{}", credential.password);
            Ok(())
        }
        CliCommand::AddCredential {
            config,
            username,
            password,
        } => {
            let config = Config::from_file(&config.config_file_path)?;
            if config.endpoints.store == StoreConfig::Memory {
                return Err(CliError::EphemeralStore);
            }

            // A running server holds the store lock.
            let store = get_store(&config.endpoints.store).map_err(|err| match err {
                StoreError::Locked { path, .. } => CliError::StoreInUse(path),
                err => err.into(),
            })?;
            let credential = Credential::from_password(&password);
            runtime()?.block_on(save_typed(
                store.as_ref(),
                &Credential::key(&username),
                &credential,
            ))?;
            println!("Stored credential for {username}");
            Ok(())
        }
    }
}

fn runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
}

/// Installs the tracing subscriber. The returned guard flushes Sentry on drop
/// and has to live as long as the process.
fn init_logging(config: Option<&LoggingConfig>) -> Option<sentry::ClientInitGuard> {
    let default_level = config.and_then(|c| c.level.as_deref()).unwrap_or("info");
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let guard = config.and_then(|c| c.sentry_dsn.as_deref()).map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });
    let sentry_layer = guard.as_ref().map(|_| sentry::integrations::tracing::layer());

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_layer)
        .init();

    guard
}

fn init_metrics(config: &MetricsConfig) -> Result<(), CliError> {
    let recorder = StatsdBuilder::from(config.statsd_host.as_str(), config.statsd_port)
        .build(Some(&config.prefix))
        .map_err(|e| CliError::Metrics(e.to_string()))?;
    metrics::set_global_recorder(recorder).map_err(|e| CliError::Metrics(e.to_string()))?;

    shared::metrics_defs::describe_all(endpoints::metrics_defs::ALL_METRICS);
    tracing::info!(host = %config.statsd_host, port = config.statsd_port, "statsd metrics enabled");
    Ok(())
}
