//! Stock Checker CLI
//!
//! Runs the poll loop in the foreground. The process exits with a failure
//! status on the first error; a supervisor is expected to restart it.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::SystemTime;

use clap::{Parser, Subcommand};
use stock_checker::{
    config::ConfigSource,
    error::Result,
    models::Config,
    pipeline::{self, Poller},
    services::{CodePrompt, HttpProber, NonInteractive, Notifier, SmtpMailer, StdinPrompt, ThrottleMarker},
    storage::{self, LocalStorage},
};

/// stock-checker - retailer stock change notifier
#[derive(Parser, Debug)]
#[command(
    name = "stock-checker",
    version,
    about = "Watches product pages and mails when stock changes"
)]
struct Cli {
    /// Settings file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Tracked item list
    #[arg(short, long, default_value = "target.toml")]
    targets: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the check loop
    Run {
        /// Run a single round and exit
        #[arg(long)]
        once: bool,

        /// Fail instead of prompting for an authentication code
        #[arg(long)]
        non_interactive: bool,
    },

    /// Validate configuration files
    Validate,

    /// Show the stored snapshot and notification cooldown
    Info,

    /// Send a test notification
    NotifyTest {
        /// Send even while the cooldown is active
        #[arg(long)]
        force: bool,
    },
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match execute(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("Exiting: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn execute(cli: Cli) -> Result<()> {
    let source = ConfigSource::files(&cli.config, &cli.targets);

    match cli.command {
        Command::Run {
            once,
            non_interactive,
        } => {
            log::info!("stock-checker starting...");
            let settings = source.load()?;

            let prompt: Box<dyn CodePrompt> = if non_interactive {
                Box::new(NonInteractive)
            } else {
                Box::new(StdinPrompt)
            };
            let prober = HttpProber::new(&settings.config.prober, prompt)?;
            let store = storage::open(&settings.config.storage);
            let notifier = Notifier::new(Box::new(SmtpMailer));

            let mut poller = Poller::start(source, Box::new(prober), store, notifier).await?;
            pipeline::run_checker(&mut poller, once).await?;

            log::info!("Done!");
        }

        Command::Validate => {
            log::info!("Validating configuration...");
            let settings = source.load()?;
            log::info!("✓ Config OK ({})", cli.config.display());
            log::info!(
                "✓ Targets OK ({} items in {})",
                settings.items.len(),
                cli.targets.display()
            );
        }

        Command::Info => {
            let config = Config::load_or_default(&cli.config);

            let store = LocalStorage::new(&config.storage.snapshot_file);
            match store.read_data().await {
                Ok(Some(data)) => {
                    log::info!("Snapshot saved at {}", data.updated_at);
                    for (name, in_stock) in data.items.iter() {
                        log::info!("    {}: {}", name, if in_stock { "OK" } else { "NG" });
                    }
                }
                Ok(None) => log::info!("No snapshot found yet."),
                Err(e) => log::warn!("Snapshot unreadable: {e}"),
            }

            let marker = ThrottleMarker::from_config(&config.notify);
            match marker.remaining(SystemTime::now()) {
                Some(left) => log::info!(
                    "Notifications paused for another {} min ({})",
                    left.as_secs() / 60,
                    marker.path().display()
                ),
                None => log::info!("Notifications allowed"),
            }
        }

        Command::NotifyTest { force } => {
            let settings = source.load()?;
            let config = &settings.config;
            let notifier = Notifier::new(Box::new(SmtpMailer));
            let body = "Test message from stock-checker.";

            if force {
                notifier
                    .notify_now(&config.mail, &config.notify, body)
                    .await?;
                log::info!("Test notification sent");
            } else {
                let outcome = notifier
                    .notify(&config.mail, &config.notify, body, SystemTime::now())
                    .await?;
                log::info!("Test notification: {outcome:?}");
            }
        }
    }

    Ok(())
}
