use bedrock_fleet_lib::fleet::{CycleOutcome, ProgressEvent};
use bedrock_fleet_lib::instance::Instance;
use bedrock_fleet_lib::settings::DEFAULT_SETTINGS_FILE;
use bedrock_fleet_lib::{logging, AppState};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(
    name = "bedrock-fleet",
    version,
    about = "Keep Bedrock server instances on the latest build"
)]
struct Cli {
    /// Settings file
    #[arg(long, global = true, default_value = DEFAULT_SETTINGS_FILE)]
    config: PathBuf,

    /// Log directory (defaults to Logs/ next to the settings file)
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Report whether a newer build is available
    Check,
    /// Run a full update cycle
    Update,
    /// List discovered instances
    List,
    /// Show the update history
    History,
    /// Start one instance
    Start { name: String },
    /// Stop one instance
    Stop { name: String },
    /// Watch instance status until Ctrl-C
    Monitor {
        #[arg(long, default_value_t = 5)]
        interval_secs: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let state = AppState::new(&cli.config, cli.log_dir)?;
    let _log_guard = logging::init(&state.log_dir)?;

    match cli.command {
        Command::Check => {
            let check = state.orchestrator().check_for_updates().await?;
            if check.available {
                println!(
                    "Update available: {} -> {}",
                    check.current_version, check.latest_version
                );
            } else {
                println!("Up to date ({})", check.current_version);
            }
        }
        Command::Update => run_update(&state).await?,
        Command::List => {
            let instances = state.orchestrator().discover().await?;
            if instances.is_empty() {
                println!("No instances found");
            }
            for instance in &instances {
                println!(
                    "{} - {}",
                    instance.full_description(),
                    status_label(instance)
                );
            }
        }
        Command::History => {
            let entries = state.ledger().entries().await;
            if entries.is_empty() {
                println!("No updates recorded");
            }
            for entry in entries {
                println!(
                    "{}  first {}  last {}  x{}",
                    entry.version,
                    entry.first_updated_at,
                    entry.last_updated_at,
                    entry.times_updated
                );
            }
        }
        Command::Start { name } => {
            let mut instance = find_instance(&state, &name).await?;
            instance.start(state.procs.as_ref()).await?;
            println!("{} - {}", instance, status_label(&instance));
        }
        Command::Stop { name } => {
            let mut instance = find_instance(&state, &name).await?;
            instance.stop(state.procs.as_ref()).await?;
            println!("{} - {}", instance, status_label(&instance));
        }
        Command::Monitor { interval_secs } => {
            let instances = Arc::new(RwLock::new(state.orchestrator().discover().await?));
            let shutdown = CancellationToken::new();
            let handle = state
                .status_poller(Duration::from_secs(interval_secs.max(1)))
                .spawn(instances, shutdown.clone());

            info!("Monitoring instances, press Ctrl-C to stop");
            tokio::signal::ctrl_c().await?;
            shutdown.cancel();
            handle.await?;
        }
    }

    Ok(())
}

async fn run_update(state: &AppState) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let ctrl_c_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Cancellation requested");
            ctrl_c_token.cancel();
        }
    });

    let (tx, mut rx) = mpsc::unbounded_channel::<ProgressEvent>();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            println!("[{:>5.1}%] {:?}: {}", event.percentage, event.stage, event.message);
        }
    });

    let result = state.orchestrator().run_cycle(Some(&tx), &cancel).await;
    drop(tx);
    let _ = printer.await;

    match result? {
        CycleOutcome::NoUpdateAvailable { version } => {
            println!("Already on {}", version);
        }
        CycleOutcome::Updated {
            version,
            instance_count,
            updated_count,
        } => {
            println!(
                "Updated {} of {} instance(s) to {}",
                updated_count, instance_count, version
            );
        }
    }

    Ok(())
}

async fn find_instance(state: &AppState, name: &str) -> anyhow::Result<Instance> {
    state
        .orchestrator()
        .discover()
        .await?
        .into_iter()
        .find(|i| i.name == name)
        .ok_or_else(|| anyhow::anyhow!("No instance named {}", name))
}

fn status_label(instance: &Instance) -> String {
    match instance.process_id {
        Some(pid) if instance.is_running => format!("running (pid {})", pid),
        _ => "stopped".to_string(),
    }
}
