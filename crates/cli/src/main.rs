//! Fetch trigger CLI entry point.
//!
//! This binary is the composition root. Responsibilities:
//!
//! 1. **Parse arguments** with `clap`: a settings document and a host snapshot
//!    file for every command.
//! 2. **Wire observability**: see [`telemetry`].
//! 3. **Construct infrastructure**: a [`host::MemoryHost`] loaded from the
//!    snapshot file and a [`transport::ReqwestTransport`], injected into a
//!    mounted [`controller::TriggerController`].
//! 4. **Run the command**:
//!    - `fire` sends once and prints the resulting message.
//!    - `payload` prints the body that would be sent.
//!    - `watch` keeps the controller mounted with auto-rebuild on, reloading
//!      the snapshot file when it changes, until Ctrl-C.

mod telemetry;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use controller::{TriggerController, TriggerOutcome};
use host::{HostSnapshot, MemoryHost};
use tracing::{info, warn};
use transport::ReqwestTransport;
use trigger::{Settings, TriggerSettings};

use crate::telemetry::LogFormat;

/// Sends a configured webhook with a body built from host data.
#[derive(Parser, Debug)]
#[command(name = "fetch-trigger", version, about, long_about = None)]
struct Cli {
    /// Log line format on stderr
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send the webhook once and print the resulting message
    Fire(Inputs),
    /// Print the body that would be sent
    Payload(Inputs),
    /// Stay mounted with auto-rebuild, reloading the host file on change
    Watch {
        #[command(flatten)]
        inputs: Inputs,

        /// How often the host file is checked for changes, in milliseconds
        #[arg(long, default_value_t = 1000)]
        poll_ms: u64,
    },
}

#[derive(Args, Debug)]
struct Inputs {
    /// Settings document (JSON)
    #[arg(long)]
    settings: PathBuf,

    /// Host snapshot file (JSON)
    #[arg(long)]
    host: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::init(cli.log_format);

    let result = match cli.command {
        Command::Fire(inputs) => fire(&inputs).await,
        Command::Payload(inputs) => payload(&inputs).await,
        Command::Watch { inputs, poll_ms } => {
            watch(&inputs, Duration::from_millis(poll_ms.max(1))).await
        }
    };

    telemetry::shutdown();
    result
}

async fn fire(inputs: &Inputs) -> anyhow::Result<()> {
    let settings = load_settings(&inputs.settings).await?;
    let (host, _) = load_host(&inputs.host).await?;
    let controller = mount(settings, host)?;

    match controller.trigger().await {
        TriggerOutcome::Skipped => {
            bail!("trigger is disabled for this session (permission rule or missing target URL)")
        }
        TriggerOutcome::Succeeded { message, .. } => {
            println!("{message}");
            Ok(())
        }
        TriggerOutcome::Failed { message, error, .. } => {
            println!("{message}");
            Err(error).context("webhook invocation failed")
        }
        TriggerOutcome::Superseded { .. } => Ok(()),
    }
}

async fn payload(inputs: &Inputs) -> anyhow::Result<()> {
    let settings = load_settings(&inputs.settings).await?;
    let (host, _) = load_host(&inputs.host).await?;
    let controller = mount(settings, host)?;

    controller
        .refresh_payload()
        .context("failed to read host data for the payload")?;
    println!("{}", controller.payload().unwrap_or_default());
    Ok(())
}

async fn watch(inputs: &Inputs, poll: Duration) -> anyhow::Result<()> {
    let mut settings = load_settings(&inputs.settings).await?;
    settings.watch.enabled = true;
    let (host, mut last_contents) = load_host(&inputs.host).await?;
    let controller = mount(settings, host.clone())?;
    info!(
        records = controller.watched_record_count(),
        host = %inputs.host.display(),
        "Watching for changes; press Ctrl-C to stop"
    );

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut interval = tokio::time::interval(poll);
    let mut last_message = String::new();

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = interval.tick() => {}
        }

        match tokio::fs::read_to_string(&inputs.host).await {
            Ok(contents) if contents != last_contents => match HostSnapshot::from_json(&contents) {
                Ok(snapshot) => {
                    host.replace(snapshot);
                    last_contents = contents;
                    info!("Host data reloaded");
                }
                Err(e) => warn!(error = %e, "Ignoring malformed host file"),
            },
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Cannot read host file"),
        }

        let message = controller.state().message;
        if !message.is_empty() && message != last_message {
            println!("{message}");
        }
        last_message = message;
    }

    controller.unmount();
    info!("Stopped");
    Ok(())
}

fn mount(settings: TriggerSettings, host: Arc<MemoryHost>) -> anyhow::Result<TriggerController> {
    let transport = ReqwestTransport::new().context("failed to set up the HTTP transport")?;
    TriggerController::mount(settings, host, Arc::new(transport))
        .context("failed to mount the trigger controller")
}

async fn load_settings(path: &Path) -> anyhow::Result<TriggerSettings> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read settings file {}", path.display()))?;
    let settings = Settings::from_json(&text)
        .and_then(|s| s.resolve())
        .with_context(|| format!("invalid settings in {}", path.display()))?;
    Ok(settings)
}

async fn load_host(path: &Path) -> anyhow::Result<(Arc<MemoryHost>, String)> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read host file {}", path.display()))?;
    let snapshot = HostSnapshot::from_json(&text)
        .with_context(|| format!("invalid host snapshot in {}", path.display()))?;
    Ok((Arc::new(MemoryHost::new(snapshot)), text))
}
