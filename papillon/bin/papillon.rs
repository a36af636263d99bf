#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

use std::path::PathBuf;

use clap::Parser;
use papillon::{config, summary};
use papillon_dispatch::{CancelHandle, ProgressEvent};

#[derive(Debug, Parser)]
#[command(name = "papillon", version, about = "Rate-limited bulk mailer")]
struct Cli {
    /// Campaign file. Defaults to `PAPILLON_CONFIG`, then ./papillon.config.ron.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Render every message and report problems without sending.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    papillon_common::logging::init();

    let config_path = config::find_config_file(cli.config)?;
    let campaign = config::load(&config_path)?;
    campaign.validate()?;

    tracing::info!(
        config = %config_path.display(),
        contacts = campaign.contacts.len(),
        "Loaded campaign"
    );

    let missing = campaign.missing_variables();
    if !missing.is_empty() {
        tracing::warn!(
            variables = %missing.join(", "),
            "Template variables have no matching contact column and will be sent as-is"
        );
    }

    if cli.dry_run {
        for (index, message) in campaign.preview().into_iter().enumerate() {
            match message {
                Ok(message) => {
                    tracing::info!(index, recipient = %message.recipient, subject = %message.subject, "Would send");
                }
                Err(err) => tracing::warn!(index, %err, "Contact cannot be sent to"),
            }
        }
        return Ok(());
    }

    let (cancel, signal) = CancelHandle::pair();
    tokio::spawn(async move {
        if shutdown_signal().await {
            cancel.cancel();
        }
    });

    let report = campaign
        .run(signal, |event| match event {
            ProgressEvent::Attempted { completed, total } => {
                tracing::info!(completed, total, "{:.1}%", event.percent());
            }
            ProgressEvent::Waiting { wait, .. } => {
                tracing::info!(wait_secs = wait.as_secs(), "Waiting for sending quota");
            }
        })
        .await?;

    summary::log_summary(&report);

    if let Some(err) = report.fatal_error() {
        anyhow::bail!("Run aborted: {err}");
    }

    Ok(())
}

/// Resolves to `true` on Ctrl-C or SIGTERM, `false` if no handler could be
/// installed. Messages already handed to the server finish; nothing further
/// is sent.
async fn shutdown_signal() -> bool {
    #[cfg(unix)]
    {
        let Ok(mut terminate) =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        else {
            tracing::error!("Unable to install SIGTERM handler");
            return false;
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl-C, stopping after the current message");
            }
            _ = terminate.recv() => {
                tracing::info!("Received SIGTERM, stopping after the current message");
            }
        }
        true
    }

    #[cfg(not(unix))]
    {
        if tokio::signal::ctrl_c().await.is_err() {
            tracing::error!("Unable to listen for Ctrl-C");
            return false;
        }
        tracing::info!("Received Ctrl-C, stopping after the current message");
        true
    }
}
