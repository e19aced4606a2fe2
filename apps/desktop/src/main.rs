use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use client_core::{
    HttpTransport, JsonFileStore, LiveView, PfodMenuTranslator, Viewer, ViewerCommand,
    ViewerEvent,
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::{self, error::RecvError},
};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

#[derive(Parser, Debug)]
struct Args {
    /// Drawing endpoint, e.g. http://192.168.1.100/pfodWeb
    #[arg(long)]
    base_url: Option<String>,
    /// Device address; overrides the base url when it is a valid IPv4 address.
    #[arg(long)]
    target_ip: Option<String>,
    #[arg(long)]
    state_file: Option<std::path::PathBuf>,
    #[arg(long)]
    log_filter: Option<String>,
}

impl Args {
    fn apply(self, settings: &mut config::Settings) {
        if let Some(v) = self.base_url {
            settings.base_url = v;
        }
        if let Some(v) = self.target_ip {
            settings.target_ip = Some(v);
        }
        if let Some(v) = self.state_file {
            settings.state_file = v;
        }
        if let Some(v) = self.log_filter {
            settings.log_filter = v;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut settings = config::load_settings();
    Args::parse().apply(&mut settings);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_filter.as_str()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let viewer_config = config::viewer_config(&settings)?;
    let store = JsonFileStore::open(&settings.state_file)
        .with_context(|| format!("failed to open state file {}", settings.state_file.display()))?;
    info!(base_url = %viewer_config.base_url, state_file = %settings.state_file.display(), "starting viewer");

    let viewer = Viewer::new_with_dependencies(
        viewer_config,
        Arc::new(HttpTransport::new()),
        Box::new(PfodMenuTranslator),
        Box::new(store),
    );
    let reporter = tokio::spawn(report_events(viewer.subscribe_events(), viewer.live_view()));
    let (control, handle) = viewer.spawn();

    control.send(ViewerCommand::Start).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match commands::parse_command(&line) {
            Ok(Some(command)) => {
                let quit = command == ViewerCommand::Shutdown;
                if control.send(command).await.is_err() || quit {
                    break;
                }
            }
            Ok(None) => {}
            Err(err) => warn!(error = %err, "ignoring command"),
        }
    }

    drop(control);
    handle.await.context("viewer task panicked")??;
    reporter.abort();
    Ok(())
}

/// Logs each published snapshot; stands in for a renderer.
async fn report_events(mut events: broadcast::Receiver<ViewerEvent>, live: LiveView) {
    loop {
        match events.recv().await {
            Ok(ViewerEvent::Published { session, primary }) => {
                let registry = live.load();
                let merged = registry.merged();
                info!(
                    ?session,
                    primary = primary.as_deref().unwrap_or("-"),
                    drawings = registry.len(),
                    unindexed = merged.unindexed.len(),
                    indexed = merged.indexed.len(),
                    touch_zones = merged.touch_zones.len(),
                    "drawing updated"
                );
            }
            Ok(ViewerEvent::Redraw) => debug!("redraw"),
            Ok(ViewerEvent::SessionAbandoned { kind, discarded }) => {
                info!(?kind, discarded, "update abandoned")
            }
            Ok(ViewerEvent::Failed(failure)) => {
                error!(kind = ?failure.kind, "{}", failure.message)
            }
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "event stream lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}
