use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

use pidash::{ConfigStore, Engine, PngFileSink, YamlConfigStore};

#[derive(Debug, Parser)]
#[command(name = "pidash", version, about = "e-paper image rotation engine")]
struct Args {
    /// Path to YAML config (created on first cursor write if missing)
    #[arg(value_name = "CONFIG")]
    config: PathBuf,
    /// PNG file that stands in for the panel
    #[arg(long, value_name = "FILE", default_value = "pidash.png")]
    output: PathBuf,
    /// Native panel width in pixels
    #[arg(long, default_value_t = 800)]
    width: u32,
    /// Native panel height in pixels
    #[arg(long, default_value_t = 480)]
    height: u32,
    /// Display the current image once and exit
    #[arg(long)]
    once: bool,
    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbosity: u8) {
    let default = match verbosity {
        0 => "info",
        1 => "pidash=debug,info",
        _ => "pidash=trace,debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let Args {
        config,
        output,
        width,
        height,
        once,
        verbose,
    } = Args::parse();
    init_tracing(verbose);

    let store = YamlConfigStore::load(&config)
        .with_context(|| format!("failed to load configuration from {}", config.display()))?;
    tracing::info!("loaded configuration from {}", config.display());
    let store: Arc<dyn ConfigStore> = Arc::new(store);

    let sink = PngFileSink::new(&output, width, height)
        .with_context(|| format!("failed to prepare output {}", output.display()))?;
    tracing::info!(output = %sink.path().display(), width, height, "png sink ready");
    let engine = Arc::new(
        Engine::from_config(store, Box::new(sink)).context("failed to open image catalog")?,
    );

    if once {
        engine.rescan();
        let outcome = engine.refresh_only().context("single refresh failed")?;
        match outcome.name() {
            Some(name) => tracing::info!(name, ?outcome, "single refresh complete"),
            None => tracing::info!("single refresh complete; no images in the catalog"),
        }
        return Ok(());
    }

    let cancel = CancellationToken::new();

    // Ctrl-D/Ctrl-C stop the engine
    if io::stdin().is_terminal() {
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || {
            let mut sink = Vec::new();
            match io::stdin().read_to_end(&mut sink) {
                Ok(_) => tracing::info!("stdin closed; initiating shutdown"),
                Err(err) => tracing::warn!("stdin watcher failed: {err}"),
            }
            cancel.cancel();
        });
    } else {
        tracing::debug!("stdin is not a terminal; skipping shutdown watcher");
    }

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!("ctrl-c handler failed: {err}");
                return;
            }
            tracing::info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        });
    }

    #[cfg(unix)]
    {
        let cancel = cancel.clone();
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            match signal(SignalKind::user_defined1()) {
                Ok(mut sigusr1) => loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        received = sigusr1.recv() => {
                            if received.is_none() {
                                break;
                            }
                            tracing::info!("SIGUSR1 received; triggering refresh");
                            engine.trigger();
                        }
                    }
                },
                Err(err) => tracing::warn!("failed to register SIGUSR1 handler: {err}"),
            }
        });
    }

    engine.start().context("failed to start scheduler")?;
    cancel.cancelled().await;
    engine.stop().await;
    Ok(())
}
