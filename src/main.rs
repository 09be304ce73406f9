//! Application entry point — cameron-client.
//!
//! # Startup sequence
//!
//! 1. Parse the command line.
//! 2. Initialise logging.
//! 3. Load [`AppConfig`] (returns default on first run) and apply overrides.
//! 4. Create a current-thread [`tokio`] runtime.
//! 5. Open the speaker output and install it into an [`OutputSlot`].
//! 6. Build the [`Session`], connect, and start microphone capture.
//! 7. Run until Ctrl-C, then close the connection and log the statistics.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use cameron_client::{
    audio::{CpalBackend, OutputSlot, SpeakerOutput},
    config::AppConfig,
    connection::WsConnector,
    pipeline::{LogSink, Session},
};

/// Upper bound on waiting for the connection to close on exit.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

/// Stream the microphone to a voice service and play back its replies.
#[derive(Debug, Parser)]
#[command(name = "cameron-client", version, about)]
struct Args {
    /// Settings file (defaults to the platform config directory).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Service address, overriding `server.host`.
    #[arg(long, value_name = "HOST:PORT")]
    host: Option<String>,

    /// Do not capture the microphone.
    #[arg(long)]
    no_capture: bool,

    /// Do not play synthesized audio.
    #[arg(long)]
    no_playback: bool,
}

impl Args {
    fn load_config(&self) -> Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::load_from(path)?,
            None => AppConfig::load().unwrap_or_else(|e| {
                log::warn!("Failed to load config ({e:#}); using defaults");
                AppConfig::default()
            }),
        };

        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if self.no_capture {
            config.audio.capture_enabled = false;
        }
        if self.no_playback {
            config.audio.playback_enabled = false;
        }
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let args = Args::parse();

    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("cameron-client starting up");

    // 2. Configuration
    let config = args.load_config()?;
    log::info!("service endpoint: {}", config.endpoint_url());

    // 3. Single-threaded runtime; device callbacks live on cpal's threads.
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    rt.block_on(run(config))
}

async fn run(config: AppConfig) -> Result<()> {
    // 4. Output context
    let output = if config.audio.playback_enabled {
        let slot = OutputSlot::new();
        match SpeakerOutput::open(config.audio.output_device.clone()) {
            Ok(speaker) => slot.install(Arc::new(speaker)),
            // The queue stays alive and discards clips until an output exists.
            Err(e) => log::warn!("Audio output unavailable: {e}"),
        }
        Some(slot)
    } else {
        log::info!("playback disabled");
        None
    };

    // 5. Session
    let mut session = Session::new(
        &config,
        Arc::new(WsConnector),
        output.clone(),
        Arc::new(LogSink),
    );
    session.connect();

    // 6. Capture
    let capture = if config.audio.capture_enabled {
        session.start_capture(&CpalBackend::new(config.audio.input_device.clone()))
    } else {
        log::info!("capture disabled");
        None
    };

    // 7. Run until Ctrl-C, then close without reconnecting
    session.run_until(shutdown_signal()).await;
    let stats = match tokio::time::timeout(SHUTDOWN_TIMEOUT, session.close()).await {
        Ok(stats) => stats,
        Err(_) => {
            log::warn!("connection did not close within {SHUTDOWN_TIMEOUT:?}");
            session.stats()
        }
    };

    if let Some(stream) = capture {
        stream.stop();
    }
    if let Some(slot) = output {
        slot.teardown();
    }

    log::info!("session summary: {}", stats.summary());
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    log::info!("Ctrl-C received, shutting down");
}
