use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use earwatch::audio::{ReplayConfig, WavReplaySource};
use earwatch::detect::{EnergyDetector, EnergyDetectorConfig};
use earwatch::{Config, Engine};

/// Replays a WAV file through the detection pipeline and writes one feature
/// segment per confirmed acoustic event.
#[derive(Parser, Debug)]
#[command(name = "earwatch", version, about)]
struct Cli {
    /// WAV file to process.
    wav: PathBuf,

    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the segment output directory.
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Pace chunk delivery at real time instead of processing flat out.
    #[arg(long)]
    realtime: bool,

    /// Restart the WAV from the beginning when it ends.
    #[arg(long = "loop")]
    loop_input: bool,

    /// Enable debug logging (RUST_LOG overrides this).
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let mut config = match &cli.config {
        Some(path) => {
            Config::load(path).with_context(|| format!("loading config {}", path.display()))?
        }
        None => Config::default(),
    }
    .with_env_overrides();
    if let Some(dir) = cli.out_dir {
        config.segment.out_dir = dir;
    }
    config.validate()?;

    let mut source = WavReplaySource::new(
        &cli.wav,
        ReplayConfig {
            chunk_ms: config.audio.chunk_ms,
            loop_input: cli.loop_input,
            realtime: cli.realtime,
        },
    );

    let detector = EnergyDetector::new(EnergyDetectorConfig::default());
    let mut engine = Engine::new(&config, Box::new(detector))?;
    let bus = engine.bus();

    info!(
        wav = %cli.wav.display(),
        out_dir = %config.segment.out_dir.display(),
        "starting pipeline"
    );

    let running = Arc::new(AtomicBool::new(true));
    let (tx, rx) = crossbeam_channel::unbounded();
    let engine_running = Arc::clone(&running);
    let engine_thread = thread::spawn(move || engine.run(&mut source, &engine_running, &tx));

    // The engine owns the hot path; this thread just reports results.
    let mut last_state = None;
    loop {
        match rx.recv_timeout(Duration::from_millis(200)) {
            Ok(segment) => {
                if segment.persisted {
                    println!(
                        "segment {} ({} frames, {:.2}s event)",
                        segment.path.display(),
                        segment.frames,
                        (segment.t_end_ns - segment.t_start_ns) as f64 / 1e9,
                    );
                } else {
                    eprintln!("segment write failed: {}", segment.path.display());
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                if let Some(snapshot) = bus.latest() {
                    let state = snapshot.state;
                    if last_state != Some(state) {
                        info!(state = %state, p = snapshot.probability, "state change");
                        last_state = Some(state);
                    }
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }
    }

    match engine_thread.join() {
        Ok(result) => result?,
        Err(_) => anyhow::bail!("engine thread panicked"),
    }
    info!("pipeline finished");
    Ok(())
}
