//! Motion Spectrum Agent CLI
//!
//! Streams accelerometer samples through windowing, spectral features and a
//! classifier.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use motion_spectrum_agent::{
    config::{ClassifierConfig, Config, RemoteConfig},
    core::{segment, FeatureExtractor, ReadinessPolicy},
    pipeline::{build_classifier, spawn_ingestion, Pipeline, PipelineEvent},
    source::{load_recording, ReplaySource, SyntheticConfig, SyntheticSource},
    stats::create_shared_stats_with_persistence,
    VERSION,
};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "motion-spectrum")]
#[command(version = VERSION)]
#[command(about = "Streaming accelerometer activity classification", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the live pipeline
    Run {
        /// Replay a recorded session instead of the synthetic source
        #[arg(long)]
        recording: Option<PathBuf>,

        /// Frequency of the synthetic motion in Hz
        #[arg(long, default_value = "1.0")]
        motion_hz: f64,

        /// Use a local JSON model instead of the configured classifier
        #[arg(long, conflicts_with = "remote_url")]
        model: Option<PathBuf>,

        /// Use a remote endpoint instead of the configured classifier
        #[arg(long)]
        remote_url: Option<String>,

        /// Remote request timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Emit zero-padded windows once the first full window has been seen
        #[arg(long)]
        tolerant: bool,
    },

    /// Extract spectra from a recording as JSON lines
    Extract {
        /// Recording in `time,x,y,z` CSV format
        recording: PathBuf,

        /// Output file (stdout if omitted)
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Fraction of overlap between consecutive windows
        #[arg(long, default_value = "0.5")]
        overlap: f64,
    },

    /// Show configuration
    Config,

    /// Show cumulative statistics
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            recording,
            motion_hz,
            model,
            remote_url,
            timeout_ms,
            tolerant,
        } => {
            let mut config = Config::load().context("Failed to load configuration")?;
            if let Some(model_path) = model {
                config.classifier = ClassifierConfig::Local { model_path };
            }
            if let Some(url) = remote_url {
                config.classifier = ClassifierConfig::Remote(RemoteConfig {
                    url,
                    ..RemoteConfig::default()
                });
            }
            if let (Some(ms), ClassifierConfig::Remote(remote)) =
                (timeout_ms, &mut config.classifier)
            {
                remote.timeout = Duration::from_millis(ms);
            }
            if tolerant {
                config.readiness = ReadinessPolicy::WarmStartTolerant;
            }
            cmd_run(config, recording, motion_hz).await
        }
        Commands::Extract {
            recording,
            output,
            overlap,
        } => cmd_extract(&recording, output, overlap),
        Commands::Config => cmd_config(),
        Commands::Status => cmd_status(),
    }
}

/// Owns whichever source feeds the pipeline so it can be stopped on exit.
enum RunningSource {
    Synthetic(SyntheticSource),
    Replay(ReplaySource),
}

impl RunningSource {
    fn stop(&mut self) {
        match self {
            RunningSource::Synthetic(source) => source.stop(),
            RunningSource::Replay(source) => source.stop(),
        }
    }
}

async fn cmd_run(config: Config, recording: Option<PathBuf>, motion_hz: f64) -> Result<()> {
    println!("Motion Spectrum Agent v{VERSION}");
    println!();

    config.validate().context("Invalid configuration")?;
    if let Err(e) = config.ensure_directories() {
        tracing::warn!(error = %e, "Could not create data directory");
    }

    let stats = create_shared_stats_with_persistence(config.data_path.join("stats.json"));
    let classifier = build_classifier(&config).context("Failed to set up classifier")?;

    println!("  Classifier: {}", classifier.name());
    println!("  Window: {} samples @ {} Hz", config.target_window_size, config.sample_rate_hz);
    println!("  Tick period: {:?}", config.tick_period);
    println!("  Readiness: {:?}", config.readiness);

    let tick_period = config.tick_period;
    let sample_rate_hz = config.sample_rate_hz;
    let (mut pipeline, mut events) = Pipeline::new(config, classifier, stats.clone())?;
    println!("  Instance ID: {}", pipeline.instance_id());

    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || handler_token.cancel()).context("Error setting Ctrl+C handler")?;

    let (mut source, receiver) = match recording {
        Some(path) => {
            let samples = load_recording(&path)
                .with_context(|| format!("Failed to load recording {}", path.display()))?;
            let span_ms = match (samples.first(), samples.last()) {
                (Some(first), Some(last)) => (last.timestamp - first.timestamp).max(0) as u64,
                _ => 0,
            };
            println!("  Source: replay of {} ({} samples)", path.display(), samples.len());

            // Stop one tick after the recording has been played back.
            let done = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(span_ms) + tick_period).await;
                done.cancel();
            });

            let mut replay = ReplaySource::new(samples);
            replay.start()?;
            let receiver = replay.receiver().clone();
            (RunningSource::Replay(replay), receiver)
        }
        None => {
            let mut synthetic = SyntheticSource::new(SyntheticConfig {
                sample_rate_hz,
                motion_hz,
                ..SyntheticConfig::default()
            });
            synthetic.start()?;
            println!("  Source: synthetic {motion_hz} Hz motion");
            let receiver = synthetic.receiver().clone();
            (RunningSource::Synthetic(synthetic), receiver)
        }
    };

    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let ingestion = spawn_ingestion(receiver, pipeline.buffer(), stats.clone(), cancel.clone());

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let now = chrono::Local::now().format("%H:%M:%S");
            match event {
                PipelineEvent::Classified { seq, result, .. } => {
                    println!("[{now}] #{seq} {result}");
                }
                PipelineEvent::Failed { seq, kind, error } => {
                    println!("[{now}] #{seq} failed ({kind:?}): {error}");
                }
                PipelineEvent::Abandoned { seq } => {
                    println!("[{now}] #{seq} abandoned");
                }
            }
        }
    });

    pipeline.run(cancel.clone()).await;

    source.stop();
    if ingestion.join().is_err() {
        tracing::warn!("Ingestion thread panicked");
    }
    drop(pipeline);
    let _ = printer.await;

    println!();
    println!("{}", stats.summary());
    Ok(())
}

#[derive(Serialize)]
struct SpectrumRecord {
    start: Option<i64>,
    end: Option<i64>,
    spectrum: Vec<f64>,
}

fn cmd_extract(recording: &Path, output: Option<PathBuf>, overlap: f64) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    let samples = load_recording(recording)
        .with_context(|| format!("Failed to load recording {}", recording.display()))?;
    let extractor = FeatureExtractor::new(config.filter.build()?);
    let windows = segment(
        &samples,
        config.target_window_size,
        overlap,
        config.sample_rate_hz,
    );

    let mut writer: Box<dyn Write> = match output {
        Some(ref path) => Box::new(std::io::BufWriter::new(
            std::fs::File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => Box::new(std::io::stdout().lock()),
    };

    for window in &windows {
        let spectrum = extractor.extract(window)?;
        let record = SpectrumRecord {
            start: window.start_time(),
            end: window.end_time(),
            spectrum: spectrum.values,
        };
        serde_json::to_writer(&mut writer, &record)?;
        writeln!(writer)?;
    }
    writer.flush()?;

    tracing::info!(
        windows = windows.len(),
        samples = samples.len(),
        "Extraction complete"
    );
    Ok(())
}

fn cmd_config() -> Result<()> {
    let config = Config::load().unwrap_or_default();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn cmd_status() -> Result<()> {
    let config = Config::load().unwrap_or_default();

    println!("Motion Spectrum Agent Status");
    println!("============================");
    println!();
    println!("Configuration:");
    match config.classifier {
        ClassifierConfig::Local { ref model_path } => {
            println!("  Classifier: local ({})", model_path.display());
        }
        ClassifierConfig::Remote(ref remote) => {
            println!("  Classifier: remote ({}, timeout {:?})", remote.url, remote.timeout);
        }
    }
    println!("  Window: {} samples", config.target_window_size);
    println!("  Readiness: {:?}", config.readiness);
    println!();

    let stats_path = config.data_path.join("stats.json");
    if stats_path.exists() {
        let stats = motion_spectrum_agent::stats::PipelineStats::with_persistence(stats_path);
        let snapshot = stats.snapshot();
        println!("Cumulative Statistics:");
        println!("  Samples ingested: {}", snapshot.samples_ingested);
        println!("  Windows built: {}", snapshot.windows_built);
        println!("  Ticks skipped: {}", snapshot.ticks_skipped);
        println!(
            "  Classifications: {} ok, {} failed, {} abandoned",
            snapshot.classifications_succeeded,
            snapshot.classifications_failed,
            snapshot.classifications_abandoned
        );
    } else {
        println!("No previous session data found.");
    }
    Ok(())
}
