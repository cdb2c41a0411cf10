//! Demonstration of the streaming classification pipeline.
//!
//! This example shows how to:
//! 1. Start a synthetic accelerometer source
//! 2. Drain it into the pipeline's sample buffer
//! 3. Classify windows with an in-process linear model
//! 4. Consume classification events
//!
//! Run with: cargo run --example stream_demo

use std::sync::Arc;
use std::time::Duration;

use motion_spectrum_agent::{
    classifier::{LinearModel, LocalClassifier},
    config::{ClassifierConfig, Config},
    pipeline::{spawn_ingestion, Pipeline, PipelineEvent},
    source::{SyntheticConfig, SyntheticSource},
    stats::create_shared_stats,
    LabelSet,
};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    println!("Motion Spectrum Agent - Stream Demo");
    println!("===================================");
    println!();

    let config = Config {
        labels: LabelSet::new(["still", "moving"])?,
        classifier: ClassifierConfig::Local {
            model_path: "in-memory".into(),
        },
        ..Config::default()
    };

    // Score energy between 0.6 and 3 Hz as movement.
    let bins = config.spectrum_len();
    let bin_hz = config.sample_rate_hz / config.target_window_size as f64;
    let moving: Vec<f32> = (0..bins)
        .map(|k| {
            let f = k as f64 * bin_hz;
            if (0.6..=3.0).contains(&f) {
                0.01
            } else {
                0.0
            }
        })
        .collect();
    let model = LinearModel::new(vec![vec![0.0; bins], moving], vec![0.5, 0.0], true)?;
    let classifier = LocalClassifier::new(Arc::new(model), config.labels.clone())?;

    let stats = create_shared_stats();
    let (mut pipeline, mut events) = Pipeline::new(config, Arc::new(classifier), stats.clone())?;

    let mut source = SyntheticSource::new(SyntheticConfig::default());
    source.start()?;

    let cancel = CancellationToken::new();
    let ingestion = spawn_ingestion(
        source.receiver().clone(),
        pipeline.buffer(),
        stats.clone(),
        cancel.clone(),
    );

    let stopper = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(15)).await;
        stopper.cancel();
    });

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                PipelineEvent::Classified { seq, result, .. } => {
                    println!("Window #{seq}: {result}");
                    for (label, p) in &result.probabilities {
                        println!("    {label:<8} {p:.3}");
                    }
                }
                PipelineEvent::Failed { seq, error, .. } => println!("Window #{seq} failed: {error}"),
                PipelineEvent::Abandoned { seq } => println!("Window #{seq} abandoned"),
            }
        }
    });

    println!("Collecting for 15 seconds (first window after 5 s)...");
    println!();
    pipeline.run(cancel).await;

    source.stop();
    let _ = ingestion.join();
    drop(pipeline);
    let _ = printer.await;

    println!();
    println!("{}", stats.summary());
    Ok(())
}
