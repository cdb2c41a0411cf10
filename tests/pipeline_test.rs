//! Integration tests for the streaming pipeline

use motion_spectrum_agent::classifier::{LinearModel, LocalClassifier};
use motion_spectrum_agent::config::{ClassifierConfig, Config};
use motion_spectrum_agent::core::ReadinessPolicy;
use motion_spectrum_agent::pipeline::{Pipeline, PipelineEvent, TickOutcome};
use motion_spectrum_agent::source::SyntheticConfig;
use motion_spectrum_agent::stats::create_shared_stats;
use motion_spectrum_agent::{FailureKind, LabelSet, SharedSampleBuffer};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

const WINDOW: usize = 250;
const BINS: usize = WINDOW / 2 + 1;

fn base_config() -> Config {
    Config {
        target_window_size: WINDOW,
        readiness: ReadinessPolicy::Strict,
        labels: LabelSet::new(["still", "moving"]).unwrap(),
        classifier: ClassifierConfig::Local {
            model_path: "unused.json".into(),
        },
        ..Config::default()
    }
}

/// "moving" scores the 1 Hz bin, "still" has a constant bias.
fn motion_model() -> LinearModel {
    let mut moving = vec![0.0; BINS];
    // 1 Hz at 50 Hz over 250 samples.
    moving[5] = 1.0;
    LinearModel::new(vec![vec![0.0; BINS], moving], vec![1.0, 0.0], false).unwrap()
}

fn local_pipeline(readiness: ReadinessPolicy) -> (Pipeline, UnboundedReceiver<PipelineEvent>) {
    let mut config = base_config();
    config.readiness = readiness;
    let classifier =
        LocalClassifier::new(Arc::new(motion_model()), config.labels.clone()).unwrap();
    Pipeline::new(config, Arc::new(classifier), create_shared_stats()).unwrap()
}

fn feed(buffer: &SharedSampleBuffer, motion: &SyntheticConfig, count: u64) {
    for i in 0..count {
        buffer.add_sample(motion.sample_at(i, 1_700_000_000_000));
    }
}

async fn next_event(events: &mut UnboundedReceiver<PipelineEvent>) -> PipelineEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for pipeline event")
        .expect("event channel closed")
}

#[tokio::test]
async fn test_one_hz_motion_classified_as_moving() {
    let (mut pipeline, mut events) = local_pipeline(ReadinessPolicy::Strict);
    feed(&pipeline.buffer(), &SyntheticConfig::default(), WINDOW as u64);

    let outcome = pipeline.tick(1_700_000_005_000).unwrap();
    assert!(matches!(outcome, TickOutcome::Dispatched { samples: WINDOW, .. }));

    match next_event(&mut events).await {
        PipelineEvent::Classified { result, .. } => {
            assert_eq!(result.predicted_label, "moving");
            assert_eq!(result.probabilities.len(), 2);
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn test_resting_device_classified_as_still() {
    let (mut pipeline, mut events) = local_pipeline(ReadinessPolicy::Strict);
    let resting = SyntheticConfig {
        amplitude: 0.0,
        ..SyntheticConfig::default()
    };
    feed(&pipeline.buffer(), &resting, WINDOW as u64);

    pipeline.tick(1_700_000_005_000).unwrap();
    match next_event(&mut events).await {
        PipelineEvent::Classified { result, .. } => assert_eq!(result.predicted_label, "still"),
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn test_partial_buffer_strict_vs_tolerant() {
    let motion = SyntheticConfig::default();

    // 50 of 250 samples from a cold start: both policies wait.
    for policy in [ReadinessPolicy::Strict, ReadinessPolicy::WarmStartTolerant] {
        let (mut pipeline, _events) = local_pipeline(policy);
        feed(&pipeline.buffer(), &motion, 50);
        assert_eq!(
            pipeline.tick(1_700_000_001_000).unwrap(),
            TickOutcome::Skipped {
                available: 50,
                required: WINDOW
            }
        );
    }

    // After one full window, only the tolerant policy accepts a short one.
    let (mut strict, _strict_events) = local_pipeline(ReadinessPolicy::Strict);
    let (mut tolerant, mut tolerant_events) = local_pipeline(ReadinessPolicy::WarmStartTolerant);
    for pipeline in [&mut strict, &mut tolerant] {
        feed(&pipeline.buffer(), &motion, WINDOW as u64);
        pipeline.tick(1_700_000_005_000).unwrap();
        pipeline.buffer().clear();
        feed(&pipeline.buffer(), &motion, 50);
    }
    next_event(&mut tolerant_events).await;

    assert!(matches!(
        strict.tick(1_700_000_007_500).unwrap(),
        TickOutcome::Skipped { available: 50, .. }
    ));
    assert_eq!(
        tolerant.tick(1_700_000_007_500).unwrap(),
        TickOutcome::Dispatched {
            seq: 2,
            samples: 50,
            padded: true
        }
    );
    assert!(matches!(
        next_event(&mut tolerant_events).await,
        PipelineEvent::Classified { seq: 2, .. }
    ));
}

#[test]
fn test_mismatched_model_rejected_at_construction() {
    let config = base_config();
    let short_model =
        LinearModel::new(vec![vec![0.0; 51], vec![0.0; 51]], vec![0.0, 0.0], false).unwrap();
    let classifier = LocalClassifier::new(Arc::new(short_model), config.labels.clone()).unwrap();
    assert!(Pipeline::new(config, Arc::new(classifier), create_shared_stats()).is_err());
}

#[test]
fn test_buffer_bounded_under_sustained_ingestion() {
    let (pipeline, _events) = local_pipeline(ReadinessPolicy::Strict);
    let buffer = pipeline.buffer();
    feed(&buffer, &SyntheticConfig::default(), 5_000);

    // 2 × 5 s at 50 Hz, inclusive of the cutoff sample.
    assert!(buffer.len() <= 501);
    let (oldest, newest) = buffer.with(|b| (b.oldest_timestamp(), b.latest_timestamp()));
    assert!(newest.unwrap() - oldest.unwrap() <= 10_000);
    assert_eq!(buffer.snapshot_latest(1)[0].timestamp, newest.unwrap());
}

#[cfg(feature = "remote")]
mod remote_tests {
    use super::*;
    use axum::{extract::State, routing::get, routing::post, Json, Router};
    use motion_spectrum_agent::classifier::RemoteClassifier;
    use motion_spectrum_agent::config::RemoteConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Copy)]
    enum Behaviour {
        /// First request stalls, later ones answer
        SlowThenOk,
        Malformed,
    }

    struct MockState {
        behaviour: Behaviour,
        calls: AtomicUsize,
    }

    async fn predict(
        State(state): State<Arc<MockState>>,
        Json(body): Json<serde_json::Value>,
    ) -> String {
        let call = state.calls.fetch_add(1, Ordering::SeqCst);
        let len = body["data"].as_array().map_or(0, Vec::len);
        assert_eq!(len, BINS);

        match state.behaviour {
            Behaviour::SlowThenOk if call == 0 => {
                tokio::time::sleep(Duration::from_millis(800)).await;
                "{}".to_string()
            }
            Behaviour::SlowThenOk => serde_json::json!({
                "predicted_index": 1,
                "predicted_class": "moving",
                "probabilities": [0.2, 0.8],
                "names": {"0": "still", "1": "moving"}
            })
            .to_string(),
            Behaviour::Malformed => "<html>not a prediction</html>".to_string(),
        }
    }

    async fn spawn_mock(behaviour: Behaviour) -> String {
        let state = Arc::new(MockState {
            behaviour,
            calls: AtomicUsize::new(0),
        });
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .route("/predict", post(predict))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn remote_pipeline(url: String) -> (Pipeline, UnboundedReceiver<PipelineEvent>) {
        let remote = RemoteConfig::new(url, Duration::from_millis(200));
        let mut config = base_config();
        config.classifier = ClassifierConfig::Remote(remote.clone());
        let classifier = RemoteClassifier::new(remote, config.labels.clone(), BINS).unwrap();
        Pipeline::new(config, Arc::new(classifier), create_shared_stats()).unwrap()
    }

    #[tokio::test]
    async fn test_health_check_against_mock() {
        let url = spawn_mock(Behaviour::Malformed).await;
        let classifier = RemoteClassifier::new(
            RemoteConfig::new(url, Duration::from_secs(1)),
            LabelSet::new(["still", "moving"]).unwrap(),
            BINS,
        )
        .unwrap();
        assert!(classifier.test_connection().await.unwrap());
    }

    #[tokio::test]
    async fn test_timeout_then_recovery() {
        let url = spawn_mock(Behaviour::SlowThenOk).await;
        let (mut pipeline, mut events) = remote_pipeline(url);
        feed(&pipeline.buffer(), &SyntheticConfig::default(), WINDOW as u64);

        pipeline.tick(1_700_000_005_000).unwrap();
        match next_event(&mut events).await {
            PipelineEvent::Failed { seq, kind, .. } => {
                assert_eq!(seq, 1);
                assert_eq!(kind, FailureKind::ClassifierUnavailable);
            }
            other => panic!("unexpected event {other:?}"),
        }

        // The pipeline keeps going on the next tick.
        pipeline.tick(1_700_000_007_500).unwrap();
        match next_event(&mut events).await {
            PipelineEvent::Classified { seq, result, .. } => {
                assert_eq!(seq, 2);
                assert_eq!(result.predicted_label, "moving");
            }
            other => panic!("unexpected event {other:?}"),
        }

        let stats = pipeline.stats().snapshot();
        assert_eq!(stats.classifications_failed, 1);
        assert_eq!(stats.classifications_succeeded, 1);
    }

    #[tokio::test]
    async fn test_malformed_response_reported() {
        let url = spawn_mock(Behaviour::Malformed).await;
        let (mut pipeline, mut events) = remote_pipeline(url);
        feed(&pipeline.buffer(), &SyntheticConfig::default(), WINDOW as u64);

        pipeline.tick(1_700_000_005_000).unwrap();
        match next_event(&mut events).await {
            PipelineEvent::Failed { kind, .. } => assert_eq!(kind, FailureKind::MalformedResponse),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_unavailable() {
        // Nothing listens on the discard port.
        let (mut pipeline, mut events) = remote_pipeline("http://127.0.0.1:9".to_string());
        feed(&pipeline.buffer(), &SyntheticConfig::default(), WINDOW as u64);

        pipeline.tick(1_700_000_005_000).unwrap();
        match next_event(&mut events).await {
            PipelineEvent::Failed { kind, .. } => {
                assert_eq!(kind, FailureKind::ClassifierUnavailable)
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
