//! Integration tests for Runtime lifecycle and builder components.
//!
//! These tests verify the behavioral contracts of the oracle runtime:
//! - Builder configuration validation and error handling
//! - Configured rounds use only enabled providers
//! - Shutdown drains the effect worker and notifies every receiver
//!
//! Tests use realistic timing with `tokio::time::timeout` to prevent hanging on failures.

use crate::mock_infrastructure::{RecordingTransport, ScriptedEffectHandler};
use oracle_core::{
    aggregation::{Action, OracleEvent},
    config::{AppConfig, ProviderConfig},
    metrics::MetricsCollector,
    runtime::{OracleRuntimeBuilder, RuntimeError},
};
use std::sync::Arc;
use tokio::time::{timeout, Duration};

fn provider(name: &str, enabled: bool) -> ProviderConfig {
    ProviderConfig {
        name: name.to_string(),
        endpoint: format!("mock://{name}"),
        enabled,
    }
}

/// Four providers, one of them disabled, quorum 2.
fn create_test_runtime_config() -> AppConfig {
    let mut config = AppConfig {
        providers: vec![
            provider("alpha", true),
            provider("beta", true),
            provider("gamma", false),
            provider("delta", true),
        ],
        ..Default::default()
    };
    config.engine.default_quorum_threshold = 2;
    config
}

#[tokio::test]
async fn test_builder_rejects_missing_transport() {
    let result = OracleRuntimeBuilder::new().with_config(create_test_runtime_config()).build();
    assert!(matches!(result, Err(RuntimeError::MissingTransport)));
}

#[tokio::test]
async fn test_builder_rejects_quorum_above_enabled_providers() {
    let mut config = create_test_runtime_config();
    config.engine.default_quorum_threshold = 4;

    let result = OracleRuntimeBuilder::new()
        .with_config(config)
        .with_transport(Arc::new(RecordingTransport::new()))
        .build();

    match result {
        Err(RuntimeError::ConfigValidation(msg)) => assert!(msg.contains("quorum")),
        other => panic!("expected validation error, got {:?}", other.err()),
    }
}

#[tokio::test]
async fn test_builder_rejects_duplicate_provider_names() {
    let mut config = create_test_runtime_config();
    config.providers.push(provider("alpha", true));

    let result = OracleRuntimeBuilder::new()
        .with_config(config)
        .with_transport(Arc::new(RecordingTransport::new()))
        .build();

    assert!(matches!(result, Err(RuntimeError::ConfigValidation(msg)) if msg.contains("alpha")));
}

#[tokio::test]
async fn test_configured_round_skips_disabled_providers() {
    let transport = Arc::new(RecordingTransport::new());
    let runtime = OracleRuntimeBuilder::new()
        .with_config(create_test_runtime_config())
        .with_transport(transport.clone())
        .build()
        .unwrap();

    let round_id = runtime.start_configured_round(serde_json::json!({"pair": "BTC/USD"}), None).unwrap();

    let names: Vec<_> = transport
        .round_queries(round_id)
        .into_iter()
        .map(|q| q.provider.name.to_string())
        .collect();
    assert_eq!(names, vec!["alpha", "beta", "delta"]);

    let snapshot = runtime.engine().round_snapshot(round_id).unwrap();
    assert_eq!(snapshot.expected_count, 3);
    assert_eq!(snapshot.quorum_threshold, 2);

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_full_round_through_runtime() {
    let transport = Arc::new(RecordingTransport::new());
    let handler = Arc::new(ScriptedEffectHandler::new());
    let runtime = OracleRuntimeBuilder::new()
        .with_config(create_test_runtime_config())
        .with_transport(transport.clone())
        .with_effect_handler(handler.clone())
        .build()
        .unwrap();
    let mut events = runtime.subscribe();

    let round_id = runtime
        .start_configured_round(
            serde_json::json!({"pair": "BTC/USD"}),
            Some(Action::new("publish", serde_json::json!({"feed": "btc"}))),
        )
        .unwrap();
    for (request_id, value) in transport.request_ids(round_id).into_iter().zip([300u128, 100, 200]) {
        runtime.engine().deliver_response(request_id, value).unwrap();
    }

    let succeeded = timeout(Duration::from_secs(2), async {
        loop {
            if let Ok(OracleEvent::ActionSucceeded { round_id }) = events.recv().await {
                break round_id;
            }
        }
    })
    .await
    .unwrap();

    assert_eq!(succeeded, round_id);
    // finalized on the first two answers
    assert_eq!(runtime.engine().current_value(), 200);
    assert_eq!(handler.call_count(), 1);
    assert_eq!(handler.calls()[0].target, "publish");

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_notifies_all_receivers() {
    let runtime = OracleRuntimeBuilder::new()
        .with_config(create_test_runtime_config())
        .with_transport(Arc::new(RecordingTransport::new()))
        .build()
        .unwrap();

    let mut receivers: Vec<_> = (0..3).map(|_| runtime.shutdown_receiver()).collect();

    timeout(Duration::from_secs(1), runtime.shutdown()).await.unwrap();

    for rx in &mut receivers {
        assert!(timeout(Duration::from_millis(100), rx.recv()).await.unwrap().is_ok());
    }
}

#[tokio::test]
async fn test_shared_metrics_collector() {
    let metrics = Arc::new(MetricsCollector::new());
    let transport = Arc::new(RecordingTransport::new());
    let runtime = OracleRuntimeBuilder::new()
        .with_config(create_test_runtime_config())
        .with_transport(transport.clone())
        .with_metrics(Arc::clone(&metrics))
        .build()
        .unwrap();

    runtime.start_configured_round(serde_json::Value::Null, None).unwrap();
    runtime.start_configured_round(serde_json::Value::Null, None).unwrap();

    assert_eq!(metrics.summary().rounds_started, 2);
    assert!(Arc::ptr_eq(runtime.metrics_collector(), &metrics));
    assert!(metrics.render().contains("oracle_rounds_started_total"));

    runtime.shutdown().await;
}
