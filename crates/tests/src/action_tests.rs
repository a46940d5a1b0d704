//! Integration tests for follow-up actions.
//!
//! An action queued with a round must run at most once, only after the round
//! finalizes, and only through the effect worker. These tests run the worker
//! for real against a [`ScriptedEffectHandler`].

use crate::mock_infrastructure::{
    create_engine, deliver_all, drain_events, providers, EffectCall, ScriptedEffectHandler,
};
use oracle_core::aggregation::{
    Action, ActionId, ActionState, EffectError, OracleEvent, RoundId, RoundRequest,
};
use oracle_core::runtime::EffectWorker;
use serde_json::json;
use std::{sync::Arc, time::Duration};
use tokio::{sync::broadcast, time::timeout};

fn settle(round: u64) -> Action {
    Action::new("settle", json!({ "round": round }))
}

async fn next_action_event(events: &mut broadcast::Receiver<OracleEvent>) -> OracleEvent {
    timeout(Duration::from_secs(2), async {
        loop {
            match events.recv().await {
                Ok(event @ (OracleEvent::ActionSucceeded { .. } | OracleEvent::ActionFailed { .. })) => {
                    break event;
                }
                Ok(_) => {}
                Err(e) => panic!("event stream failed: {e}"),
            }
        }
    })
    .await
    .expect("no action outcome within 2s")
}

#[tokio::test]
async fn test_action_performed_once_after_finalization() {
    let (engine, transport, effects) = create_engine();
    let handler = Arc::new(ScriptedEffectHandler::new());
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let worker = EffectWorker::new(Arc::clone(&engine), handler.clone(), Duration::from_secs(1))
        .start_with_shutdown(effects, shutdown_rx);
    let mut events = engine.subscribe();

    let round_id =
        engine.start_round(RoundRequest::new(providers(5), 3).with_action(settle(1))).unwrap();
    let action_id = ActionId::new(1);
    assert_eq!(engine.action(action_id).unwrap().state, ActionState::Queued);

    deliver_all(&engine, &transport, round_id, &[1, 2, 3, 4, 5]);

    let outcome = next_action_event(&mut events).await;
    assert_eq!(outcome, OracleEvent::ActionSucceeded { round_id });
    assert_eq!(
        handler.calls(),
        vec![EffectCall { target: "settle".to_string(), payload: json!({ "round": 1 }) }]
    );
    assert!(engine.action(action_id).is_none(), "executed actions are retired");
    assert_eq!(engine.metrics().summary().actions_succeeded, 1);

    shutdown_tx.send(()).unwrap();
    worker.await.unwrap();
    assert_eq!(handler.call_count(), 1);
}

#[tokio::test]
async fn test_failed_action_is_retained_for_inspection() {
    let (engine, transport, effects) = create_engine();
    let handler = Arc::new(ScriptedEffectHandler::with_outcomes([Err(EffectError::Rejected(
        "insufficient balance".to_string(),
    ))]));
    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let _worker = EffectWorker::new(Arc::clone(&engine), handler.clone(), Duration::from_secs(1))
        .start_with_shutdown(effects, shutdown_rx);
    let mut events = engine.subscribe();

    let round_id =
        engine.start_round(RoundRequest::new(providers(3), 2).with_action(settle(1))).unwrap();
    deliver_all(&engine, &transport, round_id, &[40, 50]);

    match next_action_event(&mut events).await {
        OracleEvent::ActionFailed { round_id: failed_round, reason } => {
            assert_eq!(failed_round, round_id);
            assert!(reason.contains("insufficient balance"));
        }
        other => panic!("expected failure, got {other:?}"),
    }

    // the answer stands regardless of the effect outcome
    assert_eq!(engine.current_value(), 45);

    let failed = engine.failed_actions();
    assert_eq!(failed.len(), 1);
    let (action_id, record) = &failed[0];
    assert!(!record.executed);
    assert!(matches!(record.state, ActionState::Failed { .. }));

    assert!(engine.take_failed_action(*action_id).is_some());
    assert!(engine.failed_actions().is_empty());

    // the last response neither refires nor resurrects the action
    engine.deliver_response(transport.request_ids(round_id)[2], 60).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(handler.call_count(), 1);
}

#[tokio::test]
async fn test_slow_effect_times_out() {
    let (engine, transport, effects) = create_engine();
    let handler = Arc::new(ScriptedEffectHandler::new().with_delay(Duration::from_secs(5)));
    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let _worker = EffectWorker::new(Arc::clone(&engine), handler, Duration::from_millis(50))
        .start_with_shutdown(effects, shutdown_rx);
    let mut events = engine.subscribe();

    let round_id =
        engine.start_round(RoundRequest::new(providers(1), 1).with_action(settle(1))).unwrap();
    deliver_all(&engine, &transport, round_id, &[9]);

    match next_action_event(&mut events).await {
        OracleEvent::ActionFailed { reason, .. } => {
            assert_eq!(reason, EffectError::Timeout.to_string());
        }
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn test_action_of_stale_round_never_fires() {
    let (engine, transport, mut effects) = create_engine();

    let older =
        engine.start_round(RoundRequest::new(providers(2), 2).with_action(settle(1))).unwrap();
    let newer = engine.start_round(RoundRequest::new(providers(1), 1)).unwrap();
    let mut events = engine.subscribe();

    deliver_all(&engine, &transport, newer, &[10]);
    deliver_all(&engine, &transport, older, &[1, 2]);

    assert!(effects.try_recv().is_err(), "nothing reached the effect queue");
    assert!(engine.action(ActionId::new(1)).is_none(), "discarded with its round");
    assert_eq!(engine.stats().pending_actions, 0);

    let events = drain_events(&mut events);
    assert!(events.iter().all(|e| !matches!(
        e,
        OracleEvent::ActionSucceeded { .. } | OracleEvent::ActionFailed { .. }
    )));
    assert!(events.contains(&OracleEvent::RoundPurged { round_id: older, finalized: false }));
}

#[tokio::test]
async fn test_worker_drains_queued_effects_on_shutdown() {
    let (engine, transport, effects) = create_engine();

    for n in 1..=3 {
        let round_id =
            engine.start_round(RoundRequest::new(providers(1), 1).with_action(settle(n))).unwrap();
        deliver_all(&engine, &transport, round_id, &[u128::from(n)]);
    }
    assert_eq!(engine.stats().pending_actions, 3);

    let handler = Arc::new(ScriptedEffectHandler::new());
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    shutdown_tx.send(()).unwrap();
    let worker = EffectWorker::new(Arc::clone(&engine), handler.clone(), Duration::from_secs(1))
        .start_with_shutdown(effects, shutdown_rx);

    timeout(Duration::from_secs(2), worker).await.unwrap().unwrap();

    let rounds: Vec<_> = handler.calls().into_iter().map(|call| call.payload["round"].clone()).collect();
    assert_eq!(rounds, vec![json!(1), json!(2), json!(3)]);
    assert_eq!(engine.stats().pending_actions, 0);
    assert_eq!(engine.latest_finalized_round(), RoundId::new(3));
}

#[tokio::test]
async fn test_dropped_worker_fails_action_immediately() {
    let (engine, transport, effects) = create_engine();
    drop(effects);

    let round_id =
        engine.start_round(RoundRequest::new(providers(1), 1).with_action(settle(1))).unwrap();
    deliver_all(&engine, &transport, round_id, &[5]);

    let failed = engine.failed_actions();
    assert_eq!(failed.len(), 1);
    assert_eq!(
        failed[0].1.state,
        ActionState::Failed { reason: EffectError::WorkerUnavailable.to_string() }
    );
    assert_eq!(engine.current_value(), 5);
}
