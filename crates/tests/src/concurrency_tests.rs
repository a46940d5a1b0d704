//! Concurrency tests.
//!
//! Responses race each other across worker threads. Whatever the interleaving,
//! a round finalizes at most once, the canonical answer only moves forward and
//! an action is performed at most once.

use crate::mock_infrastructure::{create_engine, providers, start_round, ScriptedEffectHandler};
use futures_util::future::join_all;
use oracle_core::{
    aggregation::{Action, ExpiryProof, OracleEvent, RoundId, RoundRequest},
    runtime::EffectWorker,
};
use rand::seq::SliceRandom;
use std::{collections::HashSet, sync::Arc, time::Duration};
use tokio::sync::{broadcast, Barrier};

fn answers(events: &mut broadcast::Receiver<OracleEvent>) -> Vec<(RoundId, u128)> {
    let mut updates = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let OracleEvent::AnswerUpdated { value, round_id, .. } = event {
            updates.push((round_id, value));
        }
    }
    updates
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_racing_responses_finalize_exactly_once() {
    let (engine, transport, _effects) = create_engine();
    let round_id = start_round(&engine, 45, 23);
    let mut events = engine.subscribe();
    let barrier = Arc::new(Barrier::new(45));

    let tasks = transport.request_ids(round_id).into_iter().enumerate().map(|(i, request_id)| {
        let engine = Arc::clone(&engine);
        let barrier = Arc::clone(&barrier);
        tokio::spawn(async move {
            barrier.wait().await;
            engine.deliver_response(request_id, 1_000 + i as u128)
        })
    });

    for result in join_all(tasks).await {
        assert!(result.unwrap().is_ok());
    }

    let updates = answers(&mut events);
    assert_eq!(updates.len(), 1, "one finalization per round");
    let (finalized_round, value) = updates[0];
    assert_eq!(finalized_round, round_id);
    assert!((1_000..1_045).contains(&value));
    assert_eq!(engine.current_value(), value);
    assert_eq!(engine.answer_for(round_id).unwrap().value, value);
    assert_eq!(engine.stats().open_rounds, 0);
    assert_eq!(engine.metrics().summary().answers_finalized, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_many_rounds_answer_only_moves_forward() {
    let (engine, transport, _effects) = create_engine();
    let mut events = engine.subscribe();

    let round_ids: Vec<_> = (0..50).map(|_| start_round(&engine, 5, 3)).collect();
    let mut deliveries: Vec<_> = round_ids
        .iter()
        .flat_map(|round_id| {
            let value = u128::from(round_id.get()) * 10;
            transport.request_ids(*round_id).into_iter().map(move |id| (id, value))
        })
        .collect();
    deliveries.shuffle(&mut rand::rng());

    let chunks: Vec<Vec<_>> = deliveries.chunks(25).map(<[_]>::to_vec).collect();
    let tasks = chunks.into_iter().map(|chunk| {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            for (request_id, value) in chunk {
                engine.deliver_response(request_id, value).unwrap();
                tokio::task::yield_now().await;
            }
        })
    });
    for result in join_all(tasks).await {
        result.unwrap();
    }

    let updates = answers(&mut events);
    assert!(!updates.is_empty());

    let latest = engine.latest_finalized_round();
    let highest = updates.iter().map(|(round_id, _)| *round_id).max().unwrap();
    assert_eq!(latest, highest);
    assert_eq!(engine.current_value(), u128::from(latest.get()) * 10);

    // each round answered with its own value, and at most once
    let mut seen = HashSet::new();
    for (round_id, value) in &updates {
        assert!(seen.insert(*round_id), "round {round_id} finalized twice");
        assert_eq!(*value, u128::from(round_id.get()) * 10);
    }

    assert_eq!(engine.stats().open_rounds, 0);
    assert_eq!(engine.stats().outstanding_requests, 0);
    assert_eq!(engine.metrics().summary().rounds_purged, 50);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_actions_of_concurrent_rounds_run_once_each() {
    let (engine, transport, effects) = create_engine();
    let handler = Arc::new(ScriptedEffectHandler::new());
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let worker = EffectWorker::new(Arc::clone(&engine), handler.clone(), Duration::from_secs(1))
        .start_with_shutdown(effects, shutdown_rx);

    let round_ids: Vec<_> = (1..=20u64)
        .map(|n| {
            let action = Action::new("settle", serde_json::json!({ "round": n }));
            engine.start_round(RoundRequest::new(providers(3), 2).with_action(action)).unwrap()
        })
        .collect();

    // deliver newest first so every older round goes stale
    let tasks = round_ids.iter().rev().map(|round_id| {
        let engine = Arc::clone(&engine);
        let request_ids = transport.request_ids(*round_id);
        tokio::spawn(async move {
            for request_id in request_ids {
                engine.deliver_response(request_id, 7).unwrap();
            }
        })
    });
    for result in join_all(tasks).await {
        result.unwrap();
    }

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(2), worker).await.unwrap().unwrap();

    let performed: Vec<_> = handler.calls().into_iter().map(|call| call.payload["round"].clone()).collect();
    let distinct: HashSet<_> = performed.iter().map(ToString::to_string).collect();
    assert_eq!(performed.len(), distinct.len(), "no action performed twice");
    assert_eq!(performed.len() as u64, engine.metrics().summary().answers_finalized);
    assert!(performed.contains(&serde_json::json!(20)));
    assert_eq!(engine.stats().pending_actions, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancel_and_deliver_race_for_one_request() {
    for _ in 0..20 {
        let (engine, transport, _effects) = create_engine();
        let older = start_round(&engine, 2, 1);
        let newer = start_round(&engine, 1, 1);
        engine.deliver_response(transport.request_ids(newer)[0], 1).unwrap();

        let older_ids = transport.request_ids(older);
        engine.deliver_response(older_ids[0], 1).unwrap();
        let contested = older_ids[1];

        let deliver = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.deliver_response(contested, 2).is_ok() })
        };
        let cancel = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.cancel_request(contested, ExpiryProof::now()).is_ok() })
        };

        let (delivered, cancelled) = (deliver.await.unwrap(), cancel.await.unwrap());
        assert!(delivered ^ cancelled, "exactly one side wins the request");
        assert!(engine.round_snapshot(older).is_none());
    }
}
