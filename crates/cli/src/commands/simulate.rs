//! `oracle-cli simulate`: drives the engine against in-process providers that
//! answer after a random delay, around a configured base value.

use oracle_core::{
    aggregation::{
        Action, AggregationEngine, AnswerValue, ExpiryProof, OracleEvent, OutboundQuery,
        QueryTransport, RequestId, RoundId, TransportError,
    },
    config::{AppConfig, SimulationConfig},
    runtime::OracleRuntime,
    OracleError,
};
use parking_lot::Mutex;
use rand::Rng;
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use super::utils::{print_info, print_success, CliError, CliResult};

/// Grace period on top of the maximum provider jitter before a round is given up on.
const ROUND_GRACE: Duration = Duration::from_millis(500);

pub struct SimulateOptions {
    pub rounds: Option<u32>,
    pub quorum: Option<usize>,
    pub fault_ratio: Option<f64>,
    pub show_metrics: bool,
}

/// Hands queries to the provider simulator task.
struct SimulatedTransport {
    queries: mpsc::UnboundedSender<OutboundQuery>,
}

impl QueryTransport for SimulatedTransport {
    fn emit_query(&self, query: OutboundQuery) -> Result<(), TransportError> {
        self.queries.send(query).map_err(|_| TransportError::Closed)
    }
}

/// How one simulated provider reacts to one query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reply {
    After { delay: Duration, value: AnswerValue },
    Silent,
}

#[derive(Debug, Clone)]
struct ProviderSimulator {
    settings: SimulationConfig,
}

impl ProviderSimulator {
    fn new(settings: SimulationConfig) -> Self {
        Self { settings }
    }

    fn plan(&self) -> Reply {
        let mut rng = rand::rng();
        if rng.random_bool(self.settings.fault_ratio.clamp(0.0, 1.0)) {
            return Reply::Silent;
        }

        let spread = self.settings.spread;
        let low = self.settings.base_value.saturating_sub(spread);
        let high = self.settings.base_value.saturating_add(spread);
        let value = AnswerValue::from(rng.random_range(low..=high));
        let delay = Duration::from_millis(rng.random_range(0..=self.settings.max_jitter_ms));

        Reply::After { delay, value }
    }

    /// Answers every query on its own task. Unanswered request ids are
    /// collected for later cancellation.
    fn spawn(
        self,
        engine: Arc<AggregationEngine>,
        mut queries: mpsc::UnboundedReceiver<OutboundQuery>,
        unanswered: Arc<Mutex<Vec<RequestId>>>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(query) = queries.recv().await {
                match self.plan() {
                    Reply::Silent => {
                        debug!(
                            provider = %query.provider,
                            round_id = %query.round_id,
                            "simulated provider stays silent"
                        );
                        unanswered.lock().push(query.request_id);
                    }
                    Reply::After { delay, value } => {
                        let engine = Arc::clone(&engine);
                        tokio::spawn(async move {
                            tokio::time::sleep(delay).await;
                            if let Err(e) = engine.deliver_response(query.request_id, value) {
                                debug!(error = %e, provider = %query.provider, "response not applied");
                            }
                        });
                    }
                }
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoundOutcome {
    Finalized(AnswerValue),
    PurgedUnfinalized,
    TimedOut,
}

async fn wait_for_round(
    events: &mut broadcast::Receiver<OracleEvent>,
    round_id: RoundId,
    limit: Duration,
) -> RoundOutcome {
    let waited = tokio::time::timeout(limit, async {
        loop {
            match events.recv().await {
                Ok(OracleEvent::AnswerUpdated { value, round_id: id, .. }) if id == round_id => {
                    return RoundOutcome::Finalized(value);
                }
                Ok(OracleEvent::RoundPurged { round_id: id, finalized: false }) if id == round_id => {
                    return RoundOutcome::PurgedUnfinalized;
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return RoundOutcome::TimedOut,
            }
        }
    })
    .await;

    waited.unwrap_or(RoundOutcome::TimedOut)
}

/// Cancels silent requests whose rounds are now older than the latest answer.
/// Requests of the current round stay queued.
fn cancel_unanswered(engine: &AggregationEngine, unanswered: &Mutex<Vec<RequestId>>) -> usize {
    let pending = std::mem::take(&mut *unanswered.lock());
    let mut cancelled = 0;
    let mut retained = Vec::new();

    for request_id in pending {
        match engine.cancel_request(request_id, ExpiryProof::now()) {
            Ok(_) => cancelled += 1,
            Err(OracleError::InvalidState(_)) => retained.push(request_id),
            Err(e) => debug!(error = %e, request_id = %request_id, "request not cancelled"),
        }
    }

    unanswered.lock().extend(retained);
    cancelled
}

pub async fn run_simulation(mut config: AppConfig, options: SimulateOptions) -> CliResult<()> {
    if let Some(rounds) = options.rounds {
        config.simulation.rounds = rounds;
    }
    if let Some(quorum) = options.quorum {
        config.engine.default_quorum_threshold = quorum;
    }
    if let Some(fault_ratio) = options.fault_ratio {
        config.simulation.fault_ratio = fault_ratio;
    }

    let settings = config.simulation.clone();
    let (queries_tx, queries_rx) = mpsc::unbounded_channel();

    let runtime = OracleRuntime::builder()
        .with_config(config)
        .with_transport(Arc::new(SimulatedTransport { queries: queries_tx }))
        .build()?;

    let unanswered = Arc::new(Mutex::new(Vec::new()));
    let providers_task = ProviderSimulator::new(settings.clone()).spawn(
        Arc::clone(runtime.engine()),
        queries_rx,
        Arc::clone(&unanswered),
    );

    let limit = settings.max_jitter() + ROUND_GRACE;
    let mut events = runtime.subscribe();
    let mut finalized = 0u32;

    print_info(&format!(
        "Simulating {} rounds over {} providers (quorum {})",
        settings.rounds,
        runtime.config().to_provider_refs().len(),
        runtime.config().engine.default_quorum_threshold
    ));

    for n in 1..=settings.rounds {
        let action = settings
            .action_target
            .as_ref()
            .map(|target| Action::new(target.as_str(), serde_json::json!({ "round": n })));
        let round_id = runtime
            .start_configured_round(serde_json::json!({ "feed": "simulated", "round": n }), action)?;

        match wait_for_round(&mut events, round_id, limit).await {
            RoundOutcome::Finalized(value) => {
                finalized += 1;
                println!("  Round {round_id}: {value}");
            }
            RoundOutcome::PurgedUnfinalized => println!("  Round {round_id}: purged before quorum"),
            RoundOutcome::TimedOut => println!("  Round {round_id}: no quorum within {limit:?}"),
        }

        let cancelled = cancel_unanswered(runtime.engine(), &unanswered);
        if cancelled > 0 {
            info!(cancelled, "cancelled silent requests of older rounds");
        }
    }

    let stats = runtime.engine().stats();
    let summary = runtime.metrics_collector().summary();
    let rendered = (options.show_metrics && runtime.config().metrics.enabled)
        .then(|| runtime.metrics_collector().render());

    runtime.shutdown().await;
    providers_task.abort();

    print_success(&format!(
        "{finalized}/{} rounds finalized, canonical answer {} (round {})",
        settings.rounds, stats.current_value, stats.latest_finalized_round
    ));
    println!("Engine: {}", serde_json::to_string_pretty(&stats)?);
    println!("Metrics: {}", serde_json::to_string_pretty(&summary)?);
    if let Some(rendered) = rendered {
        println!("\n{rendered}");
    }

    if finalized == 0 && settings.rounds > 0 {
        return Err(CliError::Runtime("no round reached quorum".to_string()));
    }
    Ok(())
}
