//! Walkthrough: three enterprise nodes, five rounds, then the background driver.
//!
//! Usage: `fl_demo [federation.json] [scheduler.json]`

use agisfl::federated::{DataHandle, FederationConfig, RoundOrchestrator, SimulatedTrainer};
use agisfl::monitoring::{init_tracing, LogConfig, ProcessTelemetry, TelemetrySource};
use agisfl::privacy::noise_profile;
use agisfl::scheduler::{Scheduler, SchedulerConfig, SchedulerEvent};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> agisfl::Result<()> {
    init_tracing(&LogConfig::default());

    let mut args = std::env::args().skip(1);
    let federation = match args.next() {
        Some(path) => FederationConfig::load(path)?,
        None => FederationConfig::byzantine_tolerant(),
    };
    let schedule = match args.next() {
        Some(path) => SchedulerConfig::load(path)?,
        None => SchedulerConfig {
            tick_interval_ms: 200,
            round_every: 2,
            ..Default::default()
        },
    };

    info!(policy = %federation.aggregation, "Initializing FL coordinator");
    let orchestrator = Arc::new(RoundOrchestrator::new(
        federation,
        Arc::new(SimulatedTrainer::default()),
    )?);

    let nodes = [
        ("enterprise_node_001", "neural_network", 1.0),
        ("enterprise_node_002", "random_forest", 0.8),
        ("enterprise_node_003", "gradient_boosting", 1.2),
    ];
    for (node_id, model_kind, epsilon) in nodes {
        let data = DataHandle::new("kdd_like", 2000);
        orchestrator
            .register_node(node_id, model_kind, epsilon, Some(data))
            .await?;
    }

    for round in 1..=5 {
        if orchestrator.start_round().await {
            if let Some(metrics) = orchestrator.training_metrics().await {
                info!(round, accuracy = %format!("{:.3}", metrics.latest_accuracy), "Round done");
            }
        } else {
            error!(round, "Round failed");
        }
    }

    for level in noise_profile(&[0.1, 0.5, 1.0, 2.0, 5.0], 10)? {
        info!(
            epsilon = level.epsilon,
            mean_abs_noise = %format!("{:.4}", level.mean_abs_noise),
            "Privacy check"
        );
    }

    let telemetry: Vec<Arc<dyn TelemetrySource>> = vec![Arc::new(ProcessTelemetry::new())];
    let run_for = schedule.tick_interval() * 6;
    let mut scheduler = Scheduler::new(schedule, Arc::clone(&orchestrator), telemetry)?;
    let mut events = scheduler.subscribe();
    scheduler.start()?;

    let _ = tokio::time::timeout(run_for, async {
        while let Ok(event) = events.recv().await {
            match event {
                SchedulerEvent::Telemetry(snapshot) => {
                    info!(source = %snapshot.source, data = %snapshot.data, "Telemetry")
                }
                SchedulerEvent::Round(metrics) => {
                    info!(total_rounds = metrics.total_rounds, "Scheduled round published")
                }
                SchedulerEvent::RoundFailed { tick, reason } => {
                    error!(tick, reason = %reason, "Scheduled round failed")
                }
            }
        }
    })
    .await;

    if !scheduler.stop().await {
        error!("Scheduler did not stop in time");
    }

    print!("{}", orchestrator.stats().export_prometheus());
    info!(rounds = orchestrator.rounds_completed().await, "FL coordinator demo complete");
    Ok(())
}
