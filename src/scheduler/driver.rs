//! Periodic round driver.

use crate::core::{Error, Result};
use crate::federated::{RoundOrchestrator, TrainingMetrics};
use crate::monitoring::{TelemetrySnapshot, TelemetrySource};
use crate::scheduler::config::{RoundTrigger, SchedulerConfig};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Published to subscribers on each tick.
#[derive(Clone, Debug)]
pub enum SchedulerEvent {
    /// Reading from one telemetry source
    Telemetry(TelemetrySnapshot),
    /// Metrics after a committed round
    Round(TrainingMetrics),
    /// A triggered round did not commit
    RoundFailed { tick: u64, reason: String },
}

/// State shared between the handle and the spawned loop.
struct TickContext {
    config: SchedulerConfig,
    orchestrator: Arc<RoundOrchestrator>,
    telemetry: Vec<Arc<dyn TelemetrySource>>,
    events: broadcast::Sender<SchedulerEvent>,
    running: AtomicBool,
    wake: Notify,
    ticks: AtomicU64,
}

impl TickContext {
    fn publish(&self, event: SchedulerEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    async fn round_due(&self, tick: u64) -> bool {
        let every = self.config.round_every;
        match self.config.trigger {
            RoundTrigger::EveryNthTick => tick % every == 0,
            RoundTrigger::RoundCounterModulo => {
                self.orchestrator.rounds_completed().await % every == 0
            }
        }
    }

    async fn tick(&self, tick: u64) {
        for source in &self.telemetry {
            match source.snapshot().await {
                Ok(snapshot) => self.publish(SchedulerEvent::Telemetry(snapshot)),
                Err(e) => warn!(tick, error = %e, "Telemetry source failed"),
            }
        }

        if self.orchestrator.node_count().await == 0 || !self.round_due(tick).await {
            return;
        }

        match self.orchestrator.run_round().await {
            Ok(summary) => {
                info!(tick, round = summary.record.round, "Scheduled round completed");
                if let Some(metrics) = self.orchestrator.training_metrics().await {
                    self.publish(SchedulerEvent::Round(metrics));
                }
            }
            Err(e) => {
                warn!(tick, error = %e, "Scheduled round failed");
                self.publish(SchedulerEvent::RoundFailed {
                    tick,
                    reason: e.to_string(),
                });
            }
        }
    }

    async fn run(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.tick_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = self.wake.notified() => {}
            }
            if !self.running.load(Ordering::SeqCst) {
                break;
            }

            let tick = self.ticks.fetch_add(1, Ordering::SeqCst);
            self.tick(tick).await;
        }
        debug!("Scheduler loop exited");
    }
}

/// Drives rounds on a fixed interval independent of any caller.
pub struct Scheduler {
    ctx: Arc<TickContext>,
    handle: Option<JoinHandle<()>>,
}

impl Scheduler {
    /// Create a stopped scheduler.
    pub fn new(
        config: SchedulerConfig,
        orchestrator: Arc<RoundOrchestrator>,
        telemetry: Vec<Arc<dyn TelemetrySource>>,
    ) -> Result<Self> {
        config.validate()?;
        let (events, _) = broadcast::channel(config.event_capacity);

        Ok(Self {
            ctx: Arc::new(TickContext {
                config,
                orchestrator,
                telemetry,
                events,
                running: AtomicBool::new(false),
                wake: Notify::new(),
                ticks: AtomicU64::new(0),
            }),
            handle: None,
        })
    }

    /// Receive events published after this call.
    ///
    /// Slow subscribers lose the oldest events; they never stall the loop.
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.ctx.events.subscribe()
    }

    /// Spawn the tick loop. The first tick fires immediately.
    ///
    /// Fails with [`Error::SchedulerRunning`] while a previous loop is still
    /// alive, including one whose stop timed out mid-tick.
    pub fn start(&mut self) -> Result<()> {
        if self.handle.as_ref().is_some_and(|h| !h.is_finished()) {
            return Err(Error::SchedulerRunning);
        }
        if self.ctx.running.swap(true, Ordering::SeqCst) {
            return Err(Error::SchedulerRunning);
        }

        info!(
            interval_ms = self.ctx.config.tick_interval_ms,
            round_every = self.ctx.config.round_every,
            trigger = ?self.ctx.config.trigger,
            "Scheduler started"
        );
        self.handle = Some(tokio::spawn(Arc::clone(&self.ctx).run()));
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.ctx.running.load(Ordering::SeqCst)
    }

    /// Ticks started so far.
    pub fn ticks(&self) -> u64 {
        self.ctx.ticks.load(Ordering::SeqCst)
    }

    /// Stop the loop and wait up to the configured timeout for the current
    /// tick to finish.
    ///
    /// Returns `false` if the tick was still running at the deadline; the loop
    /// then exits on its own once that tick completes, and [`Scheduler::start`]
    /// is refused until it has.
    pub async fn stop(&mut self) -> bool {
        self.ctx.running.store(false, Ordering::SeqCst);
        self.ctx.wake.notify_one();

        let Some(mut handle) = self.handle.take() else {
            return true;
        };

        match tokio::time::timeout(self.ctx.config.stop_timeout(), &mut handle).await {
            Ok(joined) => {
                if let Err(e) = joined {
                    warn!(error = %e, "Scheduler task ended abnormally");
                }
                info!(ticks = self.ticks(), "Scheduler stopped");
                true
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.ctx.config.stop_timeout_ms,
                    "Scheduler tick still running at stop deadline"
                );
                self.handle = Some(handle);
                false
            }
        }
    }
}
