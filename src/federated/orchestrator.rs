//! Round orchestration.
//!
//! [`RoundOrchestrator`] owns every piece of shared federation state (registry,
//! round counter, global model, round history) behind one mutex. Trainer calls
//! happen without the lock; results are committed in a single critical section.

use crate::core::{common_dimension, now, Error, Result};
use crate::federated::aggregator::Aggregator;
use crate::federated::byzantine::ByzantineDetector;
use crate::federated::config::{AggregationPolicy, FederationConfig};
use crate::federated::registry::{DataHandle, NodeDescriptor, NodeRegistry, NodeSpec, Update};
use crate::federated::round::{
    NodeMetrics, NodeOutcome, NodeStatus, RoundRecord, RoundSummary, TrainingMetrics,
};
use crate::federated::trainer::{LocalTrainer, TrainingUpdate};
use crate::monitoring::CoordinatorStats;
use futures::future::join_all;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// State guarded by the orchestrator's mutex.
struct FederationState {
    registry: NodeRegistry,
    rounds_completed: u64,
    global_model: Option<Vec<f64>>,
    history: VecDeque<RoundRecord>,
    /// Latest-round status; nodes absent here are pending
    node_status: HashMap<String, NodeStatus>,
}

/// A noised contribution waiting to be committed.
struct Contribution {
    node_id: String,
    update: TrainingUpdate,
}

/// Drives training rounds end to end.
pub struct RoundOrchestrator {
    config: FederationConfig,
    trainer: Arc<dyn LocalTrainer>,
    aggregator: Aggregator,
    stats: CoordinatorStats,
    state: Mutex<FederationState>,
}

impl RoundOrchestrator {
    /// Create an orchestrator with a validated configuration.
    pub fn new(config: FederationConfig, trainer: Arc<dyn LocalTrainer>) -> Result<Self> {
        config.validate()?;

        let aggregator = Aggregator::new(ByzantineDetector::new(config.detector.clone()));
        let state = FederationState {
            registry: NodeRegistry::new(config.delta),
            rounds_completed: 0,
            global_model: None,
            history: VecDeque::with_capacity(config.history_window),
            node_status: HashMap::new(),
        };

        Ok(Self {
            config,
            trainer,
            aggregator,
            stats: CoordinatorStats::new(),
            state: Mutex::new(state),
        })
    }

    /// Active configuration.
    pub fn config(&self) -> &FederationConfig {
        &self.config
    }

    /// Operational counters.
    pub fn stats(&self) -> &CoordinatorStats {
        &self.stats
    }

    /// Register a node. Duplicate ids are rejected.
    pub async fn register(&self, spec: NodeSpec) -> Result<()> {
        let mut state = self.state.lock().await;
        let node_id = spec.id.clone();
        let model_kind = spec.model_kind.clone();

        state.registry.register(spec)?;
        self.stats.registered_nodes.set(state.registry.len() as f64);

        info!(node_id = %node_id, model_kind = %model_kind, "Registered FL node");
        Ok(())
    }

    /// Register a node from its parts.
    pub async fn register_node(
        &self,
        node_id: &str,
        model_kind: &str,
        epsilon: f64,
        data: Option<DataHandle>,
    ) -> Result<()> {
        let mut spec = NodeSpec::new(node_id, model_kind, epsilon);
        spec.data = data;
        self.register(spec).await
    }

    /// Bind training data to a registered node.
    pub async fn bind_training_data(&self, node_id: &str, data: DataHandle) -> Result<()> {
        self.state
            .lock()
            .await
            .registry
            .bind_training_data(node_id, data)
    }

    /// Number of registered nodes.
    pub async fn node_count(&self) -> usize {
        self.state.lock().await.registry.len()
    }

    /// Registered node ids in registration order.
    pub async fn node_ids(&self) -> Vec<String> {
        self.state.lock().await.registry.node_ids()
    }

    /// Rounds committed so far.
    pub async fn rounds_completed(&self) -> u64 {
        self.state.lock().await.rounds_completed
    }

    /// Current global model, absent before the first round.
    pub async fn global_model(&self) -> Option<Vec<f64>> {
        self.state.lock().await.global_model.clone()
    }

    /// Retained round records, oldest first.
    pub async fn history(&self) -> Vec<RoundRecord> {
        self.state.lock().await.history.iter().cloned().collect()
    }

    /// A node's past updates.
    pub async fn node_history(&self, node_id: &str) -> Result<Vec<Update>> {
        let state = self.state.lock().await;
        state
            .registry
            .get(node_id)
            .map(|n| n.history().to_vec())
            .ok_or_else(|| Error::NodeNotFound(node_id.to_string()))
    }

    /// Train a single node outside any round.
    ///
    /// Returns the noised update without recording it.
    pub async fn train_node(&self, node_id: &str) -> Result<Update> {
        let node = {
            let state = self.state.lock().await;
            state
                .registry
                .get(node_id)
                .map(|n| n.descriptor())
                .ok_or_else(|| Error::NodeNotFound(node_id.to_string()))?
        };

        let update = self.collect(&node).await?;
        let contribution = self.privatize(&node, update);
        Ok(Update {
            node_id: contribution.node_id,
            gradients: contribution.update.gradients,
            accuracy: contribution.update.accuracy,
            loss: contribution.update.loss,
            data_size: contribution.update.data_size,
            timestamp: now(),
        })
    }

    /// Run one round with the configured policy.
    ///
    /// Returns `false` on any failure; nothing is committed in that case.
    pub async fn start_round(&self) -> bool {
        match self.run_round().await {
            Ok(summary) => {
                info!(
                    round = summary.record.round,
                    participants = summary.record.participating_nodes,
                    accuracy = summary.record.global_accuracy,
                    "FL round completed"
                );
                true
            }
            Err(e) => {
                warn!(error = %e, "FL round failed");
                false
            }
        }
    }

    /// Run one round with the configured policy.
    pub async fn run_round(&self) -> Result<RoundSummary> {
        self.run_round_with(self.config.aggregation).await
    }

    /// Run one round with an explicit policy.
    pub async fn run_round_with(&self, policy: AggregationPolicy) -> Result<RoundSummary> {
        let result = self.execute_round(policy).await;
        if result.is_err() {
            self.stats.rounds_failed.inc();
        }
        result
    }

    async fn execute_round(&self, policy: AggregationPolicy) -> Result<RoundSummary> {
        let nodes: Vec<NodeDescriptor> = {
            let state = self.state.lock().await;
            let actual = state.registry.len();
            if actual < self.config.min_nodes {
                return Err(Error::InsufficientNodes {
                    needed: self.config.min_nodes,
                    actual,
                });
            }
            state.registry.all().iter().map(|n| n.descriptor()).collect()
        };

        let attempts = join_all(nodes.iter().map(|node| self.collect(node))).await;

        let mut outcomes = Vec::with_capacity(nodes.len());
        let mut contributions = Vec::with_capacity(nodes.len());
        for (node, attempt) in nodes.iter().zip(attempts) {
            match attempt.map(|update| self.privatize(node, update)) {
                Ok(contribution) => {
                    outcomes.push(NodeOutcome {
                        node_id: node.id.clone(),
                        status: NodeStatus::Active,
                        error: None,
                    });
                    contributions.push(contribution);
                }
                Err(e) => {
                    error!(node_id = %node.id, error = %e, "Training error, skipping node this round");
                    self.stats.node_failures.inc();
                    outcomes.push(NodeOutcome {
                        node_id: node.id.clone(),
                        status: NodeStatus::Failed,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        if contributions.is_empty() {
            return Err(Error::EmptyAggregation);
        }
        // Shape check before any key material is created
        let vectors: Vec<&[f64]> = contributions
            .iter()
            .map(|c| c.update.gradients.as_slice())
            .collect();
        common_dimension(&vectors)?;

        let mut state = self.state.lock().await;
        let timestamp = now();

        // Transport leg: each contribution is sealed and opened with its own node key
        let mut node_updates = Vec::with_capacity(contributions.len());
        for c in &contributions {
            let vector = match state.registry.channel_mut() {
                Some(channel) => {
                    let sealed = channel.encrypt(&c.update.gradients, &c.node_id);
                    channel.decrypt(&sealed, &c.node_id)?
                }
                None => c.update.gradients.clone(),
            };
            node_updates.push((c.node_id.clone(), vector));
        }

        let aggregation = self.aggregator.aggregate(&node_updates, policy)?;
        if !aggregation.excluded.is_empty() {
            warn!(excluded = ?aggregation.excluded, "Excluded byzantine contributions");
            self.stats
                .byzantine_exclusions
                .add(aggregation.excluded.len() as u64);
        }

        // Commit
        let round = state.rounds_completed + 1;
        let node_metrics: BTreeMap<String, NodeMetrics> = contributions
            .iter()
            .map(|c| {
                (
                    c.node_id.clone(),
                    NodeMetrics {
                        accuracy: c.update.accuracy,
                        loss: c.update.loss,
                        data_size: c.update.data_size,
                    },
                )
            })
            .collect();
        let record = RoundRecord::new(round, node_metrics, aggregation.excluded.clone(), policy);

        for (c, (_, gradients)) in contributions.iter().zip(node_updates) {
            state.registry.record_update(Update {
                node_id: c.node_id.clone(),
                gradients,
                accuracy: c.update.accuracy,
                loss: c.update.loss,
                data_size: c.update.data_size,
                timestamp,
            })?;
        }

        for outcome in &mut outcomes {
            if aggregation.excluded.contains(&outcome.node_id) {
                outcome.status = NodeStatus::Excluded;
            }
        }
        state.node_status = outcomes
            .iter()
            .map(|o| (o.node_id.clone(), o.status))
            .collect();

        let model_dimension = aggregation.global_update.len();
        state.global_model = Some(aggregation.global_update);
        state.rounds_completed = round;
        state.history.push_back(record.clone());
        while state.history.len() > self.config.history_window {
            state.history.pop_front();
        }

        self.stats.rounds_completed.inc();
        self.stats.latest_accuracy.set(record.global_accuracy);

        Ok(RoundSummary {
            record,
            outcomes,
            model_dimension,
            fell_back: aggregation.fell_back,
        })
    }

    /// Request one node's update from the trainer.
    async fn collect(&self, node: &NodeDescriptor) -> Result<TrainingUpdate> {
        if node.data.is_none() {
            return Err(Error::NoTrainingData(node.id.clone()));
        }

        let update = self
            .trainer
            .train(node)
            .await
            .map_err(|e| match e {
                Error::TrainerFailed { .. } | Error::NoTrainingData(_) => e,
                other => Error::TrainerFailed {
                    node_id: node.id.clone(),
                    reason: other.to_string(),
                },
            })?;
        update.validate(&node.id)?;
        Ok(update)
    }

    /// Perturb the gradient vector with the node's own budget.
    ///
    /// Accuracy, loss and data size pass through untouched.
    fn privatize(&self, node: &NodeDescriptor, mut update: TrainingUpdate) -> Contribution {
        update.gradients = node
            .privacy
            .add_noise(&update.gradients, self.config.sensitivity);
        Contribution {
            node_id: node.id.clone(),
            update,
        }
    }

    /// Metrics snapshot, absent before the first round.
    pub async fn training_metrics(&self) -> Option<TrainingMetrics> {
        let state = self.state.lock().await;
        let latest = state.history.back()?;

        let node_status = state
            .registry
            .all()
            .iter()
            .map(|n| {
                let status = state
                    .node_status
                    .get(n.id())
                    .copied()
                    .unwrap_or(NodeStatus::Pending);
                (n.id().to_string(), status)
            })
            .collect();

        Some(TrainingMetrics {
            total_rounds: state.rounds_completed,
            active_nodes: state.registry.len(),
            latest_accuracy: latest.global_accuracy,
            latest_loss: latest.average_loss,
            total_samples: latest.total_data_samples,
            training_history: state.history.iter().cloned().collect(),
            node_status,
            generated_at: now(),
        })
    }

    /// Encode a vector with a node's channel key, creating the key on first use.
    pub async fn encrypt_for(&self, node_id: &str, vector: &[f64]) -> Result<Vec<u8>> {
        let mut state = self.state.lock().await;
        let channel = state
            .registry
            .channel_mut()
            .ok_or_else(|| Error::MissingChannelKey(node_id.to_string()))?;
        Ok(channel.encrypt(vector, node_id))
    }

    /// Whether a channel key exists for the node.
    pub async fn has_channel_key(&self, node_id: &str) -> bool {
        let state = self.state.lock().await;
        state
            .registry
            .channel()
            .is_some_and(|channel| channel.has_key(node_id))
    }

    /// Average ciphertexts using positional `node_{i}` keys.
    pub async fn aggregate_secure(&self, ciphertexts: &[Vec<u8>]) -> Result<Vec<f64>> {
        let state = self.state.lock().await;
        match state.registry.channel() {
            Some(channel) => channel.aggregate_secure(ciphertexts),
            None => Err(Error::MissingChannelKey(
                crate::secure::positional_node_id(0),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::federated::trainer::SimulatedTrainer;
    use async_trait::async_trait;
    use std::collections::HashSet;

    /// Trainer returning fixed vectors and failing for chosen nodes.
    struct ScriptedTrainer {
        vectors: HashMap<String, Vec<f64>>,
        failing: HashSet<String>,
    }

    impl ScriptedTrainer {
        fn new() -> Self {
            Self {
                vectors: HashMap::new(),
                failing: HashSet::new(),
            }
        }

        fn with_vector(mut self, node_id: &str, v: Vec<f64>) -> Self {
            self.vectors.insert(node_id.to_string(), v);
            self
        }

        fn failing(mut self, node_id: &str) -> Self {
            self.failing.insert(node_id.to_string());
            self
        }
    }

    #[async_trait]
    impl LocalTrainer for ScriptedTrainer {
        async fn train(&self, node: &NodeDescriptor) -> Result<TrainingUpdate> {
            if self.failing.contains(&node.id) {
                return Err(Error::TrainerFailed {
                    node_id: node.id.clone(),
                    reason: "simulated crash".into(),
                });
            }
            Ok(TrainingUpdate {
                gradients: self
                    .vectors
                    .get(&node.id)
                    .cloned()
                    .unwrap_or_else(|| vec![0.0; 4]),
                accuracy: 0.9,
                loss: 0.25,
                data_size: 100,
            })
        }
    }

    fn data() -> Option<DataHandle> {
        Some(DataHandle::new("kdd", 2000))
    }

    async fn orchestrator_with(
        trainer: impl LocalTrainer + 'static,
        ids: &[&str],
    ) -> RoundOrchestrator {
        let orch = RoundOrchestrator::new(FederationConfig::default(), Arc::new(trainer)).unwrap();
        for id in ids {
            orch.register_node(id, "neural_network", 1.0, data()).await.unwrap();
        }
        orch
    }

    #[tokio::test]
    async fn test_round_commits_once() {
        let orch = orchestrator_with(SimulatedTrainer::new(6), &["a", "b", "c"]).await;

        assert!(orch.start_round().await);
        assert_eq!(orch.rounds_completed().await, 1);

        let history = orch.history().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].round, 1);
        assert_eq!(history[0].participating_nodes, 3);
        assert_eq!(orch.global_model().await.unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_insufficient_nodes() {
        let orch = orchestrator_with(SimulatedTrainer::new(3), &["solo"]).await;

        assert!(!orch.start_round().await);
        assert_eq!(orch.rounds_completed().await, 0);
        assert!(orch.global_model().await.is_none());
        assert!(matches!(
            orch.run_round().await,
            Err(Error::InsufficientNodes { needed: 2, actual: 1 })
        ));
        assert_eq!(orch.stats().rounds_failed.get(), 2);
    }

    #[tokio::test]
    async fn test_failing_node_is_skipped() {
        let trainer = ScriptedTrainer::new().failing("b");
        let orch = orchestrator_with(trainer, &["a", "b", "c"]).await;

        let summary = orch.run_round().await.unwrap();
        assert_eq!(summary.record.participating_nodes, 2);
        assert_eq!(summary.failed_nodes(), vec!["b"]);
        assert!(!summary.record.node_metrics.contains_key("b"));

        // failed node keeps its registration and gets no history
        assert_eq!(orch.node_count().await, 3);
        assert!(orch.node_history("b").await.unwrap().is_empty());
        assert_eq!(orch.node_history("a").await.unwrap().len(), 1);
        assert_eq!(orch.stats().node_failures.get(), 1);
    }

    #[tokio::test]
    async fn test_all_nodes_failing_consumes_no_round() {
        let trainer = ScriptedTrainer::new().failing("a").failing("b");
        let orch = orchestrator_with(trainer, &["a", "b"]).await;

        assert!(matches!(orch.run_round().await, Err(Error::EmptyAggregation)));
        assert_eq!(orch.rounds_completed().await, 0);
        assert!(orch.history().await.is_empty());
        assert!(orch.training_metrics().await.is_none());
    }

    #[tokio::test]
    async fn test_node_without_data_is_skipped() {
        let orch = orchestrator_with(SimulatedTrainer::new(3), &["a", "b"]).await;
        orch.register_node("bare", "random_forest", 1.0, None).await.unwrap();

        let summary = orch.run_round().await.unwrap();
        assert_eq!(summary.record.participating_nodes, 2);
        assert_eq!(summary.failed_nodes(), vec!["bare"]);

        let err = orch.train_node("bare").await.unwrap_err();
        assert!(matches!(err, Error::NoTrainingData(id) if id == "bare"));

        orch.bind_training_data("bare", DataHandle::new("kdd", 10)).await.unwrap();
        let update = orch.train_node("bare").await.unwrap();
        assert_eq!(update.data_size, 10);
        assert_eq!(update.gradients.len(), 3);
    }

    #[tokio::test]
    async fn test_telemetry_is_not_noised() {
        let orch = orchestrator_with(ScriptedTrainer::new(), &["a", "b"]).await;

        let summary = orch.run_round().await.unwrap();
        let metrics = &summary.record.node_metrics["a"];
        assert_eq!(metrics.accuracy, 0.9);
        assert_eq!(metrics.loss, 0.25);
        assert_eq!(metrics.data_size, 100);

        // gradients were zero before noise
        let history = orch.node_history("a").await.unwrap();
        assert!(history[0].gradients.iter().any(|g| *g != 0.0));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_fails_round() {
        let trainer = ScriptedTrainer::new()
            .with_vector("a", vec![1.0, 2.0])
            .with_vector("b", vec![1.0, 2.0, 3.0]);
        let orch = orchestrator_with(trainer, &["a", "b"]).await;

        assert!(matches!(
            orch.run_round().await,
            Err(Error::DimensionMismatch { .. })
        ));
        assert_eq!(orch.rounds_completed().await, 0);
        assert!(orch.node_history("a").await.unwrap().is_empty());

        // no channel keys were minted for the rejected round
        assert!(!orch.has_channel_key("a").await);
        assert!(!orch.has_channel_key("b").await);
    }

    #[tokio::test]
    async fn test_history_window() {
        let orch = orchestrator_with(SimulatedTrainer::new(2), &["a", "b"]).await;

        for _ in 0..12 {
            assert!(orch.start_round().await);
        }

        let history = orch.history().await;
        assert_eq!(orch.rounds_completed().await, 12);
        assert_eq!(history.len(), 10);
        assert_eq!(history.first().unwrap().round, 3);
        assert_eq!(history.last().unwrap().round, 12);
        assert_eq!(orch.node_history("a").await.unwrap().len(), 12);
    }

    #[tokio::test]
    async fn test_byzantine_node_is_excluded() {
        let config = FederationConfig {
            aggregation: AggregationPolicy::ByzantineTolerantAveraging,
            ..Default::default()
        };
        let mut trainer = ScriptedTrainer::new().with_vector("evil", vec![5000.0; 4]);
        let ids = ["h0", "h1", "h2", "h3", "h4", "h5", "h6", "evil"];
        for id in &ids[..7] {
            trainer = trainer.with_vector(id, vec![1.0; 4]);
        }

        let orch = RoundOrchestrator::new(config, Arc::new(trainer)).unwrap();
        for id in ids {
            // large budget keeps the noise small next to the attack
            orch.register_node(id, "neural_network", 100.0, data()).await.unwrap();
        }

        let summary = orch.run_round().await.unwrap();
        assert_eq!(summary.record.excluded_nodes, vec!["evil".to_string()]);
        assert_eq!(summary.record.participating_nodes, 8);

        let model = orch.global_model().await.unwrap();
        assert!(model.iter().all(|x| (x - 1.0).abs() < 1.0));

        let metrics = orch.training_metrics().await.unwrap();
        assert_eq!(metrics.node_status["evil"], NodeStatus::Excluded);
        assert_eq!(metrics.node_status["h0"], NodeStatus::Active);
        assert_eq!(orch.stats().byzantine_exclusions.get(), 1);
    }

    #[tokio::test]
    async fn test_training_metrics_statuses() {
        let trainer = ScriptedTrainer::new().failing("b");
        let orch = orchestrator_with(trainer, &["a", "b"]).await;
        assert!(orch.training_metrics().await.is_none());

        orch.run_round().await.unwrap();
        orch.register_node("late", "neural_network", 1.0, data()).await.unwrap();

        let metrics = orch.training_metrics().await.unwrap();
        assert_eq!(metrics.total_rounds, 1);
        assert_eq!(metrics.active_nodes, 3);
        assert_eq!(metrics.total_samples, 100);
        assert_eq!(metrics.node_status["a"], NodeStatus::Active);
        assert_eq!(metrics.node_status["b"], NodeStatus::Failed);
        assert_eq!(metrics.node_status["late"], NodeStatus::Pending);
    }

    #[tokio::test]
    async fn test_duplicate_registration() {
        let orch = orchestrator_with(SimulatedTrainer::new(2), &["a"]).await;
        let err = orch.register_node("a", "random_forest", 2.0, None).await.unwrap_err();
        assert!(matches!(err, Error::DuplicateNode(_)));
        assert_eq!(orch.node_count().await, 1);
    }

    #[tokio::test]
    async fn test_round_keys_each_node() {
        let orch = orchestrator_with(SimulatedTrainer::new(2), &["a", "b"]).await;
        assert!(!orch.has_channel_key("a").await);
        orch.run_round().await.unwrap();
        assert!(orch.has_channel_key("a").await);
        assert!(orch.has_channel_key("b").await);
        assert!(!orch.has_channel_key("node_0").await);

        // real ids got keys during the round, positional ids did not
        let ciphertexts = vec![
            orch.encrypt_for("a", &[1.0, 1.0]).await.unwrap(),
            orch.encrypt_for("b", &[3.0, 3.0]).await.unwrap(),
        ];
        assert!(matches!(
            orch.aggregate_secure(&ciphertexts).await,
            Err(Error::MissingChannelKey(_))
        ));

        let positional = vec![
            orch.encrypt_for("node_0", &[1.0, 1.0]).await.unwrap(),
            orch.encrypt_for("node_1", &[3.0, 3.0]).await.unwrap(),
        ];
        assert_eq!(orch.aggregate_secure(&positional).await.unwrap(), vec![2.0, 2.0]);
    }

    #[tokio::test]
    async fn test_concurrent_rounds_are_dense() {
        let orch = Arc::new(orchestrator_with(SimulatedTrainer::new(3), &["a", "b", "c"]).await);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let orch = Arc::clone(&orch);
                tokio::spawn(async move { orch.start_round().await })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap());
        }

        let rounds: Vec<u64> = orch.history().await.iter().map(|r| r.round).collect();
        assert_eq!(rounds, (1..=8).collect::<Vec<_>>());
    }
}
