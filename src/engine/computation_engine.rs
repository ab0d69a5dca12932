use anyhow::{anyhow, Result};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::graph::{GraphError, RoutingTable};
use super::state::EngineState;
use crate::config::EngineConfig;
use crate::core::{Computable, Datapoint};
use crate::hub::{DatapointHub, MetricFilter, SubscriberId, Subscription};
use crate::observability::{ComputableMetrics, EngineMonitor, MetricsCollector};
use crate::resilience::{ErrorPolicy, ResilientComputable};

/// Collects computables and validates their graph before anything runs.
#[derive(Default)]
pub struct EngineBuilder {
    computables: Vec<Box<dyn Computable>>,
    config: EngineConfig,
    error_policy: ErrorPolicy,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn register(mut self, computable: Box<dyn Computable>) -> Self {
        self.computables.push(computable);
        self
    }

    pub fn register_all(mut self, computables: impl IntoIterator<Item = Box<dyn Computable>>) -> Self {
        self.computables.extend(computables);
        self
    }

    pub fn error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    pub fn build(self) -> Result<ComputationEngine, GraphError> {
        let routing = RoutingTable::build(&self.computables)?;
        Ok(ComputationEngine {
            computables: self.computables,
            routing,
            config: self.config,
            error_policy: self.error_policy,
            collector: MetricsCollector::new(),
            handles: Vec::new(),
            router: None,
            state: EngineState::Idle,
        })
    }
}

/// Runs one worker task per computable and routes hub traffic to them.
pub struct ComputationEngine {
    computables: Vec<Box<dyn Computable>>,
    routing: RoutingTable,
    config: EngineConfig,
    error_policy: ErrorPolicy,
    collector: MetricsCollector,
    handles: Vec<JoinHandle<()>>,
    router: Option<(DatapointHub, SubscriberId)>,
    state: EngineState,
}

impl ComputationEngine {
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn routing(&self) -> &RoutingTable {
        &self.routing
    }

    pub fn monitor(&self) -> EngineMonitor {
        EngineMonitor::new(self.collector.clone())
    }

    fn transition_to(&mut self, new_state: EngineState) -> Result<()> {
        if !self.state.can_transition_to(&new_state) {
            return Err(anyhow!(
                "Invalid engine transition: {} -> {}",
                self.state.name(),
                new_state.name()
            ));
        }
        self.state = new_state;
        Ok(())
    }

    /// Subscribe to every required metric once and spawn the workers.
    pub fn start(&mut self, hub: &DatapointHub) -> Result<()> {
        self.transition_to(EngineState::Running {
            started_at: Some(std::time::Instant::now()),
        })?;

        if self.computables.is_empty() {
            info!("no computables registered");
            return Ok(());
        }

        let filter = MetricFilter::only(self.routing.input_metrics());
        let subscription = hub.subscribe_with_capacity(filter, self.config.router_capacity)?;
        self.router = Some((hub.clone(), subscription.id()));

        let mut inboxes = Vec::with_capacity(self.computables.len());
        let mut worker_metrics = Vec::with_capacity(self.computables.len());
        for computable in self.computables.drain(..) {
            let (tx, rx) = mpsc::channel(self.config.worker_capacity.max(1));
            let metrics = Arc::new(ComputableMetrics::new(computable.name()));
            self.collector.register(metrics.clone());
            let resilient = ResilientComputable::new(computable, metrics.clone(), self.error_policy.clone());

            self.handles.push(tokio::spawn(run_worker(resilient, rx, hub.clone())));
            inboxes.push(tx);
            worker_metrics.push(metrics);
        }

        self.handles.push(tokio::spawn(route(
            subscription,
            self.routing.clone(),
            inboxes,
            worker_metrics,
        )));

        info!(
            computables = self.routing.len(),
            order = ?self.routing.evaluation_order(),
            "computation engine started"
        );
        Ok(())
    }

    /// Unsubscribe the router and wait for every worker to drain.
    pub async fn stop(&mut self) -> Result<()> {
        self.transition_to(EngineState::Stopped)?;

        if let Some((hub, id)) = self.router.take() {
            // already gone if the hub closed first
            let _ = hub.unsubscribe(id);
        }
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                warn!(error = %e, "computation task ended abnormally");
            }
        }
        info!("computation engine stopped");
        Ok(())
    }
}

async fn route(
    mut subscription: Subscription,
    routing: RoutingTable,
    inboxes: Vec<mpsc::Sender<Datapoint>>,
    metrics: Vec<Arc<ComputableMetrics>>,
) {
    while let Some(point) = subscription.recv().await {
        for &idx in routing.targets(&point.metric) {
            match inboxes[idx].try_send(point.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    let dropped = metrics[idx].record_dropped();
                    if dropped.is_power_of_two() {
                        warn!(computable = metrics[idx].name(), dropped, "computable queue full, dropping input");
                    }
                }
                // worker stopped under ErrorPolicy::Propagate
                Err(TrySendError::Closed(_)) => {}
            }
        }
    }
    debug!("engine router stopped");
}

async fn run_worker(mut computable: ResilientComputable, mut inbox: mpsc::Receiver<Datapoint>, hub: DatapointHub) {
    while let Some(point) = inbox.recv().await {
        match computable.process(&point) {
            Ok(Some(output)) => {
                if hub.publish(output).await.is_err() {
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => {
                error!(computable = computable.name(), error = %e, "stopping computable");
                break;
            }
        }
    }
    debug!(computable = computable.name(), "computable worker stopped");
}
