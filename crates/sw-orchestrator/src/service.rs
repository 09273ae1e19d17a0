//! The orchestration engine.
//!
//! Owns three kinds of background tasks: one batch loop draining the
//! priority and batch queues, one routing loop reacting to registry events
//! (route discovery and schedule management), and one scheduler task per
//! system that opted into periodic execution. All tasks hold only a `Weak`
//! reference back to the orchestrator, so dropping the last external handle
//! ends them.
//!
//! Flow bookkeeping lives behind a single `tokio::sync::Mutex`; the
//! transformation cache and the task registries have their own locks. No
//! lock is held across a call into a subsystem.

use crate::discovery::candidate_routes;
use crate::error::FlowError;
use crate::flow::{Flow, FlowOptions, FlowStatus, OrchestratorMetrics, OrchestratorStatus};
use crate::transform::{
    apply_field_mapping, apply_rules, payload_fingerprint, CustomTransform, TransformCache,
};
use shared_bus::{
    EventFilter, EventPublisher, EventTopic, InMemoryEventBus, IntegrationEvent, Subscription,
};
use shared_types::{
    ConnectionId, ContextMetadata, FlowId, KnobValue, Payload, PriorityClass, SystemHandle,
    SystemId, SystemStatus, TimeSource,
};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError, RwLock as StdRwLock, Weak};
use std::time::Duration;
use sw_conflict::{ConflictResolver, Contribution, ResolutionStrategy};
use sw_registry::{Connection, ConnectionOptions, HealthDelta, SystemProfile, SystemRegistry};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Bound on the terminal-flow history.
const HISTORY_CAPACITY: usize = 256;

/// Orchestrator tuning knobs.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Batch tick period.
    pub batch_interval: Duration,
    /// Flows consumed from the batch queue per tick.
    pub batch_size: usize,
    /// Base unit of the exponential backoff (`unit * 2^retry_count`).
    pub backoff_unit: Duration,
    /// Conflict resolution strategy.
    pub strategy: ResolutionStrategy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            batch_interval: Duration::from_secs(1),
            batch_size: 10,
            backoff_unit: Duration::from_secs(1),
            strategy: ResolutionStrategy::default(),
        }
    }
}

#[derive(Default)]
struct FlowState {
    flows: HashMap<FlowId, Flow>,
    history: VecDeque<Flow>,
    high_queue: VecDeque<FlowId>,
    batch_queue: VecDeque<FlowId>,
    metrics: OrchestratorMetrics,
}

impl FlowState {
    fn retire(&mut self, flow: Flow) {
        self.flows.remove(&flow.id);
        if self.history.len() == HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.history.push_back(flow);
    }
}

/// The data flow orchestrator. The only component that calls into
/// registered subsystems for delivery and periodic execution.
pub struct DataFlowOrchestrator {
    weak: Weak<Self>,
    registry: Arc<SystemRegistry>,
    bus: Arc<InMemoryEventBus>,
    clock: Arc<dyn TimeSource>,
    resolver: ConflictResolver,
    config: OrchestratorConfig,
    state: Mutex<FlowState>,
    cache: StdMutex<TransformCache>,
    customs: StdRwLock<HashMap<String, CustomTransform>>,
    schedulers: StdMutex<HashMap<SystemId, JoinHandle<()>>>,
    core_tasks: StdMutex<Vec<JoinHandle<()>>>,
    arrival_seq: AtomicU64,
}

impl DataFlowOrchestrator {
    /// Start the orchestrator: spawns the batch loop and the routing loop,
    /// and schedules every already-registered system that opted into
    /// periodic execution.
    #[must_use]
    pub fn start(registry: Arc<SystemRegistry>, config: OrchestratorConfig) -> Arc<Self> {
        let bus = registry.bus().clone();
        let clock = registry.clock().clone();
        let this = Arc::new_cyclic(|weak| Self {
            weak: weak.clone(),
            registry,
            bus,
            clock,
            resolver: ConflictResolver::new(config.strategy),
            config,
            state: Mutex::new(FlowState::default()),
            cache: StdMutex::new(TransformCache::new()),
            customs: StdRwLock::new(HashMap::new()),
            schedulers: StdMutex::new(HashMap::new()),
            core_tasks: StdMutex::new(Vec::new()),
            arrival_seq: AtomicU64::new(0),
        });

        for (system_id, frequency) in this.registry.scheduled_systems() {
            this.schedule_system(system_id, frequency);
        }

        let batch = tokio::spawn(Self::batch_loop(
            this.weak.clone(),
            this.config.batch_interval,
        ));
        // Subscribe before spawning: an event published between here and the
        // task's first poll stays buffered instead of reaching zero receivers.
        let registry_events = this
            .bus
            .subscribe(EventFilter::topics(vec![EventTopic::Registry]));
        let routing = tokio::spawn(Self::routing_loop(this.weak.clone(), registry_events));
        {
            let mut tasks = this
                .core_tasks
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            tasks.push(batch);
            tasks.push(routing);
        }

        info!("Data flow orchestrator started");
        this
    }

    // =========================================================================
    // FLOW INITIATION
    // =========================================================================

    /// Accept a flow from `source` to `target` and dispatch it by priority.
    ///
    /// Critical flows are processed inline, including backoff retries: this
    /// call returns only once the flow is terminal. High flows go to a
    /// dedicated FIFO queue drained before every batch tick; medium and low
    /// flows go to the batch queue.
    ///
    /// A missing or disabled connection fails immediately with
    /// [`FlowError::ConnectionUnavailable`] and is never retried.
    pub async fn initiate_flow(
        &self,
        source: &SystemId,
        target: &SystemId,
        data: Payload,
        options: FlowOptions,
    ) -> Result<FlowId, FlowError> {
        let now = self.clock.now();
        let connection_id = ConnectionId::for_pair(source, target);
        let flow_id = FlowId::new();
        let mut flow = Flow {
            id: flow_id,
            source: source.clone(),
            target: target.clone(),
            connection_id: connection_id.clone(),
            payload: data,
            priority: options.priority,
            status: FlowStatus::Pending,
            retry_count: 0,
            max_retries: options.max_retries,
            timeout: options.timeout,
            created_at: now,
            updated_at: now,
            completed_at: None,
            last_error: None,
            arrival: self.arrival_seq.fetch_add(1, Ordering::Relaxed),
        };

        let connection = self.registry.connection_for_pair(source, target);
        let available = connection.as_ref().is_some_and(|c| c.enabled);
        if !available {
            let error = FlowError::ConnectionUnavailable;
            flow.status = FlowStatus::Failed;
            flow.completed_at = Some(now);
            flow.last_error = Some(error.to_string());
            {
                let mut state = self.state.lock().await;
                state.metrics.total_flows += 1;
                state.metrics.failed += 1;
                state.retire(flow);
            }
            warn!(flow = %flow_id, connection = %connection_id, "Flow rejected, no enabled connection");
            self.bus
                .publish(IntegrationEvent::FlowFailed {
                    flow_id,
                    connection_id: connection.map(|c| c.id),
                    error: error.to_string(),
                    retries: 0,
                })
                .await;
            return Err(error);
        }

        let priority = flow.priority;
        {
            let mut state = self.state.lock().await;
            state.metrics.total_flows += 1;
            state.flows.insert(flow_id, flow);
            match priority {
                PriorityClass::Critical => {}
                PriorityClass::High => state.high_queue.push_back(flow_id),
                PriorityClass::Medium | PriorityClass::Low => {
                    state.batch_queue.push_back(flow_id);
                }
            }
        }

        debug!(flow = %flow_id, connection = %connection_id, ?priority, "Flow initiated");
        self.bus
            .publish(IntegrationEvent::FlowInitiated {
                flow_id,
                connection_id,
                priority,
            })
            .await;

        if priority == PriorityClass::Critical {
            self.run_inline(flow_id).await;
        }
        Ok(flow_id)
    }

    // =========================================================================
    // FLOW EXECUTION
    // =========================================================================

    /// Drive a flow to a terminal state, sleeping out backoff delays inline.
    async fn run_inline(&self, flow_id: FlowId) {
        loop {
            match self.attempt(flow_id).await {
                Ok(()) => return,
                Err(error) => match self.after_failure(flow_id, error).await {
                    Some(delay) => tokio::time::sleep(delay).await,
                    None => return,
                },
            }
        }
    }

    /// Make one attempt; detach backoff retries so queue draining is never
    /// blocked by a sleeping flow.
    async fn dispatch(&self, flow_id: FlowId) {
        if let Err(error) = self.attempt(flow_id).await {
            if let Some(delay) = self.after_failure(flow_id, error).await {
                if let Some(this) = self.weak.upgrade() {
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        this.run_inline(flow_id).await;
                    });
                }
            }
        }
    }

    /// One processing attempt: transform, resolve the target, deliver,
    /// and record completion on success.
    async fn attempt(&self, flow_id: FlowId) -> Result<(), FlowError> {
        let (source, target, payload, priority, timeout) = {
            let mut state = self.state.lock().await;
            let Some(flow) = state.flows.get_mut(&flow_id) else {
                // Destroyed or already terminal.
                return Ok(());
            };
            flow.status = FlowStatus::Processing;
            flow.updated_at = self.clock.now();
            (
                flow.source.clone(),
                flow.target.clone(),
                flow.payload.clone(),
                flow.priority,
                flow.timeout,
            )
        };
        let started = self.clock.now();

        let connection = self
            .registry
            .connection_for_pair(&source, &target)
            .filter(|c| c.enabled)
            .ok_or(FlowError::ConnectionUnavailable)?;

        let transformed = self.transform(&connection, &payload)?;

        let registration = self
            .registry
            .get_system(&target)
            .ok_or_else(|| FlowError::TargetUnreachable(format!("{target} not registered")))?;
        if registration.status == SystemStatus::Disabled {
            return Err(FlowError::TargetUnreachable(format!("{target} disabled")));
        }
        let handle = self
            .registry
            .system_handle(&target)
            .map_err(|e| FlowError::TargetUnreachable(e.to_string()))?;

        let delivery = self.deliver(&handle, &registration.profile, transformed, &source, priority);
        tokio::time::timeout(timeout, delivery)
            .await
            .map_err(|_| FlowError::Timeout)??;

        let latency_ms = self.clock.now().millis_since(started);
        let _ = self.registry.record_connection_use(&connection.id, latency_ms);
        let _ = self
            .registry
            .update_system_health(&target, HealthDelta::success(latency_ms))
            .await;
        let _ = self.registry.touch_last_active(&target);

        {
            let mut state = self.state.lock().await;
            if let Some(mut flow) = state.flows.remove(&flow_id) {
                let now = self.clock.now();
                flow.status = FlowStatus::Completed;
                flow.updated_at = now;
                flow.completed_at = Some(now);
                state.retire(flow);
            }
            state.metrics.record_success(latency_ms);
        }

        debug!(flow = %flow_id, connection = %connection.id, latency_ms, "Flow completed");
        self.bus
            .publish(IntegrationEvent::FlowCompleted {
                flow_id,
                connection_id: connection.id,
                latency_ms,
            })
            .await;
        Ok(())
    }

    /// Push the transformed payload into the target by kind.
    async fn deliver(
        &self,
        handle: &SystemHandle,
        profile: &SystemProfile,
        payload: Payload,
        source: &SystemId,
        priority: PriorityClass,
    ) -> Result<(), FlowError> {
        match handle {
            SystemHandle::Heuristic(system) => {
                let metadata = ContextMetadata {
                    source: source.clone(),
                    timestamp: self.clock.now(),
                    priority,
                };
                system
                    .receive_context(payload, metadata)
                    .await
                    .map_err(|e| FlowError::TargetUnreachable(e.to_string()))
            }
            SystemHandle::Deterministic(system) => {
                let SystemProfile::Deterministic { knobs, .. } = profile else {
                    return Err(FlowError::TargetUnreachable(
                        "profile does not match handle kind".into(),
                    ));
                };
                // Knobs are assigned one at a time; a single rejection is
                // logged but does not fail the flow.
                for (knob_id, value) in &payload {
                    let Some(descriptor) = knobs.get(knob_id) else {
                        debug!(knob = %knob_id, "No knob declared for field, skipping");
                        continue;
                    };
                    let Some(knob_value) = KnobValue::from_json(value, descriptor.knob_type)
                    else {
                        warn!(knob = %knob_id, "Value shape does not fit knob type");
                        continue;
                    };
                    if let Err(error) = system.set_input(knob_id, knob_value, source).await {
                        warn!(knob = %knob_id, %error, "Knob assignment rejected");
                    }
                }
                Ok(())
            }
        }
    }

    /// Bookkeeping after a failed attempt. Returns the backoff delay when
    /// the flow will be retried, `None` when it is terminal.
    async fn after_failure(&self, flow_id: FlowId, error: FlowError) -> Option<Duration> {
        let now = self.clock.now();
        let verdict = {
            let mut state = self.state.lock().await;
            let flow = state.flows.get_mut(&flow_id)?;
            flow.last_error = Some(error.to_string());
            flow.updated_at = now;

            if error.retryable() && flow.retry_count < flow.max_retries {
                flow.retry_count += 1;
                flow.status = FlowStatus::Retrying;
                let delay = self.config.backoff_unit * 2u32.pow(flow.retry_count);
                Ok((delay, flow.retry_count, flow.max_retries))
            } else {
                flow.status = FlowStatus::Failed;
                flow.completed_at = Some(now);
                let retries = flow.retry_count;
                let connection_id = flow.connection_id.clone();
                if let Some(flow) = state.flows.remove(&flow_id) {
                    state.retire(flow);
                }
                state.metrics.failed += 1;
                Err((connection_id, retries))
            }
        };

        match verdict {
            Ok((delay, retry, budget)) => {
                debug!(flow = %flow_id, %error, retry, budget, ?delay, "Flow retrying");
                Some(delay)
            }
            Err((connection_id, retries)) => {
                warn!(flow = %flow_id, %error, retries, "Flow failed");
                self.bus
                    .publish(IntegrationEvent::FlowFailed {
                        flow_id,
                        connection_id: Some(connection_id),
                        error: error.to_string(),
                        retries,
                    })
                    .await;
                None
            }
        }
    }

    /// Transform a payload for a connection, memoizing the result.
    fn transform(&self, connection: &Connection, payload: &Payload) -> Result<Payload, FlowError> {
        let fingerprint = payload_fingerprint(payload)?;
        {
            let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(result) = cache.get(&connection.id, fingerprint) {
                return Ok(result);
            }
        }

        let transformed = {
            let customs = self.customs.read().unwrap_or_else(PoisonError::into_inner);
            apply_rules(payload, &connection.transformations, &customs)?
        };
        let result = apply_field_mapping(transformed, &connection.field_mapping);

        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.insert(connection.id.clone(), fingerprint, result.clone());
        Ok(result)
    }

    // =========================================================================
    // QUEUE LOOPS
    // =========================================================================

    async fn batch_loop(weak: Weak<Self>, period: Duration) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The immediate first tick carries no work.
        interval.tick().await;
        loop {
            interval.tick().await;
            let Some(this) = weak.upgrade() else { return };
            this.drain_high_queue().await;
            this.process_batch().await;
        }
    }

    async fn drain_high_queue(&self) {
        loop {
            let next = {
                let mut state = self.state.lock().await;
                state.high_queue.pop_front()
            };
            match next {
                Some(flow_id) => self.dispatch(flow_id).await,
                None => return,
            }
        }
    }

    async fn process_batch(&self) {
        let batch: Vec<FlowId> = {
            let mut state = self.state.lock().await;
            let take = self.config.batch_size.min(state.batch_queue.len());
            state.batch_queue.drain(..take).collect()
        };
        if batch.is_empty() {
            return;
        }

        self.resolve_batch_conflicts(&batch).await;
        for flow_id in batch {
            self.dispatch(flow_id).await;
        }
    }

    /// Detect overlapping target-field writes within one batch: the
    /// resolver's value is written into the winning flow's payload (under
    /// `Average` it differs from every contribution) and the losing flows'
    /// conflicted fields are stripped before execution.
    async fn resolve_batch_conflicts(&self, batch: &[FlowId]) {
        struct Entry {
            flow: FlowId,
            source_key: String,
            contribution: Contribution,
        }

        // Snapshot the batch flows, then compute each flow's target fields
        // from its connection's mapping.
        let snapshots: Vec<Flow> = {
            let state = self.state.lock().await;
            batch
                .iter()
                .filter_map(|id| state.flows.get(id).cloned())
                .collect()
        };

        let mut groups: HashMap<(SystemId, String), Vec<Entry>> = HashMap::new();
        for flow in &snapshots {
            let Some(connection) = self.registry.connection_for_pair(&flow.source, &flow.target)
            else {
                continue;
            };
            for (source_key, value) in &flow.payload {
                let target_field = if connection.field_mapping.is_empty() {
                    Some(source_key.clone())
                } else {
                    connection.field_mapping.get(source_key).cloned()
                };
                let Some(target_field) = target_field else {
                    continue;
                };
                groups
                    .entry((flow.target.clone(), target_field))
                    .or_default()
                    .push(Entry {
                        flow: flow.id,
                        source_key: source_key.clone(),
                        contribution: Contribution {
                            flow: flow.id,
                            source: flow.source.clone(),
                            priority: flow.priority,
                            weight: connection.weight,
                            timestamp: flow.created_at,
                            arrival: flow.arrival,
                            value: value.clone(),
                        },
                    });
            }
        }

        let mut strips: Vec<(FlowId, String)> = Vec::new();
        let mut writes: Vec<(FlowId, String, serde_json::Value)> = Vec::new();
        let mut resolved: BTreeMap<(SystemId, FlowId), Vec<String>> = BTreeMap::new();
        let mut conflicts = 0u64;
        for ((target, field), entries) in groups {
            if entries.len() < 2 {
                continue;
            }
            let contributions: Vec<Contribution> =
                entries.iter().map(|e| e.contribution.clone()).collect();
            let Some(resolution) = self.resolver.resolve(&contributions) else {
                continue;
            };
            conflicts += 1;
            let winner = resolution.winner;
            let mut winner_key = None;
            for entry in entries {
                if entry.flow == winner {
                    winner_key = Some(entry.source_key);
                } else {
                    strips.push((entry.flow, entry.source_key));
                }
            }
            if let Some(key) = winner_key {
                writes.push((winner, key, resolution.value));
            }
            resolved.entry((target, winner)).or_default().push(field);
        }
        if conflicts == 0 {
            return;
        }

        {
            let mut state = self.state.lock().await;
            for (flow_id, source_key) in strips {
                if let Some(flow) = state.flows.get_mut(&flow_id) {
                    flow.payload.remove(&source_key);
                }
            }
            for (flow_id, source_key, value) in writes {
                if let Some(flow) = state.flows.get_mut(&flow_id) {
                    flow.payload.insert(source_key, value);
                }
            }
            state.metrics.conflicts_resolved += conflicts;
        }

        for ((target, winner), fields) in resolved {
            info!(%target, %winner, ?fields, "Conflicting writes resolved");
            self.bus
                .publish(IntegrationEvent::ConflictResolved {
                    target,
                    fields,
                    winner,
                })
                .await;
        }
    }

    // =========================================================================
    // PERIODIC SCHEDULING
    // =========================================================================

    /// Schedule (or reschedule) a system's periodic execution.
    pub fn schedule_system(&self, system_id: SystemId, frequency: Duration) {
        let task = tokio::spawn(Self::schedule_loop(
            self.weak.clone(),
            system_id.clone(),
            frequency,
        ));
        let mut schedulers = self
            .schedulers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = schedulers.insert(system_id.clone(), task) {
            previous.abort();
        }
        debug!(system = %system_id, ?frequency, "Periodic execution scheduled");
    }

    /// Stop a system's periodic execution.
    pub fn unschedule_system(&self, system_id: &SystemId) {
        let mut schedulers = self
            .schedulers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(task) = schedulers.remove(system_id) {
            task.abort();
            debug!(system = %system_id, "Periodic execution stopped");
        }
    }

    async fn schedule_loop(weak: Weak<Self>, system_id: SystemId, frequency: Duration) {
        let mut interval = tokio::time::interval(frequency);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick fires after one full period, not immediately.
        interval.tick().await;
        loop {
            interval.tick().await;
            let Some(this) = weak.upgrade() else { return };
            this.system_tick(&system_id).await;
        }
    }

    /// One periodic tick: invoke the processing hook, then fan the tick's
    /// outputs along enabled outgoing connections. An error here is logged
    /// and folded into the system's health; it never halts other schedules.
    async fn system_tick(&self, system_id: &SystemId) {
        let Some(registration) = self.registry.get_system(system_id) else {
            return;
        };
        if registration.status == SystemStatus::Disabled {
            return;
        }
        let Ok(handle) = self.registry.system_handle(system_id) else {
            return;
        };

        let started = self.clock.now();
        let outputs = match &handle {
            SystemHandle::Heuristic(system) => system.process_tick().await,
            SystemHandle::Deterministic(system) => match system.process_tick().await {
                Ok(()) => Ok(system.current_outputs().await),
                Err(e) => Err(e),
            },
        };
        let outputs = match outputs {
            Ok(outputs) => outputs,
            Err(error) => {
                warn!(system = %system_id, %error, "Periodic tick failed");
                let _ = self
                    .registry
                    .update_system_health(system_id, HealthDelta::failure(error.to_string()))
                    .await;
                return;
            }
        };

        let latency_ms = self.clock.now().millis_since(started);
        let _ = self
            .registry
            .update_system_health(system_id, HealthDelta::success(latency_ms))
            .await;
        let _ = self.registry.touch_last_active(system_id);
        if outputs.is_empty() {
            return;
        }

        for connection in self.registry.get_system_connections(system_id).outgoing {
            if !connection.enabled {
                continue;
            }
            // Only the keys named in the connection's mapping travel; the
            // mapping itself is applied once, during flow transformation.
            let relevant: Payload = if connection.field_mapping.is_empty() {
                outputs.clone()
            } else {
                outputs
                    .iter()
                    .filter(|(key, _)| connection.field_mapping.contains_key(*key))
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect()
            };
            if relevant.is_empty() {
                continue;
            }
            let options = FlowOptions {
                priority: connection.priority,
                ..FlowOptions::default()
            };
            if let Err(error) = self
                .initiate_flow(system_id, &connection.target, relevant, options)
                .await
            {
                debug!(system = %system_id, connection = %connection.id, %error, "Fan-out flow rejected");
            }
        }
    }

    // =========================================================================
    // ROUTE DISCOVERY
    // =========================================================================

    async fn routing_loop(weak: Weak<Self>, mut subscription: Subscription) {
        while let Some(event) = subscription.recv().await {
            let Some(this) = weak.upgrade() else { return };
            match event {
                IntegrationEvent::SystemRegistered { system_id, .. } => {
                    this.discover_routes(&system_id).await;
                    if let Some(registration) = this.registry.get_system(&system_id) {
                        if let Some(frequency) = registration.update_frequency {
                            this.schedule_system(system_id, frequency);
                        }
                    }
                }
                IntegrationEvent::SystemUnregistered { system_id, .. } => {
                    this.unschedule_system(&system_id);
                }
                _ => {}
            }
        }
    }

    /// Connect a system to every compatible existing system of the
    /// complementary kind. Existing connections are never overwritten.
    /// Returns the number of connections created.
    pub async fn discover_routes(&self, system_id: &SystemId) -> usize {
        let Some(registration) = self.registry.get_system(system_id) else {
            return 0;
        };
        let existing = self.registry.all_systems();
        let mut created = 0;
        for candidate in candidate_routes(&registration, &existing) {
            if self
                .registry
                .connection_for_pair(&candidate.source, &candidate.target)
                .is_some()
            {
                continue;
            }
            let options = ConnectionOptions {
                field_mapping: candidate.field_mapping,
                weight: candidate.weight,
                auto_discovered: true,
                ..ConnectionOptions::default()
            };
            match self
                .registry
                .register_connection(&candidate.source, &candidate.target, options)
                .await
            {
                Ok(connection) => {
                    info!(
                        connection = %connection.id,
                        weight = connection.weight,
                        "Route discovered"
                    );
                    created += 1;
                }
                Err(error) => {
                    debug!(source = %candidate.source, target = %candidate.target, %error, "Discovered route rejected");
                }
            }
        }
        created
    }

    // =========================================================================
    // INSPECTION & LIFECYCLE
    // =========================================================================

    /// Register a named transform for `TransformationRule::Custom`.
    pub fn register_custom_transform<F>(&self, name: impl Into<String>, transform: F)
    where
        F: Fn(&Payload) -> Result<Payload, String> + Send + Sync + 'static,
    {
        let mut customs = self.customs.write().unwrap_or_else(PoisonError::into_inner);
        customs.insert(name.into(), Arc::new(transform));
    }

    /// Current state of a flow: active flows first, then terminal history.
    pub async fn flow_status(&self, flow_id: FlowId) -> Option<Flow> {
        let state = self.state.lock().await;
        state
            .flows
            .get(&flow_id)
            .cloned()
            .or_else(|| state.history.iter().rev().find(|f| f.id == flow_id).cloned())
    }

    /// Point-in-time metrics and queue depths.
    pub async fn get_orchestrator_status(&self) -> OrchestratorStatus {
        let state = self.state.lock().await;
        let cache_size = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        let custom_transforms = self
            .customs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        let scheduled_systems = self
            .schedulers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        OrchestratorStatus {
            metrics: state.metrics,
            active_flows: state.flows.len(),
            high_queue_len: state.high_queue.len(),
            batch_queue_len: state.batch_queue.len(),
            cache_size,
            scheduled_systems,
            custom_transforms,
        }
    }

    /// Stop every background task and clear all orchestrator state. The
    /// registry is left untouched.
    pub async fn destroy(&self) {
        {
            let mut tasks = self
                .core_tasks
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            for task in tasks.drain(..) {
                task.abort();
            }
        }
        {
            let mut schedulers = self
                .schedulers
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            for (_, task) in schedulers.drain() {
                task.abort();
            }
        }
        {
            let mut state = self.state.lock().await;
            state.flows.clear();
            state.history.clear();
            state.high_queue.clear();
            state.batch_queue.clear();
        }
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.customs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        info!("Data flow orchestrator destroyed");
    }
}

impl Drop for DataFlowOrchestrator {
    fn drop(&mut self) {
        if let Ok(mut tasks) = self.core_tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
        if let Ok(mut schedulers) = self.schedulers.lock() {
            for (_, task) in schedulers.drain() {
                task.abort();
            }
        }
    }
}
