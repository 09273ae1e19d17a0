//! Flow lifecycle scenarios: priority dispatch, retries with backoff,
//! the transformation cache, and batch-level conflict resolution.

#[cfg(test)]
mod tests {
    use crate::mocks::{PolicyAdvisor, StalledSystem, TaxModel};
    use serde_json::json;
    use shared_bus::{EventFilter, EventTopic, InMemoryEventBus, IntegrationEvent};
    use shared_types::{
        payload_from, KnobValue, ManualClock, PriorityClass, SystemId, TransformationRule,
    };
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use sw_conflict::ResolutionStrategy;
    use sw_orchestrator::{
        DataFlowOrchestrator, FlowError, FlowOptions, FlowStatus, OrchestratorConfig,
    };
    use sw_registry::{ConnectionOptions, RegistrationOptions, SystemRegistry};
    use tokio::time::{sleep, timeout};

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    fn registry() -> Arc<SystemRegistry> {
        crate::init_tracing();
        Arc::new(SystemRegistry::new(
            Arc::new(InMemoryEventBus::new()),
            Arc::new(ManualClock::starting_at(1_000)),
        ))
    }

    /// Register one advisor and one tax model joined by a pass-through
    /// connection, and start the orchestrator.
    async fn advisor_to_model() -> (
        Arc<SystemRegistry>,
        Arc<DataFlowOrchestrator>,
        Arc<PolicyAdvisor>,
        Arc<TaxModel>,
    ) {
        let registry = registry();
        let advisor = Arc::new(PolicyAdvisor::new());
        let model = Arc::new(TaxModel::new());
        registry
            .register_heuristic_system(
                SystemId::from("advisor"),
                advisor.clone(),
                RegistrationOptions::default(),
            )
            .await
            .unwrap();
        registry
            .register_deterministic_system(
                SystemId::from("tax-model"),
                model.clone(),
                RegistrationOptions::default(),
            )
            .await
            .unwrap();
        registry
            .register_connection(
                &SystemId::from("advisor"),
                &SystemId::from("tax-model"),
                ConnectionOptions::default(),
            )
            .await
            .unwrap();

        let orchestrator =
            DataFlowOrchestrator::start(registry.clone(), OrchestratorConfig::default());
        (registry, orchestrator, advisor, model)
    }

    /// Two advisors writing into one tax model, for batch conflict
    /// scenarios. Connections get the given weights, pass-through mappings.
    async fn two_advisors_to_model(
        config: OrchestratorConfig,
        weights: [f64; 2],
    ) -> (Arc<DataFlowOrchestrator>, Arc<TaxModel>) {
        let registry = registry();
        let model = Arc::new(TaxModel::new());
        registry
            .register_deterministic_system(
                SystemId::from("tax-model"),
                model.clone(),
                RegistrationOptions::default(),
            )
            .await
            .unwrap();
        for (name, weight) in [("alpha", weights[0]), ("beta", weights[1])] {
            registry
                .register_heuristic_system(
                    SystemId::from(name),
                    Arc::new(PolicyAdvisor::new()),
                    RegistrationOptions::default(),
                )
                .await
                .unwrap();
            registry
                .register_connection(
                    &SystemId::from(name),
                    &SystemId::from("tax-model"),
                    ConnectionOptions {
                        weight,
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
        }
        let orchestrator = DataFlowOrchestrator::start(registry, config);
        (orchestrator, model)
    }

    // =============================================================================
    // PRIORITY DISPATCH
    // =============================================================================

    #[tokio::test(start_paused = true)]
    async fn critical_flow_completes_before_initiate_returns() {
        let (_registry, orchestrator, _advisor, model) = advisor_to_model().await;

        let flow_id = orchestrator
            .initiate_flow(
                &SystemId::from("advisor"),
                &SystemId::from("tax-model"),
                payload_from([("tax_rate", json!(0.25))]),
                FlowOptions {
                    priority: PriorityClass::Critical,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        // Resolved synchronously: no timers were advanced.
        assert_eq!(model.assignment_count(), 1);
        let flow = orchestrator.flow_status(flow_id).await.unwrap();
        assert_eq!(flow.status, FlowStatus::Completed);

        let (knob, value, source) = model.assignments.lock().unwrap()[0].clone();
        assert_eq!(knob, "tax_rate");
        assert_eq!(value, KnobValue::Number(0.25));
        assert_eq!(source, SystemId::from("advisor"));
    }

    #[tokio::test(start_paused = true)]
    async fn batch_flow_waits_for_the_tick() {
        let (_registry, orchestrator, _advisor, model) = advisor_to_model().await;

        orchestrator
            .initiate_flow(
                &SystemId::from("advisor"),
                &SystemId::from("tax-model"),
                payload_from([("tax_rate", json!(0.3))]),
                FlowOptions::default(),
            )
            .await
            .unwrap();

        // Nothing moves before the batch interval elapses.
        sleep(Duration::from_millis(500)).await;
        assert_eq!(model.assignment_count(), 0);

        sleep(Duration::from_millis(600)).await;
        assert_eq!(model.assignment_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn high_priority_queue_is_drained_on_the_tick() {
        let (_registry, orchestrator, _advisor, model) = advisor_to_model().await;

        for value in [0.1, 0.2, 0.3] {
            orchestrator
                .initiate_flow(
                    &SystemId::from("advisor"),
                    &SystemId::from("tax-model"),
                    payload_from([("tax_rate", json!(value))]),
                    FlowOptions {
                        priority: PriorityClass::High,
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
        }

        sleep(Duration::from_millis(1_100)).await;
        // FIFO: all three delivered in submission order on one tick.
        let assignments = model.assignments.lock().unwrap();
        let values: Vec<KnobValue> = assignments.iter().map(|(_, v, _)| v.clone()).collect();
        assert_eq!(
            values,
            vec![
                KnobValue::Number(0.1),
                KnobValue::Number(0.2),
                KnobValue::Number(0.3)
            ]
        );
    }

    // =============================================================================
    // FAILURE PATHS
    // =============================================================================

    #[tokio::test(start_paused = true)]
    async fn disabled_connection_fails_immediately_without_retry() {
        let registry = registry();
        let advisor = Arc::new(PolicyAdvisor::new());
        let model = Arc::new(TaxModel::new());
        registry
            .register_heuristic_system(
                SystemId::from("advisor"),
                advisor,
                RegistrationOptions::default(),
            )
            .await
            .unwrap();
        registry
            .register_deterministic_system(
                SystemId::from("tax-model"),
                model.clone(),
                RegistrationOptions::default(),
            )
            .await
            .unwrap();
        registry
            .register_connection(
                &SystemId::from("advisor"),
                &SystemId::from("tax-model"),
                ConnectionOptions {
                    enabled: false,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let orchestrator =
            DataFlowOrchestrator::start(registry.clone(), OrchestratorConfig::default());

        let error = orchestrator
            .initiate_flow(
                &SystemId::from("advisor"),
                &SystemId::from("tax-model"),
                payload_from([("tax_rate", json!(0.5))]),
                FlowOptions {
                    priority: PriorityClass::Critical,
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(error, FlowError::ConnectionUnavailable);

        // No retry ever happens, even after the backoff window.
        sleep(Duration::from_secs(10)).await;
        assert_eq!(model.assignment_count(), 0);
        let status = orchestrator.get_orchestrator_status().await;
        assert_eq!(status.metrics.failed, 1);
        assert_eq!(status.active_flows, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_are_bounded_and_attempts_add_up() {
        let registry = registry();
        let refusing = Arc::new(PolicyAdvisor::new());
        refusing.fail_delivery.store(true, Ordering::SeqCst);
        let source = Arc::new(TaxModel::new());
        registry
            .register_deterministic_system(
                SystemId::from("tax-model"),
                source,
                RegistrationOptions::default(),
            )
            .await
            .unwrap();
        registry
            .register_heuristic_system(
                SystemId::from("advisor"),
                refusing.clone(),
                RegistrationOptions::default(),
            )
            .await
            .unwrap();
        registry
            .register_connection(
                &SystemId::from("tax-model"),
                &SystemId::from("advisor"),
                ConnectionOptions::default(),
            )
            .await
            .unwrap();
        let orchestrator =
            DataFlowOrchestrator::start(registry.clone(), OrchestratorConfig::default());

        let flow_id = orchestrator
            .initiate_flow(
                &SystemId::from("tax-model"),
                &SystemId::from("advisor"),
                payload_from([("market_health", json!(0.7))]),
                FlowOptions {
                    priority: PriorityClass::Critical,
                    max_retries: 2,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let flow = orchestrator.flow_status(flow_id).await.unwrap();
        assert_eq!(flow.status, FlowStatus::Failed);
        assert_eq!(flow.retry_count, 2);
        // Attempts = retry_count + 1.
        assert_eq!(refusing.delivery_attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_delivery_times_out() {
        let registry = registry();
        let stalled = Arc::new(StalledSystem {
            delay: Duration::from_secs(60),
        });
        let source = Arc::new(TaxModel::new());
        registry
            .register_deterministic_system(
                SystemId::from("tax-model"),
                source,
                RegistrationOptions::default(),
            )
            .await
            .unwrap();
        registry
            .register_heuristic_system(
                SystemId::from("stalled"),
                stalled,
                RegistrationOptions::default(),
            )
            .await
            .unwrap();
        registry
            .register_connection(
                &SystemId::from("tax-model"),
                &SystemId::from("stalled"),
                ConnectionOptions::default(),
            )
            .await
            .unwrap();
        let orchestrator =
            DataFlowOrchestrator::start(registry.clone(), OrchestratorConfig::default());

        let flow_id = orchestrator
            .initiate_flow(
                &SystemId::from("tax-model"),
                &SystemId::from("stalled"),
                payload_from([("market_health", json!(0.7))]),
                FlowOptions {
                    priority: PriorityClass::Critical,
                    max_retries: 0,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let flow = orchestrator.flow_status(flow_id).await.unwrap();
        assert_eq!(flow.status, FlowStatus::Failed);
        assert_eq!(flow.last_error, Some(FlowError::Timeout.to_string()));
    }

    // =============================================================================
    // TRANSFORMATION CACHE
    // =============================================================================

    #[tokio::test(start_paused = true)]
    async fn identical_payloads_hit_the_cache() {
        let registry = registry();
        let advisor = Arc::new(PolicyAdvisor::new());
        let model = Arc::new(TaxModel::new());
        registry
            .register_heuristic_system(
                SystemId::from("advisor"),
                advisor,
                RegistrationOptions::default(),
            )
            .await
            .unwrap();
        registry
            .register_deterministic_system(
                SystemId::from("tax-model"),
                model.clone(),
                RegistrationOptions::default(),
            )
            .await
            .unwrap();
        registry
            .register_connection(
                &SystemId::from("advisor"),
                &SystemId::from("tax-model"),
                ConnectionOptions {
                    transformations: vec![TransformationRule::Custom {
                        name: "count".into(),
                    }],
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let orchestrator =
            DataFlowOrchestrator::start(registry.clone(), OrchestratorConfig::default());

        let invocations = Arc::new(AtomicU64::new(0));
        let counter = invocations.clone();
        orchestrator.register_custom_transform("count", move |payload| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(payload.clone())
        });

        let advisor_id = SystemId::from("advisor");
        let model_id = SystemId::from("tax-model");
        let send = |value: f64| {
            orchestrator.initiate_flow(
                &advisor_id,
                &model_id,
                payload_from([("tax_rate", json!(value))]),
                FlowOptions {
                    priority: PriorityClass::Critical,
                    ..Default::default()
                },
            )
        };

        send(0.2).await.unwrap();
        send(0.2).await.unwrap();
        assert_eq!(invocations.load(Ordering::SeqCst), 1);

        send(0.4).await.unwrap();
        assert_eq!(invocations.load(Ordering::SeqCst), 2);

        assert_eq!(model.assignment_count(), 3);
        let status = orchestrator.get_orchestrator_status().await;
        assert_eq!(status.cache_size, 2);
    }

    // =============================================================================
    // CONFLICT RESOLUTION
    // =============================================================================

    #[tokio::test(start_paused = true)]
    async fn priority_strategy_picks_the_highest_class() {
        let registry = registry();
        let alpha = Arc::new(PolicyAdvisor::new());
        let beta = Arc::new(PolicyAdvisor::new());
        let model = Arc::new(TaxModel::new());
        registry
            .register_heuristic_system(
                SystemId::from("alpha"),
                alpha,
                RegistrationOptions::default(),
            )
            .await
            .unwrap();
        registry
            .register_heuristic_system(
                SystemId::from("beta"),
                beta,
                RegistrationOptions::default(),
            )
            .await
            .unwrap();
        registry
            .register_deterministic_system(
                SystemId::from("tax-model"),
                model.clone(),
                RegistrationOptions::default(),
            )
            .await
            .unwrap();
        for source in ["alpha", "beta"] {
            registry
                .register_connection(
                    &SystemId::from(source),
                    &SystemId::from("tax-model"),
                    ConnectionOptions::default(),
                )
                .await
                .unwrap();
        }
        let orchestrator =
            DataFlowOrchestrator::start(registry.clone(), OrchestratorConfig::default());
        let mut conflicts =
            registry.bus().subscribe(EventFilter::topics(vec![EventTopic::Flows]));

        // Same batch, same target field, different priorities.
        orchestrator
            .initiate_flow(
                &SystemId::from("alpha"),
                &SystemId::from("tax-model"),
                payload_from([("tax_rate", json!(0.3))]),
                FlowOptions {
                    priority: PriorityClass::Low,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let winner_id = orchestrator
            .initiate_flow(
                &SystemId::from("beta"),
                &SystemId::from("tax-model"),
                payload_from([("tax_rate", json!(0.6))]),
                FlowOptions::default(),
            )
            .await
            .unwrap();

        sleep(Duration::from_millis(1_100)).await;

        // Only the winner's value lands.
        let assignments = model.assignments.lock().unwrap();
        assert_eq!(assignments.len(), 1);
        assert_eq!(assignments[0].1, KnobValue::Number(0.6));
        assert_eq!(assignments[0].2, SystemId::from("beta"));
        drop(assignments);

        let resolved = loop {
            let event = timeout(Duration::from_secs(1), conflicts.recv())
                .await
                .expect("event timeout")
                .expect("bus closed");
            if let IntegrationEvent::ConflictResolved { target, fields, winner } = event {
                break (target, fields, winner);
            }
        };
        assert_eq!(resolved.0, SystemId::from("tax-model"));
        assert_eq!(resolved.1, vec!["tax_rate".to_string()]);
        assert_eq!(resolved.2, winner_id);

        let status = orchestrator.get_orchestrator_status().await;
        assert_eq!(status.metrics.conflicts_resolved, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn average_strategy_delivers_the_mean_of_the_batch() {
        let config = OrchestratorConfig {
            strategy: ResolutionStrategy::Average,
            ..Default::default()
        };
        let (orchestrator, model) = two_advisors_to_model(config, [0.5, 0.5]).await;

        orchestrator
            .initiate_flow(
                &SystemId::from("alpha"),
                &SystemId::from("tax-model"),
                payload_from([("tax_rate", json!(0.25))]),
                FlowOptions::default(),
            )
            .await
            .unwrap();
        orchestrator
            .initiate_flow(
                &SystemId::from("beta"),
                &SystemId::from("tax-model"),
                payload_from([("tax_rate", json!(0.75))]),
                FlowOptions::default(),
            )
            .await
            .unwrap();

        sleep(Duration::from_millis(1_100)).await;

        // Exactly one write lands: the mean, credited to the first arrival.
        let assignments = model.assignments.lock().unwrap();
        assert_eq!(assignments.len(), 1);
        assert_eq!(assignments[0].1, KnobValue::Number(0.5));
        assert_eq!(assignments[0].2, SystemId::from("alpha"));
        drop(assignments);

        let status = orchestrator.get_orchestrator_status().await;
        assert_eq!(status.metrics.conflicts_resolved, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn weight_strategy_prefers_the_heavier_connection() {
        let config = OrchestratorConfig {
            strategy: ResolutionStrategy::Weight,
            ..Default::default()
        };
        let (orchestrator, model) = two_advisors_to_model(config, [0.2, 0.9]).await;

        orchestrator
            .initiate_flow(
                &SystemId::from("alpha"),
                &SystemId::from("tax-model"),
                payload_from([("tax_rate", json!(0.3))]),
                FlowOptions::default(),
            )
            .await
            .unwrap();
        orchestrator
            .initiate_flow(
                &SystemId::from("beta"),
                &SystemId::from("tax-model"),
                payload_from([("tax_rate", json!(0.6))]),
                FlowOptions::default(),
            )
            .await
            .unwrap();

        sleep(Duration::from_millis(1_100)).await;

        let assignments = model.assignments.lock().unwrap();
        assert_eq!(assignments.len(), 1);
        assert_eq!(assignments[0].1, KnobValue::Number(0.6));
        assert_eq!(assignments[0].2, SystemId::from("beta"));
    }

    // =============================================================================
    // EVENTS
    // =============================================================================

    #[tokio::test(start_paused = true)]
    async fn flow_lifecycle_is_published() {
        let (registry, orchestrator, _advisor, _model) = advisor_to_model().await;
        let mut events =
            registry.bus().subscribe(EventFilter::topics(vec![EventTopic::Flows]));

        let flow_id = orchestrator
            .initiate_flow(
                &SystemId::from("advisor"),
                &SystemId::from("tax-model"),
                payload_from([("tax_rate", json!(0.25))]),
                FlowOptions {
                    priority: PriorityClass::Critical,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let first = timeout(Duration::from_secs(1), events.recv())
            .await
            .expect("event timeout")
            .expect("bus closed");
        assert!(
            matches!(first, IntegrationEvent::FlowInitiated { flow_id: id, .. } if id == flow_id)
        );
        let second = timeout(Duration::from_secs(1), events.recv())
            .await
            .expect("event timeout")
            .expect("bus closed");
        assert!(
            matches!(second, IntegrationEvent::FlowCompleted { flow_id: id, .. } if id == flow_id)
        );
    }

    // =============================================================================
    // TEARDOWN
    // =============================================================================

    #[tokio::test(start_paused = true)]
    async fn destroy_clears_queues_and_stops_processing() {
        let (_registry, orchestrator, _advisor, model) = advisor_to_model().await;

        orchestrator
            .initiate_flow(
                &SystemId::from("advisor"),
                &SystemId::from("tax-model"),
                payload_from([("tax_rate", json!(0.3))]),
                FlowOptions::default(),
            )
            .await
            .unwrap();
        orchestrator.destroy().await;

        sleep(Duration::from_secs(3)).await;
        assert_eq!(model.assignment_count(), 0);
        let status = orchestrator.get_orchestrator_status().await;
        assert_eq!(status.batch_queue_len, 0);
        assert_eq!(status.active_flows, 0);
        assert_eq!(status.scheduled_systems, 0);
    }
}
