//! The registry service.
//!
//! Catalogs live behind one `std::sync::RwLock`. The lock is never held
//! across an await: subsystem handles are cloned out before any call into
//! them, and bus publishing happens after the guard is dropped.

use crate::domain::{
    Connection, ConnectionOptions, RegistrationOptions, RegistryCounts, SystemConnections,
    SystemProfile, SystemRegistration,
};
use crate::error::RegistryError;
use crate::health::{HealthDelta, HealthRecord};
use shared_bus::{EventPublisher, HealthCounts, InMemoryEventBus, IntegrationEvent};
use shared_types::{
    ConnectionId, ConnectionKind, DeterministicSystem, HealthStatus, HeuristicSystem,
    ScopeCategory, SystemHandle, SystemId, SystemKind, SystemStatus, TimeSource,
};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

#[derive(Default)]
struct Catalog {
    systems: HashMap<SystemId, SystemRegistration>,
    handles: HashMap<SystemId, SystemHandle>,
    connections: HashMap<ConnectionId, Connection>,
    health: HashMap<SystemId, HealthRecord>,
}

/// Catalog of registered subsystems, their connections, and their health.
pub struct SystemRegistry {
    catalog: RwLock<Catalog>,
    bus: Arc<InMemoryEventBus>,
    clock: Arc<dyn TimeSource>,
}

impl SystemRegistry {
    /// Create a registry publishing on the given bus.
    #[must_use]
    pub fn new(bus: Arc<InMemoryEventBus>, clock: Arc<dyn TimeSource>) -> Self {
        Self {
            catalog: RwLock::new(Catalog::default()),
            bus,
            clock,
        }
    }

    /// The bus this registry publishes on.
    #[must_use]
    pub fn bus(&self) -> &Arc<InMemoryEventBus> {
        &self.bus
    }

    /// The clock this registry reads.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn TimeSource> {
        &self.clock
    }

    fn read(&self) -> RwLockReadGuard<'_, Catalog> {
        self.catalog.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Catalog> {
        self.catalog.write().unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // REGISTRATION
    // =========================================================================

    /// Register a heuristic subsystem. Capabilities and input requirements
    /// are read from the instance.
    pub async fn register_heuristic_system(
        &self,
        id: SystemId,
        system: Arc<dyn HeuristicSystem>,
        options: RegistrationOptions,
    ) -> Result<(), RegistryError> {
        let profile = SystemProfile::Heuristic {
            capabilities: system.capabilities(),
            input_requirements: system.input_requirements(),
        };
        self.register(id, profile, SystemHandle::Heuristic(system), options)
            .await
    }

    /// Register a deterministic subsystem. Knob and channel schemas are read
    /// from the instance.
    pub async fn register_deterministic_system(
        &self,
        id: SystemId,
        system: Arc<dyn DeterministicSystem>,
        options: RegistrationOptions,
    ) -> Result<(), RegistryError> {
        let profile = SystemProfile::Deterministic {
            knobs: system.input_knobs(),
            channels: system.output_channels(),
        };
        self.register(id, profile, SystemHandle::Deterministic(system), options)
            .await
    }

    async fn register(
        &self,
        id: SystemId,
        profile: SystemProfile,
        handle: SystemHandle,
        options: RegistrationOptions,
    ) -> Result<(), RegistryError> {
        let now = self.clock.now();
        let kind = profile.kind();
        let scope = options.scope;
        let instance = options.instance.clone();

        {
            let mut catalog = self.write();
            if catalog.systems.contains_key(&id) {
                return Err(RegistryError::DuplicateSystem(id));
            }
            catalog.systems.insert(
                id.clone(),
                SystemRegistration {
                    id: id.clone(),
                    profile,
                    scope: options.scope,
                    instance: options.instance,
                    update_frequency: options.update_frequency,
                    status: SystemStatus::Active,
                    registered_at: now,
                    last_active: now,
                },
            );
            catalog.handles.insert(id.clone(), handle);
            catalog.health.insert(id.clone(), HealthRecord::new(now));
        }

        info!(system = %id, %kind, ?scope, "System registered");
        self.bus
            .publish(IntegrationEvent::SystemRegistered {
                system_id: id,
                kind,
                scope,
                instance,
            })
            .await;
        Ok(())
    }

    /// Remove a registration, its health record, and every connection where
    /// it is source or target. Returns the removed connection ids.
    pub async fn unregister_system(
        &self,
        id: &SystemId,
    ) -> Result<Vec<ConnectionId>, RegistryError> {
        let removed = {
            let mut catalog = self.write();
            if catalog.systems.remove(id).is_none() {
                return Err(RegistryError::NotFound(id.clone()));
            }
            catalog.handles.remove(id);
            catalog.health.remove(id);

            let removed: Vec<ConnectionId> = catalog
                .connections
                .values()
                .filter(|c| &c.source == id || &c.target == id)
                .map(|c| c.id.clone())
                .collect();
            for connection_id in &removed {
                catalog.connections.remove(connection_id);
            }
            removed
        };

        info!(system = %id, removed = removed.len(), "System unregistered");
        self.bus
            .publish(IntegrationEvent::SystemUnregistered {
                system_id: id.clone(),
                removed_connections: removed.clone(),
            })
            .await;
        Ok(removed)
    }

    // =========================================================================
    // CONNECTIONS
    // =========================================================================

    /// Register a directed connection between two systems.
    ///
    /// Idempotent by id: registering the same ordered pair again overwrites
    /// the existing entry. Compatibility is validated first.
    pub async fn register_connection(
        &self,
        source: &SystemId,
        target: &SystemId,
        options: ConnectionOptions,
    ) -> Result<Connection, RegistryError> {
        let kind = self.validate_system_compatibility(source, target, options.declared_kind)?;
        let id = ConnectionId::for_pair(source, target);
        let auto_discovered = options.auto_discovered;

        let connection = Connection {
            id: id.clone(),
            source: source.clone(),
            target: target.clone(),
            kind,
            field_mapping: options.field_mapping,
            transformations: options.transformations,
            priority: options.priority,
            enabled: options.enabled,
            weight: options.weight.clamp(0.0, 1.0),
            auto_discovered,
            stats: Default::default(),
        };

        {
            let mut catalog = self.write();
            catalog.connections.insert(id.clone(), connection.clone());
        }

        debug!(connection = %id, ?kind, auto_discovered, "Connection registered");
        self.bus
            .publish(IntegrationEvent::ConnectionRegistered {
                connection_id: id,
                source: source.clone(),
                target: target.clone(),
                kind,
                auto_discovered,
            })
            .await;
        Ok(connection)
    }

    /// Check whether two systems may be connected and resolve the connection
    /// kind from their endpoint kinds.
    pub fn validate_system_compatibility(
        &self,
        source: &SystemId,
        target: &SystemId,
        declared: Option<ConnectionKind>,
    ) -> Result<ConnectionKind, RegistryError> {
        let catalog = self.read();
        let src = catalog
            .systems
            .get(source)
            .ok_or_else(|| RegistryError::NotFound(source.clone()))?;
        let tgt = catalog
            .systems
            .get(target)
            .ok_or_else(|| RegistryError::NotFound(target.clone()))?;

        if !src.shares_scope_with(tgt) {
            return Err(RegistryError::CrossInstance {
                source_id: source.clone(),
                target_id: target.clone(),
            });
        }

        let resolved = ConnectionKind::from_endpoints(src.kind(), tgt.kind());
        if let Some(declared) = declared {
            if declared != resolved {
                return Err(RegistryError::KindMismatch { declared, resolved });
            }
        }
        Ok(resolved)
    }

    /// Connections touching a system, split by direction.
    #[must_use]
    pub fn get_system_connections(&self, id: &SystemId) -> SystemConnections {
        let catalog = self.read();
        let mut result = SystemConnections::default();
        for connection in catalog.connections.values() {
            if &connection.target == id {
                result.incoming.push(connection.clone());
            }
            if &connection.source == id {
                result.outgoing.push(connection.clone());
            }
        }
        result
    }

    /// The connection registered for an ordered pair, if any.
    #[must_use]
    pub fn connection_for_pair(&self, source: &SystemId, target: &SystemId) -> Option<Connection> {
        let id = ConnectionId::for_pair(source, target);
        self.read().connections.get(&id).cloned()
    }

    /// Fold one completed flow into a connection's usage stats.
    pub fn record_connection_use(
        &self,
        id: &ConnectionId,
        latency_ms: u64,
    ) -> Result<(), RegistryError> {
        let now = self.clock.now();
        let mut catalog = self.write();
        let connection = catalog
            .connections
            .get_mut(id)
            .ok_or_else(|| RegistryError::ConnectionNotFound(id.clone()))?;
        connection.stats.record(latency_ms, now);
        Ok(())
    }

    // =========================================================================
    // LOOKUPS
    // =========================================================================

    /// One registration, cloned out of the catalog.
    #[must_use]
    pub fn get_system(&self, id: &SystemId) -> Option<SystemRegistration> {
        self.read().systems.get(id).cloned()
    }

    /// Handle to a registered subsystem instance.
    pub fn system_handle(&self, id: &SystemId) -> Result<SystemHandle, RegistryError> {
        self.read()
            .handles
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(id.clone()))
    }

    /// Registrations matching a kind and scope.
    #[must_use]
    pub fn get_systems_by_category(
        &self,
        kind: SystemKind,
        scope: ScopeCategory,
    ) -> Vec<SystemRegistration> {
        self.read()
            .systems
            .values()
            .filter(|s| s.kind() == kind && s.scope == scope)
            .cloned()
            .collect()
    }

    /// All registrations, cloned. Used by route discovery.
    #[must_use]
    pub fn all_systems(&self) -> Vec<SystemRegistration> {
        self.read().systems.values().cloned().collect()
    }

    /// Systems that opted into periodic execution, with their intervals.
    #[must_use]
    pub fn scheduled_systems(&self) -> Vec<(SystemId, std::time::Duration)> {
        self.read()
            .systems
            .values()
            .filter_map(|s| s.update_frequency.map(|f| (s.id.clone(), f)))
            .collect()
    }

    /// Catalog size snapshot.
    #[must_use]
    pub fn counts(&self) -> RegistryCounts {
        let catalog = self.read();
        RegistryCounts {
            systems: catalog.systems.len(),
            connections: catalog.connections.len(),
        }
    }

    // =========================================================================
    // STATUS & HEALTH
    // =========================================================================

    /// Set a system's administrative status.
    pub fn set_system_status(
        &self,
        id: &SystemId,
        status: SystemStatus,
    ) -> Result<(), RegistryError> {
        let mut catalog = self.write();
        let system = catalog
            .systems
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.clone()))?;
        system.status = status;
        Ok(())
    }

    /// Record activity on a system.
    pub fn touch_last_active(&self, id: &SystemId) -> Result<(), RegistryError> {
        let now = self.clock.now();
        let mut catalog = self.write();
        let system = catalog
            .systems
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.clone()))?;
        system.last_active = now;
        Ok(())
    }

    /// A system's health record, cloned.
    #[must_use]
    pub fn health_record(&self, id: &SystemId) -> Option<HealthRecord> {
        self.read().health.get(id).cloned()
    }

    /// Merge counter deltas into a system's health record and recompute its
    /// status. Publishes `HealthUpdated` when the status changes.
    pub async fn update_system_health(
        &self,
        id: &SystemId,
        delta: HealthDelta,
    ) -> Result<HealthStatus, RegistryError> {
        let now = self.clock.now();
        let (previous, current) = {
            let mut catalog = self.write();
            let record = catalog
                .health
                .get_mut(id)
                .ok_or_else(|| RegistryError::NotFound(id.clone()))?;
            let previous = record.merge(&delta, now);
            (previous, record.status)
        };

        if previous != current {
            self.publish_status_change(id, current).await;
        }
        Ok(current)
    }

    /// Probe every system that exposes a liveness probe and recompute all
    /// statuses. A successful probe decays the error count by one.
    ///
    /// Returns aggregate per-status counts and publishes
    /// `HealthCheckComplete`.
    pub async fn perform_health_check(&self) -> HealthCounts {
        // Clone handles out so no probe runs under the lock.
        let probing: Vec<(SystemId, SystemHandle)> = {
            let catalog = self.read();
            catalog
                .handles
                .iter()
                .filter(|(_, h)| h.supports_probe())
                .map(|(id, h)| (id.clone(), h.clone()))
                .collect()
        };

        let mut outcomes = Vec::with_capacity(probing.len());
        for (id, handle) in probing {
            let outcome = handle.probe().await;
            if let Err(error) = &outcome {
                warn!(system = %id, %error, "Liveness probe failed");
            }
            outcomes.push((id, outcome));
        }

        let now = self.clock.now();
        let probed = outcomes.len();
        let mut transitions = Vec::new();
        let counts = {
            let mut catalog = self.write();
            for (id, outcome) in outcomes {
                let Some(record) = catalog.health.get_mut(&id) else {
                    continue;
                };
                let previous = match outcome {
                    Ok(()) => record.decay(now),
                    Err(error) => record.merge(&HealthDelta::failure(error.to_string()), now),
                };
                if previous != record.status {
                    transitions.push((id, record.status));
                }
            }

            let mut counts = HealthCounts {
                probed,
                ..Default::default()
            };
            for record in catalog.health.values() {
                match record.status {
                    HealthStatus::Healthy => counts.healthy += 1,
                    HealthStatus::Warning => counts.warning += 1,
                    HealthStatus::Critical => counts.critical += 1,
                }
            }
            counts
        };

        for (id, status) in transitions {
            self.publish_status_change(&id, status).await;
        }
        debug!(?counts, "Health check complete");
        self.bus
            .publish(IntegrationEvent::HealthCheckComplete { counts })
            .await;
        counts
    }

    async fn publish_status_change(&self, id: &SystemId, status: HealthStatus) {
        info!(system = %id, ?status, "System health status changed");
        self.bus
            .publish(IntegrationEvent::HealthUpdated {
                system_id: id.clone(),
                status,
            })
            .await;
    }
}
