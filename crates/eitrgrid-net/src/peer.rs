//! One participant in a grid session.
//!
//! A [`GridPeer`] owns the local node registry and wires it to the cluster
//! index, the simulator, the record store and the messenger. The authority
//! simulates and replicates; an observer mirrors records and routes its
//! player's actions to the authority as requests. In a single-player
//! session the local peer is its own authority and requests short-circuit.

use crate::authority::{HandleError, RequestHandler, RequestOutcome};
use crate::fuel::{FuelReceipt, FuelRequestTracker, PendingFuel};
use crate::replication::{self, ReplicationScheduler, ReplicationSummary, Replicator};
use crate::transport::PeerMessenger;
use crate::wire::{self, EitrOfferEntry, GridMessage};
use eitrgrid_core::config::GridConfig;
use eitrgrid_core::fixed::{Fixed64, fixed64_to_f32};
use eitrgrid_core::id::{NetworkId, NodeId, PeerId, WorldObjectId};
use eitrgrid_core::node::PersistedNode;
use eitrgrid_core::position::Position;
use eitrgrid_core::record::{RecordStore, WorldRecord};
use eitrgrid_power::{
    GridSimulator, NodeKind, NodeRegistry, PowerIntensity, PowerNode, SimulationBundle, StepReport,
};
use eitrgrid_spatial::{ClusterIndex, ProximityClusterer};
use std::collections::BTreeSet;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerRole {
    Authority,
    Observer { authority: PeerId },
}

/// What one call to [`GridPeer::tick`] did.
#[derive(Debug, Default)]
pub struct PeerTick {
    pub reports: Vec<StepReport>,
    pub replication: Option<ReplicationSummary>,
    pub inbox: InboxSummary,
    pub abandoned_fuel: Vec<PendingFuel>,
}

#[derive(Debug, Default)]
pub struct InboxSummary {
    pub handled: usize,
    pub rejected: usize,
    pub reloaded: usize,
    pub fuel_receipts: Vec<FuelReceipt>,
}

pub struct GridPeer<M, S> {
    role: PeerRole,
    config: GridConfig,
    messenger: M,
    store: S,
    registry: NodeRegistry,
    clusters: ProximityClusterer,
    simulator: GridSimulator,
    replicator: Replicator,
    scheduler: ReplicationScheduler,
    requests: RequestHandler,
    fuel: FuelRequestTracker,
}

impl<M: PeerMessenger, S: RecordStore> GridPeer<M, S> {
    pub fn new(role: PeerRole, messenger: M, store: S, config: GridConfig) -> Self {
        let local = messenger.local_peer();
        Self {
            role,
            replicator: Replicator::from_config(&config.replication),
            scheduler: ReplicationScheduler::from_config(&config.replication),
            requests: RequestHandler::new(),
            fuel: FuelRequestTracker::new(local, config.fuel_request_timeout_seconds),
            config,
            messenger,
            store,
            registry: NodeRegistry::new(),
            clusters: ProximityClusterer::new(),
            simulator: GridSimulator::new(),
        }
    }

    pub fn role(&self) -> PeerRole {
        self.role
    }

    pub fn is_authority(&self) -> bool {
        self.role == PeerRole::Authority
    }

    pub fn local_peer(&self) -> PeerId {
        self.messenger.local_peer()
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut NodeRegistry {
        &mut self.registry
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn simulator(&self) -> &GridSimulator {
        &self.simulator
    }

    pub fn clusters(&self) -> &ProximityClusterer {
        &self.clusters
    }

    pub fn fuel_requests(&self) -> &FuelRequestTracker {
        &self.fuel
    }

    pub fn node(&self, world: WorldObjectId) -> Option<&PowerNode> {
        self.registry.by_world(world)
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Insert-on-load. An existing record is authoritative and loaded into
    /// the node; the authority creates the record when there is none.
    pub fn load_node(&mut self, mut node: PowerNode) -> NodeId {
        let world = node.world_object();
        match self.store.record(world) {
            Some(record) => {
                node.load(record);
            }
            None if self.is_authority() => {
                let mut record = WorldRecord::new(world);
                node.save(&mut record, self.local_peer());
                node.base_mut().clear_dirty();
                self.store.insert(record);
            }
            None => debug!(node = ?world, "loaded before its record arrived"),
        }
        self.registry.insert(node)
    }

    /// Remove-on-unload. The record stays with the persistence layer.
    pub fn unload_node(&mut self, world: WorldObjectId) -> Option<PowerNode> {
        self.registry.remove(world)
    }

    /// A loaded world object moved. Its network is recomputed next tick.
    pub fn move_node(&mut self, world: WorldObjectId, position: Position) -> bool {
        self.registry.move_node(world, position)
    }

    // -----------------------------------------------------------------------
    // Tick
    // -----------------------------------------------------------------------

    /// Process the inbox, then simulate and replicate (authority) or age
    /// outstanding fuel requests.
    pub fn tick(&mut self, dt: Fixed64) -> PeerTick {
        let mut tick = PeerTick {
            inbox: self.pump(),
            ..PeerTick::default()
        };
        tick.abandoned_fuel = self.fuel.advance(dt);
        if !self.is_authority() {
            return tick;
        }

        let bundles = self.build_bundles(dt);
        let local = self.local_peer();
        for bundle in &bundles {
            for id in bundle.node_ids() {
                let Some(world) = self.registry.get(id).map(PowerNode::world_object) else {
                    continue;
                };
                if let Some(record) = self.store.record_mut(world) {
                    record.claim_ownership(local);
                }
            }
        }
        tick.reports = self.simulator.tick(&mut self.registry, &bundles);

        if self.scheduler.update(dt) {
            tick.replication = Some(self.flush_replication());
        }
        tick
    }

    /// Run a replication pass now, regardless of the scheduler.
    pub fn flush_replication(&mut self) -> ReplicationSummary {
        self.replicator
            .replicate(&mut self.registry, &mut self.store, &mut self.messenger)
    }

    fn build_bundles(&mut self, dt: Fixed64) -> Vec<SimulationBundle> {
        self.clusters.refresh(&mut self.registry);
        let networks = self.clusters.networks();
        let mut bundles = Vec::with_capacity(networks.len());
        let mut failed = false;
        for network in &networks {
            match self
                .clusters
                .build_network_simulation_bundle(&self.registry, network, dt)
            {
                Ok(bundle) => bundles.push(bundle),
                Err(err) => {
                    warn!(network = %network, %err, "bundle unavailable, cluster index will rebuild");
                    failed = true;
                }
            }
        }
        if failed {
            self.registry.mark_topology_dirty();
        }
        let live: BTreeSet<&NetworkId> = networks.iter().collect();
        self.simulator.retain_networks(|id| live.contains(id));
        bundles
    }

    // -----------------------------------------------------------------------
    // Inbox
    // -----------------------------------------------------------------------

    /// Handle everything the messenger has delivered. Nothing here fails the
    /// tick: bad messages are logged and dropped.
    pub fn pump(&mut self) -> InboxSummary {
        let mut summary = InboxSummary::default();
        while let Some(inbound) = self.messenger.poll() {
            match self.dispatch(inbound.from, &inbound.payload, &mut summary) {
                Ok(()) => summary.handled += 1,
                Err(err) => {
                    summary.rejected += 1;
                    if err.is_missing_reference() {
                        warn!(peer = ?inbound.from, %err, "dropping message");
                    } else {
                        error!(peer = ?inbound.from, %err, "dropping message");
                    }
                }
            }
        }
        summary
    }

    fn dispatch(
        &mut self,
        from: PeerId,
        payload: &[u8],
        summary: &mut InboxSummary,
    ) -> Result<(), HandleError> {
        let message = wire::decode(payload)?;
        match message {
            GridMessage::ChangedIds { network_id, ids } => {
                summary.reloaded +=
                    replication::apply_changed_ids(&mut self.registry, &self.store, &network_id, &ids);
                Ok(())
            }
            GridMessage::FuelCommitAck { token, accepted } => {
                if let Some(receipt) = self.fuel.resolve(&token, accepted) {
                    summary.fuel_receipts.push(receipt);
                }
                Ok(())
            }
            request if self.is_authority() => self.requests.handle_request(
                &mut self.registry,
                &mut self.store,
                &mut self.messenger,
                from,
                request,
            )
            .map(|_| ()),
            request => Err(HandleError::NotARequest(request.name())),
        }
    }

    // -----------------------------------------------------------------------
    // Local player actions
    // -----------------------------------------------------------------------

    /// Ask the authority to take `amount` fuel items. Returns the token to
    /// watch for in [`InboxSummary::fuel_receipts`].
    pub fn request_fuel(&mut self, source: WorldObjectId, amount: i32) -> Result<String, HandleError> {
        let (token, message) = self.fuel.request(source, amount);
        self.route(message)?;
        Ok(token)
    }

    /// Report a device's switch and power settings. The request carries the
    /// intensity this peer currently sees so the authority can spot a stale
    /// view.
    pub fn send_consumer_state(
        &mut self,
        device: WorldObjectId,
        is_demanding: bool,
        base_power_consumption: Fixed64,
        intensity: PowerIntensity,
    ) -> Result<Option<RequestOutcome>, HandleError> {
        let node = self
            .registry
            .by_world(device)
            .ok_or(HandleError::MissingNode(device))?;
        let current = node.as_consumer().ok_or(HandleError::WrongKind {
            id: device,
            expected: NodeKind::Consumer,
        })?;
        let message = GridMessage::ConsumerStateUpdate {
            id: device,
            is_demanding,
            base_power_consumption: fixed64_to_f32(base_power_consumption),
            intensity: intensity.code(),
            expected_intensity: current.intensity().code(),
        };
        self.route(message)
    }

    /// Push the roster of characters near a conduit.
    pub fn offer_eitr(
        &mut self,
        conduit: WorldObjectId,
        entries: Vec<EitrOfferEntry>,
    ) -> Result<Option<RequestOutcome>, HandleError> {
        self.route(GridMessage::EitrOffer { id: conduit, entries })
    }

    /// Apply locally when this peer is the authority, otherwise send.
    fn route(&mut self, message: GridMessage) -> Result<Option<RequestOutcome>, HandleError> {
        match self.role {
            PeerRole::Authority => {
                let local = self.local_peer();
                self.requests.handle_request(
                    &mut self.registry,
                    &mut self.store,
                    &mut self.messenger,
                    local,
                    message,
                )
                .map(Some)
            }
            PeerRole::Observer { authority } => {
                let payload = wire::encode(&message)?;
                self.messenger.send(authority, payload);
                Ok(None)
            }
        }
    }
}
