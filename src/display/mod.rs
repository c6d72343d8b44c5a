//! The mesh display: wires the synchronizer, the request cycle and the cost
//! selector to a transport and a renderer sink.
//!
//! Every inbound callback goes through [`MeshDisplay::handle`] (or one of the
//! `on_*` entry points it dispatches to), so all mutation happens on whichever
//! single task owns the display.

pub mod config;
pub mod status;

pub use config::{ConfigError, DisplayConfig, DisplayType, RenderOptions};
pub use status::{DisplayStatus, StatusEntry, StatusLevel};

use crate::acquisition::{
    AcquisitionError, AcquisitionMode, Completion, MeshTransport, PendingRequest, RequestCycle,
    RequestTicket, ServiceError, ServiceNames, ServiceResponse, TopicNames,
};
use crate::costs::{CostColorMap, CostLayerSelector, CostSelectionError};
use crate::events::DisplayEvent;
use crate::mesh::validate::ValidationError;
use crate::mesh::{ColorLayer, CostLayer, GeometryPayload, MeshId, MeshSnapshot};
use crate::render::RendererSink;
use crate::sync::{AttributeSynchronizer, MergeOutcome};
use status::{STATUS_COST_LAYER, STATUS_TOPIC};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DisplayError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),
    #[error(transparent)]
    CostSelection(#[from] CostSelectionError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("subscription failed: {0}")]
    SubscriptionFailed(String),
}

pub struct MeshDisplay {
    config: DisplayConfig,
    synchronizer: AttributeSynchronizer,
    costs: CostLayerSelector,
    cycle: RequestCycle,
    transport: Box<dyn MeshTransport>,
    sink: Box<dyn RendererSink>,
    status: DisplayStatus,
    enabled: bool,
    fixed_frame: String,
}

impl MeshDisplay {
    pub fn new(
        config: DisplayConfig,
        transport: Box<dyn MeshTransport>,
        sink: Box<dyn RendererSink>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut costs = CostLayerSelector::new().with_preferred_layer(&config.active_cost_layer);
        costs.set_color_map(config.cost_color_map);
        costs.set_use_custom_limits(config.use_custom_cost_limits);
        // unused limits may be inverted; they are re-checked when enabled
        let _ = costs.set_custom_limits(config.cost_lower_limit, config.cost_upper_limit);

        log::debug!(
            "[display] created with transport '{}' and sink '{}'",
            transport.label(),
            sink.label()
        );

        Ok(Self {
            synchronizer: AttributeSynchronizer::new(config.history_capacity),
            costs,
            cycle: RequestCycle::new(),
            transport,
            sink,
            status: DisplayStatus::default(),
            enabled: false,
            fixed_frame: String::new(),
            config,
        })
    }

    pub fn config(&self) -> &DisplayConfig {
        &self.config
    }

    pub fn status(&self) -> &DisplayStatus {
        &self.status
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn fixed_frame(&self) -> &str {
        &self.fixed_frame
    }

    pub fn current(&self) -> Option<&MeshSnapshot> {
        self.synchronizer.current()
    }

    pub fn synchronizer(&self) -> &AttributeSynchronizer {
        &self.synchronizer
    }

    pub fn cost_selector(&self) -> &CostLayerSelector {
        &self.costs
    }

    pub fn request_cycle(&self) -> &RequestCycle {
        &self.cycle
    }

    /// Subscribes to the configured topics, or opens a request cycle.
    pub fn enable(&mut self) -> Result<(), DisplayError> {
        if self.enabled {
            return Ok(());
        }
        match self.config.acquisition_mode {
            AcquisitionMode::Subscribing => {
                if let Err(err) = self.transport.subscribe(&self.config.topics) {
                    self.status
                        .set(STATUS_TOPIC, StatusLevel::Error, err.to_string());
                    log::error!("[display] {err}");
                    return Err(DisplayError::SubscriptionFailed(err.to_string()));
                }
                self.enabled = true;
                log::info!(
                    "[display] subscribed to '{}'",
                    self.config.topics.geometry
                );
                Ok(())
            }
            AcquisitionMode::Requesting => {
                self.enabled = true;
                self.start_cycle()
            }
        }
    }

    pub fn disable(&mut self) {
        if !self.enabled {
            return;
        }
        self.transport.unsubscribe();
        self.reset();
        self.enabled = false;
    }

    /// Cancels in-flight requests and drops every snapshot and pending
    /// attribute.
    pub fn reset(&mut self) {
        self.cycle.cancel();
        self.synchronizer.clear();
        self.costs.clear(&self.config.active_cost_layer);
        self.status.reset();
        self.sink.on_cleared();
        log::debug!("[display] reset");
    }

    pub fn handle(&mut self, event: DisplayEvent) -> Result<(), DisplayError> {
        match event {
            DisplayEvent::Geometry(payload) => self.on_geometry(payload),
            DisplayEvent::Colors(layer) => self.on_colors(layer),
            DisplayEvent::Costs(layer) => self.on_costs(layer),
            DisplayEvent::Response { ticket, result } => self.on_response(ticket, result),
            DisplayEvent::Refresh => self.refresh(),
            DisplayEvent::Reset => {
                self.reset();
                Ok(())
            }
        }
    }

    pub fn on_geometry(&mut self, payload: GeometryPayload) -> Result<(), DisplayError> {
        if !self.accepting() {
            return Ok(());
        }
        let id = payload.mesh_id.clone();
        let outcome = self.merge(&id, |sync| sync.on_geometry(payload))?;
        if matches!(outcome, MergeOutcome::Created { .. })
            && self.config.acquisition_mode == AcquisitionMode::Subscribing
        {
            // materials have no topic; pull them once per new snapshot
            if let Some(request) = self.cycle.materials_for(&id, &self.config.services) {
                self.transport.submit(request);
            }
        }
        Ok(())
    }

    pub fn on_colors(&mut self, layer: ColorLayer) -> Result<(), DisplayError> {
        if !self.accepting() {
            return Ok(());
        }
        let id = layer.mesh_id.clone();
        self.merge(&id, |sync| sync.on_colors(layer))?;
        Ok(())
    }

    pub fn on_costs(&mut self, layer: CostLayer) -> Result<(), DisplayError> {
        if !self.accepting() {
            return Ok(());
        }
        let id = layer.mesh_id.clone();
        self.merge(&id, |sync| sync.on_costs(layer))?;
        Ok(())
    }

    /// Resumes the request cycle with a service response. Failures are
    /// recorded on the status once and returned; the current snapshot stays.
    pub fn on_response(
        &mut self,
        ticket: RequestTicket,
        result: Result<ServiceResponse, ServiceError>,
    ) -> Result<(), DisplayError> {
        let outcome = match self.cycle.complete(ticket, result) {
            Completion::Discarded => return Ok(()),
            Completion::Failed(err) => Err(err),
            Completion::Delivered { request, response } => self.deliver(request, response),
        };
        match outcome {
            Ok(()) => {
                self.status.record_acquisition_success();
                Ok(())
            }
            Err(err) => {
                self.status.record_acquisition_error(&err);
                Err(err.into())
            }
        }
    }

    /// User-triggered retry.
    pub fn refresh(&mut self) -> Result<(), DisplayError> {
        if !self.enabled {
            return Ok(());
        }
        match self.config.acquisition_mode {
            AcquisitionMode::Requesting => {
                self.cycle.cancel();
                self.start_cycle()
            }
            AcquisitionMode::Subscribing => {
                let current = self.synchronizer.current().map(|s| s.mesh_id().clone());
                if let Some(id) = current {
                    if let Some(request) = self.cycle.materials_for(&id, &self.config.services) {
                        self.transport.submit(request);
                    }
                }
                Ok(())
            }
        }
    }

    pub fn set_acquisition_mode(&mut self, mode: AcquisitionMode) -> Result<(), DisplayError> {
        if self.config.acquisition_mode == mode {
            return Ok(());
        }
        self.reconfigure(|config| config.acquisition_mode = mode)
    }

    pub fn set_topics(&mut self, topics: TopicNames) -> Result<(), DisplayError> {
        if self.config.topics == topics {
            return Ok(());
        }
        self.reconfigure(|config| config.topics = topics)
    }

    pub fn set_services(&mut self, services: ServiceNames) -> Result<(), DisplayError> {
        if self.config.services == services {
            return Ok(());
        }
        self.reconfigure(|config| config.services = services)
    }

    /// Zero is raised to one. Shrinking evicts the oldest snapshots now.
    pub fn set_history_capacity(&mut self, capacity: usize) {
        let capacity = capacity.max(1);
        self.config.history_capacity = capacity;
        let evicted = self.synchronizer.set_capacity(capacity);
        for id in &evicted {
            self.cycle.forget(id);
            self.sink.on_snapshot_evicted(id);
        }
        self.status.update_sync(self.synchronizer.stats());
    }

    pub fn set_active_cost_layer(&mut self, name: &str) -> Result<(), DisplayError> {
        if let Err(err) = self.costs.select_layer(name, self.synchronizer.current()) {
            self.status
                .set(STATUS_COST_LAYER, StatusLevel::Warn, err.to_string());
            return Err(err.into());
        }
        self.config.active_cost_layer = name.to_string();
        self.status.set(
            STATUS_COST_LAYER,
            StatusLevel::Ok,
            format!("showing '{name}'"),
        );
        self.republish_current();
        Ok(())
    }

    pub fn set_use_custom_cost_limits(&mut self, enabled: bool) -> Result<(), DisplayError> {
        if enabled {
            self.costs
                .set_custom_limits(self.config.cost_lower_limit, self.config.cost_upper_limit)?;
        }
        self.costs.set_use_custom_limits(enabled);
        self.config.use_custom_cost_limits = enabled;
        self.republish_current();
        Ok(())
    }

    pub fn set_cost_limits(&mut self, lower: f32, upper: f32) -> Result<(), DisplayError> {
        self.costs.set_custom_limits(lower, upper)?;
        self.config.cost_lower_limit = lower;
        self.config.cost_upper_limit = upper;
        if self.costs.uses_custom_limits() {
            self.republish_current();
        }
        Ok(())
    }

    pub fn set_cost_color_map(&mut self, color_map: CostColorMap) {
        self.costs.set_color_map(color_map);
        self.config.cost_color_map = color_map;
        self.republish_current();
    }

    pub fn set_render_options(&mut self, options: RenderOptions) {
        if self.config.render == options {
            return;
        }
        self.config.render = options;
        self.sink.on_render_options(&self.config.render);
        self.republish_current();
    }

    /// A new fixed frame invalidates everything on screen.
    pub fn set_fixed_frame(&mut self, frame: impl Into<String>) {
        let frame = frame.into();
        if self.fixed_frame == frame {
            return;
        }
        log::debug!("[display] fixed frame changed to '{frame}'");
        self.fixed_frame = frame;
        self.reset();
    }

    fn accepting(&mut self) -> bool {
        if !self.enabled {
            log::trace!("[display] disabled; ignoring message");
            return false;
        }
        self.status.record_message();
        true
    }

    fn reconfigure(&mut self, apply: impl FnOnce(&mut DisplayConfig)) -> Result<(), DisplayError> {
        let was_enabled = self.enabled;
        self.disable();
        apply(&mut self.config);
        if was_enabled {
            self.enable()
        } else {
            Ok(())
        }
    }

    fn start_cycle(&mut self) -> Result<(), DisplayError> {
        match self.cycle.start(&self.config.services) {
            Ok(request) => {
                self.transport.submit(request);
                Ok(())
            }
            Err(err) => {
                self.status.record_acquisition_error(&err);
                Err(err.into())
            }
        }
    }

    fn merge(
        &mut self,
        id: &MeshId,
        apply: impl FnOnce(&mut AttributeSynchronizer) -> Result<MergeOutcome, ValidationError>,
    ) -> Result<MergeOutcome, ValidationError> {
        let result = apply(&mut self.synchronizer);
        self.status.update_sync(self.synchronizer.stats());
        let outcome = result?;

        if let MergeOutcome::Created { evicted } = &outcome {
            for evicted_id in evicted {
                log::debug!("[display] {evicted_id} left the history");
                self.cycle.forget(evicted_id);
                self.sink.on_snapshot_evicted(evicted_id);
            }
        }
        if outcome.touches_snapshot() {
            self.publish(id);
        }
        Ok(outcome)
    }

    fn deliver(
        &mut self,
        request: PendingRequest,
        response: ServiceResponse,
    ) -> Result<(), AcquisitionError> {
        let kind = request.kind;
        let reject = |source: ValidationError| AcquisitionError::Rejected {
            kind: kind.clone(),
            source,
        };

        match response {
            ServiceResponse::Uuid(id) => {
                let request = self.cycle.after_uuid(id, &self.config.services)?;
                self.transport.submit(request);
            }
            ServiceResponse::Geometry(payload) => {
                let id = payload.mesh_id.clone();
                self.merge(&id, |sync| sync.on_geometry(payload))
                    .map_err(&reject)?;
                for request in self.cycle.after_geometry(&id, &self.config.services) {
                    self.transport.submit(request);
                }
            }
            ServiceResponse::VertexColors(layer) => {
                let id = layer.mesh_id.clone();
                self.merge(&id, |sync| sync.on_colors(layer))
                    .map_err(&reject)?;
            }
            ServiceResponse::VertexCosts(layers) => {
                let mut first_error = None;
                for layer in layers {
                    let id = layer.mesh_id.clone();
                    if let Err(err) = self.merge(&id, |sync| sync.on_costs(layer)) {
                        first_error.get_or_insert(err);
                    }
                }
                if let Some(err) = first_error {
                    return Err(reject(err));
                }
            }
            ServiceResponse::Materials(set) => {
                let id = set.mesh_id.clone();
                self.merge(&id, |sync| sync.on_materials(set))
                    .map_err(&reject)?;
                let missing = self
                    .synchronizer
                    .assemble(&id)
                    .and_then(MeshSnapshot::materials)
                    .map(|materials| materials.missing_textures())
                    .unwrap_or_default();
                for request in self
                    .cycle
                    .after_materials(&id, &missing, &self.config.services)
                {
                    self.transport.submit(request);
                }
            }
            ServiceResponse::Texture(image) => {
                let id = image.mesh_id.clone();
                self.merge(&id, |sync| sync.on_texture(image))
                    .map_err(&reject)?;
            }
        }
        Ok(())
    }

    fn republish_current(&mut self) {
        let current = self.synchronizer.current().map(|s| s.mesh_id().clone());
        if let Some(id) = current {
            self.publish(&id);
        }
    }

    fn publish(&mut self, id: &MeshId) {
        let Some(snapshot) = self.synchronizer.assemble(id) else {
            return;
        };
        if self.synchronizer.cache().is_current(id) && self.costs.adopt_default(snapshot) {
            log::info!(
                "[costs] adopted cost layer '{}'",
                self.costs.active_layer().unwrap_or_default()
            );
        }
        // replaced layer data may carry the previous stamp
        self.costs.refresh(snapshot);
        let overlay = match self.config.render.display_type {
            DisplayType::VertexCosts => self.costs.overlay(snapshot),
            _ => None,
        };
        self.sink.on_snapshot_ready(snapshot, overlay.as_ref());
    }
}
