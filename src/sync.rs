//! The validated mutation pipeline between callers and the render host.
//! Every public operation runs preprocess -> validate -> host mutation ->
//! mirror/registry update -> event, and failures come back in a uniform
//! envelope. The host is authoritative; the mirrors here are a cache.

use std::collections::VecDeque;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::coords::{CoordinateSnapshot, CoordinateSystem};
use crate::error::{FlowError, OpFailure, Result};
use crate::events::{ChangeEvent, EventBus, ListenerId};
use crate::expand;
use crate::host::RenderHost;
use crate::layout;
use crate::model::{
    ConfigState, EdgeDescriptor, EdgeEndpoint, EdgeInput, EdgePayload, FlowDocument,
    NodeDescriptor, NodeInput, NodeKind, NodePayload, Point, Rect,
};
use crate::registry;
use crate::slots::{PresetSlotManager, SlotStats, SlotView};

/// One entry in the bounded diagnostic trail of recent operations.
#[derive(Debug, Clone, Serialize)]
pub struct OpRecord {
    pub operation: &'static str,
    pub timestamp: DateTime<Utc>,
    pub ok: bool,
    pub detail: Value,
}

/// Partial update for an existing node. Absent fields are left alone;
/// `extra` entries are merged over the stored payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NodePatch {
    pub label: Option<String>,
    pub config: Option<Value>,
    pub position: Option<Point>,
    pub extra: std::collections::BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RelayoutSummary {
    pub placed: usize,
    pub levels: usize,
    pub unplaced: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct LoadSummary {
    pub nodes: usize,
    pub edges: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ReconcileSummary {
    pub nodes: usize,
    pub edges: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub nodes: usize,
    pub edges: usize,
    pub max_level: u32,
    pub canvas: Rect,
    pub slots: SlotStats,
    pub operations: u64,
    pub last_operation: Option<&'static str>,
}

pub struct GraphStateSync<H: RenderHost> {
    host: H,
    config: EngineConfig,
    coords: CoordinateSystem,
    slots: PresetSlotManager,
    events: EventBus,
    nodes: Vec<NodeDescriptor>,
    edges: Vec<EdgeDescriptor>,
    op_log: VecDeque<OpRecord>,
    op_count: u64,
    last_operation: Option<&'static str>,
}

impl<H: RenderHost> GraphStateSync<H> {
    pub fn new(host: H, config: EngineConfig) -> Self {
        let coords = CoordinateSystem::new(config.layout.origin);
        Self {
            host,
            config,
            coords,
            slots: PresetSlotManager::new(),
            events: EventBus::new(),
            nodes: Vec::new(),
            edges: Vec::new(),
            op_log: VecDeque::new(),
            op_count: 0,
            last_operation: None,
        }
    }

    pub fn with_defaults(host: H) -> Self {
        Self::new(host, EngineConfig::default())
    }

    // ------------------------------------------------------------------
    // public mutations
    // ------------------------------------------------------------------

    pub fn add_node(&mut self, input: NodeInput) -> std::result::Result<NodeDescriptor, OpFailure> {
        let debug = serde_json::to_value(&input).unwrap_or(Value::Null);
        match self.add_node_inner(&input) {
            Ok(node) => {
                self.record("addNode", true, json!({ "id": node.id }));
                Ok(node)
            }
            Err(error) => Err(self.fail("addNode", error, debug)),
        }
    }

    pub fn add_edge(&mut self, input: EdgeInput) -> std::result::Result<EdgeDescriptor, OpFailure> {
        let debug = serde_json::to_value(&input).unwrap_or(Value::Null);
        match self.add_edge_inner(&input) {
            Ok(edge) => {
                self.record("addEdge", true, json!({ "id": edge.id }));
                Ok(edge)
            }
            Err(error) => Err(self.fail("addEdge", error, debug)),
        }
    }

    pub fn update_node(
        &mut self,
        id: &str,
        patch: NodePatch,
    ) -> std::result::Result<NodeDescriptor, OpFailure> {
        let debug = json!({ "id": id });
        match self.update_node_inner(id, &patch) {
            Ok(node) => {
                self.record("updateNode", true, json!({ "id": id }));
                Ok(node)
            }
            Err(error) => Err(self.fail("updateNode", error, debug)),
        }
    }

    /// Raw move to caller-chosen coordinates; deliberate placement is not
    /// snapped to the grid.
    pub fn move_node(&mut self, id: &str, position: Point) -> std::result::Result<(), OpFailure> {
        let debug = json!({ "id": id, "x": position.x, "y": position.y });
        match self.move_node_inner(id, position) {
            Ok(()) => {
                self.record("moveNode", true, debug);
                Ok(())
            }
            Err(error) => Err(self.fail("moveNode", error, debug)),
        }
    }

    pub fn complete_node_config(
        &mut self,
        id: &str,
        config: Value,
    ) -> std::result::Result<(), OpFailure> {
        let debug = json!({ "id": id });
        match self.complete_node_config_inner(id, config) {
            Ok(()) => {
                self.record("completeNodeConfig", true, json!({ "id": id }));
                Ok(())
            }
            Err(error) => Err(self.fail("completeNodeConfig", error, debug)),
        }
    }

    /// Deletes a node and every incident edge. Returns the number of edges
    /// removed alongside the node.
    pub fn delete_node(&mut self, id: &str) -> std::result::Result<usize, OpFailure> {
        let debug = json!({ "id": id });
        match self.delete_node_inner(id) {
            Ok(removed_edges) => {
                self.record(
                    "deleteNode",
                    true,
                    json!({ "id": id, "removedEdges": removed_edges }),
                );
                Ok(removed_edges)
            }
            Err(error) => Err(self.fail("deleteNode", error, debug)),
        }
    }

    pub fn delete_edge(&mut self, id: &str) -> std::result::Result<(), OpFailure> {
        let debug = json!({ "id": id });
        match self.delete_edge_inner(id) {
            Ok(_) => {
                self.record("deleteEdge", true, json!({ "id": id }));
                Ok(())
            }
            Err(error) => Err(self.fail("deleteEdge", error, debug)),
        }
    }

    /// Fills a preset slot: creates the node at the slot position, wires
    /// the owner to it over the slot's port and branch, then marks the
    /// slot occupied. A failed placement leaves the slot empty and the
    /// graph untouched.
    pub fn add_node_at_slot(
        &mut self,
        slot_id: &str,
        kind_token: &str,
    ) -> std::result::Result<NodeDescriptor, OpFailure> {
        let debug = json!({ "slot": slot_id, "kind": kind_token });
        match self.add_node_at_slot_inner(slot_id, kind_token) {
            Ok(node) => {
                self.record(
                    "addNodeAtSlot",
                    true,
                    json!({ "slot": slot_id, "id": node.id }),
                );
                Ok(node)
            }
            Err(error) => Err(self.fail("addNodeAtSlot", error, debug)),
        }
    }

    /// Full breadth-first relayout from the start node. A flow without a
    /// start node is a no-op, not an error.
    pub fn relayout(&mut self) -> std::result::Result<RelayoutSummary, OpFailure> {
        match self.relayout_inner() {
            Ok(summary) => {
                self.record(
                    "relayout",
                    true,
                    json!({ "placed": summary.placed, "unplaced": summary.unplaced.len() }),
                );
                Ok(summary)
            }
            Err(error) => Err(self.fail("relayout", error, Value::Null)),
        }
    }

    /// Removes every cell from the host and resets the registries. The
    /// canvas size is left alone; growth is monotonic.
    pub fn clear(&mut self) -> std::result::Result<(), OpFailure> {
        match self.clear_inner() {
            Ok((nodes, edges)) => {
                self.record("clear", true, json!({ "nodes": nodes, "edges": edges }));
                Ok(())
            }
            Err(error) => Err(self.fail("clear", error, Value::Null)),
        }
    }

    pub fn set_slot_enabled(
        &mut self,
        slot_id: &str,
        enabled: bool,
    ) -> std::result::Result<(), OpFailure> {
        let debug = json!({ "slot": slot_id, "enabled": enabled });
        match self.slots.set_enabled(slot_id, enabled) {
            Ok(()) => {
                self.record("setSlotEnabled", true, debug);
                Ok(())
            }
            Err(error) => Err(self.fail("setSlotEnabled", error, debug)),
        }
    }

    /// Replays a flow document through the validated add paths. Items that
    /// fail are skipped with a warning; one bad record never aborts the
    /// rest of the load.
    pub fn load_flow(&mut self, document: &FlowDocument) -> LoadSummary {
        let mut summary = LoadSummary::default();
        for input in &document.nodes {
            match self.add_node(input.clone()) {
                Ok(_) => summary.nodes += 1,
                Err(failure) => {
                    warn!("loadFlow: skipping node: {failure}");
                    summary.skipped += 1;
                }
            }
        }
        for input in &document.edges {
            match self.add_edge(input.clone()) {
                Ok(_) => summary.edges += 1,
                Err(failure) => {
                    warn!("loadFlow: skipping edge: {failure}");
                    summary.skipped += 1;
                }
            }
        }
        self.events.emit(&ChangeEvent::FlowLoaded {
            nodes: summary.nodes,
            edges: summary.edges,
            skipped: summary.skipped,
        });
        self.record(
            "loadFlow",
            true,
            json!({
                "nodes": summary.nodes,
                "edges": summary.edges,
                "skipped": summary.skipped,
            }),
        );
        summary
    }

    /// Serializes the mirrors back into a loadable document. Preview edges
    /// are slot decoration and are not exported.
    pub fn export_flow(&self) -> FlowDocument {
        FlowDocument {
            nodes: self
                .nodes
                .iter()
                .map(|node| NodeInput {
                    id: Some(node.id.clone()),
                    kind: Some(node.data.kind.as_token().to_string()),
                    x: Some(node.x),
                    y: Some(node.y),
                    width: Some(node.width),
                    height: Some(node.height),
                    label: Some(node.label.clone()),
                    config: if node.data.config.is_null() {
                        None
                    } else {
                        Some(node.data.config.clone())
                    },
                    parent: None,
                    branch_index: None,
                    total_branches: None,
                    level: node.data.level,
                    extra: node.data.extra.clone(),
                })
                .collect(),
            edges: self
                .edges
                .iter()
                .filter(|edge| !edge.data.is_preview)
                .map(|edge| EdgeInput {
                    id: Some(edge.id.clone()),
                    source: edge.data.source_node_id.clone(),
                    target: edge.data.target_node_id.clone(),
                    source_port: Some(edge.source.port.clone()),
                    target_port: Some(edge.target.port.clone()),
                    branch_id: edge.data.branch_id.clone(),
                    label: edge.label.clone(),
                    is_preview: false,
                })
                .collect(),
        }
    }

    /// Rebuilds the mirrors, the coordinate registry, and slot occupancy
    /// from the host, which is authoritative. Recovery path after a
    /// partially-applied bulk operation.
    pub fn reconcile(&mut self) -> ReconcileSummary {
        self.nodes = self.host.nodes();
        self.edges = self.host.edges();

        self.coords.clear();
        let mut placed: Vec<&NodeDescriptor> = self
            .nodes
            .iter()
            .filter(|node| node.data.level.is_some())
            .collect();
        placed.sort_by_key(|node| (node.data.level.unwrap_or(0), node.data.level_index));
        for node in placed {
            if let Err(error) = self.coords.register_node(
                &node.id,
                node.position(),
                node.data.level.unwrap_or(0),
                None,
            ) {
                warn!("reconcile: skipping '{}': {error}", node.id);
            }
        }
        let links: Vec<(String, String)> = self
            .edges
            .iter()
            .filter(|edge| !edge.data.is_preview)
            .map(|edge| {
                (
                    edge.data.source_node_id.clone(),
                    edge.data.target_node_id.clone(),
                )
            })
            .collect();
        for (source, target) in &links {
            self.coords.link(source, target);
        }

        self.slots.clear();
        for node in &self.nodes {
            self.slots
                .init_slots(&node.id, node.data.kind, node.position());
        }
        for edge in &self.edges {
            if edge.data.is_preview {
                continue;
            }
            // an outgoing real edge on "outN" means the owner's slot N-1
            // is filled by the edge target
            let Some(index) = edge
                .source
                .port
                .strip_prefix("out")
                .and_then(|digits| digits.parse::<usize>().ok())
                .filter(|index| *index >= 1)
            else {
                continue;
            };
            let slot_id = format!("{}/slot{}", edge.data.source_node_id, index - 1);
            if self.slots.get(&slot_id).is_some() {
                let _ = self.slots.occupy(&slot_id, &edge.data.target_node_id);
            }
        }

        let summary = ReconcileSummary {
            nodes: self.nodes.len(),
            edges: self.edges.len(),
        };
        self.record(
            "reconcile",
            true,
            json!({ "nodes": summary.nodes, "edges": summary.edges }),
        );
        summary
    }

    // ------------------------------------------------------------------
    // queries
    // ------------------------------------------------------------------

    pub fn nodes(&self) -> &[NodeDescriptor] {
        &self.nodes
    }

    pub fn edges(&self) -> &[EdgeDescriptor] {
        &self.edges
    }

    pub fn node(&self, id: &str) -> Option<&NodeDescriptor> {
        self.nodes.iter().find(|node| node.id == id)
    }

    pub fn edge(&self, id: &str) -> Option<&EdgeDescriptor> {
        self.edges.iter().find(|edge| edge.id == id)
    }

    /// Whether the node may be deleted; the start node is fixed.
    pub fn is_removable(&self, id: &str) -> bool {
        self.node(id)
            .is_some_and(|node| node.data.kind != NodeKind::Start)
    }

    pub fn slots_for_node(&self, node_id: &str) -> Vec<SlotView> {
        self.slots.slots_for_node(node_id)
    }

    pub fn empty_slots(&self) -> Vec<SlotView> {
        self.slots.empty_slots()
    }

    pub fn all_slots(&self) -> Vec<SlotView> {
        self.slots.all_slots()
    }

    pub fn slot_stats(&self) -> SlotStats {
        self.slots.stats()
    }

    pub fn coordinate_snapshot(&self) -> CoordinateSnapshot {
        self.coords.snapshot()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            nodes: self.nodes.len(),
            edges: self.edges.len(),
            max_level: self.coords.max_level(),
            canvas: self.host.drawing_area(),
            slots: self.slots.stats(),
            operations: self.op_count,
            last_operation: self.last_operation,
        }
    }

    pub fn recent_operations(&self) -> Vec<OpRecord> {
        self.op_log.iter().cloned().collect()
    }

    pub fn subscribe(
        &mut self,
        event: &str,
        listener: impl FnMut(&ChangeEvent) + 'static,
    ) -> ListenerId {
        self.events.subscribe(event, listener)
    }

    pub fn unsubscribe(&mut self, id: ListenerId) {
        self.events.unsubscribe(id);
    }

    // ------------------------------------------------------------------
    // pipeline internals
    // ------------------------------------------------------------------

    /// Runs one host mutation, retrying rejections within the configured
    /// budget. Deterministic failures pass straight through.
    fn host_call<T>(
        &mut self,
        operation: &'static str,
        mut call: impl FnMut(&mut H) -> std::result::Result<T, crate::error::HostError>,
    ) -> Result<T> {
        let mut attempt = 0;
        loop {
            match call(&mut self.host) {
                Ok(value) => return Ok(value),
                Err(error) => {
                    let error = FlowError::from(error);
                    if !error.is_retryable() || attempt + 1 >= self.config.sync.host_retries {
                        return Err(error);
                    }
                    attempt += 1;
                    warn!("{operation}: host rejected attempt {attempt}, retrying");
                    thread::sleep(Duration::from_millis(self.config.sync.retry_delay_ms));
                }
            }
        }
    }

    /// Fills input gaps from the kind template and computes the placement.
    /// Returns the finished descriptor plus its level and parent.
    fn prepare_node(&self, input: &NodeInput) -> Result<(NodeDescriptor, u32, Option<String>)> {
        let kind_token = input
            .kind
            .as_deref()
            .ok_or_else(|| FlowError::validation("node kind is required"))?;
        let kind = NodeKind::from_token(kind_token)
            .ok_or_else(|| FlowError::validation(format!("unknown node kind '{kind_token}'")))?;
        let template = registry::template(kind);

        let id = match &input.id {
            Some(id) => id.clone(),
            None => format!("{}-{}", kind.as_token(), Uuid::new_v4()),
        };
        if id.trim().is_empty() {
            return Err(FlowError::validation("node id must be a non-empty string"));
        }

        let parent = input.parent.clone();
        let parent_position = match parent.as_deref() {
            Some(parent_id) => Some(
                self.coords
                    .position_of(parent_id)
                    .ok_or_else(|| FlowError::not_found("node", parent_id))?,
            ),
            None => None,
        };
        let level = layout::determine_level(parent_position.map(|entry| entry.level), input.level);

        let position = match (input.x, input.y) {
            (Some(x), Some(y)) => Point::new(x, y),
            (Some(_), None) | (None, Some(_)) => {
                return Err(FlowError::validation(
                    "node position must give both x and y, or neither",
                ));
            }
            (None, None) => {
                let branch_index = input.branch_index.unwrap_or(0);
                let total = input.total_branches.unwrap_or(1).max(1);
                let candidate = layout::position_in_level(
                    &self.config.layout,
                    level,
                    branch_index,
                    total,
                    parent_position.map(|entry| Point::new(entry.x, entry.y)),
                );
                if total > 1 {
                    // symmetric branch spread is already collision-aware
                    candidate
                } else {
                    layout::avoid_overlap(&self.config.layout, &self.coords, level, candidate)
                }
            }
        };
        if !position.is_finite() {
            return Err(FlowError::validation(format!(
                "node coordinates must be finite, got ({}, {})",
                position.x, position.y
            )));
        }
        let position = layout::snap_to_grid(position, self.config.layout.grid_size);

        let width = input.width.unwrap_or(template.size.width);
        let height = input.height.unwrap_or(template.size.height);
        if !(width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0) {
            return Err(FlowError::validation(
                "node size must be positive and finite",
            ));
        }

        let config_state = if template.needs_config && input.config.is_none() {
            ConfigState::Pending
        } else {
            ConfigState::Ready
        };
        let descriptor = NodeDescriptor {
            id,
            shape: template.shape.to_string(),
            x: position.x,
            y: position.y,
            width,
            height,
            label: input
                .label
                .clone()
                .unwrap_or_else(|| template.label.to_string()),
            data: NodePayload {
                kind,
                config: input.config.clone().unwrap_or(Value::Null),
                config_state,
                level: Some(level),
                level_index: Some(self.coords.count_in_level(level)),
                extra: input.extra.clone(),
            },
            ports: registry::ports(kind),
        };
        Ok((descriptor, level, parent))
    }

    fn check_new_node(&self, descriptor: &NodeDescriptor) -> Result<()> {
        if self.nodes.iter().any(|node| node.id == descriptor.id)
            || self.coords.contains(&descriptor.id)
            || self.host.has_cell(&descriptor.id)
        {
            return Err(FlowError::duplicate(format!(
                "node '{}' already exists",
                descriptor.id
            )));
        }
        if descriptor.data.kind == NodeKind::Start
            && self
                .nodes
                .iter()
                .any(|node| node.data.kind == NodeKind::Start)
        {
            return Err(FlowError::validation(
                "a flow can have at most one start node",
            ));
        }
        Ok(())
    }

    fn add_node_inner(&mut self, input: &NodeInput) -> Result<NodeDescriptor> {
        let (descriptor, level, parent) = self.prepare_node(input)?;
        self.check_new_node(&descriptor)?;

        // grow the surface before touching cells so a failed add leaves
        // the graph exactly as it was
        let canvas = self.config.canvas;
        let position = descriptor.position();
        if let Some(size) =
            self.host_call("addNode", |host| {
                expand::expand_if_needed(host, &canvas, position)
            })?
        {
            self.events.emit(&ChangeEvent::CanvasResized {
                width: size.width,
                height: size.height,
            });
        }

        self.host_call("addNode", |host| host.create_node(&descriptor))?;
        if let Err(error) =
            self.coords
                .register_node(&descriptor.id, position, level, parent.as_deref())
        {
            let _ = self.host.remove_cell(&descriptor.id);
            return Err(error);
        }
        self.slots
            .init_slots(&descriptor.id, descriptor.data.kind, position);
        self.nodes.push(descriptor.clone());
        self.events.emit(&ChangeEvent::NodeAdded {
            node: descriptor.clone(),
        });
        Ok(descriptor)
    }

    fn add_edge_inner(&mut self, input: &EdgeInput) -> Result<EdgeDescriptor> {
        if input.source == input.target {
            return Err(FlowError::validation("edge endpoints must differ"));
        }
        for endpoint in [&input.source, &input.target] {
            if !self.host.has_cell(endpoint) {
                return Err(FlowError::validation(format!(
                    "edge endpoint '{endpoint}' does not exist"
                )));
            }
        }
        if !input.is_preview {
            let triple = (
                input.source.as_str(),
                input.target.as_str(),
                input.branch_id.as_deref(),
            );
            if let Some(existing) = self
                .edges
                .iter()
                .find(|edge| !edge.data.is_preview && edge.triple() == triple)
            {
                // idempotent: the same real connection is created once
                debug!("addEdge: returning existing edge '{}'", existing.id);
                return Ok(existing.clone());
            }
            // the host is authoritative; an edge it already holds for the
            // triple is adopted into the mirror instead of duplicated
            if let Some(existing) = self
                .host
                .edges()
                .into_iter()
                .find(|edge| !edge.data.is_preview && edge.triple() == triple)
            {
                debug!("addEdge: adopting host edge '{}'", existing.id);
                self.coords.link(
                    &existing.data.source_node_id,
                    &existing.data.target_node_id,
                );
                self.edges.push(existing.clone());
                return Ok(existing);
            }
        }

        let descriptor = EdgeDescriptor {
            id: input
                .id
                .clone()
                .unwrap_or_else(|| format!("edge-{}", Uuid::new_v4())),
            source: EdgeEndpoint {
                cell: input.source.clone(),
                port: input
                    .source_port
                    .clone()
                    .unwrap_or_else(|| "out1".to_string()),
            },
            target: EdgeEndpoint {
                cell: input.target.clone(),
                port: input.target_port.clone().unwrap_or_else(|| "in".to_string()),
            },
            label: input.label.clone(),
            data: EdgePayload {
                branch_id: input.branch_id.clone(),
                source_node_id: input.source.clone(),
                target_node_id: input.target.clone(),
                is_preview: input.is_preview,
            },
        };
        if self.edges.iter().any(|edge| edge.id == descriptor.id)
            || self.host.has_cell(&descriptor.id)
        {
            return Err(FlowError::duplicate(format!(
                "edge '{}' already exists",
                descriptor.id
            )));
        }

        self.host_call("addEdge", |host| host.create_edge(&descriptor))?;
        if !descriptor.data.is_preview {
            self.coords.link(
                &descriptor.data.source_node_id,
                &descriptor.data.target_node_id,
            );
        }
        self.edges.push(descriptor.clone());
        self.events.emit(&ChangeEvent::EdgeAdded {
            edge: descriptor.clone(),
        });
        Ok(descriptor)
    }

    fn update_node_inner(&mut self, id: &str, patch: &NodePatch) -> Result<NodeDescriptor> {
        let index = self
            .nodes
            .iter()
            .position(|node| node.id == id)
            .ok_or_else(|| FlowError::not_found("node", id))?;
        let mut updated = self.nodes[index].clone();
        if let Some(label) = &patch.label {
            if label.trim().is_empty() {
                return Err(FlowError::validation(
                    "node label must be a non-empty string",
                ));
            }
            updated.label = label.clone();
        }
        if let Some(config) = &patch.config {
            updated.data.config = config.clone();
            updated.data.config_state = ConfigState::Ready;
        }
        if let Some(position) = patch.position {
            if !position.is_finite() {
                return Err(FlowError::validation("target position must be finite"));
            }
            updated.x = position.x;
            updated.y = position.y;
        }
        for (key, value) in &patch.extra {
            updated.data.extra.insert(key.clone(), value.clone());
        }
        if let Some(position) = patch.position {
            let canvas = self.config.canvas;
            if let Some(size) = self.host_call("updateNode", |host| {
                expand::expand_if_needed(host, &canvas, position)
            })? {
                self.events.emit(&ChangeEvent::CanvasResized {
                    width: size.width,
                    height: size.height,
                });
            }
        }
        self.host_call("updateNode", |host| host.patch_node(&updated))?;
        if let Some(position) = patch.position {
            if self.coords.contains(id) {
                self.coords.update_position(id, position)?;
            }
            self.slots.on_owner_moved(id, position);
        }
        self.nodes[index] = updated.clone();
        self.events.emit(&ChangeEvent::NodeUpdated { id: id.to_string() });
        Ok(updated)
    }

    fn move_node_inner(&mut self, id: &str, position: Point) -> Result<()> {
        let index = self
            .nodes
            .iter()
            .position(|node| node.id == id)
            .ok_or_else(|| FlowError::not_found("node", id))?;
        if !position.is_finite() {
            return Err(FlowError::validation("target position must be finite"));
        }
        let canvas = self.config.canvas;
        if let Some(size) =
            self.host_call("moveNode", |host| {
                expand::expand_if_needed(host, &canvas, position)
            })?
        {
            self.events.emit(&ChangeEvent::CanvasResized {
                width: size.width,
                height: size.height,
            });
        }
        self.host_call("moveNode", |host| host.set_node_position(id, position))?;
        if self.coords.contains(id) {
            self.coords.update_position(id, position)?;
        }
        self.slots.on_owner_moved(id, position);
        let node = &mut self.nodes[index];
        node.x = position.x;
        node.y = position.y;
        self.events.emit(&ChangeEvent::NodeMoved {
            id: id.to_string(),
            position,
        });
        Ok(())
    }

    fn complete_node_config_inner(&mut self, id: &str, config: Value) -> Result<()> {
        let index = self
            .nodes
            .iter()
            .position(|node| node.id == id)
            .ok_or_else(|| FlowError::not_found("node", id))?;
        let mut updated = self.nodes[index].clone();
        let transitioned = updated.data.config_state == ConfigState::Pending;
        updated.data.config = config;
        updated.data.config_state = ConfigState::Ready;
        self.host_call("completeNodeConfig", |host| host.patch_node(&updated))?;
        self.nodes[index] = updated;
        if transitioned {
            self.events
                .emit(&ChangeEvent::NodeConfigured { id: id.to_string() });
        } else {
            self.events.emit(&ChangeEvent::NodeUpdated { id: id.to_string() });
        }
        Ok(())
    }

    fn delete_node_inner(&mut self, id: &str) -> Result<usize> {
        let index = self
            .nodes
            .iter()
            .position(|node| node.id == id)
            .ok_or_else(|| FlowError::not_found("node", id))?;

        let incident: Vec<EdgeDescriptor> = self
            .edges
            .iter()
            .filter(|edge| edge.data.source_node_id == id || edge.data.target_node_id == id)
            .cloned()
            .collect();

        // edges go first; restore them if the node removal then fails
        let mut removed_edges: Vec<EdgeDescriptor> = Vec::new();
        for edge in &incident {
            let edge_id = edge.id.clone();
            if let Err(error) = self.host_call("deleteNode", |host| host.remove_cell(&edge_id)) {
                for restored in &removed_edges {
                    let _ = self.host.create_edge(restored);
                }
                return Err(error);
            }
            removed_edges.push(edge.clone());
        }
        if let Err(error) = self.host_call("deleteNode", |host| host.remove_cell(id)) {
            for restored in &removed_edges {
                let _ = self.host.create_edge(restored);
            }
            return Err(error);
        }

        let node = self.nodes.remove(index);
        self.edges
            .retain(|edge| edge.data.source_node_id != id && edge.data.target_node_id != id);
        self.coords.remove_node(id);
        self.slots.remove_slots_for_node(id);
        self.refresh_level_indices("deleteNode")?;
        self.events.emit(&ChangeEvent::NodeDeleted {
            id: node.id,
            removed_edges: removed_edges.len(),
        });
        Ok(removed_edges.len())
    }

    fn delete_edge_inner(&mut self, id: &str) -> Result<EdgeDescriptor> {
        let index = self
            .edges
            .iter()
            .position(|edge| edge.id == id)
            .ok_or_else(|| FlowError::not_found("edge", id))?;
        self.host_call("deleteEdge", |host| host.remove_cell(id))?;
        let removed = self.edges.remove(index);
        if !removed.data.is_preview {
            let survives = self.edges.iter().any(|edge| {
                !edge.data.is_preview
                    && edge.data.source_node_id == removed.data.source_node_id
                    && edge.data.target_node_id == removed.data.target_node_id
            });
            if !survives {
                self.coords
                    .unlink(&removed.data.source_node_id, &removed.data.target_node_id);
            }
        }
        self.events.emit(&ChangeEvent::EdgeDeleted {
            id: removed.id.clone(),
        });
        Ok(removed)
    }

    /// Brings mirrored descriptors and host cells back in step with the
    /// registry after a bucket removal re-indexed its survivors.
    fn refresh_level_indices(&mut self, operation: &'static str) -> Result<()> {
        let mut stale = Vec::new();
        for (at, node) in self.nodes.iter().enumerate() {
            let Some(entry) = self.coords.position_of(&node.id) else {
                continue;
            };
            if node.data.level == Some(entry.level) && node.data.level_index == Some(entry.index) {
                continue;
            }
            let mut next = node.clone();
            next.data.level = Some(entry.level);
            next.data.level_index = Some(entry.index);
            stale.push((at, next));
        }
        for (at, next) in stale {
            self.host_call(operation, |host| host.patch_node(&next))?;
            self.nodes[at] = next;
        }
        Ok(())
    }

    fn add_node_at_slot_inner(&mut self, slot_id: &str, kind_token: &str) -> Result<NodeDescriptor> {
        let kind = NodeKind::from_token(kind_token)
            .ok_or_else(|| FlowError::validation(format!("unknown node kind '{kind_token}'")))?;
        let placement = self.slots.plan_placement(slot_id, kind)?;
        let node = self.add_node_inner(&placement.node)?;
        if let Err(error) = self.add_edge_inner(&placement.edge) {
            let _ = self.delete_node_inner(&node.id);
            return Err(error);
        }
        self.slots.occupy(slot_id, &node.id)?;
        Ok(node)
    }

    fn relayout_inner(&mut self) -> Result<RelayoutSummary> {
        let plan = layout::plan_relayout(&self.config.layout, &self.nodes, &self.edges);
        if plan.is_empty() {
            debug!("relayout: no start node, nothing to place");
            return Ok(RelayoutSummary {
                placed: 0,
                levels: 0,
                unplaced: plan.unplaced,
            });
        }

        self.coords.clear();
        for (level, bucket) in &plan.levels {
            for id in bucket {
                let position = plan.positions[id];
                let parent = plan.parents.get(id).map(String::as_str);
                self.coords.register_node(id, position, *level, parent)?;
            }
        }
        for edge in &self.edges {
            if !edge.data.is_preview {
                self.coords
                    .link(&edge.data.source_node_id, &edge.data.target_node_id);
            }
        }

        let mut updated = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            let mut next = node.clone();
            if let Some(position) = plan.positions.get(&node.id) {
                next.x = position.x;
                next.y = position.y;
                let registered = self.coords.position_of(&node.id);
                next.data.level = registered.map(|entry| entry.level);
                next.data.level_index = registered.map(|entry| entry.index);
            } else {
                // unreachable nodes keep their position but lose their rank
                next.data.level = None;
                next.data.level_index = None;
            }
            updated.push(next);
        }
        for next in &updated {
            self.host_call("relayout", |host| host.patch_node(next))?;
            self.slots.on_owner_moved(&next.id, next.position());
        }
        self.nodes = updated;

        let canvas = self.config.canvas;
        match expand::expand_to_fit_all(&mut self.host, &canvas, &self.coords) {
            Ok(Some(size)) => self.events.emit(&ChangeEvent::CanvasResized {
                width: size.width,
                height: size.height,
            }),
            Ok(None) => {}
            Err(error) => return Err(error.into()),
        }

        let summary = RelayoutSummary {
            placed: plan.placed(),
            levels: plan.levels.len(),
            unplaced: plan.unplaced,
        };
        self.events.emit(&ChangeEvent::RelayoutApplied {
            placed: summary.placed,
            unplaced: summary.unplaced.clone(),
        });
        Ok(summary)
    }

    fn clear_inner(&mut self) -> Result<(usize, usize)> {
        let edge_ids: Vec<String> = self.edges.iter().map(|edge| edge.id.clone()).collect();
        let node_ids: Vec<String> = self.nodes.iter().map(|node| node.id.clone()).collect();
        for id in edge_ids.iter().chain(node_ids.iter()) {
            self.host_call("clear", |host| host.remove_cell(id))?;
        }
        let counts = (node_ids.len(), edge_ids.len());
        self.nodes.clear();
        self.edges.clear();
        self.coords.clear();
        self.slots.clear();
        self.events.emit(&ChangeEvent::CanvasCleared {
            nodes: counts.0,
            edges: counts.1,
        });
        Ok(counts)
    }

    fn record(&mut self, operation: &'static str, ok: bool, detail: Value) {
        self.op_log.push_back(OpRecord {
            operation,
            timestamp: Utc::now(),
            ok,
            detail,
        });
        while self.op_log.len() > self.config.sync.op_log_capacity {
            self.op_log.pop_front();
        }
        self.op_count += 1;
        self.last_operation = Some(operation);
    }

    fn fail(&mut self, operation: &'static str, error: FlowError, debug: Value) -> OpFailure {
        warn!("{operation} failed: {error}");
        self.record(operation, false, debug.clone());
        OpFailure::new(operation, error, debug)
    }
}
