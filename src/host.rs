//! The render-host boundary. The editor core never talks to a concrete
//! canvas framework; it drives this trait, and ships an in-memory
//! implementation for tests and the replay CLI.

use std::collections::BTreeMap;

use crate::error::HostError;
use crate::model::{EdgeDescriptor, NodeDescriptor, Point, Rect};

/// Mutable cell graph owned by the rendering side.
pub trait RenderHost {
    fn create_node(&mut self, node: &NodeDescriptor) -> Result<(), HostError>;
    fn create_edge(&mut self, edge: &EdgeDescriptor) -> Result<(), HostError>;
    fn remove_cell(&mut self, id: &str) -> Result<(), HostError>;
    fn has_cell(&self, id: &str) -> bool;
    fn set_node_position(&mut self, id: &str, position: Point) -> Result<(), HostError>;
    /// Syncs an existing node cell to the descriptor (label, payload,
    /// geometry).
    fn patch_node(&mut self, node: &NodeDescriptor) -> Result<(), HostError>;
    fn nodes(&self) -> Vec<NodeDescriptor>;
    fn edges(&self) -> Vec<EdgeDescriptor>;
    fn resize(&mut self, width: f64, height: f64) -> Result<(), HostError>;
    fn drawing_area(&self) -> Rect;
}

/// Reference host keeping cells in ordered maps. A disabled host refuses
/// every mutation with `HostError::Unavailable`.
#[derive(Debug, Clone)]
pub struct InMemoryHost {
    nodes: BTreeMap<String, NodeDescriptor>,
    edges: BTreeMap<String, EdgeDescriptor>,
    edge_order: Vec<String>,
    area: Rect,
    enabled: bool,
}

impl InMemoryHost {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            nodes: BTreeMap::new(),
            edges: BTreeMap::new(),
            edge_order: Vec::new(),
            area: Rect {
                x: 0.0,
                y: 0.0,
                width,
                height,
            },
            enabled: true,
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn check_enabled(&self) -> Result<(), HostError> {
        if self.enabled {
            Ok(())
        } else {
            Err(HostError::Unavailable)
        }
    }
}

impl RenderHost for InMemoryHost {
    fn create_node(&mut self, node: &NodeDescriptor) -> Result<(), HostError> {
        self.check_enabled()?;
        if self.nodes.contains_key(&node.id) || self.edges.contains_key(&node.id) {
            return Err(HostError::rejected(
                "create_node",
                format!("cell '{}' already exists", node.id),
            ));
        }
        self.nodes.insert(node.id.clone(), node.clone());
        Ok(())
    }

    fn create_edge(&mut self, edge: &EdgeDescriptor) -> Result<(), HostError> {
        self.check_enabled()?;
        if self.edges.contains_key(&edge.id) || self.nodes.contains_key(&edge.id) {
            return Err(HostError::rejected(
                "create_edge",
                format!("cell '{}' already exists", edge.id),
            ));
        }
        self.edges.insert(edge.id.clone(), edge.clone());
        self.edge_order.push(edge.id.clone());
        Ok(())
    }

    fn remove_cell(&mut self, id: &str) -> Result<(), HostError> {
        self.check_enabled()?;
        if self.nodes.remove(id).is_some() {
            return Ok(());
        }
        if self.edges.remove(id).is_some() {
            self.edge_order.retain(|existing| existing != id);
            return Ok(());
        }
        Err(HostError::rejected(
            "remove_cell",
            format!("cell '{id}' does not exist"),
        ))
    }

    fn has_cell(&self, id: &str) -> bool {
        self.nodes.contains_key(id) || self.edges.contains_key(id)
    }

    fn set_node_position(&mut self, id: &str, position: Point) -> Result<(), HostError> {
        self.check_enabled()?;
        let node = self.nodes.get_mut(id).ok_or_else(|| {
            HostError::rejected("set_node_position", format!("node '{id}' does not exist"))
        })?;
        node.x = position.x;
        node.y = position.y;
        Ok(())
    }

    fn patch_node(&mut self, node: &NodeDescriptor) -> Result<(), HostError> {
        self.check_enabled()?;
        let cell = self.nodes.get_mut(&node.id).ok_or_else(|| {
            HostError::rejected("patch_node", format!("node '{}' does not exist", node.id))
        })?;
        *cell = node.clone();
        Ok(())
    }

    fn nodes(&self) -> Vec<NodeDescriptor> {
        self.nodes.values().cloned().collect()
    }

    fn edges(&self) -> Vec<EdgeDescriptor> {
        self.edge_order
            .iter()
            .filter_map(|id| self.edges.get(id).cloned())
            .collect()
    }

    fn resize(&mut self, width: f64, height: f64) -> Result<(), HostError> {
        self.check_enabled()?;
        self.area.width = width;
        self.area.height = height;
        Ok(())
    }

    fn drawing_area(&self) -> Rect {
        self.area
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConfigState, NodeKind, NodePayload};

    fn descriptor(id: &str) -> NodeDescriptor {
        NodeDescriptor {
            id: id.to_string(),
            shape: "circle".to_string(),
            x: 0.0,
            y: 0.0,
            width: 100.0,
            height: 100.0,
            label: id.to_string(),
            data: NodePayload {
                kind: NodeKind::Sms,
                config: serde_json::Value::Null,
                config_state: ConfigState::Ready,
                level: None,
                level_index: None,
                extra: Default::default(),
            },
            ports: Vec::new(),
        }
    }

    #[test]
    fn disabled_host_refuses_mutations() {
        let mut host = InMemoryHost::new(1200.0, 800.0);
        host.set_enabled(false);
        assert_eq!(
            host.create_node(&descriptor("a")).unwrap_err(),
            HostError::Unavailable
        );
        assert!(!host.has_cell("a"));
    }

    #[test]
    fn duplicate_cell_ids_are_rejected() {
        let mut host = InMemoryHost::new(1200.0, 800.0);
        host.create_node(&descriptor("a")).unwrap();
        assert!(matches!(
            host.create_node(&descriptor("a")),
            Err(HostError::Rejected { .. })
        ));
    }
}
