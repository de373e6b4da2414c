//! Named change events emitted after every successful mutation, plus the
//! listener registry.

use serde::Serialize;

use crate::model::{EdgeDescriptor, NodeDescriptor, Point};

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ChangeEvent {
    NodeAdded { node: NodeDescriptor },
    NodeUpdated { id: String },
    NodeMoved { id: String, position: Point },
    NodeConfigured { id: String },
    NodeDeleted { id: String, removed_edges: usize },
    EdgeAdded { edge: EdgeDescriptor },
    EdgeDeleted { id: String },
    CanvasResized { width: f64, height: f64 },
    CanvasCleared { nodes: usize, edges: usize },
    RelayoutApplied { placed: usize, unplaced: Vec<String> },
    FlowLoaded { nodes: usize, edges: usize, skipped: usize },
}

impl ChangeEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::NodeAdded { .. } => "node:added",
            Self::NodeUpdated { .. } => "node:updated",
            Self::NodeMoved { .. } => "node:moved",
            Self::NodeConfigured { .. } => "node:configured",
            Self::NodeDeleted { .. } => "node:deleted",
            Self::EdgeAdded { .. } => "edge:added",
            Self::EdgeDeleted { .. } => "edge:deleted",
            Self::CanvasResized { .. } => "canvas:resized",
            Self::CanvasCleared { .. } => "canvas:cleared",
            Self::RelayoutApplied { .. } => "layout:applied",
            Self::FlowLoaded { .. } => "flow:loaded",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(&ChangeEvent)>;

/// Subscribe with an event name ("node:added", ...) or "*" for everything.
#[derive(Default)]
pub struct EventBus {
    listeners: Vec<(ListenerId, String, Listener)>,
    next_id: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        &mut self,
        event: &str,
        listener: impl FnMut(&ChangeEvent) + 'static,
    ) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners
            .push((id, event.to_string(), Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: ListenerId) {
        self.listeners.retain(|(existing, _, _)| *existing != id);
    }

    pub fn emit(&mut self, event: &ChangeEvent) {
        let name = event.name();
        for (_, filter, listener) in &mut self.listeners {
            if filter == "*" || filter == name {
                listener(event);
            }
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
