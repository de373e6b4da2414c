//! Serializable snapshot of the whole engine: canvas, cells, slots, and
//! the coordinate registry. Used by the CLI and by golden tests.

use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use crate::coords::CoordinateSnapshot;
use crate::host::RenderHost;
use crate::model::{ConfigState, Rect};
use crate::slots::SlotState;
use crate::sync::GraphStateSync;

#[derive(Debug, Serialize)]
pub struct EngineDump {
    pub canvas: Rect,
    pub nodes: Vec<NodeDump>,
    pub edges: Vec<EdgeDump>,
    pub slots: Vec<SlotDump>,
    pub coordinates: CoordinateSnapshot,
}

#[derive(Debug, Serialize)]
pub struct NodeDump {
    pub id: String,
    pub kind: &'static str,
    pub label: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub config_state: ConfigState,
    pub level: Option<u32>,
    pub level_index: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct EdgeDump {
    pub id: String,
    pub from: String,
    pub to: String,
    pub source_port: String,
    pub target_port: String,
    pub branch_id: Option<String>,
    pub label: Option<String>,
    pub preview: bool,
}

#[derive(Debug, Serialize)]
pub struct SlotDump {
    pub id: String,
    pub owner: String,
    pub kind: &'static str,
    pub state: SlotState,
    pub x: f64,
    pub y: f64,
}

impl EngineDump {
    pub fn from_sync<H: RenderHost>(sync: &GraphStateSync<H>) -> Self {
        let nodes = sync
            .nodes()
            .iter()
            .map(|node| NodeDump {
                id: node.id.clone(),
                kind: node.data.kind.as_token(),
                label: node.label.clone(),
                x: node.x,
                y: node.y,
                width: node.width,
                height: node.height,
                config_state: node.data.config_state,
                level: node.data.level,
                level_index: node.data.level_index,
            })
            .collect();

        let edges = sync
            .edges()
            .iter()
            .map(|edge| EdgeDump {
                id: edge.id.clone(),
                from: edge.data.source_node_id.clone(),
                to: edge.data.target_node_id.clone(),
                source_port: edge.source.port.clone(),
                target_port: edge.target.port.clone(),
                branch_id: edge.data.branch_id.clone(),
                label: edge.label.clone(),
                preview: edge.data.is_preview,
            })
            .collect();

        let slots = sync
            .all_slots()
            .into_iter()
            .map(|slot| SlotDump {
                id: slot.id,
                owner: slot.node_id,
                kind: slot.kind,
                state: slot.state,
                x: slot.position.x,
                y: slot.position.y,
            })
            .collect();

        EngineDump {
            canvas: sync.host().drawing_area(),
            nodes,
            edges,
            slots,
            coordinates: sync.coordinate_snapshot(),
        }
    }
}

pub fn write_engine_dump<H: RenderHost>(
    path: &Path,
    sync: &GraphStateSync<H>,
) -> anyhow::Result<()> {
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    let dump = EngineDump::from_sync(sync);
    serde_json::to_writer_pretty(writer, &dump)?;
    Ok(())
}
