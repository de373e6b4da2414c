use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::model::{Point, Size};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Margin {
    pub top: f64,
    pub left: f64,
    pub right: f64,
    pub bottom: f64,
}

impl Default for Margin {
    fn default() -> Self {
        Self {
            top: 100.0,
            left: 100.0,
            right: 100.0,
            bottom: 100.0,
        }
    }
}

/// Tunables for level assignment, in-level placement, and overlap
/// avoidance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayoutConfig {
    pub origin: Point,
    /// Horizontal spacing between siblings in one level.
    pub horizontal_spacing: f64,
    /// Vertical spacing between consecutive levels.
    pub vertical_spacing: f64,
    pub grid_size: f64,
    /// Horizontal offset between parallel branches of a splitting node.
    pub branch_offset: f64,
    /// Fraction of the horizontal spacing treated as the minimum
    /// same-level distance.
    pub overlap_factor: f64,
    /// Attempt cap for the overlap-avoidance retry loop.
    pub overlap_attempts: u32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            origin: Point { x: 400.0, y: 100.0 },
            horizontal_spacing: 200.0,
            vertical_spacing: 150.0,
            grid_size: 20.0,
            branch_offset: 120.0,
            overlap_factor: 0.8,
            overlap_attempts: 10,
        }
    }
}

impl LayoutConfig {
    pub fn min_distance(&self) -> f64 {
        self.horizontal_spacing * self.overlap_factor
    }
}

/// Tunables for monotonic canvas growth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CanvasConfig {
    pub margin: Margin,
    pub min_size: Size,
    /// Resize requests round up to the next multiple of this step.
    pub expansion_step: f64,
    /// Default cell footprint used when sizing the surface.
    pub node_size: Size,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            margin: Margin::default(),
            min_size: Size {
                width: 1200.0,
                height: 800.0,
            },
            expansion_step: 400.0,
            node_size: Size {
                width: 100.0,
                height: 100.0,
            },
        }
    }
}

/// Tunables for the host boundary and the diagnostic trail.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Retry budget for host rejections. Validation failures never retry.
    pub host_retries: u32,
    pub retry_delay_ms: u64,
    pub op_log_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            host_retries: 3,
            retry_delay_ms: 200,
            op_log_capacity: 50,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub layout: LayoutConfig,
    pub canvas: CanvasConfig,
    pub sync: SyncConfig,
}

/// Lenient override file: camelCase keys, everything optional, json5
/// syntax accepted.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ConfigFile {
    origin_x: Option<f64>,
    origin_y: Option<f64>,
    horizontal_spacing: Option<f64>,
    vertical_spacing: Option<f64>,
    grid_size: Option<f64>,
    branch_offset: Option<f64>,
    overlap_factor: Option<f64>,
    overlap_attempts: Option<u32>,
    canvas_margin: Option<f64>,
    min_canvas_width: Option<f64>,
    min_canvas_height: Option<f64>,
    expansion_step: Option<f64>,
    node_width: Option<f64>,
    node_height: Option<f64>,
    host_retries: Option<u32>,
    retry_delay_ms: Option<u64>,
    op_log_capacity: Option<usize>,
}

impl ConfigFile {
    fn apply(self, config: &mut EngineConfig) {
        if let Some(value) = self.origin_x {
            config.layout.origin.x = value;
        }
        if let Some(value) = self.origin_y {
            config.layout.origin.y = value;
        }
        if let Some(value) = self.horizontal_spacing {
            config.layout.horizontal_spacing = value;
        }
        if let Some(value) = self.vertical_spacing {
            config.layout.vertical_spacing = value;
        }
        if let Some(value) = self.grid_size {
            config.layout.grid_size = value;
        }
        if let Some(value) = self.branch_offset {
            config.layout.branch_offset = value;
        }
        if let Some(value) = self.overlap_factor {
            config.layout.overlap_factor = value;
        }
        if let Some(value) = self.overlap_attempts {
            config.layout.overlap_attempts = value;
        }
        if let Some(value) = self.canvas_margin {
            config.canvas.margin = Margin {
                top: value,
                left: value,
                right: value,
                bottom: value,
            };
        }
        if let Some(value) = self.min_canvas_width {
            config.canvas.min_size.width = value;
        }
        if let Some(value) = self.min_canvas_height {
            config.canvas.min_size.height = value;
        }
        if let Some(value) = self.expansion_step {
            config.canvas.expansion_step = value;
        }
        if let Some(value) = self.node_width {
            config.canvas.node_size.width = value;
        }
        if let Some(value) = self.node_height {
            config.canvas.node_size.height = value;
        }
        if let Some(value) = self.host_retries {
            config.sync.host_retries = value;
        }
        if let Some(value) = self.retry_delay_ms {
            config.sync.retry_delay_ms = value;
        }
        if let Some(value) = self.op_log_capacity {
            config.sync.op_log_capacity = value;
        }
    }
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    let mut config = EngineConfig::default();
    if let Some(path) = path {
        let content = std::fs::read_to_string(path)?;
        let overrides: ConfigFile = json5::from_str(&content)?;
        overrides.apply(&mut config);
    }
    Ok(config)
}
