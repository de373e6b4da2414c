//! Monotonic canvas growth. The surface only ever gets bigger; reclaiming
//! space is out of scope.

use log::debug;

use crate::config::CanvasConfig;
use crate::coords::CoordinateSystem;
use crate::error::HostError;
use crate::host::RenderHost;
use crate::model::{Point, Size};

fn round_up_to_step(value: f64, step: f64) -> f64 {
    (value / step).ceil() * step
}

/// Grows the surface when `position` (plus the node footprint and margin)
/// would fall outside it. Requirements round up to the expansion step.
/// Returns the new surface size when a resize happened.
pub fn expand_if_needed(
    host: &mut dyn RenderHost,
    config: &CanvasConfig,
    position: Point,
) -> Result<Option<Size>, HostError> {
    let area = host.drawing_area();
    let required_width = position.x + config.node_size.width + config.margin.right;
    let required_height = position.y + config.node_size.height + config.margin.bottom;

    let mut new_width = area.width;
    let mut new_height = area.height;
    if required_width > area.width {
        new_width = round_up_to_step(required_width, config.expansion_step);
    }
    if required_height > area.height {
        new_height = round_up_to_step(required_height, config.expansion_step);
    }
    if new_width == area.width && new_height == area.height {
        return Ok(None);
    }
    host.resize(new_width, new_height)?;
    debug!("canvas expanded to {new_width} x {new_height}");
    Ok(Some(Size::new(new_width, new_height)))
}

/// Grows the surface to the bounding box of every registered position,
/// clamped to the minimum floor and never below the current size.
pub fn expand_to_fit_all(
    host: &mut dyn RenderHost,
    config: &CanvasConfig,
    coords: &CoordinateSystem,
) -> Result<Option<Size>, HostError> {
    let mut min_x = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for (_, position) in coords.positions() {
        min_x = min_x.min(position.x);
        max_x = max_x.max(position.x);
        min_y = min_y.min(position.y);
        max_y = max_y.max(position.y);
    }
    if min_x == f64::INFINITY {
        return Ok(None);
    }

    let area = host.drawing_area();
    let required_width = (max_x - min_x + config.node_size.width + config.margin.left + config.margin.right)
        .max(config.min_size.width)
        .max(area.width);
    let required_height = (max_y - min_y + config.node_size.height + config.margin.top + config.margin.bottom)
        .max(config.min_size.height)
        .max(area.height);
    if required_width == area.width && required_height == area.height {
        return Ok(None);
    }
    host.resize(required_width, required_height)?;
    debug!("canvas fitted to {required_width} x {required_height}");
    Ok(Some(Size::new(required_width, required_height)))
}
