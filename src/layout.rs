//! Level assignment, in-level placement, bounded overlap avoidance, grid
//! snapping, and the pure breadth-first relayout planner.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::LayoutConfig;
use crate::coords::CoordinateSystem;
use crate::model::{EdgeDescriptor, NodeDescriptor, NodeKind, Point};

/// Forced level wins; a node without a parent is a root at level 0;
/// otherwise one level below the parent.
pub fn determine_level(parent_level: Option<u32>, forced: Option<u32>) -> u32 {
    if let Some(level) = forced {
        return level;
    }
    match parent_level {
        Some(parent) => parent + 1,
        None => 0,
    }
}

/// Raw (pre-snap) position for a node in `level`. Branches of a splitting
/// parent spread symmetrically around the parent's x; a single child
/// inherits it; a root sits on the origin column.
pub fn position_in_level(
    config: &LayoutConfig,
    level: u32,
    branch_index: usize,
    total_branches: usize,
    parent: Option<Point>,
) -> Point {
    let y = config.origin.y + f64::from(level) * config.vertical_spacing;
    let x = match parent {
        Some(parent) if total_branches > 1 => {
            let total_width = (total_branches as f64 - 1.0) * config.branch_offset;
            let start_x = parent.x - total_width / 2.0;
            start_x + branch_index as f64 * config.branch_offset
        }
        Some(parent) => parent.x,
        None => config.origin.x,
    };
    Point::new(x, y)
}

/// The same-level distance predicate, kept separate from the retry loop.
pub fn too_close(candidate_x: f64, occupied_x: f64, min_distance: f64) -> bool {
    (candidate_x - occupied_x).abs() < min_distance
}

/// Nudges `candidate` right by one spacing unit while it sits closer than
/// the minimum distance to any node already in `level`. The loop is capped
/// by `overlap_attempts`; the result may still overlap once the cap is
/// exhausted.
pub fn avoid_overlap(
    config: &LayoutConfig,
    coords: &CoordinateSystem,
    level: u32,
    candidate: Point,
) -> Point {
    let min_distance = config.min_distance();
    let mut adjusted = candidate;
    let mut attempts = 0;
    while attempts < config.overlap_attempts {
        let conflict = coords.nodes_in_level(level).iter().any(|id| {
            coords
                .position_of(id)
                .is_some_and(|occupied| too_close(adjusted.x, occupied.x, min_distance))
        });
        if !conflict {
            break;
        }
        adjusted.x += config.horizontal_spacing;
        attempts += 1;
    }
    adjusted
}

/// Rounds both axes to the nearest grid multiple. Idempotent.
pub fn snap_to_grid(position: Point, grid_size: f64) -> Point {
    Point::new(
        (position.x / grid_size).round() * grid_size,
        (position.y / grid_size).round() * grid_size,
    )
}

/// Result of the pure relayout pass. Nothing is mutated while the plan is
/// built; the caller applies it afterwards.
#[derive(Debug, Clone, Default)]
pub struct RelayoutPlan {
    /// Level rank to ordered node ids.
    pub levels: BTreeMap<u32, Vec<String>>,
    /// Snapped position per placed node.
    pub positions: BTreeMap<String, Point>,
    /// BFS parent of every placed non-root node.
    pub parents: BTreeMap<String, String>,
    /// Nodes unreachable from the start node, in input order. They keep
    /// their last position and are surfaced to the caller, never silently
    /// dropped.
    pub unplaced: Vec<String>,
}

impl RelayoutPlan {
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn placed(&self) -> usize {
        self.positions.len()
    }
}

/// Pure rebuild: BFS from the start node following real (non-preview)
/// edges in their given order, then center each level bucket on the origin
/// column. A flow without a start node yields an empty plan; that is a
/// no-op, not an error.
pub fn plan_relayout(
    config: &LayoutConfig,
    nodes: &[NodeDescriptor],
    edges: &[EdgeDescriptor],
) -> RelayoutPlan {
    let mut plan = RelayoutPlan::default();

    let Some(root) = nodes.iter().find(|node| node.data.kind == NodeKind::Start) else {
        plan.unplaced = nodes.iter().map(|node| node.id.clone()).collect();
        return plan;
    };

    let mut adjacency: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for edge in edges.iter().filter(|edge| !edge.data.is_preview) {
        adjacency
            .entry(edge.data.source_node_id.as_str())
            .or_default()
            .push(edge.data.target_node_id.as_str());
    }
    let known: BTreeSet<&str> = nodes.iter().map(|node| node.id.as_str()).collect();

    let mut visited = BTreeSet::new();
    visited.insert(root.id.as_str());
    plan.levels.insert(0, vec![root.id.clone()]);

    let mut current_level = 0u32;
    while let Some(bucket) = plan.levels.get(&current_level).cloned() {
        let mut next = Vec::new();
        for parent in &bucket {
            let Some(children) = adjacency.get(parent.as_str()) else {
                continue;
            };
            for child in children {
                if visited.contains(child) || !known.contains(child) {
                    continue;
                }
                visited.insert(*child);
                next.push((*child).to_string());
                plan.parents.insert((*child).to_string(), parent.clone());
            }
        }
        if next.is_empty() {
            break;
        }
        plan.levels.insert(current_level + 1, next);
        current_level += 1;
    }

    for (level, bucket) in &plan.levels {
        let y = config.origin.y + f64::from(*level) * config.vertical_spacing;
        let total_width = (bucket.len() as f64 - 1.0) * config.horizontal_spacing;
        let start_x = config.origin.x - total_width / 2.0;
        for (index, id) in bucket.iter().enumerate() {
            let x = start_x + index as f64 * config.horizontal_spacing;
            plan.positions
                .insert(id.clone(), snap_to_grid(Point::new(x, y), config.grid_size));
        }
    }

    plan.unplaced = nodes
        .iter()
        .filter(|node| !visited.contains(node.id.as_str()))
        .map(|node| node.id.clone())
        .collect();
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConfigState, NodePayload};

    fn node(id: &str, kind: NodeKind) -> NodeDescriptor {
        NodeDescriptor {
            id: id.to_string(),
            shape: "circle".to_string(),
            x: 0.0,
            y: 0.0,
            width: 100.0,
            height: 100.0,
            label: id.to_string(),
            data: NodePayload {
                kind,
                config: serde_json::Value::Null,
                config_state: ConfigState::Ready,
                level: None,
                level_index: None,
                extra: Default::default(),
            },
            ports: Vec::new(),
        }
    }

    fn edge(source: &str, target: &str) -> EdgeDescriptor {
        use crate::model::{EdgeEndpoint, EdgePayload};
        EdgeDescriptor {
            id: format!("{source}->{target}"),
            source: EdgeEndpoint {
                cell: source.to_string(),
                port: "out1".to_string(),
            },
            target: EdgeEndpoint {
                cell: target.to_string(),
                port: "in".to_string(),
            },
            label: None,
            data: EdgePayload {
                branch_id: None,
                source_node_id: source.to_string(),
                target_node_id: target.to_string(),
                is_preview: false,
            },
        }
    }

    #[test]
    fn level_decision() {
        assert_eq!(determine_level(None, None), 0);
        assert_eq!(determine_level(Some(2), None), 3);
        assert_eq!(determine_level(Some(2), Some(7)), 7);
    }

    #[test]
    fn branch_children_spread_symmetrically() {
        let config = LayoutConfig::default();
        let parent = Point::new(400.0, 100.0);
        let positions: Vec<Point> = (0..3)
            .map(|index| {
                snap_to_grid(
                    position_in_level(&config, 1, index, 3, Some(parent)),
                    config.grid_size,
                )
            })
            .collect();
        assert_eq!(positions[0], Point::new(280.0, 250.0));
        assert_eq!(positions[1], Point::new(400.0, 250.0));
        assert_eq!(positions[2], Point::new(520.0, 250.0));
    }

    #[test]
    fn single_child_inherits_parent_column() {
        let config = LayoutConfig::default();
        let position = position_in_level(&config, 2, 0, 1, Some(Point::new(340.0, 250.0)));
        assert_eq!(position, Point::new(340.0, 400.0));
    }

    #[test]
    fn snap_is_idempotent() {
        let once = snap_to_grid(Point::new(413.0, 97.0), 20.0);
        assert_eq!(once, snap_to_grid(once, 20.0));
        assert_eq!(once, Point::new(420.0, 100.0));
    }

    #[test]
    fn overlap_loop_is_bounded() {
        let config = LayoutConfig::default();
        let mut coords = CoordinateSystem::new(config.origin);
        // wall of occupied columns wider than the attempt budget can cross
        for index in 0..(config.overlap_attempts as usize + 4) {
            coords
                .register_node(
                    &format!("n{index}"),
                    Point::new(400.0 + index as f64 * config.horizontal_spacing, 250.0),
                    1,
                    None,
                )
                .unwrap();
        }
        let adjusted = avoid_overlap(&config, &coords, 1, Point::new(400.0, 250.0));
        let shifted = (adjusted.x - 400.0) / config.horizontal_spacing;
        assert_eq!(shifted, f64::from(config.overlap_attempts));
    }

    #[test]
    fn overlap_clears_when_room_exists() {
        let config = LayoutConfig::default();
        let mut coords = CoordinateSystem::new(config.origin);
        coords
            .register_node("a", Point::new(400.0, 250.0), 1, None)
            .unwrap();
        let adjusted = avoid_overlap(&config, &coords, 1, Point::new(400.0, 250.0));
        assert!((adjusted.x - 400.0).abs() >= config.min_distance());
    }

    #[test]
    fn relayout_plan_buckets_are_exact() {
        let config = LayoutConfig::default();
        let nodes = vec![
            node("start", NodeKind::Start),
            node("split", NodeKind::AudienceSplit),
            node("sms", NodeKind::Sms),
            node("end", NodeKind::End),
            node("orphan", NodeKind::Wait),
        ];
        let edges = vec![
            edge("start", "split"),
            edge("split", "sms"),
            edge("split", "end"),
        ];
        let plan = plan_relayout(&config, &nodes, &edges);
        assert_eq!(plan.levels.len(), 3);
        assert_eq!(plan.levels[&2], vec!["sms".to_string(), "end".to_string()]);
        assert_eq!(plan.unplaced, vec!["orphan".to_string()]);
        // every reachable node appears in exactly one bucket
        let mut seen = BTreeSet::new();
        for bucket in plan.levels.values() {
            for id in bucket {
                assert!(seen.insert(id.clone()));
            }
        }
        assert_eq!(seen.len(), 4);
        assert_eq!(plan.parents["sms"], "split");
    }

    #[test]
    fn relayout_without_start_is_a_noop() {
        let config = LayoutConfig::default();
        let nodes = vec![node("sms", NodeKind::Sms)];
        let plan = plan_relayout(&config, &nodes, &[]);
        assert!(plan.is_empty());
        assert_eq!(plan.unplaced, vec!["sms".to_string()]);
    }
}
