//! In-memory coordinate registry: level buckets, per-node positions, and
//! downstream connection lists. Owned by the sync layer and passed by
//! reference to the layout helpers; single writer, no interior locking.

use log::warn;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::{FlowError, Result};
use crate::model::Point;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NodePosition {
    pub x: f64,
    pub y: f64,
    pub level: u32,
    pub index: usize,
}

#[derive(Debug, Clone)]
pub struct CoordinateSystem {
    origin: Point,
    levels: BTreeMap<u32, Vec<String>>,
    positions: BTreeMap<String, NodePosition>,
    connections: BTreeMap<String, Vec<String>>,
}

/// Serializable view of the registry plus derived stats.
#[derive(Debug, Clone, Serialize)]
pub struct CoordinateSnapshot {
    pub origin: Point,
    pub levels: BTreeMap<u32, Vec<String>>,
    pub positions: BTreeMap<String, NodePosition>,
    pub connections: BTreeMap<String, Vec<String>>,
    pub max_level: u32,
    pub max_nodes_per_level: usize,
}

impl CoordinateSystem {
    pub fn new(origin: Point) -> Self {
        Self {
            origin,
            levels: BTreeMap::new(),
            positions: BTreeMap::new(),
            connections: BTreeMap::new(),
        }
    }

    pub fn origin(&self) -> Point {
        self.origin
    }

    /// Records a node into its level bucket and position entry, appending
    /// it to the parent's connection list when a parent is given.
    ///
    /// Re-registering an id is rejected; the registry never overwrites in
    /// place.
    pub fn register_node(
        &mut self,
        id: &str,
        position: Point,
        level: u32,
        parent: Option<&str>,
    ) -> Result<()> {
        if self.positions.contains_key(id) {
            return Err(FlowError::duplicate(format!(
                "node '{id}' is already registered in the coordinate system"
            )));
        }
        let bucket = self.levels.entry(level).or_default();
        bucket.push(id.to_string());
        let index = bucket.len() - 1;
        self.positions.insert(
            id.to_string(),
            NodePosition {
                x: position.x,
                y: position.y,
                level,
                index,
            },
        );
        if let Some(parent) = parent {
            self.link(parent, id);
        }
        Ok(())
    }

    /// Appends `target` to `source`'s downstream list (deduplicated).
    pub fn link(&mut self, source: &str, target: &str) {
        let targets = self.connections.entry(source.to_string()).or_default();
        if !targets.iter().any(|existing| existing == target) {
            targets.push(target.to_string());
        }
    }

    /// Drops `target` from `source`'s downstream list.
    pub fn unlink(&mut self, source: &str, target: &str) {
        if let Some(targets) = self.connections.get_mut(source) {
            targets.retain(|existing| existing != target);
            if targets.is_empty() {
                self.connections.remove(source);
            }
        }
    }

    /// Cascading removal: level bucket (dropping it when empty), position
    /// entry, own connection list, and every other list naming the id.
    /// Surviving bucket members are re-indexed.
    pub fn remove_node(&mut self, id: &str) -> bool {
        let Some(position) = self.positions.remove(id) else {
            warn!("remove_node: '{id}' is not in the coordinate system");
            return false;
        };
        if let Some(bucket) = self.levels.get_mut(&position.level) {
            bucket.retain(|member| member != id);
            if bucket.is_empty() {
                self.levels.remove(&position.level);
            } else {
                for (index, member) in bucket.iter().enumerate() {
                    if let Some(entry) = self.positions.get_mut(member) {
                        entry.index = index;
                    }
                }
            }
        }
        self.connections.remove(id);
        for targets in self.connections.values_mut() {
            targets.retain(|target| target != id);
        }
        true
    }

    /// Updates a registered node's pixel position, keeping level and index.
    pub fn update_position(&mut self, id: &str, position: Point) -> Result<()> {
        let entry = self
            .positions
            .get_mut(id)
            .ok_or_else(|| FlowError::not_found("node", id))?;
        entry.x = position.x;
        entry.y = position.y;
        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.positions.contains_key(id)
    }

    pub fn position_of(&self, id: &str) -> Option<NodePosition> {
        self.positions.get(id).copied()
    }

    pub fn count_in_level(&self, level: u32) -> usize {
        self.levels.get(&level).map_or(0, Vec::len)
    }

    pub fn nodes_in_level(&self, level: u32) -> &[String] {
        self.levels.get(&level).map_or(&[], Vec::as_slice)
    }

    pub fn connections_from(&self, id: &str) -> &[String] {
        self.connections.get(id).map_or(&[], Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn max_level(&self) -> u32 {
        self.levels.keys().next_back().copied().unwrap_or(0)
    }

    pub fn max_nodes_per_level(&self) -> usize {
        self.levels.values().map(Vec::len).max().unwrap_or(0)
    }

    pub fn positions(&self) -> impl Iterator<Item = (&str, NodePosition)> {
        self.positions
            .iter()
            .map(|(id, position)| (id.as_str(), *position))
    }

    pub fn clear(&mut self) {
        self.levels.clear();
        self.positions.clear();
        self.connections.clear();
    }

    pub fn snapshot(&self) -> CoordinateSnapshot {
        CoordinateSnapshot {
            origin: self.origin,
            levels: self.levels.clone(),
            positions: self.positions.clone(),
            connections: self.connections.clone(),
            max_level: self.max_level(),
            max_nodes_per_level: self.max_nodes_per_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> CoordinateSystem {
        CoordinateSystem::new(Point::new(400.0, 100.0))
    }

    #[test]
    fn register_rejects_duplicate_ids() {
        let mut coords = registry();
        coords
            .register_node("a", Point::new(400.0, 100.0), 0, None)
            .unwrap();
        let error = coords
            .register_node("a", Point::new(0.0, 0.0), 1, None)
            .unwrap_err();
        assert!(matches!(error, FlowError::Duplicate(_)));
        // original entry is untouched
        assert_eq!(coords.position_of("a").unwrap().level, 0);
    }

    #[test]
    fn removal_cascades_and_reindexes() {
        let mut coords = registry();
        coords
            .register_node("root", Point::new(400.0, 100.0), 0, None)
            .unwrap();
        coords
            .register_node("a", Point::new(300.0, 250.0), 1, Some("root"))
            .unwrap();
        coords
            .register_node("b", Point::new(500.0, 250.0), 1, Some("root"))
            .unwrap();

        assert_eq!(coords.count_in_level(1), 2);
        assert!(coords.remove_node("a"));
        assert_eq!(coords.count_in_level(1), 1);
        assert_eq!(coords.position_of("b").unwrap().index, 0);
        assert!(!coords.connections_from("root").contains(&"a".to_string()));
        assert!(!coords.remove_node("a"));
    }

    #[test]
    fn empty_buckets_are_dropped() {
        let mut coords = registry();
        coords
            .register_node("only", Point::new(400.0, 250.0), 1, None)
            .unwrap();
        coords.remove_node("only");
        assert_eq!(coords.count_in_level(1), 0);
        assert_eq!(coords.snapshot().levels.len(), 0);
    }

    #[test]
    fn link_deduplicates_targets() {
        let mut coords = registry();
        coords
            .register_node("a", Point::new(0.0, 0.0), 0, None)
            .unwrap();
        coords.link("a", "b");
        coords.link("a", "b");
        assert_eq!(coords.connections_from("a"), ["b".to_string()]);
    }
}
