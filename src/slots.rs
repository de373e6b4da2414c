//! Preset slot lifecycle: placeholder insertion points anchored to nodes,
//! offering "add next step" before a real edge exists.

use log::debug;
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::{FlowError, Result};
use crate::model::{EdgeInput, NodeInput, NodeKind, Point};
use crate::registry::{self, SlotAllowance, SlotKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotState {
    Empty,
    Occupied,
    Disabled,
}

#[derive(Debug, Clone)]
pub struct PresetSlot {
    pub id: String,
    pub node_id: String,
    pub kind: SlotKind,
    pub label: String,
    /// Fixed offset relative to the owner; the absolute position moves
    /// rigidly with it.
    pub offset: Point,
    pub position: Point,
    /// Owner output port this slot stands in for.
    pub port: String,
    pub branch_id: Option<String>,
    pub allowed: SlotAllowance,
    pub state: SlotState,
    pub occupant: Option<String>,
}

/// Slot shape exposed to the palette UI.
#[derive(Debug, Clone, Serialize)]
pub struct SlotView {
    pub id: String,
    pub node_id: String,
    pub kind: &'static str,
    pub label: String,
    pub position: Point,
    pub allowed_kinds: Vec<NodeKind>,
    pub state: SlotState,
}

impl PresetSlot {
    fn view(&self) -> SlotView {
        SlotView {
            id: self.id.clone(),
            node_id: self.node_id.clone(),
            kind: self.kind.as_token(),
            label: self.label.clone(),
            position: self.position,
            allowed_kinds: self.allowed.allowed_kinds(),
            state: self.state,
        }
    }
}

/// Planned placement at a slot: the node and edge inputs to push through
/// the validated add path. The slot itself is untouched until the caller
/// confirms with `occupy`.
#[derive(Debug, Clone)]
pub struct SlotPlacement {
    pub slot_id: String,
    pub node: NodeInput,
    pub edge: EdgeInput,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovedSlots {
    pub deleted: Vec<String>,
    pub released: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct SlotStats {
    pub total: usize,
    pub empty: usize,
    pub occupied: usize,
    pub disabled: usize,
    pub single: usize,
    pub branch: usize,
    pub parallel: usize,
    pub terminal: usize,
}

#[derive(Debug, Clone, Default)]
pub struct PresetSlotManager {
    slots: BTreeMap<String, PresetSlot>,
}

impl PresetSlotManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Materializes the kind's slot templates at `position + offset`.
    /// Slot ids are deterministic per owner. Re-initializing an owner
    /// replaces its slots.
    pub fn init_slots(&mut self, node_id: &str, kind: NodeKind, position: Point) -> Vec<SlotView> {
        self.slots.retain(|_, slot| slot.node_id != node_id);
        let template = registry::template(kind);
        let mut views = Vec::with_capacity(template.slots.len());
        for (index, slot_template) in template.slots.iter().enumerate() {
            let slot = PresetSlot {
                id: format!("{node_id}/slot{index}"),
                node_id: node_id.to_string(),
                kind: slot_template.kind,
                label: slot_template.label.to_string(),
                offset: slot_template.offset,
                position: position.offset(slot_template.offset.x, slot_template.offset.y),
                port: format!("out{}", index + 1),
                branch_id: slot_template.branch_id.map(str::to_string),
                allowed: slot_template.allowed,
                state: SlotState::Empty,
                occupant: None,
            };
            views.push(slot.view());
            self.slots.insert(slot.id.clone(), slot);
        }
        views
    }

    /// Rigidly recomputes every owned slot's absolute position.
    pub fn on_owner_moved(&mut self, node_id: &str, position: Point) {
        for slot in self.slots.values_mut() {
            if slot.node_id == node_id {
                slot.position = position.offset(slot.offset.x, slot.offset.y);
            }
        }
    }

    /// Checks the placement preconditions and returns the node and edge
    /// inputs for the add path, generating the new node's id. Performs no
    /// mutation.
    pub fn plan_placement(&self, slot_id: &str, kind: NodeKind) -> Result<SlotPlacement> {
        let slot = self
            .slots
            .get(slot_id)
            .ok_or_else(|| FlowError::not_found("slot", slot_id))?;
        if slot.state != SlotState::Empty {
            return Err(FlowError::duplicate(format!(
                "slot '{slot_id}' is not empty"
            )));
        }
        if !slot.allowed.allows(kind) {
            return Err(FlowError::validation(format!(
                "kind '{}' is not allowed at slot '{slot_id}'",
                kind.as_token()
            )));
        }

        let node_id = format!("{}-{}", kind.as_token(), Uuid::new_v4());
        let node = NodeInput {
            id: Some(node_id.clone()),
            parent: Some(slot.node_id.clone()),
            ..NodeInput::of_kind(kind).at(slot.position.x, slot.position.y)
        };
        let mut edge = EdgeInput::between(&slot.node_id, &node_id);
        edge.source_port = Some(slot.port.clone());
        edge.target_port = Some("in".to_string());
        edge.branch_id = slot.branch_id.clone();
        edge.label = Some(slot.label.clone());
        Ok(SlotPlacement {
            slot_id: slot_id.to_string(),
            node,
            edge,
        })
    }

    pub fn occupy(&mut self, slot_id: &str, occupant: &str) -> Result<()> {
        let slot = self
            .slots
            .get_mut(slot_id)
            .ok_or_else(|| FlowError::not_found("slot", slot_id))?;
        if slot.state != SlotState::Empty {
            return Err(FlowError::duplicate(format!(
                "slot '{slot_id}' is not empty"
            )));
        }
        slot.state = SlotState::Occupied;
        slot.occupant = Some(occupant.to_string());
        Ok(())
    }

    /// Returns an occupied slot to empty. A no-op on slots that are not
    /// occupied.
    pub fn release(&mut self, slot_id: &str) -> Result<()> {
        let slot = self
            .slots
            .get_mut(slot_id)
            .ok_or_else(|| FlowError::not_found("slot", slot_id))?;
        if slot.state == SlotState::Occupied {
            slot.state = SlotState::Empty;
            slot.occupant = None;
        }
        Ok(())
    }

    /// Toggles empty/disabled; occupied slots cannot be disabled.
    pub fn set_enabled(&mut self, slot_id: &str, enabled: bool) -> Result<()> {
        let slot = self
            .slots
            .get_mut(slot_id)
            .ok_or_else(|| FlowError::not_found("slot", slot_id))?;
        match (slot.state, enabled) {
            (SlotState::Empty, false) => slot.state = SlotState::Disabled,
            (SlotState::Disabled, true) => slot.state = SlotState::Empty,
            (SlotState::Occupied, false) => {
                return Err(FlowError::validation(format!(
                    "slot '{slot_id}' is occupied and cannot be disabled"
                )));
            }
            _ => {}
        }
        Ok(())
    }

    /// Deletes every slot the node owns and releases (does not delete)
    /// every foreign slot the node occupies.
    pub fn remove_slots_for_node(&mut self, node_id: &str) -> RemovedSlots {
        let mut removed = RemovedSlots::default();
        self.slots.retain(|id, slot| {
            if slot.node_id == node_id {
                removed.deleted.push(id.clone());
                false
            } else {
                true
            }
        });
        for slot in self.slots.values_mut() {
            if slot.occupant.as_deref() == Some(node_id) {
                slot.state = SlotState::Empty;
                slot.occupant = None;
                removed.released.push(slot.id.clone());
            }
        }
        debug!(
            "slot cascade for '{node_id}': {} deleted, {} released",
            removed.deleted.len(),
            removed.released.len()
        );
        removed
    }

    pub fn get(&self, slot_id: &str) -> Option<&PresetSlot> {
        self.slots.get(slot_id)
    }

    pub fn slots_for_node(&self, node_id: &str) -> Vec<SlotView> {
        self.slots
            .values()
            .filter(|slot| slot.node_id == node_id)
            .map(PresetSlot::view)
            .collect()
    }

    pub fn empty_slots(&self) -> Vec<SlotView> {
        self.slots
            .values()
            .filter(|slot| slot.state == SlotState::Empty)
            .map(PresetSlot::view)
            .collect()
    }

    pub fn all_slots(&self) -> Vec<SlotView> {
        self.slots.values().map(PresetSlot::view).collect()
    }

    pub fn stats(&self) -> SlotStats {
        let mut stats = SlotStats::default();
        for slot in self.slots.values() {
            stats.total += 1;
            match slot.state {
                SlotState::Empty => stats.empty += 1,
                SlotState::Occupied => stats.occupied += 1,
                SlotState::Disabled => stats.disabled += 1,
            }
            match slot.kind {
                SlotKind::Single => stats.single += 1,
                SlotKind::Branch => stats.branch += 1,
                SlotKind::Parallel => stats.parallel += 1,
                SlotKind::Terminal => stats.terminal += 1,
            }
        }
        stats
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_follow_their_owner_rigidly() {
        let mut manager = PresetSlotManager::new();
        let views = manager.init_slots("start-1", NodeKind::Start, Point::new(400.0, 100.0));
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].position, Point::new(400.0, 260.0));

        manager.on_owner_moved("start-1", Point::new(100.0, 40.0));
        let moved = manager.slots_for_node("start-1");
        assert_eq!(moved[0].position, Point::new(100.0, 200.0));
    }

    #[test]
    fn occupied_slots_survive_occupant_moves_until_released() {
        let mut manager = PresetSlotManager::new();
        manager.init_slots("sms-1", NodeKind::Sms, Point::new(400.0, 250.0));
        manager.occupy("sms-1/slot0", "wait-1").unwrap();
        // moving the occupant does not free the slot
        manager.on_owner_moved("wait-1", Point::new(900.0, 900.0));
        assert_eq!(
            manager.get("sms-1/slot0").unwrap().state,
            SlotState::Occupied
        );
        manager.release("sms-1/slot0").unwrap();
        assert_eq!(manager.get("sms-1/slot0").unwrap().state, SlotState::Empty);
        // releasing an empty slot is a no-op
        manager.release("sms-1/slot0").unwrap();
    }

    #[test]
    fn placement_respects_allowed_kinds() {
        let mut manager = PresetSlotManager::new();
        manager.init_slots("split-1", NodeKind::AudienceSplit, Point::new(400.0, 250.0));
        // terminal slot only accepts the end kind
        let error = manager
            .plan_placement("split-1/slot1", NodeKind::Sms)
            .unwrap_err();
        assert!(matches!(error, FlowError::Validation(_)));
        let placement = manager
            .plan_placement("split-1/slot1", NodeKind::End)
            .unwrap();
        assert_eq!(placement.edge.branch_id.as_deref(), Some("fallback"));
        assert_eq!(placement.edge.source_port.as_deref(), Some("out2"));
        // planning does not occupy
        assert_eq!(
            manager.get("split-1/slot1").unwrap().state,
            SlotState::Empty
        );
    }

    #[test]
    fn occupied_placement_is_a_duplicate() {
        let mut manager = PresetSlotManager::new();
        manager.init_slots("start-1", NodeKind::Start, Point::new(400.0, 100.0));
        manager.occupy("start-1/slot0", "sms-1").unwrap();
        let error = manager
            .plan_placement("start-1/slot0", NodeKind::Sms)
            .unwrap_err();
        assert!(matches!(error, FlowError::Duplicate(_)));
    }

    #[test]
    fn cascade_deletes_owned_and_releases_foreign() {
        let mut manager = PresetSlotManager::new();
        manager.init_slots("a", NodeKind::AudienceSplit, Point::new(400.0, 100.0));
        manager.init_slots("b", NodeKind::Sms, Point::new(200.0, 250.0));
        manager.occupy("b/slot0", "a").unwrap();

        let removed = manager.remove_slots_for_node("a");
        assert_eq!(removed.deleted.len(), 2);
        assert_eq!(removed.released, vec!["b/slot0".to_string()]);
        assert!(manager.get("a/slot0").is_none());
        let survivor = manager.get("b/slot0").unwrap();
        assert_eq!(survivor.state, SlotState::Empty);
        assert_eq!(survivor.occupant, None);
    }

    #[test]
    fn disabled_slots_are_not_placeable() {
        let mut manager = PresetSlotManager::new();
        manager.init_slots("start-1", NodeKind::Start, Point::new(400.0, 100.0));
        manager.set_enabled("start-1/slot0", false).unwrap();
        assert!(matches!(
            manager.plan_placement("start-1/slot0", NodeKind::Sms),
            Err(FlowError::Duplicate(_))
        ));
        manager.set_enabled("start-1/slot0", true).unwrap();
        assert!(manager.plan_placement("start-1/slot0", NodeKind::Sms).is_ok());
    }
}
