//! Total template table for the node palette: label, shape, default size,
//! ports, and the preset-slot layout each kind owns.

use once_cell::sync::Lazy;
use std::collections::BTreeMap;

use crate::model::{NodeKind, Point, PortDescriptor, PortGroup, Size};

/// Which node kinds may fill a preset slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotAllowance {
    /// Any palette kind except a second start node.
    AnyButStart,
    /// Terminal slots accept only the end kind.
    EndOnly,
}

impl SlotAllowance {
    pub fn allows(self, kind: NodeKind) -> bool {
        match self {
            Self::AnyButStart => kind != NodeKind::Start,
            Self::EndOnly => kind == NodeKind::End,
        }
    }

    pub fn allowed_kinds(self) -> Vec<NodeKind> {
        NodeKind::ALL
            .into_iter()
            .filter(|kind| self.allows(*kind))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    Single,
    Branch,
    Parallel,
    Terminal,
}

impl SlotKind {
    pub fn as_token(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Branch => "branch",
            Self::Parallel => "parallel",
            Self::Terminal => "terminal",
        }
    }
}

/// Declarative slot template; materialized into concrete slots when a node
/// of the owning kind is created.
#[derive(Debug, Clone, Copy)]
pub struct SlotTemplate {
    pub kind: SlotKind,
    pub offset: Point,
    pub label: &'static str,
    pub branch_id: Option<&'static str>,
    pub allowed: SlotAllowance,
}

#[derive(Debug, Clone, Copy)]
pub struct KindTemplate {
    pub kind: NodeKind,
    pub label: &'static str,
    pub shape: &'static str,
    pub size: Size,
    pub outputs: usize,
    /// Whether the kind carries business configuration that may arrive
    /// after the node is created.
    pub needs_config: bool,
    pub slots: &'static [SlotTemplate],
}

const NODE_SIZE: Size = Size {
    width: 100.0,
    height: 100.0,
};

const SINGLE_NEXT: &[SlotTemplate] = &[SlotTemplate {
    kind: SlotKind::Single,
    offset: Point { x: 0.0, y: 150.0 },
    label: "Next step",
    branch_id: None,
    allowed: SlotAllowance::AnyButStart,
}];

const TEMPLATES: &[KindTemplate] = &[
    KindTemplate {
        kind: NodeKind::Start,
        label: "Start",
        shape: "circle",
        size: NODE_SIZE,
        outputs: 1,
        needs_config: false,
        slots: &[SlotTemplate {
            kind: SlotKind::Single,
            offset: Point { x: 0.0, y: 160.0 },
            label: "Next step",
            branch_id: None,
            allowed: SlotAllowance::AnyButStart,
        }],
    },
    KindTemplate {
        kind: NodeKind::AudienceSplit,
        label: "Audience split",
        shape: "circle",
        size: NODE_SIZE,
        outputs: 2,
        needs_config: true,
        slots: &[
            SlotTemplate {
                kind: SlotKind::Branch,
                offset: Point {
                    x: -120.0,
                    y: 160.0,
                },
                label: "Match",
                branch_id: Some("match"),
                allowed: SlotAllowance::AnyButStart,
            },
            SlotTemplate {
                kind: SlotKind::Terminal,
                offset: Point { x: 120.0, y: 160.0 },
                label: "Fallback",
                branch_id: Some("fallback"),
                allowed: SlotAllowance::EndOnly,
            },
        ],
    },
    KindTemplate {
        kind: NodeKind::EventSplit,
        label: "Event split",
        shape: "circle",
        size: NODE_SIZE,
        outputs: 2,
        needs_config: true,
        slots: &[
            SlotTemplate {
                kind: SlotKind::Branch,
                offset: Point {
                    x: -120.0,
                    y: 160.0,
                },
                label: "Triggered",
                branch_id: Some("triggered"),
                allowed: SlotAllowance::AnyButStart,
            },
            SlotTemplate {
                kind: SlotKind::Terminal,
                offset: Point { x: 120.0, y: 160.0 },
                label: "Timeout",
                branch_id: Some("timeout"),
                allowed: SlotAllowance::EndOnly,
            },
        ],
    },
    KindTemplate {
        kind: NodeKind::AbTest,
        label: "A/B test",
        shape: "circle",
        size: NODE_SIZE,
        outputs: 2,
        needs_config: true,
        slots: &[
            SlotTemplate {
                kind: SlotKind::Parallel,
                offset: Point {
                    x: -120.0,
                    y: 160.0,
                },
                label: "Variant A",
                branch_id: Some("variant-a"),
                allowed: SlotAllowance::AnyButStart,
            },
            SlotTemplate {
                kind: SlotKind::Parallel,
                offset: Point { x: 120.0, y: 160.0 },
                label: "Variant B",
                branch_id: Some("variant-b"),
                allowed: SlotAllowance::AnyButStart,
            },
        ],
    },
    KindTemplate {
        kind: NodeKind::Sms,
        label: "SMS touch",
        shape: "circle",
        size: NODE_SIZE,
        outputs: 1,
        needs_config: true,
        slots: SINGLE_NEXT,
    },
    KindTemplate {
        kind: NodeKind::Email,
        label: "Email touch",
        shape: "circle",
        size: NODE_SIZE,
        outputs: 1,
        needs_config: true,
        slots: SINGLE_NEXT,
    },
    KindTemplate {
        kind: NodeKind::AiCall,
        label: "AI call",
        shape: "circle",
        size: NODE_SIZE,
        outputs: 1,
        needs_config: true,
        slots: SINGLE_NEXT,
    },
    KindTemplate {
        kind: NodeKind::ManualCall,
        label: "Manual call",
        shape: "circle",
        size: NODE_SIZE,
        outputs: 1,
        needs_config: true,
        slots: SINGLE_NEXT,
    },
    KindTemplate {
        kind: NodeKind::Wait,
        label: "Wait",
        shape: "circle",
        size: NODE_SIZE,
        outputs: 1,
        needs_config: true,
        slots: SINGLE_NEXT,
    },
    KindTemplate {
        kind: NodeKind::End,
        label: "End",
        shape: "circle",
        size: NODE_SIZE,
        outputs: 0,
        needs_config: false,
        slots: &[],
    },
];

static TEMPLATE_INDEX: Lazy<BTreeMap<NodeKind, &'static KindTemplate>> = Lazy::new(|| {
    TEMPLATES
        .iter()
        .map(|template| (template.kind, template))
        .collect()
});

/// Total lookup: every `NodeKind` variant has a template.
pub fn template(kind: NodeKind) -> &'static KindTemplate {
    TEMPLATE_INDEX
        .get(&kind)
        .expect("template table covers every node kind")
}

/// Port descriptors for a kind: one `in` port for everything except the
/// start node, plus `out1..outN`.
pub fn ports(kind: NodeKind) -> Vec<PortDescriptor> {
    let template = template(kind);
    let mut ports = Vec::with_capacity(template.outputs + 1);
    if kind != NodeKind::Start {
        ports.push(PortDescriptor {
            id: "in".to_string(),
            group: PortGroup::In,
        });
    }
    for index in 0..template.outputs {
        ports.push(PortDescriptor {
            id: format!("out{}", index + 1),
            group: PortGroup::Out,
        });
    }
    ports
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_has_a_template() {
        for kind in NodeKind::ALL {
            assert_eq!(template(kind).kind, kind);
        }
    }

    #[test]
    fn slot_count_matches_outputs_for_splitting_kinds() {
        for kind in [NodeKind::AudienceSplit, NodeKind::EventSplit, NodeKind::AbTest] {
            let template = template(kind);
            assert_eq!(template.slots.len(), template.outputs);
        }
    }

    #[test]
    fn terminal_slots_accept_only_end() {
        let template = template(NodeKind::AudienceSplit);
        let terminal = template
            .slots
            .iter()
            .find(|slot| slot.kind == SlotKind::Terminal)
            .unwrap();
        assert!(terminal.allowed.allows(NodeKind::End));
        assert!(!terminal.allowed.allows(NodeKind::Sms));
    }

    #[test]
    fn start_has_no_in_port() {
        let start_ports = ports(NodeKind::Start);
        assert!(start_ports.iter().all(|p| p.group == PortGroup::Out));
        let end_ports = ports(NodeKind::End);
        assert_eq!(end_ports.len(), 1);
        assert_eq!(end_ports[0].id, "in");
    }
}
