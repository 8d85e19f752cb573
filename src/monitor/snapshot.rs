//! Immutable copies of the monitor's known graph

use crate::layout::{self, LayoutParams, LayoutResult, PositionMap};
use crate::types::{Edge, PortAttributes, PortId, PortKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Point-in-time copy of the known graph, safe to hand to any consumer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    /// Generation of the commit this snapshot was taken after
    pub generation: u64,
    /// Known ports in last-seen listing order
    pub ports: Vec<(PortId, PortKind)>,
    pub edges: BTreeSet<Edge>,
    /// Attributes read during the last committed refresh
    pub attributes: BTreeMap<PortId, PortAttributes>,
}

/// Input and outputs of a single port
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connectivity {
    /// Upstream port feeding this one, if any
    pub input: Option<PortId>,
    /// Downstream ports this one feeds, sorted by id
    pub outputs: Vec<PortId>,
}

impl GraphSnapshot {
    pub fn port_ids(&self) -> impl Iterator<Item = &PortId> {
        self.ports.iter().map(|(id, _)| id)
    }

    pub fn contains(&self, id: &PortId) -> bool {
        self.ports.iter().any(|(p, _)| p == id)
    }

    pub fn port_kind(&self, id: &PortId) -> Option<PortKind> {
        self.ports
            .iter()
            .find(|(p, _)| p == id)
            .map(|(_, kind)| *kind)
    }

    /// Camera ports, sorted by id
    pub fn cameras(&self) -> Vec<PortId> {
        let mut cameras: Vec<PortId> = self
            .ports
            .iter()
            .filter(|(_, kind)| *kind == PortKind::Camera)
            .map(|(id, _)| id.clone())
            .collect();
        cameras.sort();
        cameras
    }

    /// Information attributes for a port; empty when none could be read
    pub fn port_information(&self, id: &PortId) -> Option<&PortAttributes> {
        self.attributes.get(id)
    }

    /// What feeds a port and what it feeds, ignoring self edges
    pub fn connectivity(&self, id: &PortId) -> Option<Connectivity> {
        if !self.contains(id) {
            return None;
        }

        let input = self
            .edges
            .iter()
            .find(|e| &e.dest == id && !e.is_self_edge())
            .map(|e| e.src.clone());
        let outputs = self
            .edges
            .iter()
            .filter(|e| &e.src == id && !e.is_self_edge())
            .map(|e| e.dest.clone())
            .collect();

        Some(Connectivity { input, outputs })
    }

    /// Lay out this snapshot
    pub fn layout(&self, params: &LayoutParams) -> PositionMap {
        layout::position(&self.edges, &self.ports, params)
    }

    /// Lay out this snapshot, also reporting edges skipped by the cycle guard
    pub fn layout_annotated(&self, params: &LayoutParams) -> LayoutResult {
        layout::position_annotated(&self.edges, &self.ports, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Position;

    fn snapshot() -> GraphSnapshot {
        GraphSnapshot {
            generation: 4,
            ports: vec![
                (PortId::from("SIM2"), PortKind::Camera),
                (PortId::from("ROI1"), PortKind::Plugin),
                (PortId::from("SIM1"), PortKind::Camera),
                (PortId::from("STATS1"), PortKind::Plugin),
            ],
            edges: [
                Edge::new("SIM1", "ROI1"),
                Edge::new("ROI1", "STATS1"),
                Edge::new("STATS1", "STATS1"),
            ]
            .into_iter()
            .collect(),
            attributes: BTreeMap::new(),
        }
    }

    #[test]
    fn test_cameras_sorted() {
        assert_eq!(
            snapshot().cameras(),
            vec![PortId::from("SIM1"), PortId::from("SIM2")]
        );
    }

    #[test]
    fn test_connectivity_skips_self_edges() {
        let snap = snapshot();
        let conn = snap.connectivity(&PortId::from("STATS1")).unwrap();
        assert_eq!(conn.input, Some(PortId::from("ROI1")));
        assert!(conn.outputs.is_empty());

        let conn = snap.connectivity(&PortId::from("SIM1")).unwrap();
        assert_eq!(conn.input, None);
        assert_eq!(conn.outputs, vec![PortId::from("ROI1")]);

        assert!(snap.connectivity(&PortId::from("GHOST")).is_none());
    }

    #[test]
    fn test_snapshot_layout() {
        let positions = snapshot().layout(&LayoutParams::default());
        assert_eq!(positions[&PortId::from("SIM1")], Position::new(0.0, 0.0));
        assert_eq!(positions[&PortId::from("ROI1")], Position::new(150.0, 0.0));
        assert_eq!(positions[&PortId::from("STATS1")], Position::new(300.0, 0.0));
        assert_eq!(positions[&PortId::from("SIM2")], Position::new(0.0, 60.0));
    }

    #[test]
    fn test_snapshot_serializes_to_json() {
        let json = serde_json::to_value(snapshot()).unwrap();
        assert_eq!(json["generation"], 4);
        assert_eq!(json["ports"][0][0], "SIM2");
        assert_eq!(json["ports"][0][1], "camera");
    }
}
