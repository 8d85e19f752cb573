//! Change reports emitted by the graph monitor
//!
//! A [`ChangeReport`] is the minimal set of additions and removals that takes
//! the previous known graph to the freshly queried one. Every sequence is
//! sorted so two monitors seeing the same transitions emit identical reports.

use crate::types::{Edge, PortId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// What changed in one refresh
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeReport {
    /// Commit sequence number; strictly increasing per monitor
    pub generation: u64,
    pub ports_removed: Vec<PortId>,
    pub ports_added: Vec<PortId>,
    pub edges_removed: Vec<Edge>,
    pub edges_added: Vec<Edge>,
}

impl ChangeReport {
    /// Diff a previous graph against a new one
    pub fn between<'a>(
        generation: u64,
        old_ports: impl IntoIterator<Item = &'a PortId>,
        old_edges: &BTreeSet<Edge>,
        new_ports: impl IntoIterator<Item = &'a PortId>,
        new_edges: &BTreeSet<Edge>,
    ) -> Self {
        let old_ports: BTreeSet<&PortId> = old_ports.into_iter().collect();
        let new_ports: BTreeSet<&PortId> = new_ports.into_iter().collect();

        Self {
            generation,
            ports_removed: old_ports.difference(&new_ports).map(|p| (*p).clone()).collect(),
            ports_added: new_ports.difference(&old_ports).map(|p| (*p).clone()).collect(),
            edges_removed: old_edges.difference(new_edges).cloned().collect(),
            edges_added: new_edges.difference(old_edges).cloned().collect(),
        }
    }

    pub fn has_changes(&self) -> bool {
        !(self.ports_removed.is_empty()
            && self.ports_added.is_empty()
            && self.edges_removed.is_empty()
            && self.edges_added.is_empty())
    }

    /// Granular events in delivery order: ports removed, ports added,
    /// edges removed, edges added
    pub fn events(&self) -> impl Iterator<Item = MonitorEvent> + '_ {
        self.ports_removed
            .iter()
            .cloned()
            .map(MonitorEvent::PortRemoved)
            .chain(self.ports_added.iter().cloned().map(MonitorEvent::PortAdded))
            .chain(self.edges_removed.iter().cloned().map(MonitorEvent::EdgeRemoved))
            .chain(self.edges_added.iter().cloned().map(MonitorEvent::EdgeAdded))
    }

    /// Apply this report to a downstream mirror of the graph
    pub fn apply_to(&self, graph: &mut KnownGraph) {
        for edge in &self.edges_removed {
            if !graph.edges.remove(edge) {
                tracing::debug!("Edge removed that was not known, likely in error: {}", edge);
            }
        }

        for port in &self.ports_removed {
            graph.ports.remove(port);
            graph.edges.retain(|e| &e.src != port && &e.dest != port);
        }

        graph.ports.extend(self.ports_added.iter().cloned());

        for edge in &self.edges_added {
            if !graph.ports.contains(&edge.src) || !graph.ports.contains(&edge.dest) {
                tracing::debug!("Edge added to unknown port: {}", edge);
                continue;
            }
            graph.edges.insert(edge.clone());
        }
    }
}

impl fmt::Display for ChangeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{}: -{} +{} ports, -{} +{} edges",
            self.generation,
            self.ports_removed.len(),
            self.ports_added.len(),
            self.edges_removed.len(),
            self.edges_added.len()
        )
    }
}

/// Discrete notification delivered to observers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    PortRemoved(PortId),
    PortAdded(PortId),
    EdgeRemoved(Edge),
    EdgeAdded(Edge),
    /// Aggregate of one refresh, sent after its granular events
    Update(ChangeReport),
}

/// A consumer-side copy of the graph, kept current by applying reports
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnownGraph {
    pub ports: BTreeSet<PortId>,
    pub edges: BTreeSet<Edge>,
}

impl KnownGraph {
    pub fn new() -> Self {
        Self::default()
    }
}
