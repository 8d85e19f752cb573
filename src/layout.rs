//! Deterministic auto-layout for the port graph
//!
//! Positions are assigned depth-first from every camera, in ascending id
//! order. Each port's children (sorted by id) go one column to the right and
//! are stacked vertically around the parent's row. Independently rooted
//! subtrees are separated by one row, and anything unreachable from a camera
//! is placed afterwards at the starting column.
//!
//! ```text
//! SIM1 ──► HDF1        (150, -60)
//!      ──► IMAGE1      (150,   0)
//!      ──► ROI1 ─► STATS1
//! ```
//!
//! The layout is a pure function of its inputs: the edge insertion order
//! does not matter, and a port is never placed twice. Edges pointing at a
//! port that already has a position (cycles, diamonds) are skipped and
//! returned as back references by [`position_annotated`].

use crate::types::{Edge, PortId, PortKind, Position};
use std::collections::{BTreeMap, BTreeSet};

/// Nominal width of a rendered port node
pub const NODE_WIDTH: f64 = 100.0;

/// Nominal height of a rendered port node
pub const NODE_HEIGHT: f64 = 40.0;

/// Port id to coordinate
pub type PositionMap = BTreeMap<PortId, Position>;

/// Spacing and origin for [`position`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutParams {
    /// Horizontal offset from a port to its children
    pub x_spacing: f64,
    /// Vertical offset between siblings and between subtrees
    pub y_spacing: f64,
    /// Starting x position
    pub x0: f64,
    /// Starting y position
    pub y0: f64,
}

impl LayoutParams {
    pub fn new(x_spacing: f64, y_spacing: f64) -> Self {
        Self {
            x_spacing,
            y_spacing,
            ..Self::default()
        }
    }

    pub fn with_origin(mut self, x0: f64, y0: f64) -> Self {
        self.x0 = x0;
        self.y0 = y0;
        self
    }
}

impl Default for LayoutParams {
    fn default() -> Self {
        Self {
            x_spacing: NODE_WIDTH * 1.5,
            y_spacing: NODE_HEIGHT * 1.5,
            x0: 0.0,
            y0: 0.0,
        }
    }
}

/// Positions plus the edges that were not followed during placement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayoutResult {
    pub positions: PositionMap,
    /// Edges whose destination was already placed when reached, sorted
    pub back_references: Vec<Edge>,
}

/// Lay out the graph and return only the positions
///
/// `ports` is the port listing in its natural order; that order only decides
/// the placement of ports unreachable from any camera.
pub fn position<'a>(
    edges: impl IntoIterator<Item = &'a Edge>,
    ports: &'a [(PortId, PortKind)],
    params: &LayoutParams,
) -> PositionMap {
    position_annotated(edges, ports, params).positions
}

/// Lay out the graph, also reporting edges skipped by the visited guard
pub fn position_annotated<'a>(
    edges: impl IntoIterator<Item = &'a Edge>,
    ports: &'a [(PortId, PortKind)],
    params: &LayoutParams,
) -> LayoutResult {
    let mut placer = Placer::new(edges, params);

    let cameras: BTreeSet<&PortId> = ports
        .iter()
        .filter(|(_, kind)| *kind == PortKind::Camera)
        .map(|(id, _)| id)
        .collect();

    let mut y = params.y0;
    for camera in cameras {
        if !placer.positions.contains_key(camera) {
            placer.place(camera, params.x0, y);
        }
        y = placer.next_row(y);
    }

    for (port, _) in ports {
        if !placer.positions.contains_key(port) {
            tracing::trace!("Placing unrooted port {}", port);
            placer.place(port, params.x0, y);
            y = placer.next_row(y);
        }
    }

    LayoutResult {
        positions: placer.positions,
        back_references: placer.back_references.into_iter().collect(),
    }
}

struct Placer<'a> {
    /// Sorted, de-duplicated children per port; self edges excluded
    children: BTreeMap<&'a PortId, BTreeSet<&'a PortId>>,
    x_spacing: f64,
    y_spacing: f64,
    positions: PositionMap,
    back_references: BTreeSet<Edge>,
}

impl<'a> Placer<'a> {
    fn new(edges: impl IntoIterator<Item = &'a Edge>, params: &LayoutParams) -> Self {
        let mut children: BTreeMap<&'a PortId, BTreeSet<&'a PortId>> = BTreeMap::new();
        for edge in edges {
            if edge.is_self_edge() {
                continue;
            }
            children.entry(&edge.src).or_default().insert(&edge.dest);
        }

        Self {
            children,
            x_spacing: params.x_spacing,
            y_spacing: params.y_spacing,
            positions: PositionMap::new(),
            back_references: BTreeSet::new(),
        }
    }

    fn place(&mut self, port: &'a PortId, x: f64, y: f64) {
        self.positions.insert(port.clone(), Position::new(x, y));

        let children: Vec<&'a PortId> = self
            .children
            .get(port)
            .map(|c| c.iter().copied().collect())
            .unwrap_or_default();

        let start = y - self.y_spacing * (children.len() / 2) as f64;
        for (idx, child) in children.into_iter().enumerate() {
            if self.positions.contains_key(child) {
                self.back_references
                    .insert(Edge::new(port.clone(), child.clone()));
                continue;
            }
            self.place(child, x + self.x_spacing, start + idx as f64 * self.y_spacing);
        }
    }

    /// One row below everything placed so far; `current` if nothing is placed
    fn next_row(&self, current: f64) -> f64 {
        self.positions
            .values()
            .map(|p| p.y)
            .reduce(f64::max)
            .map_or(current, |max_y| max_y + self.y_spacing)
    }
}
