//! Core data types for PortVis-RS
//!
//! This module contains the fundamental data structures shared by the data
//! source layer, the graph monitor and the layout engine.
//!
//! # Main Types
//!
//! - [`PortId`] - Unique string name of a port in the detector
//! - [`PortKind`] - Whether a port is a camera (image source) or a plugin
//! - [`Edge`] - Directed "array data flows from src to dest" relation
//! - [`DeviceHandle`] / [`SubscriptionHandle`] - Opaque tokens owned by the data source
//! - [`PortEntry`] - One row of a port listing
//! - [`Position`] - A 2D layout coordinate
//! - [`MonitorStats`] - Counters describing refresh activity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Attribute map for a single port (e.g. `plugin_type`, `driver_version`)
pub type PortAttributes = BTreeMap<String, String>;

/// Unique name of a port (the asyn port name on the detector)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortId(String);

impl PortId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PortId {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for PortId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl AsRef<str> for PortId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The role a port plays in the data-flow graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PortKind {
    /// Image source; roots of the layout
    Camera,
    /// Processing stage fed by another port
    #[default]
    Plugin,
}

impl PortKind {
    /// Cameras produce arrays but never consume them
    pub fn has_input(&self) -> bool {
        matches!(self, PortKind::Plugin)
    }

    /// Every port can feed downstream plugins
    pub fn has_output(&self) -> bool {
        true
    }
}

impl fmt::Display for PortKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortKind::Camera => write!(f, "camera"),
            PortKind::Plugin => write!(f, "plugin"),
        }
    }
}

/// Directed edge: `src`'s output array feeds `dest`'s input
///
/// Ordering is lexicographic on `(src, dest)`, which is the order reports use.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub src: PortId,
    pub dest: PortId,
}

impl Edge {
    pub fn new(src: impl Into<PortId>, dest: impl Into<PortId>) -> Self {
        Self {
            src: src.into(),
            dest: dest.into(),
        }
    }

    /// Self edges are kept in the edge set but never laid out as parent/child
    #[inline]
    pub fn is_self_edge(&self) -> bool {
        self.src == self.dest
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.src, self.dest)
    }
}

impl<S: Into<PortId>, D: Into<PortId>> From<(S, D)> for Edge {
    fn from((src, dest): (S, D)) -> Self {
        Edge::new(src, dest)
    }
}

/// Opaque reference to a device owned by the data source
///
/// The monitor only hands it back to the source when querying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceHandle(pub u64);

/// Opaque token for an active change-notification registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(pub u64);

/// One port as reported by [`crate::source::PortDataSource::list_ports`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortEntry {
    pub id: PortId,
    pub kind: PortKind,
    pub handle: DeviceHandle,
}

impl PortEntry {
    pub fn new(id: impl Into<PortId>, kind: PortKind, handle: DeviceHandle) -> Self {
        Self {
            id: id.into(),
            kind,
            handle,
        }
    }
}

/// A layout coordinate; relative units, the renderer applies scaling
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<Position> for (f64, f64) {
    fn from(p: Position) -> Self {
        (p.x, p.y)
    }
}

/// Statistics about monitor activity
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonitorStats {
    /// Refreshes that committed (with or without changes)
    pub refreshes: u64,
    /// Refreshes that produced a non-empty report
    pub refreshes_with_changes: u64,
    /// Refreshes aborted because the source was unreachable
    pub failed_refreshes: u64,
    /// Edges dropped because their source port was unknown
    pub dangling_edges_dropped: u64,
    /// Queries read again because a later query committed first
    pub stale_retries: u64,
    /// Refresh requests coalesced because one was already pending
    pub coalesced_requests: u64,
    /// Currently active subscriptions
    pub active_subscriptions: usize,
    /// Duration of the most recent successful refresh
    pub last_refresh_duration: Duration,
    /// Wall-clock time of the most recent successful refresh
    pub last_refresh_at: Option<DateTime<Utc>>,
}

impl MonitorStats {
    /// Share of refresh attempts that succeeded, as a percentage
    pub fn success_rate(&self) -> f64 {
        let total = self.refreshes + self.failed_refreshes;
        if total == 0 {
            100.0
        } else {
            (self.refreshes as f64 / total as f64) * 100.0
        }
    }
}
