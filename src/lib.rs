//! # PortVis-RS: Detector Port Graph Monitor
//!
//! Tracks the live data-flow topology of an areaDetector-style imaging
//! pipeline: camera ports producing arrays and the plugin ports they feed.
//! The graph changes whenever a plugin is rewired, so the crate keeps an
//! authoritative copy of it, reports minimal diffs, and lays it out into
//! stable 2D coordinates for any renderer.
//!
//! ## Architecture
//!
//! - **Source**: [`source::PortDataSource`] abstracts the detector's device layer
//! - **Monitor**: [`monitor::GraphMonitor`] diffs successive queries and manages subscriptions
//! - **Backend**: [`monitor::MonitorBackend`] drives the monitor from a worker thread
//! - **Layout**: [`layout::position`] is a pure, deterministic placement pass
//! - **Communication**: Crossbeam channels carry events from the monitor to consumers
//!
//! ## Example
//!
//! ```ignore
//! use portvis_rs::{
//!     config::AppConfig,
//!     monitor::GraphMonitor,
//!     source::MockPortSource,
//! };
//! use std::sync::Arc;
//!
//! let config = AppConfig::default();
//! let source = Arc::new(MockPortSource::simulated_detector());
//! let monitor = GraphMonitor::new(source, config.monitor.clone());
//!
//! let report = monitor.refresh()?;
//! println!("{}", report);
//!
//! let positions = monitor.snapshot().layout(&config.layout.params());
//! ```

pub mod config;
pub mod error;
pub mod layout;
pub mod monitor;
pub mod source;
pub mod types;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{PortVisError, Result};
pub use layout::{position, position_annotated, LayoutParams, PositionMap};
pub use monitor::{ChangeReport, GraphMonitor, GraphSnapshot, MonitorBackend, MonitorEvent};
pub use source::PortDataSource;
pub use types::{Edge, PortId, PortKind, Position};
