//! Data source layer
//!
//! The graph monitor never talks to hardware directly. It consumes the
//! [`PortDataSource`] trait, which a detector integration implements over its
//! device handles, attribute reads and per-device subscription mechanics.
//!
//! # Components
//!
//! - [`PortDataSource`] - Port listing, attribute reads, upstream lookup, subscriptions
//! - [`ChangeCallback`] - What the monitor registers for change notification
//! - [`MockPortSource`] - Simulated detector for tests and demos (feature-gated)

#[cfg(feature = "mock-source")]
pub mod mock_source;
pub mod port_source;

#[cfg(feature = "mock-source")]
pub use mock_source::{MockPort, MockPortSource};
pub use port_source::{ChangeCallback, PortDataSource};

#[cfg(test)]
pub use port_source::MockPortDataSource;
