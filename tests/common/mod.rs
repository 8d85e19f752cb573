//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

use portvis_rs::{Edge, PortId};
use std::time::Duration;

/// Create a test timeout duration
pub fn test_timeout() -> Duration {
    Duration::from_millis(100)
}

/// Port ids from names, in the given order
pub fn ids(names: &[&str]) -> Vec<PortId> {
    names.iter().map(|n| PortId::from(*n)).collect()
}

/// Edges from `(src, dest)` name pairs
pub fn edges(pairs: &[(&str, &str)]) -> Vec<Edge> {
    pairs.iter().map(|(s, d)| Edge::new(*s, *d)).collect()
}
