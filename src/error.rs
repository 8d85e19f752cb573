//! Error handling for PortVis-RS
//!
//! This module defines the crate error type and a Result alias for use
//! throughout the monitor, the data source layer and the configuration code.
//!
//! Only [`PortVisError::SourceUnavailable`] is fatal to a refresh. The other
//! source-level conditions are absorbed per port by the monitor and show up as
//! omissions in the emitted report.

use crate::types::{Edge, PortId};
use thiserror::Error;

/// Main error type for PortVis-RS operations
#[derive(Error, Debug)]
pub enum PortVisError {
    /// The data source cannot be queried at all
    #[error("Port data source unavailable: {0}")]
    SourceUnavailable(String),

    /// A port lacks an expected attribute (or the device did not answer)
    #[error("Attribute '{attribute}' unavailable on port {port}")]
    AttributeUnavailable { port: PortId, attribute: String },

    /// The port's device handle does not support change notification
    #[error("Port {0} does not support change notification")]
    NotSubscribable(PortId),

    /// An edge references a port absent from the freshly queried port set
    #[error("Dangling edge {edge}: port {missing} is not known")]
    DanglingEdge { edge: Edge, missing: PortId },

    /// The monitor was disposed and can no longer refresh
    #[error("Monitor has been disposed")]
    Disposed,

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<PortVisError>,
    },
}

impl PortVisError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        PortVisError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Whether this error aborts a refresh
    ///
    /// Context wrappers are looked through.
    pub fn is_fatal(&self) -> bool {
        match self {
            PortVisError::SourceUnavailable(_) => true,
            PortVisError::WithContext { source, .. } => source.is_fatal(),
            _ => false,
        }
    }
}

/// Result type alias for PortVis-RS operations
pub type Result<T> = std::result::Result<T, PortVisError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PortVisError::SourceUnavailable("detector offline".to_string());
        assert_eq!(
            err.to_string(),
            "Port data source unavailable: detector offline"
        );
    }

    #[test]
    fn test_attribute_error_names_port() {
        let err = PortVisError::AttributeUnavailable {
            port: PortId::from("ROI1"),
            attribute: "plugin_type".to_string(),
        };
        assert!(err.to_string().contains("ROI1"));
        assert!(err.to_string().contains("plugin_type"));
    }

    #[test]
    fn test_error_with_context() {
        let err = PortVisError::Config("bad value".to_string());
        let with_ctx = err.with_context("Failed to load config");
        assert!(with_ctx.to_string().contains("Failed to load config"));
    }

    #[test]
    fn test_only_source_unavailable_is_fatal() {
        assert!(PortVisError::SourceUnavailable("x".into()).is_fatal());
        assert!(PortVisError::SourceUnavailable("x".into())
            .with_context("refresh")
            .is_fatal());
        assert!(!PortVisError::NotSubscribable(PortId::from("CAM")).is_fatal());
        assert!(!PortVisError::DanglingEdge {
            edge: Edge::new("GONE", "ROI1"),
            missing: PortId::from("GONE"),
        }
        .is_fatal());
    }
}
