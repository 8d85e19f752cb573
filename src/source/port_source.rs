//! PortDataSource trait for the hardware access seam
//!
//! This module provides the narrow interface the graph monitor consumes. Real
//! implementations wrap a detector's device layer; the mock source in
//! [`super::mock_source`] simulates one for tests and demos.
//!
//! Attribute lookup is an explicit capability: the monitor asks for a named
//! attribute through the handle the source gave it and treats a failure as
//! "absent", never as a crash.

use crate::error::Result;
use crate::types::{DeviceHandle, PortEntry, PortId, SubscriptionHandle};
use std::sync::Arc;

/// Callback registered with the source for change notification
///
/// May be invoked from any thread, including synchronously from inside a
/// source call. Implementations passed by the monitor only enqueue work.
pub type ChangeCallback = Arc<dyn Fn() + Send + Sync>;

/// Unified interface for port data sources
///
/// Implementations must be `Send + Sync`: the monitor queries the source
/// from whatever thread triggers a refresh.
///
/// # Example
///
/// ```ignore
/// fn camera_names(source: &dyn PortDataSource) -> Result<Vec<PortId>> {
///     Ok(source
///         .list_ports()?
///         .into_iter()
///         .filter(|p| p.kind == PortKind::Camera)
///         .map(|p| p.id)
///         .collect())
/// }
/// ```
#[cfg_attr(test, mockall::automock)]
pub trait PortDataSource: Send + Sync {
    /// Enumerate all ports currently configured on the detector
    ///
    /// Fails with `SourceUnavailable` when the detector cannot be reached.
    fn list_ports(&self) -> Result<Vec<PortEntry>>;

    /// Read a named attribute of a port
    ///
    /// Fails with `AttributeUnavailable` when the port has no such attribute
    /// or the device does not answer.
    fn get_attribute(&self, handle: &DeviceHandle, name: &str) -> Result<String>;

    /// The port this one receives arrays from
    ///
    /// `Ok(None)` for ports without a configured upstream (cameras, or
    /// plugins with an empty source port).
    fn get_upstream_port(&self, handle: &DeviceHandle) -> Result<Option<PortId>>;

    /// Ask to be called whenever this port's upstream changes
    ///
    /// Fails with `NotSubscribable` when the device cannot notify.
    fn subscribe(
        &self,
        handle: &DeviceHandle,
        callback: ChangeCallback,
    ) -> Result<SubscriptionHandle>;

    /// Release a registration made by [`PortDataSource::subscribe`]
    fn unsubscribe(&self, subscription: SubscriptionHandle);
}

impl<T: PortDataSource + ?Sized> PortDataSource for Arc<T> {
    fn list_ports(&self) -> Result<Vec<PortEntry>> {
        (**self).list_ports()
    }

    fn get_attribute(&self, handle: &DeviceHandle, name: &str) -> Result<String> {
        (**self).get_attribute(handle, name)
    }

    fn get_upstream_port(&self, handle: &DeviceHandle) -> Result<Option<PortId>> {
        (**self).get_upstream_port(handle)
    }

    fn subscribe(
        &self,
        handle: &DeviceHandle,
        callback: ChangeCallback,
    ) -> Result<SubscriptionHandle> {
        (**self).subscribe(handle, callback)
    }

    fn unsubscribe(&self, subscription: SubscriptionHandle) {
        (**self).unsubscribe(subscription)
    }
}
