//! Mock Port Data Source for Testing
//!
//! This module provides an in-memory port data source that simulates a
//! detector's port graph without any hardware. Ports can be added, removed
//! and rewired at runtime; rewiring fires the registered change callbacks
//! just as a device would.
//!
//! # Failure Injection
//!
//! - [`MockPortSource::set_available`] - Make every `list_ports` call fail
//! - [`MockPortSource::set_reachable`] - Make one port's attribute reads fail
//! - [`MockPortSource::set_subscribable`] - Make one port reject subscriptions
//!
//! # Example
//!
//! ```ignore
//! use portvis_rs::source::MockPortSource;
//!
//! let source = MockPortSource::new();
//! source.add_camera("SIM1");
//! source.add_plugin("ROI1", Some("SIM1"));
//!
//! // Rewire at runtime; subscribers are notified
//! source.set_upstream("ROI1", None);
//! ```
//!
//! # Enabling
//!
//! The mock source is available when the `mock-source` feature is enabled
//! (on by default).

use crate::error::{PortVisError, Result};
use crate::types::{DeviceHandle, PortAttributes, PortEntry, PortId, PortKind, SubscriptionHandle};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::port_source::{ChangeCallback, PortDataSource};

/// Version string reported for plugins of the simulated detector
pub const MOCK_AD_CORE_VERSION: &str = "3.2.0";

/// Version string reported for the simulated camera driver
pub const MOCK_DRIVER_VERSION: &str = "2.10.0";

/// A single simulated port
#[derive(Debug, Clone)]
pub struct MockPort {
    pub id: PortId,
    pub kind: PortKind,
    pub handle: DeviceHandle,
    /// Configured upstream port (the `NDArrayPort` setting)
    pub upstream: Option<PortId>,
    pub attributes: PortAttributes,
    /// Whether the device supports change notification
    pub subscribable: bool,
    /// Whether attribute and upstream reads succeed
    pub reachable: bool,
}

struct Subscription {
    handle: DeviceHandle,
    callback: ChangeCallback,
}

#[derive(Default)]
struct MockState {
    available: bool,
    next_handle: u64,
    next_subscription: u64,
    /// Ports in listing order
    ports: Vec<MockPort>,
    subscriptions: HashMap<u64, Subscription>,
    list_calls: u64,
}

impl MockState {
    fn port(&self, handle: &DeviceHandle) -> Option<&MockPort> {
        self.ports.iter().find(|p| p.handle == *handle)
    }

    fn port_mut(&mut self, id: &str) -> Option<&mut MockPort> {
        self.ports.iter_mut().find(|p| p.id.as_str() == id)
    }

    fn callbacks_for(&self, handle: DeviceHandle) -> Vec<ChangeCallback> {
        self.subscriptions
            .values()
            .filter(|s| s.handle == handle)
            .map(|s| s.callback.clone())
            .collect()
    }
}

/// In-memory simulated detector
pub struct MockPortSource {
    state: Mutex<MockState>,
}

impl MockPortSource {
    /// Create an empty, reachable source
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                available: true,
                next_handle: 1,
                next_subscription: 1,
                ..Default::default()
            }),
        }
    }

    /// Simulated detector with one camera and the usual plugin chain
    ///
    /// ```text
    /// SIM1 ─┬─► IMAGE1
    ///       ├─► ROI1 ──► STATS1
    ///       ├─► PROC1 ─► TIFF1
    ///       └─► HDF1
    /// ```
    pub fn simulated_detector() -> Self {
        let source = Self::new();
        source.add_camera("SIM1");
        for (port, upstream, plugin_type) in [
            ("IMAGE1", "SIM1", "NDPluginStdArrays"),
            ("ROI1", "SIM1", "NDPluginROI"),
            ("STATS1", "ROI1", "NDPluginStats"),
            ("PROC1", "SIM1", "NDPluginProcess"),
            ("TIFF1", "PROC1", "NDFileTIFF"),
            ("HDF1", "SIM1", "NDFileHDF5"),
        ] {
            source.add_plugin(port, Some(upstream));
            source.set_attribute(port, "plugin_type", plugin_type);
        }
        source
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn add_port(&self, id: &str, kind: PortKind, upstream: Option<&str>) -> DeviceHandle {
        let mut state = self.state();
        let handle = DeviceHandle(state.next_handle);
        state.next_handle += 1;

        let mut attributes = PortAttributes::new();
        attributes.insert(
            "ad_core_version".to_string(),
            MOCK_AD_CORE_VERSION.to_string(),
        );
        if kind == PortKind::Camera {
            attributes.insert(
                "driver_version".to_string(),
                MOCK_DRIVER_VERSION.to_string(),
            );
        }

        state.ports.push(MockPort {
            id: PortId::from(id),
            kind,
            handle,
            upstream: upstream.map(PortId::from),
            attributes,
            // Cameras have no NDArrayPort to watch
            subscribable: kind == PortKind::Plugin,
            reachable: true,
        });
        handle
    }

    /// Add a camera port
    pub fn add_camera(&self, id: &str) -> DeviceHandle {
        self.add_port(id, PortKind::Camera, None)
    }

    /// Add a plugin port fed by `upstream`
    pub fn add_plugin(&self, id: &str, upstream: Option<&str>) -> DeviceHandle {
        self.add_port(id, PortKind::Plugin, upstream)
    }

    /// Remove a port from the listing
    ///
    /// Subscriptions on it stay registered until released by their owner.
    pub fn remove_port(&self, id: &str) -> bool {
        let mut state = self.state();
        let before = state.ports.len();
        state.ports.retain(|p| p.id.as_str() != id);
        state.ports.len() < before
    }

    /// Re-create the device behind a port, as after an IOC restart
    ///
    /// The port keeps its id, upstream and attributes but gets a new handle.
    /// Subscriptions made on the old handle stay registered and never fire.
    pub fn recreate_port(&self, id: &str) -> Option<DeviceHandle> {
        let mut state = self.state();
        let handle = DeviceHandle(state.next_handle);
        let port = state.port_mut(id)?;
        port.handle = handle;
        state.next_handle += 1;
        Some(handle)
    }

    /// Change a port's upstream and notify its subscribers
    ///
    /// Callbacks run on the calling thread after the internal lock is released.
    pub fn set_upstream(&self, id: &str, upstream: Option<&str>) -> bool {
        let callbacks = {
            let mut state = self.state();
            let Some(port) = state.port_mut(id) else {
                return false;
            };
            port.upstream = upstream.map(PortId::from);
            let handle = port.handle;
            state.callbacks_for(handle)
        };
        tracing::debug!("Mock port {} rewired, notifying {} subscriber(s)", id, callbacks.len());
        for callback in callbacks {
            callback();
        }
        true
    }

    /// Fire a port's change callbacks without changing anything
    pub fn notify(&self, id: &str) -> usize {
        let callbacks = {
            let state = self.state();
            match state.ports.iter().find(|p| p.id.as_str() == id) {
                Some(port) => state.callbacks_for(port.handle),
                None => Vec::new(),
            }
        };
        let count = callbacks.len();
        for callback in callbacks {
            callback();
        }
        count
    }

    /// Set a named attribute on a port
    pub fn set_attribute(&self, id: &str, name: &str, value: &str) -> bool {
        match self.state().port_mut(id) {
            Some(port) => {
                port.attributes.insert(name.to_string(), value.to_string());
                true
            }
            None => false,
        }
    }

    /// Control whether a port accepts subscriptions
    pub fn set_subscribable(&self, id: &str, subscribable: bool) -> bool {
        match self.state().port_mut(id) {
            Some(port) => {
                port.subscribable = subscribable;
                true
            }
            None => false,
        }
    }

    /// Control whether a port answers attribute and upstream reads
    pub fn set_reachable(&self, id: &str, reachable: bool) -> bool {
        match self.state().port_mut(id) {
            Some(port) => {
                port.reachable = reachable;
                true
            }
            None => false,
        }
    }

    /// Control whether the whole source can be queried
    pub fn set_available(&self, available: bool) {
        self.state().available = available;
    }

    /// Number of live subscriptions across all ports
    pub fn active_subscriptions(&self) -> usize {
        self.state().subscriptions.len()
    }

    /// Number of live subscriptions for one port
    pub fn subscriptions_for(&self, id: &str) -> usize {
        let state = self.state();
        state
            .ports
            .iter()
            .find(|p| p.id.as_str() == id)
            .map(|p| state.subscriptions.values().filter(|s| s.handle == p.handle).count())
            .unwrap_or(0)
    }

    /// How many times `list_ports` has been called
    pub fn list_calls(&self) -> u64 {
        self.state().list_calls
    }
}

impl Default for MockPortSource {
    fn default() -> Self {
        Self::new()
    }
}

fn unknown_handle(handle: &DeviceHandle, attribute: &str) -> PortVisError {
    PortVisError::AttributeUnavailable {
        port: PortId::new(format!("<handle {}>", handle.0)),
        attribute: attribute.to_string(),
    }
}

impl PortDataSource for MockPortSource {
    fn list_ports(&self) -> Result<Vec<PortEntry>> {
        let mut state = self.state();
        state.list_calls += 1;
        if !state.available {
            return Err(PortVisError::SourceUnavailable(
                "mock detector is offline".to_string(),
            ));
        }
        Ok(state
            .ports
            .iter()
            .map(|p| PortEntry::new(p.id.clone(), p.kind, p.handle))
            .collect())
    }

    fn get_attribute(&self, handle: &DeviceHandle, name: &str) -> Result<String> {
        let state = self.state();
        let port = state.port(handle).ok_or_else(|| unknown_handle(handle, name))?;
        if !port.reachable {
            return Err(PortVisError::AttributeUnavailable {
                port: port.id.clone(),
                attribute: name.to_string(),
            });
        }
        port.attributes
            .get(name)
            .cloned()
            .ok_or_else(|| PortVisError::AttributeUnavailable {
                port: port.id.clone(),
                attribute: name.to_string(),
            })
    }

    fn get_upstream_port(&self, handle: &DeviceHandle) -> Result<Option<PortId>> {
        let state = self.state();
        let port = state
            .port(handle)
            .ok_or_else(|| unknown_handle(handle, "nd_array_port"))?;
        if !port.reachable {
            return Err(PortVisError::AttributeUnavailable {
                port: port.id.clone(),
                attribute: "nd_array_port".to_string(),
            });
        }
        Ok(port.upstream.clone())
    }

    fn subscribe(
        &self,
        handle: &DeviceHandle,
        callback: ChangeCallback,
    ) -> Result<SubscriptionHandle> {
        let mut state = self.state();
        let port = state
            .port(handle)
            .ok_or_else(|| unknown_handle(handle, "nd_array_port"))?;
        if !port.subscribable {
            return Err(PortVisError::NotSubscribable(port.id.clone()));
        }
        let id = state.next_subscription;
        state.next_subscription += 1;
        state.subscriptions.insert(
            id,
            Subscription {
                handle: *handle,
                callback,
            },
        );
        Ok(SubscriptionHandle(id))
    }

    fn unsubscribe(&self, subscription: SubscriptionHandle) {
        if self.state().subscriptions.remove(&subscription.0).is_none() {
            tracing::debug!("Mock unsubscribe of unknown handle {:?}", subscription);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_list_ports_in_insertion_order() {
        let source = MockPortSource::new();
        source.add_camera("CAM");
        source.add_plugin("B", Some("CAM"));
        source.add_plugin("A", Some("CAM"));

        let ids: Vec<_> = source
            .list_ports()
            .unwrap()
            .into_iter()
            .map(|p| p.id.to_string())
            .collect();
        assert_eq!(ids, ["CAM", "B", "A"]);
    }

    #[test]
    fn test_recreated_port_gets_new_handle() {
        let source = MockPortSource::simulated_detector();
        let old = source.list_ports().unwrap()[2].handle;
        let new = source.recreate_port("ROI1").unwrap();
        assert_ne!(old, new);
        assert!(source.recreate_port("NOPE").is_none());

        let roi = &source.list_ports().unwrap()[2];
        assert_eq!(roi.id, PortId::from("ROI1"));
        assert_eq!(roi.handle, new);
        assert_eq!(source.get_upstream_port(&new).unwrap(), Some(PortId::from("SIM1")));
        assert!(source.get_upstream_port(&old).is_err());
    }

    #[test]
    fn test_unavailable_source() {
        let source = MockPortSource::new();
        source.set_available(false);
        assert!(matches!(
            source.list_ports(),
            Err(PortVisError::SourceUnavailable(_))
        ));
    }

    #[test]
    fn test_attributes_and_reachability() {
        let source = MockPortSource::new();
        let roi = source.add_plugin("ROI1", Some("CAM"));
        source.set_attribute("ROI1", "plugin_type", "NDPluginROI");

        assert_eq!(
            source.get_attribute(&roi, "plugin_type").unwrap(),
            "NDPluginROI"
        );
        assert!(source.get_attribute(&roi, "driver_version").is_err());

        source.set_reachable("ROI1", false);
        assert!(source.get_attribute(&roi, "plugin_type").is_err());
        assert!(source.get_upstream_port(&roi).is_err());
    }

    #[test]
    fn test_camera_is_not_subscribable() {
        let source = MockPortSource::new();
        let cam = source.add_camera("CAM");
        let result = source.subscribe(&cam, Arc::new(|| {}));
        assert!(matches!(result, Err(PortVisError::NotSubscribable(_))));
    }

    #[test]
    fn test_set_upstream_fires_callbacks() {
        let source = MockPortSource::new();
        source.add_camera("CAM");
        let roi = source.add_plugin("ROI1", None);

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let sub = source
            .subscribe(
                &roi,
                Arc::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        assert!(source.set_upstream("ROI1", Some("CAM")));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(
            source.get_upstream_port(&roi).unwrap(),
            Some(PortId::from("CAM"))
        );

        source.unsubscribe(sub);
        source.set_upstream("ROI1", None);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(source.active_subscriptions(), 0);
    }

    #[test]
    fn test_simulated_detector_layout() {
        let source = MockPortSource::simulated_detector();
        let ports = source.list_ports().unwrap();
        assert_eq!(ports.len(), 7);
        assert_eq!(
            ports.iter().filter(|p| p.kind == PortKind::Camera).count(),
            1
        );
    }
}
