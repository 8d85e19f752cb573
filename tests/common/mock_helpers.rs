//! Mock construction and observation helpers

use crossbeam_channel::{bounded, Receiver, Sender};
use portvis_rs::config::MonitorConfig;
use portvis_rs::monitor::{ChangeReport, GraphMonitor, MonitorEvent};
use portvis_rs::source::{ChangeCallback, MockPortSource};
use portvis_rs::types::{DeviceHandle, PortEntry, SubscriptionHandle};
use portvis_rs::{PortDataSource, PortId, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A monitor over a shared mock source, with default config
pub fn create_test_monitor(source: MockPortSource) -> (GraphMonitor, Arc<MockPortSource>) {
    let source = Arc::new(source);
    let monitor = GraphMonitor::new(source.clone(), MonitorConfig::default());
    (monitor, source)
}

/// Collect everything currently queued on an event channel
pub fn drain_events(rx: &Receiver<MonitorEvent>) -> Vec<MonitorEvent> {
    rx.try_iter().collect()
}

/// Wait for the next report, failing the test on timeout
pub fn expect_report(rx: &Receiver<ChangeReport>, timeout: Duration) -> ChangeReport {
    rx.recv_timeout(timeout)
        .unwrap_or_else(|e| panic!("no report within {:?}: {}", timeout, e))
}

/// Wraps a [`MockPortSource`] to control when port listings happen
///
/// Every `list_ports` call sleeps for the configured delay. When the gate is
/// armed, the next call parks before reading until [`release`] is called.
///
/// [`release`]: ControlledSource::release
pub struct ControlledSource {
    inner: Arc<MockPortSource>,
    delay: Duration,
    armed: AtomicBool,
    entered_tx: Sender<()>,
    entered_rx: Receiver<()>,
    release_tx: Sender<()>,
    release_rx: Receiver<()>,
}

impl ControlledSource {
    pub fn new(inner: Arc<MockPortSource>) -> Self {
        let (entered_tx, entered_rx) = bounded(1);
        let (release_tx, release_rx) = bounded(1);
        Self {
            inner,
            delay: Duration::ZERO,
            armed: AtomicBool::new(false),
            entered_tx,
            entered_rx,
            release_tx,
            release_rx,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Park the next `list_ports` call
    pub fn arm_gate(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    /// Wait until a parked call has reached the gate
    pub fn wait_parked(&self, timeout: Duration) -> bool {
        self.entered_rx.recv_timeout(timeout).is_ok()
    }

    /// Let the parked call continue
    pub fn release(&self) {
        let _ = self.release_tx.send(());
    }
}

impl PortDataSource for ControlledSource {
    fn list_ports(&self) -> Result<Vec<PortEntry>> {
        if self.armed.swap(false, Ordering::SeqCst) {
            let _ = self.entered_tx.send(());
            let _ = self.release_rx.recv_timeout(Duration::from_secs(5));
        }
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.inner.list_ports()
    }

    fn get_attribute(&self, handle: &DeviceHandle, name: &str) -> Result<String> {
        self.inner.get_attribute(handle, name)
    }

    fn get_upstream_port(&self, handle: &DeviceHandle) -> Result<Option<PortId>> {
        self.inner.get_upstream_port(handle)
    }

    fn subscribe(
        &self,
        handle: &DeviceHandle,
        callback: ChangeCallback,
    ) -> Result<SubscriptionHandle> {
        self.inner.subscribe(handle, callback)
    }

    fn unsubscribe(&self, subscription: SubscriptionHandle) {
        self.inner.unsubscribe(subscription)
    }
}
