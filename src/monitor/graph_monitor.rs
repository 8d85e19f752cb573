//! The graph monitor: query, diff, commit, emit
//!
//! A refresh runs in four phases:
//!
//! 1. **Query** the data source for ports, attributes and upstream links. No
//!    monitor lock is held, so slow device reads never block other refreshes.
//!    A query overtaken by one that started later and committed first is read
//!    again, up to [`MAX_STALE_RETRIES`] times.
//! 2. **Diff** the result against the known graph under the state lock.
//! 3. **Commit** the new graph together with subscription bookkeeping, still
//!    under the state lock.
//! 4. **Emit** events after the state lock is released. An emission lock taken
//!    before releasing the state lock keeps delivery in commit order. Observer
//!    channels are unbounded, so each report arrives whole or not at all.
//!
//! Change notifications never refresh inline. The callback registered with
//! the data source only queues a [`RefreshRequest`], so a notification fired
//! from inside a commit (or from a consumer reacting to an event) cannot
//! deadlock on the state lock.

use super::report::{ChangeReport, MonitorEvent};
use super::snapshot::GraphSnapshot;
use crate::config::MonitorConfig;
use crate::error::{PortVisError, Result};
use crate::source::{ChangeCallback, PortDataSource};
use crate::types::{
    DeviceHandle, Edge, MonitorStats, PortAttributes, PortEntry, PortId, PortKind,
    SubscriptionHandle,
};
use chrono::Utc;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Instant;

/// How many times a refresh re-reads the source after being overtaken
pub const MAX_STALE_RETRIES: u32 = 3;

/// Why a refresh was asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshRequest {
    /// Explicit request from a caller
    Manual,
    /// A subscribed port reported a change
    Notification(PortId),
    /// The background poll interval elapsed
    Poll,
}

enum Observer {
    Events(Sender<MonitorEvent>),
    Reports(Sender<ChangeReport>),
}

/// A live subscription and the device handle it was made on
#[derive(Debug, Clone, Copy)]
struct ActiveSubscription {
    device: DeviceHandle,
    handle: SubscriptionHandle,
}

/// State owned by the monitor; never handed out by reference
#[derive(Default)]
struct GraphState {
    known_ports: Vec<PortId>,
    kinds: HashMap<PortId, PortKind>,
    attributes: BTreeMap<PortId, PortAttributes>,
    edges: BTreeSet<Edge>,
    subscriptions: HashMap<PortId, ActiveSubscription>,
    /// Handles that refused a subscription; not retried while still listed
    not_subscribable: HashMap<PortId, DeviceHandle>,
    generation: u64,
    /// Highest query ticket committed so far
    committed_ticket: u64,
    disposed: bool,
}

/// Everything read from the source for one refresh
struct SourceView {
    ports: Vec<PortEntry>,
    attributes: BTreeMap<PortId, PortAttributes>,
    edges: BTreeSet<Edge>,
    dangling: u64,
}

struct MonitorInner {
    source: Arc<dyn PortDataSource>,
    config: MonitorConfig,
    state: Mutex<GraphState>,
    emit_lock: Mutex<()>,
    observers: Mutex<Vec<Observer>>,
    stats: Mutex<MonitorStats>,
    next_ticket: AtomicU64,
    request_tx: Sender<RefreshRequest>,
    request_rx: Receiver<RefreshRequest>,
}

/// Poisoning only means another refresh panicked; the state it guards is
/// always committed whole, so keep going with it.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MonitorInner {
    fn enqueue(&self, request: RefreshRequest) -> bool {
        match self.request_tx.try_send(request) {
            Ok(()) => true,
            Err(TrySendError::Full(request)) => {
                tracing::trace!("Refresh already pending, coalescing {:?}", request);
                lock(&self.stats).coalesced_requests += 1;
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    fn release_all(&self, state: &mut GraphState) {
        for (port, sub) in state.subscriptions.drain() {
            tracing::debug!("Unsubscribing {}", port);
            self.source.unsubscribe(sub.handle);
        }
        state.not_subscribable.clear();
    }
}

impl Drop for MonitorInner {
    fn drop(&mut self) {
        let state = self
            .state
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        for (_, sub) in state.subscriptions.drain() {
            self.source.unsubscribe(sub.handle);
        }
    }
}

/// Tracks the live port graph of a detector
///
/// Cloning is cheap and every clone drives the same state. [`refresh`] may be
/// called from any number of threads at once.
///
/// [`refresh`]: GraphMonitor::refresh
#[derive(Clone)]
pub struct GraphMonitor {
    inner: Arc<MonitorInner>,
}

impl GraphMonitor {
    /// Create a monitor with an empty known graph
    pub fn new(source: Arc<dyn PortDataSource>, config: MonitorConfig) -> Self {
        let (request_tx, request_rx) = bounded(config.request_channel_capacity.max(1));
        Self {
            inner: Arc::new(MonitorInner {
                source,
                config,
                state: Mutex::new(GraphState::default()),
                emit_lock: Mutex::new(()),
                observers: Mutex::new(Vec::new()),
                stats: Mutex::new(MonitorStats::default()),
                next_ticket: AtomicU64::new(1),
                request_tx,
                request_rx,
            }),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.inner.config
    }

    /// Run one full query-diff-commit-emit cycle
    ///
    /// Fails only when the source cannot list ports at all (or the monitor
    /// was disposed); the known graph is left untouched in that case.
    pub fn refresh(&self) -> Result<ChangeReport> {
        if lock(&self.inner.state).disposed {
            return Err(PortVisError::Disposed);
        }

        let started = Instant::now();
        let mut retries = 0;
        loop {
            let ticket = self.inner.next_ticket.fetch_add(1, Ordering::SeqCst);

            let view = match self.query_source() {
                Ok(view) => view,
                Err(e) => {
                    tracing::warn!("Refresh failed: {}", e);
                    lock(&self.inner.stats).failed_refreshes += 1;
                    return Err(e);
                }
            };

            let state = lock(&self.inner.state);
            if state.disposed {
                return Err(PortVisError::Disposed);
            }

            if ticket < state.committed_ticket && retries < MAX_STALE_RETRIES {
                // A query that started later has already committed; read again
                tracing::debug!(
                    "Refresh overtaken (ticket {} < {}), querying again",
                    ticket,
                    state.committed_ticket
                );
                drop(state);
                retries += 1;
                lock(&self.inner.stats).stale_retries += 1;
                continue;
            }

            return Ok(self.commit(state, view, ticket, started));
        }
    }

    /// Diff `view` against the known graph, commit it and emit the report
    ///
    /// Always commits: the diff is taken against whatever is committed now, so
    /// the sequence of emitted reports replays to the current state.
    fn commit(
        &self,
        mut state: MutexGuard<'_, GraphState>,
        view: SourceView,
        ticket: u64,
        started: Instant,
    ) -> ChangeReport {
        let generation = state.generation + 1;
        let report = ChangeReport::between(
            generation,
            &state.known_ports,
            &state.edges,
            view.ports.iter().map(|p| &p.id),
            &view.edges,
        );

        self.sync_subscriptions(&mut state, &view.ports);

        state.known_ports = view.ports.iter().map(|p| p.id.clone()).collect();
        state.kinds = view.ports.iter().map(|p| (p.id.clone(), p.kind)).collect();
        state.attributes = view.attributes;
        state.edges = view.edges;
        state.generation = generation;
        state.committed_ticket = state.committed_ticket.max(ticket);
        let active_subscriptions = state.subscriptions.len();

        let emit_guard = lock(&self.inner.emit_lock);
        drop(state);

        {
            let mut stats = lock(&self.inner.stats);
            stats.refreshes += 1;
            if report.has_changes() {
                stats.refreshes_with_changes += 1;
            }
            stats.dangling_edges_dropped += view.dangling;
            stats.active_subscriptions = active_subscriptions;
            stats.last_refresh_duration = started.elapsed();
            stats.last_refresh_at = Some(Utc::now());
        }

        if report.has_changes() {
            tracing::debug!("Graph changed {}", report);
            self.emit(&report);
        }
        drop(emit_guard);

        report
    }

    /// Read everything a refresh needs from the source
    fn query_source(&self) -> Result<SourceView> {
        let source = &self.inner.source;
        let listed = source.list_ports().map_err(|e| match e {
            e @ PortVisError::SourceUnavailable(_) => e,
            other => PortVisError::SourceUnavailable(other.to_string()),
        })?;

        let mut seen = HashSet::new();
        let mut ports = Vec::with_capacity(listed.len());
        for entry in listed {
            if seen.insert(entry.id.clone()) {
                ports.push(entry);
            } else {
                tracing::warn!("Duplicate port {} in listing, keeping the first", entry.id);
            }
        }

        let mut attributes = BTreeMap::new();
        let mut upstream = Vec::new();
        for entry in &ports {
            attributes.insert(entry.id.clone(), self.read_attributes(entry));
            match source.get_upstream_port(&entry.handle) {
                Ok(Some(up)) => upstream.push(Edge::new(up, entry.id.clone())),
                Ok(None) => {}
                Err(e) => tracing::debug!("No upstream for {}: {}", entry.id, e),
            }
        }

        let mut edges = BTreeSet::new();
        let mut dangling = 0;
        for edge in upstream {
            if seen.contains(&edge.src) {
                edges.insert(edge);
            } else {
                let err = PortVisError::DanglingEdge {
                    missing: edge.src.clone(),
                    edge,
                };
                tracing::warn!("Dropping edge: {}", err);
                dangling += 1;
            }
        }

        Ok(SourceView {
            ports,
            attributes,
            edges,
            dangling,
        })
    }

    fn read_attributes(&self, entry: &PortEntry) -> PortAttributes {
        let mut attrs = PortAttributes::new();
        for name in &self.inner.config.attribute_names {
            match self.inner.source.get_attribute(&entry.handle, name) {
                Ok(value) => {
                    attrs.insert(name.clone(), value);
                }
                Err(e) => tracing::trace!("Skipping attribute: {}", e),
            }
        }
        attrs
    }

    /// Bring the subscription map in line with the new port set
    ///
    /// Runs under the state lock. Release for departed ports is unconditional.
    /// A port listed under a different device handle than the one it was
    /// subscribed on counts as departed and is subscribed afresh.
    fn sync_subscriptions(&self, state: &mut GraphState, ports: &[PortEntry]) {
        let present: HashMap<&PortId, DeviceHandle> =
            ports.iter().map(|p| (&p.id, p.handle)).collect();

        let departed: Vec<PortId> = state
            .subscriptions
            .iter()
            .filter(|(id, sub)| present.get(id) != Some(&sub.device))
            .map(|(id, _)| id.clone())
            .collect();
        for port in departed {
            if let Some(sub) = state.subscriptions.remove(&port) {
                if present.contains_key(&port) {
                    tracing::debug!("Device behind {} was re-created, resubscribing", port);
                } else {
                    tracing::debug!("Unsubscribing removed port {}", port);
                }
                self.inner.source.unsubscribe(sub.handle);
            }
        }
        state
            .not_subscribable
            .retain(|id, device| present.get(id) == Some(&*device));

        for entry in ports {
            if state.subscriptions.contains_key(&entry.id)
                || state.not_subscribable.contains_key(&entry.id)
            {
                continue;
            }
            match self.subscribe_port(&entry.id, &entry.handle) {
                Ok(handle) => {
                    tracing::debug!("Subscribed to {}", entry.id);
                    state.subscriptions.insert(
                        entry.id.clone(),
                        ActiveSubscription {
                            device: entry.handle,
                            handle,
                        },
                    );
                }
                Err(PortVisError::NotSubscribable(_)) => {
                    tracing::debug!("{} does not support change notification", entry.id);
                    state.not_subscribable.insert(entry.id.clone(), entry.handle);
                }
                Err(e) => {
                    tracing::warn!("Failed to subscribe to {}, will retry: {}", entry.id, e);
                }
            }
        }
    }

    fn subscribe_port(&self, id: &PortId, handle: &DeviceHandle) -> Result<SubscriptionHandle> {
        let weak: Weak<MonitorInner> = Arc::downgrade(&self.inner);
        let port = id.clone();
        let callback: ChangeCallback = Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.enqueue(RefreshRequest::Notification(port.clone()));
            }
        });
        self.inner.source.subscribe(handle, callback)
    }

    /// Deliver a committed report; the caller holds the emission lock
    ///
    /// Sends on unbounded channels only fail once the receiver is gone, and
    /// such observers are pruned.
    fn emit(&self, report: &ChangeReport) {
        let mut observers = lock(&self.inner.observers);
        let before = observers.len();

        observers.retain(|observer| match observer {
            Observer::Events(tx) => report
                .events()
                .chain(std::iter::once(MonitorEvent::Update(report.clone())))
                .all(|event| tx.send(event).is_ok()),
            Observer::Reports(tx) => tx.send(report.clone()).is_ok(),
        });

        let pruned = before - observers.len();
        if pruned > 0 {
            tracing::debug!("Pruned {} disconnected observer(s)", pruned);
        }
    }

    /// Receive granular events followed by an [`MonitorEvent::Update`] per refresh
    ///
    /// The channel is unbounded; every committed report is delivered in full.
    pub fn subscribe_events(&self) -> Receiver<MonitorEvent> {
        let (tx, rx) = unbounded();
        lock(&self.inner.observers).push(Observer::Events(tx));
        rx
    }

    /// Receive one aggregate report per refresh that changed something
    pub fn subscribe_reports(&self) -> Receiver<ChangeReport> {
        let (tx, rx) = unbounded();
        lock(&self.inner.observers).push(Observer::Reports(tx));
        rx
    }

    /// Queue a refresh; returns false if one was already pending
    pub fn request_refresh(&self) -> bool {
        self.inner.enqueue(RefreshRequest::Manual)
    }

    pub(crate) fn request_poll(&self) -> bool {
        self.inner.enqueue(RefreshRequest::Poll)
    }

    /// Queue of pending refresh requests, for an executor to wait on
    pub fn refresh_requests(&self) -> Receiver<RefreshRequest> {
        self.inner.request_rx.clone()
    }

    /// Take every queued request without refreshing
    pub fn drain_requests(&self) -> Vec<RefreshRequest> {
        self.inner.request_rx.try_iter().collect()
    }

    /// Service queued requests with a single refresh
    ///
    /// Returns `Ok(None)` when nothing was queued.
    pub fn process_pending(&self) -> Result<Option<ChangeReport>> {
        let pending = self.drain_requests();
        if pending.is_empty() {
            return Ok(None);
        }
        tracing::trace!("Servicing {} refresh requests", pending.len());
        self.refresh().map(Some)
    }

    /// Copy of the known graph
    pub fn snapshot(&self) -> GraphSnapshot {
        let state = lock(&self.inner.state);
        GraphSnapshot {
            generation: state.generation,
            ports: state
                .known_ports
                .iter()
                .map(|id| {
                    let kind = state.kinds.get(id).copied().unwrap_or_default();
                    (id.clone(), kind)
                })
                .collect(),
            edges: state.edges.clone(),
            attributes: state.attributes.clone(),
        }
    }

    /// Known port ids in last-seen listing order
    pub fn known_ports(&self) -> Vec<PortId> {
        lock(&self.inner.state).known_ports.clone()
    }

    pub fn edges(&self) -> BTreeSet<Edge> {
        lock(&self.inner.state).edges.clone()
    }

    pub fn generation(&self) -> u64 {
        lock(&self.inner.state).generation
    }

    pub fn stats(&self) -> MonitorStats {
        lock(&self.inner.stats).clone()
    }

    pub fn active_subscriptions(&self) -> usize {
        lock(&self.inner.state).subscriptions.len()
    }

    pub fn is_subscribed(&self, id: &PortId) -> bool {
        lock(&self.inner.state).subscriptions.contains_key(id)
    }

    pub fn is_disposed(&self) -> bool {
        lock(&self.inner.state).disposed
    }

    /// Release every subscription and stop accepting refreshes
    ///
    /// Observers see their channels disconnect. Calling this twice is a no-op.
    pub fn dispose(&self) {
        let mut state = lock(&self.inner.state);
        if state.disposed {
            return;
        }
        state.disposed = true;
        self.inner.release_all(&mut state);
        drop(state);

        lock(&self.inner.observers).clear();
        lock(&self.inner.stats).active_subscriptions = 0;
        tracing::info!("Graph monitor disposed");
    }
}

impl std::fmt::Debug for GraphMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.inner.state);
        f.debug_struct("GraphMonitor")
            .field("generation", &state.generation)
            .field("ports", &state.known_ports.len())
            .field("edges", &state.edges.len())
            .field("subscriptions", &state.subscriptions.len())
            .field("disposed", &state.disposed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MockPortDataSource;
    use crate::types::PortKind;

    fn entry(id: &str, kind: PortKind, handle: u64) -> PortEntry {
        PortEntry::new(id, kind, DeviceHandle(handle))
    }

    /// camA (handle 1) feeding pluginA (handle 2)
    fn two_port_mock() -> MockPortDataSource {
        let mut mock = MockPortDataSource::new();
        mock.expect_list_ports().returning(|| {
            Ok(vec![
                entry("camA", PortKind::Camera, 1),
                entry("pluginA", PortKind::Plugin, 2),
            ])
        });
        mock.expect_get_attribute()
            .returning(|handle, name| match (handle.0, name) {
                (2, "plugin_type") => Ok("NDPluginROI".to_string()),
                _ => Err(PortVisError::AttributeUnavailable {
                    port: PortId::from("camA"),
                    attribute: name.to_string(),
                }),
            });
        mock.expect_get_upstream_port()
            .returning(|handle| Ok((handle.0 == 2).then(|| PortId::from("camA"))));
        mock
    }

    fn monitor(mock: MockPortDataSource) -> GraphMonitor {
        GraphMonitor::new(Arc::new(mock), MonitorConfig::default())
    }

    #[test]
    fn test_first_refresh_reports_everything() {
        let mut mock = two_port_mock();
        mock.expect_subscribe()
            .returning(|handle, _| Ok(SubscriptionHandle(handle.0)));
        mock.expect_unsubscribe().times(2).return_const(());

        let monitor = monitor(mock);
        let report = monitor.refresh().unwrap();

        assert_eq!(
            report.ports_added,
            vec![PortId::from("camA"), PortId::from("pluginA")]
        );
        assert_eq!(report.edges_added, vec![Edge::new("camA", "pluginA")]);
        assert_eq!(report.generation, 1);
        assert_eq!(monitor.active_subscriptions(), 2);

        let snap = monitor.snapshot();
        let info = snap.port_information(&PortId::from("pluginA")).unwrap();
        assert_eq!(info.get("plugin_type").map(String::as_str), Some("NDPluginROI"));
        assert!(snap.port_information(&PortId::from("camA")).unwrap().is_empty());
    }

    #[test]
    fn test_not_subscribable_is_not_retried() {
        let mut mock = two_port_mock();
        // camA refuses once; pluginA subscribes once
        mock.expect_subscribe()
            .times(2)
            .returning(|handle, _| match handle.0 {
                1 => Err(PortVisError::NotSubscribable(PortId::from("camA"))),
                _ => Ok(SubscriptionHandle(7)),
            });
        mock.expect_unsubscribe().times(1).return_const(());

        let monitor = monitor(mock);
        monitor.refresh().unwrap();
        let second = monitor.refresh().unwrap();

        assert!(!second.has_changes());
        assert!(!monitor.is_subscribed(&PortId::from("camA")));
        assert!(monitor.is_subscribed(&PortId::from("pluginA")));
    }

    #[test]
    fn test_transient_subscribe_failure_is_retried() {
        let mut mock = two_port_mock();
        let mut attempts = 0;
        mock.expect_subscribe().returning(move |handle, _| {
            attempts += 1;
            if attempts == 1 {
                Err(PortVisError::SourceUnavailable("busy".into()))
            } else {
                Ok(SubscriptionHandle(handle.0))
            }
        });
        mock.expect_unsubscribe().return_const(());

        let monitor = monitor(mock);
        monitor.refresh().unwrap();
        assert_eq!(monitor.active_subscriptions(), 1);
        monitor.refresh().unwrap();
        assert_eq!(monitor.active_subscriptions(), 2);
    }

    #[test]
    fn test_unavailable_source_leaves_state_unchanged() {
        let mut mock = MockPortDataSource::new();
        let mut calls = 0;
        mock.expect_list_ports().returning(move || {
            calls += 1;
            if calls == 1 {
                Ok(vec![entry("camA", PortKind::Camera, 1)])
            } else {
                Err(PortVisError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "detector timed out",
                )))
            }
        });
        mock.expect_get_attribute()
            .returning(|_, name| Err(PortVisError::AttributeUnavailable {
                port: PortId::from("camA"),
                attribute: name.to_string(),
            }));
        mock.expect_get_upstream_port().returning(|_| Ok(None));
        mock.expect_subscribe()
            .returning(|_, _| Err(PortVisError::NotSubscribable(PortId::from("camA"))));

        let monitor = monitor(mock);
        monitor.refresh().unwrap();
        let before = monitor.snapshot();

        let err = monitor.refresh().unwrap_err();
        assert!(matches!(err, PortVisError::SourceUnavailable(_)));
        assert!(err.is_fatal());
        assert_eq!(monitor.snapshot(), before);
        assert_eq!(monitor.stats().failed_refreshes, 1);
        assert_eq!(monitor.stats().refreshes, 1);
    }

    #[test]
    fn test_upstream_read_failure_contributes_no_edge() {
        let mut mock = MockPortDataSource::new();
        mock.expect_list_ports().returning(|| {
            Ok(vec![
                entry("camA", PortKind::Camera, 1),
                entry("pluginA", PortKind::Plugin, 2),
            ])
        });
        mock.expect_get_attribute()
            .returning(|_, _| Ok("x".to_string()));
        mock.expect_get_upstream_port().returning(|_| {
            Err(PortVisError::AttributeUnavailable {
                port: PortId::from("pluginA"),
                attribute: "nd_array_port".to_string(),
            })
        });
        mock.expect_subscribe()
            .returning(|h, _| Ok(SubscriptionHandle(h.0)));
        mock.expect_unsubscribe().return_const(());

        let monitor = monitor(mock);
        let report = monitor.refresh().unwrap();
        assert_eq!(report.ports_added.len(), 2);
        assert!(report.edges_added.is_empty());
    }

    #[test]
    fn test_dispose_rejects_refresh() {
        let mut mock = two_port_mock();
        mock.expect_subscribe()
            .returning(|h, _| Ok(SubscriptionHandle(h.0)));
        mock.expect_unsubscribe().times(2).return_const(());

        let monitor = monitor(mock);
        let events = monitor.subscribe_events();
        monitor.refresh().unwrap();
        monitor.dispose();
        monitor.dispose();

        assert!(monitor.is_disposed());
        assert_eq!(monitor.active_subscriptions(), 0);
        assert!(matches!(monitor.refresh(), Err(PortVisError::Disposed)));

        // Everything already queued is still delivered, then the channel closes
        let received: Vec<_> = events.iter().collect();
        assert_eq!(received.len(), 4);
    }

    #[test]
    fn test_requests_coalesce() {
        let mut config = MonitorConfig::default();
        config.request_channel_capacity = 1;
        let mut mock = two_port_mock();
        mock.expect_subscribe()
            .returning(|h, _| Ok(SubscriptionHandle(h.0)));
        mock.expect_unsubscribe().return_const(());
        let monitor = GraphMonitor::new(Arc::new(mock), config);

        assert!(monitor.request_refresh());
        assert!(!monitor.request_refresh());
        assert_eq!(monitor.stats().coalesced_requests, 1);

        let report = monitor.process_pending().unwrap();
        assert!(report.is_some());
        assert!(monitor.process_pending().unwrap().is_none());
    }
}
