//! Port graph monitor
//!
//! The monitor owns the authoritative known graph of a detector and keeps it
//! in step with the [`PortDataSource`](crate::source::PortDataSource). Every
//! refresh produces a [`ChangeReport`] describing the minimal set of port and
//! edge additions and removals since the previous one.
//!
//! # Architecture
//!
//! - [`GraphMonitor`] - Thread-safe state tracker; call [`GraphMonitor::refresh`] from anywhere
//! - [`ChangeReport`] / [`MonitorEvent`] - What observers receive
//! - [`GraphSnapshot`] - Immutable copy of the known graph for layout and inspection
//! - [`MonitorBackend`] - Owns a worker thread that services notifications and polling
//! - [`MonitorClient`] - Consumer-side handle for sending commands and receiving messages
//!
//! # Example
//!
//! ```ignore
//! use portvis_rs::config::AppConfig;
//! use portvis_rs::monitor::{MonitorBackend, MonitorMessage};
//! use portvis_rs::source::MockPortSource;
//! use std::sync::Arc;
//!
//! let config = AppConfig::default();
//! let source = Arc::new(MockPortSource::simulated_detector());
//! let (backend, client) = MonitorBackend::new(&config, source);
//!
//! std::thread::spawn(move || backend.run());
//!
//! client.refresh();
//! for msg in client.drain() {
//!     if let MonitorMessage::Report(report) = msg {
//!         println!("{}", report);
//!     }
//! }
//! ```

pub mod graph_monitor;
pub mod report;
pub mod snapshot;
pub mod worker;

pub use graph_monitor::{GraphMonitor, RefreshRequest};
pub use report::{ChangeReport, KnownGraph, MonitorEvent};
pub use snapshot::{Connectivity, GraphSnapshot};
pub use worker::MonitorWorker;

use crate::config::AppConfig;
use crate::source::PortDataSource;
use crate::types::MonitorStats;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

/// Message sent from the consumer to the worker
#[derive(Debug, Clone)]
pub enum MonitorCommand {
    /// Refresh now
    Refresh,
    /// Request a copy of the known graph
    RequestSnapshot,
    /// Request current statistics
    RequestStats,
    /// Change the poll interval (`None` or zero disables polling)
    SetPollInterval(Option<Duration>),
    /// Shutdown the worker
    Shutdown,
}

/// Message sent from the worker to the consumer
#[derive(Debug, Clone)]
pub enum MonitorMessage {
    /// A refresh committed changes
    Report(ChangeReport),
    /// A refresh failed; the known graph is unchanged
    RefreshFailed(String),
    /// Statistics update
    Stats(MonitorStats),
    /// Snapshot of the known graph
    Snapshot(GraphSnapshot),
    /// Worker is shutting down
    Shutdown,
}

/// Consumer-side handle to a running [`MonitorBackend`]
pub struct MonitorClient {
    /// Receiver for worker messages
    pub receiver: Receiver<MonitorMessage>,
    /// Sender for commands to the worker
    pub command_sender: Sender<MonitorCommand>,
}

impl MonitorClient {
    /// Try to receive a message without blocking
    pub fn try_recv(&self) -> Option<MonitorMessage> {
        self.receiver.try_recv().ok()
    }

    /// Wait up to `timeout` for the next message
    pub fn recv_timeout(&self, timeout: Duration) -> Option<MonitorMessage> {
        match self.receiver.recv_timeout(timeout) {
            Ok(msg) => Some(msg),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Receive all pending messages
    pub fn drain(&self) -> Vec<MonitorMessage> {
        let mut messages = Vec::new();
        while let Ok(msg) = self.receiver.try_recv() {
            messages.push(msg);
        }
        messages
    }

    /// Send a command to the worker
    pub fn send_command(&self, cmd: MonitorCommand) -> bool {
        self.command_sender.send(cmd).is_ok()
    }

    /// Request an immediate refresh
    pub fn refresh(&self) {
        let _ = self.command_sender.send(MonitorCommand::Refresh);
    }

    /// Request a snapshot of the known graph
    pub fn request_snapshot(&self) {
        let _ = self.command_sender.send(MonitorCommand::RequestSnapshot);
    }

    /// Request current statistics
    pub fn request_stats(&self) {
        let _ = self.command_sender.send(MonitorCommand::RequestStats);
    }

    /// Change the poll interval
    pub fn set_poll_interval(&self, interval: Option<Duration>) {
        let _ = self
            .command_sender
            .send(MonitorCommand::SetPollInterval(interval));
    }

    /// Request shutdown
    pub fn shutdown(&self) {
        let _ = self.command_sender.send(MonitorCommand::Shutdown);
    }
}

/// A graph monitor driven from its own thread
pub struct MonitorBackend {
    monitor: GraphMonitor,
    /// Receiver for commands from the consumer
    command_receiver: Receiver<MonitorCommand>,
    /// Sender for messages to the consumer
    message_sender: Sender<MonitorMessage>,
    /// Running flag
    running: Arc<AtomicBool>,
}

impl MonitorBackend {
    /// Create a backend with its communication channels
    pub fn new(config: &AppConfig, source: Arc<dyn PortDataSource>) -> (Self, MonitorClient) {
        let (cmd_tx, cmd_rx) = bounded(64);
        let (msg_tx, msg_rx) = bounded(config.monitor.message_channel_capacity.max(1));

        let backend = Self {
            monitor: GraphMonitor::new(source, config.monitor.clone()),
            command_receiver: cmd_rx,
            message_sender: msg_tx,
            running: Arc::new(AtomicBool::new(true)),
        };

        let client = MonitorClient {
            receiver: msg_rx,
            command_sender: cmd_tx,
        };

        (backend, client)
    }

    /// The monitor this backend drives; clones share its state
    pub fn monitor(&self) -> GraphMonitor {
        self.monitor.clone()
    }

    /// Run the worker loop on the current thread
    pub fn run(self) {
        let mut worker = MonitorWorker::new(
            self.monitor,
            self.command_receiver,
            self.message_sender,
            self.running,
        );
        worker.run();
    }

    /// Get a handle to stop the backend
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }
}
