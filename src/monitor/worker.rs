//! Monitor Worker Thread Implementation
//!
//! This module contains the loop that drives a [`GraphMonitor`] from its own
//! thread. It communicates with the consumer through crossbeam channels.
//!
//! # Responsibilities
//!
//! - **Command processing**: manual refresh, snapshot and stats requests, shutdown
//! - **Notification servicing**: refresh requests queued by port subscriptions
//! - **Polling**: optional periodic refresh for sources without notifications
//! - **Report forwarding**: every committed report is passed on as a message
//!
//! Queued refresh requests are coalesced: however many notifications arrived
//! since the last pass, the worker runs a single refresh for them.
//!
//! Messages are never dropped. When the consumer's queue is full the worker
//! waits for room, giving up only once it has been asked to stop or the
//! consumer has gone away.

use super::graph_monitor::{GraphMonitor, RefreshRequest};
use super::report::ChangeReport;
use super::{MonitorCommand, MonitorMessage};
use crossbeam_channel::{Receiver, SendTimeoutError, Sender, TryRecvError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How long the loop sleeps when there is nothing to do
pub const IDLE_TICK: Duration = Duration::from_millis(5);

/// The worker that owns the refresh loop
pub struct MonitorWorker {
    monitor: GraphMonitor,
    /// Command receiver from the consumer
    command_rx: Receiver<MonitorCommand>,
    /// Message sender to the consumer
    message_tx: Sender<MonitorMessage>,
    /// Running flag
    running: Arc<AtomicBool>,
    /// Refresh requests queued by subscriptions and callers
    requests: Receiver<RefreshRequest>,
    /// Committed reports, including those from refreshes run elsewhere
    reports: Receiver<ChangeReport>,
    poll_interval: Option<Duration>,
    last_poll: Instant,
}

impl MonitorWorker {
    pub fn new(
        monitor: GraphMonitor,
        command_rx: Receiver<MonitorCommand>,
        message_tx: Sender<MonitorMessage>,
        running: Arc<AtomicBool>,
    ) -> Self {
        let poll_interval = monitor.config().poll_interval();
        let requests = monitor.refresh_requests();
        let reports = monitor.subscribe_reports();

        Self {
            monitor,
            command_rx,
            message_tx,
            running,
            requests,
            reports,
            poll_interval,
            last_poll: Instant::now(),
        }
    }

    /// Run the main worker loop
    pub fn run(&mut self) {
        tracing::info!("Monitor worker started");

        self.refresh();
        self.forward_reports();

        while self.running.load(Ordering::SeqCst) {
            self.process_commands();
            if !self.running.load(Ordering::SeqCst) {
                break;
            }

            if self.poll_due() {
                self.last_poll = Instant::now();
                self.monitor.request_poll();
            }

            let serviced = self.process_requests();
            self.forward_reports();

            if !serviced {
                std::thread::sleep(IDLE_TICK);
            }
        }

        self.monitor.dispose();
        self.forward_reports();

        let _ = self.message_tx.try_send(MonitorMessage::Shutdown);
        tracing::info!("Monitor worker stopped");
    }

    /// Process pending commands from the consumer
    fn process_commands(&mut self) {
        loop {
            match self.command_rx.try_recv() {
                Ok(cmd) => self.handle_command(cmd),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.running.store(false, Ordering::SeqCst);
                    break;
                }
            }
        }
    }

    /// Handle a single command
    fn handle_command(&mut self, cmd: MonitorCommand) {
        match cmd {
            MonitorCommand::Refresh => {
                // Anything already queued is covered by this refresh
                self.monitor.drain_requests();
                self.refresh();
            }
            MonitorCommand::RequestSnapshot => {
                let snapshot = self.monitor.snapshot();
                self.send_message(MonitorMessage::Snapshot(snapshot));
            }
            MonitorCommand::RequestStats => {
                let stats = self.monitor.stats();
                self.send_message(MonitorMessage::Stats(stats));
            }
            MonitorCommand::SetPollInterval(interval) => {
                tracing::debug!("Poll interval set to {:?}", interval);
                self.poll_interval = interval.filter(|d| !d.is_zero());
                self.last_poll = Instant::now();
            }
            MonitorCommand::Shutdown => {
                self.running.store(false, Ordering::SeqCst);
            }
        }
    }

    /// Run one refresh for every request queued since the last pass
    fn process_requests(&mut self) -> bool {
        let pending: Vec<RefreshRequest> = self.requests.try_iter().collect();
        if pending.is_empty() {
            return false;
        }

        if tracing::enabled!(tracing::Level::TRACE) {
            for request in &pending {
                tracing::trace!("Refresh requested: {:?}", request);
            }
        }
        self.refresh();
        true
    }

    fn poll_due(&self) -> bool {
        self.poll_interval
            .is_some_and(|interval| self.last_poll.elapsed() >= interval)
    }

    fn refresh(&mut self) {
        if let Err(e) = self.monitor.refresh() {
            self.send_message(MonitorMessage::RefreshFailed(e.to_string()));
        }
    }

    fn forward_reports(&mut self) {
        while let Ok(report) = self.reports.try_recv() {
            self.send_message(MonitorMessage::Report(report));
        }
    }

    /// Send a message, waiting for room while the worker is running
    fn send_message(&mut self, msg: MonitorMessage) {
        let mut msg = msg;
        loop {
            match self.message_tx.send_timeout(msg, IDLE_TICK) {
                Ok(()) => return,
                Err(SendTimeoutError::Timeout(pending)) => {
                    if !self.running.load(Ordering::SeqCst) {
                        tracing::debug!("Worker stopping, discarding {:?}", pending);
                        return;
                    }
                    msg = pending;
                }
                Err(SendTimeoutError::Disconnected(_)) => {
                    tracing::info!("Consumer disconnected, stopping worker");
                    self.running.store(false, Ordering::SeqCst);
                    return;
                }
            }
        }
    }
}
