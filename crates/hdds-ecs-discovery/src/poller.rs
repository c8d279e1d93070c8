// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Synchronous polling thread wrapper for ECS discovery.
//!
//! Runs [`EcsDiscovery`] on a dedicated background thread with its own
//! tokio runtime, so membership code without an async runtime can consume
//! peer changes as events.
//!
//! # Flow
//!
//! ```text
//! caller thread                      "hdds-ecs-discovery" thread
//! -------------                      ---------------------------
//! poll_now() / shutdown()  --cmd-->  every 100ms: drain one command
//!                                    every poll_interval (or PollNow):
//!                                      discover_nodes()
//!                                      latest.replace(set)
//! latest()  <---- DiscoveryCache ----'
//! poll() / wait()  <--events------   PeerJoined / PeerLeft / PeersUpdated
//!                                    Error (fail-fast only), Stopped
//! ```

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::cache::DiscoveryCache;
use crate::client::EcsConnector;
use crate::discovery::EcsDiscovery;
use crate::model::Address;

/// Command loop granularity.
const TICK: Duration = Duration::from_millis(100);

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for the discovery poller.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Interval between discovery cycles.
    pub poll_interval: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
        }
    }
}

// ============================================================================
// Commands (sync → async)
// ============================================================================

#[derive(Debug)]
enum PollerCommand {
    PollNow,
    Shutdown,
}

// ============================================================================
// Events (async → sync)
// ============================================================================

/// Events sent from the poller thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollerEvent {
    /// Poller is ready and running.
    Ready,
    /// Full peer set after a cycle that changed it (always sent after the first cycle).
    PeersUpdated { peers: Vec<Address> },
    /// Address present now, absent before.
    PeerJoined { address: Address },
    /// Address present before, absent now.
    PeerLeft { address: Address },
    /// Discovery cycle failed (fail-fast configurations only).
    Error { message: String },
    /// Poller has stopped.
    Stopped,
}

// ============================================================================
// Handle (sync side)
// ============================================================================

/// Handle to interact with the poller from sync code.
#[derive(Clone)]
pub struct EcsDiscoveryPollerHandle {
    cmd_tx: Sender<PollerCommand>,
    event_rx: Arc<std::sync::Mutex<Receiver<PollerEvent>>>,
    running: Arc<AtomicBool>,
    latest: Arc<DiscoveryCache>,
}

impl EcsDiscoveryPollerHandle {
    /// Check if the poller is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Force an immediate discovery cycle.
    pub fn poll_now(&self) -> Result<(), String> {
        self.cmd_tx
            .send(PollerCommand::PollNow)
            .map_err(|e| format!("Failed to send poll command: {}", e))
    }

    /// Drain pending events (non-blocking).
    pub fn poll(&self) -> Vec<PollerEvent> {
        let mut events = Vec::new();
        if let Ok(rx) = self.event_rx.lock() {
            loop {
                match rx.try_recv() {
                    Ok(event) => events.push(event),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        self.running.store(false, Ordering::Relaxed);
                        break;
                    }
                }
            }
        }
        events
    }

    /// Wait for an event (blocking with timeout).
    pub fn wait(&self, timeout: Duration) -> Option<PollerEvent> {
        if let Ok(rx) = self.event_rx.lock() {
            rx.recv_timeout(timeout).ok()
        } else {
            None
        }
    }

    /// Peers from the last completed cycle.
    pub fn latest(&self) -> Vec<Address> {
        self.latest.snapshot()
    }

    /// Request shutdown.
    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(PollerCommand::Shutdown);
    }
}

// ============================================================================
// Poller Thread
// ============================================================================

/// ECS discovery poller thread.
pub struct EcsDiscoveryPoller {
    handle: EcsDiscoveryPollerHandle,
    thread_handle: Option<JoinHandle<()>>,
}

struct PollerState<C: EcsConnector> {
    discovery: EcsDiscovery<C>,
    config: PollerConfig,
    cmd_rx: Receiver<PollerCommand>,
    event_tx: Sender<PollerEvent>,
    running: Arc<AtomicBool>,
    latest: Arc<DiscoveryCache>,
}

impl EcsDiscoveryPoller {
    /// Spawn a poller thread that owns `discovery`.
    pub fn spawn<C>(discovery: EcsDiscovery<C>, config: PollerConfig) -> Self
    where
        C: EcsConnector + 'static,
    {
        let (cmd_tx, cmd_rx) = channel();
        let (event_tx, event_rx) = channel();
        let running = Arc::new(AtomicBool::new(true));
        let latest = Arc::new(DiscoveryCache::new());

        let state = PollerState {
            discovery,
            config,
            cmd_rx,
            event_tx,
            running: Arc::clone(&running),
            latest: Arc::clone(&latest),
        };

        #[allow(clippy::expect_used)] // thread spawn failure is unrecoverable
        let thread_handle = thread::Builder::new()
            .name("hdds-ecs-discovery".to_string())
            .spawn(move || Self::run_thread(state))
            .expect("Failed to spawn ECS discovery poller thread");

        let handle = EcsDiscoveryPollerHandle {
            cmd_tx,
            event_rx: Arc::new(std::sync::Mutex::new(event_rx)),
            running,
            latest,
        };

        Self {
            handle,
            thread_handle: Some(thread_handle),
        }
    }

    /// Get a handle to interact with the poller.
    pub fn handle(&self) -> EcsDiscoveryPollerHandle {
        self.handle.clone()
    }

    fn run_thread<C: EcsConnector>(state: PollerState<C>) {
        let rt = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                let _ = state.event_tx.send(PollerEvent::Error {
                    message: format!("Failed to create tokio runtime: {}", e),
                });
                state.running.store(false, Ordering::Relaxed);
                return;
            }
        };

        rt.block_on(Self::polling_loop(state));
    }

    async fn polling_loop<C: EcsConnector>(state: PollerState<C>) {
        let PollerState {
            discovery,
            config,
            cmd_rx,
            event_tx,
            running,
            latest,
        } = state;

        let _ = event_tx.send(PollerEvent::Ready);
        log::info!(
            "[ECS-DISCOVERY] Poller ready (interval {:?})",
            config.poll_interval
        );

        let mut known: Option<BTreeSet<Address>> = None;
        let mut last_poll: Option<Instant> = None;

        while running.load(Ordering::Relaxed) {
            let mut force_poll = false;
            match cmd_rx.try_recv() {
                Ok(PollerCommand::PollNow) => force_poll = true,
                Ok(PollerCommand::Shutdown) => {
                    log::info!("[ECS-DISCOVERY] Shutdown requested");
                    running.store(false, Ordering::Relaxed);
                    break;
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => {
                    log::warn!("[ECS-DISCOVERY] Command channel disconnected");
                    running.store(false, Ordering::Relaxed);
                    break;
                }
            }

            let due = match last_poll {
                Some(at) => at.elapsed() >= config.poll_interval,
                None => true,
            };
            if force_poll || due {
                last_poll = Some(Instant::now());

                match discovery.discover_nodes().await {
                    Ok(peers) => {
                        let current: BTreeSet<Address> = peers.into_iter().collect();
                        latest.replace(current.clone());
                        for event in diff(known.as_ref(), &current) {
                            let _ = event_tx.send(event);
                        }
                        known = Some(current);
                    }
                    Err(e) => {
                        log::warn!("[ECS-DISCOVERY] Discovery poll failed: {}", e);
                        let _ = event_tx.send(PollerEvent::Error {
                            message: e.to_string(),
                        });
                    }
                }
            }

            tokio::time::sleep(TICK).await;
        }

        let _ = event_tx.send(PollerEvent::Stopped);
        log::info!("[ECS-DISCOVERY] Poller stopped");
    }
}

/// Join/leave events between two cycles, then the full set if anything changed.
fn diff(previous: Option<&BTreeSet<Address>>, current: &BTreeSet<Address>) -> Vec<PollerEvent> {
    let empty = BTreeSet::new();
    let before = previous.unwrap_or(&empty);

    let mut events: Vec<PollerEvent> = current
        .difference(before)
        .map(|a| {
            log::debug!("[ECS-DISCOVERY] Peer joined: {}", a);
            PollerEvent::PeerJoined { address: a.clone() }
        })
        .collect();
    events.extend(before.difference(current).map(|a| {
        log::debug!("[ECS-DISCOVERY] Peer left: {}", a);
        PollerEvent::PeerLeft { address: a.clone() }
    }));

    if previous.is_none() || !events.is_empty() {
        log::info!("[ECS-DISCOVERY] {} peer address(es)", current.len());
        events.push(PollerEvent::PeersUpdated {
            peers: current.iter().cloned().collect(),
        });
    }
    events
}

impl Drop for EcsDiscoveryPoller {
    fn drop(&mut self) {
        self.handle.shutdown();
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{EcsApi, EcsError};
    use crate::config::EcsDiscoveryConfig;
    use crate::model::Task;
    use std::sync::Mutex;

    fn addr(host: &str) -> Address {
        Address::new(host, 5701).unwrap()
    }

    #[test]
    fn test_config_default() {
        assert_eq!(PollerConfig::default().poll_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_diff_first_cycle() {
        let current: BTreeSet<Address> = [addr("10.0.0.1")].into();
        let events = diff(None, &current);
        assert_eq!(
            events,
            vec![
                PollerEvent::PeerJoined {
                    address: addr("10.0.0.1")
                },
                PollerEvent::PeersUpdated {
                    peers: vec![addr("10.0.0.1")]
                },
            ]
        );

        // an empty first result is still reported
        let events = diff(None, &BTreeSet::new());
        assert_eq!(events, vec![PollerEvent::PeersUpdated { peers: vec![] }]);
    }

    #[test]
    fn test_diff_join_and_leave() {
        let before: BTreeSet<Address> = [addr("10.0.0.1"), addr("10.0.0.2")].into();
        let after: BTreeSet<Address> = [addr("10.0.0.2"), addr("10.0.0.3")].into();

        let events = diff(Some(&before), &after);
        assert!(events.contains(&PollerEvent::PeerJoined {
            address: addr("10.0.0.3")
        }));
        assert!(events.contains(&PollerEvent::PeerLeft {
            address: addr("10.0.0.1")
        }));
        assert!(matches!(events.last(), Some(PollerEvent::PeersUpdated { .. })));
    }

    #[test]
    fn test_diff_unchanged_is_silent() {
        let set: BTreeSet<Address> = [addr("10.0.0.1")].into();
        assert!(diff(Some(&set), &set).is_empty());
    }

    #[derive(Clone, Default)]
    struct Scripted {
        ips: Arc<Mutex<Vec<&'static str>>>,
    }

    impl EcsApi for Scripted {
        async fn list_clusters(&self) -> Result<Vec<String>, EcsError> {
            Ok(vec!["c".into()])
        }
        async fn list_services(&self, _: &str) -> Result<Vec<String>, EcsError> {
            Ok(vec!["s".into()])
        }
        async fn list_running_tasks(&self, _: &str, _: &str) -> Result<Vec<String>, EcsError> {
            Ok(vec!["t".into()])
        }
        async fn describe_tasks(&self, _: &str, _: &[String]) -> Result<Vec<Task>, EcsError> {
            let ips = self.ips.lock().unwrap().clone();
            Ok(vec![Task::new("t").with_container("web", &ips)])
        }
    }

    impl EcsConnector for Scripted {
        type Api = Scripted;
        async fn connect(&self, _: &EcsDiscoveryConfig) -> Result<Scripted, EcsError> {
            Ok(self.clone())
        }
    }

    fn wait_for<F>(handle: &EcsDiscoveryPollerHandle, mut pred: F) -> bool
    where
        F: FnMut(&PollerEvent) -> bool,
    {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if let Some(event) = handle.wait(Duration::from_millis(200)) {
                if pred(&event) {
                    return true;
                }
            }
        }
        false
    }

    #[test]
    fn test_poller_lifecycle() {
        let api = Scripted::default();
        *api.ips.lock().unwrap() = vec!["10.0.0.1"];
        let discovery = EcsDiscovery::new(
            EcsDiscoveryConfig::for_service("c", "s"),
            api.clone(),
            None,
        );

        let poller = EcsDiscoveryPoller::spawn(
            discovery,
            PollerConfig {
                poll_interval: Duration::from_secs(3600),
            },
        );
        let handle = poller.handle();

        assert!(wait_for(&handle, |e| *e == PollerEvent::Ready));
        assert!(wait_for(&handle, |e| matches!(e, PollerEvent::PeersUpdated { .. })));
        assert_eq!(handle.latest(), vec![addr("10.0.0.1")]);

        *api.ips.lock().unwrap() = vec!["10.0.0.2"];
        handle.poll_now().unwrap();
        assert!(wait_for(&handle, |e| *e
            == PollerEvent::PeerLeft {
                address: addr("10.0.0.1")
            }));
        assert!(wait_for(&handle, |e| matches!(e, PollerEvent::PeersUpdated { .. })));
        assert_eq!(handle.latest(), vec![addr("10.0.0.2")]);

        drop(poller);
        assert!(!handle.is_running());
        assert!(handle.poll().contains(&PollerEvent::Stopped));
    }
}
