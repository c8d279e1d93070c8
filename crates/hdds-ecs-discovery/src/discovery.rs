// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! ECS peer discovery.
//!
//! # Cycle
//!
//! ```text
//! discover_nodes()
//!   |-- lock cycle mutex
//!   |-- connector.connect(config)          region + credentials
//!   |-- resolve_running_tasks(selector)    list/describe, batched
//!   |-- extract_addresses(tasks, own ARN)  filter + port expansion
//!   |-- cache.replace(set)                 atomic swap
//!   '-- snapshot
//!
//! on error:  fail_fast  -> Err(DiscoveryError::Query)
//!            otherwise  -> log + previous snapshot
//! ```

use crate::cache::DiscoveryCache;
use crate::client::{EcsConnector, EcsError, HttpConnector};
use crate::config::EcsDiscoveryConfig;
use crate::extract::extract_addresses;
use crate::identity;
use crate::model::Address;
use crate::resolver::resolve_running_tasks;
use std::collections::BTreeSet;
use thiserror::Error;
use tokio::sync::Mutex;

/// Discovery errors.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("ECS query failed: {0}")]
    Query(#[from] EcsError),
}

/// Resolves the live peers of this task from the ECS control plane.
pub struct EcsDiscovery<C: EcsConnector = HttpConnector> {
    config: EcsDiscoveryConfig,
    connector: C,
    own_task_arn: Option<String>,
    cache: DiscoveryCache,
    cycle: Mutex<()>,
}

impl EcsDiscovery<HttpConnector> {
    /// Production setup: real ECS endpoint, own task from the metadata hints.
    pub async fn from_env(config: EcsDiscoveryConfig) -> Result<Self, DiscoveryError> {
        let connector = HttpConnector::new()?;
        let own_task_arn = identity::resolve_own_task_arn().await;
        Ok(Self::new(config, connector, own_task_arn))
    }
}

impl<C: EcsConnector> EcsDiscovery<C> {
    pub fn new(config: EcsDiscoveryConfig, connector: C, own_task_arn: Option<String>) -> Self {
        log::info!(
            "[ECS-DISCOVERY] {} (own task: {})",
            config,
            own_task_arn.as_deref().unwrap_or("unknown")
        );
        Self {
            config,
            connector,
            own_task_arn,
            cache: DiscoveryCache::new(),
            cycle: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &EcsDiscoveryConfig {
        &self.config
    }

    pub fn own_task_arn(&self) -> Option<&str> {
        self.own_task_arn.as_deref()
    }

    /// Peers from the last successful cycle, without querying.
    pub fn cached_nodes(&self) -> Vec<Address> {
        self.cache.snapshot()
    }

    /// Run one discovery cycle and return the ordered peer set.
    ///
    /// Overlapping calls run one after the other.
    pub async fn discover_nodes(&self) -> Result<Vec<Address>, DiscoveryError> {
        let _cycle = self.cycle.lock().await;

        match self.query().await {
            Ok(peers) => {
                log::debug!("[ECS-DISCOVERY] Discovered {} peer address(es)", peers.len());
                self.cache.replace(peers);
                Ok(self.cache.snapshot())
            }
            Err(e) if self.config.fail_fast => Err(DiscoveryError::Query(e)),
            Err(e) => {
                let cached = self.cache.snapshot();
                log::error!(
                    "[ECS-DISCOVERY] Discovery failed, returning {} cached peer(s): {}",
                    cached.len(),
                    e
                );
                Ok(cached)
            }
        }
    }

    async fn query(&self) -> Result<BTreeSet<Address>, EcsError> {
        let api = self.connector.connect(&self.config).await?;
        let tasks = resolve_running_tasks(&self.config.selector, &api).await?;
        let addresses = extract_addresses(&tasks, self.own_task_arn.as_deref(), &self.config);
        log::debug!(
            "[ECS-DISCOVERY] {} task(s) -> {} address(es)",
            tasks.len(),
            addresses.len()
        );
        Ok(addresses.into_iter().collect())
    }
}

impl<C: EcsConnector> std::fmt::Debug for EcsDiscovery<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EcsDiscovery")
            .field("config", &self.config)
            .field("own_task_arn", &self.own_task_arn)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::EcsApi;
    use crate::model::Task;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Serves one running task per `ips` entry, or fails when `down` is set.
    #[derive(Clone, Default)]
    struct Switchable {
        ips: Arc<std::sync::Mutex<Vec<&'static str>>>,
        down: Arc<AtomicBool>,
        connects: Arc<AtomicUsize>,
    }

    impl EcsApi for Switchable {
        async fn list_clusters(&self) -> Result<Vec<String>, EcsError> {
            Ok(vec!["prod".into()])
        }
        async fn list_services(&self, _: &str) -> Result<Vec<String>, EcsError> {
            Ok(vec!["api".into()])
        }
        async fn list_running_tasks(&self, _: &str, _: &str) -> Result<Vec<String>, EcsError> {
            if self.down.load(Ordering::SeqCst) {
                return Err(EcsError::Status {
                    status: 503,
                    body: "unavailable".into(),
                });
            }
            let count = self.ips.lock().unwrap().len();
            Ok((0..count).map(|i| format!("task-{}", i)).collect())
        }
        async fn describe_tasks(&self, _: &str, ids: &[String]) -> Result<Vec<Task>, EcsError> {
            let ips = self.ips.lock().unwrap().clone();
            Ok(ids
                .iter()
                .zip(ips)
                .map(|(id, ip)| Task::new(id.as_str()).with_container("web", &[ip]))
                .collect())
        }
    }

    impl EcsConnector for Switchable {
        type Api = Switchable;

        async fn connect(&self, _: &EcsDiscoveryConfig) -> Result<Switchable, EcsError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(self.clone())
        }
    }

    fn discovery(fail_fast: bool, api: &Switchable) -> EcsDiscovery<Switchable> {
        let config = EcsDiscoveryConfig {
            fail_fast,
            ..EcsDiscoveryConfig::for_service("prod", "api")
        };
        EcsDiscovery::new(config, api.clone(), Some("task-0".into()))
    }

    #[tokio::test]
    async fn test_success_replaces_cache() {
        let api = Switchable::default();
        *api.ips.lock().unwrap() = vec!["10.0.0.9", "10.0.0.1", "10.0.0.5"];
        let discovery = discovery(true, &api);

        let peers = discovery.discover_nodes().await.unwrap();
        let peers: Vec<String> = peers.iter().map(|a| a.to_string()).collect();

        // task-0 is self
        assert_eq!(peers, vec!["10.0.0.1:5701", "10.0.0.5:5701"]);
        assert_eq!(discovery.cached_nodes().len(), 2);
        assert_eq!(api.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fail_soft_returns_cache() {
        let api = Switchable::default();
        *api.ips.lock().unwrap() = vec!["10.0.0.9", "10.0.0.1"];
        let discovery = discovery(false, &api);
        let first = discovery.discover_nodes().await.unwrap();

        api.down.store(true, Ordering::SeqCst);
        let second = discovery.discover_nodes().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(second.len(), 1);
    }

    #[tokio::test]
    async fn test_fail_soft_with_empty_cache() {
        let api = Switchable::default();
        api.down.store(true, Ordering::SeqCst);
        let discovery = discovery(false, &api);

        assert!(discovery.discover_nodes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fail_fast_propagates_and_keeps_cache() {
        let api = Switchable::default();
        *api.ips.lock().unwrap() = vec!["10.0.0.9", "10.0.0.1"];
        let discovery = discovery(true, &api);
        discovery.discover_nodes().await.unwrap();

        api.down.store(true, Ordering::SeqCst);
        let err = discovery.discover_nodes().await.unwrap_err();

        assert!(matches!(
            err,
            DiscoveryError::Query(EcsError::Status { status: 503, .. })
        ));
        assert_eq!(discovery.cached_nodes().len(), 1);
    }

    #[tokio::test]
    async fn test_connector_runs_every_cycle() {
        let api = Switchable::default();
        let discovery = discovery(true, &api);
        for _ in 0..3 {
            discovery.discover_nodes().await.unwrap();
        }
        assert_eq!(api.connects.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_overlapping_cycles() {
        let api = Switchable::default();
        *api.ips.lock().unwrap() = vec!["10.0.0.9", "10.0.0.1", "10.0.0.2"];
        let discovery = Arc::new(discovery(true, &api));

        let runs: Vec<_> = (0..8)
            .map(|_| {
                let discovery = Arc::clone(&discovery);
                tokio::spawn(async move { discovery.discover_nodes().await })
            })
            .collect();

        for run in runs {
            assert_eq!(run.await.unwrap().unwrap().len(), 2);
        }
        assert_eq!(api.connects.load(Ordering::SeqCst), 8);
    }
}
